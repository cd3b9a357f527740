//! Phone number verification by one-time code.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use super::rate_limit::RateLimiter;
use crate::config::RegistrationConfig;

const TEMPLATE_VAR: &str = "##var##";

/// Wrong guesses allowed against one code before it is locked.
pub const MAX_VERIFY_ATTEMPTS: u32 = 5;

/// Transactional SMS bodies. Placeholders are filled left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmsTemplate {
    OtpRegistration,
    RegistrationSuccess,
    ForgotPassword,
}

impl SmsTemplate {
    pub const fn body(self) -> &'static str {
        match self {
            SmsTemplate::OtpRegistration => {
                "Dear Applicant, registration for the post of ##var## has started. OTP is ##var##. Please do not share."
            }
            SmsTemplate::RegistrationSuccess => {
                "Dear Applicant, your registration is successful. Reg No: ##var##, Password: ##var##. Keep these credentials confidential."
            }
            SmsTemplate::ForgotPassword => {
                "Dear Applicant, your registered password for ##var## is ##var##. Do not share this with anyone."
            }
        }
    }

    /// Extra values are ignored; missing ones leave their placeholder in place.
    pub fn render(self, values: &[&str]) -> String {
        let mut rendered = self.body().to_string();
        for value in values {
            match rendered.find(TEMPLATE_VAR) {
                Some(at) => rendered.replace_range(at..at + TEMPLATE_VAR.len(), value),
                None => break,
            }
        }
        rendered
    }
}

/// Normalises an Indian mobile number to the `91` country-code form.
pub fn format_mobile(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 12 && digits.starts_with("91") {
        digits
    } else if let Some(local) = digits.strip_prefix('0') {
        format!("91{local}")
    } else {
        format!("91{digits}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub mobile: String,
    pub template: SmsTemplate,
    pub body: String,
}

impl SmsMessage {
    pub fn new(mobile: &str, template: SmsTemplate, values: &[&str]) -> Self {
        Self {
            mobile: format_mobile(mobile),
            template,
            body: template.render(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SmsError {
    #[error("sms provider rejected the message: {0}")]
    Rejected(String),
    #[error("sms provider unavailable: {0}")]
    Unavailable(String),
}

/// Outbound SMS provider.
pub trait SmsGateway: Send + Sync {
    fn send(&self, message: &SmsMessage) -> Result<(), SmsError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpRecord {
    pub phone: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub failed_attempts: u32,
}

/// What the caller learns about a dispatched code; the code itself is never echoed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OtpDispatch {
    pub phone: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&OtpRecord> for OtpDispatch {
    fn from(record: &OtpRecord) -> Self {
        Self {
            phone: record.phone.clone(),
            expires_at: record.expires_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    #[error("'{0}' is not a valid 10 digit mobile number")]
    InvalidPhone(String),
    #[error("too many verification codes requested; try again later")]
    RateLimited,
    #[error("no verification code was requested for this number")]
    NotRequested,
    #[error("verification code does not match")]
    Mismatch,
    #[error("verification code has already been used")]
    AlreadyUsed,
    #[error("verification code has expired")]
    Expired,
    #[error("too many wrong codes; request a new verification code")]
    AttemptsExhausted,
    #[error(transparent)]
    Sms(#[from] SmsError),
}

/// Issues and checks six digit codes; one live code per phone.
pub struct PhoneVerifier<G> {
    gateway: Arc<G>,
    limiter: RateLimiter,
    ttl: Duration,
    post_code: String,
    codes: Mutex<HashMap<String, OtpRecord>>,
}

impl<G> PhoneVerifier<G>
where
    G: SmsGateway + 'static,
{
    pub fn new(gateway: Arc<G>, config: &RegistrationConfig, post_code: impl Into<String>) -> Self {
        Self {
            gateway,
            limiter: RateLimiter::per_minute(config.otp_sends_per_minute),
            ttl: Duration::minutes(config.otp_ttl_minutes),
            post_code: post_code.into(),
            codes: Mutex::new(HashMap::new()),
        }
    }

    pub fn request(&self, phone: &str) -> Result<OtpDispatch, OtpError> {
        self.request_at(phone, Utc::now())
            .map(|record| OtpDispatch::from(&record))
    }

    /// Sends a fresh code, replacing (and so invalidating) any earlier one.
    pub fn request_at(&self, phone: &str, now: DateTime<Utc>) -> Result<OtpRecord, OtpError> {
        let phone = normalise_phone(phone)?;
        if !self.limiter.allow_at(&phone, now) {
            warn!(%phone, "otp request rate limited");
            return Err(OtpError::RateLimited);
        }

        let code = rand::thread_rng().gen_range(100_000..1_000_000).to_string();
        let message = SmsMessage::new(
            &phone,
            SmsTemplate::OtpRegistration,
            &[self.post_code.as_str(), code.as_str()],
        );
        self.gateway.send(&message)?;

        let record = OtpRecord {
            phone: phone.clone(),
            code,
            expires_at: now + self.ttl,
            used: false,
            failed_attempts: 0,
        };
        let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        // Records stay one extra ttl so late checks still report expiry.
        let ttl = self.ttl;
        codes.retain(|_, stale| stale.expires_at + ttl > now);
        codes.insert(phone.clone(), record.clone());
        drop(codes);

        info!(%phone, expires_at = %record.expires_at, "otp dispatched");
        Ok(record)
    }

    #[cfg(test)]
    pub(crate) fn tracked_codes(&self) -> usize {
        self.codes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn verify(&self, phone: &str, code: &str) -> Result<(), OtpError> {
        self.verify_at(phone, code, Utc::now())
    }

    pub fn verify_at(&self, phone: &str, code: &str, now: DateTime<Utc>) -> Result<(), OtpError> {
        let phone = normalise_phone(phone)?;
        let mut codes = self.codes.lock().unwrap_or_else(PoisonError::into_inner);
        let record = codes.get_mut(&phone).ok_or(OtpError::NotRequested)?;

        if record.failed_attempts >= MAX_VERIFY_ATTEMPTS {
            return Err(OtpError::AttemptsExhausted);
        }
        if record.code != code.trim() {
            record.failed_attempts += 1;
            if record.failed_attempts >= MAX_VERIFY_ATTEMPTS {
                warn!(%phone, "otp locked after repeated wrong codes");
                return Err(OtpError::AttemptsExhausted);
            }
            return Err(OtpError::Mismatch);
        }
        if record.used {
            return Err(OtpError::AlreadyUsed);
        }
        if record.expires_at <= now {
            return Err(OtpError::Expired);
        }

        record.used = true;
        info!(%phone, "phone verified");
        Ok(())
    }
}

/// Accepts formatted input and returns the bare 10 digit number.
fn normalise_phone(raw: &str) -> Result<String, OtpError> {
    let formatted = format_mobile(raw);
    let local = &formatted[2..];
    if local.len() == 10 && local.starts_with(&['6', '7', '8', '9'][..]) {
        Ok(local.to_string())
    } else {
        Err(OtpError::InvalidPhone(raw.to_string()))
    }
}
