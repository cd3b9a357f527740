use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub registration: RegistrationConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            registration: RegistrationConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Wizard persistence, phone verification and fee settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationConfig {
    /// Directory for local draft snapshots. `None` keeps drafts in memory.
    pub draft_dir: Option<PathBuf>,
    pub save_policy: SavePolicy,
    pub otp_ttl_minutes: i64,
    pub otp_sends_per_minute: usize,
    pub fees: FeeSchedule,
    /// Post name quoted in verification SMS bodies.
    pub post_code: String,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            draft_dir: None,
            save_policy: SavePolicy::default(),
            otp_ttl_minutes: 10,
            otp_sends_per_minute: 10,
            fees: FeeSchedule::default(),
            post_code: "EXAM".to_string(),
        }
    }
}

impl RegistrationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let draft_dir = env::var("REGISTRATION_DRAFT_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let save_policy = SavePolicy {
            debounce: Duration::from_millis(env_number(
                "REGISTRATION_SAVE_DEBOUNCE_MS",
                defaults.save_policy.debounce.as_millis() as u64,
            )?),
            max_attempts: env_number(
                "REGISTRATION_SAVE_MAX_ATTEMPTS",
                defaults.save_policy.max_attempts,
            )?,
            backoff: Duration::from_millis(env_number(
                "REGISTRATION_SAVE_BACKOFF_MS",
                defaults.save_policy.backoff.as_millis() as u64,
            )?),
        };

        let fees = FeeSchedule {
            general: env_number("REGISTRATION_FEE_GENERAL", defaults.fees.general)?,
            obc: env_number("REGISTRATION_FEE_OBC", defaults.fees.obc)?,
            ews: env_number("REGISTRATION_FEE_EWS", defaults.fees.ews)?,
        };

        Ok(Self {
            draft_dir,
            save_policy,
            otp_ttl_minutes: env_number("REGISTRATION_OTP_TTL_MINUTES", defaults.otp_ttl_minutes)?,
            otp_sends_per_minute: env_number(
                "REGISTRATION_OTP_SENDS_PER_MINUTE",
                defaults.otp_sends_per_minute,
            )?,
            fees,
            post_code: env::var("REGISTRATION_POST_CODE")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.post_code),
        })
    }
}

/// Debounce and bounded retry applied to background section saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavePolicy {
    pub debounce: Duration,
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for SavePolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Application fee per non-exempt category, in rupees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub general: u32,
    pub obc: u32,
    pub ews: u32,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            general: 100,
            obc: 100,
            ews: 100,
        }
    }
}

fn env_number<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "REGISTRATION_DRAFT_DIR",
            "REGISTRATION_SAVE_DEBOUNCE_MS",
            "REGISTRATION_SAVE_MAX_ATTEMPTS",
            "REGISTRATION_SAVE_BACKOFF_MS",
            "REGISTRATION_OTP_TTL_MINUTES",
            "REGISTRATION_OTP_SENDS_PER_MINUTE",
            "REGISTRATION_FEE_GENERAL",
            "REGISTRATION_FEE_OBC",
            "REGISTRATION_FEE_EWS",
            "REGISTRATION_POST_CODE",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.registration, RegistrationConfig::default());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn reads_registration_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REGISTRATION_DRAFT_DIR", "/tmp/drafts");
        env::set_var("REGISTRATION_SAVE_MAX_ATTEMPTS", "5");
        env::set_var("REGISTRATION_FEE_GENERAL", "250");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.registration.draft_dir,
            Some(PathBuf::from("/tmp/drafts"))
        );
        assert_eq!(config.registration.save_policy.max_attempts, 5);
        assert_eq!(config.registration.fees.general, 250);
        assert_eq!(config.registration.fees.obc, 100);
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("REGISTRATION_OTP_TTL_MINUTES", "ten");
        let err = AppConfig::load().expect_err("invalid ttl");
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                var: "REGISTRATION_OTP_TTL_MINUTES"
            }
        ));
        reset_env();
    }
}
