use chrono::{DateTime, Utc};
use exam_registration::config::RegistrationConfig;
use exam_registration::error::AppError;
use exam_registration::workflows::registration::{
    AdminService, ApplicationId, ApplicationRecord, CandidateRecord, Category, DraftStore,
    FileDraftStore, MemoryDraftStore, PaymentRecord, PhoneVerifier, PostId,
    RegistrationRepository, RegistrationService, RepositoryError, SaveScheduler, Section,
    SmsError, SmsGateway, SmsMessage, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local stand-in for the hosted database.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRegistrationRepository {
    sections: Arc<Mutex<HashMap<(UserId, Section), Value>>>,
    registered: Arc<Mutex<HashMap<UserId, DateTime<Utc>>>>,
    applications: Arc<Mutex<Vec<ApplicationRecord>>>,
    payments: Arc<Mutex<Vec<PaymentRecord>>>,
}

impl RegistrationRepository for InMemoryRegistrationRepository {
    fn load_section(
        &self,
        section: Section,
        user: &UserId,
    ) -> Result<Option<Value>, RepositoryError> {
        let guard = self.sections.lock().expect("section mutex poisoned");
        Ok(guard.get(&(user.clone(), section)).cloned())
    }

    fn save_section(
        &self,
        section: Section,
        user: &UserId,
        data: Value,
    ) -> Result<(), RepositoryError> {
        self.registered
            .lock()
            .expect("registration mutex poisoned")
            .entry(user.clone())
            .or_insert_with(Utc::now);
        let mut guard = self.sections.lock().expect("section mutex poisoned");
        guard.insert((user.clone(), section), data);
        Ok(())
    }

    fn find_application(
        &self,
        user: &UserId,
        post: &PostId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.applications.lock().expect("application mutex poisoned");
        Ok(guard
            .iter()
            .find(|record| &record.user_id == user && &record.post_id == post)
            .cloned())
    }

    fn application_for_user(
        &self,
        user: &UserId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.applications.lock().expect("application mutex poisoned");
        Ok(guard
            .iter()
            .filter(|record| &record.user_id == user)
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.applications.lock().expect("application mutex poisoned");
        Ok(guard.iter().find(|record| &record.id == id).cloned())
    }

    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        let mut guard = self.applications.lock().expect("application mutex poisoned");
        let duplicate = guard.iter().any(|existing| {
            existing.id == record.id
                || existing.application_number == record.application_number
                || (existing.user_id == record.user_id && existing.post_id == record.post_id)
        });
        if duplicate {
            return Err(RepositoryError::Conflict);
        }
        guard.push(record.clone());
        Ok(record)
    }

    fn update_application(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
        let mut guard = self.applications.lock().expect("application mutex poisoned");
        match guard.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn applications(&self) -> Result<Vec<ApplicationRecord>, RepositoryError> {
        Ok(self
            .applications
            .lock()
            .expect("application mutex poisoned")
            .clone())
    }

    fn record_payment(&self, payment: PaymentRecord) -> Result<PaymentRecord, RepositoryError> {
        let mut guard = self.payments.lock().expect("payment mutex poisoned");
        guard.push(payment.clone());
        Ok(payment)
    }

    fn latest_payment(
        &self,
        application: &ApplicationId,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let guard = self.payments.lock().expect("payment mutex poisoned");
        Ok(guard
            .iter()
            .filter(|payment| &payment.application_id == application)
            .max_by_key(|payment| payment.created_at)
            .cloned())
    }

    fn candidates(&self) -> Result<Vec<CandidateRecord>, RepositoryError> {
        let sections = self.sections.lock().expect("section mutex poisoned");
        let registered = self.registered.lock().expect("registration mutex poisoned");
        Ok(sections
            .iter()
            .filter(|((_, section), _)| *section == Section::PersonalInfo)
            .map(|((user, _), personal)| {
                let text = |key: &str| personal[key].as_str().unwrap_or_default().trim().to_string();
                let category = sections
                    .get(&(user.clone(), Section::OtherDetails))
                    .and_then(|other| other["category"].as_str())
                    .and_then(Category::parse);
                CandidateRecord {
                    user_id: user.clone(),
                    full_name: format!("{} {}", text("firstName"), text("lastName"))
                        .trim()
                        .to_string(),
                    email: text("email"),
                    mobile: text("mobile"),
                    category,
                    registered_at: registered.get(user).copied().unwrap_or_else(Utc::now),
                }
            })
            .collect())
    }
}

/// Writes outbound SMS to the log instead of calling a provider.
#[derive(Debug, Default, Clone)]
pub(crate) struct LoggingSmsGateway;

impl SmsGateway for LoggingSmsGateway {
    fn send(&self, message: &SmsMessage) -> Result<(), SmsError> {
        info!(mobile = %message.mobile, template = ?message.template, "sms dispatched");
        Ok(())
    }
}

/// Services sharing one repository and one save task.
pub(crate) struct RegistrationStack {
    pub(crate) repository: Arc<InMemoryRegistrationRepository>,
    pub(crate) service: Arc<RegistrationService<InMemoryRegistrationRepository>>,
    pub(crate) verifier: Arc<PhoneVerifier<LoggingSmsGateway>>,
    pub(crate) admin: Arc<AdminService<InMemoryRegistrationRepository>>,
    pub(crate) saves: JoinHandle<()>,
}

/// Must be called inside a tokio runtime; the save task is spawned here.
pub(crate) fn build_registration_stack(
    config: &RegistrationConfig,
) -> Result<RegistrationStack, AppError> {
    let repository = Arc::new(InMemoryRegistrationRepository::default());
    let drafts: Arc<dyn DraftStore> = match &config.draft_dir {
        Some(dir) => Arc::new(FileDraftStore::new(dir)?),
        None => Arc::new(MemoryDraftStore::default()),
    };

    let (handle, saves) = SaveScheduler::spawn(repository.clone(), config.save_policy);
    let service = Arc::new(RegistrationService::new(
        repository.clone(),
        drafts,
        handle,
        config,
    ));
    let verifier = Arc::new(PhoneVerifier::new(
        Arc::new(LoggingSmsGateway),
        config,
        config.post_code.clone(),
    ));
    let admin = Arc::new(AdminService::new(repository.clone()));

    Ok(RegistrationStack {
        repository,
        service,
        verifier,
        admin,
        saves,
    })
}
