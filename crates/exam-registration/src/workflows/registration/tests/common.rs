use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::to_bytes;
use axum::response::Response;
use chrono::Utc;
use serde_json::{json, Value};

use crate::config::RegistrationConfig;
use crate::workflows::registration::domain::{
    ApplicationId, ApplicationRecord, CandidateRecord, Category, PaymentRecord, PostId, Section,
    UserId,
};
use crate::workflows::registration::form::{FieldPath, FormData, MemoryDraftStore};
use crate::workflows::registration::phone::{SmsError, SmsGateway, SmsMessage};
use crate::workflows::registration::repository::{RegistrationRepository, RepositoryError};
use crate::workflows::registration::scheduler::{DetachedSaves, SaveHandle};
use crate::workflows::registration::service::{RegistrationService, StartSession};
use crate::workflows::registration::steps::StepRegistry;

pub(super) fn user() -> UserId {
    UserId("user-1".to_string())
}

pub(super) fn post() -> PostId {
    PostId("staff-nurse-2025".to_string())
}

pub(super) fn registry() -> Arc<StepRegistry> {
    Arc::new(StepRegistry::standard())
}

pub(super) fn path(raw: &str) -> FieldPath {
    FieldPath::parse(raw).expect("valid path")
}

pub(super) fn personal_form() -> FormData {
    FormData::default()
        .set(&path("personalInfo.firstName"), json!("Asha"))
        .set(&path("personalInfo.lastName"), json!("Kumari"))
        .set(&path("personalInfo.mobile"), json!("9876543210"))
        .set(&path("personalInfo.email"), json!("asha@example.com"))
        .set(&path("personalInfo.dateOfBirth"), json!("1998-04-12"))
}

pub(super) fn with_education(form: FormData) -> FormData {
    let form = form
        .set(&path("education.0.school"), json!("Govt. High School, Ranchi"))
        .set(&path("education.0.board"), json!("JAC"))
        .set(&path("education.0.year"), json!("2014"));
    ["Ranchi", "Dhanbad", "Bokaro", "Hazaribagh", "Dumka"]
        .iter()
        .enumerate()
        .fold(form, |form, (slot, district)| {
            form.set(
                &FieldPath::from_dotted(&format!("districtPreferences.{slot}")),
                json!(district),
            )
        })
}

pub(super) fn with_documents(form: FormData) -> FormData {
    form.with_section(
        Section::Documents,
        json!([
            { "documentType": "photo", "fileName": "photo.jpg", "filePath": "uploads/user-1/photo.jpg" },
            { "documentType": "signature", "fileName": "sign.jpg", "filePath": "uploads/user-1/sign.jpg" },
        ]),
    )
}

/// Form with every step up to and including `step` filled in.
pub(super) fn form_through(step: u8) -> FormData {
    let mut form = personal_form();
    if step >= 2 {
        form = form.set(&path("otherDetails.category"), json!("general"));
    }
    if step >= 3 {
        form = with_education(form);
    }
    if step >= 4 {
        form = form.set(&path("experienceRows.0.designation"), json!("Staff Nurse"));
    }
    if step >= 5 {
        form = with_documents(form);
    }
    if step >= 6 {
        form = form.with_section(Section::Payment, json!({ "status": "completed" }));
    }
    if step >= 7 {
        form = form.set(&path("review.declarationAccepted"), json!(true));
    }
    form
}

pub(super) fn build_service() -> (
    RegistrationService<MemoryRepository>,
    Arc<MemoryRepository>,
    DetachedSaves,
) {
    build_service_with(MemoryRepository::default())
}

pub(super) fn build_service_with(
    repository: MemoryRepository,
) -> (
    RegistrationService<MemoryRepository>,
    Arc<MemoryRepository>,
    DetachedSaves,
) {
    let repository = Arc::new(repository);
    let (saves, detached) = SaveHandle::detached();
    let service = RegistrationService::new(
        repository.clone(),
        Arc::new(MemoryDraftStore::default()),
        saves,
        &RegistrationConfig::default(),
    );
    (service, repository, detached)
}

pub(super) fn start_request() -> StartSession {
    StartSession {
        user_id: user(),
        post_id: post(),
        draft_id: None,
    }
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    pub(super) sections: Arc<Mutex<HashMap<(UserId, Section), Value>>>,
    pub(super) applications: Arc<Mutex<Vec<ApplicationRecord>>>,
    pub(super) payments: Arc<Mutex<Vec<PaymentRecord>>>,
    pub(super) section_writes: Arc<AtomicUsize>,
    /// Remaining `save_section` calls that fail as unavailable.
    pub(super) failing_saves: Arc<AtomicUsize>,
    pub(super) fail_updates: Arc<AtomicBool>,
    pub(super) fail_inserts: Arc<AtomicBool>,
}

impl MemoryRepository {
    pub(super) fn failing_saves(count: usize) -> Self {
        let repository = Self::default();
        repository.failing_saves.store(count, Ordering::SeqCst);
        repository
    }

    pub(super) fn section(&self, user: &UserId, section: Section) -> Option<Value> {
        self.sections
            .lock()
            .expect("sections mutex poisoned")
            .get(&(user.clone(), section))
            .cloned()
    }

    pub(super) fn application_count(&self) -> usize {
        self.applications
            .lock()
            .expect("applications mutex poisoned")
            .len()
    }
}

impl RegistrationRepository for MemoryRepository {
    fn load_section(
        &self,
        section: Section,
        user: &UserId,
    ) -> Result<Option<Value>, RepositoryError> {
        Ok(self.section(user, section))
    }

    fn save_section(
        &self,
        section: Section,
        user: &UserId,
        data: Value,
    ) -> Result<(), RepositoryError> {
        let remaining = self.failing_saves.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_saves.store(remaining - 1, Ordering::SeqCst);
            return Err(RepositoryError::Unavailable("connection reset".to_string()));
        }
        self.section_writes.fetch_add(1, Ordering::SeqCst);
        self.sections
            .lock()
            .expect("sections mutex poisoned")
            .insert((user.clone(), section), data);
        Ok(())
    }

    fn find_application(
        &self,
        user: &UserId,
        post: &PostId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.applications.lock().expect("applications mutex poisoned");
        Ok(guard
            .iter()
            .find(|record| &record.user_id == user && &record.post_id == post)
            .cloned())
    }

    fn application_for_user(
        &self,
        user: &UserId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        let guard = self.applications.lock().expect("applications mutex poisoned");
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
        let guard = self.applications.lock().expect("applications mutex poisoned");
        Ok(guard.iter().find(|record| &record.id == id).cloned())
    }

    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        let mut guard = self.applications.lock().expect("applications mutex poisoned");
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
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("database offline".to_string()));
        }
        let mut guard = self.applications.lock().expect("applications mutex poisoned");
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
            .expect("applications mutex poisoned")
            .clone())
    }

    fn record_payment(&self, payment: PaymentRecord) -> Result<PaymentRecord, RepositoryError> {
        self.payments
            .lock()
            .expect("payments mutex poisoned")
            .push(payment.clone());
        Ok(payment)
    }

    fn latest_payment(
        &self,
        application: &ApplicationId,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let guard = self.payments.lock().expect("payments mutex poisoned");
        Ok(guard
            .iter()
            .filter(|payment| &payment.application_id == application)
            .max_by_key(|payment| payment.created_at)
            .cloned())
    }

    fn candidates(&self) -> Result<Vec<CandidateRecord>, RepositoryError> {
        let guard = self.sections.lock().expect("sections mutex poisoned");
        let mut candidates: Vec<CandidateRecord> = guard
            .iter()
            .filter(|((_, section), _)| *section == Section::PersonalInfo)
            .map(|((user, _), personal)| {
                let text = |key: &str| personal[key].as_str().unwrap_or_default().to_string();
                let category = guard
                    .get(&(user.clone(), Section::OtherDetails))
                    .and_then(|other| other["category"].as_str())
                    .and_then(Category::parse);
                CandidateRecord {
                    user_id: user.clone(),
                    full_name: format!("{} {}", text("firstName"), text("lastName")),
                    email: text("email"),
                    mobile: text("mobile"),
                    category,
                    registered_at: Utc::now(),
                }
            })
            .collect();
        candidates.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(candidates)
    }
}

/// Captures outbound messages instead of sending them.
#[derive(Default)]
pub(super) struct RecordingSms {
    pub(super) sent: Mutex<Vec<SmsMessage>>,
}

impl SmsGateway for RecordingSms {
    fn send(&self, message: &SmsMessage) -> Result<(), SmsError> {
        self.sent
            .lock()
            .expect("sms mutex poisoned")
            .push(message.clone());
        Ok(())
    }
}

pub(super) struct OfflineSms;

impl SmsGateway for OfflineSms {
    fn send(&self, _message: &SmsMessage) -> Result<(), SmsError> {
        Err(SmsError::Unavailable("provider timeout".to_string()))
    }
}
