//! End-to-end scenarios for the registration wizard through the public service facade, using the
//! real save scheduler and the file-backed draft cache.

mod common {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::Value;

    use exam_registration::config::{RegistrationConfig, SavePolicy};
    use exam_registration::workflows::registration::{
        ApplicationId, ApplicationRecord, CandidateRecord, FileDraftStore, PaymentRecord, PostId,
        RegistrationRepository, RegistrationService, RepositoryError, SaveScheduler, Section,
        StartSession, UserId,
    };

    #[derive(Default)]
    pub(super) struct InMemoryStore {
        sections: Mutex<HashMap<(UserId, Section), Value>>,
        applications: Mutex<Vec<ApplicationRecord>>,
        payments: Mutex<Vec<PaymentRecord>>,
    }

    impl InMemoryStore {
        pub(super) fn stored(&self, user: &UserId, section: Section) -> Option<Value> {
            self.sections
                .lock()
                .expect("sections mutex poisoned")
                .get(&(user.clone(), section))
                .cloned()
        }

        pub(super) fn only_application(&self) -> ApplicationRecord {
            let guard = self.applications.lock().expect("applications mutex poisoned");
            assert_eq!(guard.len(), 1, "expected exactly one application");
            guard[0].clone()
        }
    }

    impl RegistrationRepository for InMemoryStore {
        fn load_section(
            &self,
            section: Section,
            user: &UserId,
        ) -> Result<Option<Value>, RepositoryError> {
            Ok(self.stored(user, section))
        }

        fn save_section(
            &self,
            section: Section,
            user: &UserId,
            data: Value,
        ) -> Result<(), RepositoryError> {
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
            let mut guard = self.applications.lock().expect("applications mutex poisoned");
            if guard
                .iter()
                .any(|existing| existing.user_id == record.user_id && existing.post_id == record.post_id)
            {
                return Err(RepositoryError::Conflict);
            }
            guard.push(record.clone());
            Ok(record)
        }

        fn update_application(&self, record: ApplicationRecord) -> Result<(), RepositoryError> {
            let mut guard = self.applications.lock().expect("applications mutex poisoned");
            let existing = guard
                .iter_mut()
                .find(|existing| existing.id == record.id)
                .ok_or(RepositoryError::NotFound)?;
            *existing = record;
            Ok(())
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
            Ok(Vec::new())
        }
    }

    pub(super) fn user() -> UserId {
        UserId("candidate-42".to_string())
    }

    pub(super) fn start() -> StartSession {
        StartSession {
            user_id: user(),
            post_id: PostId("anm-2025".to_string()),
            draft_id: None,
        }
    }

    pub(super) fn service(
        store: Arc<InMemoryStore>,
        drafts: &std::path::Path,
    ) -> RegistrationService<InMemoryStore> {
        let config = RegistrationConfig {
            save_policy: SavePolicy {
                debounce: Duration::from_millis(10),
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
            ..RegistrationConfig::default()
        };
        let (saves, _task) = SaveScheduler::spawn(store.clone(), config.save_policy);
        let drafts = Arc::new(FileDraftStore::new(drafts).expect("draft dir"));
        RegistrationService::new(store, drafts, saves, &config)
    }
}

use std::sync::Arc;

use common::{service, start, user, InMemoryStore};
use serde_json::json;

use exam_registration::workflows::registration::form::{
    EducationField, ExperienceField, PersonalField,
};
use exam_registration::workflows::registration::steps::DocumentKind;
use exam_registration::workflows::registration::{
    ApplicationStatus, FieldUpdate, NavigationOutcome, PaymentStatus, RegistrationError, Section,
    StepId,
};

fn personal(field: PersonalField, value: &str) -> FieldUpdate {
    FieldUpdate::Personal {
        field,
        value: json!(value),
    }
}

fn advance(
    service: &exam_registration::workflows::registration::RegistrationService<InMemoryStore>,
    step: u8,
) {
    let outcome = service
        .navigate(&user(), StepId(step))
        .expect("known step");
    assert!(
        matches!(outcome, NavigationOutcome::Moved { to, .. } if to == StepId(step)),
        "could not reach step {step}: {outcome:?}"
    );
}

#[tokio::test]
async fn candidate_completes_every_step_and_submits() {
    let drafts = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(InMemoryStore::default());
    let service = service(store.clone(), drafts.path());
    let user = user();

    let view = service.start_session(start()).expect("session");
    assert_eq!(view.current_step, StepId(1));

    for update in [
        personal(PersonalField::FirstName, "Meera"),
        personal(PersonalField::LastName, "Oraon"),
        personal(PersonalField::Mobile, "9123456780"),
        personal(PersonalField::Email, "meera@example.com"),
        personal(PersonalField::DateOfBirth, "1997-01-30"),
    ] {
        service.update_field(&user, update).expect("personal update");
    }
    advance(&service, 2);

    service
        .update_field(
            &user,
            FieldUpdate::Other {
                field: "category".to_string(),
                value: json!("st"),
            },
        )
        .expect("category");
    advance(&service, 3);

    for (field, value) in [
        (EducationField::School, "Govt. Girls School, Gumla"),
        (EducationField::Board, "JAC"),
        (EducationField::Year, "2013"),
    ] {
        service
            .update_field(
                &user,
                FieldUpdate::Education {
                    index: 0,
                    field,
                    value: json!(value),
                },
            )
            .expect("education");
    }
    for (slot, district) in ["Gumla", "Ranchi", "Lohardaga", "Simdega", "Khunti"]
        .iter()
        .enumerate()
    {
        service
            .update_field(
                &user,
                FieldUpdate::DistrictPreference {
                    slot,
                    district: district.to_string(),
                },
            )
            .expect("preference");
    }
    advance(&service, 4);

    service
        .update_field(
            &user,
            FieldUpdate::Experience {
                index: 0,
                field: ExperienceField::Designation,
                value: json!("ANM"),
            },
        )
        .expect("experience");
    advance(&service, 5);

    for (kind, name) in [(DocumentKind::Photo, "photo.jpg"), (DocumentKind::Signature, "sign.jpg")] {
        service
            .update_field(
                &user,
                FieldUpdate::Document {
                    document_type: kind,
                    file_name: name.to_string(),
                    file_path: format!("uploads/candidate-42/{name}"),
                },
            )
            .expect("document");
    }
    advance(&service, 6);

    let payment = service.settle_payment(&user).expect("exempt payment");
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.amount, 0);
    advance(&service, 7);

    service
        .update_field(&user, FieldUpdate::Declaration { accepted: true })
        .expect("declaration");
    let record = service.submit(&user).expect("submitted");
    assert_eq!(record.status, ApplicationStatus::Submitted);
    assert!(record.submitted_at.is_some());

    let report = service.flush().await.expect("scheduler running");
    assert!(report.failed.is_empty());

    assert_eq!(
        store.stored(&user, Section::PersonalInfo).map(|value| value["firstName"].clone()),
        Some(json!("Meera"))
    );
    assert_eq!(
        store
            .stored(&user, Section::DistrictPreferences)
            .and_then(|value| value.as_array().map(Vec::len)),
        Some(24)
    );
    assert_eq!(store.only_application().status, ApplicationStatus::Submitted);

    let reopened = common::service(store.clone(), drafts.path());
    let view = reopened.start_session(start()).expect("resumed");
    assert!(view.submitted);
    let err = reopened
        .update_field(&user, personal(PersonalField::FirstName, "Changed"))
        .expect_err("read-only after submission");
    assert!(matches!(err, RegistrationError::Guard(_)));
}

#[tokio::test]
async fn unsaved_edits_survive_a_restart_through_the_draft_cache() {
    let drafts = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(InMemoryStore::default());

    {
        let service = service(store.clone(), drafts.path());
        service.start_session(start()).expect("session");
        service
            .update_field(&user(), personal(PersonalField::FirstName, "Meera"))
            .expect("update");
    }
    assert!(store.stored(&user(), Section::PersonalInfo).is_none());

    let restarted = service(store, drafts.path());
    let view = restarted.start_session(start()).expect("resumed");
    assert_eq!(view.current_step, StepId(1));
    assert_eq!(view.form["personalInfo"]["firstName"], "Meera");
}
