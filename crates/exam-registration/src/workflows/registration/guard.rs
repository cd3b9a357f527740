use super::domain::{ApplicationRecord, ApplicationStatus};

/// Reasons the wizard refuses edits for an application.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardRejection {
    #[error("application {application_number} has already been submitted")]
    AlreadySubmitted { application_number: String },
    #[error("application {application_number} is {status} and can no longer be edited")]
    Restricted {
        application_number: String,
        status: ApplicationStatus,
    },
}

/// Statuses in which the candidate may still open and edit the wizard.
const EDITABLE: [ApplicationStatus; 4] = [
    ApplicationStatus::Draft,
    ApplicationStatus::PaymentPending,
    ApplicationStatus::PaymentCompleted,
    ApplicationStatus::DocumentPending,
];

#[derive(Debug, Clone, Default)]
pub struct ApplicationStatusGuard;

impl ApplicationStatusGuard {
    /// A candidate without an application row yet is always allowed in.
    pub fn check(&self, application: Option<&ApplicationRecord>) -> Result<(), GuardRejection> {
        let Some(record) = application else {
            return Ok(());
        };

        if EDITABLE.contains(&record.status) {
            return Ok(());
        }

        if record.status == ApplicationStatus::Submitted {
            return Err(GuardRejection::AlreadySubmitted {
                application_number: record.application_number.clone(),
            });
        }

        Err(GuardRejection::Restricted {
            application_number: record.application_number.clone(),
            status: record.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::registration::domain::{ApplicationId, PostId, UserId};
    use chrono::Utc;

    fn record(status: ApplicationStatus) -> ApplicationRecord {
        let now = Utc::now();
        ApplicationRecord {
            id: ApplicationId("app-1".to_string()),
            user_id: UserId("user-1".to_string()),
            post_id: PostId("post-1".to_string()),
            application_number: "APP-1".to_string(),
            status,
            submitted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn allows_editable_statuses_and_missing_rows() {
        let guard = ApplicationStatusGuard;
        assert!(guard.check(None).is_ok());
        assert!(guard.check(Some(&record(ApplicationStatus::Draft))).is_ok());
        assert!(guard
            .check(Some(&record(ApplicationStatus::PaymentCompleted)))
            .is_ok());
    }

    #[test]
    fn blocks_submitted_and_closed_applications() {
        let guard = ApplicationStatusGuard;
        assert!(matches!(
            guard.check(Some(&record(ApplicationStatus::Submitted))),
            Err(GuardRejection::AlreadySubmitted { .. })
        ));
        assert!(matches!(
            guard.check(Some(&record(ApplicationStatus::Rejected))),
            Err(GuardRejection::Restricted {
                status: ApplicationStatus::Rejected,
                ..
            })
        ));
    }
}
