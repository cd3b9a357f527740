use serde_json::Value;

use super::domain::{
    ApplicationId, ApplicationRecord, CandidateRecord, PaymentRecord, PostId, Section, UserId,
};

/// Storage abstraction over the hosted backend so services can be exercised in isolation.
///
/// Section payloads are JSON: a record for flat sections, a list for list sections. Saving a
/// list section replaces every stored row for the user.
pub trait RegistrationRepository: Send + Sync {
    fn load_section(&self, section: Section, user: &UserId)
        -> Result<Option<Value>, RepositoryError>;
    fn save_section(
        &self,
        section: Section,
        user: &UserId,
        data: Value,
    ) -> Result<(), RepositoryError>;

    fn find_application(
        &self,
        user: &UserId,
        post: &PostId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// Most recently created application of the user, whatever the post.
    fn application_for_user(
        &self,
        user: &UserId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn fetch_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, RepositoryError>;
    fn update_application(&self, record: ApplicationRecord) -> Result<(), RepositoryError>;
    fn applications(&self) -> Result<Vec<ApplicationRecord>, RepositoryError>;

    fn record_payment(&self, payment: PaymentRecord) -> Result<PaymentRecord, RepositoryError>;
    fn latest_payment(
        &self,
        application: &ApplicationId,
    ) -> Result<Option<PaymentRecord>, RepositoryError>;

    fn candidates(&self) -> Result<Vec<CandidateRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
