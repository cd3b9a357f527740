//! Exam registration wizard: step registry, form snapshots, completion rules and progress.
//!
//! The pure model (`steps`, `form`, `completion`, `progress`) has no I/O. The service layer
//! composes it with the repository seam, the debounced save task and the local draft cache,
//! and exposes it over HTTP alongside phone verification and the admin back-office.

pub mod admin;
pub mod completion;
pub mod domain;
pub mod form;
pub mod guard;
pub mod payment;
pub mod phone;
pub mod progress;
pub(crate) mod rate_limit;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod steps;

#[cfg(test)]
mod tests;

pub use admin::{AdminError, AdminService, ApplicationQuery, ApplicationRow, CandidateQuery, Page};
pub use completion::CompletionStatus;
pub use domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, CandidateRecord, Category, PaymentRecord,
    PaymentStatus, PostId, Section, UserId,
};
pub use form::{
    DraftError, DraftKey, DraftStore, FieldPath, FieldUpdate, FieldUpdateError, FileDraftStore,
    FormData, MemoryDraftStore,
};
pub use guard::{ApplicationStatusGuard, GuardRejection};
pub use payment::{FeeAssessment, FeePolicy, MockPaymentGateway, PaymentError, PaymentGateway};
pub use phone::{OtpDispatch, OtpError, PhoneVerifier, SmsError, SmsGateway, SmsMessage, SmsTemplate};
pub use progress::{resume_step, Blocked, NavigationError, NavigationOutcome, WizardProgress};
pub use repository::{RegistrationRepository, RepositoryError};
pub use router::{admin_router, phone_router, registration_router};
pub use scheduler::{FlushReport, SaveHandle, SaveRequest, SaveScheduler};
pub use service::{RegistrationError, RegistrationService, SessionView, StartSession};
pub use steps::{Step, StepId, StepRegistry};
