use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::completion::{self, CompletionStatus};
use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, PaymentRecord, PaymentStatus, PostId,
    Section, UserId,
};
use super::form::{DraftKey, DraftStore, FieldUpdate, FieldUpdateError, FormData};
use super::guard::{ApplicationStatusGuard, GuardRejection};
use super::payment::{
    charged_payment, exempt_payment, payment_section, FeeAssessment, FeePolicy, MockPaymentGateway,
    PaymentError, PaymentGateway,
};
use super::progress::{NavigationError, NavigationOutcome, WizardProgress};
use super::repository::{RegistrationRepository, RepositoryError};
use super::scheduler::{FlushReport, SaveHandle, SaveRequest};
use super::steps::{StepId, StepRegistry, StepRequirement};
use crate::config::RegistrationConfig;

/// Request to open (or reopen) the wizard for a candidate.
#[derive(Debug, Clone, Deserialize)]
pub struct StartSession {
    pub user_id: UserId,
    pub post_id: PostId,
    /// Anonymous draft to adopt once the candidate is known.
    #[serde(default)]
    pub draft_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub id: StepId,
    pub key: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub status: CompletionStatus,
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub application_number: String,
    pub status: ApplicationStatus,
}

impl From<&ApplicationRecord> for ApplicationSummary {
    fn from(record: &ApplicationRecord) -> Self {
        Self {
            id: record.id.clone(),
            application_number: record.application_number.clone(),
            status: record.status,
        }
    }
}

/// Snapshot of a wizard session for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub user_id: UserId,
    pub post_id: PostId,
    pub current_step: StepId,
    pub submitted: bool,
    pub steps: Vec<StepView>,
    pub application: Option<ApplicationSummary>,
    pub form: Value,
}

struct WizardSession {
    post: PostId,
    progress: WizardProgress,
    form: FormData,
    application: Option<ApplicationRecord>,
}

impl WizardSession {
    fn view(&self, user: &UserId) -> SessionView {
        let completed = self.progress.completed_steps();
        let steps = self
            .progress
            .registry()
            .steps()
            .iter()
            .map(|step| StepView {
                id: step.id,
                key: step.key,
                title: step.title,
                description: step.description,
                status: completion::status(step, &self.form),
                completed: completed.contains(&step.id),
            })
            .collect();

        SessionView {
            user_id: user.clone(),
            post_id: self.post.clone(),
            current_step: self.progress.current(),
            submitted: self.progress.is_submitted(),
            steps,
            application: self.application.as_ref().map(ApplicationSummary::from),
            form: self.form.as_value().clone(),
        }
    }
}

/// Error raised by the registration service.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("step {step} is incomplete: {reason}")]
    ValidationIncomplete { step: StepId, reason: String },
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Guard(#[from] GuardRejection),
    #[error("step {0} does not exist")]
    UnknownStep(StepId),
    #[error(transparent)]
    InvalidField(#[from] FieldUpdateError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl From<NavigationError> for RegistrationError {
    fn from(err: NavigationError) -> Self {
        match err {
            NavigationError::UnknownStep(step) => Self::UnknownStep(step),
        }
    }
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_identity() -> (ApplicationId, String) {
    let seq = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let millis = Utc::now().timestamp_millis();
    (
        ApplicationId(format!("app-{seq:06}")),
        format!("APP-{millis}{seq:04}"),
    )
}

/// Service composing the wizard model, persistence, drafts and payment settlement.
pub struct RegistrationService<R> {
    registry: Arc<StepRegistry>,
    repository: Arc<R>,
    drafts: Arc<dyn DraftStore>,
    saves: SaveHandle,
    guard: ApplicationStatusGuard,
    fees: FeePolicy,
    gateway: Arc<dyn PaymentGateway>,
    /// The map lock is only held for lookups; each candidate's session has its own lock.
    sessions: Mutex<HashMap<UserId, SessionSlot>>,
}

type SessionSlot = Arc<Mutex<WizardSession>>;

impl<R> RegistrationService<R>
where
    R: RegistrationRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        drafts: Arc<dyn DraftStore>,
        saves: SaveHandle,
        config: &RegistrationConfig,
    ) -> Self {
        Self {
            registry: Arc::new(StepRegistry::standard()),
            repository,
            drafts,
            saves,
            guard: ApplicationStatusGuard,
            fees: FeePolicy::new(config.fees),
            gateway: Arc::new(MockPaymentGateway),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// Rebuilds the session from stored sections and the local draft.
    pub fn start_session(&self, request: StartSession) -> Result<SessionView, RegistrationError> {
        let StartSession {
            user_id: user,
            post_id: post,
            draft_id,
        } = request;

        let mut form = FormData::default();
        let mut stored = BTreeSet::new();
        for section in Section::ALL {
            if let Some(data) = self.repository.load_section(section, &user)? {
                stored.insert(section);
                form = form.with_section(section, data);
            }
        }

        let user_key = DraftKey::User(user.clone());
        if let Some(draft_id) = draft_id {
            if let Err(error) = self.drafts.promote(&DraftKey::Anonymous(draft_id), &user_key) {
                warn!(%user, %error, "failed to adopt anonymous draft");
            }
        }
        match self.drafts.load(&user_key) {
            Ok(Some(draft)) => form = overlay_draft(form, &draft),
            Ok(None) => {}
            Err(error) => warn!(%user, %error, "ignoring unreadable draft"),
        }

        let application = match self.repository.find_application(&user, &post)? {
            Some(record) => Some(record),
            None => self.repository.application_for_user(&user)?,
        };

        let payment = match &application {
            Some(record) => self.repository.latest_payment(&record.id)?,
            None => None,
        };
        let payment_completed = payment
            .as_ref()
            .is_some_and(|payment| payment.status == PaymentStatus::Completed);
        if let Some(payment) = &payment {
            form = form.with_section(Section::Payment, payment_section(payment));
        }

        let completed = self.stored_steps(&stored, payment_completed);
        let mut progress =
            WizardProgress::resumed(Arc::clone(&self.registry), completed, payment_completed);
        if application
            .as_ref()
            .is_some_and(|record| self.guard.check(Some(record)).is_err())
        {
            progress.mark_submitted();
        }

        let session = WizardSession {
            post,
            progress,
            form,
            application,
        };
        self.persist_draft(&user, &session.form);

        info!(%user, step = %session.progress.current(), "registration session started");
        let view = session.view(&user);
        self.sessions().insert(user, Arc::new(Mutex::new(session)));
        Ok(view)
    }

    pub fn session(&self, user: &UserId) -> Result<SessionView, RegistrationError> {
        let slot = self.session_slot(user)?;
        let session = lock_session(&slot);
        Ok(session.view(user))
    }

    pub fn update_field(
        &self,
        user: &UserId,
        update: FieldUpdate,
    ) -> Result<SessionView, RegistrationError> {
        let slot = self.session_slot(user)?;
        let mut guard = lock_session(&slot);
        let session = &mut *guard;
        self.ensure_editable(session)?;

        session.form = session.form.apply(update)?;
        self.persist_draft(user, &session.form);
        Ok(session.view(user))
    }

    /// Moves the pointer. Leaving a step forward queues its sections for saving.
    pub fn navigate(
        &self,
        user: &UserId,
        target: StepId,
    ) -> Result<NavigationOutcome, RegistrationError> {
        let slot = self.session_slot(user)?;
        let mut guard = lock_session(&slot);
        let session = &mut *guard;
        if !session.progress.is_submitted() {
            self.guard.check(session.application.as_ref())?;
        }

        let outcome = session.progress.go_to(target, &session.form)?;
        match &outcome {
            NavigationOutcome::Moved {
                from,
                to,
                completed: Some(left),
            } => {
                self.schedule_step(user, *left, &session.form);
                if session.application.is_none() && self.holds_personal_info(*left) {
                    match self.find_or_create_application(user, &session.post) {
                        Ok(record) => session.application = Some(record),
                        Err(error) => warn!(%user, %error, "application not created yet"),
                    }
                }
                debug!(%user, %from, %to, "advanced");
            }
            NavigationOutcome::Moved { from, to, .. } => debug!(%user, %from, %to, "went back"),
            NavigationOutcome::Stayed { .. } => {}
            NavigationOutcome::Rejected(blocked) => {
                debug!(%user, step = %blocked.step, reason = %blocked.reason, "navigation rejected")
            }
        }
        Ok(outcome)
    }

    /// Returns the application for (user, post), creating a draft row if none exists.
    pub fn ensure_application(
        &self,
        user: &UserId,
        post: &PostId,
    ) -> Result<ApplicationRecord, RegistrationError> {
        let record = self.find_or_create_application(user, post)?;
        if let Ok(slot) = self.session_slot(user) {
            let mut session = lock_session(&slot);
            if &session.post == post {
                session.application = Some(record.clone());
            }
        }
        Ok(record)
    }

    /// Records the fee payment for the session's application. Idempotent once completed.
    pub fn settle_payment(&self, user: &UserId) -> Result<PaymentRecord, RegistrationError> {
        let slot = self.session_slot(user)?;
        let mut guard = lock_session(&slot);
        let session = &mut *guard;
        self.ensure_editable(session)?;

        let mut application = self.find_or_create_application(user, &session.post)?;
        let payment = match self.repository.latest_payment(&application.id)? {
            Some(existing) if existing.status == PaymentStatus::Completed => existing,
            _ => {
                let now = Utc::now();
                let record = match self.fees.assess_form(&session.form)? {
                    FeeAssessment::Exempt => exempt_payment(&application.id, now),
                    FeeAssessment::Due { amount } => {
                        let receipt = self.gateway.charge(&application.id, amount)?;
                        charged_payment(&application.id, amount, receipt, now)
                    }
                };
                let stored = self.repository.record_payment(record)?;
                info!(
                    %user,
                    application = %application.id,
                    amount = stored.amount,
                    method = %stored.method,
                    "payment settled"
                );
                stored
            }
        };

        if application
            .status
            .can_advance_to(ApplicationStatus::PaymentCompleted)
        {
            application.status = ApplicationStatus::PaymentCompleted;
            application.updated_at = Utc::now();
            self.repository.update_application(application.clone())?;
        }

        session.form = session
            .form
            .with_section(Section::Payment, payment_section(&payment));
        session.application = Some(application);
        self.schedule_section(user, Section::Payment, &session.form);
        self.persist_draft(user, &session.form);
        Ok(payment)
    }

    /// Final submission from the review step. The status write must succeed.
    pub fn submit(&self, user: &UserId) -> Result<ApplicationRecord, RegistrationError> {
        let slot = self.session_slot(user)?;
        let mut guard = lock_session(&slot);
        let session = &mut *guard;
        self.ensure_editable(session)?;

        session
            .progress
            .submit(&session.form)
            .map_err(|blocked| RegistrationError::ValidationIncomplete {
                step: blocked.step,
                reason: blocked.reason,
            })?;

        let written = self
            .find_or_create_application(user, &session.post)
            .and_then(|mut record| {
                let now = Utc::now();
                record.status = ApplicationStatus::Submitted;
                record.submitted_at = Some(now);
                record.updated_at = now;
                self.repository.update_application(record.clone())?;
                Ok(record)
            });

        let record = match written {
            Ok(record) => record,
            Err(error) => {
                session.progress.revert_submission();
                warn!(%user, %error, "submission could not be persisted");
                return Err(error);
            }
        };

        for step in self.registry.steps() {
            for section in &step.sections {
                self.schedule_section(user, *section, &session.form);
            }
        }
        if let Err(error) = self.drafts.remove(&DraftKey::User(user.clone())) {
            warn!(%user, %error, "failed to clear draft after submission");
        }

        info!(%user, application = %record.application_number, "application submitted");
        session.application = Some(record.clone());
        Ok(record)
    }

    /// Forces pending section saves and waits for the outcome.
    pub async fn flush(&self) -> Option<FlushReport> {
        self.saves.flush().await
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<UserId, SessionSlot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_slot(&self, user: &UserId) -> Result<SessionSlot, RegistrationError> {
        self.sessions()
            .get(user)
            .cloned()
            .ok_or_else(|| session_missing(user))
    }

    fn holds_personal_info(&self, step: StepId) -> bool {
        self.registry
            .get(step)
            .is_some_and(|step| step.sections.contains(&Section::PersonalInfo))
    }

    fn ensure_editable(&self, session: &WizardSession) -> Result<(), RegistrationError> {
        self.guard.check(session.application.as_ref())?;
        if session.progress.is_submitted() {
            let application_number = session
                .application
                .as_ref()
                .map(|record| record.application_number.clone())
                .unwrap_or_default();
            return Err(GuardRejection::AlreadySubmitted { application_number }.into());
        }
        Ok(())
    }

    fn find_or_create_application(
        &self,
        user: &UserId,
        post: &PostId,
    ) -> Result<ApplicationRecord, RegistrationError> {
        if let Some(existing) = self.repository.find_application(user, post)? {
            return Ok(existing);
        }

        let (id, application_number) = next_application_identity();
        let now = Utc::now();
        let record = ApplicationRecord {
            id,
            user_id: user.clone(),
            post_id: post.clone(),
            application_number,
            status: ApplicationStatus::Draft,
            submitted_at: None,
            created_at: now,
            updated_at: now,
        };

        match self.repository.insert_application(record) {
            Ok(stored) => {
                info!(%user, %post, application = %stored.application_number, "application created");
                Ok(stored)
            }
            Err(RepositoryError::Conflict) => self
                .repository
                .find_application(user, post)?
                .ok_or(RegistrationError::Persistence(RepositoryError::Conflict)),
            Err(other) => Err(other.into()),
        }
    }

    /// Steps 1..payment count as completed when their sections are stored.
    fn stored_steps(&self, stored: &BTreeSet<Section>, payment_completed: bool) -> BTreeSet<StepId> {
        let review = self.registry.review_step();
        self.registry
            .steps()
            .iter()
            .filter(|step| match step.requirement {
                StepRequirement::PaymentSettled => payment_completed,
                _ if step.id == review => false,
                _ => step.sections.iter().any(|section| stored.contains(section)),
            })
            .map(|step| step.id)
            .collect()
    }

    fn schedule_step(&self, user: &UserId, step: StepId, form: &FormData) {
        let Some(step) = self.registry.get(step) else {
            return;
        };
        for section in &step.sections {
            self.schedule_section(user, *section, form);
        }
    }

    fn schedule_section(&self, user: &UserId, section: Section, form: &FormData) {
        self.saves.enqueue(SaveRequest {
            user: user.clone(),
            section,
            data: form.section(section).clone(),
        });
    }

    fn persist_draft(&self, user: &UserId, form: &FormData) {
        if let Err(error) = self.drafts.save(&DraftKey::User(user.clone()), form) {
            warn!(%user, %error, "failed to cache draft");
        }
    }
}

/// Local drafts carry unsaved edits; payment always comes from stored records.
fn overlay_draft(stored: FormData, draft: &FormData) -> FormData {
    Section::ALL
        .into_iter()
        .filter(|section| *section != Section::Payment)
        .fold(stored, |form, section| {
            form.with_section(section, draft.section(section).clone())
        })
}

fn lock_session(slot: &SessionSlot) -> MutexGuard<'_, WizardSession> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn session_missing(user: &UserId) -> RegistrationError {
    RegistrationError::NotFound(format!("registration session for {user}"))
}
