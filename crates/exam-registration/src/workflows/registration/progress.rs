use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use super::completion::{self, CompletionStatus};
use super::form::FormData;
use super::steps::{StepId, StepRegistry};

/// Result of a navigation request. Rejections are ordinary outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NavigationOutcome {
    Moved {
        from: StepId,
        to: StepId,
        /// Step that was just left going forward and should now be saved.
        completed: Option<StepId>,
    },
    Stayed {
        step: StepId,
    },
    Rejected(Blocked),
}

/// Why a forward transition or submission was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blocked {
    pub step: StepId,
    pub status: CompletionStatus,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("step {0} does not exist")]
    UnknownStep(StepId),
}

/// Owns the current-step pointer and the terminal submitted state.
#[derive(Debug, Clone)]
pub struct WizardProgress {
    registry: Arc<StepRegistry>,
    current: StepId,
    completed: BTreeSet<StepId>,
    submitted: bool,
}

impl WizardProgress {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        let current = registry.first();
        Self {
            registry,
            current,
            completed: BTreeSet::new(),
            submitted: false,
        }
    }

    /// Restores a session from the steps already persisted for the candidate.
    pub fn resumed(
        registry: Arc<StepRegistry>,
        completed: BTreeSet<StepId>,
        payment_completed: bool,
    ) -> Self {
        let current = resume_step(&registry, &completed, payment_completed);
        Self {
            registry,
            current,
            completed,
            submitted: false,
        }
    }

    pub fn current(&self) -> StepId {
        self.current
    }

    pub fn completed_steps(&self) -> &BTreeSet<StepId> {
        &self.completed
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn go_to(
        &mut self,
        target: StepId,
        form: &FormData,
    ) -> Result<NavigationOutcome, NavigationError> {
        if self.registry.get(target).is_none() {
            return Err(NavigationError::UnknownStep(target));
        }

        if self.submitted {
            return Ok(NavigationOutcome::Rejected(Blocked {
                step: self.current,
                status: CompletionStatus::Complete,
                reason: "application already submitted".to_string(),
            }));
        }

        if target == self.current {
            return Ok(NavigationOutcome::Stayed { step: target });
        }

        let from = self.current;
        if target < from {
            self.current = target;
            return Ok(NavigationOutcome::Moved {
                from,
                to: target,
                completed: None,
            });
        }

        if let Some(blocked) = self.first_blocker(from, target, form) {
            return Ok(NavigationOutcome::Rejected(blocked));
        }

        self.completed.insert(from);
        self.completed
            .extend(self.registry.between(from, target).map(|step| step.id));
        self.current = target;

        Ok(NavigationOutcome::Moved {
            from,
            to: target,
            completed: Some(from),
        })
    }

    /// Enters the terminal state from the review step once every step is complete.
    pub fn submit(&mut self, form: &FormData) -> Result<(), Blocked> {
        let review = self.registry.review_step();
        if self.submitted {
            return Err(Blocked {
                step: self.current,
                status: CompletionStatus::Complete,
                reason: "application already submitted".to_string(),
            });
        }
        if self.current != review {
            return Err(Blocked {
                step: self.current,
                status: self.status_of(self.current, form),
                reason: format!("submission is only available from step {review}"),
            });
        }

        for step in self.registry.steps() {
            let status = completion::status(step, form);
            if !status.is_complete() {
                return Err(Blocked {
                    step: step.id,
                    status,
                    reason: format!("complete step {} ({}) first", step.id, step.title),
                });
            }
        }

        self.completed.insert(review);
        self.submitted = true;
        Ok(())
    }

    /// Undoes `submit` when the final status write could not be persisted.
    pub fn revert_submission(&mut self) {
        self.submitted = false;
    }

    pub fn mark_submitted(&mut self) {
        self.submitted = true;
        self.current = self.registry.review_step();
    }

    pub fn status_of(&self, step: StepId, form: &FormData) -> CompletionStatus {
        self.registry
            .get(step)
            .map(|step| completion::status(step, form))
            .unwrap_or(CompletionStatus::Empty)
    }

    fn first_blocker(&self, from: StepId, target: StepId, form: &FormData) -> Option<Blocked> {
        let current_status = self.status_of(from, form);
        if !current_status.is_complete() {
            return Some(Blocked {
                step: from,
                status: current_status,
                reason: "complete the current step first".to_string(),
            });
        }

        self.registry.between(from, target).find_map(|step| {
            let status = completion::status(step, form);
            (!status.is_complete()).then(|| Blocked {
                step: step.id,
                status,
                reason: format!("complete step {} ({}) first", step.id, step.title),
            })
        })
    }
}

/// `max(completed) + 1`, held at the payment step until payment is settled.
pub fn resume_step(
    registry: &StepRegistry,
    completed: &BTreeSet<StepId>,
    payment_completed: bool,
) -> StepId {
    let next = completed
        .iter()
        .next_back()
        .map(|step| StepId(step.0.saturating_add(1)))
        .unwrap_or_else(|| registry.first());

    let ceiling = if payment_completed {
        registry.last()
    } else {
        registry.payment_step()
    };

    next.min(ceiling).max(registry.first())
}
