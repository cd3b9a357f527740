use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::Section;
use super::form::{is_filled, FormData};
use super::steps::{DocumentKind, Step, StepRequirement};

/// Derived data-entry progress of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Empty,
    Partial,
    Complete,
}

impl CompletionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CompletionStatus::Empty => "empty",
            CompletionStatus::Partial => "partial",
            CompletionStatus::Complete => "complete",
        }
    }

    pub const fn is_complete(self) -> bool {
        matches!(self, CompletionStatus::Complete)
    }

    fn from_counts(filled: usize, required: usize) -> Self {
        if filled >= required {
            CompletionStatus::Complete
        } else if filled == 0 {
            CompletionStatus::Empty
        } else {
            CompletionStatus::Partial
        }
    }
}

/// Classifies how much of `step` the candidate has filled in.
pub fn status(step: &Step, form: &FormData) -> CompletionStatus {
    match &step.requirement {
        StepRequirement::Fields(paths) => {
            let filled = paths.iter().filter(|path| form.is_filled(path)).count();
            CompletionStatus::from_counts(filled, paths.len())
        }
        StepRequirement::EducationAndPreferences {
            min_preferences,
            preference_slots,
        } => education_status(form, *min_preferences, *preference_slots),
        StepRequirement::Documents(kinds) => {
            let filled = kinds
                .iter()
                .filter(|kind| has_document(form, **kind))
                .count();
            CompletionStatus::from_counts(filled, kinds.len())
        }
        StepRequirement::PaymentSettled => payment_status(form),
    }
}

const EDUCATION_KEYS: [&str; 3] = ["school", "board", "year"];

fn education_status(
    form: &FormData,
    min_preferences: usize,
    preference_slots: usize,
) -> CompletionStatus {
    let entries: &[Value] = form
        .section(Section::Education)
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default();

    let entries_with_data = entries
        .iter()
        .filter(|entry| EDUCATION_KEYS.iter().any(|key| entry_filled(entry, key)))
        .count();

    let preferences = form
        .section(Section::DistrictPreferences)
        .as_array()
        .map(|slots| {
            slots
                .iter()
                .take(preference_slots)
                .filter(|slot| is_filled(slot))
                .count()
        })
        .unwrap_or(0);

    if entries_with_data == 0 && preferences == 0 {
        return CompletionStatus::Empty;
    }

    let education_complete = !entries.is_empty()
        && entries
            .iter()
            .all(|entry| EDUCATION_KEYS.iter().all(|key| entry_filled(entry, key)));

    if education_complete && preferences >= min_preferences {
        CompletionStatus::Complete
    } else {
        CompletionStatus::Partial
    }
}

fn entry_filled(entry: &Value, key: &str) -> bool {
    entry.get(key).map(is_filled).unwrap_or(false)
}

fn has_document(form: &FormData, kind: DocumentKind) -> bool {
    form.section(Section::Documents)
        .as_array()
        .map(|documents| {
            documents.iter().any(|document| {
                document.get("documentType").and_then(Value::as_str) == Some(kind.label())
                    && entry_filled(document, "filePath")
            })
        })
        .unwrap_or(false)
}

fn payment_status(form: &FormData) -> CompletionStatus {
    let payment = form.section(Section::Payment);
    if payment.get("status").and_then(Value::as_str) == Some("completed") {
        CompletionStatus::Complete
    } else if is_filled(payment) {
        CompletionStatus::Partial
    } else {
        CompletionStatus::Empty
    }
}
