use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::Section;
use super::form::FieldPath;

/// One-based position of a wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub u8);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Document kinds the candidate uploads in the documents step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Photo,
    Signature,
    CasteCertificate,
    DisabilityCertificate,
    ExperienceCertificate,
}

impl DocumentKind {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentKind::Photo => "photo",
            DocumentKind::Signature => "signature",
            DocumentKind::CasteCertificate => "caste_certificate",
            DocumentKind::DisabilityCertificate => "disability_certificate",
            DocumentKind::ExperienceCertificate => "experience_certificate",
        }
    }
}

/// Rule deciding how much of a step has been filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRequirement {
    Fields(Vec<FieldPath>),
    EducationAndPreferences {
        min_preferences: usize,
        preference_slots: usize,
    },
    Documents(Vec<DocumentKind>),
    PaymentSettled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: StepId,
    pub key: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub requirement: StepRequirement,
    /// Sections written to the backing store when the candidate leaves the step.
    pub sections: Vec<Section>,
}

/// Ordered, immutable list of wizard steps.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    steps: Vec<Step>,
}

pub const DISTRICT_PREFERENCE_SLOTS: usize = 24;
pub const MIN_DISTRICT_PREFERENCES: usize = 5;

impl StepRegistry {
    pub fn standard() -> Self {
        Self {
            steps: standard_steps(),
        }
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn first(&self) -> StepId {
        self.steps.first().map(|step| step.id).unwrap_or(StepId(1))
    }

    pub fn last(&self) -> StepId {
        self.steps.last().map(|step| step.id).unwrap_or(StepId(1))
    }

    pub fn payment_step(&self) -> StepId {
        self.steps
            .iter()
            .find(|step| step.requirement == StepRequirement::PaymentSettled)
            .map(|step| step.id)
            .unwrap_or_else(|| self.last())
    }

    pub fn review_step(&self) -> StepId {
        self.last()
    }

    /// Steps strictly between `from` and `to`, in order.
    pub fn between(&self, from: StepId, to: StepId) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(move |step| step.id > from && step.id < to)
    }
}

fn fields(paths: &[&str]) -> StepRequirement {
    StepRequirement::Fields(
        paths
            .iter()
            .map(|raw| FieldPath::from_dotted(raw))
            .collect(),
    )
}

fn standard_steps() -> Vec<Step> {
    vec![
        Step {
            id: StepId(1),
            key: "personal_info",
            title: "Personal Info",
            description: "Basic details",
            requirement: fields(&[
                "personalInfo.firstName",
                "personalInfo.lastName",
                "personalInfo.mobile",
                "personalInfo.email",
                "personalInfo.dateOfBirth",
            ]),
            sections: vec![Section::PersonalInfo],
        },
        Step {
            id: StepId(2),
            key: "other_details",
            title: "Other Details",
            description: "Category and reservation claims",
            requirement: fields(&["otherDetails.category"]),
            sections: vec![Section::OtherDetails],
        },
        Step {
            id: StepId(3),
            key: "education",
            title: "Education & Preferences",
            description: "Qualifications and district preferences",
            requirement: StepRequirement::EducationAndPreferences {
                min_preferences: MIN_DISTRICT_PREFERENCES,
                preference_slots: DISTRICT_PREFERENCE_SLOTS,
            },
            sections: vec![Section::Education, Section::DistrictPreferences],
        },
        Step {
            id: StepId(4),
            key: "experience",
            title: "Experience",
            description: "Work history",
            requirement: fields(&["experienceRows.0.designation"]),
            sections: vec![Section::ExperienceRows],
        },
        Step {
            id: StepId(5),
            key: "documents",
            title: "Documents",
            description: "Photo and signature upload",
            requirement: StepRequirement::Documents(vec![
                DocumentKind::Photo,
                DocumentKind::Signature,
            ]),
            sections: vec![Section::Documents],
        },
        Step {
            id: StepId(6),
            key: "payment",
            title: "Payment",
            description: "Application fee",
            requirement: StepRequirement::PaymentSettled,
            sections: vec![Section::Payment],
        },
        Step {
            id: StepId(7),
            key: "review",
            title: "Final Review",
            description: "Declaration and submission",
            requirement: fields(&["review.declarationAccepted"]),
            sections: vec![Section::Review],
        },
    ]
}
