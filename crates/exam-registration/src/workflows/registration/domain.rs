use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authenticated candidate identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier of the advertised post (exam) an application targets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PostId(pub String);

/// Identifier wrapper for stored applications.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Independently persisted grouping of wizard fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    PersonalInfo,
    OtherDetails,
    Education,
    DistrictPreferences,
    ExperienceRows,
    Documents,
    Payment,
    Review,
}

impl Section {
    pub const ALL: [Section; 8] = [
        Section::PersonalInfo,
        Section::OtherDetails,
        Section::Education,
        Section::DistrictPreferences,
        Section::ExperienceRows,
        Section::Documents,
        Section::Payment,
        Section::Review,
    ];

    /// Top-level key of the section inside the form tree.
    pub const fn key(self) -> &'static str {
        match self {
            Section::PersonalInfo => "personalInfo",
            Section::OtherDetails => "otherDetails",
            Section::Education => "education",
            Section::DistrictPreferences => "districtPreferences",
            Section::ExperienceRows => "experienceRows",
            Section::Documents => "documents",
            Section::Payment => "payment",
            Section::Review => "review",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|section| section.key() == key)
    }

    /// List sections are replaced wholesale when saved.
    pub const fn is_list(self) -> bool {
        matches!(
            self,
            Section::Education
                | Section::DistrictPreferences
                | Section::ExperienceRows
                | Section::Documents
        )
    }
}

/// Lifecycle of an application row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    Submitted,
    PaymentPending,
    PaymentCompleted,
    DocumentPending,
    Completed,
    Rejected,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::PaymentPending => "payment_pending",
            ApplicationStatus::PaymentCompleted => "payment_completed",
            ApplicationStatus::DocumentPending => "document_pending",
            ApplicationStatus::Completed => "completed",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "submitted" => Some(Self::Submitted),
            "payment_pending" => Some(Self::PaymentPending),
            "payment_completed" => Some(Self::PaymentCompleted),
            "document_pending" => Some(Self::DocumentPending),
            "completed" => Some(Self::Completed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    const fn rank(self) -> u8 {
        match self {
            ApplicationStatus::Draft => 0,
            ApplicationStatus::PaymentPending => 1,
            ApplicationStatus::PaymentCompleted => 2,
            ApplicationStatus::DocumentPending => 3,
            ApplicationStatus::Submitted => 4,
            ApplicationStatus::Completed | ApplicationStatus::Rejected => 5,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ApplicationStatus::Completed | ApplicationStatus::Rejected)
    }

    /// Candidate-driven transitions only move forward.
    pub const fn can_advance_to(self, next: ApplicationStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row per (user, post) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub user_id: UserId,
    pub post_id: PostId,
    pub application_number: String,
    pub status: ApplicationStatus,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

/// Fee payment attempt; the most recent by `created_at` is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub application_id: ApplicationId,
    pub amount: u32,
    pub status: PaymentStatus,
    pub method: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Reservation category declared in other details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    General,
    Obc,
    Sc,
    St,
    Ews,
}

impl Category {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "general" | "gen" | "ur" => Some(Self::General),
            "obc" | "bc" => Some(Self::Obc),
            "sc" => Some(Self::Sc),
            "st" => Some(Self::St),
            "ews" => Some(Self::Ews),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Category::General => "general",
            Category::Obc => "obc",
            Category::Sc => "sc",
            Category::St => "st",
            Category::Ews => "ews",
        }
    }

    pub const fn is_fee_exempt(self) -> bool {
        matches!(self, Category::Sc | Category::St)
    }
}

/// Registered candidate as shown in the admin back-office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub user_id: UserId,
    pub full_name: String,
    pub email: String,
    pub mobile: String,
    pub category: Option<Category>,
    pub registered_at: DateTime<Utc>,
}
