//! Back-office listings, exports and status overrides.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, CandidateRecord, PaymentStatus, UserId,
};
use super::repository::{RegistrationRepository, RepositoryError};

pub const PAGE_SIZE: usize = 20;

const APPLICATION_HEADERS: [&str; 8] = [
    "Application Number",
    "Candidate Name",
    "Email",
    "Post",
    "Status",
    "Payment Status",
    "Amount",
    "Submitted Date",
];

const CANDIDATE_HEADERS: [&str; 5] = ["Email", "Name", "Mobile", "Category", "Registered Date"];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationQuery {
    pub page: Option<usize>,
    /// Status label, or `all`.
    pub status: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateQuery {
    pub page: Option<usize>,
    pub search: Option<String>,
}

/// Application joined with its candidate and latest payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationRow {
    pub application_id: ApplicationId,
    pub application_number: String,
    pub candidate_name: String,
    pub email: String,
    pub post_id: String,
    pub status: ApplicationStatus,
    pub payment_status: Option<PaymentStatus>,
    pub amount: u32,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    fn slice(rows: Vec<T>, page: Option<usize>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let total = rows.len();
        let items = rows
            .into_iter()
            .skip((page - 1) * PAGE_SIZE)
            .take(PAGE_SIZE)
            .collect();
        Self {
            items,
            page,
            per_page: PAGE_SIZE,
            total,
            total_pages: total.div_ceil(PAGE_SIZE),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("unknown application status '{0}'")]
    UnknownStatus(String),
    #[error("status can only be overridden to completed or rejected, not {0}")]
    UnsupportedStatus(ApplicationStatus),
    #[error("failed to write csv export: {0}")]
    Export(String),
}

impl From<csv::Error> for AdminError {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

pub struct AdminService<R> {
    repository: Arc<R>,
}

impl<R> AdminService<R>
where
    R: RegistrationRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn list_applications(
        &self,
        query: &ApplicationQuery,
    ) -> Result<Page<ApplicationRow>, AdminError> {
        let rows = self.application_rows(query)?;
        Ok(Page::slice(rows, query.page))
    }

    /// Every application matching the filters, ignoring pagination.
    pub fn export_applications(&self, query: &ApplicationQuery) -> Result<String, AdminError> {
        let rows = self.application_rows(query)?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(APPLICATION_HEADERS)?;
        for row in &rows {
            writer.write_record([
                row.application_number.clone(),
                row.candidate_name.clone(),
                row.email.clone(),
                row.post_id.clone(),
                row.status.label().to_string(),
                row.payment_status
                    .map(PaymentStatus::label)
                    .unwrap_or("pending")
                    .to_string(),
                row.amount.to_string(),
                row.submitted_at
                    .unwrap_or(row.created_at)
                    .format("%Y-%m-%d")
                    .to_string(),
            ])?;
        }
        finish(writer)
    }

    /// Admin override; only the two closing statuses are accepted.
    pub fn update_status(
        &self,
        id: &ApplicationId,
        status: ApplicationStatus,
    ) -> Result<ApplicationRecord, AdminError> {
        if !status.is_terminal() {
            return Err(AdminError::UnsupportedStatus(status));
        }

        let mut record = self
            .repository
            .fetch_application(id)?
            .ok_or_else(|| AdminError::NotFound(id.clone()))?;
        let previous = record.status;
        record.status = status;
        record.updated_at = Utc::now();
        self.repository.update_application(record.clone())?;

        info!(application = %id, from = %previous, to = %status, "application status overridden");
        Ok(record)
    }

    pub fn list_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Page<CandidateRecord>, AdminError> {
        let rows = self.candidate_rows(query.search.as_deref())?;
        Ok(Page::slice(rows, query.page))
    }

    pub fn export_candidates(&self, query: &CandidateQuery) -> Result<String, AdminError> {
        let rows = self.candidate_rows(query.search.as_deref())?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CANDIDATE_HEADERS)?;
        for candidate in &rows {
            let registered = candidate.registered_at.format("%Y-%m-%d").to_string();
            writer.write_record([
                candidate.email.as_str(),
                candidate.full_name.as_str(),
                candidate.mobile.as_str(),
                candidate.category.map(|category| category.label()).unwrap_or(""),
                registered.as_str(),
            ])?;
        }
        finish(writer)
    }

    fn application_rows(&self, query: &ApplicationQuery) -> Result<Vec<ApplicationRow>, AdminError> {
        let status = match query.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(
                ApplicationStatus::parse(raw)
                    .ok_or_else(|| AdminError::UnknownStatus(raw.to_string()))?,
            ),
        };
        let needle = search_needle(query.search.as_deref());

        let candidates: HashMap<UserId, CandidateRecord> = self
            .repository
            .candidates()?
            .into_iter()
            .map(|candidate| (candidate.user_id.clone(), candidate))
            .collect();

        let mut applications = self.repository.applications()?;
        applications.retain(|record| status.map_or(true, |wanted| record.status == wanted));
        applications.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let mut rows = Vec::with_capacity(applications.len());
        for record in applications {
            let candidate = candidates.get(&record.user_id);
            let candidate_name = candidate.map(|c| c.full_name.clone()).unwrap_or_default();
            let email = candidate.map(|c| c.email.clone()).unwrap_or_default();

            if let Some(needle) = &needle {
                let matches = [&record.application_number, &candidate_name, &email]
                    .iter()
                    .any(|field| field.to_lowercase().contains(needle));
                if !matches {
                    continue;
                }
            }

            let payment = self.repository.latest_payment(&record.id)?;
            rows.push(ApplicationRow {
                application_id: record.id,
                application_number: record.application_number,
                candidate_name,
                email,
                post_id: record.post_id.0,
                status: record.status,
                payment_status: payment.as_ref().map(|payment| payment.status),
                amount: payment.map(|payment| payment.amount).unwrap_or(0),
                submitted_at: record.submitted_at,
                created_at: record.created_at,
            });
        }

        Ok(rows)
    }

    fn candidate_rows(&self, search: Option<&str>) -> Result<Vec<CandidateRecord>, AdminError> {
        let needle = search_needle(search);
        let mut candidates = self.repository.candidates()?;
        if let Some(needle) = needle {
            candidates.retain(|candidate| {
                candidate.email.to_lowercase().contains(&needle)
                    || candidate.full_name.to_lowercase().contains(&needle)
            });
        }
        candidates.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        Ok(candidates)
    }
}

fn search_needle(search: Option<&str>) -> Option<String> {
    search
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String, AdminError> {
    let bytes = writer
        .into_inner()
        .map_err(|err| AdminError::Export(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| AdminError::Export(err.to_string()))
}
