use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::admin::{AdminError, AdminService, ApplicationQuery, CandidateQuery};
use super::domain::{ApplicationId, ApplicationStatus, PostId, UserId};
use super::form::FieldUpdate;
use super::phone::{OtpError, PhoneVerifier, SmsGateway};
use super::progress::NavigationOutcome;
use super::repository::{RegistrationRepository, RepositoryError};
use super::service::{RegistrationError, RegistrationService, StartSession};
use super::steps::StepId;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub step: StepId,
}

#[derive(Debug, Deserialize)]
pub struct EnsureApplicationRequest {
    pub user_id: UserId,
    pub post_id: PostId,
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub phone: String,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerification {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusOverride {
    pub status: String,
}

/// Candidate-facing wizard endpoints.
pub fn registration_router<R>(service: Arc<RegistrationService<R>>) -> Router
where
    R: RegistrationRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/registration/sessions",
            post(start_session_handler::<R>),
        )
        .route(
            "/api/v1/registration/sessions/:user_id",
            get(session_handler::<R>),
        )
        .route(
            "/api/v1/registration/sessions/:user_id/fields",
            patch(update_field_handler::<R>),
        )
        .route(
            "/api/v1/registration/sessions/:user_id/navigate",
            post(navigate_handler::<R>),
        )
        .route(
            "/api/v1/registration/sessions/:user_id/payment",
            post(payment_handler::<R>),
        )
        .route(
            "/api/v1/registration/sessions/:user_id/submit",
            post(submit_handler::<R>),
        )
        .route(
            "/api/v1/registration/applications",
            post(ensure_application_handler::<R>),
        )
        .with_state(service)
}

/// Phone verification endpoints.
pub fn phone_router<G>(verifier: Arc<PhoneVerifier<G>>) -> Router
where
    G: SmsGateway + 'static,
{
    Router::new()
        .route("/api/v1/phone/otp", post(request_otp_handler::<G>))
        .route("/api/v1/phone/otp/verify", post(verify_otp_handler::<G>))
        .with_state(verifier)
}

/// Back-office endpoints.
pub fn admin_router<R>(admin: Arc<AdminService<R>>) -> Router
where
    R: RegistrationRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/admin/applications",
            get(list_applications_handler::<R>),
        )
        .route(
            "/api/v1/admin/applications/export",
            get(export_applications_handler::<R>),
        )
        .route(
            "/api/v1/admin/applications/:application_id/status",
            post(override_status_handler::<R>),
        )
        .route("/api/v1/admin/candidates", get(list_candidates_handler::<R>))
        .route(
            "/api/v1/admin/candidates/export",
            get(export_candidates_handler::<R>),
        )
        .with_state(admin)
}

pub(crate) async fn start_session_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    axum::Json(request): axum::Json<StartSession>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match service.start_session(request) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => registration_error_response(error),
    }
}

pub(crate) async fn session_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(user_id): Path<String>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match service.session(&UserId(user_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => registration_error_response(error),
    }
}

pub(crate) async fn update_field_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(user_id): Path<String>,
    axum::Json(update): axum::Json<FieldUpdate>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match service.update_field(&UserId(user_id), update) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => registration_error_response(error),
    }
}

pub(crate) async fn navigate_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(user_id): Path<String>,
    axum::Json(request): axum::Json<NavigateRequest>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match service.navigate(&UserId(user_id), request.step) {
        Ok(outcome @ NavigationOutcome::Rejected(_)) => {
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(outcome)).into_response()
        }
        Ok(outcome) => (StatusCode::OK, axum::Json(outcome)).into_response(),
        Err(error) => registration_error_response(error),
    }
}

pub(crate) async fn payment_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(user_id): Path<String>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match service.settle_payment(&UserId(user_id)) {
        Ok(payment) => (StatusCode::OK, axum::Json(payment)).into_response(),
        Err(error) => registration_error_response(error),
    }
}

pub(crate) async fn submit_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    Path(user_id): Path<String>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match service.submit(&UserId(user_id)) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => registration_error_response(error),
    }
}

pub(crate) async fn ensure_application_handler<R>(
    State(service): State<Arc<RegistrationService<R>>>,
    axum::Json(request): axum::Json<EnsureApplicationRequest>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match service.ensure_application(&request.user_id, &request.post_id) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => registration_error_response(error),
    }
}

pub(crate) async fn request_otp_handler<G>(
    State(verifier): State<Arc<PhoneVerifier<G>>>,
    axum::Json(request): axum::Json<OtpRequest>,
) -> Response
where
    G: SmsGateway + 'static,
{
    match verifier.request(&request.phone) {
        Ok(dispatch) => (StatusCode::ACCEPTED, axum::Json(dispatch)).into_response(),
        Err(error) => otp_error_response(error),
    }
}

pub(crate) async fn verify_otp_handler<G>(
    State(verifier): State<Arc<PhoneVerifier<G>>>,
    axum::Json(request): axum::Json<OtpVerification>,
) -> Response
where
    G: SmsGateway + 'static,
{
    match verifier.verify(&request.phone, &request.code) {
        Ok(()) => (StatusCode::OK, axum::Json(json!({ "verified": true }))).into_response(),
        Err(error) => otp_error_response(error),
    }
}

pub(crate) async fn list_applications_handler<R>(
    State(admin): State<Arc<AdminService<R>>>,
    Query(query): Query<ApplicationQuery>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match admin.list_applications(&query) {
        Ok(page) => (StatusCode::OK, axum::Json(page)).into_response(),
        Err(error) => admin_error_response(error),
    }
}

pub(crate) async fn export_applications_handler<R>(
    State(admin): State<Arc<AdminService<R>>>,
    Query(query): Query<ApplicationQuery>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match admin.export_applications(&query) {
        Ok(body) => csv_response("applications_export.csv", body),
        Err(error) => admin_error_response(error),
    }
}

pub(crate) async fn override_status_handler<R>(
    State(admin): State<Arc<AdminService<R>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<StatusOverride>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    let Some(status) = ApplicationStatus::parse(&request.status) else {
        return admin_error_response(AdminError::UnknownStatus(request.status));
    };

    match admin.update_status(&ApplicationId(application_id), status) {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => admin_error_response(error),
    }
}

pub(crate) async fn list_candidates_handler<R>(
    State(admin): State<Arc<AdminService<R>>>,
    Query(query): Query<CandidateQuery>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match admin.list_candidates(&query) {
        Ok(page) => (StatusCode::OK, axum::Json(page)).into_response(),
        Err(error) => admin_error_response(error),
    }
}

pub(crate) async fn export_candidates_handler<R>(
    State(admin): State<Arc<AdminService<R>>>,
    Query(query): Query<CandidateQuery>,
) -> Response
where
    R: RegistrationRepository + 'static,
{
    match admin.export_candidates(&query) {
        Ok(body) => csv_response("candidates_export.csv", body),
        Err(error) => admin_error_response(error),
    }
}

fn csv_response(filename: &str, body: String) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}

fn error_body(status: StatusCode, message: String) -> Response {
    let payload = json!({
        "error": message,
    });
    (status, axum::Json(payload)).into_response()
}

fn registration_error_response(error: RegistrationError) -> Response {
    match error {
        RegistrationError::ValidationIncomplete { step, reason } => {
            let payload = json!({
                "error": reason,
                "step": step,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        RegistrationError::Persistence(RepositoryError::Conflict) => {
            error_body(StatusCode::CONFLICT, "application already exists".to_string())
        }
        other => AppError::from(other).into_response(),
    }
}

fn otp_error_response(error: OtpError) -> Response {
    let status = match error {
        OtpError::InvalidPhone(_)
        | OtpError::Mismatch
        | OtpError::AlreadyUsed
        | OtpError::Expired => StatusCode::UNPROCESSABLE_ENTITY,
        OtpError::NotRequested => StatusCode::NOT_FOUND,
        OtpError::RateLimited | OtpError::AttemptsExhausted => StatusCode::TOO_MANY_REQUESTS,
        OtpError::Sms(_) => StatusCode::BAD_GATEWAY,
    };
    error_body(status, error.to_string())
}

fn admin_error_response(error: AdminError) -> Response {
    let status = match error {
        AdminError::UnknownStatus(_) => StatusCode::BAD_REQUEST,
        AdminError::UnsupportedStatus(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AdminError::NotFound(_) => StatusCode::NOT_FOUND,
        AdminError::Repository(_) | AdminError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_body(status, error.to_string())
}
