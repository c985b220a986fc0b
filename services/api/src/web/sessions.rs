//! services/api/src/web/sessions.rs
//!
//! Handlers for booking requests, tutor decisions, conflict checks and the session
//! dashboards of both parties.

use crate::error::{ApiError, ApiResult};
use crate::web::actor::{ensure_owner, Actor};
use crate::web::rest::{
    clock, parse_date, parse_status_filter, parse_time, required, required_text,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use tuteskillz_core::conflict::{find_conflict, Booking, Interval, Party, SESSION_DURATION_MINUTES};
use tuteskillz_core::domain::{
    Id, NewSession, Payment, Role, Session, SessionSummary, TutorDecision, TutorSubjectInfo,
};
use tuteskillz_core::ports::{DecisionOutcome, RequestOutcome};
use utoipa::{IntoParams, ToSchema};

const STUDENT_CONFLICT_MESSAGE: &str = "You already have a session at this time on the same date.";
const TUTOR_CONFLICT_MESSAGE: &str = "You already have an accepted session at this time.";

//=========================================================================================
// API Payload Structs
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestBody {
    pub tutor_subject_id: Option<Id>,
    pub student_id: Option<Id>,
    /// Calendar day, `YYYY-MM-DD`.
    pub date: Option<String>,
    /// Time of day, `HH:MM` or `HH:MM:SS`.
    pub start_time: Option<String>,
    /// Minutes. Must be 120.
    pub duration: Option<i32>,
    pub student_note: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateBody {
    /// `Accepted` or `Declined`.
    pub status: Option<String>,
    pub tutor_note: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusFilter {
    /// Only return sessions in this status.
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ConflictQuery {
    pub date: Option<String>,
    pub start_time: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingDto {
    pub session_id: Id,
    pub date: String,
    pub start_time: String,
    pub duration: i32,
    pub session_status: String,
}

impl From<&Booking> for BookingDto {
    fn from(booking: &Booking) -> Self {
        Self {
            session_id: booking.session_id,
            date: booking.date.to_string(),
            start_time: clock(booking.start_time),
            duration: booking.duration_minutes,
            session_status: booking.status.to_string(),
        }
    }
}

/// Returned with status 200 whenever a proposed slot overlaps an existing booking.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResponse {
    pub success: bool,
    pub conflict: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicting_session: Option<BookingDto>,
}

impl ConflictResponse {
    fn none() -> Self {
        Self {
            success: true,
            conflict: false,
            message: None,
            conflicting_session: None,
        }
    }

    fn found(success: bool, message: &str, booking: &Booking) -> Self {
        Self {
            success,
            conflict: true,
            message: Some(message.to_string()),
            conflicting_session: Some(BookingDto::from(booking)),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreatedResponse {
    pub success: bool,
    pub message: String,
    pub session_id: Id,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub session_id: Id,
    pub tutor_subject_id: Id,
    pub student_id: Id,
    pub date: String,
    pub start_time: String,
    pub duration: i32,
    pub session_status: String,
    pub student_note: Option<String>,
    pub tutor_note: Option<String>,
    pub meeting_url: Option<String>,
    pub verification_id: Option<Id>,
}

impl From<&Session> for SessionDto {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id,
            tutor_subject_id: session.tutor_subject_id,
            student_id: session.student_id,
            date: session.date.to_string(),
            start_time: clock(session.start_time),
            duration: session.duration_minutes,
            session_status: session.status.to_string(),
            student_note: session.student_note.clone(),
            tutor_note: session.tutor_note.clone(),
            meeting_url: session.meeting_url.clone(),
            verification_id: session.verification_id,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummaryDto {
    #[serde(flatten)]
    pub session: SessionDto,
    pub tutor_id: Id,
    pub tutor_name: String,
    pub student_name: String,
    pub subject_name: String,
    pub grade: String,
    pub teaching_medium: String,
    pub verification_status: Option<String>,
    pub verified_notes: Option<String>,
    pub verified_by_admin_id: Option<Id>,
    pub verified_at: Option<String>,
}

impl From<&SessionSummary> for SessionSummaryDto {
    fn from(summary: &SessionSummary) -> Self {
        let verification = summary.verification.as_ref();
        Self {
            session: SessionDto::from(&summary.session),
            tutor_id: summary.tutor_id,
            tutor_name: summary.tutor_name.clone(),
            student_name: summary.student_name.clone(),
            subject_name: summary.subject_name.clone(),
            grade: summary.grade.clone(),
            teaching_medium: summary.teaching_medium.clone(),
            verification_status: verification.map(|v| v.status.as_str().to_string()),
            verified_notes: verification.map(|v| v.verified_notes.clone()),
            verified_by_admin_id: verification.map(|v| v.verified_by_admin_id),
            verified_at: verification.map(|v| v.verified_at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionListResponse {
    pub success: bool,
    pub data: Vec<SessionSummaryDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionDetailResponse {
    pub success: bool,
    pub data: SessionSummaryDto,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStateResponse {
    pub success: bool,
    pub message: String,
    pub data: SessionDto,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorSubjectInfoDto {
    pub tutor_subject_id: Id,
    pub grade: String,
    pub teaching_medium: String,
    pub subject_id: Id,
    pub subject_name: String,
    pub tutor_id: Id,
    pub tutor_name: String,
}

impl From<TutorSubjectInfo> for TutorSubjectInfoDto {
    fn from(info: TutorSubjectInfo) -> Self {
        Self {
            tutor_subject_id: info.tutor_subject_id,
            grade: info.grade,
            teaching_medium: info.teaching_medium,
            subject_id: info.subject_id,
            subject_name: info.subject_name,
            tutor_id: info.tutor_id,
            tutor_name: info.tutor_name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TutorSubjectInfoResponse {
    pub success: bool,
    pub data: TutorSubjectInfoDto,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDto {
    pub payment_id: Id,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub payment_status: String,
    pub payment_method: Option<String>,
    pub provider: String,
    pub transaction_id: Option<String>,
    pub created_at: String,
}

impl From<&Payment> for PaymentDto {
    fn from(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            payment_status: payment.status.as_str().to_string(),
            payment_method: payment.method.clone(),
            provider: payment.provider.clone(),
            transaction_id: payment.transaction_id.clone(),
            created_at: payment.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentListResponse {
    pub success: bool,
    pub data: Vec<PaymentDto>,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Only the student and the tutor of a session (or an admin) may act on it.
pub(crate) fn ensure_participant(actor: Option<Actor>, summary: &SessionSummary) -> ApiResult<()> {
    ensure_owner(actor, Role::Student, summary.session.student_id)?;
    ensure_owner(actor, Role::Tutor, summary.tutor_id)
}

async fn check_conflict(
    state: &AppState,
    party: Party,
    query: ConflictQuery,
    missing_message: &str,
    conflict_message: &str,
) -> ApiResult<ConflictResponse> {
    let date = parse_date(&required_text(query.date, missing_message)?)?;
    let start = parse_time(&required_text(query.start_time, missing_message)?)?;

    let existing = state.store.blocking_bookings(party, date).await?;
    Ok(match find_conflict(date, Interval::proposed(start), &existing) {
        Some(hit) => ConflictResponse::found(true, conflict_message, hit),
        None => ConflictResponse::none(),
    })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Request a new session with a tutor.
///
/// Runs the student's conflict check and the insert as one unit. An overlap is reported
/// with status 200 and `conflict: true`.
#[utoipa::path(
    post,
    path = "/api/session/request",
    request_body = SessionRequestBody,
    responses(
        (status = 200, description = "Session requested", body = SessionCreatedResponse),
        (status = 200, description = "Slot overlaps an existing booking", body = ConflictResponse),
        (status = 400, description = "Missing or malformed fields"),
        (status = 404, description = "Unknown tutor subject or student")
    )
)]
pub async fn request_session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SessionRequestBody>,
) -> ApiResult<Response> {
    const MISSING: &str = "All required fields must be provided";
    let tutor_subject_id = required(body.tutor_subject_id, MISSING)?;
    let student_id = required(body.student_id, MISSING)?;
    let date = parse_date(&required_text(body.date, MISSING)?)?;
    let start_time = parse_time(&required_text(body.start_time, MISSING)?)?;
    let duration = required(body.duration, MISSING)?;
    if duration != SESSION_DURATION_MINUTES {
        return Err(ApiError::bad_request(format!(
            "Sessions last {SESSION_DURATION_MINUTES} minutes"
        )));
    }
    ensure_owner(Actor::from_headers(&headers)?, Role::Student, student_id)?;

    let outcome = state
        .store
        .request_session(NewSession {
            tutor_subject_id,
            student_id,
            date,
            start_time,
            duration_minutes: duration,
            student_note: body.student_note.filter(|note| !note.trim().is_empty()),
        })
        .await?;

    Ok(match outcome {
        RequestOutcome::Created(session_id) => {
            info!(session_id, student_id, "Session requested");
            Json(SessionCreatedResponse {
                success: true,
                message: "Session requested successfully".to_string(),
                session_id,
            })
            .into_response()
        }
        RequestOutcome::Conflict(hit) => {
            Json(ConflictResponse::found(false, STUDENT_CONFLICT_MESSAGE, &hit)).into_response()
        }
    })
}

/// Accept or decline a requested session.
#[utoipa::path(
    put,
    path = "/api/session/{session_id}/status",
    request_body = StatusUpdateBody,
    params(("session_id" = i64, Path, description = "Session to decide")),
    responses(
        (status = 200, description = "Session updated", body = SessionStateResponse),
        (status = 200, description = "Accepting would double-book the tutor", body = ConflictResponse),
        (status = 400, description = "Invalid status or the session is no longer requested"),
        (status = 403, description = "Session belongs to another tutor"),
        (status = 404, description = "Session not found")
    )
)]
pub async fn update_status_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Id>,
    Json(body): Json<StatusUpdateBody>,
) -> ApiResult<Response> {
    let decision = body
        .status
        .as_deref()
        .and_then(|s| s.parse::<TutorDecision>().ok())
        .ok_or_else(|| ApiError::bad_request("Invalid status"))?;

    if let Some(actor) = Actor::from_headers(&headers)? {
        if actor.role == Role::Student {
            return Err(ApiError::Forbidden("Only the tutor may decide a request".to_string()));
        }
        let summary = state.store.get_session_detail(session_id).await?;
        ensure_owner(Some(actor), Role::Tutor, summary.tutor_id)?;
    }

    let tutor_note = body.tutor_note.filter(|note| !note.trim().is_empty());
    let outcome = state
        .store
        .decide_session(session_id, decision, tutor_note)
        .await?;

    Ok(match outcome {
        DecisionOutcome::Updated(session) => {
            info!(session_id, status = %session.status, "Session decided");
            Json(SessionStateResponse {
                success: true,
                message: format!(
                    "Session {} successfully",
                    session.status.as_str().to_lowercase()
                ),
                data: SessionDto::from(&session),
            })
            .into_response()
        }
        DecisionOutcome::Conflict(hit) => {
            Json(ConflictResponse::found(false, TUTOR_CONFLICT_MESSAGE, &hit)).into_response()
        }
    })
}

/// Mark a paid session as completed.
#[utoipa::path(
    post,
    path = "/api/session/{session_id}/complete",
    params(("session_id" = i64, Path, description = "Session to complete")),
    responses(
        (status = 200, description = "Session completed", body = SessionStateResponse),
        (status = 400, description = "Session is not paid"),
        (status = 404, description = "Session not found")
    )
)]
pub async fn complete_session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Id>,
) -> ApiResult<Json<SessionStateResponse>> {
    let summary = state.store.get_session_detail(session_id).await?;
    ensure_participant(Actor::from_headers(&headers)?, &summary)?;

    let session = state.store.complete_session(session_id).await?;
    info!(session_id, "Session completed");
    Ok(Json(SessionStateResponse {
        success: true,
        message: "Session completed successfully".to_string(),
        data: SessionDto::from(&session),
    }))
}

/// Cancel an accepted, submitted or paid session.
#[utoipa::path(
    post,
    path = "/api/session/{session_id}/cancel",
    params(("session_id" = i64, Path, description = "Session to cancel")),
    responses(
        (status = 200, description = "Session cancelled", body = SessionStateResponse),
        (status = 400, description = "Session cannot be cancelled from its current state"),
        (status = 404, description = "Session not found")
    )
)]
pub async fn cancel_session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Id>,
) -> ApiResult<Json<SessionStateResponse>> {
    let summary = state.store.get_session_detail(session_id).await?;
    ensure_participant(Actor::from_headers(&headers)?, &summary)?;

    let session = state.store.cancel_session(session_id).await?;
    info!(session_id, "Session cancelled");
    Ok(Json(SessionStateResponse {
        success: true,
        message: "Session cancelled successfully".to_string(),
        data: SessionDto::from(&session),
    }))
}

/// Fetch one session with its tutor, student and subject.
#[utoipa::path(
    get,
    path = "/api/session/{session_id}",
    params(("session_id" = i64, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session found", body = SessionDetailResponse),
        (status = 404, description = "Session not found")
    )
)]
pub async fn get_session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Id>,
) -> ApiResult<Json<SessionDetailResponse>> {
    let summary = state.store.get_session_detail(session_id).await?;
    ensure_participant(Actor::from_headers(&headers)?, &summary)?;
    Ok(Json(SessionDetailResponse {
        success: true,
        data: SessionSummaryDto::from(&summary),
    }))
}

/// The payment log of a session, oldest first.
#[utoipa::path(
    get,
    path = "/api/session/{session_id}/payments",
    params(("session_id" = i64, Path, description = "Session id")),
    responses(
        (status = 200, description = "Payments recorded for the session", body = PaymentListResponse),
        (status = 404, description = "Session not found")
    )
)]
pub async fn session_payments_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Id>,
) -> ApiResult<Json<PaymentListResponse>> {
    let summary = state.store.get_session_detail(session_id).await?;
    ensure_participant(Actor::from_headers(&headers)?, &summary)?;
    let payments = state.store.payments_for_session(session_id).await?;
    Ok(Json(PaymentListResponse {
        success: true,
        data: payments.iter().map(PaymentDto::from).collect(),
    }))
}

/// Describe the offering a student is about to book.
#[utoipa::path(
    get,
    path = "/api/session/tutor-info/{tutor_subject_id}",
    params(("tutor_subject_id" = i64, Path, description = "Tutor subject offering")),
    responses(
        (status = 200, description = "Offering found", body = TutorSubjectInfoResponse),
        (status = 404, description = "Tutor not found")
    )
)]
pub async fn tutor_info_handler(
    State(state): State<Arc<AppState>>,
    Path(tutor_subject_id): Path<Id>,
) -> ApiResult<Json<TutorSubjectInfoResponse>> {
    let info = state.store.get_tutor_subject_info(tutor_subject_id).await?;
    Ok(Json(TutorSubjectInfoResponse {
        success: true,
        data: TutorSubjectInfoDto::from(info),
    }))
}

/// List a tutor's sessions, earliest first.
#[utoipa::path(
    get,
    path = "/api/session/tutor/{tutor_id}/sessions",
    params(("tutor_id" = i64, Path, description = "Tutor user id"), StatusFilter),
    responses(
        (status = 200, description = "Sessions of the tutor", body = SessionListResponse),
        (status = 400, description = "Unknown status filter"),
        (status = 403, description = "Another tutor's sessions")
    )
)]
pub async fn tutor_sessions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(tutor_id): Path<Id>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Json<SessionListResponse>> {
    ensure_owner(Actor::from_headers(&headers)?, Role::Tutor, tutor_id)?;
    let status = parse_status_filter(filter.status)?;
    let sessions = state
        .store
        .list_sessions_for(Party::Tutor(tutor_id), status)
        .await?;
    Ok(Json(SessionListResponse {
        success: true,
        data: sessions.iter().map(SessionSummaryDto::from).collect(),
    }))
}

/// List a student's sessions, earliest first.
#[utoipa::path(
    get,
    path = "/api/session/student/{student_id}/sessions",
    params(("student_id" = i64, Path, description = "Student user id"), StatusFilter),
    responses(
        (status = 200, description = "Sessions of the student", body = SessionListResponse),
        (status = 400, description = "Unknown status filter"),
        (status = 403, description = "Another student's sessions")
    )
)]
pub async fn student_sessions_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(student_id): Path<Id>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Json<SessionListResponse>> {
    ensure_owner(Actor::from_headers(&headers)?, Role::Student, student_id)?;
    let status = parse_status_filter(filter.status)?;
    let sessions = state
        .store
        .list_sessions_for(Party::Student(student_id), status)
        .await?;
    Ok(Json(SessionListResponse {
        success: true,
        data: sessions.iter().map(SessionSummaryDto::from).collect(),
    }))
}

/// Check whether a two-hour slot is free on the student's calendar.
#[utoipa::path(
    get,
    path = "/api/session/student/{student_id}/check-conflict",
    params(("student_id" = i64, Path, description = "Student user id"), ConflictQuery),
    responses(
        (status = 200, description = "Conflict verdict", body = ConflictResponse),
        (status = 400, description = "Missing date or start time")
    )
)]
pub async fn student_conflict_handler(
    State(state): State<Arc<AppState>>,
    Path(student_id): Path<Id>,
    Query(query): Query<ConflictQuery>,
) -> ApiResult<Json<ConflictResponse>> {
    let verdict = check_conflict(
        &state,
        Party::Student(student_id),
        query,
        "Missing required fields (studentId, date, startTime)",
        STUDENT_CONFLICT_MESSAGE,
    )
    .await?;
    Ok(Json(verdict))
}

/// Check whether a two-hour slot is free among the tutor's accepted sessions.
#[utoipa::path(
    get,
    path = "/api/session/tutor/{tutor_id}/check-conflict",
    params(("tutor_id" = i64, Path, description = "Tutor user id"), ConflictQuery),
    responses(
        (status = 200, description = "Conflict verdict", body = ConflictResponse),
        (status = 400, description = "Missing date or start time")
    )
)]
pub async fn tutor_conflict_handler(
    State(state): State<Arc<AppState>>,
    Path(tutor_id): Path<Id>,
    Query(query): Query<ConflictQuery>,
) -> ApiResult<Json<ConflictResponse>> {
    let verdict = check_conflict(
        &state,
        Party::Tutor(tutor_id),
        query,
        "Missing required fields (tutorId, date, startTime)",
        TUTOR_CONFLICT_MESSAGE,
    )
    .await?;
    Ok(Json(verdict))
}
