//! services/api/src/web/admin.rs
//!
//! Handlers for the admin console: overview listings, transcript processing and
//! tutor verification.

use crate::error::{ApiError, ApiResult};
use crate::web::rest::{clock, required, required_text, MessageResponse};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use tuteskillz_core::domain::{ExamResult, ExamType, Id, VerificationStatus};
use tuteskillz_core::ports::Notification;
use tuteskillz_core::transcript::parse_transcript;
use tuteskillz_core::validation::normalise_exam_results;
use utoipa::ToSchema;

//=========================================================================================
// API Payload Structs
//=========================================================================================

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorOverviewDto {
    pub user_id: Id,
    pub full_name: String,
    pub email: String,
    pub verification_id: Option<Id>,
    pub verification_status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TutorOverviewResponse {
    pub success: bool,
    pub tutors: Vec<TutorOverviewDto>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentOverviewDto {
    pub user_id: Id,
    pub full_name: String,
    pub email: String,
    pub guardian_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StudentOverviewResponse {
    pub success: bool,
    pub students: Vec<StudentOverviewDto>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverviewDto {
    pub session_id: Id,
    pub date: String,
    pub start_time: String,
    pub session_status: String,
    pub tutor_name: String,
    pub student_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionOverviewResponse {
    pub success: bool,
    pub sessions: Vec<SessionOverviewDto>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverviewDto {
    pub user_id: Id,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminOverviewResponse {
    pub success: bool,
    pub admins: Vec<AdminOverviewDto>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteOverviewDto {
    pub note_id: Id,
    pub session_id: Id,
    pub session_date: String,
    pub status: String,
    pub tutor_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NoteOverviewResponse {
    pub success: bool,
    pub notes: Vec<NoteOverviewDto>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CountsDto {
    pub tutor_count: i64,
    pub student_count: i64,
    pub admin_count: i64,
    pub session_count: i64,
    pub notes_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CountsResponse {
    pub success: bool,
    pub counts: CountsDto,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptBody {
    pub transcript_text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExamResultDto {
    pub subject: String,
    pub grade: String,
}

impl From<ExamResult> for ExamResultDto {
    fn from(result: ExamResult) -> Self {
        Self {
            subject: result.subject,
            grade: result.grade,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExamResultsBody {
    pub results: Option<Vec<ExamResultDto>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExamResultsResponse {
    pub success: bool,
    pub results: Vec<ExamResultDto>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveBody {
    pub admin_id: Option<Id>,
    pub verified_notes: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RejectBody {
    pub admin_id: Option<Id>,
    pub note: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub success: bool,
    pub message: String,
    pub verification_id: Id,
}

//=========================================================================================
// Listing Handlers
//=========================================================================================

/// Every tutor with the status of their current verification.
#[utoipa::path(
    get,
    path = "/api/admin/allTutors",
    responses((status = 200, description = "All tutors", body = TutorOverviewResponse))
)]
pub async fn all_tutors_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<TutorOverviewResponse>> {
    let tutors = state.store.list_tutors().await?;
    Ok(Json(TutorOverviewResponse {
        success: true,
        tutors: tutors
            .into_iter()
            .map(|t| TutorOverviewDto {
                user_id: t.user_id,
                full_name: t.full_name,
                email: t.email,
                verification_id: t.verification_id,
                verification_status: t.verification_status.map(|s| s.as_str().to_string()),
            })
            .collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/allStudents",
    responses((status = 200, description = "All students", body = StudentOverviewResponse))
)]
pub async fn all_students_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<StudentOverviewResponse>> {
    let students = state.store.list_students().await?;
    Ok(Json(StudentOverviewResponse {
        success: true,
        students: students
            .into_iter()
            .map(|s| StudentOverviewDto {
                user_id: s.user_id,
                full_name: s.full_name,
                email: s.email,
                guardian_name: s.guardian_name,
            })
            .collect(),
    }))
}

/// Every session, newest first.
#[utoipa::path(
    get,
    path = "/api/admin/allSessions",
    responses((status = 200, description = "All sessions", body = SessionOverviewResponse))
)]
pub async fn all_sessions_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SessionOverviewResponse>> {
    let sessions = state.store.list_all_sessions().await?;
    Ok(Json(SessionOverviewResponse {
        success: true,
        sessions: sessions
            .into_iter()
            .map(|s| SessionOverviewDto {
                session_id: s.session_id,
                date: s.date.to_string(),
                start_time: clock(s.start_time),
                session_status: s.status.to_string(),
                tutor_name: s.tutor_name,
                student_name: s.student_name,
            })
            .collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/allAdmins",
    responses((status = 200, description = "All admins", body = AdminOverviewResponse))
)]
pub async fn all_admins_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<AdminOverviewResponse>> {
    let admins = state.store.list_admins().await?;
    Ok(Json(AdminOverviewResponse {
        success: true,
        admins: admins
            .into_iter()
            .map(|a| AdminOverviewDto {
                user_id: a.user_id,
                full_name: a.full_name,
                email: a.email,
                phone: a.phone,
            })
            .collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/allNotes",
    responses((status = 200, description = "All uploaded notes", body = NoteOverviewResponse))
)]
pub async fn all_notes_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<NoteOverviewResponse>> {
    let notes = state.store.list_all_notes().await?;
    Ok(Json(NoteOverviewResponse {
        success: true,
        notes: notes
            .into_iter()
            .map(|n| NoteOverviewDto {
                note_id: n.note_id,
                session_id: n.session_id,
                session_date: n.session_date.to_string(),
                status: n.status.to_string(),
                tutor_name: n.tutor_name,
            })
            .collect(),
    }))
}

/// Dashboard totals. `sessionCount` counts completed sessions.
#[utoipa::path(
    get,
    path = "/api/admin/counts",
    responses((status = 200, description = "Dashboard counts", body = CountsResponse))
)]
pub async fn counts_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<CountsResponse>> {
    let counts = state.store.dashboard_counts().await?;
    Ok(Json(CountsResponse {
        success: true,
        counts: CountsDto {
            tutor_count: counts.tutors,
            student_count: counts.students,
            admin_count: counts.admins,
            session_count: counts.completed_sessions,
            notes_count: counts.notes,
        },
    }))
}

//=========================================================================================
// Transcript Handlers
//=========================================================================================

/// Extract (subject, grade) rows from the pasted text of a transcript.
#[utoipa::path(
    post,
    path = "/api/admin/tutor/parse-text",
    request_body = TranscriptBody,
    responses(
        (status = 200, description = "Parsed rows", body = ExamResultsResponse),
        (status = 400, description = "No transcript text provided")
    )
)]
pub async fn parse_transcript_handler(
    Json(body): Json<TranscriptBody>,
) -> ApiResult<Json<ExamResultsResponse>> {
    let text = required_text(body.transcript_text, "No transcript text provided")?;
    Ok(Json(ExamResultsResponse {
        success: true,
        results: parse_transcript(&text).into_iter().map(ExamResultDto::from).collect(),
    }))
}

fn parse_exam_type(raw: &str) -> ApiResult<ExamType> {
    raw.parse::<ExamType>()
        .map_err(|_| ApiError::bad_request("Invalid exam type"))
}

/// Replace every stored result of one exam for a tutor.
#[utoipa::path(
    post,
    path = "/api/admin/tutor/save-results/{tutor_id}/{exam_type}",
    request_body = ExamResultsBody,
    params(
        ("tutor_id" = i64, Path, description = "Tutor id"),
        ("exam_type" = String, Path, description = "`OL` or `AL`")
    ),
    responses(
        (status = 200, description = "Results saved", body = MessageResponse),
        (status = 400, description = "No results or invalid exam type")
    )
)]
pub async fn save_results_handler(
    State(state): State<Arc<AppState>>,
    Path((tutor_id, exam_type)): Path<(Id, String)>,
    Json(body): Json<ExamResultsBody>,
) -> ApiResult<Json<MessageResponse>> {
    let results: Vec<ExamResult> = body
        .results
        .unwrap_or_default()
        .into_iter()
        .map(|r| ExamResult {
            subject: r.subject,
            grade: r.grade,
        })
        .collect();
    if results.is_empty() {
        return Err(ApiError::bad_request("No results provided"));
    }
    let exam = parse_exam_type(&exam_type)?;
    let results = normalise_exam_results(&results)?;

    let written = state.store.save_exam_results(tutor_id, exam, results).await?;
    info!(tutor_id, exam_type = exam.as_str(), written, "Exam results saved");
    Ok(Json(MessageResponse::ok(format!(
        "{} results saved successfully",
        exam.as_str()
    ))))
}

#[utoipa::path(
    get,
    path = "/api/admin/tutor/results/{tutor_id}/{exam_type}",
    params(
        ("tutor_id" = i64, Path, description = "Tutor id"),
        ("exam_type" = String, Path, description = "`OL` or `AL`")
    ),
    responses(
        (status = 200, description = "Stored results", body = ExamResultsResponse),
        (status = 400, description = "Invalid exam type")
    )
)]
pub async fn get_results_handler(
    State(state): State<Arc<AppState>>,
    Path((tutor_id, exam_type)): Path<(Id, String)>,
) -> ApiResult<Json<ExamResultsResponse>> {
    let exam = parse_exam_type(&exam_type)?;
    let results = state.store.exam_results(tutor_id, exam).await?;
    Ok(Json(ExamResultsResponse {
        success: true,
        results: results.into_iter().map(ExamResultDto::from).collect(),
    }))
}

//=========================================================================================
// Verification Handlers
//=========================================================================================

async fn verify(
    state: &AppState,
    tutor_id: Id,
    admin_id: Option<Id>,
    status: VerificationStatus,
    notes: Option<String>,
) -> ApiResult<Json<VerificationResponse>> {
    let admin_id = required(admin_id, "Admin ID required")?;
    let notes = notes.unwrap_or_default();
    let verification = state
        .store
        .verify_tutor(tutor_id, admin_id, status, &notes)
        .await?;
    info!(
        tutor_id,
        admin_id,
        verification_id = verification.id,
        status = status.as_str(),
        "Tutor verification recorded"
    );

    // The decision is committed; the email is a courtesy.
    match state.store.user_contact(tutor_id).await {
        Ok(contact) => {
            state
                .notify_best_effort(verification_notice(
                    &contact.email,
                    &contact.full_name,
                    status,
                    &notes,
                    &state.config.frontend_url,
                ))
                .await
        }
        Err(e) => warn!(tutor_id, "No contact for verification email: {}", e),
    }

    let verb = match status {
        VerificationStatus::Approved => "approved",
        VerificationStatus::Rejected => "rejected",
    };
    Ok(Json(VerificationResponse {
        success: true,
        message: format!("Tutor {verb} successfully"),
        verification_id: verification.id,
    }))
}

fn verification_notice(
    to: &str,
    full_name: &str,
    status: VerificationStatus,
    notes: &str,
    frontend_url: &str,
) -> Notification {
    let (subject, body) = match status {
        VerificationStatus::Approved => (
            "Tutor Application Approved",
            format!(
                "Hi {full_name},\n\nYour tutor application has been approved. \
                 Sign in to finish setting up your profile: {frontend_url}signin"
            ),
        ),
        VerificationStatus::Rejected => (
            "Tutor Application Rejected",
            format!(
                "Hi {full_name},\n\nYour tutor application was not approved.\n\nReviewer notes: {}",
                if notes.is_empty() { "none" } else { notes }
            ),
        ),
    };
    Notification {
        to: to.to_string(),
        subject: subject.to_string(),
        body,
    }
}

/// Approve a tutor application.
#[utoipa::path(
    post,
    path = "/api/admin/tutor/approve/{tutor_id}",
    request_body = ApproveBody,
    params(("tutor_id" = i64, Path, description = "Tutor id")),
    responses(
        (status = 200, description = "Tutor approved", body = VerificationResponse),
        (status = 400, description = "Admin ID required"),
        (status = 404, description = "Unknown tutor or admin")
    )
)]
pub async fn approve_tutor_handler(
    State(state): State<Arc<AppState>>,
    Path(tutor_id): Path<Id>,
    Json(body): Json<ApproveBody>,
) -> ApiResult<Json<VerificationResponse>> {
    verify(
        &state,
        tutor_id,
        body.admin_id,
        VerificationStatus::Approved,
        body.verified_notes,
    )
    .await
}

/// Reject a tutor application.
#[utoipa::path(
    post,
    path = "/api/admin/reject-tutor/{tutor_id}",
    request_body = RejectBody,
    params(("tutor_id" = i64, Path, description = "Tutor id")),
    responses(
        (status = 200, description = "Tutor rejected", body = VerificationResponse),
        (status = 400, description = "Admin ID required"),
        (status = 404, description = "Unknown tutor or admin")
    )
)]
pub async fn reject_tutor_handler(
    State(state): State<Arc<AppState>>,
    Path(tutor_id): Path<Id>,
    Json(body): Json<RejectBody>,
) -> ApiResult<Json<VerificationResponse>> {
    verify(
        &state,
        tutor_id,
        body.admin_id,
        VerificationStatus::Rejected,
        body.note,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::tests::{seeded, tutor_registration};
    use crate::adapters::notifier::tests::{FailingNotifier, RecordingNotifier};
    use crate::adapters::scanner::PassthroughScanner;
    use crate::config::Config;
    use crate::adapters::MemoryStore;
    use pretty_assertions::assert_eq;
    use tuteskillz_core::ports::{Notifier, TutoringStore};

    fn state_with(store: Arc<MemoryStore>, notifier: Arc<dyn Notifier>) -> Arc<AppState> {
        Arc::new(AppState {
            store,
            notifier,
            scanner: Arc::new(PassthroughScanner),
            config: Arc::new(Config::for_tests()),
        })
    }

    #[tokio::test]
    async fn approval_links_to_signin_and_survives_mail_failure() {
        let (store, fx) = seeded().await;
        let store = Arc::new(store);
        let pending = store
            .register_tutor(tutor_registration("kasun@example.com", &[fx.subject_id]))
            .await
            .unwrap();

        let recorder = Arc::new(RecordingNotifier::default());
        let state = state_with(store.clone(), recorder.clone());
        let Json(resp) = approve_tutor_handler(
            State(state),
            Path(pending),
            Json(ApproveBody { admin_id: Some(fx.admin_id), verified_notes: None }),
        )
        .await
        .unwrap();
        assert_eq!(resp.message, "Tutor approved successfully");

        let sent = recorder.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "kasun@example.com");
        assert!(sent[0].body.contains("http://localhost:5173/signin"));
        drop(sent);

        let failing = state_with(store.clone(), Arc::new(FailingNotifier));
        let rejected = reject_tutor_handler(
            State(failing),
            Path(pending),
            Json(RejectBody { admin_id: Some(fx.admin_id), note: Some("Blurry transcript".into()) }),
        )
        .await;
        assert!(rejected.is_ok());
        let onboarding = store.tutor_onboarding(pending).await.unwrap();
        assert_eq!(onboarding.verification_status, Some(VerificationStatus::Rejected));
    }

    #[tokio::test]
    async fn verification_needs_an_admin_id() {
        let (store, fx) = seeded().await;
        let state = state_with(Arc::new(store), Arc::new(RecordingNotifier::default()));
        let err = approve_tutor_handler(
            State(state),
            Path(fx.tutor_id),
            Json(ApproveBody { admin_id: None, verified_notes: None }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "Admin ID required"));
    }

    #[tokio::test]
    async fn saving_results_checks_input_before_writing() {
        let (store, fx) = seeded().await;
        let store = Arc::new(store);
        let state = state_with(store.clone(), Arc::new(RecordingNotifier::default()));

        let empty = save_results_handler(
            State(state.clone()),
            Path((fx.tutor_id, "OL".to_string())),
            Json(ExamResultsBody { results: Some(vec![]) }),
        )
        .await;
        assert!(matches!(empty, Err(ApiError::BadRequest(msg)) if msg == "No results provided"));

        let rows = || {
            Some(vec![ExamResultDto { subject: " science ".into(), grade: "b".into() }])
        };
        let bad_type = save_results_handler(
            State(state.clone()),
            Path((fx.tutor_id, "GCE".to_string())),
            Json(ExamResultsBody { results: rows() }),
        )
        .await;
        assert!(matches!(bad_type, Err(ApiError::BadRequest(msg)) if msg == "Invalid exam type"));

        let Json(saved) = save_results_handler(
            State(state.clone()),
            Path((fx.tutor_id, "OL".to_string())),
            Json(ExamResultsBody { results: rows() }),
        )
        .await
        .unwrap();
        assert_eq!(saved.message, "OL results saved successfully");

        let stored = store.exam_results(fx.tutor_id, ExamType::Ol).await.unwrap();
        assert_eq!(
            stored,
            vec![ExamResult { subject: "SCIENCE".into(), grade: "B".into() }]
        );
    }

    #[tokio::test]
    async fn parse_text_requires_text() {
        assert!(parse_transcript_handler(Json(TranscriptBody { transcript_text: None }))
            .await
            .is_err());
        let Json(resp) = parse_transcript_handler(Json(TranscriptBody {
            transcript_text: Some("SUBJECT GRADE DEFINITION\nMATHEMATICS A DISTINCTION".into()),
        }))
        .await
        .unwrap();
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].subject, "MATHEMATICS");
    }
}
