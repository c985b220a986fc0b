//! services/api/src/web/rest.rs
//!
//! Contains the master definition for the OpenAPI specification and the small
//! parsing helpers shared by every REST handler.

use crate::error::{ApiError, ApiResult};
use crate::web::{admin, notes, payments, sessions, students, subjects, tutors};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use tuteskillz_core::conflict::parse_clock_time;
use tuteskillz_core::domain::SessionStatus;
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        sessions::request_session_handler,
        sessions::update_status_handler,
        sessions::complete_session_handler,
        sessions::cancel_session_handler,
        sessions::get_session_handler,
        sessions::session_payments_handler,
        sessions::tutor_info_handler,
        sessions::tutor_sessions_handler,
        sessions::student_sessions_handler,
        sessions::student_conflict_handler,
        sessions::tutor_conflict_handler,
        payments::payhere_webhook_handler,
        payments::payhere_checkout_handler,
        notes::upload_note_handler,
        notes::list_notes_handler,
        notes::download_note_handler,
        tutors::register_tutor_handler,
        tutors::save_availability_handler,
        tutors::get_availability_handler,
        tutors::available_days_handler,
        tutors::tutor_status_handler,
        tutors::save_bank_details_handler,
        tutors::tutor_profile_handler,
        students::register_student_handler,
        students::mediums_handler,
        students::grades_handler,
        students::subjects_handler,
        students::tutors_handler,
        subjects::list_subjects_handler,
        subjects::create_subject_handler,
        admin::all_tutors_handler,
        admin::all_students_handler,
        admin::all_sessions_handler,
        admin::all_admins_handler,
        admin::all_notes_handler,
        admin::counts_handler,
        admin::parse_transcript_handler,
        admin::save_results_handler,
        admin::get_results_handler,
        admin::approve_tutor_handler,
        admin::reject_tutor_handler,
    ),
    components(
        schemas(
            MessageResponse,
            sessions::SessionRequestBody,
            sessions::StatusUpdateBody,
            sessions::BookingDto,
            sessions::ConflictResponse,
            sessions::SessionCreatedResponse,
            sessions::SessionDto,
            sessions::SessionSummaryDto,
            sessions::SessionListResponse,
            sessions::SessionDetailResponse,
            sessions::SessionStateResponse,
            sessions::TutorSubjectInfoDto,
            sessions::TutorSubjectInfoResponse,
            sessions::PaymentDto,
            sessions::PaymentListResponse,
            payments::PayHereNotification,
            payments::CheckoutBody,
            payments::PaymentData,
            payments::CheckoutResponse,
            notes::NoteUploadBody,
            notes::NoteUploadResponse,
            notes::NoteDto,
            notes::NoteListResponse,
            tutors::TutorRegistrationBody,
            tutors::TutorRegisteredResponse,
            tutors::TeachingSubjectBody,
            tutors::AvailabilityBody,
            tutors::SlotBody,
            tutors::AvailabilityResponse,
            tutors::AvailableDaysResponse,
            tutors::TutorStatusResponse,
            tutors::OnboardingDetails,
            tutors::BankDetailsBody,
            tutors::BankAccountBody,
            tutors::TutorProfileResponse,
            tutors::TutorProfileDto,
            students::StudentRegistrationBody,
            students::StudentRegisteredResponse,
            students::BrowseValuesResponse,
            students::BrowseSubjectsResponse,
            students::TutorListingDto,
            students::TutorListingResponse,
            subjects::SubjectDto,
            subjects::SubjectListResponse,
            subjects::CreateSubjectBody,
            subjects::SubjectCreatedResponse,
            admin::TutorOverviewDto,
            admin::TutorOverviewResponse,
            admin::StudentOverviewDto,
            admin::StudentOverviewResponse,
            admin::SessionOverviewDto,
            admin::SessionOverviewResponse,
            admin::AdminOverviewDto,
            admin::AdminOverviewResponse,
            admin::NoteOverviewDto,
            admin::NoteOverviewResponse,
            admin::CountsDto,
            admin::CountsResponse,
            admin::TranscriptBody,
            admin::ExamResultDto,
            admin::ExamResultsBody,
            admin::ExamResultsResponse,
            admin::ApproveBody,
            admin::RejectBody,
            admin::VerificationResponse,
        )
    ),
    tags(
        (name = "TuteSkillz API", description = "Booking, payment and onboarding endpoints of the tutoring marketplace.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Shared Response Structs
//=========================================================================================

/// The plain acknowledgement returned by writes that produce no data.
#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

//=========================================================================================
// Request Parsing Helpers
//=========================================================================================

/// Formats a time of day the way it is stored, `HH:MM:SS`.
pub fn clock(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

pub fn parse_date(raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("Invalid date '{raw}', expected YYYY-MM-DD")))
}

pub fn parse_time(raw: &str) -> ApiResult<NaiveTime> {
    parse_clock_time(raw)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid time '{raw}', expected HH:MM")))
}

/// An absent or blank filter means every status.
pub fn parse_status_filter(raw: Option<String>) -> ApiResult<Option<SessionStatus>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<SessionStatus>()
            .map(Some)
            .map_err(|e| ApiError::bad_request(e.to_string())),
    }
}

pub fn required<T>(value: Option<T>, message: &str) -> ApiResult<T> {
    value.ok_or_else(|| ApiError::bad_request(message))
}

/// Like [`required`], but a blank string counts as missing. The value is trimmed.
pub fn required_text(value: Option<String>, message: &str) -> ApiResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::bad_request(message)),
    }
}

/// Decodes standard base64, tolerating a `data:<mime>;base64,` prefix and line breaks.
pub fn decode_base64(raw: &str) -> Option<Bytes> {
    let payload = match raw.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => raw,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok().map(Bytes::from)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes an optional base64 field, rejecting malformed input instead of dropping it.
pub fn optional_base64(raw: Option<String>, field: &str) -> ApiResult<Option<Bytes>> {
    match raw.filter(|v| !v.trim().is_empty()) {
        None => Ok(None),
        Some(v) => decode_base64(&v)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("{field} is not valid base64"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_data_urls_and_plain_base64() {
        assert_eq!(decode_base64("JVBERi0xLjQ=").unwrap(), &b"%PDF-1.4"[..]);
        assert_eq!(
            decode_base64("data:application/pdf;base64,JVBERi0x\nLjQ=").unwrap(),
            &b"%PDF-1.4"[..]
        );
        assert!(decode_base64("not base64!").is_none());
    }

    #[test]
    fn blank_text_is_missing() {
        assert!(required_text(Some("   ".into()), "missing").is_err());
        assert_eq!(required_text(Some(" Sinhala ".into()), "missing").unwrap(), "Sinhala");
        assert!(required::<i64>(None, "missing").is_err());
    }

    #[test]
    fn status_filter_is_optional_but_checked() {
        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(parse_status_filter(Some("".into())).unwrap(), None);
        assert_eq!(
            parse_status_filter(Some("accepted".into())).unwrap(),
            Some(SessionStatus::Accepted)
        );
        assert!(parse_status_filter(Some("Pending".into())).is_err());
    }

    #[test]
    fn dates_and_times() {
        assert_eq!(parse_date("2025-03-10").unwrap().to_string(), "2025-03-10");
        assert!(parse_date("10/03/2025").is_err());
        assert_eq!(clock(parse_time("9:30").unwrap()), "09:30:00");
        assert!(parse_time("25:00").is_err());
    }

    #[test]
    fn optional_base64_rejects_garbage() {
        assert_eq!(optional_base64(None, "profilePic").unwrap(), None);
        assert_eq!(optional_base64(Some(" ".into()), "profilePic").unwrap(), None);
        assert!(optional_base64(Some("%%%".into()), "profilePic").is_err());
    }
}
