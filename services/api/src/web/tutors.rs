//! services/api/src/web/tutors.rs
//!
//! Handlers for tutor signup and the setup steps that follow approval:
//! weekly availability and payout bank accounts.

use crate::error::{ApiError, ApiResult};
use crate::web::actor::{ensure_owner, Actor};
use crate::web::rest::{
    clock, encode_base64, optional_base64, parse_date, parse_time, required, required_text,
    MessageResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use tuteskillz_core::domain::{
    Address, AvailabilitySlot, BankAccount, DayOfWeek, Id, Role, TeachingSubject,
    TutorRegistration, UserProfile,
};
use tuteskillz_core::validation::{validate_availability, validate_bank_accounts};
use utoipa::ToSchema;

//=========================================================================================
// API Payload Structs
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeachingSubjectBody {
    pub subject_id: Option<Id>,
    pub grade: Option<String>,
    #[serde(alias = "medium")]
    pub teaching_medium: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorRegistrationBody {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub gender: Option<String>,
    /// `YYYY-MM-DD`.
    pub dob: Option<String>,
    pub phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub school: Option<String>,
    pub university: Option<String>,
    pub bio: Option<String>,
    /// Base64 image.
    pub profile_pic: Option<String>,
    /// Base64 document.
    pub ol_transcript: Option<String>,
    /// Base64 document.
    pub al_transcript: Option<String>,
    #[serde(default)]
    pub teaching_subjects: Vec<TeachingSubjectBody>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorRegisteredResponse {
    pub success: bool,
    pub message: String,
    pub tutor_id: Id,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SlotBody {
    pub day_of_week: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityBody {
    pub tutor_id: Option<Id>,
    pub availability: Option<Vec<SlotBody>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvailabilityResponse {
    pub success: bool,
    pub availability: Vec<SlotBody>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailableDaysResponse {
    pub success: bool,
    pub available_days: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingDetails {
    pub has_availability: bool,
    pub has_bank_details: bool,
    pub verification_id: Option<Id>,
    pub verification_status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TutorStatusResponse {
    pub success: bool,
    /// `pending_verification`, `verification_rejected`, `incomplete` or `complete`.
    pub status: String,
    pub details: OnboardingDetails,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankAccountBody {
    pub bank_name: Option<String>,
    pub branch: Option<String>,
    pub account_number: Option<String>,
    pub beneficiary_name: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BankDetailsBody {
    pub tutor_id: Option<Id>,
    pub accounts: Option<Vec<BankAccountBody>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorProfileDto {
    pub tutor_id: Id,
    pub full_name: String,
    /// Base64 image, if one was uploaded.
    pub profile_photo: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TutorProfileResponse {
    pub success: bool,
    pub data: TutorProfileDto,
}

//=========================================================================================
// Conversions
//=========================================================================================

fn to_registration(body: TutorRegistrationBody) -> ApiResult<TutorRegistration> {
    let email = required_text(body.email, "Email and full name are required")?;
    let full_name = required_text(body.full_name, "Email and full name are required")?;
    let dob = body.dob.filter(|d| !d.trim().is_empty()).map(|d| parse_date(&d)).transpose()?;

    let subjects = body
        .teaching_subjects
        .into_iter()
        .map(|s| {
            const MESSAGE: &str = "Each teaching subject needs subjectId, grade and medium";
            Ok(TeachingSubject {
                subject_id: required(s.subject_id, MESSAGE)?,
                grade: required_text(s.grade, MESSAGE)?,
                teaching_medium: required_text(s.teaching_medium, MESSAGE)?,
            })
        })
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(TutorRegistration {
        profile: UserProfile {
            email,
            full_name,
            gender: body.gender,
            dob,
            phone: body.phone,
            profile_photo: optional_base64(body.profile_pic, "profilePic")?,
        },
        address: Address {
            street: body.street.unwrap_or_default(),
            city: body.city.unwrap_or_default(),
            province: body.province.unwrap_or_default(),
            postal_code: body.postal_code.unwrap_or_default(),
        },
        school: body.school,
        university: body.university,
        bio: body.bio,
        ol_transcript: optional_base64(body.ol_transcript, "olTranscript")?,
        al_transcript: optional_base64(body.al_transcript, "alTranscript")?,
        subjects,
    })
}

fn to_slot(slot: SlotBody) -> ApiResult<AvailabilitySlot> {
    const MESSAGE: &str = "Invalid availability entry";
    let day = required_text(slot.day_of_week, MESSAGE)?
        .parse::<DayOfWeek>()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(AvailabilitySlot {
        day,
        start_time: parse_time(&required_text(slot.start_time, MESSAGE)?)?,
        end_time: parse_time(&required_text(slot.end_time, MESSAGE)?)?,
    })
}

impl From<AvailabilitySlot> for SlotBody {
    fn from(slot: AvailabilitySlot) -> Self {
        Self {
            day_of_week: Some(slot.day.as_str().to_string()),
            start_time: Some(clock(slot.start_time)),
            end_time: Some(clock(slot.end_time)),
        }
    }
}

fn to_account(account: BankAccountBody) -> BankAccount {
    BankAccount {
        bank_name: account.bank_name.unwrap_or_default(),
        branch: account.branch.unwrap_or_default(),
        account_number: account.account_number.unwrap_or_default(),
        beneficiary_name: account.beneficiary_name.unwrap_or_default(),
        is_primary: account.is_primary,
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Register a tutor with their address, transcripts and teaching subjects.
///
/// Every row is written in one transaction; an unknown subject rolls back the whole signup.
#[utoipa::path(
    post,
    path = "/api/tutor/register",
    request_body = TutorRegistrationBody,
    responses(
        (status = 200, description = "Tutor registered", body = TutorRegisteredResponse),
        (status = 400, description = "Missing fields, malformed files or duplicate email"),
        (status = 404, description = "Unknown subject")
    )
)]
pub async fn register_tutor_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TutorRegistrationBody>,
) -> ApiResult<Json<TutorRegisteredResponse>> {
    let registration = to_registration(body)?;
    let subject_count = registration.subjects.len();
    let tutor_id = state.store.register_tutor(registration).await?;
    info!(tutor_id, subject_count, "Tutor registered");
    Ok(Json(TutorRegisteredResponse {
        success: true,
        message: "Tutor registered successfully".to_string(),
        tutor_id,
    }))
}

/// Add weekly availability slots. All slots are stored or none.
#[utoipa::path(
    post,
    path = "/api/tutor/availability",
    request_body = AvailabilityBody,
    responses(
        (status = 200, description = "Availability saved", body = MessageResponse),
        (status = 400, description = "Missing or invalid slot")
    )
)]
pub async fn save_availability_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<AvailabilityBody>,
) -> ApiResult<Json<MessageResponse>> {
    const MESSAGE: &str = "tutorId and availability[] are required";
    let tutor_id = required(body.tutor_id, MESSAGE)?;
    let slots = required(body.availability, MESSAGE)?
        .into_iter()
        .map(to_slot)
        .collect::<ApiResult<Vec<_>>>()?;
    ensure_owner(Actor::from_headers(&headers)?, Role::Tutor, tutor_id)?;
    validate_availability(&slots)?;

    let count = slots.len();
    state.store.save_availability(tutor_id, slots).await?;
    info!(tutor_id, count, "Availability saved");
    Ok(Json(MessageResponse::ok("Availability saved successfully")))
}

/// Weekly slots ordered Monday to Sunday, then by start time.
#[utoipa::path(
    get,
    path = "/api/tutor/availability/{tutor_id}",
    params(("tutor_id" = i64, Path, description = "Tutor id")),
    responses((status = 200, description = "Availability", body = AvailabilityResponse))
)]
pub async fn get_availability_handler(
    State(state): State<Arc<AppState>>,
    Path(tutor_id): Path<Id>,
) -> ApiResult<Json<AvailabilityResponse>> {
    let slots = state.store.list_availability(tutor_id).await?;
    Ok(Json(AvailabilityResponse {
        success: true,
        availability: slots.into_iter().map(SlotBody::from).collect(),
    }))
}

/// Distinct weekdays with at least one slot, in calendar order.
#[utoipa::path(
    get,
    path = "/api/tutor/available-days/{tutor_id}",
    params(("tutor_id" = i64, Path, description = "Tutor id")),
    responses((status = 200, description = "Available days", body = AvailableDaysResponse))
)]
pub async fn available_days_handler(
    State(state): State<Arc<AppState>>,
    Path(tutor_id): Path<Id>,
) -> ApiResult<Json<AvailableDaysResponse>> {
    let mut days: Vec<DayOfWeek> = state
        .store
        .list_availability(tutor_id)
        .await?
        .into_iter()
        .map(|slot| slot.day)
        .collect();
    days.sort();
    days.dedup();
    Ok(Json(AvailableDaysResponse {
        success: true,
        available_days: days.into_iter().map(|d| d.as_str().to_string()).collect(),
    }))
}

/// Where the tutor stands between signup and a complete profile.
#[utoipa::path(
    get,
    path = "/api/tutor/status/{tutor_id}",
    params(("tutor_id" = i64, Path, description = "Tutor id")),
    responses(
        (status = 200, description = "Onboarding status", body = TutorStatusResponse),
        (status = 404, description = "Tutor not found")
    )
)]
pub async fn tutor_status_handler(
    State(state): State<Arc<AppState>>,
    Path(tutor_id): Path<Id>,
) -> ApiResult<Json<TutorStatusResponse>> {
    let onboarding = state.store.tutor_onboarding(tutor_id).await?;
    Ok(Json(TutorStatusResponse {
        success: true,
        status: onboarding.stage.as_str().to_string(),
        details: OnboardingDetails {
            has_availability: onboarding.has_availability,
            has_bank_details: onboarding.has_bank_details,
            verification_id: onboarding.verification_id,
            verification_status: onboarding.verification_status.map(|s| s.as_str().to_string()),
        },
    }))
}

/// Add payout accounts. A primary account in the batch demotes every stored account.
#[utoipa::path(
    post,
    path = "/api/tutor/bank-details",
    request_body = BankDetailsBody,
    responses(
        (status = 200, description = "Accounts saved", body = MessageResponse),
        (status = 400, description = "No accounts, no primary account or blank fields")
    )
)]
pub async fn save_bank_details_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<BankDetailsBody>,
) -> ApiResult<Json<MessageResponse>> {
    const MESSAGE: &str = "tutorId and accounts[] are required";
    let tutor_id = required(body.tutor_id, MESSAGE)?;
    let accounts: Vec<BankAccount> = body
        .accounts
        .unwrap_or_default()
        .into_iter()
        .map(to_account)
        .collect();
    validate_bank_accounts(&accounts)?;
    ensure_owner(Actor::from_headers(&headers)?, Role::Tutor, tutor_id)?;

    let count = accounts.len();
    state.store.save_bank_details(tutor_id, accounts).await?;
    info!(tutor_id, count, "Bank accounts saved");
    Ok(Json(MessageResponse::ok("Bank accounts added successfully")))
}

/// The tutor's public card: name and photo.
#[utoipa::path(
    get,
    path = "/api/tutor/{tutor_id}",
    params(("tutor_id" = i64, Path, description = "Tutor id")),
    responses(
        (status = 200, description = "Tutor profile", body = TutorProfileResponse),
        (status = 404, description = "Tutor not found")
    )
)]
pub async fn tutor_profile_handler(
    State(state): State<Arc<AppState>>,
    Path(tutor_id): Path<Id>,
) -> ApiResult<Json<TutorProfileResponse>> {
    let profile = state.store.tutor_profile(tutor_id).await?;
    Ok(Json(TutorProfileResponse {
        success: true,
        data: TutorProfileDto {
            tutor_id: profile.tutor_id,
            full_name: profile.full_name,
            profile_photo: profile.profile_photo.as_deref().map(encode_base64),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::tests::seeded;
    use crate::adapters::MemoryStore;
    use pretty_assertions::assert_eq;
    use tuteskillz_core::domain::VerificationStatus;
    use tuteskillz_core::ports::TutoringStore;

    fn state(store: Arc<MemoryStore>) -> Arc<AppState> {
        AppState::for_tests(store)
    }

    fn slot(day: &str, start: &str, end: &str) -> SlotBody {
        SlotBody {
            day_of_week: Some(day.into()),
            start_time: Some(start.into()),
            end_time: Some(end.into()),
        }
    }

    fn registration_body(email: &str, subjects: Vec<TeachingSubjectBody>) -> TutorRegistrationBody {
        TutorRegistrationBody {
            email: Some(email.into()),
            full_name: Some("Ruwan Silva".into()),
            gender: None,
            dob: Some("1998-04-12".into()),
            phone: None,
            street: None,
            city: Some("Galle".into()),
            province: None,
            postal_code: None,
            school: None,
            university: Some("University of Moratuwa".into()),
            bio: None,
            profile_pic: Some("data:image/png;base64,iVBORw0KGgo=".into()),
            ol_transcript: None,
            al_transcript: None,
            teaching_subjects: subjects,
        }
    }

    #[tokio::test]
    async fn registration_with_unknown_subject_leaves_no_tutor() {
        let (store, fx) = seeded().await;
        let store = Arc::new(store);
        let before = store.list_tutors().await.unwrap().len();

        let subjects = vec![
            TeachingSubjectBody {
                subject_id: Some(fx.subject_id),
                grade: Some("Grade 11".into()),
                teaching_medium: Some("Sinhala".into()),
            },
            TeachingSubjectBody {
                subject_id: Some(9_999),
                grade: Some("Grade 11".into()),
                teaching_medium: Some("Sinhala".into()),
            },
        ];
        let result = register_tutor_handler(
            State(state(store.clone())),
            Json(registration_body("ruwan@example.com", subjects)),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Port(_))));
        assert_eq!(store.list_tutors().await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn registered_tutor_is_pending_with_photo() {
        let (store, fx) = seeded().await;
        let store = Arc::new(store);
        let subjects = vec![TeachingSubjectBody {
            subject_id: Some(fx.subject_id),
            grade: Some("Grade 11".into()),
            teaching_medium: Some("Tamil".into()),
        }];
        let Json(created) = register_tutor_handler(
            State(state(store.clone())),
            Json(registration_body("ruwan@example.com", subjects)),
        )
        .await
        .unwrap();

        let Json(status) = tutor_status_handler(State(state(store.clone())), Path(created.tutor_id))
            .await
            .unwrap();
        assert_eq!(status.status, "pending_verification");

        let Json(profile) = tutor_profile_handler(State(state(store)), Path(created.tutor_id))
            .await
            .unwrap();
        assert_eq!(profile.data.full_name, "Ruwan Silva");
        assert_eq!(profile.data.profile_photo.as_deref(), Some("iVBORw0KGgo="));
    }

    #[tokio::test]
    async fn one_bad_slot_rejects_the_whole_batch() {
        let (store, fx) = seeded().await;
        let store = Arc::new(store);
        let body = AvailabilityBody {
            tutor_id: Some(fx.tutor_id),
            availability: Some(vec![
                slot("Monday", "09:00", "11:00"),
                slot("Tuesday", "15:00", "14:00"),
            ]),
        };
        let result =
            save_availability_handler(State(state(store.clone())), HeaderMap::new(), Json(body))
                .await;
        assert!(result.is_err());
        assert!(store.list_availability(fx.tutor_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn availability_reads_back_in_week_order() {
        let (store, fx) = seeded().await;
        let store = Arc::new(store);
        let body = AvailabilityBody {
            tutor_id: Some(fx.tutor_id),
            availability: Some(vec![
                slot("Saturday", "08:00", "10:00"),
                slot("Monday", "16:00", "18:00"),
                slot("Monday", "09:00", "11:00"),
            ]),
        };
        save_availability_handler(State(state(store.clone())), HeaderMap::new(), Json(body))
            .await
            .unwrap();

        let Json(days) = available_days_handler(State(state(store.clone())), Path(fx.tutor_id))
            .await
            .unwrap();
        assert_eq!(days.available_days, vec!["Monday", "Saturday"]);

        let Json(listed) = get_availability_handler(State(state(store)), Path(fx.tutor_id))
            .await
            .unwrap();
        let starts: Vec<_> = listed
            .availability
            .iter()
            .map(|s| s.start_time.clone().unwrap_or_default())
            .collect();
        assert_eq!(starts, vec!["09:00:00", "16:00:00", "08:00:00"]);
    }

    #[tokio::test]
    async fn bank_details_need_a_primary_account() {
        let (store, fx) = seeded().await;
        let store = Arc::new(store);
        let account = |primary| BankAccountBody {
            bank_name: Some("Sampath Bank".into()),
            branch: Some("Matara".into()),
            account_number: Some("1002003004".into()),
            beneficiary_name: Some("N. Perera".into()),
            is_primary: primary,
        };

        let rejected = save_bank_details_handler(
            State(state(store.clone())),
            HeaderMap::new(),
            Json(BankDetailsBody { tutor_id: Some(fx.tutor_id), accounts: Some(vec![account(false)]) }),
        )
        .await;
        assert!(rejected.is_err());

        store
            .verify_tutor(fx.tutor_id, fx.admin_id, VerificationStatus::Approved, "")
            .await
            .unwrap();
        save_bank_details_handler(
            State(state(store.clone())),
            HeaderMap::new(),
            Json(BankDetailsBody {
                tutor_id: Some(fx.tutor_id),
                accounts: Some(vec![account(true), account(false)]),
            }),
        )
        .await
        .unwrap();
        let Json(status) = tutor_status_handler(State(state(store)), Path(fx.tutor_id))
            .await
            .unwrap();
        assert_eq!(status.status, "incomplete");
        assert!(status.details.has_bank_details);
        assert!(!status.details.has_availability);
    }
}
