//! services/api/src/web/students.rs
//!
//! Handlers for student signup and for browsing approved tutors by medium,
//! grade and subject.

use crate::error::ApiResult;
use crate::web::rest::{optional_base64, parse_date, required, required_text};
use crate::web::state::AppState;
use crate::web::subjects::SubjectDto;
use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use tuteskillz_core::domain::{Address, Guardian, Id, StudentRegistration, UserProfile};
use utoipa::{IntoParams, ToSchema};

//=========================================================================================
// API Payload Structs
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentRegistrationBody {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub gender: Option<String>,
    /// `YYYY-MM-DD`.
    pub dob: Option<String>,
    pub phone: Option<String>,
    pub grade: Option<String>,
    /// Guardian's full name.
    pub g_full_name: Option<String>,
    pub g_email: Option<String>,
    pub g_phone: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    /// Base64 image.
    pub profile_pic: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentRegisteredResponse {
    pub success: bool,
    pub message: String,
    pub student_id: Id,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BrowseQuery {
    pub medium: Option<String>,
    pub grade: Option<String>,
    pub subject_id: Option<Id>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BrowseValuesResponse {
    pub success: bool,
    pub data: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BrowseSubjectsResponse {
    pub success: bool,
    pub data: Vec<SubjectDto>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TutorListingDto {
    pub tutor_subject_id: Id,
    pub user_id: Id,
    pub full_name: String,
    pub bio: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TutorListingResponse {
    pub success: bool,
    pub data: Vec<TutorListingDto>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Register a student together with their guardian and address.
#[utoipa::path(
    post,
    path = "/api/student/register",
    request_body = StudentRegistrationBody,
    responses(
        (status = 200, description = "Student registered", body = StudentRegisteredResponse),
        (status = 400, description = "Missing fields or duplicate email")
    )
)]
pub async fn register_student_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<StudentRegistrationBody>,
) -> ApiResult<Json<StudentRegisteredResponse>> {
    const MESSAGE: &str = "Email, full name, grade and guardian name are required";
    let registration = StudentRegistration {
        profile: UserProfile {
            email: required_text(body.email, MESSAGE)?,
            full_name: required_text(body.full_name, MESSAGE)?,
            gender: body.gender,
            dob: body.dob.filter(|d| !d.trim().is_empty()).map(|d| parse_date(&d)).transpose()?,
            phone: body.phone,
            profile_photo: optional_base64(body.profile_pic, "profilePic")?,
        },
        address: Address {
            street: body.street.unwrap_or_default(),
            city: body.city.unwrap_or_default(),
            province: body.province.unwrap_or_default(),
            postal_code: body.postal_code.unwrap_or_default(),
        },
        guardian: Guardian {
            full_name: required_text(body.g_full_name, MESSAGE)?,
            email: body.g_email,
            phone: body.g_phone,
        },
        grade: required_text(body.grade, MESSAGE)?,
    };

    let student_id = state.store.register_student(registration).await?;
    info!(student_id, "Student registered");
    Ok(Json(StudentRegisteredResponse {
        success: true,
        message: "Student registered successfully".to_string(),
        student_id,
    }))
}

/// Teaching mediums offered by approved tutors.
#[utoipa::path(
    get,
    path = "/api/student/tutors/mediums",
    responses((status = 200, description = "Mediums", body = BrowseValuesResponse))
)]
pub async fn mediums_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<BrowseValuesResponse>> {
    Ok(Json(BrowseValuesResponse {
        success: true,
        data: state.store.approved_mediums().await?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/student/tutors/grades",
    params(BrowseQuery),
    responses(
        (status = 200, description = "Grades taught in the medium", body = BrowseValuesResponse),
        (status = 400, description = "Medium is required")
    )
)]
pub async fn grades_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<BrowseValuesResponse>> {
    let medium = required_text(query.medium, "Medium is required")?;
    Ok(Json(BrowseValuesResponse {
        success: true,
        data: state.store.approved_grades(&medium).await?,
    }))
}

#[utoipa::path(
    get,
    path = "/api/student/tutors/subjects",
    params(BrowseQuery),
    responses(
        (status = 200, description = "Subjects taught for the medium and grade", body = BrowseSubjectsResponse),
        (status = 400, description = "Medium and grade are required")
    )
)]
pub async fn subjects_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<BrowseSubjectsResponse>> {
    const MESSAGE: &str = "Medium and grade are required";
    let medium = required_text(query.medium, MESSAGE)?;
    let grade = required_text(query.grade, MESSAGE)?;
    let subjects = state.store.approved_subjects(&medium, &grade).await?;
    Ok(Json(BrowseSubjectsResponse {
        success: true,
        data: subjects.into_iter().map(SubjectDto::from).collect(),
    }))
}

/// Approved tutors offering one subject at a grade and medium.
#[utoipa::path(
    get,
    path = "/api/student/tutors",
    params(BrowseQuery),
    responses(
        (status = 200, description = "Matching tutors", body = TutorListingResponse),
        (status = 400, description = "Medium, grade, and subjectId are required")
    )
)]
pub async fn tutors_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<TutorListingResponse>> {
    const MESSAGE: &str = "Medium, grade, and subjectId are required";
    let medium = required_text(query.medium, MESSAGE)?;
    let grade = required_text(query.grade, MESSAGE)?;
    let subject_id = required(query.subject_id, MESSAGE)?;
    let tutors = state.store.approved_tutors(&medium, &grade, subject_id).await?;
    Ok(Json(TutorListingResponse {
        success: true,
        data: tutors
            .into_iter()
            .map(|t| TutorListingDto {
                tutor_subject_id: t.tutor_subject_id,
                user_id: t.tutor_id,
                full_name: t.full_name,
                bio: t.bio,
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::tests::seeded;
    use crate::adapters::MemoryStore;
    use crate::error::ApiError;
    use pretty_assertions::assert_eq;
    use tuteskillz_core::domain::VerificationStatus;
    use tuteskillz_core::ports::TutoringStore;

    fn state(store: Arc<MemoryStore>) -> Arc<AppState> {
        AppState::for_tests(store)
    }

    fn query(medium: Option<&str>, grade: Option<&str>, subject_id: Option<Id>) -> BrowseQuery {
        BrowseQuery {
            medium: medium.map(str::to_string),
            grade: grade.map(str::to_string),
            subject_id,
        }
    }

    #[tokio::test]
    async fn browse_only_lists_approved_tutors() {
        let (store, fx) = seeded().await;
        let store = Arc::new(store);

        let Json(before) = mediums_handler(State(state(store.clone()))).await.unwrap();
        assert!(before.data.is_empty());

        store
            .verify_tutor(fx.tutor_id, fx.admin_id, VerificationStatus::Approved, "ok")
            .await
            .unwrap();

        let Json(mediums) = mediums_handler(State(state(store.clone()))).await.unwrap();
        assert_eq!(mediums.data, vec!["English"]);

        let Json(grades) =
            grades_handler(State(state(store.clone())), Query(query(Some("English"), None, None)))
                .await
                .unwrap();
        assert_eq!(grades.data, vec!["Grade 10"]);

        let Json(tutors) = tutors_handler(
            State(state(store)),
            Query(query(Some("English"), Some("Grade 10"), Some(fx.subject_id))),
        )
        .await
        .unwrap();
        assert_eq!(tutors.data.len(), 1);
        assert_eq!(tutors.data[0].tutor_subject_id, fx.tutor_subject_id);
        assert_eq!(tutors.data[0].user_id, fx.tutor_id);
    }

    #[tokio::test]
    async fn browse_parameters_are_required() {
        let (store, _) = seeded().await;
        let store = Arc::new(store);

        let grades = grades_handler(State(state(store.clone())), Query(query(None, None, None))).await;
        assert!(matches!(grades, Err(ApiError::BadRequest(msg)) if msg == "Medium is required"));

        let tutors = tutors_handler(
            State(state(store)),
            Query(query(Some("English"), Some("Grade 10"), None)),
        )
        .await;
        assert!(matches!(
            tutors,
            Err(ApiError::BadRequest(msg)) if msg == "Medium, grade, and subjectId are required"
        ));
    }

    #[tokio::test]
    async fn duplicate_student_email_is_rejected() {
        let (store, _) = seeded().await;
        let body = || StudentRegistrationBody {
            email: Some("amaya@tuteskillz.lk".into()),
            full_name: Some("Amaya Fernando".into()),
            gender: None,
            dob: None,
            phone: None,
            grade: Some("Grade 9".into()),
            g_full_name: Some("Sunil Fernando".into()),
            g_email: None,
            g_phone: None,
            street: None,
            city: None,
            province: None,
            postal_code: None,
            profile_pic: None,
        };
        let result = register_student_handler(State(state(Arc::new(store))), Json(body())).await;
        let err = result.unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
