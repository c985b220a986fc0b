//! services/api/src/web/subjects.rs
//!
//! Handlers for the subject catalogue tutors pick from at signup.

use crate::error::ApiResult;
use crate::web::rest::required_text;
use crate::web::state::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use tuteskillz_core::domain::{Id, SubjectRef};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDto {
    pub subject_id: Id,
    pub subject_name: String,
}

impl From<SubjectRef> for SubjectDto {
    fn from(subject: SubjectRef) -> Self {
        Self {
            subject_id: subject.subject_id,
            subject_name: subject.subject_name,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubjectListResponse {
    pub success: bool,
    pub data: Vec<SubjectDto>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubjectBody {
    pub subject_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubjectCreatedResponse {
    pub success: bool,
    pub data: SubjectDto,
}

/// Every subject, alphabetically.
#[utoipa::path(
    get,
    path = "/api/subjects",
    responses((status = 200, description = "Subject catalogue", body = SubjectListResponse))
)]
pub async fn list_subjects_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SubjectListResponse>> {
    let subjects = state.store.list_subjects().await?;
    Ok(Json(SubjectListResponse {
        success: true,
        data: subjects.into_iter().map(SubjectDto::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/subjects",
    request_body = CreateSubjectBody,
    responses(
        (status = 200, description = "Subject created", body = SubjectCreatedResponse),
        (status = 400, description = "Missing or duplicate name")
    )
)]
pub async fn create_subject_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSubjectBody>,
) -> ApiResult<Json<SubjectCreatedResponse>> {
    let name = required_text(body.subject_name, "Subject name is required")?;
    let subject = state.store.create_subject(&name).await?;
    info!(subject_id = subject.subject_id, "Subject created");
    Ok(Json(SubjectCreatedResponse {
        success: true,
        data: SubjectDto::from(subject),
    }))
}
