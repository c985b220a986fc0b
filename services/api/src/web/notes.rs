//! services/api/src/web/notes.rs
//!
//! Handlers for the PDF notes a tutor shares with a session.

use crate::error::{ApiError, ApiResult};
use crate::web::actor::Actor;
use crate::web::rest::{decode_base64, required, required_text};
use crate::web::sessions::ensure_participant;
use crate::web::state::AppState;
use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap,
    },
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use tuteskillz_core::domain::Id;
use tuteskillz_core::ports::ScanVerdict;
use utoipa::ToSchema;

const PDF_MAGIC: &[u8] = b"%PDF-";
const MISSING_FIELDS: &str = "Missing required fields";

//=========================================================================================
// API Payload Structs
//=========================================================================================

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteUploadBody {
    pub session_id: Option<Id>,
    pub title: Option<String>,
    /// Base64 PDF, optionally as a `data:application/pdf;base64,` URL.
    pub file: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteUploadResponse {
    pub success: bool,
    pub message: String,
    pub note_id: Id,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteDto {
    pub note_id: Id,
    pub title: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NoteListResponse {
    pub success: bool,
    pub notes: Vec<NoteDto>,
}

/// An upload after the transport encoding has been removed.
struct Upload {
    session_id: Id,
    title: String,
    document: Bytes,
}

//=========================================================================================
// Upload Parsing
//=========================================================================================

async fn read_json_upload(state: &Arc<AppState>, request: Request) -> ApiResult<Upload> {
    let Json(body) = Json::<NoteUploadBody>::from_request(request, state)
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?;
    let session_id = required(body.session_id, MISSING_FIELDS)?;
    let title = required_text(body.title, MISSING_FIELDS)?;
    let file = required_text(body.file, MISSING_FIELDS)?;
    let document = decode_base64(&file).ok_or_else(|| ApiError::bad_request("Invalid file format"))?;
    Ok(Upload {
        session_id,
        title,
        document,
    })
}

async fn read_multipart_upload(state: &Arc<AppState>, request: Request) -> ApiResult<Upload> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?;

    let (mut session_id, mut title, mut document) = (None, None, None);
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Failed to read multipart data: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "sessionId" => {
                let raw = field.text().await.map_err(|e| ApiError::bad_request(e.to_string()))?;
                session_id = Some(
                    raw.trim()
                        .parse::<Id>()
                        .map_err(|_| ApiError::bad_request("Invalid sessionId"))?,
                );
            }
            "title" => {
                title = Some(field.text().await.map_err(|e| ApiError::bad_request(e.to_string()))?);
            }
            "file" => {
                if let Some(ct) = field.content_type() {
                    if ct != "application/pdf" {
                        return Err(ApiError::bad_request("Only PDF files are allowed"));
                    }
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file bytes: {e}")))?;
                document = Some(bytes);
            }
            _ => {}
        }
    }

    Ok(Upload {
        session_id: required(session_id, MISSING_FIELDS)?,
        title: required_text(title, MISSING_FIELDS)?,
        document: required(document, MISSING_FIELDS)?,
    })
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Upload a PDF note for a session.
///
/// Accepts a JSON body with a base64 file or a `multipart/form-data` body with a `file`
/// part. The document must be a PDF under the size ceiling and pass the virus scan.
#[utoipa::path(
    post,
    path = "/api/notes/upload",
    request_body = NoteUploadBody,
    responses(
        (status = 200, description = "Note stored", body = NoteUploadResponse),
        (status = 400, description = "Missing fields, not a PDF, too large or infected"),
        (status = 404, description = "Session not found")
    )
)]
pub async fn upload_note_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> ApiResult<Json<NoteUploadResponse>> {
    let actor = Actor::from_headers(request.headers())?;
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let upload = if is_multipart {
        read_multipart_upload(&state, request).await?
    } else {
        read_json_upload(&state, request).await?
    };

    let limit = state.config.max_note_bytes;
    if upload.document.len() > limit {
        return Err(ApiError::bad_request(format!(
            "File exceeds the {} MB limit",
            limit / (1024 * 1024)
        )));
    }
    if !upload.document.starts_with(PDF_MAGIC) {
        return Err(ApiError::bad_request("Only PDF files are allowed"));
    }

    let summary = state.store.get_session_detail(upload.session_id).await?;
    ensure_participant(actor, &summary)?;

    let file_name = format!("{}.pdf", upload.title);
    if let ScanVerdict::Infected(signature) = state.scanner.scan(&file_name, &upload.document).await? {
        warn!(session_id = upload.session_id, signature, "Rejected infected upload");
        return Err(ApiError::bad_request("File rejected by virus scan"));
    }

    let note_id = state
        .store
        .save_note(upload.session_id, &upload.title, upload.document)
        .await?;
    info!(session_id = upload.session_id, note_id, "Note uploaded");

    Ok(Json(NoteUploadResponse {
        success: true,
        message: "Notes uploaded successfully".to_string(),
        note_id,
    }))
}

/// List the notes of a session.
#[utoipa::path(
    get,
    path = "/api/notes/{session_id}",
    params(("session_id" = i64, Path, description = "Session id")),
    responses(
        (status = 200, description = "Notes of the session", body = NoteListResponse),
        (status = 403, description = "Caller is not part of the session"),
        (status = 404, description = "Session not found")
    )
)]
pub async fn list_notes_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(session_id): Path<Id>,
) -> ApiResult<Json<NoteListResponse>> {
    let summary = state.store.get_session_detail(session_id).await?;
    ensure_participant(Actor::from_headers(&headers)?, &summary)?;
    let notes = state.store.list_notes(session_id).await?;
    Ok(Json(NoteListResponse {
        success: true,
        notes: notes
            .into_iter()
            .map(|n| NoteDto {
                note_id: n.id,
                title: n.title,
            })
            .collect(),
    }))
}

/// Download one note as a PDF attachment.
#[utoipa::path(
    get,
    path = "/api/notes/{session_id}/{note_id}",
    params(
        ("session_id" = i64, Path, description = "Session id"),
        ("note_id" = i64, Path, description = "Note id")
    ),
    responses(
        (status = 200, description = "The PDF", content_type = "application/pdf"),
        (status = 403, description = "Caller is not part of the session"),
        (status = 404, description = "Session or note not found")
    )
)]
pub async fn download_note_handler(
    State(state): State<Arc<AppState>>,
    request_headers: HeaderMap,
    Path((session_id, note_id)): Path<(Id, Id)>,
) -> ApiResult<Response> {
    let summary = state.store.get_session_detail(session_id).await?;
    ensure_participant(Actor::from_headers(&request_headers)?, &summary)?;
    let note = state.store.get_note(session_id, note_id).await?;
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, "application/pdf".parse().map_err(internal)?);
    headers.insert(
        CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}.pdf\"", attachment_name(&note.title))
            .parse()
            .map_err(internal)?,
    );
    Ok((headers, note.document).into_response())
}

fn internal(e: axum::http::header::InvalidHeaderValue) -> ApiError {
    ApiError::Internal(e.to_string())
}

/// Keeps the title usable inside a quoted header parameter.
fn attachment_name(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '"' || c == '\\' || !c.is_ascii() { '_' } else { c })
        .collect()
}
