pub mod actor;
pub mod admin;
pub mod notes;
pub mod payments;
pub mod rest;
pub mod sessions;
pub mod state;
pub mod students;
pub mod subjects;
pub mod tutors;

use axum::{
    routing::{get, post, put},
    Router,
};
use state::AppState;
use std::sync::Arc;

/// Builds the `/api` routes. Transport layers (CORS, body limit, docs) are added by the binary.
pub fn build_router(app_state: Arc<AppState>) -> Router {
    let session_routes = Router::new()
        .route("/request", post(sessions::request_session_handler))
        .route("/tutor-info/{tutor_subject_id}", get(sessions::tutor_info_handler))
        .route("/tutor/{tutor_id}/sessions", get(sessions::tutor_sessions_handler))
        .route("/student/{student_id}/sessions", get(sessions::student_sessions_handler))
        .route(
            "/student/{student_id}/check-conflict",
            get(sessions::student_conflict_handler),
        )
        .route("/tutor/{tutor_id}/check-conflict", get(sessions::tutor_conflict_handler))
        .route("/{session_id}", get(sessions::get_session_handler))
        .route("/{session_id}/status", put(sessions::update_status_handler))
        .route("/{session_id}/complete", post(sessions::complete_session_handler))
        .route("/{session_id}/cancel", post(sessions::cancel_session_handler))
        .route("/{session_id}/payments", get(sessions::session_payments_handler));

    let payment_routes = Router::new()
        .route("/payhere/webhook", post(payments::payhere_webhook_handler))
        .route("/payhere/create", post(payments::payhere_checkout_handler));

    let note_routes = Router::new()
        .route("/upload", post(notes::upload_note_handler))
        .route("/{session_id}", get(notes::list_notes_handler))
        .route("/{session_id}/{note_id}", get(notes::download_note_handler));

    let tutor_routes = Router::new()
        .route("/register", post(tutors::register_tutor_handler))
        .route("/availability", post(tutors::save_availability_handler))
        .route("/availability/{tutor_id}", get(tutors::get_availability_handler))
        .route("/available-days/{tutor_id}", get(tutors::available_days_handler))
        .route("/status/{tutor_id}", get(tutors::tutor_status_handler))
        .route("/bank-details", post(tutors::save_bank_details_handler))
        .route("/{tutor_id}", get(tutors::tutor_profile_handler));

    let student_routes = Router::new()
        .route("/register", post(students::register_student_handler))
        .route("/tutors/mediums", get(students::mediums_handler))
        .route("/tutors/grades", get(students::grades_handler))
        .route("/tutors/subjects", get(students::subjects_handler))
        .route("/tutors", get(students::tutors_handler));

    let admin_routes = Router::new()
        .route("/allTutors", get(admin::all_tutors_handler))
        .route("/allStudents", get(admin::all_students_handler))
        .route("/allSessions", get(admin::all_sessions_handler))
        .route("/allAdmins", get(admin::all_admins_handler))
        .route("/allNotes", get(admin::all_notes_handler))
        .route("/counts", get(admin::counts_handler))
        .route("/tutor/parse-text", post(admin::parse_transcript_handler))
        .route(
            "/tutor/save-results/{tutor_id}/{exam_type}",
            post(admin::save_results_handler),
        )
        .route("/tutor/results/{tutor_id}/{exam_type}", get(admin::get_results_handler))
        .route("/tutor/approve/{tutor_id}", post(admin::approve_tutor_handler))
        .route("/reject-tutor/{tutor_id}", post(admin::reject_tutor_handler));

    Router::new()
        .nest("/api/session", session_routes)
        .nest("/api/payment", payment_routes)
        .nest("/api/notes", note_routes)
        .nest("/api/tutor", tutor_routes)
        .nest("/api/student", student_routes)
        .nest("/api/admin", admin_routes)
        .route(
            "/api/subjects",
            get(subjects::list_subjects_handler).post(subjects::create_subject_handler),
        )
        .with_state(app_state)
}
