//! crates/tuteskillz_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the marketplace's core logic.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of the database, the mail relay and the antivirus service.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;

use crate::conflict::{Booking, Party};
use crate::domain::{
    AdminOverview, AvailabilitySlot, BankAccount, DashboardCounts, ExamResult, ExamType, Id,
    NewSession, NoteDocument, NoteOverview, NoteSummary, Payment, PaymentNotice, Session,
    SessionOverview, SessionStatus, SessionSummary, StudentOverview, StudentRegistration,
    SubjectRef, TutorDecision, TutorListing, TutorOnboarding, TutorOverview, TutorProfile,
    TutorRegistration, TutorSubjectInfo, Verification, VerificationStatus,
};
use crate::lifecycle::PaymentEffect;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Operation Outcomes
//=========================================================================================

/// Result of a booking request. A conflict is an expected answer, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Created(Id),
    Conflict(Booking),
}

/// Result of a tutor accepting or declining a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    Updated(Session),
    Conflict(Booking),
}

/// What happened when a gateway notification was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecorded {
    pub payment_id: Id,
    pub effect: PaymentEffect,
    pub session: Session,
}

/// Where to deliver a notification about a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContact {
    pub email: String,
    pub full_name: String,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistence for the whole marketplace.
///
/// Every method is one atomic unit: multi-row writes commit entirely or not at all, and
/// booking writes perform their conflict check inside the same unit as the write.
#[async_trait]
pub trait TutoringStore: Send + Sync {
    // --- Sessions ---
    async fn request_session(&self, request: NewSession) -> PortResult<RequestOutcome>;

    async fn decide_session(
        &self,
        session_id: Id,
        decision: TutorDecision,
        tutor_note: Option<String>,
    ) -> PortResult<DecisionOutcome>;

    async fn open_checkout(&self, session_id: Id) -> PortResult<Session>;

    /// Always stores the payment row, then applies the lifecycle's payment effect.
    async fn record_payment(
        &self,
        notice: PaymentNotice,
        meeting_base_url: &str,
    ) -> PortResult<PaymentRecorded>;

    async fn complete_session(&self, session_id: Id) -> PortResult<Session>;

    async fn cancel_session(&self, session_id: Id) -> PortResult<Session>;

    async fn get_session(&self, session_id: Id) -> PortResult<Session>;

    async fn get_session_detail(&self, session_id: Id) -> PortResult<SessionSummary>;

    /// Sessions of one party ordered by date then start time.
    async fn list_sessions_for(
        &self,
        party: Party,
        status: Option<SessionStatus>,
    ) -> PortResult<Vec<SessionSummary>>;

    /// Bookings occupying the party's calendar on `date`, in store order.
    async fn blocking_bookings(&self, party: Party, date: NaiveDate) -> PortResult<Vec<Booking>>;

    async fn get_tutor_subject_info(&self, tutor_subject_id: Id) -> PortResult<TutorSubjectInfo>;

    async fn payments_for_session(&self, session_id: Id) -> PortResult<Vec<Payment>>;

    // --- Registration ---
    async fn register_tutor(&self, registration: TutorRegistration) -> PortResult<Id>;

    async fn register_student(&self, registration: StudentRegistration) -> PortResult<Id>;

    // --- Subjects ---
    async fn list_subjects(&self) -> PortResult<Vec<SubjectRef>>;

    async fn create_subject(&self, subject_name: &str) -> PortResult<SubjectRef>;

    // --- Tutor Setup ---
    async fn save_availability(&self, tutor_id: Id, slots: Vec<AvailabilitySlot>) -> PortResult<()>;

    /// Slots ordered Monday..Sunday, then by start time.
    async fn list_availability(&self, tutor_id: Id) -> PortResult<Vec<AvailabilitySlot>>;

    async fn save_bank_details(&self, tutor_id: Id, accounts: Vec<BankAccount>) -> PortResult<()>;

    async fn list_bank_details(&self, tutor_id: Id) -> PortResult<Vec<BankAccount>>;

    async fn tutor_onboarding(&self, tutor_id: Id) -> PortResult<TutorOnboarding>;

    async fn tutor_profile(&self, tutor_id: Id) -> PortResult<TutorProfile>;

    // --- Admin ---
    /// Inserts a new verification row and repoints the tutor at it.
    async fn verify_tutor(
        &self,
        tutor_id: Id,
        admin_id: Id,
        status: VerificationStatus,
        notes: &str,
    ) -> PortResult<Verification>;

    async fn user_contact(&self, user_id: Id) -> PortResult<UserContact>;

    /// Replaces every stored result of `exam_type` for the tutor. Returns the rows written.
    async fn save_exam_results(
        &self,
        tutor_id: Id,
        exam_type: ExamType,
        results: Vec<ExamResult>,
    ) -> PortResult<usize>;

    async fn exam_results(&self, tutor_id: Id, exam_type: ExamType) -> PortResult<Vec<ExamResult>>;

    async fn list_tutors(&self) -> PortResult<Vec<TutorOverview>>;

    async fn list_students(&self) -> PortResult<Vec<StudentOverview>>;

    async fn list_admins(&self) -> PortResult<Vec<AdminOverview>>;

    /// Every session, newest first.
    async fn list_all_sessions(&self) -> PortResult<Vec<SessionOverview>>;

    async fn list_all_notes(&self) -> PortResult<Vec<NoteOverview>>;

    async fn dashboard_counts(&self) -> PortResult<DashboardCounts>;

    // --- Student Browse (approved tutors only) ---
    async fn approved_mediums(&self) -> PortResult<Vec<String>>;

    async fn approved_grades(&self, medium: &str) -> PortResult<Vec<String>>;

    async fn approved_subjects(&self, medium: &str, grade: &str) -> PortResult<Vec<SubjectRef>>;

    async fn approved_tutors(
        &self,
        medium: &str,
        grade: &str,
        subject_id: Id,
    ) -> PortResult<Vec<TutorListing>>;

    // --- Session Notes ---
    async fn save_note(&self, session_id: Id, title: &str, document: Bytes) -> PortResult<Id>;

    async fn list_notes(&self, session_id: Id) -> PortResult<Vec<NoteSummary>>;

    async fn get_note(&self, session_id: Id, note_id: Id) -> PortResult<NoteDocument>;
}

/// A message for a user, already rendered as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers one notification.
    async fn notify(&self, notification: &Notification) -> PortResult<()>;
}

/// Verdict of an antivirus scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected(String),
}

#[async_trait]
pub trait DocumentScanner: Send + Sync {
    /// Scans an uploaded document before it is persisted.
    async fn scan(&self, file_name: &str, contents: &[u8]) -> PortResult<ScanVerdict>;
}
