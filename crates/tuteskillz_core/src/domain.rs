//! crates/tuteskillz_core/src/domain.rs
//!
//! Defines the pure, core data structures for the marketplace.
//! These structs are independent of any database or serialization format.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Store-assigned identifier shared by every entity.
pub type Id = i64;

//=========================================================================================
// Status Enumerations
//=========================================================================================

/// Lifecycle status of a tutoring session.
///
/// ```text
/// Requested → Accepted → Submitted → Paid → Completed
///           ↘ Declined   ↘ Paid      ↘ Cancelled
///                        ↘ Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Requested,
    Accepted,
    Declined,
    /// The student opened a gateway checkout and payment is awaited.
    Submitted,
    Paid,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub const ALL: [Self; 7] = [
        Self::Requested,
        Self::Accepted,
        Self::Declined,
        Self::Submitted,
        Self::Paid,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Valid next states from the current state.
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Requested => &[Self::Accepted, Self::Declined],
            Self::Accepted => &[Self::Submitted, Self::Paid, Self::Cancelled],
            Self::Submitted => &[Self::Paid, Self::Cancelled],
            Self::Paid => &[Self::Completed, Self::Cancelled],
            Self::Declined | Self::Completed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next_states().is_empty()
    }

    /// Return the string representation used in SQL storage and on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "Requested",
            Self::Accepted => "Accepted",
            Self::Declined => "Declined",
            Self::Submitted => "Submitted",
            Self::Paid => "Paid",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownVariant::new("session status", s))
    }
}

/// The two answers a tutor may give to a requested session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TutorDecision {
    Accept,
    Decline,
}

impl TutorDecision {
    pub const fn target_status(self) -> SessionStatus {
        match self {
            Self::Accept => SessionStatus::Accepted,
            Self::Decline => SessionStatus::Declined,
        }
    }
}

impl FromStr for TutorDecision {
    type Err = UnknownVariant;

    /// Parses the status names `Accepted` and `Declined`, the only values a tutor may set.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Accepted" => Ok(Self::Accept),
            "Declined" => Ok(Self::Decline),
            other => Err(UnknownVariant::new("tutor decision", other)),
        }
    }
}

/// Outcome of an admin review. A tutor without any verification is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
        }
    }
}

impl FromStr for VerificationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariant::new("verification status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Failed,
}

impl PaymentStatus {
    /// Maps a gateway status code. Only `"2"` means the payment succeeded.
    pub fn from_gateway_code(code: &str) -> Self {
        if code.trim() == "2" {
            Self::Paid
        } else {
            Self::Failed
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "Paid",
            Self::Failed => "Failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Paid" => Ok(Self::Paid),
            "Failed" => Ok(Self::Failed),
            other => Err(UnknownVariant::new("payment status", other)),
        }
    }
}

/// School-leaving examination a transcript belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExamType {
    /// Ordinary Level.
    Ol,
    /// Advanced Level.
    Al,
}

impl ExamType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ol => "OL",
            Self::Al => "AL",
        }
    }
}

impl FromStr for ExamType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OL" => Ok(Self::Ol),
            "AL" => Ok(Self::Al),
            other => Err(UnknownVariant::new("exam type", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Tutor => "tutor",
            Self::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "tutor" => Ok(Self::Tutor),
            "admin" => Ok(Self::Admin),
            _ => Err(UnknownVariant::new("role", s)),
        }
    }
}

/// Day of a recurring weekly availability slot. Ordering follows the calendar week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [Self; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        }
    }

    /// Position in the week, Monday = 1.
    pub fn ordinal(self) -> i16 {
        Self::ALL.iter().position(|d| *d == self).unwrap_or(0) as i16 + 1
    }
}

impl FromStr for DayOfWeek {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|day| day.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownVariant::new("day of week", s))
    }
}

/// Returned when a stored or submitted string names no known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

//=========================================================================================
// People and Registration
//=========================================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

/// The personal details every user row carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub email: String,
    pub full_name: String,
    pub gender: Option<String>,
    pub dob: Option<NaiveDate>,
    pub phone: Option<String>,
    pub profile_photo: Option<Bytes>,
}

/// One (subject, grade, medium) combination a tutor offers at signup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeachingSubject {
    pub subject_id: Id,
    pub grade: String,
    pub teaching_medium: String,
}

#[derive(Debug, Clone, Default)]
pub struct TutorRegistration {
    pub profile: UserProfile,
    pub address: Address,
    pub school: Option<String>,
    pub university: Option<String>,
    pub bio: Option<String>,
    pub ol_transcript: Option<Bytes>,
    pub al_transcript: Option<Bytes>,
    pub subjects: Vec<TeachingSubject>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guardian {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StudentRegistration {
    pub profile: UserProfile,
    pub address: Address,
    pub guardian: Guardian,
    pub grade: String,
}

/// Public card of a tutor.
#[derive(Debug, Clone)]
pub struct TutorProfile {
    pub tutor_id: Id,
    pub full_name: String,
    pub profile_photo: Option<Bytes>,
}

//=========================================================================================
// Sessions
//=========================================================================================

/// One booked tutoring engagement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Id,
    pub tutor_subject_id: Id,
    pub student_id: Id,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: SessionStatus,
    pub student_note: Option<String>,
    pub tutor_note: Option<String>,
    pub meeting_url: Option<String>,
    pub verification_id: Option<Id>,
}

/// A student's booking request before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub tutor_subject_id: Id,
    pub student_id: Id,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub student_note: Option<String>,
}

/// A session joined with the names of everyone involved, as shown on dashboards.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session: Session,
    pub tutor_id: Id,
    pub tutor_name: String,
    pub student_name: String,
    pub subject_name: String,
    pub grade: String,
    pub teaching_medium: String,
    pub verification: Option<Verification>,
}

/// The bookable unit a student picks: one tutor's subject offering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorSubjectInfo {
    pub tutor_subject_id: Id,
    pub grade: String,
    pub teaching_medium: String,
    pub subject_id: Id,
    pub subject_name: String,
    pub tutor_id: Id,
    pub tutor_name: String,
}

//=========================================================================================
// Verification, Payments, Notes
//=========================================================================================

/// An admin decision. Rows are never mutated, only superseded by a newer one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub id: Id,
    pub status: VerificationStatus,
    pub kind: String,
    pub verified_by_admin_id: Id,
    pub verified_notes: String,
    pub verified_at: DateTime<Utc>,
}

/// Payment notification as delivered by the gateway webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotice {
    pub session_id: Id,
    /// Absent when the gateway omitted it.
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub id: Id,
    pub session_id: Id,
    /// Absent when the gateway omitted it.
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub status: PaymentStatus,
    pub method: Option<String>,
    pub provider: String,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A PDF the tutor shared for a session. Clones share the document buffer.
#[derive(Debug, Clone)]
pub struct NoteDocument {
    pub id: Id,
    pub session_id: Id,
    pub title: String,
    pub document: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSummary {
    pub id: Id,
    pub title: String,
}

//=========================================================================================
// Tutor Setup: Availability, Bank Details, Exam Results
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilitySlot {
    pub day: DayOfWeek,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccount {
    pub bank_name: String,
    pub branch: String,
    pub account_number: String,
    pub beneficiary_name: String,
    pub is_primary: bool,
}

/// One parsed transcript line: subject name and the letter grade achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamResult {
    pub subject: String,
    pub grade: String,
}

/// Where a tutor stands in the signup funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingStage {
    PendingVerification,
    VerificationRejected,
    Incomplete,
    Complete,
}

impl OnboardingStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingVerification => "pending_verification",
            Self::VerificationRejected => "verification_rejected",
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorOnboarding {
    pub stage: OnboardingStage,
    pub verification_id: Option<Id>,
    pub verification_status: Option<VerificationStatus>,
    pub has_availability: bool,
    pub has_bank_details: bool,
}

impl TutorOnboarding {
    /// Derives the stage from the tutor's current verification and setup counts.
    ///
    /// Setup flags are only reported once the tutor has been approved.
    pub fn derive(
        verification: Option<(Id, VerificationStatus)>,
        availability_count: i64,
        bank_count: i64,
    ) -> Self {
        match verification {
            None => Self {
                stage: OnboardingStage::PendingVerification,
                verification_id: None,
                verification_status: None,
                has_availability: false,
                has_bank_details: false,
            },
            Some((id, VerificationStatus::Rejected)) => Self {
                stage: OnboardingStage::VerificationRejected,
                verification_id: Some(id),
                verification_status: Some(VerificationStatus::Rejected),
                has_availability: false,
                has_bank_details: false,
            },
            Some((id, VerificationStatus::Approved)) => {
                let has_availability = availability_count > 0;
                let has_bank_details = bank_count > 0;
                let stage = if has_availability && has_bank_details {
                    OnboardingStage::Complete
                } else {
                    OnboardingStage::Incomplete
                };
                Self {
                    stage,
                    verification_id: Some(id),
                    verification_status: Some(VerificationStatus::Approved),
                    has_availability,
                    has_bank_details,
                }
            }
        }
    }
}

//=========================================================================================
// Browse and Admin Views
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectRef {
    pub subject_id: Id,
    pub subject_name: String,
}

/// An approved tutor offering shown to a browsing student.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorListing {
    pub tutor_subject_id: Id,
    pub tutor_id: Id,
    pub full_name: String,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TutorOverview {
    pub user_id: Id,
    pub full_name: String,
    pub email: String,
    pub verification_id: Option<Id>,
    pub verification_status: Option<VerificationStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentOverview {
    pub user_id: Id,
    pub full_name: String,
    pub email: String,
    pub guardian_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminOverview {
    pub user_id: Id,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOverview {
    pub session_id: Id,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub status: SessionStatus,
    pub tutor_name: String,
    pub student_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteOverview {
    pub note_id: Id,
    pub session_id: Id,
    pub session_date: NaiveDate,
    pub status: SessionStatus,
    pub tutor_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DashboardCounts {
    pub tutors: i64,
    pub students: i64,
    pub admins: i64,
    pub completed_sessions: i64,
    pub notes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declined_and_cancelled_are_terminal() {
        assert!(SessionStatus::Declined.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(!SessionStatus::Paid.is_terminal());
    }

    #[test]
    fn requested_only_moves_by_tutor_decision() {
        assert!(SessionStatus::Requested.can_transition_to(SessionStatus::Accepted));
        assert!(SessionStatus::Requested.can_transition_to(SessionStatus::Declined));
        assert!(!SessionStatus::Requested.can_transition_to(SessionStatus::Paid));
        assert!(!SessionStatus::Declined.can_transition_to(SessionStatus::Accepted));
    }

    #[test]
    fn status_round_trips_through_storage_string() {
        for status in SessionStatus::ALL {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
        assert!("Failed".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn tutor_decision_rejects_other_statuses() {
        assert_eq!("Accepted".parse::<TutorDecision>(), Ok(TutorDecision::Accept));
        assert_eq!("Declined".parse::<TutorDecision>(), Ok(TutorDecision::Decline));
        assert!("Paid".parse::<TutorDecision>().is_err());
        assert!("accepted".parse::<TutorDecision>().is_err());
    }

    #[test]
    fn only_code_two_is_a_successful_payment() {
        assert_eq!(PaymentStatus::from_gateway_code("2"), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::from_gateway_code("0"), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from_gateway_code("-2"), PaymentStatus::Failed);
    }

    #[test]
    fn days_sort_in_calendar_order() {
        let mut days = vec![DayOfWeek::Sunday, DayOfWeek::Monday, DayOfWeek::Thursday];
        days.sort();
        assert_eq!(days, vec![DayOfWeek::Monday, DayOfWeek::Thursday, DayOfWeek::Sunday]);
        assert_eq!(DayOfWeek::Monday.ordinal(), 1);
        assert_eq!(DayOfWeek::Sunday.ordinal(), 7);
    }

    #[test]
    fn onboarding_stages() {
        let pending = TutorOnboarding::derive(None, 3, 1);
        assert_eq!(pending.stage, OnboardingStage::PendingVerification);
        assert!(!pending.has_availability);

        let rejected = TutorOnboarding::derive(Some((4, VerificationStatus::Rejected)), 3, 1);
        assert_eq!(rejected.stage, OnboardingStage::VerificationRejected);

        let incomplete = TutorOnboarding::derive(Some((4, VerificationStatus::Approved)), 2, 0);
        assert_eq!(incomplete.stage, OnboardingStage::Incomplete);
        assert!(incomplete.has_availability);
        assert!(!incomplete.has_bank_details);

        let complete = TutorOnboarding::derive(Some((4, VerificationStatus::Approved)), 2, 1);
        assert_eq!(complete.stage, OnboardingStage::Complete);
    }
}
