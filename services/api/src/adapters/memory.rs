//! services/api/src/adapters/memory.rs
//!
//! An in-process implementation of the `TutoringStore` port.
//!
//! Every operation works on a copy of the tables while holding the store's mutex and
//! swaps the copy in only when the whole operation succeeded, so a failing step leaves
//! nothing behind. Documents and photos are `Bytes`, so the copy shares their buffers.
//! Referential checks mirror the foreign keys of the SQL schema.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use tuteskillz_core::conflict::{find_conflict, Booking, Interval, Party};
use tuteskillz_core::domain::{
    Address, AdminOverview, AvailabilitySlot, BankAccount, DashboardCounts, ExamResult, ExamType,
    Guardian, Id, NewSession, NoteDocument, NoteOverview, NoteSummary, Payment, PaymentNotice,
    PaymentStatus, Role, Session, SessionOverview, SessionStatus, SessionSummary,
    StudentOverview, StudentRegistration, SubjectRef, TeachingSubject, TutorDecision,
    TutorListing, TutorOnboarding, TutorOverview, TutorProfile, TutorRegistration,
    TutorSubjectInfo, UserProfile, Verification, VerificationStatus,
};
use tuteskillz_core::lifecycle::{self, PaymentEffect};
use tuteskillz_core::ports::{
    DecisionOutcome, PaymentRecorded, PortError, PortResult, RequestOutcome, TutoringStore,
    UserContact,
};

const PAYMENT_PROVIDER: &str = "PayHere";

//=========================================================================================
// Table Rows
//=========================================================================================

#[derive(Clone)]
struct UserRow {
    profile: UserProfile,
    role: Role,
}

#[derive(Clone)]
struct TutorRow {
    bio: Option<String>,
    verification_id: Option<Id>,
}

#[derive(Clone)]
struct StudentRow {
    guardian_id: Id,
}

#[derive(Clone)]
struct ExamRow {
    tutor_id: Id,
    exam_type: ExamType,
    subject_id: Id,
    grade: String,
}

#[derive(Clone, Default)]
struct Tables {
    sequence: Id,
    addresses: BTreeMap<Id, Address>,
    users: BTreeMap<Id, UserRow>,
    tutors: BTreeMap<Id, TutorRow>,
    guardians: BTreeMap<Id, Guardian>,
    students: BTreeMap<Id, StudentRow>,
    subjects: BTreeMap<Id, String>,
    tutor_subjects: BTreeMap<Id, (Id, TeachingSubject)>,
    sessions: BTreeMap<Id, Session>,
    verifications: BTreeMap<Id, Verification>,
    payments: BTreeMap<Id, Payment>,
    notes: BTreeMap<Id, NoteDocument>,
    availability: Vec<(Id, AvailabilitySlot)>,
    bank_details: Vec<(Id, BankAccount)>,
    exam_results: Vec<ExamRow>,
}

impl Tables {
    fn next_id(&mut self) -> Id {
        self.sequence += 1;
        self.sequence
    }

    fn insert_user(&mut self, profile: &UserProfile, role: Role) -> PortResult<Id> {
        if self.users.values().any(|u| u.profile.email == profile.email) {
            return Err(PortError::Validation(
                "Duplicate value violates users_email_key".to_string(),
            ));
        }
        let id = self.next_id();
        self.users.insert(
            id,
            UserRow {
                profile: profile.clone(),
                role,
            },
        );
        Ok(id)
    }

    fn user(&self, user_id: Id) -> PortResult<&UserRow> {
        self.users
            .get(&user_id)
            .ok_or_else(|| PortError::NotFound("User not found".to_string()))
    }

    fn user_name(&self, user_id: Id) -> PortResult<&str> {
        self.user(user_id).map(|u| u.profile.full_name.as_str())
    }

    fn session(&self, session_id: Id) -> PortResult<Session> {
        self.sessions
            .get(&session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound("Session not found".to_string()))
    }

    fn tutor_subject(&self, tutor_subject_id: Id) -> PortResult<&(Id, TeachingSubject)> {
        self.tutor_subjects
            .get(&tutor_subject_id)
            .ok_or_else(|| PortError::NotFound("Tutor subject not found".to_string()))
    }

    fn subject_by_name(&mut self, name: &str) -> Id {
        if let Some((id, _)) = self.subjects.iter().find(|(_, n)| n.eq_ignore_ascii_case(name)) {
            return *id;
        }
        let id = self.next_id();
        self.subjects.insert(id, name.to_string());
        id
    }

    fn current_verification(&self, tutor_id: Id) -> Option<&Verification> {
        self.tutors
            .get(&tutor_id)
            .and_then(|t| t.verification_id)
            .and_then(|id| self.verifications.get(&id))
    }

    fn is_approved(&self, tutor_id: Id) -> bool {
        self.current_verification(tutor_id)
            .is_some_and(|v| v.status == VerificationStatus::Approved)
    }

    /// Offerings of approved tutors.
    fn approved_offers(&self) -> impl Iterator<Item = (Id, Id, &TeachingSubject)> {
        self.tutor_subjects
            .iter()
            .filter(|(_, (tutor_id, _))| self.is_approved(*tutor_id))
            .map(|(id, (tutor_id, offer))| (*id, *tutor_id, offer))
    }

    fn blocking(&self, party: Party, date: NaiveDate) -> Vec<Booking> {
        self.sessions
            .values()
            .filter(|s| s.date == date && party.is_blocked_by(s.status))
            .filter(|s| match party {
                Party::Student(id) => s.student_id == id,
                Party::Tutor(id) => self
                    .tutor_subjects
                    .get(&s.tutor_subject_id)
                    .is_some_and(|(tutor_id, _)| *tutor_id == id),
            })
            .map(|s| Booking {
                session_id: s.id,
                date: s.date,
                start_time: s.start_time,
                duration_minutes: s.duration_minutes,
                status: s.status,
            })
            .collect()
    }

    fn summary(&self, session: &Session) -> PortResult<SessionSummary> {
        let (tutor_id, offer) = self.tutor_subject(session.tutor_subject_id)?;
        Ok(SessionSummary {
            session: session.clone(),
            tutor_id: *tutor_id,
            tutor_name: self.user_name(*tutor_id)?.to_string(),
            student_name: self.user_name(session.student_id)?.to_string(),
            subject_name: self.subjects.get(&offer.subject_id).cloned().unwrap_or_default(),
            grade: offer.grade.clone(),
            teaching_medium: offer.teaching_medium.clone(),
            verification: session
                .verification_id
                .and_then(|id| self.verifications.get(&id))
                .cloned(),
        })
    }

    fn transition(&mut self, session_id: Id, target: SessionStatus) -> PortResult<Session> {
        let session = self
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| PortError::NotFound("Session not found".to_string()))?;
        lifecycle::ensure_transition(session_id, session.status, target)?;
        session.status = target;
        Ok(session.clone())
    }
}

//=========================================================================================
// The Adapter
//=========================================================================================

/// A `TutoringStore` held entirely in memory. Used by tests and by `DATABASE_URL=memory://`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `op` against a working copy and publishes it only on success.
    async fn transact<T>(&self, op: impl FnOnce(&mut Tables) -> PortResult<T>) -> PortResult<T> {
        let mut tables = self.tables.lock().await;
        let mut working = tables.clone();
        let out = op(&mut working)?;
        *tables = working;
        Ok(out)
    }

    async fn read<T>(&self, op: impl FnOnce(&Tables) -> PortResult<T>) -> PortResult<T> {
        let tables = self.tables.lock().await;
        op(&tables)
    }

    /// Seeds an administrator. Admin accounts are provisioned outside the HTTP surface.
    pub async fn insert_admin(&self, full_name: &str, email: &str) -> PortResult<Id> {
        let profile = UserProfile {
            email: email.to_string(),
            full_name: full_name.to_string(),
            ..UserProfile::default()
        };
        self.transact(|t| t.insert_user(&profile, Role::Admin)).await
    }
}

#[async_trait]
impl TutoringStore for MemoryStore {
    async fn request_session(&self, request: NewSession) -> PortResult<RequestOutcome> {
        self.transact(|t| {
            t.tutor_subject(request.tutor_subject_id)?;
            if !t.students.contains_key(&request.student_id) {
                return Err(PortError::NotFound("Student not found".to_string()));
            }

            let existing = t.blocking(Party::Student(request.student_id), request.date);
            let proposed = Interval::starting_at(request.start_time, request.duration_minutes);
            if let Some(hit) = find_conflict(request.date, proposed, &existing) {
                debug!(student_id = request.student_id, conflicting = hit.session_id, "Request conflicts");
                return Ok(RequestOutcome::Conflict(hit.clone()));
            }

            let id = t.next_id();
            t.sessions.insert(
                id,
                Session {
                    id,
                    tutor_subject_id: request.tutor_subject_id,
                    student_id: request.student_id,
                    date: request.date,
                    start_time: request.start_time,
                    duration_minutes: request.duration_minutes,
                    status: SessionStatus::Requested,
                    student_note: request.student_note.clone(),
                    tutor_note: None,
                    meeting_url: None,
                    verification_id: None,
                },
            );
            Ok(RequestOutcome::Created(id))
        })
        .await
    }

    async fn decide_session(
        &self,
        session_id: Id,
        decision: TutorDecision,
        tutor_note: Option<String>,
    ) -> PortResult<DecisionOutcome> {
        self.transact(|t| {
            let session = t.session(session_id)?;
            let target = decision.target_status();
            lifecycle::ensure_transition(session_id, session.status, target)?;

            if decision == TutorDecision::Accept {
                let tutor_id = t.tutor_subject(session.tutor_subject_id)?.0;
                let existing: Vec<Booking> = t
                    .blocking(Party::Tutor(tutor_id), session.date)
                    .into_iter()
                    .filter(|b| b.session_id != session_id)
                    .collect();
                let proposed = Interval::starting_at(session.start_time, session.duration_minutes);
                if let Some(hit) = find_conflict(session.date, proposed, &existing) {
                    debug!(session_id, conflicting = hit.session_id, "Accept conflicts");
                    return Ok(DecisionOutcome::Conflict(hit.clone()));
                }
            }

            let row = t
                .sessions
                .get_mut(&session_id)
                .ok_or_else(|| PortError::NotFound("Session not found".to_string()))?;
            row.status = target;
            row.tutor_note = tutor_note;
            Ok(DecisionOutcome::Updated(row.clone()))
        })
        .await
    }

    async fn open_checkout(&self, session_id: Id) -> PortResult<Session> {
        self.transact(|t| {
            let session = t.session(session_id)?;
            match lifecycle::checkout_transition(session_id, session.status)? {
                Some(next) => t.transition(session_id, next),
                None => Ok(session),
            }
        })
        .await
    }

    async fn record_payment(
        &self,
        notice: PaymentNotice,
        meeting_base_url: &str,
    ) -> PortResult<PaymentRecorded> {
        self.transact(|t| {
            let mut session = t.session(notice.session_id)?;

            let payment_id = t.next_id();
            t.payments.insert(
                payment_id,
                Payment {
                    id: payment_id,
                    session_id: notice.session_id,
                    amount: notice.amount.clone(),
                    currency: notice.currency.clone(),
                    status: notice.status,
                    method: notice.method.clone(),
                    provider: PAYMENT_PROVIDER.to_string(),
                    transaction_id: notice.transaction_id.clone(),
                    created_at: Utc::now(),
                },
            );

            let effect = lifecycle::payment_effect(session.status, notice.status);
            match effect {
                PaymentEffect::MarkPaid => {
                    session.status = SessionStatus::Paid;
                    session.meeting_url =
                        Some(lifecycle::meeting_url(meeting_base_url, session.id, Utc::now()));
                    t.sessions.insert(session.id, session.clone());
                }
                PaymentEffect::AlreadyPaid => {
                    info!(session_id = session.id, "Duplicate successful payment logged");
                }
                PaymentEffect::Unchanged => {
                    if notice.status == PaymentStatus::Paid {
                        warn!(session_id = session.id, status = %session.status, "Payment for a session that cannot be paid");
                    }
                }
            }

            Ok(PaymentRecorded {
                payment_id,
                effect,
                session,
            })
        })
        .await
    }

    async fn complete_session(&self, session_id: Id) -> PortResult<Session> {
        self.transact(|t| t.transition(session_id, SessionStatus::Completed))
            .await
    }

    async fn cancel_session(&self, session_id: Id) -> PortResult<Session> {
        self.transact(|t| t.transition(session_id, SessionStatus::Cancelled))
            .await
    }

    async fn get_session(&self, session_id: Id) -> PortResult<Session> {
        self.read(|t| t.session(session_id)).await
    }

    async fn get_session_detail(&self, session_id: Id) -> PortResult<SessionSummary> {
        self.read(|t| t.summary(&t.session(session_id)?)).await
    }

    async fn list_sessions_for(
        &self,
        party: Party,
        status: Option<SessionStatus>,
    ) -> PortResult<Vec<SessionSummary>> {
        self.read(|t| {
            let mut sessions: Vec<&Session> = t
                .sessions
                .values()
                .filter(|s| status.map_or(true, |wanted| s.status == wanted))
                .filter(|s| match party {
                    Party::Student(id) => s.student_id == id,
                    Party::Tutor(id) => t
                        .tutor_subjects
                        .get(&s.tutor_subject_id)
                        .is_some_and(|(tutor_id, _)| *tutor_id == id),
                })
                .collect();
            sessions.sort_by_key(|s| (s.date, s.start_time, s.id));
            sessions.into_iter().map(|s| t.summary(s)).collect()
        })
        .await
    }

    async fn blocking_bookings(&self, party: Party, date: NaiveDate) -> PortResult<Vec<Booking>> {
        self.read(|t| Ok(t.blocking(party, date))).await
    }

    async fn get_tutor_subject_info(&self, tutor_subject_id: Id) -> PortResult<TutorSubjectInfo> {
        self.read(|t| {
            let (tutor_id, offer) = t
                .tutor_subjects
                .get(&tutor_subject_id)
                .ok_or_else(|| PortError::NotFound("Tutor not found".to_string()))?;
            Ok(TutorSubjectInfo {
                tutor_subject_id,
                grade: offer.grade.clone(),
                teaching_medium: offer.teaching_medium.clone(),
                subject_id: offer.subject_id,
                subject_name: t.subjects.get(&offer.subject_id).cloned().unwrap_or_default(),
                tutor_id: *tutor_id,
                tutor_name: t.user_name(*tutor_id)?.to_string(),
            })
        })
        .await
    }

    async fn payments_for_session(&self, session_id: Id) -> PortResult<Vec<Payment>> {
        self.read(|t| {
            Ok(t.payments
                .values()
                .filter(|p| p.session_id == session_id)
                .cloned()
                .collect())
        })
        .await
    }

    async fn register_tutor(&self, registration: TutorRegistration) -> PortResult<Id> {
        let user_id = self
            .transact(|t| {
                let address_id = t.next_id();
                t.addresses.insert(address_id, registration.address.clone());
                let user_id = t.insert_user(&registration.profile, Role::Tutor)?;
                t.tutors.insert(
                    user_id,
                    TutorRow {
                        bio: registration.bio.clone(),
                        verification_id: None,
                    },
                );
                for subject in &registration.subjects {
                    if !t.subjects.contains_key(&subject.subject_id) {
                        return Err(PortError::NotFound(
                            "Referenced record does not exist (tutor_subject_subject_id_fkey)"
                                .to_string(),
                        ));
                    }
                    let id = t.next_id();
                    t.tutor_subjects.insert(id, (user_id, subject.clone()));
                }
                Ok(user_id)
            })
            .await?;
        info!(user_id, subjects = registration.subjects.len(), "Tutor registered");
        Ok(user_id)
    }

    async fn register_student(&self, registration: StudentRegistration) -> PortResult<Id> {
        let user_id = self
            .transact(|t| {
                let address_id = t.next_id();
                t.addresses.insert(address_id, registration.address.clone());
                let guardian_id = t.next_id();
                t.guardians.insert(guardian_id, registration.guardian.clone());
                let user_id = t.insert_user(&registration.profile, Role::Student)?;
                t.students.insert(user_id, StudentRow { guardian_id });
                Ok(user_id)
            })
            .await?;
        info!(user_id, "Student registered");
        Ok(user_id)
    }

    async fn list_subjects(&self) -> PortResult<Vec<SubjectRef>> {
        self.read(|t| {
            let mut subjects: Vec<SubjectRef> = t
                .subjects
                .iter()
                .map(|(id, name)| SubjectRef {
                    subject_id: *id,
                    subject_name: name.clone(),
                })
                .collect();
            subjects.sort_by(|a, b| a.subject_name.cmp(&b.subject_name));
            Ok(subjects)
        })
        .await
    }

    async fn create_subject(&self, subject_name: &str) -> PortResult<SubjectRef> {
        self.transact(|t| {
            if t.subjects.values().any(|n| n.eq_ignore_ascii_case(subject_name)) {
                return Err(PortError::Validation(
                    "Duplicate value violates subject_name_ci_idx".to_string(),
                ));
            }
            let subject_id = t.next_id();
            t.subjects.insert(subject_id, subject_name.to_string());
            Ok(SubjectRef {
                subject_id,
                subject_name: subject_name.to_string(),
            })
        })
        .await
    }

    async fn save_availability(&self, tutor_id: Id, slots: Vec<AvailabilitySlot>) -> PortResult<()> {
        self.transact(|t| {
            if !t.tutors.contains_key(&tutor_id) {
                return Err(PortError::NotFound("Tutor not found".to_string()));
            }
            t.availability
                .extend(slots.into_iter().map(|slot| (tutor_id, slot)));
            Ok(())
        })
        .await
    }

    async fn list_availability(&self, tutor_id: Id) -> PortResult<Vec<AvailabilitySlot>> {
        self.read(|t| {
            let mut slots: Vec<AvailabilitySlot> = t
                .availability
                .iter()
                .filter(|(owner, _)| *owner == tutor_id)
                .map(|(_, slot)| slot.clone())
                .collect();
            slots.sort_by_key(|s| (s.day, s.start_time));
            Ok(slots)
        })
        .await
    }

    async fn save_bank_details(&self, tutor_id: Id, accounts: Vec<BankAccount>) -> PortResult<()> {
        self.transact(|t| {
            if !t.tutors.contains_key(&tutor_id) {
                return Err(PortError::NotFound("Tutor not found".to_string()));
            }
            for account in accounts {
                if account.is_primary {
                    t.bank_details
                        .iter_mut()
                        .filter(|(owner, _)| *owner == tutor_id)
                        .for_each(|(_, existing)| existing.is_primary = false);
                }
                t.bank_details.push((tutor_id, account));
            }
            Ok(())
        })
        .await
    }

    async fn list_bank_details(&self, tutor_id: Id) -> PortResult<Vec<BankAccount>> {
        self.read(|t| {
            Ok(t.bank_details
                .iter()
                .filter(|(owner, _)| *owner == tutor_id)
                .map(|(_, account)| account.clone())
                .collect())
        })
        .await
    }

    async fn tutor_onboarding(&self, tutor_id: Id) -> PortResult<TutorOnboarding> {
        self.read(|t| {
            if !t.tutors.contains_key(&tutor_id) {
                return Err(PortError::NotFound("Tutor not found".to_string()));
            }
            let verification = t.current_verification(tutor_id).map(|v| (v.id, v.status));
            let availability = t.availability.iter().filter(|(o, _)| *o == tutor_id).count();
            let banks = t.bank_details.iter().filter(|(o, _)| *o == tutor_id).count();
            Ok(TutorOnboarding::derive(
                verification,
                availability as i64,
                banks as i64,
            ))
        })
        .await
    }

    async fn tutor_profile(&self, tutor_id: Id) -> PortResult<TutorProfile> {
        self.read(|t| {
            if !t.tutors.contains_key(&tutor_id) {
                return Err(PortError::NotFound("Tutor not found".to_string()));
            }
            let user = t.user(tutor_id)?;
            Ok(TutorProfile {
                tutor_id,
                full_name: user.profile.full_name.clone(),
                profile_photo: user.profile.profile_photo.clone(),
            })
        })
        .await
    }

    async fn verify_tutor(
        &self,
        tutor_id: Id,
        admin_id: Id,
        status: VerificationStatus,
        notes: &str,
    ) -> PortResult<Verification> {
        let verification = self
            .transact(|t| {
                if !t.tutors.contains_key(&tutor_id) {
                    return Err(PortError::NotFound("Tutor not found".to_string()));
                }
                if !t.users.get(&admin_id).is_some_and(|u| u.role == Role::Admin) {
                    return Err(PortError::NotFound("Admin not found".to_string()));
                }
                let id = t.next_id();
                let verification = Verification {
                    id,
                    status,
                    kind: "tutor".to_string(),
                    verified_by_admin_id: admin_id,
                    verified_notes: notes.to_string(),
                    verified_at: Utc::now(),
                };
                t.verifications.insert(id, verification.clone());
                if let Some(tutor) = t.tutors.get_mut(&tutor_id) {
                    tutor.verification_id = Some(id);
                }
                Ok(verification)
            })
            .await?;
        info!(tutor_id, verification_id = verification.id, status = status.as_str(), "Tutor verification recorded");
        Ok(verification)
    }

    async fn user_contact(&self, user_id: Id) -> PortResult<UserContact> {
        self.read(|t| {
            let user = t.user(user_id)?;
            Ok(UserContact {
                email: user.profile.email.clone(),
                full_name: user.profile.full_name.clone(),
            })
        })
        .await
    }

    async fn save_exam_results(
        &self,
        tutor_id: Id,
        exam_type: ExamType,
        results: Vec<ExamResult>,
    ) -> PortResult<usize> {
        self.transact(|t| {
            if !t.tutors.contains_key(&tutor_id) {
                return Err(PortError::NotFound("Tutor not found".to_string()));
            }
            t.exam_results
                .retain(|r| !(r.tutor_id == tutor_id && r.exam_type == exam_type));

            for result in results {
                let subject_id = t.subject_by_name(&result.subject);
                let existing = t.exam_results.iter().position(|r| {
                    r.tutor_id == tutor_id && r.exam_type == exam_type && r.subject_id == subject_id
                });
                match existing {
                    Some(index) => t.exam_results[index].grade = result.grade,
                    None => t.exam_results.push(ExamRow {
                        tutor_id,
                        exam_type,
                        subject_id,
                        grade: result.grade,
                    }),
                }
            }
            Ok(t.exam_results
                .iter()
                .filter(|r| r.tutor_id == tutor_id && r.exam_type == exam_type)
                .count())
        })
        .await
    }

    async fn exam_results(&self, tutor_id: Id, exam_type: ExamType) -> PortResult<Vec<ExamResult>> {
        self.read(|t| {
            let mut results: Vec<ExamResult> = t
                .exam_results
                .iter()
                .filter(|r| r.tutor_id == tutor_id && r.exam_type == exam_type)
                .map(|r| ExamResult {
                    subject: t.subjects.get(&r.subject_id).cloned().unwrap_or_default(),
                    grade: r.grade.clone(),
                })
                .collect();
            results.sort_by(|a, b| a.subject.cmp(&b.subject));
            Ok(results)
        })
        .await
    }

    async fn list_tutors(&self) -> PortResult<Vec<TutorOverview>> {
        self.read(|t| {
            t.tutors
                .keys()
                .map(|id| {
                    let user = t.user(*id)?;
                    let verification = t.current_verification(*id);
                    Ok(TutorOverview {
                        user_id: *id,
                        full_name: user.profile.full_name.clone(),
                        email: user.profile.email.clone(),
                        verification_id: verification.map(|v| v.id),
                        verification_status: verification.map(|v| v.status),
                    })
                })
                .collect()
        })
        .await
    }

    async fn list_students(&self) -> PortResult<Vec<StudentOverview>> {
        self.read(|t| {
            t.students
                .iter()
                .map(|(id, student)| {
                    let user = t.user(*id)?;
                    Ok(StudentOverview {
                        user_id: *id,
                        full_name: user.profile.full_name.clone(),
                        email: user.profile.email.clone(),
                        guardian_name: t
                            .guardians
                            .get(&student.guardian_id)
                            .map(|g| g.full_name.clone())
                            .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .await
    }

    async fn list_admins(&self) -> PortResult<Vec<AdminOverview>> {
        self.read(|t| {
            Ok(t.users
                .iter()
                .filter(|(_, u)| u.role == Role::Admin)
                .map(|(id, u)| AdminOverview {
                    user_id: *id,
                    full_name: u.profile.full_name.clone(),
                    email: u.profile.email.clone(),
                    phone: u.profile.phone.clone(),
                })
                .collect())
        })
        .await
    }

    async fn list_all_sessions(&self) -> PortResult<Vec<SessionOverview>> {
        self.read(|t| {
            let mut sessions = t
                .sessions
                .values()
                .map(|s| {
                    let summary = t.summary(s)?;
                    Ok(SessionOverview {
                        session_id: s.id,
                        date: s.date,
                        start_time: s.start_time,
                        status: s.status,
                        tutor_name: summary.tutor_name,
                        student_name: summary.student_name,
                    })
                })
                .collect::<PortResult<Vec<_>>>()?;
            sessions.sort_by(|a, b| (b.date, b.start_time).cmp(&(a.date, a.start_time)));
            Ok(sessions)
        })
        .await
    }

    async fn list_all_notes(&self) -> PortResult<Vec<NoteOverview>> {
        self.read(|t| {
            t.notes
                .values()
                .map(|note| {
                    let session = t.session(note.session_id)?;
                    let summary = t.summary(&session)?;
                    Ok(NoteOverview {
                        note_id: note.id,
                        session_id: note.session_id,
                        session_date: session.date,
                        status: session.status,
                        tutor_name: summary.tutor_name,
                    })
                })
                .collect()
        })
        .await
    }

    async fn dashboard_counts(&self) -> PortResult<DashboardCounts> {
        self.read(|t| {
            let count_role = |role: Role| t.users.values().filter(|u| u.role == role).count() as i64;
            Ok(DashboardCounts {
                tutors: count_role(Role::Tutor),
                students: count_role(Role::Student),
                admins: count_role(Role::Admin),
                completed_sessions: t
                    .sessions
                    .values()
                    .filter(|s| s.status == SessionStatus::Completed)
                    .count() as i64,
                notes: t.notes.len() as i64,
            })
        })
        .await
    }

    async fn approved_mediums(&self) -> PortResult<Vec<String>> {
        self.read(|t| {
            let mediums: BTreeSet<String> = t
                .approved_offers()
                .map(|(_, _, offer)| offer.teaching_medium.clone())
                .collect();
            Ok(mediums.into_iter().collect())
        })
        .await
    }

    async fn approved_grades(&self, medium: &str) -> PortResult<Vec<String>> {
        self.read(|t| {
            let grades: BTreeSet<String> = t
                .approved_offers()
                .filter(|(_, _, offer)| offer.teaching_medium == medium)
                .map(|(_, _, offer)| offer.grade.clone())
                .collect();
            Ok(grades.into_iter().collect())
        })
        .await
    }

    async fn approved_subjects(&self, medium: &str, grade: &str) -> PortResult<Vec<SubjectRef>> {
        self.read(|t| {
            let subjects: BTreeSet<(String, Id)> = t
                .approved_offers()
                .filter(|(_, _, offer)| offer.teaching_medium == medium && offer.grade == grade)
                .map(|(_, _, offer)| {
                    let name = t.subjects.get(&offer.subject_id).cloned().unwrap_or_default();
                    (name, offer.subject_id)
                })
                .collect();
            Ok(subjects
                .into_iter()
                .map(|(subject_name, subject_id)| SubjectRef { subject_id, subject_name })
                .collect())
        })
        .await
    }

    async fn approved_tutors(
        &self,
        medium: &str,
        grade: &str,
        subject_id: Id,
    ) -> PortResult<Vec<TutorListing>> {
        self.read(|t| {
            t.approved_offers()
                .filter(|(_, _, offer)| {
                    offer.teaching_medium == medium
                        && offer.grade == grade
                        && offer.subject_id == subject_id
                })
                .map(|(tutor_subject_id, tutor_id, _)| {
                    Ok(TutorListing {
                        tutor_subject_id,
                        tutor_id,
                        full_name: t.user_name(tutor_id)?.to_string(),
                        bio: t.tutors.get(&tutor_id).and_then(|row| row.bio.clone()),
                    })
                })
                .collect()
        })
        .await
    }

    async fn save_note(&self, session_id: Id, title: &str, document: Bytes) -> PortResult<Id> {
        self.transact(|t| {
            t.session(session_id)?;
            let id = t.next_id();
            t.notes.insert(
                id,
                NoteDocument {
                    id,
                    session_id,
                    title: title.to_string(),
                    document,
                },
            );
            Ok(id)
        })
        .await
    }

    async fn list_notes(&self, session_id: Id) -> PortResult<Vec<NoteSummary>> {
        self.read(|t| {
            Ok(t.notes
                .values()
                .filter(|n| n.session_id == session_id)
                .map(|n| NoteSummary {
                    id: n.id,
                    title: n.title.clone(),
                })
                .collect())
        })
        .await
    }

    async fn get_note(&self, session_id: Id, note_id: Id) -> PortResult<NoteDocument> {
        self.read(|t| {
            t.notes
                .get(&note_id)
                .filter(|n| n.session_id == session_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound("Note not found".to_string()))
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveTime;
    use pretty_assertions::assert_eq;

    pub(crate) struct Fixture {
        pub admin_id: Id,
        pub tutor_id: Id,
        pub tutor_subject_id: Id,
        pub subject_id: Id,
        pub students: [Id; 2],
    }

    pub(crate) fn tutor_registration(email: &str, subject_ids: &[Id]) -> TutorRegistration {
        TutorRegistration {
            profile: UserProfile {
                email: email.to_string(),
                full_name: "Nimal Perera".to_string(),
                ..UserProfile::default()
            },
            bio: Some("Physics teacher".to_string()),
            subjects: subject_ids
                .iter()
                .map(|id| TeachingSubject {
                    subject_id: *id,
                    grade: "Grade 10".to_string(),
                    teaching_medium: "English".to_string(),
                })
                .collect(),
            ..TutorRegistration::default()
        }
    }

    pub(crate) fn student_registration(email: &str, name: &str) -> StudentRegistration {
        StudentRegistration {
            profile: UserProfile {
                email: email.to_string(),
                full_name: name.to_string(),
                ..UserProfile::default()
            },
            guardian: Guardian {
                full_name: "Guardian".to_string(),
                ..Guardian::default()
            },
            grade: "Grade 10".to_string(),
            ..StudentRegistration::default()
        }
    }

    pub(crate) async fn seeded() -> (MemoryStore, Fixture) {
        let store = MemoryStore::new();
        let admin_id = store.insert_admin("Admin", "admin@tuteskillz.lk").await.unwrap();
        let subject = store.create_subject("Physics").await.unwrap();
        let tutor_id = store
            .register_tutor(tutor_registration("tutor@tuteskillz.lk", &[subject.subject_id]))
            .await
            .unwrap();
        let first = store
            .register_student(student_registration("amaya@tuteskillz.lk", "Amaya"))
            .await
            .unwrap();
        let second = store
            .register_student(student_registration("kasun@tuteskillz.lk", "Kasun"))
            .await
            .unwrap();
        let tutor_subject_id = store
            .read(|t| Ok(*t.tutor_subjects.keys().next().unwrap()))
            .await
            .unwrap();
        (
            store,
            Fixture {
                admin_id,
                tutor_id,
                tutor_subject_id,
                subject_id: subject.subject_id,
                students: [first, second],
            },
        )
    }

    pub(crate) fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    pub(crate) fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    pub(crate) fn new_session(fx: &Fixture, student_id: Id, start: NaiveTime) -> NewSession {
        NewSession {
            tutor_subject_id: fx.tutor_subject_id,
            student_id,
            date: day(),
            start_time: start,
            duration_minutes: 120,
            student_note: None,
        }
    }

    async fn create(store: &MemoryStore, request: NewSession) -> Id {
        match store.request_session(request).await.unwrap() {
            RequestOutcome::Created(id) => id,
            other => panic!("expected a new session, got {other:?}"),
        }
    }

    pub(crate) fn paid_notice(session_id: Id, status: PaymentStatus) -> PaymentNotice {
        PaymentNotice {
            session_id,
            amount: Some("1000.00".to_string()),
            currency: Some("LKR".to_string()),
            status,
            method: Some("VISA".to_string()),
            transaction_id: Some("320025".to_string()),
        }
    }

    #[tokio::test]
    async fn failed_subject_insert_rolls_back_registration() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for name in ["Maths", "Science", "English", "History"] {
            ids.push(store.create_subject(name).await.unwrap().subject_id);
        }
        ids.insert(2, 9_999);

        let err = store
            .register_tutor(tutor_registration("tutor@tuteskillz.lk", &ids))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));

        let tables = store.tables.lock().await;
        assert!(tables.users.is_empty());
        assert!(tables.addresses.is_empty());
        assert!(tables.tutors.is_empty());
        assert!(tables.tutor_subjects.is_empty());
        assert_eq!(tables.subjects.len(), 4);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let (store, _) = seeded().await;
        let err = store
            .register_student(student_registration("amaya@tuteskillz.lk", "Other"))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
        assert_eq!(store.list_students().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn overlapping_request_for_same_student_is_a_conflict() {
        let (store, fx) = seeded().await;
        let first = create(&store, new_session(&fx, fx.students[0], at(10, 0))).await;

        let outcome = store
            .request_session(new_session(&fx, fx.students[0], at(11, 0)))
            .await
            .unwrap();
        match outcome {
            RequestOutcome::Conflict(hit) => assert_eq!(hit.session_id, first),
            other => panic!("expected conflict, got {other:?}"),
        }

        // Back-to-back is allowed.
        create(&store, new_session(&fx, fx.students[0], at(12, 0))).await;
        // Another student is unaffected.
        create(&store, new_session(&fx, fx.students[1], at(11, 0))).await;
    }

    #[tokio::test]
    async fn declined_sessions_do_not_block_the_student() {
        let (store, fx) = seeded().await;
        let first = create(&store, new_session(&fx, fx.students[0], at(10, 0))).await;
        store
            .decide_session(first, TutorDecision::Decline, None)
            .await
            .unwrap();
        create(&store, new_session(&fx, fx.students[0], at(10, 30))).await;
    }

    #[tokio::test]
    async fn request_for_unknown_offer_is_not_found() {
        let (store, fx) = seeded().await;
        let mut request = new_session(&fx, fx.students[0], at(10, 0));
        request.tutor_subject_id = 9_999;
        let err = store.request_session(request).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn accepting_into_an_occupied_slot_is_a_conflict() {
        let (store, fx) = seeded().await;
        let a = create(&store, new_session(&fx, fx.students[0], at(10, 0))).await;
        let b = create(&store, new_session(&fx, fx.students[1], at(11, 0))).await;

        let accepted = store
            .decide_session(a, TutorDecision::Accept, Some("See you".into()))
            .await
            .unwrap();
        assert!(matches!(accepted, DecisionOutcome::Updated(ref s) if s.status == SessionStatus::Accepted));

        match store.decide_session(b, TutorDecision::Accept, None).await.unwrap() {
            DecisionOutcome::Conflict(hit) => assert_eq!(hit.session_id, a),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.get_session(b).await.unwrap().status, SessionStatus::Requested);

        // Declining never needs a free slot.
        store.decide_session(b, TutorDecision::Decline, None).await.unwrap();
        assert_eq!(store.get_session(b).await.unwrap().status, SessionStatus::Declined);
    }

    #[tokio::test]
    async fn deciding_twice_is_an_invalid_transition() {
        let (store, fx) = seeded().await;
        let id = create(&store, new_session(&fx, fx.students[0], at(10, 0))).await;
        store.decide_session(id, TutorDecision::Accept, None).await.unwrap();
        let err = store
            .decide_session(id, TutorDecision::Decline, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::InvalidState(_)));
    }

    #[tokio::test]
    async fn successful_payment_marks_paid_once() {
        let (store, fx) = seeded().await;
        let id = create(&store, new_session(&fx, fx.students[0], at(10, 0))).await;
        store.decide_session(id, TutorDecision::Accept, None).await.unwrap();
        store.open_checkout(id).await.unwrap();

        let first = store
            .record_payment(paid_notice(id, PaymentStatus::Paid), "https://meet.jit.si")
            .await
            .unwrap();
        assert_eq!(first.effect, PaymentEffect::MarkPaid);
        assert_eq!(first.session.status, SessionStatus::Paid);
        let url = first.session.meeting_url.clone().unwrap();
        assert!(url.starts_with(&format!("https://meet.jit.si/session_{id}_")));

        let again = store
            .record_payment(paid_notice(id, PaymentStatus::Paid), "https://meet.jit.si")
            .await
            .unwrap();
        assert_eq!(again.effect, PaymentEffect::AlreadyPaid);
        assert_eq!(store.get_session(id).await.unwrap().meeting_url, Some(url));
        assert_eq!(store.payments_for_session(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_payment_is_logged_without_changing_the_session() {
        let (store, fx) = seeded().await;
        let id = create(&store, new_session(&fx, fx.students[0], at(10, 0))).await;
        store.decide_session(id, TutorDecision::Accept, None).await.unwrap();

        let recorded = store
            .record_payment(paid_notice(id, PaymentStatus::Failed), "https://meet.jit.si")
            .await
            .unwrap();
        assert_eq!(recorded.effect, PaymentEffect::Unchanged);
        let session = store.get_session(id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Accepted);
        assert_eq!(session.meeting_url, None);

        let payments = store.payments_for_session(id).await.unwrap();
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].status, PaymentStatus::Failed);
        assert_eq!(payments[0].provider, "PayHere");
    }

    #[tokio::test]
    async fn payment_for_unknown_session_stores_nothing() {
        let (store, _) = seeded().await;
        let err = store
            .record_payment(paid_notice(9_999, PaymentStatus::Paid), "https://meet.jit.si")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        assert!(store.tables.lock().await.payments.is_empty());
    }

    #[tokio::test]
    async fn lifecycle_end_states() {
        let (store, fx) = seeded().await;
        let id = create(&store, new_session(&fx, fx.students[0], at(10, 0))).await;
        assert!(matches!(
            store.complete_session(id).await.unwrap_err(),
            PortError::InvalidState(_)
        ));
        assert!(matches!(
            store.open_checkout(id).await.unwrap_err(),
            PortError::InvalidState(_)
        ));

        store.decide_session(id, TutorDecision::Accept, None).await.unwrap();
        assert_eq!(store.open_checkout(id).await.unwrap().status, SessionStatus::Submitted);
        assert_eq!(store.open_checkout(id).await.unwrap().status, SessionStatus::Submitted);
        store
            .record_payment(paid_notice(id, PaymentStatus::Paid), "https://meet.jit.si")
            .await
            .unwrap();
        assert_eq!(store.complete_session(id).await.unwrap().status, SessionStatus::Completed);
        assert!(matches!(
            store.cancel_session(id).await.unwrap_err(),
            PortError::InvalidState(_)
        ));
        assert_eq!(store.dashboard_counts().await.unwrap().completed_sessions, 1);
    }

    #[tokio::test]
    async fn new_primary_account_demotes_existing_ones() {
        let (store, fx) = seeded().await;
        let account = |name: &str, primary: bool| BankAccount {
            bank_name: name.to_string(),
            branch: "Colombo".to_string(),
            account_number: "0012345".to_string(),
            beneficiary_name: "Nimal Perera".to_string(),
            is_primary: primary,
        };
        store
            .save_bank_details(fx.tutor_id, vec![account("BOC", true)])
            .await
            .unwrap();
        store
            .save_bank_details(fx.tutor_id, vec![account("HNB", true), account("NSB", false)])
            .await
            .unwrap();

        let primaries: Vec<String> = store
            .list_bank_details(fx.tutor_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.is_primary)
            .map(|a| a.bank_name)
            .collect();
        assert_eq!(primaries, vec!["HNB".to_string()]);
    }

    #[tokio::test]
    async fn exam_results_replace_previous_set() {
        let (store, fx) = seeded().await;
        let result = |subject: &str, grade: &str| ExamResult {
            subject: subject.to_string(),
            grade: grade.to_string(),
        };
        store
            .save_exam_results(fx.tutor_id, ExamType::Ol, vec![result("MATHEMATICS", "A"), result("SCIENCE", "B")])
            .await
            .unwrap();
        store
            .save_exam_results(fx.tutor_id, ExamType::Al, vec![result("PHYSICS", "A")])
            .await
            .unwrap();
        let written = store
            .save_exam_results(fx.tutor_id, ExamType::Ol, vec![result("ENGLISH", "C")])
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(
            store.exam_results(fx.tutor_id, ExamType::Ol).await.unwrap(),
            vec![result("ENGLISH", "C")]
        );
        assert_eq!(
            store.exam_results(fx.tutor_id, ExamType::Al).await.unwrap(),
            vec![result("Physics", "A")]
        );
    }

    #[tokio::test]
    async fn exam_results_reuse_catalogue_subject_regardless_of_case() {
        let (store, fx) = seeded().await;
        store
            .save_exam_results(
                fx.tutor_id,
                ExamType::Ol,
                vec![ExamResult {
                    subject: "PHYSICS".to_string(),
                    grade: "A".to_string(),
                }],
            )
            .await
            .unwrap();

        let subjects = store.list_subjects().await.unwrap();
        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].subject_id, fx.subject_id);

        let duplicate = store.create_subject("physics").await;
        assert!(matches!(duplicate, Err(PortError::Validation(_))));
    }

    #[tokio::test]
    async fn writes_do_not_copy_stored_documents() {
        let (store, fx) = seeded().await;
        let id = create(&store, new_session(&fx, fx.students[0], at(10, 0))).await;
        let pdf = Bytes::from(vec![b'%'; 1 << 20]);
        let note_id = store.save_note(id, "Week 1", pdf.clone()).await.unwrap();

        store
            .decide_session(id, TutorDecision::Decline, None)
            .await
            .unwrap();

        let stored = store.get_note(id, note_id).await.unwrap();
        assert_eq!(stored.document.as_ptr(), pdf.as_ptr());
        assert_eq!(stored.document.len(), pdf.len());
    }

    #[tokio::test]
    async fn latest_verification_wins_and_gates_browse() {
        let (store, fx) = seeded().await;
        assert!(store.approved_mediums().await.unwrap().is_empty());

        let rejected = store
            .verify_tutor(fx.tutor_id, fx.admin_id, VerificationStatus::Rejected, "Blurry transcript")
            .await
            .unwrap();
        let approved = store
            .verify_tutor(fx.tutor_id, fx.admin_id, VerificationStatus::Approved, "")
            .await
            .unwrap();
        assert_ne!(rejected.id, approved.id);

        let onboarding = store.tutor_onboarding(fx.tutor_id).await.unwrap();
        assert_eq!(onboarding.verification_id, Some(approved.id));
        assert_eq!(onboarding.verification_status, Some(VerificationStatus::Approved));

        assert_eq!(store.approved_mediums().await.unwrap(), vec!["English".to_string()]);
        let listings = store
            .approved_tutors("English", "Grade 10", fx.subject_id)
            .await
            .unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].tutor_subject_id, fx.tutor_subject_id);
    }

    #[tokio::test]
    async fn verification_requires_an_admin() {
        let (store, fx) = seeded().await;
        let err = store
            .verify_tutor(fx.tutor_id, fx.students[0], VerificationStatus::Approved, "")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
        assert_eq!(store.tutor_onboarding(fx.tutor_id).await.unwrap().verification_id, None);
    }

    #[tokio::test]
    async fn sessions_are_listed_in_calendar_order() {
        let (store, fx) = seeded().await;
        let late = create(&store, new_session(&fx, fx.students[0], at(15, 0))).await;
        let early = create(&store, new_session(&fx, fx.students[1], at(8, 0))).await;

        let ids: Vec<Id> = store
            .list_sessions_for(Party::Tutor(fx.tutor_id), None)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.session.id)
            .collect();
        assert_eq!(ids, vec![early, late]);

        let requested = store
            .list_sessions_for(Party::Student(fx.students[0]), Some(SessionStatus::Paid))
            .await
            .unwrap();
        assert!(requested.is_empty());
    }
}
