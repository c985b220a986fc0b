//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `TutoringStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Every trait method runs as one unit. Multi-row writes use a single transaction that
//! is only committed after the last step; returning early drops the transaction, which
//! rolls it back.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::HashSet;
use tracing::{debug, info, warn};
use tuteskillz_core::conflict::{find_conflict, Booking, Interval, Party};
use tuteskillz_core::domain::{
    AdminOverview, AvailabilitySlot, BankAccount, DashboardCounts, ExamResult, ExamType, Id,
    NewSession, NoteDocument, NoteOverview, NoteSummary, Payment, PaymentNotice, Session,
    SessionOverview, SessionStatus, SessionSummary, StudentOverview, StudentRegistration,
    SubjectRef, TutorDecision, TutorListing, TutorOnboarding, TutorOverview, TutorProfile,
    TutorRegistration, TutorSubjectInfo, Verification, VerificationStatus,
};
use tuteskillz_core::lifecycle::{self, PaymentEffect};
use tuteskillz_core::ports::{
    DecisionOutcome, PaymentRecorded, PortError, PortResult, RequestOutcome, TutoringStore,
    UserContact,
};

const PAYMENT_PROVIDER: &str = "PayHere";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `TutoringStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn begin(&self) -> PortResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(classify)
    }

    /// Applies a plain lifecycle move (complete, cancel) under a row lock.
    async fn transition(&self, session_id: Id, target: SessionStatus) -> PortResult<Session> {
        let mut tx = self.begin().await?;
        let mut session = lock_session(&mut tx, session_id).await?;
        lifecycle::ensure_transition(session_id, session.status, target)?;

        sqlx::query("UPDATE sessions SET session_status = $1 WHERE session_id = $2")
            .bind(target.as_str())
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        tx.commit().await.map_err(classify)?;

        info!(session_id, from = %session.status, to = %target, "Session transitioned");
        session.status = target;
        Ok(session)
    }
}

/// Maps driver errors onto port errors. Constraint violations are caller mistakes.
fn classify(e: sqlx::Error) -> PortError {
    if let sqlx::Error::Database(db) = &e {
        let constraint = db.constraint().unwrap_or("constraint").to_string();
        match db.code().as_deref() {
            Some("23503") => {
                return PortError::NotFound(format!("Referenced record does not exist ({constraint})"))
            }
            Some("23505") => {
                return PortError::Validation(format!("Duplicate value violates {constraint}"))
            }
            _ => {}
        }
    }
    PortError::Unexpected(e.to_string())
}

fn parse_status<T: std::str::FromStr>(raw: &str) -> PortResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| PortError::Unexpected(format!("Corrupt row: {e}")))
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const SESSION_COLUMNS: &str = "s.session_id, s.tutor_subject_id, s.student_id, s.date, \
     s.start_time, s.duration, s.session_status, s.student_note, s.tutor_note, s.meeting_url, \
     s.verification_id";

#[derive(FromRow)]
struct SessionRecord {
    session_id: i64,
    tutor_subject_id: i64,
    student_id: i64,
    date: NaiveDate,
    start_time: NaiveTime,
    duration: i32,
    session_status: String,
    student_note: Option<String>,
    tutor_note: Option<String>,
    meeting_url: Option<String>,
    verification_id: Option<i64>,
}
impl SessionRecord {
    fn to_domain(self) -> PortResult<Session> {
        Ok(Session {
            id: self.session_id,
            tutor_subject_id: self.tutor_subject_id,
            student_id: self.student_id,
            date: self.date,
            start_time: self.start_time,
            duration_minutes: self.duration,
            status: parse_status(&self.session_status)?,
            student_note: self.student_note,
            tutor_note: self.tutor_note,
            meeting_url: self.meeting_url,
            verification_id: self.verification_id,
        })
    }
}

const SUMMARY_SELECT: &str = "SELECT s.session_id, s.tutor_subject_id, s.student_id, s.date, \
     s.start_time, s.duration, s.session_status, s.student_note, s.tutor_note, s.meeting_url, \
     s.verification_id, ts.tutor_id, tu.full_name AS tutor_name, su.full_name AS student_name, \
     sub.subject_name, ts.grade, ts.teaching_medium, v.status AS verification_status, \
     v.type AS verification_type, v.verified_by_admin_id, v.verified_notes, v.verified_at \
     FROM sessions s \
     JOIN tutor_subject ts ON s.tutor_subject_id = ts.tutor_subject_id \
     JOIN subject sub ON ts.subject_id = sub.subject_id \
     JOIN users tu ON ts.tutor_id = tu.user_id \
     JOIN users su ON s.student_id = su.user_id \
     LEFT JOIN verification v ON s.verification_id = v.verification_id";

#[derive(FromRow)]
struct SummaryRecord {
    #[sqlx(flatten)]
    session: SessionRecord,
    tutor_id: i64,
    tutor_name: String,
    student_name: String,
    subject_name: String,
    grade: String,
    teaching_medium: String,
    verification_status: Option<String>,
    verification_type: Option<String>,
    verified_by_admin_id: Option<i64>,
    verified_notes: Option<String>,
    verified_at: Option<DateTime<Utc>>,
}
impl SummaryRecord {
    fn to_domain(self) -> PortResult<SessionSummary> {
        let verification = match (
            self.session.verification_id,
            self.verification_status,
            self.verified_by_admin_id,
            self.verified_at,
        ) {
            (Some(id), Some(status), Some(admin_id), Some(at)) => Some(Verification {
                id,
                status: parse_status(&status)?,
                kind: self.verification_type.unwrap_or_default(),
                verified_by_admin_id: admin_id,
                verified_notes: self.verified_notes.unwrap_or_default(),
                verified_at: at,
            }),
            _ => None,
        };
        Ok(SessionSummary {
            session: self.session.to_domain()?,
            tutor_id: self.tutor_id,
            tutor_name: self.tutor_name,
            student_name: self.student_name,
            subject_name: self.subject_name,
            grade: self.grade,
            teaching_medium: self.teaching_medium,
            verification,
        })
    }
}

#[derive(FromRow)]
struct BookingRecord {
    session_id: i64,
    date: NaiveDate,
    start_time: NaiveTime,
    duration: i32,
    session_status: String,
}
impl BookingRecord {
    fn to_domain(self) -> PortResult<Booking> {
        Ok(Booking {
            session_id: self.session_id,
            date: self.date,
            start_time: self.start_time,
            duration_minutes: self.duration,
            status: parse_status(&self.session_status)?,
        })
    }
}

#[derive(FromRow)]
struct VerificationRecord {
    verification_id: i64,
    status: String,
    #[sqlx(rename = "type")]
    kind: String,
    verified_by_admin_id: i64,
    verified_notes: String,
    verified_at: DateTime<Utc>,
}
impl VerificationRecord {
    fn to_domain(self) -> PortResult<Verification> {
        Ok(Verification {
            id: self.verification_id,
            status: parse_status(&self.status)?,
            kind: self.kind,
            verified_by_admin_id: self.verified_by_admin_id,
            verified_notes: self.verified_notes,
            verified_at: self.verified_at,
        })
    }
}

#[derive(FromRow)]
struct PaymentRecord {
    payment_id: i64,
    session_id: i64,
    amount: Option<String>,
    currency: Option<String>,
    payment_status: String,
    payment_method: Option<String>,
    provider: String,
    transaction_id: Option<String>,
    created_at: DateTime<Utc>,
}
impl PaymentRecord {
    fn to_domain(self) -> PortResult<Payment> {
        Ok(Payment {
            id: self.payment_id,
            session_id: self.session_id,
            amount: self.amount,
            currency: self.currency,
            status: parse_status(&self.payment_status)?,
            method: self.payment_method,
            provider: self.provider,
            transaction_id: self.transaction_id,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct TutorSubjectInfoRecord {
    tutor_subject_id: i64,
    grade: String,
    teaching_medium: String,
    subject_id: i64,
    subject_name: String,
    tutor_id: i64,
    tutor_name: String,
}

#[derive(FromRow)]
struct SlotRecord {
    day_of_week: String,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

#[derive(FromRow)]
struct BankRecord {
    bank_name: String,
    branch: String,
    account_number: String,
    beneficiary_name: String,
    is_primary: bool,
}

#[derive(FromRow)]
struct OnboardingRecord {
    verification_id: Option<i64>,
    verification_status: Option<String>,
    availability_count: i64,
    bank_count: i64,
}

#[derive(FromRow)]
struct TutorOverviewRecord {
    user_id: i64,
    full_name: String,
    email: String,
    verification_id: Option<i64>,
    verification_status: Option<String>,
}

#[derive(FromRow)]
struct SessionOverviewRecord {
    session_id: i64,
    date: NaiveDate,
    start_time: NaiveTime,
    session_status: String,
    tutor_name: String,
    student_name: String,
}

#[derive(FromRow)]
struct NoteOverviewRecord {
    note_id: i64,
    session_id: i64,
    session_date: NaiveDate,
    session_status: String,
    tutor_name: String,
}

//=========================================================================================
// Transaction Helpers
//=========================================================================================

/// Serialises booking writes for one party until the transaction ends.
async fn lock_party(tx: &mut Transaction<'_, Postgres>, party: Party) -> PortResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(party.lock_key())
        .execute(&mut **tx)
        .await
        .map_err(classify)?;
    Ok(())
}

async fn lock_session(tx: &mut Transaction<'_, Postgres>, session_id: Id) -> PortResult<Session> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.session_id = $1 FOR UPDATE");
    sqlx::query_as::<_, SessionRecord>(&sql)
        .bind(session_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(classify)?
        .ok_or_else(|| PortError::NotFound("Session not found".to_string()))?
        .to_domain()
}

async fn fetch_blocking(
    tx: &mut Transaction<'_, Postgres>,
    party: Party,
    date: NaiveDate,
) -> PortResult<Vec<Booking>> {
    let sql = match party {
        Party::Student(_) => {
            "SELECT s.session_id, s.date, s.start_time, s.duration, s.session_status \
             FROM sessions s \
             WHERE s.student_id = $1 AND s.date = $2 AND s.session_status = ANY($3) \
             ORDER BY s.session_id"
        }
        Party::Tutor(_) => {
            "SELECT s.session_id, s.date, s.start_time, s.duration, s.session_status \
             FROM sessions s \
             JOIN tutor_subject ts ON s.tutor_subject_id = ts.tutor_subject_id \
             WHERE ts.tutor_id = $1 AND s.date = $2 AND s.session_status = ANY($3) \
             ORDER BY s.session_id"
        }
    };
    let statuses: Vec<String> = party
        .blocking_statuses()
        .iter()
        .map(|s| s.as_str().to_string())
        .collect();

    sqlx::query_as::<_, BookingRecord>(sql)
        .bind(party.id())
        .bind(date)
        .bind(statuses)
        .fetch_all(&mut **tx)
        .await
        .map_err(classify)?
        .into_iter()
        .map(BookingRecord::to_domain)
        .collect()
}

async fn insert_address(
    tx: &mut Transaction<'_, Postgres>,
    address: &tuteskillz_core::domain::Address,
) -> PortResult<Id> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO address (street, city, province, postal_code) VALUES ($1, $2, $3, $4) \
         RETURNING address_id",
    )
    .bind(&address.street)
    .bind(&address.city)
    .bind(&address.province)
    .bind(&address.postal_code)
    .fetch_one(&mut **tx)
    .await
    .map_err(classify)
}

async fn insert_user(
    tx: &mut Transaction<'_, Postgres>,
    profile: &tuteskillz_core::domain::UserProfile,
    address_id: Id,
    role: tuteskillz_core::domain::Role,
) -> PortResult<Id> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (full_name, gender, dob, phone, address_id, email, role, profile_photo) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING user_id",
    )
    .bind(&profile.full_name)
    .bind(&profile.gender)
    .bind(profile.dob)
    .bind(&profile.phone)
    .bind(address_id)
    .bind(&profile.email)
    .bind(role.as_str())
    .bind(profile.profile_photo.as_deref())
    .fetch_one(&mut **tx)
    .await
    .map_err(classify)
}

//=========================================================================================
// `TutoringStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl TutoringStore for DbAdapter {
    async fn request_session(&self, request: NewSession) -> PortResult<RequestOutcome> {
        let party = Party::Student(request.student_id);
        let mut tx = self.begin().await?;
        lock_party(&mut tx, party).await?;

        let known_offer = sqlx::query_scalar::<_, i64>(
            "SELECT tutor_subject_id FROM tutor_subject WHERE tutor_subject_id = $1",
        )
        .bind(request.tutor_subject_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?;
        if known_offer.is_none() {
            return Err(PortError::NotFound("Tutor subject not found".to_string()));
        }
        let known_student =
            sqlx::query_scalar::<_, i64>("SELECT user_id FROM student WHERE user_id = $1")
                .bind(request.student_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(classify)?;
        if known_student.is_none() {
            return Err(PortError::NotFound("Student not found".to_string()));
        }

        let existing = fetch_blocking(&mut tx, party, request.date).await?;
        let proposed = Interval::starting_at(request.start_time, request.duration_minutes);
        if let Some(hit) = find_conflict(request.date, proposed, &existing) {
            debug!(student_id = request.student_id, conflicting = hit.session_id, "Request conflicts");
            return Ok(RequestOutcome::Conflict(hit.clone()));
        }

        let session_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO sessions \
               (tutor_subject_id, student_id, date, start_time, duration, student_note, session_status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING session_id",
        )
        .bind(request.tutor_subject_id)
        .bind(request.student_id)
        .bind(request.date)
        .bind(request.start_time)
        .bind(request.duration_minutes)
        .bind(&request.student_note)
        .bind(SessionStatus::Requested.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(RequestOutcome::Created(session_id))
    }

    async fn decide_session(
        &self,
        session_id: Id,
        decision: TutorDecision,
        tutor_note: Option<String>,
    ) -> PortResult<DecisionOutcome> {
        let mut tx = self.begin().await?;
        let mut session = lock_session(&mut tx, session_id).await?;
        let target = decision.target_status();
        lifecycle::ensure_transition(session_id, session.status, target)?;

        if decision == TutorDecision::Accept {
            let tutor_id = sqlx::query_scalar::<_, i64>(
                "SELECT tutor_id FROM tutor_subject WHERE tutor_subject_id = $1",
            )
            .bind(session.tutor_subject_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(classify)?;
            let party = Party::Tutor(tutor_id);
            lock_party(&mut tx, party).await?;

            let existing: Vec<Booking> = fetch_blocking(&mut tx, party, session.date)
                .await?
                .into_iter()
                .filter(|b| b.session_id != session_id)
                .collect();
            let proposed = Interval::starting_at(session.start_time, session.duration_minutes);
            if let Some(hit) = find_conflict(session.date, proposed, &existing) {
                debug!(session_id, conflicting = hit.session_id, "Accept conflicts");
                return Ok(DecisionOutcome::Conflict(hit.clone()));
            }
        }

        sqlx::query("UPDATE sessions SET session_status = $1, tutor_note = $2 WHERE session_id = $3")
            .bind(target.as_str())
            .bind(&tutor_note)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        tx.commit().await.map_err(classify)?;

        session.status = target;
        session.tutor_note = tutor_note;
        Ok(DecisionOutcome::Updated(session))
    }

    async fn open_checkout(&self, session_id: Id) -> PortResult<Session> {
        let mut tx = self.begin().await?;
        let mut session = lock_session(&mut tx, session_id).await?;
        if let Some(next) = lifecycle::checkout_transition(session_id, session.status)? {
            sqlx::query("UPDATE sessions SET session_status = $1 WHERE session_id = $2")
                .bind(next.as_str())
                .bind(session_id)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
            session.status = next;
        }
        tx.commit().await.map_err(classify)?;
        Ok(session)
    }

    async fn record_payment(
        &self,
        notice: PaymentNotice,
        meeting_base_url: &str,
    ) -> PortResult<PaymentRecorded> {
        let mut tx = self.begin().await?;
        let mut session = lock_session(&mut tx, notice.session_id).await?;

        let payment_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO payment \
               (session_id, amount, currency, payment_status, payment_method, provider, transaction_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING payment_id",
        )
        .bind(notice.session_id)
        .bind(&notice.amount)
        .bind(&notice.currency)
        .bind(notice.status.as_str())
        .bind(&notice.method)
        .bind(PAYMENT_PROVIDER)
        .bind(&notice.transaction_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let effect = lifecycle::payment_effect(session.status, notice.status);
        match effect {
            PaymentEffect::MarkPaid => {
                let url = lifecycle::meeting_url(meeting_base_url, session.id, Utc::now());
                sqlx::query(
                    "UPDATE sessions SET session_status = $1, meeting_url = $2 WHERE session_id = $3",
                )
                .bind(SessionStatus::Paid.as_str())
                .bind(&url)
                .bind(session.id)
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
                session.status = SessionStatus::Paid;
                session.meeting_url = Some(url);
            }
            PaymentEffect::AlreadyPaid => {
                info!(session_id = session.id, "Duplicate successful payment logged");
            }
            PaymentEffect::Unchanged => {
                if notice.status == tuteskillz_core::domain::PaymentStatus::Paid {
                    warn!(session_id = session.id, status = %session.status, "Payment for a session that cannot be paid");
                }
            }
        }

        tx.commit().await.map_err(classify)?;
        Ok(PaymentRecorded {
            payment_id,
            effect,
            session,
        })
    }

    async fn complete_session(&self, session_id: Id) -> PortResult<Session> {
        self.transition(session_id, SessionStatus::Completed).await
    }

    async fn cancel_session(&self, session_id: Id) -> PortResult<Session> {
        self.transition(session_id, SessionStatus::Cancelled).await
    }

    async fn get_session(&self, session_id: Id) -> PortResult<Session> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.session_id = $1");
        sqlx::query_as::<_, SessionRecord>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?
            .ok_or_else(|| PortError::NotFound("Session not found".to_string()))?
            .to_domain()
    }

    async fn get_session_detail(&self, session_id: Id) -> PortResult<SessionSummary> {
        let sql = format!("{SUMMARY_SELECT} WHERE s.session_id = $1");
        sqlx::query_as::<_, SummaryRecord>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?
            .ok_or_else(|| PortError::NotFound("Session not found".to_string()))?
            .to_domain()
    }

    async fn list_sessions_for(
        &self,
        party: Party,
        status: Option<SessionStatus>,
    ) -> PortResult<Vec<SessionSummary>> {
        let owner = match party {
            Party::Student(_) => "s.student_id",
            Party::Tutor(_) => "ts.tutor_id",
        };
        let sql = match status {
            Some(_) => format!(
                "{SUMMARY_SELECT} WHERE {owner} = $1 AND s.session_status = $2 \
                 ORDER BY s.date ASC, s.start_time ASC"
            ),
            None => format!("{SUMMARY_SELECT} WHERE {owner} = $1 ORDER BY s.date ASC, s.start_time ASC"),
        };
        let mut query = sqlx::query_as::<_, SummaryRecord>(&sql).bind(party.id());
        if let Some(status) = status {
            query = query.bind(status.as_str());
        }
        query
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?
            .into_iter()
            .map(SummaryRecord::to_domain)
            .collect()
    }

    async fn blocking_bookings(&self, party: Party, date: NaiveDate) -> PortResult<Vec<Booking>> {
        let mut tx = self.begin().await?;
        let bookings = fetch_blocking(&mut tx, party, date).await?;
        tx.commit().await.map_err(classify)?;
        Ok(bookings)
    }

    async fn get_tutor_subject_info(&self, tutor_subject_id: Id) -> PortResult<TutorSubjectInfo> {
        let record = sqlx::query_as::<_, TutorSubjectInfoRecord>(
            "SELECT ts.tutor_subject_id, ts.grade, ts.teaching_medium, s.subject_id, s.subject_name, \
                    u.user_id AS tutor_id, u.full_name AS tutor_name \
             FROM tutor_subject ts \
             JOIN subject s ON ts.subject_id = s.subject_id \
             JOIN users u ON ts.tutor_id = u.user_id \
             WHERE ts.tutor_subject_id = $1",
        )
        .bind(tutor_subject_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?
        .ok_or_else(|| PortError::NotFound("Tutor not found".to_string()))?;

        Ok(TutorSubjectInfo {
            tutor_subject_id: record.tutor_subject_id,
            grade: record.grade,
            teaching_medium: record.teaching_medium,
            subject_id: record.subject_id,
            subject_name: record.subject_name,
            tutor_id: record.tutor_id,
            tutor_name: record.tutor_name,
        })
    }

    async fn payments_for_session(&self, session_id: Id) -> PortResult<Vec<Payment>> {
        sqlx::query_as::<_, PaymentRecord>(
            "SELECT payment_id, session_id, amount, currency, payment_status, payment_method, \
                    provider, transaction_id, created_at \
             FROM payment WHERE session_id = $1 ORDER BY payment_id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(PaymentRecord::to_domain)
        .collect()
    }

    async fn register_tutor(&self, registration: TutorRegistration) -> PortResult<Id> {
        let mut tx = self.begin().await?;
        let address_id = insert_address(&mut tx, &registration.address).await?;
        let user_id = insert_user(
            &mut tx,
            &registration.profile,
            address_id,
            tuteskillz_core::domain::Role::Tutor,
        )
        .await?;

        sqlx::query(
            "INSERT INTO tutor (user_id, school, university, bio, ol_transcript, al_transcript) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user_id)
        .bind(&registration.school)
        .bind(&registration.university)
        .bind(&registration.bio)
        .bind(registration.ol_transcript.as_deref())
        .bind(registration.al_transcript.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        for subject in &registration.subjects {
            sqlx::query(
                "INSERT INTO tutor_subject (tutor_id, subject_id, grade, teaching_medium) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(user_id)
            .bind(subject.subject_id)
            .bind(&subject.grade)
            .bind(&subject.teaching_medium)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }

        tx.commit().await.map_err(classify)?;
        info!(user_id, subjects = registration.subjects.len(), "Tutor registered");
        Ok(user_id)
    }

    async fn register_student(&self, registration: StudentRegistration) -> PortResult<Id> {
        let mut tx = self.begin().await?;
        let address_id = insert_address(&mut tx, &registration.address).await?;

        let guardian_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO guardian (full_name, email, phone) VALUES ($1, $2, $3) RETURNING guardian_id",
        )
        .bind(&registration.guardian.full_name)
        .bind(&registration.guardian.email)
        .bind(&registration.guardian.phone)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let user_id = insert_user(
            &mut tx,
            &registration.profile,
            address_id,
            tuteskillz_core::domain::Role::Student,
        )
        .await?;

        sqlx::query("INSERT INTO student (user_id, guardian_id, grade) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(guardian_id)
            .bind(&registration.grade)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        info!(user_id, "Student registered");
        Ok(user_id)
    }

    async fn list_subjects(&self) -> PortResult<Vec<SubjectRef>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT subject_id, subject_name FROM subject ORDER BY subject_name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|(subject_id, subject_name)| SubjectRef { subject_id, subject_name })
            .collect())
    }

    async fn create_subject(&self, subject_name: &str) -> PortResult<SubjectRef> {
        let subject_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO subject (subject_name) VALUES ($1) RETURNING subject_id",
        )
        .bind(subject_name)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(SubjectRef {
            subject_id,
            subject_name: subject_name.to_string(),
        })
    }

    async fn save_availability(&self, tutor_id: Id, slots: Vec<AvailabilitySlot>) -> PortResult<()> {
        let mut tx = self.begin().await?;
        for slot in &slots {
            sqlx::query(
                "INSERT INTO tutor_availability (tutor_id, day_of_week, day_index, start_time, end_time) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(tutor_id)
            .bind(slot.day.as_str())
            .bind(slot.day.ordinal())
            .bind(slot.start_time)
            .bind(slot.end_time)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }
        tx.commit().await.map_err(classify)?;
        Ok(())
    }

    async fn list_availability(&self, tutor_id: Id) -> PortResult<Vec<AvailabilitySlot>> {
        sqlx::query_as::<_, SlotRecord>(
            "SELECT day_of_week, start_time, end_time FROM tutor_availability \
             WHERE tutor_id = $1 ORDER BY day_index ASC, start_time ASC",
        )
        .bind(tutor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(|r| {
            Ok(AvailabilitySlot {
                day: parse_status(&r.day_of_week)?,
                start_time: r.start_time,
                end_time: r.end_time,
            })
        })
        .collect()
    }

    async fn save_bank_details(&self, tutor_id: Id, accounts: Vec<BankAccount>) -> PortResult<()> {
        let mut tx = self.begin().await?;
        for account in &accounts {
            if account.is_primary {
                sqlx::query("UPDATE bank_details SET is_primary = false WHERE tutor_id = $1")
                    .bind(tutor_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(classify)?;
            }
            sqlx::query(
                "INSERT INTO bank_details \
                   (tutor_id, bank_name, branch, account_number, beneficiary_name, is_primary) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(tutor_id)
            .bind(&account.bank_name)
            .bind(&account.branch)
            .bind(&account.account_number)
            .bind(&account.beneficiary_name)
            .bind(account.is_primary)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        }
        tx.commit().await.map_err(classify)?;
        Ok(())
    }

    async fn list_bank_details(&self, tutor_id: Id) -> PortResult<Vec<BankAccount>> {
        let rows = sqlx::query_as::<_, BankRecord>(
            "SELECT bank_name, branch, account_number, beneficiary_name, is_primary \
             FROM bank_details WHERE tutor_id = $1 ORDER BY bank_detail_id ASC",
        )
        .bind(tutor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|r| BankAccount {
                bank_name: r.bank_name,
                branch: r.branch,
                account_number: r.account_number,
                beneficiary_name: r.beneficiary_name,
                is_primary: r.is_primary,
            })
            .collect())
    }

    async fn tutor_onboarding(&self, tutor_id: Id) -> PortResult<TutorOnboarding> {
        let record = sqlx::query_as::<_, OnboardingRecord>(
            "SELECT t.verification_id, v.status AS verification_status, \
               (SELECT COUNT(*) FROM tutor_availability WHERE tutor_id = t.user_id) AS availability_count, \
               (SELECT COUNT(*) FROM bank_details WHERE tutor_id = t.user_id) AS bank_count \
             FROM tutor t \
             LEFT JOIN verification v ON t.verification_id = v.verification_id \
             WHERE t.user_id = $1",
        )
        .bind(tutor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?
        .ok_or_else(|| PortError::NotFound("Tutor not found".to_string()))?;

        let verification = match (record.verification_id, record.verification_status) {
            (Some(id), Some(status)) => Some((id, parse_status::<VerificationStatus>(&status)?)),
            _ => None,
        };
        Ok(TutorOnboarding::derive(
            verification,
            record.availability_count,
            record.bank_count,
        ))
    }

    async fn tutor_profile(&self, tutor_id: Id) -> PortResult<TutorProfile> {
        let (full_name, profile_photo) = sqlx::query_as::<_, (String, Option<Vec<u8>>)>(
            "SELECT u.full_name, u.profile_photo FROM tutor t JOIN users u ON t.user_id = u.user_id \
             WHERE t.user_id = $1",
        )
        .bind(tutor_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?
        .ok_or_else(|| PortError::NotFound("Tutor not found".to_string()))?;
        Ok(TutorProfile {
            tutor_id,
            full_name,
            profile_photo: profile_photo.map(Bytes::from),
        })
    }

    async fn verify_tutor(
        &self,
        tutor_id: Id,
        admin_id: Id,
        status: VerificationStatus,
        notes: &str,
    ) -> PortResult<Verification> {
        let mut tx = self.begin().await?;

        let tutor = sqlx::query_scalar::<_, i64>("SELECT user_id FROM tutor WHERE user_id = $1 FOR UPDATE")
            .bind(tutor_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;
        if tutor.is_none() {
            return Err(PortError::NotFound("Tutor not found".to_string()));
        }
        let admin = sqlx::query_scalar::<_, i64>(
            "SELECT user_id FROM users WHERE user_id = $1 AND role = 'admin'",
        )
        .bind(admin_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?;
        if admin.is_none() {
            return Err(PortError::NotFound("Admin not found".to_string()));
        }

        let verification = sqlx::query_as::<_, VerificationRecord>(
            "INSERT INTO verification (verified_by_admin_id, status, type, verified_notes) \
             VALUES ($1, $2, 'tutor', $3) \
             RETURNING verification_id, status, type, verified_by_admin_id, verified_notes, verified_at",
        )
        .bind(admin_id)
        .bind(status.as_str())
        .bind(notes)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?
        .to_domain()?;

        sqlx::query("UPDATE tutor SET verification_id = $1 WHERE user_id = $2")
            .bind(verification.id)
            .bind(tutor_id)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        info!(tutor_id, verification_id = verification.id, status = status.as_str(), "Tutor verification recorded");
        Ok(verification)
    }

    async fn user_contact(&self, user_id: Id) -> PortResult<UserContact> {
        let (email, full_name) = sqlx::query_as::<_, (String, String)>(
            "SELECT email, full_name FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?
        .ok_or_else(|| PortError::NotFound("User not found".to_string()))?;
        Ok(UserContact { email, full_name })
    }

    async fn save_exam_results(
        &self,
        tutor_id: Id,
        exam_type: ExamType,
        results: Vec<ExamResult>,
    ) -> PortResult<usize> {
        let mut tx = self.begin().await?;

        let tutor = sqlx::query_scalar::<_, i64>("SELECT user_id FROM tutor WHERE user_id = $1")
            .bind(tutor_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;
        if tutor.is_none() {
            return Err(PortError::NotFound("Tutor not found".to_string()));
        }

        sqlx::query("DELETE FROM exam_results WHERE tutor_id = $1 AND exam_type = $2")
            .bind(tutor_id)
            .bind(exam_type.as_str())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;

        let mut written = HashSet::new();
        for result in &results {
            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT subject_id FROM subject WHERE upper(subject_name) = upper($1)",
            )
            .bind(&result.subject)
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;
            let subject_id = match existing {
                Some(id) => id,
                None => sqlx::query_scalar::<_, i64>(
                    "INSERT INTO subject (subject_name) VALUES ($1) RETURNING subject_id",
                )
                .bind(&result.subject)
                .fetch_one(&mut *tx)
                .await
                .map_err(classify)?,
            };

            sqlx::query(
                "INSERT INTO exam_results (exam_type, grade, tutor_id, subject_id) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (tutor_id, exam_type, subject_id) DO UPDATE SET grade = EXCLUDED.grade",
            )
            .bind(exam_type.as_str())
            .bind(&result.grade)
            .bind(tutor_id)
            .bind(subject_id)
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
            written.insert(subject_id);
        }

        tx.commit().await.map_err(classify)?;
        Ok(written.len())
    }

    async fn exam_results(&self, tutor_id: Id, exam_type: ExamType) -> PortResult<Vec<ExamResult>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT sub.subject_name, e.grade FROM exam_results e \
             JOIN subject sub ON e.subject_id = sub.subject_id \
             WHERE e.tutor_id = $1 AND e.exam_type = $2 ORDER BY sub.subject_name ASC",
        )
        .bind(tutor_id)
        .bind(exam_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|(subject, grade)| ExamResult { subject, grade })
            .collect())
    }

    async fn list_tutors(&self) -> PortResult<Vec<TutorOverview>> {
        sqlx::query_as::<_, TutorOverviewRecord>(
            "SELECT u.user_id, u.full_name, u.email, v.verification_id, v.status AS verification_status \
             FROM users u \
             JOIN tutor t ON u.user_id = t.user_id \
             LEFT JOIN verification v ON t.verification_id = v.verification_id AND v.type = 'tutor' \
             WHERE u.role = 'tutor' ORDER BY u.user_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(|r| {
            Ok(TutorOverview {
                user_id: r.user_id,
                full_name: r.full_name,
                email: r.email,
                verification_id: r.verification_id,
                verification_status: r
                    .verification_status
                    .as_deref()
                    .map(parse_status)
                    .transpose()?,
            })
        })
        .collect()
    }

    async fn list_students(&self) -> PortResult<Vec<StudentOverview>> {
        let rows = sqlx::query_as::<_, (i64, String, String, String)>(
            "SELECT u.user_id, u.full_name, u.email, g.full_name AS guardian_name \
             FROM users u \
             JOIN student s ON u.user_id = s.user_id \
             JOIN guardian g ON s.guardian_id = g.guardian_id \
             WHERE u.role = 'student' ORDER BY u.user_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|(user_id, full_name, email, guardian_name)| StudentOverview {
                user_id,
                full_name,
                email,
                guardian_name,
            })
            .collect())
    }

    async fn list_admins(&self) -> PortResult<Vec<AdminOverview>> {
        let rows = sqlx::query_as::<_, (i64, String, String, Option<String>)>(
            "SELECT user_id, full_name, email, phone FROM users WHERE role = 'admin' ORDER BY user_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|(user_id, full_name, email, phone)| AdminOverview {
                user_id,
                full_name,
                email,
                phone,
            })
            .collect())
    }

    async fn list_all_sessions(&self) -> PortResult<Vec<SessionOverview>> {
        sqlx::query_as::<_, SessionOverviewRecord>(
            "SELECT s.session_id, s.date, s.start_time, s.session_status, \
                    tu.full_name AS tutor_name, su.full_name AS student_name \
             FROM sessions s \
             JOIN tutor_subject ts ON s.tutor_subject_id = ts.tutor_subject_id \
             JOIN users tu ON ts.tutor_id = tu.user_id \
             JOIN users su ON s.student_id = su.user_id \
             ORDER BY s.date DESC, s.start_time DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(|r| {
            Ok(SessionOverview {
                session_id: r.session_id,
                date: r.date,
                start_time: r.start_time,
                status: parse_status(&r.session_status)?,
                tutor_name: r.tutor_name,
                student_name: r.student_name,
            })
        })
        .collect()
    }

    async fn list_all_notes(&self) -> PortResult<Vec<NoteOverview>> {
        sqlx::query_as::<_, NoteOverviewRecord>(
            "SELECT n.note_id, n.session_id, s.date AS session_date, s.session_status, \
                    tu.full_name AS tutor_name \
             FROM notes n \
             JOIN sessions s ON n.session_id = s.session_id \
             JOIN tutor_subject ts ON s.tutor_subject_id = ts.tutor_subject_id \
             JOIN users tu ON ts.tutor_id = tu.user_id \
             ORDER BY n.note_id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?
        .into_iter()
        .map(|r| {
            Ok(NoteOverview {
                note_id: r.note_id,
                session_id: r.session_id,
                session_date: r.session_date,
                status: parse_status(&r.session_status)?,
                tutor_name: r.tutor_name,
            })
        })
        .collect()
    }

    async fn dashboard_counts(&self) -> PortResult<DashboardCounts> {
        let (tutors, students, admins, completed_sessions, notes) =
            sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
                "SELECT \
                   (SELECT COUNT(*) FROM users WHERE role = 'tutor'), \
                   (SELECT COUNT(*) FROM users WHERE role = 'student'), \
                   (SELECT COUNT(*) FROM users WHERE role = 'admin'), \
                   (SELECT COUNT(*) FROM sessions WHERE session_status = 'Completed'), \
                   (SELECT COUNT(*) FROM notes)",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(DashboardCounts {
            tutors,
            students,
            admins,
            completed_sessions,
            notes,
        })
    }

    async fn approved_mediums(&self) -> PortResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT ts.teaching_medium FROM tutor_subject ts \
             JOIN tutor t ON ts.tutor_id = t.user_id \
             JOIN verification v ON t.verification_id = v.verification_id \
             WHERE v.status = 'Approved' ORDER BY ts.teaching_medium",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn approved_grades(&self, medium: &str) -> PortResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT ts.grade FROM tutor_subject ts \
             JOIN tutor t ON ts.tutor_id = t.user_id \
             JOIN verification v ON t.verification_id = v.verification_id \
             WHERE ts.teaching_medium = $1 AND v.status = 'Approved' ORDER BY ts.grade",
        )
        .bind(medium)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn approved_subjects(&self, medium: &str, grade: &str) -> PortResult<Vec<SubjectRef>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT DISTINCT s.subject_id, s.subject_name FROM tutor_subject ts \
             JOIN subject s ON ts.subject_id = s.subject_id \
             JOIN tutor t ON ts.tutor_id = t.user_id \
             JOIN verification v ON t.verification_id = v.verification_id \
             WHERE ts.teaching_medium = $1 AND ts.grade = $2 AND v.status = 'Approved' \
             ORDER BY s.subject_name",
        )
        .bind(medium)
        .bind(grade)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|(subject_id, subject_name)| SubjectRef { subject_id, subject_name })
            .collect())
    }

    async fn approved_tutors(
        &self,
        medium: &str,
        grade: &str,
        subject_id: Id,
    ) -> PortResult<Vec<TutorListing>> {
        let rows = sqlx::query_as::<_, (i64, i64, String, Option<String>)>(
            "SELECT ts.tutor_subject_id, u.user_id, u.full_name, t.bio FROM tutor_subject ts \
             JOIN tutor t ON ts.tutor_id = t.user_id \
             JOIN users u ON t.user_id = u.user_id \
             JOIN verification v ON t.verification_id = v.verification_id \
             WHERE ts.teaching_medium = $1 AND ts.grade = $2 AND ts.subject_id = $3 \
               AND v.status = 'Approved' \
             ORDER BY ts.tutor_subject_id",
        )
        .bind(medium)
        .bind(grade)
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|(tutor_subject_id, tutor_id, full_name, bio)| TutorListing {
                tutor_subject_id,
                tutor_id,
                full_name,
                bio,
            })
            .collect())
    }

    async fn save_note(&self, session_id: Id, title: &str, document: Bytes) -> PortResult<Id> {
        let note_id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO notes (session_id, title, document) VALUES ($1, $2, $3) RETURNING note_id",
        )
        .bind(session_id)
        .bind(title)
        .bind(document.as_ref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match classify(e) {
            PortError::NotFound(_) => PortError::NotFound("Session not found".to_string()),
            other => other,
        })?;
        Ok(note_id)
    }

    async fn list_notes(&self, session_id: Id) -> PortResult<Vec<NoteSummary>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT note_id, title FROM notes WHERE session_id = $1 ORDER BY note_id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        Ok(rows
            .into_iter()
            .map(|(id, title)| NoteSummary { id, title })
            .collect())
    }

    async fn get_note(&self, session_id: Id, note_id: Id) -> PortResult<NoteDocument> {
        let (title, document) = sqlx::query_as::<_, (String, Vec<u8>)>(
            "SELECT title, document FROM notes WHERE session_id = $1 AND note_id = $2",
        )
        .bind(session_id)
        .bind(note_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?
        .ok_or_else(|| PortError::NotFound("Note not found".to_string()))?;
        Ok(NoteDocument {
            id: note_id,
            session_id,
            title,
            document: Bytes::from(document),
        })
    }
}
