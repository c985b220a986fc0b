//! crates/tuteskillz_core/src/lifecycle.rs
//!
//! Decisions about how a session's status may move. Store adapters load the current
//! state inside their transaction, ask these functions what to do, then write.

use crate::domain::{Id, PaymentStatus, SessionStatus};
use crate::ports::{PortError, PortResult};
use chrono::{DateTime, Utc};

/// Rejects any move not present in the transition table.
pub fn ensure_transition(session_id: Id, from: SessionStatus, to: SessionStatus) -> PortResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(PortError::InvalidState(format!(
            "Cannot transition session {} from {} to {}",
            session_id, from, to
        )))
    }
}

/// What a payment notification does to the session it references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEffect {
    /// Move the session to `Paid` and attach a fresh meeting link.
    MarkPaid,
    /// The session was already paid; only the payment log changes.
    AlreadyPaid,
    /// Leave the session exactly as it is.
    Unchanged,
}

/// A failed payment never touches the session. A successful one pays any session that may
/// still be paid for.
pub fn payment_effect(current: SessionStatus, payment: PaymentStatus) -> PaymentEffect {
    match payment {
        PaymentStatus::Failed => PaymentEffect::Unchanged,
        PaymentStatus::Paid if current == SessionStatus::Paid => PaymentEffect::AlreadyPaid,
        PaymentStatus::Paid if current.can_transition_to(SessionStatus::Paid) => {
            PaymentEffect::MarkPaid
        }
        PaymentStatus::Paid => PaymentEffect::Unchanged,
    }
}

/// Opening a checkout moves an accepted session to `Submitted`. Reopening it is a no-op.
pub fn checkout_transition(session_id: Id, current: SessionStatus) -> PortResult<Option<SessionStatus>> {
    match current {
        SessionStatus::Submitted => Ok(None),
        other => {
            ensure_transition(session_id, other, SessionStatus::Submitted)?;
            Ok(Some(SessionStatus::Submitted))
        }
    }
}

/// Builds the meeting room link for a confirmed payment.
///
/// The confirmation instant is part of the room name so every payment event yields a
/// distinct room.
pub fn meeting_url(base_url: &str, session_id: Id, confirmed_at: DateTime<Utc>) -> String {
    format!(
        "{}/session_{}_{}",
        base_url.trim_end_matches('/'),
        session_id,
        confirmed_at.timestamp_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn repeated_decision_on_terminal_session_is_rejected() {
        let err = ensure_transition(9, SessionStatus::Declined, SessionStatus::Declined).unwrap_err();
        assert!(matches!(err, PortError::InvalidState(msg) if msg.contains("Declined")));
        assert!(ensure_transition(9, SessionStatus::Accepted, SessionStatus::Accepted).is_err());
        assert!(ensure_transition(9, SessionStatus::Requested, SessionStatus::Accepted).is_ok());
    }

    #[test]
    fn failed_payment_leaves_session_alone() {
        for status in SessionStatus::ALL {
            assert_eq!(payment_effect(status, PaymentStatus::Failed), PaymentEffect::Unchanged);
        }
    }

    #[test]
    fn successful_payment_effects() {
        assert_eq!(payment_effect(SessionStatus::Accepted, PaymentStatus::Paid), PaymentEffect::MarkPaid);
        assert_eq!(payment_effect(SessionStatus::Submitted, PaymentStatus::Paid), PaymentEffect::MarkPaid);
        assert_eq!(payment_effect(SessionStatus::Paid, PaymentStatus::Paid), PaymentEffect::AlreadyPaid);
        assert_eq!(payment_effect(SessionStatus::Requested, PaymentStatus::Paid), PaymentEffect::Unchanged);
        assert_eq!(payment_effect(SessionStatus::Cancelled, PaymentStatus::Paid), PaymentEffect::Unchanged);
    }

    #[test]
    fn checkout_only_from_accepted() {
        assert_eq!(checkout_transition(1, SessionStatus::Accepted).unwrap(), Some(SessionStatus::Submitted));
        assert_eq!(checkout_transition(1, SessionStatus::Submitted).unwrap(), None);
        assert!(checkout_transition(1, SessionStatus::Requested).is_err());
        assert!(checkout_transition(1, SessionStatus::Paid).is_err());
    }

    #[test]
    fn meeting_url_embeds_session_and_instant() {
        let at = Utc.timestamp_millis_opt(1_741_600_000_123).unwrap();
        assert_eq!(
            meeting_url("https://meet.jit.si/", 42, at),
            "https://meet.jit.si/session_42_1741600000123"
        );
    }
}
