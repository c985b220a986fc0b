pub mod conflict;
pub mod domain;
pub mod lifecycle;
pub mod ports;
pub mod transcript;
pub mod validation;

pub use conflict::{find_conflict, Booking, Interval, Party, SESSION_DURATION_MINUTES};
pub use domain::{Id, Session, SessionStatus, TutorDecision};
pub use ports::{
    DecisionOutcome, DocumentScanner, Notifier, PortError, PortResult, RequestOutcome,
    TutoringStore,
};
