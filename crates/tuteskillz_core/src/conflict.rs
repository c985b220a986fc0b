//! crates/tuteskillz_core/src/conflict.rs
//!
//! Time-overlap detection between a proposed booking and a party's existing bookings.
//! Pure read-then-compute; callers load the bookings and decide what to do with the answer.

use crate::domain::{Id, SessionStatus};
use chrono::{NaiveDate, NaiveTime, Timelike};

/// Every newly requested session lasts two hours.
pub const SESSION_DURATION_MINUTES: i32 = 120;

/// Whose calendar a proposed booking is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Student(Id),
    Tutor(Id),
}

impl Party {
    pub const fn id(self) -> Id {
        match self {
            Self::Student(id) | Self::Tutor(id) => id,
        }
    }

    /// Statuses that occupy this party's calendar.
    ///
    /// A student may not double-request a slot at all, while a tutor may hold several
    /// pending requests and only accepted sessions block.
    pub const fn blocking_statuses(self) -> &'static [SessionStatus] {
        match self {
            Self::Student(_) => &[
                SessionStatus::Requested,
                SessionStatus::Accepted,
                SessionStatus::Submitted,
            ],
            Self::Tutor(_) => &[SessionStatus::Accepted],
        }
    }

    pub fn is_blocked_by(self, status: SessionStatus) -> bool {
        self.blocking_statuses().contains(&status)
    }

    /// Key under which concurrent bookings for this party are serialised.
    pub fn lock_key(self) -> String {
        match self {
            Self::Student(id) => format!("student:{id}"),
            Self::Tutor(id) => format!("tutor:{id}"),
        }
    }
}

/// An existing session as seen by the checker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub session_id: Id,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: SessionStatus,
}

impl Booking {
    pub fn interval(&self) -> Interval {
        Interval::starting_at(self.start_time, self.duration_minutes)
    }
}

/// Half-open `[start, end)` range in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: i32,
    pub end: i32,
}

impl Interval {
    pub fn starting_at(start: NaiveTime, duration_minutes: i32) -> Self {
        let start = minutes_since_midnight(start);
        Self {
            start,
            end: start + duration_minutes,
        }
    }

    /// The interval a new request starting at `start` would occupy.
    pub fn proposed(start: NaiveTime) -> Self {
        Self::starting_at(start, SESSION_DURATION_MINUTES)
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && self.end > other.start
    }
}

pub fn minutes_since_midnight(time: NaiveTime) -> i32 {
    (time.hour() * 60 + time.minute()) as i32
}

/// Returns the first existing booking on `date` whose interval overlaps `proposed`.
///
/// Bookings on other dates are ignored; callers are expected to have filtered by party
/// and blocking status already.
pub fn find_conflict<'a>(
    date: NaiveDate,
    proposed: Interval,
    existing: &'a [Booking],
) -> Option<&'a Booking> {
    existing
        .iter()
        .filter(|booking| booking.date == date)
        .find(|booking| proposed.overlaps(&booking.interval()))
}

/// Parses `HH:MM` or `HH:MM:SS` as submitted by clients.
pub fn parse_clock_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn at(raw: &str) -> NaiveTime {
        parse_clock_time(raw).unwrap()
    }

    fn booking(id: Id, start: &str, status: SessionStatus) -> Booking {
        Booking {
            session_id: id,
            date: day(),
            start_time: at(start),
            duration_minutes: 120,
            status,
        }
    }

    #[test]
    fn adjacent_bookings_do_not_conflict() {
        let existing = vec![booking(1, "10:00", SessionStatus::Accepted)];
        assert_eq!(find_conflict(day(), Interval::proposed(at("12:00")), &existing), None);
        assert_eq!(find_conflict(day(), Interval::proposed(at("08:00")), &existing), None);
    }

    #[test]
    fn overlapping_booking_conflicts() {
        let existing = vec![booking(1, "10:00", SessionStatus::Accepted)];
        let hit = find_conflict(day(), Interval::proposed(at("11:00")), &existing);
        assert_eq!(hit.map(|b| b.session_id), Some(1));
    }

    #[test]
    fn contained_and_containing_ranges_conflict() {
        let existing = vec![Booking {
            duration_minutes: 30,
            ..booking(3, "10:30", SessionStatus::Requested)
        }];
        assert!(find_conflict(day(), Interval::proposed(at("10:00")), &existing).is_some());
        assert!(find_conflict(day(), Interval::proposed(at("10:45")), &existing).is_some());
        assert!(find_conflict(day(), Interval::proposed(at("11:00")), &existing).is_none());
    }

    #[test]
    fn first_conflict_in_input_order_wins() {
        let existing = vec![
            booking(7, "09:00", SessionStatus::Accepted),
            booking(8, "13:00", SessionStatus::Accepted),
            booking(9, "14:00", SessionStatus::Accepted),
        ];
        let hit = find_conflict(day(), Interval::proposed(at("13:30")), &existing);
        assert_eq!(hit.map(|b| b.session_id), Some(8));
    }

    #[test]
    fn other_dates_are_ignored() {
        let mut other = booking(1, "14:00", SessionStatus::Accepted);
        other.date = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        assert_eq!(find_conflict(day(), Interval::proposed(at("14:00")), &[other]), None);
    }

    #[test]
    fn blocking_sets_differ_by_party() {
        let student = Party::Student(1);
        let tutor = Party::Tutor(2);
        assert!(student.is_blocked_by(SessionStatus::Requested));
        assert!(student.is_blocked_by(SessionStatus::Submitted));
        assert!(!student.is_blocked_by(SessionStatus::Declined));
        assert!(tutor.is_blocked_by(SessionStatus::Accepted));
        assert!(!tutor.is_blocked_by(SessionStatus::Requested));
    }

    #[test]
    fn clock_time_accepts_optional_seconds() {
        assert_eq!(minutes_since_midnight(at("14:00")), 840);
        assert_eq!(minutes_since_midnight(at("09:15:00")), 555);
        assert_eq!(parse_clock_time("25:00"), None);
        assert_eq!(parse_clock_time("noon"), None);
    }
}
