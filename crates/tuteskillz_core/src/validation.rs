//! crates/tuteskillz_core/src/validation.rs
//!
//! Input rules for the multi-row tutor setup writes. Checked before any store call so
//! a bad batch never opens a transaction.

use crate::domain::{AvailabilitySlot, BankAccount, ExamResult};
use crate::ports::{PortError, PortResult};

pub fn validate_bank_accounts(accounts: &[BankAccount]) -> PortResult<()> {
    if accounts.is_empty() {
        return Err(PortError::Validation("tutorId and accounts[] are required".to_string()));
    }
    if !accounts.iter().any(|acc| acc.is_primary) {
        return Err(PortError::Validation(
            "At least one account must be marked as primary.".to_string(),
        ));
    }
    let incomplete = accounts.iter().any(|acc| {
        [&acc.bank_name, &acc.branch, &acc.account_number, &acc.beneficiary_name]
            .iter()
            .any(|field| field.trim().is_empty())
    });
    if incomplete {
        return Err(PortError::Validation("All account fields are required".to_string()));
    }
    Ok(())
}

pub fn validate_availability(slots: &[AvailabilitySlot]) -> PortResult<()> {
    if let Some(slot) = slots.iter().find(|slot| slot.start_time >= slot.end_time) {
        return Err(PortError::Validation(format!(
            "Invalid availability entry: {} {} must start before {}",
            slot.day.as_str(),
            slot.start_time.format("%H:%M"),
            slot.end_time.format("%H:%M")
        )));
    }
    Ok(())
}

/// Normalises transcript results to the stored form: trimmed, upper-case subject and grade.
pub fn normalise_exam_results(results: &[ExamResult]) -> PortResult<Vec<ExamResult>> {
    if results.is_empty() {
        return Err(PortError::Validation("No results provided".to_string()));
    }
    results
        .iter()
        .map(|result| {
            let subject = result.subject.trim().to_uppercase();
            let grade = result.grade.trim().to_uppercase();
            if subject.is_empty() || grade.is_empty() {
                Err(PortError::Validation("Each result needs a subject and a grade".to_string()))
            } else {
                Ok(ExamResult { subject, grade })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::parse_clock_time;
    use crate::domain::DayOfWeek;

    fn account(primary: bool) -> BankAccount {
        BankAccount {
            bank_name: "People's Bank".to_string(),
            branch: "Kandy".to_string(),
            account_number: "0042".to_string(),
            beneficiary_name: "N. Perera".to_string(),
            is_primary: primary,
        }
    }

    #[test]
    fn bank_batch_needs_a_primary() {
        assert!(validate_bank_accounts(&[]).is_err());
        assert!(validate_bank_accounts(&[account(false)]).is_err());
        assert!(validate_bank_accounts(&[account(false), account(true)]).is_ok());
    }

    #[test]
    fn bank_fields_must_be_filled() {
        let mut blank = account(true);
        blank.branch = "  ".to_string();
        let err = validate_bank_accounts(&[blank]).unwrap_err();
        assert!(matches!(err, PortError::Validation(_)));
    }

    #[test]
    fn availability_slot_must_start_before_it_ends() {
        let slot = |start: &str, end: &str| AvailabilitySlot {
            day: DayOfWeek::Tuesday,
            start_time: parse_clock_time(start).unwrap(),
            end_time: parse_clock_time(end).unwrap(),
        };
        assert!(validate_availability(&[slot("09:00", "11:00")]).is_ok());
        assert!(validate_availability(&[slot("09:00", "11:00"), slot("12:00", "12:00")]).is_err());
    }

    #[test]
    fn exam_results_are_upper_cased() {
        let results = vec![ExamResult {
            subject: " combined maths ".to_string(),
            grade: "a".to_string(),
        }];
        let normalised = normalise_exam_results(&results).unwrap();
        assert_eq!(normalised[0].subject, "COMBINED MATHS");
        assert_eq!(normalised[0].grade, "A");
        assert!(normalise_exam_results(&[]).is_err());
    }
}
