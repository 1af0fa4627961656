use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::error::Refusal;
use super::EngineError;

/// Local wall-clock time. Every business rule is evaluated in the organization's local time.
pub fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// First scheduled-or-completed appointment of `user_id` for `specialty_id`
/// in the calendar month containing `month`.
pub fn check_monthly_limit<'a>(
    user_id: Ulid,
    specialty_id: Ulid,
    appointments: impl IntoIterator<Item = &'a Appointment>,
    month: NaiveDate,
) -> Option<ConflictingAppointment> {
    appointments
        .into_iter()
        .filter(|a| a.user_id == user_id && a.specialty_id == specialty_id)
        .filter(|a| a.status.counts_toward_monthly_limit())
        .filter(|a| a.date.year() == month.year() && a.date.month() == month.month())
        .min_by_key(|a| (a.date, a.time))
        .map(|a| ConflictingAppointment {
            appointment_id: a.id,
            date: a.date,
        })
}

/// Same calendar day means penalty, regardless of time of day.
pub fn evaluate_cancellation_penalty(appointment_date: NaiveDate, today: NaiveDate) -> bool {
    appointment_date == today
}

pub fn same_day_penalty(user_id: Ulid, specialty_id: Ulid, now: NaiveDateTime) -> SpecialtyBlock {
    SpecialtyBlock {
        user_id,
        specialty_id,
        blocked_until: Some(now + Duration::days(SAME_DAY_PENALTY_DAYS)),
        reason: Some(SAME_DAY_PENALTY_REASON.to_string()),
    }
}

/// Default end of an administrative suspension starting at `now`.
pub fn admin_suspension_end(now: NaiveDateTime) -> NaiveDateTime {
    now.checked_add_months(Months::new(ADMIN_SUSPENSION_MONTHS))
        .unwrap_or(now + Duration::days(30 * ADMIN_SUSPENSION_MONTHS as i64))
}

pub fn check_account(account: &AccountState, now: NaiveDateTime) -> Result<(), Refusal> {
    if account.blocked {
        return Err(Refusal::AccountBlocked);
    }
    if let Some(until) = account.suspended_until
        && until > now
    {
        return Err(Refusal::AccountSuspended { until });
    }
    Ok(())
}

pub fn active_block(
    account: &AccountState,
    specialty_id: Ulid,
    now: NaiveDateTime,
) -> Option<&SpecialtyBlock> {
    account
        .specialty_blocks
        .iter()
        .find(|b| b.specialty_id == specialty_id && b.is_active(now))
}

pub fn check_specialty_block(
    account: &AccountState,
    specialty_id: Ulid,
    now: NaiveDateTime,
) -> Result<(), Refusal> {
    match active_block(account, specialty_id, now) {
        Some(block) => Err(Refusal::SpecialtySuspended {
            until: block.blocked_until,
        }),
        None => Ok(()),
    }
}

/// Reject a new override whose range overlaps an existing one on the same date.
pub fn check_override_overlap(
    existing: &[DateOverride],
    date: NaiveDate,
    range: &TimeRange,
) -> Result<(), EngineError> {
    match existing
        .iter()
        .find(|o| o.date == date && o.range.overlaps(range))
    {
        Some(o) => Err(EngineError::OverlappingOverride {
            existing: o.id,
            range: o.range,
        }),
        None => Ok(()),
    }
}

pub(crate) fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidInput("name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

pub(crate) fn validate_reason(reason: &Option<String>) -> Result<(), EngineError> {
    if let Some(r) = reason
        && r.len() > MAX_REASON_LEN
    {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(())
}
