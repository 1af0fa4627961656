use chrono::{NaiveDate, NaiveDateTime};
use ulid::Ulid;

use crate::model::{AppointmentStatus, TimeRange};

/// An expected business-rule outcome. Always user-displayable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refusal {
    OutOfWindow(NaiveDate),
    DateBlocked(NaiveDate),
    Holiday(NaiveDate),
    NoWeeklyMatch(NaiveDate),
    SlotTaken,
    MonthlyLimit { conflicting_date: NaiveDate },
    SpecialtySuspended { until: Option<NaiveDateTime> },
    AccountSuspended { until: NaiveDateTime },
    AccountBlocked,
    PenaltyNotAccepted,
}

impl Refusal {
    /// Stable reason code for calling UIs.
    pub fn code(&self) -> &'static str {
        match self {
            Refusal::OutOfWindow(_) => "OUT_OF_WINDOW",
            Refusal::DateBlocked(_) => "DATE_BLOCKED",
            Refusal::Holiday(_) => "HOLIDAY",
            Refusal::NoWeeklyMatch(_) => "NO_WEEKLY_MATCH",
            Refusal::SlotTaken => "SLOT_TAKEN",
            Refusal::MonthlyLimit { .. } => "MONTHLY_LIMIT",
            Refusal::SpecialtySuspended { .. } => "SPECIALTY_SUSPENDED",
            Refusal::AccountSuspended { .. } => "ACCOUNT_SUSPENDED",
            Refusal::AccountBlocked => "ACCOUNT_BLOCKED",
            Refusal::PenaltyNotAccepted => "PENALTY_NOT_ACCEPTED",
        }
    }
}

impl std::fmt::Display for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.code())?;
        match self {
            Refusal::OutOfWindow(d) => write!(f, "{d} is outside the booking window"),
            Refusal::DateBlocked(d) => write!(f, "{d} is blocked"),
            Refusal::Holiday(d) => write!(f, "{d} is a national holiday"),
            Refusal::NoWeeklyMatch(d) => write!(f, "no availability on {d}"),
            Refusal::SlotTaken => write!(f, "slot is not available"),
            Refusal::MonthlyLimit { conflicting_date } => write!(
                f,
                "already booked this specialty this month (on {conflicting_date})"
            ),
            Refusal::SpecialtySuspended { until: Some(u) } => {
                write!(f, "specialty suspended until {u}")
            }
            Refusal::SpecialtySuspended { until: None } => write!(f, "specialty suspended"),
            Refusal::AccountSuspended { until } => write!(f, "account suspended until {until}"),
            Refusal::AccountBlocked => write!(f, "account blocked"),
            Refusal::PenaltyNotAccepted => write!(
                f,
                "same-day cancellation suspends the specialty; accept the penalty to proceed"
            ),
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Refused(Refusal),
    NotFound(Ulid),
    AlreadyExists(Ulid),
    OverlappingOverride { existing: Ulid, range: TimeRange },
    InvalidTransition { id: Ulid, from: AppointmentStatus, to: AppointmentStatus },
    InvalidInput(&'static str),
    HasAppointments(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn refusal(&self) -> Option<&Refusal> {
        match self {
            EngineError::Refused(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Refusal> for EngineError {
    fn from(r: Refusal) -> Self {
        EngineError::Refused(r)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Refused(r) => write!(f, "{r}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::OverlappingOverride { existing, range } => write!(
                f,
                "override overlaps {existing} ({} - {})",
                range.start.format("%H:%M"),
                range.end.format("%H:%M")
            ),
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "appointment {id} cannot go from {from} to {to}")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::HasAppointments(id) => {
                write!(f, "cannot delete professional {id}: has scheduled appointments")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
