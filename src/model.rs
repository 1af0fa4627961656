use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open wall-clock range `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted input.
    pub fn try_new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Top-of-hour slots from the start hour up to (not including) the end hour.
    pub fn hourly_slots(&self) -> impl Iterator<Item = NaiveTime> {
        (self.start.hour()..self.end.hour()).filter_map(|h| NaiveTime::from_hms_opt(h, 0, 0))
    }
}

/// 0 = Sunday … 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(weekday_index(date), 0 | 6)
}

// ── Availability configuration ───────────────────────────────────

/// Recurring weekday availability for a professional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub professional_id: Ulid,
    pub day_of_week: u8,
    pub range: TimeRange,
}

/// One-off availability on a specific date, independent of the weekly pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOverride {
    pub id: Ulid,
    pub professional_id: Ulid,
    pub date: NaiveDate,
    pub range: TimeRange,
}

/// Full-day unavailability, for one professional or (`professional_id: None`) for all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedDay {
    pub id: Ulid,
    pub professional_id: Option<Ulid>,
    pub date: NaiveDate,
    pub reason: Option<String>,
}

impl BlockedDay {
    pub fn applies_to(&self, professional_id: Ulid) -> bool {
        self.professional_id.is_none_or(|p| p == professional_id)
    }
}

// ── Appointments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// Whether the appointment hides its slot from the resolved set.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Completed)
    }

    /// Whether the appointment participates in the (professional, date, time) uniqueness constraint.
    pub fn holds_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    /// Whether the appointment uses up the user's monthly booking for its specialty.
    pub fn counts_toward_monthly_limit(&self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Completed)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Ok(AppointmentStatus::Cancelled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            other => Err(format!("unknown appointment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub user_id: Ulid,
    pub professional_id: Ulid,
    pub specialty_id: Ulid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

/// Who is acting on an appointment. Side effects of a cancellation depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    User,
    Professional,
    Admin,
}

impl FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Actor::User),
            "professional" => Ok(Actor::Professional),
            "admin" => Ok(Actor::Admin),
            other => Err(format!("unknown actor: {other}")),
        }
    }
}

// ── Sanctions ────────────────────────────────────────────────────

/// Temporary ban on booking one specialty. `blocked_until: None` never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialtyBlock {
    pub user_id: Ulid,
    pub specialty_id: Ulid,
    pub blocked_until: Option<NaiveDateTime>,
    pub reason: Option<String>,
}

impl SpecialtyBlock {
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        self.blocked_until.is_none_or(|until| until > now)
    }
}

// ── Reference data ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Specialty {
    pub id: Ulid,
    pub name: String,
    pub duration_minutes: u32,
    pub active: bool,
}

/// Everything the engine knows about one professional.
#[derive(Debug, Clone)]
pub struct ProfessionalState {
    pub id: Ulid,
    pub name: String,
    pub active: bool,
    pub specialties: Vec<Ulid>,
    pub weekly: Vec<WeeklyAvailability>,
    /// Sorted by `(date, range.start)`.
    pub overrides: Vec<DateOverride>,
    pub blocked: Vec<BlockedDay>,
    /// Sorted by `(date, time)`.
    pub appointments: Vec<Appointment>,
}

impl ProfessionalState {
    pub fn new(id: Ulid, name: String) -> Self {
        Self {
            id,
            name,
            active: true,
            specialties: Vec::new(),
            weekly: Vec::new(),
            overrides: Vec::new(),
            blocked: Vec::new(),
            appointments: Vec::new(),
        }
    }

    pub fn offers(&self, specialty_id: Ulid) -> bool {
        self.specialties.contains(&specialty_id)
    }

    pub fn insert_override(&mut self, o: DateOverride) {
        let key = (o.date, o.range.start);
        let pos = self
            .overrides
            .partition_point(|x| (x.date, x.range.start) < key);
        self.overrides.insert(pos, o);
    }

    pub fn remove_override(&mut self, id: Ulid) -> Option<DateOverride> {
        let pos = self.overrides.iter().position(|o| o.id == id)?;
        Some(self.overrides.remove(pos))
    }

    /// Overrides for `date`, via binary search on the sorted list.
    pub fn overrides_on(&self, date: NaiveDate) -> &[DateOverride] {
        let lo = self.overrides.partition_point(|o| o.date < date);
        let hi = self.overrides.partition_point(|o| o.date <= date);
        &self.overrides[lo..hi]
    }

    pub fn insert_appointment(&mut self, a: Appointment) {
        let key = (a.date, a.time);
        let pos = self
            .appointments
            .partition_point(|x| (x.date, x.time) <= key);
        self.appointments.insert(pos, a);
    }

    pub fn remove_appointment(&mut self, id: Ulid) -> Option<Appointment> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn appointment(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn appointment_mut(&mut self, id: Ulid) -> Option<&mut Appointment> {
        self.appointments.iter_mut().find(|a| a.id == id)
    }

    pub fn appointments_on(&self, date: NaiveDate) -> &[Appointment] {
        let lo = self.appointments.partition_point(|a| a.date < date);
        let hi = self.appointments.partition_point(|a| a.date <= date);
        &self.appointments[lo..hi]
    }

    /// Slot start times on `date` hidden from the resolver.
    pub fn booked_times(&self, date: NaiveDate) -> BTreeSet<NaiveTime> {
        self.appointments_on(date)
            .iter()
            .filter(|a| a.status.occupies_slot())
            .map(|a| a.time)
            .collect()
    }

    /// The appointment already holding `(date, time)`, if any.
    pub fn slot_holder(&self, date: NaiveDate, time: NaiveTime) -> Option<&Appointment> {
        self.appointments_on(date)
            .iter()
            .find(|a| a.time == time && a.status.holds_slot())
    }

    pub fn has_scheduled_appointments(&self) -> bool {
        self.appointments
            .iter()
            .any(|a| a.status == AppointmentStatus::Scheduled)
    }
}

/// A user profile as far as booking is concerned.
#[derive(Debug, Clone)]
pub struct AccountState {
    pub id: Ulid,
    pub name: String,
    pub suspended_until: Option<NaiveDateTime>,
    pub blocked: bool,
    pub specialty_blocks: Vec<SpecialtyBlock>,
    /// Ids of every appointment this user booked, in booking order.
    pub appointments: Vec<Ulid>,
}

impl AccountState {
    pub fn new(id: Ulid, name: String) -> Self {
        Self {
            id,
            name,
            suspended_until: None,
            blocked: false,
            specialty_blocks: Vec::new(),
            appointments: Vec::new(),
        }
    }

    /// Insert or replace the block for `block.specialty_id`.
    pub fn upsert_block(&mut self, block: SpecialtyBlock) {
        match self
            .specialty_blocks
            .iter_mut()
            .find(|b| b.specialty_id == block.specialty_id)
        {
            Some(existing) => *existing = block,
            None => self.specialty_blocks.push(block),
        }
    }

    pub fn remove_blocks(&mut self, specialty_id: Option<Ulid>) {
        match specialty_id {
            Some(sid) => self.specialty_blocks.retain(|b| b.specialty_id != sid),
            None => self.specialty_blocks.clear(),
        }
    }
}

/// The event types. This is the WAL record format and the notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ProfessionalCreated {
        id: Ulid,
        name: String,
    },
    ProfessionalUpdated {
        id: Ulid,
        name: String,
        active: bool,
    },
    ProfessionalDeleted {
        id: Ulid,
    },
    SpecialtyCreated {
        id: Ulid,
        name: String,
        duration_minutes: u32,
    },
    SpecialtyUpdated {
        id: Ulid,
        name: String,
        duration_minutes: u32,
        active: bool,
    },
    SpecialtyAssigned {
        professional_id: Ulid,
        specialty_id: Ulid,
    },
    SpecialtyUnassigned {
        professional_id: Ulid,
        specialty_id: Ulid,
    },
    AccountCreated {
        id: Ulid,
        name: String,
    },
    WeeklyAvailabilityReplaced {
        professional_id: Ulid,
        rows: Vec<(u8, TimeRange)>,
    },
    DateOverrideAdded {
        id: Ulid,
        professional_id: Ulid,
        date: NaiveDate,
        range: TimeRange,
    },
    DateOverrideRemoved {
        id: Ulid,
        professional_id: Ulid,
    },
    BlockedDayAdded {
        id: Ulid,
        professional_id: Option<Ulid>,
        date: NaiveDate,
        reason: Option<String>,
    },
    BlockedDayRemoved {
        id: Ulid,
        professional_id: Option<Ulid>,
    },
    AppointmentBooked {
        id: Ulid,
        user_id: Ulid,
        professional_id: Ulid,
        specialty_id: Ulid,
        date: NaiveDate,
        time: NaiveTime,
        notes: Option<String>,
    },
    AppointmentStatusChanged {
        id: Ulid,
        professional_id: Ulid,
        user_id: Ulid,
        status: AppointmentStatus,
    },
    AppointmentDeleted {
        id: Ulid,
        professional_id: Ulid,
        user_id: Ulid,
    },
    SpecialtyBlocked {
        user_id: Ulid,
        specialty_id: Ulid,
        blocked_until: Option<NaiveDateTime>,
        reason: Option<String>,
    },
    /// `specialty_id: None` lifts every specialty block of the user.
    SpecialtyBlockLifted {
        user_id: Ulid,
        specialty_id: Option<Ulid>,
    },
    /// `until: None` lifts the suspension.
    AccountSuspended {
        id: Ulid,
        until: Option<NaiveDateTime>,
    },
    AccountBlockChanged {
        id: Ulid,
        blocked: bool,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfessionalInfo {
    pub id: Ulid,
    pub name: String,
    pub active: bool,
    pub specialties: Vec<Ulid>,
}

/// An existing appointment that exhausts the user's monthly booking for a specialty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictingAppointment {
    pub appointment_id: Ulid,
    pub date: NaiveDate,
}

/// A specialty as offered to one user, with its active professionals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialtyOption {
    pub specialty_id: Ulid,
    pub name: String,
    pub professionals: Vec<(Ulid, String)>,
    /// Set when the user has an active block on this specialty.
    pub suspended: bool,
    pub suspended_until: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationOutcome {
    pub appointment_id: Ulid,
    /// Block created by a same-day cancellation, if any.
    pub penalty: Option<SpecialtyBlock>,
}
