// ── Business rules ───────────────────────────────────────────────

/// Rolling booking horizon: today through today + 30 days, inclusive.
pub const BOOKING_WINDOW_DAYS: i64 = 30;

/// Suspension applied to a specialty after a same-day cancellation.
pub const SAME_DAY_PENALTY_DAYS: i64 = 60;

/// Default duration of an administrative suspension.
pub const ADMIN_SUSPENSION_MONTHS: u32 = 2;

pub const SAME_DAY_PENALTY_REASON: &str = "same-day cancellation";
pub const ADMIN_SUSPENSION_REASON: &str = "administrative suspension";

/// Freshness of the specialty catalog snapshot.
pub const CATALOG_TTL_SECS: i64 = 5 * 60;

// ── Input limits ─────────────────────────────────────────────────

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 4096;
pub const MAX_REASON_LEN: usize = 1024;
pub const MAX_WEEKLY_ROWS_PER_PROFESSIONAL: usize = 64;
pub const MAX_OVERRIDES_PER_PROFESSIONAL: usize = 10_000;
pub const MAX_BLOCKED_DAYS: usize = 10_000;
pub const MAX_APPOINTMENTS_PER_PROFESSIONAL: usize = 200_000;
pub const MAX_PROFESSIONALS_PER_TENANT: usize = 1_000;
pub const MAX_SPECIALTIES_PER_TENANT: usize = 1_000;
pub const MAX_ACCOUNTS_PER_TENANT: usize = 1_000_000;

pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 64;
