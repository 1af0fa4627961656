use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use ulid::Ulid;

use crate::model::*;

use super::error::Refusal;

// ── Availability Resolver ─────────────────────────────────────────

/// Read-only view of the rows the resolver needs for one professional.
#[derive(Clone, Copy)]
pub struct Snapshot<'a> {
    pub professional_id: Ulid,
    pub weekly: &'a [WeeklyAvailability],
    pub overrides: &'a [DateOverride],
    /// Rows scoped to this professional.
    pub blocked: &'a [BlockedDay],
    /// Rows with no professional (apply to everyone).
    pub global_blocked: &'a [BlockedDay],
    pub is_holiday: fn(NaiveDate) -> bool,
}

impl<'a> Snapshot<'a> {
    pub fn of(ps: &'a ProfessionalState, global_blocked: &'a [BlockedDay]) -> Self {
        Self {
            professional_id: ps.id,
            weekly: &ps.weekly,
            overrides: &ps.overrides,
            blocked: &ps.blocked,
            global_blocked,
            is_holiday: crate::holidays::is_holiday,
        }
    }

    fn overrides_on(&self, date: NaiveDate) -> impl Iterator<Item = &'a DateOverride> {
        let pid = self.professional_id;
        self.overrides
            .iter()
            .filter(move |o| o.date == date && o.professional_id == pid)
    }

    fn is_blocked(&self, date: NaiveDate) -> bool {
        self.blocked
            .iter()
            .chain(self.global_blocked)
            .any(|b| b.date == date && b.applies_to(self.professional_id))
    }
}

/// Decide whether `date` is offerable at all. First matching rule wins:
/// window → blocked day → holiday → override → weekly pattern → weekday default.
pub fn date_admissibility(
    snap: &Snapshot<'_>,
    date: NaiveDate,
    today: NaiveDate,
    window_days: i64,
) -> Result<(), Refusal> {
    if date < today || date > today + Duration::days(window_days) {
        return Err(Refusal::OutOfWindow(date));
    }
    if snap.is_blocked(date) {
        return Err(Refusal::DateBlocked(date));
    }
    if (snap.is_holiday)(date) {
        return Err(Refusal::Holiday(date));
    }
    if snap.overrides_on(date).next().is_some() {
        return Ok(());
    }
    let dow = weekday_index(date);
    let matches = if snap.weekly.is_empty() {
        !is_weekend(date)
    } else {
        snap.weekly.iter().any(|w| w.day_of_week == dow)
    };
    if matches {
        Ok(())
    } else {
        Err(Refusal::NoWeeklyMatch(date))
    }
}

/// Every admissible date from `today` through `today + window_days`.
pub fn resolve_available_dates(
    snap: &Snapshot<'_>,
    today: NaiveDate,
    window_days: i64,
) -> BTreeSet<NaiveDate> {
    today
        .iter_days()
        .take_while(|d| *d <= today + Duration::days(window_days))
        .filter(|d| date_admissibility(snap, *d, today, window_days).is_ok())
        .collect()
}

/// Hourly slots for `date`: from the date's overrides if it has any,
/// otherwise from the weekly rows matching its weekday.
pub fn generate_slots(snap: &Snapshot<'_>, date: NaiveDate) -> BTreeSet<NaiveTime> {
    let mut ranges: Vec<TimeRange> = snap.overrides_on(date).map(|o| o.range).collect();
    if ranges.is_empty() {
        let dow = weekday_index(date);
        ranges.extend(
            snap.weekly
                .iter()
                .filter(|w| w.day_of_week == dow)
                .map(|w| w.range),
        );
    }
    ranges.iter().flat_map(|r| r.hourly_slots()).collect()
}

/// Free slots on `date`: generated slots minus booked ones, minus elapsed ones when `date` is today.
pub fn resolve_available_slots(
    snap: &Snapshot<'_>,
    date: NaiveDate,
    booked: &BTreeSet<NaiveTime>,
    now: NaiveDateTime,
) -> Vec<NaiveTime> {
    let is_today = date == now.date();
    generate_slots(snap, date)
        .into_iter()
        .filter(|slot| !booked.contains(slot))
        .filter(|slot| !is_today || *slot > now.time())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn no_holidays(_: NaiveDate) -> bool {
        false
    }

    // Monday.
    const TODAY: (i32, u32, u32) = (2026, 10, 19);

    fn today() -> NaiveDate {
        d(TODAY.0, TODAY.1, TODAY.2)
    }

    struct Rows {
        pid: Ulid,
        weekly: Vec<WeeklyAvailability>,
        overrides: Vec<DateOverride>,
        blocked: Vec<BlockedDay>,
        global: Vec<BlockedDay>,
        holidays: fn(NaiveDate) -> bool,
    }

    impl Rows {
        fn new() -> Self {
            Self {
                pid: Ulid::new(),
                weekly: Vec::new(),
                overrides: Vec::new(),
                blocked: Vec::new(),
                global: Vec::new(),
                holidays: no_holidays,
            }
        }

        fn weekly(mut self, dow: u8, start: u32, end: u32) -> Self {
            self.weekly.push(WeeklyAvailability {
                professional_id: self.pid,
                day_of_week: dow,
                range: TimeRange::new(t(start, 0), t(end, 0)),
            });
            self
        }

        fn override_on(mut self, date: NaiveDate, start: u32, end: u32) -> Self {
            self.overrides.push(DateOverride {
                id: Ulid::new(),
                professional_id: self.pid,
                date,
                range: TimeRange::new(t(start, 0), t(end, 0)),
            });
            self
        }

        fn block(mut self, date: NaiveDate, global: bool) -> Self {
            let row = BlockedDay {
                id: Ulid::new(),
                professional_id: if global { None } else { Some(self.pid) },
                date,
                reason: None,
            };
            if global {
                self.global.push(row);
            } else {
                self.blocked.push(row);
            }
            self
        }

        fn snap(&self) -> Snapshot<'_> {
            Snapshot {
                professional_id: self.pid,
                weekly: &self.weekly,
                overrides: &self.overrides,
                blocked: &self.blocked,
                global_blocked: &self.global,
                is_holiday: self.holidays,
            }
        }
    }

    // ── date_admissibility ───────────────────────────────

    #[test]
    fn past_and_far_future_are_out_of_window() {
        let rows = Rows::new().override_on(today() - Duration::days(1), 9, 17);
        let snap = rows.snap();
        let yesterday = today() - Duration::days(1);
        assert_eq!(
            date_admissibility(&snap, yesterday, today(), 30),
            Err(Refusal::OutOfWindow(yesterday))
        );
        let day31 = today() + Duration::days(31);
        assert_eq!(
            date_admissibility(&snap, day31, today(), 30),
            Err(Refusal::OutOfWindow(day31))
        );
        // Day 30 is inside (a Wednesday with default weekday rule).
        assert!(date_admissibility(&snap, today() + Duration::days(30), today(), 30).is_ok());
    }

    #[test]
    fn resolved_dates_never_leave_window() {
        let mut rows = Rows::new();
        for dow in 0..7 {
            rows = rows.weekly(dow, 8, 18);
        }
        let dates = resolve_available_dates(&rows.snap(), today(), 30);
        assert_eq!(dates.len(), 31);
        assert_eq!(dates.first(), Some(&today()));
        assert_eq!(dates.last(), Some(&(today() + Duration::days(30))));
    }

    #[test]
    fn blocked_day_beats_override() {
        let target = d(2026, 10, 25); // Sunday
        let rows = Rows::new().override_on(target, 9, 11).block(target, false);
        let snap = rows.snap();
        assert_eq!(
            date_admissibility(&snap, target, today(), 30),
            Err(Refusal::DateBlocked(target))
        );
        assert!(!resolve_available_dates(&snap, today(), 30).contains(&target));
    }

    #[test]
    fn global_block_applies_to_every_professional() {
        let target = d(2026, 10, 21);
        let rows = Rows::new().weekly(3, 9, 17).block(target, true);
        assert_eq!(
            date_admissibility(&rows.snap(), target, today(), 30),
            Err(Refusal::DateBlocked(target))
        );
    }

    #[test]
    fn other_professionals_block_is_ignored() {
        let target = d(2026, 10, 21);
        let mut rows = Rows::new().weekly(3, 9, 17);
        rows.blocked.push(BlockedDay {
            id: Ulid::new(),
            professional_id: Some(Ulid::new()),
            date: target,
            reason: None,
        });
        assert!(date_admissibility(&rows.snap(), target, today(), 30).is_ok());
    }

    #[test]
    fn holiday_excluded_even_with_override() {
        let all_souls = d(2026, 11, 2); // Monday, national holiday
        let mut rows = Rows::new().weekly(1, 9, 17).override_on(all_souls, 9, 12);
        rows.holidays = crate::holidays::is_holiday;
        let snap = rows.snap();
        assert_eq!(
            date_admissibility(&snap, all_souls, today(), 30),
            Err(Refusal::Holiday(all_souls))
        );
        let dates = resolve_available_dates(&snap, today(), 30);
        for h in crate::holidays::holidays(2026) {
            assert!(!dates.contains(&h), "{h} should be excluded");
        }
    }

    #[test]
    fn override_bypasses_weekly_pattern() {
        let sunday = d(2026, 10, 25);
        let rows = Rows::new().weekly(1, 9, 17).override_on(sunday, 9, 11);
        assert!(date_admissibility(&rows.snap(), sunday, today(), 30).is_ok());
    }

    #[test]
    fn weekly_pattern_restricts_weekdays() {
        let rows = Rows::new().weekly(1, 9, 17);
        let snap = rows.snap();
        let tuesday = d(2026, 10, 20);
        assert_eq!(
            date_admissibility(&snap, tuesday, today(), 30),
            Err(Refusal::NoWeeklyMatch(tuesday))
        );
        let dates = resolve_available_dates(&snap, today(), 30);
        assert!(dates.iter().all(|d| weekday_index(*d) == 1));
        assert_eq!(dates.len(), 5); // Oct 19, 26, Nov 2, 9, 16
    }

    #[test]
    fn no_weekly_rows_defaults_to_weekdays() {
        let rows = Rows::new();
        let snap = rows.snap();
        let saturday = d(2026, 10, 24);
        assert_eq!(
            date_admissibility(&snap, saturday, today(), 30),
            Err(Refusal::NoWeeklyMatch(saturday))
        );
        assert!(date_admissibility(&snap, d(2026, 10, 23), today(), 30).is_ok());
        let dates = resolve_available_dates(&snap, today(), 30);
        assert!(dates.iter().all(|d| !is_weekend(*d)));
    }

    // ── slots ────────────────────────────────────────────

    #[test]
    fn monday_rule_yields_eight_slots_tuesday_none() {
        let rows = Rows::new().weekly(1, 9, 17);
        let snap = rows.snap();
        let now = d(2026, 10, 19).and_hms_opt(8, 0, 0).unwrap();
        let next_monday = d(2026, 10, 26);
        let slots = resolve_available_slots(&snap, next_monday, &BTreeSet::new(), now);
        let expected: Vec<_> = (9..17).map(|h| t(h, 0)).collect();
        assert_eq!(slots, expected);

        let tuesday = d(2026, 10, 27);
        assert!(resolve_available_slots(&snap, tuesday, &BTreeSet::new(), now).is_empty());
    }

    #[test]
    fn sunday_override_without_weekly_rule() {
        let sunday = d(2026, 10, 25);
        let rows = Rows::new().weekly(1, 9, 17).override_on(sunday, 9, 11);
        let now = today().and_hms_opt(8, 0, 0).unwrap();
        let slots = resolve_available_slots(&rows.snap(), sunday, &BTreeSet::new(), now);
        assert_eq!(slots, vec![t(9, 0), t(10, 0)]);
    }

    #[test]
    fn override_replaces_weekly_ranges_for_its_date() {
        let monday = d(2026, 10, 26);
        let rows = Rows::new().weekly(1, 9, 17).override_on(monday, 14, 16);
        let now = today().and_hms_opt(8, 0, 0).unwrap();
        let slots = resolve_available_slots(&rows.snap(), monday, &BTreeSet::new(), now);
        assert_eq!(slots, vec![t(14, 0), t(15, 0)]);
    }

    #[test]
    fn adjacent_overrides_merge() {
        let date = d(2026, 10, 28);
        let rows = Rows::new().override_on(date, 11, 13).override_on(date, 9, 11);
        let now = today().and_hms_opt(8, 0, 0).unwrap();
        let slots = resolve_available_slots(&rows.snap(), date, &BTreeSet::new(), now);
        assert_eq!(slots, vec![t(9, 0), t(10, 0), t(11, 0), t(12, 0)]);
    }

    #[test]
    fn overlapping_weekly_rows_are_deduplicated() {
        let rows = Rows::new().weekly(1, 9, 12).weekly(1, 10, 14);
        let now = today().and_hms_opt(7, 0, 0).unwrap();
        let slots = resolve_available_slots(&rows.snap(), d(2026, 10, 26), &BTreeSet::new(), now);
        assert_eq!(slots, (9..14).map(|h| t(h, 0)).collect::<Vec<_>>());
    }

    #[test]
    fn booked_slot_removed() {
        let rows = Rows::new().weekly(1, 9, 12);
        let now = today().and_hms_opt(7, 0, 0).unwrap();
        let booked: BTreeSet<_> = [t(10, 0)].into_iter().collect();
        let slots = resolve_available_slots(&rows.snap(), d(2026, 10, 26), &booked, now);
        assert_eq!(slots, vec![t(9, 0), t(11, 0)]);
    }

    #[test]
    fn elapsed_slots_dropped_only_today() {
        let mut rows = Rows::new();
        for dow in 0..7 {
            rows = rows.weekly(dow, 9, 17);
        }
        let snap = rows.snap();
        let now = today().and_hms_opt(14, 30, 0).unwrap();
        let todays = resolve_available_slots(&snap, today(), &BTreeSet::new(), now);
        assert_eq!(todays, vec![t(15, 0), t(16, 0)]);

        let tomorrow = today() + Duration::days(1);
        let tomorrows = resolve_available_slots(&snap, tomorrow, &BTreeSet::new(), now);
        assert!(tomorrows.contains(&t(9, 0)));
        assert!(tomorrows.contains(&t(14, 0)));
        assert_eq!(tomorrows.len(), 8);
    }

    #[test]
    fn slot_at_exact_now_is_elapsed() {
        let rows = Rows::new().weekly(1, 9, 12);
        let now = today().and_hms_opt(10, 0, 0).unwrap();
        let slots = resolve_available_slots(&rows.snap(), today(), &BTreeSet::new(), now);
        assert_eq!(slots, vec![t(11, 0)]);
    }
}
