use super::*;
use crate::limits::*;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::path::PathBuf;

fn d(m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, m, day).unwrap()
}

fn t(h: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, 0, 0).unwrap()
}

fn range(start: u32, end: u32) -> TimeRange {
    TimeRange::new(t(start), t(end))
}

/// Monday 2026-10-19, 09:30.
fn now() -> NaiveDateTime {
    d(10, 19).and_hms_opt(9, 30, 0).unwrap()
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("agenda_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    let _ = std::fs::remove_file(path.with_extension("wal.tmp"));
    path
}

struct Fixture {
    engine: Engine,
    pro: Ulid,
    massage: Ulid,
    user: Ulid,
}

/// One professional offering massage Monday to Friday 09:00-17:00, one user.
async fn setup(wal: &str) -> Fixture {
    let engine = Engine::new(test_wal_path(wal), Arc::new(NotifyHub::new())).unwrap();
    let (pro, massage, user) = (Ulid::new(), Ulid::new(), Ulid::new());
    engine.create_professional(pro, "Ana".into()).await.unwrap();
    engine.create_specialty(massage, "Massage".into(), 60).await.unwrap();
    engine.assign_specialty(pro, massage).await.unwrap();
    engine.create_account(user, "Caio".into()).await.unwrap();
    engine
        .replace_weekly_availability(pro, (1..=5).map(|dow| (dow, range(9, 17))).collect())
        .await
        .unwrap();
    Fixture {
        engine,
        pro,
        massage,
        user,
    }
}

impl Fixture {
    async fn book(&self, user: Ulid, date: NaiveDate, hour: u32) -> Result<Ulid, EngineError> {
        self.book_specialty(user, self.massage, date, hour).await
    }

    async fn book_specialty(
        &self,
        user: Ulid,
        specialty: Ulid,
        date: NaiveDate,
        hour: u32,
    ) -> Result<Ulid, EngineError> {
        let id = Ulid::new();
        self.engine
            .book_appointment(id, user, self.pro, specialty, date, t(hour), None, now())
            .await?;
        Ok(id)
    }

    async fn other_user(&self, name: &str) -> Ulid {
        let id = Ulid::new();
        self.engine.create_account(id, name.into()).await.unwrap();
        id
    }
}

fn refusal(result: Result<impl std::fmt::Debug, EngineError>) -> Refusal {
    match result {
        Err(EngineError::Refused(r)) => r,
        other => panic!("expected a refusal, got {other:?}"),
    }
}

// ── Booking ──────────────────────────────────────────────

#[tokio::test]
async fn book_removes_slot() {
    let f = setup("book_removes_slot.wal").await;
    let tuesday = d(10, 20);

    assert_eq!(
        f.engine.available_slots(f.pro, tuesday, now()).await.unwrap().len(),
        8
    );
    let id = f.book(f.user, tuesday, 10).await.unwrap();

    let slots = f.engine.available_slots(f.pro, tuesday, now()).await.unwrap();
    assert_eq!(slots.len(), 7);
    assert!(!slots.contains(&t(10)));

    let appt = f.engine.get_appointment(id).await.unwrap();
    assert_eq!(appt.status, AppointmentStatus::Scheduled);
    assert_eq!(appt.user_id, f.user);
    assert_eq!(f.engine.appointments_for_user(f.user).await.unwrap(), vec![appt.clone()]);
    assert_eq!(
        f.engine.appointments_for_professional(f.pro).await.unwrap(),
        vec![appt]
    );
}

#[tokio::test]
async fn same_slot_twice_is_taken() {
    let f = setup("slot_taken.wal").await;
    let other = f.other_user("Bia").await;
    f.book(f.user, d(10, 20), 10).await.unwrap();
    assert_eq!(refusal(f.book(other, d(10, 20), 10).await), Refusal::SlotTaken);
    // Neighbouring slot is still free.
    f.book(other, d(10, 20), 11).await.unwrap();
}

#[tokio::test]
async fn monthly_limit_per_specialty() {
    let f = setup("monthly_limit.wal").await;
    let nutrition = Ulid::new();
    f.engine
        .create_specialty(nutrition, "Nutrition".into(), 60)
        .await
        .unwrap();
    f.engine.assign_specialty(f.pro, nutrition).await.unwrap();

    f.book(f.user, d(10, 20), 10).await.unwrap();
    assert_eq!(
        refusal(f.book(f.user, d(10, 27), 10).await),
        Refusal::MonthlyLimit {
            conflicting_date: d(10, 20)
        }
    );
    // Different specialty, same month.
    f.book_specialty(f.user, nutrition, d(10, 21), 10).await.unwrap();

    let conflict = f
        .engine
        .monthly_conflict(f.user, f.massage, d(10, 19))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(conflict.date, d(10, 20));
}

#[tokio::test]
async fn monthly_limit_follows_the_current_month() {
    let f = setup("monthly_limit_boundary.wal").await;

    // An October booking uses up the specialty for the rest of October,
    // including dates chosen in November.
    f.book(f.user, d(10, 20), 10).await.unwrap();
    assert_eq!(
        refusal(f.book(f.user, d(11, 3), 10).await),
        Refusal::MonthlyLimit {
            conflicting_date: d(10, 20)
        }
    );

    // A November booking does not count against October.
    let other = f.other_user("Bia").await;
    f.book(other, d(11, 3), 10).await.unwrap();
    f.book(other, d(10, 27), 10).await.unwrap();
}

#[tokio::test]
async fn cancelled_booking_frees_month_and_slot() {
    let f = setup("cancel_frees.wal").await;
    let id = f.book(f.user, d(10, 20), 10).await.unwrap();
    f.engine
        .cancel_appointment(id, Actor::User, false, now())
        .await
        .unwrap();

    assert!(
        f.engine
            .available_slots(f.pro, d(10, 20), now())
            .await
            .unwrap()
            .contains(&t(10))
    );
    assert!(
        f.engine
            .monthly_conflict(f.user, f.massage, d(10, 19))
            .await
            .unwrap()
            .is_none()
    );
    f.book(f.user, d(10, 20), 10).await.unwrap();
}

#[tokio::test]
async fn booking_date_refusals() {
    let f = setup("date_refusals.wal").await;
    let global_block = Ulid::new();
    f.engine
        .add_blocked_day(global_block, None, d(10, 23), Some("maintenance".into()))
        .await
        .unwrap();

    assert_eq!(
        refusal(f.book(f.user, d(10, 24), 10).await),
        Refusal::NoWeeklyMatch(d(10, 24))
    );
    assert_eq!(
        refusal(f.book(f.user, d(11, 2), 10).await),
        Refusal::Holiday(d(11, 2))
    );
    assert_eq!(
        refusal(f.book(f.user, d(12, 1), 10).await),
        Refusal::OutOfWindow(d(12, 1))
    );
    assert_eq!(
        refusal(f.book(f.user, d(10, 23), 10).await),
        Refusal::DateBlocked(d(10, 23))
    );
    assert_eq!(
        refusal(f.engine.available_slots(f.pro, d(10, 23), now()).await),
        Refusal::DateBlocked(d(10, 23))
    );

    f.engine.remove_blocked_day(global_block).await.unwrap();
    f.book(f.user, d(10, 23), 10).await.unwrap();
}

#[tokio::test]
async fn booking_slot_must_exist_and_be_ahead() {
    let f = setup("slot_must_exist.wal").await;
    let today = now().date();
    // 09:00 already started at 09:30.
    assert_eq!(refusal(f.book(f.user, today, 9).await), Refusal::SlotTaken);
    // Outside the weekly range.
    assert_eq!(refusal(f.book(f.user, today, 18).await), Refusal::SlotTaken);
    // Not on the hour.
    let half_past = NaiveTime::from_hms_opt(10, 30, 0).unwrap();
    let err = f
        .engine
        .book_appointment(Ulid::new(), f.user, f.pro, f.massage, today, half_past, None, now())
        .await;
    assert_eq!(refusal(err), Refusal::SlotTaken);

    f.book(f.user, today, 10).await.unwrap();
}

#[tokio::test]
async fn booking_requires_offered_specialty() {
    let f = setup("offered_specialty.wal").await;
    let psychology = Ulid::new();
    f.engine
        .create_specialty(psychology, "Psychology".into(), 50)
        .await
        .unwrap();
    let err = f.book_specialty(f.user, psychology, d(10, 20), 10).await;
    assert!(matches!(err, Err(EngineError::InvalidInput(_))));

    let err = f
        .engine
        .available_dates(f.pro, psychology, d(10, 19))
        .await;
    assert!(matches!(err, Err(EngineError::InvalidInput(_))));
}

#[tokio::test]
async fn unknown_entities_are_not_found() {
    let f = setup("unknown_entities.wal").await;
    let ghost = Ulid::new();
    assert!(matches!(
        f.book(ghost, d(10, 20), 10).await,
        Err(EngineError::NotFound(id)) if id == ghost
    ));
    assert!(matches!(
        f.engine.cancel_appointment(ghost, Actor::User, false, now()).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        f.engine.available_slots(ghost, d(10, 20), now()).await,
        Err(EngineError::NotFound(_))
    ));
}

// ── Cancellation ─────────────────────────────────────────

#[tokio::test]
async fn same_day_user_cancellation_needs_penalty_acceptance() {
    let f = setup("same_day_penalty.wal").await;
    let id = f.book(f.user, now().date(), 14).await.unwrap();

    assert_eq!(
        refusal(f.engine.cancel_appointment(id, Actor::User, false, now()).await),
        Refusal::PenaltyNotAccepted
    );
    // Refusal left the appointment untouched.
    assert_eq!(
        f.engine.get_appointment(id).await.unwrap().status,
        AppointmentStatus::Scheduled
    );

    let outcome = f
        .engine
        .cancel_appointment(id, Actor::User, true, now())
        .await
        .unwrap();
    let penalty = outcome.penalty.unwrap();
    assert_eq!(penalty.specialty_id, f.massage);
    assert_eq!(
        penalty.blocked_until,
        Some(now() + Duration::days(SAME_DAY_PENALTY_DAYS))
    );

    assert!(matches!(
        refusal(f.book(f.user, d(11, 3), 10).await),
        Refusal::SpecialtySuspended { until: Some(_) }
    ));

    let options = f.engine.selectable_specialties(f.user, now()).await.unwrap();
    assert_eq!(options.len(), 1);
    assert!(options[0].suspended);
    assert_eq!(options[0].suspended_until, penalty.blocked_until);
}

#[tokio::test]
async fn cancellation_on_another_day_has_no_penalty() {
    let f = setup("no_penalty.wal").await;
    let id = f.book(f.user, d(10, 20), 10).await.unwrap();
    let outcome = f
        .engine
        .cancel_appointment(id, Actor::User, false, now())
        .await
        .unwrap();
    assert_eq!(outcome.appointment_id, id);
    assert!(outcome.penalty.is_none());

    assert!(matches!(
        f.engine.cancel_appointment(id, Actor::User, false, now()).await,
        Err(EngineError::InvalidTransition {
            from: AppointmentStatus::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn professional_same_day_cancellation_is_free() {
    let f = setup("professional_cancel.wal").await;
    let id = f.book(f.user, now().date(), 15).await.unwrap();
    let outcome = f
        .engine
        .cancel_appointment(id, Actor::Professional, false, now())
        .await
        .unwrap();
    assert!(outcome.penalty.is_none());
    f.book(f.user, d(10, 22), 10).await.unwrap();
}

#[tokio::test]
async fn lifecycle_transitions_only_from_scheduled() {
    let f = setup("lifecycle.wal").await;
    let other = f.other_user("Bia").await;
    let done = f.book(f.user, d(10, 20), 10).await.unwrap();
    let missed = f.book(other, d(10, 20), 11).await.unwrap();

    f.engine.complete_appointment(done).await.unwrap();
    assert!(matches!(
        f.engine.cancel_appointment(done, Actor::Admin, false, now()).await,
        Err(EngineError::InvalidTransition { .. })
    ));
    assert!(matches!(
        f.engine.mark_no_show(done).await,
        Err(EngineError::InvalidTransition { .. })
    ));

    f.engine.mark_no_show(missed).await.unwrap();
    let slots = f.engine.available_slots(f.pro, d(10, 20), now()).await.unwrap();
    // Completed still occupies its slot, a no-show does not.
    assert!(!slots.contains(&t(10)));
    assert!(slots.contains(&t(11)));
    // ...but a no-show still holds the slot against a new booking.
    let third = f.other_user("Caro").await;
    assert_eq!(refusal(f.book(third, d(10, 20), 11).await), Refusal::SlotTaken);

    // Completed counts toward the month.
    assert!(matches!(
        refusal(f.book(f.user, d(10, 27), 10).await),
        Refusal::MonthlyLimit { .. }
    ));
}

#[tokio::test]
async fn admin_delete_appointment() {
    let f = setup("delete_appointment.wal").await;
    let id = f.book(f.user, d(10, 20), 10).await.unwrap();
    f.engine.delete_appointment(id).await.unwrap();
    assert!(f.engine.get_appointment(id).await.is_none());
    assert!(f.engine.appointments_for_user(f.user).await.unwrap().is_empty());
    assert!(matches!(
        f.engine.delete_appointment(id).await,
        Err(EngineError::NotFound(_))
    ));
}

// ── Sanctions ────────────────────────────────────────────

#[tokio::test]
async fn suspended_account_cannot_book_or_browse() {
    let f = setup("suspended.wal").await;
    let until = f.engine.suspend_account(f.user, None, now()).await.unwrap();
    assert_eq!(until, d(12, 19).and_hms_opt(9, 30, 0).unwrap());

    assert_eq!(
        refusal(f.book(f.user, d(10, 20), 10).await),
        Refusal::AccountSuspended { until }
    );
    assert_eq!(
        refusal(f.engine.selectable_specialties(f.user, now()).await),
        Refusal::AccountSuspended { until }
    );

    f.engine
        .block_specialty(f.user, f.massage, None, None, now())
        .await
        .unwrap();
    f.engine.lift_suspension(f.user).await.unwrap();

    let acc = f.engine.get_account(&f.user).unwrap();
    let acc = acc.read().await;
    assert_eq!(acc.suspended_until, None);
    assert!(acc.specialty_blocks.is_empty());
    drop(acc);
    f.book(f.user, d(10, 20), 10).await.unwrap();
}

#[tokio::test]
async fn suspension_in_the_past_is_rejected() {
    let f = setup("past_suspension.wal").await;
    let err = f
        .engine
        .suspend_account(f.user, Some(now() - Duration::days(1)), now())
        .await;
    assert!(matches!(err, Err(EngineError::InvalidInput(_))));
}

#[tokio::test]
async fn blocked_account_refused() {
    let f = setup("blocked_account.wal").await;
    f.engine.block_account(f.user).await.unwrap();
    assert_eq!(
        refusal(f.book(f.user, d(10, 20), 10).await),
        Refusal::AccountBlocked
    );
    f.engine.unblock_account(f.user).await.unwrap();
    f.book(f.user, d(10, 20), 10).await.unwrap();
}

#[tokio::test]
async fn manual_specialty_block_upserts_and_lifts() {
    let f = setup("specialty_block.wal").await;
    let first = f
        .engine
        .block_specialty(f.user, f.massage, None, None, now())
        .await
        .unwrap();
    assert_eq!(
        first.blocked_until,
        Some(d(12, 19).and_hms_opt(9, 30, 0).unwrap())
    );
    assert_eq!(first.reason.as_deref(), Some(ADMIN_SUSPENSION_REASON));

    let until = now() + Duration::days(3);
    f.engine
        .block_specialty(f.user, f.massage, Some(until), Some("late".into()), now())
        .await
        .unwrap();
    {
        let acc = f.engine.get_account(&f.user).unwrap();
        let acc = acc.read().await;
        assert_eq!(acc.specialty_blocks.len(), 1);
        assert_eq!(acc.specialty_blocks[0].blocked_until, Some(until));
    }

    f.engine
        .lift_specialty_block(f.user, Some(f.massage))
        .await
        .unwrap();
    f.book(f.user, d(10, 20), 10).await.unwrap();
    assert!(matches!(
        f.engine.lift_specialty_block(f.user, Some(f.massage)).await,
        Err(EngineError::NotFound(_))
    ));
}

// ── Availability configuration ───────────────────────────

#[tokio::test]
async fn overrides_reject_overlap_and_merge_adjacent() {
    let f = setup("overrides.wal").await;
    let sunday = d(10, 25);
    let first = Ulid::new();
    f.engine
        .add_date_override(first, f.pro, sunday, range(9, 11))
        .await
        .unwrap();

    let err = f
        .engine
        .add_date_override(Ulid::new(), f.pro, sunday, range(10, 12))
        .await;
    assert!(matches!(
        err,
        Err(EngineError::OverlappingOverride { existing, .. }) if existing == first
    ));

    f.engine
        .add_date_override(Ulid::new(), f.pro, sunday, range(11, 13))
        .await
        .unwrap();
    let slots = f.engine.available_slots(f.pro, sunday, now()).await.unwrap();
    assert_eq!(slots, vec![t(9), t(10), t(11), t(12)]);

    let dates = f
        .engine
        .available_dates(f.pro, f.massage, d(10, 19))
        .await
        .unwrap();
    assert!(dates.contains(&sunday));
    assert!(!dates.contains(&d(10, 24)));

    assert_eq!(f.engine.remove_date_override(first).await.unwrap(), f.pro);
    let slots = f.engine.available_slots(f.pro, sunday, now()).await.unwrap();
    assert_eq!(slots, vec![t(11), t(12)]);
}

#[tokio::test]
async fn professional_blocked_day_only_affects_them() {
    let f = setup("own_blocked_day.wal").await;
    let other_pro = Ulid::new();
    f.engine.create_professional(other_pro, "Bruno".into()).await.unwrap();
    f.engine.assign_specialty(other_pro, f.massage).await.unwrap();

    let block = Ulid::new();
    f.engine
        .add_blocked_day(block, Some(f.pro), d(10, 21), None)
        .await
        .unwrap();

    assert_eq!(
        f.engine.check_date(f.pro, d(10, 21), d(10, 19)).await.unwrap(),
        Some(Refusal::DateBlocked(d(10, 21)))
    );
    // No weekly rows: weekday default applies to the other professional.
    assert_eq!(
        f.engine.check_date(other_pro, d(10, 21), d(10, 19)).await.unwrap(),
        None
    );

    f.engine.remove_blocked_day(block).await.unwrap();
    assert_eq!(
        f.engine.check_date(f.pro, d(10, 21), d(10, 19)).await.unwrap(),
        None
    );
    assert!(matches!(
        f.engine.remove_blocked_day(block).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn weekly_rows_validated() {
    let f = setup("weekly_validation.wal").await;
    assert!(matches!(
        f.engine
            .replace_weekly_availability(f.pro, vec![(7, range(9, 10))])
            .await,
        Err(EngineError::InvalidInput(_))
    ));
    let inverted = TimeRange {
        start: t(12),
        end: t(9),
    };
    assert!(matches!(
        f.engine.replace_weekly_availability(f.pro, vec![(1, inverted)]).await,
        Err(EngineError::InvalidInput(_))
    ));

    // Replacing with Mondays only removes Tuesday.
    f.engine
        .replace_weekly_availability(f.pro, vec![(1, range(9, 17))])
        .await
        .unwrap();
    assert_eq!(
        f.engine.check_date(f.pro, d(10, 20), d(10, 19)).await.unwrap(),
        Some(Refusal::NoWeeklyMatch(d(10, 20)))
    );
    assert_eq!(
        f.engine
            .available_slots(f.pro, d(10, 26), now())
            .await
            .unwrap()
            .len(),
        8
    );
}

// ── Reference data ───────────────────────────────────────

#[tokio::test]
async fn delete_professional_refused_with_scheduled_appointments() {
    let f = setup("delete_professional.wal").await;
    let id = f.book(f.user, d(10, 20), 10).await.unwrap();
    assert!(matches!(
        f.engine.delete_professional(f.pro).await,
        Err(EngineError::HasAppointments(_))
    ));
    f.engine
        .cancel_appointment(id, Actor::Admin, false, now())
        .await
        .unwrap();
    f.engine.delete_professional(f.pro).await.unwrap();
    assert!(f.engine.get_professional(&f.pro).is_none());
    assert!(f.engine.get_professional_for_entity(&id).is_none());
    assert!(f.engine.list_professionals().await.is_empty());
}

#[tokio::test]
async fn deleting_professional_clears_account_history() {
    let path = test_wal_path("delete_professional_history.wal");
    let f = setup("delete_professional_history.wal").await;
    let id = f.book(f.user, d(10, 20), 10).await.unwrap();
    f.engine.complete_appointment(id).await.unwrap();
    f.engine.delete_professional(f.pro).await.unwrap();

    let account_ids = |engine: &Engine, user: Ulid| {
        let acc = engine.get_account(&user).unwrap();
        let ids = acc.try_read().unwrap().appointments.clone();
        ids
    };
    assert!(account_ids(&f.engine, f.user).is_empty());
    assert!(f.engine.appointments_for_user(f.user).await.unwrap().is_empty());
    let user = f.user;
    drop(f);

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert!(account_ids(&engine, user).is_empty());
}

#[tokio::test]
async fn blocked_day_ids_unique_across_scopes() {
    let f = setup("blocked_day_ids.wal").await;
    let global = Ulid::new();
    f.engine
        .add_blocked_day(global, None, d(10, 23), None)
        .await
        .unwrap();
    assert!(matches!(
        f.engine.add_blocked_day(global, Some(f.pro), d(10, 26), None).await,
        Err(EngineError::AlreadyExists(_))
    ));

    let own = Ulid::new();
    f.engine
        .add_blocked_day(own, Some(f.pro), d(10, 26), None)
        .await
        .unwrap();
    assert!(matches!(
        f.engine.add_blocked_day(own, None, d(10, 27), None).await,
        Err(EngineError::AlreadyExists(_))
    ));

    // Removal still finds each one in its own scope.
    f.engine.remove_blocked_day(global).await.unwrap();
    f.engine.remove_blocked_day(own).await.unwrap();
    assert_eq!(
        f.engine.check_date(f.pro, d(10, 26), d(10, 19)).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn duplicate_ids_rejected() {
    let f = setup("duplicates.wal").await;
    assert!(matches!(
        f.engine.create_professional(f.pro, "Again".into()).await,
        Err(EngineError::AlreadyExists(_))
    ));
    assert!(matches!(
        f.engine.create_account(f.user, "Again".into()).await,
        Err(EngineError::AlreadyExists(_))
    ));
    assert!(matches!(
        f.engine.assign_specialty(f.pro, f.massage).await,
        Err(EngineError::AlreadyExists(_))
    ));
    assert!(matches!(
        f.engine.create_professional(Ulid::new(), "  ".into()).await,
        Err(EngineError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn catalog_tracks_reference_changes() {
    let f = setup("catalog.wal").await;
    let options = f.engine.selectable_specialties(f.user, now()).await.unwrap();
    assert_eq!(options.len(), 1);
    assert_eq!(options[0].name, "Massage");
    assert_eq!(options[0].professionals, vec![(f.pro, "Ana".to_string())]);
    assert!(!options[0].suspended);

    f.engine
        .update_professional(f.pro, Some("Ana Lima".into()), None)
        .await
        .unwrap();
    let options = f.engine.selectable_specialties(f.user, now()).await.unwrap();
    assert_eq!(options[0].professionals[0].1, "Ana Lima");

    f.engine
        .update_specialty(f.massage, None, None, Some(false))
        .await
        .unwrap();
    assert!(
        f.engine
            .selectable_specialties(f.user, now())
            .await
            .unwrap()
            .is_empty()
    );
    assert!(!f.engine.list_specialties()[0].active);
}

#[tokio::test]
async fn inactive_professional_cannot_be_booked() {
    let f = setup("inactive_professional.wal").await;
    f.engine
        .update_professional(f.pro, None, Some(false))
        .await
        .unwrap();
    assert!(matches!(
        f.book(f.user, d(10, 20), 10).await,
        Err(EngineError::InvalidInput(_))
    ));
    let list = f.engine.list_professionals().await;
    assert_eq!(list.len(), 1);
    assert!(!list[0].active);
    assert_eq!(list[0].name, "Ana");
}

// ── Persistence ──────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let f = setup("restart.wal").await;
    let sunday_override = Ulid::new();
    f.engine
        .add_date_override(sunday_override, f.pro, d(10, 25), range(9, 11))
        .await
        .unwrap();
    f.engine
        .add_blocked_day(Ulid::new(), None, d(10, 30), None)
        .await
        .unwrap();
    let kept = f.book(f.user, d(10, 20), 10).await.unwrap();
    let same_day = f.book(f.user, now().date(), 14).await;
    // Monthly limit: only one massage in October.
    assert!(same_day.is_err());
    f.engine.complete_appointment(kept).await.unwrap();
    f.engine.suspend_account(f.user, None, now()).await.unwrap();
    let (pro, massage, user) = (f.pro, f.massage, f.user);
    drop(f);

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let appt = engine.get_appointment(kept).await.unwrap();
    assert_eq!(appt.status, AppointmentStatus::Completed);
    assert_eq!(engine.get_professional_for_entity(&sunday_override), Some(pro));
    assert_eq!(
        engine.available_slots(pro, d(10, 25), now()).await.unwrap(),
        vec![t(9), t(10)]
    );
    assert_eq!(
        engine.check_date(pro, d(10, 30), d(10, 19)).await.unwrap(),
        Some(Refusal::DateBlocked(d(10, 30)))
    );
    assert!(engine.list_professionals().await[0].specialties.contains(&massage));
    assert!(matches!(
        refusal(engine.selectable_specialties(user, now()).await),
        Refusal::AccountSuspended { .. }
    ));
}

#[tokio::test]
async fn compaction_preserves_state() {
    let path = test_wal_path("compaction.wal");
    let f = setup("compaction.wal").await;
    let other = f.other_user("Bia").await;
    for _ in 0..5 {
        let id = f.book(other, d(10, 21), 10).await.unwrap();
        f.engine
            .cancel_appointment(id, Actor::User, false, now())
            .await
            .unwrap();
    }
    let today = f.book(f.user, now().date(), 16).await.unwrap();
    f.engine
        .cancel_appointment(today, Actor::User, true, now())
        .await
        .unwrap();
    let missed = f.book(other, d(10, 22), 9).await.unwrap();
    f.engine.mark_no_show(missed).await.unwrap();
    f.engine.block_account(other).await.unwrap();
    f.engine
        .update_specialty(f.massage, Some("Massotherapy".into()), None, None)
        .await
        .unwrap();

    assert!(f.engine.wal_appends_since_compact().await > 0);
    f.engine.compact_wal().await.unwrap();
    assert_eq!(f.engine.wal_appends_since_compact().await, 0);

    let (pro, user) = (f.pro, f.user);
    drop(f);

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    let appts = engine.appointments_for_professional(pro).await.unwrap();
    assert_eq!(appts.len(), 7);
    assert_eq!(
        engine.get_appointment(missed).await.unwrap().status,
        AppointmentStatus::NoShow
    );
    let acc = engine.get_account(&user).unwrap();
    assert_eq!(acc.read().await.specialty_blocks.len(), 1);
    let blocked = engine.get_account(&other).unwrap();
    assert!(blocked.read().await.blocked);
    assert_eq!(engine.list_specialties()[0].name, "Massotherapy");
    assert_eq!(engine.appointments_for_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn mutations_are_published() {
    let f = setup("published.wal").await;
    let mut user_rx = f.engine.notify.subscribe(f.user);
    let mut feed = f.engine.notify.subscribe_all();

    let id = f.book(f.user, d(10, 20), 10).await.unwrap();
    match user_rx.recv().await.unwrap() {
        Event::AppointmentBooked { id: got, .. } => assert_eq!(got, id),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(matches!(
        feed.recv().await.unwrap(),
        Event::AppointmentBooked { .. }
    ));

    // Status changes reach the user too, not only the professional.
    f.engine
        .cancel_appointment(id, Actor::Professional, false, now())
        .await
        .unwrap();
    match user_rx.recv().await.unwrap() {
        Event::AppointmentStatusChanged {
            id: got,
            user_id,
            status,
            ..
        } => {
            assert_eq!((got, user_id), (id, f.user));
            assert_eq!(status, AppointmentStatus::Cancelled);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn concurrent_bookings_for_one_slot() {
    let f = Arc::new(setup("concurrent.wal").await);
    let mut users = Vec::new();
    for i in 0..8 {
        users.push(f.other_user(&format!("user{i}")).await);
    }

    let mut handles = Vec::new();
    for user in users {
        let f = f.clone();
        handles.push(tokio::spawn(async move { f.book(user, d(10, 20), 10).await }));
    }
    let mut won = 0;
    let mut taken = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => won += 1,
            Err(EngineError::Refused(Refusal::SlotTaken)) => taken += 1,
            Err(e) => panic!("unexpected error {e}"),
        }
    }
    assert_eq!((won, taken), (1, 7));
}

#[tokio::test]
async fn concurrent_bookings_respect_monthly_limit() {
    let f = Arc::new(setup("concurrent_monthly.wal").await);
    let mut handles = Vec::new();
    for hour in 10..16 {
        let f = f.clone();
        let user = f.user;
        handles.push(tokio::spawn(async move { f.book(user, d(10, 20), hour).await }));
    }
    let mut won = 0;
    for h in handles {
        if h.await.unwrap().is_ok() {
            won += 1;
        }
    }
    assert_eq!(won, 1);
}
