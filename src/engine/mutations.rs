use std::collections::{BTreeSet, HashMap};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tokio::sync::oneshot;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::{date_admissibility, generate_slots, Snapshot};
use super::policy::{
    admin_suspension_end, check_account, check_monthly_limit, check_override_overlap,
    check_specialty_block, evaluate_cancellation_penalty, same_day_penalty, validate_name,
    validate_reason,
};
use super::{Engine, EngineError, Refusal, WalCommand};

impl Engine {
    // ── Reference data ───────────────────────────────────────

    pub async fn create_professional(&self, id: Ulid, name: String) -> Result<(), EngineError> {
        validate_name(&name)?;
        let _w = self.write_gate.read().await;
        if self.professionals.len() >= MAX_PROFESSIONALS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many professionals"));
        }
        if self.professionals.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::ProfessionalCreated { id, name };
        self.persist_and_apply(&event, None, None).await
    }

    pub async fn update_professional(
        &self,
        id: Ulid,
        name: Option<String>,
        active: Option<bool>,
    ) -> Result<(), EngineError> {
        if let Some(n) = &name {
            validate_name(n)?;
        }
        let _w = self.write_gate.read().await;
        let ps = self.professional(id)?;
        let mut guard = ps.write().await;
        let event = Event::ProfessionalUpdated {
            id,
            name: name.unwrap_or_else(|| guard.name.clone()),
            active: active.unwrap_or(guard.active),
        };
        self.persist_and_apply(&event, Some(&mut guard), None).await
    }

    /// Refused while the professional still has scheduled appointments.
    ///
    /// Past appointments are deleted first, one event each, so no account
    /// keeps ids of rows that no longer exist. Deactivate a professional
    /// instead to keep their history.
    pub async fn delete_professional(&self, id: Ulid) -> Result<(), EngineError> {
        let _w = self.write_gate.read().await;
        let ps = self.professional(id)?;
        loop {
            let users: BTreeSet<Ulid> =
                ps.read().await.appointments.iter().map(|a| a.user_id).collect();
            let accounts = users
                .iter()
                .map(|user_id| Ok((*user_id, self.account(*user_id)?)))
                .collect::<Result<Vec<_>, EngineError>>()?;
            // Sorted order, so two deletions never wait on each other.
            let mut acc_guards = HashMap::with_capacity(accounts.len());
            for (user_id, acc) in &accounts {
                acc_guards.insert(*user_id, acc.write().await);
            }

            let mut guard = ps.write().await;
            if guard.has_scheduled_appointments() {
                return Err(EngineError::HasAppointments(id));
            }
            if guard
                .appointments
                .iter()
                .any(|a| !acc_guards.contains_key(&a.user_id))
            {
                continue;
            }

            let history: Vec<(Ulid, Ulid)> =
                guard.appointments.iter().map(|a| (a.id, a.user_id)).collect();
            for (appointment_id, user_id) in history {
                let event = Event::AppointmentDeleted {
                    id: appointment_id,
                    professional_id: id,
                    user_id,
                };
                let acc = acc_guards.get_mut(&user_id).map(|g| &mut **g);
                self.persist_and_apply(&event, Some(&mut guard), acc).await?;
            }
            let event = Event::ProfessionalDeleted { id };
            self.persist_and_apply(&event, Some(&mut guard), None).await?;
            self.notify.remove(&id);
            return Ok(());
        }
    }

    pub async fn create_specialty(
        &self,
        id: Ulid,
        name: String,
        duration_minutes: u32,
    ) -> Result<(), EngineError> {
        validate_name(&name)?;
        if duration_minutes == 0 {
            return Err(EngineError::InvalidInput("duration must be positive"));
        }
        let _w = self.write_gate.read().await;
        if self.specialties.len() >= MAX_SPECIALTIES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many specialties"));
        }
        if self.specialties.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::SpecialtyCreated {
            id,
            name,
            duration_minutes,
        };
        self.persist_and_apply(&event, None, None).await
    }

    pub async fn update_specialty(
        &self,
        id: Ulid,
        name: Option<String>,
        duration_minutes: Option<u32>,
        active: Option<bool>,
    ) -> Result<(), EngineError> {
        if let Some(n) = &name {
            validate_name(n)?;
        }
        if duration_minutes == Some(0) {
            return Err(EngineError::InvalidInput("duration must be positive"));
        }
        let _w = self.write_gate.read().await;
        let current = self
            .specialties
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or(EngineError::NotFound(id))?;
        let event = Event::SpecialtyUpdated {
            id,
            name: name.unwrap_or(current.name),
            duration_minutes: duration_minutes.unwrap_or(current.duration_minutes),
            active: active.unwrap_or(current.active),
        };
        self.persist_and_apply(&event, None, None).await
    }

    pub async fn assign_specialty(
        &self,
        professional_id: Ulid,
        specialty_id: Ulid,
    ) -> Result<(), EngineError> {
        if !self.specialties.contains_key(&specialty_id) {
            return Err(EngineError::NotFound(specialty_id));
        }
        let _w = self.write_gate.read().await;
        let ps = self.professional(professional_id)?;
        let mut guard = ps.write().await;
        if guard.offers(specialty_id) {
            return Err(EngineError::AlreadyExists(specialty_id));
        }
        let event = Event::SpecialtyAssigned {
            professional_id,
            specialty_id,
        };
        self.persist_and_apply(&event, Some(&mut guard), None).await
    }

    pub async fn unassign_specialty(
        &self,
        professional_id: Ulid,
        specialty_id: Ulid,
    ) -> Result<(), EngineError> {
        let _w = self.write_gate.read().await;
        let ps = self.professional(professional_id)?;
        let mut guard = ps.write().await;
        if !guard.offers(specialty_id) {
            return Err(EngineError::NotFound(specialty_id));
        }
        let event = Event::SpecialtyUnassigned {
            professional_id,
            specialty_id,
        };
        self.persist_and_apply(&event, Some(&mut guard), None).await
    }

    pub async fn create_account(&self, id: Ulid, name: String) -> Result<(), EngineError> {
        validate_name(&name)?;
        let _w = self.write_gate.read().await;
        if self.accounts.len() >= MAX_ACCOUNTS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many accounts"));
        }
        if self.accounts.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let event = Event::AccountCreated { id, name };
        self.persist_and_apply(&event, None, None).await
    }

    // ── Availability configuration ───────────────────────────

    /// Delete-all-then-insert of the professional's weekly pattern. An empty
    /// `rows` falls back to the weekday default.
    pub async fn replace_weekly_availability(
        &self,
        professional_id: Ulid,
        rows: Vec<(u8, TimeRange)>,
    ) -> Result<(), EngineError> {
        if rows.len() > MAX_WEEKLY_ROWS_PER_PROFESSIONAL {
            return Err(EngineError::LimitExceeded("too many weekly availability rows"));
        }
        for (day_of_week, range) in &rows {
            if *day_of_week > 6 {
                return Err(EngineError::InvalidInput("day_of_week must be 0..=6"));
            }
            if range.start >= range.end {
                return Err(EngineError::InvalidInput("start_time must be before end_time"));
            }
        }
        let _w = self.write_gate.read().await;
        let ps = self.professional(professional_id)?;
        let mut guard = ps.write().await;
        let event = Event::WeeklyAvailabilityReplaced {
            professional_id,
            rows,
        };
        self.persist_and_apply(&event, Some(&mut guard), None).await
    }

    pub async fn add_date_override(
        &self,
        id: Ulid,
        professional_id: Ulid,
        date: NaiveDate,
        range: TimeRange,
    ) -> Result<(), EngineError> {
        if range.start >= range.end {
            return Err(EngineError::InvalidInput("start_time must be before end_time"));
        }
        let _w = self.write_gate.read().await;
        let ps = self.professional(professional_id)?;
        let mut guard = ps.write().await;
        if self.entity_to_professional.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if guard.overrides.len() >= MAX_OVERRIDES_PER_PROFESSIONAL {
            return Err(EngineError::LimitExceeded("too many date overrides"));
        }
        check_override_overlap(guard.overrides_on(date), date, &range)?;
        let event = Event::DateOverrideAdded {
            id,
            professional_id,
            date,
            range,
        };
        self.persist_and_apply(&event, Some(&mut guard), None).await
    }

    /// Returns the professional the override belonged to.
    pub async fn remove_date_override(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let _w = self.write_gate.read().await;
        let professional_id = self
            .get_professional_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let ps = self.professional(professional_id)?;
        let mut guard = ps.write().await;
        if !guard.overrides.iter().any(|o| o.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::DateOverrideRemoved {
            id,
            professional_id,
        };
        self.persist_and_apply(&event, Some(&mut guard), None).await?;
        Ok(professional_id)
    }

    /// `professional_id: None` blocks the date for everyone.
    pub async fn add_blocked_day(
        &self,
        id: Ulid,
        professional_id: Option<Ulid>,
        date: NaiveDate,
        reason: Option<String>,
    ) -> Result<(), EngineError> {
        validate_reason(&reason)?;
        let _w = self.write_gate.read().await;
        let event = Event::BlockedDayAdded {
            id,
            professional_id,
            date,
            reason,
        };
        // Ids are unique across professional and tenant-wide blocked days.
        // Each branch checks the other kind while holding its own lock.
        match professional_id {
            Some(pid) => {
                let ps = self.professional(pid)?;
                let mut guard = ps.write().await;
                let global = self.global_blocked.read().await;
                if self.entity_to_professional.contains_key(&id)
                    || global.iter().any(|b| b.id == id)
                {
                    return Err(EngineError::AlreadyExists(id));
                }
                if guard.blocked.len() >= MAX_BLOCKED_DAYS {
                    return Err(EngineError::LimitExceeded("too many blocked days"));
                }
                self.persist_and_apply(&event, Some(&mut guard), None).await
            }
            None => {
                let mut global = self.global_blocked.write().await;
                if self.entity_to_professional.contains_key(&id)
                    || global.iter().any(|b| b.id == id)
                {
                    return Err(EngineError::AlreadyExists(id));
                }
                if global.len() >= MAX_BLOCKED_DAYS {
                    return Err(EngineError::LimitExceeded("too many blocked days"));
                }
                self.persist_global(&mut global, &event).await
            }
        }
    }

    pub async fn remove_blocked_day(&self, id: Ulid) -> Result<(), EngineError> {
        let _w = self.write_gate.read().await;
        if let Some(pid) = self.get_professional_for_entity(&id) {
            let ps = self.professional(pid)?;
            let mut guard = ps.write().await;
            if !guard.blocked.iter().any(|b| b.id == id) {
                return Err(EngineError::NotFound(id));
            }
            let event = Event::BlockedDayRemoved {
                id,
                professional_id: Some(pid),
            };
            return self.persist_and_apply(&event, Some(&mut guard), None).await;
        }
        let mut global = self.global_blocked.write().await;
        if !global.iter().any(|b| b.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::BlockedDayRemoved {
            id,
            professional_id: None,
        };
        self.persist_global(&mut global, &event).await
    }

    // ── Booking ──────────────────────────────────────────────

    /// Book one hourly slot.
    ///
    /// Checks run in a fixed order and the first failure is returned: account
    /// standing, specialty block, professional offers the specialty, date
    /// admissibility, slot exists and is not past, monthly limit, slot free.
    /// The account and professional write locks are held from the first check
    /// to the insert.
    #[allow(clippy::too_many_arguments)]
    pub async fn book_appointment(
        &self,
        id: Ulid,
        user_id: Ulid,
        professional_id: Ulid,
        specialty_id: Ulid,
        date: NaiveDate,
        time: NaiveTime,
        notes: Option<String>,
        now: NaiveDateTime,
    ) -> Result<(), EngineError> {
        if let Some(n) = &notes
            && n.len() > MAX_NOTES_LEN
        {
            return Err(EngineError::LimitExceeded("notes too long"));
        }
        let specialty_active = self
            .specialties
            .get(&specialty_id)
            .map(|s| s.active)
            .ok_or(EngineError::NotFound(specialty_id))?;
        if !specialty_active {
            return Err(EngineError::InvalidInput("specialty is not active"));
        }

        let _w = self.write_gate.read().await;
        let acc_arc = self.account(user_id)?;
        let ps_arc = self.professional(professional_id)?;
        if self.entity_to_professional.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let mut acc = acc_arc.write().await;
        check_account(&acc, now)?;
        check_specialty_block(&acc, specialty_id, now)?;

        // Every write to this user's appointments goes through the account
        // lock we hold, so the conflict found here stays valid until insert.
        // The limit is judged on the current month, whatever date is chosen.
        let history = self.collect_appointments(&acc.appointments).await;
        let monthly_conflict = check_monthly_limit(user_id, specialty_id, &history, now.date());

        let mut ps = ps_arc.write().await;
        if !ps.active {
            return Err(EngineError::InvalidInput("professional is not active"));
        }
        if !ps.offers(specialty_id) {
            return Err(EngineError::InvalidInput(
                "professional does not offer this specialty",
            ));
        }
        if ps.appointments.len() >= MAX_APPOINTMENTS_PER_PROFESSIONAL {
            return Err(EngineError::LimitExceeded("too many appointments on professional"));
        }

        {
            let global = self.global_blocked.read().await;
            let snap = Snapshot::of(&ps, &global);
            date_admissibility(&snap, date, now.date(), BOOKING_WINDOW_DAYS)?;
            let offered = time.minute() == 0 && generate_slots(&snap, date).contains(&time);
            let elapsed = date == now.date() && time <= now.time();
            if !offered || elapsed {
                return Err(Refusal::SlotTaken.into());
            }
        }

        if let Some(conflict) = monthly_conflict {
            return Err(Refusal::MonthlyLimit {
                conflicting_date: conflict.date,
            }
            .into());
        }
        if ps.slot_holder(date, time).is_some() {
            return Err(Refusal::SlotTaken.into());
        }

        let event = Event::AppointmentBooked {
            id,
            user_id,
            professional_id,
            specialty_id,
            date,
            time,
            notes,
        };
        self.persist_and_apply(&event, Some(&mut ps), Some(&mut acc))
            .await?;
        metrics::counter!(crate::observability::BOOKINGS_TOTAL).increment(1);
        Ok(())
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Cancel a scheduled appointment. A user cancelling on the appointment's
    /// own calendar day must accept the penalty: the specialty is then
    /// suspended for 60 days.
    pub async fn cancel_appointment(
        &self,
        id: Ulid,
        actor: Actor,
        accept_penalty: bool,
        now: NaiveDateTime,
    ) -> Result<CancellationOutcome, EngineError> {
        let _w = self.write_gate.read().await;
        let (ps_arc, user_id) = self.appointment_owner(id).await?;
        let acc_arc = self.account(user_id)?;
        let mut acc = acc_arc.write().await;
        let mut ps = ps_arc.write().await;

        let appt = ps.appointment(id).ok_or(EngineError::NotFound(id))?.clone();
        if appt.status != AppointmentStatus::Scheduled {
            return Err(EngineError::InvalidTransition {
                id,
                from: appt.status,
                to: AppointmentStatus::Cancelled,
            });
        }

        let penalized =
            actor == Actor::User && evaluate_cancellation_penalty(appt.date, now.date());
        if penalized && !accept_penalty {
            return Err(Refusal::PenaltyNotAccepted.into());
        }

        let event = Event::AppointmentStatusChanged {
            id,
            professional_id: appt.professional_id,
            user_id,
            status: AppointmentStatus::Cancelled,
        };
        self.persist_and_apply(&event, Some(&mut ps), None).await?;
        drop(ps);

        let penalty = if penalized {
            let block = same_day_penalty(user_id, appt.specialty_id, now);
            let event = Event::SpecialtyBlocked {
                user_id,
                specialty_id: block.specialty_id,
                blocked_until: block.blocked_until,
                reason: block.reason.clone(),
            };
            self.persist_and_apply(&event, None, Some(&mut acc)).await?;
            tracing::info!(%user_id, specialty_id = %block.specialty_id, "same-day cancellation penalty applied");
            Some(block)
        } else {
            None
        };

        Ok(CancellationOutcome {
            appointment_id: id,
            penalty,
        })
    }

    pub async fn complete_appointment(&self, id: Ulid) -> Result<(), EngineError> {
        self.close_appointment(id, AppointmentStatus::Completed).await
    }

    pub async fn mark_no_show(&self, id: Ulid) -> Result<(), EngineError> {
        self.close_appointment(id, AppointmentStatus::NoShow).await
    }

    async fn close_appointment(&self, id: Ulid, to: AppointmentStatus) -> Result<(), EngineError> {
        let _w = self.write_gate.read().await;
        let (ps_arc, user_id) = self.appointment_owner(id).await?;
        let mut ps = ps_arc.write().await;
        let from = ps.appointment(id).ok_or(EngineError::NotFound(id))?.status;
        if from != AppointmentStatus::Scheduled {
            return Err(EngineError::InvalidTransition { id, from, to });
        }
        let event = Event::AppointmentStatusChanged {
            id,
            professional_id: ps.id,
            user_id,
            status: to,
        };
        self.persist_and_apply(&event, Some(&mut ps), None).await
    }

    /// Administrative removal, whatever the status.
    pub async fn delete_appointment(&self, id: Ulid) -> Result<(), EngineError> {
        let _w = self.write_gate.read().await;
        let (ps_arc, user_id) = self.appointment_owner(id).await?;
        let acc_arc = self.get_account(&user_id);
        let mut acc = match &acc_arc {
            Some(a) => Some(a.write().await),
            None => None,
        };
        let mut ps = ps_arc.write().await;
        if ps.appointment(id).is_none() {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::AppointmentDeleted {
            id,
            professional_id: ps.id,
            user_id,
        };
        self.persist_and_apply(&event, Some(&mut ps), acc.as_deref_mut())
            .await
    }

    /// Professional lock and user of an appointment.
    async fn appointment_owner(
        &self,
        id: Ulid,
    ) -> Result<(super::SharedProfessional, Ulid), EngineError> {
        let professional_id = self
            .get_professional_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let ps = self.professional(professional_id)?;
        let user_id = ps
            .read()
            .await
            .appointment(id)
            .ok_or(EngineError::NotFound(id))?
            .user_id;
        Ok((ps, user_id))
    }

    // ── Sanctions ────────────────────────────────────────────

    /// Suspend the account until `until`, or for two months from `now`.
    /// Returns the effective end.
    pub async fn suspend_account(
        &self,
        user_id: Ulid,
        until: Option<NaiveDateTime>,
        now: NaiveDateTime,
    ) -> Result<NaiveDateTime, EngineError> {
        let until = until.unwrap_or_else(|| admin_suspension_end(now));
        if until <= now {
            return Err(EngineError::InvalidInput("suspension must end in the future"));
        }
        let _w = self.write_gate.read().await;
        let acc = self.account(user_id)?;
        let mut guard = acc.write().await;
        let event = Event::AccountSuspended {
            id: user_id,
            until: Some(until),
        };
        self.persist_and_apply(&event, None, Some(&mut guard)).await?;
        Ok(until)
    }

    /// Clear the account suspension and every specialty block.
    pub async fn lift_suspension(&self, user_id: Ulid) -> Result<(), EngineError> {
        let _w = self.write_gate.read().await;
        let acc = self.account(user_id)?;
        let mut guard = acc.write().await;
        let lifted = Event::AccountSuspended {
            id: user_id,
            until: None,
        };
        self.persist_and_apply(&lifted, None, Some(&mut guard)).await?;
        if !guard.specialty_blocks.is_empty() {
            let cleared = Event::SpecialtyBlockLifted {
                user_id,
                specialty_id: None,
            };
            self.persist_and_apply(&cleared, None, Some(&mut guard)).await?;
        }
        Ok(())
    }

    pub async fn block_account(&self, user_id: Ulid) -> Result<(), EngineError> {
        self.set_account_blocked(user_id, true).await
    }

    pub async fn unblock_account(&self, user_id: Ulid) -> Result<(), EngineError> {
        self.set_account_blocked(user_id, false).await
    }

    async fn set_account_blocked(&self, user_id: Ulid, blocked: bool) -> Result<(), EngineError> {
        let _w = self.write_gate.read().await;
        let acc = self.account(user_id)?;
        let mut guard = acc.write().await;
        let event = Event::AccountBlockChanged {
            id: user_id,
            blocked,
        };
        self.persist_and_apply(&event, None, Some(&mut guard)).await
    }

    /// Insert or replace the user's block on a specialty. Without `until`
    /// the block lasts two months from `now`.
    pub async fn block_specialty(
        &self,
        user_id: Ulid,
        specialty_id: Ulid,
        until: Option<NaiveDateTime>,
        reason: Option<String>,
        now: NaiveDateTime,
    ) -> Result<SpecialtyBlock, EngineError> {
        validate_reason(&reason)?;
        if !self.specialties.contains_key(&specialty_id) {
            return Err(EngineError::NotFound(specialty_id));
        }
        let block = SpecialtyBlock {
            user_id,
            specialty_id,
            blocked_until: Some(until.unwrap_or_else(|| admin_suspension_end(now))),
            reason: reason.or_else(|| Some(ADMIN_SUSPENSION_REASON.to_string())),
        };
        let _w = self.write_gate.read().await;
        let acc = self.account(user_id)?;
        let mut guard = acc.write().await;
        let event = Event::SpecialtyBlocked {
            user_id,
            specialty_id,
            blocked_until: block.blocked_until,
            reason: block.reason.clone(),
        };
        self.persist_and_apply(&event, None, Some(&mut guard)).await?;
        Ok(block)
    }

    /// `specialty_id: None` lifts every block of the user.
    pub async fn lift_specialty_block(
        &self,
        user_id: Ulid,
        specialty_id: Option<Ulid>,
    ) -> Result<(), EngineError> {
        let _w = self.write_gate.read().await;
        let acc = self.account(user_id)?;
        let mut guard = acc.write().await;
        let present = guard
            .specialty_blocks
            .iter()
            .any(|b| specialty_id.is_none_or(|sid| b.specialty_id == sid));
        if !present {
            return Err(EngineError::NotFound(specialty_id.unwrap_or(user_id)));
        }
        let event = Event::SpecialtyBlockLifted {
            user_id,
            specialty_id,
        };
        self.persist_and_apply(&event, None, Some(&mut guard)).await
    }

    // ── Maintenance ──────────────────────────────────────────

    /// Rewrite the WAL as the minimal event sequence reproducing current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.write_gate.write().await;
        let mut events = Vec::new();

        for entry in self.specialties.iter() {
            let s = entry.value();
            events.push(Event::SpecialtyCreated {
                id: s.id,
                name: s.name.clone(),
                duration_minutes: s.duration_minutes,
            });
            if !s.active {
                events.push(Event::SpecialtyUpdated {
                    id: s.id,
                    name: s.name.clone(),
                    duration_minutes: s.duration_minutes,
                    active: false,
                });
            }
        }

        let accounts: Vec<_> = self.accounts.iter().map(|e| e.value().clone()).collect();
        for acc in accounts {
            let acc = acc.read().await;
            events.push(Event::AccountCreated {
                id: acc.id,
                name: acc.name.clone(),
            });
            if acc.suspended_until.is_some() {
                events.push(Event::AccountSuspended {
                    id: acc.id,
                    until: acc.suspended_until,
                });
            }
            if acc.blocked {
                events.push(Event::AccountBlockChanged {
                    id: acc.id,
                    blocked: true,
                });
            }
            for b in &acc.specialty_blocks {
                events.push(Event::SpecialtyBlocked {
                    user_id: b.user_id,
                    specialty_id: b.specialty_id,
                    blocked_until: b.blocked_until,
                    reason: b.reason.clone(),
                });
            }
        }

        let professionals: Vec<_> = self
            .professionals
            .iter()
            .map(|e| e.value().clone())
            .collect();
        for ps in professionals {
            let ps = ps.read().await;
            events.push(Event::ProfessionalCreated {
                id: ps.id,
                name: ps.name.clone(),
            });
            if !ps.active {
                events.push(Event::ProfessionalUpdated {
                    id: ps.id,
                    name: ps.name.clone(),
                    active: false,
                });
            }
            for sid in &ps.specialties {
                events.push(Event::SpecialtyAssigned {
                    professional_id: ps.id,
                    specialty_id: *sid,
                });
            }
            if !ps.weekly.is_empty() {
                events.push(Event::WeeklyAvailabilityReplaced {
                    professional_id: ps.id,
                    rows: ps.weekly.iter().map(|w| (w.day_of_week, w.range)).collect(),
                });
            }
            for o in &ps.overrides {
                events.push(Event::DateOverrideAdded {
                    id: o.id,
                    professional_id: ps.id,
                    date: o.date,
                    range: o.range,
                });
            }
            for b in &ps.blocked {
                events.push(Event::BlockedDayAdded {
                    id: b.id,
                    professional_id: Some(ps.id),
                    date: b.date,
                    reason: b.reason.clone(),
                });
            }
            for a in &ps.appointments {
                events.push(Event::AppointmentBooked {
                    id: a.id,
                    user_id: a.user_id,
                    professional_id: ps.id,
                    specialty_id: a.specialty_id,
                    date: a.date,
                    time: a.time,
                    notes: a.notes.clone(),
                });
                if a.status != AppointmentStatus::Scheduled {
                    events.push(Event::AppointmentStatusChanged {
                        id: a.id,
                        professional_id: ps.id,
                        user_id: a.user_id,
                        status: a.status,
                    });
                }
            }
        }

        for b in self.global_blocked.read().await.iter() {
            events.push(Event::BlockedDayAdded {
                id: b.id,
                professional_id: None,
                date: b.date,
                reason: b.reason.clone(),
            });
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::debug!(events = count, "WAL compacted");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
