use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ulid::Ulid;

use crate::catalog::CatalogEntry;
use crate::limits::BOOKING_WINDOW_DAYS;
use crate::model::*;

use super::availability::{date_admissibility, resolve_available_dates, resolve_available_slots, Snapshot};
use super::policy::{active_block, check_account, check_monthly_limit};
use super::{Engine, EngineError, Refusal};

impl Engine {
    /// Admissible dates in the booking window for a professional offering `specialty_id`.
    pub async fn available_dates(
        &self,
        professional_id: Ulid,
        specialty_id: Ulid,
        today: NaiveDate,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        let ps = self.professional(professional_id)?;
        let guard = ps.read().await;
        if !guard.offers(specialty_id) {
            return Err(EngineError::InvalidInput(
                "professional does not offer this specialty",
            ));
        }
        let global = self.global_blocked.read().await;
        let snap = Snapshot::of(&guard, &global);
        Ok(resolve_available_dates(&snap, today, BOOKING_WINDOW_DAYS)
            .into_iter()
            .collect())
    }

    /// Free hourly slots on `date`. An inadmissible date is refused with its reason.
    pub async fn available_slots(
        &self,
        professional_id: Ulid,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Vec<NaiveTime>, EngineError> {
        let ps = self.professional(professional_id)?;
        let guard = ps.read().await;
        let global = self.global_blocked.read().await;
        let snap = Snapshot::of(&guard, &global);
        date_admissibility(&snap, date, now.date(), BOOKING_WINDOW_DAYS)?;
        Ok(resolve_available_slots(
            &snap,
            date,
            &guard.booked_times(date),
            now,
        ))
    }

    /// Why `date` cannot be offered for the professional, if it cannot.
    pub async fn check_date(
        &self,
        professional_id: Ulid,
        date: NaiveDate,
        today: NaiveDate,
    ) -> Result<Option<Refusal>, EngineError> {
        let ps = self.professional(professional_id)?;
        let guard = ps.read().await;
        let global = self.global_blocked.read().await;
        let snap = Snapshot::of(&guard, &global);
        Ok(date_admissibility(&snap, date, today, BOOKING_WINDOW_DAYS).err())
    }

    /// The user's appointment that already uses up `specialty_id` in the month of `today`.
    pub async fn monthly_conflict(
        &self,
        user_id: Ulid,
        specialty_id: Ulid,
        today: NaiveDate,
    ) -> Result<Option<ConflictingAppointment>, EngineError> {
        let acc = self.account(user_id)?;
        let ids = acc.read().await.appointments.clone();
        let history = self.collect_appointments(&ids).await;
        Ok(check_monthly_limit(user_id, specialty_id, &history, today))
    }

    /// Specialties the user may pick, each with its active professionals.
    /// Suspended and blocked accounts get nothing; blocked specialties are
    /// listed but marked.
    pub async fn selectable_specialties(
        &self,
        user_id: Ulid,
        now: NaiveDateTime,
    ) -> Result<Vec<SpecialtyOption>, EngineError> {
        let acc = self.account(user_id)?;
        let acc = acc.read().await;
        check_account(&acc, now)?;

        let catalog = match self.catalog.get(now) {
            Some(hit) => hit,
            None => self.catalog.put(now, self.load_catalog().await),
        };

        Ok(catalog
            .iter()
            .map(|entry| {
                let block = active_block(&acc, entry.specialty.id, now);
                SpecialtyOption {
                    specialty_id: entry.specialty.id,
                    name: entry.specialty.name.clone(),
                    professionals: entry.professionals.clone(),
                    suspended: block.is_some(),
                    suspended_until: block.and_then(|b| b.blocked_until),
                }
            })
            .collect())
    }

    async fn load_catalog(&self) -> Vec<CatalogEntry> {
        let mut offered: HashMap<Ulid, Vec<(Ulid, String)>> = HashMap::new();
        let professionals: Vec<_> = self
            .professionals
            .iter()
            .map(|e| e.value().clone())
            .collect();
        for ps in professionals {
            let ps = ps.read().await;
            if !ps.active {
                continue;
            }
            for sid in &ps.specialties {
                offered.entry(*sid).or_default().push((ps.id, ps.name.clone()));
            }
        }

        let mut entries: Vec<CatalogEntry> = self
            .specialties
            .iter()
            .filter(|s| s.active)
            .filter_map(|s| {
                let mut professionals = offered.remove(&s.id)?;
                professionals.sort_by(|a, b| a.1.cmp(&b.1));
                Some(CatalogEntry {
                    specialty: s.value().clone(),
                    professionals,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.specialty.name.cmp(&b.specialty.name));
        tracing::debug!(specialties = entries.len(), "specialty catalog loaded");
        entries
    }

    /// All of a user's appointments, oldest first.
    pub async fn appointments_for_user(&self, user_id: Ulid) -> Result<Vec<Appointment>, EngineError> {
        let acc = self.account(user_id)?;
        let ids = acc.read().await.appointments.clone();
        let mut appointments = self.collect_appointments(&ids).await;
        appointments.sort_by_key(|a| (a.date, a.time));
        Ok(appointments)
    }

    pub async fn appointments_for_professional(
        &self,
        professional_id: Ulid,
    ) -> Result<Vec<Appointment>, EngineError> {
        let ps = self.professional(professional_id)?;
        let guard = ps.read().await;
        Ok(guard.appointments.clone())
    }

    pub async fn get_appointment(&self, id: Ulid) -> Option<Appointment> {
        let ps = self.get_professional(&self.get_professional_for_entity(&id)?)?;
        let guard = ps.read().await;
        guard.appointment(id).cloned()
    }

    pub async fn list_professionals(&self) -> Vec<ProfessionalInfo> {
        let professionals: Vec<_> = self
            .professionals
            .iter()
            .map(|e| e.value().clone())
            .collect();
        let mut out = Vec::with_capacity(professionals.len());
        for ps in professionals {
            let ps = ps.read().await;
            out.push(ProfessionalInfo {
                id: ps.id,
                name: ps.name.clone(),
                active: ps.active,
                specialties: ps.specialties.clone(),
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    pub fn list_specialties(&self) -> Vec<Specialty> {
        let mut out: Vec<Specialty> = self.specialties.iter().map(|e| e.value().clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        out
    }

    /// Look up appointments by id across professionals, one read lock per professional.
    pub(super) async fn collect_appointments(&self, ids: &[Ulid]) -> Vec<Appointment> {
        let mut by_professional: HashMap<Ulid, Vec<Ulid>> = HashMap::new();
        for id in ids {
            if let Some(pid) = self.get_professional_for_entity(id) {
                by_professional.entry(pid).or_default().push(*id);
            }
        }
        let mut out = Vec::with_capacity(ids.len());
        for (pid, wanted) in by_professional {
            let Some(ps) = self.get_professional(&pid) else {
                continue;
            };
            let guard = ps.read().await;
            out.extend(wanted.iter().filter_map(|id| guard.appointment(*id).cloned()));
        }
        out
    }
}
