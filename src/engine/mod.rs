mod availability;
mod error;
mod mutations;
pub mod policy;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{
    date_admissibility, generate_slots, resolve_available_dates, resolve_available_slots, Snapshot,
};
pub use error::{EngineError, Refusal};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::catalog::{CatalogEntry, ReferenceCache};
use crate::limits::CATALOG_TTL_SECS;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedProfessional = Arc<RwLock<ProfessionalState>>;
pub type SharedAccount = Arc<RwLock<AccountState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task owning the WAL. Appends that queue up while one fsync is
/// in flight are written and synced together, then every sender gets the result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::error!(path = %wal.path().display(), "WAL flush failed: {e}");
        }
        respond_batch(batch, &result);

        // Compaction must see every earlier append on disk first.
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let append_result = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so a half-buffered batch doesn't leak into the next one.
    let flush_result = wal.flush_sync();
    append_result.and(flush_result)
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

// ── Engine ───────────────────────────────────────────────

/// One tenant's scheduling state.
///
/// Lock order: `write_gate` (shared), then an account, then a professional,
/// then `global_blocked`. Compaction takes `write_gate` exclusively, so it
/// observes no half-applied mutation.
pub struct Engine {
    pub professionals: DashMap<Ulid, SharedProfessional>,
    pub specialties: DashMap<Ulid, Specialty>,
    pub accounts: DashMap<Ulid, SharedAccount>,
    /// Blocked days that apply to every professional.
    pub(super) global_blocked: RwLock<Vec<BlockedDay>>,
    /// Appointment, override and blocked-day id → owning professional.
    pub(super) entity_to_professional: DashMap<Ulid, Ulid>,
    pub(super) write_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) catalog: ReferenceCache<Vec<CatalogEntry>>,
}

fn apply_to_professional(ps: &mut ProfessionalState, event: &Event, index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ProfessionalUpdated { name, active, .. } => {
            ps.name = name.clone();
            ps.active = *active;
        }
        Event::ProfessionalDeleted { .. } => {
            let owned = ps
                .overrides
                .iter()
                .map(|o| o.id)
                .chain(ps.blocked.iter().map(|b| b.id))
                .chain(ps.appointments.iter().map(|a| a.id));
            for id in owned {
                index.remove(&id);
            }
        }
        Event::SpecialtyAssigned { specialty_id, .. } => {
            if !ps.offers(*specialty_id) {
                ps.specialties.push(*specialty_id);
            }
        }
        Event::SpecialtyUnassigned { specialty_id, .. } => {
            ps.specialties.retain(|s| s != specialty_id);
        }
        Event::WeeklyAvailabilityReplaced {
            professional_id,
            rows,
        } => {
            ps.weekly = rows
                .iter()
                .map(|(day_of_week, range)| WeeklyAvailability {
                    professional_id: *professional_id,
                    day_of_week: *day_of_week,
                    range: *range,
                })
                .collect();
        }
        Event::DateOverrideAdded {
            id,
            professional_id,
            date,
            range,
        } => {
            ps.insert_override(DateOverride {
                id: *id,
                professional_id: *professional_id,
                date: *date,
                range: *range,
            });
            index.insert(*id, *professional_id);
        }
        Event::DateOverrideRemoved { id, .. } => {
            ps.remove_override(*id);
            index.remove(id);
        }
        Event::BlockedDayAdded {
            id,
            professional_id: Some(pid),
            date,
            reason,
        } => {
            ps.blocked.push(BlockedDay {
                id: *id,
                professional_id: Some(*pid),
                date: *date,
                reason: reason.clone(),
            });
            index.insert(*id, *pid);
        }
        Event::BlockedDayRemoved { id, .. } => {
            ps.blocked.retain(|b| b.id != *id);
            index.remove(id);
        }
        Event::AppointmentBooked {
            id,
            user_id,
            professional_id,
            specialty_id,
            date,
            time,
            notes,
        } => {
            ps.insert_appointment(Appointment {
                id: *id,
                user_id: *user_id,
                professional_id: *professional_id,
                specialty_id: *specialty_id,
                date: *date,
                time: *time,
                status: AppointmentStatus::Scheduled,
                notes: notes.clone(),
            });
            index.insert(*id, *professional_id);
        }
        Event::AppointmentStatusChanged { id, status, .. } => {
            if let Some(a) = ps.appointment_mut(*id) {
                a.status = *status;
            }
        }
        Event::AppointmentDeleted { id, .. } => {
            ps.remove_appointment(*id);
            index.remove(id);
        }
        _ => {}
    }
}

fn apply_to_account(acc: &mut AccountState, event: &Event) {
    match event {
        Event::AppointmentBooked { id, .. } => acc.appointments.push(*id),
        Event::AppointmentDeleted { id, .. } => acc.appointments.retain(|a| a != id),
        Event::SpecialtyBlocked {
            user_id,
            specialty_id,
            blocked_until,
            reason,
        } => acc.upsert_block(SpecialtyBlock {
            user_id: *user_id,
            specialty_id: *specialty_id,
            blocked_until: *blocked_until,
            reason: reason.clone(),
        }),
        Event::SpecialtyBlockLifted { specialty_id, .. } => acc.remove_blocks(*specialty_id),
        Event::AccountSuspended { until, .. } => acc.suspended_until = *until,
        Event::AccountBlockChanged { blocked, .. } => acc.blocked = *blocked,
        _ => {}
    }
}

fn apply_to_global(blocked: &mut Vec<BlockedDay>, event: &Event) {
    match event {
        Event::BlockedDayAdded {
            id,
            professional_id: None,
            date,
            reason,
        } => blocked.push(BlockedDay {
            id: *id,
            professional_id: None,
            date: *date,
            reason: reason.clone(),
        }),
        Event::BlockedDayRemoved {
            id,
            professional_id: None,
        } => blocked.retain(|b| b.id != *id),
        _ => {}
    }
}

/// The professional whose lock an event is applied under.
fn event_professional_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ProfessionalUpdated { id, .. } | Event::ProfessionalDeleted { id } => Some(*id),
        Event::SpecialtyAssigned { professional_id, .. }
        | Event::SpecialtyUnassigned { professional_id, .. }
        | Event::WeeklyAvailabilityReplaced { professional_id, .. }
        | Event::DateOverrideAdded { professional_id, .. }
        | Event::DateOverrideRemoved { professional_id, .. }
        | Event::AppointmentBooked { professional_id, .. }
        | Event::AppointmentStatusChanged { professional_id, .. }
        | Event::AppointmentDeleted { professional_id, .. } => Some(*professional_id),
        Event::BlockedDayAdded { professional_id, .. }
        | Event::BlockedDayRemoved { professional_id, .. } => *professional_id,
        _ => None,
    }
}

/// The account whose lock an event is applied under.
fn event_account_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::AppointmentBooked { user_id, .. }
        | Event::AppointmentDeleted { user_id, .. }
        | Event::SpecialtyBlocked { user_id, .. }
        | Event::SpecialtyBlockLifted { user_id, .. } => Some(*user_id),
        Event::AccountSuspended { id, .. } | Event::AccountBlockChanged { id, .. } => Some(*id),
        _ => None,
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.discarded_tail {
            tracing::warn!(
                path = %wal_path.display(),
                kept = replay.events.len(),
                "discarded torn record at end of WAL"
            );
        }
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            professionals: DashMap::new(),
            specialties: DashMap::new(),
            accounts: DashMap::new(),
            global_blocked: RwLock::new(Vec::new()),
            entity_to_professional: DashMap::new(),
            write_gate: RwLock::new(()),
            wal_tx,
            notify,
            catalog: ReferenceCache::new(chrono::Duration::seconds(CATALOG_TTL_SECS)),
        };

        // Sole owner of every lock here, so try_write always succeeds. Never
        // block: this may run inside an async context (lazy tenant creation).
        for event in &replay.events {
            let ps = event_professional_id(event).and_then(|id| engine.get_professional(&id));
            let acc = event_account_id(event).and_then(|id| engine.get_account(&id));
            engine.apply_to_indexes(event);
            if let Some(ps) = ps {
                let mut guard = ps.try_write().expect("replay: uncontended write");
                apply_to_professional(&mut guard, event, &engine.entity_to_professional);
            }
            if let Some(acc) = acc {
                let mut guard = acc.try_write().expect("replay: uncontended write");
                apply_to_account(&mut guard, event);
            }
            let mut global = engine
                .global_blocked
                .try_write()
                .expect("replay: uncontended write");
            apply_to_global(&mut global, event);
        }

        Ok(engine)
    }

    /// Changes kept directly in the DashMaps rather than under an entity lock.
    fn apply_to_indexes(&self, event: &Event) {
        match event {
            Event::ProfessionalCreated { id, name } => {
                let ps = ProfessionalState::new(*id, name.clone());
                self.professionals.insert(*id, Arc::new(RwLock::new(ps)));
            }
            Event::ProfessionalDeleted { id } => {
                self.professionals.remove(id);
            }
            Event::SpecialtyCreated {
                id,
                name,
                duration_minutes,
            } => {
                self.specialties.insert(
                    *id,
                    Specialty {
                        id: *id,
                        name: name.clone(),
                        duration_minutes: *duration_minutes,
                        active: true,
                    },
                );
            }
            Event::SpecialtyUpdated {
                id,
                name,
                duration_minutes,
                active,
            } => {
                if let Some(mut s) = self.specialties.get_mut(id) {
                    s.name = name.clone();
                    s.duration_minutes = *duration_minutes;
                    s.active = *active;
                }
            }
            Event::AccountCreated { id, name } => {
                let acc = AccountState::new(*id, name.clone());
                self.accounts.insert(*id, Arc::new(RwLock::new(acc)));
            }
            // Applied under the professional's lock, but still change the catalog.
            Event::ProfessionalUpdated { .. }
            | Event::SpecialtyAssigned { .. }
            | Event::SpecialtyUnassigned { .. } => {}
            _ => return,
        }
        self.catalog.refresh();
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_professional(&self, id: &Ulid) -> Option<SharedProfessional> {
        self.professionals.get(id).map(|e| e.value().clone())
    }

    pub fn get_account(&self, id: &Ulid) -> Option<SharedAccount> {
        self.accounts.get(id).map(|e| e.value().clone())
    }

    pub fn get_professional_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_professional.get(entity_id).map(|e| *e.value())
    }

    pub(super) fn professional(&self, id: Ulid) -> Result<SharedProfessional, EngineError> {
        self.get_professional(&id).ok_or(EngineError::NotFound(id))
    }

    pub(super) fn account(&self, id: Ulid) -> Result<SharedAccount, EngineError> {
        self.get_account(&id).ok_or(EngineError::NotFound(id))
    }

    /// WAL-append, apply to the held guards and the indexes, then publish.
    /// The caller holds `write_gate` and the relevant write locks.
    pub(super) async fn persist_and_apply(
        &self,
        event: &Event,
        ps: Option<&mut ProfessionalState>,
        acc: Option<&mut AccountState>,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_to_indexes(event);
        if let Some(ps) = ps {
            apply_to_professional(ps, event, &self.entity_to_professional);
        }
        if let Some(acc) = acc {
            apply_to_account(acc, event);
        }
        self.notify.send(event);
        Ok(())
    }

    /// Same as `persist_and_apply` for events on the tenant-wide blocked days.
    pub(super) async fn persist_global(
        &self,
        blocked: &mut Vec<BlockedDay>,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_global(blocked, event);
        self.notify.send(event);
        Ok(())
    }
}
