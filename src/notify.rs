use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for domain events of one tenant.
///
/// Every event goes to the tenant-wide feed and to the channel of each
/// professional and user it concerns. A mail relay listens on the feed; a UI
/// session listens on its own user.
pub struct NotifyHub {
    feed: broadcast::Sender<Event>,
    subjects: DashMap<Ulid, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            feed: broadcast::channel(CHANNEL_CAPACITY).0,
            subjects: DashMap::new(),
        }
    }

    /// Every event of the tenant.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.feed.subscribe()
    }

    /// Events concerning one professional or user. Creates the channel if needed.
    pub fn subscribe(&self, subject: Ulid) -> broadcast::Receiver<Event> {
        let sender = self
            .subjects
            .entry(subject)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Publish an event. No-op for channels nobody listens on.
    pub fn send(&self, event: &Event) {
        let _ = self.feed.send(event.clone());
        for subject in subjects(event).into_iter().flatten() {
            if let Some(sender) = self.subjects.get(&subject) {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Drop a subject's channel (e.g. when the professional is deleted).
    pub fn remove(&self, subject: &Ulid) {
        self.subjects.remove(subject);
    }
}

/// Log every event of a tenant as JSON, for a mail relay tailing the log.
pub async fn run_event_log(tenant: String, mut rx: broadcast::Receiver<Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::info!(target: "agenda::events", %tenant, "{json}"),
                Err(e) => tracing::warn!(%tenant, "event not serializable: {e}"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(%tenant, skipped, "event log lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn subjects(event: &Event) -> [Option<Ulid>; 2] {
    match event {
        Event::ProfessionalCreated { id, .. }
        | Event::ProfessionalUpdated { id, .. }
        | Event::ProfessionalDeleted { id } => [Some(*id), None],
        Event::SpecialtyAssigned { professional_id, .. }
        | Event::SpecialtyUnassigned { professional_id, .. }
        | Event::WeeklyAvailabilityReplaced { professional_id, .. }
        | Event::DateOverrideAdded { professional_id, .. }
        | Event::DateOverrideRemoved { professional_id, .. } => [Some(*professional_id), None],
        Event::BlockedDayAdded { professional_id, .. }
        | Event::BlockedDayRemoved { professional_id, .. } => [*professional_id, None],
        Event::AppointmentBooked {
            user_id,
            professional_id,
            ..
        }
        | Event::AppointmentStatusChanged {
            user_id,
            professional_id,
            ..
        }
        | Event::AppointmentDeleted {
            user_id,
            professional_id,
            ..
        } => [Some(*professional_id), Some(*user_id)],
        Event::SpecialtyBlocked { user_id, .. } | Event::SpecialtyBlockLifted { user_id, .. } => {
            [Some(*user_id), None]
        }
        Event::AccountCreated { id, .. }
        | Event::AccountSuspended { id, .. }
        | Event::AccountBlockChanged { id, .. } => [Some(*id), None],
        Event::SpecialtyCreated { .. } | Event::SpecialtyUpdated { .. } => [None, None],
    }
}
