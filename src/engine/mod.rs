mod availability;
mod conflict;
mod cost;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use availability::{available_slots, free_windows, is_available, merge_overlapping, subtract_intervals};
pub use cost::compute_cost;
pub use error::EngineError;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedAreaState = Arc<RwLock<AreaState>>;

/// Reservation id → (area id, date). Lets a reservation be found without a scan.
type ReservationIndex = DashMap<Ulid, (Ulid, NaiveDate)>;

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

/// Background task that owns the WAL and batches appends for group commit.
/// Blocks on the first append, drains whatever else is queued, then pays
/// for a single fsync and answers every sender in the batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
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

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so half-buffered bytes don't leak
    // into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
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
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedAreaState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) reservation_index: ReservationIndex,
    /// Lowercased area name → area id.
    pub(super) names: DashMap<String, Ulid>,
    /// Serializes area create/update/delete and WAL compaction. Taken
    /// before any area lock.
    pub(super) catalog: Mutex<()>,
}

/// Apply a reservation or config event to an area. The caller holds the lock.
/// Area creation and deletion happen at the map level instead.
fn apply_to_area(area: &mut AreaState, event: &Event, index: &ReservationIndex) {
    match event {
        Event::AreaUpdated { config, .. } => {
            area.config = config.clone();
        }
        Event::ReservationRequested { reservation } => {
            index.insert(reservation.id, (area.id, reservation.date));
            area.insert_reservation(reservation.clone());
        }
        Event::ReservationStatusChanged {
            id,
            date,
            status,
            notes,
            at,
            ..
        } => {
            if let Some(r) = area.reservation_mut(*date, *id) {
                r.status = *status;
                if notes.is_some() {
                    r.notes = notes.clone();
                }
                r.updated_at = Some(*at);
            }
        }
        Event::ReservationRescheduled {
            id,
            from,
            date,
            span,
            total_cost,
            at,
            ..
        } => {
            if let Some(mut r) = area.remove_reservation(*from, *id) {
                r.date = *date;
                r.span = *span;
                r.total_cost = *total_cost;
                r.updated_at = Some(*at);
                index.insert(*id, (area.id, *date));
                area.insert_reservation(r);
            }
        }
        Event::ReservationDeleted { id, date, .. } => {
            area.remove_reservation(*date, *id);
            index.remove(id);
        }
        Event::AreaCreated { .. } | Event::AreaDeleted { .. } => {}
    }
}

pub(super) fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let reservation_index = ReservationIndex::new();
        let names = DashMap::new();

        // Replay into plain owned state first; nothing else can see it yet.
        let mut areas: HashMap<Ulid, AreaState> = HashMap::new();
        for event in &events {
            match event {
                Event::AreaCreated { id, config } => {
                    names.insert(name_key(&config.name), *id);
                    areas.insert(*id, AreaState::new(*id, config.clone()));
                }
                Event::AreaDeleted { id } => {
                    if let Some(area) = areas.remove(id) {
                        names.remove(&name_key(&area.config.name));
                        for r in area.reservations() {
                            reservation_index.remove(&r.id);
                        }
                    }
                }
                other => {
                    let Some(area) = areas.get_mut(&other.area_id()) else {
                        tracing::warn!("replay: {} for unknown area {}", other.kind(), other.area_id());
                        continue;
                    };
                    if let Event::AreaUpdated { config, .. } = other {
                        names.remove(&name_key(&area.config.name));
                        names.insert(name_key(&config.name), area.id);
                    }
                    apply_to_area(area, other, &reservation_index);
                }
            }
        }

        let state = DashMap::new();
        for (id, area) in areas {
            state.insert(id, Arc::new(RwLock::new(area)));
        }
        tracing::info!(
            "replayed {} events: {} areas, {} reservations",
            events.len(),
            state.len(),
            reservation_index.len()
        );
        metrics::gauge!(crate::observability::AREAS_ACTIVE).set(state.len() as f64);

        Ok(Self {
            state,
            wal_tx,
            notify,
            reservation_index,
            names,
            catalog: Mutex::new(()),
        })
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

    pub fn get_area_state(&self, id: &Ulid) -> Option<SharedAreaState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn area_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_index.get(reservation_id).map(|e| e.value().0)
    }

    pub fn subscribe(&self, area_id: Ulid) -> broadcast::Receiver<Event> {
        self.notify.subscribe(area_id)
    }

    /// WAL-append, then apply and notify. Nothing changes if the append fails.
    pub(super) async fn persist_and_apply(&self, area: &mut AreaState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_area(area, event, &self.reservation_index);
        self.notify.send(area.id, event);
        Ok(())
    }

    /// Find the reservation's area and take its write lock. The date is
    /// re-read under the lock since a reschedule may have moved it.
    pub(super) async fn resolve_reservation_write(
        &self,
        id: &Ulid,
    ) -> Result<(tokio::sync::OwnedRwLockWriteGuard<AreaState>, NaiveDate), EngineError> {
        let area_id = self.area_for_reservation(id).ok_or(EngineError::NotFound(*id))?;
        let area = self.get_area_state(&area_id).ok_or(EngineError::NotFound(area_id))?;
        let guard = area.write_owned().await;
        let (_, date) = *self
            .reservation_index
            .get(id)
            .ok_or(EngineError::NotFound(*id))?
            .value();
        if guard.reservation(date, *id).is_none() {
            return Err(EngineError::NotFound(*id));
        }
        Ok((guard, date))
    }
}
