use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{
    check_bookable, check_headcount, check_no_conflict, now_ms, validate_config, validate_request, validate_span,
};
use super::cost::compute_cost;
use super::{name_key, Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_area(&self, id: Ulid, config: AreaConfig) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        if self.state.len() >= MAX_AREAS {
            return Err(EngineError::LimitExceeded("too many areas"));
        }
        validate_config(&config)?;
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let key = name_key(&config.name);
        if self.names.contains_key(&key) {
            return Err(EngineError::NameTaken(config.name));
        }

        let event = Event::AreaCreated {
            id,
            config: config.clone(),
        };
        self.wal_append(&event).await?;
        self.names.insert(key, id);
        self.state.insert(id, Arc::new(RwLock::new(AreaState::new(id, config))));
        self.notify.send(id, &event);
        metrics::gauge!(crate::observability::AREAS_ACTIVE).set(self.state.len() as f64);
        tracing::debug!("area {id} created");
        Ok(())
    }

    /// Apply `patch` and revalidate the resulting config. Existing
    /// reservations are left alone even if they now fall outside the hours.
    pub async fn update_area(&self, id: Ulid, patch: AreaPatch) -> Result<AreaConfig, EngineError> {
        let _catalog = self.catalog.lock().await;
        let area = self.get_area_state(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = area.write().await;

        let mut config = guard.config.clone();
        patch.apply(&mut config);
        validate_config(&config)?;

        let old_key = name_key(&guard.config.name);
        let new_key = name_key(&config.name);
        if new_key != old_key && self.names.get(&new_key).is_some_and(|owner| *owner != id) {
            return Err(EngineError::NameTaken(config.name));
        }

        let event = Event::AreaUpdated {
            id,
            config: config.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        if new_key != old_key {
            self.names.remove(&old_key);
            self.names.insert(new_key, id);
        }
        Ok(config)
    }

    pub async fn delete_area(&self, id: Ulid) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        let area = self.get_area_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = area.write().await;
        if guard.has_active() {
            return Err(EngineError::HasActiveReservations(id));
        }

        let event = Event::AreaDeleted { id };
        self.wal_append(&event).await?;
        for r in guard.reservations() {
            self.reservation_index.remove(&r.id);
        }
        self.names.remove(&name_key(&guard.config.name));
        self.state.remove(&id);
        drop(guard);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        metrics::gauge!(crate::observability::AREAS_ACTIVE).set(self.state.len() as f64);
        tracing::debug!("area {id} deleted");
        Ok(())
    }

    /// Validate and store a new reservation as `pending`. The check and the
    /// insert happen under the area's write lock.
    pub async fn request_reservation(&self, req: ReservationRequest) -> Result<Reservation, EngineError> {
        validate_request(&req)?;
        if self.reservation_index.contains_key(&req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }
        let area = self
            .get_area_state(&req.area_id)
            .ok_or(EngineError::NotFound(req.area_id))?;
        let mut guard = area.write().await;
        if guard.reservation_count() >= MAX_RESERVATIONS_PER_AREA {
            return Err(EngineError::LimitExceeded("too many reservations on area"));
        }

        check_bookable(&guard, &req.span)?;
        check_headcount(&guard.config, req.headcount)?;
        if let Err(e) = check_no_conflict(&guard, req.date, &req.span, None) {
            metrics::counter!(crate::observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }
        let total_cost = compute_cost(guard.config.hourly_rate, &req.span)?;

        let reservation = Reservation {
            id: req.id,
            area_id: req.area_id,
            unit: req.unit,
            contact: req.contact,
            date: req.date,
            span: req.span,
            headcount: req.headcount,
            purpose: req.purpose,
            total_cost,
            status: ReservationStatus::Pending,
            notes: None,
            created_at: now_ms(),
            updated_at: None,
        };
        let event = Event::ReservationRequested {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::debug!("reservation {} requested on {} {}", reservation.id, reservation.date, reservation.span);
        Ok(reservation)
    }

    pub async fn confirm_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Confirmed, None).await
    }

    /// Cancel a pending or confirmed reservation, recording `reason` in its notes.
    pub async fn cancel_reservation(&self, id: Ulid, reason: Option<String>) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Cancelled, reason).await
    }

    pub async fn complete_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.transition(id, ReservationStatus::Completed, None).await
    }

    /// Move a reservation to `to` if its lifecycle allows it.
    pub async fn transition(
        &self,
        id: Ulid,
        to: ReservationStatus,
        notes: Option<String>,
    ) -> Result<Reservation, EngineError> {
        if notes.as_ref().is_some_and(|n| n.len() > MAX_NOTES_LEN) {
            return Err(EngineError::LimitExceeded("notes too long"));
        }
        let (mut guard, date) = self.resolve_reservation_write(&id).await?;
        self.transition_locked(&mut guard, date, id, to, notes).await
    }

    /// Settle a reservation the reaper found finished: confirmed ones are
    /// completed, pending ones cancelled with `expired_note`. The finished
    /// check is repeated under the area lock, so a reservation moved into
    /// the future in the meantime is left alone and `None` is returned.
    pub async fn settle_finished(
        &self,
        id: Ulid,
        today: NaiveDate,
        now: Minute,
        expired_note: &str,
    ) -> Result<Option<Reservation>, EngineError> {
        let (mut guard, date) = self.resolve_reservation_write(&id).await?;
        let r = guard.reservation(date, id).ok_or(EngineError::NotFound(id))?;
        let finished = date < today || (date == today && r.span.end <= now);
        if !r.is_active() || !finished {
            return Ok(None);
        }
        let (to, notes) = match r.status {
            ReservationStatus::Confirmed => (ReservationStatus::Completed, None),
            _ => (ReservationStatus::Cancelled, Some(expired_note.to_string())),
        };
        self.transition_locked(&mut guard, date, id, to, notes).await.map(Some)
    }

    async fn transition_locked(
        &self,
        guard: &mut AreaState,
        date: NaiveDate,
        id: Ulid,
        to: ReservationStatus,
        notes: Option<String>,
    ) -> Result<Reservation, EngineError> {
        let from = guard
            .reservation(date, id)
            .map(|r| r.status)
            .ok_or(EngineError::NotFound(id))?;
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition { id, from, to });
        }

        let event = Event::ReservationStatusChanged {
            id,
            area_id: guard.id,
            date,
            status: to,
            notes,
            at: now_ms(),
        };
        self.persist_and_apply(guard, &event).await?;
        tracing::debug!("reservation {id}: {from} -> {to}");
        guard.reservation(date, id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Move an active reservation to a new date and/or time. Fields left as
    /// `None` keep their current value. Everything is rechecked against the
    /// area, ignoring the reservation's own current slot.
    pub async fn reschedule_reservation(
        &self,
        id: Ulid,
        date: Option<NaiveDate>,
        start: Option<Minute>,
        end: Option<Minute>,
    ) -> Result<Reservation, EngineError> {
        let (mut guard, from) = self.resolve_reservation_write(&id).await?;
        let current = guard.reservation(from, id).ok_or(EngineError::NotFound(id))?;
        if !current.is_active() {
            return Err(EngineError::NotActive {
                id,
                status: current.status,
            });
        }
        let new_date = date.unwrap_or(from);
        let span = Span::new(start.unwrap_or(current.span.start), end.unwrap_or(current.span.end));

        validate_span(&span)?;
        check_bookable(&guard, &span)?;
        check_headcount(&guard.config, current.headcount)?;
        if let Err(e) = check_no_conflict(&guard, new_date, &span, Some(id)) {
            metrics::counter!(crate::observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }
        let total_cost = compute_cost(guard.config.hourly_rate, &span)?;

        let event = Event::ReservationRescheduled {
            id,
            area_id: guard.id,
            from,
            date: new_date,
            span,
            total_cost,
            at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        guard.reservation(new_date, id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn delete_reservation(&self, id: Ulid) -> Result<(), EngineError> {
        let (mut guard, date) = self.resolve_reservation_write(&id).await?;
        let event = Event::ReservationDeleted {
            id,
            area_id: guard.id,
            date,
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Rewrite the WAL as one creation event per area plus the current
    /// record of each reservation. The catalog lock keeps areas from being
    /// created or deleted meanwhile, and every area is read-locked while the
    /// snapshot is taken so the file matches a single point in time.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _catalog = self.catalog.lock().await;
        let areas: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut guards = Vec::with_capacity(areas.len());
        for area in &areas {
            let guard = area.read().await;
            if self.state.contains_key(&guard.id) {
                guards.push(guard);
            }
        }

        let mut events = Vec::new();
        for guard in &guards {
            events.push(Event::AreaCreated {
                id: guard.id,
                config: guard.config.clone(),
            });
            for r in guard.reservations() {
                events.push(Event::ReservationRequested { reservation: r.clone() });
            }
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
        drop(guards);
        tracing::info!("WAL compacted to {count} events");
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
