use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability;
use super::conflict::validate_span;
use super::cost;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_area(&self, id: &Ulid) -> Result<AreaInfo, EngineError> {
        let area = self.get_area_state(id).ok_or(EngineError::NotFound(*id))?;
        let guard = area.read().await;
        Ok(AreaInfo {
            id: guard.id,
            config: guard.config.clone(),
        })
    }

    /// All areas, ordered by name.
    pub async fn list_areas(&self) -> Vec<AreaInfo> {
        let areas: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut result = Vec::with_capacity(areas.len());
        for area in areas {
            let guard = area.read().await;
            result.push(AreaInfo {
                id: guard.id,
                config: guard.config.clone(),
            });
        }
        result.sort_by(|a, b| {
            a.config
                .name
                .to_lowercase()
                .cmp(&b.config.name.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        result
    }

    pub async fn is_available(&self, area_id: &Ulid, date: NaiveDate, span: Span) -> Result<bool, EngineError> {
        validate_span(&span)?;
        let area = self.get_area_state(area_id).ok_or(EngineError::NotFound(*area_id))?;
        let guard = area.read().await;
        Ok(availability::is_available(&guard, date, &span))
    }

    pub async fn available_slots(&self, area_id: &Ulid, date: NaiveDate) -> Result<Vec<Span>, EngineError> {
        let area = self.get_area_state(area_id).ok_or(EngineError::NotFound(*area_id))?;
        let guard = area.read().await;
        Ok(availability::available_slots(&guard, date))
    }

    /// Price of `span` at the area's current hourly rate.
    pub async fn compute_cost(&self, area_id: &Ulid, span: Span) -> Result<Cents, EngineError> {
        validate_span(&span)?;
        let area = self.get_area_state(area_id).ok_or(EngineError::NotFound(*area_id))?;
        let rate = area.read().await.config.hourly_rate;
        cost::compute_cost(rate, &span)
    }

    pub async fn free_windows(
        &self,
        area_id: &Ulid,
        date: NaiveDate,
        min_duration: Option<Minute>,
    ) -> Result<Vec<Span>, EngineError> {
        let area = self.get_area_state(area_id).ok_or(EngineError::NotFound(*area_id))?;
        let guard = area.read().await;
        Ok(availability::free_windows(&guard, date, min_duration))
    }

    pub async fn occupied_dates(
        &self,
        area_id: &Ulid,
        month: Option<(i32, u32)>,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        let area = self.get_area_state(area_id).ok_or(EngineError::NotFound(*area_id))?;
        let guard = area.read().await;
        Ok(guard.occupied_dates(month))
    }

    pub async fn get_reservation(&self, id: &Ulid) -> Result<Reservation, EngineError> {
        let area_id = self.area_for_reservation(id).ok_or(EngineError::NotFound(*id))?;
        let area = self.get_area_state(&area_id).ok_or(EngineError::NotFound(*id))?;
        let guard = area.read().await;
        guard
            .reservations()
            .find(|r| r.id == *id)
            .cloned()
            .ok_or(EngineError::NotFound(*id))
    }

    /// Reservations matching `filter`, ordered by date then start time.
    pub async fn list_reservations(&self, filter: &ReservationFilter) -> Result<Vec<Reservation>, EngineError> {
        let areas: Vec<_> = match filter.area_id {
            Some(id) => vec![self.get_area_state(&id).ok_or(EngineError::NotFound(id))?],
            None => self.state.iter().map(|e| e.value().clone()).collect(),
        };

        let mut result = Vec::new();
        for area in areas {
            let guard = area.read().await;
            match filter.date {
                Some(date) => result.extend(guard.on(date).iter().filter(|r| filter.matches(r)).cloned()),
                None => result.extend(guard.reservations().filter(|r| filter.matches(r)).cloned()),
            }
        }
        sort_reservations(&mut result);
        Ok(result)
    }

    /// Active reservations for `unit` dated `from` or later, soonest first.
    pub async fn upcoming_for_unit(&self, unit: u32, from: NaiveDate) -> Vec<Reservation> {
        let areas: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut result = Vec::new();
        for area in areas {
            let guard = area.read().await;
            result.extend(
                guard
                    .days
                    .range(from..)
                    .flat_map(|(_, day)| day.iter())
                    .filter(|r| r.unit == unit && r.is_active())
                    .cloned(),
            );
        }
        sort_reservations(&mut result);
        result
    }

    /// Active reservations that have already ended as of (`today`, `now`).
    pub async fn collect_finished(&self, today: NaiveDate, now: Minute) -> Vec<(Ulid, ReservationStatus)> {
        let areas: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut finished = Vec::new();
        for area in areas {
            let guard = area.read().await;
            for (date, day) in guard.days.range(..=today) {
                finished.extend(
                    day.iter()
                        .filter(|r| r.is_active() && (*date < today || r.span.end <= now))
                        .map(|r| (r.id, r.status)),
                );
            }
        }
        finished
    }
}

fn sort_reservations(reservations: &mut [Reservation]) {
    reservations.sort_by(|a, b| {
        (a.date, a.span.start, a.id).cmp(&(b.date, b.span.start, b.id))
    });
}
