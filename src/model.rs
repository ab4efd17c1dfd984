use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::MINUTES_PER_DAY;

/// Unix milliseconds, used for record timestamps.
pub type Ms = i64;

/// Minutes since local midnight. The only time-of-day type.
pub type Minute = u32;

/// Money in cents.
pub type Cents = i64;

/// Half-open interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

/// Which way a candidate span collides with an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    /// The candidate starts while the existing span is running.
    StartsInside,
    /// The candidate ends while the existing span is running.
    EndsInside,
    /// The candidate fully covers the existing span.
    Contains,
}

impl fmt::Display for Overlap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overlap::StartsInside => write!(f, "starts inside"),
            Overlap::EndsInside => write!(f, "ends inside"),
            Overlap::Contains => write!(f, "contains"),
        }
    }
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn duration_minutes(&self) -> Minute {
        self.end.saturating_sub(self.start)
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Classify how `self` (a candidate) collides with `existing`.
    ///
    /// Checked in order: starts inside, ends inside, contains. For non-empty
    /// spans this is `Some` exactly when [`Span::overlaps`] is true.
    pub fn overlap_with(&self, existing: &Span) -> Option<Overlap> {
        if existing.start <= self.start && self.start < existing.end {
            Some(Overlap::StartsInside)
        } else if existing.start < self.end && self.end <= existing.end {
            Some(Overlap::EndsInside)
        } else if self.start <= existing.start && existing.end <= self.end {
            Some(Overlap::Contains)
        } else {
            None
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_minute(self.start), format_minute(self.end))
    }
}

/// Render a time of day as `HH:MM`. 1440 renders as `24:00`.
pub fn format_minute(m: Minute) -> String {
    format!("{:02}:{:02}", m / 60, m % 60)
}

/// Parse `HH:MM` (or `HH:MM:SS` with zero seconds). `24:00` is accepted as end of day.
pub fn parse_minute(s: &str) -> Option<Minute> {
    let s = s.trim();
    if s == "24:00" || s == "24:00:00" {
        return Some(MINUTES_PER_DAY);
    }
    let t = NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()?;
    if t.second() != 0 {
        return None;
    }
    Some(t.hour() * 60 + t.minute())
}

pub fn minute_of(t: NaiveTime) -> Minute {
    t.hour() * 60 + t.minute()
}

/// Render cents as a two-place decimal.
pub fn format_cents(c: Cents) -> String {
    let sign = if c < 0 { "-" } else { "" };
    let abs = c.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

/// Parse a non-negative decimal amount with at most two fractional digits.
pub fn parse_cents(s: &str) -> Option<Cents> {
    let s = s.trim();
    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if frac.len() > 2 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let frac_cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(frac_cents)
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

// ── Reservation lifecycle ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(ReservationStatus::Pending),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "cancelled" | "canceled" => Some(ReservationStatus::Cancelled),
            "completed" => Some(ReservationStatus::Completed),
            _ => None,
        }
    }

    /// Pending and confirmed reservations hold their slot.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Catalog ──────────────────────────────────────────────────────

/// Everything configurable about a bookable area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaConfig {
    pub name: String,
    pub description: Option<String>,
    /// Maximum headcount per reservation; 0 means no limit.
    pub capacity: u32,
    pub hourly_rate: Cents,
    pub opens: Minute,
    pub closes: Minute,
    pub enabled: bool,
    pub min_minutes: Minute,
    pub max_minutes: Minute,
}

impl AreaConfig {
    /// Defaults: open 08:00–22:00, free, bookable for 1 to 8 hours.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            capacity: 0,
            hourly_rate: 0,
            opens: 8 * 60,
            closes: 22 * 60,
            enabled: true,
            min_minutes: 60,
            max_minutes: 8 * 60,
        }
    }

    pub fn hours(&self) -> Span {
        Span::new(self.opens, self.closes)
    }
}

/// Partial update of an [`AreaConfig`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AreaPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub capacity: Option<u32>,
    pub hourly_rate: Option<Cents>,
    pub opens: Option<Minute>,
    pub closes: Option<Minute>,
    pub enabled: Option<bool>,
    pub min_minutes: Option<Minute>,
    pub max_minutes: Option<Minute>,
}

impl AreaPatch {
    pub fn is_empty(&self) -> bool {
        *self == AreaPatch::default()
    }

    pub fn apply(&self, config: &mut AreaConfig) {
        if let Some(name) = &self.name {
            config.name = name.clone();
        }
        if let Some(description) = &self.description {
            config.description = description.clone();
        }
        if let Some(v) = self.capacity {
            config.capacity = v;
        }
        if let Some(v) = self.hourly_rate {
            config.hourly_rate = v;
        }
        if let Some(v) = self.opens {
            config.opens = v;
        }
        if let Some(v) = self.closes {
            config.closes = v;
        }
        if let Some(v) = self.enabled {
            config.enabled = v;
        }
        if let Some(v) = self.min_minutes {
            config.min_minutes = v;
        }
        if let Some(v) = self.max_minutes {
            config.max_minutes = v;
        }
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

/// Input for a new reservation. Cost and status are derived by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub id: Ulid,
    pub area_id: Ulid,
    pub unit: u32,
    pub contact: Contact,
    pub date: NaiveDate,
    pub span: Span,
    pub headcount: u32,
    pub purpose: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub area_id: Ulid,
    /// Requesting apartment number.
    pub unit: u32,
    pub contact: Contact,
    pub date: NaiveDate,
    pub span: Span,
    pub headcount: u32,
    pub purpose: Option<String>,
    pub total_cost: Cents,
    pub status: ReservationStatus,
    pub notes: Option<String>,
    pub created_at: Ms,
    pub updated_at: Option<Ms>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// One area plus its reservations, bucketed by date and sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct AreaState {
    pub id: Ulid,
    pub config: AreaConfig,
    pub days: BTreeMap<NaiveDate, Vec<Reservation>>,
}

impl AreaState {
    pub fn new(id: Ulid, config: AreaConfig) -> Self {
        Self {
            id,
            config,
            days: BTreeMap::new(),
        }
    }

    /// Insert maintaining sort order by span.start within the day.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let day = self.days.entry(reservation.date).or_default();
        let pos = day
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        day.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, date: NaiveDate, id: Ulid) -> Option<Reservation> {
        let day = self.days.get_mut(&date)?;
        let pos = day.iter().position(|r| r.id == id)?;
        let removed = day.remove(pos);
        if day.is_empty() {
            self.days.remove(&date);
        }
        Some(removed)
    }

    pub fn reservation(&self, date: NaiveDate, id: Ulid) -> Option<&Reservation> {
        self.days.get(&date)?.iter().find(|r| r.id == id)
    }

    pub fn reservation_mut(&mut self, date: NaiveDate, id: Ulid) -> Option<&mut Reservation> {
        self.days.get_mut(&date)?.iter_mut().find(|r| r.id == id)
    }

    pub fn on(&self, date: NaiveDate) -> &[Reservation] {
        self.days.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Reservations of any status on `date` whose span overlaps `query`.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, date: NaiveDate, query: &Span) -> impl Iterator<Item = &Reservation> {
        let day = self.on(date);
        let right_bound = day.partition_point(|r| r.span.start < query.end);
        day[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }

    /// Active spans on `date`, sorted by start.
    pub fn active_spans(&self, date: NaiveDate) -> Vec<Span> {
        self.on(date)
            .iter()
            .filter(|r| r.is_active())
            .map(|r| r.span)
            .collect()
    }

    pub fn reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.days.values().flatten()
    }

    pub fn reservation_count(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    pub fn has_active(&self) -> bool {
        self.reservations().any(Reservation::is_active)
    }

    /// Dates with at least one active reservation, optionally limited to a (year, month).
    pub fn occupied_dates(&self, month: Option<(i32, u32)>) -> Vec<NaiveDate> {
        self.days
            .iter()
            .filter(|(date, _)| month.is_none_or(|(y, m)| date.year() == y && date.month() == m))
            .filter(|(_, day)| day.iter().any(Reservation::is_active))
            .map(|(date, _)| *date)
            .collect()
    }
}

/// WAL record format. One variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AreaCreated {
        id: Ulid,
        config: AreaConfig,
    },
    AreaUpdated {
        id: Ulid,
        config: AreaConfig,
    },
    AreaDeleted {
        id: Ulid,
    },
    ReservationRequested {
        reservation: Reservation,
    },
    ReservationStatusChanged {
        id: Ulid,
        area_id: Ulid,
        date: NaiveDate,
        status: ReservationStatus,
        notes: Option<String>,
        at: Ms,
    },
    ReservationRescheduled {
        id: Ulid,
        area_id: Ulid,
        from: NaiveDate,
        date: NaiveDate,
        span: Span,
        total_cost: Cents,
        at: Ms,
    },
    ReservationDeleted {
        id: Ulid,
        area_id: Ulid,
        date: NaiveDate,
    },
}

impl Event {
    /// Short name used for notification payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::AreaCreated { .. } => "area_created",
            Event::AreaUpdated { .. } => "area_updated",
            Event::AreaDeleted { .. } => "area_deleted",
            Event::ReservationRequested { .. } => "reservation_requested",
            Event::ReservationStatusChanged { .. } => "reservation_status_changed",
            Event::ReservationRescheduled { .. } => "reservation_rescheduled",
            Event::ReservationDeleted { .. } => "reservation_deleted",
        }
    }

    /// The area this event belongs to.
    pub fn area_id(&self) -> Ulid {
        match self {
            Event::AreaCreated { id, .. } | Event::AreaUpdated { id, .. } | Event::AreaDeleted { id } => *id,
            Event::ReservationRequested { reservation } => reservation.area_id,
            Event::ReservationStatusChanged { area_id, .. }
            | Event::ReservationRescheduled { area_id, .. }
            | Event::ReservationDeleted { area_id, .. } => *area_id,
        }
    }
}

// ── Query types ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaInfo {
    pub id: Ulid,
    pub config: AreaConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub area_id: Option<Ulid>,
    pub date: Option<NaiveDate>,
    pub unit: Option<u32>,
    pub status: Option<ReservationStatus>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.area_id.is_none_or(|a| a == r.area_id)
            && self.date.is_none_or(|d| d == r.date)
            && self.unit.is_none_or(|u| u == r.unit)
            && self.status.is_none_or(|s| s == r.status)
    }
}
