use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{Minute, Overlap, ReservationStatus, Span};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    NameTaken(String),
    InvalidRange {
        start: Minute,
        end: Minute,
    },
    InvalidConfig(&'static str),
    InvalidRequest(&'static str),
    OutsideOperatingHours {
        requested: Span,
        hours: Span,
    },
    AreaDisabled(Ulid),
    DurationOutOfBounds {
        minutes: Minute,
        min: Minute,
        max: Minute,
    },
    HeadcountOutOfRange {
        headcount: u32,
        capacity: u32,
    },
    Conflict {
        with: Ulid,
        date: NaiveDate,
        overlap: Overlap,
    },
    InvalidTransition {
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    NotActive {
        id: Ulid,
        status: ReservationStatus,
    },
    HasActiveReservations(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::NameTaken(name) => write!(f, "area name already in use: {name}"),
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid time range: start {start} must be before end {end} within one day")
            }
            EngineError::InvalidConfig(msg) => write!(f, "invalid area configuration: {msg}"),
            EngineError::InvalidRequest(msg) => write!(f, "invalid reservation: {msg}"),
            EngineError::OutsideOperatingHours { requested, hours } => {
                write!(f, "{requested} is outside operating hours {hours}")
            }
            EngineError::AreaDisabled(id) => write!(f, "area {id} is not available for booking"),
            EngineError::DurationOutOfBounds { minutes, min, max } => {
                write!(f, "duration {minutes} min outside allowed range [{min}, {max}] min")
            }
            EngineError::HeadcountOutOfRange { headcount, capacity } => {
                write!(f, "headcount {headcount} not allowed (capacity {capacity})")
            }
            EngineError::Conflict { with, date, overlap } => {
                write!(f, "conflict with reservation {with} on {date}: requested interval {overlap} it")
            }
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "reservation {id} cannot go from {from} to {to}")
            }
            EngineError::NotActive { id, status } => {
                write!(f, "reservation {id} is {status} and can no longer change")
            }
            EngineError::HasActiveReservations(id) => {
                write!(f, "cannot delete area {id}: has active reservations")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
