use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::first_overlap;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// `start < end`, both within one day.
pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.is_empty() || span.end > MINUTES_PER_DAY {
        return Err(EngineError::InvalidRange {
            start: span.start,
            end: span.end,
        });
    }
    Ok(())
}

pub(crate) fn validate_config(config: &AreaConfig) -> Result<(), EngineError> {
    if config.name.trim().is_empty() {
        return Err(EngineError::InvalidConfig("name is empty"));
    }
    if config.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("area name too long"));
    }
    if config
        .description
        .as_ref()
        .is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN)
    {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    if config.capacity > MAX_HEADCOUNT {
        return Err(EngineError::LimitExceeded("capacity too large"));
    }
    if !(0..=MAX_HOURLY_RATE_CENTS).contains(&config.hourly_rate) {
        return Err(EngineError::InvalidConfig("hourly rate out of range"));
    }
    validate_span(&config.hours())
        .map_err(|_| EngineError::InvalidConfig("opening time must be before closing time"))?;
    if config.min_minutes == 0 || config.min_minutes > config.max_minutes {
        return Err(EngineError::InvalidConfig("minimum duration must be positive and not exceed maximum"));
    }
    Ok(())
}

pub(crate) fn validate_request(req: &ReservationRequest) -> Result<(), EngineError> {
    validate_span(&req.span)?;
    if req.contact.name.trim().is_empty() {
        return Err(EngineError::InvalidRequest("requester name is empty"));
    }
    let too_long = |v: &Option<String>, max: usize| v.as_ref().is_some_and(|s| s.len() > max);
    if req.contact.name.len() > MAX_CONTACT_LEN
        || too_long(&req.contact.phone, MAX_CONTACT_LEN)
        || too_long(&req.contact.email, MAX_CONTACT_LEN)
    {
        return Err(EngineError::LimitExceeded("contact field too long"));
    }
    if too_long(&req.purpose, MAX_PURPOSE_LEN) {
        return Err(EngineError::LimitExceeded("purpose too long"));
    }
    Ok(())
}

/// Area-level rules for placing `span`: enabled, inside operating hours,
/// duration within the configured bounds.
pub(crate) fn check_bookable(area: &AreaState, span: &Span) -> Result<(), EngineError> {
    let config = &area.config;
    if !config.enabled {
        return Err(EngineError::AreaDisabled(area.id));
    }
    let hours = config.hours();
    if !hours.contains_span(span) {
        return Err(EngineError::OutsideOperatingHours {
            requested: *span,
            hours,
        });
    }
    let minutes = span.duration_minutes();
    if minutes < config.min_minutes || minutes > config.max_minutes {
        return Err(EngineError::DurationOutOfBounds {
            minutes,
            min: config.min_minutes,
            max: config.max_minutes,
        });
    }
    Ok(())
}

/// Headcount must be positive and, when the area has a capacity, within it.
pub(crate) fn check_headcount(config: &AreaConfig, headcount: u32) -> Result<(), EngineError> {
    if headcount == 0 || (config.capacity > 0 && headcount > config.capacity) {
        return Err(EngineError::HeadcountOutOfRange {
            headcount,
            capacity: config.capacity,
        });
    }
    Ok(())
}

pub(crate) fn check_no_conflict(
    area: &AreaState,
    date: NaiveDate,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match first_overlap(area, date, span, exclude) {
        Some((with, overlap)) => Err(EngineError::Conflict { with, date, overlap }),
        None => Ok(()),
    }
}
