use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::SLOT_MINUTES;
use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// First active reservation on `date` that `span` collides with, skipping `exclude`.
pub fn first_overlap(
    area: &AreaState,
    date: NaiveDate,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<(Ulid, Overlap)> {
    area.overlapping(date, span)
        .filter(|r| r.is_active() && Some(r.id) != exclude)
        .find_map(|r| span.overlap_with(&r.span).map(|o| (r.id, o)))
}

/// Whether `span` on `date` can be booked: the area is enabled, the span sits
/// inside operating hours and no active reservation overlaps it.
///
/// `span` is assumed non-empty; callers validate the range first.
pub fn is_available(area: &AreaState, date: NaiveDate, span: &Span) -> bool {
    area.config.enabled
        && area.config.hours().contains_span(span)
        && first_overlap(area, date, span, None).is_none()
}

/// Fixed one-hour display slots from opening time, each free of active
/// reservations. A trailing block that would run past closing is dropped.
pub fn available_slots(area: &AreaState, date: NaiveDate) -> Vec<Span> {
    if !area.config.enabled {
        return Vec::new();
    }
    let hours = area.config.hours();
    let mut slots = Vec::new();
    let mut start = hours.start;
    while start + SLOT_MINUTES <= hours.end {
        let slot = Span::new(start, start + SLOT_MINUTES);
        if !area.overlapping(date, &slot).any(|r| r.is_active()) {
            slots.push(slot);
        }
        start += SLOT_MINUTES;
    }
    slots
}

/// Maximal free windows within operating hours on `date`.
pub fn free_windows(area: &AreaState, date: NaiveDate, min_duration: Option<Minute>) -> Vec<Span> {
    if !area.config.enabled || area.config.hours().is_empty() {
        return Vec::new();
    }
    let busy = merge_overlapping(&area.active_spans(date));
    let mut free = subtract_intervals(&[area.config.hours()], &busy);
    if let Some(min) = min_duration {
        free.retain(|span| span.duration_minutes() >= min);
    }
    free
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
