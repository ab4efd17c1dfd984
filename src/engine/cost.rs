use crate::model::{Cents, Span};

use super::EngineError;

/// `hourly_rate × hours`, in cents, rounded half up to the cent.
///
/// Empty or inverted spans are rejected rather than priced at zero.
pub fn compute_cost(hourly_rate: Cents, span: &Span) -> Result<Cents, EngineError> {
    if span.is_empty() {
        return Err(EngineError::InvalidRange {
            start: span.start,
            end: span.end,
        });
    }
    let minutes = i64::from(span.duration_minutes());
    hourly_rate
        .checked_mul(minutes)
        .and_then(|c| c.checked_add(30))
        .map(|c| c / 60)
        .ok_or(EngineError::LimitExceeded("cost overflow"))
}
