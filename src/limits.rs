//! Hard caps enforced by the engine and the SQL layer.

use crate::model::Minute;

pub const MAX_AREAS: usize = 1_000;
pub const MAX_RESERVATIONS_PER_AREA: usize = 100_000;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 2_000;
pub const MAX_CONTACT_LEN: usize = 120;
pub const MAX_PURPOSE_LEN: usize = 200;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_HEADCOUNT: u32 = 10_000;

/// Hourly rate ceiling in cents (1,000,000.00).
pub const MAX_HOURLY_RATE_CENTS: i64 = 100_000_000;

/// Minutes in a day. A span may end at this value (`24:00`) but not past it.
pub const MINUTES_PER_DAY: Minute = 24 * 60;

/// Width of a generated display slot.
pub const SLOT_MINUTES: Minute = 60;
