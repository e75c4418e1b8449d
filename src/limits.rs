//! Compile-time bounds. Every user-supplied size or range is checked against
//! one of these before it touches engine state.

use crate::model::Ms;

pub const MAX_STAFF_PER_BUSINESS: usize = 10_000;
pub const MAX_INTERVALS_PER_STAFF: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 2_000;

/// Hard cap on occurrences per recurring series, counting the seed.
pub const MAX_SERIES_OCCURRENCES: usize = 52;

/// Most line items a single multi-service appointment may carry.
pub const MAX_LINE_ITEMS: usize = 16;

pub const MAX_PARTICIPANT_LIMIT: u32 = 500;

pub const MAX_BUSINESSES: usize = 1_000;
pub const MAX_BUSINESS_NAME_LEN: usize = 256;

/// 2000-01-01T00:00:00Z — anything earlier is a caller bug.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// No single booked interval may exceed 7 days.
pub const MAX_SPAN_DURATION_MS: Ms = 7 * 24 * 3_600_000;

/// Read-side queries may scan at most ~1 year.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;
