use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as Ms
}

/// Bounds-check a caller-supplied start time before any span arithmetic
/// touches it. Within the valid window, `start + duration` and delta shifts
/// cannot overflow `i64`.
pub(crate) fn validate_start(start: Ms) -> Result<(), EngineError> {
    use crate::limits::*;
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&start) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    use crate::limits::*;
    if span.end <= span.start {
        return Err(EngineError::LimitExceeded("span end must be after start"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// Reject `span` if it overlaps any booked interval on this schedule.
///
/// Half-open semantics: an interval ending exactly at `span.start` does not
/// conflict, so back-to-back bookings are legal. `exclude` skips one
/// appointment's own intervals — the reschedule path checks the new span
/// against everyone else's time, not its own.
///
/// The schedule only contains intervals of non-terminal appointments, so no
/// status filtering happens here; cancellation removes intervals instead.
pub(crate) fn check_no_conflict(
    sched: &StaffSchedule,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for interval in sched.overlapping(span) {
        if Some(interval.appointment_id) == exclude {
            continue;
        }
        return Err(EngineError::ScheduleConflict(interval.appointment_id));
    }
    Ok(())
}
