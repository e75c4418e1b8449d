use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    /// The candidate span overlaps an existing booking for the same staff
    /// member. Carries the blocking appointment's id.
    ScheduleConflict(Ulid),
    ServiceNotFound(Ulid),
    StaffNotFound(Ulid),
    AppointmentNotFound(Ulid),
    AlreadyExists(Ulid),
    /// Staff member still has booked intervals and cannot be removed.
    StaffBusy(Ulid),
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    NotAGroupSession(Ulid),
    AlreadyJoined(Ulid),
    GroupFull(u32),
    /// No engine has been opened for this business name.
    BusinessNotConfigured(String),
    LimitExceeded(&'static str),
    JournalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::ScheduleConflict(id) => {
                write!(f, "schedule conflict with appointment: {id}")
            }
            EngineError::ServiceNotFound(id) => write!(f, "service not found: {id}"),
            EngineError::StaffNotFound(id) => write!(f, "staff not found: {id}"),
            EngineError::AppointmentNotFound(id) => write!(f, "appointment not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::StaffBusy(id) => {
                write!(f, "cannot remove staff {id}: schedule still has bookings")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "invalid status transition: {from:?} -> {to:?}")
            }
            EngineError::NotAGroupSession(id) => {
                write!(f, "appointment {id} is not a group session")
            }
            EngineError::AlreadyJoined(id) => write!(f, "client already joined: {id}"),
            EngineError::GroupFull(max) => {
                write!(f, "group session full: max {max} participants")
            }
            EngineError::BusinessNotConfigured(name) => {
                write!(f, "business not configured: {name}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::JournalError(e) => write!(f, "journal error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
