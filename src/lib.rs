//! slotwise — appointment scheduling and conflict-resolution core for a
//! multi-tenant salon platform.
//!
//! Each business gets an in-memory [`engine::Engine`] backed by an
//! append-only journal: per-staff schedules behind write locks make the
//! conflict-check-then-book sequence atomic, the overlap layout engine turns
//! a day's bookings into stable render columns, and series/group managers
//! build on the same booking path.

pub mod business;
pub mod catalog;
pub mod engine;
pub mod ids;
pub mod journal;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod observability;

pub use business::BusinessManager;
pub use catalog::{InMemoryCatalog, ServiceCatalog};
pub use engine::{
    Engine, EngineError, LaidOutInterval, LayoutAssignment, SeriesCreation, layout_day,
};
pub use model::{
    Appointment, BookingStatus, Ms, RecurrenceRule, ServiceInfo, ServiceLineItem, Span,
    StaffInterval,
};
