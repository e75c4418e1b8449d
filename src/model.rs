use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Appointment lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    CheckedIn,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::NoShow)
    }

    /// Position along the service chain, for forward-only transitions.
    fn rank(&self) -> u8 {
        match self {
            Self::Confirmed => 0,
            Self::CheckedIn => 1,
            Self::InProgress => 2,
            Self::Completed => 3,
            Self::Cancelled | Self::NoShow => 4,
        }
    }

    /// Forward moves along Confirmed → CheckedIn → InProgress → Completed
    /// (skipping ahead is allowed); Cancelled/NoShow from any non-terminal
    /// state. Terminal states are frozen, re-entry included.
    pub fn can_transition(&self, to: BookingStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match to {
            Self::Cancelled | Self::NoShow => true,
            Self::Confirmed => false,
            _ => to.rank() > self.rank(),
        }
    }
}

/// Recurring series cadence. Fixed-interval steps, not calendar-aware:
/// `Monthly` is exactly 30 days. Changing this would change user-visible
/// occurrence dates, so it stays as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceRule {
    Weekly,
    Biweekly,
    Monthly,
}

impl RecurrenceRule {
    pub fn step_ms(&self) -> Ms {
        const DAY: Ms = 24 * 3_600_000;
        match self {
            Self::Weekly => 7 * DAY,
            Self::Biweekly => 14 * DAY,
            Self::Monthly => 30 * DAY,
        }
    }
}

/// One schedulable interval of an appointment: a service performed by one
/// staff member over one span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLineItem {
    pub id: Ulid,
    pub service_id: Ulid,
    pub staff_id: Ulid,
    pub span: Span,
    pub duration_minutes: u32,
    pub price_cents: i64,
}

/// The persisted booking record. Group sessions use a single line item for
/// the session's staff/time and track attendees in `participants`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub client_id: Option<Ulid>,
    pub booking_reference: String,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub series_id: Option<Ulid>,
    pub recurrence_rule: Option<RecurrenceRule>,
    pub recurrence_end: Option<Ms>,
    pub is_group: bool,
    pub max_participants: Option<u32>,
    pub participants: Vec<Ulid>,
    pub line_items: Vec<ServiceLineItem>,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub created_at: Ms,
    pub checked_in_at: Option<Ms>,
    pub completed_at: Option<Ms>,
    pub cancelled_at: Option<Ms>,
    pub no_show_at: Option<Ms>,
    pub cancelled_by: Option<String>,
}

impl Appointment {
    /// Earliest line-item start. The engine never constructs an appointment
    /// with zero line items.
    pub fn start(&self) -> Ms {
        self.line_items
            .iter()
            .map(|li| li.span.start)
            .min()
            .expect("appointment has at least one line item")
    }

    pub fn occupies_staff(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// What the external service catalog resolves a service id to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceInfo {
    pub duration_minutes: u32,
    pub price_cents: i64,
    pub taxable: bool,
    pub tax_rate: f64,
}

impl ServiceInfo {
    pub fn tax_cents(&self) -> i64 {
        if self.taxable {
            (self.price_cents as f64 * self.tax_rate).round() as i64
        } else {
            0
        }
    }
}

/// A booked interval as the schedule sees it: which appointment and line item
/// own this slice of the staff member's time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffInterval {
    pub appointment_id: Ulid,
    pub line_item_id: Ulid,
    pub span: Span,
}

/// Per-staff booked time, sorted by `span.start`. Only intervals of
/// non-terminal appointments live here — terminal transitions remove them —
/// so everything present occupies the staff member's time.
#[derive(Debug, Clone)]
pub struct StaffSchedule {
    pub id: Ulid,
    pub name: Option<String>,
    pub intervals: Vec<StaffInterval>,
}

impl StaffSchedule {
    pub fn new(id: Ulid, name: Option<String>) -> Self {
        Self {
            id,
            name,
            intervals: Vec::new(),
        }
    }

    /// Insert interval maintaining sort order by span.start.
    pub fn insert_interval(&mut self, interval: StaffInterval) {
        let pos = self
            .intervals
            .binary_search_by_key(&interval.span.start, |i| i.span.start)
            .unwrap_or_else(|e| e);
        self.intervals.insert(pos, interval);
    }

    /// Remove every interval owned by an appointment. Returns how many went.
    pub fn remove_appointment(&mut self, appointment_id: Ulid) -> usize {
        let before = self.intervals.len();
        self.intervals.retain(|i| i.appointment_id != appointment_id);
        before - self.intervals.len()
    }

    /// Remove a single line item's interval.
    pub fn remove_line_item(&mut self, line_item_id: Ulid) -> Option<StaffInterval> {
        if let Some(pos) = self
            .intervals
            .iter()
            .position(|i| i.line_item_id == line_item_id)
        {
            Some(self.intervals.remove(pos))
        } else {
            None
        }
    }

    /// Return only intervals whose span overlaps the query window.
    /// Uses binary search to skip intervals starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &StaffInterval> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .intervals
            .partition_point(|i| i.span.start < query.end);
        self.intervals[..right_bound]
            .iter()
            .filter(move |i| i.span.end > query.start)
    }
}

/// Journal record format — flat, no nesting. `AppointmentBooked` carries the
/// full record so replay and compaction need no cross-event reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    StaffRegistered {
        id: Ulid,
        name: Option<String>,
    },
    StaffRemoved {
        id: Ulid,
    },
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentRescheduled {
        id: Ulid,
        /// `(line_item_id, staff_id, span)` per line item after the move.
        moves: Vec<(Ulid, Ulid, Span)>,
    },
    StatusChanged {
        id: Ulid,
        status: BookingStatus,
        at: Ms,
        by: Option<String>,
    },
    ParticipantJoined {
        appointment_id: Ulid,
        client_id: Ulid,
    },
    ParticipantLeft {
        appointment_id: Ulid,
        client_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub booked_intervals: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap_symmetric() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn span_touching_endpoints_do_not_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(200, 300);
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn status_forward_chain() {
        use BookingStatus::*;
        assert!(Confirmed.can_transition(CheckedIn));
        assert!(CheckedIn.can_transition(InProgress));
        assert!(InProgress.can_transition(Completed));
        // Skipping ahead is allowed
        assert!(Confirmed.can_transition(Completed));
        // Backward is not
        assert!(!InProgress.can_transition(CheckedIn));
        assert!(!CheckedIn.can_transition(Confirmed));
    }

    #[test]
    fn status_terminal_frozen() {
        use BookingStatus::*;
        for terminal in [Completed, Cancelled, NoShow] {
            for to in [Confirmed, CheckedIn, InProgress, Completed, Cancelled, NoShow] {
                assert!(!terminal.can_transition(to), "{terminal:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn status_cancel_from_any_active() {
        use BookingStatus::*;
        for from in [Confirmed, CheckedIn, InProgress] {
            assert!(from.can_transition(Cancelled));
            assert!(from.can_transition(NoShow));
        }
    }

    #[test]
    fn recurrence_steps() {
        const DAY: Ms = 24 * 3_600_000;
        assert_eq!(RecurrenceRule::Weekly.step_ms(), 7 * DAY);
        assert_eq!(RecurrenceRule::Biweekly.step_ms(), 14 * DAY);
        assert_eq!(RecurrenceRule::Monthly.step_ms(), 30 * DAY);
    }

    #[test]
    fn tax_rounding() {
        let svc = ServiceInfo {
            duration_minutes: 45,
            price_cents: 3333,
            taxable: true,
            tax_rate: 0.0825,
        };
        assert_eq!(svc.tax_cents(), 275); // 274.97 rounds up
        let untaxed = ServiceInfo { taxable: false, ..svc };
        assert_eq!(untaxed.tax_cents(), 0);
    }

    fn iv(start: Ms, end: Ms) -> StaffInterval {
        StaffInterval {
            appointment_id: Ulid::new(),
            line_item_id: Ulid::new(),
            span: Span::new(start, end),
        }
    }

    #[test]
    fn schedule_insert_keeps_order() {
        let mut sched = StaffSchedule::new(Ulid::new(), None);
        sched.insert_interval(iv(300, 400));
        sched.insert_interval(iv(100, 200));
        sched.insert_interval(iv(200, 300));
        assert_eq!(sched.intervals[0].span.start, 100);
        assert_eq!(sched.intervals[1].span.start, 200);
        assert_eq!(sched.intervals[2].span.start, 300);
    }

    #[test]
    fn schedule_overlapping_skips_adjacent() {
        let mut sched = StaffSchedule::new(Ulid::new(), None);
        sched.insert_interval(iv(100, 200));
        sched.insert_interval(iv(450, 600));
        sched.insert_interval(iv(1000, 1100));

        let hits: Vec<_> = sched.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));

        // Interval ending exactly at query.start is not a hit (half-open)
        let hits: Vec<_> = sched.overlapping(&Span::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn schedule_remove_appointment_clears_all_its_intervals() {
        let mut sched = StaffSchedule::new(Ulid::new(), None);
        let appt = Ulid::new();
        for k in 0..3i64 {
            sched.insert_interval(StaffInterval {
                appointment_id: appt,
                line_item_id: Ulid::new(),
                span: Span::new(k * 100, k * 100 + 50),
            });
        }
        sched.insert_interval(iv(1000, 1100));
        assert_eq!(sched.remove_appointment(appt), 3);
        assert_eq!(sched.intervals.len(), 1);
    }

    #[test]
    fn schedule_remove_line_item() {
        let mut sched = StaffSchedule::new(Ulid::new(), None);
        let a = iv(100, 200);
        let b = iv(300, 400);
        sched.insert_interval(a);
        sched.insert_interval(b);
        let removed = sched.remove_line_item(a.line_item_id).unwrap();
        assert_eq!(removed.span, Span::new(100, 200));
        assert!(sched.remove_line_item(Ulid::new()).is_none());
        assert_eq!(sched.intervals.len(), 1);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::StatusChanged {
            id: Ulid::new(),
            status: BookingStatus::CheckedIn,
            at: 1_767_225_600_000,
            by: Some("front-desk".into()),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
