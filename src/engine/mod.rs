mod booking;
mod conflict;
mod error;
mod group;
mod layout;
mod queries;
mod recurrence;

pub use error::EngineError;
pub use layout::{LayoutAssignment, layout_day};
pub use queries::LaidOutInterval;
pub use recurrence::SeriesCreation;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::catalog::ServiceCatalog;
use crate::journal::Journal;
use crate::model::*;
use crate::notify::NotifyHub;

pub type SharedStaffSchedule = Arc<RwLock<StaffSchedule>>;
pub type SharedAppointment = Arc<RwLock<Appointment>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_and_respond(
    journal: &mut Journal,
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(journal, batch);
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    journal: &mut Journal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = journal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

/// One business's scheduling engine: the booking store, conflict detector,
/// and series/group managers behind per-staff write locks.
pub struct Engine {
    pub(super) staff: DashMap<Ulid, SharedStaffSchedule>,
    pub(super) appointments: DashMap<Ulid, SharedAppointment>,
    /// booking_reference → appointment id.
    pub(super) by_reference: DashMap<String, Ulid>,
    /// series_id → member appointment ids, in creation order.
    pub(super) series: DashMap<Ulid, Vec<Ulid>>,
    pub(super) catalog: Arc<dyn ServiceCatalog>,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub notify: Arc<NotifyHub>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

/// Apply a status change to an appointment record: set the new status and
/// stamp its timestamp field. Transitions never revisit a state, so each
/// stamp is written at most once.
pub(super) fn apply_status(
    appt: &mut Appointment,
    status: BookingStatus,
    at: Ms,
    by: Option<String>,
) {
    appt.status = status;
    match status {
        BookingStatus::CheckedIn => appt.checked_in_at = Some(at),
        BookingStatus::Completed => appt.completed_at = Some(at),
        BookingStatus::Cancelled => {
            appt.cancelled_at = Some(at);
            appt.cancelled_by = by;
        }
        BookingStatus::NoShow => appt.no_show_at = Some(at),
        BookingStatus::Confirmed | BookingStatus::InProgress => {}
    }
}

impl Engine {
    pub fn new(
        journal_path: PathBuf,
        catalog: Arc<dyn ServiceCatalog>,
        notify: Arc<NotifyHub>,
    ) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            staff: DashMap::new(),
            appointments: DashMap::new(),
            by_reference: DashMap::new(),
            series: DashMap::new(),
            catalog,
            journal_tx,
            notify,
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this may run inside an async context (e.g. lazy business creation).
        for event in &events {
            engine.replay_event(event);
        }

        Ok(engine)
    }

    /// Apply one journal event during replay. No locking contention exists:
    /// the engine is not yet shared.
    fn replay_event(&self, event: &Event) {
        match event {
            Event::StaffRegistered { id, name } => {
                let sched = StaffSchedule::new(*id, name.clone());
                self.staff.insert(*id, Arc::new(RwLock::new(sched)));
            }
            Event::StaffRemoved { id } => {
                self.staff.remove(id);
            }
            Event::AppointmentBooked { appointment } => {
                if appointment.occupies_staff() {
                    for li in &appointment.line_items {
                        if let Some(entry) = self.staff.get(&li.staff_id) {
                            let sched = entry.value().clone();
                            let mut guard =
                                sched.try_write().expect("replay: uncontended write");
                            guard.insert_interval(StaffInterval {
                                appointment_id: appointment.id,
                                line_item_id: li.id,
                                span: li.span,
                            });
                        }
                    }
                }
                self.index_appointment(appointment.clone());
            }
            Event::AppointmentRescheduled { id, moves } => {
                if let Some(entry) = self.appointments.get(id) {
                    let appt = entry.value().clone();
                    let mut guard = appt.try_write().expect("replay: uncontended write");
                    for (li_id, staff_id, span) in moves {
                        self.replay_move(&mut guard, *li_id, *staff_id, *span);
                    }
                }
            }
            Event::StatusChanged { id, status, at, by } => {
                if let Some(entry) = self.appointments.get(id) {
                    let appt = entry.value().clone();
                    let mut guard = appt.try_write().expect("replay: uncontended write");
                    apply_status(&mut guard, *status, *at, by.clone());
                    if status.is_terminal() {
                        for staff_id in appointment_staff_ids(&guard) {
                            if let Some(s) = self.staff.get(&staff_id) {
                                let sched = s.value().clone();
                                let mut sg =
                                    sched.try_write().expect("replay: uncontended write");
                                sg.remove_appointment(*id);
                            }
                        }
                    }
                }
            }
            Event::ParticipantJoined {
                appointment_id,
                client_id,
            } => {
                if let Some(entry) = self.appointments.get(appointment_id) {
                    let appt = entry.value().clone();
                    let mut guard = appt.try_write().expect("replay: uncontended write");
                    guard.participants.push(*client_id);
                }
            }
            Event::ParticipantLeft {
                appointment_id,
                client_id,
            } => {
                if let Some(entry) = self.appointments.get(appointment_id) {
                    let appt = entry.value().clone();
                    let mut guard = appt.try_write().expect("replay: uncontended write");
                    guard.participants.retain(|c| c != client_id);
                }
            }
        }
    }

    fn replay_move(&self, appt: &mut Appointment, li_id: Ulid, staff_id: Ulid, span: Span) {
        let Some(li) = appt.line_items.iter_mut().find(|li| li.id == li_id) else {
            return;
        };
        if let Some(entry) = self.staff.get(&li.staff_id) {
            let sched = entry.value().clone();
            let mut guard = sched.try_write().expect("replay: uncontended write");
            guard.remove_line_item(li_id);
        }
        li.staff_id = staff_id;
        li.span = span;
        if appt.occupies_staff()
            && let Some(entry) = self.staff.get(&staff_id) {
                let sched = entry.value().clone();
                let mut guard = sched.try_write().expect("replay: uncontended write");
                guard.insert_interval(StaffInterval {
                    appointment_id: appt.id,
                    line_item_id: li_id,
                    span,
                });
            }
    }

    /// Write event to the journal via the background group-commit writer.
    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub fn get_staff(&self, id: &Ulid) -> Option<SharedStaffSchedule> {
        self.staff.get(id).map(|e| e.value().clone())
    }

    pub(super) fn get_appointment_arc(&self, id: &Ulid) -> Option<SharedAppointment> {
        self.appointments.get(id).map(|e| e.value().clone())
    }

    /// Register a new appointment in the lookup indexes. The caller has
    /// already placed its intervals on the relevant schedules.
    pub(super) fn index_appointment(&self, appt: Appointment) {
        self.by_reference
            .insert(appt.booking_reference.clone(), appt.id);
        if let Some(series_id) = appt.series_id {
            self.series.entry(series_id).or_default().push(appt.id);
        }
        self.appointments.insert(appt.id, Arc::new(RwLock::new(appt)));
    }

    /// Compact the journal by rewriting it with only the events needed to
    /// recreate the current state: one registration per staff member, one
    /// booked snapshot per appointment (status and stamps included).
    ///
    /// Runs concurrently with bookings, so every read lock is awaited: a
    /// writer holds its schedule or appointment lock across the journal
    /// fsync, and this may land in that window. Writers always release, and
    /// the journal writer task runs independently of these locks, so waiting
    /// cannot deadlock. Arcs are collected before awaiting so no DashMap
    /// shard lock is held across an await point.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let mut scheds: Vec<(Ulid, SharedStaffSchedule)> = self
            .staff
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        scheds.sort_by_key(|(id, _)| *id);
        for (_, sched) in scheds {
            let guard = sched.read().await;
            events.push(Event::StaffRegistered {
                id: guard.id,
                name: guard.name.clone(),
            });
        }

        let appts: Vec<_> = self.appointments.iter().map(|e| e.value().clone()).collect();
        let mut snapshots: Vec<Appointment> = Vec::with_capacity(appts.len());
        for appt in appts {
            let guard = appt.read().await;
            snapshots.push(guard.clone());
        }
        snapshots.sort_by_key(|a| (a.created_at, a.id));
        for appointment in snapshots {
            events.push(Event::AppointmentBooked { appointment });
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::JournalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::JournalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::JournalError(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Distinct staff ids across an appointment's line items, sorted for a
/// stable lock order.
pub(super) fn appointment_staff_ids(appt: &Appointment) -> Vec<Ulid> {
    let mut ids: Vec<Ulid> = appt.line_items.iter().map(|li| li.staff_id).collect();
    ids.sort();
    ids.dedup();
    ids
}
