use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::ids::booking_reference;
use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_ms, validate_span, validate_start};
use super::{Engine, EngineError, apply_status, appointment_staff_ids};

/// Everything that varies between the booking entry points (single,
/// multi-service, group, series occurrence). `assemble` turns it plus priced
/// line items into a full record.
pub(super) struct NewAppointment {
    pub client_id: Option<Ulid>,
    pub notes: Option<String>,
    pub is_group: bool,
    pub max_participants: Option<u32>,
    pub participants: Vec<Ulid>,
    pub series: Option<(Ulid, RecurrenceRule, Ms)>,
}

impl NewAppointment {
    pub fn single(client_id: Ulid, notes: Option<String>) -> Self {
        Self {
            client_id: Some(client_id),
            notes,
            is_group: false,
            max_participants: None,
            participants: Vec::new(),
            series: None,
        }
    }
}

pub(super) fn assemble(
    new: NewAppointment,
    priced: Vec<(ServiceLineItem, ServiceInfo)>,
    now: Ms,
) -> Appointment {
    debug_assert!(!priced.is_empty());
    let subtotal_cents: i64 = priced.iter().map(|(li, _)| li.price_cents).sum();
    let tax_cents: i64 = priced.iter().map(|(_, svc)| svc.tax_cents()).sum();
    let (series_id, recurrence_rule, recurrence_end) = match new.series {
        Some((id, rule, end)) => (Some(id), Some(rule), Some(end)),
        None => (None, None, None),
    };
    Appointment {
        id: Ulid::new(),
        client_id: new.client_id,
        booking_reference: booking_reference(now),
        status: BookingStatus::Confirmed,
        notes: new.notes,
        series_id,
        recurrence_rule,
        recurrence_end,
        is_group: new.is_group,
        max_participants: new.max_participants,
        participants: new.participants,
        line_items: priced.into_iter().map(|(li, _)| li).collect(),
        subtotal_cents,
        tax_cents,
        total_cents: subtotal_cents + tax_cents,
        created_at: now,
        checked_in_at: None,
        completed_at: None,
        cancelled_at: None,
        no_show_at: None,
        cancelled_by: None,
    }
}

pub(super) fn validate_notes(notes: &Option<String>) -> Result<(), EngineError> {
    if let Some(n) = notes
        && n.len() > MAX_NOTES_LEN
    {
        return Err(EngineError::LimitExceeded("notes too long"));
    }
    Ok(())
}

/// Span of one service starting at `start`.
pub(super) fn service_span(start: Ms, svc: &ServiceInfo) -> Span {
    Span {
        start,
        end: start + svc.duration_minutes as Ms * MINUTE_MS,
    }
}

impl Engine {
    pub async fn register_staff(&self, id: Ulid, name: Option<String>) -> Result<(), EngineError> {
        if self.staff.len() >= MAX_STAFF_PER_BUSINESS {
            return Err(EngineError::LimitExceeded("too many staff members"));
        }
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN
        {
            return Err(EngineError::LimitExceeded("staff name too long"));
        }
        if self.staff.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::StaffRegistered {
            id,
            name: name.clone(),
        };
        self.journal_append(&event).await?;
        let sched = StaffSchedule::new(id, name);
        self.staff.insert(id, Arc::new(RwLock::new(sched)));
        self.notify.send(id, &event);
        Ok(())
    }

    /// Remove a staff member. Rejected while the schedule still holds booked
    /// intervals — cancel or reschedule them first.
    pub async fn remove_staff(&self, id: Ulid) -> Result<(), EngineError> {
        let sched = self.get_staff(&id).ok_or(EngineError::StaffNotFound(id))?;
        let guard = sched.read().await;
        if !guard.intervals.is_empty() {
            return Err(EngineError::StaffBusy(id));
        }
        drop(guard);

        let event = Event::StaffRemoved { id };
        self.journal_append(&event).await?;
        self.staff.remove(&id);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        Ok(())
    }

    /// Book a single service with one staff member. The conflict check,
    /// journal append, and schedule insert all happen under the staff
    /// schedule's write lock — two concurrent requests for overlapping time
    /// serialize here, and the loser gets `ScheduleConflict`.
    pub async fn create_appointment(
        &self,
        client_id: Ulid,
        service_id: Ulid,
        staff_id: Ulid,
        start: Ms,
        notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        validate_notes(&notes)?;
        validate_start(start)?;
        let svc = self
            .catalog
            .get_service(service_id)
            .await
            .ok_or(EngineError::ServiceNotFound(service_id))?;
        let span = service_span(start, &svc);
        validate_span(&span)?;

        let sched = self
            .get_staff(&staff_id)
            .ok_or(EngineError::StaffNotFound(staff_id))?;
        let mut guard = sched.write().await;
        if guard.intervals.len() >= MAX_INTERVALS_PER_STAFF {
            return Err(EngineError::LimitExceeded("too many intervals on staff"));
        }

        if let Err(e) = check_no_conflict(&guard, &span, None) {
            metrics::counter!(crate::observability::CONFLICTS_REJECTED_TOTAL).increment(1);
            return Err(e);
        }

        let now = now_ms();
        let line_item = ServiceLineItem {
            id: Ulid::new(),
            service_id,
            staff_id,
            span,
            duration_minutes: svc.duration_minutes,
            price_cents: svc.price_cents,
        };
        let appt = assemble(
            NewAppointment::single(client_id, notes),
            vec![(line_item, svc)],
            now,
        );

        let event = Event::AppointmentBooked {
            appointment: appt.clone(),
        };
        self.journal_append(&event).await?;
        guard.insert_interval(StaffInterval {
            appointment_id: appt.id,
            line_item_id: appt.line_items[0].id,
            span,
        });
        self.index_appointment(appt.clone());
        self.notify.send(staff_id, &event);
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::debug!(reference = %appt.booking_reference, "appointment booked");
        Ok(appt)
    }

    /// Book several services as one appointment, possibly across staff
    /// members. All-or-nothing: write locks are taken in sorted staff order,
    /// every item is validated against current state plus the rest of the
    /// batch, and only then is anything committed.
    pub async fn create_multi_service(
        &self,
        client_id: Ulid,
        items: &[(Ulid, Ulid, Ms)], // (service_id, staff_id, start)
        notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        if items.is_empty() {
            return Err(EngineError::LimitExceeded("no services in booking"));
        }
        if items.len() > MAX_LINE_ITEMS {
            return Err(EngineError::LimitExceeded("too many services in booking"));
        }
        validate_notes(&notes)?;

        // Resolve and validate before touching any lock.
        let mut priced: Vec<(ServiceLineItem, ServiceInfo)> = Vec::with_capacity(items.len());
        for &(service_id, staff_id, start) in items {
            validate_start(start)?;
            let svc = self
                .catalog
                .get_service(service_id)
                .await
                .ok_or(EngineError::ServiceNotFound(service_id))?;
            let span = service_span(start, &svc);
            validate_span(&span)?;
            priced.push((
                ServiceLineItem {
                    id: Ulid::new(),
                    service_id,
                    staff_id,
                    span,
                    duration_minutes: svc.duration_minutes,
                    price_cents: svc.price_cents,
                },
                svc,
            ));
        }

        // Acquire write locks in sorted order to prevent deadlocks.
        let mut staff_ids: Vec<Ulid> = priced.iter().map(|(li, _)| li.staff_id).collect();
        staff_ids.sort();
        staff_ids.dedup();

        let mut guards = Vec::with_capacity(staff_ids.len());
        let mut guard_idx = HashMap::new();
        for sid in &staff_ids {
            let sched = self
                .get_staff(sid)
                .ok_or(EngineError::StaffNotFound(*sid))?;
            let guard = sched.write_owned().await;
            if guard.intervals.len() >= MAX_INTERVALS_PER_STAFF {
                return Err(EngineError::LimitExceeded("too many intervals on staff"));
            }
            guard_idx.insert(*sid, guards.len());
            guards.push(guard);
        }

        let now = now_ms();
        let appt = assemble(NewAppointment::single(client_id, notes), priced, now);

        // Phase 1: validate every line item against current state + intra-batch.
        for (i, li) in appt.line_items.iter().enumerate() {
            let guard = &guards[guard_idx[&li.staff_id]];
            if let Err(e) = check_no_conflict(guard, &li.span, None) {
                metrics::counter!(crate::observability::CONFLICTS_REJECTED_TOTAL).increment(1);
                return Err(e);
            }
            for other in &appt.line_items[i + 1..] {
                if other.staff_id == li.staff_id && other.span.overlaps(&li.span) {
                    metrics::counter!(crate::observability::CONFLICTS_REJECTED_TOTAL)
                        .increment(1);
                    return Err(EngineError::ScheduleConflict(appt.id));
                }
            }
        }

        // Phase 2: all validated — commit.
        let event = Event::AppointmentBooked {
            appointment: appt.clone(),
        };
        self.journal_append(&event).await?;
        for li in &appt.line_items {
            guards[guard_idx[&li.staff_id]].insert_interval(StaffInterval {
                appointment_id: appt.id,
                line_item_id: li.id,
                span: li.span,
            });
        }
        self.index_appointment(appt.clone());
        for sid in &staff_ids {
            self.notify.send(*sid, &event);
        }
        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        Ok(appt)
    }

    /// Move an appointment to a new start time, optionally to a new staff
    /// member. Every line item shifts by the same delta; the conflict check
    /// excludes the appointment's own current intervals, so shifting within
    /// (or adjacent to) its old slot is legal.
    pub async fn reschedule(
        &self,
        appointment_id: Ulid,
        new_start: Ms,
        new_staff: Option<Ulid>,
    ) -> Result<Appointment, EngineError> {
        validate_start(new_start)?;
        let appt_arc = self
            .get_appointment_arc(&appointment_id)
            .ok_or(EngineError::AppointmentNotFound(appointment_id))?;
        let mut appt = appt_arc.write_owned().await;
        if appt.status.is_terminal() {
            // Terminal appointments accept no time-bearing mutation.
            return Err(EngineError::InvalidTransition {
                from: appt.status,
                to: appt.status,
            });
        }
        if new_staff.is_some() && appt.line_items.len() > 1 {
            return Err(EngineError::LimitExceeded(
                "staff change requires a single-service appointment",
            ));
        }

        let delta = new_start - appt.start();
        let mut moves: Vec<(Ulid, Ulid, Span)> = Vec::with_capacity(appt.line_items.len());
        for li in &appt.line_items {
            let staff_id = new_staff.unwrap_or(li.staff_id);
            let span = Span::new(li.span.start + delta, li.span.end + delta);
            validate_span(&span)?;
            moves.push((li.id, staff_id, span));
        }

        // Old and new staff, locked in sorted order.
        let mut staff_ids = appointment_staff_ids(&appt);
        staff_ids.extend(moves.iter().map(|(_, sid, _)| *sid));
        staff_ids.sort();
        staff_ids.dedup();

        let mut guards = HashMap::new();
        for sid in &staff_ids {
            let sched = self
                .get_staff(sid)
                .ok_or(EngineError::StaffNotFound(*sid))?;
            guards.insert(*sid, sched.write_owned().await);
        }

        for (_, staff_id, span) in &moves {
            let guard = &guards[staff_id];
            if let Err(e) = check_no_conflict(guard, span, Some(appointment_id)) {
                metrics::counter!(crate::observability::CONFLICTS_REJECTED_TOTAL).increment(1);
                return Err(e);
            }
        }

        let event = Event::AppointmentRescheduled {
            id: appointment_id,
            moves: moves.clone(),
        };
        self.journal_append(&event).await?;

        for (li_id, staff_id, span) in &moves {
            let li = appt
                .line_items
                .iter_mut()
                .find(|li| li.id == *li_id)
                .expect("move refers to own line item");
            guards
                .get_mut(&li.staff_id)
                .expect("old staff locked")
                .remove_line_item(*li_id);
            li.staff_id = *staff_id;
            li.span = *span;
            guards
                .get_mut(staff_id)
                .expect("new staff locked")
                .insert_interval(StaffInterval {
                    appointment_id,
                    line_item_id: *li_id,
                    span: *span,
                });
        }
        for sid in &staff_ids {
            self.notify.send(*sid, &event);
        }
        Ok(appt.clone())
    }

    /// Move an appointment through its lifecycle. Terminal transitions
    /// release the staff member's time.
    pub async fn transition_status(
        &self,
        appointment_id: Ulid,
        to: BookingStatus,
        by: Option<String>,
    ) -> Result<Appointment, EngineError> {
        let appt_arc = self
            .get_appointment_arc(&appointment_id)
            .ok_or(EngineError::AppointmentNotFound(appointment_id))?;
        let mut appt = appt_arc.write_owned().await;
        let from = appt.status;
        if !from.can_transition(to) {
            return Err(EngineError::InvalidTransition { from, to });
        }

        let at = now_ms();
        let event = Event::StatusChanged {
            id: appointment_id,
            status: to,
            at,
            by: by.clone(),
        };
        self.journal_append(&event).await?;
        apply_status(&mut appt, to, at, by);

        if to.is_terminal() {
            for staff_id in appointment_staff_ids(&appt) {
                if let Some(sched) = self.get_staff(&staff_id) {
                    let mut guard = sched.write().await;
                    guard.remove_appointment(appointment_id);
                }
                self.notify.send(staff_id, &event);
            }
        } else {
            for staff_id in appointment_staff_ids(&appt) {
                self.notify.send(staff_id, &event);
            }
        }
        Ok(appt.clone())
    }

    /// Convenience wrapper: cancel one appointment.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Ulid,
        by: Option<String>,
    ) -> Result<Appointment, EngineError> {
        self.transition_status(appointment_id, BookingStatus::Cancelled, by)
            .await
    }
}
