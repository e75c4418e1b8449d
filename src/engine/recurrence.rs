use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::booking::{NewAppointment, assemble, service_span, validate_notes};
use super::conflict::{check_no_conflict, now_ms, validate_span, validate_start};
use super::{Engine, EngineError, apply_status};

/// Outcome of expanding a recurring series. Occurrences whose slot was
/// already taken are reported in `skipped` rather than created.
#[derive(Debug)]
pub struct SeriesCreation {
    pub series_id: Ulid,
    pub occurrences: Vec<Appointment>,
    /// Start times that conflicted with existing bookings and were skipped.
    pub skipped: Vec<Ms>,
}

impl Engine {
    /// Expand a recurring series into independent appointments sharing one
    /// series id. Candidate slots step by the fixed cadence while the start
    /// is `<= end_date`, bounded by `MAX_SERIES_OCCURRENCES` candidates; a
    /// far-future end date yields the cap's worth, not an error.
    ///
    /// The whole expansion runs under the staff schedule's write lock, so a
    /// concurrent booking cannot land between two occurrences. Conflicting
    /// candidates are skipped, not fatal — the caller sees exactly which
    /// start times were dropped.
    pub async fn create_series(
        &self,
        client_id: Ulid,
        service_id: Ulid,
        staff_id: Ulid,
        first_start: Ms,
        rule: RecurrenceRule,
        end_date: Ms,
        notes: Option<String>,
    ) -> Result<SeriesCreation, EngineError> {
        validate_notes(&notes)?;
        validate_start(first_start)?;
        let svc = self
            .catalog
            .get_service(service_id)
            .await
            .ok_or(EngineError::ServiceNotFound(service_id))?;
        validate_span(&service_span(first_start, &svc))?;

        let sched = self
            .get_staff(&staff_id)
            .ok_or(EngineError::StaffNotFound(staff_id))?;
        let mut guard = sched.write().await;

        let series_id = Ulid::new();
        let mut occurrences = Vec::new();
        let mut skipped = Vec::new();

        let mut start = first_start;
        let mut candidates = 0usize;
        while start <= end_date && candidates < MAX_SERIES_OCCURRENCES {
            candidates += 1;
            let span = service_span(start, &svc);
            if validate_span(&span).is_err() {
                // Ran past the representable window — stop expanding.
                break;
            }
            if guard.intervals.len() >= MAX_INTERVALS_PER_STAFF {
                return Err(EngineError::LimitExceeded("too many intervals on staff"));
            }

            if check_no_conflict(&guard, &span, None).is_err() {
                skipped.push(start);
                start += rule.step_ms();
                continue;
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
                NewAppointment {
                    series: Some((series_id, rule, end_date)),
                    ..NewAppointment::single(client_id, notes.clone())
                },
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
            occurrences.push(appt);

            start += rule.step_ms();
        }

        metrics::counter!(crate::observability::SERIES_CREATED_TOTAL).increment(1);
        tracing::info!(
            %series_id,
            created = occurrences.len(),
            skipped = skipped.len(),
            "recurring series expanded"
        );
        Ok(SeriesCreation {
            series_id,
            occurrences,
            skipped,
        })
    }

    /// Bulk-cancel a series from `from` onward (default: everything).
    /// A bulk status transition, not a deletion — members keep their rows and
    /// history; already-terminal members are left untouched. Returns how many
    /// appointments were cancelled.
    pub async fn cancel_series(
        &self,
        series_id: Ulid,
        from: Option<Ms>,
        by: Option<String>,
    ) -> Result<usize, EngineError> {
        let member_ids: Vec<Ulid> = self
            .series
            .get(&series_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();

        let from = from.unwrap_or(Ms::MIN);
        let mut cancelled = 0usize;
        for id in member_ids {
            let Some(appt_arc) = self.get_appointment_arc(&id) else {
                continue;
            };
            let mut appt = appt_arc.write_owned().await;
            if appt.start() < from || appt.status.is_terminal() {
                continue;
            }

            let at = now_ms();
            let event = Event::StatusChanged {
                id,
                status: BookingStatus::Cancelled,
                at,
                by: by.clone(),
            };
            self.journal_append(&event).await?;
            apply_status(&mut appt, BookingStatus::Cancelled, at, by.clone());
            for staff_id in super::appointment_staff_ids(&appt) {
                if let Some(sched) = self.get_staff(&staff_id) {
                    let mut sg = sched.write().await;
                    sg.remove_appointment(id);
                }
                self.notify.send(staff_id, &event);
            }
            cancelled += 1;
        }

        tracing::info!(%series_id, cancelled, "series cancelled");
        Ok(cancelled)
    }
}
