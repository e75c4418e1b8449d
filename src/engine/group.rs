use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::booking::{NewAppointment, assemble, service_span, validate_notes};
use super::conflict::{check_no_conflict, now_ms, validate_span, validate_start};
use super::{Engine, EngineError};

impl Engine {
    /// Open a capacity-bounded group session. The session occupies its staff
    /// member's time exactly like a normal booking — one line item, same
    /// conflict check — while attendees are tracked in the roster.
    pub async fn create_group_session(
        &self,
        service_id: Ulid,
        staff_id: Ulid,
        start: Ms,
        max_participants: u32,
        initial_client_ids: &[Ulid],
        notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        if max_participants == 0 || max_participants > MAX_PARTICIPANT_LIMIT {
            return Err(EngineError::LimitExceeded("max_participants out of range"));
        }
        if initial_client_ids.len() as u32 > max_participants {
            return Err(EngineError::GroupFull(max_participants));
        }
        for (i, client) in initial_client_ids.iter().enumerate() {
            if initial_client_ids[..i].contains(client) {
                return Err(EngineError::AlreadyJoined(*client));
            }
        }
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
            NewAppointment {
                client_id: None,
                notes,
                is_group: true,
                max_participants: Some(max_participants),
                participants: initial_client_ids.to_vec(),
                series: None,
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
        Ok(appt)
    }

    /// Join a client to a group session. The roster check and insert happen
    /// under the appointment's write lock, so concurrent joins at the
    /// capacity boundary serialize and exactly one wins the last seat.
    /// Returns the roster size after joining.
    pub async fn add_participant(
        &self,
        appointment_id: Ulid,
        client_id: Ulid,
    ) -> Result<usize, EngineError> {
        let appt_arc = self
            .get_appointment_arc(&appointment_id)
            .ok_or(EngineError::AppointmentNotFound(appointment_id))?;
        let mut appt = appt_arc.write_owned().await;
        if !appt.is_group {
            return Err(EngineError::NotAGroupSession(appointment_id));
        }
        if appt.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: appt.status,
                to: appt.status,
            });
        }
        if appt.participants.contains(&client_id) {
            return Err(EngineError::AlreadyJoined(client_id));
        }
        let max = appt.max_participants.unwrap_or(0);
        if appt.participants.len() as u32 >= max {
            metrics::counter!(crate::observability::GROUP_FULL_REJECTED_TOTAL).increment(1);
            return Err(EngineError::GroupFull(max));
        }

        let event = Event::ParticipantJoined {
            appointment_id,
            client_id,
        };
        self.journal_append(&event).await?;
        appt.participants.push(client_id);
        for staff_id in super::appointment_staff_ids(&appt) {
            self.notify.send(staff_id, &event);
        }
        metrics::counter!(crate::observability::PARTICIPANTS_JOINED_TOTAL).increment(1);
        Ok(appt.participants.len())
    }

    /// Remove a client from a group session's roster, freeing a seat.
    /// Removing a client who is not on the roster is a no-op.
    pub async fn remove_participant(
        &self,
        appointment_id: Ulid,
        client_id: Ulid,
    ) -> Result<(), EngineError> {
        let appt_arc = self
            .get_appointment_arc(&appointment_id)
            .ok_or(EngineError::AppointmentNotFound(appointment_id))?;
        let mut appt = appt_arc.write_owned().await;
        if !appt.is_group {
            return Err(EngineError::NotAGroupSession(appointment_id));
        }
        if !appt.participants.contains(&client_id) {
            return Ok(());
        }

        let event = Event::ParticipantLeft {
            appointment_id,
            client_id,
        };
        self.journal_append(&event).await?;
        appt.participants.retain(|c| *c != client_id);
        for staff_id in super::appointment_staff_ids(&appt) {
            self.notify.send(staff_id, &event);
        }
        Ok(())
    }
}
