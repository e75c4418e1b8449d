use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::check_no_conflict;
use super::layout::{LayoutAssignment, layout_day};
use super::{Engine, EngineError};

/// One booked interval with its render placement, for calendar views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaidOutInterval {
    pub interval: StaffInterval,
    pub column: usize,
    pub total_columns: usize,
}

impl Engine {
    /// Would booking `[start, end)` for this staff member collide with an
    /// existing non-terminal booking? `exclude` skips one appointment's own
    /// intervals (the reschedule case). Unknown staff have no bookings.
    pub async fn has_conflict(
        &self,
        staff_id: Ulid,
        start: Ms,
        end: Ms,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        if end <= start {
            return Err(EngineError::LimitExceeded("span end must be after start"));
        }
        let Some(sched) = self.get_staff(&staff_id) else {
            return Ok(false);
        };
        let guard = sched.read().await;
        Ok(check_no_conflict(&guard, &Span::new(start, end), exclude).is_err())
    }

    /// All intervals occupying this staff member's time within the window.
    /// The schedule holds only non-terminal bookings, so everything returned
    /// is active.
    pub async fn fetch_active_intervals(
        &self,
        staff_id: Ulid,
        range: Span,
    ) -> Result<Vec<StaffInterval>, EngineError> {
        if range.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let Some(sched) = self.get_staff(&staff_id) else {
            return Ok(Vec::new());
        };
        let guard = sched.read().await;
        Ok(guard.overlapping(&range).copied().collect())
    }

    /// Fetch one staff member's bookings in the window and lay them out into
    /// render columns.
    pub async fn day_layout(
        &self,
        staff_id: Ulid,
        window: Span,
    ) -> Result<Vec<LaidOutInterval>, EngineError> {
        let intervals = self.fetch_active_intervals(staff_id, window).await?;
        let spans: Vec<Span> = intervals.iter().map(|i| i.span).collect();
        let layout: Vec<LayoutAssignment> = layout_day(&spans);
        Ok(intervals
            .into_iter()
            .zip(layout)
            .map(|(interval, a)| LaidOutInterval {
                interval,
                column: a.column,
                total_columns: a.total_columns,
            })
            .collect())
    }

    pub async fn get_appointment(&self, id: Ulid) -> Option<Appointment> {
        let arc = self.get_appointment_arc(&id)?;
        let guard = arc.read().await;
        Some(guard.clone())
    }

    pub async fn find_by_reference(&self, reference: &str) -> Option<Appointment> {
        let id = *self.by_reference.get(reference)?.value();
        self.get_appointment(id).await
    }

    /// Members of a recurring series, in occurrence order.
    pub async fn series_appointments(&self, series_id: Ulid) -> Vec<Appointment> {
        let ids: Vec<Ulid> = self
            .series
            .get(&series_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut members = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(appt) = self.get_appointment(id).await {
                members.push(appt);
            }
        }
        members.sort_by_key(|a| a.start());
        members
    }

    pub async fn participants(&self, appointment_id: Ulid) -> Result<Vec<Ulid>, EngineError> {
        let arc = self
            .get_appointment_arc(&appointment_id)
            .ok_or(EngineError::AppointmentNotFound(appointment_id))?;
        let guard = arc.read().await;
        Ok(guard.participants.clone())
    }

    /// Snapshot of the staff registry. Waits for in-flight bookings: a writer
    /// holds its schedule lock across the journal fsync, so this must block,
    /// not assume the lock is free. Arcs are collected first so no DashMap
    /// shard lock is held across an await.
    pub async fn list_staff(&self) -> Vec<StaffInfo> {
        let scheds: Vec<_> = self.staff.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(scheds.len());
        for sched in scheds {
            let guard = sched.read().await;
            out.push(StaffInfo {
                id: guard.id,
                name: guard.name.clone(),
                booked_intervals: guard.intervals.len(),
            });
        }
        out
    }
}
