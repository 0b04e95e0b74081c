use crate::{
    backend::SchedulerBackend,
    error::SchedulerError,
    types::{AvailabilityWindow, Booking, BookingStatus, PaymentStatus, ReminderHorizon},
};
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, error};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    windows: HashMap<Uuid, AvailabilityWindow>,
    bookings: HashMap<Uuid, Booking>,
}

/// Impersistent backend. Both tables sit behind one lock so that the
/// overlap check and the insert of a booking happen as one step.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    tables: Arc<Mutex<Tables>>,
}

impl LocalStore {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, SchedulerError> {
        self.tables.lock().map_err(|err| {
            error!(?err, "Local store lock poisoned");
            SchedulerError::internal("Local store unavailable")
        })
    }

    fn update_booking<F>(&self, id: Uuid, update: F) -> Result<Booking, SchedulerError>
    where
        F: FnOnce(&mut Booking),
    {
        let mut tables = self.tables()?;
        let booking = tables
            .bookings
            .get_mut(&id)
            .ok_or_else(|| SchedulerError::not_found(format!("Booking {id} does not exist")))?;
        update(booking);
        Ok(booking.clone())
    }
}

fn sorted_by_start(mut bookings: Vec<Booking>) -> Vec<Booking> {
    bookings.sort_unstable_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));
    bookings
}

impl SchedulerBackend for LocalStore {
    fn availability_windows(
        &self,
        host_id: Uuid,
        day_of_week: u8,
    ) -> Result<Vec<AvailabilityWindow>, SchedulerError> {
        let mut windows: Vec<AvailabilityWindow> = self
            .tables()?
            .windows
            .values()
            .filter(|window| {
                window.host_id == host_id && window.day_of_week == day_of_week && window.active
            })
            .cloned()
            .collect();
        windows.sort_unstable_by_key(|window| window.start_time);
        Ok(windows)
    }

    fn host_windows(&self, host_id: Uuid) -> Result<Vec<AvailabilityWindow>, SchedulerError> {
        let mut windows: Vec<AvailabilityWindow> = self
            .tables()?
            .windows
            .values()
            .filter(|window| window.host_id == host_id)
            .cloned()
            .collect();
        windows.sort_unstable_by_key(|window| (window.day_of_week, window.start_time));
        Ok(windows)
    }

    fn add_window(&self, window: AvailabilityWindow) -> Result<(), SchedulerError> {
        let mut tables = self.tables()?;
        let overlapping = window.active
            && tables
                .windows
                .values()
                .any(|existing| existing.active && existing.overlaps(&window));
        if overlapping {
            return Err(SchedulerError::conflict(
                "Window overlaps an existing availability window",
            ));
        }

        debug!(window_id = %window.id, host_id = %window.host_id, "Adding availability window");
        tables.windows.insert(window.id, window);
        Ok(())
    }

    fn remove_window(&self, id: Uuid) -> Result<(), SchedulerError> {
        if self.tables()?.windows.remove(&id).is_none() {
            return Err(SchedulerError::not_found(format!(
                "Availability window {id} does not exist"
            )));
        }
        Ok(())
    }

    fn active_bookings_between(
        &self,
        host_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, SchedulerError> {
        let bookings = self
            .tables()?
            .bookings
            .values()
            .filter(|booking| {
                booking.host_id == host_id && booking.is_active() && booking.overlaps(from, to)
            })
            .cloned()
            .collect();
        Ok(sorted_by_start(bookings))
    }

    fn insert_booking_if_free(&self, booking: Booking) -> Result<Booking, SchedulerError> {
        let mut tables = self.tables()?;
        let taken = tables.bookings.values().any(|existing| {
            existing.host_id == booking.host_id
                && existing.is_active()
                && existing.overlaps(booking.start, booking.end)
        });
        if taken {
            return Err(SchedulerError::conflict("Timeslot was already booked"));
        }
        tables.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, SchedulerError> {
        Ok(self.tables()?.bookings.get(&id).cloned())
    }

    fn cancel_booking(&self, id: Uuid) -> Result<(Booking, bool), SchedulerError> {
        let mut cancelled_now = false;
        let booking = self.update_booking(id, |booking| {
            cancelled_now = booking.status == BookingStatus::Scheduled;
            booking.status = BookingStatus::Cancelled;
        })?;
        Ok((booking, cancelled_now))
    }

    fn set_payment_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Booking, SchedulerError> {
        self.update_booking(id, |booking| booking.payment_status = payment_status)
    }

    fn user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, SchedulerError> {
        let bookings = self
            .tables()?
            .bookings
            .values()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_by_start(bookings))
    }

    fn bookings_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Booking>, usize), SchedulerError> {
        let mut bookings: Vec<Booking> = self.tables()?.bookings.values().cloned().collect();
        let total = bookings.len();
        bookings.sort_unstable_by(|a, b| b.start.cmp(&a.start).then(a.id.cmp(&b.id)));
        let page = bookings.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    fn scheduled_bookings_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, SchedulerError> {
        let bookings = self
            .tables()?
            .bookings
            .values()
            .filter(|booking| {
                booking.status == BookingStatus::Scheduled
                    && booking.start > from
                    && booking.start <= to
            })
            .cloned()
            .collect();
        Ok(sorted_by_start(bookings))
    }

    fn claim_reminder(&self, id: Uuid, horizon: ReminderHorizon) -> Result<bool, SchedulerError> {
        let mut tables = self.tables()?;
        match tables.bookings.get_mut(&id) {
            Some(booking)
                if booking.status == BookingStatus::Scheduled && !booking.reminder_sent(horizon) =>
            {
                booking.set_reminder_sent(horizon, true);
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(SchedulerError::not_found(format!("Booking {id} does not exist"))),
        }
    }

    fn release_reminder(&self, id: Uuid, horizon: ReminderHorizon) -> Result<(), SchedulerError> {
        self.update_booking(id, |booking| booking.set_reminder_sent(horizon, false))
            .map(|_| ())
    }
}
