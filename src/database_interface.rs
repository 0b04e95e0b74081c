use crate::schema::{availability_windows, bookings};
use crate::types::{AvailabilityWindow, Booking, BookingStatus, PaymentStatus, ReminderHorizon};
use crate::{backend::SchedulerBackend, error::SchedulerError};
use chrono::{DateTime, NaiveTime, Utc};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use diesel::sql_types::Text;
use diesel::{Connection, ConnectionError, PgConnection};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::error;
use uuid::Uuid;

/// Exclusion constraint that keeps active bookings of one host disjoint.
const OVERLAP_CONSTRAINT: &str = "bookings_no_overlap";

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = availability_windows)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct WindowRow {
    id: Uuid,
    host_id: Uuid,
    day_of_week: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
    active: bool,
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    host_id: Uuid,
    start_at: DateTime<Utc>,
    end_at: DateTime<Utc>,
    timezone: String,
    status: String,
    payment_status: String,
    notes: Option<String>,
    meeting_link: Option<String>,
    reminder_soon_sent: bool,
    reminder_start_sent: bool,
    created_at: DateTime<Utc>,
}

impl From<&AvailabilityWindow> for WindowRow {
    fn from(window: &AvailabilityWindow) -> Self {
        Self {
            id: window.id,
            host_id: window.host_id,
            day_of_week: i16::from(window.day_of_week),
            start_time: window.start_time,
            end_time: window.end_time,
            active: window.active,
        }
    }
}

impl TryFrom<WindowRow> for AvailabilityWindow {
    type Error = SchedulerError;

    fn try_from(row: WindowRow) -> Result<Self, Self::Error> {
        let day_of_week = u8::try_from(row.day_of_week).map_err(|_| {
            SchedulerError::internal(format!("Window {} has invalid weekday {}", row.id, row.day_of_week))
        })?;
        Ok(Self {
            id: row.id,
            host_id: row.host_id,
            day_of_week,
            start_time: row.start_time,
            end_time: row.end_time,
            active: row.active,
        })
    }
}

impl From<&Booking> for BookingRow {
    fn from(booking: &Booking) -> Self {
        Self {
            id: booking.id,
            user_id: booking.user_id,
            host_id: booking.host_id,
            start_at: booking.start,
            end_at: booking.end,
            timezone: booking.timezone.clone(),
            status: booking.status.as_str().into(),
            payment_status: booking.payment_status.as_str().into(),
            notes: booking.notes.clone(),
            meeting_link: booking.meeting_link.clone(),
            reminder_soon_sent: booking.reminder_soon_sent,
            reminder_start_sent: booking.reminder_start_sent,
            created_at: booking.created_at,
        }
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = SchedulerError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|err| SchedulerError::internal(format!("Booking {}: {err}", row.id)))?;
        let payment_status = row
            .payment_status
            .parse()
            .map_err(|err| SchedulerError::internal(format!("Booking {}: {err}", row.id)))?;
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            host_id: row.host_id,
            start: row.start_at,
            end: row.end_at,
            timezone: row.timezone,
            status,
            payment_status,
            notes: row.notes,
            meeting_link: row.meeting_link,
            reminder_soon_sent: row.reminder_soon_sent,
            reminder_start_sent: row.reminder_start_sent,
            created_at: row.created_at,
        })
    }
}

impl From<DieselError> for SchedulerError {
    fn from(err: DieselError) -> Self {
        match &err {
            DieselError::DatabaseError(_, info)
                if info.constraint_name() == Some(OVERLAP_CONSTRAINT) =>
            {
                SchedulerError::conflict("Timeslot was already booked")
            }
            DieselError::NotFound => SchedulerError::not_found("Record does not exist"),
            _ => {
                error!(?err, "Database request failed");
                SchedulerError::internal("Database error")
            }
        }
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, SchedulerError> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, ConnectionError> {
        let connection = Self::establish_connection(database_url)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn establish_connection(database_url: &str) -> Result<PgConnection, ConnectionError> {
        PgConnection::establish(database_url)
    }

    fn connection(&self) -> Result<MutexGuard<'_, PgConnection>, SchedulerError> {
        self.connection.lock().map_err(|err| {
            error!(?err, "Database connection lock poisoned");
            SchedulerError::internal("Database unavailable")
        })
    }

    fn booking_not_found(id: Uuid) -> SchedulerError {
        SchedulerError::not_found(format!("Booking {id} does not exist"))
    }

    fn update_booking_flag(
        connection: &mut PgConnection,
        id: Uuid,
        horizon: ReminderHorizon,
        from: bool,
        to: bool,
    ) -> Result<usize, SchedulerError> {
        let target = bookings::table
            .filter(bookings::id.eq(id))
            .filter(bookings::status.eq(BookingStatus::Scheduled.as_str()));
        let updated = match horizon {
            ReminderHorizon::Soon => diesel::update(target.filter(bookings::reminder_soon_sent.eq(from)))
                .set(bookings::reminder_soon_sent.eq(to))
                .execute(connection)?,
            ReminderHorizon::Start => diesel::update(target.filter(bookings::reminder_start_sent.eq(from)))
                .set(bookings::reminder_start_sent.eq(to))
                .execute(connection)?,
        };
        Ok(updated)
    }

    /// Serializes writers on `key` until the surrounding transaction ends.
    fn lock_host(connection: &mut PgConnection, key: &str) -> Result<(), SchedulerError> {
        diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind::<Text, _>(key.to_owned())
            .execute(connection)?;
        Ok(())
    }

    fn booking_exists(connection: &mut PgConnection, id: Uuid) -> Result<bool, SchedulerError> {
        let exists = diesel::select(diesel::dsl::exists(bookings::table.find(id)))
            .get_result::<bool>(connection)?;
        Ok(exists)
    }
}

impl SchedulerBackend for DatabaseInterface {
    fn availability_windows(
        &self,
        host_id: Uuid,
        day_of_week: u8,
    ) -> Result<Vec<AvailabilityWindow>, SchedulerError> {
        let mut connection = self.connection()?;
        let rows = availability_windows::table
            .filter(availability_windows::host_id.eq(host_id))
            .filter(availability_windows::day_of_week.eq(i16::from(day_of_week)))
            .filter(availability_windows::active.eq(true))
            .order(availability_windows::start_time.asc())
            .select(WindowRow::as_select())
            .load(&mut *connection)?;
        rows.into_iter().map(AvailabilityWindow::try_from).collect()
    }

    fn host_windows(&self, host_id: Uuid) -> Result<Vec<AvailabilityWindow>, SchedulerError> {
        let mut connection = self.connection()?;
        let rows = availability_windows::table
            .filter(availability_windows::host_id.eq(host_id))
            .order((
                availability_windows::day_of_week.asc(),
                availability_windows::start_time.asc(),
            ))
            .select(WindowRow::as_select())
            .load(&mut *connection)?;
        rows.into_iter().map(AvailabilityWindow::try_from).collect()
    }

    fn add_window(&self, window: AvailabilityWindow) -> Result<(), SchedulerError> {
        let row = WindowRow::from(&window);
        let mut connection = self.connection()?;

        connection.transaction::<_, SchedulerError, _>(|connection| {
            Self::lock_host(connection, &format!("windows:{}", window.host_id))?;

            if window.active {
                let existing = availability_windows::table
                    .filter(availability_windows::host_id.eq(window.host_id))
                    .filter(availability_windows::day_of_week.eq(row.day_of_week))
                    .filter(availability_windows::active.eq(true))
                    .select(WindowRow::as_select())
                    .load(connection)?;
                for existing in existing {
                    if AvailabilityWindow::try_from(existing)?.overlaps(&window) {
                        return Err(SchedulerError::conflict(
                            "Window overlaps an existing availability window",
                        ));
                    }
                }
            }

            diesel::insert_into(availability_windows::table)
                .values(&row)
                .execute(connection)?;
            Ok(())
        })
    }

    fn remove_window(&self, id: Uuid) -> Result<(), SchedulerError> {
        let mut connection = self.connection()?;
        let removed = diesel::delete(availability_windows::table.find(id)).execute(&mut *connection)?;
        if removed == 0 {
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
        let mut connection = self.connection()?;
        let rows = bookings::table
            .filter(bookings::host_id.eq(host_id))
            .filter(bookings::status.ne(BookingStatus::Cancelled.as_str()))
            .filter(bookings::start_at.lt(to))
            .filter(bookings::end_at.gt(from))
            .order(bookings::start_at.asc())
            .select(BookingRow::as_select())
            .load(&mut *connection)?;
        into_bookings(rows)
    }

    fn insert_booking_if_free(&self, booking: Booking) -> Result<Booking, SchedulerError> {
        let row = BookingRow::from(&booking);
        let mut connection = self.connection()?;

        connection.transaction::<_, SchedulerError, _>(|connection| {
            Self::lock_host(connection, &format!("bookings:{}", booking.host_id))?;

            let overlapping: i64 = bookings::table
                .filter(bookings::host_id.eq(booking.host_id))
                .filter(bookings::status.ne(BookingStatus::Cancelled.as_str()))
                .filter(bookings::start_at.lt(booking.end))
                .filter(bookings::end_at.gt(booking.start))
                .count()
                .get_result(connection)?;
            if overlapping > 0 {
                return Err(SchedulerError::conflict("Timeslot was already booked"));
            }

            diesel::insert_into(bookings::table)
                .values(&row)
                .execute(connection)?;
            Ok(())
        })?;

        Ok(booking)
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, SchedulerError> {
        let mut connection = self.connection()?;
        bookings::table
            .find(id)
            .select(BookingRow::as_select())
            .first(&mut *connection)
            .optional()?
            .map(Booking::try_from)
            .transpose()
    }

    fn cancel_booking(&self, id: Uuid) -> Result<(Booking, bool), SchedulerError> {
        let mut connection = self.connection()?;
        let cancelled = diesel::update(
            bookings::table
                .filter(bookings::id.eq(id))
                .filter(bookings::status.eq(BookingStatus::Scheduled.as_str())),
        )
        .set(bookings::status.eq(BookingStatus::Cancelled.as_str()))
        .returning(BookingRow::as_returning())
        .get_result(&mut *connection)
        .optional()?;
        if let Some(row) = cancelled {
            return Ok((row.try_into()?, true));
        }

        let booking = bookings::table
            .find(id)
            .select(BookingRow::as_select())
            .first(&mut *connection)
            .optional()?
            .ok_or_else(|| Self::booking_not_found(id))?
            .try_into()?;
        Ok((booking, false))
    }

    fn set_payment_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Booking, SchedulerError> {
        let mut connection = self.connection()?;
        diesel::update(bookings::table.find(id))
            .set(bookings::payment_status.eq(payment_status.as_str()))
            .returning(BookingRow::as_returning())
            .get_result(&mut *connection)
            .optional()?
            .ok_or_else(|| Self::booking_not_found(id))?
            .try_into()
    }

    fn user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, SchedulerError> {
        let mut connection = self.connection()?;
        let rows = bookings::table
            .filter(bookings::user_id.eq(user_id))
            .order(bookings::start_at.asc())
            .select(BookingRow::as_select())
            .load(&mut *connection)?;
        into_bookings(rows)
    }

    fn bookings_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Booking>, usize), SchedulerError> {
        let mut connection = self.connection()?;
        let total: i64 = bookings::table.count().get_result(&mut *connection)?;
        let rows = bookings::table
            .order((bookings::start_at.desc(), bookings::id.asc()))
            .offset(i64::try_from(offset).unwrap_or(i64::MAX))
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .select(BookingRow::as_select())
            .load(&mut *connection)?;
        Ok((into_bookings(rows)?, usize::try_from(total).unwrap_or_default()))
    }

    fn scheduled_bookings_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, SchedulerError> {
        let mut connection = self.connection()?;
        let rows = bookings::table
            .filter(bookings::status.eq(BookingStatus::Scheduled.as_str()))
            .filter(bookings::start_at.gt(from))
            .filter(bookings::start_at.le(to))
            .order(bookings::start_at.asc())
            .select(BookingRow::as_select())
            .load(&mut *connection)?;
        into_bookings(rows)
    }

    fn claim_reminder(&self, id: Uuid, horizon: ReminderHorizon) -> Result<bool, SchedulerError> {
        let mut connection = self.connection()?;
        if Self::update_booking_flag(&mut connection, id, horizon, false, true)? == 1 {
            return Ok(true);
        }
        if !Self::booking_exists(&mut connection, id)? {
            return Err(Self::booking_not_found(id));
        }
        Ok(false)
    }

    fn release_reminder(&self, id: Uuid, horizon: ReminderHorizon) -> Result<(), SchedulerError> {
        let mut connection = self.connection()?;
        Self::update_booking_flag(&mut connection, id, horizon, true, false)?;
        Ok(())
    }
}
