use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    backend::SchedulerBackend,
    error::SchedulerError,
    scheduler::WindowRequest,
    types::{
        hhmm, AvailabilityWindow, Booking, BookingStatus, PaymentStatus, ReminderHorizon,
    },
};

/// A Monday far enough in the future for every fixed test clock.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

/// The Sunday before [`monday`], 12:00 UTC.
pub fn sunday_noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 6, 12, 0, 0).unwrap()
}

pub fn time(raw: &str) -> NaiveTime {
    hhmm::parse(raw).unwrap()
}

/// Like [`time`], but also accepts `24:00`.
pub fn end_time(raw: &str) -> NaiveTime {
    hhmm::end::parse(raw).unwrap()
}

pub fn window(host_id: Uuid, day_of_week: u8, start: &str, end: &str) -> AvailabilityWindow {
    AvailabilityWindow {
        id: Uuid::new_v4(),
        host_id,
        day_of_week,
        start_time: time(start),
        end_time: end_time(end),
        active: true,
    }
}

pub fn window_request(day_of_week: u8, start: &str, end: &str) -> WindowRequest {
    WindowRequest {
        day_of_week,
        start_time: time(start),
        end_time: end_time(end),
        active: true,
    }
}

pub fn booking_between(host_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> Booking {
    Booking {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        host_id,
        start,
        end,
        timezone: "UTC".into(),
        status: BookingStatus::Scheduled,
        payment_status: PaymentStatus::Pending,
        notes: None,
        meeting_link: None,
        reminder_soon_sent: false,
        reminder_start_sent: false,
        created_at: start - Duration::days(1),
    }
}

pub struct MockSchedulerBackendInner {
    pub success: AtomicBool,
    pub calls_to_availability_windows: AtomicU64,
    pub calls_to_add_window: AtomicU64,
    pub calls_to_remove_window: AtomicU64,
    pub calls_to_insert_booking: AtomicU64,
    pub calls_to_cancel_booking: AtomicU64,
    pub calls_to_bookings_page: AtomicU64,
    pub calls_to_set_payment_status: AtomicU64,
    pub calls_to_claim_reminder: AtomicU64,
    pub bookings: Mutex<HashMap<Uuid, Booking>>,
}

#[derive(Clone)]
pub struct MockSchedulerBackend(pub Arc<MockSchedulerBackendInner>);

impl MockSchedulerBackendInner {
    fn new() -> Self {
        Self {
            success: AtomicBool::new(true),
            calls_to_availability_windows: AtomicU64::default(),
            calls_to_add_window: AtomicU64::default(),
            calls_to_remove_window: AtomicU64::default(),
            calls_to_insert_booking: AtomicU64::default(),
            calls_to_cancel_booking: AtomicU64::default(),
            calls_to_bookings_page: AtomicU64::default(),
            calls_to_set_payment_status: AtomicU64::default(),
            calls_to_claim_reminder: AtomicU64::default(),
            bookings: Mutex::default(),
        }
    }
}

impl MockSchedulerBackend {
    pub fn new() -> Self {
        Self(Arc::new(MockSchedulerBackendInner::new()))
    }

    pub fn calls(&self, operation: &str) -> u64 {
        let counter = match operation {
            "availability_windows" => &self.0.calls_to_availability_windows,
            "add_window" => &self.0.calls_to_add_window,
            "remove_window" => &self.0.calls_to_remove_window,
            "insert_booking" => &self.0.calls_to_insert_booking,
            "cancel_booking" => &self.0.calls_to_cancel_booking,
            "bookings_page" => &self.0.calls_to_bookings_page,
            "set_payment_status" => &self.0.calls_to_set_payment_status,
            "claim_reminder" => &self.0.calls_to_claim_reminder,
            _ => unimplemented!(),
        };
        counter.load(Ordering::SeqCst)
    }

    fn result(&self) -> Result<(), SchedulerError> {
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(SchedulerError::internal("Supposed to fail")),
        }
    }

    fn stored_or_stub(&self, id: Uuid) -> Booking {
        self.0
            .bookings
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| {
                let mut booking =
                    booking_between(Uuid::nil(), sunday_noon(), sunday_noon() + Duration::hours(1));
                booking.id = id;
                booking
            })
    }
}

impl SchedulerBackend for MockSchedulerBackend {
    fn availability_windows(
        &self,
        _host_id: Uuid,
        _day_of_week: u8,
    ) -> Result<Vec<AvailabilityWindow>, SchedulerError> {
        self.0
            .calls_to_availability_windows
            .fetch_add(1, Ordering::SeqCst);
        self.result().map(|_| vec![])
    }

    fn host_windows(&self, host_id: Uuid) -> Result<Vec<AvailabilityWindow>, SchedulerError> {
        self.result()
            .map(|_| vec![window(host_id, 1, "08:00", "18:00")])
    }

    fn add_window(&self, _window: AvailabilityWindow) -> Result<(), SchedulerError> {
        self.0.calls_to_add_window.fetch_add(1, Ordering::SeqCst);
        self.result()
    }

    fn remove_window(&self, _id: Uuid) -> Result<(), SchedulerError> {
        self.0.calls_to_remove_window.fetch_add(1, Ordering::SeqCst);
        self.result()
    }

    fn active_bookings_between(
        &self,
        _host_id: Uuid,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, SchedulerError> {
        self.result().map(|_| vec![])
    }

    fn insert_booking_if_free(&self, booking: Booking) -> Result<Booking, SchedulerError> {
        self.0.calls_to_insert_booking.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        self.0
            .bookings
            .lock()
            .unwrap()
            .insert(booking.id, booking.clone());
        Ok(booking)
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, SchedulerError> {
        self.result()?;
        Ok(self.0.bookings.lock().unwrap().get(&id).cloned())
    }

    fn cancel_booking(&self, id: Uuid) -> Result<(Booking, bool), SchedulerError> {
        self.0.calls_to_cancel_booking.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        let mut booking = self.stored_or_stub(id);
        let cancelled_now = booking.status == BookingStatus::Scheduled;
        booking.status = BookingStatus::Cancelled;
        Ok((booking, cancelled_now))
    }

    fn set_payment_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Booking, SchedulerError> {
        self.0
            .calls_to_set_payment_status
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        let mut booking = self.stored_or_stub(id);
        booking.payment_status = payment_status;
        Ok(booking)
    }

    fn user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, SchedulerError> {
        self.result()?;
        Ok(self
            .0
            .bookings
            .lock()
            .unwrap()
            .values()
            .filter(|booking| booking.user_id == user_id)
            .cloned()
            .collect())
    }

    fn bookings_page(
        &self,
        _offset: usize,
        _limit: usize,
    ) -> Result<(Vec<Booking>, usize), SchedulerError> {
        self.0.calls_to_bookings_page.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        let bookings: Vec<Booking> = self.0.bookings.lock().unwrap().values().cloned().collect();
        let total = bookings.len();
        Ok((bookings, total))
    }

    fn scheduled_bookings_starting_between(
        &self,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, SchedulerError> {
        self.result().map(|_| vec![])
    }

    fn claim_reminder(&self, _id: Uuid, _horizon: ReminderHorizon) -> Result<bool, SchedulerError> {
        self.0.calls_to_claim_reminder.fetch_add(1, Ordering::SeqCst);
        self.result().map(|_| true)
    }

    fn release_reminder(&self, _id: Uuid, _horizon: ReminderHorizon) -> Result<(), SchedulerError> {
        self.result()
    }
}
