use crate::{
    backend::SchedulerBackend,
    configuration::Configuration,
    error::SchedulerError,
    notifier::Notifier,
    slots,
    types::{
        day_span, hhmm, AvailabilityWindow, Booking, BookingEvent, BookingEventKind, BookingPage,
        BookingStatus, Caller, PaymentStatus, ReminderHorizon, Slot, SweepReport,
    },
};
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

lazy_static! {
    // IANA zone names ("Europe/Vienna"), UTC/GMT or a plain "+01:00" offset.
    static ref TIMEZONE_PATTERN: Regex = Regex::new(
        r"^(?:UTC|GMT|[A-Za-z]+(?:/[A-Za-z0-9_+\-]+){1,2}|[+-](?:0\d|1[0-4]):[0-5]\d)$"
    )
    .expect("timezone pattern is valid");
}

fn validate_timezone(timezone: &str) -> Result<(), ValidationError> {
    if TIMEZONE_PATTERN.is_match(timezone) {
        Ok(())
    } else {
        Err(ValidationError::new("timezone"))
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WindowRequest {
    #[validate(range(max = 6))]
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm::end")]
    pub end_time: NaiveTime,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub host_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[validate(custom(function = "validate_timezone"))]
    pub timezone: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub slot_length: Duration,
    pub utc_offset: FixedOffset,
    pub reminder_lead: Duration,
    pub reminder_grace: Duration,
    pub meeting_base_url: Option<String>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            slot_length: Duration::minutes(60),
            utc_offset: Utc.fix(),
            reminder_lead: Duration::minutes(30),
            reminder_grace: Duration::minutes(5),
            meeting_base_url: None,
        }
    }
}

impl SchedulerSettings {
    pub fn from_configuration<C: Configuration>(configuration: &C) -> Self {
        Self {
            slot_length: configuration.slot_length(),
            utc_offset: configuration.utc_offset(),
            reminder_lead: configuration.reminder_lead(),
            reminder_grace: configuration.reminder_grace(),
            meeting_base_url: configuration.meeting_base_url(),
        }
    }
}

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Booking rules on top of a [`SchedulerBackend`]. Every operation takes the
/// host explicitly.
#[derive(Clone)]
pub struct Scheduler<B: SchedulerBackend> {
    backend: B,
    notifier: Arc<dyn Notifier>,
    settings: SchedulerSettings,
    clock: Clock,
    events: Arc<watch::Sender<Option<BookingEvent>>>,
}

impl<B: SchedulerBackend> Scheduler<B> {
    pub fn new(backend: B, notifier: Arc<dyn Notifier>, settings: SchedulerSettings) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            backend,
            notifier,
            settings,
            clock: Arc::new(Utc::now),
            events: Arc::new(sender),
        }
    }

    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Latest booking event. The stream starts with the current value.
    pub fn booking_events(&self) -> WatchStream<Option<BookingEvent>> {
        WatchStream::new(self.events.subscribe())
    }

    fn publish(&self, kind: BookingEventKind, booking: &Booking) {
        self.events.send_replace(Some(BookingEvent {
            kind,
            booking: booking.clone(),
        }));
    }

    pub fn available_slots(&self, host_id: Uuid, date: NaiveDate) -> Result<Vec<Slot>, SchedulerError> {
        let day_of_week = date.weekday().num_days_from_sunday() as u8;
        let windows = self.backend.availability_windows(host_id, day_of_week)?;
        if windows.is_empty() {
            return Ok(vec![]);
        }

        let (day_start, day_end) = slots::day_bounds(date, self.settings.utc_offset)
            .ok_or_else(|| SchedulerError::internal(format!("Cannot resolve day bounds of {date}")))?;
        let bookings = self
            .backend
            .active_bookings_between(host_id, day_start, day_end)?;

        Ok(slots::compute_slots(
            date,
            self.settings.utc_offset,
            &windows,
            &bookings,
            self.settings.slot_length,
            self.now(),
        ))
    }

    pub fn create_booking(
        &self,
        user_id: Uuid,
        request: CreateBookingRequest,
    ) -> Result<Booking, SchedulerError> {
        request.validate()?;
        if request.start >= request.end {
            return Err(SchedulerError::validation("Booking must end after it starts"));
        }
        let now = self.now();
        if request.start <= now {
            return Err(SchedulerError::validation("Timeslot already passed"));
        }
        let payment_status = match request.payment_status {
            None => PaymentStatus::Pending,
            Some(status @ (PaymentStatus::Pending | PaymentStatus::Waived)) => status,
            Some(_) => {
                return Err(SchedulerError::validation(
                    "Payment can only be confirmed by an administrator",
                ))
            }
        };

        if self.backend.host_windows(request.host_id)?.is_empty() {
            return Err(SchedulerError::not_found(format!(
                "Host {} has no availability",
                request.host_id
            )));
        }

        let id = Uuid::new_v4();
        let meeting_link = self
            .settings
            .meeting_base_url
            .as_ref()
            .map(|base| format!("{}/{id}", base.trim_end_matches('/')));

        let booking = self.backend.insert_booking_if_free(Booking {
            id,
            user_id,
            host_id: request.host_id,
            start: request.start,
            end: request.end,
            timezone: request.timezone,
            status: BookingStatus::Scheduled,
            payment_status,
            notes: request.notes.filter(|notes| !notes.trim().is_empty()),
            meeting_link,
            reminder_soon_sent: false,
            reminder_start_sent: false,
            created_at: now,
        })?;
        info!(booking_id = %booking.id, host_id = %booking.host_id, start = %booking.start, "Booking created");

        if let Err(err) = self.notifier.booking_confirmed(&booking) {
            warn!(booking_id = %booking.id, %err, "Failed to send booking confirmation");
        }
        self.publish(BookingEventKind::Created, &booking);
        Ok(booking)
    }

    fn ensure_access(caller: Caller, booking: &Booking) -> Result<(), SchedulerError> {
        match caller {
            Caller::Admin => Ok(()),
            Caller::User(user_id) if user_id == booking.user_id => Ok(()),
            Caller::User(_) => Err(SchedulerError::unauthorized(
                "Booking belongs to another user",
            )),
        }
    }

    pub fn booking(&self, caller: Caller, id: Uuid) -> Result<Booking, SchedulerError> {
        let booking = self
            .backend
            .booking(id)?
            .ok_or_else(|| SchedulerError::not_found(format!("Booking {id} does not exist")))?;
        Self::ensure_access(caller, &booking)?;
        Ok(booking)
    }

    /// Cancelling an already cancelled booking returns it unchanged. Only the
    /// call that flips the status notifies and publishes.
    pub fn cancel_booking(&self, caller: Caller, id: Uuid) -> Result<Booking, SchedulerError> {
        self.booking(caller, id)?;

        let (booking, cancelled_now) = self.backend.cancel_booking(id)?;
        if !cancelled_now {
            return Ok(booking);
        }
        info!(booking_id = %booking.id, "Booking cancelled");
        if let Err(err) = self.notifier.booking_cancelled(&booking) {
            warn!(booking_id = %booking.id, %err, "Failed to send cancellation notice");
        }
        self.publish(BookingEventKind::Cancelled, &booking);
        Ok(booking)
    }

    pub fn user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, SchedulerError> {
        self.backend.user_bookings(user_id)
    }

    pub fn bookings_page(
        &self,
        page: Option<usize>,
        per_page: Option<usize>,
    ) -> Result<BookingPage, SchedulerError> {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let (items, total) = self
            .backend
            .bookings_page((page - 1).saturating_mul(per_page), per_page)?;
        Ok(BookingPage {
            items,
            page,
            per_page,
            total,
        })
    }

    pub fn set_payment_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Booking, SchedulerError> {
        let booking = self.backend.set_payment_status(id, payment_status)?;
        info!(booking_id = %booking.id, payment_status = payment_status.as_str(), "Payment status updated");
        self.publish(BookingEventKind::PaymentUpdated, &booking);
        Ok(booking)
    }

    pub fn host_windows(&self, host_id: Uuid) -> Result<Vec<AvailabilityWindow>, SchedulerError> {
        self.backend.host_windows(host_id)
    }

    /// Overlapping active windows of one host are refused by the backend.
    pub fn add_window(
        &self,
        host_id: Uuid,
        request: WindowRequest,
    ) -> Result<AvailabilityWindow, SchedulerError> {
        request.validate()?;
        let (start, end) = day_span(request.start_time, request.end_time);
        if start >= end {
            return Err(SchedulerError::validation("Window must end after it starts"));
        }

        let window = AvailabilityWindow {
            id: Uuid::new_v4(),
            host_id,
            day_of_week: request.day_of_week,
            start_time: request.start_time,
            end_time: request.end_time,
            active: request.active,
        };
        self.backend.add_window(window.clone())?;
        Ok(window)
    }

    pub fn remove_window(&self, id: Uuid) -> Result<(), SchedulerError> {
        self.backend.remove_window(id)
    }

    /// Sends each due reminder once. A horizon is claimed before sending and
    /// released again if delivery fails.
    pub fn reminder_sweep(&self) -> Result<SweepReport, SchedulerError> {
        let now = self.now();
        let mut report = SweepReport::default();

        for horizon in ReminderHorizon::ALL {
            let (from, to) = match horizon {
                ReminderHorizon::Soon => (now, now + self.settings.reminder_lead),
                ReminderHorizon::Start => (now - self.settings.reminder_grace, now),
            };

            for booking in self.backend.scheduled_bookings_starting_between(from, to)? {
                report.examined += 1;
                if booking.reminder_sent(horizon) || !self.backend.claim_reminder(booking.id, horizon)? {
                    continue;
                }

                match self.notifier.reminder(&booking, horizon) {
                    Ok(()) => report.sent += 1,
                    Err(err) => {
                        error!(booking_id = %booking.id, ?horizon, %err, "Failed to send reminder");
                        report.failed += 1;
                        if let Err(err) = self.backend.release_reminder(booking.id, horizon) {
                            error!(booking_id = %booking.id, ?horizon, ?err, "Failed to release reminder claim");
                        }
                    }
                }
            }
        }

        info!(?report, "Reminder sweep finished");
        Ok(report)
    }
}
