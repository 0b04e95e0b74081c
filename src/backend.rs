use crate::error::SchedulerError;
use crate::types::{AvailabilityWindow, Booking, PaymentStatus, ReminderHorizon};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Storage seam for availability windows and bookings.
///
/// Implementations must make [`SchedulerBackend::insert_booking_if_free`],
/// [`SchedulerBackend::add_window`], [`SchedulerBackend::cancel_booking`] and
/// [`SchedulerBackend::claim_reminder`] atomic with respect to concurrent
/// callers. Everything else is plain CRUD.
pub trait SchedulerBackend: Clone + Send + Sync + 'static {
    /// Active windows of `host_id` on `day_of_week` (0 = Sunday).
    fn availability_windows(
        &self,
        host_id: Uuid,
        day_of_week: u8,
    ) -> Result<Vec<AvailabilityWindow>, SchedulerError>;

    /// All windows of `host_id`, active or not.
    fn host_windows(&self, host_id: Uuid) -> Result<Vec<AvailabilityWindow>, SchedulerError>;

    /// Stores `window`. An active window overlapping another active window of
    /// the same host and weekday is refused with `SchedulerError::Conflict`.
    fn add_window(&self, window: AvailabilityWindow) -> Result<(), SchedulerError>;

    fn remove_window(&self, id: Uuid) -> Result<(), SchedulerError>;

    /// Non-cancelled bookings of `host_id` overlapping `[from, to)`.
    fn active_bookings_between(
        &self,
        host_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, SchedulerError>;

    /// Stores `booking` unless a non-cancelled booking of the same host
    /// overlaps it, in which case `SchedulerError::Conflict` is returned.
    fn insert_booking_if_free(&self, booking: Booking) -> Result<Booking, SchedulerError>;

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, SchedulerError>;

    /// Moves a scheduled booking to cancelled. The flag tells whether this
    /// call made the change; an already cancelled booking comes back with `false`.
    fn cancel_booking(&self, id: Uuid) -> Result<(Booking, bool), SchedulerError>;

    fn set_payment_status(
        &self,
        id: Uuid,
        payment_status: PaymentStatus,
    ) -> Result<Booking, SchedulerError>;

    fn user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, SchedulerError>;

    /// One page of all bookings, newest start first, plus the total count.
    fn bookings_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Booking>, usize), SchedulerError>;

    /// Scheduled bookings with `from < start <= to`.
    fn scheduled_bookings_starting_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, SchedulerError>;

    /// Flips the reminder flag of `horizon` from unsent to sent on a scheduled
    /// booking. Returns `false` if someone else already did.
    fn claim_reminder(&self, id: Uuid, horizon: ReminderHorizon) -> Result<bool, SchedulerError>;

    fn release_reminder(&self, id: Uuid, horizon: ReminderHorizon) -> Result<(), SchedulerError>;
}
