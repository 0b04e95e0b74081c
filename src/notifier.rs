use crate::types::{Booking, ReminderHorizon};
use tracing::info;

/// Outbound notifications about bookings (email, chat, ...).
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn booking_confirmed(&self, booking: &Booking) -> Result<(), String>;
    fn booking_cancelled(&self, booking: &Booking) -> Result<(), String>;
    fn reminder(&self, booking: &Booking, horizon: ReminderHorizon) -> Result<(), String>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn booking_confirmed(&self, booking: &Booking) -> Result<(), String> {
        info!(
            booking_id = %booking.id,
            user_id = %booking.user_id,
            start = %booking.start,
            meeting_link = ?booking.meeting_link,
            "Booking confirmed"
        );
        Ok(())
    }

    fn booking_cancelled(&self, booking: &Booking) -> Result<(), String> {
        info!(booking_id = %booking.id, user_id = %booking.user_id, "Booking cancelled");
        Ok(())
    }

    fn reminder(&self, booking: &Booking, horizon: ReminderHorizon) -> Result<(), String> {
        info!(
            booking_id = %booking.id,
            user_id = %booking.user_id,
            ?horizon,
            start = %booking.start,
            "Booking reminder"
        );
        Ok(())
    }
}
