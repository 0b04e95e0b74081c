use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// One recurring weekly window during which a host can be booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub host_id: Uuid,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u8,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    /// `24:00` on the wire, stored as 00:00, closes the day.
    #[serde(with = "hhmm::end")]
    pub end_time: NaiveTime,
    pub active: bool,
}

/// Offsets of `start` and `end` from local midnight. An end of 00:00 is the
/// end of the day.
pub fn day_span(start: NaiveTime, end: NaiveTime) -> (Duration, Duration) {
    let end = match end == NaiveTime::MIN {
        true => Duration::days(1),
        false => end - NaiveTime::MIN,
    };
    (start - NaiveTime::MIN, end)
}

impl AvailabilityWindow {
    pub fn span(&self) -> (Duration, Duration) {
        day_span(self.start_time, self.end_time)
    }

    pub fn overlaps(&self, other: &AvailabilityWindow) -> bool {
        let (start, end) = self.span();
        let (other_start, other_end) = other.span();
        self.host_id == other.host_id
            && self.day_of_week == other.day_of_week
            && start < other_end
            && end > other_start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Scheduled,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Refunded,
    Waived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub host_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub meeting_link: Option<String>,
    pub reminder_soon_sent: bool,
    pub reminder_start_sent: bool,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && self.end > start
    }

    pub fn reminder_sent(&self, horizon: ReminderHorizon) -> bool {
        match horizon {
            ReminderHorizon::Soon => self.reminder_soon_sent,
            ReminderHorizon::Start => self.reminder_start_sent,
        }
    }

    pub fn set_reminder_sent(&mut self, horizon: ReminderHorizon, sent: bool) {
        match horizon {
            ReminderHorizon::Soon => self.reminder_soon_sent = sent,
            ReminderHorizon::Start => self.reminder_start_sent = sent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The two moments a booking owner gets reminded at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderHorizon {
    /// Shortly before the booking starts.
    Soon,
    /// The booking has just started.
    Start,
}

impl ReminderHorizon {
    pub const ALL: [ReminderHorizon; 2] = [ReminderHorizon::Soon, ReminderHorizon::Start];
}

/// Who is issuing a request, as established by the auth gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    User(Uuid),
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingEventKind {
    Created,
    Cancelled,
    PaymentUpdated,
}

impl BookingEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingEventKind::Created => "created",
            BookingEventKind::Cancelled => "cancelled",
            BookingEventKind::PaymentUpdated => "payment_updated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub booking: Booking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPage {
    pub items: Vec<Booking>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub sent: usize,
    pub failed: usize,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Waived => "waived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant `{}`", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl FromStr for BookingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(BookingStatus::Scheduled),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(UnknownVariant(other.into())),
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            "waived" => Ok(PaymentStatus::Waived),
            other => Err(UnknownVariant(other.into())),
        }
    }
}

/// Wall-clock times on the wire are plain `HH:mm` strings.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(raw.trim(), FORMAT)
    }

    /// Window ends additionally accept `24:00`, kept as 00:00.
    pub mod end {
        use super::FORMAT;
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        const END_OF_DAY: &str = "24:00";

        pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
            match *time == NaiveTime::MIN {
                true => serializer.serialize_str(END_OF_DAY),
                false => serializer.serialize_str(&time.format(FORMAT).to_string()),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
            let raw = String::deserialize(deserializer)?;
            parse(&raw).map_err(serde::de::Error::custom)
        }

        pub fn parse(raw: &str) -> Result<NaiveTime, chrono::ParseError> {
            match raw.trim() {
                END_OF_DAY => Ok(NaiveTime::MIN),
                other => super::parse(other),
            }
        }
    }
}
