use chrono::{Duration, FixedOffset};
use std::path::PathBuf;

pub trait Configuration: Clone + Send + Sync + 'static {
    fn port(&self) -> u16;
    fn database_url(&self) -> Option<String>;
    fn admin_password(&self) -> String;
    /// Bearer token of the scheduled reminder trigger. `None` disables the sweep endpoint.
    fn cron_secret(&self) -> Option<String>;
    fn slot_length(&self) -> Duration;
    /// Offset in which the hosts' weekly windows are written.
    fn utc_offset(&self) -> FixedOffset;
    fn reminder_lead(&self) -> Duration;
    fn reminder_grace(&self) -> Duration;
    fn meeting_base_url(&self) -> Option<String>;
    fn availability_file(&self) -> Option<PathBuf>;
}
