use crate::{configuration::Configuration, error::SchedulerError, scheduler::WindowRequest};
use chrono::{Duration, FixedOffset, Offset, Utc};
use clap::Parser;
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser, Debug, Clone)]
#[command(name = "consultation_scheduler", about = "Consultation booking scheduler")]
pub struct ConfigurationHandler {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Leave unset to keep bookings in memory only.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD")]
    pub admin_password: String,

    #[arg(long, env = "CRON_SECRET")]
    pub cron_secret: Option<String>,

    #[arg(long, env = "SLOT_MINUTES", default_value_t = 60, value_parser = clap::value_parser!(i64).range(5..=480))]
    pub slot_minutes: i64,

    #[arg(long, env = "UTC_OFFSET_MINUTES", default_value_t = 0, allow_negative_numbers = true, value_parser = clap::value_parser!(i32).range(-720..=840))]
    pub utc_offset_minutes: i32,

    #[arg(long, env = "REMINDER_LEAD_MINUTES", default_value_t = 30, value_parser = clap::value_parser!(i64).range(1..=1440))]
    pub reminder_lead_minutes: i64,

    #[arg(long, env = "REMINDER_GRACE_MINUTES", default_value_t = 5, value_parser = clap::value_parser!(i64).range(1..=60))]
    pub reminder_grace_minutes: i64,

    #[arg(long, env = "MEETING_BASE_URL")]
    pub meeting_base_url: Option<String>,

    /// JSON array of windows loaded at startup.
    #[arg(long, env = "AVAILABILITY_FILE")]
    pub availability_file: Option<PathBuf>,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        if let Err(err) = dotenvy::dotenv() {
            info!(%err, "No .env file loaded");
        }
        Self::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn port(&self) -> u16 {
        self.port
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn admin_password(&self) -> String {
        self.admin_password.clone()
    }

    fn cron_secret(&self) -> Option<String> {
        self.cron_secret.clone().filter(|secret| !secret.is_empty())
    }

    fn slot_length(&self) -> Duration {
        Duration::minutes(self.slot_minutes)
    }

    fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| {
            error!(
                offset_minutes = self.utc_offset_minutes,
                "Invalid UTC offset, falling back to UTC"
            );
            Utc.fix()
        })
    }

    fn reminder_lead(&self) -> Duration {
        Duration::minutes(self.reminder_lead_minutes)
    }

    fn reminder_grace(&self) -> Duration {
        Duration::minutes(self.reminder_grace_minutes)
    }

    fn meeting_base_url(&self) -> Option<String> {
        self.meeting_base_url.clone()
    }

    fn availability_file(&self) -> Option<PathBuf> {
        self.availability_file.clone()
    }
}

/// One entry of the availability seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedWindow {
    pub host_id: Uuid,
    #[serde(flatten)]
    pub window: WindowRequest,
}

pub fn load_availability_seed(path: &Path) -> Result<Vec<SeedWindow>, SchedulerError> {
    let content = fs::read_to_string(path).map_err(|err| {
        SchedulerError::internal(format!(
            "Failed to read availability file {}: {err}",
            path.display()
        ))
    })?;
    serde_json::from_str(&content).map_err(|err| {
        SchedulerError::validation(format!(
            "Malformed availability file {}: {err}",
            path.display()
        ))
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let configuration =
            ConfigurationHandler::try_parse_from(["scheduler", "--admin-password", "123"]).unwrap();

        assert_eq!(configuration.port(), 3000);
        assert_eq!(configuration.admin_password(), "123");
        assert_eq!(configuration.slot_length(), Duration::minutes(60));
        assert_eq!(configuration.utc_offset(), Utc.fix());
        assert_eq!(configuration.reminder_lead(), Duration::minutes(30));
        assert_eq!(configuration.reminder_grace(), Duration::minutes(5));
    }

    #[test]
    fn test_negative_offset_and_slot_length() {
        let configuration = ConfigurationHandler::try_parse_from([
            "scheduler",
            "--admin-password",
            "123",
            "--utc-offset-minutes",
            "-300",
            "--slot-minutes",
            "30",
        ])
        .unwrap();

        assert_eq!(configuration.utc_offset(), FixedOffset::west_opt(5 * 3600).unwrap());
        assert_eq!(configuration.slot_length(), Duration::minutes(30));
    }

    #[test]
    fn test_rejects_zero_slot_length() {
        ConfigurationHandler::try_parse_from([
            "scheduler",
            "--admin-password",
            "123",
            "--slot-minutes",
            "0",
        ])
        .unwrap_err();
    }

    #[test]
    fn test_empty_cron_secret_disables_sweep() {
        let configuration = ConfigurationHandler::try_parse_from([
            "scheduler",
            "--admin-password",
            "123",
            "--cron-secret",
            "",
        ])
        .unwrap();

        assert_eq!(configuration.cron_secret(), None);
    }

    #[test]
    fn test_load_availability_seed() {
        let host = Uuid::new_v4();
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{ "host_id": "{host}", "day_of_week": 1, "start_time": "09:00", "end_time": "11:00" }},
                {{ "host_id": "{host}", "day_of_week": 3, "start_time": "14:30", "end_time": "16:00", "active": false }}
            ]"#
        )
        .unwrap();

        let seed = load_availability_seed(file.path()).unwrap();
        assert_eq!(seed.len(), 2);
        assert_eq!(seed[0].host_id, host);
        assert_eq!(seed[0].window.day_of_week, 1);
        assert!(seed[0].window.active);
        assert!(!seed[1].window.active);
    }

    #[test]
    fn test_malformed_availability_seed() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"[{{ "day_of_week": 1 }}]"#).unwrap();

        let err = load_availability_seed(file.path()).unwrap_err();
        assert!(matches!(err, SchedulerError::Validation(_)));
    }
}
