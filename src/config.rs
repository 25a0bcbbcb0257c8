use std::path::PathBuf;
use std::time::Duration;

use crate::calendar::AcademicCalendar;

const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub sync: Option<SyncConfig>,
    pub sync_timeout: Duration,
    pub calendar: AcademicCalendar,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            sync: None,
            sync_timeout: Duration::from_secs(DEFAULT_SYNC_TIMEOUT_SECS),
            calendar: AcademicCalendar::default(),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Config {
    /// Reads the process environment (after `.env`, if any, was loaded).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();

        cfg.workspace = non_empty(lookup("GRADEBOOK_WORKSPACE")).map(PathBuf::from);

        let url = non_empty(lookup("GRADEBOOK_SYNC_URL"));
        let key = non_empty(lookup("GRADEBOOK_SYNC_KEY"));
        cfg.sync = match (url, key) {
            (Some(url), Some(api_key)) => Some(SyncConfig {
                url: url.trim_end_matches('/').to_string(),
                api_key,
            }),
            (Some(_), None) | (None, Some(_)) => {
                tracing::warn!("GRADEBOOK_SYNC_URL and GRADEBOOK_SYNC_KEY must both be set; sync disabled");
                None
            }
            (None, None) => None,
        };

        if let Some(raw) = non_empty(lookup("GRADEBOOK_SYNC_TIMEOUT_SECS")) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => cfg.sync_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %raw, "invalid GRADEBOOK_SYNC_TIMEOUT_SECS; using default"),
            }
        }

        if let Some(raw) = non_empty(lookup("GRADEBOOK_YEAR_START")) {
            match AcademicCalendar::parse_month_day(&raw) {
                Some(cal) => cfg.calendar = cal,
                None => tracing::warn!(value = %raw, "invalid GRADEBOOK_YEAR_START (want MM-DD); using 07-01"),
            }
        }

        cfg
    }
}
