use std::env;

use crate::error::DispatchError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    /// Minimum distance in meters between consecutive position reports
    /// for a courier to count as having moved.
    pub movement_threshold_m: f64,
    /// Expected interval between courier position reports.
    pub update_interval_secs: u64,
    /// A courier is considered offline once no report has arrived for
    /// `staleness_multiplier * update_interval_secs` seconds.
    pub staleness_multiplier: u64,
    /// First-pass search radius for courier matching.
    pub max_search_radius_m: f64,
    /// Location samples older than this are pruned on append.
    pub sample_retention_secs: i64,
    pub effect_queue_size: usize,
    pub event_buffer_size: usize,
    /// Upper bound on any single collaborator call (geocoding,
    /// notification, back-office sync).
    pub collaborator_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, DispatchError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            movement_threshold_m: parse_or_default("MOVEMENT_THRESHOLD_M", 100.0)?,
            update_interval_secs: parse_or_default("UPDATE_INTERVAL_SECS", 60)?,
            staleness_multiplier: parse_or_default("STALENESS_MULTIPLIER", 3)?,
            max_search_radius_m: parse_or_default("MAX_SEARCH_RADIUS_M", 5_000.0)?,
            sample_retention_secs: parse_or_default("SAMPLE_RETENTION_SECS", 7 * 24 * 3600)?,
            effect_queue_size: parse_or_default("EFFECT_QUEUE_SIZE", 1024)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            collaborator_timeout_ms: parse_or_default("COLLABORATOR_TIMEOUT_MS", 2_000)?,
        })
    }

    pub fn staleness_window_secs(&self) -> i64 {
        (self.staleness_multiplier * self.update_interval_secs) as i64
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            movement_threshold_m: 100.0,
            update_interval_secs: 60,
            staleness_multiplier: 3,
            max_search_radius_m: 5_000.0,
            sample_retention_secs: 7 * 24 * 3600,
            effect_queue_size: 1024,
            event_buffer_size: 1024,
            collaborator_timeout_ms: 2_000,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, DispatchError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| DispatchError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
