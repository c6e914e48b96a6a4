use chrono::{DateTime, Utc};
use std::time::Duration;

/// One location reading.
#[derive(Debug, Clone, Copy, PartialEq, uniffi::Record)]
pub struct Sample {
    pub latitude: f64,
    pub longitude: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_millis: u64,
    pub accuracy_meters: f32,
}

/// Accuracy/power tradeoff requested from the location provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, uniffi::Enum)]
pub enum Priority {
    #[default]
    HighAccuracy,
    BalancedPowerAccuracy,
    LowPower,
    Passive,
}

/// Parameters for a location subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct LocationRequest {
    /// Desired interval between samples.
    pub interval_ms: u64,
    /// Fastest rate the subscriber can accept samples that other apps requested.
    pub fastest_interval_ms: u64,
    pub priority: Priority,
}

pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_FASTEST_UPDATE_INTERVAL_MS: u64 = DEFAULT_UPDATE_INTERVAL_MS / 2;

impl Default for LocationRequest {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            fastest_interval_ms: DEFAULT_FASTEST_UPDATE_INTERVAL_MS,
            priority: Priority::HighAccuracy,
        }
    }
}

impl LocationRequest {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Rejects requests no provider can serve.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.interval_ms > 0, "update interval must be positive");
        anyhow::ensure!(
            self.fastest_interval_ms <= self.interval_ms,
            "fastest update interval {}ms exceeds update interval {}ms",
            self.fastest_interval_ms,
            self.interval_ms
        );
        Ok(())
    }
}

/// Action offered on the persistent indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum IndicatorAction {
    /// Bring the host's UI to the front.
    ReturnToApp,
    /// Stop location updates and let the host terminate.
    StopReporting,
}

/// Content of the persistent indicator (an ongoing notification on Android).
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct IndicatorContent {
    pub title: String,
    pub text: String,
    pub ticker: String,
    pub actions: Vec<IndicatorAction>,
}

impl IndicatorContent {
    pub fn for_location(location: Option<&Sample>) -> Self {
        let text = location_text(location);
        Self {
            title: location_title(location),
            ticker: text.clone(),
            text,
            actions: vec![IndicatorAction::ReturnToApp, IndicatorAction::StopReporting],
        }
    }
}

/// Human-readable coordinates, or a placeholder when nothing is known yet.
pub fn location_text(location: Option<&Sample>) -> String {
    match location {
        Some(sample) => format!("({:.6}, {:.6})", sample.latitude, sample.longitude),
        None => "Unknown location".to_string(),
    }
}

pub fn location_title(location: Option<&Sample>) -> String {
    let time = location
        .and_then(|sample| i64::try_from(sample.timestamp_millis).ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis);

    match time {
        Some(time) => format!("Location Updated: {}", time.format("%H:%M:%S UTC")),
        None => "Location Updates".to_string(),
    }
}
