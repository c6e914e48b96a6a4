mod app;
mod event;
mod host;
mod ui;

use crate::{
    app::App,
    event::{LogEntry, emit},
};
use clap::Parser;

#[derive(Parser, Debug)]
pub struct Args {
    /// Whether to store state in memory only, without persisting to disk.
    #[arg(long, short = 'm', default_value_t = false)]
    pub in_memory: bool,

    /// Start without attaching, as if launched in the background.
    #[arg(long, default_value_t = false)]
    pub headless: bool,

    /// Interval between simulated location updates.
    #[arg(long, default_value_t = 10_000, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: u64,

    /// Start with location permission revoked.
    #[arg(long, default_value_t = false)]
    pub deny_permission: bool,

    /// Latitude the simulated walk starts from.
    #[arg(long, default_value_t = 37.4220, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude the simulated walk starts from.
    #[arg(long, default_value_t = -122.0841, allow_negative_numbers = true)]
    pub lon: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // set up global logger, records are dropped until the app's event channel exists
    let logger = AppLogger::new_with_default("warn,locupdates=debug,locupdates_tui=debug");
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(log::LevelFilter::Debug);

    // initialize app
    let app = App::new(&args).await?;

    // run tui
    let terminal = ratatui::init();
    let app_result = app.run(terminal).await;
    ratatui::restore();
    app_result
}

/// Logger implementation that logs to the TUI.
struct AppLogger {
    filter: env_filter::Filter,
}

impl AppLogger {
    fn new_with_default(default: &str) -> Self {
        let mut filter_builder = env_filter::Builder::new();
        if let Ok(filter) = &std::env::var("RUST_LOG") {
            filter_builder.parse(filter);
        } else {
            filter_builder.parse(default);
        }
        Self {
            filter: filter_builder.build(),
        }
    }
}

impl log::Log for AppLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.filter.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.filter.matches(record) {
            emit(LogEntry::new(record.level(), &record.args().to_string()));
        }
    }

    fn flush(&self) {}
}
