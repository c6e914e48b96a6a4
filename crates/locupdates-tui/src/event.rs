//! Everything the app reacts to arrives on one channel: terminal input,
//! redraw ticks, the app's own follow-ups, callbacks from the core and log
//! records.

use crate::app::AppEvent;
use anyhow::Context;
use chrono::{DateTime, Local};
use crossterm::event::{Event as InputEvent, EventStream};
use futures::StreamExt;
use locupdates::{
    controller::ControllerModel,
    model::{IndicatorContent, Sample},
};
use std::{sync::OnceLock, time::Duration};
use tokio::{sync::mpsc, time::MissedTickBehavior};

/// Redraw while idle so relative times stay fresh.
const REDRAW_INTERVAL: Duration = Duration::from_millis(500);

/// Sender for code with no handle to the app: the logger and the host
/// callbacks, which run on the core's controller thread.
static EVENT_TX: OnceLock<mpsc::UnboundedSender<Event>> = OnceLock::new();

/// Queues an event for the app from anywhere. Events emitted before the
/// channel exists or after the app exits are dropped.
pub fn emit(event: impl Into<Event>) {
    if let Some(tx) = EVENT_TX.get() {
        let _ = tx.send(event.into());
    }
}

#[derive(Debug)]
pub enum Event {
    Redraw,
    Input(InputEvent),
    App(AppEvent),
    Core(CoreEvent),
    Log(LogEntry),
}

/// Reported by the core through the host callbacks.
#[derive(Debug)]
pub enum CoreEvent {
    Model(Box<ControllerModel>),
    /// Delivered to the attached observer.
    Sample(Sample),
    IndicatorShown(IndicatorContent),
    IndicatorUpdated(IndicatorContent),
    IndicatorCancelled,
    Foreground(bool),
    TerminationRequested,
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub level: log::Level,
    /// Leading `subsystem:` of the message, like `controller` or `store`.
    pub subsystem: Option<String>,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: log::Level, text: &str) -> Self {
        let (subsystem, message) = match text.split_once(": ") {
            Some((prefix, rest))
                if !prefix.is_empty()
                    && prefix.chars().all(|c| c.is_ascii_lowercase() || c == '_') =>
            {
                (Some(prefix.to_string()), rest.to_string())
            }
            _ => (None, text.to_string()),
        };

        Self {
            at: Local::now(),
            level,
            subsystem,
            message,
        }
    }
}

impl From<AppEvent> for Event {
    fn from(event: AppEvent) -> Self {
        Self::App(event)
    }
}

impl From<CoreEvent> for Event {
    fn from(event: CoreEvent) -> Self {
        Self::Core(event)
    }
}

impl From<LogEntry> for Event {
    fn from(entry: LogEntry) -> Self {
        Self::Log(entry)
    }
}

#[derive(Debug)]
pub struct Events {
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Events {
    /// Opens the channel, makes it reachable through [`emit`] and starts
    /// reading terminal input. Only one app can run per process.
    pub fn start() -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        EVENT_TX
            .set(tx.clone())
            .map_err(|_| anyhow::anyhow!("event channel already started"))?;

        tokio::spawn(pump_input(tx.clone()));

        Ok(Self { tx, rx })
    }

    pub async fn next(&mut self) -> anyhow::Result<Event> {
        self.rx.recv().await.context("event channel closed")
    }

    pub fn send(&self, event: impl Into<Event>) {
        // we hold the receiver, so this can't fail
        let _ = self.tx.send(event.into());
    }
}

async fn pump_input(tx: mpsc::UnboundedSender<Event>) {
    let mut input = EventStream::new();
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
    redraw.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let event = tokio::select! {
            _ = tx.closed() => break,
            _ = redraw.tick() => Event::Redraw,
            input_event = input.next() => match input_event {
                Some(Ok(input_event)) => Event::Input(input_event),
                Some(Err(e)) => {
                    log::warn!("app: terminal input error: {e}");
                    continue;
                }
                None => break,
            },
        };

        if tx.send(event).is_err() {
            break;
        }
    }
}
