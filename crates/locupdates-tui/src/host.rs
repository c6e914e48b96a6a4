//! Host callbacks for the core.
//!
//! The TUI plays both parts of the Android app: the activity that attaches
//! and shows samples, and the service host that owns the notification and
//! foreground state. Every callback is forwarded to the app as a
//! [`CoreEvent`].

use crate::event::{CoreEvent, emit};
use locupdates::{
    EventHandler,
    controller::{ControllerModel, LocationObserver},
    error::HostError,
    host::{IndicatorSurface, ProcessHost},
    model::{IndicatorContent, Sample},
};

#[derive(Debug, Default)]
pub struct TuiHost;

impl EventHandler for TuiHost {
    fn on_update(&self, model: ControllerModel) {
        emit(CoreEvent::Model(Box::new(model)));
    }
}

impl IndicatorSurface for TuiHost {
    fn show(&self, content: IndicatorContent) -> Result<(), HostError> {
        emit(CoreEvent::IndicatorShown(content));
        Ok(())
    }

    fn update(&self, content: IndicatorContent) -> Result<(), HostError> {
        emit(CoreEvent::IndicatorUpdated(content));
        Ok(())
    }

    fn cancel(&self) -> Result<(), HostError> {
        emit(CoreEvent::IndicatorCancelled);
        Ok(())
    }
}

impl ProcessHost for TuiHost {
    fn promote_to_foreground(&self) -> Result<(), HostError> {
        emit(CoreEvent::Foreground(true));
        Ok(())
    }

    fn demote_from_foreground(&self) -> Result<(), HostError> {
        emit(CoreEvent::Foreground(false));
        Ok(())
    }

    fn request_self_termination(&self) -> Result<(), HostError> {
        emit(CoreEvent::TerminationRequested);
        Ok(())
    }
}

/// The "activity" side: receives samples while attached.
#[derive(Debug, Default)]
pub struct TuiObserver;

impl LocationObserver for TuiObserver {
    fn on_location(&self, sample: Sample) {
        emit(CoreEvent::Sample(sample));
    }
}
