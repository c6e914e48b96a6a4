//! Hooks into the process hosting the controller.

use crate::{error::HostError, model::IndicatorContent};

/// Foreign trait for the persistent, user-visible indicator.
///
/// On Android this is the ongoing notification of a foreground service.
#[uniffi::export(with_foreign)]
pub trait IndicatorSurface: Send + Sync {
    fn show(&self, content: IndicatorContent) -> Result<(), HostError>;

    fn update(&self, content: IndicatorContent) -> Result<(), HostError>;

    fn cancel(&self) -> Result<(), HostError>;
}

/// Foreign trait for lifecycle controls of the hosting process.
#[uniffi::export(with_foreign)]
pub trait ProcessHost: Send + Sync {
    /// Keep the process alive while unattended, e.g. `startForeground`.
    fn promote_to_foreground(&self) -> Result<(), HostError>;

    /// e.g. `stopForeground`.
    fn demote_from_foreground(&self) -> Result<(), HostError>;

    /// Reporting stopped, the process may exit once nothing else holds it.
    fn request_self_termination(&self) -> Result<(), HostError>;
}
