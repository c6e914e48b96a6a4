//! # Location provider
//! Interface to the platform's location service.
//!
//! Notes:
//! - On Android the host implements [`LocationProvider`] over the fused location provider.
//! - Samples arrive on whatever thread the platform uses for callbacks. The provider hands
//!   them to the [`SampleSink`] it was given, which marshals them onto the controller's
//!   worker thread.
//! - A sink stays bound to the subscription it was created for, so samples from a
//!   subscription that has since been cancelled are recognized and dropped.

mod simulated;

pub use simulated::SimulatedProvider;

use crate::{
    controller::ControllerCommand,
    error::ProviderError,
    model::{LocationRequest, Sample},
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Opaque handle returned by [`LocationProvider::subscribe`].
pub type SubscriptionHandle = u64;

/// Foreign trait implemented by the host's location service.
#[uniffi::export(with_foreign)]
pub trait LocationProvider: Send + Sync {
    /// Starts periodic updates. Samples must be passed to `sink`.
    fn subscribe(
        &self,
        request: LocationRequest,
        sink: Arc<SampleSink>,
    ) -> Result<SubscriptionHandle, ProviderError>;

    /// Cancels a subscription. No samples may be delivered for it afterwards.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), ProviderError>;

    /// Best-effort cached location, `None` if nothing is known.
    fn last_known(&self) -> Result<Option<Sample>, ProviderError>;
}

/// Receives samples for one subscription and forwards them to the controller.
#[derive(Debug, uniffi::Object)]
pub struct SampleSink {
    generation: u64,
    tx: mpsc::UnboundedSender<ControllerCommand>,
}

impl SampleSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<ControllerCommand>) -> Self {
        Self { generation, tx }
    }
}

#[uniffi::export]
impl SampleSink {
    /// Hands a sample to the controller. Safe to call from any thread.
    pub fn deliver(&self, sample: Sample) {
        if self
            .tx
            .send(ControllerCommand::Sample {
                generation: self.generation,
                sample,
            })
            .is_err()
        {
            log::debug!("provider: controller gone, dropping sample");
        }
    }
}
