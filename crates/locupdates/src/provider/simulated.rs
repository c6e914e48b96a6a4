//! A provider that walks randomly around a starting point.
//!
//! Used by the TUI host and in tests, where there is no platform location service.

use super::{LocationProvider, SampleSink, SubscriptionHandle};
use crate::{
    error::ProviderError,
    model::{LocationRequest, Sample},
};
use arc_swap::ArcSwapOption;
use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tokio_util::sync::CancellationToken;

/// Largest step between two samples, in degrees.
const MAX_STEP_DEGREES: f64 = 0.0002;

#[derive(Debug)]
pub struct SimulatedProvider {
    origin: (f64, f64),
    permission_granted: AtomicBool,
    next_handle: AtomicU64,
    subscriptions: DashMap<SubscriptionHandle, CancellationToken>,
    last: Arc<ArcSwapOption<Sample>>,
}

impl SimulatedProvider {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            origin: (latitude, longitude),
            permission_granted: AtomicBool::new(true),
            next_handle: AtomicU64::new(1),
            subscriptions: DashMap::new(),
            last: Arc::new(ArcSwapOption::empty()),
        }
    }

    /// Simulates the user granting or revoking location permission.
    ///
    /// Running subscriptions are not affected, only subsequent calls.
    pub fn set_permission_granted(&self, granted: bool) {
        self.permission_granted.store(granted, Ordering::Relaxed);
    }

    pub fn is_permission_granted(&self) -> bool {
        self.permission_granted.load(Ordering::Relaxed)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    fn check_permission(&self) -> Result<(), ProviderError> {
        if self.is_permission_granted() {
            Ok(())
        } else {
            Err(ProviderError::PermissionDenied {
                message: "simulated permission revoked".to_string(),
            })
        }
    }
}

impl LocationProvider for SimulatedProvider {
    fn subscribe(
        &self,
        request: LocationRequest,
        sink: Arc<SampleSink>,
    ) -> Result<SubscriptionHandle, ProviderError> {
        self.check_permission()?;

        if request.interval_ms == 0 {
            return Err(ProviderError::Unavailable {
                message: "simulated updates need a positive interval".to_string(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ProviderError::Unavailable {
                message: format!("no runtime to drive simulated updates: {e}"),
            }
        })?;

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.subscriptions.insert(handle, token.clone());

        let last = self.last.clone();
        let origin = self.origin;
        runtime.spawn(async move {
            let mut position = last
                .load()
                .as_ref()
                .map(|s| (s.latitude, s.longitude))
                .unwrap_or(origin);

            let mut interval = tokio::time::interval(request.interval());
            // first tick completes immediately
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let (sample, next) = step(position);
                        position = next;
                        last.store(Some(Arc::new(sample)));
                        sink.deliver(sample);
                    }
                }
            }

            log::debug!("provider: simulated subscription {handle} finished");
        });

        log::debug!(
            "provider: simulated subscription {handle} every {}ms",
            request.interval_ms
        );

        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), ProviderError> {
        self.check_permission()?;

        match self.subscriptions.remove(&handle) {
            Some((_, token)) => token.cancel(),
            None => log::warn!("provider: unsubscribe for unknown handle {handle}"),
        }
        Ok(())
    }

    fn last_known(&self) -> Result<Option<Sample>, ProviderError> {
        self.check_permission()?;
        Ok(self.last.load().as_deref().copied())
    }
}

fn step((latitude, longitude): (f64, f64)) -> (Sample, (f64, f64)) {
    let mut rng = rand::thread_rng();
    let latitude = (latitude + rng.gen_range(-MAX_STEP_DEGREES..MAX_STEP_DEGREES)).clamp(-90.0, 90.0);
    let longitude = longitude + rng.gen_range(-MAX_STEP_DEGREES..MAX_STEP_DEGREES);

    let sample = Sample {
        latitude,
        longitude,
        timestamp_millis: Utc::now().timestamp_millis().max(0) as u64,
        accuracy_meters: rng.gen_range(3.0..15.0),
    };
    (sample, (latitude, longitude))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerCommand;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn fast_request() -> LocationRequest {
        LocationRequest {
            interval_ms: 5,
            fastest_interval_ms: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn delivers_until_unsubscribed() {
        let provider = SimulatedProvider::new(48.8566, 2.3522);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = Arc::new(SampleSink::new(7, tx));

        let handle = provider.subscribe(fast_request(), sink).unwrap();
        assert_eq!(provider.active_subscriptions(), 1);

        let command = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("sample should arrive")
            .expect("channel open");
        match command {
            ControllerCommand::Sample { generation, sample } => {
                assert_eq!(generation, 7);
                assert!((sample.latitude - 48.8566).abs() < 0.01);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        provider.unsubscribe(handle).unwrap();
        assert_eq!(provider.active_subscriptions(), 0);
        assert!(provider.last_known().unwrap().is_some());

        // the task drops its sink once cancelled, closing the channel
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[tokio::test]
    async fn denied_permission_fails_subscribe() {
        let provider = SimulatedProvider::new(0.0, 0.0);
        provider.set_permission_granted(false);

        let (tx, _rx) = mpsc::unbounded_channel();
        let res = provider.subscribe(fast_request(), Arc::new(SampleSink::new(1, tx)));
        assert!(matches!(res, Err(ProviderError::PermissionDenied { .. })));
        assert_eq!(provider.active_subscriptions(), 0);
        assert!(provider.last_known().is_err());
    }

    #[tokio::test]
    async fn zero_interval_is_unavailable() {
        let provider = SimulatedProvider::new(0.0, 0.0);
        let (tx, _rx) = mpsc::unbounded_channel();
        let request = LocationRequest {
            interval_ms: 0,
            fastest_interval_ms: 0,
            ..Default::default()
        };

        let res = provider.subscribe(request, Arc::new(SampleSink::new(1, tx)));
        assert!(matches!(res, Err(ProviderError::Unavailable { .. })));
        assert_eq!(provider.active_subscriptions(), 0);
    }

    #[test]
    fn subscribe_without_runtime_is_unavailable() {
        let provider = SimulatedProvider::new(0.0, 0.0);
        let (tx, _rx) = mpsc::unbounded_channel();
        let res = provider.subscribe(fast_request(), Arc::new(SampleSink::new(1, tx)));
        assert!(matches!(res, Err(ProviderError::Unavailable { .. })));
    }
}
