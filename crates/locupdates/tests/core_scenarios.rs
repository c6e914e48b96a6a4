use locupdates::{
    Core, CoreOptions, EventHandler,
    controller::{ControllerModel, LocationObserver},
    error::{CoreErrorKind, HostError, ProviderError},
    host::{IndicatorSurface, ProcessHost},
    model::{IndicatorAction, IndicatorContent, LocationRequest, Sample},
    policy::{ReportingState, Visibility},
    provider::{LocationProvider, SampleSink, SimulatedProvider, SubscriptionHandle},
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
enum HostCall {
    Show(IndicatorContent),
    Update(IndicatorContent),
    Cancel,
    Promote,
    Demote,
    Terminate,
}

#[derive(Default)]
struct RecordingHost {
    calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
    fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    fn shows(&self) -> Vec<IndicatorContent> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Show(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HostCall) -> Result<(), HostError> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl IndicatorSurface for RecordingHost {
    fn show(&self, content: IndicatorContent) -> Result<(), HostError> {
        self.record(HostCall::Show(content))
    }

    fn update(&self, content: IndicatorContent) -> Result<(), HostError> {
        self.record(HostCall::Update(content))
    }

    fn cancel(&self) -> Result<(), HostError> {
        self.record(HostCall::Cancel)
    }
}

impl ProcessHost for RecordingHost {
    fn promote_to_foreground(&self) -> Result<(), HostError> {
        self.record(HostCall::Promote)
    }

    fn demote_from_foreground(&self) -> Result<(), HostError> {
        self.record(HostCall::Demote)
    }

    fn request_self_termination(&self) -> Result<(), HostError> {
        self.record(HostCall::Terminate)
    }
}

#[derive(Default)]
struct ManualProvider {
    deny: AtomicBool,
    sinks: Mutex<Vec<(SubscriptionHandle, Arc<SampleSink>)>>,
    unsubscribed: Mutex<Vec<SubscriptionHandle>>,
}

impl ManualProvider {
    fn latest_sink(&self) -> Arc<SampleSink> {
        self.sinks
            .lock()
            .unwrap()
            .last()
            .map(|(_, sink)| sink.clone())
            .expect("should have subscribed")
    }

    fn live_subscriptions(&self) -> usize {
        let unsubscribed = self.unsubscribed.lock().unwrap();
        self.sinks
            .lock()
            .unwrap()
            .iter()
            .filter(|(handle, _)| !unsubscribed.contains(handle))
            .count()
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.deny.load(Ordering::Relaxed) {
            Err(ProviderError::PermissionDenied {
                message: "denied".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl LocationProvider for ManualProvider {
    fn subscribe(
        &self,
        _request: LocationRequest,
        sink: Arc<SampleSink>,
    ) -> Result<SubscriptionHandle, ProviderError> {
        self.check()?;
        let mut sinks = self.sinks.lock().unwrap();
        let handle = sinks.len() as SubscriptionHandle;
        sinks.push((handle, sink));
        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), ProviderError> {
        self.check()?;
        self.unsubscribed.lock().unwrap().push(handle);
        Ok(())
    }

    fn last_known(&self) -> Result<Option<Sample>, ProviderError> {
        self.check()?;
        Ok(None)
    }
}

#[derive(Default)]
struct RecordingObserver {
    samples: Mutex<Vec<Sample>>,
}

impl RecordingObserver {
    fn samples(&self) -> Vec<Sample> {
        self.samples.lock().unwrap().clone()
    }
}

impl LocationObserver for RecordingObserver {
    fn on_location(&self, sample: Sample) {
        self.samples.lock().unwrap().push(sample);
    }
}

#[derive(Default)]
struct RecordingEvents {
    models: Mutex<Vec<ControllerModel>>,
}

impl EventHandler for RecordingEvents {
    fn on_update(&self, model: ControllerModel) {
        self.models.lock().unwrap().push(model);
    }
}

fn sample(n: u32) -> Sample {
    Sample {
        latitude: 51.5 + n as f64 * 0.001,
        longitude: -0.12 + n as f64 * 0.001,
        timestamp_millis: 1_700_000_000_000 + n as u64 * 10_000,
        accuracy_meters: 8.0,
    }
}

fn in_memory() -> CoreOptions {
    CoreOptions {
        init_logging: false,
        in_memory: true,
        ..Default::default()
    }
}

struct Harness {
    core: Arc<Core>,
    host: Arc<RecordingHost>,
    provider: Arc<ManualProvider>,
    events: Arc<RecordingEvents>,
}

fn harness(options: CoreOptions) -> Harness {
    let host = Arc::new(RecordingHost::default());
    let provider = Arc::new(ManualProvider::default());
    let events = Arc::new(RecordingEvents::default());
    let core = Core::new(
        events.clone(),
        provider.clone(),
        host.clone(),
        host.clone(),
        options,
    )
    .unwrap();

    Harness {
        core,
        host,
        provider,
        events,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should become true");
}

#[tokio::test]
async fn attended_samples_then_unattended_then_stop() {
    let h = harness(in_memory());
    let observer = Arc::new(RecordingObserver::default());

    let id = h.core.attach(observer.clone()).await.unwrap();
    h.core.start().await.unwrap();

    let sink = h.provider.latest_sink();
    for n in 1..=3 {
        sink.deliver(sample(n));
    }

    let model = h.core.current_model().await.unwrap();
    assert_eq!(model.samples_received, 3);
    assert_eq!(model.visibility, Visibility::Attended);
    assert!(h.host.shows().is_empty());
    assert_eq!(observer.samples(), vec![sample(1), sample(2), sample(3)]);

    h.core.detach(id).await.unwrap();
    assert_eq!(
        h.host.shows(),
        vec![IndicatorContent::for_location(Some(&sample(3)))]
    );
    let model = h.core.model();
    assert_eq!(model.visibility, Visibility::Unattended);
    assert_eq!(model.attachments, 0);

    h.core.stop().await.unwrap();
    let model = h.core.model();
    assert_eq!(model.reporting, ReportingState::Inactive);
    assert_eq!(model.indicator, None);
    assert_eq!(h.provider.live_subscriptions(), 0);

    let calls = h.host.calls();
    assert_eq!(
        &calls[calls.len() - 3..],
        &[HostCall::Cancel, HostCall::Demote, HostCall::Terminate]
    );

    // the host saw every change
    assert!(
        h.events
            .models
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.samples_received == 3)
    );
}

#[tokio::test]
async fn start_without_permission_reports_permission_error() {
    let h = harness(in_memory());
    h.provider.deny.store(true, Ordering::Relaxed);

    let err = h.core.start().await.unwrap_err();
    assert_eq!(err.kind(), CoreErrorKind::Permission);
    assert_eq!(h.core.model().reporting, ReportingState::Inactive);
}

#[tokio::test]
async fn detach_without_attach_is_precondition_error() {
    let h = harness(in_memory());

    let err = h.core.detach(1).await.unwrap_err();
    assert_eq!(err.kind(), CoreErrorKind::Precondition);
}

#[tokio::test]
async fn rotation_keeps_indicator_hidden() {
    let h = harness(in_memory());
    let id = h
        .core
        .attach(Arc::new(RecordingObserver::default()))
        .await
        .unwrap();
    h.core.start().await.unwrap();

    h.core.mark_reconfiguring().unwrap();
    h.core.detach(id).await.unwrap();
    assert!(h.core.current_model().await.unwrap().reconfiguring);

    h.core
        .attach(Arc::new(RecordingObserver::default()))
        .await
        .unwrap();
    let model = h.core.model();
    assert!(!model.reconfiguring);
    assert_eq!(model.visibility, Visibility::Attended);
    assert!(h.host.shows().is_empty());
}

#[tokio::test]
async fn late_sample_after_stop_is_dropped() {
    let h = harness(in_memory());
    h.core.start().await.unwrap();
    let sink = h.provider.latest_sink();

    sink.deliver(sample(1));
    h.core.stop().await.unwrap();
    sink.deliver(sample(2));

    let model = h.core.current_model().await.unwrap();
    assert_eq!(model.last_location, Some(sample(1)));
    assert_eq!(model.samples_received, 1);
}

#[tokio::test]
async fn stop_action_from_indicator() {
    let h = harness(in_memory());
    h.core.start().await.unwrap();
    assert_eq!(h.host.shows().len(), 1);

    h.core
        .handle_indicator_action(IndicatorAction::StopReporting)
        .await
        .unwrap();
    assert_eq!(h.core.model().reporting, ReportingState::Inactive);
    assert_eq!(h.host.calls().last(), Some(&HostCall::Terminate));
}

#[tokio::test]
async fn reporting_resumes_after_restart() {
    let dir = TempDir::new().unwrap();
    let options = CoreOptions {
        init_logging: false,
        data_dir: Some(dir.path().to_string_lossy().to_string()),
        ..Default::default()
    };

    let first = harness(options.clone());
    first.core.start().await.unwrap();
    first.core.shutdown().unwrap();
    wait_until(|| first.provider.live_subscriptions() == 0).await;

    let second = harness(options);
    let model = second.core.current_model().await.unwrap();
    assert_eq!(model.reporting, ReportingState::Active);
    assert_eq!(model.visibility, Visibility::Unattended);
    assert_eq!(second.provider.live_subscriptions(), 1);
    assert_eq!(second.host.shows().len(), 1);

    second.core.stop().await.unwrap();
}

#[tokio::test]
async fn invalid_interval_is_rejected_at_construction() {
    let host = Arc::new(RecordingHost::default());
    let options = |update_interval_ms, fastest_update_interval_ms| CoreOptions {
        update_interval_ms,
        fastest_update_interval_ms,
        ..in_memory()
    };

    for (interval, fastest) in [(0, 0), (1_000, 5_000)] {
        let res = Core::new(
            Arc::new(RecordingEvents::default()),
            Arc::new(ManualProvider::default()),
            host.clone(),
            host.clone(),
            options(interval, fastest),
        );
        let err = res.expect_err("invalid interval should be rejected");
        assert_eq!(err.kind(), CoreErrorKind::Other);
    }
}

#[tokio::test]
async fn simulated_provider_feeds_observers() {
    let host = Arc::new(RecordingHost::default());
    let provider = Arc::new(SimulatedProvider::new(35.6762, 139.6503));
    let core = Core::new(
        Arc::new(RecordingEvents::default()),
        provider.clone(),
        host.clone(),
        host.clone(),
        CoreOptions {
            update_interval_ms: 5,
            fastest_update_interval_ms: 5,
            ..in_memory()
        },
    )
    .unwrap();

    let observer = Arc::new(RecordingObserver::default());
    core.attach(observer.clone()).await.unwrap();
    core.start().await.unwrap();

    wait_until(|| observer.samples().len() >= 2).await;

    core.stop().await.unwrap();
    assert_eq!(provider.active_subscriptions(), 0);
    assert!(core.last_known_location().await.unwrap().is_some());
}
