//! Location reporting controller.
//!
//! The `Controller` owns all reporting state and runs on a single worker
//! thread. Every operation reaches it as a [`ControllerCommand`] over an
//! unbounded channel, including samples delivered by the location provider,
//! so state is only ever touched from that one thread.
//!
//! - The update subscription is started and stopped through the
//!   [`LocationProvider`] and mirrored in the persisted reporting flag.
//! - The [`VisibilityPolicy`] decides whether the indicator is shown.
//! - Samples fan out to attached observers and, when unattended, refresh the
//!   indicator.

use crate::{
    EventHandler,
    error::ControlError,
    host::{IndicatorSurface, ProcessHost},
    model::{IndicatorAction, IndicatorContent, LocationRequest, Sample},
    policy::{ReportingState, Transition, Visibility, VisibilityPolicy},
    provider::{LocationProvider, SampleSink, SubscriptionHandle},
    store::{KEY_REQUESTING_LOCATION_UPDATES, KeyValueStore},
};
use arc_swap::ArcSwap;
use std::{fmt, sync::Arc};
use tokio::sync::{mpsc, oneshot};

/// Identifies one attached observer.
pub type AttachmentId = u64;

/// Foreign trait implemented by clients that display samples directly.
#[uniffi::export(with_foreign)]
pub trait LocationObserver: Send + Sync {
    fn on_location(&self, sample: Sample);
}

/// Controller state sent to the host.
#[derive(Debug, Clone, PartialEq, Default, uniffi::Record)]
pub struct ControllerModel {
    pub reporting: ReportingState,
    pub visibility: Visibility,
    pub attachments: u32,
    pub reconfiguring: bool,
    pub last_location: Option<Sample>,
    pub samples_received: u64,
    /// Content of the indicator currently shown, if any.
    pub indicator: Option<IndicatorContent>,
}

pub enum ControllerCommand {
    Attach {
        observer: Arc<dyn LocationObserver>,
        callback: oneshot::Sender<AttachmentId>,
    },
    Detach {
        id: AttachmentId,
        callback: oneshot::Sender<Result<(), ControlError>>,
    },
    MarkReconfiguring,

    Start {
        callback: oneshot::Sender<Result<(), ControlError>>,
    },
    Stop {
        callback: oneshot::Sender<Result<(), ControlError>>,
    },
    LastKnownLocation {
        callback: oneshot::Sender<Option<Sample>>,
    },
    IndicatorAction {
        action: IndicatorAction,
        callback: oneshot::Sender<Result<(), ControlError>>,
    },
    Model {
        callback: oneshot::Sender<ControllerModel>,
    },

    /// A sample from the subscription identified by `generation`.
    Sample {
        generation: u64,
        sample: Sample,
    },

    Shutdown,
}

impl fmt::Debug for ControllerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attach { .. } => f.write_str("Attach"),
            Self::Detach { id, .. } => f.debug_struct("Detach").field("id", id).finish(),
            Self::MarkReconfiguring => f.write_str("MarkReconfiguring"),
            Self::Start { .. } => f.write_str("Start"),
            Self::Stop { .. } => f.write_str("Stop"),
            Self::LastKnownLocation { .. } => f.write_str("LastKnownLocation"),
            Self::IndicatorAction { action, .. } => f
                .debug_struct("IndicatorAction")
                .field("action", action)
                .finish(),
            Self::Model { .. } => f.write_str("Model"),
            Self::Sample { generation, sample } => f
                .debug_struct("Sample")
                .field("generation", generation)
                .field("sample", sample)
                .finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Collaborators the controller drives.
pub struct Collaborators {
    pub store: Arc<dyn KeyValueStore>,
    pub provider: Arc<dyn LocationProvider>,
    pub indicator: Arc<dyn IndicatorSurface>,
    pub host: Arc<dyn ProcessHost>,
    pub event_handler: Arc<dyn EventHandler>,
}

#[derive(Debug, Clone, Copy)]
struct Subscription {
    generation: u64,
    handle: SubscriptionHandle,
}

pub struct Controller {
    store: Arc<dyn KeyValueStore>,
    provider: Arc<dyn LocationProvider>,
    indicator: Arc<dyn IndicatorSurface>,
    host: Arc<dyn ProcessHost>,
    event_handler: Arc<dyn EventHandler>,

    request: LocationRequest,
    tx: mpsc::UnboundedSender<ControllerCommand>,

    reporting: ReportingState,
    policy: VisibilityPolicy,

    observers: Vec<(AttachmentId, Arc<dyn LocationObserver>)>,
    next_attachment_id: AttachmentId,

    subscription: Option<Subscription>,
    next_generation: u64,

    last_location: Option<Sample>,
    samples_received: u64,
    shown_indicator: Option<IndicatorContent>,

    model: Arc<ArcSwap<ControllerModel>>,
}

impl Controller {
    /// Creates a controller, reading the persisted reporting state and seeding
    /// the last known location from the provider.
    ///
    /// `tx` must be the sender for the channel later passed to [`Controller::run`].
    pub fn new(
        collaborators: Collaborators,
        request: LocationRequest,
        tx: mpsc::UnboundedSender<ControllerCommand>,
        model: Arc<ArcSwap<ControllerModel>>,
    ) -> Self {
        let Collaborators {
            store,
            provider,
            indicator,
            host,
            event_handler,
        } = collaborators;

        let reporting = ReportingState::from_flag(
            store.get_bool(KEY_REQUESTING_LOCATION_UPDATES.to_string(), false),
        );

        let last_location = match provider.last_known() {
            Ok(location) => location,
            Err(e) => {
                log::warn!("controller: failed to get last known location: {e}");
                None
            }
        };

        log::debug!("controller: created, persisted reporting state {reporting:?}");

        Self {
            store,
            provider,
            indicator,
            host,
            event_handler,

            request,
            tx,

            reporting,
            policy: VisibilityPolicy::new(),

            observers: Vec::new(),
            next_attachment_id: 1,

            subscription: None,
            next_generation: 1,

            last_location,
            samples_received: 0,
            shown_indicator: None,

            model,
        }
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ControllerCommand>) {
        self.resume();
        self.publish();

        while let Some(command) = rx.recv().await {
            match command {
                ControllerCommand::Attach { observer, callback } => {
                    let id = self.attach(observer);
                    self.publish();
                    let _ = callback.send(id);
                }
                ControllerCommand::Detach { id, callback } => {
                    let res = self.detach(id);
                    self.publish();
                    let _ = callback.send(res);
                }
                ControllerCommand::MarkReconfiguring => {
                    self.mark_reconfiguring();
                    self.publish();
                }

                ControllerCommand::Start { callback } => {
                    let res = self.start();
                    self.publish();
                    let _ = callback.send(res);
                }
                ControllerCommand::Stop { callback } => {
                    let res = self.stop();
                    self.publish();
                    let _ = callback.send(res);
                }
                ControllerCommand::LastKnownLocation { callback } => {
                    let _ = callback.send(self.last_known_location());
                }
                ControllerCommand::IndicatorAction { action, callback } => {
                    let res = self.handle_indicator_action(action);
                    self.publish();
                    let _ = callback.send(res);
                }
                ControllerCommand::Model { callback } => {
                    let _ = callback.send(self.model());
                }

                ControllerCommand::Sample { generation, sample } => {
                    if self.handle_sample(generation, sample) {
                        self.publish();
                    }
                }

                ControllerCommand::Shutdown => break,
            }
        }

        self.teardown();
    }

    /// Re-subscribes if reporting was active when the process last ran.
    pub(crate) fn resume(&mut self) {
        if !self.reporting.is_active() {
            return;
        }

        log::info!("controller: resuming location updates");
        if let Err(e) = self.start() {
            log::error!("controller: could not resume location updates: {e}");
        }
    }

    pub(crate) fn attach(&mut self, observer: Arc<dyn LocationObserver>) -> AttachmentId {
        let id = self.next_attachment_id;
        self.next_attachment_id += 1;
        self.observers.push((id, observer));

        let transition = self.policy.attach();
        log::debug!(
            "controller: attached {id}, {} attachment(s)",
            self.policy.attachments()
        );
        self.apply(transition);

        id
    }

    pub(crate) fn detach(&mut self, id: AttachmentId) -> Result<(), ControlError> {
        let Some(index) = self.observers.iter().position(|(i, _)| *i == id) else {
            if self.policy.attachments() == 0 {
                return Err(ControlError::Precondition(
                    "detach called with no attachments".to_string(),
                ));
            }
            return Err(ControlError::Precondition(format!(
                "detach called with unknown attachment {id}"
            )));
        };

        let transition = self.policy.detach(self.reporting)?;
        self.observers.remove(index);

        log::debug!(
            "controller: detached {id}, {} attachment(s)",
            self.policy.attachments()
        );
        self.apply(transition);

        Ok(())
    }

    pub(crate) fn mark_reconfiguring(&mut self) {
        log::debug!("controller: host is reconfiguring");
        self.policy.mark_reconfiguring();
    }

    pub(crate) fn start(&mut self) -> Result<(), ControlError> {
        if self.reporting.is_active() && self.subscription.is_some() {
            log::debug!("controller: start while already reporting");
            return Ok(());
        }

        log::info!("controller: requesting location updates");
        self.set_reporting(ReportingState::Active);

        let generation = self.next_generation;
        self.next_generation += 1;
        let sink = Arc::new(SampleSink::new(generation, self.tx.clone()));

        match self.provider.subscribe(self.request, sink) {
            Ok(handle) => {
                self.subscription = Some(Subscription { generation, handle });

                if self.policy.visibility() == Visibility::Unattended {
                    self.install_indicator();
                }

                Ok(())
            }
            Err(e) => {
                self.set_reporting(ReportingState::Inactive);
                log::error!("controller: lost location permission, could not request updates: {e}");
                Err(e.into())
            }
        }
    }

    pub(crate) fn stop(&mut self) -> Result<(), ControlError> {
        if !self.reporting.is_active() && self.subscription.is_none() {
            log::debug!("controller: stop while not reporting");
            return Ok(());
        }

        log::info!("controller: removing location updates");

        if let Some(subscription) = self.subscription {
            if let Err(e) = self.provider.unsubscribe(subscription.handle) {
                // the subscription is still live, so keep claiming it
                self.set_reporting(ReportingState::Active);
                log::error!("controller: lost location permission, could not remove updates: {e}");
                return Err(e.into());
            }
        }
        self.subscription = None;
        self.set_reporting(ReportingState::Inactive);

        self.cancel_indicator();
        if let Err(e) = self.host.demote_from_foreground() {
            log::error!("controller: failed to leave foreground: {e}");
        }
        if let Err(e) = self.host.request_self_termination() {
            log::error!("controller: failed to request termination: {e}");
        }

        Ok(())
    }

    pub(crate) fn last_known_location(&mut self) -> Option<Sample> {
        match self.provider.last_known() {
            Ok(Some(sample)) => {
                if self.last_location.is_none() {
                    self.last_location = Some(sample);
                }
                Some(sample)
            }
            Ok(None) => self.last_location,
            Err(e) => {
                log::warn!("controller: failed to get last known location: {e}");
                self.last_location
            }
        }
    }

    pub(crate) fn handle_indicator_action(
        &mut self,
        action: IndicatorAction,
    ) -> Result<(), ControlError> {
        match action {
            IndicatorAction::StopReporting => {
                log::info!("controller: stop requested from indicator");
                self.stop()
            }
            IndicatorAction::ReturnToApp => {
                log::debug!("controller: host returning to app from indicator");
                Ok(())
            }
        }
    }

    /// Returns whether the sample was accepted.
    pub(crate) fn handle_sample(&mut self, generation: u64, sample: Sample) -> bool {
        let current = self.subscription.map(|s| s.generation);
        if !self.reporting.is_active() || current != Some(generation) {
            log::debug!(
                "controller: dropping sample from subscription {generation}, current {current:?}"
            );
            return false;
        }

        log::debug!(
            "controller: new location ({}, {})",
            sample.latitude,
            sample.longitude
        );

        self.last_location = Some(sample);
        self.samples_received += 1;

        for (_, observer) in &self.observers {
            observer.on_location(sample);
        }

        if self.policy.visibility() == Visibility::Unattended {
            self.refresh_indicator();
        }

        true
    }

    /// Cancels the provider subscription when the process goes away. The
    /// persisted state is kept so reporting resumes on the next launch.
    pub(crate) fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            if let Err(e) = self.provider.unsubscribe(subscription.handle) {
                log::error!("controller: failed to cancel subscription on teardown: {e}");
            }
        }
        self.observers.clear();
        log::debug!("controller: torn down");
    }

    pub fn model(&self) -> ControllerModel {
        ControllerModel {
            reporting: self.reporting,
            visibility: self.policy.visibility(),
            attachments: self.policy.attachments(),
            reconfiguring: self.policy.is_reconfiguring(),
            last_location: self.last_location,
            samples_received: self.samples_received,
            indicator: self.shown_indicator.clone(),
        }
    }

    fn publish(&self) {
        let model = self.model();
        self.model.store(Arc::new(model.clone()));
        self.event_handler.on_update(model);
    }

    fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::None => {}
            Transition::Attend => {
                self.cancel_indicator();
                if let Err(e) = self.host.demote_from_foreground() {
                    log::error!("controller: failed to leave foreground: {e}");
                }
            }
            Transition::Unattend => {
                log::info!("controller: last client left, running unattended");
                self.install_indicator();
            }
        }
    }

    fn set_reporting(&mut self, reporting: ReportingState) {
        self.reporting = reporting;
        if let Err(e) = self.store.set_bool(
            KEY_REQUESTING_LOCATION_UPDATES.to_string(),
            reporting.is_active(),
        ) {
            log::error!("controller: failed to persist reporting state: {e}");
        }
    }

    /// Shows the indicator and promotes the host. Called once per move to unattended.
    fn install_indicator(&mut self) {
        if self.shown_indicator.is_some() {
            self.refresh_indicator();
        } else {
            self.show_indicator();
        }

        if let Err(e) = self.host.promote_to_foreground() {
            log::error!("controller: failed to enter foreground: {e}");
        }
    }

    fn show_indicator(&mut self) {
        let content = IndicatorContent::for_location(self.last_location.as_ref());
        match self.indicator.show(content.clone()) {
            Ok(()) => self.shown_indicator = Some(content),
            Err(e) => log::error!("controller: failed to show indicator: {e}"),
        }
    }

    fn refresh_indicator(&mut self) {
        let Some(shown) = &self.shown_indicator else {
            // an earlier show failed, the host is already promoted
            self.show_indicator();
            return;
        };

        let content = IndicatorContent::for_location(self.last_location.as_ref());
        if *shown == content {
            return;
        }

        match self.indicator.update(content.clone()) {
            Ok(()) => self.shown_indicator = Some(content),
            Err(e) => log::error!("controller: failed to update indicator: {e}"),
        }
    }

    fn cancel_indicator(&mut self) {
        if self.shown_indicator.take().is_none() {
            return;
        }
        if let Err(e) = self.indicator.cancel() {
            log::error!("controller: failed to cancel indicator: {e}");
        }
    }
}
