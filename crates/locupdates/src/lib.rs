pub mod controller;
pub mod error;
pub mod host;
pub mod model;
pub mod policy;
pub mod provider;
pub mod store;

use crate::{
    controller::{
        AttachmentId, Collaborators, Controller, ControllerCommand, ControllerModel,
        LocationObserver,
    },
    error::{CoreError, core_error},
    host::{IndicatorSurface, ProcessHost},
    model::{
        DEFAULT_FASTEST_UPDATE_INTERVAL_MS, DEFAULT_UPDATE_INTERVAL_MS, IndicatorAction,
        LocationRequest, Priority, Sample,
    },
    provider::LocationProvider,
    store::{KeyValueStore, SqliteStore},
};
use anyhow::Context;
use arc_swap::ArcSwap;
use log::{debug, error};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot};

uniffi::setup_scaffolding!();

/// How long a caller waits for the worker thread to answer.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Foreign trait implemented by the host for receiving state updates from the Rust core.
#[uniffi::export(with_foreign)]
pub trait EventHandler: Send + Sync {
    fn on_update(&self, model: ControllerModel);
}

/// Options passed by the host when creating the [`Core`].
#[derive(Debug, Clone, uniffi::Record)]
pub struct CoreOptions {
    /// Whether the core installs its own logger. Hosts with their own logger set this to false.
    #[uniffi(default = true)]
    pub init_logging: bool,
    /// Keep the reporting flag in memory only, without persisting to disk.
    #[uniffi(default = false)]
    pub in_memory: bool,
    /// Directory for the settings database. Defaults to the platform data directory.
    #[uniffi(default = None)]
    pub data_dir: Option<String>,

    #[uniffi(default = 10000)]
    pub update_interval_ms: u64,
    #[uniffi(default = 5000)]
    pub fastest_update_interval_ms: u64,
    pub priority: Priority,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            init_logging: true,
            in_memory: false,
            data_dir: None,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            fastest_update_interval_ms: DEFAULT_FASTEST_UPDATE_INTERVAL_MS,
            priority: Priority::default(),
        }
    }
}

impl CoreOptions {
    fn location_request(&self) -> anyhow::Result<LocationRequest> {
        let request = LocationRequest {
            interval_ms: self.update_interval_ms,
            fastest_interval_ms: self.fastest_update_interval_ms,
            priority: self.priority,
        };
        request.validate().context("invalid location request")?;
        Ok(request)
    }

    fn open_store(&self) -> anyhow::Result<SqliteStore> {
        if self.in_memory {
            return SqliteStore::open_in_memory().context("failed to open in-memory store");
        }

        let data_dir = match &self.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => directories_next::ProjectDirs::from("", "", "locupdates")
                .context("failed to get project directories")?
                .data_local_dir()
                .to_path_buf(),
        };

        std::fs::create_dir_all(&data_dir).context("failed to create data directory")?;

        SqliteStore::open_file(&data_dir.join("locupdates.db")).context("failed to open store")
    }
}

/// Long-lived object created by the host as the entry point to the Rust core.
#[derive(Debug, uniffi::Object)]
pub struct Core {
    controller_tx: mpsc::UnboundedSender<ControllerCommand>,
    model: Arc<ArcSwap<ControllerModel>>,
}

#[uniffi::export]
impl Core {
    #[uniffi::constructor]
    pub fn new(
        event_handler: Arc<dyn EventHandler>,
        provider: Arc<dyn LocationProvider>,
        indicator: Arc<dyn IndicatorSurface>,
        host: Arc<dyn ProcessHost>,
        options: CoreOptions,
    ) -> Result<Arc<Self>, CoreError> {
        if options.init_logging {
            init_logging();
        }

        let store = options.open_store()?;
        Self::with_store(
            event_handler,
            provider,
            indicator,
            host,
            Arc::new(store),
            options,
        )
    }

    /// Like [`Core::new`], but with a host-provided settings store.
    #[uniffi::constructor]
    pub fn with_store(
        event_handler: Arc<dyn EventHandler>,
        provider: Arc<dyn LocationProvider>,
        indicator: Arc<dyn IndicatorSurface>,
        host: Arc<dyn ProcessHost>,
        store: Arc<dyn KeyValueStore>,
        options: CoreOptions,
    ) -> Result<Arc<Self>, CoreError> {
        debug!("core: starting core");

        let request = options.location_request()?;
        let (controller_tx, controller_rx) = mpsc::unbounded_channel();
        let model = Arc::new(ArcSwap::from_pointee(ControllerModel::default()));

        let controller = Controller::new(
            Collaborators {
                store,
                provider,
                indicator,
                host,
                event_handler,
            },
            request,
            controller_tx.clone(),
            model.clone(),
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to build controller runtime")?;

        // spawn controller thread
        std::thread::Builder::new()
            .name("locupdates-controller".to_string())
            .spawn(move || {
                runtime.block_on(async move {
                    debug!("core: inside async runtime - running controller");
                    controller.run(controller_rx).await;
                    debug!("core: inside async runtime - exiting");
                });
            })
            .context("failed to spawn controller thread")?;

        Ok(Arc::new(Self {
            controller_tx,
            model,
        }))
    }

    /// Attaches a client that displays samples itself. Suppresses the indicator.
    pub async fn attach(
        &self,
        observer: Arc<dyn LocationObserver>,
    ) -> Result<AttachmentId, CoreError> {
        self.request(|callback| ControllerCommand::Attach { observer, callback })
            .await
    }

    /// Detaches a client. Once the last client leaves while reporting, the indicator is shown.
    pub async fn detach(&self, id: AttachmentId) -> Result<(), CoreError> {
        self.request(|callback| ControllerCommand::Detach { id, callback })
            .await?
            .context("failed to detach")
            .map_err(CoreError::from)
    }

    /// The host is about to be recreated (e.g. a rotation). The next detach
    /// to zero will not show the indicator.
    pub fn mark_reconfiguring(&self) -> Result<(), CoreError> {
        self.controller_tx
            .send(ControllerCommand::MarkReconfiguring)
            .context("failed to send to controller thread")?;

        Ok(())
    }

    pub async fn start(&self) -> Result<(), CoreError> {
        self.request(|callback| ControllerCommand::Start { callback })
            .await?
            .context("failed to start location updates")
            .map_err(CoreError::from)
    }

    pub async fn stop(&self) -> Result<(), CoreError> {
        self.request(|callback| ControllerCommand::Stop { callback })
            .await?
            .context("failed to stop location updates")
            .map_err(CoreError::from)
    }

    pub async fn last_known_location(&self) -> Result<Option<Sample>, CoreError> {
        self.request(|callback| ControllerCommand::LastKnownLocation { callback })
            .await
    }

    /// Called by the host when the user taps an action on the indicator.
    pub async fn handle_indicator_action(&self, action: IndicatorAction) -> Result<(), CoreError> {
        self.request(|callback| ControllerCommand::IndicatorAction { action, callback })
            .await?
            .context("failed to handle indicator action")
            .map_err(CoreError::from)
    }

    /// Latest published model, without waiting for the controller.
    pub fn model(&self) -> ControllerModel {
        ControllerModel::clone(&self.model.load())
    }

    /// Model after every command sent so far has been applied.
    pub async fn current_model(&self) -> Result<ControllerModel, CoreError> {
        self.request(|callback| ControllerCommand::Model { callback })
            .await
    }

    /// Tears the controller down as if the process were going away. Pending
    /// subscriptions are cancelled, the persisted reporting flag is kept.
    pub fn shutdown(&self) -> Result<(), CoreError> {
        self.controller_tx
            .send(ControllerCommand::Shutdown)
            .context("failed to send to controller thread")?;

        Ok(())
    }
}

impl Core {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> ControllerCommand,
    ) -> Result<T, CoreError> {
        let (callback_tx, callback_rx) = oneshot::channel();

        self.controller_tx
            .send(command(callback_tx))
            .context("failed to send to controller thread")?;

        async_std::future::timeout(COMMAND_TIMEOUT, callback_rx)
            .await
            .map_err(|_elapsed| core_error!("controller timed out"))?
            .map_err(|_dropped| core_error!("controller stopped, sender dropped"))
    }
}

impl Drop for Core {
    fn drop(&mut self) {
        let _ = self.controller_tx.send(ControllerCommand::Shutdown);
    }
}

fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Trace) // limit log level
                .with_tag("locupdates")
                .with_filter(android_logger::FilterBuilder::new().parse("debug").build()),
        );
    }
    #[cfg(not(target_os = "android"))]
    {
        if let Err(e) =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
                .try_init()
        {
            error!("core: logger already initialized: {e}");
        }
    }
    log_panics::init();
}
