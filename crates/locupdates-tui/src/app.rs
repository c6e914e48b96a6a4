use crate::{
    Args,
    event::{CoreEvent, Event, Events, LogEntry, emit},
    host::{TuiHost, TuiObserver},
    ui::log::LogState,
};
use anyhow::Context;
use locupdates::{
    Core, CoreOptions,
    controller::{AttachmentId, ControllerModel},
    model::{IndicatorAction, IndicatorContent, Sample},
    provider::SimulatedProvider,
};
use ratatui::{
    DefaultTerminal,
    crossterm::event::{KeyCode, KeyEvent, KeyModifiers},
};
use std::sync::Arc;
use tui_widgets::prompts::{State, Status, TextState};

/// Number of received samples kept for display.
const MAX_RECEIVED: usize = 200;
/// Number of log entries kept for display.
const MAX_LOG_ENTRIES: usize = 2_000;

/// Application.
#[derive(Debug)]
pub struct App<'a> {
    pub running: bool,
    pub events: Events,

    pub core: Arc<Core>,
    pub provider: Arc<SimulatedProvider>,

    pub mode: AppMode,
    pub screen: AppScreen,

    pub messages: Vec<LogEntry>,

    pub log_state: LogState,
    pub command_state: TextState<'a>,
    pub model: Option<ControllerModel>,

    /// Whether the "activity" is attached to the core.
    pub attachment: Attachment,
    /// Samples delivered to the attached observer, oldest first.
    pub received: Vec<Sample>,

    /// What the host is currently showing as its notification.
    pub indicator: Option<IndicatorContent>,
    pub foreground: bool,
    pub termination_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppScreen {
    #[default]
    Home,
    Log,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppMode {
    #[default]
    Default,
    Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attachment {
    #[default]
    Detached,
    /// An attach or detach is in flight.
    Pending,
    Attached(AttachmentId),
}

impl Attachment {
    pub fn id(self) -> Option<AttachmentId> {
        match self {
            Self::Attached(id) => Some(id),
            Self::Detached | Self::Pending => None,
        }
    }

    /// Goes pending before an attach is sent to the core.
    pub fn begin_attach(&mut self) -> anyhow::Result<()> {
        match self {
            Self::Detached => {
                *self = Self::Pending;
                Ok(())
            }
            Self::Pending => anyhow::bail!("still waiting for the core"),
            Self::Attached(_) => anyhow::bail!("already attached"),
        }
    }

    /// Goes pending before a detach is sent to the core, returning the id
    /// to detach.
    pub fn begin_detach(&mut self) -> anyhow::Result<AttachmentId> {
        let id = match self {
            Self::Attached(id) => *id,
            Self::Pending => anyhow::bail!("still waiting for the core"),
            Self::Detached => anyhow::bail!("not attached"),
        };
        *self = Self::Pending;
        Ok(id)
    }
}

/// Follow-ups the app sends itself.
#[derive(Debug)]
pub enum AppEvent {
    Exit,

    CommandMode,
    ExitMode,

    Screen(AppScreen),

    Attached(AttachmentId),
    Detached,
}

impl<'a> App<'a> {
    pub async fn new(args: &Args) -> anyhow::Result<Self> {
        // start as early as possible, the core reports on startup
        let events = Events::start()?;

        let provider = Arc::new(SimulatedProvider::new(args.lat, args.lon));
        provider.set_permission_granted(!args.deny_permission);

        let host = Arc::new(TuiHost);
        let core = Core::new(
            host.clone(),
            provider.clone(),
            host.clone(),
            host,
            CoreOptions {
                init_logging: false,
                in_memory: args.in_memory,
                update_interval_ms: args.interval_ms,
                fastest_update_interval_ms: args.interval_ms / 2,
                ..Default::default()
            },
        )?;

        let mut app = Self {
            running: true,
            events,

            core,
            provider,

            mode: AppMode::default(),
            screen: AppScreen::default(),

            messages: Vec::new(),

            log_state: LogState::default(),
            command_state: TextState::default(),
            model: None,

            attachment: Attachment::default(),
            received: Vec::new(),

            indicator: None,
            foreground: false,
            termination_requested: false,
        };

        if !args.headless {
            app.spawn_attach()?;
        }

        Ok(app)
    }

    /// Run the application's main loop.
    pub async fn run(mut self, mut terminal: DefaultTerminal) -> anyhow::Result<()> {
        while self.running {
            terminal.draw(|frame| self.render(frame))?;
            match self.events.next().await? {
                Event::Redraw => {}
                Event::Input(crossterm::event::Event::Key(key_event)) => {
                    self.handle_key_event(key_event)
                }
                Event::Input(_) => {}
                Event::App(app_event) => self
                    .handle_app_event(app_event)
                    .context("handling app event failed")?,
                Event::Core(core_event) => self.handle_core_event(core_event),
                Event::Log(entry) => {
                    self.messages.push(entry);
                    if self.messages.len() > MAX_LOG_ENTRIES {
                        self.messages.remove(0);
                    }
                }
            }
        }

        // process teardown, reporting resumes on the next launch if it was active
        self.core.shutdown()?;

        Ok(())
    }

    pub fn handle_key_event(&mut self, key_event: KeyEvent) {
        if self.mode == AppMode::Command {
            self.command_state.handle_key_event(key_event);

            match self.command_state.status() {
                Status::Done => {
                    let command = self.command_state.value().to_string();
                    self.run_command(&command);
                    self.events.send(AppEvent::ExitMode);
                }
                Status::Aborted => self.events.send(AppEvent::ExitMode),
                Status::Pending => {}
            }
            return;
        }

        match (self.screen, key_event.code) {
            (_, KeyCode::Char(':') | KeyCode::Char('/')) => self.events.send(AppEvent::CommandMode),

            (_, KeyCode::Char('1')) => self.events.send(AppEvent::Screen(AppScreen::Home)),
            (_, KeyCode::Char('2')) => self.events.send(AppEvent::Screen(AppScreen::Log)),
            (_, KeyCode::Char('?')) => self.events.send(AppEvent::Screen(AppScreen::Help)),

            (_, KeyCode::Esc | KeyCode::Char('q')) => self.events.send(AppEvent::Exit),
            (_, KeyCode::Char('c' | 'C')) if key_event.modifiers == KeyModifiers::CONTROL => {
                self.events.send(AppEvent::Exit)
            }

            (AppScreen::Home, KeyCode::Char('s')) => self.run_command("start"),
            (AppScreen::Home, KeyCode::Char('x')) => self.run_command("stop"),
            (AppScreen::Home, KeyCode::Char('a')) => match self.attachment {
                Attachment::Detached => self.run_command("attach"),
                Attachment::Attached(_) => self.run_command("detach"),
                Attachment::Pending => log::info!("app: still waiting for the core"),
            },
            (AppScreen::Home, KeyCode::Char('r')) => self.run_command("rotate"),

            (AppScreen::Log, KeyCode::Up) => self.log_state.scroll_up(),
            (AppScreen::Log, KeyCode::Down) => self.log_state.scroll_down(),
            (AppScreen::Log, KeyCode::PageUp) => self.log_state.page_up(),
            (AppScreen::Log, KeyCode::PageDown) => self.log_state.page_down(),
            (AppScreen::Log, KeyCode::Home | KeyCode::Char('g')) => self.log_state.to_top(),
            (AppScreen::Log, KeyCode::End | KeyCode::Char('G')) => self.log_state.to_bottom(),
            (AppScreen::Log, KeyCode::Char('f')) => self.log_state.toggle_follow(),
            (AppScreen::Log, KeyCode::Char('v')) => self.log_state.cycle_level(),

            _ => {}
        }
    }

    pub fn handle_app_event(&mut self, app_event: AppEvent) -> anyhow::Result<()> {
        match app_event {
            AppEvent::Exit => self.running = false,

            AppEvent::CommandMode => {
                self.mode = AppMode::Command;
                self.command_state.focus();
            }
            AppEvent::ExitMode => {
                self.mode = AppMode::Default;
                self.command_state = TextState::default();
            }

            AppEvent::Screen(screen) => self.screen = screen,

            AppEvent::Attached(id) => self.attachment = Attachment::Attached(id),
            AppEvent::Detached => self.attachment = Attachment::Detached,
        }
        Ok(())
    }

    fn handle_core_event(&mut self, core_event: CoreEvent) {
        match core_event {
            CoreEvent::Model(model) => self.model = Some(*model),
            CoreEvent::Sample(sample) => {
                self.received.push(sample);
                if self.received.len() > MAX_RECEIVED {
                    self.received.remove(0);
                }
            }
            CoreEvent::IndicatorShown(content) | CoreEvent::IndicatorUpdated(content) => {
                self.indicator = Some(content);
            }
            CoreEvent::IndicatorCancelled => self.indicator = None,
            CoreEvent::Foreground(foreground) => {
                self.foreground = foreground;
                self.termination_requested = false;
            }
            CoreEvent::TerminationRequested => {
                log::info!("app: core allows termination");
                self.termination_requested = true;
            }
        }
    }

    fn run_command(&mut self, command: &str) {
        if let Err(e) = self.handle_command(command) {
            log::error!("app: {e:#}");
        }
    }

    pub fn handle_command(&mut self, command: &str) -> anyhow::Result<()> {
        let parts = command.split_whitespace().collect::<Vec<_>>();

        let Some(&name) = parts.first() else {
            return Ok(());
        };

        match name {
            "q" => self.events.send(AppEvent::Exit),

            "s" | "start" => {
                let core = self.core.clone();
                tokio::spawn(async move {
                    if let Err(e) = core.start().await {
                        log::error!("app: error starting updates: {e:#}");
                    }
                });
            }

            "x" | "stop" => {
                let core = self.core.clone();
                tokio::spawn(async move {
                    if let Err(e) = core.stop().await {
                        log::error!("app: error stopping updates: {e:#}");
                    }
                });
            }

            "attach" => self.spawn_attach()?,

            "detach" => {
                let id = self.attachment.begin_detach()?;
                let core = self.core.clone();
                tokio::spawn(async move {
                    match core.detach(id).await {
                        Ok(()) => emit(AppEvent::Detached),
                        Err(e) => {
                            // the core still counts us
                            emit(AppEvent::Attached(id));
                            log::error!("app: error detaching: {e:#}");
                        }
                    }
                });
            }

            "r" | "rotate" => {
                let id = self.attachment.begin_detach()?;
                log::info!("app: simulating rotation");

                let core = self.core.clone();
                tokio::spawn(async move {
                    let res = async {
                        core.mark_reconfiguring()?;
                        core.detach(id).await?;
                        core.attach(Arc::new(TuiObserver)).await
                    }
                    .await;

                    match res {
                        Ok(id) => emit(AppEvent::Attached(id)),
                        Err(e) => {
                            emit(AppEvent::Detached);
                            log::error!("app: error during rotation: {e:#}");
                        }
                    }
                });
            }

            "deny" => {
                self.provider.set_permission_granted(false);
                log::info!("app: location permission revoked");
            }
            "grant" => {
                self.provider.set_permission_granted(true);
                log::info!("app: location permission granted");
            }

            "tap" => {
                let action = match parts.get(1) {
                    Some(&"stop") => IndicatorAction::StopReporting,
                    Some(&"app") => IndicatorAction::ReturnToApp,
                    _ => anyhow::bail!("usage: tap <stop|app>"),
                };

                if self.indicator.is_none() {
                    anyhow::bail!("no notification to tap");
                }

                if action == IndicatorAction::ReturnToApp && self.attachment == Attachment::Detached
                {
                    self.spawn_attach()?;
                }

                let core = self.core.clone();
                tokio::spawn(async move {
                    if let Err(e) = core.handle_indicator_action(action).await {
                        log::error!("app: error handling notification action: {e:#}");
                    }
                });
            }

            "l" | "last" => {
                let core = self.core.clone();
                tokio::spawn(async move {
                    match core.last_known_location().await {
                        Ok(Some(sample)) => log::info!(
                            "app: last known location ({:.6}, {:.6}) ±{:.0}m",
                            sample.latitude,
                            sample.longitude,
                            sample.accuracy_meters
                        ),
                        Ok(None) => log::info!("app: no last known location"),
                        Err(e) => log::error!("app: error getting last location: {e:#}"),
                    }
                });
            }

            "clear" => self.received.clear(),

            "help" | "h" | "?" => self.events.send(AppEvent::Screen(AppScreen::Help)),

            _ => anyhow::bail!("unknown command: {command}"),
        }
        Ok(())
    }

    fn spawn_attach(&mut self) -> anyhow::Result<()> {
        self.attachment.begin_attach()?;

        let core = self.core.clone();
        tokio::spawn(async move {
            match core.attach(Arc::new(TuiObserver)).await {
                Ok(id) => emit(AppEvent::Attached(id)),
                Err(e) => {
                    emit(AppEvent::Detached);
                    log::error!("app: error attaching: {e:#}");
                }
            }
        });
        Ok(())
    }
}
