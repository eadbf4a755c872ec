//! Event-loop side of the dispatch layer
//!
//! The controller turns [`Action`]s into dispatched operations and applies
//! [`DispatchEvent`]s to the [`App`]. It is the only place that mutates the
//! device store and the current session, and it only does so from the
//! event loop.

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::{Action, App, AppState, PairingPrompt};
use crate::backend::DeviceBackend;
use crate::config::Config;
use crate::discovery::{reconcile, DiscoveryWorker};
use crate::dispatch::{Completion, DispatchEvent, Dispatcher, Outcome};
use crate::error::RemoteError;
use crate::models::{CommandKind, RemoteCommand};
use crate::pairing::{
    ChannelInteraction, PairingEvent, PairingReply, PairingSession, PairingWorker,
};
use crate::session::DeviceSession;
use crate::store::DeviceStore;
use crate::ui_state::{Button, ConnectionState, Notice};

pub struct Controller {
    dispatcher: Dispatcher,
    events: mpsc::UnboundedReceiver<DispatchEvent>,
    backend: Arc<dyn DeviceBackend>,
    store: Box<dyn DeviceStore>,
    config: Config,
    session: Option<Arc<DeviceSession>>,
    pairing_replies: Option<mpsc::UnboundedSender<PairingReply>>,
    last_poll: Option<Instant>,
}

impl Controller {
    pub fn new(backend: Arc<dyn DeviceBackend>, store: Box<dyn DeviceStore>, config: Config) -> Self {
        let (dispatcher, events) = Dispatcher::new();
        Self {
            dispatcher,
            events,
            backend,
            store,
            config,
            session: None,
            pairing_replies: None,
            last_poll: None,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn session(&self) -> Option<&Arc<DeviceSession>> {
        self.session.as_ref()
    }

    pub fn store(&self) -> &dyn DeviceStore {
        self.store.as_ref()
    }

    /// Show the stored devices before the first scan
    pub fn load_known(&self, app: &mut App) {
        app.set_devices(self.store.get_known_devices());
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    pub fn perform(&mut self, action: Action, app: &mut App) {
        match action {
            Action::Discover => self.discover(app),
            Action::CancelDiscovery => {
                if self.dispatcher.cancel(CommandKind::Discovery) {
                    info!("Discovery cancelled");
                }
            }
            Action::Connect(identifier) => self.connect(&identifier, app),
            Action::Pair(identifier) => self.pair(&identifier, app),
            Action::Forget(identifier) => self.forget(&identifier, app),
            Action::Remote(command) => self.remote(command, app),
            Action::PairingReply(reply) => self.reply(reply, app),
        }
    }

    fn discover(&mut self, app: &mut App) {
        let worker = DiscoveryWorker::from_config(Arc::clone(&self.backend), &self.config);
        let started = self.dispatcher.invoke(CommandKind::Discovery, async move {
            worker.discover().await.map(Outcome::Discovered)
        });
        if started.is_ok() {
            app.ui.begin(CommandKind::Discovery, "");
        }
    }

    fn connect(&mut self, identifier: &str, app: &mut App) {
        let Some(device) = app.device(identifier).cloned() else {
            warn!("Connect requested for unknown device {}", identifier);
            return;
        };
        let backend = Arc::clone(&self.backend);
        let command_timeout = self.config.command_timeout();
        let name = device.name.clone();
        let started = self.dispatcher.invoke(CommandKind::Connect, async move {
            DeviceSession::connect(backend.as_ref(), device, command_timeout)
                .await
                .map(|session| Outcome::Connected(Arc::new(session)))
        });
        if started.is_ok() {
            app.ui.begin(CommandKind::Connect, &name);
        }
    }

    fn pair(&mut self, identifier: &str, app: &mut App) {
        let Some(device) = app.device(identifier).cloned() else {
            warn!("Pair requested for unknown device {}", identifier);
            return;
        };
        if device.unpaired_services().is_empty() {
            app.ui.show_notice(Notice::info(
                "Nothing to pair",
                format!("{} has no services left to pair", device.name),
            ));
            return;
        }

        let worker = PairingWorker::from_config(Arc::clone(&self.backend), &self.config);
        let (mut interaction, replies) = ChannelInteraction::new(self.dispatcher.sender());
        let session = PairingSession::new(device.clone());
        let started = self.dispatcher.invoke(CommandKind::Pairing, async move {
            Ok(Outcome::Paired(worker.run(session, &mut interaction).await))
        });
        if started.is_ok() {
            self.pairing_replies = Some(replies);
            app.ui.begin(CommandKind::Pairing, &device.name);
        }
    }

    fn forget(&mut self, identifier: &str, app: &mut App) {
        match self.store.remove_device(identifier) {
            Ok(true) => info!("Forgot {}", identifier),
            Ok(false) => debug!("{} was not stored", identifier),
            Err(e) => warn!("Could not update device store: {}", e),
        }
        let connected = self
            .session
            .as_ref()
            .is_some_and(|s| s.device().identifier == identifier);
        if connected {
            self.session = None;
            app.ui.connection = ConnectionState::Disconnected;
            app.ui.now_playing = None;
        }
        app.remove_device(identifier);
    }

    fn remote(&mut self, command: RemoteCommand, app: &mut App) {
        app.ui.flash(Button::from(command), Instant::now());
        let Some(session) = self.session.clone() else {
            debug!("{} ignored: not connected", command);
            return;
        };
        // Rejections are expected when keys repeat faster than the device answers
        if let Err(e) = self.dispatcher.invoke(command.kind(), async move {
            session.send(command).await.map(|_| Outcome::CommandSent(command))
        }) {
            debug!("{} dropped: {}", command, e);
        }
    }

    fn reply(&mut self, reply: PairingReply, app: &mut App) {
        let Some(replies) = &self.pairing_replies else {
            debug!("Pairing reply with no pairing in progress");
            app.set_pairing_prompt(None);
            return;
        };
        if replies.send(reply).is_err() {
            debug!("Pairing already finished");
            self.pairing_replies = None;
        }
        // Keep the overlay up until the worker reports back
        if let Some(PairingPrompt::Pin { device, service, .. })
        | Some(PairingPrompt::DevicePin { device, service, .. })
        | Some(PairingPrompt::Failed { device, service, .. }) = app.pairing.clone()
        {
            app.set_pairing_prompt(Some(PairingPrompt::Working { device, service }));
        }
    }

    /// Poll now playing every configured interval while connected
    pub fn poll_now_playing(&mut self, now: Instant) {
        let Some(session) = self.session.clone() else {
            return;
        };
        if let Some(last) = self.last_poll {
            if now.duration_since(last) < self.config.now_playing_interval() {
                return;
            }
        }
        self.last_poll = Some(now);
        if let Err(e) = self.dispatcher.invoke(CommandKind::NowPlaying, async move {
            session.playing().await.map(Outcome::NowPlaying)
        }) {
            debug!("Now playing poll skipped: {}", e);
        }
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Apply every queued event. Returns how many were handled.
    pub fn drain(&mut self, app: &mut App) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle(event, app);
            handled += 1;
        }
        handled
    }

    /// Wait for the next event (tests and the CLI)
    pub async fn next_event(&mut self) -> Option<DispatchEvent> {
        self.events.recv().await
    }

    pub fn handle(&mut self, event: DispatchEvent, app: &mut App) {
        match event {
            DispatchEvent::Pairing(event) => self.handle_pairing_event(event, app),
            DispatchEvent::Finished(completion) => self.handle_completion(completion, app),
        }
    }

    fn handle_pairing_event(&mut self, event: PairingEvent, app: &mut App) {
        match event {
            PairingEvent::StepStarted { device, service } => {
                app.set_pairing_prompt(Some(PairingPrompt::Working { device, service }));
            }
            PairingEvent::PinRequested {
                device,
                service,
                length,
            } => {
                app.set_pairing_prompt(Some(PairingPrompt::Pin {
                    device,
                    service,
                    length,
                    input: String::new(),
                }));
            }
            PairingEvent::DevicePinShown {
                device,
                service,
                pin,
            } => {
                app.set_pairing_prompt(Some(PairingPrompt::DevicePin {
                    device,
                    service,
                    pin,
                }));
            }
            PairingEvent::StepFailed {
                device,
                service,
                error,
            } => {
                app.set_pairing_prompt(Some(PairingPrompt::Failed {
                    device,
                    service,
                    error,
                }));
            }
            PairingEvent::CredentialObtained { device, service } => {
                info!("Storing {} credential for {}", service, device.name);
                if let Err(e) = self.store.save_device(&device) {
                    warn!("Could not save {} credential: {}", service, e);
                    app.ui.show_notice(Notice::error(
                        "Credential not saved",
                        &RemoteError::Io(e.to_string()),
                    ));
                }
                app.upsert_device(device);
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion, app: &mut App) {
        if !self.dispatcher.accept(&completion) {
            return;
        }
        app.ui.report(&completion);

        match (completion.kind, completion.result) {
            (_, Ok(Outcome::Discovered(found))) => {
                let known = self.store.get_known_devices();
                let devices = reconcile(found, &known);
                // Stored devices seen again get their address and last_seen refreshed
                for device in devices
                    .iter()
                    .filter(|d| known.iter().any(|k| k.identifier == d.identifier))
                {
                    if let Err(e) = self.store.save_device(device) {
                        warn!("Could not refresh {}: {}", device.name, e);
                    }
                }
                app.set_devices(devices);
            }
            (_, Ok(Outcome::Connected(session))) => {
                self.last_poll = None;
                self.session = Some(session);
                app.navigate(AppState::Remote);
            }
            (_, Ok(Outcome::Paired(report))) => {
                self.pairing_replies = None;
                app.set_pairing_prompt(None);
                if !report.paired.is_empty() {
                    if let Err(e) = self.store.save_device(&report.device) {
                        warn!("Could not save {}: {}", report.device.name, e);
                    }
                }
                app.upsert_device(report.device);
            }
            (CommandKind::Pairing, Err(_)) => {
                self.pairing_replies = None;
                app.set_pairing_prompt(None);
            }
            (CommandKind::Connect, Err(_)) => {
                self.session = None;
            }
            _ => {}
        }
    }

    /// Abort all outstanding work (shutdown)
    pub fn shutdown(&mut self) {
        self.dispatcher.cancel_all();
        self.session = None;
    }
}
