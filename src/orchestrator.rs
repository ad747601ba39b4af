use crate::config::SyncConfig;
use crate::error::{AppError, Result};
use crate::feed::{ConnectionStatus, FeedEvent, PushFeed, Subscription};
use crate::fetcher::EnvironmentalSource;
use crate::models::{FarmSettings, FarmSnapshot, SensorUpdate};
use crate::schedule::{fallback_schedule, ScheduleGenerator, ScheduleItem};
use crate::state::{FarmState, SensorCommand};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Largest downward step of the drift random walk, in moisture %
const DRIFT_DOWN: f64 = 2.5;

/// Largest upward step of the drift random walk, in moisture %
const DRIFT_UP: f64 = 1.5;

/// One step of the moisture random walk: `current` moved by a value in
/// `[-DRIFT_DOWN, DRIFT_UP)` and clamped to `[0, 100]`.
pub fn drift_moisture<R: Rng + ?Sized>(current: f64, rng: &mut R) -> f64 {
    (current + rng.gen_range(-DRIFT_DOWN..DRIFT_UP)).clamp(0.0, 100.0)
}

/// Requests accepted by a running orchestrator
#[derive(Debug, Clone)]
pub enum Command {
    /// Manual edit. An empty update means "go back live".
    Override(SensorUpdate),
    ClearOverride,
    SaveSettings(FarmSettings),
}

/// External collaborators the orchestrator drives
pub struct Sources {
    pub environment: Arc<dyn EnvironmentalSource>,
    pub schedule: Arc<dyn ScheduleGenerator>,
    pub feed: Arc<dyn PushFeed>,
}

/// Consumer side of a running orchestrator
#[derive(Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Option<FarmSnapshot>>,
    schedule: watch::Receiver<Vec<ScheduleItem>>,
    status: watch::Receiver<ConnectionStatus>,
}

impl OrchestratorHandle {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::ChannelClosed)
    }

    pub async fn override_sensors(&self, update: SensorUpdate) -> Result<()> {
        self.send(Command::Override(update)).await
    }

    pub async fn clear_override(&self) -> Result<()> {
        self.send(Command::ClearOverride).await
    }

    pub async fn save_settings(&self, settings: FarmSettings) -> Result<()> {
        self.send(Command::SaveSettings(settings)).await
    }

    /// Latest snapshot, `None` until the history has been seeded
    pub fn snapshot(&self) -> Option<FarmSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn schedule(&self) -> Vec<ScheduleItem> {
        self.schedule.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Option<FarmSnapshot>> {
        self.snapshot.clone()
    }

    pub fn watch_schedule(&self) -> watch::Receiver<Vec<ScheduleItem>> {
        self.schedule.clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

/// Results reported back by spawned work
enum Completion {
    Sync {
        session: u64,
        revision: u64,
        update: SensorUpdate,
    },
    Schedule {
        session: u64,
        items: Vec<ScheduleItem>,
    },
}

/// Owns the farm state and serialises every update to it.
///
/// A session starts on launch and whenever the location or feed settings
/// change: it subscribes to the feed and runs the initial environmental
/// sync. Results of a superseded session are dropped.
pub struct Orchestrator {
    config: SyncConfig,
    state: FarmState,
    sources: Sources,
    session: u64,
    subscription: Subscription,
    feed_rx: mpsc::UnboundedReceiver<FeedEvent>,
    commands_rx: mpsc::Receiver<Command>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    snapshot_tx: watch::Sender<Option<FarmSnapshot>>,
    schedule_tx: watch::Sender<Vec<ScheduleItem>>,
    status_tx: watch::Sender<ConnectionStatus>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        config: SyncConfig,
        state: FarmState,
        sources: Sources,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, OrchestratorHandle) {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (_, feed_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let (schedule_tx, schedule_rx) = watch::channel(Vec::new());
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Idle);

        let orchestrator = Self {
            config,
            state,
            sources,
            session: 0,
            subscription: Subscription::idle(),
            feed_rx,
            commands_rx,
            completions_tx,
            completions_rx,
            snapshot_tx,
            schedule_tx,
            status_tx,
            shutdown_rx,
        };

        let handle = OrchestratorHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
            schedule: schedule_rx,
            status: status_rx,
        };

        (orchestrator, handle)
    }

    pub async fn run(&mut self) -> Result<()> {
        let drift_period = self.config.drift_interval();
        info!(
            "Orchestrator starting for '{}' with {}s drift interval",
            self.state.settings().location,
            self.config.drift_interval_seconds
        );

        self.start_session();

        let mut drift = interval_at(Instant::now() + drift_period, drift_period);
        drift.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping orchestrator");
                    break;
                }
                Some(command) = self.commands_rx.recv() => {
                    self.handle_command(command);
                }
                Some(completion) = self.completions_rx.recv() => {
                    self.handle_completion(completion);
                }
                Some(event) = self.feed_rx.recv() => {
                    self.handle_feed_event(event);
                }
                _ = drift.tick() => {
                    self.drift();
                }
            }
        }

        self.teardown();
        Ok(())
    }

    fn start_session(&mut self) {
        self.subscription.unsubscribe();
        self.session += 1;

        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        self.feed_rx = feed_rx;
        self.subscription = self.sources.feed.subscribe(self.state.settings(), feed_tx);

        let session = self.session;
        let revision = self.state.history().revision();
        let location = self.state.settings().location.clone();
        let environment = Arc::clone(&self.sources.environment);
        let completions = self.completions_tx.clone();

        info!("Starting sync session {} for '{}'", session, location);
        tokio::spawn(async move {
            let update = match environment.fetch(&location).await {
                Ok(update) => update,
                Err(e) => {
                    warn!(
                        "Environmental lookup for '{}' failed, using fallback data: {}",
                        location, e
                    );
                    SensorUpdate::environmental_fallback()
                }
            };
            let _ = completions.send(Completion::Sync {
                session,
                revision,
                update,
            });
        });
    }

    fn teardown(&mut self) {
        if self.subscription.unsubscribe() {
            debug!("Live feed unsubscribed");
        }
        self.status_tx.send_replace(ConnectionStatus::Idle);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Override(update) if update.is_empty() => {
                self.apply(SensorCommand::ClearOverride);
            }
            Command::Override(update) => {
                self.apply(SensorCommand::Override(update));
            }
            Command::ClearOverride => {
                self.apply(SensorCommand::ClearOverride);
            }
            Command::SaveSettings(settings) => {
                let resync = settings.requires_resync(self.state.settings());
                self.state.save_settings(settings);
                self.publish();
                if resync {
                    self.start_session();
                }
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Sync {
                session,
                revision,
                update,
            } => {
                if session != self.session {
                    debug!("Dropping sync result from superseded session {}", session);
                    return;
                }
                if self.config.discard_stale_sync && revision != self.state.history().revision() {
                    warn!(
                        "Discarding initial sync result: history moved from revision {} to {} while it was in flight",
                        revision,
                        self.state.history().revision()
                    );
                    return;
                }
                if self.apply(SensorCommand::Enrich(update)) {
                    self.request_schedule();
                }
            }
            Completion::Schedule { session, items } => {
                if session != self.session {
                    debug!("Dropping schedule from superseded session {}", session);
                    return;
                }
                info!("Irrigation schedule updated with {} items", items.len());
                self.schedule_tx.send_replace(items);
            }
        }
    }

    fn handle_feed_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Data(update) => {
                debug!("Live feed update: {:?}", update);
                self.apply(SensorCommand::LiveUpdate(update));
            }
            FeedEvent::Status(status) => {
                info!("Live feed status: {}", status);
                self.status_tx.send_replace(status);
            }
        }
    }

    fn drift(&mut self) {
        let Ok(current) = self.state.history().current_sample() else {
            return;
        };

        let moisture = drift_moisture(current.soil_moisture, &mut rand::thread_rng());
        self.apply(SensorCommand::Drift(SensorUpdate::soil_moisture(moisture)));
    }

    /// Apply a command and publish the new snapshot. Returns whether the
    /// command succeeded.
    fn apply(&mut self, command: SensorCommand) -> bool {
        match self.state.apply(command) {
            Ok(_) => {
                self.publish();
                true
            }
            Err(e) => {
                error!("Sensor update rejected: {}", e);
                false
            }
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.state.snapshot());
    }

    fn request_schedule(&self) {
        let Some(snapshot) = self.state.snapshot() else {
            return;
        };
        let session = self.session;
        let generator = Arc::clone(&self.sources.schedule);
        let completions = self.completions_tx.clone();

        tokio::spawn(async move {
            let items = match generator
                .generate(&snapshot.settings, &snapshot.sample, &snapshot.budget)
                .await
            {
                Ok(items) if !items.is_empty() => items,
                Ok(_) => {
                    warn!("Schedule generator returned no items, using fallback schedule");
                    fallback_schedule()
                }
                Err(e) => {
                    warn!("Schedule generation failed, using fallback schedule: {}", e);
                    fallback_schedule()
                }
            };
            let _ = completions.send(Completion::Schedule { session, items });
        });
    }

    pub fn state(&self) -> &FarmState {
        &self.state
    }
}
