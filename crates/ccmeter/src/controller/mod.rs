//! Reconciliation controller.
//!
//! Every trigger (settled file change, fallback tick, remote poll result,
//! manual request) is delivered over one bounded channel to a single consumer
//! loop. The loop is the only writer of engine state; producers just send.

use crate::config::EngineSettings;
use crate::datasources::SnapshotLoader;
use crate::models::{StatusView, TokenSummary, UsageInfo};
use crate::remote::{self, QuotaProbe};
use crate::summary::SummaryBuilder;
use crate::watcher::{ChangeDetector, ChangeEvent};
use chrono::Local;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const TRIGGER_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Change(ChangeEvent),
    /// A remote poll finished; `None` means it failed.
    PollCompleted(Option<UsageInfo>),
    Manual,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Refreshing,
}

/// Cloneable access to the controller's outputs and inputs.
#[derive(Clone)]
pub struct ControllerHandle {
    triggers: mpsc::Sender<Trigger>,
    summary: watch::Receiver<Arc<StatusView>>,
    percent: watch::Receiver<Option<u8>>,
    state: watch::Receiver<RefreshState>,
}

impl ControllerHandle {
    pub fn subscribe_summary(&self) -> watch::Receiver<Arc<StatusView>> {
        self.summary.clone()
    }

    pub fn subscribe_percent(&self) -> watch::Receiver<Option<u8>> {
        self.percent.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RefreshState> {
        self.state.clone()
    }

    /// Requests an immediate refresh (and an out-of-cycle remote poll when a
    /// credential is configured).
    pub fn refresh(&self) {
        if let Err(e) = self.triggers.try_send(Trigger::Manual) {
            // Full means a refresh is already queued.
            debug!("Manual refresh not queued: {}", e);
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.triggers.send(Trigger::Shutdown).await;
    }
}

pub struct Controller {
    settings: EngineSettings,
    probe: Arc<dyn QuotaProbe>,
    loader: SnapshotLoader,
    builder: SummaryBuilder,
    triggers_tx: mpsc::Sender<Trigger>,
    triggers_rx: mpsc::Receiver<Trigger>,
    summary_tx: watch::Sender<Arc<StatusView>>,
    percent_tx: watch::Sender<Option<u8>>,
    state_tx: watch::Sender<RefreshState>,
    poll_now: Arc<Notify>,
    last_known_usage: Option<UsageInfo>,
}

impl Controller {
    pub fn new(settings: EngineSettings, probe: Arc<dyn QuotaProbe>) -> (Self, ControllerHandle) {
        let (triggers_tx, triggers_rx) = mpsc::channel(TRIGGER_CAPACITY);
        let initial = StatusView::new(TokenSummary::empty(Local::now().date_naive()), None);
        let (summary_tx, summary_rx) = watch::channel(Arc::new(initial));
        let (percent_tx, percent_rx) = watch::channel(None);
        let (state_tx, state_rx) = watch::channel(RefreshState::Idle);

        let handle = ControllerHandle {
            triggers: triggers_tx.clone(),
            summary: summary_rx,
            percent: percent_rx,
            state: state_rx,
        };

        let controller = Self {
            loader: SnapshotLoader::new(settings.config.clone()),
            builder: SummaryBuilder::new(Arc::clone(&settings.pricing), settings.today_cost),
            settings,
            probe,
            triggers_tx,
            triggers_rx,
            summary_tx,
            percent_tx,
            state_tx,
            poll_now: Arc::new(Notify::new()),
            last_known_usage: None,
        };

        (controller, handle)
    }

    /// Runs until [`ControllerHandle::shutdown`] is called. Watches and
    /// background tasks are released before return.
    pub async fn run(mut self) {
        info!("Controller started");

        let (detector, mut changes) = ChangeDetector::start(
            &self.settings.config.watched_files(),
            self.settings.debounce,
            self.settings.fallback_interval,
        );
        if !detector.is_watching() {
            warn!(
                "No file watches active, refreshing every {}s",
                self.settings.fallback_interval.as_secs()
            );
        }
        let poller = self.spawn_poller();

        self.refresh().await;

        loop {
            let trigger = tokio::select! {
                Some(event) = changes.recv() => Trigger::Change(event),
                trigger = self.triggers_rx.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            debug!("Handling trigger {:?}", trigger);
            match trigger {
                Trigger::Change(_) => self.refresh().await,
                Trigger::Manual => {
                    if self.settings.credential.is_some() {
                        self.poll_now.notify_one();
                    }
                    self.refresh().await;
                }
                Trigger::PollCompleted(Some(usage)) => {
                    self.apply_usage(usage);
                    self.refresh().await;
                }
                Trigger::PollCompleted(None) => {
                    debug!("Remote poll failed, keeping last known usage");
                }
                Trigger::Shutdown => break,
            }
        }

        if let Some(poller) = poller {
            poller.abort();
        }
        detector.shutdown();
        self.state_tx.send_replace(RefreshState::Idle);
        info!("Controller stopped");
    }

    fn apply_usage(&mut self, usage: UsageInfo) {
        let percent = Some(usage.display_percent());
        self.percent_tx.send_if_modified(|current| {
            if *current == percent {
                return false;
            }
            *current = percent;
            true
        });
        self.last_known_usage = Some(usage);
    }

    async fn refresh(&mut self) {
        self.state_tx.send_replace(RefreshState::Refreshing);

        let stats = self.loader.load_stats().await;
        let projects = self.loader.load_project_configs().await;
        let summary = self
            .builder
            .build(stats.as_ref(), &projects, Local::now().date_naive());
        let view = StatusView::new(summary, self.last_known_usage.clone());

        self.state_tx.send_replace(RefreshState::Idle);
        self.summary_tx.send_replace(Arc::new(view));
    }

    fn spawn_poller(&self) -> Option<JoinHandle<()>> {
        let credential = self.settings.credential.clone()?;
        let probe = Arc::clone(&self.probe);
        let triggers = self.triggers_tx.clone();
        let poll_now = Arc::clone(&self.poll_now);
        let period = self.settings.effective_poll_interval();
        info!("Polling remote usage every {}s", period.as_secs());

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = poll_now.notified() => ticker.reset(),
                }

                let usage = remote::poll_usage(probe.as_ref(), &credential).await;
                if triggers.send(Trigger::PollCompleted(usage)).await.is_err() {
                    break;
                }
            }
        }))
    }
}
