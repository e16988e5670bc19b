//! Change detection for the local usage sources.
//!
//! OS notifications are coalesced through a [`Debouncer`]; a fallback tick
//! bounds staleness when notifications are lost or the watch could not be
//! installed at all.

pub mod debounce;

pub use debounce::Debouncer;

use crate::error::Result;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const RAW_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 16;
/// Floor for the fallback period; a zero period would stop the timer task.
pub const MIN_FALLBACK_INTERVAL: Duration = Duration::from_secs(1);

/// Events from the change detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A burst of source-file writes settled
    DataChanged,
    /// The periodic fallback refresh is due
    FallbackTick,
}

/// Watches the source files and emits [`ChangeEvent`]s. Dropping it releases
/// the OS watch handles and stops the timers.
pub struct ChangeDetector {
    watcher: Option<RecommendedWatcher>,
    task: JoinHandle<()>,
}

impl ChangeDetector {
    /// Must be called from within a tokio runtime.
    pub fn start(
        files: &[&Path],
        debounce: Duration,
        fallback: Duration,
    ) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (raw_tx, raw_rx) = mpsc::channel(RAW_CAPACITY);
        let watcher = install_watcher(files, raw_tx);
        let (mut detector, rx) = Self::from_raw(raw_rx, debounce, fallback);
        detector.watcher = watcher;
        (detector, rx)
    }

    /// Drives the debounce and fallback timers from an arbitrary source of
    /// raw notifications.
    pub fn from_raw(
        raw_rx: mpsc::Receiver<()>,
        debounce: Duration,
        fallback: Duration,
    ) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let fallback = fallback.max(MIN_FALLBACK_INTERVAL);
        let task = tokio::spawn(run(raw_rx, tx, debounce, fallback));
        (
            Self {
                watcher: None,
                task,
            },
            rx,
        )
    }

    /// Whether at least one OS-level watch is active.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        self.task.abort();
        if self.watcher.take().is_some() {
            debug!("Released file watches");
        }
    }
}

async fn run(
    mut raw_rx: mpsc::Receiver<()>,
    tx: mpsc::Sender<ChangeEvent>,
    debounce: Duration,
    fallback: Duration,
) {
    let mut debouncer = Debouncer::new(debounce);
    let mut fallback_tick = tokio::time::interval_at(Instant::now() + fallback, fallback);
    fallback_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut raw_open = true;

    loop {
        let deadline = debouncer.deadline();

        let event = tokio::select! {
            raw = raw_rx.recv(), if raw_open => {
                match raw {
                    Some(()) => debouncer.note(Instant::now()),
                    None => raw_open = false,
                }
                None
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if debouncer.is_pending() => {
                debouncer
                    .fire_if_due(Instant::now())
                    .then_some(ChangeEvent::DataChanged)
            }
            _ = fallback_tick.tick() => Some(ChangeEvent::FallbackTick),
        };

        if let Some(event) = event {
            debug!("Change detector emitting {:?}", event);
            if tx.send(event).await.is_err() {
                break;
            }
        }
    }
}

fn install_watcher(files: &[&Path], raw_tx: mpsc::Sender<()>) -> Option<RecommendedWatcher> {
    let names: Vec<OsString> = files
        .iter()
        .filter_map(|f| f.file_name().map(|n| n.to_os_string()))
        .collect();

    let handler = move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if is_relevant(&event, &names) {
                // A full channel already guarantees a pending refresh.
                let _ = raw_tx.try_send(());
            }
        }
        Err(e) => warn!("File watch error: {}", e),
    };

    let mut watcher = match create_watcher(handler) {
        Ok(w) => w,
        Err(e) => {
            warn!("File watching disabled, relying on fallback refresh: {}", e);
            return None;
        }
    };

    let dirs: BTreeSet<PathBuf> = files.iter().map(|f| parent_dir(f)).collect();
    let mut installed = 0;
    for dir in &dirs {
        if !dir.is_dir() {
            warn!("Not watching {}: directory does not exist", dir.display());
            continue;
        }
        match watch_dir(&mut watcher, dir) {
            Ok(()) => {
                info!("Watching {}", dir.display());
                installed += 1;
            }
            Err(e) => warn!("Failed to watch {}: {}", dir.display(), e),
        }
    }

    (installed > 0).then_some(watcher)
}

fn create_watcher<F>(handler: F) -> Result<RecommendedWatcher>
where
    F: notify::EventHandler,
{
    Ok(notify::recommended_watcher(handler)?)
}

fn watch_dir(watcher: &mut RecommendedWatcher, dir: &Path) -> Result<()> {
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(())
}

fn parent_dir(file: &Path) -> PathBuf {
    file.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn is_relevant(event: &Event, names: &[OsString]) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return false;
    }
    event.paths.iter().any(|p| {
        p.file_name()
            .map(|n| names.iter().any(|w| w.as_os_str() == n))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_is_relevant_filters_names_and_kinds() {
        let names = vec![OsString::from("stats-cache.json")];

        assert!(is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/h/.claude/stats-cache.json"),
            &names
        ));
        assert!(is_relevant(
            &event(EventKind::Create(CreateKind::File), "/h/.claude/stats-cache.json"),
            &names
        ));
        assert!(!is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/h/.claude/history.jsonl"),
            &names
        ));
        assert!(!is_relevant(
            &event(EventKind::Access(AccessKind::Any), "/h/.claude/stats-cache.json"),
            &names
        ));
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir(Path::new("/a/b.json")), PathBuf::from("/a"));
        assert_eq!(parent_dir(Path::new("b.json")), PathBuf::from("."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_one_event() {
        let (raw_tx, raw_rx) = mpsc::channel(RAW_CAPACITY);
        let (_detector, mut rx) =
            ChangeDetector::from_raw(raw_rx, Duration::from_millis(500), Duration::from_secs(60));

        for _ in 0..5 {
            raw_tx.send(()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        assert_eq!(rx.recv().await, Some(ChangeEvent::DataChanged));
        let more = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        assert!(more.is_err(), "burst produced more than one event");
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_notifications_each_fire() {
        let (raw_tx, raw_rx) = mpsc::channel(RAW_CAPACITY);
        let (_detector, mut rx) =
            ChangeDetector::from_raw(raw_rx, Duration::from_millis(500), Duration::from_secs(60));

        for _ in 0..3 {
            raw_tx.send(()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(600)).await;
        }

        for _ in 0..3 {
            assert_eq!(rx.try_recv().ok(), Some(ChangeEvent::DataChanged));
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_tick_without_notifications() {
        let (_raw_tx, raw_rx) = mpsc::channel(RAW_CAPACITY);
        let start = Instant::now();
        let (_detector, mut rx) =
            ChangeDetector::from_raw(raw_rx, Duration::from_millis(500), Duration::from_secs(60));

        assert_eq!(rx.recv().await, Some(ChangeEvent::FallbackTick));
        assert!(start.elapsed() <= Duration::from_secs(60));
        assert_eq!(rx.recv().await, Some(ChangeEvent::FallbackTick));
        assert!(start.elapsed() <= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_directories_keep_fallback() {
        let missing = Path::new("/nonexistent-ccmeter-dir/stats-cache.json");
        let (detector, mut rx) =
            ChangeDetector::start(&[missing], Duration::from_millis(500), Duration::from_secs(60));

        assert!(!detector.is_watching());
        assert_eq!(rx.recv().await, Some(ChangeEvent::FallbackTick));
    }

    #[tokio::test]
    async fn test_shutdown_closes_event_stream() {
        let (_raw_tx, raw_rx) = mpsc::channel(RAW_CAPACITY);
        let (detector, mut rx) =
            ChangeDetector::from_raw(raw_rx, Duration::from_millis(500), Duration::from_secs(60));

        detector.shutdown();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_fallback_is_floored() {
        let (_raw_tx, raw_rx) = mpsc::channel(RAW_CAPACITY);
        let start = Instant::now();
        let (_detector, mut rx) =
            ChangeDetector::from_raw(raw_rx, Duration::from_millis(500), Duration::ZERO);

        assert_eq!(rx.recv().await, Some(ChangeEvent::FallbackTick));
        assert_eq!(start.elapsed(), MIN_FALLBACK_INTERVAL);
        assert_eq!(rx.recv().await, Some(ChangeEvent::FallbackTick));
    }

    #[test]
    fn test_watch_failure_maps_to_watch_error() {
        let mut watcher = create_watcher(|_res: notify::Result<Event>| {}).unwrap();
        let err = watch_dir(&mut watcher, Path::new("/nonexistent-ccmeter-dir")).unwrap_err();
        assert!(matches!(err, Error::Watch(_)));
        assert!(!err.is_source_error());
    }
}
