//! Watch bot: periodically pushes local changes without user interaction.
//!
//! Each cycle re-reads the selected folder, diffs it against the branch and
//! pushes whatever changed. Cycles never overlap: a tick that finds the
//! previous cycle still running is skipped, while the first cycle after
//! `start` waits for it. A failed cycle is logged and the next tick runs as
//! usual.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info_span, Instrument};

use crate::config::{BotInterval, SyncSettings};
use crate::diff::{changed_entries, diff};
use crate::error::{Result, SyncError};
use crate::local::{read_directory, DirectoryHandle};
use crate::progress::NoProgress;
use crate::push::{fetch_remote_tree, push, PushOptions, PushOutcome, SyncTarget};
use crate::remote::{Credential, RemoteRepository};

/// How many changed file names a summary line lists.
const SAMPLE_FILES: usize = 3;

/// Buffer of the log stream; slow subscribers lag past this.
const LOG_CHANNEL_CAPACITY: usize = 256;

/// Severity of a bot log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BotLogKind {
    Info,
    Success,
    Error,
    Action,
}

/// One timestamped line of the bot's activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BotLogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub kind: BotLogKind,
}

impl BotLogEntry {
    pub fn new(kind: BotLogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            kind,
        }
    }
}

/// Handle returned by [`WatchBot::start`]. Stopping the bot invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotToken {
    generation: u64,
}

/// Result of a single cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NoChanges,
    Pushed(PushOutcome),
    /// The previous cycle was still running.
    Skipped,
    Failed(String),
    /// The bot was stopped or restarted while the cycle ran; its results
    /// were discarded.
    Stale,
}

struct BotState {
    active: bool,
    generation: u64,
    interval: BotInterval,
    logs: VecDeque<BotLogEntry>,
}

struct BotShared {
    remote: Arc<dyn RemoteRepository>,
    credential: Credential,
    target: SyncTarget,
    root: Arc<dyn DirectoryHandle>,
    settings: SyncSettings,
    state: Mutex<BotState>,
    cycle_lock: tokio::sync::Mutex<()>,
    log_tx: broadcast::Sender<BotLogEntry>,
}

/// Unattended sync of one folder to one branch.
pub struct WatchBot {
    shared: Arc<BotShared>,
    /// Dropping the sender ends the running loop.
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl WatchBot {
    pub fn new(
        remote: Arc<dyn RemoteRepository>,
        credential: Credential,
        target: SyncTarget,
        root: Arc<dyn DirectoryHandle>,
        settings: SyncSettings,
    ) -> Self {
        let capacity = settings.bot_log_capacity.max(1);
        let (log_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(BotShared {
                remote,
                credential,
                target,
                root,
                state: Mutex::new(BotState {
                    active: false,
                    generation: 0,
                    interval: settings.bot_interval,
                    logs: VecDeque::with_capacity(capacity),
                }),
                settings,
                cycle_lock: tokio::sync::Mutex::new(()),
                log_tx,
            }),
            shutdown: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &SyncTarget {
        &self.shared.target
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock_state().active
    }

    pub fn interval(&self) -> BotInterval {
        self.shared.lock_state().interval
    }

    /// Changes the poll interval. Takes effect on the next start.
    pub fn set_interval(&self, interval: BotInterval) {
        self.shared.lock_state().interval = interval;
    }

    /// Whether `token` belongs to the current run.
    pub fn is_current(&self, token: &BotToken) -> bool {
        self.shared.is_current(token.generation)
    }

    /// Snapshot of the activity log, oldest first.
    pub fn logs(&self) -> Vec<BotLogEntry> {
        self.shared.lock_state().logs.iter().cloned().collect()
    }

    pub fn clear_logs(&self) {
        self.shared.lock_state().logs.clear();
    }

    /// Streams log lines as they are appended.
    pub fn subscribe(&self) -> broadcast::Receiver<BotLogEntry> {
        self.shared.log_tx.subscribe()
    }

    /// Starts the bot: runs one cycle right away, then one per interval.
    ///
    /// Starting an active bot returns the current token. Fails without
    /// touching any state when called outside a tokio runtime.
    pub fn start(&self) -> Result<BotToken> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SyncError::Runtime("the watch bot must be started inside a tokio runtime".to_string())
        })?;
        let mut shutdown = self.shutdown.lock().unwrap_or_else(|e| e.into_inner());

        let (generation, interval) = {
            let mut state = self.shared.lock_state();
            if state.active {
                return Ok(BotToken {
                    generation: state.generation,
                });
            }
            state.active = true;
            state.generation += 1;
            state.logs.clear();
            (state.generation, state.interval)
        };

        let (tx, rx) = watch::channel(false);
        // Replacing the sender stops a loop left over from a previous run.
        *shutdown = Some(tx);

        self.shared.append(
            Some(generation),
            BotLogKind::Action,
            format!(
                "Bot started: syncing {} every {}",
                self.shared.target, interval
            ),
        );

        let shared = Arc::clone(&self.shared);
        runtime.spawn(run_loop(shared, generation, interval, rx));

        Ok(BotToken { generation })
    }

    /// Stops the bot. The pending timer is cancelled; a cycle already in
    /// flight finishes but its results are discarded.
    ///
    /// Returns whether the bot was active.
    pub fn stop(&self) -> bool {
        let was_active = self.is_active();
        if was_active {
            self.shared.append(None, BotLogKind::Action, "Bot stopped");
        }

        {
            let mut state = self.shared.lock_state();
            state.active = false;
            state.generation += 1;
        }

        let sender = self
            .shutdown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(sender) = sender {
            let _ = sender.send(true);
        }
        was_active
    }

    /// Runs a cycle now, outside the schedule. `None` if the bot is stopped.
    pub async fn run_now(&self) -> Option<CycleOutcome> {
        let generation = {
            let state = self.shared.lock_state();
            if !state.active {
                return None;
            }
            state.generation
        };
        log::info!("Manual watch bot cycle triggered");
        Some(self.shared.run_cycle(generation, false).await)
    }
}

impl Drop for WatchBot {
    fn drop(&mut self) {
        let mut state = self.shared.lock_state();
        state.active = false;
        state.generation += 1;
    }
}

async fn run_loop(
    shared: Arc<BotShared>,
    generation: u64,
    interval: BotInterval,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval.as_duration());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first tick completes immediately, so the first cycle is not deferred.
    // It waits out a cycle left over from a previous run instead of skipping.
    let mut first = true;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if !shared.is_current(generation) {
            break;
        }
        shared.run_cycle(generation, first).await;
        first = false;
    }

    log::debug!("Watch bot loop {} for {} exited", generation, shared.target);
}

impl BotShared {
    fn lock_state(&self) -> MutexGuard<'_, BotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_current(&self, generation: u64) -> bool {
        let state = self.lock_state();
        state.active && state.generation == generation
    }

    /// Appends a log line. With `Some(generation)` the line is dropped unless
    /// that run is still current.
    fn append(&self, generation: Option<u64>, kind: BotLogKind, message: impl Into<String>) -> bool {
        let entry = BotLogEntry::new(kind, message);
        {
            let mut state = self.lock_state();
            if let Some(generation) = generation {
                if !state.active || state.generation != generation {
                    log::debug!("Dropping log line from stale bot run: {}", entry.message);
                    return false;
                }
            }
            while state.logs.len() >= self.settings.bot_log_capacity.max(1) {
                state.logs.pop_front();
            }
            state.logs.push_back(entry.clone());
        }

        match kind {
            BotLogKind::Error => log::error!("[bot] {}", entry.message),
            _ => log::info!("[bot] {}", entry.message),
        }
        // No receivers is fine.
        let _ = self.log_tx.send(entry);
        true
    }

    /// Runs one cycle. With `wait` the cycle queues behind one in flight,
    /// otherwise it is skipped.
    async fn run_cycle(&self, generation: u64, wait: bool) -> CycleOutcome {
        let _guard = if wait {
            let guard = self.cycle_lock.lock().await;
            if !self.is_current(generation) {
                return CycleOutcome::Stale;
            }
            guard
        } else {
            match self.cycle_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    self.append(
                        Some(generation),
                        BotLogKind::Info,
                        "Cycle skipped: previous cycle still running",
                    );
                    return CycleOutcome::Skipped;
                }
            }
        };

        let span = info_span!("sync.bot_cycle", target = %self.target, generation);
        let result = self.sync_once(generation).instrument(span).await;

        if !self.is_current(generation) {
            log::debug!("Discarding result of stale watch bot cycle {}", generation);
            return CycleOutcome::Stale;
        }

        match result {
            Ok(None) => {
                self.append(Some(generation), BotLogKind::Info, "No changes detected");
                CycleOutcome::NoChanges
            }
            Ok(Some(outcome)) => {
                let mut message = format!(
                    "Pushed {} {}: {}",
                    outcome.uploaded.len(),
                    plural(outcome.uploaded.len()),
                    sample(&outcome.uploaded)
                );
                if outcome.is_partial() {
                    message.push_str(&format!(" ({} skipped)", outcome.skipped.len()));
                }
                self.append(Some(generation), BotLogKind::Success, message);
                CycleOutcome::Pushed(outcome)
            }
            Err(e) => {
                self.append(
                    Some(generation),
                    BotLogKind::Error,
                    format!("Sync failed: {}", e),
                );
                CycleOutcome::Failed(e.to_string())
            }
        }
    }

    async fn sync_once(&self, generation: u64) -> Result<Option<PushOutcome>> {
        let entries = read_directory(self.root.as_ref()).await?;
        let tree = fetch_remote_tree(self.remote.as_ref(), &self.credential, &self.target).await?;
        let changes = changed_entries(&diff(&entries, tree.as_ref()));
        if changes.is_empty() {
            return Ok(None);
        }

        let paths: Vec<String> = changes.iter().map(|e| e.path().to_string()).collect();
        self.append(
            Some(generation),
            BotLogKind::Action,
            format!(
                "Detected {} changed {}: {}",
                changes.len(),
                plural(changes.len()),
                sample(&paths)
            ),
        );

        let message = format!("Auto sync {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
        let options = PushOptions::from_settings(message, &self.settings);
        let outcome = push(
            self.remote.as_ref(),
            &self.credential,
            &self.target,
            &changes,
            &options,
            &NoProgress,
        )
        .await?;
        Ok(Some(outcome))
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "file"
    } else {
        "files"
    }
}

/// Lists the first few paths, then how many more there are.
fn sample(paths: &[String]) -> String {
    let shown = paths
        .iter()
        .take(SAMPLE_FILES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if paths.len() > SAMPLE_FILES {
        format!("{} and {} more", shown, paths.len() - SAMPLE_FILES)
    } else {
        shown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryDirectory;
    use crate::remote::memory::{InjectedFailure, MemoryRemote, RemoteOp};
    use crate::remote::RepoRef;
    use std::time::Duration;

    fn studio() -> RepoRef {
        RepoRef::new("octo", "studio")
    }

    fn bot(remote: &MemoryRemote, root: &MemoryDirectory, settings: SyncSettings) -> WatchBot {
        WatchBot::new(
            Arc::new(remote.clone()),
            Credential::new("t").unwrap(),
            SyncTarget::new(studio(), "main"),
            Arc::new(root.clone()),
            settings,
        )
    }

    fn ten_seconds() -> SyncSettings {
        SyncSettings {
            bot_interval: BotInterval::TenSeconds,
            ..SyncSettings::default()
        }
    }

    fn kinds(bot: &WatchBot) -> Vec<BotLogKind> {
        bot.logs().iter().map(|l| l.kind).collect()
    }

    #[test]
    fn test_sample_lists_first_files() {
        let paths: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        assert_eq!(sample(&paths), "a, b, c and 2 more");
        assert_eq!(sample(&paths[..2]), "a, b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_first_cycle_immediately() {
        let remote = MemoryRemote::new().with_repository("octo", "studio", "main", &[("a.txt", "hello")]);
        let root = MemoryDirectory::new("proj")
            .with_file("a.txt", "hello")
            .with_file("b.txt", "world");
        let bot = bot(&remote, &root, ten_seconds());

        let token = bot.start().unwrap();
        assert!(bot.is_current(&token));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(
            kinds(&bot),
            vec![BotLogKind::Action, BotLogKind::Action, BotLogKind::Success]
        );
        assert!(bot.logs()[2].message.contains("b.txt"));
        let files = remote.files_at(&studio(), "main").unwrap();
        assert_eq!(files["b.txt"], b"world");
        let head = remote.head_of(&studio(), "main").unwrap();
        assert!(remote.commit_message(&head).unwrap().starts_with("Auto sync "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_changes_makes_no_mutations() {
        let remote = MemoryRemote::new().with_repository("octo", "studio", "main", &[("a.txt", "hello")]);
        let root = MemoryDirectory::new("proj").with_file("a.txt", "hello");
        let bot = bot(&remote, &root, ten_seconds());

        bot.start().unwrap();
        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(remote.count(RemoteOp::BranchHead), 3);
        assert!(remote.mutation_calls().is_empty());
        assert_eq!(bot.logs().last().unwrap().message, "No changes detected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer() {
        let remote = MemoryRemote::new().with_repository("octo", "studio", "main", &[("a.txt", "hello")]);
        let root = MemoryDirectory::new("proj").with_file("a.txt", "hello");
        let bot = bot(&remote, &root, ten_seconds());

        let token = bot.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(bot.stop());
        assert!(!bot.is_current(&token));
        assert!(!bot.is_active());
        assert_eq!(bot.logs().last().unwrap().message, "Bot stopped");

        let calls = remote.calls().len();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(remote.calls().len(), calls);

        // Stopping again is silent.
        assert!(!bot.stop());
        assert_eq!(bot.logs().last().unwrap().message, "Bot stopped");
        assert_eq!(
            bot.logs()
                .iter()
                .filter(|l| l.message == "Bot stopped")
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_does_not_stop_bot() {
        let remote = MemoryRemote::new().with_repository("octo", "studio", "main", &[("a.txt", "hello")]);
        let root = MemoryDirectory::new("proj").with_file("a.txt", "hello");
        let bot = bot(&remote, &root, ten_seconds());

        bot.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        remote.fail_on(RemoteOp::BranchHead, 1, InjectedFailure::Network);
        root.write_file("new.txt", "fresh");

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(bot.logs().last().unwrap().kind, BotLogKind::Error);
        assert!(bot.is_active());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(bot.logs().last().unwrap().kind, BotLogKind::Success);
        assert!(remote.files_at(&studio(), "main").unwrap().contains_key("new.txt"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_cycle_is_skipped() {
        let remote = MemoryRemote::new().with_repository("octo", "studio", "main", &[("a.txt", "hello")]);
        let root = MemoryDirectory::new("proj").with_file("a.txt", "hello");
        let bot = bot(&remote, &root, ten_seconds());
        remote.set_latency(Duration::from_secs(5));

        bot.start().unwrap();
        // Let the scheduled cycle take the lock and wait on the remote.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(bot.run_now().await, Some(CycleOutcome::Skipped));
        assert_eq!(
            bot.logs().last().unwrap().message,
            "Cycle skipped: previous cycle still running"
        );

        bot.stop();
        assert_eq!(bot.run_now().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_cycle_results_are_discarded() {
        let remote = MemoryRemote::new().with_repository("octo", "studio", "main", &[("a.txt", "hello")]);
        let root = MemoryDirectory::new("proj").with_file("a.txt", "changed");
        let bot = bot(&remote, &root, ten_seconds());
        remote.set_latency(Duration::from_secs(5));

        bot.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        bot.stop();
        bot.start().unwrap();

        // Both the stale cycle and the restarted run get time to finish.
        tokio::time::sleep(Duration::from_secs(120)).await;
        bot.stop();

        let logs = bot.logs();
        assert!(logs[0].message.starts_with("Bot started"));
        // The stale cycle still lands its push, but never logs it.
        assert_eq!(
            remote.files_at(&studio(), "main").unwrap()["a.txt"],
            b"changed"
        );
        assert!(logs.iter().all(|l| l.kind != BotLogKind::Success));
        assert!(logs.iter().any(|l| l.message == "No changes detected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_cycle_in_flight() {
        let remote = MemoryRemote::new().with_repository("octo", "studio", "main", &[("a.txt", "hello")]);
        let root = MemoryDirectory::new("proj").with_file("a.txt", "hello");
        let settings = SyncSettings {
            bot_interval: BotInterval::OneHour,
            ..SyncSettings::default()
        };
        let bot = bot(&remote, &root, settings);
        remote.set_latency(Duration::from_secs(5));

        bot.start().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        bot.stop();
        bot.start().unwrap();

        // Far less than the hour until the next tick.
        tokio::time::sleep(Duration::from_secs(120)).await;

        let messages: Vec<String> = bot.logs().into_iter().map(|l| l.message).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].starts_with("Bot started"));
        assert_eq!(messages[1], "No changes detected");
        assert_eq!(remote.count(RemoteOp::BranchHead), 2);
        bot.stop();
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let remote = MemoryRemote::new().with_repository("octo", "studio", "main", &[("a.txt", "hello")]);
        let root = MemoryDirectory::new("proj").with_file("a.txt", "hello");
        let bot = bot(&remote, &root, ten_seconds());

        assert!(matches!(bot.start(), Err(SyncError::Runtime(_))));
        assert!(!bot.is_active());
        assert!(bot.logs().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_is_bounded_and_streamed() {
        let remote = MemoryRemote::new().with_repository("octo", "studio", "main", &[("a.txt", "hello")]);
        let root = MemoryDirectory::new("proj").with_file("a.txt", "hello");
        let settings = SyncSettings {
            bot_log_capacity: 3,
            ..ten_seconds()
        };
        let bot = bot(&remote, &root, settings);
        let mut rx = bot.subscribe();

        bot.start().unwrap();
        tokio::time::sleep(Duration::from_secs(45)).await;

        assert_eq!(bot.logs().len(), 3);
        assert!(bot
            .logs()
            .iter()
            .all(|l| l.message == "No changes detected"));
        let first = rx.recv().await.unwrap();
        assert!(first.message.starts_with("Bot started"));
    }
}
