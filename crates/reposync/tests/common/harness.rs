//! Test harness wiring an in-memory remote to a local folder.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use reposync::remote::MemoryRemote;
use reposync::{
    BotInterval, Credential, MemoryDirectory, RepoRef, SyncSettings, SyncTarget, SyncWorkflow,
    WatchBot,
};

static LOGGING: Once = Once::new();

/// Routes library logs to the test output. Safe to call from every test.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reposync=debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// An in-memory remote and local folder for one sync target.
pub struct SyncHarness {
    pub remote: MemoryRemote,
    pub root: MemoryDirectory,
    pub target: SyncTarget,
    pub settings: SyncSettings,
}

impl SyncHarness {
    pub fn new(remote: MemoryRemote, root: MemoryDirectory) -> Self {
        init_logging();
        Self {
            remote,
            root,
            target: SyncTarget::new(RepoRef::new("octo", "studio"), "main"),
            settings: SyncSettings::default(),
        }
    }

    pub fn with_interval(mut self, interval: BotInterval) -> Self {
        self.settings.bot_interval = interval;
        self
    }

    pub fn credential(&self) -> Credential {
        Credential::new("test-token").expect("valid token")
    }

    pub fn workflow(&self) -> SyncWorkflow {
        SyncWorkflow::new(Arc::new(self.remote.clone()), self.settings.clone())
    }

    pub fn bot(&self) -> WatchBot {
        WatchBot::new(
            Arc::new(self.remote.clone()),
            self.credential(),
            self.target.clone(),
            Arc::new(self.root.clone()),
            self.settings.clone(),
        )
    }

    /// Files on the target branch as UTF-8 strings.
    pub fn remote_files(&self) -> Vec<(String, String)> {
        self.remote
            .files_at(&self.target.repo, &self.target.branch)
            .unwrap_or_default()
            .into_iter()
            .map(|(path, bytes)| (path, String::from_utf8_lossy(&bytes).into_owned()))
            .collect()
    }
}

/// Progress reporter that records every call as `"current/total status"`.
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("progress lock").clone()
    }
}

impl reposync::ProgressReporter for RecordingProgress {
    fn report(&self, current: usize, total: usize, status: &str) {
        self.events
            .lock()
            .expect("progress lock")
            .push(format!("{}/{} {}", current, total, status));
    }
}
