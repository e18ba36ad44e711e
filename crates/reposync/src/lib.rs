pub mod bot;
pub mod config;
pub mod diff;
pub mod error;
pub mod hash;
pub mod local;
pub mod progress;
pub mod push;
pub mod remote;
pub mod workflow;

pub use bot::{BotLogEntry, BotLogKind, BotToken, CycleOutcome, WatchBot};
pub use config::{BlobFailurePolicy, BotInterval, SyncSettings};
pub use diff::{diff, remote_only, DiffResult, DiffStatus, DiffSummary};
pub use error::{Result, SyncError};
pub use hash::{blob_sha, FileContent};
pub use local::{DirectoryHandle, FileEntry, FsDirectory, MemoryDirectory, SelectedFile};
pub use progress::{NoProgress, ProgressReporter, SyncProgressBroadcaster};
pub use push::{fetch_remote_tree, push, push_changes, PushOptions, PushOutcome, SkippedFile, SyncTarget};
pub use remote::{parse_repo_url, Credential, GitHubClient, RemoteRepository, RepoInfo, RepoRef};
pub use workflow::{LocalSelection, SyncStep, SyncWorkflow};
