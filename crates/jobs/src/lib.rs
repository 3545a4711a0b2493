//! Client for DATS background jobs (exports, LLM assistance, COTA
//! refinement, crawling).
//!
//! [`JobTracker`] is the entry point: it submits a job for an action, polls
//! it until it reaches a terminal status and runs the [`TerminalHandler`]
//! exactly once for that transition.

pub mod action;
pub mod api;
pub mod config;
pub mod effects;
pub mod error;
pub mod handler;
pub mod poller;
pub mod registry;
pub mod state;
pub mod submit;
pub mod tracker;

pub use action::{reduce, ActionEvent, ActionKey, ActionRejected, ActionState};
pub use api::{HttpJobApi, JobApi};
pub use config::{ClientConfig, PollConfig};
pub use effects::{AlwaysConfirm, Confirm, DiskFileSaver, FileSaver, Notifier, Severity};
pub use error::{ApiError, ConfigError, EffectError, SubmitError};
pub use handler::{content_locator, DefaultTerminalHandler, TerminalGuard, TerminalHandler, TerminalOutcome};
pub use poller::{poll_job, PollEvent};
pub use registry::JobRegistry;
pub use state::{JobPhase, JobProgress, JobState};
pub use submit::Submission;
pub use tracker::{JobTracker, JobWatch, WatchEnd};
