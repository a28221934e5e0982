use serde::{Deserialize, Serialize};
use serde::{Deserializer, Serializer};
use std::fmt::Display;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Lifecycle of a job
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// the job sent its configured number of messages
    ExitSuccess,
    /// created, the task has not been spawned yet
    #[default]
    NotStarted,
    /// the task is alive
    Running,
    /// stopped on request
    ExitedByUser,
    /// setup, the fuzz loop or teardown failed; see the exit reason
    ExitError,
    /// removed from the job registry
    Deleted,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            JobStatus::ExitSuccess => "EXIT_SUCCESS",
            JobStatus::NotStarted => "NOT_STARTED",
            JobStatus::Running => "RUNNING",
            JobStatus::ExitedByUser => "EXITED_BY_USER",
            JobStatus::ExitError => "EXIT_ERROR",
            JobStatus::Deleted => "DELETED",
        })
    }
}

#[derive(Default, Clone, Debug, Serialize, Deserialize)]
/// Status and counters of a single job. Written by the job task only, read by everyone.
pub struct Stats {
    /// Description of the transport, set once the fuzz loop starts.
    pub title: String,

    /// Current lifecycle state.
    pub status: JobStatus,

    /// Number of fuzz iterations, each sends exactly one message.
    pub msgs_sent: u64,

    /// Number of messages that got no reply.
    pub crashes: u64,

    /// Number of distinct messages (by content) that got no reply.
    pub unique_crashes: u64,

    /// Frames thrown away because the validator rejected them.
    pub validation_retries: u64,

    /// Why the job ended, empty while it runs.
    pub exit_reason: String,

    /// The timestamp when the fuzz loop started.
    /// This field is `None` if the execution has not started yet.
    pub started: Option<SerializableInstant>,

    /// The timestamp of the last crash.
    pub last_crash: Option<SerializableInstant>,
}

impl Stats {
    /// Average messages per second since the loop started
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn msgs_per_second(&self) -> f64 {
        let Some(started) = self.started else {
            return 0.0;
        };
        let secs = started.elapsed().as_secs_f64();
        if secs <= f64::EPSILON {
            return 0.0;
        }
        self.msgs_sent as f64 / secs
    }
}

/// Shared stats type
pub type StatsType = Arc<RwLock<Stats>>;

#[derive(Debug, Clone, Copy)]
/// A wrapper arround the std Instant to implement the `Serialize` to Instant
pub struct SerializableInstant(Instant);

impl Default for SerializableInstant {
    fn default() -> Self {
        Self(Instant::now())
    }
}

impl SerializableInstant {
    /// Creates a new instant with the current time
    #[must_use]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Time passed since this instant
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

impl Serialize for SerializableInstant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // milliseconds elapsed since the instant
        #[allow(clippy::cast_possible_truncation)]
        serializer.serialize_u64(self.0.elapsed().as_millis() as u64)
    }
}

impl<'de> Deserialize<'de> for SerializableInstant {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Instant::now()
            .checked_sub(Duration::from_millis(millis))
            .map_or_else(SerializableInstant::now, SerializableInstant))
    }
}
