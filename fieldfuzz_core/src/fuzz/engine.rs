use crate::error::{FuzzError, FuzzResult};
use crate::fuzz::stats::{SerializableInstant, StatsType};
use crate::mutator::{FuzzRng, Mutator};
use crate::output::CrashLog;
use crate::traits::{Protocol, ProtocolSession, Transport};
use crate::types::{CrashRecord, FuzzedMessage};
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Frames rejected by the validator between two yields to the runtime
const RETRIES_PER_YIELD: u64 = 1024;

/// Why `FuzzEngine::fuzz` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// the cancellation token was triggered
    StoppedByUser,
    /// the configured number of messages was sent
    Completed,
}

/// Runs the fuzz loop of one job: picks a message type, generates a frame, sends it and
/// treats a missing reply as a crash.
pub struct FuzzEngine<T: Transport> {
    protocol: Arc<dyn Protocol>,
    session: Box<dyn ProtocolSession>,
    transport: T,
    msg_types: Vec<String>,
    validate: bool,
    mutator: Mutator<FuzzRng>,
    stats: StatsType,
    crash_log: Option<CrashLog>,
    cancel: CancellationToken,
    unique_crashes: HashSet<Vec<u8>>,
    max_messages: Option<u64>,
    sent: u64,
}

impl<T: Transport> FuzzEngine<T> {
    /// Creates an engine for an already configured transport
    pub fn new(
        protocol: Arc<dyn Protocol>,
        session: Box<dyn ProtocolSession>,
        transport: T,
        msg_types: Vec<String>,
        validate: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            protocol,
            session,
            transport,
            msg_types,
            validate,
            mutator: Mutator::from_entropy(),
            stats: StatsType::default(),
            crash_log: None,
            cancel,
            unique_crashes: HashSet::default(),
            max_messages: None,
            sent: 0,
        }
    }

    /// Makes the generated frames reproducible
    #[must_use]
    pub fn with_seed(mut self, seed: [u8; 32]) -> Self {
        self.mutator = Mutator::from_seed(seed);
        self
    }

    /// Writes crashes into `crash_log`
    #[must_use]
    pub fn with_crash_log(mut self, crash_log: CrashLog) -> Self {
        self.crash_log = Some(crash_log);
        self
    }

    /// Reports into existing shared stats
    #[must_use]
    pub fn with_stats(mut self, stats: StatsType) -> Self {
        self.stats = stats;
        self
    }

    /// Ends the loop after `max` messages
    #[must_use]
    pub fn with_max_messages(mut self, max: Option<u64>) -> Self {
        self.max_messages = max;
        self
    }

    /// Shared stats of this engine
    #[must_use]
    pub fn stats(&self) -> StatsType {
        self.stats.clone()
    }

    /// The transport, e.g. to tear it down after the loop
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Generates a message of type `name`. With validation enabled the message is
    /// regenerated until the protocol accepts it or the job is stopped, in which case
    /// the last (invalid) frame is returned.
    async fn generate(&mut self, name: &str) -> FuzzResult<FuzzedMessage> {
        let mut message = self.session.fuzz_one(name, &mut self.mutator)?;
        if !self.validate || !self.protocol.validates(name) {
            return Ok(message);
        }
        let kind = self.transport.kind();
        let mut retries = 0u64;
        while !self.cancel.is_cancelled() && !self.protocol.validate(&message.raw, kind) {
            retries += 1;
            if retries % RETRIES_PER_YIELD == 0 {
                tokio::task::yield_now().await;
            }
            message = self.session.fuzz_one(name, &mut self.mutator)?;
        }
        if retries > 0
            && let Ok(mut stats) = self.stats.write()
        {
            stats.validation_retries += retries;
        }
        Ok(message)
    }

    fn record_crash(&mut self, message: &FuzzedMessage) -> FuzzResult<()> {
        let mut hasher = Sha1::new();
        hasher.update(&message.raw);
        let unique = self.unique_crashes.insert(hasher.finalize().to_vec());

        tracing::warn!(
            "Crash detected with input {} ({})",
            hex::encode(&message.raw),
            message.name
        );

        if let Ok(mut stats) = self.stats.write() {
            stats.crashes += 1;
            if unique {
                stats.unique_crashes += 1;
            }
            stats.last_crash = Some(SerializableInstant::now());
        }

        let transport = self.transport.title();
        if let Some(crash_log) = self.crash_log.as_mut() {
            crash_log.record(&CrashRecord {
                job_id: crash_log.job_id(),
                transport,
                message: message.summary.clone(),
                raw: message.raw.clone(),
            })?;
        }
        Ok(())
    }

    /// Runs a single fuzz iteration and returns true if the target did not reply.
    /// # Errors
    /// Message generation or writing the crash log failed.
    pub async fn fuzz_iteration(&mut self) -> FuzzResult<bool> {
        let Some(name) = self.mutator.choose(&self.msg_types).cloned() else {
            return Err(FuzzError::invalid_config("no message types selected"));
        };
        self.session.begin_iteration();
        let message = self.generate(&name).await?;
        tracing::debug!("Generated msg {}", message.summary);

        let reply = self.transport.transmit(&message.raw, true).await;

        self.sent += 1;
        if let Ok(mut stats) = self.stats.write() {
            stats.msgs_sent += 1;
        }

        match reply {
            Some(reply) => {
                tracing::debug!("received: {}", hex::encode(&reply));
                Ok(false)
            }
            None => {
                self.record_crash(&message)?;
                Ok(true)
            }
        }
    }

    /// Runs fuzz iterations until the job is cancelled or `max_messages` were sent.
    /// # Errors
    /// The first error of `fuzz_iteration`.
    pub async fn fuzz(&mut self) -> FuzzResult<LoopExit> {
        if let Ok(mut stats) = self.stats.write() {
            stats.title = self.transport.title();
            stats.started = Some(SerializableInstant::now());
        }
        tracing::info!("Fuzzing {}", self.transport.title());

        loop {
            if self.cancel.is_cancelled() {
                return Ok(LoopExit::StoppedByUser);
            }
            if let Some(max) = self.max_messages
                && self.sent >= max
            {
                return Ok(LoopExit::Completed);
            }
            self.fuzz_iteration().await?;
            // transports that answer instantly would otherwise never give the runtime back
            tokio::task::yield_now().await;
        }
    }
}
