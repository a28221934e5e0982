use crate::config::JobConfig;
use crate::error::{FuzzError, FuzzResult};
use crate::fuzz::engine::{FuzzEngine, LoopExit};
use crate::fuzz::stats::{JobStatus, SerializableInstant, Stats, StatsType};
use crate::output::{CrashLog, Output};
use crate::traits::{Protocol, ProtocolSession, Registry, Transport};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

/// Identifier of a job, dense and never reused
pub type JobId = usize;

struct JobHandle {
    config: JobConfig,
    stats: StatsType,
    /// requests the task to stop
    cancel: CancellationToken,
    /// triggered once the task has terminated and the final status is written
    done: CancellationToken,
    output: Output,
}

impl JobHandle {
    fn is_alive(&self) -> bool {
        !self.done.is_cancelled()
    }
}

/// Point in time view of a job
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    /// job id
    pub id: JobId,
    /// configuration the job was started with
    pub config: JobConfig,
    /// transport description
    pub title: String,
    /// lifecycle state
    pub status: JobStatus,
    /// messages sent so far
    pub msgs_sent: u64,
    /// messages without reply
    pub crashes: u64,
    /// distinct messages without reply
    pub unique_crashes: u64,
    /// when the last message without reply was sent, serialized as milliseconds ago
    pub last_crash: Option<SerializableInstant>,
    /// why the job ended
    pub exit_reason: String,
    /// the job task is alive
    pub running: bool,
}

/// Owns every job of the process. Each job runs its fuzz loop on its own tokio task,
/// status and counters can be read at any time without waiting for the loop.
pub struct Fuzzer<R: Registry> {
    registry: Arc<R>,
    output_root: PathBuf,
    jobs: RwLock<BTreeMap<JobId, Arc<JobHandle>>>,
    next_id: AtomicUsize,
}

impl<R: Registry> Fuzzer<R> {
    /// Creates an orchestrator writing crash output below `output_root`
    pub fn new(registry: R, output_root: impl Into<PathBuf>) -> Self {
        Self {
            registry: Arc::new(registry),
            output_root: output_root.into(),
            jobs: RwLock::default(),
            next_id: AtomicUsize::new(0),
        }
    }

    /// The lookup tables jobs are built from
    pub fn registry(&self) -> &R {
        &self.registry
    }

    fn handle(&self, id: JobId) -> FuzzResult<Arc<JobHandle>> {
        self.jobs
            .read()
            .map_err(|_| FuzzError::Custom {
                err_msg: "job registry lock poisoned".to_owned(),
            })?
            .get(&id)
            .cloned()
            .ok_or(FuzzError::JobNotFound { id })
    }

    fn handles(&self) -> Vec<(JobId, Arc<JobHandle>)> {
        self.jobs
            .read()
            .map(|jobs| jobs.iter().map(|(id, job)| (*id, job.clone())).collect())
            .unwrap_or_default()
    }

    fn read_stats<V>(&self, id: JobId, f: impl FnOnce(&Stats) -> V) -> FuzzResult<V> {
        let handle = self.handle(id)?;
        let stats = handle.stats.read().map_err(|_| FuzzError::Custom {
            err_msg: format!("stats lock of job {id} poisoned"),
        })?;
        Ok(f(&stats))
    }

    /// Starts a new job and returns its id. The configuration is not checked against the
    /// protocol (see `JobConfig::check`), only the named protocol, I/O interface and
    /// device have to exist. Must be called from within a tokio runtime.
    /// # Errors
    pub fn start_job(&self, config: JobConfig) -> FuzzResult<JobId> {
        let protocol = self
            .registry
            .protocol(&config.protocol)
            .ok_or_else(|| FuzzError::UnknownProtocol {
                name: config.protocol.clone(),
            })?;
        let transport = self
            .registry
            .transport(&config.io_interface, &config.device)?;

        let mut jobs = self.jobs.write().map_err(|_| FuzzError::Custom {
            err_msg: "job registry lock poisoned".to_owned(),
        })?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(JobHandle {
            output: Output::for_job(&self.output_root, &config.protocol, &config.io_interface, id),
            config,
            stats: StatsType::default(),
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        });
        jobs.insert(id, handle.clone());
        drop(jobs);

        tracing::info!(
            "Starting job for protocol {} with ID {id}",
            handle.config.protocol
        );
        if let Ok(mut stats) = handle.stats.write() {
            stats.status = JobStatus::Running;
        }
        tokio::spawn(run_job(id, protocol, transport, handle));
        Ok(id)
    }

    /// Stops a job and waits until its task has terminated. Stopping a job that is not
    /// running does nothing.
    /// # Errors
    /// Unknown job id.
    pub async fn stop_job(&self, id: JobId) -> FuzzResult<()> {
        let handle = self.handle(id)?;
        if !handle.is_alive() {
            return Ok(());
        }
        tracing::info!("Stopping job {id}");
        handle.cancel.cancel();
        handle.done.cancelled().await;
        tracing::info!("Job stopped");
        Ok(())
    }

    /// Stops every running job
    pub async fn stop_all(&self) {
        for (id, handle) in self.handles() {
            if handle.is_alive() {
                let _ = self.stop_job(id).await;
            }
        }
    }

    /// With an id: true if that job's task is alive. Without: true if any task is alive.
    pub fn is_running(&self, id: Option<JobId>) -> bool {
        match id {
            Some(id) => self.handle(id).is_ok_and(|job| job.is_alive()),
            None => self.handles().iter().any(|(_, job)| job.is_alive()),
        }
    }

    /// Current lifecycle state
    /// # Errors
    pub fn get_status(&self, id: JobId) -> FuzzResult<JobStatus> {
        self.read_stats(id, |stats| stats.status)
    }

    /// Number of messages without reply
    /// # Errors
    pub fn get_num_crashes(&self, id: JobId) -> FuzzResult<u64> {
        self.read_stats(id, |stats| stats.crashes)
    }

    /// Number of messages sent
    /// # Errors
    pub fn get_num_msgs_sent(&self, id: JobId) -> FuzzResult<u64> {
        self.read_stats(id, |stats| stats.msgs_sent)
    }

    /// Why the job ended, empty while it runs
    /// # Errors
    pub fn get_exit_reason(&self, id: JobId) -> FuzzResult<String> {
        self.read_stats(id, |stats| stats.exit_reason.clone())
    }

    /// Configuration the job was started with, e.g. to export it
    /// # Errors
    pub fn job_config(&self, id: JobId) -> FuzzResult<JobConfig> {
        Ok(self.handle(id)?.config.clone())
    }

    /// Location of the job's crash log
    /// # Errors
    pub fn crash_log_path(&self, id: JobId) -> FuzzResult<PathBuf> {
        Ok(self.handle(id)?.output.get_crash_file())
    }

    /// Snapshot of a single job
    /// # Errors
    pub fn snapshot(&self, id: JobId) -> FuzzResult<JobSnapshot> {
        let handle = self.handle(id)?;
        Ok(snapshot(id, &handle))
    }

    /// Snapshots of all jobs ordered by id
    pub fn list_jobs(&self) -> Vec<JobSnapshot> {
        self.handles()
            .iter()
            .map(|(id, handle)| snapshot(*id, handle))
            .collect()
    }

    /// Removes a terminated job. Its id is not handed out again.
    /// # Errors
    /// Unknown id or the job is still running.
    pub fn remove_job(&self, id: JobId) -> FuzzResult<JobSnapshot> {
        let mut jobs = self.jobs.write().map_err(|_| FuzzError::Custom {
            err_msg: "job registry lock poisoned".to_owned(),
        })?;
        let handle = jobs.get(&id).ok_or(FuzzError::JobNotFound { id })?;
        if handle.is_alive() {
            return Err(FuzzError::JobRunning { id });
        }
        let handle = jobs.remove(&id).ok_or(FuzzError::JobNotFound { id })?;
        drop(jobs);
        let mut removed = snapshot(id, &handle);
        removed.status = JobStatus::Deleted;
        tracing::info!("Removed job {id}");
        Ok(removed)
    }
}

fn snapshot(id: JobId, handle: &JobHandle) -> JobSnapshot {
    let stats = handle
        .stats
        .read()
        .map(|stats| stats.clone())
        .unwrap_or_default();
    JobSnapshot {
        id,
        config: handle.config.clone(),
        title: stats.title,
        status: stats.status,
        msgs_sent: stats.msgs_sent,
        crashes: stats.crashes,
        unique_crashes: stats.unique_crashes,
        last_crash: stats.last_crash,
        exit_reason: stats.exit_reason,
        running: handle.is_alive(),
    }
}

async fn run_job<T: Transport + 'static>(
    id: JobId,
    protocol: Arc<dyn Protocol>,
    transport: T,
    handle: Arc<JobHandle>,
) {
    // marks the job as terminated however this function is left
    let _done = handle.done.clone().drop_guard();

    // a panic inside the job must not take the orchestrator down
    let (status, exit_reason) =
        match tokio::spawn(execute(id, protocol, transport, handle.clone())).await {
            Ok(outcome) => outcome,
            Err(err) => (JobStatus::ExitError, format!("job task failed: {err}")),
        };

    match status {
        JobStatus::ExitError => tracing::error!("Job {id} failed: {exit_reason}"),
        _ => tracing::info!("Job {id} finished: {exit_reason}"),
    }
    if let Ok(mut stats) = handle.stats.write() {
        stats.status = status;
        stats.exit_reason = exit_reason;
    }
}

fn setup(
    id: JobId,
    protocol: &dyn Protocol,
    handle: &JobHandle,
    transport: &impl Transport,
) -> FuzzResult<(Box<dyn ProtocolSession>, CrashLog)> {
    handle.output.init()?;
    handle.output.save_config(&handle.config)?;
    let crash_log = CrashLog::create(&handle.output, id)?;
    let session = protocol.session(&handle.config.protocol_config, transport.kind())?;
    Ok((session, crash_log))
}

async fn execute<T: Transport>(
    id: JobId,
    protocol: Arc<dyn Protocol>,
    mut transport: T,
    handle: Arc<JobHandle>,
) -> (JobStatus, String) {
    let (session, crash_log) = match setup(id, protocol.as_ref(), &handle, &transport) {
        Ok(setup) => setup,
        Err(err) => return (JobStatus::ExitError, err.to_string()),
    };

    let configured = transport.configure(&handle.config.protocol_config).await;
    let mut engine = FuzzEngine::new(
        protocol,
        session,
        transport,
        handle.config.msg_types.clone(),
        handle.config.validate,
        handle.cancel.clone(),
    )
    .with_stats(handle.stats.clone())
    .with_crash_log(crash_log)
    .with_max_messages(handle.config.max_messages);

    let outcome = match configured {
        Ok(()) => engine.fuzz().await,
        Err(err) => Err(err),
    };
    let teardown = engine.transport_mut().teardown().await;

    match (outcome, teardown) {
        (Err(err), _) => (JobStatus::ExitError, err.to_string()),
        (Ok(_), Err(err)) => (JobStatus::ExitError, format!("teardown failed: {err}")),
        (Ok(LoopExit::StoppedByUser), Ok(())) => {
            (JobStatus::ExitedByUser, "Job stopped by user".to_owned())
        }
        (Ok(LoopExit::Completed), Ok(())) => (
            JobStatus::ExitSuccess,
            format!(
                "Sent {} messages",
                handle.config.max_messages.unwrap_or_default()
            ),
        ),
    }
}
