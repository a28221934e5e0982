use fieldfuzz_core::config::{ConfigSchema, JobConfig, ProtocolConfig};
use fieldfuzz_core::error::{FuzzError, FuzzResult};
use fieldfuzz_core::fuzz::engine::{FuzzEngine, LoopExit};
use fieldfuzz_core::fuzz::fuzzer::{Fuzzer, JobId};
use fieldfuzz_core::fuzz::stats::JobStatus;
use fieldfuzz_core::mutator::{FuzzRng, Mutator};
use fieldfuzz_core::traits::{
    MessageEntry, Protocol, ProtocolSession, Registry, Transport, TransportKind,
};
use fieldfuzz_core::types::FuzzedMessage;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Messages are 4 random bytes, a frame is valid if its first byte is even
struct StubProtocol {
    accept_any: bool,
}

struct StubSession;

impl ProtocolSession for StubSession {
    fn fuzz_one(
        &mut self,
        msg_name: &str,
        mutator: &mut Mutator<FuzzRng>,
    ) -> FuzzResult<FuzzedMessage> {
        let raw = mutator.gen_bytes(4);
        Ok(FuzzedMessage {
            name: msg_name.to_owned(),
            summary: format!("<{msg_name} {raw:02x?}>"),
            raw,
        })
    }
}

impl Protocol for StubProtocol {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn msg_names(&self, _transport: Option<TransportKind>) -> Vec<MessageEntry> {
        vec![
            MessageEntry {
                name: "ping",
                enabled: true,
            },
            MessageEntry {
                name: "pong",
                enabled: true,
            },
        ]
    }

    fn config(&self, _selected: &[String], _transport: TransportKind) -> FuzzResult<ConfigSchema> {
        ConfigSchema::new(vec![])
    }

    fn validates(&self, _msg_name: &str) -> bool {
        true
    }

    fn validate(&self, raw: &[u8], _transport: TransportKind) -> bool {
        self.accept_any || raw.first().is_some_and(|b| b % 2 == 0)
    }

    fn session(
        &self,
        _config: &ProtocolConfig,
        _transport: TransportKind,
    ) -> FuzzResult<Box<dyn ProtocolSession>> {
        Ok(Box::new(StubSession))
    }
}

/// Answers every frame unless configured with `mode` = `silent`
#[derive(Default)]
struct StubTransport {
    silent: bool,
    failing_teardown: bool,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Transport for StubTransport {
    fn title(&self) -> String {
        "stub transport".into()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn configure(&mut self, config: &ProtocolConfig) -> FuzzResult<()> {
        match config.get_str("mode").as_deref() {
            Some("silent") => self.silent = true,
            Some("unreachable") => {
                return Err(FuzzError::ConnectionFailed {
                    err_msg: "stub target".into(),
                });
            }
            Some("bad-teardown") => self.failing_teardown = true,
            _ => {}
        }
        Ok(())
    }

    async fn teardown(&mut self) -> FuzzResult<()> {
        if self.failing_teardown {
            return Err(FuzzError::TransporterWrite);
        }
        Ok(())
    }

    async fn transmit(&mut self, buf: &[u8], _wait_for_reply: bool) -> Option<Vec<u8>> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(buf.to_vec());
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        if self.silent { None } else { Some(vec![0x00]) }
    }

    async fn receive(&mut self) -> Option<Vec<u8>> {
        None
    }
}

struct StubRegistry;

impl Registry for StubRegistry {
    type Transport = StubTransport;

    fn protocol_names(&self) -> Vec<&'static str> {
        vec!["stub"]
    }

    fn protocol(&self, name: &str) -> Option<Arc<dyn Protocol>> {
        (name == "stub").then(|| Arc::new(StubProtocol { accept_any: true }) as Arc<dyn Protocol>)
    }

    fn io_interface_names(&self) -> Vec<&'static str> {
        vec!["TCP Socket"]
    }

    fn io_interface_kind(&self, name: &str) -> Option<TransportKind> {
        (name == "TCP Socket").then_some(TransportKind::Socket)
    }

    fn device_names(&self) -> Vec<&'static str> {
        vec!["generic"]
    }

    fn transport(&self, io_interface: &str, device: &str) -> FuzzResult<StubTransport> {
        if io_interface != "TCP Socket" {
            return Err(FuzzError::UnknownIoInterface {
                name: io_interface.into(),
            });
        }
        if device != "generic" {
            return Err(FuzzError::UnknownDevice {
                name: device.into(),
            });
        }
        Ok(StubTransport::default())
    }
}

fn job(mode: &str, max_messages: Option<u64>) -> JobConfig {
    JobConfig {
        protocol: "stub".into(),
        io_interface: "TCP Socket".into(),
        device: "generic".into(),
        validate: false,
        msg_types: vec!["ping".into(), "pong".into()],
        protocol_config: ProtocolConfig::new().with("mode", mode),
        comment: String::new(),
        max_messages,
    }
}

async fn wait_until_done(fuzzer: &Fuzzer<StubRegistry>, id: JobId) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while fuzzer.is_running(Some(id)) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not terminate");
}

async fn wait_for_messages(fuzzer: &Fuzzer<StubRegistry>, id: JobId, count: u64) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while fuzzer.get_num_msgs_sent(id).expect("job exists") < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("job did not send enough messages");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn job_ids_are_sequential_and_never_reused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fuzzer = Fuzzer::new(StubRegistry, dir.path());

    let first = fuzzer.start_job(job("normal", Some(1))).expect("start");
    let second = fuzzer.start_job(job("normal", Some(1))).expect("start");
    assert_eq!((first, second), (0, 1));

    wait_until_done(&fuzzer, first).await;
    fuzzer.remove_job(first).expect("terminated job");
    let third = fuzzer.start_job(job("normal", Some(1))).expect("start");
    assert_eq!(third, 2);

    fuzzer.stop_all().await;
    let ids: Vec<_> = fuzzer.list_jobs().iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_job_waits_for_the_task() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fuzzer = Fuzzer::new(StubRegistry, dir.path());
    let id = fuzzer.start_job(job("normal", None)).expect("start");
    wait_for_messages(&fuzzer, id, 5).await;
    assert_eq!(fuzzer.get_status(id).expect("job"), JobStatus::Running);

    fuzzer.stop_job(id).await.expect("stop");
    assert!(!fuzzer.is_running(Some(id)));
    assert!(!fuzzer.is_running(None));
    assert_eq!(fuzzer.get_status(id).expect("job"), JobStatus::ExitedByUser);
    assert_eq!(fuzzer.get_exit_reason(id).expect("job"), "Job stopped by user");

    let sent = fuzzer.get_num_msgs_sent(id).expect("job");
    fuzzer.stop_job(id).await.expect("second stop is a no-op");
    assert_eq!(fuzzer.get_num_msgs_sent(id).expect("job"), sent);
    assert_eq!(fuzzer.get_num_crashes(id).expect("job"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn max_messages_ends_with_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fuzzer = Fuzzer::new(StubRegistry, dir.path());
    let id = fuzzer.start_job(job("normal", Some(25))).expect("start");
    wait_until_done(&fuzzer, id).await;

    let snapshot = fuzzer.snapshot(id).expect("job");
    assert_eq!(snapshot.status, JobStatus::ExitSuccess);
    assert_eq!(snapshot.msgs_sent, 25);
    assert_eq!(snapshot.crashes, 0);
    assert!(snapshot.last_crash.is_none());
    assert_eq!(snapshot.title, "stub transport");
    assert!(!snapshot.running);

    let saved = JobConfig::load(&dir.path().join("stub/tcp_socket/0/config.json"))
        .expect("config written on start");
    assert_eq!(saved, job("normal", Some(25)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_unanswered_message_is_a_crash() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fuzzer = Fuzzer::new(StubRegistry, dir.path());
    let id = fuzzer.start_job(job("silent", Some(10))).expect("start");
    wait_until_done(&fuzzer, id).await;

    let snapshot = fuzzer.snapshot(id).expect("job");
    assert_eq!(snapshot.msgs_sent, 10);
    assert_eq!(snapshot.crashes, 10);
    assert!(snapshot.unique_crashes >= 1 && snapshot.unique_crashes <= 10);
    assert!(snapshot.last_crash.is_some_and(|at| at.elapsed() < Duration::from_secs(10)));

    let log = std::fs::read_to_string(fuzzer.crash_log_path(id).expect("job")).expect("log");
    assert_eq!(log.lines().count(), 30);
    assert!(log.lines().all(|line| line.contains(" - WARNING - ")));
    assert!(log.contains("Job 0: Crash detected on interface stub transport"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn setup_and_teardown_errors_end_the_job() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fuzzer = Fuzzer::new(StubRegistry, dir.path());

    let unreachable = fuzzer.start_job(job("unreachable", None)).expect("start");
    wait_until_done(&fuzzer, unreachable).await;
    assert_eq!(fuzzer.get_status(unreachable).expect("job"), JobStatus::ExitError);
    assert!(
        fuzzer
            .get_exit_reason(unreachable)
            .expect("job")
            .contains("stub target")
    );
    assert_eq!(fuzzer.get_num_msgs_sent(unreachable).expect("job"), 0);

    let teardown = fuzzer.start_job(job("bad-teardown", None)).expect("start");
    wait_for_messages(&fuzzer, teardown, 1).await;
    fuzzer.stop_job(teardown).await.expect("stop");
    assert_eq!(fuzzer.get_status(teardown).expect("job"), JobStatus::ExitError);
    assert!(
        fuzzer
            .get_exit_reason(teardown)
            .expect("job")
            .starts_with("teardown failed")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn running_jobs_cannot_be_removed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fuzzer = Fuzzer::new(StubRegistry, dir.path());
    let id = fuzzer.start_job(job("normal", None)).expect("start");

    assert!(matches!(
        fuzzer.remove_job(id),
        Err(FuzzError::JobRunning { id: 0 })
    ));
    fuzzer.stop_job(id).await.expect("stop");
    let removed = fuzzer.remove_job(id).expect("terminated");
    assert_eq!(removed.status, JobStatus::Deleted);
    assert!(matches!(
        fuzzer.get_status(id),
        Err(FuzzError::JobNotFound { id: 0 })
    ));
    assert!(matches!(
        fuzzer.stop_job(7).await,
        Err(FuzzError::JobNotFound { id: 7 })
    ));
}

#[tokio::test]
async fn unknown_names_are_rejected_before_start() {
    let dir = tempfile::tempdir().expect("tempdir");
    let fuzzer = Fuzzer::new(StubRegistry, dir.path());
    let mut config = job("normal", None);
    config.device = "toaster".into();
    assert!(matches!(
        fuzzer.start_job(config),
        Err(FuzzError::UnknownDevice { .. })
    ));
    assert!(fuzzer.list_jobs().is_empty());
}

fn engine(
    accept_any: bool,
    validate: bool,
    cancel: CancellationToken,
) -> (FuzzEngine<StubTransport>, Arc<Mutex<Vec<Vec<u8>>>>) {
    let transport = StubTransport::default();
    let sent = transport.sent.clone();
    let engine = FuzzEngine::new(
        Arc::new(StubProtocol { accept_any }),
        Box::new(StubSession),
        transport,
        vec!["ping".into()],
        validate,
        cancel,
    )
    .with_seed([5; 32]);
    (engine, sent)
}

#[tokio::test]
async fn validation_filters_frames() {
    let (mut engine, sent) = engine(false, true, CancellationToken::new());
    for _ in 0..50 {
        assert!(!engine.fuzz_iteration().await.expect("iteration"));
    }
    let sent = sent.lock().expect("lock");
    assert_eq!(sent.len(), 50);
    assert!(sent.iter().all(|frame| frame[0] % 2 == 0));

    let stats = engine.stats();
    let stats = stats.read().expect("lock");
    assert_eq!(stats.msgs_sent, 50);
    assert!(stats.validation_retries > 0);
}

#[tokio::test]
async fn without_validation_frames_are_sent_as_generated() {
    let (mut engine, sent) = engine(false, false, CancellationToken::new());
    for _ in 0..200 {
        engine.fuzz_iteration().await.expect("iteration");
    }
    let sent = sent.lock().expect("lock");
    assert!(sent.iter().any(|frame| frame[0] % 2 == 1));
}

/// Validator that never accepts anything, the retry loop can only end by cancellation
struct Never;

impl Protocol for Never {
    fn name(&self) -> &'static str {
        "never"
    }

    fn msg_names(&self, _transport: Option<TransportKind>) -> Vec<MessageEntry> {
        vec![]
    }

    fn config(&self, _selected: &[String], _transport: TransportKind) -> FuzzResult<ConfigSchema> {
        ConfigSchema::new(vec![])
    }

    fn validates(&self, _msg_name: &str) -> bool {
        true
    }

    fn session(
        &self,
        _config: &ProtocolConfig,
        _transport: TransportKind,
    ) -> FuzzResult<Box<dyn ProtocolSession>> {
        Ok(Box::new(StubSession))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_interrupts_the_validation_retry_loop() {
    let cancel = CancellationToken::new();
    let mut engine = FuzzEngine::new(
        Arc::new(Never),
        Box::new(StubSession),
        StubTransport::default(),
        vec!["ping".into()],
        true,
        cancel.clone(),
    );
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });
    let exit = tokio::time::timeout(Duration::from_secs(10), engine.fuzz())
        .await
        .expect("loop observed the stop")
        .expect("no error");
    assert_eq!(exit, LoopExit::StoppedByUser);
    stopper.await.expect("stopper");
    assert!(engine.stats().read().expect("lock").validation_retries > 0);
}
