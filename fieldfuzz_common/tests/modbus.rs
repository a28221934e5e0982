use fieldfuzz_common::protocol::modbus::adu::TcpAdu;
use fieldfuzz_common::protocol::modbus::messages::{self, SERIAL_ONLY_FUNCTION_CODES};
use fieldfuzz_common::protocol::modbus::validate::validate;
use fieldfuzz_common::protocol::modbus::{ModbusProtocol, ModbusSession};
use fieldfuzz_core::codec::checksum::crc16;
use fieldfuzz_core::config::ProtocolConfig;
use fieldfuzz_core::error::FuzzResult;
use fieldfuzz_core::fuzz::engine::FuzzEngine;
use fieldfuzz_core::mutator::Mutator;
use fieldfuzz_core::traits::{Protocol, ProtocolSession, Transport, TransportKind};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[test]
fn transaction_ids_increase_and_wrap() {
    let mut session = ModbusSession::new(TransportKind::Socket, Some(1));
    let mut mutator = Mutator::from_seed([0; 32]);
    for i in 0..=0x1_0001u32 {
        session.begin_iteration();
        let msg = session
            .fuzz_one("Read Coils Request", &mut mutator)
            .expect("known message");
        let adu = TcpAdu::parse(&msg.raw).expect("mbap header");
        assert_eq!(u32::from(adu.transaction_id), i & 0xFFFF);
    }
    assert_eq!(session.transaction_id(), 1);
}

#[test]
fn validation_retries_keep_the_transaction_id() {
    let mut session = ModbusSession::new(TransportKind::Socket, None);
    let mut mutator = Mutator::from_seed([2; 32]);
    session.begin_iteration();
    session.begin_iteration();
    for _ in 0..10 {
        let msg = session
            .fuzz_one("Read FIFO Queue", &mut mutator)
            .expect("known message");
        assert_eq!(TcpAdu::parse(&msg.raw).expect("header").transaction_id, 1);
    }
}

#[test]
fn tcp_frames_never_use_serial_only_codes() {
    let proto = ModbusProtocol;
    let mut session = proto
        .session(&ProtocolConfig::new(), TransportKind::Socket)
        .expect("session");
    let mut mutator = Mutator::from_seed([4; 32]);
    let enabled: Vec<_> = proto
        .msg_names(Some(TransportKind::Socket))
        .into_iter()
        .filter(|entry| entry.enabled)
        .collect();
    assert_eq!(enabled.len(), messages::MESSAGES.len() - 5);
    for entry in enabled {
        session.begin_iteration();
        let msg = session.fuzz_one(entry.name, &mut mutator).expect("known");
        let adu = TcpAdu::parse(&msg.raw).expect("header");
        assert!(!SERIAL_ONLY_FUNCTION_CODES.contains(&adu.pdu[0]), "{}", msg.summary);
        assert_eq!(usize::from(adu.length), adu.pdu.len() + 1);
    }
}

#[test]
fn serial_frames_end_with_a_valid_crc() {
    let proto = ModbusProtocol;
    let mut session = proto
        .session(&ProtocolConfig::new(), TransportKind::Serial)
        .expect("session");
    let mut mutator = Mutator::from_seed([8; 32]);
    for entry in proto.msg_names(Some(TransportKind::Serial)) {
        for _ in 0..20 {
            session.begin_iteration();
            let msg = session.fuzz_one(entry.name, &mut mutator).expect("known");
            assert_eq!(crc16(&msg.raw), 0, "{}", msg.summary);
        }
    }
}

#[test]
fn invalid_function_code_avoids_defined_codes() {
    let mut session = ModbusSession::new(TransportKind::Serial, Some(1));
    let mut mutator = Mutator::from_seed([6; 32]);
    for _ in 0..2000 {
        let msg = session
            .fuzz_one(messages::INVALID_FUNCTION_CODE, &mut mutator)
            .expect("known");
        let code = u64::from(msg.raw[1]);
        assert!(!messages::VALID_FUNCTION_CODES.contains(&code));
        assert!(msg.raw.len() <= 1 + 1 + 252 + 2);
        assert!(!validate(&msg.raw, TransportKind::Serial));
    }
}

fn first_valid(name: &str, kind: TransportKind, seed: u8) -> Vec<u8> {
    let mut session = ModbusSession::new(kind, None);
    let mut mutator = Mutator::from_seed([seed; 32]);
    session.begin_iteration();
    for _ in 0..1_000_000 {
        let msg = session.fuzz_one(name, &mut mutator).expect("known");
        if validate(&msg.raw, kind) {
            return msg.raw;
        }
    }
    panic!("no valid {name} frame generated");
}

#[test]
fn random_search_finds_valid_requests() {
    for kind in [TransportKind::Serial, TransportKind::Socket] {
        let raw = first_valid("Read Holding Registers", kind, 1);
        let pdu = match kind {
            TransportKind::Serial => &raw[1..raw.len() - 2],
            TransportKind::Socket => &raw[7..],
        };
        let quantity = u16::from_be_bytes([pdu[3], pdu[4]]);
        assert!((1..=0x7D).contains(&quantity));

        let raw = first_valid("Write Multiple Registers", kind, 2);
        let pdu = match kind {
            TransportKind::Serial => &raw[1..raw.len() - 2],
            TransportKind::Socket => &raw[7..],
        };
        let quantity = usize::from(u16::from_be_bytes([pdu[3], pdu[4]]));
        assert_eq!(usize::from(pdu[5]), 2 * quantity);
        assert_eq!(pdu.len(), 6 + 2 * quantity);
    }
}

#[test]
fn serial_only_requests_validate_on_the_serial_line() {
    let raw = first_valid("Report Slave Id", TransportKind::Serial, 3);
    assert_eq!(raw.len(), 4);
    assert!(!validate(&raw, TransportKind::Socket));
}

/// Accepts every frame and keeps a copy
#[derive(Default)]
struct RecordingTransport {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Transport for RecordingTransport {
    fn title(&self) -> String {
        "recording".into()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn configure(&mut self, _config: &ProtocolConfig) -> FuzzResult<()> {
        Ok(())
    }

    async fn teardown(&mut self) -> FuzzResult<()> {
        Ok(())
    }

    async fn transmit(&mut self, buf: &[u8], _wait_for_reply: bool) -> Option<Vec<u8>> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(buf.to_vec());
        }
        Some(vec![0x00])
    }

    async fn receive(&mut self) -> Option<Vec<u8>> {
        None
    }
}

#[tokio::test]
async fn driver_picks_selected_messages_uniformly() {
    let proto = Arc::new(ModbusProtocol);
    let selected: Vec<String> = proto
        .msg_names(Some(TransportKind::Socket))
        .into_iter()
        .filter(|entry| entry.enabled)
        .map(|entry| entry.name.to_owned())
        .collect();
    let session = proto
        .session(&ProtocolConfig::new(), TransportKind::Socket)
        .expect("session");
    let transport = RecordingTransport::default();
    let sent = transport.sent.clone();
    let mut engine = FuzzEngine::new(
        proto,
        session,
        transport,
        selected.clone(),
        false,
        CancellationToken::new(),
    )
    .with_seed([9; 32]);

    let rounds = 1000 * selected.len();
    for _ in 0..rounds {
        assert!(!engine.fuzz_iteration().await.expect("iteration"));
    }

    let sent = sent.lock().expect("lock");
    assert_eq!(sent.len(), rounds);
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for frame in sent.iter() {
        let code = TcpAdu::parse(frame).expect("header").pdu[0];
        assert!(!SERIAL_ONLY_FUNCTION_CODES.contains(&code), "{frame:02x?}");
        let name = messages::by_function_code(code)
            .map_or(messages::INVALID_FUNCTION_CODE, |layout| layout.name);
        *counts.entry(name).or_default() += 1;
    }
    assert_eq!(counts.len(), selected.len());
    for (name, count) in counts {
        assert!(selected.iter().any(|s| s == name), "{name} was not selected");
        assert!((850..=1150).contains(&count), "{name} sent {count} times");
    }
}
