//! Modbus requests over Modbus TCP or a serial line (RTU framing).

use crate::protocol::{catalogue, find_layout};
use crate::transport::io_config_fields;
use fieldfuzz_core::config::{ConfigField, ConfigSchema, ProtocolConfig};
use fieldfuzz_core::error::{FuzzError, FuzzResult};
use fieldfuzz_core::mutator::{FuzzRng, Mutator};
use fieldfuzz_core::traits::{MessageEntry, Protocol, ProtocolSession, TransportKind};
use fieldfuzz_core::types::FuzzedMessage;

pub mod adu;
/// Request catalogue
pub mod messages;
pub mod validate;

/// Name of the optional configuration field that pins the unit identifier
pub const UNIT_IDENTIFIER: &str = "Unit Identifier";

/// Modbus application protocol
#[derive(Debug, Default, Clone, Copy)]
pub struct ModbusProtocol;

impl Protocol for ModbusProtocol {
    fn name(&self) -> &'static str {
        "modbus"
    }

    fn msg_names(&self, transport: Option<TransportKind>) -> Vec<MessageEntry> {
        catalogue(messages::MESSAGES, |layout| {
            transport != Some(TransportKind::Socket)
                || !messages::function_code(layout)
                    .is_some_and(|code| messages::SERIAL_ONLY_FUNCTION_CODES.contains(&code))
        })
    }

    fn config(&self, _selected: &[String], transport: TransportKind) -> FuzzResult<ConfigSchema> {
        let mut fields = io_config_fields(transport, 502);
        fields.push(
            ConfigField::int(
                UNIT_IDENTIFIER,
                "slave address / unit id (0-255), random per message if empty",
            )
            .with_range(0, u8::MAX)
            .optional(),
        );
        ConfigSchema::new(fields)
    }

    fn validates(&self, msg_name: &str) -> bool {
        msg_name != messages::INVALID_FUNCTION_CODE && messages::by_name(msg_name).is_some()
    }

    fn validate(&self, raw: &[u8], transport: TransportKind) -> bool {
        validate::validate(raw, transport)
    }

    fn session(
        &self,
        config: &ProtocolConfig,
        transport: TransportKind,
    ) -> FuzzResult<Box<dyn ProtocolSession>> {
        let unit_id = config
            .get_u64(UNIT_IDENTIFIER)?
            .map(|id| {
                u8::try_from(id).map_err(|_| {
                    FuzzError::invalid_config(format!("{UNIT_IDENTIFIER} {id} is not in 0..=255"))
                })
            })
            .transpose()?;
        Ok(Box::new(ModbusSession::new(transport, unit_id)))
    }
}

/// Generation state of one Modbus job
#[derive(Debug)]
pub struct ModbusSession {
    transport: TransportKind,
    unit_id: Option<u8>,
    transaction_id: u16,
    next_transaction_id: u16,
}

impl ModbusSession {
    /// Session framing for `transport`, with a fixed or a random unit id
    #[must_use]
    pub fn new(transport: TransportKind, unit_id: Option<u8>) -> Self {
        Self {
            transport,
            unit_id,
            transaction_id: 0,
            next_transaction_id: 0,
        }
    }

    /// Transaction id used by the current iteration
    #[must_use]
    pub fn transaction_id(&self) -> u16 {
        self.transaction_id
    }
}

impl ProtocolSession for ModbusSession {
    fn begin_iteration(&mut self) {
        self.transaction_id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
    }

    fn fuzz_one(
        &mut self,
        msg_name: &str,
        mutator: &mut Mutator<FuzzRng>,
    ) -> FuzzResult<FuzzedMessage> {
        let layout = find_layout(messages::MESSAGES, "modbus", msg_name)?;
        let record = layout.generate(mutator);
        let pdu = layout.encode(&record)?;
        let unit_id = self
            .unit_id
            .unwrap_or_else(|| u8::try_from(mutator.gen_bits(8)).unwrap_or_default());

        let (raw, header) = match self.transport {
            TransportKind::Serial => (
                adu::serial_frame(unit_id, &pdu),
                format!("<Serial ADU address={unit_id:#x} |>"),
            ),
            TransportKind::Socket => (
                adu::tcp_frame(self.transaction_id, unit_id, &pdu),
                format!(
                    "<MBAP trans_id={:#x} proto_id=0x0 len={:#x} unit_id={unit_id:#x} |>",
                    self.transaction_id,
                    pdu.len() + 1
                ),
            ),
        };
        // re-read the pdu so the summary shows the computed length fields
        let shown = layout.decode(&pdu).unwrap_or(record);
        Ok(FuzzedMessage {
            name: layout.name.to_owned(),
            summary: format!("{header} / {}", layout.show(&shown)),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_only_messages_are_disabled_for_tcp() {
        let proto = ModbusProtocol;
        let tcp = proto.msg_names(Some(TransportKind::Socket));
        let disabled: Vec<_> = tcp.iter().filter(|e| !e.enabled).map(|e| e.name).collect();
        assert_eq!(
            disabled,
            vec![
                "Read Exception Status",
                "Diagnostics",
                "Get Comm Event Counter",
                "Get Comm Event Log",
                "Report Slave Id"
            ]
        );
        assert!(proto.msg_names(None).iter().all(|e| e.enabled));
        assert!(
            proto
                .msg_names(Some(TransportKind::Serial))
                .iter()
                .all(|e| e.enabled)
        );
    }

    #[test]
    fn invalid_function_code_is_not_validated() {
        let proto = ModbusProtocol;
        assert!(proto.validates("Read Coils Request"));
        assert!(!proto.validates(messages::INVALID_FUNCTION_CODE));
        assert!(!proto.validates("Not a message"));
    }

    #[test]
    fn unit_identifier_must_fit_a_byte() {
        let proto = ModbusProtocol;
        let config = ProtocolConfig::new().with(UNIT_IDENTIFIER, 300);
        assert!(proto.session(&config, TransportKind::Serial).is_err());
        let config = ProtocolConfig::new().with(UNIT_IDENTIFIER, 17);
        assert!(proto.session(&config, TransportKind::Serial).is_ok());
    }

    #[test]
    fn fixed_unit_id_is_used_for_every_frame() {
        let mut session = ModbusSession::new(TransportKind::Serial, Some(0x11));
        let mut mutator = Mutator::from_seed([7; 32]);
        for _ in 0..20 {
            session.begin_iteration();
            let msg = session
                .fuzz_one("Read Holding Registers", &mut mutator)
                .expect("known message");
            assert_eq!(msg.raw[0], 0x11);
            assert_eq!(msg.raw[1], 0x03);
            assert_eq!(msg.raw.len(), 8);
            assert!(msg.summary.starts_with("<Serial ADU address=0x11 |> / <Read Holding"));
        }
    }

    #[test]
    fn unknown_messages_are_an_error() {
        let mut session = ModbusSession::new(TransportKind::Socket, None);
        let mut mutator = Mutator::from_seed([1; 32]);
        assert!(matches!(
            session.fuzz_one("Write Everything", &mut mutator),
            Err(FuzzError::UnknownMessage { .. })
        ));
    }
}
