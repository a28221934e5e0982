//! The three 20 bit words of MIL-STD-1553: 3 bit sync (not generated), 16 bit
//! payload and an odd parity bit. On the wire here each word is the 16 bit payload
//! followed by the parity bit and 7 zero bits, i.e. three bytes.

use crate::protocol::{PlainSession, catalogue};
use crate::transport::io_config_fields;
use fieldfuzz_core::codec::{Field, Layout};
use fieldfuzz_core::config::{ConfigSchema, ProtocolConfig};
use fieldfuzz_core::error::FuzzResult;
use fieldfuzz_core::traits::{MessageEntry, Protocol, ProtocolSession, TransportKind};

/// Every MIL-STD-1553 word type
pub static MESSAGES: &[Layout] = &[
    Layout {
        name: "MIL-STD-1553 Command Word",
        fields: &[
            Field::uint_default("remote_terminal_address", 5, 1),
            Field::uint("tr", 1),
            Field::uint_default("subaddress_mode", 5, 2),
            Field::uint("data_word_count_mode_code", 5),
            Field::parity("parity"),
            Field::padding("padding", 7),
        ],
    },
    Layout {
        name: "MIL-STD-1553 Data Word",
        fields: &[
            Field::uint("data", 16),
            Field::parity("parity"),
            Field::padding("padding", 7),
        ],
    },
    Layout {
        name: "MIL-STD-1553 Status Word",
        fields: &[
            Field::uint_default("remote_terminal_address", 5, 1),
            Field::uint("message_error", 1),
            Field::uint("instrumentation", 1),
            Field::uint("service_request", 1),
            Field::uint("reserved", 3),
            Field::uint("broadcast_command_received", 1),
            Field::uint("busy", 1),
            Field::uint("subsystem_flag", 1),
            Field::uint("dynamic_bus_control_acceptance", 1),
            Field::uint("terminal_flag", 1),
            Field::parity("parity"),
            Field::padding("padding", 7),
        ],
    },
];

/// MIL-STD-1553 words sent over a serial line or TCP bridge
#[derive(Debug, Default, Clone, Copy)]
pub struct MilStd1553Protocol;

impl Protocol for MilStd1553Protocol {
    fn name(&self) -> &'static str {
        "MIL-STD-1553"
    }

    fn msg_names(&self, _transport: Option<TransportKind>) -> Vec<MessageEntry> {
        catalogue(MESSAGES, |_| true)
    }

    fn config(&self, _selected: &[String], transport: TransportKind) -> FuzzResult<ConfigSchema> {
        ConfigSchema::new(io_config_fields(transport, 502))
    }

    fn session(
        &self,
        _config: &ProtocolConfig,
        _transport: TransportKind,
    ) -> FuzzResult<Box<dyn ProtocolSession>> {
        Ok(Box::new(PlainSession {
            protocol: self.name(),
            layouts: MESSAGES,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldfuzz_core::codec::checksum::parity_of;
    use fieldfuzz_core::mutator::Mutator;

    #[test]
    fn words_carry_odd_parity() {
        let proto = MilStd1553Protocol;
        let mut session = proto
            .session(&ProtocolConfig::new(), TransportKind::Serial)
            .expect("no config needed");
        let mut mutator = Mutator::from_seed([3; 32]);
        for entry in proto.msg_names(None) {
            for _ in 0..50 {
                let msg = session.fuzz_one(entry.name, &mut mutator).expect("known word");
                assert_eq!(msg.raw.len(), 3);
                assert_eq!(msg.raw[2] & 0x7F, 0);
                let ones = msg.raw.iter().map(|b| b.count_ones()).sum::<u32>();
                assert_eq!(ones % 2, 1, "{}", msg.summary);
                assert_eq!(parity_of(&msg.raw[..2]), msg.raw[2] >> 7);
            }
        }
    }

    #[test]
    fn no_validator() {
        let proto = MilStd1553Protocol;
        assert!(!proto.validates("MIL-STD-1553 Data Word"));
        assert!(!proto.validate(&[0, 0, 0x80], TransportKind::Serial));
    }

    #[test]
    fn command_word_default_layout() {
        let word = &MESSAGES[0];
        let raw = word.encode(&word.default_record()).expect("complete record");
        // rt 1, tr 0, subaddress 2, count 0 -> 0000 1000 0100 0000, two ones -> parity 1
        assert_eq!(raw, vec![0x08, 0x40, 0x80]);
    }
}
