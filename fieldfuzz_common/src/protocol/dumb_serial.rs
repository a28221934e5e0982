use crate::protocol::{PlainSession, catalogue};
use crate::transport::io_config_fields;
use fieldfuzz_core::codec::{Field, Layout};
use fieldfuzz_core::config::{ConfigSchema, ProtocolConfig};
use fieldfuzz_core::error::FuzzResult;
use fieldfuzz_core::traits::{MessageEntry, Protocol, ProtocolSession, TransportKind};

const BYTE: &[Field] = &[Field::uint("value", 8)];

/// Random byte strings of up to 1024 bytes
pub static MESSAGES: &[Layout] = &[Layout {
    name: "Dumb Serial Spammer",
    fields: &[Field::list("plchldr", BYTE, 0, 1024)],
}];

/// Sends random bytes without any structure
#[derive(Debug, Default, Clone, Copy)]
pub struct DumbSerialProtocol;

impl Protocol for DumbSerialProtocol {
    fn name(&self) -> &'static str {
        "dumb-serial"
    }

    fn msg_names(&self, _transport: Option<TransportKind>) -> Vec<MessageEntry> {
        catalogue(MESSAGES, |_| true)
    }

    fn config(&self, _selected: &[String], transport: TransportKind) -> FuzzResult<ConfigSchema> {
        ConfigSchema::new(io_config_fields(transport, 8080))
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
    use fieldfuzz_core::mutator::Mutator;

    #[test]
    fn spam_is_at_most_1024_bytes() {
        let mut session = DumbSerialProtocol
            .session(&ProtocolConfig::new(), TransportKind::Socket)
            .expect("no config needed");
        let mut mutator = Mutator::from_seed([9; 32]);
        for _ in 0..100 {
            let msg = session
                .fuzz_one("Dumb Serial Spammer", &mut mutator)
                .expect("known message");
            assert!(msg.raw.len() <= 1024);
            assert_eq!(msg.name, "Dumb Serial Spammer");
        }
    }

    #[test]
    fn tcp_port_defaults_to_8080() {
        let schema = DumbSerialProtocol
            .config(&[], TransportKind::Socket)
            .expect("valid schema");
        assert_eq!(
            schema.defaults().get_u64("Destination Port").expect("an int"),
            Some(8080)
        );
    }
}
