use fieldfuzz_core::codec::Layout;
use fieldfuzz_core::error::{FuzzError, FuzzResult};
use fieldfuzz_core::mutator::{FuzzRng, Mutator};
use fieldfuzz_core::traits::{MessageEntry, ProtocolSession};
use fieldfuzz_core::types::FuzzedMessage;

/// Modbus application protocol with TCP and serial line framing
pub mod modbus;

/// MIL-STD-1553 command, data and status words
pub mod mil_std_1553;

/// Unstructured bytes for plain serial devices
pub mod dumb_serial;

fn catalogue(layouts: &'static [Layout], enabled: impl Fn(&Layout) -> bool) -> Vec<MessageEntry> {
    layouts
        .iter()
        .map(|layout| MessageEntry {
            name: layout.name,
            enabled: enabled(layout),
        })
        .collect()
}

fn find_layout(
    layouts: &'static [Layout],
    protocol: &str,
    msg_name: &str,
) -> FuzzResult<&'static Layout> {
    layouts
        .iter()
        .find(|layout| layout.name == msg_name)
        .ok_or_else(|| FuzzError::UnknownMessage {
            protocol: protocol.to_owned(),
            name: msg_name.to_owned(),
        })
}

/// Session of protocols whose messages go on the wire without any framing or state
struct PlainSession {
    protocol: &'static str,
    layouts: &'static [Layout],
}

impl ProtocolSession for PlainSession {
    fn fuzz_one(
        &mut self,
        msg_name: &str,
        mutator: &mut Mutator<FuzzRng>,
    ) -> FuzzResult<FuzzedMessage> {
        let layout = find_layout(self.layouts, self.protocol, msg_name)?;
        let record = layout.generate(mutator);
        let raw = layout.encode(&record)?;
        let shown = layout.decode(&raw).unwrap_or(record);
        Ok(FuzzedMessage {
            name: layout.name.to_owned(),
            summary: layout.show(&shown),
            raw,
        })
    }
}
