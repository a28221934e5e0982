use crate::device::{AnyDevice, GenericDevice, OpenPlcDevice};
use crate::protocol::dumb_serial::DumbSerialProtocol;
use crate::protocol::mil_std_1553::MilStd1553Protocol;
use crate::protocol::modbus::ModbusProtocol;
use crate::transport::AnyTransport;
use fieldfuzz_core::error::{FuzzError, FuzzResult};
use fieldfuzz_core::traits::{Protocol, Registry, TransportKind};
use std::sync::Arc;

const IO_INTERFACES: &[TransportKind] = &[TransportKind::Socket, TransportKind::Serial];
const DEVICES: &[&str] = &[GenericDevice::NAME, OpenPlcDevice::NAME];

/// Every protocol, I/O interface and device shipped with `fieldfuzz_common`. Built once
/// at startup and never changed afterwards.
pub struct DefaultRegistry {
    protocols: Vec<Arc<dyn Protocol>>,
}

impl Default for DefaultRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DefaultRegistry {
    /// Creates the lookup tables
    #[must_use]
    pub fn new() -> Self {
        Self {
            protocols: vec![
                Arc::new(ModbusProtocol),
                Arc::new(MilStd1553Protocol),
                Arc::new(DumbSerialProtocol),
            ],
        }
    }
}

impl Registry for DefaultRegistry {
    type Transport = AnyTransport;

    fn protocol_names(&self) -> Vec<&'static str> {
        self.protocols.iter().map(|p| p.name()).collect()
    }

    fn protocol(&self, name: &str) -> Option<Arc<dyn Protocol>> {
        self.protocols.iter().find(|p| p.name() == name).cloned()
    }

    fn io_interface_names(&self) -> Vec<&'static str> {
        IO_INTERFACES.iter().map(|kind| kind.name()).collect()
    }

    fn io_interface_kind(&self, name: &str) -> Option<TransportKind> {
        TransportKind::from_name(name)
    }

    fn device_names(&self) -> Vec<&'static str> {
        DEVICES.to_vec()
    }

    fn transport(&self, io_interface: &str, device: &str) -> FuzzResult<AnyTransport> {
        let kind =
            self.io_interface_kind(io_interface)
                .ok_or_else(|| FuzzError::UnknownIoInterface {
                    name: io_interface.to_owned(),
                })?;
        let device = AnyDevice::by_name(device).ok_or_else(|| FuzzError::UnknownDevice {
            name: device.to_owned(),
        })?;
        Ok(AnyTransport::new(kind, device))
    }
}
