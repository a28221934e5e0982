use fieldfuzz_core::error::FuzzError;
use fieldfuzz_core::traits::{Device, Endpoint};

/// Device without any recovery action
pub mod generic;

/// OpenPLC runtime
pub mod openplc;

pub use generic::GenericDevice;
pub use openplc::OpenPlcDevice;

/// The devices of `DefaultRegistry`, selected by device name
pub enum AnyDevice {
    /// `generic`
    Generic(GenericDevice),
    /// `open_plc`
    OpenPlc(OpenPlcDevice),
}

impl AnyDevice {
    /// Device registered under `name`
    #[must_use]
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            GenericDevice::NAME => Some(AnyDevice::Generic(GenericDevice)),
            OpenPlcDevice::NAME => Some(AnyDevice::OpenPlc(OpenPlcDevice::default())),
            _ => None,
        }
    }
}

impl Device for AnyDevice {
    fn name(&self) -> &'static str {
        match self {
            AnyDevice::Generic(d) => d.name(),
            AnyDevice::OpenPlc(d) => d.name(),
        }
    }

    async fn on_transport_failure(&mut self, endpoint: &Endpoint, err: &FuzzError) {
        match self {
            AnyDevice::Generic(d) => d.on_transport_failure(endpoint, err).await,
            AnyDevice::OpenPlc(d) => d.on_transport_failure(endpoint, err).await,
        }
    }
}
