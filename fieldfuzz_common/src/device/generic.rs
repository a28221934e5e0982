use fieldfuzz_core::error::FuzzError;
use fieldfuzz_core::traits::{Device, Endpoint};

/// Generic device which does nothing on failures
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDevice;

impl GenericDevice {
    /// Registered name
    pub const NAME: &'static str = "generic";
}

impl Device for GenericDevice {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn on_transport_failure(&mut self, endpoint: &Endpoint, err: &FuzzError) {
        tracing::debug!("{endpoint}: {err}, generic device has no recovery action");
    }
}
