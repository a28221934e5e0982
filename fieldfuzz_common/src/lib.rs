//! Ready to use protocols, transports and devices for [`fieldfuzz_core`].
//!
//! - Protocols
//!     - `modbus`: every Modbus request function code plus invalid function codes, framed for
//!       Modbus TCP or the serial line, with a validator for requests a server should execute.
//!     - `MIL-STD-1553`: command, data and status words with odd parity.
//!     - `dumb-serial`: random byte strings.
//! - I/O interfaces
//!     - `TCP Socket`: `TcpTransport`, one connection per message.
//!     - `Serial`: `SerialTransport` on top of `tokio-serial`.
//! - Devices
//!     - `generic`: no recovery action.
//!     - `open_plc`: diagnoses an OpenPLC runtime after transport failures.
//!
//! `DefaultRegistry` bundles all of them, the `fieldfuzz` binary runs the CLI with it.
#![deny(missing_docs)]
#![deny(unsafe_code, clippy::unwrap_used)]
#![warn(clippy::pedantic)]

/// Message catalogues, generation and validation of the supported protocols
pub mod protocol;

/// TCP and serial `Transport` implementations
pub mod transport;

/// `Device` implementations
pub mod device;

/// The default lookup tables
pub mod registry;

pub use registry::DefaultRegistry;
