//!
//! `fieldfuzz` is a fuzzer for industrial field protocols like Modbus or MIL-STD-1553. It
//! generates random, often malformed or out-of-range messages, sends them to a system under
//! test and records every message the target did not answer as a potential crash.
//!
//! `fieldfuzz_core` contains everything that is independent of a concrete protocol:
//! - the binary codec (`codec`): MSB-first bit packing, CRC16, parity and data driven
//!   message layouts that can be generated, encoded and decoded,
//! - the protocol driver (`fuzz::engine`), which runs the fuzz loop of a single job,
//! - the job orchestrator (`fuzz::fuzzer`), which runs any number of jobs concurrently
//!   and exposes their status and counters,
//! - job configuration, crash output and logging.
//!
//! Protocols, transports and devices are plugged in through the traits in `traits`:
//! - `Protocol` / `ProtocolSession`: message catalogue, generation and validation
//! - `Transport`: sends a frame and waits for the reply
//! - `Device`: reacts to transport failures of a specific kind of target
//! - `Registry`: immutable lookup tables of all of the above
//!
//! Ready to use implementations live in the `fieldfuzz_common` crate.
//!
//! ```rs
//! #[tokio::main]
//! async fn main() {
//!     let fuzzer = Fuzzer::new(DefaultRegistry::new(), "crashes");
//!     let config = JobConfig::load(Path::new("modbus_tcp.json")).unwrap();
//!     config.check(fuzzer.registry()).unwrap();
//!
//!     let id = fuzzer.start_job(config).unwrap();
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//!     fuzzer.stop_job(id).await.unwrap();
//!
//!     println!("{} crashes", fuzzer.get_num_crashes(id).unwrap());
//! }
//! ```
//!

#![deny(missing_docs)]
#![deny(unsafe_code, clippy::unwrap_used)]
#![warn(clippy::pedantic)]

/// Contains all `traits` that have to be implemented to plug a protocol, transport or
/// device into `fieldfuzz_core`.
pub mod traits;

/// Bit packing, checksums and message layouts.
pub mod codec;

/// Job configuration and configuration schemas of protocols.
pub mod config;

/// Contains the protocol driver, the job orchestrator and the job statistics.
pub mod fuzz;

/// Manage the logger. This can be used to initialize the `tracing_subscriber` when
/// `fieldfuzz_core` is used without the CLI.
pub mod log;

/// Output directory and crash log of a job
pub mod output;

/// Contains all the different errors `fieldfuzz_core` can return.
pub mod error;

/// Random number source used for every generated field.
pub mod mutator;

/// Contains the `FieldFuzzBuilder` to start `fieldfuzz_core` in CLI mode.
pub mod cli;

/// Generated messages and crash records
pub mod types;
