use crate::config::JobConfig;
use crate::error::{FuzzError, FuzzResult};
use crate::fuzz::fuzzer::Fuzzer;
use crate::fuzz::stats::JobStatus;
use crate::log::Logger;
use crate::traits::{Registry, TransportKind};
use clap::Parser;
use clap::Subcommand;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "fieldfuzz", about = "Fuzzer for industrial field protocols")]
struct FieldFuzzCliArgs {
    /// Verbose mode
    #[arg(long, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: FieldFuzzCliCommands,
}

#[derive(Debug, Subcommand)]
enum FieldFuzzCliCommands {
    /// Lists the registered protocols, I/O interfaces and devices
    List,
    /// Lists the message types of a protocol
    Messages {
        /// protocol name
        #[arg(long, short)]
        protocol: String,
        /// only enable messages that apply to this I/O interface
        #[arg(long, short)]
        io_interface: Option<String>,
    },
    /// Prints a job configuration with every default filled in
    Template {
        /// protocol name
        #[arg(long, short)]
        protocol: String,
        /// I/O interface name
        #[arg(long, short)]
        io_interface: String,
        /// device name
        #[arg(long, short, default_value = "generic")]
        device: String,
        /// regenerate messages until they pass the protocol validator
        #[arg(long, default_value_t = false)]
        validate: bool,
    },
    /// Starts a job and runs it until Ctrl-C
    Run {
        /// job configuration (JSON)
        #[arg(long, short)]
        config: PathBuf,
        /// output directory for crash logs
        #[arg(long, short, default_value = "crashes")]
        out_dir: PathBuf,
        /// seconds between two status lines
        #[arg(long, default_value_t = 5)]
        status_interval: u64,
    },
}

/// A helper struct to setup the CLI application with a registry of protocols,
/// I/O interfaces and devices.
pub struct FieldFuzzBuilder<R: Registry> {
    registry: R,
}

impl<R: Registry> FieldFuzzBuilder<R> {
    /// Creates the CLI for `registry`
    pub fn new(registry: R) -> Self {
        Self { registry }
    }

    /// Parses the command line and runs the selected command
    /// # Errors
    pub async fn start_cli(self) -> FuzzResult<()> {
        let args = FieldFuzzCliArgs::parse();
        let _logger = Logger::init(args.verbose);
        match args.command {
            FieldFuzzCliCommands::List => {
                self.list();
                Ok(())
            }
            FieldFuzzCliCommands::Messages {
                protocol,
                io_interface,
            } => self.messages(&protocol, io_interface.as_deref()),
            FieldFuzzCliCommands::Template {
                protocol,
                io_interface,
                device,
                validate,
            } => {
                let template = self.template(&protocol, &io_interface, &device, validate)?;
                println!("{}", template.to_json()?);
                Ok(())
            }
            FieldFuzzCliCommands::Run {
                config,
                out_dir,
                status_interval,
            } => {
                let config = JobConfig::load(&config)?;
                self.run(config, out_dir, Duration::from_secs(status_interval.max(1)))
                    .await
            }
        }
    }

    fn list(&self) {
        println!("Protocols:");
        for name in self.registry.protocol_names() {
            println!("  {name}");
        }
        println!("I/O interfaces:");
        for name in self.registry.io_interface_names() {
            println!("  {name}");
        }
        println!("Devices:");
        for name in self.registry.device_names() {
            println!("  {name}");
        }
    }

    fn transport_kind(&self, io_interface: &str) -> FuzzResult<TransportKind> {
        self.registry
            .io_interface_kind(io_interface)
            .ok_or_else(|| FuzzError::UnknownIoInterface {
                name: io_interface.to_owned(),
            })
    }

    fn messages(&self, protocol: &str, io_interface: Option<&str>) -> FuzzResult<()> {
        let protocol = self
            .registry
            .protocol(protocol)
            .ok_or_else(|| FuzzError::UnknownProtocol {
                name: protocol.to_owned(),
            })?;
        let kind = io_interface
            .map(|name| self.transport_kind(name))
            .transpose()?;
        for entry in protocol.msg_names(kind) {
            let mark = if entry.enabled { "x" } else { " " };
            let validated = if protocol.validates(entry.name) {
                " (validated)"
            } else {
                ""
            };
            println!("[{mark}] {}{validated}", entry.name);
        }
        Ok(())
    }

    /// Job configuration with every message enabled for the interface and all
    /// configuration defaults
    /// # Errors
    /// Unknown protocol, I/O interface or device.
    pub fn template(
        &self,
        protocol: &str,
        io_interface: &str,
        device: &str,
        validate: bool,
    ) -> FuzzResult<JobConfig> {
        let proto = self
            .registry
            .protocol(protocol)
            .ok_or_else(|| FuzzError::UnknownProtocol {
                name: protocol.to_owned(),
            })?;
        let kind = self.transport_kind(io_interface)?;
        if !self.registry.device_names().iter().any(|d| *d == device) {
            return Err(FuzzError::UnknownDevice {
                name: device.to_owned(),
            });
        }
        let msg_types: Vec<String> = proto
            .msg_names(Some(kind))
            .into_iter()
            .filter(|entry| entry.enabled)
            .map(|entry| entry.name.to_owned())
            .collect();
        let schema = proto.config(&msg_types, kind)?;
        Ok(JobConfig {
            protocol: protocol.to_owned(),
            io_interface: io_interface.to_owned(),
            device: device.to_owned(),
            validate,
            msg_types,
            protocol_config: schema.defaults(),
            comment: String::new(),
            max_messages: None,
        })
    }

    async fn run(self, config: JobConfig, out_dir: PathBuf, interval: Duration) -> FuzzResult<()> {
        config.check(&self.registry)?;
        let fuzzer = Fuzzer::new(self.registry, out_dir);
        let id = fuzzer.start_job(config)?;

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    fuzzer.stop_job(id).await?;
                    break;
                }
                _ = ticker.tick() => {
                    if !fuzzer.is_running(Some(id)) {
                        break;
                    }
                    let snapshot = fuzzer.snapshot(id)?;
                    let last_crash = snapshot
                        .last_crash
                        .map(|at| format!(", last {:.1}s ago", at.elapsed().as_secs_f64()))
                        .unwrap_or_default();
                    tracing::info!(
                        "{}: {} msgs sent, {} crashes ({} unique){last_crash}",
                        snapshot.title,
                        snapshot.msgs_sent,
                        snapshot.crashes,
                        snapshot.unique_crashes
                    );
                }
            }
        }

        let snapshot = fuzzer.snapshot(id)?;
        tracing::info!(
            "Job {id} {}: {} msgs sent, {} crashes ({} unique). Crash log: {}",
            snapshot.status,
            snapshot.msgs_sent,
            snapshot.crashes,
            snapshot.unique_crashes,
            fuzzer.crash_log_path(id)?.display()
        );
        if snapshot.status == JobStatus::ExitError {
            return Err(FuzzError::Custom {
                err_msg: snapshot.exit_reason,
            });
        }
        Ok(())
    }
}
