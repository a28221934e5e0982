use fieldfuzz_common::DefaultRegistry;
use fieldfuzz_core::cli::FieldFuzzBuilder;

#[tokio::main]
async fn main() {
    if let Err(err) = FieldFuzzBuilder::new(DefaultRegistry::new()).start_cli().await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
