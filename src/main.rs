use cbm_processor::CbmError;
use cbm_processor::cli::{self, Args};
use clap::Parser;
use std::process;

fn main() {
    let args = Args::parse();
    cli::setup_logging(&args);

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        let shutdown_signal = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("Failed to install CTRL+C signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        // Output written before an interrupt is incomplete; retries start over
        tokio::select! {
            result = cli::run(args) => result,
            _ = shutdown_signal => {
                eprintln!("\nReceived CTRL+C, abandoning run");
                Err(CbmError::Interrupted {
                    reason: "Processing interrupted by user".to_string(),
                }
                .into())
            }
        }
    });

    match result {
        Ok(_stats) => process::exit(0),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}
