use clap::{CommandFactory, Parser};
use snowex_ingest::cli::{args::Args, commands};
use std::process;
use tokio_util::sync::CancellationToken;

fn main() {
    let args = Args::parse();

    // No subcommand: show help
    if args.command.is_none() {
        let _ = Args::command().print_help();
        println!();
        process::exit(0);
    }

    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        let cancellation_token = CancellationToken::new();

        // Ctrl-C stops new files from starting; files mid-transaction finish
        let token = cancellation_token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nReceived CTRL+C, finishing files in progress...");
                token.cancel();
            }
        });

        commands::run(args, cancellation_token).await
    });

    match result {
        Ok(true) => process::exit(0),
        // Failures have already been reported
        Ok(false) => process::exit(2),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}
