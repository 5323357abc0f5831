use std::process::ExitCode;

use clap::Parser;

use meterbill_cli::{commands, config::Args};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    meterbill_observability::init(args.log_format);

    match commands::run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
