use std::process::ExitCode;

use clap::Parser;
use musicalterm_lib::Cli;

#[tokio::main]
async fn main() -> ExitCode {
  musicalterm_lib::run(Cli::parse()).await
}
