//! flowport-ticker: timer component
//!
//! Reads one interval IP on `interval`, then sends the current unix time on
//! `out` once per interval.
//!
//! ```text
//! [config] --interval--> [flowport-ticker] --out--> [downstream]
//! ```

use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use flowport::cli::{self, CommonArgs};
use flowport::components::ticker::{self, Ticker};

#[derive(Parser, Debug)]
#[command(name = "flowport-ticker", version, about = ticker::DESCRIPTION)]
struct Args {
    /// Component's input port endpoint
    #[arg(long = "port.interval", value_name = "ENDPOINT")]
    interval: Option<String>,

    /// Component's output port endpoint
    #[arg(long = "port.out", value_name = "ENDPOINT")]
    out: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let endpoints = cli::endpoints([
        (ticker::INTERVAL_PORT, args.interval),
        (ticker::OUT_PORT, args.out),
    ]);

    cli::launch(&Ticker, endpoints, &args.common, || {
        Args::command().render_usage().to_string()
    })
    .await
}
