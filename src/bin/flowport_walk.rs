//! flowport-walk: filesystem traversal component
//!
//! Every directory path received on `dir` is walked recursively; file paths
//! go out on `file`, traversal errors on the optional `err` port.
//!
//! ```text
//!                                  ┌──file──> [downstream]
//! [upstream] --dir--> [flowport-walk]
//!                                  └──err───> [error sink] (optional)
//! ```

use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use flowport::cli::{self, CommonArgs};
use flowport::components::walk::{self, Walk};

#[derive(Parser, Debug)]
#[command(name = "flowport-walk", version, about = walk::DESCRIPTION)]
struct Args {
    /// Component's input port endpoint
    #[arg(long = "port.dir", value_name = "ENDPOINT")]
    dir: Option<String>,

    /// Component's output port endpoint
    #[arg(long = "port.file", value_name = "ENDPOINT")]
    file: Option<String>,

    /// Component's error port endpoint
    #[arg(long = "port.err", value_name = "ENDPOINT")]
    err: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let endpoints = cli::endpoints([
        (walk::DIR_PORT, args.dir),
        (walk::FILE_PORT, args.file),
        (walk::ERR_PORT, args.err),
    ]);

    cli::launch(&Walk, endpoints, &args.common, || {
        Args::command().render_usage().to_string()
    })
    .await
}
