//! Command-line surface shared by every component binary.
//!
//! Each binary declares its own `--port.<name>` flags and flattens
//! [`CommonArgs`] in; [`launch`] does the rest:
//!
//! ```text
//! --json ──▶ print descriptor, exit 0
//!   │
//!   ▼
//! validate endpoints ──✗──▶ usage, exit 1
//!   │
//!   ▼
//! load settings ──✗──▶ exit 1
//!   │
//!   ▼
//! start component (barrier) ──✗──▶ exit 1 (timeout, open failure)
//!   │
//!   ▼
//! run loop ──▶ close ports ──▶ exit status
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use tracing::error;

use crate::component::{Component, ComponentLoop, Endpoints};
use crate::config::Settings;
use crate::error::{ComponentError, Result};
use crate::utils::bootstrap::init_tracing;

/// Flags every component accepts.
#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// Print component documentation in JSON
    #[arg(long)]
    pub json: bool,

    /// Enable debug mode
    #[arg(long)]
    pub debug: bool,

    /// Settings file (YAML)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Build the endpoint map from `(port, flag value)` pairs, skipping unset flags.
pub fn endpoints<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<String>)>) -> Endpoints {
    pairs
        .into_iter()
        .filter_map(|(port, endpoint)| endpoint.map(|e| (port.to_string(), e)))
        .collect()
}

/// Run a component binary to completion.
pub async fn launch<L: ComponentLoop>(
    component_loop: &L,
    endpoints: Endpoints,
    common: &CommonArgs,
    usage: impl FnOnce() -> String,
) -> ExitCode {
    let spec = component_loop.spec();

    if common.json {
        return match spec.descriptor().to_json() {
            Ok(doc) => {
                println!("{doc}");
                ExitCode::SUCCESS
            }
            Err(e) => fatal(&e),
        };
    }

    init_tracing(common.debug);

    if let Err(e) = spec.validate(&endpoints) {
        eprintln!("{e}");
        eprintln!("{}", usage());
        return ExitCode::FAILURE;
    }

    let settings = match Settings::load(common.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => return fatal(&e),
    };

    let component = match Component::start(&spec, &endpoints, &settings).await {
        Ok(component) => component,
        Err(ComponentError::Cancelled) => return ExitCode::SUCCESS,
        Err(e) => return fatal(&e),
    };

    let result = component_loop.run(&component).await;
    component.close();
    exit_code(finish(&component, result))
}

/// Exit status of a finished run. Errors are reported on the way out.
pub fn finish(component: &Component, result: Result<()>) -> i32 {
    match result {
        Ok(()) | Err(ComponentError::Cancelled) => component.exit_code(),
        Err(e) => {
            report(&e);
            e.exit_code()
        }
    }
}

fn report(err: &dyn std::error::Error) {
    error!(error = %err, "Component failed");
    eprintln!("{err}");
}

fn fatal(err: &dyn std::error::Error) -> ExitCode {
    report(err);
    ExitCode::FAILURE
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
