//! Filesystem traversal component.
//!
//! Each data IP on `dir` names a directory. Every non-directory entry below
//! it is sent on `file` as a path, in lexical order, without following
//! symlinks. The first traversal error ends that walk and its text goes out
//! on `err` when that port is configured.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::component::{Component, ComponentLoop, ComponentSpec, PortSpec};
use crate::error::Result;
use crate::packet::Packet;

pub const NAME: &str = "fs/walk";
pub const DESCRIPTION: &str = "Recursively walks the given directory and sends the file paths";

pub const DIR_PORT: &str = "dir";
pub const FILE_PORT: &str = "file";
pub const ERR_PORT: &str = "err";

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("cannot walk '{root}': {source}")]
    Traverse {
        root: String,
        #[source]
        source: walkdir::Error,
    },

    #[error("walk of '{root}' did not finish")]
    Interrupted { root: String },
}

/// What one traversal produced before it stopped.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub files: Vec<PathBuf>,
    pub error: Option<WalkError>,
}

/// Collect every non-directory entry under `root`.
///
/// Entries come out in lexical order per directory. Symlinks are reported as
/// entries and never followed. Stops at the first error and keeps what was
/// found so far.
pub fn walk_files(root: &Path) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();
    let entries = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();

    for entry in entries {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {}
            Ok(entry) => outcome.files.push(entry.into_path()),
            Err(source) => {
                outcome.error = Some(WalkError::Traverse {
                    root: root.display().to_string(),
                    source,
                });
                break;
            }
        }
    }
    outcome
}

pub struct Walk;

impl Walk {
    async fn process(&self, component: &Component, root: &str) -> Result<()> {
        info!(root = %root, "Walking");
        let path = PathBuf::from(root);
        let outcome = tokio::task::spawn_blocking(move || walk_files(&path))
            .await
            .unwrap_or_else(|_| WalkOutcome {
                files: Vec::new(),
                error: Some(WalkError::Interrupted {
                    root: root.to_string(),
                }),
            });

        for file in &outcome.files {
            let file = file.to_string_lossy().into_owned();
            component.send_packet(FILE_PORT, Packet::data(file)).await?;
        }
        debug!(root = %root, files = outcome.files.len(), "Walk finished");

        if let Some(e) = outcome.error {
            warn!(error = %e, "Walk failed");
            if component.has_port(ERR_PORT) {
                component
                    .send_packet(ERR_PORT, Packet::data(e.to_string()))
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ComponentLoop for Walk {
    fn spec(&self) -> ComponentSpec {
        ComponentSpec::new(NAME, DESCRIPTION)
            .port(PortSpec::input(DIR_PORT, "Directory to walk"))
            .port(PortSpec::output(FILE_PORT, "File paths found"))
            .port(PortSpec::error_output(ERR_PORT, "Error messages").optional())
    }

    async fn run(&self, component: &Component) -> Result<()> {
        let mut delays = component.poll_delays();
        while let Some(packet) = component.poll_packet(DIR_PORT, &mut delays).await? {
            let root = packet.payload_str().into_owned();
            self.process(component, &root).await?;
            if component.input_closed(DIR_PORT) {
                break;
            }
        }
        Ok(())
    }
}
