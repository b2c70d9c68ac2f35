use std::io::Write as _;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::template::{RenderedConfig, Validation};

/// Upper bound on one syntax-check invocation. A checker that hangs is
/// treated the same as one that rejects the file.
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("{name}: syntax check `{cmd}` rejected the rendered file: {detail}")]
    Rejected {
        name: String,
        cmd: String,
        detail: String,
    },
    #[error("{name}: syntax check `{cmd}` did not finish within {timeout:?}")]
    Timeout {
        name: String,
        cmd: String,
        timeout: Duration,
    },
    #[error("{name}: rendered file failed structural check: {detail}")]
    Malformed { name: String, detail: String },
}

/// Write a rendered config to its destination, validating first.
///
/// The content is staged into a temp file next to the destination, the
/// validation runs against that staged copy, and only a passing file is
/// renamed over the live one. On any validation failure the previous
/// on-disk file is left untouched.
pub async fn commit(rendered: &RenderedConfig) -> Result<()> {
    let dest = &rendered.dest;
    let parent = dest
        .parent()
        .with_context(|| format!("{} has no parent directory", dest.display()))?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("creating {}", parent.display()))?;

    let mut staged = NamedTempFile::new_in(parent)
        .with_context(|| format!("staging {} in {}", rendered.name, parent.display()))?;
    staged
        .write_all(rendered.content.as_bytes())
        .with_context(|| format!("writing staged {}", rendered.name))?;
    staged.flush()?;

    match &rendered.validation {
        Validation::Command(argv) => {
            run_checker(rendered, argv, staged.path().to_string_lossy().as_ref()).await?;
        }
        Validation::Structural { required_token } => {
            if rendered.content.trim().is_empty() {
                bail!(CommitError::Malformed {
                    name: rendered.name.clone(),
                    detail: "rendered file is empty".into(),
                });
            }
            if !rendered.content.contains(required_token) {
                bail!(CommitError::Malformed {
                    name: rendered.name.clone(),
                    detail: format!("missing `{required_token}`"),
                });
            }
        }
    }

    staged
        .persist(dest)
        .with_context(|| format!("replacing {}", dest.display()))?;
    info!("committed {} to {}", rendered.name, dest.display());
    Ok(())
}

async fn run_checker(rendered: &RenderedConfig, argv: &[String], staged_path: &str) -> Result<()> {
    let cmd_line = format!("{} {}", argv.join(" "), staged_path);
    debug!("validating {} with `{}`", rendered.name, cmd_line);

    let run = Command::new(&argv[0])
        .args(&argv[1..])
        .arg(staged_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(VALIDATE_TIMEOUT, run).await {
        Err(_) => {
            bail!(CommitError::Timeout {
                name: rendered.name.clone(),
                cmd: cmd_line,
                timeout: VALIDATE_TIMEOUT,
            });
        }
        Ok(res) => res.with_context(|| format!("spawning syntax check `{cmd_line}`"))?,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(CommitError::Rejected {
            name: rendered.name.clone(),
            cmd: cmd_line,
            detail: stderr.trim().to_string(),
        });
    }
    Ok(())
}
