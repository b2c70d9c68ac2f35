use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Bootloader artifacts served over TFTP. menu.c32 pulls in libutil.c32;
/// ldlinux.c32 is the PXELINUX core module.
const BOOTLOADER_FILES: [&str; 4] = ["pxelinux.0", "ldlinux.c32", "menu.c32", "libutil.c32"];

#[derive(Debug, Default)]
pub struct StageOutcome {
    pub copied: Vec<String>,
    pub unchanged: Vec<String>,
    pub missing: Vec<String>,
}

/// Copy bootloader files from the syslinux install into the TFTP root.
///
/// Idempotent: a file whose content hash already matches the source is left
/// alone, so repeated runs converge instead of rewriting. A file missing
/// from the source directory is reported and skipped; the pxe-files health
/// probe surfaces the gap instead of aborting startup here.
pub async fn stage_bootloader(syslinux_dir: &Path, tftp_root: &Path) -> Result<StageOutcome> {
    tokio::fs::create_dir_all(tftp_root)
        .await
        .with_context(|| format!("creating tftp root {}", tftp_root.display()))?;

    let mut outcome = StageOutcome::default();
    for file in BOOTLOADER_FILES {
        let src = syslinux_dir.join(file);
        let dst = tftp_root.join(file);

        if !src.is_file() {
            warn!("bootloader file {} not found, skipping", src.display());
            outcome.missing.push(file.to_string());
            continue;
        }

        if dst.is_file() {
            let src_sum = sha256::try_digest(&src)
                .with_context(|| format!("hashing {}", src.display()))?;
            let dst_sum = sha256::try_digest(&dst)
                .with_context(|| format!("hashing {}", dst.display()))?;
            if src_sum == dst_sum {
                debug!("{} already staged", file);
                outcome.unchanged.push(file.to_string());
                continue;
            }
        }

        tokio::fs::copy(&src, &dst)
            .await
            .with_context(|| format!("copying {} to {}", src.display(), dst.display()))?;
        info!("staged {} into {}", file, tftp_root.display());
        outcome.copied.push(file.to_string());
    }
    Ok(outcome)
}
