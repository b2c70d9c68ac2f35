//! Rendering of daemon configuration for the pxs netboot stack.
//!
//! Expands the effective [`common::StackConfig`] into concrete files for
//! dhcpd, PXELINUX and nginx, validates each file with the target daemon's
//! own syntax checker before it is allowed to replace the live copy, and
//! stages bootloader artifacts into the TFTP root.

mod commit;
mod stage;
mod template;

pub use commit::{CommitError, commit};
pub use stage::{StageOutcome, stage_bootloader};
pub use template::{RenderedConfig, Validation, discover_distros, render_all};
