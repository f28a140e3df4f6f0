//! The `mount` command: present a scan report as a read-only directory.
//!
//! Mounting needs a userspace filesystem backend, which this build does not
//! link. The report is still validated so a malformed file is reported the
//! same way `recover` would.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::report::read_file_objects;

pub fn run(image: &Path, report_path: &Path) -> Result<()> {
    if !image.exists() {
        bail!("image {} does not exist", image.display());
    }

    let report_file = File::open(report_path)
        .with_context(|| format!("failed to open report {}", report_path.display()))?;
    let infos = read_file_objects(BufReader::new(report_file))
        .with_context(|| format!("failed to parse report {}", report_path.display()))?;

    bail!(
        "mount is not supported on this platform (no userspace filesystem \
         backend); use `recover` to extract the {} reported files instead",
        infos.len()
    );
}
