//! The `recover` command: extract every report entry from the image.

use anyhow::{Context, Result};
use log::{error, info};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use strata_io::Reader;

use crate::report::read_file_objects;
use crate::scan::dump_file;

/// Default output directory: `<report-stem>-dump` next to the working dir.
fn default_output_dir(report_path: &Path) -> PathBuf {
    let stem = report_path
        .file_stem()
        .map_or_else(|| "report".into(), |s| s.to_string_lossy().into_owned());
    PathBuf::from(format!("{stem}-dump"))
}

pub fn run(image: &Path, report_path: &Path, output_dir: Option<PathBuf>) -> Result<()> {
    let source =
        Reader::new(image).with_context(|| format!("failed to open {}", image.display()))?;

    let report_file = File::open(report_path)
        .with_context(|| format!("failed to open report {}", report_path.display()))?;
    let infos = read_file_objects(BufReader::new(report_file))
        .with_context(|| format!("failed to parse report {}", report_path.display()))?;

    let out_dir = output_dir.unwrap_or_else(|| default_output_dir(report_path));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    for info in &infos {
        info!("recovering {}", out_dir.join(&info.name).display());
        if let Err(err) = dump_file(&source, &out_dir, info) {
            error!("unable to recover {}: {err}", info.name);
        }
    }
    info!("recovered {} files to {}", infos.len(), out_dir.display());
    Ok(())
}
