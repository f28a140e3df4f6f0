//! The `scan` command: partition discovery, carving, report and dump output.

use anyhow::{Context, Result};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use strata_core::{build_registry, builtin_scanners, BlockSource, FileInfo, Region, Scanner};
use strata_io::Reader;

use crate::partitions::discover_regions;
use crate::report::{DfxmlWriter, SourceInfo};

pub struct ScanOptions {
    pub dump_dir: Option<PathBuf>,
    pub report_file: Option<PathBuf>,
    pub block_size: Option<u32>,
    pub scan_buffer_size: usize,
    pub max_scan_size: Option<u64>,
    pub max_file_size: u64,
    pub file_ext: Vec<String>,
    pub disable_log: bool,
}

/// Unique per-scan session name, `scan_<unix-seconds>`.
fn session_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("scan_{secs}")
}

pub fn run(device: &Path, opts: &ScanOptions, running: Arc<AtomicBool>) -> Result<()> {
    let source =
        Reader::new(device).with_context(|| format!("failed to open {}", device.display()))?;

    let mut regions = discover_regions(&source)?;
    if let Some(block_size) = opts.block_size {
        for region in &mut regions {
            region.block_size = block_size;
        }
    }

    let session = session_id();
    let report_path = opts
        .report_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("report_{session}.xml")));

    let scanners = builtin_scanners(&opts.file_ext)?;
    info!("starting scan of {}", device.display());
    info!("source size: {}", format_size(source.size(), BINARY));
    info!("scanning for {} file types", scanners.len());

    if let Some(dir) = &opts.dump_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create dump directory {}", dir.display()))?;
    }

    let report_file = File::create(&report_path)
        .with_context(|| format!("failed to create report {}", report_path.display()))?;
    let mut report = DfxmlWriter::new(BufWriter::new(report_file));
    report.write_header(&SourceInfo {
        image_filename: device.display().to_string(),
        sector_size: regions
            .first()
            .map_or(crate::partitions::DEFAULT_BLOCK_SIZE, |r| r.block_size),
        image_size: source.size(),
    })?;

    let start = Instant::now();
    let mut files_found = 0u64;
    let mut total_data: u64 = 0;

    for (num, region) in regions.iter().enumerate() {
        let size = match opts.max_scan_size {
            Some(max) => region.size.min(max),
            None => region.size,
        };
        let region = Region {
            offset: region.offset,
            size,
            block_size: region.block_size,
        };
        info!(
            "scanning region {num}: offset={} size={} block_size={}",
            region.offset, region.size, region.block_size
        );

        let registry = build_registry(builtin_scanners(&opts.file_ext)?);
        let mut scanner = Scanner::new(
            registry,
            opts.scan_buffer_size,
            region.block_size,
            opts.max_file_size,
        )?;

        let pb = ProgressBar::new(region.size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                )?
                .progress_chars("##-"),
        );

        let mut emit_err: Option<anyhow::Error> = None;
        let stats = scanner.scan(
            &source,
            &region,
            |info| {
                files_found += 1;
                total_data += info.size;
                if let Err(err) = handle_carve(&source, opts.dump_dir.as_deref(), &mut report, &info)
                {
                    emit_err = Some(err);
                    return false;
                }
                running.load(Ordering::SeqCst)
            },
            |bytes, files| {
                pb.set_position(bytes);
                pb.set_message(format!("{files} files"));
            },
        )?;
        pb.finish_and_clear();

        if let Some(err) = emit_err {
            return Err(err);
        }
        if stats.stopped && !running.load(Ordering::SeqCst) {
            info!("scan interrupted");
            break;
        }
    }

    report.close()?;

    info!("scan completed in {:.1}s", start.elapsed().as_secs_f64());
    info!("files found: {files_found}");
    info!("carved data: {}", format_size(total_data, BINARY));
    info!("report saved to {}", report_path.display());
    if !opts.disable_log {
        info!("session: {session}");
    }
    Ok(())
}

fn handle_carve<W: Write>(
    source: &dyn BlockSource,
    dump_dir: Option<&Path>,
    report: &mut DfxmlWriter<W>,
    info: &FileInfo,
) -> Result<()> {
    info!(
        "found {} at offset {} ({} bytes)",
        info.name, info.offset, info.size
    );

    if let Some(dir) = dump_dir {
        if let Err(err) = dump_file(source, dir, info) {
            error!("unable to dump {}: {err}", info.name);
            return Err(err);
        }
    }

    report.write_file_object(info)
}

/// Copy one carved file out of the source.
pub fn dump_file(source: &dyn BlockSource, dir: &Path, info: &FileInfo) -> Result<()> {
    let path = dir.join(&info.name);
    let file = File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::with_capacity(1 << 20, file);

    let mut buf = vec![0u8; 64 * 1024];
    let mut offset = info.offset;
    let mut remaining = info.size;
    while remaining > 0 {
        let want = buf.len().min(remaining as usize);
        let n = source.read_at(offset, &mut buf[..want])?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        offset += n as u64;
        remaining -= n as u64;
    }
    out.flush()?;
    Ok(())
}
