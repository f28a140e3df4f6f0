//! strata - disk analysis and file recovery tool.
//!
//! Carves files of known formats out of disk images and raw devices by
//! signature, writes a DFXML report per scan, and can recover the carved
//! files from an image using such a report.

mod bytesize;
mod formats;
mod merge;
mod mount;
mod partitions;
mod recover;
mod report;
mod scan;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simplelog::{ColorChoice, CombinedLogger, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytesize::parse_bytes;

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about = "strata - disk analysis and file recovery tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan an image file or disk for recoverable files
    Scan {
        /// Image file or device to scan
        device: PathBuf,

        /// Dump carved files into this directory
        #[arg(short, long)]
        dump: Option<PathBuf>,

        /// Override the block size used during scanning
        #[arg(long)]
        block_size: Option<String>,

        /// Size of the scan buffer
        #[arg(long, default_value = "4MB")]
        scan_buffer_size: String,

        /// Maximum number of bytes to scan per region
        #[arg(long)]
        max_scan_size: Option<String>,

        /// Maximum size of a carved file
        #[arg(long, default_value = "4GB")]
        max_file_size: String,

        /// Comma-separated list of file extensions to carve
        #[arg(long, value_delimiter = ',')]
        ext: Vec<String>,

        /// Path of the scan report file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable logging
        #[arg(long, default_value_t = false)]
        no_log: bool,
    },

    /// Recover files from an image using a scan report
    Recover {
        /// Image file or device the report was produced from
        image: PathBuf,
        /// Scan report (DFXML)
        report: PathBuf,
        /// Directory for recovered files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Mount a scan report as a read-only directory
    Mount {
        image: PathBuf,
        report: PathBuf,
    },

    /// List all supported file formats
    Formats,

    /// Merge files into a single test disk image with random gaps
    Merge {
        /// Files to merge, in order
        files: Vec<PathBuf>,

        /// Path of the output image (required)
        #[arg(short, long)]
        output: PathBuf,

        /// Minimum gap size in bytes between files
        #[arg(long, default_value = "4096")]
        min_gap: String,

        /// Maximum gap size in bytes between files
        #[arg(long, default_value = "512KB")]
        max_gap: String,

        /// Block size in bytes
        #[arg(long, default_value = "512")]
        block_size: String,

        /// Seed for reproducible gap placement
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn init_logging(disable: bool, session_log: Option<PathBuf>) -> Result<()> {
    if disable {
        return Ok(());
    }
    let mut loggers: Vec<Box<dyn simplelog::SharedLogger>> = vec![TermLogger::new(
        LevelFilter::Info,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )];
    if let Some(path) = session_log {
        let file = std::fs::File::create(&path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        loggers.push(WriteLogger::new(
            LevelFilter::Debug,
            simplelog::Config::default(),
            file,
        ));
    }
    CombinedLogger::init(loggers).context("failed to initialize logging")?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            device,
            dump,
            block_size,
            scan_buffer_size,
            max_scan_size,
            max_file_size,
            ext,
            output,
            no_log,
        } => {
            let session_log = dump
                .as_ref()
                .filter(|_| !no_log)
                .map(|dir| dir.join("scan.log"));
            if let Some(dir) = &dump {
                std::fs::create_dir_all(dir)?;
            }
            init_logging(no_log, session_log)?;

            let block_size = block_size
                .map(|s| -> Result<u32> {
                    let v = parse_bytes(&s)?;
                    Ok(u32::try_from(v).context("block size too large")?)
                })
                .transpose()?
                .filter(|&v| v != 0);

            let opts = scan::ScanOptions {
                dump_dir: dump,
                report_file: output,
                block_size,
                scan_buffer_size: parse_bytes(&scan_buffer_size)? as usize,
                max_scan_size: max_scan_size.map(|s| parse_bytes(&s)).transpose()?,
                max_file_size: parse_bytes(&max_file_size)?,
                file_ext: ext,
                disable_log: no_log,
            };

            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                r.store(false, Ordering::SeqCst);
            })
            .context("failed to set Ctrl+C handler")?;

            scan::run(&device, &opts, running)
        }

        Commands::Recover {
            image,
            report,
            output_dir,
        } => {
            init_logging(false, None)?;
            recover::run(&image, &report, output_dir)
        }

        Commands::Mount { image, report } => {
            init_logging(false, None)?;
            mount::run(&image, &report)
        }

        Commands::Formats => formats::run(std::io::stdout().lock()),

        Commands::Merge {
            files,
            output,
            min_gap,
            max_gap,
            block_size,
            seed,
        } => {
            init_logging(false, None)?;
            let opts = merge::MergeOptions {
                output,
                min_gap: parse_bytes(&min_gap)?,
                max_gap: parse_bytes(&max_gap)?,
                block_size: parse_bytes(&block_size)?,
                seed,
            };
            merge::run(&files, &opts)
        }
    }
}
