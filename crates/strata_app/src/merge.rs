//! The `merge` command: concatenate files into a flat disk image with
//! randomized block-aligned gaps, for building reproducible scanner tests.

use anyhow::{bail, Context, Result};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct MergeOptions {
    pub output: PathBuf,
    pub min_gap: u64,
    pub max_gap: u64,
    pub block_size: u64,
    pub seed: Option<u64>,
}

/// Small splitmix64 generator; enough to vary gap sizes and filler bytes
/// without dragging in an RNG dependency.
struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn in_range(&mut self, min: u64, max: u64) -> u64 {
        min + self.next() % (max - min + 1)
    }
}

pub fn run(files: &[PathBuf], opts: &MergeOptions) -> Result<()> {
    if opts.min_gap == 0 {
        bail!("min-gap must be greater than 0");
    }
    if opts.min_gap > opts.max_gap {
        bail!(
            "min-gap ({}) cannot be greater than max-gap ({})",
            opts.min_gap,
            opts.max_gap
        );
    }
    if opts.block_size == 0 {
        bail!("block size must be greater than 0");
    }

    let seed = opts.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5EED)
    });
    let mut rng = Rng::new(seed);

    let out = File::create(&opts.output)
        .with_context(|| format!("failed to create {}", opts.output.display()))?;
    let mut w = BufWriter::new(out);

    info!(
        "merging {} files into {}",
        files.len(),
        opts.output.display()
    );

    let mut written: u64 = 0;
    for path in files {
        // Random gap before each file, rounded to whole blocks so the file
        // lands block-aligned.
        let gap = block_aligned_gap(&mut rng, opts);
        write_filler(&mut w, &mut rng, gap)?;
        written += gap;

        let copied = copy_file(&mut w, path)?;
        written += copied;

        // Pad the file out to the next block boundary.
        let pad = (opts.block_size - copied % opts.block_size) % opts.block_size;
        write_filler(&mut w, &mut rng, pad)?;
        written += pad;
    }

    w.flush()?;
    info!("merge complete: {written} bytes written (seed {seed})");
    Ok(())
}

fn block_aligned_gap(rng: &mut Rng, opts: &MergeOptions) -> u64 {
    let gap = rng.in_range(opts.min_gap, opts.max_gap);
    (gap / opts.block_size).max(1) * opts.block_size
}

fn write_filler<W: Write>(w: &mut W, rng: &mut Rng, len: u64) -> Result<()> {
    let mut buf = [0u8; 8192];
    let mut remaining = len;
    while remaining > 0 {
        let take = buf.len().min(remaining as usize);
        for b in &mut buf[..take] {
            *b = rng.next() as u8;
        }
        w.write_all(&buf[..take])?;
        remaining -= take as u64;
    }
    Ok(())
}

fn copy_file<W: Write>(w: &mut W, path: &Path) -> Result<u64> {
    let mut f =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(std::io::copy(&mut f, w)?)
}
