//! Partition discovery.
//!
//! Reads the first sector and tries to interpret it as an MBR. FAT
//! partitions contribute their boot-sector logical sector size as the scan
//! block size; a protective MBR yields the GPT area as one region. When
//! nothing is recognized the whole source becomes a single region with the
//! default 512-byte block size.

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use strata_core::{BlockSource, Region};

pub const DEFAULT_BLOCK_SIZE: u32 = 512;

const MBR_SIGNATURE: u16 = 0xAA55;
const PARTITION_TABLE_OFFSET: usize = 0x1BE;

// Partition type IDs we can size a block for.
const TYPE_FAT12: u8 = 0x01;
const TYPE_FAT16_SMALL: u8 = 0x04;
const TYPE_FAT16: u8 = 0x06;
const TYPE_FAT32_CHS: u8 = 0x0B;
const TYPE_FAT32_LBA: u8 = 0x0C;
const TYPE_FAT16_LBA: u8 = 0x0E;
const TYPE_GPT_PROTECTIVE: u8 = 0xEE;

#[derive(Debug, Clone, Copy)]
struct MbrEntry {
    partition_type: u8,
    start_lba: u32,
    total_sectors: u32,
}

fn parse_mbr(sector: &[u8]) -> Option<[MbrEntry; 4]> {
    if sector.len() < 512 {
        return None;
    }
    if LittleEndian::read_u16(&sector[0x1FE..0x200]) != MBR_SIGNATURE {
        return None;
    }

    let mut entries = [MbrEntry {
        partition_type: 0,
        start_lba: 0,
        total_sectors: 0,
    }; 4];
    for (i, entry) in entries.iter_mut().enumerate() {
        let at = PARTITION_TABLE_OFFSET + i * 16;
        entry.partition_type = sector[at + 4];
        entry.start_lba = LittleEndian::read_u32(&sector[at + 8..at + 12]);
        entry.total_sectors = LittleEndian::read_u32(&sector[at + 12..at + 16]);
    }
    Some(entries)
}

/// Logical sector size from a FAT boot sector, if the sector looks like one.
fn fat_sector_size(boot: &[u8]) -> Option<u32> {
    if boot.len() < 512 {
        return None;
    }
    if LittleEndian::read_u16(&boot[0x1FE..0x200]) != MBR_SIGNATURE {
        return None;
    }
    let sector_size = LittleEndian::read_u16(&boot[0x0B..0x0D]);
    // Valid FAT sector sizes are 512..=4096, powers of two.
    if !sector_size.is_power_of_two() || !(512..=4096).contains(&sector_size) {
        return None;
    }
    Some(u32::from(sector_size))
}

/// Enumerate the regions to scan. Never fails on unrecognized layouts: the
/// fallback is one region covering the whole source.
pub fn discover_regions(source: &dyn BlockSource) -> Result<Vec<Region>> {
    let mut first_sector = [0u8; 512];
    let n = source.read_at(0, &mut first_sector)?;

    if n == 512 {
        if let Some(entries) = parse_mbr(&first_sector) {
            if let Some(regions) = regions_from_mbr(source, &entries)? {
                return Ok(regions);
            }
        }
    }

    Ok(vec![Region::whole(source.size(), DEFAULT_BLOCK_SIZE)])
}

fn regions_from_mbr(
    source: &dyn BlockSource,
    entries: &[MbrEntry; 4],
) -> Result<Option<Vec<Region>>> {
    // A protective MBR covers the GPT disk with a single 0xEE entry.
    if entries[0].partition_type == TYPE_GPT_PROTECTIVE {
        let offset = u64::from(entries[0].start_lba) * u64::from(DEFAULT_BLOCK_SIZE);
        let size = u64::from(entries[0].total_sectors) * u64::from(DEFAULT_BLOCK_SIZE);
        return Ok(Some(vec![Region {
            offset,
            size: size.min(source.size().saturating_sub(offset)),
            block_size: DEFAULT_BLOCK_SIZE,
        }]));
    }

    let mut regions = Vec::new();
    for entry in entries {
        match entry.partition_type {
            TYPE_FAT12 | TYPE_FAT16_SMALL | TYPE_FAT16 | TYPE_FAT16_LBA | TYPE_FAT32_CHS
            | TYPE_FAT32_LBA => {
                let offset = u64::from(entry.start_lba) * u64::from(DEFAULT_BLOCK_SIZE);
                let mut boot = [0u8; 512];
                if source.read_at(offset, &mut boot)? < 512 {
                    continue;
                }
                if let Some(sector_size) = fat_sector_size(&boot) {
                    regions.push(Region {
                        offset,
                        size: u64::from(entry.total_sectors) * u64::from(sector_size),
                        block_size: sector_size,
                    });
                }
            }
            _ => {}
        }
    }

    if regions.is_empty() {
        Ok(None)
    } else {
        Ok(Some(regions))
    }
}
