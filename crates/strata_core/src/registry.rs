//! Signature registry: maps byte-prefix signatures to candidate validators.
//!
//! Lookup is a prefix walk: for every registered signature that is an exact
//! prefix of the bytes at a candidate offset, the registered scanners are
//! visited in declaration order, shortest signature first. The fast path is a
//! flat 65,536-entry table indexed by a rolling 16-bit hash, so the per-byte
//! cost of walking non-matching data is a single table load.

use crate::types::FileScanner;
use std::collections::HashMap;
use std::sync::Arc;

const TABLE_SIZE: usize = 1 << 16;

const SLOT_NONE: u8 = 0;
/// The hash chain passes through this slot on the way to a longer signature.
const SLOT_PREFIX: u8 = 1;
/// Some signature's full hash chain ends here; consult the exact map.
const SLOT_TERMINAL: u8 = 2;

#[inline]
fn roll(h: u16, b: u8) -> u16 {
    (h << 2).wrapping_add(u16::from(b))
}

pub struct SignatureRegistry {
    table: Box<[u8; TABLE_SIZE]>,
    scanners: HashMap<Vec<u8>, Vec<Arc<dyn FileScanner>>>,
}

impl SignatureRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Box::new([SLOT_NONE; TABLE_SIZE]),
            scanners: HashMap::new(),
        }
    }

    /// Register a scanner under every signature it declares. Duplicate
    /// signatures are allowed; scanners accumulate in insertion order.
    pub fn insert(&mut self, scanner: Arc<dyn FileScanner>) {
        for sig in scanner.signatures() {
            debug_assert!(!sig.is_empty(), "empty signatures are not allowed");
            let mut h: u16 = 0;
            for &b in &sig {
                h = roll(h, b);
                self.table[h as usize] = self.table[h as usize].max(SLOT_PREFIX);
            }
            self.table[h as usize] = SLOT_TERMINAL;
            self.scanners.entry(sig).or_default().push(scanner.clone());
        }
    }

    /// Number of distinct registered signatures.
    #[must_use]
    pub fn signatures(&self) -> usize {
        self.scanners.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }

    /// Visit every scanner whose signature is a prefix of `data`, shortest
    /// prefix first, in declaration order within each prefix. Stops as soon
    /// as `visit` returns true, or when no longer registered prefix exists.
    pub fn walk<F>(&self, data: &[u8], mut visit: F)
    where
        F: FnMut(&Arc<dyn FileScanner>) -> bool,
    {
        if self.scanners.is_empty() {
            return;
        }

        let mut h: u16 = 0;
        for (i, &b) in data.iter().enumerate() {
            h = roll(h, b);
            match self.table[h as usize] {
                SLOT_NONE => return,
                SLOT_TERMINAL => {
                    // Hash collisions land here too; the exact map decides.
                    if let Some(list) = self.scanners.get(&data[..i + 1]) {
                        for scanner in list {
                            if visit(scanner) {
                                return;
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

impl Default for SignatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a frozen registry from a set of scanners.
pub fn build_registry<I>(scanners: I) -> SignatureRegistry
where
    I: IntoIterator<Item = Arc<dyn FileScanner>>,
{
    let mut registry = SignatureRegistry::new();
    for scanner in scanners {
        registry.insert(scanner);
    }
    registry
}
