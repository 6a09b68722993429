//! Deterministic random number generation.
//!
//! RULE: Nothing in the desk may call any platform RNG.
//! All randomness flows through StreamRng instances derived
//! from the master seed the engine was built with.
//!
//! Each (slot, sequence) pair gets its own stream:
//!   - slot:     what the randomness is for (tie-breaks, batch ids)
//!   - sequence: which batch is running
//! so re-running the same batches against the same seed repeats
//! every assignment exactly.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG stream.
pub struct StreamRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream directly from a seed. Tests use this to
    /// pin tie-breaks without going through a bank.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Pick a uniformly random index into a slice of length `len`.
    pub fn pick_index(&mut self, len: usize) -> usize {
        self.next_u64_below(len as u64) as usize
    }

    /// Fill 16 bytes for building a batch id.
    pub fn next_bytes16(&mut self) -> [u8; 16] {
        let mut out = [0u8; 16];
        self.inner.fill_bytes(&mut out);
        out
    }
}

/// Hands out streams derived from one master seed.
#[derive(Debug, Clone)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn for_stream(&self, slot: StreamSlot, sequence: u64) -> StreamRng {
        let derived_seed = self.master_seed
            ^ (slot as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ sequence.wrapping_mul(0xbf58_476d_1ce4_e5b9);
        StreamRng::from_seed(derived_seed).with_name(slot.name())
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries. Only append.
/// Reordering changes every stream's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    Assignment = 0,
    BatchId = 1,
    // Add new streams here. Append only.
}

impl StreamSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::BatchId => "batch_id",
        }
    }
}
