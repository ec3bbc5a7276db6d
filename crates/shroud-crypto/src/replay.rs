//! Salt and IV replay filter.
//!
//! Every session opens with random initialization material (an AEAD salt or
//! a stream-cipher IV). An attacker who records a session and plays it back
//! reuses that material, so the remote end remembers what it has seen and
//! rejects repeats.
//!
//! ## Structure
//!
//! The set is a scalable bloom filter: a list of stages, each a plain bloom
//! filter. Stage `i` holds `n * 2^i` items at error rate `p * (1 - r) * r^i`
//! with `r = 0.9`, so the compound false-positive rate stays below `p` no
//! matter how many stages open. A new stage opens when the newest one is
//! full. Bit positions use double hashing over a BLAKE3 digest of the item.
//!
//! ## Concurrency
//!
//! One filter is shared by every connection. All operations take the inner
//! lock, and [`ReplayFilter::check_and_add`] performs the lookup and the
//! insert in one critical section, so two connections presenting the same
//! salt cannot both pass.

use crate::CryptoError;
use crate::config::ReplayConfig;
use parking_lot::Mutex;
use std::f64::consts::LN_2;

/// Error-rate tightening ratio between consecutive stages.
const TIGHTENING_RATIO: f64 = 0.9;

/// Capacity multiplier between consecutive stages.
const GROWTH_FACTOR: usize = 2;

/// Largest single stage in bits (128 MiB of storage).
pub const MAX_STAGE_BITS: u64 = 1 << 30;

/// Bits for a stage of `capacity` items at `error_rate`, or `None` if that
/// exceeds [`MAX_STAGE_BITS`].
fn stage_bits(capacity: usize, error_rate: f64) -> Option<u64> {
    let bits = ((capacity as f64 * error_rate.ln().abs()) / (LN_2 * LN_2))
        .ceil()
        .max(64.0);
    (bits.is_finite() && bits <= MAX_STAGE_BITS as f64).then_some(bits as u64)
}

/// Bits the first stage needs for `expected_entries` at `false_positive_rate`.
pub(crate) fn first_stage_bits(expected_entries: usize, false_positive_rate: f64) -> Option<u64> {
    stage_bits(expected_entries, false_positive_rate * (1.0 - TIGHTENING_RATIO))
}

/// A single fixed-size bloom filter.
struct BloomStage {
    bits: Vec<u64>,
    num_bits: u64,
    num_hashes: u32,
    capacity: usize,
    count: usize,
}

impl BloomStage {
    /// Later stages that would outgrow [`MAX_STAGE_BITS`] are capped there
    /// and trade accuracy for bounded memory.
    fn new(capacity: usize, error_rate: f64) -> Self {
        let ln_p = error_rate.ln().abs();
        let num_bits = stage_bits(capacity, error_rate).unwrap_or(MAX_STAGE_BITS);
        let num_hashes = (ln_p / LN_2).ceil().max(1.0) as u32;
        let words = num_bits.div_ceil(64) as usize;

        Self {
            bits: vec![0u64; words],
            num_bits,
            num_hashes,
            capacity,
            count: 0,
        }
    }

    fn positions(&self, hash: ItemHash) -> impl Iterator<Item = u64> + '_ {
        (0..u64::from(self.num_hashes))
            .map(move |i| hash.h1.wrapping_add(i.wrapping_mul(hash.h2)) % self.num_bits)
    }

    fn contains(&self, hash: ItemHash) -> bool {
        self.positions(hash)
            .all(|bit| self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0)
    }

    fn insert(&mut self, hash: ItemHash) {
        let positions: Vec<u64> = self.positions(hash).collect();
        for bit in positions {
            self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
        }
        self.count += 1;
    }

    fn is_full(&self) -> bool {
        self.count >= self.capacity
    }

    fn size_bytes(&self) -> usize {
        self.bits.len() * 8
    }
}

/// Two independent 64-bit hashes of an item.
#[derive(Clone, Copy)]
struct ItemHash {
    h1: u64,
    h2: u64,
}

impl ItemHash {
    fn of(material: &[u8]) -> Self {
        let digest = blake3::hash(material);
        let bytes = digest.as_bytes();

        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&bytes[..8]);
        hi.copy_from_slice(&bytes[8..16]);

        // Odd, so the stride is never zero
        Self {
            h1: u64::from_le_bytes(lo),
            h2: u64::from_le_bytes(hi) | 1,
        }
    }
}

/// Scalable bloom filter.
struct ScalableBloom {
    stages: Vec<BloomStage>,
    initial_capacity: usize,
    error_rate: f64,
    count: usize,
}

impl ScalableBloom {
    fn new(initial_capacity: usize, error_rate: f64) -> Self {
        let first = BloomStage::new(initial_capacity, error_rate * (1.0 - TIGHTENING_RATIO));
        tracing::debug!(
            capacity = initial_capacity,
            error_rate,
            bits = first.num_bits,
            hashes = first.num_hashes,
            bytes = first.size_bytes(),
            "replay filter sized"
        );

        Self {
            stages: vec![first],
            initial_capacity,
            error_rate,
            count: 0,
        }
    }

    fn contains(&self, hash: ItemHash) -> bool {
        self.stages.iter().any(|stage| stage.contains(hash))
    }

    fn insert(&mut self, hash: ItemHash) {
        if self.contains(hash) {
            return;
        }

        if self.stages.last().is_none_or(BloomStage::is_full) {
            self.open_stage();
        }
        if let Some(stage) = self.stages.last_mut() {
            stage.insert(hash);
            self.count += 1;
        }
    }

    fn open_stage(&mut self) {
        let level = self.stages.len() as i32;
        let capacity = self
            .initial_capacity
            .saturating_mul(GROWTH_FACTOR.saturating_pow(level as u32));
        let error_rate = self.error_rate * (1.0 - TIGHTENING_RATIO) * TIGHTENING_RATIO.powi(level);

        let stage = BloomStage::new(capacity, error_rate);
        tracing::debug!(
            stage = level,
            capacity,
            bytes = stage.size_bytes(),
            "replay filter grew"
        );
        self.stages.push(stage);
    }
}

/// Process-wide set of seen salts and IVs.
///
/// Construct once at startup and share by reference or `Arc` with every
/// connection handler.
pub struct ReplayFilter {
    inner: Mutex<Option<ScalableBloom>>,
}

impl ReplayFilter {
    /// Build a filter sized for `expected_entries` at `false_positive_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::ReplayFilterInit`] if `expected_entries` is zero,
    /// the rate is not strictly between 0 and 1, or the first stage would
    /// exceed [`MAX_STAGE_BITS`]. The caller must treat this as fatal.
    pub fn new(expected_entries: usize, false_positive_rate: f64) -> Result<Self, CryptoError> {
        Self::from_config(&ReplayConfig {
            expected_entries,
            false_positive_rate,
        })
    }

    /// Build a filter from configuration.
    ///
    /// # Errors
    ///
    /// See [`ReplayFilter::new`].
    pub fn from_config(config: &ReplayConfig) -> Result<Self, CryptoError> {
        config.validate()?;

        Ok(Self {
            inner: Mutex::new(Some(ScalableBloom::new(
                config.expected_entries,
                config.false_positive_rate,
            ))),
        })
    }

    /// Mark `material` as seen.
    pub fn add(&self, material: &[u8]) {
        let hash = ItemHash::of(material);
        if let Some(bloom) = self.inner.lock().as_mut() {
            bloom.insert(hash);
        }
    }

    /// Whether `material` has probably been seen.
    ///
    /// Never returns `false` for added material while the filter is open.
    #[must_use]
    pub fn check(&self, material: &[u8]) -> bool {
        let hash = ItemHash::of(material);
        self.inner
            .lock()
            .as_ref()
            .is_some_and(|bloom| bloom.contains(hash))
    }

    /// Report whether `material` was already seen, adding it if not.
    ///
    /// Returns `true` for a probable replay. The lookup and insert are one
    /// atomic step with respect to other callers.
    #[must_use]
    pub fn check_and_add(&self, material: &[u8]) -> bool {
        let hash = ItemHash::of(material);
        let mut guard = self.inner.lock();
        let Some(bloom) = guard.as_mut() else {
            return false;
        };

        if bloom.contains(hash) {
            tracing::warn!(
                material = %hex::encode(material),
                "repeated salt or IV, possible replay"
            );
            return true;
        }
        bloom.insert(hash);
        false
    }

    /// Approximate number of distinct items added.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, |bloom| bloom.count)
    }

    /// Whether nothing has been added (or the filter is closed).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release filter storage. Subsequent adds are ignored.
    pub fn close(&self) {
        if self.inner.lock().take().is_some() {
            tracing::debug!("replay filter closed");
        }
    }

    /// Whether [`ReplayFilter::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }
}

impl std::fmt::Debug for ReplayFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.lock();
        f.debug_struct("ReplayFilter")
            .field("closed", &guard.is_none())
            .field("count", &guard.as_ref().map_or(0, |b| b.count))
            .field("stages", &guard.as_ref().map_or(0, |b| b.stages.len()))
            .finish()
    }
}
