//! Startup advisory on system entropy.
//!
//! Salts, IVs and nonces are drawn from the OS generator for every session.
//! On hosts that report a starved entropy pool the first sessions can stall
//! on generator initialization, so we warn once at startup. This check is
//! advisory only: it never blocks and never fails.

/// Entropy (in bits) below which a warning is logged.
pub const ENTROPY_THRESHOLD_BITS: u32 = 160;

#[cfg(target_os = "linux")]
const ENTROPY_AVAIL_PATH: &str = "/proc/sys/kernel/random/entropy_avail";

/// Read the available entropy and warn if it is below the threshold.
///
/// Returns the number of bits the kernel reports, or `None` on platforms
/// without such a query or when it cannot be read.
pub fn check_startup_entropy() -> Option<u32> {
    let bits = available_entropy()?;
    if is_starved(bits) {
        tracing::warn!(
            available_bits = bits,
            threshold_bits = ENTROPY_THRESHOLD_BITS,
            "This system doesn't provide enough entropy to quickly generate high-quality random numbers. \
             Installing rng-tools, jitterentropy or haveged may help; \
             on virtualized hosts also consider virtio-rng."
        );
    } else {
        tracing::debug!(available_bits = bits, "entropy pool ok");
    }
    Some(bits)
}

/// Whether `bits` of entropy is below the warning threshold.
#[must_use]
pub fn is_starved(bits: u32) -> bool {
    bits < ENTROPY_THRESHOLD_BITS
}

#[cfg(target_os = "linux")]
fn available_entropy() -> Option<u32> {
    let raw = std::fs::read_to_string(ENTROPY_AVAIL_PATH).ok()?;
    parse_entropy(&raw)
}

#[cfg(not(target_os = "linux"))]
fn available_entropy() -> Option<u32> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_entropy(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}
