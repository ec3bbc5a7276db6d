//! Fuzz test for configuration parsing
//!
//! Tests that arbitrary TOML input doesn't cause panics when parsed and
//! validated as cipher configuration.

#![no_main]

use libfuzzer_sys::fuzz_target;
use shroud_crypto::{Crypto, CryptoConfig};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let Ok(config) = toml::from_str::<CryptoConfig>(s) else {
            return;
        };

        // Validation and construction must agree
        let valid = config.validate().is_ok();
        let built = Crypto::from_config(&config).is_ok();
        if valid {
            assert!(built);
        }
    }
});
