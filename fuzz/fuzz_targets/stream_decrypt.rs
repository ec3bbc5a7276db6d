//! Fuzz target for streamed decryption
//!
//! Feeds arbitrary bytes, cut into arbitrary reads, to a decrypting session.
//! Corrupt input must surface as an error, never a panic, and buffered
//! input must stay bounded by one chunk.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shroud_crypto::{ByteBuffer, Crypto, Direction, supported_methods};

#[derive(Debug, Arbitrary)]
struct StreamInput {
    method: u8,
    reads: Vec<Vec<u8>>,
}

fuzz_target!(|input: StreamInput| {
    let methods: Vec<&str> = supported_methods().collect();
    let method = methods[usize::from(input.method) % methods.len()];
    let crypto = Crypto::new("fuzz", method).unwrap();
    let mut session = crypto.ctx_init(Direction::Decrypt).unwrap();

    for read in &input.reads {
        let mut buf = ByteBuffer::from(&read[..]);
        if crypto.decrypt(&mut buf, &mut session, 0).is_err() {
            break;
        }
        assert!(session.pending() <= 64 + 2 + 0x3FFF + 32);
    }

    crypto.ctx_release(&mut session);
});
