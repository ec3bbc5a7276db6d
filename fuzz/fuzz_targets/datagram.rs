//! Fuzz target for whole-buffer operations
//!
//! Arbitrary datagrams must decrypt or fail cleanly, and any payload must
//! round-trip through `encrypt_all`/`decrypt_all`.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shroud_crypto::{ByteBuffer, Crypto, supported_methods};

#[derive(Debug, Arbitrary)]
struct DatagramInput {
    method: u8,
    capacity: u16,
    data: Vec<u8>,
}

fuzz_target!(|input: DatagramInput| {
    let methods: Vec<&str> = supported_methods().collect();
    let method = methods[usize::from(input.method) % methods.len()];
    let crypto = Crypto::new("fuzz", method).unwrap();
    let capacity = usize::from(input.capacity);

    // Fuzz decryption with arbitrary data - should never panic
    let mut buf = ByteBuffer::from(&input.data[..]);
    let _ = crypto.decrypt_all(&mut buf, capacity);

    let mut buf = ByteBuffer::from(&input.data[..]);
    crypto.encrypt_all(&mut buf, capacity).unwrap();
    assert!(buf.capacity() >= capacity);
    crypto.decrypt_all(&mut buf, 0).unwrap();
    assert_eq!(buf.as_slice(), &input.data[..]);
});
