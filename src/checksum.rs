//! Block checksums compatible with the established sync-tag checksum scheme.
//!
//! The scheme is fixed: a synthetic blank line is prepended to the block,
//! the lines are concatenated as-is (each already ends with its terminator),
//! and the Adler-32 of the UTF-8 bytes is rendered as the decimal form of a
//! signed 32-bit integer with any leading minus sign removed. Existing tags
//! in the wild depend on this exact output.

/// Largest prime below 2^16.
const MOD_ADLER: u32 = 65_521;

/// Bytes that can be summed before `b` risks overflowing a `u32`.
const NMAX: usize = 5_552;

/// Adler-32 over a byte slice, starting from the standard seed of 1.
fn adler32(bytes: &[u8]) -> u32 {
    let mut a: u32 = 1;
    let mut b: u32 = 0;

    for chunk in bytes.chunks(NMAX) {
        for &byte in chunk {
            a = a.wrapping_add(u32::from(byte));
            b = b.wrapping_add(a);
        }
        a %= MOD_ADLER;
        b %= MOD_ADLER;
    }

    return (b << 16_u32) | a;
}

/// Compute the checksum of a block's lines.
///
/// Every line is expected to carry its own terminator; nothing is inserted
/// between lines.
pub fn checksum<S: AsRef<str>>(lines: &[S]) -> String {
    let mut content = String::from("\n");
    for line in lines {
        content.push_str(line.as_ref());
    }

    let signed = i32::from_ne_bytes(adler32(content.as_bytes()).to_ne_bytes());
    return signed.unsigned_abs().to_string();
}
