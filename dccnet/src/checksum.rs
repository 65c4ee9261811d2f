//! Internet checksum (RFC 1071).
//!
//! The sum runs over consecutive big-endian 16-bit words.  An odd trailing
//! byte is the high byte of a final word whose low byte is zero.  Carries out
//! of bit 16 are folded back in until none remain, and the one's complement
//! of the folded sum is returned.
//!
//! This module never fails; callers compare the returned value themselves.
//! To validate a sealed block, zero its checksum field, recompute, and compare
//! for equality with the stored value.

/// Compute the Internet checksum over `data`.
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold(word_sum(data))
}

/// Sum `data` as big-endian 16-bit words without folding.
fn word_sum(data: &[u8]) -> u64 {
    let mut words = data.chunks_exact(2);
    let mut sum: u64 = words
        .by_ref()
        .map(|w| u64::from(u16::from_be_bytes([w[0], w[1]])))
        .sum();
    if let [last] = words.remainder() {
        sum += u64::from(*last) << 8;
    }
    sum
}

/// Fold carries into the low 16 bits.
fn fold(mut sum: u64) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}
