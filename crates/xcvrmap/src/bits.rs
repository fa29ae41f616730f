//! Low-level bit manipulation helpers for register bytes.
//!
//! Bits are addressed LSB-first: bit 0 is the least significant bit of the
//! value, which is how transceiver memory maps number them.

/// Builds a mask of `width` set bits starting at `bitpos`.
pub fn mask(bitpos: u32, width: u32) -> u64 {
    if width == 0 {
        return 0;
    }

    let ones = if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    };

    ones.checked_shl(bitpos).unwrap_or(0)
}

/// Extracts `width` bits starting at `bitpos` from `value`, shifted down to bit 0.
pub fn extract(value: u64, bitpos: u32, width: u32) -> u64 {
    (value & mask(bitpos, width))
        .checked_shr(bitpos)
        .unwrap_or(0)
}

/// Clears the `width` bits at `bitpos` in `current`, then ORs `value` into them.
///
/// Bits of `value` above `width` are discarded; every bit outside the range is
/// preserved.
pub fn merge(current: u64, bitpos: u32, width: u32, value: u64) -> u64 {
    merge_masked(
        current,
        mask(bitpos, width),
        value.checked_shl(bitpos).unwrap_or(0),
    )
}

/// Replaces the bits selected by `mask` in `current` with the same bits of `value`.
pub fn merge_masked(current: u64, mask: u64, value: u64) -> u64 {
    (current & !mask) | (value & mask)
}

/// Largest unsigned value representable in `width` bits.
pub fn max_value(width: u32) -> u64 {
    mask(0, width)
}
