//! DNA nucleotide encoding
//!
//! 2-bit codes with lexicographic ranks:
//!
//! - A (65/97)  -> 00
//! - C (67/99)  -> 01
//! - G (71/103) -> 10
//! - T (84/116) -> 11
//!
//! Rank order matters: with A < C < G < T mapped to 0 < 1 < 2 < 3, numeric
//! comparison of packed k-mers equals lexicographic comparison of the base
//! strings, which is what canonicalization relies on.
//!
//! The alphabet is closed over arbitrary input bytes: anything that is not
//! an upper- or lowercase ACGT maps to `A`, the same conversion the 4-letter
//! sequence alphabet applies to ambiguity codes.

/// Encode a single DNA nucleotide to 2 bits, mapping non-ACGT bytes to `A`.
#[inline]
pub const fn encode_base_lossy(base: u8) -> u8 {
    match base {
        b'C' | b'c' => 0b01,
        b'G' | b'g' => 0b10,
        b'T' | b't' => 0b11,
        _ => 0b00,
    }
}

/// Decode a 2-bit value to an uppercase DNA nucleotide.
#[inline]
pub const fn decode_base(bits: u8) -> u8 {
    match bits & 0b11 {
        0b00 => b'A',
        0b01 => b'C',
        0b10 => b'G',
        _ => b'T',
    }
}

/// Complement of an encoded base: A(00) <-> T(11), C(01) <-> G(10).
#[inline]
pub const fn complement_base(bits: u8) -> u8 {
    bits ^ 0b11
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_acgt() {
        assert_eq!(encode_base_lossy(b'A'), 0b00);
        assert_eq!(encode_base_lossy(b'C'), 0b01);
        assert_eq!(encode_base_lossy(b'G'), 0b10);
        assert_eq!(encode_base_lossy(b'T'), 0b11);
        assert_eq!(encode_base_lossy(b'a'), 0b00);
        assert_eq!(encode_base_lossy(b'g'), 0b10);
    }

    #[test]
    fn test_encode_ambiguous_maps_to_a() {
        for b in [b'N', b'n', b'R', b'-', b' ', 0u8] {
            assert_eq!(encode_base_lossy(b), 0b00);
        }
    }

    #[test]
    fn test_rank_order_is_lexicographic() {
        // A < C < G < T must hold on the encoded ranks
        assert!(encode_base_lossy(b'A') < encode_base_lossy(b'C'));
        assert!(encode_base_lossy(b'C') < encode_base_lossy(b'G'));
        assert!(encode_base_lossy(b'G') < encode_base_lossy(b'T'));
    }

    #[test]
    fn test_complement_involution() {
        for bits in 0..4u8 {
            assert_eq!(complement_base(complement_base(bits)), bits);
        }
        assert_eq!(complement_base(encode_base_lossy(b'A')), encode_base_lossy(b'T'));
        assert_eq!(complement_base(encode_base_lossy(b'C')), encode_base_lossy(b'G'));
    }

    #[test]
    fn test_decode_roundtrip() {
        for &b in b"ACGT" {
            assert_eq!(decode_base(encode_base_lossy(b)), b);
        }
    }
}
