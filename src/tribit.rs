//! The 24-bit transposition applied to every section of a dump.
//!
//! Input is consumed in 3-byte groups, each read as a big-endian 24-bit
//! integer. Output bit `i` (bit 0 being the most significant) is input bit
//! `TRIBIT_MAP[i]`. A trailing group of one or two bytes has no defined
//! decoding and is dropped.

use byteorder::{BigEndian, ByteOrder};

//            111111 11112222
// 01234567 89012345 67890123
// cdefgh56 78abGH12 34ABCDEF  (from)
// abcdefgh 12345678 ABCDEFGH  (to)
pub const TRIBIT_MAP: [u8; 24] = [
    10, 11,  0,  1,  2,  3,  4,  5,
    14, 15, 16, 17,  6,  7,  8,  9,
    18, 19, 20, 21, 22, 23, 12, 13,
];

/// Inverse of `TRIBIT_MAP`.
pub const REVERSE_MAP: [u8; 24] = invert(&TRIBIT_MAP);

const fn invert(map: &[u8; 24]) -> [u8; 24] {
    let mut out = [0u8; 24];
    let mut i = 0;
    while i < 24 {
        out[map[i] as usize] = i as u8;
        i += 1;
    }
    out
}

fn permute(input: &[u8], map: &[u8; 24]) -> Vec<u8> {
    let remainder = input.len() % 3;
    if remainder != 0 {
        warn!("dropping {} trailing byte(s) of a {} byte block", remainder, input.len());
    }

    let mut out = Vec::with_capacity(input.len() - remainder);
    let mut group = [0u8; 3];
    for chunk in input.chunks_exact(3) {
        let bad = BigEndian::read_u24(chunk);
        let good = map.iter().fold(0u32, |acc, &shift| {
            (acc << 1) | ((bad >> (23 - u32::from(shift))) & 1)
        });
        BigEndian::write_u24(&mut group, good);
        out.extend_from_slice(&group);
    }
    out
}

/// Unscrambles a base64-decoded section.
pub fn decode(input: &[u8]) -> Vec<u8> {
    permute(input, &TRIBIT_MAP)
}

/// Scrambles data the way the capture tool does; `decode(&encode(x)) == x`
/// for any input whose length is a multiple of 3.
pub fn encode(input: &[u8]) -> Vec<u8> {
    permute(input, &REVERSE_MAP)
}
