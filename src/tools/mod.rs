//! Shared machinery for the DEFLATE pipelines
//!
//! * `bits` packs and unpacks the LSB-first variable-width codes
//! * `huffman` builds canonical code tables for both directions
//! * `checksum` has the CRC-32 and Adler-32 accumulators

pub mod bits;
pub mod huffman;
pub mod checksum;
