//! # Flatezip Library
//!
//! Compress and expand DEFLATE streams, and read or write ZIP archives.
//! * `deflate` is the encoder half of RFC 1951: hash-chained match finding,
//!   lazy evaluation, and per-block Huffman tree selection
//! * `inflate` is the decoder half: bit-granular Huffman decoding and LZ77
//!   back-reference expansion
//! * `zlib` wraps a DEFLATE stream in the RFC 1950 header and Adler-32 trailer
//! * `zip` maintains a PKWARE archive: local headers, central directory,
//!   in-place deletion, and timestamp round-tripping
//!
//! The compression/expansion functions are generics that operate on trait objects
//! with bounds `Read + Seek` or `Write + Seek`.  There are convenience functions
//! for working directly with buffers.
//!
//! ## File Example
//!
//! ```rs
//! use flatezip::*;
//! let mut in_file = std::fs::File::open("some_input_path").expect("open failed");
//! let mut out_file = std::fs::File::create("some_output_path").expect("create failed");
//! let (in_size,out_size) = deflate::compress(&mut in_file,&mut out_file,&deflate::STD_OPTIONS)
//!     .expect("compression failed");
//! eprintln!("compressed {} into {}",in_size,out_size);
//! ```
//!
//! ## Buffer Example
//!
//! ```rs
//! use flatezip::*;
//! let test_data = "This is the chaunt of the priests.  The chaunt of the priests of Mung.".as_bytes();
//! let compressed = deflate::compress_slice(test_data,&deflate::STD_OPTIONS).expect("compression failed");
//! ```

mod tools;
pub mod deflate;
pub mod inflate;
pub mod zlib;
pub mod zip;

type DYNERR = Box<dyn std::error::Error>;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Stream and Archive Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("unknown block type")]
    UnknownBlockType,
    #[error("stored block length check failed")]
    StoredLenMismatch,
    #[error("malformed huffman tree")]
    MalformedTree,
    #[error("huffman code could not be decoded")]
    DecodeTree,
    #[error("invalid zlib header")]
    ZlibHeaderInvalid,
    #[error("adler-32 mismatch")]
    AdlerMismatch,
    #[error("crc-32 mismatch")]
    CrcMismatch,
    #[error("zip signature mismatch")]
    ZipSignatureMismatch,
    #[error("no central directory")]
    NoCentralDirectory,
    #[error("multi-disk archives not supported")]
    MultiDiskUnsupported,
    #[error("empty central directory")]
    EmptyCentralDirectory,
    #[error("back reference out of range")]
    BackRefOutOfRange,
    #[error("file too large")]
    FileTooLarge,
    #[error("duplicate archive entry")]
    DuplicateArchiveEntry,
    #[error("invalid archive path")]
    InvalidArchivePath,
    #[error("unexpected end of input")]
    UnexpectedEof
}
