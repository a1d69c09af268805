//! zlib Streams
//!
//! The RFC 1950 wrapper around a DEFLATE body: a two byte header carrying
//! the method and compression level, then the body, then the Adler-32 of
//! the expanded data, big endian.  The heavy lifting is done by the
//! `deflate` and `inflate` modules; this module adds the framing and the
//! checksum plumbing.

use std::io::{Cursor,Read,Write,Seek,SeekFrom};
use crate::DYNERR;
use crate::deflate;
use crate::inflate;
use crate::tools::bits::BitReader;
use crate::tools::checksum::{AdlerReader,AdlerWriter};

/// method byte for a DEFLATE body with the full 32 KiB window
const CMF_DEFLATE: u8 = 0x78;
/// method byte for a stored body
const CMF_STORED: u8 = 0x70;

/// the header's level field, two bits
fn level_field(level: usize) -> u8 {
    match level {
        0..=1 => 0,
        2..=5 => 1,
        6 => 2,
        _ => 3
    }
}

/// assemble the header so the 16-bit big endian value is a multiple of 31
fn header(level: usize) -> [u8;2] {
    let cmf = match level {
        0 => CMF_STORED,
        _ => CMF_DEFLATE
    };
    let mut flg = level_field(level) << 6;
    let rem = ((cmf as u16) * 256 + flg as u16) % 31;
    if rem != 0 {
        flg += 31 - rem as u8;
    }
    [cmf,flg]
}

/// Main compression function.
/// `expanded_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.  As with `deflate::compress`, stale
/// bytes can trail the stream if the body was rewound, truncate to out_size.
pub fn compress<R,W>(expanded_in: &mut R,compressed_out: &mut W,opt: &deflate::Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    compressed_out.seek(SeekFrom::Start(opt.out_offset))?;
    compressed_out.write_all(&header(opt.level))?;
    expanded_in.seek(SeekFrom::Start(opt.in_offset))?;
    let mut adler_src = AdlerReader::new(expanded_in)?;
    let body_opt = deflate::Options {
        level: opt.level,
        in_offset: opt.in_offset,
        out_offset: opt.out_offset + 2
    };
    let (in_size,body_size) = match opt.level {
        0 => {
            let end = adler_src.seek(SeekFrom::End(0))?;
            if end - opt.in_offset > u32::MAX as u64 {
                return Err(Box::new(crate::Error::FileTooLarge));
            }
            adler_src.seek(SeekFrom::Start(opt.in_offset))?;
            let copied = std::io::copy(&mut adler_src,compressed_out)?;
            (copied,copied)
        },
        _ => deflate::compress(&mut adler_src,compressed_out,&body_opt)?
    };
    compressed_out.seek(SeekFrom::Start(opt.out_offset + 2 + body_size))?;
    compressed_out.write_all(&adler_src.digest().to_be_bytes())?;
    log::debug!("zlib stream closed, {} in, {} out",in_size,2 + body_size + 4);
    Ok((in_size,2 + body_size + 4))
}

/// Main expansion function.
/// `compressed_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `expanded_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Expansion starts at the current position of both streams.
/// Returns (in_size,out_size) or error.
pub fn expand<R,W>(compressed_in: &mut R,expanded_out: &mut W) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let start = compressed_in.stream_position()?;
    let mut head = [0u8;2];
    compressed_in.read_exact(&mut head)?;
    if ((head[0] as u16) * 256 + head[1] as u16) % 31 != 0 {
        log::error!("zlib header check failed");
        return Err(Box::new(crate::Error::ZlibHeaderInvalid));
    }
    if head[0] != CMF_DEFLATE && head[0] != CMF_STORED {
        log::error!("zlib method byte {:02x} not supported",head[0]);
        return Err(Box::new(crate::Error::ZlibHeaderInvalid));
    }
    let mut adler_out = AdlerWriter::new(expanded_out);
    let mut trailer = [0u8;4];
    let (in_size,out_size) = match head[0] {
        CMF_DEFLATE => {
            let mut reader = BitReader::new(compressed_in);
            let out_size = inflate::expand_stream(&mut reader,&mut adler_out)?;
            reader.read_bytes(&mut trailer)?;
            (2 + reader.bytes_consumed(),out_size)
        },
        _ => {
            let end = compressed_in.seek(SeekFrom::End(0))?;
            if end < start + 6 {
                return Err(Box::new(crate::Error::UnexpectedEof));
            }
            let body = end - start - 6;
            compressed_in.seek(SeekFrom::Start(start + 2))?;
            let mut taker = compressed_in.take(body);
            std::io::copy(&mut taker,&mut adler_out)?;
            let src = taker.into_inner();
            src.read_exact(&mut trailer)?;
            (2 + body + 4,body)
        }
    };
    if u32::from_be_bytes(trailer) != adler_out.digest() {
        log::error!("adler-32 trailer does not match expanded data");
        return Err(Box::new(crate::Error::AdlerMismatch));
    }
    adler_out.flush()?;
    Ok((in_size,out_size))
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8],opt: &deflate::Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    let (_in_size,out_size) = compress(&mut src,&mut ans,opt)?;
    let mut v = ans.into_inner();
    v.truncate((opt.out_offset + out_size) as usize);
    Ok(v)
}

/// Convenience function, calls `expand` with a slice returning a Vec
pub fn expand_slice(slice: &[u8]) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    expand(&mut src,&mut ans)?;
    Ok(ans.into_inner())
}

// *************** TESTS *****************

#[test]
fn header_is_multiple_of_31() {
    for level in 0..10 {
        let h = header(level);
        assert_eq!(((h[0] as u32) * 256 + h[1] as u32) % 31,0,"level {}",level);
    }
    // the default level header is the familiar one
    assert_eq!(header(6),[0x78,0x9c]);
}

#[test]
fn round_trip() {
    let data = "the rain in spain stays mainly in the plain\n".repeat(40);
    let opt = deflate::Options { level: 6, in_offset: 0, out_offset: 0 };
    let compressed = compress_slice(data.as_bytes(),&opt).expect("compression failed");
    assert_eq!(compressed[0],0x78);
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,data.as_bytes());
}

#[test]
fn round_trip_stored() {
    let data = "just a few bytes".as_bytes();
    let opt = deflate::Options { level: 0, in_offset: 0, out_offset: 0 };
    let compressed = compress_slice(data,&opt).expect("compression failed");
    assert_eq!(compressed[0],0x70);
    assert_eq!(compressed.len(),data.len() + 6);
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,data);
}

#[test]
fn known_stream_expands() {
    // zlib-compressed "abc" using the static trees
    let compressed = hex::decode("789c4b4c4a0600024d0127").unwrap();
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,"abc".as_bytes());
}

#[test]
fn bad_header_rejected() {
    // checksum bits spoiled
    let compressed = hex::decode("789d4b4c4a0600024d0127").unwrap();
    assert!(expand_slice(&compressed).is_err());
}

#[test]
fn bad_trailer_rejected() {
    let compressed = hex::decode("789c4b4c4a0600024d0128").unwrap();
    assert!(expand_slice(&compressed).is_err());
}
