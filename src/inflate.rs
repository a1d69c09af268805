//! DEFLATE Expansion
//!
//! This is the decoder half of RFC 1951.  A stream is a sequence of blocks,
//! each stored, compressed with the static trees, or compressed with trees
//! transmitted in the block header.  Decoded bytes pass through a sliding
//! window so back-references can reach the last 32 KiB of output.
//!
//! The expansion functions operate on trait objects with bounds
//! `Read + Seek` or `Write + Seek`; there are convenience functions for
//! working directly with buffers.

use std::io::{Cursor,Read,Write,Seek,ErrorKind};
use crate::DYNERR;
use crate::tools::bits::BitReader;
use crate::tools::huffman;
use crate::tools::huffman::DecodeTable;

/// how far back a match may reach
const WIN_SIZE: usize = 32768;
/// drain the window to the sink once it grows past this
const FLUSH_THRESHOLD: usize = 1024*1024;

fn eof_mapped(e: std::io::Error) -> DYNERR {
    match e.kind() {
        ErrorKind::UnexpectedEof => Box::new(crate::Error::UnexpectedEof),
        _ => Box::new(e)
    }
}

/// Decoder state: the output window and the running count of bytes
/// handed to the sink.
struct Inflater {
    window: Vec<u8>,
    total_out: u64,
    drained: u64
}

impl Inflater {
    fn new() -> Self {
        Self {
            window: Vec::with_capacity(FLUSH_THRESHOLD + 512),
            total_out: 0,
            drained: 0
        }
    }
    fn push<W: Write>(&mut self,byte: u8,writer: &mut W) -> Result<(),DYNERR> {
        self.window.push(byte);
        self.total_out += 1;
        self.spill(writer)
    }
    fn append<W: Write>(&mut self,bytes: &[u8],writer: &mut W) -> Result<(),DYNERR> {
        self.window.extend_from_slice(bytes);
        self.total_out += bytes.len() as u64;
        self.spill(writer)
    }
    /// reproduce `len` bytes starting `dist` back; the source may overlap
    /// the destination, in which case bytes just written are read again
    fn copy_back<W: Write>(&mut self,dist: usize,len: usize,writer: &mut W) -> Result<(),DYNERR> {
        if dist as u64 > self.total_out {
            log::error!("back reference {} exceeds output {}",dist,self.total_out);
            return Err(Box::new(crate::Error::BackRefOutOfRange));
        }
        for _i in 0..len {
            let byte = self.window[self.window.len() - dist];
            self.window.push(byte);
        }
        self.total_out += len as u64;
        self.spill(writer)
    }
    /// drain all but the retained tail once the window is past the
    /// threshold; the tail keeps the last `WIN_SIZE` bytes reachable,
    /// rounded down to a multiple of 8
    fn spill<W: Write>(&mut self,writer: &mut W) -> Result<(),DYNERR> {
        if self.window.len() > FLUSH_THRESHOLD {
            let keep = self.window.len() - (self.window.len() - WIN_SIZE) / 8 * 8;
            let cut = self.window.len() - keep;
            writer.write_all(&self.window[0..cut])?;
            self.drained += cut as u64;
            self.window.drain(0..cut);
        }
        Ok(())
    }
    fn finish<W: Write>(&mut self,writer: &mut W) -> Result<(),DYNERR> {
        writer.write_all(&self.window)?;
        self.drained += self.window.len() as u64;
        self.window.clear();
        Ok(())
    }
}

/// read the transmitted code lengths of a dynamic block and build the
/// literal/length and distance tables
fn dynamic_tables<R: Read>(reader: &mut BitReader<R>) -> Result<(DecodeTable,DecodeTable),DYNERR> {
    let hlit = reader.get_bits(5).map_err(eof_mapped)? as usize + 257;
    let hdist = reader.get_bits(5).map_err(eof_mapped)? as usize + 1;
    let hclen = reader.get_bits(4).map_err(eof_mapped)? as usize + 4;
    log::debug!("dynamic block, {} literal codes, {} distance codes",hlit,hdist);
    let mut cl_lengths = [0u8;19];
    for i in 0..hclen {
        cl_lengths[huffman::CODELEN_ORDER[i]] = reader.get_bits(3).map_err(eof_mapped)? as u8;
    }
    let cl_table = DecodeTable::from_lengths(&cl_lengths)?;
    let mut lengths = vec![0u8;hlit + hdist];
    let mut i = 0;
    while i < lengths.len() {
        let sym = cl_table.decode(reader)?;
        match sym {
            0..=15 => {
                lengths[i] = sym as u8;
                i += 1;
            },
            16 => {
                if i == 0 {
                    return Err(Box::new(crate::Error::MalformedTree));
                }
                let run = reader.get_bits(2).map_err(eof_mapped)? as usize + 3;
                if i + run > lengths.len() {
                    return Err(Box::new(crate::Error::MalformedTree));
                }
                let prev = lengths[i - 1];
                for _j in 0..run {
                    lengths[i] = prev;
                    i += 1;
                }
            },
            17 => {
                let run = reader.get_bits(3).map_err(eof_mapped)? as usize + 3;
                if i + run > lengths.len() {
                    return Err(Box::new(crate::Error::MalformedTree));
                }
                i += run;
            },
            18 => {
                let run = reader.get_bits(7).map_err(eof_mapped)? as usize + 11;
                if i + run > lengths.len() {
                    return Err(Box::new(crate::Error::MalformedTree));
                }
                i += run;
            },
            _ => return Err(Box::new(crate::Error::MalformedTree))
        }
    }
    let lit = DecodeTable::from_lengths(&lengths[0..hlit])?;
    let dist = DecodeTable::from_lengths(&lengths[hlit..])?;
    Ok((lit,dist))
}

/// decode literal/length/distance symbols until the end-of-block symbol
fn expand_compressed_block<R,W>(reader: &mut BitReader<R>,state: &mut Inflater,writer: &mut W,
    lit_table: &DecodeTable,dist_table: &DecodeTable) -> Result<(),DYNERR>
where R: Read, W: Write {
    loop {
        let sym = lit_table.decode(reader)?;
        if sym < 256 {
            state.push(sym as u8,writer)?;
        } else if sym == huffman::END_OF_BLOCK {
            return Ok(());
        } else if sym <= 285 {
            let idx = (sym - huffman::LENGTH_SYM_BASE) as usize;
            let mut len = huffman::BASE_LEN[idx] as usize;
            if huffman::EXTRA_LEN[idx] > 0 {
                len += reader.get_bits(huffman::EXTRA_LEN[idx] as u32).map_err(eof_mapped)? as usize;
            }
            let dsym = dist_table.decode(reader)? as usize;
            if dsym > 29 {
                return Err(Box::new(crate::Error::DecodeTree));
            }
            let mut dist = huffman::BASE_DIST[dsym] as usize;
            if huffman::EXTRA_DIST[dsym] > 0 {
                dist += reader.get_bits(huffman::EXTRA_DIST[dsym] as u32).map_err(eof_mapped)? as usize;
            }
            state.copy_back(dist,len,writer)?;
        } else {
            return Err(Box::new(crate::Error::DecodeTree));
        }
    }
}

/// Expand blocks from the reader until the final block terminates,
/// returning the count of bytes written.  The reader is left byte
/// aligned just past the last block, so trailing data (such as a zlib
/// checksum) can be read from it next.
pub(crate) fn expand_stream<R,W>(reader: &mut BitReader<R>,writer: &mut W) -> Result<u64,DYNERR>
where R: Read, W: Write {
    let mut state = Inflater::new();
    loop {
        let bfinal = reader.get_bits(1).map_err(eof_mapped)?;
        let btype = reader.get_bits(2).map_err(eof_mapped)?;
        match btype {
            0 => {
                reader.align_to_byte();
                let len = reader.get_u16().map_err(eof_mapped)?;
                let nlen = reader.get_u16().map_err(eof_mapped)?;
                if len ^ nlen != 0xffff {
                    return Err(Box::new(crate::Error::StoredLenMismatch));
                }
                log::debug!("stored block of {} bytes",len);
                let mut raw = vec![0u8;len as usize];
                reader.read_bytes(&mut raw).map_err(eof_mapped)?;
                state.append(&raw,writer)?;
            },
            1 => {
                log::debug!("static block");
                let lit_table = DecodeTable::from_lengths(&huffman::STATIC_LIT_LENGTHS)?;
                let dist_table = DecodeTable::from_lengths(&huffman::STATIC_DIST_LENGTHS)?;
                expand_compressed_block(reader,&mut state,writer,&lit_table,&dist_table)?;
            },
            2 => {
                let (lit_table,dist_table) = dynamic_tables(reader)?;
                expand_compressed_block(reader,&mut state,writer,&lit_table,&dist_table)?;
            },
            _ => return Err(Box::new(crate::Error::UnknownBlockType))
        }
        if bfinal == 1 {
            break;
        }
    }
    state.finish(writer)?;
    reader.align_to_byte();
    Ok(state.drained)
}

/// Main expansion function.
/// `compressed_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `expanded_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Expansion starts at the current position of both streams.
/// Returns (in_size,out_size) or error.
pub fn expand<R,W>(compressed_in: &mut R,expanded_out: &mut W) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let mut reader = BitReader::new(compressed_in);
    let out_size = expand_stream(&mut reader,expanded_out)?;
    expanded_out.flush()?;
    Ok((reader.bytes_consumed(),out_size))
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
fn stored_block() {
    let compressed = [
        hex::decode("010500faff").unwrap(),
        "Hello".as_bytes().to_vec()
    ].concat();
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,"Hello".as_bytes());
}

#[test]
fn empty_stored_block() {
    let compressed = hex::decode("010000ffff").unwrap();
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded.len(),0);
}

#[test]
fn stored_length_check() {
    let compressed = hex::decode("010500fbff48656c6c6f").unwrap();
    assert!(expand_slice(&compressed).is_err());
}

#[test]
fn reserved_block_type() {
    // BFINAL=1, BTYPE=3
    let compressed = vec![0x07u8,0x00];
    assert!(expand_slice(&compressed).is_err());
}

#[test]
fn static_block() {
    // "abc" compressed with the static trees
    let compressed = hex::decode("4b4c4a0600").unwrap();
    let expanded = expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,"abc".as_bytes());
}

#[test]
fn overlapping_copy() {
    // literal 'a' followed by a length 5 match at distance 1 must give "aaaaaa"
    use crate::tools::bits::BitWriter;
    use crate::tools::huffman::CodeTree;
    let lit = CodeTree::from_lengths(&huffman::STATIC_LIT_LENGTHS).expect("tree failed");
    let dist = CodeTree::from_lengths(&huffman::STATIC_DIST_LENGTHS).expect("tree failed");
    let mut sink: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut sink);
    writer.write_bits(1,1).unwrap();
    writer.write_bits(1,2).unwrap();
    lit.write_code(&mut writer,0x61).unwrap();
    lit.write_code(&mut writer,259).unwrap(); // length 5, no extra bits
    dist.write_code(&mut writer,0).unwrap();  // distance 1, no extra bits
    lit.write_code(&mut writer,256).unwrap();
    writer.flush().unwrap();
    let expanded = expand_slice(&sink).expect("expansion failed");
    assert_eq!(expanded,"aaaaaa".as_bytes());
}

#[test]
fn back_reference_before_start() {
    use crate::tools::bits::BitWriter;
    use crate::tools::huffman::CodeTree;
    let lit = CodeTree::from_lengths(&huffman::STATIC_LIT_LENGTHS).expect("tree failed");
    let dist = CodeTree::from_lengths(&huffman::STATIC_DIST_LENGTHS).expect("tree failed");
    let mut sink: Vec<u8> = Vec::new();
    let mut writer = BitWriter::new(&mut sink);
    writer.write_bits(1,1).unwrap();
    writer.write_bits(1,2).unwrap();
    lit.write_code(&mut writer,0x61).unwrap();
    lit.write_code(&mut writer,259).unwrap();
    dist.write_code(&mut writer,3).unwrap();  // distance 4, but only 1 byte out
    lit.write_code(&mut writer,256).unwrap();
    writer.flush().unwrap();
    assert!(expand_slice(&sink).is_err());
}

#[test]
fn truncated_stream() {
    let compressed = hex::decode("4b4c").unwrap();
    assert!(expand_slice(&compressed).is_err());
}
