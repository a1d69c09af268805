//! DEFLATE Compression
//!
//! This is the encoder half of RFC 1951.  Matches against the last 32 KiB
//! of input are found with a hash-chained index over a 1 MiB scrolling
//! buffer, so chain links stay valid across buffer refills.  Symbols
//! accumulate in a block buffer; when a block closes, it is emitted in
//! whichever of the three shapes (stored, static trees, dynamic trees)
//! costs the fewest bits.
//!
//! The compression functions are generics that operate on trait objects
//! with bounds `Read + Seek` or `Write + Seek`.  There are convenience
//! functions for working directly with buffers.

use std::io::{Cursor,Read,Write,Seek,SeekFrom};
use crate::DYNERR;
use crate::tools::bits::BitWriter;
use crate::tools::huffman;
use crate::tools::huffman::CodeTree;

/// how far back a match may reach
const WIN_SIZE: usize = 32768;
const WIN_MASK: u64 = 0x7fff;
const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 258;
const HASH_SIZE: usize = 65536;
/// symbol count that closes a block
const BLOCK_ENTRIES: usize = 16384;
/// size of the scrolling input buffer
const BUF_SIZE: usize = 1024*1024;
/// a length-3 match farther back than this costs more bits than its literals
const TOO_FAR: u64 = 4096;
/// largest stored block body
const MAX_STORED: usize = 65535;
/// close a block before its bytes could scroll out of the input buffer,
/// they must stay resident in case the block is emitted stored
const MAX_BLOCK_SPAN: u64 = (BUF_SIZE - WIN_SIZE - 2*MAX_MATCH) as u64;

/// Options controlling compression
#[derive(Clone)]
pub struct Options {
    /// compression level 0-9, 0 stores, 1-3 trade ratio for speed, 4-9 evaluate lazy matches
    pub level: usize,
    /// starting position in the input file
    pub in_offset: u64,
    /// starting position in the output file
    pub out_offset: u64
}

pub const STD_OPTIONS: Options = Options {
    level: 6,
    in_offset: 0,
    out_offset: 0
};

/// per-level match finder limits
struct Tuning {
    /// once a match this long is in hand, search a quarter as many chain links
    good_len: usize,
    /// do not index the interior of matches longer than this
    max_lazy: usize,
    /// stop the chain walk outright at this match length
    nice_len: usize,
    /// most chain links followed per position
    max_chain: usize
}

const TUNING: [Tuning;10] = [
    Tuning { good_len: 0, max_lazy: 0, nice_len: 0, max_chain: 0 },
    Tuning { good_len: 4, max_lazy: 4, nice_len: 8, max_chain: 4 },
    Tuning { good_len: 4, max_lazy: 5, nice_len: 16, max_chain: 8 },
    Tuning { good_len: 4, max_lazy: 6, nice_len: 32, max_chain: 32 },
    Tuning { good_len: 4, max_lazy: 4, nice_len: 16, max_chain: 16 },
    Tuning { good_len: 8, max_lazy: 16, nice_len: 32, max_chain: 32 },
    Tuning { good_len: 8, max_lazy: 16, nice_len: 128, max_chain: 128 },
    Tuning { good_len: 8, max_lazy: 32, nice_len: 128, max_chain: 256 },
    Tuning { good_len: 32, max_lazy: 128, nice_len: 258, max_chain: 1024 },
    Tuning { good_len: 32, max_lazy: 258, nice_len: 258, max_chain: 4096 }
];

/// spread the third byte across all 16 hash bits, a plain shift-xor
/// collides badly on text
const fn build_scatter() -> [u16;256] {
    let mut table = [0u16;256];
    let mut i = 0;
    while i < 256 {
        table[i] = ((i as u32 * 0x9e37) & 0xffff) as u16;
        i += 1;
    }
    table
}

const SCATTER: [u16;256] = build_scatter();

/// one entry of the block buffer
enum Token {
    Literal(u8),
    Match {
        distance: u16,
        length: u16
    }
}

/// The input stream viewed through a scrolling buffer.  Positions are
/// absolute file positions, so hash chain links survive refills.  After
/// any refill at least the window preceding the read pointer, and the
/// open block behind it, remain in the buffer.
struct InputWindow<'a,R: Read + Seek> {
    src: &'a mut R,
    buf: Vec<u8>,
    /// absolute position of buf[0]
    base: u64,
    eof: bool
}

impl <'a,R: Read + Seek> InputWindow<'a,R> {
    fn new(src: &'a mut R,base: u64) -> Self {
        Self {
            src,
            buf: Vec::new(),
            base,
            eof: false
        }
    }
    fn byte(&self,abs: u64) -> u8 {
        self.buf[(abs - self.base) as usize]
    }
    fn slice(&self,from: u64,to: u64) -> &[u8] {
        &self.buf[(from - self.base) as usize..(to - self.base) as usize]
    }
    /// bytes in the buffer at and beyond `pos`
    fn avail(&self,pos: u64) -> usize {
        (self.base + self.buf.len() as u64 - pos) as usize
    }
    /// top up the buffer so the match scanner has lookahead, dropping
    /// nothing newer than `keep_from`
    fn refill(&mut self,pos: u64,keep_from: u64) -> Result<(),std::io::Error> {
        if self.eof || self.avail(pos) >= MAX_MATCH + MIN_MATCH {
            return Ok(());
        }
        let keep = u64::max(keep_from,self.base);
        let drop = (keep - self.base) as usize;
        if drop > 0 {
            self.buf.drain(0..drop);
            self.base = keep;
        }
        let mut filled = self.buf.len();
        self.buf.resize(BUF_SIZE,0);
        while filled < BUF_SIZE {
            match self.src.read(&mut self.buf[filled..])? {
                0 => {
                    self.eof = true;
                    break;
                },
                n => filled += n
            }
        }
        self.buf.truncate(filled);
        Ok(())
    }
}

/// Match finder and block buffer.  `head` maps a 16-bit hash of three
/// bytes to the most recent position with that hash, `prev` extends each
/// bucket into a chain bounded by the window.
struct Coder {
    head: Vec<i64>,
    prev: Vec<i64>,
    tokens: Vec<Token>,
    lit_tree: CodeTree,
    dist_tree: CodeTree,
    bl_tree: CodeTree,
    static_lit: CodeTree,
    static_dist: CodeTree,
    /// extra bits the buffered matches will need, tracked as they are pushed
    extra_bits: u64,
    /// absolute position where the open block began
    block_start: u64,
    /// absolute position one past the bytes covered by buffered tokens
    emitted_pos: u64
}

impl Coder {
    fn new(start: u64) -> Result<Self,DYNERR> {
        Ok(Self {
            head: vec![-1;HASH_SIZE],
            prev: vec![-1;WIN_SIZE],
            tokens: Vec::with_capacity(BLOCK_ENTRIES),
            lit_tree: CodeTree::new(286,15),
            dist_tree: CodeTree::new(30,15),
            bl_tree: CodeTree::new(19,7),
            static_lit: CodeTree::from_lengths(&huffman::STATIC_LIT_LENGTHS)?,
            static_dist: CodeTree::from_lengths(&huffman::STATIC_DIST_LENGTHS)?,
            extra_bits: 0,
            block_start: start,
            emitted_pos: start
        })
    }
    fn hash<R: Read + Seek>(window: &InputWindow<R>,pos: u64) -> usize {
        let lo = window.byte(pos) as u16;
        let hi = window.byte(pos + 1) as u16;
        ((lo | (hi << 8)) ^ SCATTER[window.byte(pos + 2) as usize]) as usize
    }
    fn insert(&mut self,h: usize,pos: u64) {
        self.prev[(pos & WIN_MASK) as usize] = self.head[h];
        self.head[h] = pos as i64;
    }
    /// Walk the chain that was headed by `head` looking for the longest
    /// match at `pos` that beats `floor`.  Candidates are verified by
    /// content, so a stale chain link can waste time but not corrupt.
    fn find_match<R: Read + Seek>(&self,window: &InputWindow<R>,pos: u64,floor: usize,
        tune: &Tuning,head: i64) -> Option<(usize,usize)> {
        let max_len = usize::min(MAX_MATCH,window.avail(pos));
        if max_len < MIN_MATCH {
            return None;
        }
        let nice = usize::min(tune.nice_len,max_len);
        let limit = pos.saturating_sub(WIN_SIZE as u64);
        let mut chain = match floor >= tune.good_len {
            true => tune.max_chain / 4,
            false => tune.max_chain
        };
        let mut best_len = floor;
        let mut best_pos: Option<u64> = None;
        let mut cand = head;
        while cand >= 0 && cand as u64 >= limit && chain > 0 {
            let cpos = cand as u64;
            if cpos >= pos || best_len >= max_len {
                break;
            }
            // cheap reject on the byte that would extend the current best
            if window.byte(cpos + best_len as u64) == window.byte(pos + best_len as u64) {
                let mut len = 0;
                while len < max_len && window.byte(cpos + len as u64) == window.byte(pos + len as u64) {
                    len += 1;
                }
                let dist = pos - cpos;
                if len > best_len && !(len == MIN_MATCH && dist > TOO_FAR) {
                    best_len = len;
                    best_pos = Some(cpos);
                    if len >= nice {
                        break;
                    }
                }
            }
            cand = self.prev[(cpos & WIN_MASK) as usize];
            chain -= 1;
        }
        best_pos.map(|p| (best_len,(pos - p) as usize))
    }
    fn push_literal(&mut self,byte: u8) {
        self.tokens.push(Token::Literal(byte));
        self.lit_tree.tally(byte as usize);
        self.emitted_pos += 1;
    }
    fn push_match(&mut self,distance: usize,length: usize) {
        log::trace!("match at {} back {} len {}",self.emitted_pos,distance,length);
        self.tokens.push(Token::Match { distance: distance as u16, length: length as u16 });
        let (lsym,lbits,_) = huffman::length_symbol(length as u16);
        let (dsym,dbits,_) = huffman::distance_symbol(distance as u16);
        self.lit_tree.tally(lsym as usize);
        self.dist_tree.tally(dsym as usize);
        self.extra_bits += (lbits + dbits) as u64;
        self.emitted_pos += length as u64;
    }
    fn block_full(&self) -> bool {
        self.tokens.len() >= BLOCK_ENTRIES || self.emitted_pos - self.block_start >= MAX_BLOCK_SPAN
    }
}

/// which shape the open block should be emitted in, with its cost
struct BlockPlan {
    bits: u64,
    kind: BlockKind
}

enum BlockKind {
    Stored,
    Static,
    Dynamic {
        hlit: usize,
        hdist: usize,
        hclen: usize,
        ops: Vec<huffman::RleOp>
    }
}

/// build the dynamic trees for the open block and size all three shapes,
/// the cheapest wins, static beats dynamic on a tie, stored must win by
/// a strict margin
fn plan_block(coder: &mut Coder) -> Result<BlockPlan,DYNERR> {
    coder.lit_tree.tally(huffman::END_OF_BLOCK as usize);
    coder.lit_tree.build()?;
    coder.dist_tree.build()?;
    let mut body: u64 = coder.extra_bits;
    let mut static_body: u64 = coder.extra_bits;
    for sym in 0..286 {
        body += coder.lit_tree.freq[sym] as u64 * coder.lit_tree.lengths[sym] as u64;
        static_body += coder.lit_tree.freq[sym] as u64 * huffman::STATIC_LIT_LENGTHS[sym] as u64;
    }
    for sym in 0..30 {
        body += coder.dist_tree.freq[sym] as u64 * coder.dist_tree.lengths[sym] as u64;
        static_body += coder.dist_tree.freq[sym] as u64 * 5;
    }
    // dynamic header: counts, the code-length code lengths, then the
    // run-length encoded literal and distance lengths
    let hlit = coder.lit_tree.coded_span(257);
    let hdist = coder.dist_tree.coded_span(1);
    let all_lengths = [
        &coder.lit_tree.lengths[0..hlit],
        &coder.dist_tree.lengths[0..hdist]
    ].concat();
    let ops = huffman::rle_code_lengths(&all_lengths);
    coder.bl_tree.reset();
    let mut op_extra: u64 = 0;
    for op in &ops {
        coder.bl_tree.tally(op.sym as usize);
        op_extra += op.extra_bits as u64;
    }
    coder.bl_tree.build()?;
    let mut hclen = 19;
    while hclen > 4 && coder.bl_tree.lengths[huffman::CODELEN_ORDER[hclen - 1]] == 0 {
        hclen -= 1;
    }
    let mut header: u64 = 5 + 5 + 4 + 3*hclen as u64 + op_extra;
    for op in &ops {
        header += coder.bl_tree.lengths[op.sym as usize] as u64;
    }
    let dynamic_bits = 3 + header + body;
    let static_bits = 3 + static_body;
    let (kind,bits) = match static_bits <= dynamic_bits {
        true => (BlockKind::Static,static_bits),
        false => (BlockKind::Dynamic { hlit, hdist, hclen, ops },dynamic_bits)
    };
    let stored_len = coder.emitted_pos - coder.block_start;
    let chunks = u64::max(1,(stored_len + MAX_STORED as u64 - 1) / MAX_STORED as u64);
    let stored_bytes = stored_len + 5*chunks;
    match stored_bytes < (bits + 7) / 8 {
        true => Ok(BlockPlan { bits: 8*stored_bytes, kind: BlockKind::Stored }),
        false => Ok(BlockPlan { bits, kind })
    }
}

fn emit_tokens<W: Write>(coder: &Coder,writer: &mut BitWriter<W>,
    lit: &CodeTree,dist: &CodeTree) -> Result<(),std::io::Error> {
    for token in &coder.tokens {
        match token {
            Token::Literal(b) => lit.write_code(writer,*b as u16)?,
            Token::Match { distance, length } => {
                let (lsym,lbits,lextra) = huffman::length_symbol(*length);
                lit.write_code(writer,lsym)?;
                if lbits > 0 {
                    writer.write_bits(lextra as u32,lbits as u32)?;
                }
                let (dsym,dbits,dextra) = huffman::distance_symbol(*distance);
                dist.write_code(writer,dsym)?;
                if dbits > 0 {
                    writer.write_bits(dextra as u32,dbits as u32)?;
                }
            }
        }
    }
    lit.write_code(writer,huffman::END_OF_BLOCK)
}

/// emit the open block in its planned shape and reset for the next one
fn emit_block<R,W>(coder: &mut Coder,window: &InputWindow<R>,writer: &mut BitWriter<W>,
    plan: BlockPlan,last: bool) -> Result<(),DYNERR>
where R: Read + Seek, W: Write {
    let final_bit = match last {
        true => 1,
        false => 0
    };
    match plan.kind {
        BlockKind::Stored => {
            log::debug!("stored block of {} bytes",coder.emitted_pos - coder.block_start);
            let mut from = coder.block_start;
            loop {
                let take = u64::min(MAX_STORED as u64,coder.emitted_pos - from);
                let done = from + take == coder.emitted_pos;
                writer.write_bits(final_bit & done as u32,1)?;
                writer.write_bits(0,2)?;
                writer.align_to_byte()?;
                writer.write_u16(take as u16)?;
                writer.write_u16(!(take as u16))?;
                writer.write_bytes(window.slice(from,from + take))?;
                from += take;
                if done {
                    break;
                }
            }
        },
        BlockKind::Static => {
            log::debug!("static block, {} symbols",coder.tokens.len());
            writer.write_bits(final_bit,1)?;
            writer.write_bits(1,2)?;
            emit_tokens(coder,writer,&coder.static_lit,&coder.static_dist)?;
        },
        BlockKind::Dynamic { hlit, hdist, hclen, ops } => {
            log::debug!("dynamic block, {} symbols",coder.tokens.len());
            writer.write_bits(final_bit,1)?;
            writer.write_bits(2,2)?;
            writer.write_bits(hlit as u32 - 257,5)?;
            writer.write_bits(hdist as u32 - 1,5)?;
            writer.write_bits(hclen as u32 - 4,4)?;
            for i in 0..hclen {
                writer.write_bits(coder.bl_tree.lengths[huffman::CODELEN_ORDER[i]] as u32,3)?;
            }
            for op in &ops {
                coder.bl_tree.write_code(writer,op.sym as u16)?;
                if op.extra_bits > 0 {
                    writer.write_bits(op.extra as u32,op.extra_bits as u32)?;
                }
            }
            emit_tokens(coder,writer,&coder.lit_tree,&coder.dist_tree)?;
        }
    }
    coder.tokens.clear();
    coder.lit_tree.reset();
    coder.dist_tree.reset();
    coder.extra_bits = 0;
    coder.block_start = coder.emitted_pos;
    Ok(())
}

/// stream the whole input as stored blocks, used for level 0, tiny
/// inputs, and the fallback when compression expanded the data
fn write_stored_stream<R,W>(src: &mut R,sink: &mut W,in_size: u64) -> Result<u64,DYNERR>
where R: Read, W: Write + Seek {
    let mut writer = BitWriter::new(sink);
    if in_size == 0 {
        writer.write_bits(1,1)?;
        writer.write_bits(0,2)?;
        writer.align_to_byte()?;
        writer.write_u16(0)?;
        writer.write_u16(0xffff)?;
        writer.flush()?;
        return Ok(writer.bytes_written());
    }
    let mut buf = vec![0u8;MAX_STORED];
    let mut remaining = in_size;
    while remaining > 0 {
        let take = u64::min(MAX_STORED as u64,remaining) as usize;
        src.read_exact(&mut buf[0..take])?;
        remaining -= take as u64;
        writer.write_bits((remaining == 0) as u32,1)?;
        writer.write_bits(0,2)?;
        writer.align_to_byte()?;
        writer.write_u16(take as u16)?;
        writer.write_u16(!(take as u16))?;
        writer.write_bytes(&buf[0..take])?;
    }
    writer.flush()?;
    Ok(writer.bytes_written())
}

enum Outcome {
    Done(u64),
    Expanded
}

/// run the match finder over the whole input, emitting blocks as the
/// buffer fills; reports `Expanded` without flushing the last block if
/// the stream came out bigger than the input
fn try_compress<R,W>(expanded_in: &mut R,compressed_out: &mut W,opt: &Options,in_size: u64)
    -> Result<Outcome,DYNERR>
where R: Read + Seek, W: Write + Seek {
    let tune = &TUNING[opt.level];
    let lazy = opt.level >= 4;
    let mut writer = BitWriter::new(compressed_out);
    let mut window = InputWindow::new(expanded_in,opt.in_offset);
    let mut coder = Coder::new(opt.in_offset)?;
    let end = opt.in_offset + in_size;
    let mut pos = opt.in_offset;
    let mut have_prev = false;
    let mut prev_len: usize = 0;
    let mut prev_dist: usize = 0;
    while pos < end {
        let keep_from = u64::min(coder.block_start,pos.saturating_sub(WIN_SIZE as u64));
        window.refill(pos,keep_from)?;
        let avail = window.avail(pos);
        let found = match avail >= MIN_MATCH {
            true => {
                let h = Coder::hash(&window,pos);
                let head = coder.head[h];
                coder.insert(h,pos);
                let floor = match have_prev {
                    true => prev_len,
                    false => MIN_MATCH - 1
                };
                coder.find_match(&window,pos,floor,tune,head)
            },
            false => None
        };
        if lazy {
            if have_prev {
                match found {
                    Some((len,dist)) => {
                        // the deferred match lost to a longer one here
                        coder.push_literal(window.byte(pos - 1));
                        prev_len = len;
                        prev_dist = dist;
                        pos += 1;
                    },
                    None => {
                        coder.push_match(prev_dist,prev_len);
                        let match_end = pos - 1 + prev_len as u64;
                        if prev_len <= tune.max_lazy {
                            let mut p = pos + 1;
                            while p < match_end && window.avail(p) >= MIN_MATCH {
                                let h = Coder::hash(&window,p);
                                coder.insert(h,p);
                                p += 1;
                            }
                        }
                        pos = match_end;
                        have_prev = false;
                    }
                }
            } else {
                match found {
                    Some((len,dist)) => {
                        prev_len = len;
                        prev_dist = dist;
                        have_prev = true;
                        pos += 1;
                    },
                    None => {
                        coder.push_literal(window.byte(pos));
                        pos += 1;
                    }
                }
            }
        } else {
            match found {
                Some((len,dist)) => {
                    coder.push_match(dist,len);
                    if len <= tune.max_lazy {
                        let mut p = pos + 1;
                        while p < pos + len as u64 && window.avail(p) >= MIN_MATCH {
                            let h = Coder::hash(&window,p);
                            coder.insert(h,p);
                            p += 1;
                        }
                    }
                    pos += len as u64;
                },
                None => {
                    coder.push_literal(window.byte(pos));
                    pos += 1;
                }
            }
        }
        if coder.block_full() && !have_prev {
            let plan = plan_block(&mut coder)?;
            emit_block(&mut coder,&window,&mut writer,plan,false)?;
        }
    }
    if have_prev {
        // one byte was still deferred when input ran out
        coder.push_literal(window.byte(pos - 1));
    }
    let plan = plan_block(&mut coder)?;
    let total_bits = 8*writer.bytes_written() + writer.pending_bits() as u64 + plan.bits;
    if (total_bits + 7) / 8 > in_size {
        log::debug!("compressed stream would expand {} input bytes, rewinding",in_size);
        return Ok(Outcome::Expanded);
    }
    emit_block(&mut coder,&window,&mut writer,plan,true)?;
    writer.flush()?;
    Ok(Outcome::Done(writer.bytes_written()))
}

/// compress and also report whether the output ended up as a plain
/// stored stream, which the archive layer turns into method 0
pub(crate) fn compress_ex<R,W>(expanded_in: &mut R,compressed_out: &mut W,opt: &Options)
    -> Result<(u64,u64,bool),DYNERR>
where R: Read + Seek, W: Write + Seek {
    if opt.level > 9 {
        panic!("compression level {} out of range",opt.level);
    }
    let end = expanded_in.seek(SeekFrom::End(0))?;
    if opt.in_offset > end {
        return Err(Box::new(crate::Error::UnexpectedEof));
    }
    let in_size = end - opt.in_offset;
    if in_size > u32::MAX as u64 {
        return Err(Box::new(crate::Error::FileTooLarge));
    }
    expanded_in.seek(SeekFrom::Start(opt.in_offset))?;
    compressed_out.seek(SeekFrom::Start(opt.out_offset))?;
    if in_size == 0 {
        // a lone static block holding just the end-of-block symbol
        let mut writer = BitWriter::new(compressed_out);
        writer.write_bits(1,1)?;
        writer.write_bits(1,2)?;
        writer.write_bits(0,7)?;
        writer.flush()?;
        return Ok((0,writer.bytes_written(),false));
    }
    if opt.level == 0 || in_size < 8 {
        let out_size = write_stored_stream(expanded_in,compressed_out,in_size)?;
        return Ok((in_size,out_size,true));
    }
    match try_compress(expanded_in,compressed_out,opt,in_size)? {
        Outcome::Done(out_size) => Ok((in_size,out_size,false)),
        Outcome::Expanded => {
            expanded_in.seek(SeekFrom::Start(opt.in_offset))?;
            compressed_out.seek(SeekFrom::Start(opt.out_offset))?;
            let out_size = write_stored_stream(expanded_in,compressed_out,in_size)?;
            Ok((in_size,out_size,true))
        }
    }
}

/// Main compression function.
/// `expanded_in` is an object with `Read` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<&[u8]>`.
/// `compressed_out` is an object with `Write` and `Seek` traits, usually `std::fs::File`, or `std::io::Cursor<Vec<u8>>`.
/// Returns (in_size,out_size) or error.  If the output had to be rewound
/// (incompressible data) the sink holds stale bytes past `out_offset + out_size`,
/// the caller should truncate to that length.  Can panic if options are inconsistent.
pub fn compress<R,W>(expanded_in: &mut R,compressed_out: &mut W,opt: &Options) -> Result<(u64,u64),DYNERR>
where R: Read + Seek, W: Write + Seek {
    let (in_size,out_size,_) = compress_ex(expanded_in,compressed_out,opt)?;
    Ok((in_size,out_size))
}

/// Convenience function, calls `compress` with a slice returning a Vec
pub fn compress_slice(slice: &[u8],opt: &Options) -> Result<Vec<u8>,DYNERR> {
    let mut src = Cursor::new(slice);
    let mut ans: Cursor<Vec<u8>> = Cursor::new(Vec::new());
    let (_in_size,out_size) = compress(&mut src,&mut ans,opt)?;
    let mut v = ans.into_inner();
    v.truncate((opt.out_offset + out_size) as usize);
    Ok(v)
}

// *************** TESTS *****************

#[cfg(test)]
use crate::inflate;

#[cfg(test)]
fn opts(level: usize) -> Options {
    Options { level, in_offset: 0, out_offset: 0 }
}

#[cfg(test)]
fn pseudo_random(count: usize) -> Vec<u8> {
    // xorshift keeps the test deterministic and the data incompressible
    let mut state: u32 = 0x2545f491;
    let mut ans = Vec::with_capacity(count);
    for _i in 0..count {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        ans.push((state & 0xff) as u8);
    }
    ans
}

#[test]
fn empty_input() {
    let compressed = compress_slice(&[],&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("0300").unwrap());
    assert_eq!(inflate::expand_slice(&compressed).expect("expansion failed").len(),0);
}

#[test]
fn single_byte_is_stored() {
    let compressed = compress_slice(&[0x41],&STD_OPTIONS).expect("compression failed");
    assert_eq!(compressed,hex::decode("010100feff41").unwrap());
}

#[test]
fn tiny_inputs_are_stored() {
    let compressed = compress_slice("1234567".as_bytes(),&opts(9)).expect("compression failed");
    assert_eq!(compressed,[hex::decode("010700f8ff").unwrap(),"1234567".as_bytes().to_vec()].concat());
}

#[test]
fn repetitive_input_shrinks() {
    let data = vec![0x41u8;1000];
    let compressed = compress_slice(&data,&STD_OPTIONS).expect("compression failed");
    assert!(compressed.len() < 30,"got {} bytes",compressed.len());
    let expanded = inflate::expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,data);
}

#[test]
fn invertibility_all_levels() {
    let mut data = Vec::new();
    for i in 0..200 {
        data.extend_from_slice("I am Sam. Sam I am. I do not like this Sam I am.\n".as_bytes());
        data.push((i & 0xff) as u8);
    }
    for level in 0..10 {
        let compressed = compress_slice(&data,&opts(level)).expect("compression failed");
        let expanded = inflate::expand_slice(&compressed).expect("expansion failed");
        assert_eq!(expanded,data,"level {}",level);
    }
}

#[test]
fn invertibility_incompressible() {
    let data = pseudo_random(100000);
    for level in [1,6,9] {
        let compressed = compress_slice(&data,&opts(level)).expect("compression failed");
        let expanded = inflate::expand_slice(&compressed).expect("expansion failed");
        assert_eq!(expanded,data,"level {}",level);
    }
}

#[test]
fn stored_fallback_bound() {
    // incompressible input must come out within the stored overhead
    let data = pseudo_random(100000);
    let compressed = compress_slice(&data,&opts(9)).expect("compression failed");
    let bound = data.len() + 5*((data.len() + MAX_STORED - 1)/MAX_STORED) + 6;
    assert!(compressed.len() <= bound,"{} exceeds {}",compressed.len(),bound);
}

#[test]
fn long_match_round_trip() {
    // a run much longer than one match can cover
    let mut data = vec![0x61u8;4000];
    data.extend_from_slice("tail".as_bytes());
    let compressed = compress_slice(&data,&opts(9)).expect("compression failed");
    let expanded = inflate::expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,data);
}

#[test]
fn multi_block_round_trip() {
    // enough mixed data to close several symbol blocks
    let mut data = Vec::new();
    let noise = pseudo_random(64);
    for i in 0..30000 {
        data.extend_from_slice(&noise[(i % 61)..(i % 61) + 3]);
        data.push((i % 251) as u8);
    }
    for level in [1,4,6,9] {
        let compressed = compress_slice(&data,&opts(level)).expect("compression failed");
        let expanded = inflate::expand_slice(&compressed).expect("expansion failed");
        assert_eq!(expanded,data,"level {}",level);
    }
}

#[test]
fn expansion_consumes_whole_stream() {
    // the block headers claim every compressed byte, no more and no less
    let mut data = Vec::new();
    for i in 0..500 {
        data.extend_from_slice("repetition breeds back references ".as_bytes());
        data.push((i % 256) as u8);
    }
    for level in [0,3,6,9] {
        let compressed = compress_slice(&data,&opts(level)).expect("compression failed");
        let mut src = std::io::Cursor::new(&compressed);
        let mut sink: std::io::Cursor<Vec<u8>> = std::io::Cursor::new(Vec::new());
        let (in_size,out_size) = inflate::expand(&mut src,&mut sink).expect("expansion failed");
        assert_eq!(in_size,compressed.len() as u64,"level {}",level);
        assert_eq!(out_size,data.len() as u64,"level {}",level);
    }
}

#[test]
fn window_spanning_matches() {
    // the same phrase recurring past 32K must still round trip
    let mut data = Vec::new();
    let noise = pseudo_random(40000);
    data.extend_from_slice("a distinctive phrase to find again".as_bytes());
    data.extend_from_slice(&noise);
    data.extend_from_slice("a distinctive phrase to find again".as_bytes());
    let compressed = compress_slice(&data,&opts(6)).expect("compression failed");
    let expanded = inflate::expand_slice(&compressed).expect("expansion failed");
    assert_eq!(expanded,data);
}
