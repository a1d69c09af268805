//! CRC-32 and Adler-32 accumulators
//!
//! CRC-32 is the ISO 3309 checksum used by ZIP member records, polynomial
//! 0xEDB88320, table driven, initial value 0 and final complement.  Adler-32
//! is the RFC 1950 trailer checksum, two accumulators mod 65521 with the
//! modulo batched every 5552 bytes to stay inside u32.
//!
//! The stream decorators at the bottom let a pipeline checksum its bytes
//! while they move, so compress and extract stay single-pass.

use std::io::{Read,Write,Seek,SeekFrom,Error};

const CRC_POLY: u32 = 0xedb88320;

const fn build_crc_table() -> [u32;256] {
    let mut table = [0u32;256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = match c & 1 {
                1 => CRC_POLY ^ (c >> 1),
                _ => c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

const CRC_TABLE: [u32;256] = build_crc_table();

/// largest count of bytes Adler-32 can take before the accumulators must be reduced
const ADLER_BATCH: usize = 5552;
const ADLER_MOD: u32 = 65521;

/// Running CRC-32 digest
#[derive(Clone)]
pub struct Crc32 {
    val: u32
}

impl Crc32 {
    pub fn new() -> Self {
        Self { val: 0 }
    }
    pub fn update(&mut self,data: &[u8]) {
        let mut c = self.val ^ 0xffffffff;
        for b in data {
            c = CRC_TABLE[((c ^ *b as u32) & 0xff) as usize] ^ (c >> 8);
        }
        self.val = c ^ 0xffffffff;
    }
    pub fn digest(&self) -> u32 {
        self.val
    }
    pub fn reset(&mut self) {
        self.val = 0;
    }
}

/// Running Adler-32 digest
#[derive(Clone)]
pub struct Adler32 {
    lo: u32,
    hi: u32
}

impl Adler32 {
    pub fn new() -> Self {
        Self { lo: 1, hi: 0 }
    }
    pub fn update(&mut self,data: &[u8]) {
        for chunk in data.chunks(ADLER_BATCH) {
            for b in chunk {
                self.lo += *b as u32;
                self.hi += self.lo;
            }
            self.lo %= ADLER_MOD;
            self.hi %= ADLER_MOD;
        }
    }
    pub fn digest(&self) -> u32 {
        (self.hi << 16) | self.lo
    }
    pub fn reset(&mut self) {
        self.lo = 1;
        self.hi = 0;
    }
}

/// Source decorator keeping a CRC-32 of everything read through it.
/// Seeking back to the position held at creation resets the digest,
/// which is what the encoder's rewind-to-stored path does.
pub struct CrcReader<'a,R: Read + Seek> {
    inner: &'a mut R,
    start: u64,
    crc: Crc32
}

impl <'a,R: Read + Seek> CrcReader<'a,R> {
    pub fn new(inner: &'a mut R) -> Result<Self,Error> {
        let start = inner.stream_position()?;
        Ok(Self { inner, start, crc: Crc32::new() })
    }
    pub fn digest(&self) -> u32 {
        self.crc.digest()
    }
}

impl <'a,R: Read + Seek> Read for CrcReader<'a,R> {
    fn read(&mut self,buf: &mut [u8]) -> Result<usize,Error> {
        let n = self.inner.read(buf)?;
        self.crc.update(&buf[0..n]);
        Ok(n)
    }
}

impl <'a,R: Read + Seek> Seek for CrcReader<'a,R> {
    fn seek(&mut self,pos: SeekFrom) -> Result<u64,Error> {
        let ans = self.inner.seek(pos)?;
        if ans == self.start {
            self.crc.reset();
        }
        Ok(ans)
    }
}

/// Source decorator keeping an Adler-32, same rewind rule as `CrcReader`
pub struct AdlerReader<'a,R: Read + Seek> {
    inner: &'a mut R,
    start: u64,
    adler: Adler32
}

impl <'a,R: Read + Seek> AdlerReader<'a,R> {
    pub fn new(inner: &'a mut R) -> Result<Self,Error> {
        let start = inner.stream_position()?;
        Ok(Self { inner, start, adler: Adler32::new() })
    }
    pub fn digest(&self) -> u32 {
        self.adler.digest()
    }
}

impl <'a,R: Read + Seek> Read for AdlerReader<'a,R> {
    fn read(&mut self,buf: &mut [u8]) -> Result<usize,Error> {
        let n = self.inner.read(buf)?;
        self.adler.update(&buf[0..n]);
        Ok(n)
    }
}

impl <'a,R: Read + Seek> Seek for AdlerReader<'a,R> {
    fn seek(&mut self,pos: SeekFrom) -> Result<u64,Error> {
        let ans = self.inner.seek(pos)?;
        if ans == self.start {
            self.adler.reset();
        }
        Ok(ans)
    }
}

/// Sink decorator keeping a CRC-32 of everything written through it
pub struct CrcWriter<'a,W: Write + Seek> {
    inner: &'a mut W,
    crc: Crc32
}

impl <'a,W: Write + Seek> CrcWriter<'a,W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self { inner, crc: Crc32::new() }
    }
    pub fn digest(&self) -> u32 {
        self.crc.digest()
    }
}

impl <'a,W: Write + Seek> Write for CrcWriter<'a,W> {
    fn write(&mut self,buf: &[u8]) -> Result<usize,Error> {
        let n = self.inner.write(buf)?;
        self.crc.update(&buf[0..n]);
        Ok(n)
    }
    fn flush(&mut self) -> Result<(),Error> {
        self.inner.flush()
    }
}

impl <'a,W: Write + Seek> Seek for CrcWriter<'a,W> {
    fn seek(&mut self,pos: SeekFrom) -> Result<u64,Error> {
        self.inner.seek(pos)
    }
}

/// Sink decorator keeping an Adler-32 of everything written through it
pub struct AdlerWriter<'a,W: Write + Seek> {
    inner: &'a mut W,
    adler: Adler32
}

impl <'a,W: Write + Seek> AdlerWriter<'a,W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self { inner, adler: Adler32::new() }
    }
    pub fn digest(&self) -> u32 {
        self.adler.digest()
    }
}

impl <'a,W: Write + Seek> Write for AdlerWriter<'a,W> {
    fn write(&mut self,buf: &[u8]) -> Result<usize,Error> {
        let n = self.inner.write(buf)?;
        self.adler.update(&buf[0..n]);
        Ok(n)
    }
    fn flush(&mut self) -> Result<(),Error> {
        self.inner.flush()
    }
}

impl <'a,W: Write + Seek> Seek for AdlerWriter<'a,W> {
    fn seek(&mut self,pos: SeekFrom) -> Result<u64,Error> {
        self.inner.seek(pos)
    }
}

// *************** TESTS *****************

#[test]
fn crc_vectors() {
    let mut crc = Crc32::new();
    crc.update("123456789".as_bytes());
    assert_eq!(crc.digest(),0xcbf43926);
    let mut crc = Crc32::new();
    crc.update("The quick brown fox jumps over the lazy dog".as_bytes());
    assert_eq!(crc.digest(),0x414fa339);
}

#[test]
fn crc_incremental() {
    let mut whole = Crc32::new();
    whole.update("123456789".as_bytes());
    let mut parts = Crc32::new();
    parts.update("1234".as_bytes());
    parts.update("56789".as_bytes());
    assert_eq!(whole.digest(),parts.digest());
}

#[test]
fn adler_vectors() {
    let mut adler = Adler32::new();
    adler.update("Wikipedia".as_bytes());
    assert_eq!(adler.digest(),0x11e60398);
    // empty input is the seed itself
    assert_eq!(Adler32::new().digest(),1);
}

#[test]
fn adler_long_input() {
    // long runs exercise the batched modulo
    let data = vec![0xffu8;100000];
    let mut adler = Adler32::new();
    adler.update(&data);
    let mut lo: u64 = 1;
    let mut hi: u64 = 0;
    for _ in 0..100000 {
        lo = (lo + 0xff) % 65521;
        hi = (hi + lo) % 65521;
    }
    assert_eq!(adler.digest(),((hi as u32) << 16) | lo as u32);
}

#[test]
fn reader_decorator_rewinds() {
    let data = "some member bytes".as_bytes().to_vec();
    let mut src = std::io::Cursor::new(data);
    let mut crc_src = CrcReader::new(&mut src).unwrap();
    let mut sink: Vec<u8> = Vec::new();
    std::io::copy(&mut crc_src,&mut sink).unwrap();
    let first = crc_src.digest();
    crc_src.seek(SeekFrom::Start(0)).unwrap();
    let mut sink2: Vec<u8> = Vec::new();
    std::io::copy(&mut crc_src,&mut sink2).unwrap();
    assert_eq!(first,crc_src.digest());
}
