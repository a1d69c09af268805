//! ZIP Archives
//!
//! Reads and writes the PKWARE archive container: every member has a local
//! header followed by its data, and a central directory at the end of the
//! file describes all members.  Members are compressed with the `deflate`
//! module or stored verbatim, whichever is smaller.  Deleting rewrites
//! nothing until `save`, which compacts the surviving members in place.
//!
//! Member names travel in code page 437 with forward slashes.  Timestamps
//! travel twice: the DOS date/time words, and an NTFS extra field holding
//! 64-bit file times that survive the round trip exactly.

use std::io::{Read,Write,Seek,SeekFrom};
use std::fs::{File,OpenOptions};
use std::path::{Path,PathBuf};
use std::time::{SystemTime,Duration,UNIX_EPOCH};
use num_traits::FromPrimitive;
use crate::{DYNERR,STDRESULT};
use crate::deflate;
use crate::inflate;
use crate::tools::checksum::{CrcReader,CrcWriter};

const LOCAL_SIG: u32 = 0x04034b50;
const CENTRAL_SIG: u32 = 0x02014b50;
const EOCD_SIG: u32 = 0x06054b50;
/// version needed to extract, 2.0 covers deflate and directories
const VERSION: u16 = 20;
/// how far from the end of file the EOCD record is sought
const EOCD_SCAN: u64 = 512;
/// bounce buffer for raw member copies and compaction
const BOUNCE: usize = 65536;
const NTFS_ID: u16 = 0x000a;
const NTFS_TIMES_TAG: u16 = 0x0001;
/// seconds from the NTFS epoch (1601) to the Unix epoch (1970)
const EPOCH_GAP: u64 = 11644473600;
/// FAT attribute bits carried in the external attributes word
const ATTR_DIRECTORY: u32 = 0x10;
const ATTR_ARCHIVE: u32 = 0x20;

/// code page 437 glyphs for bytes 0x80 through 0xff
const CP437_HIGH: [char;128] = [
    'Ç','ü','é','â','ä','à','å','ç','ê','ë','è','ï','î','ì','Ä','Å',
    'É','æ','Æ','ô','ö','ò','û','ù','ÿ','Ö','Ü','¢','£','¥','₧','ƒ',
    'á','í','ó','ú','ñ','Ñ','ª','º','¿','⌐','¬','½','¼','¡','«','»',
    '░','▒','▓','│','┤','╡','╢','╖','╕','╣','║','╗','╝','╜','╛','┐',
    '└','┴','┬','├','─','┼','╞','╟','╚','╔','╩','╦','╠','═','╬','╧',
    '╨','╤','╥','╙','╘','╒','╓','╫','╪','┘','┌','█','▄','▌','▐','▀',
    'α','ß','Γ','π','Σ','σ','µ','τ','Φ','Θ','Ω','δ','∞','φ','ε','∩',
    '≡','±','≥','≤','⌠','⌡','÷','≈','°','∙','·','√','ⁿ','²','■','\u{a0}'
];

/// member compression method carried on the wire
#[derive(num_derive::FromPrimitive,Clone,Copy,PartialEq,Debug)]
pub enum Method {
    Store = 0,
    Deflate = 8
}

fn u16_at(buf: &[u8],off: usize) -> u16 {
    u16::from_le_bytes([buf[off],buf[off+1]])
}

fn u32_at(buf: &[u8],off: usize) -> u32 {
    u32::from_le_bytes([buf[off],buf[off+1],buf[off+2],buf[off+3]])
}

/// encode a wire name as code page 437, unmappable characters become '_'
fn encode_name(name: &str) -> Vec<u8> {
    let mut ans = Vec::with_capacity(name.len());
    for c in name.chars() {
        if c >= ' ' && c <= '~' {
            ans.push(c as u8);
        } else {
            match CP437_HIGH.iter().position(|h| *h == c) {
                Some(idx) => ans.push(0x80 + idx as u8),
                None => {
                    log::warn!("character {:?} has no code page 437 encoding",c);
                    ans.push(b'_');
                }
            }
        }
    }
    ans
}

/// decode a code page 437 wire name
fn decode_name(bytes: &[u8]) -> String {
    let mut ans = String::with_capacity(bytes.len());
    for b in bytes {
        match *b < 0x80 {
            true => ans.push(*b as char),
            false => ans.push(CP437_HIGH[(*b - 0x80) as usize])
        }
    }
    ans
}

/// normalize a member name: host separators become slashes, absolute
/// paths and drive letters are rejected
fn validate_name(name: &str) -> Result<String,DYNERR> {
    let wire = name.replace('\\',"/");
    let bytes = wire.as_bytes();
    if bytes.len() == 0 || bytes[0] == b'/' {
        return Err(Box::new(crate::Error::InvalidArchivePath));
    }
    if bytes.len() >= 2 && bytes[1] == b':' {
        return Err(Box::new(crate::Error::InvalidArchivePath));
    }
    Ok(wire)
}

// days/civil conversions follow the Gregorian calendar arithmetic of
// Howard Hinnant's date algorithms

fn civil_from_days(z: i64) -> (i64,u32,u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe/1460 + doe/36524 - doe/146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365*yoe + yoe/4 - yoe/100);
    let mp = (5*doy + 2)/153;
    let d = (doy - (153*mp + 2)/5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y },m,d)
}

fn days_from_civil(y: i64,m: u32,d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = if m > 2 { m - 3 } else { m + 9 } as i64;
    let doy = (153*mp + 2)/5 + d as i64 - 1;
    let doe = yoe * 365 + yoe/4 - yoe/100 + doy;
    era * 146097 + doe - 719468
}

/// pack a timestamp into the DOS (time,date) words; seconds are kept in
/// two second steps, odd seconds round down
fn dos_datetime(t: SystemTime) -> (u16,u16) {
    let secs = match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => 0
    };
    let (mut y,mut mo,mut d) = civil_from_days(secs.div_euclid(86400));
    let mut tod = secs.rem_euclid(86400);
    if y < 1980 {
        y = 1980;
        mo = 1;
        d = 1;
        tod = 0;
    }
    if y > 2107 {
        y = 2107;
        mo = 12;
        d = 31;
        tod = 86398;
    }
    let time = ((tod/3600) << 11) | ((tod%3600/60) << 5) | (tod%60/2);
    let date = ((y - 1980) << 9) | ((mo as i64) << 5) | d as i64;
    (time as u16,date as u16)
}

/// unpack the DOS (time,date) words
fn system_from_dos(time: u16,date: u16) -> SystemTime {
    let y = 1980 + (date >> 9) as i64;
    let mo = u32::max(1,((date >> 5) & 0xf) as u32);
    let d = u32::max(1,(date & 0x1f) as u32);
    let tod = ((time >> 11) as i64)*3600 + (((time >> 5) & 0x3f) as i64)*60 + ((time & 0x1f) as i64)*2;
    let secs = days_from_civil(y,mo,d)*86400 + tod;
    UNIX_EPOCH + Duration::from_secs(secs as u64)
}

/// Windows file times in 100 ns units since 1601, as carried by the
/// NTFS extra field
#[derive(Clone,Copy,Debug)]
pub struct NtfsTimes {
    pub mtime: u64,
    pub atime: u64,
    pub ctime: u64
}

fn filetime(t: SystemTime) -> u64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() + EPOCH_GAP)*10_000_000 + (d.subsec_nanos()/100) as u64,
        Err(_) => 0
    }
}

fn system_from_filetime(ft: u64) -> SystemTime {
    let unix_ticks = ft.saturating_sub(EPOCH_GAP*10_000_000);
    UNIX_EPOCH + Duration::new(unix_ticks/10_000_000,(unix_ticks%10_000_000) as u32 * 100)
}

impl NtfsTimes {
    fn from_metadata(meta: &std::fs::Metadata) -> Option<Self> {
        let mtime = meta.modified().ok()?;
        let atime = meta.accessed().unwrap_or(mtime);
        let ctime = meta.created().unwrap_or(mtime);
        Some(Self {
            mtime: filetime(mtime),
            atime: filetime(atime),
            ctime: filetime(ctime)
        })
    }
    /// the 36 byte extra field: header id, size, reserved word, then one
    /// attribute tag holding the three file times
    fn to_extra(&self) -> Vec<u8> {
        let mut ans = Vec::with_capacity(36);
        ans.extend_from_slice(&NTFS_ID.to_le_bytes());
        ans.extend_from_slice(&32u16.to_le_bytes());
        ans.extend_from_slice(&0u32.to_le_bytes());
        ans.extend_from_slice(&NTFS_TIMES_TAG.to_le_bytes());
        ans.extend_from_slice(&24u16.to_le_bytes());
        ans.extend_from_slice(&self.mtime.to_le_bytes());
        ans.extend_from_slice(&self.atime.to_le_bytes());
        ans.extend_from_slice(&self.ctime.to_le_bytes());
        ans
    }
    /// scan an extra field for the NTFS times, tolerating other tags
    fn from_extra(extra: &[u8]) -> Option<Self> {
        let mut pos = 0;
        while pos + 4 <= extra.len() {
            let id = u16_at(extra,pos);
            let size = u16_at(extra,pos + 2) as usize;
            if pos + 4 + size > extra.len() {
                return None;
            }
            if id == NTFS_ID && size >= 8 {
                let attrs = &extra[pos + 8..pos + 4 + size];
                let mut apos = 0;
                while apos + 4 <= attrs.len() {
                    let tag = u16_at(attrs,apos);
                    let tsize = u16_at(attrs,apos + 2) as usize;
                    if apos + 4 + tsize > attrs.len() {
                        break;
                    }
                    if tag == NTFS_TIMES_TAG && tsize >= 24 {
                        let t = &attrs[apos + 4..];
                        return Some(Self {
                            mtime: u64::from_le_bytes(t[0..8].try_into().unwrap()),
                            atime: u64::from_le_bytes(t[8..16].try_into().unwrap()),
                            ctime: u64::from_le_bytes(t[16..24].try_into().unwrap())
                        });
                    }
                    apos += 4 + tsize;
                }
            }
            pos += 4 + size;
        }
        None
    }
}

/// One member of the archive, mirroring a central directory entry.
/// Created when a member is added or the directory is parsed; the offset
/// moves during compaction, the checksum and compressed size are filled
/// in after the data is written.
#[derive(Clone,Debug)]
pub struct FileHeader {
    /// wire form name: code page 437 repertoire, forward slashes,
    /// directories end with a slash
    pub name: String,
    pub dos_time: u16,
    pub dos_date: u16,
    /// FAT attribute bits, shown as the external attributes
    pub attributes: u32,
    /// offset of the local header from the start of the archive
    pub file_offset: u64,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub crc32: u32,
    pub method: Method,
    pub bit_flags: u16,
    pub version: u16,
    pub is_path: bool,
    pub ntfs_times: Option<NtfsTimes>
}

impl PartialEq for FileHeader {
    fn eq(&self,other: &Self) -> bool {
        self.is_path == other.is_path && self.name == other.name
    }
}

impl Eq for FileHeader {}

impl Ord for FileHeader {
    /// directory paths sort after flat files, then names lexicographically
    fn cmp(&self,other: &Self) -> std::cmp::Ordering {
        self.is_path.cmp(&other.is_path).then(self.name.cmp(&other.name))
    }
}

impl PartialOrd for FileHeader {
    fn partial_cmp(&self,other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl FileHeader {
    fn new_file(name: String,size: u32,meta: Option<&std::fs::Metadata>) -> Self {
        let ntfs_times = meta.and_then(NtfsTimes::from_metadata);
        let modified = meta.and_then(|m| m.modified().ok()).unwrap_or_else(SystemTime::now);
        let (dos_time,dos_date) = dos_datetime(modified);
        Self {
            name,
            dos_time,
            dos_date,
            attributes: ATTR_ARCHIVE,
            file_offset: 0,
            uncompressed_size: size,
            compressed_size: 0,
            crc32: 0,
            method: Method::Deflate,
            bit_flags: 0,
            version: VERSION,
            is_path: false,
            ntfs_times
        }
    }
    fn new_path(name: String,modified: SystemTime) -> Self {
        let (dos_time,dos_date) = dos_datetime(modified);
        Self {
            name,
            dos_time,
            dos_date,
            attributes: ATTR_DIRECTORY,
            file_offset: 0,
            uncompressed_size: 0,
            compressed_size: 0,
            crc32: 0,
            method: Method::Store,
            bit_flags: 0,
            version: VERSION,
            is_path: true,
            ntfs_times: None
        }
    }
    /// the member's modification time, NTFS precision when available
    pub fn modified(&self) -> SystemTime {
        match &self.ntfs_times {
            Some(t) => system_from_filetime(t.mtime),
            None => system_from_dos(self.dos_time,self.dos_date)
        }
    }
    /// the member name with host separators
    pub fn host_path(&self) -> PathBuf {
        self.name.trim_end_matches('/').split('/').collect()
    }
    /// the modification time as `YYYY-MM-DD HH:MM:SS`
    pub fn modified_string(&self) -> String {
        let secs = match self.modified().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(_) => 0
        };
        let (y,mo,d) = civil_from_days(secs.div_euclid(86400));
        let tod = secs.rem_euclid(86400);
        format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}",y,mo,d,tod/3600,tod%3600/60,tod%60)
    }
    fn extra(&self) -> Vec<u8> {
        match (&self.ntfs_times,self.is_path) {
            (Some(t),false) => t.to_extra(),
            _ => Vec::new()
        }
    }
    fn local_header(&self) -> Vec<u8> {
        let name = encode_name(&self.name);
        let extra = self.extra();
        let mut ans = Vec::with_capacity(30 + name.len() + extra.len());
        ans.extend_from_slice(&LOCAL_SIG.to_le_bytes());
        ans.extend_from_slice(&self.version.to_le_bytes());
        ans.extend_from_slice(&self.bit_flags.to_le_bytes());
        ans.extend_from_slice(&(self.method as u16).to_le_bytes());
        ans.extend_from_slice(&self.dos_time.to_le_bytes());
        ans.extend_from_slice(&self.dos_date.to_le_bytes());
        ans.extend_from_slice(&self.crc32.to_le_bytes());
        ans.extend_from_slice(&self.compressed_size.to_le_bytes());
        ans.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        ans.extend_from_slice(&(name.len() as u16).to_le_bytes());
        ans.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        ans.extend_from_slice(&name);
        ans.extend_from_slice(&extra);
        ans
    }
    fn central_entry(&self) -> Vec<u8> {
        let name = encode_name(&self.name);
        let mut ans = Vec::with_capacity(46 + name.len());
        ans.extend_from_slice(&CENTRAL_SIG.to_le_bytes());
        // version made by: FAT filesystem in the high byte
        ans.extend_from_slice(&VERSION.to_le_bytes());
        ans.extend_from_slice(&self.version.to_le_bytes());
        ans.extend_from_slice(&self.bit_flags.to_le_bytes());
        ans.extend_from_slice(&(self.method as u16).to_le_bytes());
        ans.extend_from_slice(&self.dos_time.to_le_bytes());
        ans.extend_from_slice(&self.dos_date.to_le_bytes());
        ans.extend_from_slice(&self.crc32.to_le_bytes());
        ans.extend_from_slice(&self.compressed_size.to_le_bytes());
        ans.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        ans.extend_from_slice(&(name.len() as u16).to_le_bytes());
        ans.extend_from_slice(&0u16.to_le_bytes()); // extra length
        ans.extend_from_slice(&0u16.to_le_bytes()); // comment length
        ans.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        ans.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
        ans.extend_from_slice(&self.attributes.to_le_bytes());
        ans.extend_from_slice(&(self.file_offset as u32).to_le_bytes());
        ans.extend_from_slice(&name);
        ans
    }
    /// parse one central entry from `buf` at `pos`, returning the header
    /// and the entry's total length
    fn from_central(buf: &[u8],pos: usize) -> Result<(Self,usize),DYNERR> {
        if pos + 46 > buf.len() || u32_at(buf,pos) != CENTRAL_SIG {
            return Err(Box::new(crate::Error::ZipSignatureMismatch));
        }
        let made_by = u16_at(buf,pos + 4);
        let version = u16_at(buf,pos + 6);
        let bit_flags = u16_at(buf,pos + 8);
        let method = match Method::from_u16(u16_at(buf,pos + 10)) {
            Some(m) => m,
            None => return Err(Box::new(crate::Error::ZipSignatureMismatch))
        };
        let dos_time = u16_at(buf,pos + 12);
        let dos_date = u16_at(buf,pos + 14);
        let crc32 = u32_at(buf,pos + 16);
        let compressed_size = u32_at(buf,pos + 20);
        let uncompressed_size = u32_at(buf,pos + 24);
        let name_len = u16_at(buf,pos + 28) as usize;
        let extra_len = u16_at(buf,pos + 30) as usize;
        let comment_len = u16_at(buf,pos + 32) as usize;
        let mut attributes = u32_at(buf,pos + 38);
        let file_offset = u32_at(buf,pos + 42) as u64;
        let end = pos + 46 + name_len + extra_len + comment_len;
        if end > buf.len() {
            return Err(Box::new(crate::Error::ZipSignatureMismatch));
        }
        let name = decode_name(&buf[pos + 46..pos + 46 + name_len]);
        // attributes only mean FAT bits if FAT made the archive
        if made_by >> 8 != 0 {
            attributes = 0;
        }
        let is_path = name.ends_with('/') || attributes & ATTR_DIRECTORY != 0;
        let ntfs_times = NtfsTimes::from_extra(&buf[pos + 46 + name_len..pos + 46 + name_len + extra_len]);
        Ok((Self {
            name,
            dos_time,
            dos_date,
            attributes,
            file_offset,
            uncompressed_size,
            compressed_size,
            crc32,
            method,
            bit_flags,
            version,
            is_path,
            ntfs_times
        },end - pos))
    }
}

/// An archive session: the sink handle, the in-memory central directory,
/// and the position where member data ends.  The handle is held until
/// `save` writes the directory back, or the session is dropped.
pub struct Archive {
    file: File,
    path: PathBuf,
    /// ordered by (is_path,name); a by-offset order is derived when needed
    dir: Vec<FileHeader>,
    /// write position for the next member, the directory goes here on save
    data_end: u64,
    deleted: bool
}

impl Archive {
    /// create a new empty archive, truncating any existing file
    pub fn create(path: &Path) -> Result<Self,DYNERR> {
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(true).open(path)?;
        log::debug!("created archive {}",path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            dir: Vec::new(),
            data_end: 0,
            deleted: false
        })
    }
    /// open an existing archive and parse its central directory; the file
    /// is truncated to the directory start so new members overwrite the
    /// old directory, which is rewritten on save
    pub fn open(path: &Path) -> Result<Self,DYNERR> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < 22 {
            return Err(Box::new(crate::Error::NoCentralDirectory));
        }
        let scan = u64::min(EOCD_SCAN,file_len);
        file.seek(SeekFrom::Start(file_len - scan))?;
        let mut tail = vec![0u8;scan as usize];
        file.read_exact(&mut tail)?;
        let mut at = tail.len() - 22;
        let eocd = loop {
            if u32_at(&tail,at) == EOCD_SIG {
                break &tail[at..];
            }
            if at == 0 {
                return Err(Box::new(crate::Error::NoCentralDirectory));
            }
            at -= 1;
        };
        if u16_at(eocd,4) != 0 || u16_at(eocd,6) != 0 {
            return Err(Box::new(crate::Error::MultiDiskUnsupported));
        }
        let count = u16_at(eocd,8) as usize;
        if count != u16_at(eocd,10) as usize {
            return Err(Box::new(crate::Error::NoCentralDirectory));
        }
        let dir_size = u32_at(eocd,12) as usize;
        let dir_start = u32_at(eocd,16) as u64;
        if dir_size == 0 || dir_start == 0 {
            return Err(Box::new(crate::Error::EmptyCentralDirectory));
        }
        file.seek(SeekFrom::Start(dir_start))?;
        let mut cd = vec![0u8;dir_size];
        file.read_exact(&mut cd)?;
        let mut dir: Vec<FileHeader> = Vec::with_capacity(count);
        let mut pos = 0;
        while pos < cd.len() {
            let (header,len) = FileHeader::from_central(&cd,pos)?;
            log::trace!("parsed entry {} at offset {}",header.name,header.file_offset);
            dir.push(header);
            pos += len;
        }
        if dir.len() != count {
            return Err(Box::new(crate::Error::NoCentralDirectory));
        }
        dir.sort();
        for i in 1..dir.len() {
            if dir[i] == dir[i-1] {
                return Err(Box::new(crate::Error::DuplicateArchiveEntry));
            }
        }
        log::debug!("opened {} with {} entries",path.display(),dir.len());
        file.set_len(dir_start)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            dir,
            data_end: dir_start,
            deleted: false
        })
    }
    fn position_of(&self,name: &str,is_path: bool) -> Option<usize> {
        self.dir.binary_search_by(|h| {
            (h.is_path,h.name.as_str()).cmp(&(is_path,name))
        }).ok()
    }
    fn insert(&mut self,header: FileHeader) -> STDRESULT {
        match self.dir.binary_search(&header) {
            Ok(_) => Err(Box::new(crate::Error::DuplicateArchiveEntry)),
            Err(idx) => {
                self.dir.insert(idx,header);
                Ok(())
            }
        }
    }
    /// copy `len` bytes within the archive file through the bounce buffer;
    /// the destination must not be past the source
    fn copy_down(&mut self,src: u64,dst: u64,len: u64) -> STDRESULT {
        let mut bounce = vec![0u8;BOUNCE];
        let mut done: u64 = 0;
        while done < len {
            let take = u64::min(BOUNCE as u64,len - done) as usize;
            self.file.seek(SeekFrom::Start(src + done))?;
            self.file.read_exact(&mut bounce[0..take])?;
            self.file.seek(SeekFrom::Start(dst + done))?;
            self.file.write_all(&bounce[0..take])?;
            done += take as u64;
        }
        Ok(())
    }
    /// read a member's local header, returning (name_len,extra_len,extra)
    fn local_prefix(&mut self,offset: u64) -> Result<(usize,usize,Vec<u8>),DYNERR> {
        let mut fixed = [0u8;30];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut fixed)?;
        if u32_at(&fixed,0) != LOCAL_SIG {
            return Err(Box::new(crate::Error::ZipSignatureMismatch));
        }
        let name_len = u16_at(&fixed,26) as usize;
        let extra_len = u16_at(&fixed,28) as usize;
        let mut rest = vec![0u8;name_len + extra_len];
        self.file.read_exact(&mut rest)?;
        Ok((name_len,extra_len,rest.split_off(name_len)))
    }
    /// Add a file from the host filesystem under the given archive name.
    /// The local header goes out with zeroed checksum and compressed size,
    /// which are patched once the data is written.  If the encoder fell
    /// back to storing, the member is rewritten raw with method 0.
    pub fn add_file(&mut self,src_path: &Path,archive_name: &str,level: usize) -> STDRESULT {
        let name = validate_name(archive_name)?;
        let meta = std::fs::metadata(src_path)?;
        if meta.len() > u32::MAX as u64 {
            return Err(Box::new(crate::Error::FileTooLarge));
        }
        if self.position_of(&name,false).is_some() {
            return Err(Box::new(crate::Error::DuplicateArchiveEntry));
        }
        let offset = self.data_end;
        if offset > u32::MAX as u64 {
            return Err(Box::new(crate::Error::FileTooLarge));
        }
        let mut header = FileHeader::new_file(name,meta.len() as u32,Some(&meta));
        header.file_offset = offset;
        let prefix = header.local_header();
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&prefix)?;
        let data_start = offset + prefix.len() as u64;
        let mut src = File::open(src_path)?;
        let mut crc_src = CrcReader::new(&mut src)?;
        let compressed_size = match level == 0 || meta.len() < 8 {
            true => {
                header.method = Method::Store;
                std::io::copy(&mut crc_src,&mut self.file)?
            },
            false => {
                let opt = deflate::Options { level, in_offset: 0, out_offset: data_start };
                let (_,out_size,stored) = deflate::compress_ex(&mut crc_src,&mut self.file,&opt)?;
                match stored {
                    true => {
                        // cheaper raw than as stored deflate blocks
                        header.method = Method::Store;
                        crc_src.seek(SeekFrom::Start(0))?;
                        self.file.seek(SeekFrom::Start(data_start))?;
                        std::io::copy(&mut crc_src,&mut self.file)?
                    },
                    false => out_size
                }
            }
        };
        header.compressed_size = compressed_size as u32;
        header.crc32 = crc_src.digest();
        log::debug!("added {}: {} -> {} bytes",header.name,header.uncompressed_size,header.compressed_size);
        // patch the checksum and compressed size at their fixed offsets
        self.file.seek(SeekFrom::Start(offset + 14))?;
        self.file.write_all(&header.crc32.to_le_bytes())?;
        self.file.write_all(&header.compressed_size.to_le_bytes())?;
        // the method may have flipped to store
        self.file.seek(SeekFrom::Start(offset + 8))?;
        self.file.write_all(&(header.method as u16).to_le_bytes())?;
        self.data_end = data_start + compressed_size;
        self.insert(header)
    }
    /// add a directory entry: a local header with no body and no extra field
    pub fn add_path(&mut self,archive_name: &str,modified: SystemTime) -> STDRESULT {
        let mut name = validate_name(archive_name)?;
        if !name.ends_with('/') {
            name.push('/');
        }
        if self.position_of(&name,true).is_some() {
            return Err(Box::new(crate::Error::DuplicateArchiveEntry));
        }
        let offset = self.data_end;
        if offset > u32::MAX as u64 {
            return Err(Box::new(crate::Error::FileTooLarge));
        }
        let mut header = FileHeader::new_path(name,modified);
        header.file_offset = offset;
        let prefix = header.local_header();
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&prefix)?;
        self.data_end = offset + prefix.len() as u64;
        self.insert(header)
    }
    /// drop a member from the in-memory directory; the bytes go away when
    /// the archive is saved
    pub fn delete(&mut self,archive_name: &str) -> STDRESULT {
        let name = validate_name(archive_name)?;
        let mut dir_name = name.clone();
        if !dir_name.ends_with('/') {
            dir_name.push('/');
        }
        let idx = self.position_of(&name,false)
            .or_else(|| self.position_of(&dir_name,true));
        match idx {
            Some(i) => {
                log::debug!("deleting {}",self.dir[i].name);
                self.dir.remove(i);
                self.deleted = true;
                Ok(())
            },
            None => Err(Box::new(crate::Error::InvalidArchivePath))
        }
    }
    /// extract one member to the given host path, verifying the checksum
    /// and restoring the modification time
    pub fn extract_file(&mut self,archive_name: &str,dest: &Path) -> STDRESULT {
        let name = validate_name(archive_name)?;
        let entry = match self.position_of(&name,false) {
            Some(i) => self.dir[i].clone(),
            None => return Err(Box::new(crate::Error::InvalidArchivePath))
        };
        let (_name_len,_extra_len,extra) = self.local_prefix(entry.file_offset)?;
        // the local extra field is the one place the file times live
        let times = entry.ntfs_times.or_else(|| NtfsTimes::from_extra(&extra));
        let mut out = File::create(dest)?;
        let mut crc_out = CrcWriter::new(&mut out);
        match entry.method {
            Method::Store => {
                let mut bounce = vec![0u8;BOUNCE];
                let mut left = entry.compressed_size as u64;
                while left > 0 {
                    let take = u64::min(BOUNCE as u64,left) as usize;
                    self.file.read_exact(&mut bounce[0..take])?;
                    crc_out.write_all(&bounce[0..take])?;
                    left -= take as u64;
                }
            },
            Method::Deflate => {
                inflate::expand(&mut self.file,&mut crc_out)?;
            }
        }
        if crc_out.digest() != entry.crc32 {
            log::error!("crc-32 of {} does not match the directory",entry.name);
            return Err(Box::new(crate::Error::CrcMismatch));
        }
        crc_out.flush()?;
        let modified = match times {
            Some(t) => system_from_filetime(t.mtime),
            None => system_from_dos(entry.dos_time,entry.dos_date)
        };
        out.set_modified(modified)?;
        Ok(())
    }
    /// extract every member under `dest_dir`, recreating directory entries
    pub fn extract_all(&mut self,dest_dir: &Path) -> STDRESULT {
        let entries = self.dir.clone();
        for entry in &entries {
            let host = dest_dir.join(entry.host_path());
            if entry.is_path {
                std::fs::create_dir_all(&host)?;
            } else {
                if let Some(parent) = host.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                self.extract_file(&entry.name,&host)?;
            }
        }
        Ok(())
    }
    /// the directory in its sorted order
    pub fn entries(&self) -> &Vec<FileHeader> {
        &self.dir
    }
    /// slide surviving members toward the front of the file after deletions
    fn compact(&mut self) -> STDRESULT {
        let mut order: Vec<usize> = (0..self.dir.len()).collect();
        order.sort_by_key(|i| self.dir[*i].file_offset);
        let mut cursor: u64 = 0;
        for idx in order {
            let offset = self.dir[idx].file_offset;
            let (name_len,extra_len,_) = self.local_prefix(offset)?;
            let total = 30 + name_len as u64 + extra_len as u64 + self.dir[idx].compressed_size as u64;
            if offset != cursor {
                log::debug!("moving {} from {} to {}",self.dir[idx].name,offset,cursor);
                self.copy_down(offset,cursor,total)?;
                self.dir[idx].file_offset = cursor;
            }
            cursor += total;
        }
        self.data_end = cursor;
        Ok(())
    }
    /// Write the central directory and end record, truncate, and release
    /// the file handle.  An archive left with no members is removed from
    /// the filesystem entirely.
    pub fn save(mut self) -> STDRESULT {
        if self.dir.is_empty() {
            let path = self.path.clone();
            drop(self.file);
            std::fs::remove_file(path)?;
            return Ok(());
        }
        if self.deleted {
            self.compact()?;
        }
        if self.data_end > u32::MAX as u64 {
            return Err(Box::new(crate::Error::FileTooLarge));
        }
        let mut order: Vec<usize> = (0..self.dir.len()).collect();
        order.sort_by_key(|i| self.dir[*i].file_offset);
        self.file.seek(SeekFrom::Start(self.data_end))?;
        let mut dir_size: u64 = 0;
        for idx in &order {
            let entry = self.dir[*idx].central_entry();
            self.file.write_all(&entry)?;
            dir_size += entry.len() as u64;
        }
        let mut eocd = Vec::with_capacity(22);
        eocd.extend_from_slice(&EOCD_SIG.to_le_bytes());
        eocd.extend_from_slice(&0u16.to_le_bytes());
        eocd.extend_from_slice(&0u16.to_le_bytes());
        eocd.extend_from_slice(&(self.dir.len() as u16).to_le_bytes());
        eocd.extend_from_slice(&(self.dir.len() as u16).to_le_bytes());
        eocd.extend_from_slice(&(dir_size as u32).to_le_bytes());
        eocd.extend_from_slice(&(self.data_end as u32).to_le_bytes());
        eocd.extend_from_slice(&0u16.to_le_bytes());
        self.file.write_all(&eocd)?;
        let end = self.data_end + dir_size + 22;
        self.file.set_len(end)?;
        self.file.flush()?;
        log::debug!("saved {} entries, directory at {}",self.dir.len(),self.data_end);
        Ok(())
    }
}

// *************** TESTS *****************

#[test]
fn name_codec() {
    assert_eq!(encode_name("docs/a.txt"),"docs/a.txt".as_bytes());
    assert_eq!(decode_name(&encode_name("café/ñu.txt")),"café/ñu.txt");
    // outside the code page falls back to underscore
    assert_eq!(encode_name("日.txt"),"_.txt".as_bytes());
}

#[test]
fn name_hygiene() {
    assert!(validate_name("/etc/passwd").is_err());
    assert!(validate_name("C:/autoexec.bat").is_err());
    assert!(validate_name("").is_err());
    assert_eq!(validate_name("a\\b.txt").unwrap(),"a/b.txt");
}

#[test]
fn dos_timestamp_packing() {
    // 2020-06-15 13:45:22 UTC
    let t = UNIX_EPOCH + Duration::from_secs(1592228722);
    let (time,date) = dos_datetime(t);
    assert_eq!(date >> 9,40);       // 2020
    assert_eq!((date >> 5) & 0xf,6);
    assert_eq!(date & 0x1f,15);
    assert_eq!(time >> 11,13);
    assert_eq!((time >> 5) & 0x3f,45);
    assert_eq!(time & 0x1f,11);     // 22 seconds stored halved
    assert_eq!(system_from_dos(time,date),t);
}

#[test]
fn dos_seconds_round_down() {
    // odd seconds lose one second in the two second steps
    let t = UNIX_EPOCH + Duration::from_secs(1592228723);
    let (time,date) = dos_datetime(t);
    assert_eq!(system_from_dos(time,date),t - Duration::from_secs(1));
}

#[test]
fn filetime_round_trip() {
    let t = UNIX_EPOCH + Duration::new(1592228722,500_000_000);
    assert_eq!(system_from_filetime(filetime(t)),t);
}

#[test]
fn ntfs_extra_round_trip() {
    let times = NtfsTimes { mtime: 132366999225000000, atime: 132366999230000000, ctime: 132366000000000000 };
    let extra = times.to_extra();
    assert_eq!(extra.len(),36);
    let parsed = NtfsTimes::from_extra(&extra).expect("parse failed");
    assert_eq!(parsed.mtime,times.mtime);
    assert_eq!(parsed.atime,times.atime);
    assert_eq!(parsed.ctime,times.ctime);
    // unknown tags before the times are skipped
    let padded = [vec![0x99,0x99,2,0,0xaa,0xbb],extra].concat();
    assert!(NtfsTimes::from_extra(&padded).is_some());
}

#[test]
fn header_ordering() {
    let file_b = FileHeader::new_file("b.txt".to_string(),0,None);
    let file_a = FileHeader::new_file("a.txt".to_string(),0,None);
    let path_a = FileHeader::new_path("a/".to_string(),SystemTime::now());
    let mut dir = vec![path_a.clone(),file_b.clone(),file_a.clone()];
    dir.sort();
    assert_eq!(dir[0].name,"a.txt");
    assert_eq!(dir[1].name,"b.txt");
    assert_eq!(dir[2].name,"a/");
}

#[test]
fn local_header_layout() {
    let mut header = FileHeader::new_file("a".to_string(),5,None);
    header.crc32 = 0x12345678;
    header.compressed_size = 5;
    let bytes = header.local_header();
    assert_eq!(bytes.len(),31);
    assert_eq!(u32_at(&bytes,0),LOCAL_SIG);
    assert_eq!(u16_at(&bytes,4),20);
    assert_eq!(u16_at(&bytes,8),8);
    assert_eq!(u32_at(&bytes,14),0x12345678);
    assert_eq!(u32_at(&bytes,22),5);
    assert_eq!(u16_at(&bytes,26),1);
    assert_eq!(u16_at(&bytes,28),0);
    assert_eq!(bytes[30],b'a');
}

#[test]
fn central_entry_round_trip() {
    let mut header = FileHeader::new_file("docs/report.txt".to_string(),1000,None);
    header.crc32 = 0xdeadbeef;
    header.compressed_size = 400;
    header.file_offset = 77;
    let bytes = header.central_entry();
    assert_eq!(u32_at(&bytes,0),CENTRAL_SIG);
    let (parsed,len) = FileHeader::from_central(&bytes,0).expect("parse failed");
    assert_eq!(len,bytes.len());
    assert_eq!(parsed.name,"docs/report.txt");
    assert_eq!(parsed.crc32,0xdeadbeef);
    assert_eq!(parsed.compressed_size,400);
    assert_eq!(parsed.uncompressed_size,1000);
    assert_eq!(parsed.file_offset,77);
    assert_eq!(parsed.method,Method::Deflate);
    assert!(!parsed.is_path);
}

#[test]
fn foreign_filesystem_clears_attributes() {
    let mut header = FileHeader::new_file("a".to_string(),0,None);
    header.attributes = ATTR_ARCHIVE;
    let mut bytes = header.central_entry();
    // claim the entry was made on unix (3) instead of FAT (0)
    bytes[5] = 3;
    let (parsed,_) = FileHeader::from_central(&bytes,0).expect("parse failed");
    assert_eq!(parsed.attributes,0);
}
