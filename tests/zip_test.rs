use std::fs;
use std::path::Path;
use std::time::{Duration,UNIX_EPOCH};
use flatezip::zip::{Archive,Method};
use tempfile;

type STDRESULT = Result<(),Box<dyn std::error::Error>>;

fn write_file(dir: &Path,name: &str,content: &[u8]) -> std::path::PathBuf {
    let p = dir.join(name);
    fs::write(&p,content).expect("write failed");
    p
}

/// deterministic bytes with some repetition so deflate has something to find
fn sample_bytes(count: usize,seed: u8) -> Vec<u8> {
    let phrase = "the quick brown fox jumps over the lazy dog. ".as_bytes();
    let mut ans = Vec::with_capacity(count);
    for i in 0..count {
        match i % 7 {
            0 => ans.push(seed.wrapping_add((i / 7) as u8)),
            _ => ans.push(phrase[i % phrase.len()])
        }
    }
    ans
}

#[test]
fn round_trip() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("round.zip");
    let data1 = sample_bytes(5000,1);
    let data2 = sample_bytes(100000,2);
    let src1 = write_file(temp_dir.path(),"first.txt",&data1);
    let src2 = write_file(temp_dir.path(),"second.bin",&data2);

    let mut archive = Archive::create(&zip_path)?;
    archive.add_file(&src1,"first.txt",6)?;
    archive.add_file(&src2,"second.bin",6)?;
    archive.save()?;

    let mut archive = Archive::open(&zip_path)?;
    let names: Vec<String> = archive.entries().iter().map(|e| e.name.clone()).collect();
    assert_eq!(names,vec!["first.txt","second.bin"]);
    let out_dir = temp_dir.path().join("out");
    fs::create_dir_all(&out_dir)?;
    archive.extract_all(&out_dir)?;
    archive.save()?;
    assert_eq!(fs::read(out_dir.join("first.txt"))?,data1);
    assert_eq!(fs::read(out_dir.join("second.bin"))?,data2);
    Ok(())
}

#[test]
fn reopen_is_stable() -> STDRESULT {
    // opening truncates the directory, saving must restore it byte for byte
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("stable.zip");
    let src = write_file(temp_dir.path(),"a.txt",&sample_bytes(3000,3));
    let mut archive = Archive::create(&zip_path)?;
    archive.add_file(&src,"a.txt",6)?;
    archive.save()?;
    let before = fs::read(&zip_path)?;
    let archive = Archive::open(&zip_path)?;
    archive.save()?;
    let after = fs::read(&zip_path)?;
    assert_eq!(before,after);
    Ok(())
}

#[test]
fn empty_member() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("empty.zip");
    let src = write_file(temp_dir.path(),"e",&[]);
    let mut archive = Archive::create(&zip_path)?;
    archive.add_file(&src,"e",6)?;
    archive.save()?;
    // local 30 + name 1 + extra 36, no body, central 46 + 1, eocd 22
    assert_eq!(fs::metadata(&zip_path)?.len(),30 + 1 + 36 + 46 + 1 + 22);
    let mut archive = Archive::open(&zip_path)?;
    assert_eq!(archive.entries()[0].method,Method::Store);
    assert_eq!(archive.entries()[0].uncompressed_size,0);
    let out = temp_dir.path().join("e.out");
    archive.extract_file("e",&out)?;
    archive.save()?;
    assert_eq!(fs::read(&out)?.len(),0);
    Ok(())
}

#[test]
fn incompressible_member_is_stored() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("stored.zip");
    // xorshift noise defeats the match finder
    let mut state: u32 = 0xc0ffee01;
    let mut noise = Vec::new();
    for _i in 0..50000 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        noise.push((state & 0xff) as u8);
    }
    let src = write_file(temp_dir.path(),"noise.bin",&noise);
    let mut archive = Archive::create(&zip_path)?;
    archive.add_file(&src,"noise.bin",9)?;
    archive.save()?;
    let mut archive = Archive::open(&zip_path)?;
    assert_eq!(archive.entries()[0].method,Method::Store);
    assert_eq!(archive.entries()[0].compressed_size,50000);
    let out = temp_dir.path().join("noise.out");
    archive.extract_file("noise.bin",&out)?;
    archive.save()?;
    assert_eq!(fs::read(&out)?,noise);
    Ok(())
}

#[test]
fn timestamps_survive() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("times.zip");
    let src = write_file(temp_dir.path(),"dated.txt","some dated content".as_bytes());
    // 2020-06-15 13:45:22.5 UTC
    let stamp = UNIX_EPOCH + Duration::new(1592228722,500_000_000);
    fs::File::options().write(true).open(&src)?.set_modified(stamp)?;

    let mut archive = Archive::create(&zip_path)?;
    archive.add_file(&src,"dated.txt",6)?;
    archive.save()?;

    let mut archive = Archive::open(&zip_path)?;
    let entry = archive.entries()[0].clone();
    // the DOS words carry 2020-06-15 13:45:22, seconds halved
    assert_eq!(entry.dos_date >> 9,40);
    assert_eq!((entry.dos_date >> 5) & 0xf,6);
    assert_eq!(entry.dos_date & 0x1f,15);
    assert_eq!(entry.dos_time >> 11,13);
    assert_eq!((entry.dos_time >> 5) & 0x3f,45);
    assert_eq!(entry.dos_time & 0x1f,11);
    // the NTFS field carries the half second
    let out = temp_dir.path().join("dated.out");
    archive.extract_file("dated.txt",&out)?;
    archive.save()?;
    assert_eq!(fs::metadata(&out)?.modified()?,stamp);
    Ok(())
}

#[test]
fn delete_and_compact() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("compact.zip");
    let data_a = sample_bytes(100,10);
    let data_b = sample_bytes(200,20);
    let data_c = sample_bytes(300,30);
    let src_a = write_file(temp_dir.path(),"a",&data_a);
    let src_b = write_file(temp_dir.path(),"b",&data_b);
    let src_c = write_file(temp_dir.path(),"c",&data_c);

    let mut archive = Archive::create(&zip_path)?;
    archive.add_file(&src_a,"a",6)?;
    archive.add_file(&src_b,"b",6)?;
    archive.add_file(&src_c,"c",6)?;
    archive.save()?;
    let size_before = fs::metadata(&zip_path)?.len();

    let mut archive = Archive::open(&zip_path)?;
    let b_entry = archive.entries().iter().find(|e| e.name == "b").unwrap().clone();
    let a_csize = archive.entries().iter().find(|e| e.name == "a").unwrap().compressed_size;
    archive.delete("b")?;
    archive.save()?;

    // the file shrank by b's local record and its central entry
    let b_local = 30 + 1 + 36 + b_entry.compressed_size as u64;
    let b_central = 46 + 1;
    let size_after = fs::metadata(&zip_path)?.len();
    assert_eq!(size_before - size_after,b_local + b_central);

    let mut archive = Archive::open(&zip_path)?;
    let names: Vec<String> = archive.entries().iter().map(|e| e.name.clone()).collect();
    assert_eq!(names,vec!["a","c"]);
    let a_after = archive.entries().iter().find(|e| e.name == "a").unwrap().clone();
    let c_after = archive.entries().iter().find(|e| e.name == "c").unwrap().clone();
    assert_eq!(a_after.file_offset,0);
    assert_eq!(c_after.file_offset,30 + 1 + 36 + a_csize as u64);
    let out_a = temp_dir.path().join("a.out");
    let out_c = temp_dir.path().join("c.out");
    archive.extract_file("a",&out_a)?;
    archive.extract_file("c",&out_c)?;
    archive.save()?;
    assert_eq!(fs::read(&out_a)?,data_a);
    assert_eq!(fs::read(&out_c)?,data_c);
    Ok(())
}

#[test]
fn duplicates_rejected() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("dup.zip");
    let src = write_file(temp_dir.path(),"x.txt","content".as_bytes());
    let mut archive = Archive::create(&zip_path)?;
    archive.add_file(&src,"x.txt",6)?;
    assert!(archive.add_file(&src,"x.txt",6).is_err());
    archive.save()?;
    Ok(())
}

#[test]
fn directory_entries_round_trip() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("tree.zip");
    let data = sample_bytes(1000,7);
    let src = write_file(temp_dir.path(),"leaf.txt",&data);
    let mut archive = Archive::create(&zip_path)?;
    archive.add_path("docs",std::time::SystemTime::now())?;
    archive.add_file(&src,"docs/leaf.txt",6)?;
    archive.save()?;

    let mut archive = Archive::open(&zip_path)?;
    // flat files sort before paths
    let names: Vec<String> = archive.entries().iter().map(|e| e.name.clone()).collect();
    assert_eq!(names,vec!["docs/leaf.txt","docs/"]);
    let out_dir = temp_dir.path().join("out");
    fs::create_dir_all(&out_dir)?;
    archive.extract_all(&out_dir)?;
    archive.save()?;
    assert!(out_dir.join("docs").is_dir());
    assert_eq!(fs::read(out_dir.join("docs").join("leaf.txt"))?,data);
    Ok(())
}

#[test]
fn empty_archive_save_removes_file() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("gone.zip");
    let archive = Archive::create(&zip_path)?;
    archive.save()?;
    assert!(!zip_path.exists());
    Ok(())
}

#[test]
fn delete_last_member_removes_file() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("last.zip");
    let src = write_file(temp_dir.path(),"only.txt","alone".as_bytes());
    let mut archive = Archive::create(&zip_path)?;
    archive.add_file(&src,"only.txt",6)?;
    archive.save()?;
    let mut archive = Archive::open(&zip_path)?;
    archive.delete("only.txt")?;
    archive.save()?;
    assert!(!zip_path.exists());
    Ok(())
}

#[test]
fn not_an_archive() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let bogus = write_file(temp_dir.path(),"bogus.zip",&sample_bytes(1000,40));
    assert!(Archive::open(&bogus).is_err());
    let short = write_file(temp_dir.path(),"short.zip","PK".as_bytes());
    assert!(Archive::open(&short).is_err());
    Ok(())
}

#[test]
fn trailing_comment_tolerated() -> STDRESULT {
    // foreign tools may leave a comment after the end record; the
    // backward scan must still find it
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("comment.zip");
    let data = sample_bytes(2000,50);
    let src = write_file(temp_dir.path(),"c.txt",&data);
    let mut archive = Archive::create(&zip_path)?;
    archive.add_file(&src,"c.txt",6)?;
    archive.save()?;
    let mut raw = fs::read(&zip_path)?;
    let eocd_at = raw.len() - 22;
    let comment = "archived by flatezip";
    raw[eocd_at + 20] = comment.len() as u8;
    raw.extend_from_slice(comment.as_bytes());
    fs::write(&zip_path,&raw)?;
    let mut archive = Archive::open(&zip_path)?;
    assert_eq!(archive.entries().len(),1);
    let out = temp_dir.path().join("c.out");
    archive.extract_file("c.txt",&out)?;
    archive.save()?;
    assert_eq!(fs::read(&out)?,data);
    Ok(())
}

#[test]
fn absolute_names_rejected() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let zip_path = temp_dir.path().join("abs.zip");
    let src = write_file(temp_dir.path(),"f.txt","data".as_bytes());
    let mut archive = Archive::create(&zip_path)?;
    assert!(archive.add_file(&src,"/f.txt",6).is_err());
    assert!(archive.add_file(&src,"C:\\f.txt",6).is_err());
    archive.add_file(&src,"f.txt",6)?;
    archive.save()?;
    Ok(())
}
