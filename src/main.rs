use clap::{arg,crate_version,Command};
use clap::error::ErrorKind;
use std::path::{Path,PathBuf};
use flatezip::zip;

const RCH: &str = "unreachable was reached";

type STDRESULT = Result<(),Box<dyn std::error::Error>>;

fn main() {
    std::process::exit(run());
}

/// turn a path relative to `base` into a wire name with forward slashes
fn wire_name(base: &Path,path: &Path) -> Result<String,Box<dyn std::error::Error>> {
    let rel = path.strip_prefix(base)?;
    let parts: Vec<String> = rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Ok(parts.join("/"))
}

/// add a file or a whole directory tree to the archive
fn add_tree(archive: &mut zip::Archive,base: &Path,path: &Path,level: usize) -> STDRESULT {
    if path.is_dir() {
        let meta = std::fs::metadata(path)?;
        let modified = meta.modified().unwrap_or_else(|_| std::time::SystemTime::now());
        archive.add_path(&wire_name(base,path)?,modified)?;
        let mut kids: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        kids.sort();
        for kid in kids {
            add_tree(archive,base,&kid,level)?;
        }
    } else {
        archive.add_file(path,&wire_name(base,path)?,level)?;
    }
    Ok(())
}

fn compress(archive_path: &str,files: Vec<&String>,level: usize) -> STDRESULT {
    let mut archive = zip::Archive::create(Path::new(archive_path))?;
    for f in files {
        let path = Path::new(f);
        let base = match path.parent() {
            Some(p) => p.to_path_buf(),
            None => PathBuf::new()
        };
        add_tree(&mut archive,&base,path,level)?;
    }
    archive.save()
}

fn extract(archive_path: &str,dest: &str) -> STDRESULT {
    let mut archive = zip::Archive::open(Path::new(archive_path))?;
    std::fs::create_dir_all(dest)?;
    archive.extract_all(Path::new(dest))?;
    archive.save()
}

fn list(archive_path: &str) -> STDRESULT {
    let archive = zip::Archive::open(Path::new(archive_path))?;
    println!("{:>10} {:>10} {:>5} {:7} {:19} name","size","packed","ratio","method","modified");
    for entry in archive.entries() {
        let ratio = match entry.uncompressed_size {
            0 => 100,
            u => 100 * entry.compressed_size as u64 / u as u64
        };
        let method = match (entry.is_path,entry.method) {
            (true,_) => "dir",
            (_,zip::Method::Store) => "store",
            (_,zip::Method::Deflate) => "deflate"
        };
        println!("{:>10} {:>10} {:>4}% {:7} {:19} {}",
            entry.uncompressed_size,entry.compressed_size,ratio,method,
            entry.modified_string(),entry.name);
    }
    archive.save()
}

fn run() -> i32 {
    env_logger::init();

    let long_help =
"Examples:
---------
Compress:   `flatezip compress -l 9 my.zip src notes.txt`
Extract:    `flatezip extract my.zip out_dir`
List:       `flatezip list my.zip`";

    let mut main_cmd = Command::new("flatezip")
        .about("Create, list, and extract ZIP archives")
        .after_long_help(long_help)
        .version(crate_version!());
    main_cmd = main_cmd.subcommand(Command::new("compress")
        .arg(arg!(-l --level <LEVEL> "compression level 0-9").required(false))
        .arg(arg!(<archive> "archive path"))
        .arg(arg!(<files> ... "files or directories to add"))
        .about("create an archive from files"));
    main_cmd = main_cmd.subcommand(Command::new("extract")
        .arg(arg!(<archive> "archive path"))
        .arg(arg!(<dir> "destination directory"))
        .about("extract all members into a directory"));
    main_cmd = main_cmd.subcommand(Command::new("list")
        .arg(arg!(<archive> "archive path"))
        .about("list the members of an archive"));

    let matches = match main_cmd.try_get_matches() {
        Ok(m) => m,
        Err(e) if e.kind()==ErrorKind::DisplayHelp || e.kind()==ErrorKind::DisplayVersion => {
            print!("{}",e);
            return 0;
        },
        Err(e) => {
            eprintln!("{}",e);
            return 1;
        }
    };

    if let Some(cmd) = matches.subcommand_matches("compress") {
        let archive_path = cmd.get_one::<String>("archive").expect(RCH);
        let files: Vec<&String> = cmd.get_many::<String>("files").expect(RCH).collect();
        let level = match cmd.get_one::<String>("level") {
            Some(s) => match s.parse::<usize>() {
                Ok(l) if l <= 9 => l,
                _ => {
                    eprintln!("level must be 0-9");
                    return 1;
                }
            },
            None => 6
        };
        if let Err(e) = compress(archive_path,files,level) {
            eprintln!("{}",e);
            return 2;
        }
    }

    if let Some(cmd) = matches.subcommand_matches("extract") {
        let archive_path = cmd.get_one::<String>("archive").expect(RCH);
        let dir = cmd.get_one::<String>("dir").expect(RCH);
        if let Err(e) = extract(archive_path,dir) {
            eprintln!("{}",e);
            return 2;
        }
    }

    if let Some(cmd) = matches.subcommand_matches("list") {
        let archive_path = cmd.get_one::<String>("archive").expect(RCH);
        if let Err(e) = list(archive_path) {
            eprintln!("{}",e);
            return 2;
        }
    }

    0
}
