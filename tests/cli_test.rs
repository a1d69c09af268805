use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::path::Path;
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

fn make_tree(root: &Path) -> STDRESULT {
    std::fs::create_dir_all(root.join("src").join("nested"))?;
    std::fs::write(root.join("src").join("alpha.txt"),"alpha ".repeat(500))?;
    std::fs::write(root.join("src").join("nested").join("beta.bin"),vec![0xa5u8;4000])?;
    std::fs::write(root.join("notes.txt"),"a short note\n")?;
    Ok(())
}

#[test]
fn compress_list_extract() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    make_tree(temp_dir.path())?;
    let zip_path = temp_dir.path().join("out.zip");

    let mut cmd = Command::cargo_bin("flatezip")?;
    cmd.current_dir(temp_dir.path())
        .arg("compress")
        .arg("-l").arg("9")
        .arg(&zip_path)
        .arg("src")
        .arg("notes.txt")
        .assert()
        .success();

    let mut cmd = Command::cargo_bin("flatezip")?;
    cmd.arg("list")
        .arg(&zip_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("src/alpha.txt"))
        .stdout(predicate::str::contains("src/nested/beta.bin"))
        .stdout(predicate::str::contains("notes.txt"));

    let out_dir = temp_dir.path().join("unpacked");
    let mut cmd = Command::cargo_bin("flatezip")?;
    cmd.arg("extract")
        .arg(&zip_path)
        .arg(&out_dir)
        .assert()
        .success();

    for rel in ["src/alpha.txt","src/nested/beta.bin","notes.txt"] {
        let host: std::path::PathBuf = rel.split('/').collect();
        match (std::fs::read(temp_dir.path().join(&host)),std::fs::read(out_dir.join(&host))) {
            (Ok(v1),Ok(v2)) => {
                assert_eq!(v1,v2,"{} did not round trip",rel);
            },
            _ => panic!("unable to compare output with original")
        }
    }
    Ok(())
}

#[test]
fn bad_usage_exits_one() -> STDRESULT {
    let mut cmd = Command::cargo_bin("flatezip")?;
    cmd.arg("transmogrify")
        .assert()
        .code(1);
    let temp_dir = tempfile::tempdir()?;
    std::fs::write(temp_dir.path().join("f.txt"),"data")?;
    let mut cmd = Command::cargo_bin("flatezip")?;
    cmd.current_dir(temp_dir.path())
        .arg("compress")
        .arg("-l").arg("11")
        .arg("out.zip")
        .arg("f.txt")
        .assert()
        .code(1);
    Ok(())
}

#[test]
fn missing_archive_exits_two() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let mut cmd = Command::cargo_bin("flatezip")?;
    cmd.arg("list")
        .arg(temp_dir.path().join("no_such.zip"))
        .assert()
        .code(2);
    Ok(())
}
