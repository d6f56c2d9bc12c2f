//! End-to-end filesystem driver behavior through the dispatch facade:
//! put/get round trips, the glob-resolution matrix, and copies.

use std::collections::BTreeSet;

use arbiter::drivers::fs::{self, Fs};
use arbiter::{Arbiter, Driver, Error};

fn arbiter() -> Arbiter {
    std::env::set_var("AWS_EC2_METADATA_DISABLED", "true");
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    Arbiter::new().expect("registry")
}

#[test]
fn test_put_get_round_trip() -> anyhow::Result<()> {
    let a = arbiter();
    let dir = tempfile::tempdir()?;
    let path = format!("{}/blob.bin", dir.path().display());

    let data: Vec<u8> = (0u16..512).map(|i| (i % 251) as u8).collect();
    a.put(&path, &data)?;
    assert_eq!(a.get(&path)?, data);
    assert_eq!(a.size(&path)?, 512);
    assert_eq!(a.try_size(&path), Some(512));
    Ok(())
}

#[test]
fn test_file_scheme_routes_to_fs() -> anyhow::Result<()> {
    let a = arbiter();
    let dir = tempfile::tempdir()?;
    let path = format!("file://{}/note.txt", dir.path().display());

    a.put(&path, b"typed")?;
    assert_eq!(a.get_string(&path)?, "typed");
    assert!(a.is_local(&path)?);
    assert!(!a.is_http_derived(&path));
    Ok(())
}

#[test]
fn test_missing_file_errors_and_try_variants() {
    let a = arbiter();
    assert!(matches!(
        a.get("/definitely/not/present.bin"),
        Err(Error::NotFound(_))
    ));
    assert_eq!(a.try_get("/definitely/not/present.bin"), None);
    assert_eq!(a.try_size("/definitely/not/present.bin"), None);
}

#[test]
fn test_glob_resolution_matrix() -> anyhow::Result<()> {
    let a = arbiter();
    let dir = tempfile::tempdir()?;
    let root = format!("{}/", dir.path().display());

    fs::mkdirp(&format!("{}a/b", root))?;
    for name in [
        "one.txt",
        "two.txt",
        "a/one.txt",
        "a/two.txt",
        "a/b/one.txt",
        "a/b/two.txt",
    ] {
        a.put(&format!("{}{}", root, name), name.as_bytes())?;
    }

    let resolve = |pattern: &str| -> BTreeSet<String> {
        a.resolve(&format!("{}{}", root, pattern), false)
            .unwrap()
            .into_iter()
            .collect()
    };
    let expect = |names: &[&str]| -> BTreeSet<String> {
        names.iter().map(|n| format!("{}{}", root, n)).collect()
    };

    // Non-recursive: one level only, files only.
    assert_eq!(resolve("*"), expect(&["one.txt", "two.txt"]));
    assert_eq!(resolve("a/*"), expect(&["a/one.txt", "a/two.txt"]));
    assert_eq!(resolve("a/b/*"), expect(&["a/b/one.txt", "a/b/two.txt"]));

    // Recursive.
    assert_eq!(
        resolve("**"),
        expect(&[
            "one.txt",
            "two.txt",
            "a/one.txt",
            "a/two.txt",
            "a/b/one.txt",
            "a/b/two.txt"
        ])
    );
    assert_eq!(
        resolve("a/**"),
        expect(&["a/one.txt", "a/two.txt", "a/b/one.txt", "a/b/two.txt"])
    );
    assert_eq!(resolve("a/b/**"), expect(&["a/b/one.txt", "a/b/two.txt"]));

    // Not globs: paths resolve to themselves.
    assert_eq!(resolve("one.txt"), expect(&["one.txt"]));
    assert_eq!(resolve("no-such-file"), expect(&["no-such-file"]));
    Ok(())
}

#[test]
fn test_copy_within_fs() -> anyhow::Result<()> {
    let a = arbiter();
    let dir = tempfile::tempdir()?;
    let src = format!("{}/src.bin", dir.path().display());
    let dst = format!("{}/dst.bin", dir.path().display());

    a.put(&src, b"copy me")?;
    a.copy(&src, &dst)?;
    assert_eq!(a.get(&dst)?, b"copy me");
    Ok(())
}

#[test]
fn test_binary_chunk() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = format!("{}/chunked.bin", dir.path().display());

    let fs = Fs::new();
    fs.put(&path, b"0123456789")?;
    assert_eq!(fs.get_binary_chunk(&path, 2, 8)?, b"234567");
    assert_eq!(fs.get_binary_chunk(&path, 0, 10)?, b"0123456789");
    Ok(())
}

#[test]
fn test_mkdirp_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let nested = format!("{}/x/y/z", dir.path().display());
    fs::mkdirp(&nested)?;
    fs::mkdirp(&nested)?;
    assert!(std::path::Path::new(&nested).is_dir());
    Ok(())
}
