//! Merged filesystem integration tests - union semantics over real backends

use std::collections::BTreeSet;
use std::fs;
use std::io::{Read, Write};
use std::sync::Arc;

use anyhow::Result;
use mergefs::{
    EntryType, LocalBackend, MemoryBackend, MergeError, MergedEntry, MergedFilesystem, OpenMode,
    Operations,
};
use tempfile::TempDir;

fn names(entries: &[std::rc::Rc<MergedEntry<'_>>]) -> BTreeSet<String> {
    entries.iter().map(|entry| entry.name().to_string()).collect()
}

fn read_all(entry: &MergedEntry<'_>) -> Result<String> {
    let mut content = String::new();
    entry.open(OpenMode::READ)?.read_to_string(&mut content)?;
    Ok(content)
}

/// Two backends: `a` holds docs/readme.txt, `b` holds docs/readme.txt and docs/notes.txt.
fn scenario() -> Result<(Arc<MemoryBackend>, Arc<MemoryBackend>, MergedFilesystem)> {
    let a = Arc::new(MemoryBackend::new());
    a.add_file("docs/readme.txt", "from A")?;
    let b = Arc::new(MemoryBackend::new());
    b.add_file("docs/readme.txt", "from B")?;
    b.add_file("docs/notes.txt", "notes from B")?;

    let fs = MergedFilesystem::builder().backend("a", a.clone()).backend("b", b.clone()).build();
    Ok((a, b, fs))
}

#[test]
fn test_union_listing_and_shadowed_content() -> Result<()> {
    let (_a, _b, fs) = scenario()?;
    let root = fs.root_entry();

    let docs = root.get_child("docs")?.expect("docs should exist");
    let children = docs.list_children()?;
    assert_eq!(children.len(), 2);
    assert_eq!(names(&children), BTreeSet::from(["readme.txt".to_string(), "notes.txt".to_string()]));

    let readme = root.get_child("docs/readme.txt")?.expect("readme should exist");
    assert_eq!(read_all(&readme)?, "from A");

    let notes = root.get_child("/docs//notes.txt")?.expect("notes should exist");
    assert_eq!(read_all(&notes)?, "notes from B");
    assert_eq!(notes.path(), "docs/notes.txt");

    Ok(())
}

#[test]
fn test_missing_paths_are_not_errors() -> Result<()> {
    let (_a, _b, fs) = scenario()?;
    let root = fs.root_entry();

    assert!(root.get_child("nowhere")?.is_none());
    assert!(root.get_child("docs/nowhere.txt")?.is_none());
    assert!(root.get_child("docs/readme.txt/below")?.is_none());
    Ok(())
}

#[test]
fn test_listing_is_idempotent() -> Result<()> {
    let (_a, _b, fs) = scenario()?;
    let docs = fs.entry("docs")?.expect("docs should exist");

    let first = names(&docs.list_children()?);
    let second = names(&docs.list_children()?);
    assert_eq!(first, second);
    assert_eq!(docs.num_children()?, first.len());
    Ok(())
}

#[test]
fn test_delete_removes_from_every_backend() -> Result<()> {
    let (a, b, fs) = scenario()?;
    let docs = fs.entry("docs")?.expect("docs should exist");

    assert!(docs.delete_child("readme.txt")?);
    assert!(!a.exists("docs/readme.txt"));
    assert!(!b.exists("docs/readme.txt"));
    assert_eq!(names(&docs.list_children()?), BTreeSet::from(["notes.txt".to_string()]));

    assert!(!docs.delete_child("readme.txt")?);
    Ok(())
}

#[test]
fn test_create_lands_in_first_capable_backend() -> Result<()> {
    let read_only = Arc::new(MemoryBackend::with_capabilities(Operations::READ));
    read_only.add_dir("docs")?;
    let scratch = Arc::new(MemoryBackend::new());
    scratch.add_dir("docs")?;

    let fs = MergedFilesystem::builder()
        .backend("base", read_only.clone())
        .backend("scratch", scratch.clone())
        .build();
    let docs = fs.entry("docs")?.expect("docs should exist");
    assert_eq!(docs.num_children()?, 0);

    let created = docs.create_entry(EntryType::File, "new.txt")?.expect("create should succeed");
    assert_eq!(created.path(), "docs/new.txt");
    assert!(scratch.exists("docs/new.txt"));
    assert!(!read_only.exists("docs/new.txt"));

    created.open(OpenMode::WRITE)?.write_all(b"hello")?;
    assert_eq!(scratch.read_file("docs/new.txt"), Some(b"hello".to_vec()));

    assert_eq!(docs.num_children()?, 1);
    Ok(())
}

#[test]
fn test_read_only_union_rejects_mutation() -> Result<()> {
    let base = Arc::new(MemoryBackend::with_capabilities(Operations::READ));
    base.add_file("docs/readme.txt", "base")?;
    let fs = MergedFilesystem::builder().backend("base", base.clone()).build();
    let root = fs.root_entry();

    assert!(matches!(
        root.create_entry(EntryType::File, "x"),
        Err(MergeError::Unsupported { .. })
    ));
    assert!(matches!(root.delete_child("docs"), Err(MergeError::Unsupported { .. })));

    let readme = root.get_child("docs/readme.txt")?.expect("readme should exist");
    assert!(matches!(readme.open(OpenMode::WRITE), Err(MergeError::Unsupported { .. })));
    assert_eq!(read_all(&readme)?, "base");
    Ok(())
}

#[test]
fn test_type_errors() -> Result<()> {
    let (_a, _b, fs) = scenario()?;
    let root = fs.root_entry();
    let readme = root.get_child("docs/readme.txt")?.expect("readme should exist");
    let docs = root.get_child("docs")?.expect("docs should exist");

    assert!(matches!(readme.list_children(), Err(MergeError::NotDirectory(_))));
    assert!(matches!(readme.num_children(), Err(MergeError::NotDirectory(_))));
    assert!(matches!(readme.get_child("x"), Err(MergeError::NotDirectory(_))));
    assert!(matches!(docs.open(OpenMode::READ), Err(MergeError::NotFile(_))));
    Ok(())
}

#[test]
fn test_local_over_memory() -> Result<()> {
    let dir = TempDir::new()?;
    fs::create_dir_all(dir.path().join("docs"))?;
    fs::write(dir.path().join("docs/readme.txt"), "on disk")?;

    let memory = Arc::new(MemoryBackend::new());
    memory.add_file("docs/readme.txt", "in memory")?;
    memory.add_file("docs/extra.txt", "extra")?;

    let merged = MergedFilesystem::builder()
        .backend("disk", Arc::new(LocalBackend::read_only(dir.path())?))
        .backend("memory", memory.clone())
        .build();

    let root = merged.root_entry();
    let docs = root.get_child("docs")?.expect("docs should exist");
    assert_eq!(
        names(&docs.list_children()?),
        BTreeSet::from(["readme.txt".to_string(), "extra.txt".to_string()])
    );
    assert_eq!(read_all(&root.get_child("docs/readme.txt")?.expect("readme"))?, "on disk");

    // Writes skip the read-only disk backend and land in memory.
    let readme = root.get_child("docs/readme.txt")?.expect("readme");
    readme.open(OpenMode::WRITE | OpenMode::TRUNCATE)?.write_all(b"patched")?;
    assert_eq!(memory.read_file("docs/readme.txt"), Some(b"patched".to_vec()));
    assert_eq!(fs::read_to_string(dir.path().join("docs/readme.txt"))?, "on disk");
    Ok(())
}

#[test]
fn test_local_backends_create_and_delete() -> Result<()> {
    let upper = TempDir::new()?;
    let lower = TempDir::new()?;
    fs::create_dir(upper.path().join("shared"))?;
    fs::create_dir(lower.path().join("shared"))?;
    fs::write(upper.path().join("shared/both.txt"), "upper")?;
    fs::write(lower.path().join("shared/both.txt"), "lower")?;

    let merged = MergedFilesystem::new(vec![
        Arc::new(LocalBackend::new(upper.path())?) as Arc<dyn mergefs::Backend>,
        Arc::new(LocalBackend::new(lower.path())?),
    ]);
    let shared = merged.entry("shared")?.expect("shared should exist");

    let sub = shared.create_entry(EntryType::Directory, "sub")?.expect("mkdir should succeed");
    assert!(sub.is_dir());
    assert!(upper.path().join("shared/sub").is_dir());
    assert!(!lower.path().join("shared/sub").exists());

    assert!(shared.delete_child("both.txt")?);
    assert!(!upper.path().join("shared/both.txt").exists());
    assert!(!lower.path().join("shared/both.txt").exists());
    assert_eq!(names(&shared.list_children()?), BTreeSet::from(["sub".to_string()]));
    Ok(())
}
