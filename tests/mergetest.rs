use dupe_grove::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempdir::TempDir;

fn hash_all(roots: &[PathBuf]) -> Vec<FileReport> {
    let files = collect_files(roots, &Settings::default()).expect("walk");
    files
        .into_iter()
        .map(|(path, size)| {
            let digest = hash_file(&path).expect("hash");
            FileReport::new(path, digest, size)
        })
        .collect()
}

fn run(roots: &[PathBuf], reports: &[FileReport]) -> Vec<DirGroup> {
    let mut merger = TreeMerger::new(roots, Settings::default()).expect("merger");
    for report in reports {
        merger.feed(report);
    }
    merger.finish();
    merger.groups().to_vec()
}

#[test]
fn twin_directories_found_on_disk() {
    let tmp = TempDir::new("grovetest").unwrap();
    let root = fs::canonicalize(tmp.path()).unwrap();
    for dir in ["a", "b"] {
        fs::create_dir(root.join(dir)).unwrap();
        fs::write(root.join(dir).join("x"), "first body\n").unwrap();
        fs::write(root.join(dir).join("y"), "second body\n").unwrap();
    }
    fs::create_dir(root.join("c")).unwrap();
    fs::write(root.join("c/unique"), "nothing like me\n").unwrap();

    let roots = vec![root.clone()];
    let reports = hash_all(&roots);
    let groups = run(&roots, &reports);

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].paths, vec![root.join("a"), root.join("b")]);
}

#[test]
fn nested_twins_reported_at_the_top() {
    let tmp = TempDir::new("grovetest").unwrap();
    let root = fs::canonicalize(tmp.path()).unwrap();
    for top in ["r", "s"] {
        fs::create_dir_all(root.join(top).join("inner/deep")).unwrap();
        fs::write(root.join(top).join("inner/f"), "shared one\n").unwrap();
        fs::write(root.join(top).join("inner/deep/g"), "shared two\n").unwrap();
    }

    let roots = vec![root.clone()];
    let reports = hash_all(&roots);
    let groups = run(&roots, &reports);

    // Only the topmost pair is reported; the identical subtrees below are
    // part of it and stay quiet.
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].paths, vec![root.join("r"), root.join("s")]);
}

#[test]
fn one_stray_file_spoils_the_directory() {
    let tmp = TempDir::new("grovetest").unwrap();
    let root = fs::canonicalize(tmp.path()).unwrap();
    for dir in ["a", "b"] {
        fs::create_dir(root.join(dir)).unwrap();
        fs::write(root.join(dir).join("x"), "same everywhere\n").unwrap();
    }
    fs::write(root.join("b/stray"), "only here\n").unwrap();

    let roots = vec![root.clone()];
    let reports = hash_all(&roots);
    let groups = run(&roots, &reports);

    // /a and /b share x, but b's stray file keeps the directories apart,
    // and a lone complete directory is no group.
    assert!(groups.is_empty());
}

#[test]
fn merger_only_reads_fed_reports() {
    let tmp = TempDir::new("grovetest").unwrap();
    let root = fs::canonicalize(tmp.path()).unwrap();
    for dir in ["a", "b"] {
        fs::create_dir(root.join(dir)).unwrap();
        fs::write(root.join(dir).join("x"), "payload\n").unwrap();
    }

    let roots = vec![root.clone()];
    let reports = hash_all(&roots);
    // Feed only one of the two twins; no group may come out.
    let partial: Vec<_> = reports
        .iter()
        .filter(|report| report.path.starts_with(root.join("a")))
        .cloned()
        .collect();
    let groups = run(&roots, &partial);
    assert!(groups.is_empty());
}

#[test]
fn empty_input_is_an_error() {
    assert!(matches!(
        TreeMerger::new(&[], Settings::default()),
        Err(MergeError::EmptyInput)
    ));
}

#[test]
fn missing_root_is_an_error() {
    let missing = vec![PathBuf::from("/nonexistent-dupe-grove-itest")];
    match TreeMerger::new(&missing, Settings::default()) {
        Err(MergeError::Walk { path, .. }) => assert_eq!(path, Path::new("/nonexistent-dupe-grove-itest")),
        other => panic!("expected walk error, got {:?}", other.map(|_| ())),
    }
}
