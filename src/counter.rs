use crate::error::MergeError;
use crate::trie::{PathTrie, SEP};
use std::collections::{BinaryHeap, HashSet};
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Traversal switches handed to the walker, the moral equivalent of the
/// usual find/fts flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkFlags {
    /// Resolve symlinks while walking (logical traversal). Loops are broken
    /// by remembering each queued directory's device and inode.
    pub follow_symlinks: bool,
    /// Never leave the filesystems the roots live on.
    pub one_filesystem: bool,
    /// Skip dot-entries.
    pub skip_hidden: bool,
}

#[derive(Debug, Default)]
pub struct Settings {
    pub flags: WalkFlags,
    // If > 0, stop walking as soon as possible.
    pub break_on: Option<&'static AtomicU32>,
}

impl Settings {
    pub fn breaks(&self) -> u32 {
        self.break_on.map_or(0, |flag| flag.load(Ordering::SeqCst))
    }
}

struct Walk<'s> {
    settings: &'s Settings,
    /// Directories left to scan. Sorted by inode number: inode correlates
    /// with a file's age, which correlates with its physical position on
    /// disk, so this order tends to read more sequentially.
    to_scan: BinaryHeap<(u64, Box<Path>)>,
    /// Device and inode of every queued directory. Stops symlink loops and
    /// keeps overlapping roots from being walked twice.
    seen_dirs: HashSet<(u64, u64)>,
    /// Devices of the roots, for `one_filesystem`.
    root_devs: HashSet<u64>,
    skipped: usize,
}

impl<'s> Walk<'s> {
    fn add(&mut self, path: Box<Path>, metadata: &fs::Metadata, visit: &mut dyn FnMut(&Path, &fs::Metadata)) {
        let ty = metadata.file_type();
        if ty.is_dir() {
            self.push_dir(path, metadata);
        } else if ty.is_file() {
            visit(&path, metadata);
        } else {
            // Symlinks in physical mode, sockets, devices.
            self.skipped += 1;
        }
    }

    fn push_dir(&mut self, path: Box<Path>, metadata: &fs::Metadata) {
        if self.settings.flags.one_filesystem && !self.root_devs.contains(&metadata.dev()) {
            self.skipped += 1;
            return;
        }
        if !self.seen_dirs.insert((metadata.dev(), metadata.ino())) {
            self.skipped += 1;
            return;
        }
        // Inode is truncated to group scanning of roughly close inodes together,
        // but still preserve some directory traversal order.
        // Negation to scan from the highest (assuming latest) first.
        let order_key = !(metadata.ino() >> 8);
        self.to_scan.push((order_key, path));
    }

    fn scan_dir(&mut self, path: &Path, visit: &mut dyn FnMut(&Path, &fs::Metadata)) -> io::Result<()> {
        // Unreadable entries are common (permissions, dangling links) and
        // shouldn't abort the whole pre-pass; they're reported and skipped.
        for entry in fs::read_dir(path)?.filter_map(|e| e.ok()) {
            if self.settings.breaks() > 0 {
                break;
            }
            let path = entry.path();
            if self.settings.flags.skip_hidden && hidden(&path) {
                self.skipped += 1;
                continue;
            }
            match metadata_for(&path, self.settings.flags.follow_symlinks) {
                Ok(metadata) => self.add(path.into_boxed_path(), &metadata, visit),
                Err(err) => {
                    eprintln!("{}: {}", path.display(), err);
                    self.skipped += 1;
                }
            }
        }
        Ok(())
    }
}

fn hidden(path: &Path) -> bool {
    path.file_name()
        .map_or(false, |name| name.as_bytes().starts_with(b"."))
}

fn metadata_for(path: &Path, follow_symlinks: bool) -> io::Result<fs::Metadata> {
    if follow_symlinks {
        fs::metadata(path)
    } else {
        fs::symlink_metadata(path)
    }
}

/// Walks the roots and hands every regular file to `visit`. Failures on
/// the roots themselves are fatal; unreadable subtrees are skipped with a
/// warning. Returns how many entries were skipped.
fn walk_files(
    roots: &[PathBuf],
    settings: &Settings,
    visit: &mut dyn FnMut(&Path, &fs::Metadata),
) -> Result<usize, MergeError> {
    if roots.is_empty() {
        return Err(MergeError::EmptyInput);
    }

    let mut walk = Walk {
        settings,
        to_scan: BinaryHeap::new(),
        seen_dirs: HashSet::new(),
        root_devs: HashSet::new(),
        skipped: 0,
    };

    for root in roots {
        let path = fs::canonicalize(root).map_err(|source| MergeError::Walk {
            path: root.clone(),
            source,
        })?;
        let metadata = metadata_for(&path, settings.flags.follow_symlinks).map_err(|source| {
            MergeError::Walk { path: path.clone(), source }
        })?;
        walk.root_devs.insert(metadata.dev());
        walk.add(path.into_boxed_path(), &metadata, visit);
    }

    while let Some((_, path)) = walk.to_scan.pop() {
        if settings.breaks() > 0 {
            return Err(MergeError::Interrupted);
        }
        if let Err(err) = walk.scan_dir(&path, visit) {
            eprintln!("Error scanning {}: {}", path.display(), err);
            walk.skipped += 1;
        }
    }
    if settings.breaks() > 0 {
        return Err(MergeError::Interrupted);
    }
    Ok(walk.skipped)
}

/// Ascends a file path separator by separator, adding one to every prefix.
/// The last byte is skipped so the file name itself can never register as
/// a directory; the lone leading separator registers as the root `/`.
fn bump_prefixes(counts: &mut PathTrie<u64>, path: &[u8]) {
    for i in (0..path.len().saturating_sub(1)).rev() {
        if path[i] != SEP {
            continue;
        }
        let prefix: &[u8] = if i == 0 { b"/" } else { &path[..i] };
        let count = counts.get(prefix).copied().unwrap_or(0);
        counts.insert(prefix, count + 1);
    }
}

/// The counting pre-pass: walks the roots once and maps every directory
/// prefix to the number of regular files transitively under it. The scratch
/// trie of full file paths makes overlapping roots count each file once.
pub(crate) fn count_files_with<F>(
    roots: &[PathBuf],
    settings: &Settings,
    mut on_file: F,
) -> Result<(PathTrie<u64>, usize), MergeError>
where
    F: FnMut(&Path),
{
    let mut file_tree = PathTrie::new();
    let skipped = walk_files(roots, settings, &mut |path, _| {
        on_file(path);
        file_tree.insert(path.as_os_str().as_bytes(), ());
    })?;

    let mut counts = PathTrie::new();
    file_tree.visit(|path, _| {
        bump_prefixes(&mut counts, path);
        false
    });
    Ok((counts, skipped))
}

/// Maps every directory prefix under `roots` to its transitive count of
/// regular files.
pub fn count_files(roots: &[PathBuf], settings: &Settings) -> Result<PathTrie<u64>, MergeError> {
    count_files_with(roots, settings, |_| {}).map(|(counts, _)| counts)
}

/// Collects every regular file with its size, for callers that hash the
/// files themselves before feeding a merger.
pub fn collect_files(roots: &[PathBuf], settings: &Settings) -> Result<Vec<(PathBuf, u64)>, MergeError> {
    let mut files = Vec::new();
    walk_files(roots, settings, &mut |path, metadata| {
        files.push((path.to_path_buf(), metadata.len()));
    })?;
    Ok(files)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    fn fixture() -> (TempDir, PathBuf) {
        let tmp = TempDir::new("counttest").expect("tmp");
        let root = fs::canonicalize(tmp.path()).expect("canonicalize");
        fs::create_dir_all(root.join("a")).unwrap();
        fs::create_dir_all(root.join("b/c")).unwrap();
        fs::write(root.join("a/x"), "x").unwrap();
        fs::write(root.join("a/y"), "y").unwrap();
        fs::write(root.join("b/c/z"), "z").unwrap();
        fs::write(root.join("top"), "t").unwrap();
        (tmp, root)
    }

    fn count_of(counts: &PathTrie<u64>, path: &Path) -> u64 {
        counts.get(path.as_os_str().as_bytes()).copied().unwrap_or(0)
    }

    #[test]
    fn counts_are_transitive() {
        let (_tmp, root) = fixture();
        let counts = count_files(&[root.clone()], &Settings::default()).expect("count");

        assert_eq!(count_of(&counts, &root), 4);
        assert_eq!(count_of(&counts, &root.join("a")), 2);
        assert_eq!(count_of(&counts, &root.join("b")), 1);
        assert_eq!(count_of(&counts, &root.join("b/c")), 1);
        // Ancestors outside the roots are registered too, up to /.
        assert!(count_of(&counts, Path::new("/")) >= 4);
    }

    #[test]
    fn overlapping_roots_count_once() {
        let (_tmp, root) = fixture();
        let roots = vec![root.clone(), root.join("a")];
        let counts = count_files(&roots, &Settings::default()).expect("count");
        assert_eq!(count_of(&counts, &root.join("a")), 2);
        assert_eq!(count_of(&counts, &root), 4);
    }

    #[test]
    fn empty_input_fails() {
        assert!(matches!(
            count_files(&[], &Settings::default()),
            Err(MergeError::EmptyInput)
        ));
    }

    #[test]
    fn missing_root_fails() {
        let missing = PathBuf::from("/nonexistent-dupe-grove-test-path");
        assert!(matches!(
            count_files(&[missing], &Settings::default()),
            Err(MergeError::Walk { .. })
        ));
    }

    #[test]
    fn hidden_entries_can_be_skipped() {
        let (_tmp, root) = fixture();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join(".git/blob"), "g").unwrap();
        fs::write(root.join(".env"), "e").unwrap();

        let mut settings = Settings::default();
        settings.flags.skip_hidden = true;
        let counts = count_files(&[root.clone()], &settings).expect("count");
        assert_eq!(count_of(&counts, &root), 4);

        let counts = count_files(&[root.clone()], &Settings::default()).expect("count");
        assert_eq!(count_of(&counts, &root), 6);
    }

    #[test]
    fn symlinks_are_skipped_unless_followed() {
        let (_tmp, root) = fixture();
        std::os::unix::fs::symlink(root.join("a/x"), root.join("a/link")).unwrap();

        let counts = count_files(&[root.clone()], &Settings::default()).expect("count");
        assert_eq!(count_of(&counts, &root.join("a")), 2);

        let mut settings = Settings::default();
        settings.flags.follow_symlinks = true;
        let counts = count_files(&[root.clone()], &settings).expect("count");
        // The link registers where it lives, like any other directory entry.
        assert_eq!(count_of(&counts, &root.join("a")), 3);
    }

    #[test]
    fn symlink_loops_terminate() {
        let (_tmp, root) = fixture();
        std::os::unix::fs::symlink(&root, root.join("b/loop")).unwrap();

        let mut settings = Settings::default();
        settings.flags.follow_symlinks = true;
        let counts = count_files(&[root.clone()], &settings).expect("count");
        assert_eq!(count_of(&counts, &root), 4);
    }

    #[test]
    fn bump_registers_every_prefix() {
        let mut counts = PathTrie::new();
        bump_prefixes(&mut counts, b"/a/b/x");
        bump_prefixes(&mut counts, b"/a/c");
        assert_eq!(counts.get(b"/a/b").copied(), Some(1));
        assert_eq!(counts.get(b"/a").copied(), Some(2));
        assert_eq!(counts.get(b"/").copied(), Some(2));
        assert_eq!(counts.get(b"/a/b/x"), None);
    }
}
