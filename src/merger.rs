use crate::counter::{self, Settings};
use crate::directory::{mark_finished, Directory, RcDirectory};
use crate::error::MergeError;
use crate::report::FileReport;
use crate::trie::{is_under, parent_of, PathTrie};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fmt::Debug;
use std::mem;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Debug, Default, Copy, Clone)]
#[cfg_attr(feature = "json", derive(serde_derive::Serialize))]
pub struct Stats {
    /// Regular files seen by the counting pre-pass.
    pub files_counted: usize,
    /// Entries the pre-pass refused to look at.
    pub skipped: usize,
    /// Duplicate-file reports fed in.
    pub fed: usize,
    /// Directory aggregates materialized, fed or promoted.
    pub dirs_seen: usize,
    /// Aggregates that reached their on-disk file count.
    pub dirs_completed: usize,
    pub merge_passes: usize,
    pub groups_found: usize,
}

/// Receives progress and results; all output goes through one of these.
pub trait MergeListener: Debug {
    fn file_counted(&mut self, path: &Path, stats: &Stats);
    fn count_over(&mut self, stats: &Stats, duration: Duration);
    /// One directory of a duplicate group.
    fn group_member(&mut self, fingerprint: u64, path: &Path);
    /// The group above is done.
    fn group_over(&mut self);
    fn merge_over(&mut self, groups: &[DirGroup], stats: &Stats, duration: Duration);
}

#[derive(Debug)]
struct SilentListener;
impl MergeListener for SilentListener {
    fn file_counted(&mut self, _: &Path, _: &Stats) {}

    fn count_over(&mut self, _: &Stats, _: Duration) {}

    fn group_member(&mut self, _: u64, _: &Path) {}

    fn group_over(&mut self) {}

    fn merge_over(&mut self, _: &[DirGroup], _: &Stats, _: Duration) {}
}

/// One equivalence class of directories whose file contents are identical,
/// shallowest member first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirGroup {
    pub fingerprint: u64,
    pub paths: Vec<PathBuf>,
}

/// Folds a stream of duplicate-file reports upward into whole-directory
/// duplicates.
///
/// Construction runs a counting pre-pass over the roots, so the merger
/// knows how many files each directory really holds before any report
/// arrives; a directory with even one unreported file never counts as a
/// duplicate. Reports stay owned by the caller for the merger's lifetime.
#[derive(Debug)]
pub struct TreeMerger<'a> {
    /// Registry of every directory aggregate materialized so far.
    dirs: PathTrie<RcDirectory<'a>>,
    /// Directory prefix -> transitive on-disk file count.
    counts: PathTrie<u64>,
    /// Complete directories bucketed by fingerprint. Ordered so extraction
    /// doesn't depend on hash iteration order.
    results: BTreeMap<u64, Vec<RcDirectory<'a>>>,
    /// Directories still eligible for promotion to their parents.
    valid_dirs: Vec<RcDirectory<'a>>,
    groups: Vec<DirGroup>,
    listener: Box<dyn MergeListener>,
    stats: Stats,
    finished: bool,
    pub settings: Settings,
}

impl<'a> TreeMerger<'a> {
    /// Runs the counting pre-pass over `roots` and gets ready to accept
    /// reports. The pre-pass is the only phase that touches the filesystem.
    pub fn new(roots: &[PathBuf], settings: Settings) -> Result<Self, MergeError> {
        Self::with_listener(roots, settings, Box::new(SilentListener))
    }

    pub fn with_listener(
        roots: &[PathBuf],
        settings: Settings,
        mut listener: Box<dyn MergeListener>,
    ) -> Result<Self, MergeError> {
        let start = Instant::now();
        let mut stats = Stats::default();
        let (counts, skipped) = counter::count_files_with(roots, &settings, |path| {
            stats.files_counted += 1;
            listener.file_counted(path, &stats);
        })?;
        stats.skipped = skipped;
        listener.count_over(&stats, start.elapsed());

        Ok(TreeMerger {
            dirs: PathTrie::new(),
            counts,
            results: BTreeMap::new(),
            valid_dirs: Vec::new(),
            groups: Vec::new(),
            listener,
            stats,
            finished: false,
            settings,
        })
    }

    /// For callers that already know the per-directory file counts.
    #[cfg(test)]
    fn with_counts(counts: PathTrie<u64>) -> Self {
        TreeMerger {
            dirs: PathTrie::new(),
            counts,
            results: BTreeMap::new(),
            valid_dirs: Vec::new(),
            groups: Vec::new(),
            listener: Box::new(SilentListener),
            stats: Stats::default(),
            finished: false,
            settings: Settings::default(),
        }
    }

    /// Takes one duplicate-file report and books it against the containing
    /// directory. No I/O, nothing can fail.
    pub fn feed(&mut self, file: &'a FileReport) {
        let dir_path = parent_of(file.path.as_os_str().as_bytes());
        self.stats.fed += 1;

        let dir = match self.dirs.get(dir_path) {
            Some(dir) => Rc::clone(dir),
            None => {
                let expected = self.counts.get(dir_path).copied().unwrap_or(0);
                let dir = Directory::shared(dir_path.into(), expected);
                self.dirs.insert(dir_path, Rc::clone(&dir));
                self.valid_dirs.push(Rc::clone(&dir));
                self.stats.dirs_seen += 1;
                dir
            }
        };

        dir.borrow_mut().add(file);
        if dir.borrow().is_complete() {
            self.insert_result(dir);
        }
    }

    /// Promotes complete directories level by level until nothing new
    /// completes, then extracts the duplicate groups. Calling it again is
    /// a no-op.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let start = Instant::now();

        while !self.valid_dirs.is_empty() {
            self.stats.merge_passes += 1;
            self.level_up();
        }
        self.extract();
        self.listener.merge_over(&self.groups, &self.stats, start.elapsed());
    }

    /// Equivalence classes found by `finish`, ancestors before descendants.
    pub fn groups(&self) -> &[DirGroup] {
        &self.groups
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    fn insert_result(&mut self, dir: RcDirectory<'a>) {
        self.stats.dirs_completed += 1;
        let fingerprint = dir.borrow().fingerprint();
        self.results.entry(fingerprint).or_default().push(dir);
    }

    /// One merge pass: every eligible directory hands its files to its
    /// parent. Parents that are complete afterwards stay eligible for the
    /// next pass; the rest can never complete, since some file below them
    /// was never reported, so they drop out of promotion for good.
    fn level_up(&mut self) {
        let mut dirs = mem::take(&mut self.valid_dirs);
        // Deeper directories go first, so a parent has received everything
        // from below before it hands its own files further up. Path order
        // as tie-break keeps the merge independent of feed order.
        dirs.sort_by(|a, b| {
            let (a, b) = (a.borrow(), b.borrow());
            b.depth().cmp(&a.depth()).then_with(|| a.path().cmp(b.path()))
        });

        let mut new_dirs = Vec::new();
        for dir in dirs {
            let dir_path = dir.borrow().path().to_vec();
            if dir_path == b"/" {
                // The root is its own parent; nowhere further up.
                continue;
            }
            let parent_path = parent_of(&dir_path);

            let parent = match self.dirs.get(parent_path) {
                Some(parent) => Rc::clone(parent),
                None => {
                    let expected = self.counts.get(parent_path).copied().unwrap_or(0);
                    let parent = Directory::shared(parent_path.into(), expected);
                    self.dirs.insert(parent_path, Rc::clone(&parent));
                    self.stats.dirs_seen += 1;
                    new_dirs.push(Rc::clone(&parent));
                    parent
                }
            };

            {
                let mut parent = parent.borrow_mut();
                let child = dir.borrow();
                for &file in child.files() {
                    parent.add(file);
                }
            }
            parent.borrow_mut().adopt(Rc::clone(&dir));
        }

        for dir in new_dirs {
            if dir.borrow().is_complete() {
                self.valid_dirs.push(Rc::clone(&dir));
                self.insert_result(dir);
            }
        }
    }

    /// Reports every equivalence class with at least two members, ancestors
    /// first, and suppresses the subtrees of whatever was reported.
    fn extract(&mut self) {
        // A bucket shares a fingerprint but not necessarily contents; split
        // it into true equivalence classes before reporting anything.
        let mut classes: Vec<Vec<RcDirectory<'a>>> = Vec::new();
        for bucket in self.results.values() {
            let mut bucket_classes: Vec<Vec<RcDirectory<'a>>> = Vec::new();
            for dir in bucket {
                match bucket_classes
                    .iter_mut()
                    .find(|class| class[0].borrow().equal(&dir.borrow()))
                {
                    Some(class) => class.push(Rc::clone(dir)),
                    None => bucket_classes.push(vec![Rc::clone(dir)]),
                }
            }
            classes.extend(bucket_classes.into_iter().filter(|class| class.len() > 1));
        }

        // A directory trivially carries the same multiset as an ancestor
        // that holds nothing else, but that's the same bytes once, not an
        // independent copy. Keep only the topmost member of each such
        // chain; a class has to have two unrelated members left to count.
        for class in &mut classes {
            class.sort_by(|a, b| {
                let (a, b) = (a.borrow(), b.borrow());
                a.depth().cmp(&b.depth()).then_with(|| a.path().cmp(b.path()))
            });
            let mut kept: Vec<RcDirectory<'a>> = Vec::new();
            for dir in class.drain(..) {
                let nested = kept.iter().any(|ancestor| {
                    is_under(dir.borrow().path(), ancestor.borrow().path())
                });
                if !nested {
                    kept.push(dir);
                }
            }
            *class = kept;
        }
        classes.retain(|class| class.len() > 1);

        // Classes come out shallowest first, so an ancestor group is always
        // reported before any group holding its descendants and the
        // suppression marks land in time.
        classes.sort_by(|a, b| {
            let (a, b) = (a[0].borrow(), b[0].borrow());
            a.depth().cmp(&b.depth()).then_with(|| a.path().cmp(b.path()))
        });

        for class in classes {
            let fingerprint = class[0].borrow().fingerprint();
            let mut paths = Vec::new();
            for dir in &class {
                if dir.borrow().finished() {
                    continue;
                }
                mark_finished(dir);
                let path = PathBuf::from(OsStr::from_bytes(dir.borrow().path()));
                self.listener.group_member(fingerprint, &path);
                paths.push(path);
            }
            if paths.is_empty() {
                continue;
            }
            self.listener.group_over();
            self.stats.groups_found += 1;
            self.groups.push(DirGroup { fingerprint, paths });
        }
    }
}
