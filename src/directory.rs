use crate::report::FileReport;
use crate::trie::depth_of;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Directories are shared between the path registry, the promotion work
/// queue, the child lists of their parents, and the result buckets.
pub type RcDirectory<'a> = Rc<RefCell<Directory<'a>>>;

/// One directory under analysis: the duplicate files reported directly in
/// it plus everything merged up from complete subdirectories.
#[derive(Debug)]
pub struct Directory<'a> {
    path: Box<[u8]>,
    files: Vec<&'a FileReport>,
    /// Number of regular files actually on disk anywhere under `path`,
    /// taken from the counting pre-pass. Zero when the counter never saw
    /// the path; such a directory can never become complete.
    expected: u64,
    /// XOR of the first word of every contributed digest. Files arrive in
    /// whatever order the scanner finds them, so the combiner has to be
    /// insensitive to it.
    fingerprint: u64,
    /// Contributions per full digest. Fingerprints can collide; this is
    /// what settles whether two directories really hold the same bytes.
    digests: HashMap<&'a [u8], u32>,
    /// Complete subdirectories that were promoted into this one.
    children: Vec<RcDirectory<'a>>,
    /// Set once this directory or an ancestor has been reported.
    finished: bool,
}

impl<'a> Directory<'a> {
    pub fn new(path: Box<[u8]>, expected: u64) -> Self {
        Directory {
            path,
            files: Vec::new(),
            expected,
            fingerprint: 0,
            digests: HashMap::new(),
            children: Vec::new(),
            finished: false,
        }
    }

    pub fn shared(path: Box<[u8]>, expected: u64) -> RcDirectory<'a> {
        Rc::new(RefCell::new(Self::new(path, expected)))
    }

    pub fn path(&self) -> &[u8] {
        &self.path
    }

    pub fn depth(&self) -> usize {
        depth_of(&self.path)
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn files(&self) -> &[&'a FileReport] {
        &self.files
    }

    pub fn children(&self) -> &[RcDirectory<'a>] {
        &self.children
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Every file on disk under this directory has arrived as a duplicate.
    pub fn is_complete(&self) -> bool {
        self.files.len() as u64 == self.expected
    }

    pub fn add(&mut self, file: &'a FileReport) {
        self.fingerprint ^= file.digest.prefix_word();
        *self.digests.entry(file.digest.as_bytes()).or_insert(0) += 1;
        self.files.push(file);
    }

    pub fn adopt(&mut self, child: RcDirectory<'a>) {
        self.children.push(child);
    }

    /// True content equality. The fingerprint and the entry count are
    /// cheap short-circuits; on a fingerprint collision this falls back
    /// to comparing the digest multisets outright.
    pub fn equal(&self, other: &Directory<'_>) -> bool {
        if self.fingerprint != other.fingerprint {
            return false;
        }
        if self.files.len() != other.files.len() || self.digests.len() != other.digests.len() {
            return false;
        }
        self.digests
            .iter()
            .all(|(digest, count)| other.digests.get(digest) == Some(count))
    }
}

/// Marks a directory and everything promoted into it as reported, so a
/// subtree never shows up again under a deeper heading.
pub fn mark_finished(dir: &RcDirectory<'_>) {
    let children = {
        let mut dir = dir.borrow_mut();
        if dir.finished {
            return;
        }
        dir.finished = true;
        dir.children.clone()
    };
    for child in &children {
        mark_finished(child);
    }
}
