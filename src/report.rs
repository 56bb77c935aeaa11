use smallvec::SmallVec;
use std::fs;
use std::io;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Fixed-width content digest. The width is whatever the producing hasher
/// uses, but at least one machine word, since the first word feeds the
/// per-directory fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Digest {
    bytes: SmallVec<[u8; 32]>,
}

impl Digest {
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        let bytes = SmallVec::from_slice(bytes.as_ref());
        assert!(bytes.len() >= 8, "digest shorter than a fingerprint word");
        Digest { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// First machine word of the digest, the part folded into fingerprints.
    pub fn prefix_word(&self) -> u64 {
        let mut word = [0u8; 8];
        word.copy_from_slice(&self.bytes[..8]);
        u64::from_le_bytes(word)
    }
}

/// One duplicate file as reported by a file-level scanner.
///
/// The merger reads only the path and the digest. The size is provenance
/// carried through so callers can do their own space accounting.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub digest: Digest,
    pub size: u64,
}

impl FileReport {
    pub fn new(path: impl Into<PathBuf>, digest: Digest, size: u64) -> Self {
        FileReport { path: path.into(), digest, size }
    }
}

/// Content digest of a whole file. The merger never hashes anything itself;
/// this is for callers that don't already get digests from a scanner.
pub fn hash_file(path: &Path) -> io::Result<Digest> {
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(Digest::new(hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    #[test]
    fn prefix_word_is_little_endian() {
        let digest = Digest::new([1, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff]);
        assert_eq!(digest.prefix_word(), 1);
        assert_eq!(digest.as_bytes().len(), 10);
    }

    #[test]
    #[should_panic]
    fn short_digest_is_rejected() {
        Digest::new([1, 2, 3]);
    }

    #[test]
    fn same_content_same_digest() {
        let tmp = TempDir::new("hashtest").expect("tmp");
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        let c = tmp.path().join("c");
        fs::write(&a, "same\n").expect("write");
        fs::write(&b, "same\n").expect("write");
        fs::write(&c, "other\n").expect("write");

        let ha = hash_file(&a).expect("hash");
        assert_eq!(ha, hash_file(&b).expect("hash"));
        assert_ne!(ha, hash_file(&c).expect("hash"));
        assert_eq!(ha.as_bytes().len(), 32);
    }
}
