use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort construction of a merger. Once a merger exists,
/// feeding and finishing cannot fail.
#[derive(Debug, Error)]
pub enum MergeError {
    /// No root paths were given to count.
    #[error("no paths to scan")]
    EmptyInput,

    /// A configured root could not be opened or enumerated.
    #[error("cannot walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The break flag was raised during the counting pre-pass. Partial
    /// counts would let half-scanned directories pass as complete, so
    /// the whole run is abandoned instead.
    #[error("file counting interrupted")]
    Interrupted,
}
