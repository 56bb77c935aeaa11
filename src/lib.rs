mod counter;
mod directory;
mod error;
#[cfg(feature = "json")]
mod json;
mod merger;
mod report;
mod trie;
mod ui;

pub use crate::counter::{collect_files, count_files, Settings, WalkFlags};
pub use crate::error::MergeError;
#[cfg(feature = "json")]
pub use crate::json::JsonOutput;
pub use crate::merger::{DirGroup, MergeListener, Stats, TreeMerger};
pub use crate::report::{hash_file, Digest, FileReport};
pub use crate::trie::{depth_of, parent_of, PathTrie};
pub use crate::ui::UI as TextUserInterface;
