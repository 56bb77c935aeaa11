use crate::merger::{DirGroup, MergeListener, Stats};
use serde_derive::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stays quiet while the merge runs and prints the whole result set as one
/// JSON document at the end.
#[derive(Debug)]
pub struct JsonOutput;

impl JsonOutput {
    pub fn new() -> Self {
        JsonOutput
    }
}

impl MergeListener for JsonOutput {
    fn file_counted(&mut self, _: &Path, _: &Stats) {
        // output only at merge_over
    }

    fn count_over(&mut self, _: &Stats, _: Duration) {
        // output only at merge_over
    }

    fn group_member(&mut self, _: u64, _: &Path) {
        // output only at merge_over
    }

    fn group_over(&mut self) {
        // output only at merge_over
    }

    fn merge_over(&mut self, groups: &[DirGroup], stats: &Stats, duration: Duration) {
        let data = JsonSerializable::new(groups, stats, duration);
        let json_string = serde_json::to_string_pretty(&data).unwrap();
        println!("{}", json_string);
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonSerializable<'a> {
    creator: String,
    groups: Vec<JsonGroup<'a>>,
    stats: &'a Stats,
    merge_duration: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonGroup<'a> {
    fingerprint: String,
    paths: &'a [PathBuf],
}

impl<'a> JsonSerializable<'a> {
    pub fn new(groups: &'a [DirGroup], stats: &'a Stats, merge_duration: Duration) -> Self {
        JsonSerializable {
            creator: format!("dupe-grove {}", env!("CARGO_PKG_VERSION")),
            groups: groups
                .iter()
                .map(|group| JsonGroup {
                    fingerprint: format!("{:016x}", group.fingerprint),
                    paths: &group.paths,
                })
                .collect(),
            stats,
            merge_duration,
        }
    }
}
