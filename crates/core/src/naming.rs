//! Deterministic output locations for file-writing pipelines
//!
//! Locations follow `<directory>/<prefix><resource>_<index>.<ext>`, where the
//! index is the recording session counter for the resource's role.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::group::GroupRole;

/// How output file paths are built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationScheme {
    /// Directory the files are written to, relative to the engine's cwd
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Prefix before the resource name
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Extension for recording files
    #[serde(default = "default_recording_extension")]
    pub recording_extension: String,

    /// Extension for snapshot files
    #[serde(default = "default_snapshot_extension")]
    pub snapshot_extension: String,
}

fn default_prefix() -> String {
    "test_".to_string()
}

fn default_recording_extension() -> String {
    "mkv".to_string()
}

fn default_snapshot_extension() -> String {
    "jpeg".to_string()
}

impl Default for LocationScheme {
    fn default() -> Self {
        Self {
            directory: None,
            prefix: default_prefix(),
            recording_extension: default_recording_extension(),
            snapshot_extension: default_snapshot_extension(),
        }
    }
}

impl LocationScheme {
    /// Location for `resource` of `role` in session `index`
    pub fn location(&self, role: GroupRole, resource: &str, index: u32) -> String {
        let ext = match role {
            GroupRole::Snapshot => &self.snapshot_extension,
            _ => &self.recording_extension,
        };
        let file = format!("{}{}_{}.{}", self.prefix, resource, index, ext);

        match &self.directory {
            Some(dir) => dir.join(file).to_string_lossy().into_owned(),
            None => file,
        }
    }
}

/// Per-role session counters
#[derive(Debug, Default, Clone)]
pub struct SessionCounter {
    next: HashMap<GroupRole, u32>,
}

impl SessionCounter {
    /// Create counters starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Current index for `role` without advancing
    pub fn current(&self, role: GroupRole) -> u32 {
        self.next.get(&role).copied().unwrap_or(0)
    }

    /// Return the current index for `role` and advance it
    pub fn advance(&mut self, role: GroupRole) -> u32 {
        let slot = self.next.entry(role).or_insert(0);
        let index = *slot;
        *slot += 1;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_locations() {
        let scheme = LocationScheme::default();
        assert_eq!(
            scheme.location(GroupRole::Recording, "record_h264", 0),
            "test_record_h264_0.mkv"
        );
        assert_eq!(
            scheme.location(GroupRole::Snapshot, "snapshot", 1),
            "test_snapshot_1.jpeg"
        );
    }

    #[test]
    fn test_directory_prefix() {
        let scheme = LocationScheme {
            directory: Some(PathBuf::from("/srv/media")),
            ..LocationScheme::default()
        };
        assert_eq!(
            scheme.location(GroupRole::Recording, "record_h265", 2),
            "/srv/media/test_record_h265_2.mkv"
        );
    }

    #[test]
    fn test_counter_per_role() {
        let mut counter = SessionCounter::new();
        assert_eq!(counter.advance(GroupRole::Recording), 0);
        assert_eq!(counter.advance(GroupRole::Recording), 1);
        assert_eq!(counter.advance(GroupRole::Snapshot), 0);
        assert_eq!(counter.current(GroupRole::Recording), 2);
    }
}
