//! Declared set of pipelines and the wiring the script changes at run time
//!
//! Pipelines are listed in creation order. Within each group, the relative
//! order of the entries becomes the group's insertion order, so base
//! pipelines must be listed producers first.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::group::GroupRole;

/// One pipeline to register with the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Unique resource name
    pub name: String,

    /// Group the pipeline belongs to
    pub group: GroupRole,

    /// Opaque description handed to the engine
    pub description: String,
}

/// Which snapshot pipelines the snapshot phases act on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSpec {
    /// Pipeline writing the snapshot file
    pub writer: String,

    /// Encoder feeding the writer; its source is rebound for the second shot
    pub encoder: String,

    /// Base pipeline the encoder listens to for the second shot
    pub alternate_source: String,
}

/// Where the encoders are rewired to for the second recording session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewireSpec {
    /// Base pipeline the encoders listen to after rewiring
    pub alternate_source: String,
}

/// Complete declaration consumed by the sequencer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    /// Pipelines in creation order
    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,

    /// Snapshot phase wiring
    #[serde(default)]
    pub snapshot: SnapshotSpec,

    /// Re-recording phase wiring
    #[serde(default)]
    pub rewire: RewireSpec,
}

impl Topology {
    /// Group of the pipeline called `name`
    pub fn group_of(&self, name: &str) -> Option<GroupRole> {
        self.pipelines
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.group)
    }

    /// Pipelines of `role`, in declaration order
    pub fn members(&self, role: GroupRole) -> impl Iterator<Item = &PipelineSpec> {
        self.pipelines.iter().filter(move |p| p.group == role)
    }

    /// Check the declaration before any command is sent
    ///
    /// Names must be unique and free of whitespace (the engine protocol is
    /// whitespace-delimited), the snapshot writer and encoder must belong to
    /// the snapshot group and both alternate producers to the base group.
    pub fn validate(&self) -> Result<()> {
        if self.pipelines.is_empty() {
            return Err(Error::Config("topology declares no pipelines".to_string()));
        }

        let mut seen = HashSet::new();
        for spec in &self.pipelines {
            if spec.name.is_empty() || spec.name.chars().any(char::is_whitespace) {
                return Err(Error::Config(format!(
                    "invalid pipeline name '{}'",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(Error::Config(format!(
                    "pipeline '{}' declared twice",
                    spec.name
                )));
            }
            if spec.description.trim().is_empty() {
                return Err(Error::Config(format!(
                    "pipeline '{}' has an empty description",
                    spec.name
                )));
            }
        }

        self.expect_group("snapshot.writer", &self.snapshot.writer, GroupRole::Snapshot)?;
        self.expect_group("snapshot.encoder", &self.snapshot.encoder, GroupRole::Snapshot)?;
        self.expect_group(
            "snapshot.alternate_source",
            &self.snapshot.alternate_source,
            GroupRole::Base,
        )?;
        self.expect_group(
            "rewire.alternate_source",
            &self.rewire.alternate_source,
            GroupRole::Base,
        )?;

        if self.snapshot.writer == self.snapshot.encoder {
            return Err(Error::Config(
                "snapshot writer and encoder must be different pipelines".to_string(),
            ));
        }

        Ok(())
    }

    fn expect_group(&self, field: &str, name: &str, role: GroupRole) -> Result<()> {
        match self.group_of(name) {
            Some(group) if group == role => Ok(()),
            Some(group) => Err(Error::Config(format!(
                "{} '{}' is in the {} group, expected {}",
                field, name, group, role
            ))),
            None => Err(Error::Config(format!(
                "{} refers to unknown pipeline '{}'",
                field, name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, group: GroupRole) -> PipelineSpec {
        PipelineSpec {
            name: name.to_string(),
            group,
            description: format!("interpipesrc name={}_src ! fakesink", name),
        }
    }

    fn topology() -> Topology {
        Topology {
            pipelines: vec![
                spec("cam0", GroupRole::Base),
                spec("cam1", GroupRole::Base),
                spec("enc", GroupRole::Encoding),
                spec("jpeg", GroupRole::Snapshot),
                spec("rec", GroupRole::Recording),
                spec("snap", GroupRole::Snapshot),
            ],
            snapshot: SnapshotSpec {
                writer: "snap".into(),
                encoder: "jpeg".into(),
                alternate_source: "cam1".into(),
            },
            rewire: RewireSpec {
                alternate_source: "cam1".into(),
            },
        }
    }

    #[test]
    fn test_valid_topology() {
        let topology = topology();
        topology.validate().unwrap();
        let snapshot: Vec<_> = topology
            .members(GroupRole::Snapshot)
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(snapshot, vec!["jpeg", "snap"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut topology = topology();
        topology.pipelines.push(spec("cam0", GroupRole::Base));
        let err = topology.validate().unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_whitespace_name_rejected() {
        let mut topology = topology();
        topology.pipelines[0].name = "cam 0".into();
        assert!(topology.validate().is_err());
    }

    #[test]
    fn test_alternate_source_must_be_base() {
        let mut topology = topology();
        topology.rewire.alternate_source = "enc".into();
        let err = topology.validate().unwrap_err();
        assert!(err.to_string().contains("expected base"));
    }

    #[test]
    fn test_parse_from_toml() {
        let toml = r#"
[snapshot]
writer = "snap"
encoder = "jpeg"
alternate_source = "cam"

[rewire]
alternate_source = "cam"

[[pipelines]]
name = "cam"
group = "base"
description = "videotestsrc ! interpipesink name=cam"

[[pipelines]]
name = "jpeg"
group = "snapshot"
description = "interpipesrc name=jpeg_src listen-to=cam ! jpegenc ! interpipesink name=jpeg"

[[pipelines]]
name = "snap"
group = "snapshot"
description = "interpipesrc listen-to=jpeg num-buffers=1 ! filesink name=filesink_snap"
"#;
        let topology: Topology = toml::from_str(toml).unwrap();
        assert_eq!(topology.pipelines.len(), 3);
        assert_eq!(topology.group_of("jpeg"), Some(GroupRole::Snapshot));
        topology.validate().unwrap();
    }
}
