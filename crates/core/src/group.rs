//! Ordered groups of pipeline handles sharing a lifecycle role

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handle::PipelineHandle;

/// Role a group of pipelines plays in the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    /// Live sources, converters, compositors and display sinks
    Base,
    /// File writers
    Recording,
    /// Encoders feeding the recorders
    Encoding,
    /// Snapshot encoder and writer
    Snapshot,
}

impl GroupRole {
    /// Every role, in declaration order
    pub const ALL: [GroupRole; 4] = [
        GroupRole::Base,
        GroupRole::Recording,
        GroupRole::Encoding,
        GroupRole::Snapshot,
    ];
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupRole::Base => write!(f, "base"),
            GroupRole::Recording => write!(f, "recording"),
            GroupRole::Encoding => write!(f, "encoding"),
            GroupRole::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// Handles of one role, in insertion order
///
/// Insertion order is the iteration order for batch operations, so for the
/// base group it must list producers before their consumers.
#[derive(Debug)]
pub struct PipelineGroup {
    role: GroupRole,
    handles: Vec<PipelineHandle>,
    sealed: bool,
}

impl PipelineGroup {
    /// Create an empty group
    pub fn new(role: GroupRole) -> Self {
        Self {
            role,
            handles: Vec::new(),
            sealed: false,
        }
    }

    /// Role of this group
    pub fn role(&self) -> GroupRole {
        self.role
    }

    /// Append a handle; returns it back if the group is already sealed
    pub fn push(&mut self, handle: PipelineHandle) -> Result<(), PipelineHandle> {
        if self.sealed {
            return Err(handle);
        }
        self.handles.push(handle);
        Ok(())
    }

    /// Freeze membership for the rest of the run
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Whether membership is frozen
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Number of handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the group has no handles
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Handles in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, PipelineHandle> {
        self.handles.iter()
    }

    /// Mutable handles in insertion order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, PipelineHandle> {
        self.handles.iter_mut()
    }

    /// Look up a handle by resource name
    pub fn get(&self, name: &str) -> Option<&PipelineHandle> {
        self.handles.iter().find(|h| h.name() == name)
    }

    /// Look up a handle by resource name, mutably
    pub fn get_mut(&mut self, name: &str) -> Option<&mut PipelineHandle> {
        self.handles.iter_mut().find(|h| h.name() == name)
    }

    /// Resource names in insertion order
    pub fn names(&self) -> Vec<&str> {
        self.handles.iter().map(|h| h.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleOptions;
    use crate::memory::InMemoryEngine;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_insertion_order_and_seal() {
        let engine = Arc::new(InMemoryEngine::new());
        let mut group = PipelineGroup::new(GroupRole::Base);

        for name in ["camera0", "camera0_rgba", "display"] {
            let handle = PipelineHandle::create(engine.clone(), name, "d", HandleOptions::default())
                .await
                .unwrap();
            group.push(handle).unwrap();
        }
        assert_eq!(group.names(), vec!["camera0", "camera0_rgba", "display"]);

        group.seal();
        let late = PipelineHandle::create(engine.clone(), "late", "d", HandleOptions::default())
            .await
            .unwrap();
        let rejected = group.push(late).unwrap_err();
        assert_eq!(rejected.name(), "late");
        assert_eq!(group.len(), 3);
        assert!(group.get("display").is_some());
    }
}
