use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// A lightweight handle on a stored depot.
///
/// A label lets a commit pin a depot without reading it. `dependencies` lists
/// the depots this one was built on top of: files that did not change are not
/// copied into the new depot but referenced in the depot that already holds
/// their bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepotLabel {
    pub id: ContentHash,
    pub dependencies: BTreeSet<ContentHash>,
}

impl DepotLabel {
    /// Label for a depot that holds all of its own bytes.
    pub fn standalone(id: ContentHash) -> Self {
        Self {
            id,
            dependencies: BTreeSet::new(),
        }
    }

    pub fn new(id: ContentHash, dependencies: impl IntoIterator<Item = ContentHash>) -> Self {
        let dependencies = dependencies.into_iter().filter(|d| *d != id).collect();
        Self { id, dependencies }
    }

    /// Returns `true` if the depot references no other depot.
    pub fn is_standalone(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// The depot itself followed by its direct dependencies.
    pub fn hashes(&self) -> impl Iterator<Item = ContentHash> + '_ {
        std::iter::once(self.id).chain(self.dependencies.iter().copied())
    }
}
