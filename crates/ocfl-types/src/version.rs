use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::tree::ContentNode;
use crate::vnum::VNum;

/// Author of a version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub address: Option<String>,
}

/// One immutable version of an object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub vnum: VNum,
    /// Creation time with the offset recorded in the inventory.
    pub created: DateTime<FixedOffset>,
    pub message: String,
    pub user: Option<User>,
    /// Root of the version's logical state.
    pub state: ContentNode,
}

impl Version {
    /// Total size of the version's logical state, if every file size is known.
    pub fn size(&self) -> Option<u64> {
        self.state.size()
    }
}
