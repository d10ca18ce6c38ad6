use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::blob::BlobAddress;

/// Schema-less key/value bag callers attach to a file.
pub type UserMetadata = Map<String, Value>;

/// One entry of a tree.
///
/// `mtime` advances only when the content (address) changes; `ctime`
/// advances whenever the content or the user metadata changes. Both are
/// milliseconds since the UNIX epoch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub address: BlobAddress,
    #[serde(default)]
    pub metadata: UserMetadata,
    pub size_in_bytes: u64,
    pub mtime: u64,
    pub ctime: u64,
}

impl FileMetadata {
    /// Two entries describe the same file version when they point at the same
    /// content and carry the same user metadata. Timestamps are ignored.
    pub fn same_version(&self, other: &FileMetadata) -> bool {
        self.address == other.address && self.metadata == other.metadata
    }
}
