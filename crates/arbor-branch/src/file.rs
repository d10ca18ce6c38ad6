use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use arbor_types::TreePatch;

use crate::error::BranchResult;
use crate::state::BranchState;
use crate::storage::BranchStorage;

/// Patch log file name inside a branch directory.
pub const PATCH_LOG: &str = "patches.log";
/// State snapshot file name inside a branch directory.
pub const STATE_FILE: &str = "state.json";

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: usize = 8;

/// File-backed branch storage.
///
/// Each branch lives in `root/<hex(name)>/` with two files:
///
/// ```text
/// patches.log   append-only, one frame per patch:
///               [4 bytes: payload length (little-endian u32)]
///               [4 bytes: CRC32 of payload (little-endian u32)]
///               [N bytes: payload (JSON-serialized TreePatch)]
/// state.json    latest BranchState, replaced atomically via rename
/// ```
///
/// A torn frame at the end of the log (a crash mid-append) ends recovery at
/// the last complete patch, and is cut off before the next append so new
/// frames always start on a frame boundary.
#[derive(Clone, Debug)]
pub struct FileBranchStorage {
    root: PathBuf,
    /// Branches whose log tail is known to end on a frame boundary.
    sealed: Arc<Mutex<HashSet<String>>>,
}

impl FileBranchStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sealed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn branch_dir(&self, branch: &str) -> PathBuf {
        self.root.join(hex::encode(branch))
    }

    /// Truncate `log` to the end of its last complete frame, once per branch.
    async fn seal_tail(&self, branch: &str, log: &Path) -> BranchResult<()> {
        if self.sealed.lock().expect("lock poisoned").contains(branch) {
            return Ok(());
        }

        match fs::read(log).await {
            Ok(data) => {
                let (_, valid_len) = decode_frames(&data);
                if valid_len < data.len() {
                    let file = OpenOptions::new().write(true).open(log).await?;
                    file.set_len(valid_len as u64).await?;
                    file.sync_all().await?;
                    warn!(
                        branch,
                        file_len = data.len(),
                        valid_len,
                        "truncated torn patch log tail"
                    );
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        self.sealed
            .lock()
            .expect("lock poisoned")
            .insert(branch.to_string());
        Ok(())
    }

    fn unseal(&self, branch: &str) {
        self.sealed.lock().expect("lock poisoned").remove(branch);
    }
}

#[async_trait]
impl BranchStorage for FileBranchStorage {
    async fn load_state(&self, branch: &str) -> BranchResult<Option<BranchState>> {
        match fs::read(self.branch_dir(branch).join(STATE_FILE)).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_state(&self, state: &BranchState) -> BranchResult<()> {
        let dir = self.branch_dir(&state.name);
        fs::create_dir_all(&dir).await?;

        let data = serde_json::to_vec(state)?;
        let tmp = dir.join(format!("{STATE_FILE}.tmp"));
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, dir.join(STATE_FILE)).await?;

        debug!(branch = %state.name, seq = state.seq, "state saved");
        Ok(())
    }

    async fn append_patch(&self, branch: &str, patch: &TreePatch) -> BranchResult<()> {
        let dir = self.branch_dir(branch);
        fs::create_dir_all(&dir).await?;

        let path = dir.join(PATCH_LOG);
        self.seal_tail(branch, &path).await?;

        let frame = encode_frame(patch)?;
        if let Err(e) = append_frame(&path, &frame).await {
            // A failed write may leave a partial frame behind.
            self.unseal(branch);
            return Err(e.into());
        }

        debug!(branch, patch_id = patch.id, len = frame.len(), "patch appended");
        Ok(())
    }

    async fn read_patches(&self, branch: &str, after_seq: u64) -> BranchResult<Vec<TreePatch>> {
        let data = match fs::read(self.branch_dir(branch).join(PATCH_LOG)).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(decode_frames(&data)
            .0
            .into_iter()
            .filter(|p| p.id > after_seq)
            .collect())
    }
}

async fn append_frame(path: &Path, frame: &[u8]) -> io::Result<()> {
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    log.write_all(frame).await?;
    log.flush().await?;
    log.sync_data().await
}

/// Frame one patch for the log.
pub(crate) fn encode_frame(patch: &TreePatch) -> BranchResult<Vec<u8>> {
    let payload = serde_json::to_vec(patch)?;
    let length = payload.len() as u32;
    let crc = crc32fast::hash(&payload);

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode every valid frame in `data`, returning the patches and the length
/// of the prefix made of complete frames.
///
/// A truncated header or payload stops decoding. Frames failing the CRC
/// check or JSON decoding are skipped.
pub(crate) fn decode_frames(data: &[u8]) -> (Vec<TreePatch>, usize) {
    let mut patches = Vec::new();
    let mut offset = 0usize;

    while offset + HEADER_SIZE <= data.len() {
        let header = &data[offset..offset + HEADER_SIZE];
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let start = offset + HEADER_SIZE;
        if length == 0 || start + length > data.len() {
            warn!(offset, length, file_len = data.len(), "torn patch log tail; stopping recovery");
            break;
        }

        let payload = &data[start..start + length];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping patch");
        } else {
            match serde_json::from_slice::<TreePatch>(payload) {
                Ok(patch) => patches.push(patch),
                Err(e) => warn!(offset, error = %e, "undecodable patch; skipping"),
            }
        }
        offset = start + length;
    }

    if offset < data.len() && offset + HEADER_SIZE > data.len() {
        warn!(offset, file_len = data.len(), "truncated patch header at log tail");
    }
    (patches, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_types::{BlobAddress, BlobHash, FileMetadata, UserMetadata};
    use std::collections::BTreeMap;

    fn patch(id: u64) -> TreePatch {
        let mut added = BTreeMap::new();
        added.insert(
            format!("/file-{id}"),
            FileMetadata {
                address: BlobAddress::new("proj", BlobHash::of(&id.to_le_bytes())),
                metadata: UserMetadata::new(),
                size_in_bytes: 8,
                mtime: id,
                ctime: id,
            },
        );
        TreePatch {
            id,
            timestamp: id * 10,
            added,
            deleted: Vec::new(),
            metadata: None,
        }
    }

    // --- Framing ---

    #[test]
    fn frames_decode_in_order() {
        let mut log = Vec::new();
        for id in 1..=3 {
            log.extend(encode_frame(&patch(id)).unwrap());
        }
        let ids: Vec<_> = decode_frames(&log).0.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn torn_tail_is_ignored() {
        let mut log = encode_frame(&patch(1)).unwrap();
        let second = encode_frame(&patch(2)).unwrap();
        log.extend_from_slice(&second[..second.len() / 2]);

        let (patches, valid_len) = decode_frames(&log);
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].id, 1);
        assert_eq!(valid_len, encode_frame(&patch(1)).unwrap().len());
    }

    #[test]
    fn truncated_header_is_ignored() {
        let mut log = encode_frame(&patch(1)).unwrap();
        log.extend_from_slice(&[7, 0, 0]);
        assert_eq!(decode_frames(&log).0.len(), 1);
    }

    #[test]
    fn corrupted_frame_is_skipped() {
        let mut first = encode_frame(&patch(1)).unwrap();
        let last = first.len() - 1;
        first[last] ^= 0xff;
        first.extend(encode_frame(&patch(2)).unwrap());

        let ids: Vec<_> = decode_frames(&first).0.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2]);
    }

    // --- Storage ---

    #[tokio::test]
    async fn state_and_log_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = FileBranchStorage::new(dir.path());
            storage
                .save_state(&BranchState::empty("feature/x", "p", Some("main".into())))
                .await
                .unwrap();
            storage.append_patch("feature/x", &patch(1)).await.unwrap();
            storage.append_patch("feature/x", &patch(2)).await.unwrap();
        }

        let storage = FileBranchStorage::new(dir.path());
        let state = storage.load_state("feature/x").await.unwrap().unwrap();
        assert_eq!(state.origin.as_deref(), Some("main"));
        assert_eq!(storage.read_patches("feature/x", 0).await.unwrap().len(), 2);
        assert_eq!(storage.read_patches("feature/x", 1).await.unwrap()[0].id, 2);
        assert!(dir.path().join(hex::encode("feature/x")).join(PATCH_LOG).is_file());
    }

    #[tokio::test]
    async fn missing_branch_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileBranchStorage::new(dir.path());
        assert!(storage.load_state("ghost").await.unwrap().is_none());
        assert!(storage.read_patches("ghost", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_state_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileBranchStorage::new(dir.path());
        let mut state = BranchState::empty("main", "p", None);
        storage.save_state(&state).await.unwrap();
        state.seq = 9;
        storage.save_state(&state).await.unwrap();

        assert_eq!(storage.load_state("main").await.unwrap().unwrap().seq, 9);
        let tmp = dir
            .path()
            .join(hex::encode("main"))
            .join(format!("{STATE_FILE}.tmp"));
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn append_after_torn_tail_starts_on_frame_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join(hex::encode("main")).join(PATCH_LOG);
        {
            let storage = FileBranchStorage::new(dir.path());
            storage.append_patch("main", &patch(1)).await.unwrap();
        }

        // Crash mid-append: half of patch 2 reaches the disk.
        let torn = encode_frame(&patch(2)).unwrap();
        let mut data = std::fs::read(&log).unwrap();
        data.extend_from_slice(&torn[..torn.len() / 2]);
        std::fs::write(&log, &data).unwrap();

        {
            let storage = FileBranchStorage::new(dir.path());
            assert_eq!(storage.read_patches("main", 0).await.unwrap().len(), 1);
            storage.append_patch("main", &patch(2)).await.unwrap();
            storage.append_patch("main", &patch(3)).await.unwrap();
        }

        let storage = FileBranchStorage::new(dir.path());
        let ids: Vec<_> = storage
            .read_patches("main", 0)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let expected: usize = (1..=3).map(|id| encode_frame(&patch(id)).unwrap().len()).sum();
        assert_eq!(std::fs::metadata(&log).unwrap().len() as usize, expected);
    }
}
