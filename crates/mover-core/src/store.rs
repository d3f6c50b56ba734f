//! Branching-info storage.
//!
//! The branching state committed at each revision is persisted through an
//! opaque per-revision byte store. Two interchangeable backends exist,
//! selected by the repository URL scheme: a directory of per-revision
//! files, and unversioned revision properties on the revision records
//! themselves.
//!
//! Branching bytes are attached to a revision record *before* the record
//! is saved: the directory backend files them first, the revprop backend
//! embeds them so record and branching land in one atomic write. Either
//! way a crash can never leave a visible revision record whose branching
//! state is missing.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::branch::{BranchTxn, Rev};
use crate::element::Props;
use crate::error::{MoverError, MoverResult};
use crate::fsutil::atomic_write;
use crate::repos::{PathChange, RevisionInfo};

/// The revision property under which the revprop backend files branching
/// bytes.
pub const BRANCHING_REVPROP: &str = "mover:branching";

/// The on-disk revision record (`revs/r<N>.json`). The branching state is
/// deliberately not part of it; it lives behind an [`InfoStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub revnum: Rev,
    pub info: RevisionInfo,
    #[serde(default)]
    pub revprops: Props,
    #[serde(default)]
    pub path_changes: Vec<PathChange>,
}

impl RevisionRecord {
    pub fn path_in(revs_dir: &Path, rev: Rev) -> PathBuf {
        revs_dir.join(format!("r{rev}.json"))
    }

    pub fn load(revs_dir: &Path, rev: Rev) -> MoverResult<Self> {
        let data = fs::read_to_string(Self::path_in(revs_dir, rev))?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, revs_dir: &Path) -> MoverResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(&Self::path_in(revs_dir, self.revnum), json.as_bytes())
    }
}

/// Opaque per-revision store for branching bytes.
///
/// `put` attaches the bytes to a revision record that has not been saved
/// yet; `get` reads them back by revision number.
pub trait InfoStore {
    fn put(&self, record: &mut RevisionRecord, bytes: &[u8]) -> MoverResult<()>;
    fn get(&self, rev: Rev) -> MoverResult<Option<Vec<u8>>>;
}

/// Backend (a): a directory of per-revision files, `branch-info/r<N>.json`.
///
/// The bytes are on disk before the revision record appears; an orphaned
/// branch-info file from an interrupted commit is ignored by `get`
/// callers because the record it belongs to was never written.
pub struct DirInfoStore {
    dir: PathBuf,
}

impl DirInfoStore {
    pub fn new(repo_dir: &Path) -> Self {
        DirInfoStore {
            dir: repo_dir.join("branch-info"),
        }
    }

    fn rev_path(&self, rev: Rev) -> PathBuf {
        self.dir.join(format!("r{rev}.json"))
    }
}

impl InfoStore for DirInfoStore {
    fn put(&self, record: &mut RevisionRecord, bytes: &[u8]) -> MoverResult<()> {
        fs::create_dir_all(&self.dir)?;
        atomic_write(&self.rev_path(record.revnum), bytes)
    }

    fn get(&self, rev: Rev) -> MoverResult<Option<Vec<u8>>> {
        let path = self.rev_path(rev);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }
}

/// Backend (b): an unversioned revision property on the revision record.
///
/// The bytes travel inside the record itself, so they are written in the
/// record's own single atomic write.
pub struct RevpropInfoStore {
    revs_dir: PathBuf,
}

impl RevpropInfoStore {
    pub fn new(repo_dir: &Path) -> Self {
        RevpropInfoStore {
            revs_dir: repo_dir.join("revs"),
        }
    }
}

impl InfoStore for RevpropInfoStore {
    fn put(&self, record: &mut RevisionRecord, bytes: &[u8]) -> MoverResult<()> {
        record
            .revprops
            .insert(BRANCHING_REVPROP.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, rev: Rev) -> MoverResult<Option<Vec<u8>>> {
        if !RevisionRecord::path_in(&self.revs_dir, rev).exists() {
            return Ok(None);
        }
        let record = RevisionRecord::load(&self.revs_dir, rev)?;
        Ok(record.revprops.get(BRANCHING_REVPROP).cloned())
    }
}

/// Encode a branching transaction for the store.
pub fn encode_branching(txn: &BranchTxn) -> MoverResult<Vec<u8>> {
    Ok(serde_json::to_vec(txn)?)
}

/// Decode stored branching bytes. A parse failure means the persisted
/// element ids are unusable.
pub fn decode_branching(bytes: &[u8]) -> MoverResult<BranchTxn> {
    serde_json::from_slice(bytes)
        .map_err(|e| MoverError::FsNotId(format!("cannot decode stored branching state: {e}")))
}
