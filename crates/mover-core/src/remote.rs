//! Remote access to a repository.
//!
//! The working copy talks to its repository through the [`Remote`] trait:
//! open a session, read the catalog, load branching state at a revision,
//! run the commit protocol, and replay path-based history for migration.
//! [`LocalRemote`] implements it over an on-disk repository directory.
//!
//! URL schemes select the branching-info backend: `file://` URLs store
//! branching state in a `branch-info/` directory of per-revision files;
//! bare paths store it in revision properties.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::branch::{BranchTxn, Rev};
use crate::element::Props;
use crate::error::{MoverError, MoverResult};
use crate::fsutil::atomic_write;
use crate::lock::RepoLock;
use crate::migrate::{MoveInfo, PathEditor};
use crate::repos::{PathAction, PathChange, PathKind, Repos, Revision, RevisionInfo};
use crate::store::{
    decode_branching, encode_branching, DirInfoStore, InfoStore, RevisionRecord, RevpropInfoStore,
};

/// The repository marker file.
const FORMAT_FILE: &str = "format.json";

/// Required capabilities of the remote access layer.
pub trait Remote {
    /// The canonical root URL of the session.
    fn repos_root_url(&self) -> &str;

    fn latest_revnum(&self) -> Rev;

    /// The read-only revision catalog.
    fn repos(&self) -> &Repos;

    /// A mutable branching transaction anchored at `rev`.
    fn load_branching_state(&self, rev: Rev) -> MoverResult<BranchTxn>;

    /// Open a commit transaction: the newest element-tracked state, ready
    /// to be replayed into and completed by [`Remote::commit`].
    fn begin_commit(&self) -> MoverResult<BranchTxn>;

    /// Complete a commit transaction: finalize its transient eids, verify
    /// integrity, append a revision, and return its number.
    fn commit(
        &mut self,
        txn: BranchTxn,
        info: RevisionInfo,
        revprops: Props,
    ) -> MoverResult<Rev>;

    /// Drive `editor` with the path-based deltas of revisions
    /// `r1..=r2`, one `open_rev`/`close_rev` bracket per revision.
    fn replay_range(
        &self,
        r1: Rev,
        r2: Rev,
        editor: &mut dyn PathEditor,
    ) -> MoverResult<()>;

    /// The move index for `r1..=r2`: a node deleted and re-added with
    /// copy-from in one revision moved.
    fn repos_moves(&self, r1: Rev, r2: Rev) -> MoverResult<BTreeMap<Rev, Vec<MoveInfo>>>;
}

/// A session against a repository directory on the local filesystem.
pub struct LocalRemote {
    url: String,
    dir: PathBuf,
    revs_dir: PathBuf,
    store: Box<dyn InfoStore>,
    repos: Repos,
}

impl std::fmt::Debug for LocalRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRemote")
            .field("url", &self.url)
            .field("dir", &self.dir)
            .field("revs_dir", &self.revs_dir)
            .field("repos", &self.repos)
            .finish()
    }
}

impl LocalRemote {
    const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    /// Resolve a repository URL to its directory and branching-info
    /// backend.
    fn parse_url(url: &str) -> (PathBuf, bool) {
        match url.strip_prefix("file://") {
            Some(path) => (PathBuf::from(path), true),
            None => (PathBuf::from(url), false),
        }
    }

    fn make_store(dir: &Path, use_dir_store: bool) -> Box<dyn InfoStore> {
        if use_dir_store {
            Box::new(DirInfoStore::new(dir))
        } else {
            Box::new(RevpropInfoStore::new(dir))
        }
    }

    /// Create a repository at `url` with its empty initial revision r0,
    /// and open a session on it.
    pub fn init(url: &str) -> MoverResult<Self> {
        let (dir, use_dir_store) = Self::parse_url(url);
        if dir.join(FORMAT_FILE).exists() {
            return Err(MoverError::IncorrectParams(format!(
                "repository already exists at '{url}'"
            )));
        }
        let revs_dir = dir.join("revs");
        fs::create_dir_all(&revs_dir)?;

        let store = Self::make_store(&dir, use_dir_store);
        let mut txn = BranchTxn::initial();
        txn.base_rev = Some(0);
        let mut record = RevisionRecord {
            revnum: 0,
            info: RevisionInfo::new("", "initial revision"),
            revprops: Props::new(),
            path_changes: Vec::new(),
        };
        // Branching state goes in before the record becomes visible.
        store.put(&mut record, &encode_branching(&txn)?)?;
        record.save(&revs_dir)?;

        // The marker goes last: a repository is only discoverable once
        // r0 is fully on disk.
        let marker = serde_json::to_string_pretty(&serde_json::json!({ "mover-repository": 1 }))?;
        atomic_write(&dir.join(FORMAT_FILE), marker.as_bytes())?;

        Self::open(url)
    }

    /// Open a session on an existing repository.
    pub fn open(url: &str) -> MoverResult<Self> {
        let (dir, use_dir_store) = Self::parse_url(url);
        if !dir.join(FORMAT_FILE).exists() {
            return Err(MoverError::IncorrectParams(format!(
                "no repository found at '{url}'"
            )));
        }
        let revs_dir = dir.join("revs");
        let store = Self::make_store(&dir, use_dir_store);

        let mut repos = Repos::new();
        let mut rev = 0;
        while RevisionRecord::path_in(&revs_dir, rev).exists() {
            let record = RevisionRecord::load(&revs_dir, rev)?;
            let txn = match store.get(rev)? {
                Some(bytes) => Some(decode_branching(&bytes)?),
                None => None,
            };
            // A revision without branching state must be a path-based
            // legacy one; anything else is a torn commit.
            if txn.is_none() && record.path_changes.is_empty() {
                return Err(MoverError::FsNotId(format!(
                    "revision r{rev} carries neither a path-based delta nor \
                     branching state; the repository is corrupt"
                )));
            }
            repos.push(Revision {
                revnum: record.revnum,
                info: record.info,
                revprops: record.revprops,
                path_changes: record.path_changes,
                txn,
            })?;
            rev += 1;
        }
        if repos.is_empty() {
            return Err(MoverError::IncorrectParams(format!(
                "repository at '{url}' has no revisions"
            )));
        }

        Ok(LocalRemote {
            url: url.to_string(),
            dir,
            revs_dir,
            store,
            repos,
        })
    }

    /// Append a path-based revision, the commit shape of clients that do
    /// not track elements. Such revisions carry no branching state and
    /// are the input of `migrate`.
    pub fn append_path_revision(
        &mut self,
        info: RevisionInfo,
        path_changes: Vec<PathChange>,
    ) -> MoverResult<Rev> {
        if path_changes.is_empty() {
            // An empty record is indistinguishable from a torn commit.
            return Err(MoverError::IncorrectParams(
                "a path-based revision needs at least one change".to_string(),
            ));
        }
        let _lock = RepoLock::acquire(&self.dir, Self::LOCK_TIMEOUT)?;
        let revnum = self.repos.head() + 1;
        let record = RevisionRecord {
            revnum,
            info: info.clone(),
            revprops: Props::new(),
            path_changes: path_changes.clone(),
        };
        record.save(&self.revs_dir)?;
        self.repos.push(Revision {
            revnum,
            info,
            revprops: Props::new(),
            path_changes,
            txn: None,
        })?;
        Ok(revnum)
    }

    /// The newest revision carrying branching state.
    fn newest_tracked_rev(&self) -> MoverResult<Rev> {
        let mut rev = self.repos.head();
        loop {
            if self.repos.get(rev)?.txn.is_some() {
                return Ok(rev);
            }
            if rev == 0 {
                return Err(MoverError::Branching(
                    "repository has no move-tracking data".to_string(),
                ));
            }
            rev -= 1;
        }
    }
}

impl Remote for LocalRemote {
    fn repos_root_url(&self) -> &str {
        &self.url
    }

    fn latest_revnum(&self) -> Rev {
        self.repos.head()
    }

    fn repos(&self) -> &Repos {
        &self.repos
    }

    fn load_branching_state(&self, rev: Rev) -> MoverResult<BranchTxn> {
        let mut txn = self.repos.txn(rev)?.clone();
        txn.base_rev = Some(rev);
        Ok(txn)
    }

    fn begin_commit(&self) -> MoverResult<BranchTxn> {
        let rev = self.newest_tracked_rev()?;
        self.load_branching_state(rev)
    }

    fn commit(
        &mut self,
        mut txn: BranchTxn,
        info: RevisionInfo,
        revprops: Props,
    ) -> MoverResult<Rev> {
        let _lock = RepoLock::acquire(&self.dir, Self::LOCK_TIMEOUT)?;

        txn.sequence_point();
        txn.finalize_eids();
        if let Some(pred_rev) = txn.base_rev {
            txn.update_predecessors(pred_rev, self.repos.txn(pred_rev)?);
        }
        txn.check_integrity()?;

        let revnum = self.repos.head() + 1;
        txn.base_rev = Some(revnum);

        let mut record = RevisionRecord {
            revnum,
            info: info.clone(),
            revprops: revprops.clone(),
            path_changes: Vec::new(),
        };
        // The branching bytes are filed before (or embedded within) the
        // record, so a crash cannot leave a record whose branching state
        // is missing.
        self.store.put(&mut record, &encode_branching(&txn)?)?;
        record.save(&self.revs_dir)?;

        self.repos.push(Revision {
            revnum,
            info,
            revprops,
            path_changes: Vec::new(),
            txn: Some(txn),
        })?;
        Ok(revnum)
    }

    fn replay_range(
        &self,
        r1: Rev,
        r2: Rev,
        editor: &mut dyn PathEditor,
    ) -> MoverResult<()> {
        let no_props = Props::new();
        for rev in r1..=r2 {
            let revision = self.repos.get(rev)?;
            editor.open_rev(rev, &revision.info)?;
            for change in &revision.path_changes {
                match (change.action, change.kind) {
                    (PathAction::Add, PathKind::Dir) => editor.add_directory(
                        &change.path,
                        change.copyfrom.as_ref(),
                        change.props.as_ref().unwrap_or(&no_props),
                    )?,
                    (PathAction::Add, PathKind::File) => editor.add_file(
                        &change.path,
                        change.copyfrom.as_ref(),
                        change.props.as_ref().unwrap_or(&no_props),
                        change.text.as_deref().unwrap_or(&[]),
                    )?,
                    (PathAction::Modify, _) => editor.change_node(
                        &change.path,
                        change.props.as_ref(),
                        change.text.as_deref(),
                    )?,
                    (PathAction::Delete, _) => editor.delete_node(&change.path)?,
                }
            }
            editor.close_rev(rev)?;
        }
        Ok(())
    }

    fn repos_moves(&self, r1: Rev, r2: Rev) -> MoverResult<BTreeMap<Rev, Vec<MoveInfo>>> {
        let mut moves = BTreeMap::new();
        for rev in r1..=r2 {
            let revision = self.repos.get(rev)?;
            let deleted: Vec<&str> = revision
                .path_changes
                .iter()
                .filter(|c| c.action == PathAction::Delete)
                .map(|c| c.path.as_str())
                .collect();
            let in_rev: Vec<MoveInfo> = revision
                .path_changes
                .iter()
                .filter(|c| c.action == PathAction::Add)
                .filter_map(|c| {
                    let (copyfrom_rev, from_path) = c.copyfrom.as_ref()?;
                    deleted.contains(&from_path.as_str()).then(|| MoveInfo {
                        from_path: from_path.clone(),
                        to_path: c.path.clone(),
                        copyfrom_rev: *copyfrom_rev,
                    })
                })
                .collect();
            if !in_rev.is_empty() {
                moves.insert(rev, in_rev);
            }
        }
        Ok(moves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Payload;
    use crate::repos::PathKind;

    fn file_url(dir: &Path) -> String {
        format!("file://{}", dir.join("repo").display())
    }

    #[test]
    fn test_init_creates_r0() {
        let tmp = tempfile::tempdir().unwrap();
        let remote = LocalRemote::init(&file_url(tmp.path())).unwrap();
        assert_eq!(remote.latest_revnum(), 0);
        let txn = remote.load_branching_state(0).unwrap();
        assert!(txn.branch("B0").is_some());
    }

    #[test]
    fn test_init_twice_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let url = file_url(tmp.path());
        LocalRemote::init(&url).unwrap();
        assert!(LocalRemote::init(&url).is_err());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(LocalRemote::open(&file_url(tmp.path())).is_err());
    }

    #[test]
    fn test_commit_appends_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let url = file_url(tmp.path());
        let mut remote = LocalRemote::init(&url).unwrap();

        let mut txn = remote.begin_commit().unwrap();
        let a = txn.new_eid();
        txn.alter("B0", a, 0, "A", Payload::empty_dir()).unwrap();
        let rev = remote
            .commit(txn, RevisionInfo::new("alice", "add A"), Props::new())
            .unwrap();
        assert_eq!(rev, 1);
        assert_eq!(remote.latest_revnum(), 1);

        // A fresh session sees the committed, renumbered state.
        let reopened = LocalRemote::open(&url).unwrap();
        let b0 = reopened.repos().get_branch_by_id(1, "B0").unwrap();
        assert_eq!(b0.tree.eid_by_path("A"), Some(1));
        assert_eq!(reopened.repos().get(1).unwrap().info.author, "alice");
    }

    #[test]
    fn test_revprop_backend_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        // A bare path selects the revprop backend.
        let url = tmp.path().join("repo").display().to_string();
        let mut remote = LocalRemote::init(&url).unwrap();

        let mut txn = remote.begin_commit().unwrap();
        let a = txn.new_eid();
        txn.alter("B0", a, 0, "A", Payload::empty_dir()).unwrap();
        remote
            .commit(txn, RevisionInfo::new("bob", "add A"), Props::new())
            .unwrap();

        assert!(!tmp.path().join("repo/branch-info").exists());
        let reopened = LocalRemote::open(&url).unwrap();
        assert!(reopened.repos().txn(1).is_ok());
    }

    #[test]
    fn test_commit_with_no_op_integrity_violation_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut remote = LocalRemote::init(&file_url(tmp.path())).unwrap();

        let mut txn = remote.begin_commit().unwrap();
        // Two same-named siblings cannot be committed.
        let a = txn.new_eid();
        txn.alter("B0", a, 0, "A", Payload::empty_dir()).unwrap();
        let b = txn.new_eid();
        txn.set_element(
            "B0",
            b,
            crate::element::ElementContent::new(0, "A", Payload::empty_dir()),
        );
        let result = remote.commit(txn, RevisionInfo::new("x", "bad"), Props::new());
        assert!(result.is_err());
        assert_eq!(remote.latest_revnum(), 0);
    }

    #[test]
    fn test_open_rejects_torn_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let url = file_url(tmp.path());
        LocalRemote::init(&url).unwrap();

        // Simulate a crash that wrote the revision record but never got
        // to the branching state.
        let torn = RevisionRecord {
            revnum: 1,
            info: RevisionInfo::new("x", "interrupted"),
            revprops: Props::new(),
            path_changes: Vec::new(),
        };
        torn.save(&tmp.path().join("repo/revs")).unwrap();

        let err = LocalRemote::open(&url).unwrap_err();
        assert!(matches!(err, MoverError::FsNotId(_)), "got: {err}");
    }

    #[test]
    fn test_append_path_revision_rejects_empty_delta() {
        let tmp = tempfile::tempdir().unwrap();
        let mut remote = LocalRemote::init(&file_url(tmp.path())).unwrap();
        let err = remote
            .append_path_revision(RevisionInfo::new("legacy", "nothing"), Vec::new())
            .unwrap_err();
        assert!(matches!(err, MoverError::IncorrectParams(_)));
    }

    #[test]
    fn test_path_revisions_and_move_index() {
        let tmp = tempfile::tempdir().unwrap();
        let mut remote = LocalRemote::init(&file_url(tmp.path())).unwrap();

        remote
            .append_path_revision(
                RevisionInfo::new("legacy", "add A and A/f"),
                vec![
                    PathChange {
                        action: PathAction::Add,
                        kind: PathKind::Dir,
                        path: "A".into(),
                        copyfrom: None,
                        text: None,
                        props: None,
                    },
                    PathChange {
                        action: PathAction::Add,
                        kind: PathKind::File,
                        path: "A/f".into(),
                        copyfrom: None,
                        text: Some(b"v1".to_vec()),
                        props: None,
                    },
                ],
            )
            .unwrap();
        remote
            .append_path_revision(
                RevisionInfo::new("legacy", "move A/f to g"),
                vec![
                    PathChange {
                        action: PathAction::Delete,
                        kind: PathKind::File,
                        path: "A/f".into(),
                        copyfrom: None,
                        text: None,
                        props: None,
                    },
                    PathChange {
                        action: PathAction::Add,
                        kind: PathKind::File,
                        path: "g".into(),
                        copyfrom: Some((1, "A/f".into())),
                        text: Some(b"v1".to_vec()),
                        props: None,
                    },
                ],
            )
            .unwrap();

        let moves = remote.repos_moves(1, 2).unwrap();
        assert!(!moves.contains_key(&1));
        assert_eq!(moves[&2].len(), 1);
        assert_eq!(moves[&2][0].from_path, "A/f");
        assert_eq!(moves[&2][0].to_path, "g");

        // Legacy revisions carry no branching state.
        assert!(remote.repos().txn(1).is_err());
        // The newest tracked state is still r0.
        let txn = remote.begin_commit().unwrap();
        assert_eq!(txn.base_rev, Some(0));
    }
}
