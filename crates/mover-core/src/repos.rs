//! The revision catalog.
//!
//! A [`Repos`] is a read-only, append-only mapping from revision number to
//! the immutable branching transaction committed at that revision, plus
//! the revision's metadata. Revisions that predate element tracking carry
//! path-based change records instead of a branching transaction; they are
//! the input of `migrate`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::branch::{BranchState, BranchTxn, ElRev, Rev};
use crate::element::Props;
use crate::error::{MoverError, MoverResult};

/// Metadata for one committed revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub author: String,
    pub date: DateTime<Utc>,
    pub message: String,
}

impl RevisionInfo {
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        RevisionInfo {
            author: author.into(),
            date: Utc::now(),
            message: message.into(),
        }
    }
}

/// What kind of node a path-based change touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    Dir,
    File,
}

/// One path-keyed change in a pre-element-tracking revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathChange {
    pub action: PathAction,
    pub kind: PathKind,
    pub path: String,
    /// `(revision, path)` this node was copied from, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub copyfrom: Option<(Rev, String)>,
    /// New file text for adds/modifies of files.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<Vec<u8>>,
    /// New properties for adds/modifies.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub props: Option<Props>,
}

/// The action of a [`PathChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathAction {
    Add,
    Modify,
    Delete,
}

/// One revision: metadata, unversioned revision properties, the path-based
/// delta (legacy revisions), and the branching state (element revisions).
///
/// In-memory only; on disk the branching state lives in the opaque
/// branching-info store, not in the revision record.
#[derive(Debug, Clone)]
pub struct Revision {
    pub revnum: Rev,
    pub info: RevisionInfo,
    pub revprops: Props,
    pub path_changes: Vec<PathChange>,
    /// Absent for revisions that predate element tracking.
    pub txn: Option<BranchTxn>,
}

/// The append-only catalog of committed revisions.
#[derive(Debug, Clone, Default)]
pub struct Repos {
    revisions: Vec<Revision>,
}

impl Repos {
    pub fn new() -> Self {
        Repos::default()
    }

    /// The latest revision number. A repository always has at least r0.
    pub fn head(&self) -> Rev {
        self.revisions.len() as Rev - 1
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    /// Append a revision. Its revnum must be the next in sequence.
    pub fn push(&mut self, revision: Revision) -> MoverResult<()> {
        let expected = self.revisions.len() as Rev;
        if revision.revnum != expected {
            return Err(MoverError::IncorrectParams(format!(
                "revision r{} appended out of order (expected r{expected})",
                revision.revnum
            )));
        }
        self.revisions.push(revision);
        Ok(())
    }

    pub fn get(&self, rev: Rev) -> MoverResult<&Revision> {
        if rev < 0 || rev > self.head() {
            return Err(MoverError::NoSuchRevision(format!(
                "no such revision {rev} (HEAD is {})",
                self.head()
            )));
        }
        Ok(&self.revisions[rev as usize])
    }

    /// The immutable branching transaction at `rev`.
    pub fn txn(&self, rev: Rev) -> MoverResult<&BranchTxn> {
        self.get(rev)?.txn.as_ref().ok_or_else(|| {
            MoverError::Branching(format!("r{rev} carries no move-tracking data"))
        })
    }

    /// Look up a branch by id at a revision.
    pub fn get_branch_by_id(&self, rev: Rev, bid: &str) -> MoverResult<&BranchState> {
        self.txn(rev)?
            .branch(bid)
            .ok_or_else(|| MoverError::Branching(format!("branch {bid} not found in r{rev}")))
    }

    /// Resolve `bid:relpath` at `rev` to its deepest containing branch and
    /// element, descending into nested branches.
    pub fn find_el_rev_by_path_rev(
        &self,
        rev: Rev,
        bid: &str,
        relpath: &str,
    ) -> MoverResult<ElRev> {
        let txn = self.txn(rev)?;
        let (found_bid, eid) = txn.find_nested_element(bid, relpath)?;
        Ok(ElRev {
            rev: Some(rev),
            bid: found_bid,
            eid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev0() -> Revision {
        Revision {
            revnum: 0,
            info: RevisionInfo::new("init", "initial revision"),
            revprops: Props::new(),
            path_changes: Vec::new(),
            txn: Some(BranchTxn::initial()),
        }
    }

    #[test]
    fn test_push_and_head() {
        let mut repos = Repos::new();
        repos.push(rev0()).unwrap();
        assert_eq!(repos.head(), 0);

        let mut r1 = rev0();
        r1.revnum = 1;
        repos.push(r1).unwrap();
        assert_eq!(repos.head(), 1);
    }

    #[test]
    fn test_push_out_of_order_rejected() {
        let mut repos = Repos::new();
        let mut r5 = rev0();
        r5.revnum = 5;
        assert!(repos.push(r5).is_err());
    }

    #[test]
    fn test_get_out_of_range() {
        let mut repos = Repos::new();
        repos.push(rev0()).unwrap();
        assert!(matches!(
            repos.get(3),
            Err(MoverError::NoSuchRevision(_))
        ));
    }

    #[test]
    fn test_txn_missing_for_legacy_revision() {
        let mut repos = Repos::new();
        let mut r0 = rev0();
        r0.txn = None;
        repos.push(r0).unwrap();
        assert!(matches!(repos.txn(0), Err(MoverError::Branching(_))));
    }

    #[test]
    fn test_find_el_rev_by_path_rev() {
        let mut repos = Repos::new();
        repos.push(rev0()).unwrap();
        let found = repos.find_el_rev_by_path_rev(0, "B0", "").unwrap();
        assert_eq!(found.bid, "B0");
        assert_eq!(found.eid, Some(0));
        let missing = repos.find_el_rev_by_path_rev(0, "B0", "nope").unwrap();
        assert_eq!(missing.eid, None);
    }
}
