//! Migration of path-based history into element-based history.
//!
//! Repositories whose early revisions predate element tracking carry only
//! path-keyed deltas. Migration replays those deltas against a branching
//! transaction, consulting a move index so that a renamed node keeps one
//! persistent element id across the rename.

use std::collections::BTreeSet;

use crate::branch::{BranchTxn, Rev};
use crate::element::{Eid, Payload, Props};
use crate::error::{MoverError, MoverResult};
use crate::relpath;
use crate::repos::RevisionInfo;

/// One move detected in a path-based revision: the node at `from_path`
/// (as of `copyfrom_rev`) reappeared at `to_path` in the same revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveInfo {
    pub from_path: String,
    pub to_path: String,
    pub copyfrom_rev: Rev,
}

/// The driving side of a path-based replay: one revision at a time, one
/// call per changed path.
pub trait PathEditor {
    fn open_rev(&mut self, rev: Rev, info: &RevisionInfo) -> MoverResult<()>;
    fn add_directory(
        &mut self,
        path: &str,
        copyfrom: Option<&(Rev, String)>,
        props: &Props,
    ) -> MoverResult<()>;
    fn add_file(
        &mut self,
        path: &str,
        copyfrom: Option<&(Rev, String)>,
        props: &Props,
        text: &[u8],
    ) -> MoverResult<()>;
    fn change_node(
        &mut self,
        path: &str,
        props: Option<&Props>,
        text: Option<&[u8]>,
    ) -> MoverResult<()>;
    fn delete_node(&mut self, path: &str) -> MoverResult<()>;
    fn close_rev(&mut self, rev: Rev) -> MoverResult<()>;
}

/// Adapts path-keyed operations to element operations on one branch of an
/// edit transaction.
///
/// For a path named as a move source, the delete is deferred and the
/// matching add re-uses the source element's id, so the move is recorded
/// as an `alter` of one persistent element.
pub struct MigrationEditor<'a> {
    txn: &'a mut BranchTxn,
    bid: String,
    moves: Vec<MoveInfo>,
    /// Move sources whose delete arrived before the matching add.
    deferred_deletes: BTreeSet<String>,
    /// Move sources whose add has already re-used the element.
    completed_moves: BTreeSet<String>,
}

impl<'a> MigrationEditor<'a> {
    pub fn new(txn: &'a mut BranchTxn, bid: impl Into<String>, moves: &[MoveInfo]) -> Self {
        MigrationEditor {
            txn,
            bid: bid.into(),
            moves: moves.to_vec(),
            deferred_deletes: BTreeSet::new(),
            completed_moves: BTreeSet::new(),
        }
    }

    fn move_source_for(&self, to_path: &str) -> Option<&MoveInfo> {
        self.moves.iter().find(|m| m.to_path == to_path)
    }

    fn is_move_source(&self, from_path: &str) -> bool {
        self.moves.iter().any(|m| m.from_path == from_path)
    }

    fn parent_and_name(&self, path: &str) -> MoverResult<(Eid, String)> {
        let branch = self.txn.branch(&self.bid).ok_or_else(|| {
            MoverError::Branching(format!("branch {} not found", self.bid))
        })?;
        let parent_path = relpath::dirname(path);
        let parent_eid = branch.tree.eid_by_path(parent_path).ok_or_else(|| {
            MoverError::Branching(format!("migrate: no parent directory for '{path}'"))
        })?;
        Ok((parent_eid, relpath::basename(path).to_string()))
    }

    fn eid_by_path(&self, path: &str) -> MoverResult<Eid> {
        let branch = self.txn.branch(&self.bid).ok_or_else(|| {
            MoverError::Branching(format!("branch {} not found", self.bid))
        })?;
        branch.tree.eid_by_path(path).ok_or_else(|| {
            MoverError::Branching(format!("migrate: no element at '{path}'"))
        })
    }

    fn add_node(
        &mut self,
        path: &str,
        copyfrom: Option<&(Rev, String)>,
        payload: Payload,
    ) -> MoverResult<()> {
        let (parent_eid, name) = self.parent_and_name(path)?;
        let moved = copyfrom
            .and_then(|(_, from)| self.move_source_for(path).filter(|m| &m.from_path == from))
            .cloned();
        let eid = match moved {
            // The persistent id follows the move.
            Some(m) => {
                let eid = self.eid_by_path(&m.from_path)?;
                self.deferred_deletes.remove(&m.from_path);
                self.completed_moves.insert(m.from_path);
                eid
            }
            None => self.txn.new_eid(),
        };
        self.txn.alter(&self.bid, eid, parent_eid, &name, payload)
    }
}

impl PathEditor for MigrationEditor<'_> {
    fn open_rev(&mut self, _rev: Rev, _info: &RevisionInfo) -> MoverResult<()> {
        self.deferred_deletes.clear();
        self.completed_moves.clear();
        Ok(())
    }

    fn add_directory(
        &mut self,
        path: &str,
        copyfrom: Option<&(Rev, String)>,
        props: &Props,
    ) -> MoverResult<()> {
        self.add_node(path, copyfrom, Payload::Dir { props: props.clone() })
    }

    fn add_file(
        &mut self,
        path: &str,
        copyfrom: Option<&(Rev, String)>,
        props: &Props,
        text: &[u8],
    ) -> MoverResult<()> {
        self.add_node(path, copyfrom, Payload::file(props.clone(), text.to_vec()))
    }

    fn change_node(
        &mut self,
        path: &str,
        props: Option<&Props>,
        text: Option<&[u8]>,
    ) -> MoverResult<()> {
        let eid = self.eid_by_path(path)?;
        let branch = self.txn.branch(&self.bid).expect("branch resolved above");
        let existing = branch.get_element(eid).expect("element resolved above");
        let payload = match (&existing.payload, text) {
            (Payload::File { props: old, text: old_text }, _) => Payload::file(
                props.cloned().unwrap_or_else(|| old.clone()),
                text.map(|t| t.to_vec()).unwrap_or_else(|| old_text.clone()),
            ),
            (Payload::Dir { props: old }, None) => Payload::Dir {
                props: props.cloned().unwrap_or_else(|| old.clone()),
            },
            _ => {
                return Err(MoverError::Branching(format!(
                    "migrate: text change on non-file '{path}'"
                )))
            }
        };
        let (parent_eid, name) = (existing.parent_eid, existing.name.clone());
        self.txn.alter(&self.bid, eid, parent_eid, &name, payload)
    }

    fn delete_node(&mut self, path: &str) -> MoverResult<()> {
        if self.completed_moves.contains(path) {
            // The matching add already moved the element away.
            return Ok(());
        }
        if self.is_move_source(path) {
            // The matching add re-uses this element; dropping it here
            // would lose the id.
            self.deferred_deletes.insert(path.to_string());
            return Ok(());
        }
        let eid = self.eid_by_path(path)?;
        self.txn.delete(&self.bid, eid)
    }

    fn close_rev(&mut self, _rev: Rev) -> MoverResult<()> {
        // Deletes deferred for moves whose add never arrived.
        let leftovers: Vec<String> = self.deferred_deletes.iter().cloned().collect();
        for path in leftovers {
            let eid = self.eid_by_path(&path)?;
            self.txn.delete(&self.bid, eid)?;
        }
        self.deferred_deletes.clear();
        self.txn.sequence_point();
        Ok(())
    }
}

/// Validate a migration revision range against the repository head.
pub fn check_migrate_range(r1: Rev, r2: Rev, head: Rev) -> MoverResult<()> {
    if r1 < 1 || r2 < 1 || r1 > r2 || r2 > head {
        return Err(MoverError::IncorrectParams(format!(
            "migrate: bad revision range ({r1} to {r2}); minimum is 1 and maximum (head) is {head}"
        )));
    }
    Ok(())
}

/// Render one move for display.
pub fn format_move(m: &MoveInfo) -> String {
    format!("    {} (from {}@{})", m.to_path, m.from_path, m.copyfrom_rev)
}
