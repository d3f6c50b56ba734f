//! Replaying the delta between two branch states onto a third.
//!
//! Replay rewrites a destination branch so that it reflects the changes
//! from a left state to a right state, recursing into nested branches.
//! It is the workhorse behind commit (base -> working into the commit
//! txn) and revert (working -> base into the working branch).

use std::collections::BTreeSet;

use crate::branch::{nest_bid, BranchTxn, Subtree};
use crate::diff::element_differences;
use crate::element::{Eid, ElementTree};
use crate::error::{MoverError, MoverResult};

/// Rewrite the elements of `edit_bid` to carry the `left -> right` delta.
///
/// A `None` side is treated as an empty tree. Writes are batch-applied
/// without per-edit checks; the end state is made consistent by the next
/// sequence point.
pub fn subtree_replay(
    txn: &mut BranchTxn,
    edit_bid: &str,
    left: Option<&ElementTree>,
    right: Option<&ElementTree>,
) -> MoverResult<()> {
    let empty_left;
    let empty_right;
    let left = match left {
        Some(t) => t,
        None => {
            empty_left = ElementTree::new(0);
            &empty_left
        }
    };
    let right = match right {
        Some(t) => t,
        None => {
            empty_right = ElementTree::new(0);
            &empty_right
        }
    };

    for (eid, (l, r)) in element_differences(left, right) {
        match (l, r) {
            (_, Some(content)) => txn.set_element(edit_bid, eid, content),
            (Some(_), None) => txn.remove_element(edit_bid, eid),
            (None, None) => {}
        }
    }
    Ok(())
}

/// Replay `left -> right` into `edit_bid`, recursing into the union of
/// the nested branches of both sides.
///
/// At least one side must be present; when both are, their root eids must
/// agree. A branch present only on the left is dropped implicitly: the
/// element hosting it was deleted by the element replay above it.
pub fn replay(
    txn: &mut BranchTxn,
    edit_bid: &str,
    left: Option<&Subtree>,
    right: Option<&Subtree>,
) -> MoverResult<()> {
    match (left, right) {
        (None, None) => {
            return Err(MoverError::IncorrectParams(
                "replay requires at least one side".to_string(),
            ))
        }
        (Some(l), Some(r)) if l.tree.root_eid != r.tree.root_eid => {
            return Err(MoverError::Branching(format!(
                "replay: left root e{} does not match right root e{}",
                l.tree.root_eid, r.tree.root_eid
            )))
        }
        _ => {}
    }

    if let Some(r) = right {
        subtree_replay(txn, edit_bid, left.map(|l| &l.tree), Some(&r.tree))?;

        let hosts: BTreeSet<Eid> = left
            .iter()
            .flat_map(|l| l.subbranches.keys())
            .chain(r.subbranches.keys())
            .copied()
            .collect();
        for host in hosts {
            let left_sub = left.and_then(|l| l.subbranches.get(&host));
            let right_sub = r.subbranches.get(&host);
            if let Some(rs) = right_sub {
                let nested = nest_bid(edit_bid, host, rs.tree.root_eid);
                txn.open_branch(rs.predecessor.clone(), &nested, rs.tree.root_eid)?;
                replay(txn, &nested, left_sub, Some(rs))?;
            }
        }
    }
    Ok(())
}

/// True when `txn` differs from `base`: a branch disappeared or appeared,
/// or any shared branch's elements differ.
pub fn txn_is_changed(txn: &BranchTxn, base: &BranchTxn) -> bool {
    for base_branch in base.branches() {
        if txn.branch(&base_branch.bid).is_none() {
            return true;
        }
    }
    for edit_branch in txn.branches() {
        match base.branch(&edit_branch.bid) {
            None => return true,
            Some(base_branch) => {
                if !element_differences(&edit_branch.tree, &base_branch.tree).is_empty() {
                    return true;
                }
            }
        }
    }
    false
}

/// Allocate as many fresh eids in `dst` as `src` has allocated, so that
/// transient ids carried across by replay are covered by `dst`'s
/// allocator and renumbered at completion.
pub fn allocate_eids(dst: &mut BranchTxn, src: &BranchTxn) {
    for _ in 0..src.num_new_eids() {
        dst.new_eid();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Payload;

    fn edited_txn() -> (BranchTxn, BranchTxn) {
        // base: e0 { A(e1) { f(e2) } }; edit: f moved to root as g, B added.
        let mut base = BranchTxn::initial();
        let a = base.new_eid();
        base.alter("B0", a, 0, "A", Payload::empty_dir()).unwrap();
        let f = base.new_eid();
        base.alter("B0", f, a, "f", Payload::file(Default::default(), b"x".to_vec()))
            .unwrap();
        base.finalize_eids();

        let mut edit = base.clone();
        edit.base_rev = Some(1);
        let f = edit.branch("B0").unwrap().tree.eid_by_path("A/f").unwrap();
        edit.alter("B0", f, 0, "g", Payload::file(Default::default(), b"x".to_vec()))
            .unwrap();
        let b = edit.new_eid();
        edit.alter("B0", b, 0, "B", Payload::empty_dir()).unwrap();
        (base, edit)
    }

    #[test]
    fn test_replay_carries_delta() {
        let (base, edit) = edited_txn();
        let mut dst = base.clone();

        let left = base.get_subtree("B0", 0).unwrap();
        let right = edit.get_subtree("B0", 0).unwrap();
        replay(&mut dst, "B0", Some(&left), Some(&right)).unwrap();
        dst.sequence_point();

        let got = dst.get_subtree("B0", 0).unwrap();
        assert!(element_differences(&got.tree, &right.tree).is_empty());
    }

    #[test]
    fn test_replay_is_idempotent() {
        let (base, edit) = edited_txn();
        let mut dst = base.clone();
        let left = base.get_subtree("B0", 0).unwrap();
        let right = edit.get_subtree("B0", 0).unwrap();

        replay(&mut dst, "B0", Some(&left), Some(&right)).unwrap();
        let once = dst.get_subtree("B0", 0).unwrap();
        replay(&mut dst, "B0", Some(&left), Some(&right)).unwrap();
        let twice = dst.get_subtree("B0", 0).unwrap();
        assert!(element_differences(&once.tree, &twice.tree).is_empty());
    }

    #[test]
    fn test_replay_inverse_restores() {
        let (base, edit) = edited_txn();
        let mut dst = base.clone();
        let left = base.get_subtree("B0", 0).unwrap();
        let right = edit.get_subtree("B0", 0).unwrap();

        replay(&mut dst, "B0", Some(&left), Some(&right)).unwrap();
        replay(&mut dst, "B0", Some(&right), Some(&left)).unwrap();
        dst.sequence_point();

        let got = dst.get_subtree("B0", 0).unwrap();
        assert!(element_differences(&got.tree, &left.tree).is_empty());
    }

    #[test]
    fn test_replay_recurses_into_new_subbranch() {
        let mut base = BranchTxn::initial();
        base.finalize_eids();
        let mut edit = base.clone();

        let host = edit.new_eid();
        edit.alter("B0", host, 0, "sub", Payload::SubbranchRoot).unwrap();
        let inner = edit.new_eid();
        let nested = nest_bid("B0", host, inner);
        edit.open_branch(None, &nested, inner).unwrap();
        edit.alter(&nested, inner, crate::element::NO_EID, "", Payload::empty_dir())
            .unwrap();

        let mut dst = base.clone();
        allocate_eids(&mut dst, &edit);
        let left = base.get_subtree("B0", 0).unwrap();
        let right = edit.get_subtree("B0", 0).unwrap();
        replay(&mut dst, "B0", Some(&left), Some(&right)).unwrap();

        assert!(dst.branch(&nested).is_some());
        assert_eq!(dst.branch(&nested).unwrap().root_eid(), inner);
    }

    #[test]
    fn test_txn_is_changed() {
        let (base, edit) = edited_txn();
        assert!(!txn_is_changed(&base.clone(), &base));
        assert!(txn_is_changed(&edit, &base));
    }

    #[test]
    fn test_allocate_eids_matches_count() {
        let (_, edit) = edited_txn();
        let mut dst = BranchTxn::initial();
        allocate_eids(&mut dst, &edit);
        assert_eq!(dst.num_new_eids(), edit.num_new_eids());
    }
}
