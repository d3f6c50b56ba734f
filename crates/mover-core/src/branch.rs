//! Branches and branching transactions.
//!
//! A [`BranchState`] is one branch's mutable element tree. A [`BranchTxn`]
//! is the unit of atomic editing: an arena of branches keyed by branch id,
//! sharing one element-id allocator and one base-revision anchor.
//!
//! Branch nesting is encoded in the id string: a top-level branch is
//! `B<n>`; a branch hosted at element E of an enclosing branch appends
//! `.<E>.<root-eid>`, so the outer id and the hosting eid are recoverable
//! by splitting off the last two components.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::element::{Eid, ElementContent, ElementTree, Payload, NO_EID};
use crate::error::{MoverError, MoverResult};
use crate::relpath;

/// A revision number. Revision 0 is the empty initial revision.
pub type Rev = i64;

/// A `(revision, branch-id)` pointer into history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevBid {
    pub rev: Rev,
    pub bid: String,
}

impl RevBid {
    pub fn new(rev: Rev, bid: impl Into<String>) -> Self {
        RevBid { rev, bid: bid.into() }
    }
}

/// An element location resolved from user input: a branch, the element id
/// found there (if any), and the revision (`None` for the working state).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElRev {
    pub rev: Option<Rev>,
    pub bid: String,
    pub eid: Option<Eid>,
}

// ---------------------------------------------------------------------------
// Branch id syntax
// ---------------------------------------------------------------------------

/// Compose a top-level branch id.
pub fn top_bid(n: u32) -> String {
    format!("B{n}")
}

/// Compose the id of a branch hosted at `outer_eid` of `outer_bid`,
/// rooted at `root_eid`.
pub fn nest_bid(outer_bid: &str, outer_eid: Eid, root_eid: Eid) -> String {
    format!("{outer_bid}.{outer_eid}.{root_eid}")
}

/// Split a nested branch id into its outer id and hosting eid.
/// Returns `None` for a top-level id.
pub fn unnest_bid(bid: &str) -> Option<(&str, Eid)> {
    let (rest, _root) = bid.rsplit_once('.')?;
    let (outer, eid) = rest.rsplit_once('.')?;
    eid.parse().ok().map(|e| (outer, e))
}

/// Validate and normalize a user-entered branch id: the leading `B` is
/// optional and inserted if omitted; the result must match
/// `B[0-9]+(\.[0-9]+\.[0-9]+)*`.
pub fn normalize_bid(input: &str) -> MoverResult<String> {
    let bid = if input.starts_with('B') {
        input.to_string()
    } else {
        format!("B{input}")
    };
    let body = &bid[1..];
    let parts: Vec<&str> = body.split('.').collect();
    let well_formed = !parts.is_empty()
        && parts.len() % 2 == 1
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    if well_formed {
        Ok(bid)
    } else {
        Err(MoverError::ArgParse(format!("bad branch id '{input}'")))
    }
}

/// Map every eid component of a branch id (all components after the
/// top-level number) through `f`.
fn map_bid_eids(bid: &str, f: &impl Fn(Eid) -> Eid) -> String {
    let mut parts = bid.split('.');
    let mut out = parts.next().expect("branch id has a first component").to_string();
    for p in parts {
        let e: Eid = p.parse().expect("branch id eid component is numeric");
        out.push('.');
        out.push_str(&f(e).to_string());
    }
    out
}

// ---------------------------------------------------------------------------
// BranchState
// ---------------------------------------------------------------------------

/// One branch's mutable element tree within a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchState {
    pub bid: String,
    /// History pointer used by log traversal.
    pub predecessor: Option<RevBid>,
    pub tree: ElementTree,
}

impl BranchState {
    pub fn new(bid: impl Into<String>, root_eid: Eid, predecessor: Option<RevBid>) -> Self {
        BranchState {
            bid: bid.into(),
            predecessor,
            tree: ElementTree::new(root_eid),
        }
    }

    pub fn root_eid(&self) -> Eid {
        self.tree.root_eid
    }

    pub fn get_element(&self, eid: Eid) -> Option<&ElementContent> {
        self.tree.get(eid)
    }

    pub fn is_root_element(&self, eid: Eid) -> bool {
        eid == self.tree.root_eid
    }
}

/// A subtree view: the extracted element tree below some element, plus the
/// nested branches hosted within it, keyed by hosting eid.
#[derive(Debug, Clone)]
pub struct Subtree {
    pub tree: ElementTree,
    pub subbranches: BTreeMap<Eid, Subtree>,
    /// Predecessor of the branch this subtree was taken from.
    pub predecessor: Option<RevBid>,
}

// ---------------------------------------------------------------------------
// BranchTxn
// ---------------------------------------------------------------------------

/// A branching transaction: a set of branches, one eid allocator, one
/// base-revision anchor.
///
/// Fresh eids allocated inside the txn are transient negatives starting at
/// `-2` (`-1` is the no-parent sentinel); committing renumbers them to
/// fresh persistent non-negative ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchTxn {
    /// The revision this txn is editing against; `None` before the first
    /// commit exists or for a txn not anchored to history.
    pub base_rev: Option<Rev>,
    branches: BTreeMap<String, BranchState>,
    /// The next unused persistent (non-negative) eid.
    first_eid: Eid,
    /// Count of transient eids handed out since the last finalization.
    num_new_eids: u32,
}

impl BranchTxn {
    pub fn new(base_rev: Option<Rev>, first_eid: Eid) -> Self {
        BranchTxn {
            base_rev,
            branches: BTreeMap::new(),
            first_eid,
            num_new_eids: 0,
        }
    }

    /// The initial transaction of a fresh repository: a single top-level
    /// branch `B0` whose root element e0 is an empty directory.
    pub fn initial() -> Self {
        let mut txn = BranchTxn::new(None, 1);
        let mut b0 = BranchState::new(top_bid(0), 0, None);
        b0.tree.set(0, ElementContent::root(Payload::empty_dir()));
        txn.branches.insert(b0.bid.clone(), b0);
        txn
    }

    pub fn branches(&self) -> impl Iterator<Item = &BranchState> {
        self.branches.values()
    }

    pub fn branch(&self, bid: &str) -> Option<&BranchState> {
        self.branches.get(bid)
    }

    fn require_branch(&self, bid: &str) -> MoverResult<&BranchState> {
        self.branch(bid)
            .ok_or_else(|| MoverError::Branching(format!("branch {bid} not found")))
    }

    fn require_branch_mut(&mut self, bid: &str) -> MoverResult<&mut BranchState> {
        self.branches
            .get_mut(bid)
            .ok_or_else(|| MoverError::Branching(format!("branch {bid} not found")))
    }

    /// The next unused persistent eid.
    pub fn first_eid(&self) -> Eid {
        self.first_eid
    }

    pub fn num_new_eids(&self) -> u32 {
        self.num_new_eids
    }

    /// Allocate a fresh transient eid.
    pub fn new_eid(&mut self) -> Eid {
        self.num_new_eids += 1;
        -(self.num_new_eids as Eid + 1)
    }

    /// Ensure the allocator covers the transient id `eid`, so ids carried
    /// in from another txn (a switch merge) cannot be handed out again
    /// and are renumbered at completion.
    pub fn cover_transient_eid(&mut self, eid: Eid) {
        if eid < NO_EID {
            let needed = (-eid - 1) as u32;
            if needed > self.num_new_eids {
                self.num_new_eids = needed;
            }
        }
    }

    /// Point every branch that continues from `base` at its incarnation
    /// in `pred_rev`, for log traversal. Branches new in this txn keep
    /// their creation-time predecessor.
    pub fn update_predecessors(&mut self, pred_rev: Rev, base: &BranchTxn) {
        for (bid, state) in self.branches.iter_mut() {
            if base.branch(bid).is_some() {
                state.predecessor = Some(RevBid::new(pred_rev, bid.clone()));
            }
        }
    }

    /// The next free top-level branch number.
    pub fn next_top_branch_num(&self) -> u32 {
        self.branches
            .keys()
            .filter(|bid| !bid.contains('.'))
            .filter_map(|bid| bid[1..].parse::<u32>().ok())
            .map(|n| n + 1)
            .max()
            .unwrap_or(0)
    }

    /// The branches hosted directly within `outer_bid`, with their hosting
    /// eids.
    pub fn subbranches_of(&self, outer_bid: &str) -> Vec<(Eid, &BranchState)> {
        self.branches
            .values()
            .filter_map(|b| match unnest_bid(&b.bid) {
                Some((outer, eid)) if outer == outer_bid => Some((eid, b)),
                _ => None,
            })
            .collect()
    }

    /// The branch hosted at `eid` of `outer_bid`, if any.
    pub fn subbranch_at(&self, outer_bid: &str, eid: Eid) -> Option<&BranchState> {
        self.subbranches_of(outer_bid)
            .into_iter()
            .find(|(e, _)| *e == eid)
            .map(|(_, b)| b)
    }

    /// The enclosing branch and hosting eid of `bid`, or `None` for a
    /// top-level branch.
    pub fn outer_of(&self, bid: &str) -> Option<(&BranchState, Eid)> {
        let (outer, eid) = unnest_bid(bid)?;
        self.branch(outer).map(|b| (b, eid))
    }

    /// The repository-relative path of the branch root, accumulated
    /// through the nesting chain.
    pub fn branch_rrpath(&self, bid: &str) -> String {
        match self.outer_of(bid) {
            Some((outer, eid)) => {
                let outer_path = self.branch_rrpath(&outer.bid);
                let hosted = outer.tree.path_by_eid(eid).unwrap_or_default();
                relpath::join(&outer_path, &hosted)
            }
            None => String::new(),
        }
    }

    // -- editing algebra ---------------------------------------------------

    /// Set-or-replace the element at `eid` in branch `bid`.
    ///
    /// Checked for use by user-level actions: the parent must be mapped
    /// (unless this is the branch root), the name must not clash with a
    /// remaining sibling, and the edit must not create a parent cycle.
    pub fn alter(
        &mut self,
        bid: &str,
        eid: Eid,
        parent_eid: Eid,
        name: &str,
        payload: Payload,
    ) -> MoverResult<()> {
        {
            let branch = self.require_branch(bid)?;
            let is_root = eid == branch.root_eid();
            if is_root != (parent_eid == NO_EID) || is_root != name.is_empty() {
                return Err(MoverError::Branching(format!(
                    "alter e{eid}: root form is only valid for the branch root"
                )));
            }
            if parent_eid != NO_EID {
                if !branch.tree.contains(parent_eid) {
                    return Err(MoverError::Branching(format!(
                        "alter e{eid}: parent e{parent_eid} is not mapped"
                    )));
                }
                if let Some(other) = branch.tree.child_by_name(parent_eid, name) {
                    if other != eid {
                        return Err(MoverError::Branching(format!(
                            "alter e{eid}: '{name}' already names e{other} under e{parent_eid}"
                        )));
                    }
                }
                // Walk up from the new parent; passing through eid would
                // detach the element into a cycle.
                let branch_tree = &branch.tree;
                let mut cur = parent_eid;
                for _ in 0..=branch_tree.elements.len() {
                    if cur == eid {
                        return Err(MoverError::Branching(format!(
                            "alter e{eid}: new parent e{parent_eid} is inside its own subtree"
                        )));
                    }
                    match branch_tree.get(cur) {
                        Some(c) if c.parent_eid != NO_EID => cur = c.parent_eid,
                        _ => break,
                    }
                }
            }
        }
        self.set_element(bid, eid, ElementContent::new(parent_eid, name, payload));
        Ok(())
    }

    /// Unchecked element write, for engines that batch-apply changes whose
    /// end state is validated elsewhere.
    pub(crate) fn set_element(&mut self, bid: &str, eid: Eid, content: ElementContent) {
        if let Some(branch) = self.branches.get_mut(bid) {
            branch.tree.set(eid, content);
        }
    }

    pub(crate) fn remove_element(&mut self, bid: &str, eid: Eid) {
        if let Some(branch) = self.branches.get_mut(bid) {
            branch.tree.remove(eid);
        }
    }

    /// Remove the element at `eid`. Its children become orphans, purged at
    /// the next sequence point. Deleting the branch root is illegal.
    pub fn delete(&mut self, bid: &str, eid: Eid) -> MoverResult<()> {
        let branch = self.require_branch_mut(bid)?;
        if eid == branch.root_eid() {
            return Err(MoverError::Branching(format!(
                "cannot delete the root element of branch {bid}"
            )));
        }
        if branch.tree.remove(eid).is_none() {
            return Err(MoverError::Branching(format!(
                "delete e{eid}: element not found in branch {bid}"
            )));
        }
        Ok(())
    }

    /// Create or look up a branch. Idempotent on `new_bid`; an existing
    /// branch with a different root eid is an error.
    pub fn open_branch(
        &mut self,
        predecessor: Option<RevBid>,
        new_bid: &str,
        root_eid: Eid,
    ) -> MoverResult<&mut BranchState> {
        if let Some(existing) = self.branches.get(new_bid) {
            if existing.root_eid() != root_eid {
                return Err(MoverError::Branching(format!(
                    "branch {new_bid} already exists with root e{}",
                    existing.root_eid()
                )));
            }
        } else {
            self.branches.insert(
                new_bid.to_string(),
                BranchState::new(new_bid, root_eid, predecessor),
            );
        }
        Ok(self.branches.get_mut(new_bid).expect("branch just ensured"))
    }

    /// Extract the subtree of branch `bid` rooted at `eid`, including the
    /// nested branches hosted inside it.
    pub fn get_subtree(&self, bid: &str, eid: Eid) -> MoverResult<Subtree> {
        let branch = self.require_branch(bid)?;
        let tree = branch.tree.subtree_at(eid).ok_or_else(|| {
            MoverError::Branching(format!("element e{eid} not found in branch {bid}"))
        })?;
        let mut subbranches = BTreeMap::new();
        for (host_eid, sub) in self.subbranches_of(bid) {
            if tree.contains(host_eid) {
                subbranches.insert(host_eid, self.get_subtree(&sub.bid, sub.root_eid())?);
            }
        }
        Ok(Subtree {
            tree,
            subbranches,
            predecessor: branch.predecessor.clone(),
        })
    }

    /// Write every element of `subtree` into branch `bid` (replacing any
    /// existing mapping of the same eids) and materialize its nested
    /// branches under this branch.
    pub fn instantiate_subtree(&mut self, bid: &str, subtree: &Subtree) -> MoverResult<()> {
        self.require_branch(bid)?;
        for (&eid, content) in &subtree.tree.elements {
            self.set_element(bid, eid, content.clone());
        }
        for (&host_eid, sub) in &subtree.subbranches {
            let nested_bid = nest_bid(bid, host_eid, sub.tree.root_eid);
            let branch = self.open_branch(
                sub.predecessor.clone(),
                &nested_bid,
                sub.tree.root_eid,
            )?;
            branch.tree = ElementTree::new(sub.tree.root_eid);
            self.instantiate_subtree(&nested_bid, sub)?;
        }
        Ok(())
    }

    /// Instantiate a subtree from history into branch `bid` at
    /// `parent_eid`/`name`. Every copied element keeps its eid; existing
    /// mappings of those eids are replaced.
    pub fn copy_tree(
        &mut self,
        bid: &str,
        mut subtree: Subtree,
        parent_eid: Eid,
        name: &str,
    ) -> MoverResult<()> {
        let root_eid = subtree.tree.root_eid;
        let root = subtree
            .tree
            .get(root_eid)
            .expect("subtree carries its root")
            .clone();
        subtree
            .tree
            .set(root_eid, ElementContent::new(parent_eid, name, root.payload));
        self.instantiate_subtree(bid, &subtree)
    }

    /// Create a new branch whose initial content is a deep copy of
    /// `subtree`, preserving eids. Nested branches are branched along.
    pub fn branch_from(
        &mut self,
        subtree: &Subtree,
        new_bid: &str,
        predecessor: Option<RevBid>,
    ) -> MoverResult<()> {
        if self.branches.contains_key(new_bid) {
            return Err(MoverError::Branching(format!(
                "branch {new_bid} already exists"
            )));
        }
        let mut state = BranchState::new(new_bid, subtree.tree.root_eid, predecessor);
        state.tree = subtree.tree.clone();
        self.branches.insert(new_bid.to_string(), state);
        for (&host_eid, sub) in &subtree.subbranches {
            let nested_bid = nest_bid(new_bid, host_eid, sub.tree.root_eid);
            self.branch_from(sub, &nested_bid, sub.predecessor.clone())?;
        }
        Ok(())
    }

    /// Find the deepest branch of which `bid:relpath` is either the root
    /// element or a normal, non-subbranch element, descending through
    /// subbranch-root elements along the path.
    ///
    /// Returns the branch id reached and the eid found there (`None` when
    /// no element exists at the remaining path).
    pub fn find_nested_element(
        &self,
        bid: &str,
        relpath: &str,
    ) -> MoverResult<(String, Option<Eid>)> {
        let mut cur_bid = bid.to_string();
        let mut cur_path = relpath.to_string();
        loop {
            let branch = self.require_branch(&cur_bid)?;
            let mut descend: Option<(String, String)> = None;
            for (host_eid, sub) in self.subbranches_of(&cur_bid) {
                let host_path = match branch.tree.path_by_eid(host_eid) {
                    Some(p) if !p.is_empty() => p,
                    _ => continue,
                };
                if let Some(rest) = relpath::skip_ancestor(&host_path, &cur_path) {
                    descend = Some((sub.bid.clone(), rest.to_string()));
                    break;
                }
            }
            match descend {
                Some((next_bid, next_path)) => {
                    cur_bid = next_bid;
                    cur_path = next_path;
                }
                None => {
                    let eid = branch.tree.eid_by_path(&cur_path);
                    return Ok((cur_bid, eid));
                }
            }
        }
    }

    // -- consistency -------------------------------------------------------

    /// Flush accumulated edits into a consistent observable state: purge
    /// orphaned elements and drop branches whose hosting element is gone.
    pub fn sequence_point(&mut self) {
        loop {
            for branch in self.branches.values_mut() {
                branch.tree.purge_orphans();
            }
            let doomed: Vec<String> = self
                .branches
                .keys()
                .filter(|bid| match unnest_bid(bid) {
                    Some((outer, host_eid)) => self
                        .branches
                        .get(outer)
                        .map_or(true, |b| !b.tree.contains(host_eid)),
                    None => false,
                })
                .cloned()
                .collect();
            if doomed.is_empty() {
                return;
            }
            for bid in doomed {
                self.branches.remove(&bid);
            }
        }
    }

    /// Renumber every transient eid to a fresh persistent id: element maps,
    /// parent references, and the eid components of branch ids. Called as
    /// part of completing a commit.
    pub fn finalize_eids(&mut self) {
        if self.num_new_eids == 0 {
            return;
        }
        let first = self.first_eid;
        let remap = move |e: Eid| if e < NO_EID { first + (-e - 2) } else { e };
        let old = std::mem::take(&mut self.branches);
        for (bid, mut state) in old {
            state.tree.map_eids(remap);
            let new_bid = map_bid_eids(&bid, &remap);
            state.bid = new_bid.clone();
            self.branches.insert(new_bid, state);
        }
        self.first_eid += self.num_new_eids as Eid;
        self.num_new_eids = 0;
    }

    /// Verify the committed-state invariants of every branch.
    pub fn check_integrity(&self) -> MoverResult<()> {
        for branch in self.branches.values() {
            branch.tree.check_integrity()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Props;

    fn file(text: &[u8]) -> Payload {
        Payload::file(Props::new(), text.to_vec())
    }

    #[test]
    fn test_bid_nesting_round_trip() {
        let nested = nest_bid("B0", 3, 7);
        assert_eq!(nested, "B0.3.7");
        assert_eq!(unnest_bid(&nested), Some(("B0", 3)));
        assert_eq!(unnest_bid("B0"), None);

        let deeper = nest_bid(&nested, 9, 12);
        assert_eq!(unnest_bid(&deeper), Some(("B0.3.7", 9)));
    }

    #[test]
    fn test_normalize_bid() {
        assert_eq!(normalize_bid("0").unwrap(), "B0");
        assert_eq!(normalize_bid("B0.3.7").unwrap(), "B0.3.7");
        assert!(normalize_bid("B0.3").is_err());
        assert!(normalize_bid("Bx").is_err());
    }

    #[test]
    fn test_initial_txn() {
        let txn = BranchTxn::initial();
        let b0 = txn.branch("B0").unwrap();
        assert_eq!(b0.root_eid(), 0);
        assert!(b0.get_element(0).unwrap().is_root());
        assert_eq!(txn.first_eid(), 1);
        assert!(txn.check_integrity().is_ok());
    }

    #[test]
    fn test_new_eids_are_transient_negatives() {
        let mut txn = BranchTxn::initial();
        assert_eq!(txn.new_eid(), -2);
        assert_eq!(txn.new_eid(), -3);
        assert_eq!(txn.num_new_eids(), 2);
    }

    #[test]
    fn test_alter_checks_parent_and_name() {
        let mut txn = BranchTxn::initial();
        let e1 = txn.new_eid();
        txn.alter("B0", e1, 0, "A", Payload::empty_dir()).unwrap();

        let e2 = txn.new_eid();
        // Unknown parent.
        assert!(txn.alter("B0", e2, 42, "x", Payload::empty_dir()).is_err());
        // Sibling name clash with a different element.
        assert!(txn.alter("B0", e2, 0, "A", Payload::empty_dir()).is_err());
        // Re-altering the same element under its own name is fine.
        txn.alter("B0", e1, 0, "A", file(b"now a file")).unwrap();
    }

    #[test]
    fn test_alter_rejects_cycle() {
        let mut txn = BranchTxn::initial();
        let a = txn.new_eid();
        txn.alter("B0", a, 0, "A", Payload::empty_dir()).unwrap();
        let b = txn.new_eid();
        txn.alter("B0", b, a, "B", Payload::empty_dir()).unwrap();
        // Moving A under its own child B must fail.
        let err = txn.alter("B0", a, b, "A", Payload::empty_dir());
        assert!(err.is_err());
    }

    #[test]
    fn test_delete_root_is_illegal() {
        let mut txn = BranchTxn::initial();
        assert!(txn.delete("B0", 0).is_err());
    }

    #[test]
    fn test_delete_leaves_orphans_until_sequence_point() {
        let mut txn = BranchTxn::initial();
        let a = txn.new_eid();
        txn.alter("B0", a, 0, "A", Payload::empty_dir()).unwrap();
        let f = txn.new_eid();
        txn.alter("B0", f, a, "f", file(b"x")).unwrap();

        txn.delete("B0", a).unwrap();
        assert!(txn.branch("B0").unwrap().tree.contains(f));
        txn.sequence_point();
        assert!(!txn.branch("B0").unwrap().tree.contains(f));
    }

    #[test]
    fn test_open_branch_idempotent() {
        let mut txn = BranchTxn::initial();
        txn.open_branch(None, "B0.1.2", 2).unwrap();
        txn.open_branch(None, "B0.1.2", 2).unwrap();
        assert!(txn.open_branch(None, "B0.1.2", 5).is_err());
    }

    #[test]
    fn test_branch_preserves_eids() {
        let mut txn = BranchTxn::initial();
        let a = txn.new_eid();
        txn.alter("B0", a, 0, "A", Payload::empty_dir()).unwrap();
        let f = txn.new_eid();
        txn.alter("B0", f, a, "f", file(b"data")).unwrap();

        let subtree = txn.get_subtree("B0", a).unwrap();
        txn.branch_from(&subtree, "B1", Some(RevBid::new(1, "B0"))).unwrap();

        let b1 = txn.branch("B1").unwrap();
        assert_eq!(b1.root_eid(), a);
        assert_eq!(b1.tree.eid_by_path("f"), Some(f));
        assert_eq!(
            b1.get_element(f).unwrap().payload,
            txn.branch("B0").unwrap().get_element(f).unwrap().payload
        );
    }

    #[test]
    fn test_copy_tree_replaces_existing_eids() {
        let mut txn = BranchTxn::initial();
        let a = txn.new_eid();
        txn.alter("B0", a, 0, "A", file(b"v1")).unwrap();

        let subtree = txn.get_subtree("B0", a).unwrap();
        txn.copy_tree("B0", subtree, 0, "C").unwrap();

        // Copy preserves the eid, so "A" is replaced by "C".
        let b0 = txn.branch("B0").unwrap();
        assert_eq!(b0.tree.eid_by_path("C"), Some(a));
        assert_eq!(b0.tree.eid_by_path("A"), None);
    }

    #[test]
    fn test_sequence_point_drops_branch_with_deleted_host() {
        let mut txn = BranchTxn::initial();
        let host = txn.new_eid();
        txn.alter("B0", host, 0, "sub", Payload::SubbranchRoot).unwrap();
        let inner_root = txn.new_eid();
        let nested = nest_bid("B0", host, inner_root);
        txn.open_branch(None, &nested, inner_root).unwrap();
        txn.alter(&nested, inner_root, NO_EID, "", Payload::empty_dir())
            .unwrap();

        txn.delete("B0", host).unwrap();
        txn.sequence_point();
        assert!(txn.branch(&nested).is_none());
    }

    #[test]
    fn test_finalize_renumbers_eids_and_bids() {
        let mut txn = BranchTxn::initial();
        let host = txn.new_eid(); // -2
        txn.alter("B0", host, 0, "sub", Payload::SubbranchRoot).unwrap();
        let inner_root = txn.new_eid(); // -3
        let nested = nest_bid("B0", host, inner_root);
        txn.open_branch(None, &nested, inner_root).unwrap();
        txn.alter(&nested, inner_root, NO_EID, "", Payload::empty_dir())
            .unwrap();

        txn.finalize_eids();

        assert_eq!(txn.num_new_eids(), 0);
        assert_eq!(txn.first_eid(), 3);
        let b0 = txn.branch("B0").unwrap();
        assert_eq!(b0.tree.eid_by_path("sub"), Some(1));
        let renamed = nest_bid("B0", 1, 2);
        let inner = txn.branch(&renamed).expect("nested branch renumbered");
        assert_eq!(inner.root_eid(), 2);
        assert!(txn.check_integrity().is_ok());
    }

    #[test]
    fn test_next_top_branch_num() {
        let mut txn = BranchTxn::initial();
        assert_eq!(txn.next_top_branch_num(), 1);
        let subtree = txn.get_subtree("B0", 0).unwrap();
        txn.branch_from(&subtree, "B1", None).unwrap();
        assert_eq!(txn.next_top_branch_num(), 2);
    }

    #[test]
    fn test_branch_rrpath() {
        let mut txn = BranchTxn::initial();
        let d = txn.new_eid();
        txn.alter("B0", d, 0, "proj", Payload::empty_dir()).unwrap();
        let host = txn.new_eid();
        txn.alter("B0", host, d, "trunk", Payload::SubbranchRoot).unwrap();
        let inner_root = txn.new_eid();
        let nested = nest_bid("B0", host, inner_root);
        txn.open_branch(None, &nested, inner_root).unwrap();
        txn.alter(&nested, inner_root, NO_EID, "", Payload::empty_dir())
            .unwrap();

        assert_eq!(txn.branch_rrpath("B0"), "");
        assert_eq!(txn.branch_rrpath(&nested), "proj/trunk");
    }
}
