//! Element-level diff computation and display.
//!
//! Two element trees are compared per eid; content equality is structural
//! over `(parent_eid, name, payload)` with byte-exact property and text
//! comparison. Display renders one line per changed element with a status
//! letter (`M`/`A`/`D`, demoted `d` for deletions under a deleted parent)
//! and `v`/`r` flags for reparented/renamed elements.

use std::collections::{BTreeMap, BTreeSet};

use crate::branch::{nest_bid, BranchTxn, Rev, Subtree};
use crate::element::{Eid, ElementContent, ElementTree};
use crate::error::MoverResult;
use crate::relpath;
use crate::ui::UiMode;

/// Per-eid pairs of element content that differ between two trees.
///
/// A `None` side means the element is absent there.
pub fn element_differences(
    left: &ElementTree,
    right: &ElementTree,
) -> BTreeMap<Eid, (Option<ElementContent>, Option<ElementContent>)> {
    let mut diff = BTreeMap::new();
    let eids: BTreeSet<Eid> = left
        .elements
        .keys()
        .chain(right.elements.keys())
        .copied()
        .collect();
    for eid in eids {
        let l = left.get(eid);
        let r = right.get(eid);
        if l != r {
            diff.insert(eid, (l.cloned(), r.cloned()));
        }
    }
    diff
}

/// One changed element in a subtree comparison.
#[derive(Debug, Clone)]
pub struct DiffItem {
    pub eid: Eid,
    pub left: Option<ElementContent>,
    pub right: Option<ElementContent>,
    /// Path on the left side, when reachable there.
    pub relpath_left: Option<String>,
    /// Path on the right side, when reachable there.
    pub relpath_right: Option<String>,
}

impl DiffItem {
    pub fn reparented(&self) -> bool {
        matches!((&self.left, &self.right),
                 (Some(l), Some(r)) if l.parent_eid != r.parent_eid)
    }

    pub fn renamed(&self) -> bool {
        matches!((&self.left, &self.right),
                 (Some(l), Some(r)) if l.name != r.name)
    }

    pub fn modified(&self) -> bool {
        matches!((&self.left, &self.right),
                 (Some(l), Some(r)) if l.payload != r.payload)
    }

    /// The right-side path when present, else the left-side path.
    pub fn major_path(&self) -> String {
        self.relpath_right
            .clone()
            .or_else(|| self.relpath_left.clone())
            .unwrap_or_else(|| format!("e{}", self.eid))
    }
}

/// Compare two subtrees, producing a [`DiffItem`] per changed eid.
pub fn subtree_diff(left: &Subtree, right: &Subtree) -> BTreeMap<Eid, DiffItem> {
    element_differences(&left.tree, &right.tree)
        .into_iter()
        .map(|(eid, (l, r))| {
            let item = DiffItem {
                eid,
                relpath_left: l.as_ref().and_then(|_| left.tree.path_by_eid(eid)),
                relpath_right: r.as_ref().and_then(|_| right.tree.path_by_eid(eid)),
                left: l,
                right: r,
            };
            (eid, item)
        })
        .collect()
}

/// Order items for display: by eid, or by major path with all deletions
/// grouped first.
fn ordered_items(items: &BTreeMap<Eid, DiffItem>, mode: UiMode) -> Vec<&DiffItem> {
    let mut out: Vec<&DiffItem> = items.values().collect();
    if mode == UiMode::Paths {
        out.sort_by(|a, b| {
            let deleted_a = a.right.is_none();
            let deleted_b = b.right.is_none();
            deleted_b
                .cmp(&deleted_a)
                .then_with(|| a.major_path().cmp(&b.major_path()))
        });
    }
    out
}

/// `eid parent-eid/name` column used in element-notation output.
fn peid_name(content: &ElementContent) -> String {
    if content.is_root() {
        format!("{:3} {:<10}", "", ".")
    } else {
        format!("{:3}/{:<10}", content.parent_eid, content.name)
    }
}

/// ` (branch <bid>)` when the element hosts a nested branch, else empty.
fn subbranch_str(subtree: &Subtree, bid: &str, eid: Eid) -> String {
    match subtree.subbranches.get(&eid) {
        Some(sub) => format!(" (branch {})", nest_bid(bid, eid, sub.tree.root_eid)),
        None => String::new(),
    }
}

/// Render the per-element lines of one subtree comparison.
///
/// Writes `header` (prefixed) before any output if there are changes.
pub fn render_subtree_diff(
    items: &BTreeMap<Eid, DiffItem>,
    left: &Subtree,
    left_bid: &str,
    right: &Subtree,
    right_bid: &str,
    prefix: &str,
    header: Option<&str>,
    mode: UiMode,
    out: &mut Vec<String>,
) {
    if items.is_empty() {
        return;
    }
    if let Some(h) = header {
        out.push(format!("{prefix}{h}"));
    }
    for item in ordered_items(items, mode) {
        let mut status = match (&item.left, &item.right) {
            // A pure move/rename is flagged V; payload edits are M even
            // when the element also moved.
            (Some(_), Some(_)) if item.modified() => 'M',
            (Some(_), Some(_)) => 'V',
            (Some(_), None) => 'D',
            _ => 'A',
        };
        // A deletion whose parent was also deleted is less salient.
        if status == 'D' {
            if let Some(l) = &item.left {
                if let Some(parent_item) = items.get(&l.parent_eid) {
                    if parent_item.right.is_none() {
                        status = 'd';
                    }
                }
            }
        }
        let v = if item.reparented() { 'v' } else { ' ' };
        let r = if item.renamed() { 'r' } else { ' ' };
        let side = if item.left.is_some() { left } else { right };
        let side_bid = if item.left.is_some() { left_bid } else { right_bid };
        let branch_note = subbranch_str(side, side_bid, item.eid);

        match mode {
            UiMode::Paths => {
                let from = match (&item.left, item.reparented(), item.renamed()) {
                    (Some(l), false, true) => format!(" (renamed from .../{})", l.name),
                    (Some(_), true, false) => {
                        let old = item.relpath_left.clone().unwrap_or_default();
                        format!(" (moved from {}/...)", relpath::dirname(&old))
                    }
                    (Some(_), true, true) => {
                        let old = item.relpath_left.clone().unwrap_or_default();
                        format!(" (moved+renamed from {old})")
                    }
                    _ => String::new(),
                };
                out.push(format!(
                    "{prefix}{status}{v}{r} {}{branch_note}{from}",
                    item.major_path()
                ));
            }
            UiMode::Eids => {
                let new_side = item.right.as_ref().map(peid_name).unwrap_or_default();
                let from = match (&item.left, &item.right) {
                    (Some(l), Some(_)) => format!(" (from {})", peid_name(l)),
                    _ => String::new(),
                };
                out.push(format!(
                    "{prefix}{status}{v}{r} e{:<3} {new_side}{branch_note}{from}",
                    item.eid
                ));
            }
        }
    }
}

/// One side of a recursive branch comparison.
#[derive(Debug, Clone)]
pub struct DiffSide<'a> {
    pub txn: &'a BranchTxn,
    pub bid: String,
    pub eid: Eid,
    /// `None` for the uncommitted working state.
    pub rev: Option<Rev>,
}

impl<'a> DiffSide<'a> {
    pub fn new(txn: &'a BranchTxn, bid: impl Into<String>, eid: Eid, rev: Option<Rev>) -> Self {
        DiffSide {
            txn,
            bid: bid.into(),
            eid,
            rev,
        }
    }
}

struct SubtreeCtx {
    subtree: Subtree,
    bid: String,
    rrpath: String,
    rev: Option<Rev>,
}

impl SubtreeCtx {
    fn describe(&self) -> String {
        let rev = match self.rev {
            Some(r) => format!("r{r}"),
            None => "wc".to_string(),
        };
        format!(
            "{rev}:{}:e{} at /{}",
            self.bid, self.subtree.tree.root_eid, self.rrpath
        )
    }
}

/// Display differences between two branch subtrees, recursing into the
/// nested branches present on either side.
pub fn branch_diff_r(
    left: &DiffSide<'_>,
    right: &DiffSide<'_>,
    mode: UiMode,
    prefix: &str,
) -> MoverResult<Vec<String>> {
    let l = SubtreeCtx {
        subtree: left.txn.get_subtree(&left.bid, left.eid)?,
        bid: left.bid.clone(),
        rrpath: left.txn.branch_rrpath(&left.bid),
        rev: left.rev,
    };
    let r = SubtreeCtx {
        subtree: right.txn.get_subtree(&right.bid, right.eid)?,
        bid: right.bid.clone(),
        rrpath: right.txn.branch_rrpath(&right.bid),
        rev: right.rev,
    };
    let mut out = Vec::new();
    subtree_diff_r(Some(&l), Some(&r), mode, prefix, &mut out);
    Ok(out)
}

fn subtree_diff_r(
    left: Option<&SubtreeCtx>,
    right: Option<&SubtreeCtx>,
    mode: UiMode,
    prefix: &str,
    out: &mut Vec<String>,
) {
    match (left, right) {
        (None, Some(r)) => {
            out.push(format!("{prefix}--- added branch {}", r.describe()));
        }
        (Some(l), None) => {
            out.push(format!("{prefix}--- deleted branch {}", l.describe()));
        }
        (Some(l), Some(r)) => {
            let (ls, rs) = (l.describe(), r.describe());
            let header = if ls == rs {
                format!("--- diff branch {ls}")
            } else {
                format!("--- diff branch {ls} : {rs}")
            };
            let items = subtree_diff(&l.subtree, &r.subtree);
            render_subtree_diff(
                &items,
                &l.subtree,
                &l.bid,
                &r.subtree,
                &r.bid,
                prefix,
                Some(&header),
                mode,
                out,
            );
        }
        (None, None) => return,
    }

    // Recurse into each subbranch present on either side.
    let hosts: BTreeSet<Eid> = left
        .iter()
        .flat_map(|c| c.subtree.subbranches.keys())
        .chain(right.iter().flat_map(|c| c.subtree.subbranches.keys()))
        .copied()
        .collect();
    for host in hosts {
        let sub_ctx = |side: Option<&SubtreeCtx>| -> Option<SubtreeCtx> {
            let ctx = side?;
            let sub = ctx.subtree.subbranches.get(&host)?;
            let hosted_path = ctx.subtree.tree.path_by_eid(host).unwrap_or_default();
            Some(SubtreeCtx {
                subtree: sub.clone(),
                bid: nest_bid(&ctx.bid, host, sub.tree.root_eid),
                rrpath: relpath::join(&ctx.rrpath, &hosted_path),
                rev: ctx.rev,
            })
        };
        let sub_l = sub_ctx(left);
        let sub_r = sub_ctx(right);
        subtree_diff_r(sub_l.as_ref(), sub_r.as_ref(), mode, prefix, out);
    }
}
