//! The action vocabulary.
//!
//! Each action is parsed from words (`mkdir PATH`, `mv SRC DST`, ...),
//! resolved against the working copy, checked against its preconditions,
//! and executed. Element arguments use the selector syntax
//! `[^B<branch-id>/]<relpath>[@<revision>]`; the default branch is the
//! working branch, or the base branch when a revision is given.

use std::fs;
use std::io::Read;

use crate::branch::{nest_bid, normalize_bid, top_bid, BranchState, BranchTxn, ElRev, Rev, RevBid};
use crate::diff::{self, DiffSide};
use crate::element::{display_child_path, Eid, ElementContent, Payload, Props, NO_EID};
use crate::error::{MoverError, MoverResult};
use crate::merge::{merge_trees, MergeOutcome};
use crate::relpath;
use crate::replay::subtree_replay;
use crate::ui::{UiMode, UserIo};
use crate::wc::WorkingCopy;

// ---------------------------------------------------------------------------
// Action table
// ---------------------------------------------------------------------------

/// One entry of the action table: name, argument count, and help.
pub struct ActionDefn {
    pub name: &'static str,
    pub num_args: usize,
    pub args_help: &'static str,
    pub help: &'static str,
}

pub const ACTION_DEFNS: &[ActionDefn] = &[
    ActionDefn { name: "info-wc", num_args: 0, args_help: "",
        help: "print information about the WC" },
    ActionDefn { name: "branches", num_args: 1, args_help: "PATH",
        help: "list all branches rooted at the same element as PATH" },
    ActionDefn { name: "ls-br-r", num_args: 0, args_help: "",
        help: "list all branches, recursively" },
    ActionDefn { name: "ls", num_args: 1, args_help: "PATH",
        help: "list elements in the branch found at PATH" },
    ActionDefn { name: "log", num_args: 2, args_help: "FROM@REV TO@REV",
        help: "show per-revision diffs between FROM and TO" },
    ActionDefn { name: "tbranch", num_args: 1, args_help: "SRC",
        help: "branch the branch-root or branch-subtree at SRC to make a new top-level branch" },
    ActionDefn { name: "branch", num_args: 2, args_help: "SRC DST",
        help: "branch the branch-root or branch-subtree at SRC to make a new branch at DST" },
    ActionDefn { name: "branch-into", num_args: 2, args_help: "SRC DST",
        help: "make a branch of the existing subtree SRC appear at DST as part of the existing branch that contains DST" },
    ActionDefn { name: "mkbranch", num_args: 1, args_help: "ROOT",
        help: "make a directory that's the root of a new subbranch" },
    ActionDefn { name: "diff", num_args: 2, args_help: "LEFT@REV RIGHT@REV",
        help: "show differences from subtree LEFT to subtree RIGHT" },
    ActionDefn { name: "merge", num_args: 3, args_help: "FROM TO YCA@REV",
        help: "3-way merge YCA->FROM into TO" },
    ActionDefn { name: "cp", num_args: 3, args_help: "REV SRC DST",
        help: "copy SRC@REV to DST" },
    ActionDefn { name: "mv", num_args: 2, args_help: "SRC DST",
        help: "move SRC to DST" },
    ActionDefn { name: "rm", num_args: 1, args_help: "PATH",
        help: "delete PATH" },
    ActionDefn { name: "copy-and-delete", num_args: 2, args_help: "SRC DST",
        help: "copy-and-delete SRC to DST" },
    ActionDefn { name: "branch-and-delete", num_args: 2, args_help: "SRC DST",
        help: "branch-and-delete SRC to DST" },
    ActionDefn { name: "branch-into-and-delete", num_args: 2, args_help: "SRC DST",
        help: "merge-and-delete SRC to DST" },
    ActionDefn { name: "mkdir", num_args: 1, args_help: "PATH",
        help: "create new directory PATH" },
    ActionDefn { name: "put", num_args: 2, args_help: "LOCAL_FILE PATH",
        help: "add or modify file PATH with text copied from LOCAL_FILE (use \"-\" to read from standard input)" },
    ActionDefn { name: "cat", num_args: 1, args_help: "PATH",
        help: "display text (for a file) and props (if any) of PATH" },
    ActionDefn { name: "commit", num_args: 0, args_help: "",
        help: "commit the changes" },
    ActionDefn { name: "update", num_args: 1, args_help: ".@REV",
        help: "update to revision REV, keeping local changes" },
    ActionDefn { name: "switch", num_args: 1, args_help: "TARGET[@REV]",
        help: "switch to another branch and/or revision, keeping local changes" },
    ActionDefn { name: "status", num_args: 0, args_help: "",
        help: "same as 'diff .@base .'" },
    ActionDefn { name: "revert", num_args: 0, args_help: "",
        help: "revert all uncommitted changes" },
    ActionDefn { name: "migrate", num_args: 1, args_help: ".@REV",
        help: "migrate changes from non-move-tracking revision" },
];

/// The per-action usage lines shown by `help`.
pub fn usage_lines() -> Vec<String> {
    ACTION_DEFNS
        .iter()
        .map(|a| format!("  {:<30} : {}", format!("{} {}", a.name, a.args_help), a.help))
        .collect()
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// A revision selector in user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevSpec {
    Head,
    Base,
    Committed,
    Number(Rev),
}

/// `[^B<branch-id>/]<relpath>[@<revision>]` parsed, unresolved.
#[derive(Debug, Clone)]
pub struct Selector {
    pub bid: Option<String>,
    pub relpath: String,
    pub rev: Option<RevSpec>,
}

fn parse_rev_word(word: &str) -> MoverResult<RevSpec> {
    match word.to_ascii_lowercase().as_str() {
        "head" => Ok(RevSpec::Head),
        "base" => Ok(RevSpec::Base),
        "committed" => Ok(RevSpec::Committed),
        _ => word.parse().map(RevSpec::Number).map_err(|_| {
            MoverError::IncorrectParams(format!(
                "'{word}': revision specifier must be a number or 'head', 'base' or 'committed'"
            ))
        }),
    }
}

/// Parse one selector word.
pub fn parse_selector(input: &str) -> MoverResult<Selector> {
    let (body, rev) = match input.rsplit_once('@') {
        Some((body, rev_word)) => (body, Some(parse_rev_word(rev_word)?)),
        None => (input, None),
    };
    let (bid, path) = match body.strip_prefix('^') {
        Some(rest) => {
            let (bid_part, path_part) = match rest.split_once('/') {
                Some((b, p)) => (b, p),
                None => (rest, ""),
            };
            (Some(normalize_bid(bid_part)?), path_part)
        }
        None => (None, body),
    };
    Ok(Selector {
        bid,
        relpath: relpath::canonicalize(path),
        rev,
    })
}

// ---------------------------------------------------------------------------
// Parsed actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ActionKind {
    InfoWc,
    Diff(Selector, Selector),
    Status,
    Log(Selector, Selector),
    ListBranches(Selector),
    ListBranchesR,
    Ls(Selector),
    TBranch(Selector),
    Branch(Selector, Selector),
    BranchInto(Selector, Selector),
    MkBranch(Selector),
    Merge(Selector, Selector, Selector),
    Mv(Selector, Selector),
    Cp(Selector, Selector),
    Rm(Selector),
    CopyAndDelete(Selector, Selector),
    BranchAndDelete(Selector, Selector),
    BranchIntoAndDelete(Selector, Selector),
    MkDir(Selector),
    Put(String, Selector),
    Cat(Selector),
    Commit,
    Update(Selector),
    Switch(Selector),
    Revert,
    Migrate(Selector),
}

/// An action together with the words it was parsed from (the audit trail
/// and default log message use the original spelling).
#[derive(Debug, Clone)]
pub struct ParsedAction {
    pub text: String,
    pub kind: ActionKind,
}

/// Split a flat word list into actions, consuming each action's name and
/// argument count from the table.
pub fn parse_actions(words: &[String]) -> MoverResult<Vec<ParsedAction>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < words.len() {
        let name = &words[i];
        let defn = ACTION_DEFNS
            .iter()
            .find(|d| d.name == name.as_str())
            .ok_or_else(|| MoverError::ArgParse(format!("'{name}' is not an action")))?;
        let args = &words[i + 1..];
        if args.len() < defn.num_args {
            return Err(MoverError::ArgParse(format!(
                "insufficient arguments for '{}': usage: {} {}",
                defn.name, defn.name, defn.args_help
            )));
        }
        let args = &args[..defn.num_args];
        let sel = |k: usize| parse_selector(&args[k]);
        let kind = match defn.name {
            "info-wc" => ActionKind::InfoWc,
            "branches" => ActionKind::ListBranches(sel(0)?),
            "ls-br-r" => ActionKind::ListBranchesR,
            "ls" => ActionKind::Ls(sel(0)?),
            "log" => ActionKind::Log(sel(0)?, sel(1)?),
            "tbranch" => ActionKind::TBranch(sel(0)?),
            "branch" => ActionKind::Branch(sel(0)?, sel(1)?),
            "branch-into" => ActionKind::BranchInto(sel(0)?, sel(1)?),
            "mkbranch" => ActionKind::MkBranch(sel(0)?),
            "diff" => ActionKind::Diff(sel(0)?, sel(1)?),
            "merge" => ActionKind::Merge(sel(0)?, sel(1)?, sel(2)?),
            "cp" => {
                // The first word is the source revision.
                let rev = parse_rev_word(&args[0])?;
                let mut src = sel(1)?;
                src.rev = Some(rev);
                ActionKind::Cp(src, sel(2)?)
            }
            "mv" => ActionKind::Mv(sel(0)?, sel(1)?),
            "rm" => ActionKind::Rm(sel(0)?),
            "copy-and-delete" => ActionKind::CopyAndDelete(sel(0)?, sel(1)?),
            "branch-and-delete" => ActionKind::BranchAndDelete(sel(0)?, sel(1)?),
            "branch-into-and-delete" => ActionKind::BranchIntoAndDelete(sel(0)?, sel(1)?),
            "mkdir" => ActionKind::MkDir(sel(0)?),
            "put" => ActionKind::Put(args[0].clone(), sel(1)?),
            "cat" => ActionKind::Cat(sel(0)?),
            "commit" => ActionKind::Commit,
            "update" => ActionKind::Update(sel(0)?),
            "switch" => ActionKind::Switch(sel(0)?),
            "status" => ActionKind::Status,
            "revert" => ActionKind::Revert,
            "migrate" => ActionKind::Migrate(sel(0)?),
            _ => unreachable!("every table entry is matched"),
        };
        out.push(ParsedAction {
            text: words[i..i + 1 + defn.num_args].join(" "),
            kind,
        });
        i += 1 + defn.num_args;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Argument resolution and preconditions
// ---------------------------------------------------------------------------

/// A selector resolved against the working copy.
#[derive(Debug, Clone)]
struct Arg {
    el_rev: ElRev,
    parent_el_rev: ElRev,
    path_name: String,
    revnum: Option<Rev>,
    relpath: String,
}

fn resolve_rev(wc: &WorkingCopy, spec: RevSpec) -> Rev {
    match spec {
        RevSpec::Head => wc.head_revision,
        RevSpec::Base | RevSpec::Committed => wc.base.revision,
        RevSpec::Number(n) => n,
    }
}

fn resolve(wc: &WorkingCopy, sel: &Selector) -> MoverResult<Arg> {
    let revnum = sel.rev.map(|r| resolve_rev(wc, r));
    let bid = sel.bid.as_deref();
    let el_rev = wc.find_el_rev(revnum, bid, &sel.relpath)?;
    let parent_el_rev = wc.find_el_rev(revnum, bid, relpath::dirname(&sel.relpath))?;
    Ok(Arg {
        el_rev,
        parent_el_rev,
        path_name: relpath::basename(&sel.relpath).to_string(),
        revnum,
        relpath: sel.relpath.clone(),
    })
}

fn verify_rev_specified(op: &str, arg: &Arg) -> MoverResult<()> {
    if arg.el_rev.rev.is_none() {
        return Err(MoverError::Branching(format!(
            "{op}: '{}': revision number required",
            arg.relpath
        )));
    }
    Ok(())
}

fn verify_rev_unspecified(op: &str, arg: &Arg) -> MoverResult<()> {
    if arg.el_rev.rev.is_some() {
        return Err(MoverError::Branching(format!(
            "{op}: '{}@...': revision number not allowed",
            arg.relpath
        )));
    }
    Ok(())
}

fn verify_eid_exists(op: &str, arg: &Arg) -> MoverResult<()> {
    if arg.el_rev.eid.is_none() {
        return Err(MoverError::Branching(format!(
            "{op}: element not found at path '{}{}'",
            arg.relpath,
            if arg.revnum.is_some() { "@..." } else { "" }
        )));
    }
    Ok(())
}

fn verify_eid_nonexistent(op: &str, arg: &Arg) -> MoverResult<()> {
    if arg.el_rev.eid.is_some() {
        return Err(MoverError::Branching(format!(
            "{op}: element already exists at path '{}'",
            arg.relpath
        )));
    }
    Ok(())
}

fn verify_parent_eid_exists(op: &str, arg: &Arg) -> MoverResult<()> {
    if arg.parent_el_rev.eid.is_none() {
        return Err(MoverError::Branching(format!(
            "{op}: element not found at path '{}'",
            relpath::dirname(&arg.relpath)
        )));
    }
    Ok(())
}

/// The repository-relative path of an element, through branch nesting.
fn full_path(wc: &WorkingCopy, el_rev: &ElRev) -> MoverResult<String> {
    let txn = wc.el_rev_txn(el_rev)?;
    let branch = txn
        .branch(&el_rev.bid)
        .ok_or_else(|| MoverError::Branching(format!("branch {} not found", el_rev.bid)))?;
    let inner = el_rev
        .eid
        .and_then(|e| branch.tree.path_by_eid(e))
        .unwrap_or_default();
    Ok(relpath::join(&txn.branch_rrpath(&el_rev.bid), &inner))
}

fn verify_not_in_self(op: &str, src: &Arg, dst: &Arg, wc: &WorkingCopy) -> MoverResult<()> {
    let src_path = full_path(wc, &src.el_rev)?;
    let dst_parent_path = full_path(wc, &dst.parent_el_rev)?;
    if relpath::skip_ancestor(&src_path, &dst_parent_path).is_some() {
        return Err(MoverError::Branching(format!(
            "{op}: the specified target is nested inside the source"
        )));
    }
    Ok(())
}

/// If `el_rev` names the root element of a nested branch, redirect it to
/// the hosting element of the outer branch. The root of a top-level
/// branch cannot be deleted or moved.
fn point_to_outer_element_instead(
    wc: &WorkingCopy,
    el_rev: &mut ElRev,
    op: &str,
) -> MoverResult<()> {
    let txn = wc.el_rev_txn(el_rev)?;
    let branch = txn
        .branch(&el_rev.bid)
        .ok_or_else(|| MoverError::Branching(format!("branch {} not found", el_rev.bid)))?;
    if el_rev.eid == Some(branch.root_eid()) {
        match txn.outer_of(&el_rev.bid) {
            Some((outer, host_eid)) => {
                el_rev.bid = outer.bid.clone();
                el_rev.eid = Some(host_eid);
            }
            None => {
                return Err(MoverError::Branching(format!(
                    "{op}: cannot delete or move a top-level branch"
                )))
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Listing renderers
// ---------------------------------------------------------------------------

fn subbranch_note(txn: &BranchTxn, bid: &str, eid: Eid) -> String {
    match txn.subbranch_at(bid, eid) {
        Some(sub) => format!(" (branch {})", sub.bid),
        None => String::new(),
    }
}

/// List reachable elements of a branch in path notation.
fn list_branch_elements(txn: &BranchTxn, branch: &BranchState) -> Vec<String> {
    let mut paths: Vec<(String, Eid)> = branch
        .tree
        .elements
        .keys()
        .filter_map(|&eid| branch.tree.path_by_eid(eid).map(|p| (p, eid)))
        .collect();
    paths.sort();
    paths
        .into_iter()
        .map(|(p, eid)| {
            let shown = if p.is_empty() { "." } else { p.as_str() };
            format!(
                "    {:<20}{}",
                shown,
                subbranch_note(txn, &branch.bid, eid)
            )
        })
        .collect()
}

const ELEMENTS_BY_EID_HEADER: [&str; 2] =
    ["    eid  parent-eid/name", "    ---  ----------/----"];

/// List all elements of a branch in element notation.
fn list_branch_elements_by_eid(txn: &BranchTxn, branch: &BranchState) -> Vec<String> {
    let mut out: Vec<String> = ELEMENTS_BY_EID_HEADER.iter().map(|s| s.to_string()).collect();
    for (&eid, content) in &branch.tree.elements {
        let peid = if content.is_root() {
            format!("{:3} {:<10}", "", ".")
        } else {
            format!("{:3}/{:<10}", content.parent_eid, content.name)
        };
        out.push(format!(
            "    e{eid:<3} {peid}{}",
            subbranch_note(txn, &branch.bid, eid)
        ));
    }
    out
}

fn branch_id_header(mode: UiMode) -> [String; 2] {
    match mode {
        UiMode::Paths => [
            "  branch-id  root-path".to_string(),
            "  ---------  ---------".to_string(),
        ],
        UiMode::Eids => [
            "  branch-id  branch-name  root-eid".to_string(),
            "  ---------  -----------  --------".to_string(),
        ],
    }
}

fn branch_id_str(txn: &BranchTxn, branch: &BranchState, mode: UiMode) -> String {
    match mode {
        UiMode::Paths => format!("{:<10} /{}", branch.bid, txn.branch_rrpath(&branch.bid)),
        UiMode::Eids => {
            let outer_name = txn
                .outer_of(&branch.bid)
                .and_then(|(outer, host_eid)| outer.get_element(host_eid))
                .map(|el| el.name.clone())
                .unwrap_or_else(|| "/".to_string());
            format!(
                "{:<10} {:<12} root=e{}",
                branch.bid,
                outer_name,
                branch.root_eid()
            )
        }
    }
}

fn list_branch(
    txn: &BranchTxn,
    branch: &BranchState,
    with_elements: bool,
    mode: UiMode,
    out: &mut Vec<String>,
) {
    out.push(format!("  {}", branch_id_str(txn, branch, mode)));
    if with_elements {
        match mode {
            UiMode::Paths => out.extend(list_branch_elements(txn, branch)),
            UiMode::Eids => out.extend(list_branch_elements_by_eid(txn, branch)),
        }
        out.push(String::new());
    }
}

/// List all branches rooted at `eid`, then those containing it without
/// being rooted at it.
fn list_branches_at_eid(txn: &BranchTxn, eid: Eid, mode: UiMode) -> Vec<String> {
    let mut out: Vec<String> = branch_id_header(mode).to_vec();
    for branch in txn.branches() {
        if branch.root_eid() == eid {
            list_branch(txn, branch, false, mode, &mut out);
        }
    }
    let mut printed_header = false;
    for branch in txn.branches() {
        if branch.root_eid() == eid || branch.get_element(eid).is_none() {
            continue;
        }
        if !printed_header {
            out.push(match mode {
                UiMode::Paths => "branches containing but not rooted at that element:".to_string(),
                UiMode::Eids => format!("branches containing but not rooted at e{eid}:"),
            });
            printed_header = true;
        }
        list_branch(txn, branch, false, mode, &mut out);
    }
    out
}

fn list_all_branches(txn: &BranchTxn, with_elements: bool, mode: UiMode) -> Vec<String> {
    let mut out = vec!["branches:".to_string()];
    for branch in txn.branches() {
        list_branch(txn, branch, with_elements, mode, &mut out);
    }
    out
}

// ---------------------------------------------------------------------------
// Primitive action bodies
// ---------------------------------------------------------------------------

fn do_copy(
    wc: &mut WorkingCopy,
    from: &ElRev,
    to_bid: &str,
    to_parent_eid: Eid,
    new_name: &str,
) -> MoverResult<()> {
    let from_eid = from.eid.expect("caller verified the source exists");
    let from_path = full_path(wc, from)?;
    let subtree = wc.el_rev_txn(from)?.get_subtree(&from.bid, from_eid)?;
    wc.edit_txn
        .copy_tree(to_bid, subtree, to_parent_eid, new_name)?;
    let to_tree = &wc
        .edit_txn
        .branch(to_bid)
        .expect("destination branch exists")
        .tree;
    wc.notify.verbose(&format!(
        "A+   {} (from {})",
        display_child_path(to_tree, to_parent_eid, new_name),
        from_path
    ));
    wc.mark_edited();
    Ok(())
}

fn do_delete(wc: &mut WorkingCopy, bid: &str, eid: Eid) -> MoverResult<()> {
    let path = {
        let txn = &wc.edit_txn;
        let branch = txn
            .branch(bid)
            .ok_or_else(|| MoverError::Branching(format!("branch {bid} not found")))?;
        relpath::join(
            &txn.branch_rrpath(bid),
            &branch.tree.path_by_eid(eid).unwrap_or_default(),
        )
    };
    wc.edit_txn.delete(bid, eid)?;
    wc.notify.verbose(&format!("D    {path}"));
    wc.mark_edited();
    Ok(())
}

fn do_mkdir(wc: &mut WorkingCopy, bid: &str, parent_eid: Eid, name: &str) -> MoverResult<()> {
    let eid = wc.edit_txn.new_eid();
    wc.edit_txn
        .alter(bid, eid, parent_eid, name, Payload::empty_dir())?;
    let tree = &wc.edit_txn.branch(bid).expect("branch exists").tree;
    wc.notify
        .verbose(&format!("A    {}", display_child_path(tree, parent_eid, name)));
    wc.mark_edited();
    Ok(())
}

fn do_mkbranch(
    wc: &mut WorkingCopy,
    outer_bid: &str,
    outer_parent_eid: Eid,
    name: &str,
    payload: Payload,
) -> MoverResult<String> {
    let outer_eid = wc.edit_txn.new_eid();
    wc.edit_txn
        .alter(outer_bid, outer_eid, outer_parent_eid, name, Payload::SubbranchRoot)?;
    let inner_eid = wc.edit_txn.new_eid();
    let new_bid = nest_bid(outer_bid, outer_eid, inner_eid);
    wc.edit_txn.open_branch(None, &new_bid, inner_eid)?;
    wc.edit_txn
        .alter(&new_bid, inner_eid, NO_EID, "", payload)?;
    let tree = &wc.edit_txn.branch(outer_bid).expect("branch exists").tree;
    wc.notify.verbose(&format!(
        "A    {} (branch {})",
        display_child_path(tree, outer_parent_eid, name),
        new_bid
    ));
    wc.mark_edited();
    Ok(new_bid)
}

fn do_topbranch(wc: &mut WorkingCopy, from: &ElRev) -> MoverResult<String> {
    let from_eid = from.eid.expect("caller verified the source exists");
    let subtree = wc.el_rev_txn(from)?.get_subtree(&from.bid, from_eid)?;
    let new_bid = top_bid(wc.edit_txn.next_top_branch_num());
    let predecessor = from.rev.map(|rev| RevBid::new(rev, from.bid.clone()));
    wc.edit_txn.branch_from(&subtree, &new_bid, predecessor)?;
    wc.notify.verbose(&format!("A+   (branch {new_bid})"));
    wc.mark_edited();
    Ok(new_bid)
}

fn do_branch(
    wc: &mut WorkingCopy,
    from: &ElRev,
    to_outer_bid: &str,
    to_outer_parent_eid: Eid,
    new_name: &str,
) -> MoverResult<String> {
    let from_eid = from.eid.expect("caller verified the source exists");
    let subtree = wc.el_rev_txn(from)?.get_subtree(&from.bid, from_eid)?;
    let to_outer_eid = wc.edit_txn.new_eid();
    let new_bid = nest_bid(to_outer_bid, to_outer_eid, subtree.tree.root_eid);
    let predecessor = from.rev.map(|rev| RevBid::new(rev, from.bid.clone()));
    wc.edit_txn.branch_from(&subtree, &new_bid, predecessor)?;
    wc.edit_txn.alter(
        to_outer_bid,
        to_outer_eid,
        to_outer_parent_eid,
        new_name,
        Payload::SubbranchRoot,
    )?;
    let tree = &wc.edit_txn.branch(to_outer_bid).expect("branch exists").tree;
    wc.notify.verbose(&format!(
        "A+   {} (branch {})",
        display_child_path(tree, to_outer_parent_eid, new_name),
        new_bid
    ));
    wc.mark_edited();
    Ok(new_bid)
}

fn do_branch_into(
    wc: &mut WorkingCopy,
    from: &ElRev,
    to_bid: &str,
    to_parent_eid: Eid,
    new_name: &str,
) -> MoverResult<()> {
    let from_eid = from.eid.expect("caller verified the source exists");
    let from_txn = wc.el_rev_txn(from)?;
    let from_branch = from_txn
        .branch(&from.bid)
        .ok_or_else(|| MoverError::Branching(format!("branch {} not found", from.bid)))?;
    if from_branch.tree.path_by_eid(from_eid).is_none() {
        return Err(MoverError::Branching(format!(
            "cannot branch from {} e{from_eid}: does not exist",
            from.bid
        )));
    }
    let mut subtree = from_txn.get_subtree(&from.bid, from_eid)?;

    // Re-hang the subtree root at its destination.
    let root_payload = subtree
        .tree
        .get(from_eid)
        .expect("subtree carries its root")
        .payload
        .clone();
    subtree.tree.set(
        from_eid,
        ElementContent::new(to_parent_eid, new_name, root_payload),
    );

    // Element instances already present in the destination are replaced.
    let to_branch = wc
        .edit_txn
        .branch(to_bid)
        .ok_or_else(|| MoverError::Branching(format!("branch {to_bid} not found")))?;
    let overwritten: Vec<Eid> = subtree
        .tree
        .elements
        .keys()
        .filter(|e| to_branch.tree.contains(**e))
        .copied()
        .collect();
    if !overwritten.is_empty() {
        wc.notify.verbose(&format!(
            "note: {} element(s) already in {} will be overwritten",
            overwritten.len(),
            to_bid
        ));
    }

    wc.edit_txn.instantiate_subtree(to_bid, &subtree)?;
    let tree = &wc.edit_txn.branch(to_bid).expect("branch exists").tree;
    wc.notify.verbose(&format!(
        "A+   {} (subtree)",
        tree.path_by_eid(from_eid).unwrap_or_default()
    ));
    wc.mark_edited();
    Ok(())
}

fn do_move(
    wc: &mut WorkingCopy,
    el_rev: &ElRev,
    to_parent: &ElRev,
    to_name: &str,
) -> MoverResult<()> {
    let eid = el_rev.eid.expect("caller verified the source exists");
    let from_path = full_path(wc, el_rev)?;
    let payload = wc
        .edit_txn
        .branch(&el_rev.bid)
        .and_then(|b| b.get_element(eid))
        .map(|el| el.payload.clone())
        .ok_or_else(|| MoverError::Branching(format!("element e{eid} not found")))?;
    let to_parent_eid = to_parent.eid.expect("caller verified the parent exists");
    wc.edit_txn
        .alter(&el_rev.bid, eid, to_parent_eid, to_name, payload)?;
    let tree = &wc.edit_txn.branch(&el_rev.bid).expect("branch exists").tree;
    wc.notify.verbose(&format!(
        "V    {} (from {from_path})",
        display_child_path(tree, to_parent_eid, to_name)
    ));
    wc.mark_edited();
    Ok(())
}

fn do_copy_and_delete(
    wc: &mut WorkingCopy,
    el_rev: &ElRev,
    to_parent: &ElRev,
    to_name: &str,
) -> MoverResult<()> {
    do_copy(
        wc,
        el_rev,
        &to_parent.bid.clone(),
        to_parent.eid.expect("caller verified the parent exists"),
        to_name,
    )?;
    do_delete(wc, &el_rev.bid.clone(), el_rev.eid.expect("verified"))
}

fn do_branch_and_delete(
    wc: &mut WorkingCopy,
    el_rev: &ElRev,
    to_parent: &ElRev,
    to_name: &str,
) -> MoverResult<()> {
    do_branch(
        wc,
        el_rev,
        &to_parent.bid.clone(),
        to_parent.eid.expect("caller verified the parent exists"),
        to_name,
    )?;
    do_delete(wc, &el_rev.bid.clone(), el_rev.eid.expect("verified"))
}

fn do_branch_into_and_delete(
    wc: &mut WorkingCopy,
    el_rev: &ElRev,
    to_parent: &ElRev,
    to_name: &str,
) -> MoverResult<()> {
    do_branch_into(
        wc,
        el_rev,
        &to_parent.bid.clone(),
        to_parent.eid.expect("caller verified the parent exists"),
        to_name,
    )?;
    do_delete(wc, &el_rev.bid.clone(), el_rev.eid.expect("verified"))
}

const CROSS_BRANCH_MV_MSG: &str =
    "mv: the source and target are in different branches. Some ways to move \
     content to a different branch are, depending on the effect you want to \
     achieve: copy-and-delete, branch-and-delete, branch-into-and-delete";

fn do_interactive_cross_branch_move(
    wc: &mut WorkingCopy,
    io: &mut dyn UserIo,
    el_rev: &ElRev,
    to_parent: &ElRev,
    to_name: &str,
) -> MoverResult<()> {
    if !io.is_interactive() {
        return Err(MoverError::Branching(CROSS_BRANCH_MV_MSG.to_string()));
    }
    wc.notify.verbose(
        "mv: The source and target are in different branches. Some ways to move \
         content to a different branch are, depending on the effect you want to \
         achieve:\n\
         \x20 c: copy-and-delete: cp SOURCE TARGET; rm SOURCE\n\
         \x20 b: branch-and-delete: branch SOURCE TARGET; rm SOURCE\n\
         \x20 i: branch-into-and-delete: branch-into SOURCE TARGET; rm SOURCE\n\
         We can do one of these for you now if you wish.",
    );
    let input = match io.prompt("Your choice (c, b, i, or just <enter> to do nothing): ") {
        Ok(Some(line)) => line,
        Ok(None) => return Ok(()),
        Err(MoverError::Cancelled) => return Ok(()),
        Err(e) => return Err(e),
    };
    match input.chars().next() {
        Some('c') | Some('C') => {
            wc.notify.verbose("Performing 'copy-and-delete SOURCE TARGET'");
            do_copy_and_delete(wc, el_rev, to_parent, to_name)
        }
        Some('b') | Some('B') => {
            wc.notify.verbose("Performing 'branch-and-delete SOURCE TARGET'");
            do_branch_and_delete(wc, el_rev, to_parent, to_name)
        }
        Some('i') | Some('I') => {
            wc.notify.verbose("Performing 'branch-into-and-delete SOURCE TARGET'");
            wc.notify.verbose(
                "Each element instance from the source branch subtree will overwrite \
                 any instance of the same element that already exists in the target \
                 branch.",
            );
            do_branch_into_and_delete(wc, el_rev, to_parent, to_name)
        }
        _ => Ok(()),
    }
}

fn do_put(
    wc: &mut WorkingCopy,
    local_path: &str,
    file_arg: &Arg,
) -> MoverResult<()> {
    let text = if local_path == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        fs::read(local_path)?
    };

    let bid = file_arg.el_rev.bid.clone();
    match file_arg.el_rev.eid {
        Some(eid) => {
            // Existing element: keep its props and position, replace text.
            let branch = wc
                .edit_txn
                .branch(&bid)
                .ok_or_else(|| MoverError::Branching(format!("branch {bid} not found")))?;
            let existing = branch.get_element(eid).ok_or_else(|| {
                MoverError::Branching(format!("element e{eid} not found in {bid}"))
            })?;
            let props = existing.payload.props().cloned().unwrap_or_default();
            let (parent_eid, name) = if branch.is_root_element(eid) {
                (NO_EID, String::new())
            } else {
                (existing.parent_eid, existing.name.clone())
            };
            wc.edit_txn
                .alter(&bid, eid, parent_eid, &name, Payload::file(props, text))?;
            let path = full_path(wc, &file_arg.el_rev)?;
            wc.notify.verbose(&format!("M    {path}"));
        }
        None => {
            let parent_eid = file_arg
                .parent_el_rev
                .eid
                .expect("caller verified the parent exists");
            let parent_bid = file_arg.parent_el_rev.bid.clone();
            let eid = wc.edit_txn.new_eid();
            wc.edit_txn.alter(
                &parent_bid,
                eid,
                parent_eid,
                &file_arg.path_name,
                Payload::file(Props::new(), text),
            )?;
            let tree = &wc.edit_txn.branch(&parent_bid).expect("branch exists").tree;
            wc.notify.verbose(&format!(
                "A    {}",
                display_child_path(tree, parent_eid, &file_arg.path_name)
            ));
        }
    }
    wc.mark_edited();
    Ok(())
}

fn do_cat(wc: &WorkingCopy, el_rev: &ElRev) -> MoverResult<Vec<String>> {
    let eid = el_rev.eid.expect("caller verified the path exists");
    let txn = wc.el_rev_txn(el_rev)?;
    let element = txn
        .branch(&el_rev.bid)
        .and_then(|b| b.get_element(eid))
        .ok_or_else(|| MoverError::Branching(format!("element e{eid} not found")))?;
    let mut out = Vec::new();
    if let Some(props) = element.payload.props() {
        for (name, value) in props {
            out.push(format!(
                "property '{name}': '{}'",
                String::from_utf8_lossy(value)
            ));
        }
    }
    if let Some(text) = element.payload.text() {
        out.push(String::from_utf8_lossy(text).into_owned());
    }
    Ok(out)
}

fn do_merge(
    wc: &mut WorkingCopy,
    from: &ElRev,
    to: &ElRev,
    yca: &ElRev,
    conflict_prefix: &str,
) -> MoverResult<()> {
    let src = wc
        .el_rev_txn(from)?
        .get_subtree(&from.bid, from.eid.expect("verified"))?;
    let tgt = wc
        .el_rev_txn(to)?
        .get_subtree(&to.bid, to.eid.expect("verified"))?;
    let base = wc
        .el_rev_txn(yca)?
        .get_subtree(&yca.bid, yca.eid.expect("verified"))?;

    match merge_trees(&src.tree, &tgt.tree, &base.tree) {
        MergeOutcome::Merged(mut merged) => {
            // The merge works on normalized subtrees; if the target is not
            // a branch root, pin the subtree root back to its real place.
            let to_eid = to.eid.expect("verified");
            let tgt_branch = wc
                .edit_txn
                .branch(&to.bid)
                .ok_or_else(|| MoverError::Branching(format!("branch {} not found", to.bid)))?;
            if !tgt_branch.is_root_element(to_eid) {
                let actual = tgt_branch
                    .get_element(to_eid)
                    .expect("target subtree root exists")
                    .clone();
                if let Some(root) = merged.get(to_eid) {
                    let payload = root.payload.clone();
                    merged.set(
                        to_eid,
                        ElementContent::new(actual.parent_eid, actual.name, payload),
                    );
                }
            }
            for &eid in merged.elements.keys() {
                wc.edit_txn.cover_transient_eid(eid);
            }
            let to_bid = to.bid.clone();
            subtree_replay(&mut wc.edit_txn, &to_bid, Some(&tgt.tree), Some(&merged))?;
            wc.sequence_point();
            wc.mark_edited();
            Ok(())
        }
        MergeOutcome::Conflict(report) => {
            wc.notify.note_lines(&report.render(conflict_prefix));
            Err(MoverError::Branching(format!(
                "merge failed because of conflicts: {}",
                report.summary()
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Execute a list of actions against the working copy.
///
/// `commit_message` and `revprops` are used by any `commit` action in
/// the list. Every action other than `commit` appends its words to the
/// audit trail.
pub fn execute(
    wc: &mut WorkingCopy,
    io: &mut dyn UserIo,
    actions: &[ParsedAction],
    commit_message: Option<&str>,
    revprops: &Props,
) -> MoverResult<()> {
    for action in actions {
        execute_one(wc, io, action, commit_message, revprops)?;
        if !matches!(action.kind, ActionKind::Commit) {
            wc.record_command(&action.text);
        }
    }
    Ok(())
}

fn execute_one(
    wc: &mut WorkingCopy,
    io: &mut dyn UserIo,
    action: &ParsedAction,
    commit_message: Option<&str>,
    revprops: &Props,
) -> MoverResult<()> {
    // Translating paths to elements needs a consistent tree.
    wc.sequence_point();

    match &action.kind {
        ActionKind::InfoWc => {
            wc.notify
                .note(&format!("Repository Root: {}", wc.repos_root_url()));
            wc.notify
                .note(&format!("Base Revision: {}", wc.base.revision));
            wc.notify.note(&format!("Base Branch:    {}", wc.base.bid));
            wc.notify
                .note(&format!("Working Branch: {}", wc.working_bid));
        }

        ActionKind::Diff(l, r) => {
            let left = resolve(wc, l)?;
            let right = resolve(wc, r)?;
            verify_eid_exists("diff", &left)?;
            verify_eid_exists("diff", &right)?;
            let left_txn = wc.el_rev_txn(&left.el_rev)?;
            let right_txn = wc.el_rev_txn(&right.el_rev)?;
            let lines = diff::branch_diff_r(
                &DiffSide::new(
                    left_txn,
                    &left.el_rev.bid,
                    left.el_rev.eid.expect("verified"),
                    left.el_rev.rev,
                ),
                &DiffSide::new(
                    right_txn,
                    &right.el_rev.bid,
                    right.el_rev.eid.expect("verified"),
                    right.el_rev.rev,
                ),
                wc.ui_mode,
                "",
            )?;
            wc.notify.note_lines(&lines);
        }

        ActionKind::Status => {
            let lines = wc.status_lines()?;
            wc.notify.note_lines(&lines);
        }

        ActionKind::Log(from, to) => {
            let from = resolve(wc, from)?;
            let to = resolve(wc, to)?;
            verify_eid_exists("log", &from)?;
            verify_eid_exists("log", &to)?;
            let lines = wc.log_lines(&from.el_rev, &to.el_rev)?;
            wc.notify.note_lines(&lines);
        }

        ActionKind::ListBranches(path) => {
            let arg = resolve(wc, path)?;
            verify_eid_exists("branches", &arg)?;
            let eid = arg.el_rev.eid.expect("verified");
            match wc.ui_mode {
                UiMode::Paths => wc.notify.verbose(&format!(
                    "branches rooted at same element as '{}':",
                    arg.relpath
                )),
                UiMode::Eids => wc
                    .notify
                    .verbose(&format!("branches rooted at e{eid}:")),
            }
            let lines = list_branches_at_eid(wc.el_rev_txn(&arg.el_rev)?, eid, wc.ui_mode);
            wc.notify.note_lines(&lines);
        }

        ActionKind::ListBranchesR => {
            let lines = list_all_branches(&wc.edit_txn, true, wc.ui_mode);
            wc.notify.note_lines(&lines);
        }

        ActionKind::Ls(path) => {
            let arg = resolve(wc, path)?;
            verify_eid_exists("ls", &arg)?;
            let txn = wc.el_rev_txn(&arg.el_rev)?;
            let branch = txn
                .branch(&arg.el_rev.bid)
                .ok_or_else(|| MoverError::Branching(format!("branch {} not found", arg.el_rev.bid)))?;
            let lines = match wc.ui_mode {
                UiMode::Paths => list_branch_elements(txn, branch),
                UiMode::Eids => list_branch_elements_by_eid(txn, branch),
            };
            wc.notify.note_lines(&lines);
        }

        ActionKind::TBranch(src) => {
            let src = resolve(wc, src)?;
            verify_eid_exists("tbranch", &src)?;
            let new_bid = do_topbranch(wc, &src.el_rev)?;
            // The working state moves onto the new branch.
            wc.working_bid = new_bid;
        }

        ActionKind::Branch(src, dst) => {
            let src = resolve(wc, src)?;
            let dst = resolve(wc, dst)?;
            verify_eid_exists("branch", &src)?;
            verify_rev_unspecified("branch", &dst)?;
            verify_eid_nonexistent("branch", &dst)?;
            verify_parent_eid_exists("branch", &dst)?;
            do_branch(
                wc,
                &src.el_rev,
                &dst.el_rev.bid.clone(),
                dst.parent_el_rev.eid.expect("verified"),
                &dst.path_name,
            )?;
        }

        ActionKind::BranchInto(src, dst) => {
            let src = resolve(wc, src)?;
            let dst = resolve(wc, dst)?;
            verify_eid_exists("branch-into", &src)?;
            verify_rev_unspecified("branch-into", &dst)?;
            verify_eid_nonexistent("branch-into", &dst)?;
            verify_parent_eid_exists("branch-into", &dst)?;
            do_branch_into(
                wc,
                &src.el_rev,
                &dst.el_rev.bid.clone(),
                dst.parent_el_rev.eid.expect("verified"),
                &dst.path_name,
            )?;
        }

        ActionKind::MkBranch(root) => {
            let arg = resolve(wc, root)?;
            verify_rev_unspecified("mkbranch", &arg)?;
            verify_eid_nonexistent("mkbranch", &arg)?;
            verify_parent_eid_exists("mkbranch", &arg)?;
            do_mkbranch(
                wc,
                &arg.parent_el_rev.bid.clone(),
                arg.parent_el_rev.eid.expect("verified"),
                &arg.path_name,
                Payload::empty_dir(),
            )?;
        }

        ActionKind::Merge(from, to, yca) => {
            let from = resolve(wc, from)?;
            let to = resolve(wc, to)?;
            let yca = resolve(wc, yca)?;
            verify_eid_exists("merge", &from)?;
            verify_eid_exists("merge", &to)?;
            verify_eid_exists("merge", &yca)?;
            if from.el_rev.eid != to.el_rev.eid || from.el_rev.eid != yca.el_rev.eid {
                wc.notify.note(&format!(
                    "warning: root elements differ in the requested merge \
                     (from: e{}, to: e{}, yca: e{})",
                    from.el_rev.eid.expect("verified"),
                    to.el_rev.eid.expect("verified"),
                    yca.el_rev.eid.expect("verified")
                ));
            }
            do_merge(wc, &from.el_rev, &to.el_rev, &yca.el_rev, "merge: ")?;
        }

        ActionKind::Mv(src, dst) => {
            let mut src = resolve(wc, src)?;
            let dst = resolve(wc, dst)?;
            point_to_outer_element_instead(wc, &mut src.el_rev, "mv")?;
            verify_rev_unspecified("mv", &src)?;
            verify_eid_exists("mv", &src)?;
            verify_rev_unspecified("mv", &dst)?;
            verify_eid_nonexistent("mv", &dst)?;
            verify_parent_eid_exists("mv", &dst)?;
            verify_not_in_self("mv", &src, &dst, wc)?;

            if dst.parent_el_rev.bid == src.el_rev.bid {
                do_move(wc, &src.el_rev, &dst.parent_el_rev, &dst.path_name)?;
            } else {
                do_interactive_cross_branch_move(
                    wc,
                    io,
                    &src.el_rev,
                    &dst.parent_el_rev,
                    &dst.path_name,
                )?;
            }
        }

        ActionKind::Cp(src, dst) => {
            let src = resolve(wc, src)?;
            let dst = resolve(wc, dst)?;
            verify_rev_specified("cp", &src)?;
            verify_eid_exists("cp", &src)?;
            verify_rev_unspecified("cp", &dst)?;
            verify_eid_nonexistent("cp", &dst)?;
            verify_parent_eid_exists("cp", &dst)?;
            do_copy(
                wc,
                &src.el_rev,
                &dst.parent_el_rev.bid.clone(),
                dst.parent_el_rev.eid.expect("verified"),
                &dst.path_name,
            )?;
        }

        ActionKind::Rm(path) => {
            let mut arg = resolve(wc, path)?;
            point_to_outer_element_instead(wc, &mut arg.el_rev, "rm")?;
            verify_rev_unspecified("rm", &arg)?;
            verify_eid_exists("rm", &arg)?;
            do_delete(wc, &arg.el_rev.bid.clone(), arg.el_rev.eid.expect("verified"))?;
        }

        ActionKind::CopyAndDelete(src, dst) => {
            let mut src = resolve(wc, src)?;
            let dst = resolve(wc, dst)?;
            point_to_outer_element_instead(wc, &mut src.el_rev, "copy-and-delete")?;
            verify_rev_unspecified("copy-and-delete", &src)?;
            verify_eid_exists("copy-and-delete", &src)?;
            verify_rev_unspecified("copy-and-delete", &dst)?;
            verify_eid_nonexistent("copy-and-delete", &dst)?;
            verify_parent_eid_exists("copy-and-delete", &dst)?;
            verify_not_in_self("copy-and-delete", &src, &dst, wc)?;
            do_copy_and_delete(wc, &src.el_rev, &dst.parent_el_rev, &dst.path_name)?;
        }

        ActionKind::BranchAndDelete(src, dst) => {
            let mut src = resolve(wc, src)?;
            let dst = resolve(wc, dst)?;
            point_to_outer_element_instead(wc, &mut src.el_rev, "branch-and-delete")?;
            verify_rev_unspecified("branch-and-delete", &src)?;
            verify_eid_exists("branch-and-delete", &src)?;
            verify_rev_unspecified("branch-and-delete", &dst)?;
            verify_eid_nonexistent("branch-and-delete", &dst)?;
            verify_parent_eid_exists("branch-and-delete", &dst)?;
            verify_not_in_self("branch-and-delete", &src, &dst, wc)?;
            do_branch_and_delete(wc, &src.el_rev, &dst.parent_el_rev, &dst.path_name)?;
        }

        ActionKind::BranchIntoAndDelete(src, dst) => {
            let mut src = resolve(wc, src)?;
            let dst = resolve(wc, dst)?;
            point_to_outer_element_instead(wc, &mut src.el_rev, "branch-into-and-delete")?;
            verify_rev_unspecified("branch-into-and-delete", &src)?;
            verify_eid_exists("branch-into-and-delete", &src)?;
            verify_rev_unspecified("branch-into-and-delete", &dst)?;
            verify_eid_nonexistent("branch-into-and-delete", &dst)?;
            verify_parent_eid_exists("branch-into-and-delete", &dst)?;
            verify_not_in_self("branch-into-and-delete", &src, &dst, wc)?;
            if dst.parent_el_rev.bid == src.el_rev.bid {
                return Err(MoverError::Branching(
                    "branch-into-and-delete: source and target are in the same branch"
                        .to_string(),
                ));
            }
            do_branch_into_and_delete(wc, &src.el_rev, &dst.parent_el_rev, &dst.path_name)?;
        }

        ActionKind::MkDir(path) => {
            let arg = resolve(wc, path)?;
            verify_rev_unspecified("mkdir", &arg)?;
            verify_eid_nonexistent("mkdir", &arg)?;
            verify_parent_eid_exists("mkdir", &arg)?;
            do_mkdir(
                wc,
                &arg.parent_el_rev.bid.clone(),
                arg.parent_el_rev.eid.expect("verified"),
                &arg.path_name,
            )?;
        }

        ActionKind::Put(local_path, path) => {
            let arg = resolve(wc, path)?;
            verify_rev_unspecified("put", &arg)?;
            verify_parent_eid_exists("put", &arg)?;
            do_put(wc, local_path, &arg)?;
        }

        ActionKind::Cat(path) => {
            let arg = resolve(wc, path)?;
            verify_eid_exists("cat", &arg)?;
            let lines = do_cat(wc, &arg.el_rev)?;
            wc.notify.note_lines(&lines);
        }

        ActionKind::Commit => {
            let new_rev = wc.commit(commit_message.map(String::from), revprops.clone())?;
            if new_rev.is_none() {
                wc.notify.verbose("There are no changes to commit.");
            }
        }

        ActionKind::Update(target) => {
            let arg = resolve(wc, target)?;
            verify_eid_exists("update", &arg)?;
            verify_rev_specified("update", &arg)?;
            wc.update(arg.revnum.expect("verified"))?;
        }

        ActionKind::Switch(target) => {
            let arg = resolve(wc, target)?;
            verify_eid_exists("switch", &arg)?;
            wc.switch(arg.revnum, &arg.el_rev.bid.clone())?;
        }

        ActionKind::Revert => {
            wc.revert()?;
        }

        ActionKind::Migrate(target) => {
            // The target revision predates element tracking, so the
            // selector's path cannot be resolved to an element; only the
            // revision matters.
            let rev = target
                .rev
                .map(|r| resolve_rev(wc, r))
                .ok_or_else(|| {
                    MoverError::Branching(format!(
                        "migrate: '{}': revision number required",
                        target.relpath
                    ))
                })?;
            wc.migrate(rev, rev)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::LocalRemote;
    use crate::ui::{Notify, ScriptedIo};

    fn wc_with_repo(dir: &std::path::Path) -> WorkingCopy {
        let url = format!("file://{}", dir.join("repo").display());
        let remote = LocalRemote::init(&url).unwrap();
        WorkingCopy::create(
            Box::new(remote),
            None,
            "B0",
            "tester",
            Notify::new(true),
            UiMode::Eids,
        )
        .unwrap()
    }

    fn run(wc: &mut WorkingCopy, line: &str) -> MoverResult<()> {
        let words: Vec<String> = line.split_whitespace().map(String::from).collect();
        let actions = parse_actions(&words)?;
        let mut io = ScriptedIo::new(&[]);
        execute(wc, &mut io, &actions, None, &Props::new())
    }

    #[test]
    fn test_parse_selector_forms() {
        let s = parse_selector("foo/bar").unwrap();
        assert_eq!(s.bid, None);
        assert_eq!(s.relpath, "foo/bar");
        assert_eq!(s.rev, None);

        let s = parse_selector("^B0/foo@3").unwrap();
        assert_eq!(s.bid.as_deref(), Some("B0"));
        assert_eq!(s.relpath, "foo");
        assert_eq!(s.rev, Some(RevSpec::Number(3)));

        let s = parse_selector(".@head").unwrap();
        assert_eq!(s.relpath, "");
        assert_eq!(s.rev, Some(RevSpec::Head));

        // The leading B is optional in a branch id.
        let s = parse_selector("^0/x").unwrap();
        assert_eq!(s.bid.as_deref(), Some("B0"));

        assert!(parse_selector("x@nonsense").is_err());
    }

    #[test]
    fn test_parse_actions_consumes_arg_counts() {
        let words: Vec<String> = ["mkdir", "A", "mv", "A", "B", "commit"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let actions = parse_actions(&words).unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0].text, "mkdir A");
        assert_eq!(actions[1].text, "mv A B");
        assert!(matches!(actions[2].kind, ActionKind::Commit));
    }

    #[test]
    fn test_parse_actions_rejects_unknown_and_short() {
        let words: Vec<String> = vec!["frobnicate".into()];
        assert!(matches!(
            parse_actions(&words),
            Err(MoverError::ArgParse(_))
        ));
        let words: Vec<String> = vec!["mv".into(), "onlyone".into()];
        assert!(matches!(
            parse_actions(&words),
            Err(MoverError::ArgParse(_))
        ));
    }

    #[test]
    fn test_mkdir_commit_ls() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A mkdir A/B commit").unwrap();

        assert_eq!(wc.head_revision, 1);
        let tree = &wc.working_branch().unwrap().tree;
        let a = tree.eid_by_path("A").unwrap();
        let b = tree.eid_by_path("A/B").unwrap();
        assert!(a >= 0 && b >= 0 && a != b);
    }

    #[test]
    fn test_mkdir_existing_path_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A").unwrap();
        let err = run(&mut wc, "mkdir A").unwrap_err();
        assert!(matches!(err, MoverError::Branching(_)));
    }

    #[test]
    fn test_mv_keeps_eid_and_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A commit").unwrap();
        let before = {
            let tree = &wc.working_branch().unwrap().tree;
            let eid = tree.eid_by_path("A").unwrap();
            (eid, tree.get(eid).unwrap().payload.clone())
        };

        run(&mut wc, "mv A X commit").unwrap();

        let tree = &wc.working_branch().unwrap().tree;
        assert_eq!(tree.eid_by_path("X"), Some(before.0));
        assert_eq!(tree.get(before.0).unwrap().payload, before.1);
        assert_eq!(tree.eid_by_path("A"), None);
    }

    #[test]
    fn test_mv_into_own_subtree_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A mkdir A/B").unwrap();
        let err = run(&mut wc, "mv A A/B/A").unwrap_err();
        assert!(matches!(err, MoverError::Branching(_)));
    }

    #[test]
    fn test_rm_deletes_subtree() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A mkdir A/B commit").unwrap();
        run(&mut wc, "rm A commit").unwrap();

        let tree = &wc.working_branch().unwrap().tree;
        assert_eq!(tree.eid_by_path("A"), None);
        assert_eq!(tree.elements.len(), 1);
    }

    #[test]
    fn test_cp_preserves_eid() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A commit").unwrap();
        let a = wc.working_branch().unwrap().tree.eid_by_path("A").unwrap();

        run(&mut wc, "cp 1 A C commit").unwrap();

        let tree = &wc.working_branch().unwrap().tree;
        // Copy preserves the original eid; the copy replaced the source
        // mapping of the same element.
        assert_eq!(tree.eid_by_path("C"), Some(a));
        assert_eq!(
            tree.get(a).unwrap().payload,
            Payload::empty_dir(),
        );
    }

    #[test]
    fn test_cp_accepts_keyword_revision() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A commit").unwrap();
        run(&mut wc, "cp base A C").unwrap();
        assert!(run(&mut wc, "cp nonsense A D").is_err());
    }

    #[test]
    fn test_mkbranch_and_tbranch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkbranch P").unwrap();

        // The new nested branch exists, rooted at P's inner element.
        let nested_bid = wc
            .edit_txn
            .subbranches_of("B0")
            .first()
            .map(|(_, b)| b.bid.clone())
            .unwrap();
        let inner_root = wc.edit_txn.branch(&nested_bid).unwrap().root_eid();

        run(&mut wc, "tbranch ^B0/P").unwrap();
        assert_eq!(wc.working_bid, "B1");
        let b1 = wc.edit_txn.branch("B1").unwrap();
        assert_eq!(b1.root_eid(), inner_root);
    }

    #[test]
    fn test_branch_creates_nested_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkbranch P").unwrap();
        run(&mut wc, "branch P Q").unwrap();

        let subbranches = wc.edit_txn.subbranches_of("B0");
        assert_eq!(subbranches.len(), 2);
        let tree = &wc.working_branch().unwrap().tree;
        assert!(tree.eid_by_path("Q").is_some());
    }

    #[test]
    fn test_cross_branch_mv_non_interactive_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkbranch P mkdir A").unwrap();

        let words: Vec<String> = ["mv", "A", "P/A"].iter().map(|s| s.to_string()).collect();
        let actions = parse_actions(&words).unwrap();
        let mut io = crate::ui::NoPromptIo;
        let err = execute(&mut wc, &mut io, &actions, None, &Props::new()).unwrap_err();
        assert!(matches!(err, MoverError::Branching(_)));
        assert!(err.to_string().contains("different branches"));
    }

    #[test]
    fn test_cross_branch_mv_interactive_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkbranch P mkdir A").unwrap();

        let words: Vec<String> = ["mv", "A", "P/A"].iter().map(|s| s.to_string()).collect();
        let actions = parse_actions(&words).unwrap();
        let mut io = ScriptedIo::new(&["c"]);
        execute(&mut wc, &mut io, &actions, None, &Props::new()).unwrap();

        // A now lives in the nested branch; the original is gone.
        let found = wc.find_el_rev(None, None, "P/A").unwrap();
        assert!(found.eid.is_some());
        assert_ne!(found.bid, "B0");
        let gone = wc.find_el_rev(None, None, "A").unwrap();
        assert_eq!(gone.eid, None);
    }

    #[test]
    fn test_merge_trivial_and_rename_vs_edit() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A commit").unwrap(); // r1

        // Branch B0 to a top-level B1 (working moves there), rename A.
        run(&mut wc, "tbranch . mv A A2 commit").unwrap(); // r2, on B1
        assert_eq!(wc.working_bid, "B1");

        // Switch back to B0, edit nothing; merge B1's rename into B0.
        wc.switch(None, "B0").unwrap();
        run(&mut wc, "merge ^B1/.@head . .@1").unwrap();

        let tree = &wc.working_branch().unwrap().tree;
        assert!(tree.eid_by_path("A2").is_some());
        assert_eq!(tree.eid_by_path("A"), None);
    }

    #[test]
    fn test_status_after_edit_shows_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A").unwrap();
        let lines = wc.status_lines().unwrap();
        assert!(
            lines.iter().any(|l| l.contains('A')),
            "status missing addition: {lines:?}"
        );
    }

    #[test]
    fn test_commit_message_defaults_to_command_list() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A commit").unwrap();
        let info = &wc.remote().repos().get(1).unwrap().info;
        assert_eq!(info.message.trim(), "mkdir A");
    }

    #[test]
    fn test_revert_action() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkdir A revert").unwrap();
        assert!(!wc.txn_is_changed().unwrap());
        run(&mut wc, "commit").unwrap();
        assert_eq!(wc.head_revision, 0, "no-op commit must not move HEAD");
    }

    #[test]
    fn test_put_and_cat() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        let local = tmp.path().join("content.txt");
        std::fs::write(&local, b"hello element\n").unwrap();

        run(&mut wc, &format!("put {} f", local.display())).unwrap();
        let arg_words: Vec<String> = vec!["cat".into(), "f".into()];
        let actions = parse_actions(&arg_words).unwrap();
        let mut io = ScriptedIo::new(&[]);
        execute(&mut wc, &mut io, &actions, None, &Props::new()).unwrap();

        // Re-put onto the same path keeps the element and its id.
        let eid = wc.working_branch().unwrap().tree.eid_by_path("f").unwrap();
        std::fs::write(&local, b"second version\n").unwrap();
        run(&mut wc, &format!("put {} f", local.display())).unwrap();
        assert_eq!(
            wc.working_branch().unwrap().tree.eid_by_path("f"),
            Some(eid)
        );
    }

    #[test]
    fn test_rm_of_top_level_branch_root_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        let err = run(&mut wc, "rm .").unwrap_err();
        assert!(err.to_string().contains("top-level branch"));
    }

    #[test]
    fn test_rm_of_nested_branch_root_deletes_host() {
        let tmp = tempfile::tempdir().unwrap();
        let mut wc = wc_with_repo(tmp.path());
        run(&mut wc, "mkbranch P").unwrap();
        run(&mut wc, "rm P").unwrap();
        wc.sequence_point();
        let tree = &wc.working_branch().unwrap().tree;
        assert_eq!(tree.eid_by_path("P"), None);
        assert!(wc.edit_txn.subbranches_of("B0").is_empty());
    }
}
