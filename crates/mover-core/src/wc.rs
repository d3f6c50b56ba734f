//! The working copy.
//!
//! A working copy holds a base `(revision, branch)` pair and a working
//! branch inside one live edit transaction, and drives checkout, commit,
//! switch, update, revert, and migrate against the remote session it owns.
//! All user-visible knobs (quiet flag, UI mode, the command audit trail)
//! live here rather than in globals.

use crate::branch::{top_bid, BranchState, BranchTxn, ElRev, Rev, RevBid};
use crate::diff::{self, DiffSide};
use crate::element::Props;
use crate::error::{MoverError, MoverResult};
use crate::merge::{merge_trees, MergeOutcome};
use crate::migrate::{check_migrate_range, format_move, MigrationEditor};
use crate::remote::Remote;
use crate::replay::{allocate_eids, replay, subtree_replay, txn_is_changed};
use crate::repos::RevisionInfo;
use crate::ui::{Notify, UiMode};

/// The base of the working copy: a committed revision and branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub revision: Rev,
    pub bid: String,
}

/// Lifecycle of the working copy's edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WcState {
    Clean,
    Dirty,
    Committing,
    /// A switch merge left conflicts behind; terminal for this session.
    Conflicted,
}

/// A simulated working copy, in memory.
pub struct WorkingCopy {
    remote: Box<dyn Remote>,
    pub head_revision: Rev,
    pub base: BranchRef,
    pub working_bid: String,
    pub edit_txn: BranchTxn,
    /// Audit trail of executed actions, used as the default log message.
    pub list_of_commands: Option<String>,
    pub state: WcState,
    pub author: String,
    pub notify: Notify,
    pub ui_mode: UiMode,
}

impl WorkingCopy {
    /// Open a session and check out `(base_revision, base_bid)`;
    /// `None` means HEAD.
    pub fn create(
        remote: Box<dyn Remote>,
        base_revision: Option<Rev>,
        base_bid: &str,
        author: impl Into<String>,
        notify: Notify,
        ui_mode: UiMode,
    ) -> MoverResult<Self> {
        let head_revision = remote.latest_revnum();
        let mut wc = WorkingCopy {
            remote,
            head_revision,
            base: BranchRef {
                revision: 0,
                bid: String::new(),
            },
            working_bid: String::new(),
            edit_txn: BranchTxn::new(None, 0),
            list_of_commands: None,
            state: WcState::Clean,
            author: author.into(),
            notify,
            ui_mode,
        };
        wc.checkout(base_revision, base_bid)?;
        Ok(wc)
    }

    pub fn repos_root_url(&self) -> &str {
        self.remote.repos_root_url()
    }

    pub fn remote(&self) -> &dyn Remote {
        self.remote.as_ref()
    }

    // -- base/working access -----------------------------------------------

    /// The immutable base branch, from the revision catalog.
    pub fn base_branch(&self) -> MoverResult<&BranchState> {
        self.remote
            .repos()
            .get_branch_by_id(self.base.revision, &self.base.bid)
    }

    /// The mutable working branch inside the edit transaction.
    pub fn working_branch(&self) -> MoverResult<&BranchState> {
        self.edit_txn.branch(&self.working_bid).ok_or_else(|| {
            MoverError::Branching(format!(
                "branch {} not found in working state",
                self.working_bid
            ))
        })
    }

    /// True when the edit transaction differs from its base.
    pub fn txn_is_changed(&self) -> MoverResult<bool> {
        let base_txn = self.remote.repos().txn(self.base.revision)?;
        Ok(txn_is_changed(&self.edit_txn, base_txn))
    }

    /// Flush edits into a consistent observable state.
    pub fn sequence_point(&mut self) {
        self.edit_txn.sequence_point();
    }

    /// Note that an action mutated the working state.
    pub fn mark_edited(&mut self) {
        if self.state == WcState::Clean {
            self.state = WcState::Dirty;
        }
    }

    /// Append an executed action's words to the audit trail.
    pub fn record_command(&mut self, line: &str) {
        let mut log = self.list_of_commands.take().unwrap_or_default();
        log.push_str(line);
        log.push('\n');
        self.list_of_commands = Some(log);
    }

    // -- checkout ----------------------------------------------------------

    /// Throw away the edit transaction and start a fresh one at
    /// `(base_revision, bid)`. Callers with unsaved edits must have
    /// merged or committed them first.
    pub fn checkout(&mut self, base_revision: Option<Rev>, bid: &str) -> MoverResult<()> {
        let rev = match base_revision {
            Some(r) if r > self.head_revision => {
                return Err(MoverError::NoSuchRevision(format!(
                    "no such revision {r} (HEAD is {})",
                    self.head_revision
                )))
            }
            Some(r) => r,
            None => self.head_revision,
        };
        // Both the immutable base and the editable copy must know the branch.
        self.remote.repos().get_branch_by_id(rev, bid).map_err(|_| {
            MoverError::Branching(format!(
                "cannot check out: branch {bid} not found in r{rev}"
            ))
        })?;
        self.edit_txn = self.remote.load_branching_state(rev)?;
        self.base = BranchRef {
            revision: rev,
            bid: bid.to_string(),
        };
        self.working_bid = bid.to_string();
        self.state = WcState::Clean;
        Ok(())
    }

    // -- commit ------------------------------------------------------------

    /// Commit the delta from base to working as a new revision.
    ///
    /// Returns `None` (and leaves HEAD untouched) when the commit
    /// transaction turns out unchanged. On success the working copy is
    /// checked out again at the new revision.
    pub fn commit(
        &mut self,
        message: Option<String>,
        revprops: Props,
    ) -> MoverResult<Option<Rev>> {
        if self.state == WcState::Conflicted {
            return Err(MoverError::Branching(
                "cannot commit: the working copy has unresolved conflicts".to_string(),
            ));
        }
        self.sequence_point();

        let mut commit_txn = self.remote.begin_commit()?;
        let commit_base_rev = commit_txn.base_rev.expect("commit txn is anchored");

        // A working branch unknown to the repository can only be a new
        // top-level branch; create it in the commit txn first.
        let mut commit_bid = self.working_bid.clone();
        if commit_txn.branch(&commit_bid).is_none() {
            let base_branch = self.base_branch()?;
            let from = self
                .remote
                .repos()
                .txn(self.base.revision)?
                .get_subtree(&self.base.bid, base_branch.root_eid())?;
            let new_bid = top_bid(commit_txn.next_top_branch_num());
            commit_txn.branch_from(
                &from,
                &new_bid,
                Some(RevBid::new(self.base.revision, self.base.bid.clone())),
            )?;
            commit_bid = new_bid;
        }

        // Cover the edit txn's transient ids so replayed elements get
        // renumbered at completion.
        allocate_eids(&mut commit_txn, &self.edit_txn);

        let base_txn = self.remote.repos().txn(self.base.revision)?;
        let left = base_txn.get_subtree(&self.base.bid, self.base_branch()?.root_eid())?;
        let right = self
            .edit_txn
            .get_subtree(&self.working_bid, self.working_branch()?.root_eid())?;
        replay(&mut commit_txn, &commit_bid, Some(&left), Some(&right))?;
        commit_txn.sequence_point();

        let commit_base_txn = self.remote.repos().txn(commit_base_rev)?;
        if !txn_is_changed(&commit_txn, commit_base_txn) {
            return Ok(None);
        }

        self.state = WcState::Committing;
        let message = message
            .or_else(|| self.list_of_commands.clone())
            .unwrap_or_default();
        let info = RevisionInfo::new(self.author.clone(), message);
        let new_rev = match self.remote.commit(commit_txn, info, revprops) {
            Ok(rev) => rev,
            Err(e) => {
                self.state = WcState::Dirty;
                return Err(e);
            }
        };

        self.notify.note(&format!("Committed r{new_rev}:"));
        self.display_committed_diff(commit_base_rev, new_rev, &commit_bid)?;

        self.head_revision = new_rev;
        self.list_of_commands = None;
        self.checkout(Some(new_rev), &commit_bid.clone())?;
        Ok(Some(new_rev))
    }

    /// Show the base -> committed diff, indented, after a commit.
    fn display_committed_diff(
        &self,
        base_rev: Rev,
        new_rev: Rev,
        commit_bid: &str,
    ) -> MoverResult<()> {
        let repos = self.remote.repos();
        // The committed branch may be new in this revision; diff from its
        // state in the previous head when present.
        let left_bid = if repos.get_branch_by_id(base_rev, &self.base.bid).is_ok() {
            self.base.bid.clone()
        } else {
            commit_bid.to_string()
        };
        let left_txn = repos.txn(base_rev)?;
        let right_txn = repos.txn(new_rev)?;
        let left_branch = repos.get_branch_by_id(base_rev, &left_bid)?;
        let right_branch = repos.get_branch_by_id(new_rev, commit_bid)?;
        let lines = diff::branch_diff_r(
            &DiffSide::new(left_txn, &left_bid, left_branch.root_eid(), Some(base_rev)),
            &DiffSide::new(right_txn, commit_bid, right_branch.root_eid(), Some(new_rev)),
            self.ui_mode,
            "   ",
        )?;
        self.notify.note_lines(&lines);
        Ok(())
    }

    // -- switch / update ---------------------------------------------------

    /// Switch to another branch and/or revision, carrying local changes
    /// across by a three-way merge (YCA: old base, SRC: old working,
    /// TGT: new working).
    pub fn switch(&mut self, revision: Option<Rev>, target_bid: &str) -> MoverResult<()> {
        let target_rev = revision.unwrap_or(self.head_revision);
        let target_branch = self
            .remote
            .repos()
            .get_branch_by_id(target_rev, target_bid)?;
        let target_root_eid = target_branch.root_eid();

        let has_local_changes = self.txn_is_changed()?;
        let prev_base_root = self.base_branch()?.root_eid();
        if has_local_changes && target_root_eid != prev_base_root {
            self.notify.note(&format!(
                "warning: switching from {} rooted at e{prev_base_root} to {target_bid} \
                 rooted at e{target_root_eid}, a different root element, \
                 while there are local changes",
                self.base.bid
            ));
        }

        self.sequence_point();

        // Keep hold of the previous base and working states for the merge.
        let prev_base = self
            .remote
            .repos()
            .txn(self.base.revision)?
            .get_subtree(&self.base.bid, prev_base_root)?;
        let prev_working = self
            .edit_txn
            .get_subtree(&self.working_bid, self.working_branch()?.root_eid())?;

        self.checkout(Some(target_rev), target_bid)?;

        if has_local_changes {
            let tgt = self
                .edit_txn
                .get_subtree(&self.working_bid, target_root_eid)?;
            match merge_trees(&prev_working.tree, &tgt.tree, &prev_base.tree) {
                MergeOutcome::Merged(merged) => {
                    // Transient ids created in the old txn survive the
                    // merge; the fresh txn's allocator must cover them.
                    for &eid in merged.elements.keys() {
                        self.edit_txn.cover_transient_eid(eid);
                    }
                    subtree_replay(
                        &mut self.edit_txn,
                        &self.working_bid.clone(),
                        Some(&tgt.tree),
                        Some(&merged),
                    )?;
                    self.sequence_point();
                    if self.txn_is_changed()? {
                        self.state = WcState::Dirty;
                    }
                }
                MergeOutcome::Conflict(report) => {
                    self.notify.note_lines(&report.render("switch: "));
                    self.state = WcState::Conflicted;
                    return Err(MoverError::Branching(format!(
                        "switch failed because of conflicts: {}",
                        report.summary()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Update to `rev`, staying on the current base branch.
    pub fn update(&mut self, rev: Rev) -> MoverResult<()> {
        let bid = self.base.bid.clone();
        self.switch(Some(rev), &bid)
    }

    // -- revert ------------------------------------------------------------

    /// Replay the inverse delta (working -> base) into the working
    /// branch, leaving an empty diff against base.
    pub fn revert(&mut self) -> MoverResult<()> {
        self.sequence_point();
        let left = self
            .edit_txn
            .get_subtree(&self.working_bid, self.working_branch()?.root_eid())?;
        let right = self
            .remote
            .repos()
            .txn(self.base.revision)?
            .get_subtree(&self.base.bid, self.base_branch()?.root_eid())?;
        let bid = self.working_bid.clone();
        replay(&mut self.edit_txn, &bid, Some(&left), Some(&right))?;
        self.sequence_point();
        self.state = WcState::Clean;
        Ok(())
    }

    // -- status / log ------------------------------------------------------

    /// The base -> working diff, rendered.
    pub fn status_lines(&self) -> MoverResult<Vec<String>> {
        let base_txn = self.remote.repos().txn(self.base.revision)?;
        let base_root = self.base_branch()?.root_eid();
        let working_root = self.working_branch()?.root_eid();
        diff::branch_diff_r(
            &DiffSide::new(base_txn, &self.base.bid, base_root, Some(self.base.revision)),
            &DiffSide::new(&self.edit_txn, &self.working_bid, working_root, None),
            self.ui_mode,
            "",
        )
    }

    /// The predecessor of `(rev, bid)` in a different revision, skipping
    /// same-revision branch hops.
    fn find_predecessor(&self, rev: Rev, bid: &str) -> MoverResult<Option<RevBid>> {
        let repos = self.remote.repos();
        let mut pred = repos.get_branch_by_id(rev, bid)?.predecessor.clone();
        while let Some(p) = &pred {
            if p.rev == rev {
                pred = repos.get_branch_by_id(rev, &p.bid)?.predecessor.clone();
            } else {
                break;
            }
        }
        Ok(pred)
    }

    /// Per-revision diffs between two historic locations of one branch
    /// lineage, newest first, walking predecessor pointers (the left end
    /// itself is excluded).
    pub fn log_lines(&self, from: &ElRev, to: &ElRev) -> MoverResult<Vec<String>> {
        let first_rev = from.rev.ok_or_else(|| {
            MoverError::Branching("log: the FROM location needs a revision".to_string())
        })?;
        let mut rev = to.rev.ok_or_else(|| {
            MoverError::Branching("log: the TO location needs a revision".to_string())
        })?;
        let mut bid = to.bid.clone();

        let repos = self.remote.repos();
        let mut out = Vec::new();
        while rev > first_rev {
            let pred = match self.find_predecessor(rev, &bid)? {
                Some(p) => p,
                None => break,
            };
            let info = &repos.get(rev)?.info;
            out.push("-".repeat(72));
            out.push(format!(
                "r{rev} | {} | {}",
                info.author,
                info.date.format("%Y-%m-%d %H:%M:%S")
            ));
            if !info.message.is_empty() {
                out.push(info.message.trim_end().to_string());
            }
            out.push("Changed elements:".to_string());

            let left_txn = repos.txn(pred.rev)?;
            let right_txn = repos.txn(rev)?;
            let left_branch = repos.get_branch_by_id(pred.rev, &pred.bid)?;
            let right_branch = repos.get_branch_by_id(rev, &bid)?;
            out.extend(diff::branch_diff_r(
                &DiffSide::new(left_txn, &pred.bid, left_branch.root_eid(), Some(pred.rev)),
                &DiffSide::new(right_txn, &bid, right_branch.root_eid(), Some(rev)),
                self.ui_mode,
                "   ",
            )?);

            rev = pred.rev;
            bid = pred.bid;
        }
        Ok(out)
    }

    // -- migrate -----------------------------------------------------------

    /// Replay path-based revisions `r1..=r2` through the migration editor,
    /// committing one element-based revision per source revision.
    pub fn migrate(&mut self, r1: Rev, r2: Rev) -> MoverResult<()> {
        check_migrate_range(r1, r2, self.head_revision)?;
        let moves = self.remote.repos_moves(r1, r2)?;
        let no_moves = Vec::new();

        for rev in r1..=r2 {
            let rev_moves = moves.get(&rev).unwrap_or(&no_moves);
            {
                let mut editor =
                    MigrationEditor::new(&mut self.edit_txn, self.working_bid.clone(), rev_moves);
                self.remote.replay_range(rev, rev, &mut editor)?;
            }
            if !rev_moves.is_empty() {
                self.notify.verbose(&format!("moves in revision r{rev}:"));
                for m in rev_moves {
                    self.notify.verbose(&format_move(m));
                }
            }
            let message = self.remote.repos().get(rev)?.info.message.clone();
            self.commit(Some(message), Props::new())?;
        }
        Ok(())
    }

    // -- selector resolution -----------------------------------------------

    /// Resolve `(revision, branch, relpath)` from user input to an
    /// element location.
    ///
    /// With a revision given, the default branch is the base branch and
    /// the lookup goes to the catalog; without one, the default is the
    /// working branch and the lookup goes to the edit transaction.
    pub fn find_el_rev(
        &self,
        revnum: Option<Rev>,
        branch_id: Option<&str>,
        relpath: &str,
    ) -> MoverResult<ElRev> {
        match revnum {
            Some(rev) => {
                let bid = branch_id.unwrap_or(&self.base.bid);
                self.remote.repos().find_el_rev_by_path_rev(rev, bid, relpath)
            }
            None => {
                let bid = branch_id.unwrap_or(&self.working_bid);
                let (found_bid, eid) = self
                    .edit_txn
                    .find_nested_element(bid, relpath)
                    .map_err(|_| {
                        MoverError::Branching(format!(
                            "branch {bid} not found in working state"
                        ))
                    })?;
                Ok(ElRev {
                    rev: None,
                    bid: found_bid,
                    eid,
                })
            }
        }
    }

    /// The transaction an [`ElRev`] refers to: a committed one from the
    /// catalog, or the live edit transaction.
    pub fn el_rev_txn(&self, el_rev: &ElRev) -> MoverResult<&BranchTxn> {
        match el_rev.rev {
            Some(rev) => self.remote.repos().txn(rev),
            None => Ok(&self.edit_txn),
        }
    }
}
