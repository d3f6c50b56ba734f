//! Three-way merge over element trees.
//!
//! For every element present in the common ancestor (YCA) or either side,
//! the change YCA->SRC and YCA->TGT is classified: untouched sides accept
//! the other side, identical changes collapse, disjoint attribute edits
//! merge attribute-wise, and the rest conflict. Two whole-tree checks
//! (sibling name clashes, orphaned elements) run on the candidate result.
//! Only a conflict-free merge is handed back for application; otherwise
//! the target is left untouched and the report is surfaced.

use std::collections::{BTreeMap, BTreeSet};

use crate::element::{Eid, ElementContent, ElementTree, NO_EID};

/// A single element changed incompatibly on both sides.
#[derive(Debug, Clone)]
pub struct SingleElementConflict {
    pub yca: Option<ElementContent>,
    pub src: Option<ElementContent>,
    pub tgt: Option<ElementContent>,
}

impl SingleElementConflict {
    /// True for the delete-on-one-side, modify-on-the-other case.
    pub fn is_delete_vs_modify(&self) -> bool {
        self.src.is_none() != self.tgt.is_none()
    }
}

/// Two distinct elements ended up as same-named siblings.
#[derive(Debug, Clone)]
pub struct NameClashConflict {
    pub parent_eid: Eid,
    pub name: String,
    pub eids: Vec<Eid>,
}

/// An element whose parent is missing from the merged tree.
#[derive(Debug, Clone)]
pub struct OrphanConflict {
    pub eid: Eid,
    pub missing_parent: Eid,
}

/// The structured outcome of a conflicted merge.
#[derive(Debug, Clone, Default)]
pub struct ConflictReport {
    pub single_element: BTreeMap<Eid, SingleElementConflict>,
    pub name_clash: BTreeMap<(Eid, String), NameClashConflict>,
    pub orphan: BTreeMap<Eid, OrphanConflict>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.single_element.is_empty() && self.name_clash.is_empty() && self.orphan.is_empty()
    }

    /// One-line count summary used in error messages.
    pub fn summary(&self) -> String {
        format!(
            "{} single-element conflicts, {} name-clash conflicts, {} orphan conflicts",
            self.single_element.len(),
            self.name_clash.len(),
            self.orphan.len()
        )
    }

    /// Human-readable lines, each starting with `prefix`.
    pub fn render(&self, prefix: &str) -> Vec<String> {
        let mut out = Vec::new();
        let describe = |c: &Option<ElementContent>| match c {
            Some(e) if e.is_root() => "(root)".to_string(),
            Some(e) => format!("e{}/{}", e.parent_eid, e.name),
            None => "(deleted)".to_string(),
        };
        for (eid, c) in &self.single_element {
            let kind = if c.is_delete_vs_modify() {
                "delete-vs-modify"
            } else {
                "incompatible changes"
            };
            out.push(format!(
                "{prefix}single-element conflict on e{eid} ({kind}): yca {}, side 1 {}, side 2 {}",
                describe(&c.yca),
                describe(&c.src),
                describe(&c.tgt)
            ));
        }
        for c in self.name_clash.values() {
            let eids: Vec<String> = c.eids.iter().map(|e| format!("e{e}")).collect();
            out.push(format!(
                "{prefix}name-clash conflict: {} under e{} named '{}'",
                eids.join(" and "),
                c.parent_eid,
                c.name
            ));
        }
        for c in self.orphan.values() {
            out.push(format!(
                "{prefix}orphan conflict: e{} has no parent e{}",
                c.eid, c.missing_parent
            ));
        }
        out
    }
}

/// The result of [`merge_trees`]: either the merged tree, ready to be
/// applied to the target branch, or the reasons it cannot be.
#[derive(Debug)]
pub enum MergeOutcome {
    Merged(ElementTree),
    Conflict(ConflictReport),
}

/// Merge one attribute three ways. `None` means both sides changed it
/// differently.
fn merge_attr<T: PartialEq + Clone>(yca: &T, src: &T, tgt: &T) -> Option<T> {
    if src == yca {
        Some(tgt.clone())
    } else if tgt == yca || src == tgt {
        Some(src.clone())
    } else {
        None
    }
}

/// Three-way merge of the trees rooted at YCA, SRC, and TGT.
///
/// The merged tree keeps TGT's root eid. The target itself is never
/// touched here; applying the result is the caller's move.
pub fn merge_trees(src: &ElementTree, tgt: &ElementTree, yca: &ElementTree) -> MergeOutcome {
    let mut report = ConflictReport::default();
    let mut merged = ElementTree::new(tgt.root_eid);

    let eids: BTreeSet<Eid> = yca
        .elements
        .keys()
        .chain(src.elements.keys())
        .chain(tgt.elements.keys())
        .copied()
        .collect();

    for eid in eids {
        let e_yca = yca.get(eid);
        let e_src = src.get(eid);
        let e_tgt = tgt.get(eid);

        let result = if e_src == e_yca {
            e_tgt.cloned()
        } else if e_tgt == e_yca {
            e_src.cloned()
        } else if e_src == e_tgt {
            e_src.cloned()
        } else if e_src.is_none() || e_tgt.is_none() {
            // Deleted on one side, changed on the other.
            report.single_element.insert(
                eid,
                SingleElementConflict {
                    yca: e_yca.cloned(),
                    src: e_src.cloned(),
                    tgt: e_tgt.cloned(),
                },
            );
            // Keep TGT's view for the whole-tree checks below.
            e_tgt.cloned()
        } else {
            let (s, t) = (e_src.expect("both present"), e_tgt.expect("both present"));
            match e_yca {
                Some(y) => {
                    let parent = merge_attr(&y.parent_eid, &s.parent_eid, &t.parent_eid);
                    let name = merge_attr(&y.name, &s.name, &t.name);
                    let payload = merge_attr(&y.payload, &s.payload, &t.payload);
                    match (parent, name, payload) {
                        (Some(parent_eid), Some(name), Some(payload)) => {
                            Some(ElementContent::new(parent_eid, name, payload))
                        }
                        _ => {
                            report.single_element.insert(
                                eid,
                                SingleElementConflict {
                                    yca: e_yca.cloned(),
                                    src: e_src.cloned(),
                                    tgt: e_tgt.cloned(),
                                },
                            );
                            e_tgt.cloned()
                        }
                    }
                }
                None => {
                    // Added on both sides with different content.
                    report.single_element.insert(
                        eid,
                        SingleElementConflict {
                            yca: None,
                            src: e_src.cloned(),
                            tgt: e_tgt.cloned(),
                        },
                    );
                    e_tgt.cloned()
                }
            }
        };

        if let Some(content) = result {
            merged.set(eid, content);
        }
    }

    // Whole-tree check: two distinct eids as same-named siblings.
    let mut by_name: BTreeMap<(Eid, String), Vec<Eid>> = BTreeMap::new();
    for (&eid, content) in &merged.elements {
        if !content.is_root() {
            by_name
                .entry((content.parent_eid, content.name.clone()))
                .or_default()
                .push(eid);
        }
    }
    for ((parent_eid, name), eids) in by_name {
        if eids.len() > 1 {
            report.name_clash.insert(
                (parent_eid, name.clone()),
                NameClashConflict {
                    parent_eid,
                    name,
                    eids,
                },
            );
        }
    }

    // Whole-tree check: elements whose parent is missing.
    for (&eid, content) in &merged.elements {
        if content.parent_eid != NO_EID && !merged.contains(content.parent_eid) {
            report.orphan.insert(
                eid,
                OrphanConflict {
                    eid,
                    missing_parent: content.parent_eid,
                },
            );
        }
    }

    if report.is_empty() {
        MergeOutcome::Merged(merged)
    } else {
        MergeOutcome::Conflict(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Payload, Props};

    fn dir() -> Payload {
        Payload::empty_dir()
    }

    fn file(text: &[u8]) -> Payload {
        Payload::file(Props::new(), text.to_vec())
    }

    fn base_tree() -> ElementTree {
        let mut t = ElementTree::new(0);
        t.set(0, ElementContent::root(dir()));
        t.set(1, ElementContent::new(0, "A", file(b"v1")));
        t.set(2, ElementContent::new(0, "D", dir()));
        t
    }

    fn expect_merged(outcome: MergeOutcome) -> ElementTree {
        match outcome {
            MergeOutcome::Merged(t) => t,
            MergeOutcome::Conflict(r) => panic!("unexpected conflicts: {}", r.summary()),
        }
    }

    fn expect_conflict(outcome: MergeOutcome) -> ConflictReport {
        match outcome {
            MergeOutcome::Conflict(r) => r,
            MergeOutcome::Merged(_) => panic!("expected conflicts"),
        }
    }

    #[test]
    fn test_unchanged_src_accepts_tgt() {
        let yca = base_tree();
        let src = yca.clone();
        let mut tgt = yca.clone();
        tgt.set(1, ElementContent::new(0, "A", file(b"tgt")));

        let merged = expect_merged(merge_trees(&src, &tgt, &yca));
        assert_eq!(merged, tgt);
    }

    #[test]
    fn test_unchanged_tgt_accepts_src() {
        let yca = base_tree();
        let mut src = yca.clone();
        src.remove(1);
        let tgt = yca.clone();

        let merged = expect_merged(merge_trees(&src, &tgt, &yca));
        assert!(!merged.contains(1));
    }

    #[test]
    fn test_identical_changes_collapse() {
        let yca = base_tree();
        let mut src = yca.clone();
        src.set(1, ElementContent::new(0, "A2", file(b"v1")));
        let tgt = src.clone();

        let merged = expect_merged(merge_trees(&src, &tgt, &yca));
        assert_eq!(merged.get(1).unwrap().name, "A2");
    }

    #[test]
    fn test_rename_vs_payload_edit_merges_attribute_wise() {
        let yca = base_tree();
        let mut src = yca.clone();
        src.set(1, ElementContent::new(0, "A-renamed", file(b"v1")));
        let mut tgt = yca.clone();
        tgt.set(1, ElementContent::new(0, "A", file(b"tgt-edit")));

        let merged = expect_merged(merge_trees(&src, &tgt, &yca));
        let e1 = merged.get(1).unwrap();
        assert_eq!(e1.name, "A-renamed");
        assert_eq!(e1.payload, file(b"tgt-edit"));
    }

    #[test]
    fn test_move_vs_rename_merges_attribute_wise() {
        let yca = base_tree();
        let mut src = yca.clone();
        src.set(1, ElementContent::new(2, "A", file(b"v1")));
        let mut tgt = yca.clone();
        tgt.set(1, ElementContent::new(0, "B", file(b"v1")));

        let merged = expect_merged(merge_trees(&src, &tgt, &yca));
        let e1 = merged.get(1).unwrap();
        assert_eq!(e1.parent_eid, 2);
        assert_eq!(e1.name, "B");
    }

    #[test]
    fn test_same_attribute_conflicts() {
        let yca = base_tree();
        let mut src = yca.clone();
        src.set(1, ElementContent::new(0, "A", file(b"src")));
        let mut tgt = yca.clone();
        tgt.set(1, ElementContent::new(0, "A", file(b"tgt")));

        let report = expect_conflict(merge_trees(&src, &tgt, &yca));
        assert!(report.single_element.contains_key(&1));
        assert!(!report.single_element[&1].is_delete_vs_modify());
    }

    #[test]
    fn test_delete_vs_modify_conflicts() {
        let yca = base_tree();
        let mut src = yca.clone();
        src.remove(1);
        let mut tgt = yca.clone();
        tgt.set(1, ElementContent::new(0, "A", file(b"tgt")));

        let report = expect_conflict(merge_trees(&src, &tgt, &yca));
        assert!(report.single_element[&1].is_delete_vs_modify());
    }

    #[test]
    fn test_name_clash_detected() {
        let yca = base_tree();
        let mut src = yca.clone();
        let mut tgt = yca.clone();
        // Each side adds a different element named "new" under the root.
        src.set(10, ElementContent::new(0, "new", dir()));
        tgt.set(11, ElementContent::new(0, "new", dir()));

        let report = expect_conflict(merge_trees(&src, &tgt, &yca));
        let clash = &report.name_clash[&(0, "new".to_string())];
        assert_eq!(clash.eids, vec![10, 11]);
    }

    #[test]
    fn test_orphan_detected() {
        let yca = base_tree();
        let mut src = yca.clone();
        src.remove(2);
        let mut tgt = yca.clone();
        // TGT adds a child under the directory SRC deletes.
        tgt.set(12, ElementContent::new(2, "kid", file(b"k")));

        let report = expect_conflict(merge_trees(&src, &tgt, &yca));
        assert_eq!(report.orphan[&12].missing_parent, 2);
    }

    #[test]
    fn test_clean_merge_report_renders_counts() {
        let yca = base_tree();
        let mut src = yca.clone();
        src.set(1, ElementContent::new(0, "A", file(b"src")));
        let mut tgt = yca.clone();
        tgt.set(1, ElementContent::new(0, "A", file(b"tgt")));

        let report = expect_conflict(merge_trees(&src, &tgt, &yca));
        assert!(report.summary().starts_with("1 single-element"));
        assert_eq!(report.render("merge: ").len(), 1);
        assert!(report.render("merge: ")[0].starts_with("merge: "));
    }
}
