//! The element data model.
//!
//! An element is a logical object (directory, file, or subbranch root)
//! identified by a stable integer id that survives moves, renames, and
//! branching. A branch's content is an [`ElementTree`]: a mapping from
//! element id to [`ElementContent`] plus a designated root.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{MoverError, MoverResult};
use crate::relpath;

/// A stable element id.
///
/// Non-negative ids are persistent across branches and revisions.
/// Negative ids below [`NO_EID`] are transient, used for elements created
/// inside an uncommitted transaction and renumbered at commit.
pub type Eid = i32;

/// Sentinel parent id carried by a branch-root element.
pub const NO_EID: Eid = -1;

/// Element properties: name to byte-string value.
pub type Props = BTreeMap<String, Vec<u8>>;

/// What an element is, and its user content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Payload {
    /// A directory carrying properties.
    Dir { props: Props },
    /// A file carrying properties and a byte blob.
    File { props: Props, text: Vec<u8> },
    /// The element in an outer branch at which a nested branch is rooted.
    SubbranchRoot,
}

impl Payload {
    /// An empty directory payload.
    pub fn empty_dir() -> Self {
        Payload::Dir { props: Props::new() }
    }

    /// A file payload with the given properties and text.
    pub fn file(props: Props, text: Vec<u8>) -> Self {
        Payload::File { props, text }
    }

    pub fn is_subbranch_root(&self) -> bool {
        matches!(self, Payload::SubbranchRoot)
    }

    /// The element's properties, if this payload kind carries any.
    pub fn props(&self) -> Option<&Props> {
        match self {
            Payload::Dir { props } | Payload::File { props, .. } => Some(props),
            Payload::SubbranchRoot => None,
        }
    }

    /// The file text, if this is a file.
    pub fn text(&self) -> Option<&[u8]> {
        match self {
            Payload::File { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// An element's tree position and content: `(parent_eid, name, payload)`.
///
/// Replaced wholesale on every mutation; never edited in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementContent {
    /// The eid of the containing directory, or [`NO_EID`] for a branch root.
    pub parent_eid: Eid,
    /// Path component within the parent; empty iff this is a branch root.
    pub name: String,
    pub payload: Payload,
}

impl ElementContent {
    pub fn new(parent_eid: Eid, name: impl Into<String>, payload: Payload) -> Self {
        ElementContent {
            parent_eid,
            name: name.into(),
            payload,
        }
    }

    /// Content for a branch-root element (`parent_eid == NO_EID`, empty name).
    pub fn root(payload: Payload) -> Self {
        ElementContent::new(NO_EID, "", payload)
    }

    pub fn is_root(&self) -> bool {
        self.parent_eid == NO_EID
    }
}

/// A mapping `eid -> ElementContent` plus the root eid.
///
/// The tree may transiently hold unreachable elements ("orphans") while a
/// transaction is being edited; a sequence point purges them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementTree {
    pub root_eid: Eid,
    pub elements: BTreeMap<Eid, ElementContent>,
}

impl ElementTree {
    /// An empty tree with the given root eid (no elements yet).
    pub fn new(root_eid: Eid) -> Self {
        ElementTree {
            root_eid,
            elements: BTreeMap::new(),
        }
    }

    pub fn get(&self, eid: Eid) -> Option<&ElementContent> {
        self.elements.get(&eid)
    }

    pub fn set(&mut self, eid: Eid, content: ElementContent) {
        self.elements.insert(eid, content);
    }

    pub fn remove(&mut self, eid: Eid) -> Option<ElementContent> {
        self.elements.remove(&eid)
    }

    pub fn contains(&self, eid: Eid) -> bool {
        self.elements.contains_key(&eid)
    }

    /// The direct children of `parent`, in eid order.
    pub fn children(&self, parent: Eid) -> impl Iterator<Item = (Eid, &ElementContent)> {
        self.elements
            .iter()
            .filter(move |(_, c)| c.parent_eid == parent)
            .map(|(&e, c)| (e, c))
    }

    /// Look up a direct child of `parent` by name.
    pub fn child_by_name(&self, parent: Eid, name: &str) -> Option<Eid> {
        self.children(parent)
            .find(|(_, c)| c.name == name)
            .map(|(e, _)| e)
    }

    /// The relpath of `eid` from the tree root, or `None` when the element
    /// is absent or not path-reachable (an ancestor is missing).
    pub fn path_by_eid(&self, eid: Eid) -> Option<String> {
        if eid == self.root_eid {
            return self.contains(eid).then(String::new);
        }
        let mut names: Vec<&str> = Vec::new();
        let mut cur = eid;
        // The step bound guards against parent cycles mid-edit.
        for _ in 0..=self.elements.len() {
            let content = self.get(cur)?;
            names.push(&content.name);
            if content.parent_eid == self.root_eid {
                names.reverse();
                return Some(names.join("/"));
            }
            cur = content.parent_eid;
        }
        None
    }

    /// Resolve a relpath to an eid; `""` names the root.
    pub fn eid_by_path(&self, relpath: &str) -> Option<Eid> {
        let mut cur = self.root_eid;
        if !self.contains(cur) {
            return None;
        }
        if relpath.is_empty() {
            return Some(cur);
        }
        for name in relpath.split('/') {
            cur = self.child_by_name(cur, name)?;
        }
        Some(cur)
    }

    /// All eids path-reachable from `from` (inclusive), in eid order.
    pub fn reachable_from(&self, from: Eid) -> BTreeSet<Eid> {
        let mut reached = BTreeSet::new();
        if !self.contains(from) {
            return reached;
        }
        reached.insert(from);
        // Elements are unordered, so iterate until a pass adds nothing.
        loop {
            let mut grew = false;
            for (&e, c) in &self.elements {
                if !reached.contains(&e) && reached.contains(&c.parent_eid) {
                    reached.insert(e);
                    grew = true;
                }
            }
            if !grew {
                return reached;
            }
        }
    }

    /// Drop every element that is not path-reachable from the root.
    /// Returns the purged eids.
    pub fn purge_orphans(&mut self) -> Vec<Eid> {
        let keep = self.reachable_from(self.root_eid);
        let orphans: Vec<Eid> = self
            .elements
            .keys()
            .copied()
            .filter(|e| !keep.contains(e))
            .collect();
        for e in &orphans {
            self.elements.remove(e);
        }
        orphans
    }

    /// Verify the committed-tree invariants: the root is present in root
    /// form, every element is reachable, and sibling names are unique.
    pub fn check_integrity(&self) -> MoverResult<()> {
        let root = self.get(self.root_eid).ok_or_else(|| {
            MoverError::Branching(format!("root element e{} is not mapped", self.root_eid))
        })?;
        if !root.is_root() || !root.name.is_empty() {
            return Err(MoverError::Branching(format!(
                "root element e{} is not in root form",
                self.root_eid
            )));
        }
        let reached = self.reachable_from(self.root_eid);
        for (&e, c) in &self.elements {
            if e != self.root_eid && (c.is_root() || c.name.is_empty()) {
                return Err(MoverError::Branching(format!(
                    "non-root element e{e} is in root form"
                )));
            }
            if !reached.contains(&e) {
                return Err(MoverError::Branching(format!("element e{e} is an orphan")));
            }
        }
        let mut seen: BTreeSet<(Eid, &str)> = BTreeSet::new();
        for c in self.elements.values() {
            if !c.is_root() && !seen.insert((c.parent_eid, c.name.as_str())) {
                return Err(MoverError::Branching(format!(
                    "siblings under e{} share the name '{}'",
                    c.parent_eid, c.name
                )));
            }
        }
        Ok(())
    }

    /// Extract the subtree rooted at `from` as a standalone tree.
    ///
    /// The extracted root is normalized to root form; all other elements
    /// keep their eids and positions.
    pub fn subtree_at(&self, from: Eid) -> Option<ElementTree> {
        let root = self.get(from)?;
        let mut tree = ElementTree::new(from);
        tree.set(from, ElementContent::root(root.payload.clone()));
        for e in self.reachable_from(from) {
            if e != from {
                tree.set(e, self.get(e).expect("reachable element mapped").clone());
            }
        }
        Some(tree)
    }

    /// Map every eid in the tree through `f`: keys, parent references,
    /// and the root eid.
    pub fn map_eids(&mut self, f: impl Fn(Eid) -> Eid) {
        let old = std::mem::take(&mut self.elements);
        self.root_eid = f(self.root_eid);
        for (e, mut c) in old {
            if c.parent_eid != NO_EID {
                c.parent_eid = f(c.parent_eid);
            }
            self.elements.insert(f(e), c);
        }
    }
}

/// Join a parent element's path with a child name, for notifications
/// about elements that may not be in the tree yet.
pub fn display_child_path(tree: &ElementTree, parent_eid: Eid, name: &str) -> String {
    match tree.path_by_eid(parent_eid) {
        Some(p) => relpath::join(&p, name),
        None => format!("e{parent_eid}/{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir() -> Payload {
        Payload::empty_dir()
    }

    fn sample_tree() -> ElementTree {
        // e0 root, e1 "A", e2 "A/B", e3 "A/B/f"
        let mut t = ElementTree::new(0);
        t.set(0, ElementContent::root(dir()));
        t.set(1, ElementContent::new(0, "A", dir()));
        t.set(2, ElementContent::new(1, "B", dir()));
        t.set(3, ElementContent::new(2, "f", Payload::file(Props::new(), b"hi".to_vec())));
        t
    }

    #[test]
    fn test_path_by_eid() {
        let t = sample_tree();
        assert_eq!(t.path_by_eid(0).as_deref(), Some(""));
        assert_eq!(t.path_by_eid(1).as_deref(), Some("A"));
        assert_eq!(t.path_by_eid(3).as_deref(), Some("A/B/f"));
        assert_eq!(t.path_by_eid(99), None);
    }

    #[test]
    fn test_eid_by_path() {
        let t = sample_tree();
        assert_eq!(t.eid_by_path(""), Some(0));
        assert_eq!(t.eid_by_path("A/B"), Some(2));
        assert_eq!(t.eid_by_path("A/B/f"), Some(3));
        assert_eq!(t.eid_by_path("A/x"), None);
    }

    #[test]
    fn test_orphan_is_unreachable() {
        let mut t = sample_tree();
        t.remove(1);
        // B and f lost their ancestor chain.
        assert_eq!(t.path_by_eid(2), None);
        assert_eq!(t.path_by_eid(3), None);
        let purged = t.purge_orphans();
        assert_eq!(purged, vec![2, 3]);
        assert!(t.check_integrity().is_ok());
    }

    #[test]
    fn test_integrity_rejects_name_clash() {
        let mut t = sample_tree();
        t.set(4, ElementContent::new(0, "A", dir()));
        assert!(t.check_integrity().is_err());
    }

    #[test]
    fn test_integrity_rejects_orphan() {
        let mut t = sample_tree();
        t.set(9, ElementContent::new(42, "lost", dir()));
        assert!(t.check_integrity().is_err());
    }

    #[test]
    fn test_subtree_at_normalizes_root() {
        let t = sample_tree();
        let sub = t.subtree_at(1).unwrap();
        assert_eq!(sub.root_eid, 1);
        assert!(sub.get(1).unwrap().is_root());
        assert_eq!(sub.path_by_eid(3).as_deref(), Some("B/f"));
        assert!(!sub.contains(0));
    }

    #[test]
    fn test_map_eids_rewrites_parents() {
        let mut t = sample_tree();
        t.map_eids(|e| e + 10);
        assert_eq!(t.root_eid, 10);
        assert_eq!(t.path_by_eid(13).as_deref(), Some("A/B/f"));
        assert_eq!(t.get(11).unwrap().parent_eid, 10);
    }

    #[test]
    fn test_cycle_does_not_hang_path_lookup() {
        let mut t = ElementTree::new(0);
        t.set(0, ElementContent::root(dir()));
        t.set(1, ElementContent::new(2, "a", dir()));
        t.set(2, ElementContent::new(1, "b", dir()));
        assert_eq!(t.path_by_eid(1), None);
    }
}
