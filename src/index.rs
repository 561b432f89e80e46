//! Probe-location index: an AVL tree mapping probe-set names to cell coordinates.
//!
//! The tree is built once per chip description and queried by exact name. Nodes
//! own their children through `Option<Box<Node>>`; rotations take a subtree root
//! by value and return the rebuilt root, so no node is ever aliased.
//!
//! # Example
//!
//! ```
//! use affyingest::index::ProbeLocationIndex;
//!
//! let mut index = ProbeLocationIndex::new();
//! index.insert("AFFX-1", vec![5, 1005], None).unwrap();
//! index.insert("AFFX-2", vec![7], Some(vec![8])).unwrap();
//!
//! let set = index.find("AFFX-1").unwrap();
//! assert_eq!(set.pm(), &[5, 1005]);
//! assert_eq!(set.mm_count(), 0);
//! assert!(index.find("AFFX-3").is_none());
//! ```

use std::cmp::Ordering;
use std::fmt;

/// One probe set's perfect-match and mismatch cell indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeCellSet {
    name: String,
    pm: Vec<usize>,
    mm: Option<Vec<usize>>,
}

impl ProbeCellSet {
    /// Build a probe set. An empty MM list is stored as "no MM cells".
    pub fn new(name: impl Into<String>, pm: Vec<usize>, mm: Option<Vec<usize>>) -> Self {
        Self {
            name: name.into(),
            pm,
            mm: mm.filter(|cells| !cells.is_empty()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Perfect-match cell indices, in file order.
    #[must_use]
    pub fn pm(&self) -> &[usize] {
        &self.pm
    }

    /// Mismatch cell indices, if the chip carries any for this probe set.
    #[must_use]
    pub fn mm(&self) -> Option<&[usize]> {
        self.mm.as_deref()
    }

    #[must_use]
    pub fn pm_count(&self) -> usize {
        self.pm.len()
    }

    #[must_use]
    pub fn mm_count(&self) -> usize {
        self.mm.as_ref().map_or(0, Vec::len)
    }
}

/// Returned by [`ProbeLocationIndex::insert`] when the name is already present.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateName(pub String);

impl fmt::Display for DuplicateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "duplicate probe set name {}", self.0)
    }
}

impl std::error::Error for DuplicateName {}

struct Node {
    set: ProbeCellSet,
    /// Right height minus left height, always in -1..=1 between inserts.
    skew: i8,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn leaf(set: ProbeCellSet) -> Box<Self> {
        Box::new(Self {
            set,
            skew: 0,
            left: None,
            right: None,
        })
    }
}

/// AVL-balanced map from probe-set name to [`ProbeCellSet`].
#[derive(Default)]
pub struct ProbeLocationIndex {
    root: Option<Box<Node>>,
    len: usize,
}

impl fmt::Debug for ProbeLocationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeLocationIndex")
            .field("len", &self.len)
            .field("height", &self.height())
            .finish()
    }
}

impl ProbeLocationIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a probe set.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateName`] if a probe set with this name is already
    /// indexed; the tree is left unchanged.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        pm: Vec<usize>,
        mm: Option<Vec<usize>>,
    ) -> Result<(), DuplicateName> {
        self.insert_set(ProbeCellSet::new(name, pm, mm))
    }

    /// Insert an already-built probe set.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateName`] if the name is already indexed.
    pub fn insert_set(&mut self, set: ProbeCellSet) -> Result<(), DuplicateName> {
        if self.find(set.name()).is_some() {
            return Err(DuplicateName(set.name));
        }
        let (root, _) = insert_node(self.root.take(), set);
        self.root = Some(root);
        self.len += 1;
        Ok(())
    }

    /// Exact-name lookup.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&ProbeCellSet> {
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            cur = match name.as_bytes().cmp(node.set.name.as_bytes()) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(&node.set),
            };
        }
        None
    }

    /// Height of the tree; an empty tree has height 0.
    #[must_use]
    pub fn height(&self) -> usize {
        fn go(node: Option<&Node>) -> usize {
            node.map_or(0, |n| 1 + go(n.left.as_deref()).max(go(n.right.as_deref())))
        }
        go(self.root.as_deref())
    }

    /// In-order (name-sorted) iterator over the probe sets.
    pub fn iter(&self) -> Iter<'_> {
        let mut it = Iter { stack: Vec::new() };
        it.push_left(self.root.as_deref());
        it
    }

    /// All probe-set names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(ProbeCellSet::name).collect()
    }

    /// Verify ordering and that every stored skew matches the real subtree heights.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        fn check(node: Option<&Node>) -> Option<usize> {
            let Some(n) = node else { return Some(0) };
            if let Some(l) = n.left.as_deref()
                && l.set.name >= n.set.name
            {
                return None;
            }
            if let Some(r) = n.right.as_deref()
                && r.set.name <= n.set.name
            {
                return None;
            }
            let lh = check(n.left.as_deref())?;
            let rh = check(n.right.as_deref())?;
            let skew = rh as i64 - lh as i64;
            (skew == i64::from(n.skew) && skew.abs() <= 1).then_some(1 + lh.max(rh))
        }
        check(self.root.as_deref()).is_some()
    }
}

impl<'a> IntoIterator for &'a ProbeLocationIndex {
    type Item = &'a ProbeCellSet;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// In-order iterator returned by [`ProbeLocationIndex::iter`].
pub struct Iter<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iter<'a> {
    fn push_left(&mut self, mut node: Option<&'a Node>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = n.left.as_deref();
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a ProbeCellSet;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        Some(&node.set)
    }
}

/// Insert below `slot`, returning the new subtree root and whether it grew taller.
/// Callers have already rejected duplicate names.
fn insert_node(slot: Option<Box<Node>>, set: ProbeCellSet) -> (Box<Node>, bool) {
    let Some(mut node) = slot else {
        return (Node::leaf(set), true);
    };
    match set.name.as_bytes().cmp(node.set.name.as_bytes()) {
        Ordering::Less => {
            let (child, grew) = insert_node(node.left.take(), set);
            node.left = Some(child);
            if !grew {
                return (node, false);
            }
            match node.skew {
                1 => {
                    node.skew = 0;
                    (node, false)
                }
                0 => {
                    node.skew = -1;
                    (node, true)
                }
                _ => (rebalance_left_heavy(node), false),
            }
        }
        Ordering::Greater => {
            let (child, grew) = insert_node(node.right.take(), set);
            node.right = Some(child);
            if !grew {
                return (node, false);
            }
            match node.skew {
                -1 => {
                    node.skew = 0;
                    (node, false)
                }
                0 => {
                    node.skew = 1;
                    (node, true)
                }
                _ => (rebalance_right_heavy(node), false),
            }
        }
        Ordering::Equal => {
            node.set = set;
            (node, false)
        }
    }
}

/// `node` was left-heavy and its left subtree grew: rotate right (single or double).
fn rebalance_left_heavy(mut node: Box<Node>) -> Box<Node> {
    let Some(mut left) = node.left.take() else {
        return node;
    };
    if left.skew <= 0 {
        node.left = left.right.take();
        node.skew = 0;
        left.skew = 0;
        left.right = Some(node);
        return left;
    }
    let Some(mut pivot) = left.right.take() else {
        node.left = Some(left);
        return node;
    };
    left.right = pivot.left.take();
    node.left = pivot.right.take();
    (left.skew, node.skew) = match pivot.skew {
        -1 => (0, 1),
        1 => (-1, 0),
        _ => (0, 0),
    };
    pivot.skew = 0;
    pivot.left = Some(left);
    pivot.right = Some(node);
    pivot
}

/// Mirror of [`rebalance_left_heavy`].
fn rebalance_right_heavy(mut node: Box<Node>) -> Box<Node> {
    let Some(mut right) = node.right.take() else {
        return node;
    };
    if right.skew >= 0 {
        node.right = right.left.take();
        node.skew = 0;
        right.skew = 0;
        right.left = Some(node);
        return right;
    }
    let Some(mut pivot) = right.left.take() else {
        node.right = Some(right);
        return node;
    };
    right.left = pivot.right.take();
    node.right = pivot.left.take();
    (right.skew, node.skew) = match pivot.skew {
        1 => (0, -1),
        -1 => (1, 0),
        _ => (0, 0),
    };
    pivot.skew = 0;
    pivot.left = Some(node);
    pivot.right = Some(right);
    pivot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascending_inserts_stay_balanced() {
        let mut index = ProbeLocationIndex::new();
        for i in 0..1000 {
            index.insert(format!("ps{i:05}"), vec![i], None).unwrap();
        }
        assert!(index.is_balanced());
        assert_eq!(index.len(), 1000);
        // 1.44 * log2(1002) ~= 14.35
        assert!(index.height() <= 15);
    }

    #[test]
    fn test_double_rotation_cases() {
        for order in [["c", "a", "b"], ["a", "c", "b"]] {
            let mut index = ProbeLocationIndex::new();
            for name in order {
                index.insert(name, vec![], None).unwrap();
            }
            assert!(index.is_balanced());
            assert_eq!(index.height(), 2);
            assert_eq!(index.names(), vec!["a", "b", "c"]);
        }
    }

    #[test]
    fn test_duplicate_rejected_and_tree_unchanged() {
        let mut index = ProbeLocationIndex::new();
        index.insert("x", vec![1], None).unwrap();
        let err = index.insert("x", vec![2], None).unwrap_err();
        assert_eq!(err, DuplicateName("x".into()));
        assert_eq!(index.len(), 1);
        assert_eq!(index.find("x").unwrap().pm(), &[1]);
    }

    #[test]
    fn test_empty_mm_is_none() {
        let set = ProbeCellSet::new("p", vec![1, 2], Some(vec![]));
        assert!(set.mm().is_none());
        assert_eq!(set.mm_count(), 0);
    }
}
