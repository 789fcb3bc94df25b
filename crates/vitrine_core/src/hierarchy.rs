//! Hierarchy index contract and its nested-interval implementation.
//!
//! Nodes are identified by a string code (the stringified primary key of the
//! hierarchical entity). Every node owns a fixed interval `[left, right]`; all
//! descendants fall inside it, which lets the store answer subtree queries with
//! plain range predicates.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::{VitrineError, VitrineResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyItem {
    pub code: String,
    pub parent_code: Option<String>,
    pub left_bound: i64,
    pub right_bound: i64,
    pub level: u16,
    pub order: u16,
}

pub trait HierarchyIndex: Send + Sync {
    fn create_root_item(&self, code: &str) -> VitrineResult<HierarchyItem>;

    fn create_item(&self, code: &str, parent_code: &str) -> VitrineResult<HierarchyItem>;

    /// Re-creates a persisted item at its recorded left bound. Later siblings are
    /// allocated after it even when earlier slots stay empty.
    fn restore_item(
        &self,
        code: &str,
        parent_code: Option<&str>,
        left_bound: i64,
    ) -> VitrineResult<HierarchyItem>;

    /// Forgets a leaf item that never reached storage. Its slot is not handed out again.
    fn remove_item(&self, code: &str) -> VitrineResult<()>;

    /// `None` when the code was never created.
    fn item(&self, code: &str) -> VitrineResult<Option<HierarchyItem>>;

    /// `None` for root items; fails for unknown codes.
    fn parent_item(&self, code: &str) -> VitrineResult<Option<HierarchyItem>>;

    /// Ancestors of `code`, oldest first, excluding the item itself.
    fn parent_items(&self, code: &str) -> VitrineResult<Vec<HierarchyItem>>;

    fn child_items(&self, code: &str) -> VitrineResult<Vec<HierarchyItem>>;

    fn root_items(&self) -> VitrineResult<Vec<HierarchyItem>>;
}

#[derive(Debug)]
struct Node {
    item: HierarchyItem,
    children: Vec<String>,
    next_child: usize,
}

#[derive(Debug, Default)]
struct Tree {
    nodes: HashMap<String, Node>,
    roots: Vec<String>,
    next_root: usize,
}

#[derive(Debug)]
pub struct NestedIntervalHierarchy {
    section_size: u16,
    levels: u16,
    tree: RwLock<Tree>,
}

impl NestedIntervalHierarchy {
    pub fn new(section_size: u16, levels: u16) -> VitrineResult<Self> {
        if section_size < 2 || levels == 0 {
            return Err(VitrineError::invalid(
                "hierarchy needs at least two sections and one level",
            ));
        }
        let capacity = u64::from(section_size)
            .checked_pow(u32::from(levels))
            .filter(|capacity| *capacity <= i64::MAX as u64);
        if capacity.is_none() {
            return Err(VitrineError::invalid(format!(
                "hierarchy of {levels} levels with {section_size} sections overflows the interval space"
            )));
        }
        Ok(Self {
            section_size,
            levels,
            tree: RwLock::new(Tree::default()),
        })
    }

    fn span(&self, level: u16) -> i64 {
        i64::from(self.section_size).pow(u32::from(self.levels - level))
    }

    fn read(&self) -> VitrineResult<std::sync::RwLockReadGuard<'_, Tree>> {
        self.tree
            .read()
            .map_err(|_| VitrineError::storage("hierarchy index poisoned"))
    }

    fn write(&self) -> VitrineResult<std::sync::RwLockWriteGuard<'_, Tree>> {
        self.tree
            .write()
            .map_err(|_| VitrineError::storage("hierarchy index poisoned"))
    }

    fn insert(
        &self,
        tree: &mut Tree,
        code: &str,
        parent: Option<&HierarchyItem>,
        order: usize,
    ) -> VitrineResult<HierarchyItem> {
        if order >= usize::from(self.section_size) {
            return Err(VitrineError::invalid_state(format!(
                "hierarchy section full, cannot place `{code}`"
            )));
        }
        let level = parent.map_or(1, |parent| parent.level + 1);
        if level > self.levels {
            return Err(VitrineError::invalid_state(format!(
                "hierarchy depth of {} levels exceeded by `{code}`",
                self.levels
            )));
        }
        let span = self.span(level);
        let base = parent.map_or(0, |parent| parent.left_bound);
        let left_bound = base + span * order as i64;
        let item = HierarchyItem {
            code: code.to_string(),
            parent_code: parent.map(|parent| parent.code.clone()),
            left_bound,
            right_bound: left_bound + span - 1,
            level,
            order: order as u16,
        };
        tree.nodes.insert(
            code.to_string(),
            Node {
                item: item.clone(),
                children: Vec::new(),
                next_child: 0,
            },
        );
        Ok(item)
    }

    /// Hooks a freshly inserted item under its parent (or the roots).
    fn attach(tree: &mut Tree, item: &HierarchyItem) {
        let slot = usize::from(item.order) + 1;
        match &item.parent_code {
            Some(parent) => {
                if let Some(node) = tree.nodes.get_mut(parent) {
                    node.children.push(item.code.clone());
                    node.next_child = node.next_child.max(slot);
                }
            }
            None => {
                tree.roots.push(item.code.clone());
                tree.next_root = tree.next_root.max(slot);
            }
        }
    }
}

impl HierarchyIndex for NestedIntervalHierarchy {
    fn create_root_item(&self, code: &str) -> VitrineResult<HierarchyItem> {
        let mut tree = self.write()?;
        if tree.nodes.contains_key(code) {
            return Err(VitrineError::conflict(format!(
                "hierarchy item `{code}` already exists"
            )));
        }
        let order = tree.next_root;
        let item = self.insert(&mut tree, code, None, order)?;
        Self::attach(&mut tree, &item);
        Ok(item)
    }

    fn create_item(&self, code: &str, parent_code: &str) -> VitrineResult<HierarchyItem> {
        let mut tree = self.write()?;
        if tree.nodes.contains_key(code) {
            return Err(VitrineError::conflict(format!(
                "hierarchy item `{code}` already exists"
            )));
        }
        let (parent, order) = match tree.nodes.get(parent_code) {
            Some(node) => (node.item.clone(), node.next_child),
            None => return Err(VitrineError::no_such_item(parent_code)),
        };
        let item = self.insert(&mut tree, code, Some(&parent), order)?;
        Self::attach(&mut tree, &item);
        Ok(item)
    }

    fn restore_item(
        &self,
        code: &str,
        parent_code: Option<&str>,
        left_bound: i64,
    ) -> VitrineResult<HierarchyItem> {
        let mut tree = self.write()?;
        if tree.nodes.contains_key(code) {
            return Err(VitrineError::conflict(format!(
                "hierarchy item `{code}` already exists"
            )));
        }
        let parent = match parent_code {
            Some(parent_code) => match tree.nodes.get(parent_code) {
                Some(node) => Some(node.item.clone()),
                None => return Err(VitrineError::no_such_item(parent_code)),
            },
            None => None,
        };
        let level = parent.as_ref().map_or(1, |parent| parent.level + 1);
        if level > self.levels {
            return Err(VitrineError::invalid_state(format!(
                "hierarchy depth of {} levels exceeded by `{code}`",
                self.levels
            )));
        }
        let span = self.span(level);
        let offset = left_bound - parent.as_ref().map_or(0, |parent| parent.left_bound);
        if offset < 0 || offset % span != 0 {
            return Err(VitrineError::storage(format!(
                "hierarchy item `{code}` has misaligned left bound {left_bound}"
            )));
        }
        let item = self.insert(&mut tree, code, parent.as_ref(), (offset / span) as usize)?;
        Self::attach(&mut tree, &item);
        Ok(item)
    }

    fn remove_item(&self, code: &str) -> VitrineResult<()> {
        let mut tree = self.write()?;
        let node = tree
            .nodes
            .get(code)
            .ok_or_else(|| VitrineError::no_such_item(code))?;
        if !node.children.is_empty() {
            return Err(VitrineError::invalid_state(format!(
                "hierarchy item `{code}` still has children"
            )));
        }
        let parent = node.item.parent_code.clone();
        tree.nodes.remove(code);
        match parent {
            Some(parent) => {
                if let Some(node) = tree.nodes.get_mut(&parent) {
                    node.children.retain(|child| child != code);
                }
            }
            None => tree.roots.retain(|root| root != code),
        }
        Ok(())
    }

    fn item(&self, code: &str) -> VitrineResult<Option<HierarchyItem>> {
        let tree = self.read()?;
        Ok(tree.nodes.get(code).map(|node| node.item.clone()))
    }

    fn parent_item(&self, code: &str) -> VitrineResult<Option<HierarchyItem>> {
        let tree = self.read()?;
        let node = tree
            .nodes
            .get(code)
            .ok_or_else(|| VitrineError::no_such_item(code))?;
        Ok(node
            .item
            .parent_code
            .as_ref()
            .and_then(|parent| tree.nodes.get(parent))
            .map(|parent| parent.item.clone()))
    }

    fn parent_items(&self, code: &str) -> VitrineResult<Vec<HierarchyItem>> {
        let tree = self.read()?;
        let mut current = tree
            .nodes
            .get(code)
            .ok_or_else(|| VitrineError::no_such_item(code))?;
        let mut chain = Vec::new();
        while let Some(parent) = current
            .item
            .parent_code
            .as_ref()
            .and_then(|parent| tree.nodes.get(parent))
        {
            chain.push(parent.item.clone());
            current = parent;
        }
        chain.reverse();
        Ok(chain)
    }

    fn child_items(&self, code: &str) -> VitrineResult<Vec<HierarchyItem>> {
        let tree = self.read()?;
        let node = tree
            .nodes
            .get(code)
            .ok_or_else(|| VitrineError::no_such_item(code))?;
        Ok(node
            .children
            .iter()
            .filter_map(|child| tree.nodes.get(child))
            .map(|child| child.item.clone())
            .collect())
    }

    fn root_items(&self) -> VitrineResult<Vec<HierarchyItem>> {
        let tree = self.read()?;
        Ok(tree
            .roots
            .iter()
            .filter_map(|root| tree.nodes.get(root))
            .map(|root| root.item.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{HierarchyIndex, NestedIntervalHierarchy};
    use crate::VitrineError;

    fn sample() -> NestedIntervalHierarchy {
        let index = NestedIntervalHierarchy::new(4, 3).expect("index");
        index.create_root_item("1").expect("root 1");
        index.create_root_item("2").expect("root 2");
        index.create_item("10", "1").expect("10");
        index.create_item("11", "1").expect("11");
        index.create_item("100", "10").expect("100");
        index
    }

    #[test]
    fn children_nest_inside_parents() {
        let index = sample();
        let root = index.item("1").expect("item").expect("root");
        let child = index.item("11").expect("item").expect("child");
        let leaf = index.item("100").expect("item").expect("leaf");
        let other = index.item("2").expect("item").expect("other");
        assert_eq!((root.left_bound, root.right_bound), (0, 15));
        assert_eq!((child.left_bound, child.right_bound), (4, 7));
        assert!(root.left_bound <= leaf.left_bound && leaf.right_bound <= root.right_bound);
        assert!(other.left_bound > leaf.right_bound);
        assert_eq!(leaf.level, 3);
    }

    #[test]
    fn parent_chain_is_oldest_first() {
        let index = sample();
        let chain = index
            .parent_items("100")
            .expect("chain")
            .into_iter()
            .map(|item| item.code)
            .collect::<Vec<_>>();
        assert_eq!(chain, vec!["1".to_string(), "10".to_string()]);
        assert!(index.parent_items("1").expect("root chain").is_empty());
        assert_eq!(
            index
                .parent_item("10")
                .expect("parent")
                .map(|item| item.code),
            Some("1".to_string())
        );
    }

    #[test]
    fn unknown_codes_are_distinguished_from_roots() {
        let index = sample();
        assert!(index.item("404").expect("lookup").is_none());
        assert!(matches!(
            index.parent_items("404"),
            Err(VitrineError::NoSuchHierarchyItem { .. })
        ));
        assert!(matches!(
            index.create_item("5", "404"),
            Err(VitrineError::NoSuchHierarchyItem { .. })
        ));
        assert!(index.parent_item("2").expect("root parent").is_none());
    }

    #[test]
    fn capacity_limits_are_enforced() {
        let index = NestedIntervalHierarchy::new(2, 2).expect("index");
        index.create_root_item("a").expect("a");
        index.create_root_item("b").expect("b");
        assert!(index.create_root_item("c").is_err());
        index.create_item("a1", "a").expect("a1");
        assert!(index.create_item("a11", "a1").is_err());
        assert!(index.create_root_item("a").is_err());
        assert!(NestedIntervalHierarchy::new(64, 20).is_err());
    }

    #[test]
    fn restored_items_keep_their_slots() {
        let index = NestedIntervalHierarchy::new(4, 3).expect("index");
        let root = index.restore_item("1", None, 16).expect("root");
        assert_eq!((root.left_bound, root.order), (16, 1));
        let child = index.restore_item("10", Some("1"), 24).expect("child");
        assert_eq!(child.order, 2);
        assert_eq!(index.create_root_item("2").expect("next root").left_bound, 32);
        assert_eq!(index.create_item("11", "1").expect("next child").left_bound, 28);
        assert!(index.restore_item("12", Some("1"), 17).is_err());
        assert!(matches!(
            index.restore_item("13", Some("404"), 0),
            Err(VitrineError::NoSuchHierarchyItem { .. })
        ));
    }

    #[test]
    fn removed_leaves_leave_their_slot_empty() {
        let index = sample();
        assert!(matches!(
            index.remove_item("10"),
            Err(VitrineError::InvalidState { .. })
        ));
        index.remove_item("100").expect("remove leaf");
        assert!(index.item("100").expect("lookup").is_none());
        assert!(index.child_items("10").expect("children").is_empty());
        let next = index.create_item("101", "10").expect("next child");
        assert_eq!(next.order, 1);

        index.remove_item("2").expect("remove root");
        assert_eq!(index.root_items().expect("roots").len(), 1);
        assert_eq!(index.create_root_item("3").expect("root 3").order, 2);
        assert!(matches!(
            index.remove_item("404"),
            Err(VitrineError::NoSuchHierarchyItem { .. })
        ));
    }

    #[test]
    fn roots_and_children_keep_creation_order() {
        let index = sample();
        let roots = index
            .root_items()
            .expect("roots")
            .into_iter()
            .map(|item| item.code)
            .collect::<Vec<_>>();
        assert_eq!(roots, vec!["1".to_string(), "2".to_string()]);
        let children = index
            .child_items("1")
            .expect("children")
            .into_iter()
            .map(|item| item.order)
            .collect::<Vec<_>>();
        assert_eq!(children, vec![0, 1]);
    }
}
