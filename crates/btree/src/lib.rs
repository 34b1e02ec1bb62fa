//! Persistent B+Tree index keyed by string, valued with RID lists.
//!
//! The tree lives in its own file and does all page I/O through the shared
//! buffer pool (via the pool's single-file view). Page 0 holds the root at
//! creation; root splits may relocate it, in which case re-opening finds the
//! root by climbing parent links from page 0.
//!
//! `ORDER` is the maximum number of keys a node holds before it splits; a
//! node also splits early if its encoding would no longer fit one page, so
//! every node round-trips through a single 4 KiB page.

mod node;

#[cfg(test)]
mod tests;

pub use node::{InternalNode, LeafNode, Node};

use buffer::{BufferPool, FileView};
use common::{upper_bound_admits, DbError, DbResult, PageId, RecordId, PAGE_SIZE};

/// A disk-resident B+Tree: ordered map from string key to the list of RIDs
/// inserted under it. The default order of 200 is what the title index uses.
#[derive(Debug)]
pub struct BTreeIndex<const ORDER: usize = 200> {
    file: common::FileId,
    root: PageId,
    /// Guard for bulk-load mode: the last key appended, so decreasing input
    /// is caught instead of silently corrupting the leaf chain.
    last_bulk_key: Option<String>,
}

impl<const ORDER: usize> BTreeIndex<ORDER> {
    /// Create a fresh (empty) tree, truncating any previous file content.
    pub fn create(pool: &mut BufferPool, name: &str) -> DbResult<Self> {
        assert!(ORDER >= 3, "B+Tree order must be at least 3");
        let file = pool.open_file(name)?;
        pool.truncate_file(file)?;
        let mut view = FileView::new(pool, file);
        let page = alloc_page(&mut view)?;
        store_node(&mut view, &Node::Leaf(LeafNode::empty(page)))?;
        Ok(Self {
            file,
            root: page,
            last_bulk_key: None,
        })
    }

    /// Open a pre-existing tree: probe page 0 and climb parent links to the
    /// current root.
    pub fn open(pool: &mut BufferPool, name: &str) -> DbResult<Self> {
        let file = pool.open_file(name)?;
        if pool.page_count(file) == 0 {
            return Err(DbError::FileMissing(pool.path_of(name)));
        }
        let mut view = FileView::new(pool, file);
        let mut root = PageId(0);
        let mut node = load_node(&mut view, root)?;
        while let Some(parent) = node.parent() {
            root = parent;
            node = load_node(&mut view, root)?;
        }
        Ok(Self {
            file,
            root,
            last_bulk_key: None,
        })
    }

    /// Open the tree if its file has content, otherwise create it.
    pub fn open_or_create(pool: &mut BufferPool, name: &str) -> DbResult<Self> {
        if pool.file_has_pages(name) {
            Self::open(pool, name)
        } else {
            Self::create(pool, name)
        }
    }

    pub fn file_id(&self) -> common::FileId {
        self.file
    }

    /// Add `rid` under `key`, creating the key if absent.
    pub fn insert(&mut self, pool: &mut BufferPool, key: &str, rid: RecordId) -> DbResult<()> {
        let mut view = FileView::new(pool, self.file);
        let mut leaf = self.find_leaf(&mut view, key)?;
        add_to_leaf(&mut leaf, key, rid);
        self.store_or_split_leaf(&mut view, leaf, ORDER)
    }

    /// Bulk-load variant for non-decreasing key streams: appends at the
    /// rightmost leaf only. Decreasing input is a programmer error.
    ///
    /// The split threshold is one lower than in normal mode so the final
    /// leaf of a load is never over-full.
    pub fn bulk_insert(&mut self, pool: &mut BufferPool, key: &str, rid: RecordId) -> DbResult<()> {
        if let Some(last) = &self.last_bulk_key {
            if key < last.as_str() {
                return Err(DbError::Index(format!(
                    "bulk load out of order: {key:?} after {last:?}"
                )));
            }
        }
        self.last_bulk_key = Some(key.to_string());

        let mut view = FileView::new(pool, self.file);
        let mut leaf = self.rightmost_leaf(&mut view)?;
        add_to_leaf(&mut leaf, key, rid);
        self.store_or_split_leaf(&mut view, leaf, ORDER - 1)
    }

    /// Every RID stored under `key`, in insertion order. Empty when absent.
    pub fn search(&self, pool: &mut BufferPool, key: &str) -> DbResult<Vec<RecordId>> {
        let mut view = FileView::new(pool, self.file);
        let leaf = self.find_leaf(&mut view, key)?;
        Ok(match leaf.keys.binary_search_by(|k| k.as_str().cmp(key)) {
            Ok(idx) => leaf.rids[idx].clone(),
            Err(_) => Vec::new(),
        })
    }

    /// Every RID for every key in `[lo, hi]` (inclusive), ascending by key,
    /// insertion order within a key.
    ///
    /// Bound semantics are [`common::range_contains`]: the upper bound
    /// admits keys by prefix, so the index path and the filtered-scan path
    /// return the same rows. An inverted range yields nothing.
    pub fn range_search(
        &self,
        pool: &mut BufferPool,
        lo: &str,
        hi: &str,
    ) -> DbResult<Vec<RecordId>> {
        let mut results = Vec::new();
        if !upper_bound_admits(hi, lo) {
            return Ok(results);
        }
        let mut view = FileView::new(pool, self.file);
        let mut leaf = self.find_leaf(&mut view, lo)?;
        loop {
            for (key, rids) in leaf.keys.iter().zip(&leaf.rids) {
                if key.as_str() < lo {
                    continue;
                }
                // Keys are ascending, so the first key past the bound ends
                // the walk.
                if !upper_bound_admits(hi, key) {
                    return Ok(results);
                }
                results.extend_from_slice(rids);
            }
            match leaf.next_leaf {
                Some(next) => leaf = load_leaf(&mut view, next)?,
                None => break,
            }
        }
        Ok(results)
    }

    /// Write every dirty page of the tree's file back to disk. Called at the
    /// end of a logical batch (bulk load, query).
    pub fn flush(&self, pool: &mut BufferPool) -> DbResult<()> {
        pool.force(self.file)
    }

    // ---- descent ----

    fn find_leaf(&self, view: &mut FileView<'_>, key: &str) -> DbResult<LeafNode> {
        let mut current = self.root;
        loop {
            match load_node(view, current)? {
                Node::Internal(node) => {
                    let idx = node.keys.partition_point(|k| k.as_str() <= key);
                    current = *node.children.get(idx).ok_or_else(|| {
                        DbError::Corrupt(format!("internal node {} has no child {idx}", node.page.0))
                    })?;
                }
                Node::Leaf(leaf) => return Ok(leaf),
            }
        }
    }

    fn rightmost_leaf(&self, view: &mut FileView<'_>) -> DbResult<LeafNode> {
        let mut current = self.root;
        loop {
            match load_node(view, current)? {
                Node::Internal(node) => {
                    current = *node.children.last().ok_or_else(|| {
                        DbError::Corrupt(format!("internal node {} has no children", node.page.0))
                    })?;
                }
                Node::Leaf(leaf) => return Ok(leaf),
            }
        }
    }

    // ---- splits ----

    fn store_or_split_leaf(
        &mut self,
        view: &mut FileView<'_>,
        leaf: LeafNode,
        threshold: usize,
    ) -> DbResult<()> {
        let oversize = leaf.keys.len() >= 2 && leaf.encoded_size() > PAGE_SIZE;
        if leaf.keys.len() >= threshold || oversize {
            self.split_leaf(view, leaf)
        } else {
            store_node(view, &Node::Leaf(leaf))
        }
    }

    /// Midpoint split: the upper half moves to a fresh sibling, the sibling's
    /// first key is promoted, and the forward chain is re-linked.
    fn split_leaf(&mut self, view: &mut FileView<'_>, mut leaf: LeafNode) -> DbResult<()> {
        let mid = leaf.keys.len() / 2;
        let sibling_page = alloc_page(view)?;
        let sibling = LeafNode {
            page: sibling_page,
            parent: leaf.parent,
            keys: leaf.keys.split_off(mid),
            rids: leaf.rids.split_off(mid),
            next_leaf: leaf.next_leaf,
        };
        leaf.next_leaf = Some(sibling_page);

        let separator = sibling.keys[0].clone();
        let left = leaf.page;
        let parent = leaf.parent;
        log::debug!(
            "splitting leaf {} at {:?}, sibling {}",
            left.0,
            separator,
            sibling_page.0
        );
        store_node(view, &Node::Leaf(leaf))?;
        store_node(view, &Node::Leaf(sibling))?;
        self.insert_into_parent(view, left, separator, sibling_page, parent)
    }

    /// Record a split in the parent, splitting upward as needed. A split
    /// that propagates past the root allocates a new root.
    fn insert_into_parent(
        &mut self,
        view: &mut FileView<'_>,
        left: PageId,
        separator: String,
        right: PageId,
        parent: Option<PageId>,
    ) -> DbResult<()> {
        let Some(parent_page) = parent else {
            let root_page = alloc_page(view)?;
            let root = InternalNode {
                page: root_page,
                parent: None,
                keys: vec![separator],
                children: vec![left, right],
            };
            store_node(view, &Node::Internal(root))?;
            set_parent(view, left, Some(root_page))?;
            set_parent(view, right, Some(root_page))?;
            log::debug!("root split: new root {}", root_page.0);
            self.root = root_page;
            return Ok(());
        };

        let mut node = load_internal(view, parent_page)?;
        let idx = node
            .children
            .iter()
            .position(|c| *c == left)
            .ok_or_else(|| {
                DbError::Corrupt(format!(
                    "node {} is not a child of its parent {}",
                    left.0, parent_page.0
                ))
            })?;
        node.keys.insert(idx, separator);
        node.children.insert(idx + 1, right);
        set_parent(view, right, Some(parent_page))?;

        let oversize = node.keys.len() >= 2 && node.encoded_size() > PAGE_SIZE;
        if node.keys.len() >= ORDER || oversize {
            self.split_internal(view, node)
        } else {
            store_node(view, &Node::Internal(node))
        }
    }

    /// Midpoint split of an internal node: the middle key is promoted, not
    /// duplicated, and the moved children's parent links are reassigned.
    fn split_internal(&mut self, view: &mut FileView<'_>, mut node: InternalNode) -> DbResult<()> {
        let mid = node.keys.len() / 2;
        let promoted = node.keys[mid].clone();
        let right_keys = node.keys.split_off(mid + 1);
        node.keys.pop();
        let right_children = node.children.split_off(mid + 1);

        let sibling_page = alloc_page(view)?;
        let sibling = InternalNode {
            page: sibling_page,
            parent: node.parent,
            keys: right_keys,
            children: right_children,
        };
        for &child in &sibling.children {
            set_parent(view, child, Some(sibling_page))?;
        }

        let left = node.page;
        let parent = node.parent;
        store_node(view, &Node::Internal(node))?;
        store_node(view, &Node::Internal(sibling))?;
        self.insert_into_parent(view, left, promoted, sibling_page, parent)
    }
}

/// Insert `rid` under `key` in a leaf, collapsing duplicates into one key.
fn add_to_leaf(leaf: &mut LeafNode, key: &str, rid: RecordId) {
    match leaf.keys.binary_search_by(|k| k.as_str().cmp(key)) {
        Ok(idx) => leaf.rids[idx].push(rid),
        Err(idx) => {
            leaf.keys.insert(idx, key.to_string());
            leaf.rids.insert(idx, vec![rid]);
        }
    }
}

// ---- node I/O through the pool ----
//
// Every helper pairs its fetch with an unpin on all exits, so the tree never
// holds a pin between public calls.

fn alloc_page(view: &mut FileView<'_>) -> DbResult<PageId> {
    let page = view
        .create()?
        .ok_or_else(|| DbError::Buffer("no free frame for a new index node".into()))?;
    let pid = page.id();
    view.unpin(pid);
    Ok(pid)
}

fn load_node(view: &mut FileView<'_>, pid: PageId) -> DbResult<Node> {
    let page = view
        .fetch(pid)?
        .ok_or_else(|| DbError::Index(format!("index node page {} unreadable", pid.0)))?;
    let node = Node::decode(page);
    view.unpin(pid);
    node
}

fn load_leaf(view: &mut FileView<'_>, pid: PageId) -> DbResult<LeafNode> {
    match load_node(view, pid)? {
        Node::Leaf(leaf) => Ok(leaf),
        Node::Internal(_) => Err(DbError::Corrupt(format!(
            "leaf chain points at internal node {}",
            pid.0
        ))),
    }
}

fn load_internal(view: &mut FileView<'_>, pid: PageId) -> DbResult<InternalNode> {
    match load_node(view, pid)? {
        Node::Internal(node) => Ok(node),
        Node::Leaf(_) => Err(DbError::Corrupt(format!(
            "parent link points at leaf {}",
            pid.0
        ))),
    }
}

fn store_node(view: &mut FileView<'_>, node: &Node) -> DbResult<()> {
    let pid = node.page();
    let page = view
        .fetch(pid)?
        .ok_or_else(|| DbError::Index(format!("index node page {} unreadable", pid.0)))?;
    let result = node.encode(page);
    view.mark_dirty(pid);
    view.unpin(pid);
    result
}

fn set_parent(view: &mut FileView<'_>, child: PageId, parent: Option<PageId>) -> DbResult<()> {
    let mut node = load_node(view, child)?;
    node.set_parent(parent);
    store_node(view, &node)
}
