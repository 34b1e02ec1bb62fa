//! B+Tree node definitions and their single-page serialization.
//!
//! Each node occupies exactly one 4 KiB page:
//!
//! ```text
//! pageId(4) | isLeaf(1) | parentPageId(4) | keyCount(4)
//! leaf:     nextLeafPageId(4), then keyCount × {keyLen(2), keyBytes,
//!           ridCount(2), ridCount × {pageId(4), slotId(2)}}
//! internal: keyCount × {keyLen(2), keyBytes, childPageId(4)},
//!           then one trailing childPageId(4)
//! ```
//!
//! All integers big-endian. `u32::MAX` is the "none" sentinel for parent and
//! next-leaf links. Records that would overflow the page are dropped at
//! write time with a warning; reads stop at the first malformed record and
//! keep the parsed prefix, so a damaged node degrades instead of wedging the
//! tree.

use common::{DbError, DbResult, PageId, RecordId, PAGE_SIZE};
use storage::Page;

/// id + isLeaf + parent + keyCount.
const NODE_HEADER_SIZE: usize = 13;
/// Sentinel meaning "no page" in parent / next-leaf slots.
const NO_PAGE: u32 = u32::MAX;
/// On-disk size of one RID: pageId(4) + slotId(2).
const RID_SIZE: usize = 6;

fn encode_link(link: Option<PageId>) -> u32 {
    link.map(|p| p.0).unwrap_or(NO_PAGE)
}

fn decode_link(raw: u32) -> Option<PageId> {
    (raw != NO_PAGE).then_some(PageId(raw))
}

/// A leaf: ascending keys, each with a non-empty RID list, plus the forward
/// link that chains leaves in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub page: PageId,
    pub parent: Option<PageId>,
    pub keys: Vec<String>,
    pub rids: Vec<Vec<RecordId>>,
    pub next_leaf: Option<PageId>,
}

impl LeafNode {
    pub fn empty(page: PageId) -> Self {
        Self {
            page,
            parent: None,
            keys: Vec::new(),
            rids: Vec::new(),
            next_leaf: None,
        }
    }

    /// Bytes this leaf would occupy on disk, without truncation.
    pub fn encoded_size(&self) -> usize {
        let records: usize = self
            .keys
            .iter()
            .zip(&self.rids)
            .map(|(k, r)| 2 + k.len() + 2 + r.len() * RID_SIZE)
            .sum();
        NODE_HEADER_SIZE + 4 + records
    }
}

/// An internal node: k separator keys and k+1 children. All keys in child i
/// sort strictly below separator i; child i+1 holds keys at or above it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    pub page: PageId,
    pub parent: Option<PageId>,
    pub keys: Vec<String>,
    pub children: Vec<PageId>,
}

impl InternalNode {
    pub fn encoded_size(&self) -> usize {
        let records: usize = self.keys.iter().map(|k| 2 + k.len() + 4).sum();
        NODE_HEADER_SIZE + records + 4
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    pub fn page(&self) -> PageId {
        match self {
            Node::Internal(n) => n.page,
            Node::Leaf(n) => n.page,
        }
    }

    pub fn parent(&self) -> Option<PageId> {
        match self {
            Node::Internal(n) => n.parent,
            Node::Leaf(n) => n.parent,
        }
    }

    pub fn set_parent(&mut self, parent: Option<PageId>) {
        match self {
            Node::Internal(n) => n.parent = parent,
            Node::Leaf(n) => n.parent = parent,
        }
    }

    /// Serialize this node over `page`, truncating deterministically if the
    /// encoding would overflow.
    pub fn encode(&self, page: &mut Page) -> DbResult<()> {
        if self.page() != page.id() {
            return Err(DbError::Index(format!(
                "node for page {} encoded onto page {}",
                self.page().0,
                page.id().0
            )));
        }
        let data = page.bytes_mut();
        data.fill(0);
        data[0..4].copy_from_slice(&self.page().0.to_be_bytes());
        data[5..9].copy_from_slice(&encode_link(self.parent()).to_be_bytes());

        let written = match self {
            Node::Leaf(leaf) => {
                data[4] = 1;
                data[13..17].copy_from_slice(&encode_link(leaf.next_leaf).to_be_bytes());
                encode_leaf_records(data, leaf)
            }
            Node::Internal(node) => {
                data[4] = 0;
                encode_internal_records(data, node)
            }
        };
        data[9..13].copy_from_slice(&(written as u32).to_be_bytes());
        Ok(())
    }

    /// Rebuild a node from a page image.
    ///
    /// Malformed counts or lengths end the parse early; whatever decoded
    /// cleanly is kept (corrupt-page degradation).
    pub fn decode(page: &Page) -> DbResult<Self> {
        let data = page.bytes();
        let is_leaf = match data[4] {
            0 => false,
            1 => true,
            other => {
                return Err(DbError::Corrupt(format!(
                    "page {} is not an index node (isLeaf = {})",
                    page.id().0,
                    other
                )))
            }
        };
        let parent = decode_link(u32::from_be_bytes(data[5..9].try_into().unwrap()));
        let key_count = u32::from_be_bytes(data[9..13].try_into().unwrap()) as usize;
        if key_count > PAGE_SIZE {
            return Err(DbError::Corrupt(format!(
                "page {} claims {} keys",
                page.id().0,
                key_count
            )));
        }

        if is_leaf {
            let next_leaf = decode_link(u32::from_be_bytes(data[13..17].try_into().unwrap()));
            let (keys, rids) = decode_leaf_records(data, key_count, page.id());
            Ok(Node::Leaf(LeafNode {
                page: page.id(),
                parent,
                keys,
                rids,
                next_leaf,
            }))
        } else {
            let (keys, children) = decode_internal_records(data, key_count, page.id());
            Ok(Node::Internal(InternalNode {
                page: page.id(),
                parent,
                keys,
                children,
            }))
        }
    }
}

fn encode_leaf_records(data: &mut [u8], leaf: &LeafNode) -> usize {
    let mut offset = NODE_HEADER_SIZE + 4;
    let mut written = 0;
    for (key, rids) in leaf.keys.iter().zip(&leaf.rids) {
        let fixed = 2 + key.len() + 2;
        if offset + fixed + RID_SIZE > PAGE_SIZE {
            log::warn!(
                "leaf {} overflows a page, dropping {} trailing key(s)",
                leaf.page.0,
                leaf.keys.len() - written
            );
            break;
        }
        let room = (PAGE_SIZE - offset - fixed) / RID_SIZE;
        let take = rids.len().min(room);
        if take < rids.len() {
            log::warn!(
                "leaf {} truncating RID list of {:?} from {} to {}",
                leaf.page.0,
                key,
                rids.len(),
                take
            );
        }
        data[offset..offset + 2].copy_from_slice(&(key.len() as u16).to_be_bytes());
        offset += 2;
        data[offset..offset + key.len()].copy_from_slice(key.as_bytes());
        offset += key.len();
        data[offset..offset + 2].copy_from_slice(&(take as u16).to_be_bytes());
        offset += 2;
        for rid in &rids[..take] {
            data[offset..offset + 4].copy_from_slice(&rid.page.0.to_be_bytes());
            data[offset + 4..offset + 6].copy_from_slice(&rid.slot.to_be_bytes());
            offset += RID_SIZE;
        }
        written += 1;
    }
    written
}

fn encode_internal_records(data: &mut [u8], node: &InternalNode) -> usize {
    let mut offset = NODE_HEADER_SIZE;
    let mut written = 0;
    for (key, child) in node.keys.iter().zip(&node.children) {
        let record = 2 + key.len() + 4;
        // Reserve room for the trailing child pointer.
        if offset + record + 4 > PAGE_SIZE {
            log::warn!(
                "internal node {} overflows a page, dropping {} trailing key(s)",
                node.page.0,
                node.keys.len() - written
            );
            break;
        }
        data[offset..offset + 2].copy_from_slice(&(key.len() as u16).to_be_bytes());
        offset += 2;
        data[offset..offset + key.len()].copy_from_slice(key.as_bytes());
        offset += key.len();
        data[offset..offset + 4].copy_from_slice(&child.0.to_be_bytes());
        offset += 4;
        written += 1;
    }
    if let Some(last) = node.children.get(written) {
        data[offset..offset + 4].copy_from_slice(&last.0.to_be_bytes());
    }
    written
}

fn decode_leaf_records(
    data: &[u8],
    key_count: usize,
    page: PageId,
) -> (Vec<String>, Vec<Vec<RecordId>>) {
    let mut offset = NODE_HEADER_SIZE + 4;
    let mut keys = Vec::with_capacity(key_count);
    let mut rids = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        if offset + 2 > PAGE_SIZE {
            log::warn!("leaf {} ends mid-record, keeping {} key(s)", page.0, keys.len());
            break;
        }
        let klen = u16::from_be_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;
        if offset + klen + 2 > PAGE_SIZE {
            log::warn!("leaf {} has an oversized key, keeping {} key(s)", page.0, keys.len());
            break;
        }
        let key = String::from_utf8_lossy(&data[offset..offset + klen]).into_owned();
        offset += klen;
        let rid_count = u16::from_be_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;
        if offset + rid_count * RID_SIZE > PAGE_SIZE {
            log::warn!(
                "leaf {} has an oversized RID list, keeping {} key(s)",
                page.0,
                keys.len()
            );
            break;
        }
        let mut list = Vec::with_capacity(rid_count);
        for _ in 0..rid_count {
            let pid = u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap());
            let slot = u16::from_be_bytes(data[offset + 4..offset + 6].try_into().unwrap());
            list.push(RecordId::new(PageId(pid), slot));
            offset += RID_SIZE;
        }
        keys.push(key);
        rids.push(list);
    }
    (keys, rids)
}

fn decode_internal_records(
    data: &[u8],
    key_count: usize,
    page: PageId,
) -> (Vec<String>, Vec<PageId>) {
    let mut offset = NODE_HEADER_SIZE;
    let mut keys = Vec::with_capacity(key_count);
    let mut children = Vec::with_capacity(key_count + 1);
    for _ in 0..key_count {
        if offset + 2 > PAGE_SIZE {
            log::warn!("node {} ends mid-record, keeping {} key(s)", page.0, keys.len());
            break;
        }
        let klen = u16::from_be_bytes(data[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;
        if offset + klen + 4 > PAGE_SIZE {
            log::warn!("node {} has an oversized key, keeping {} key(s)", page.0, keys.len());
            break;
        }
        let key = String::from_utf8_lossy(&data[offset..offset + klen]).into_owned();
        offset += klen;
        let child = u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap());
        offset += 4;
        keys.push(key);
        children.push(PageId(child));
    }
    if offset + 4 <= PAGE_SIZE {
        let last = u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap());
        children.push(PageId(last));
    }
    (keys, children)
}
