//! Backing storage for multi-get replies.
//!
//! A GET-family command returning many values copies them into a handful of
//! arena blocks owned by the [`MGetResponse`] instead of allocating one buffer
//! per value. Slots refer to their bytes through [`ValueRef`] handles, so the
//! response can be moved freely: the blocks travel with it and are released
//! exactly once when it is dropped.

use std::sync::atomic::{AtomicU64, Ordering};

/// Block size used by [`MGetResponse::insert`] when it needs a new block
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to an allocated storage block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockId(usize);

/// Location of a value inside the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRef {
    arena: u64,
    block: usize,
    offset: usize,
    len: usize,
}

impl ValueRef {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Arena of fixed-capacity blocks. Each block is a single heap allocation
/// that never grows, so handles into it stay valid.
///
/// Every arena carries a unique id and only resolves handles it issued.
#[derive(Debug)]
pub struct MGetStorage {
    id: u64,
    blocks: Vec<Vec<u8>>,
}

impl Default for MGetStorage {
    fn default() -> Self {
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            blocks: Vec::new(),
        }
    }
}

impl MGetStorage {
    pub fn alloc(&mut self, size: usize) -> BlockId {
        self.blocks.push(Vec::with_capacity(size));
        BlockId(self.blocks.len() - 1)
    }

    /// Bump-copy `data` into `block`. Returns `None` if the block is full.
    pub fn copy_into(&mut self, block: BlockId, data: &[u8]) -> Option<ValueRef> {
        let buf = self.blocks.get_mut(block.0)?;
        if buf.capacity() - buf.len() < data.len() {
            return None;
        }
        let offset = buf.len();
        buf.extend_from_slice(data);
        Some(ValueRef {
            arena: self.id,
            block: block.0,
            offset,
            len: data.len(),
        })
    }

    /// Bytes behind `value`, `None` if the handle was issued by another arena
    pub fn get(&self, value: ValueRef) -> Option<&[u8]> {
        if value.arena != self.id {
            return None;
        }
        let end = value.offset.checked_add(value.len)?;
        self.blocks.get(value.block)?.get(value.offset..end)
    }

    pub fn owns(&self, value: ValueRef) -> bool {
        self.get(value).is_some()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn capacity(&self) -> usize {
        self.blocks.iter().map(|b| b.capacity()).sum()
    }

    fn last_block(&self) -> Option<BlockId> {
        self.blocks.len().checked_sub(1).map(BlockId)
    }
}

/// One multi-get result slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetResp {
    pub key: String,
    value: ValueRef,

    /// CAS version, 0 means it was not requested and is not emitted
    pub mc_ver: u64,
    pub mc_flag: u32,
}

impl GetResp {
    pub fn new(key: impl Into<String>, value: ValueRef) -> Self {
        Self {
            key: key.into(),
            value,
            mc_ver: 0,
            mc_flag: 0,
        }
    }

    pub fn value_ref(&self) -> ValueRef {
        self.value
    }
}

/// Ordered multi-get result. `None` slots are keys that were not found.
#[derive(Debug, Default)]
pub struct MGetResponse {
    storage: MGetStorage,
    resp_arr: Vec<Option<GetResp>>,
}

impl MGetResponse {
    /// Response with `size` empty (missing) slots
    pub fn new(size: usize) -> Self {
        Self {
            storage: MGetStorage::default(),
            resp_arr: vec![None; size],
        }
    }

    pub fn len(&self) -> usize {
        self.resp_arr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resp_arr.is_empty()
    }

    /// Allocate a block able to hold `size` payload bytes
    pub fn alloc_storage(&mut self, size: usize) -> BlockId {
        self.storage.alloc(size)
    }

    pub fn store(&mut self, block: BlockId, data: &[u8]) -> Option<ValueRef> {
        self.storage.copy_into(block, data)
    }

    /// Fill slot `index`. Returns `None` and leaves the slot untouched if
    /// `index` is out of bounds or the value was stored in another response.
    pub fn set(&mut self, index: usize, resp: GetResp) -> Option<&mut GetResp> {
        if !self.storage.owns(resp.value) {
            return None;
        }
        let slot = self.resp_arr.get_mut(index)?;
        Some(slot.insert(resp))
    }

    /// Copy `value` into the current block (allocating a new one if it does
    /// not fit) and fill slot `index` with it. `None` if `index` is out of
    /// bounds.
    pub fn insert(
        &mut self,
        index: usize,
        key: impl Into<String>,
        value: &[u8],
    ) -> Option<&mut GetResp> {
        if index >= self.resp_arr.len() {
            return None;
        }
        let stored = self
            .storage
            .last_block()
            .and_then(|block| self.storage.copy_into(block, value));
        let value_ref = match stored {
            Some(r) => r,
            None => {
                let block = self.storage.alloc(value.len().max(DEFAULT_BLOCK_SIZE));
                // A fresh block is at least value.len() bytes
                match self.storage.copy_into(block, value) {
                    Some(r) => r,
                    None => unreachable!("new block smaller than value"),
                }
            }
        };
        self.set(index, GetResp::new(key, value_ref))
    }

    pub fn value(&self, resp: &GetResp) -> Option<&[u8]> {
        self.storage.get(resp.value)
    }

    pub fn slot(&self, index: usize) -> Option<&GetResp> {
        self.resp_arr.get(index).and_then(|s| s.as_ref())
    }

    /// Iterate slots in order, resolving present values to their bytes
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Option<(&GetResp, &[u8])>> + '_ {
        // set() only admits handles of this arena
        self.resp_arr.iter().map(move |slot| {
            slot.as_ref().and_then(|r| Some((r, self.storage.get(r.value)?)))
        })
    }

    pub fn storage(&self) -> &MGetStorage {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_share_one_block() {
        let mut resp = MGetResponse::new(3);
        resp.insert(0, "k1", b"v1");
        resp.insert(2, "k3", b"value-three");

        assert_eq!(resp.storage().block_count(), 1);
        assert_eq!(resp.value(resp.slot(0).unwrap()), Some(&b"v1"[..]));
        assert!(resp.slot(1).is_none());
        assert_eq!(
            resp.value(resp.slot(2).unwrap()),
            Some(&b"value-three"[..])
        );
    }

    #[test]
    fn test_caller_controls_blocks() {
        let mut resp = MGetResponse::new(2);
        let block = resp.alloc_storage(4);
        let a = resp.store(block, b"abc").unwrap();
        assert!(resp.store(block, b"de").is_none());
        assert!(resp.set(0, GetResp::new("a", a)).is_some());

        let big = vec![b'x'; DEFAULT_BLOCK_SIZE * 2];
        assert!(resp.insert(1, "b", &big).is_some());
        assert_eq!(resp.storage().block_count(), 2);
        let stored = resp.value(resp.slot(1).unwrap());
        assert_eq!(stored.map(<[u8]>::len), Some(big.len()));
    }

    #[test]
    fn test_move_transfers_storage() {
        let mut a = MGetResponse::new(1);
        a.insert(0, "k", b"payload");

        let b = std::mem::take(&mut a);
        assert_eq!(a.storage().block_count(), 0);
        assert!(a.is_empty());
        drop(a);

        assert_eq!(b.value(b.slot(0).unwrap()), Some(&b"payload"[..]));
    }

    #[test]
    fn test_set_rejects_values_from_another_response() {
        let mut other = MGetResponse::new(1);
        other.alloc_storage(8);
        let block = other.alloc_storage(8);
        let foreign = other.store(block, b"secret").unwrap();

        let mut resp = MGetResponse::new(2);
        resp.insert(0, "own", b"mine").unwrap();
        assert!(resp.set(1, GetResp::new("k", foreign)).is_none());
        assert!(resp.slot(1).is_none());
        assert_eq!(resp.storage().get(foreign), None);

        // Same block index and offset, still not ours
        let first = other.store(BlockId(0), b"x").unwrap();
        assert!(resp.set(1, GetResp::new("k", first)).is_none());

        let values: Vec<_> = resp.iter().map(|s| s.map(|(_, v)| v.to_vec())).collect();
        assert_eq!(values, vec![Some(b"mine".to_vec()), None]);
    }

    #[test]
    fn test_out_of_range_slot_is_rejected() {
        let mut resp = MGetResponse::new(1);
        assert!(resp.insert(1, "k", b"v").is_none());
        let block = resp.alloc_storage(4);
        let v = resp.store(block, b"v").unwrap();
        assert!(resp.set(5, GetResp::new("k", v)).is_none());
    }
}
