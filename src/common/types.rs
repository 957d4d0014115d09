use std::fmt;
use std::sync::Arc;
use parking_lot::RwLock;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type
pub type PageId = u32;

/// Sentinel page ID denoting absence
pub const INVALID_PAGE_ID: PageId = u32::MAX;

/// Transaction ID type
pub type TxnId = u32;

/// Buffer pool frame index type
pub type FrameId = usize;

/// Table OID type
pub type TableOid = u32;

/// Index OID type
pub type IndexOid = u32;

/// Record identifier: (page, slot) pair, stable for a tuple's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u32,
}

impl Rid {
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// Page structure
#[derive(Debug, Clone)]
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
        }
    }
}

/// Smart pointer to a page
pub type PagePtr = Arc<RwLock<Page>>;

/// Buffer pool frame structure.
///
/// A frame is free (`page_id == INVALID_PAGE_ID`, on the free list),
/// resident-unpinned (`pin_count == 0`, a replacer candidate), or
/// resident-pinned (`pin_count > 0`). The resident page id is mirrored
/// here so eviction does not have to scan the page table.
#[derive(Debug)]
pub struct Frame {
    pub page: PagePtr,
    pub page_id: PageId,
    pub pin_count: u32,
    pub is_dirty: bool,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            page: Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID))),
            page_id: INVALID_PAGE_ID,
            pin_count: 0,
            is_dirty: false,
        }
    }

    /// Return the frame to its free state.
    pub fn reset(&mut self) {
        *self.page.write() = Page::new(INVALID_PAGE_ID);
        self.page_id = INVALID_PAGE_ID;
        self.pin_count = 0;
        self.is_dirty = false;
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}
