use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use parking_lot::Mutex;

use crate::common::types::{Frame, FrameId, PageId, PagePtr, Page, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;

/// Everything the pool latch protects. Disk I/O happens while this is
/// held, so every public operation is serialized from entry to return.
struct PoolState {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    replacer: LruReplacer,
    next_page_id: PageId,
}

/// Fixed-size frame cache over a disk-resident page file.
///
/// Callers receive a `PagePtr` that stays valid and bound to the same
/// page id for as long as they hold a pin. Page ids are allocated
/// striped: an instance with index `i` out of `n` hands out
/// `i, i+n, i+2n, ...`.
pub struct BufferPoolManager {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    disk_manager: Arc<DiskManager>,
    state: Mutex<PoolState>,
}

impl BufferPoolManager {
    /// Create a stand-alone pool (a single instance owning every page id).
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(DiskManager::new(db_path)?);
        Self::new_instance(pool_size, 1, 0, disk_manager)
    }

    /// Create one instance of a striped pool over a shared disk manager.
    pub fn new_instance(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Result<Self, BufferPoolError> {
        assert!(num_instances > 0, "pool must have at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index out of range"
        );

        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for frame_id in 0..pool_size {
            frames.push(Frame::new());
            free_list.push_back(frame_id);
        }

        Ok(Self {
            pool_size,
            num_instances,
            instance_index,
            disk_manager,
            state: Mutex::new(PoolState {
                frames,
                page_table: HashMap::new(),
                free_list,
                replacer: LruReplacer::new(pool_size),
                next_page_id: instance_index,
            }),
        })
    }

    /// Allocate a fresh page and pin it. The returned buffer is zeroed;
    /// nothing is read from disk.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let mut state = self.state.lock();

        if state.frames.iter().all(|f| f.pin_count > 0) {
            return Err(BufferPoolError::BufferPoolExhausted);
        }

        let frame_id = self.find_replacement(&mut state)?;

        let page_id = state.next_page_id;
        state.next_page_id += self.num_instances;
        debug_assert_eq!(page_id % self.num_instances, self.instance_index);

        let frame = &mut state.frames[frame_id];
        *frame.page.write() = Page::new(page_id);
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;
        let page = frame.page.clone();

        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);

        Ok((page, page_id))
    }

    /// Fetch a page, reading it from disk if it is not resident.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &mut state.frames[frame_id];
            frame.pin_count += 1;
            let page = frame.page.clone();
            state.replacer.pin(frame_id);
            return Ok(page);
        }

        let frame_id = self.find_replacement(&mut state)?;

        let mut new_page = Page::new(page_id);
        self.disk_manager.read_page(page_id, &mut new_page)?;

        let frame = &mut state.frames[frame_id];
        *frame.page.write() = new_page;
        frame.page_id = page_id;
        frame.pin_count = 1;
        frame.is_dirty = false;
        let page = frame.page.clone();

        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);

        Ok(page)
    }

    /// Drop one pin. At pin count zero the frame becomes an eviction
    /// candidate. The dirty flag only ever accumulates here.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotResident(page_id)),
        };

        let frame = &mut state.frames[frame_id];
        if frame.pin_count == 0 {
            return Err(BufferPoolError::PageNotPinned(page_id));
        }

        if is_dirty {
            frame.is_dirty = true;
        }
        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }

        Ok(())
    }

    /// Write a resident page to disk unconditionally.
    ///
    /// The dirty flag is left as-is; a later eviction may write the page
    /// again.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidPageId(page_id));
        }

        let state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Err(BufferPoolError::PageNotResident(page_id)),
        };

        let page = state.frames[frame_id].page.read();
        self.disk_manager.write_page(&page)?;

        Ok(())
    }

    /// Flush every resident page.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let state = self.state.lock();

        for &frame_id in state.page_table.values() {
            let page = state.frames[frame_id].page.read();
            self.disk_manager.write_page(&page)?;
        }

        Ok(())
    }

    /// Drop a page from the pool and deallocate it on disk.
    ///
    /// Deleting a non-resident page is a no-op; deleting a pinned page
    /// fails without side effects.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&id) => id,
            None => return Ok(()),
        };

        let frame = &state.frames[frame_id];
        if frame.pin_count > 0 {
            return Err(BufferPoolError::PagePinned(page_id));
        }

        if frame.is_dirty {
            let page = frame.page.read();
            self.disk_manager.write_page(&page)?;
        }
        self.disk_manager.deallocate_page(page_id);

        state.page_table.remove(&page_id);
        state.replacer.pin(frame_id);
        state.frames[frame_id].reset();
        state.free_list.push_back(frame_id);

        Ok(())
    }

    /// Number of frames currently on the free list.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn instance_index(&self) -> u32 {
        self.instance_index
    }

    /// Pick a frame for reuse: free list first, then the LRU victim.
    /// A victim's current page is written back if dirty and unmapped.
    fn find_replacement(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = state
            .replacer
            .victim()
            .ok_or(BufferPoolError::BufferPoolExhausted)?;

        let frame = &state.frames[frame_id];
        if frame.page_id != INVALID_PAGE_ID {
            if frame.is_dirty {
                let page = frame.page.read();
                self.disk_manager.write_page(&page)?;
            }
            let old_page_id = frame.page_id;
            state.page_table.remove(&old_page_id);
        }

        Ok(frame_id)
    }
}
