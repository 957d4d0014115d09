use std::sync::Arc;
use thiserror::Error;

use crate::common::types::{PageId, Rid, TxnId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::buffer::{BufferPoolError, BufferPoolManager};
use crate::storage::page::{PageError, TablePageManager, HEADER_SIZE, SLOT_SIZE};
use crate::storage::table::tuple::Tuple;
use crate::transaction::concurrency::{Transaction, TransactionState};

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Tuple serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Tuple of {0} bytes does not fit in a page")]
    TupleTooLarge(usize),

    #[error("Transaction {0} is aborted")]
    TransactionAborted(TxnId),
}

/// A table as a doubly linked chain of slotted pages reached through the
/// buffer pool. Inserts walk the chain and append a page when the tail is
/// full; RIDs stay stable across updates and delete marks.
pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    page_manager: TablePageManager,
    first_page_id: PageId,
}

impl TableHeap {
    /// Create a heap with one empty page.
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, TableError> {
        let page_manager = TablePageManager::new();
        let (page, first_page_id) = buffer_pool.new_page()?;
        page_manager.init_page(&mut page.write());
        buffer_pool.unpin_page(first_page_id, true)?;

        Ok(Self {
            buffer_pool,
            page_manager,
            first_page_id,
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    pub fn insert_tuple(&self, tuple: &Tuple, txn: &Transaction) -> Result<Rid, TableError> {
        self.ensure_not_aborted(txn)?;

        let data = tuple.to_bytes()?;
        if data.len() + SLOT_SIZE > PAGE_SIZE - HEADER_SIZE {
            return Err(TableError::TupleTooLarge(data.len()));
        }

        let mut current_page_id = self.first_page_id;
        loop {
            let page_ptr = self.buffer_pool.fetch_page(current_page_id)?;

            let inserted = {
                let mut page = page_ptr.write();
                self.page_manager.insert_tuple(&mut page, &data)
            };
            match inserted {
                Ok(slot) => {
                    self.buffer_pool.unpin_page(current_page_id, true)?;
                    return Ok(Rid::new(current_page_id, slot));
                }
                Err(PageError::InsufficientSpace) => {}
                Err(e) => {
                    self.buffer_pool.unpin_page(current_page_id, false)?;
                    return Err(e.into());
                }
            }

            let next_page_id = self.page_manager.header(&page_ptr.read()).next_page_id;
            if next_page_id != INVALID_PAGE_ID {
                self.buffer_pool.unpin_page(current_page_id, false)?;
                current_page_id = next_page_id;
                continue;
            }

            // Tail is full: append a fresh page and link it in.
            let (new_ptr, new_page_id) = self.buffer_pool.new_page()?;
            {
                let mut new_page = new_ptr.write();
                self.page_manager.init_page(&mut new_page);
                let mut header = self.page_manager.header(&new_page);
                header.prev_page_id = current_page_id;
                self.page_manager.write_header(&mut new_page, &header);
            }
            {
                let mut page = page_ptr.write();
                let mut header = self.page_manager.header(&page);
                header.next_page_id = new_page_id;
                self.page_manager.write_header(&mut page, &header);
            }
            self.buffer_pool.unpin_page(current_page_id, true)?;

            let slot = {
                let mut new_page = new_ptr.write();
                self.page_manager.insert_tuple(&mut new_page, &data)?
            };
            self.buffer_pool.unpin_page(new_page_id, true)?;
            return Ok(Rid::new(new_page_id, slot));
        }
    }

    pub fn get_tuple(&self, rid: Rid, _txn: &Transaction) -> Result<Tuple, TableError> {
        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
        let bytes = {
            let page = page_ptr.read();
            self.page_manager.get_tuple(&page, rid.slot)
        };
        self.buffer_pool.unpin_page(rid.page_id, false)?;
        Ok(Tuple::from_bytes(&bytes?)?)
    }

    /// Overwrite the tuple at `rid` in place. Also the abort path for
    /// updates, so an already-aborted transaction may still call it.
    pub fn update_tuple(
        &self,
        rid: Rid,
        tuple: &Tuple,
        _txn: &Transaction,
    ) -> Result<(), TableError> {
        let data = tuple.to_bytes()?;
        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut page = page_ptr.write();
            self.page_manager.update_tuple(&mut page, rid.slot, &data)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        result.map_err(Into::into)
    }

    /// Set the delete mark; the tuple stays on the page until the mark is
    /// applied at commit.
    pub fn mark_delete(&self, rid: Rid, txn: &Transaction) -> Result<(), TableError> {
        self.ensure_not_aborted(txn)?;
        self.with_page_write(rid, |pm, page| pm.mark_delete(page, rid.slot))
    }

    /// Undo a delete mark (abort path).
    pub fn rollback_delete(&self, rid: Rid, _txn: &Transaction) -> Result<(), TableError> {
        self.with_page_write(rid, |pm, page| pm.rollback_delete(page, rid.slot))
    }

    /// Make a delete permanent (commit path).
    pub fn apply_delete(&self, rid: Rid, _txn: &Transaction) -> Result<(), TableError> {
        self.with_page_write(rid, |pm, page| pm.apply_delete(page, rid.slot))
    }

    /// Iterate live tuples in page-chain order.
    pub fn iter(&self) -> TableIterator {
        TableIterator {
            buffer_pool: self.buffer_pool.clone(),
            page_manager: TablePageManager::new(),
            current_page_id: self.first_page_id,
            current_slot: 0,
        }
    }

    fn with_page_write<F>(&self, rid: Rid, f: F) -> Result<(), TableError>
    where
        F: FnOnce(&TablePageManager, &mut crate::common::types::Page) -> Result<(), PageError>,
    {
        let page_ptr = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut page = page_ptr.write();
            f(&self.page_manager, &mut page)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        result.map_err(Into::into)
    }

    fn ensure_not_aborted(&self, txn: &Transaction) -> Result<(), TableError> {
        if txn.state() == TransactionState::Aborted {
            return Err(TableError::TransactionAborted(txn.id()));
        }
        Ok(())
    }
}

/// Cursor over the live tuples of a heap. Delete-marked and vacant slots
/// are skipped.
pub struct TableIterator {
    buffer_pool: Arc<BufferPoolManager>,
    page_manager: TablePageManager,
    current_page_id: PageId,
    current_slot: u32,
}

impl Iterator for TableIterator {
    type Item = Result<(Rid, Tuple), TableError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_page_id == INVALID_PAGE_ID {
                return None;
            }

            let page_ptr = match self.buffer_pool.fetch_page(self.current_page_id) {
                Ok(p) => p,
                Err(e) => {
                    self.current_page_id = INVALID_PAGE_ID;
                    return Some(Err(e.into()));
                }
            };

            let mut found = None;
            let next_page_id;
            {
                let page = page_ptr.read();
                let header = self.page_manager.header(&page);
                next_page_id = header.next_page_id;

                while self.current_slot < header.tuple_count {
                    let slot = self.current_slot;
                    self.current_slot += 1;

                    let tuple_slot = self.page_manager.slot(&page, slot);
                    if tuple_slot.is_vacant() || tuple_slot.deleted {
                        continue;
                    }
                    let rid = Rid::new(self.current_page_id, slot);
                    let start = tuple_slot.offset as usize;
                    let end = start + tuple_slot.length as usize;
                    found = Some((rid, Tuple::from_bytes(&page.data[start..end])));
                    break;
                }
            }

            let page_id = self.current_page_id;
            if found.is_none() {
                self.current_page_id = next_page_id;
                self.current_slot = 0;
            }
            if let Err(e) = self.buffer_pool.unpin_page(page_id, false) {
                self.current_page_id = INVALID_PAGE_ID;
                return Some(Err(e.into()));
            }

            if let Some((rid, decoded)) = found {
                return Some(decoded.map(|tuple| (rid, tuple)).map_err(Into::into));
            }
        }
    }
}
