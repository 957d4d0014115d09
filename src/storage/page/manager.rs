use crate::common::types::{Page, PAGE_SIZE};
use crate::storage::page::error::PageError;
use crate::storage::page::header::PageHeader;
use crate::storage::page::layout::{TupleSlot, HEADER_SIZE, SLOT_SIZE};

/// Stateless reader/writer for the slotted table-page layout.
pub struct TablePageManager;

impl Default for TablePageManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TablePageManager {
    pub fn new() -> Self {
        Self
    }

    pub fn init_page(&self, page: &mut Page) {
        let header = PageHeader::new();
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    /// Insert tuple bytes and return the slot number.
    pub fn insert_tuple(&self, page: &mut Page, data: &[u8]) -> Result<u32, PageError> {
        let mut header = self.header(page);

        let tuple_size = data.len() as u32;
        let total_needed = tuple_size + SLOT_SIZE as u32;
        if header.free_space_size < total_needed {
            return Err(PageError::InsufficientSpace);
        }

        let slot = header.tuple_count;
        let slot_pos = Self::slot_position(slot);

        let tuple_slot = TupleSlot {
            offset: header.free_space_offset,
            length: tuple_size,
            deleted: false,
        };

        let data_start = header.free_space_offset as usize;
        page.data[data_start..data_start + data.len()].copy_from_slice(data);
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&tuple_slot.to_bytes());

        header.free_space_offset += tuple_size;
        header.free_space_size -= total_needed;
        header.tuple_count += 1;
        self.write_header(page, &header);

        Ok(slot)
    }

    /// Read tuple bytes. Delete-marked tuples are not visible here.
    pub fn get_tuple(&self, page: &Page, slot: u32) -> Result<Vec<u8>, PageError> {
        let tuple_slot = self.checked_slot(page, slot)?;
        if tuple_slot.deleted {
            return Err(PageError::TupleNotFound);
        }
        let start = tuple_slot.offset as usize;
        let end = start + tuple_slot.length as usize;
        Ok(page.data[start..end].to_vec())
    }

    /// Overwrite a tuple in place, relocating within the page when the new
    /// bytes are longer. The slot number does not change.
    pub fn update_tuple(&self, page: &mut Page, slot: u32, data: &[u8]) -> Result<(), PageError> {
        let tuple_slot = self.checked_slot(page, slot)?;
        if tuple_slot.deleted {
            return Err(PageError::TupleNotFound);
        }

        let new_size = data.len() as u32;
        let slot_pos = Self::slot_position(slot);

        if new_size <= tuple_slot.length {
            let start = tuple_slot.offset as usize;
            page.data[start..start + data.len()].copy_from_slice(data);
            let updated = TupleSlot {
                offset: tuple_slot.offset,
                length: new_size,
                deleted: false,
            };
            page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&updated.to_bytes());
            return Ok(());
        }

        // Longer tuple: write a fresh copy into the free area. The old bytes
        // stay behind as garbage until compaction.
        let mut header = self.header(page);
        if header.free_space_size < new_size {
            return Err(PageError::InsufficientSpace);
        }

        let new_offset = header.free_space_offset;
        let start = new_offset as usize;
        page.data[start..start + data.len()].copy_from_slice(data);

        let updated = TupleSlot {
            offset: new_offset,
            length: new_size,
            deleted: false,
        };
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&updated.to_bytes());

        header.free_space_offset += new_size;
        header.free_space_size -= new_size;
        self.write_header(page, &header);

        Ok(())
    }

    /// Set the delete mark. The tuple bytes stay readable for rollback.
    pub fn mark_delete(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let mut tuple_slot = self.checked_slot(page, slot)?;
        if tuple_slot.deleted {
            return Err(PageError::TupleAlreadyDeleted);
        }
        tuple_slot.deleted = true;
        self.write_slot(page, slot, &tuple_slot);
        Ok(())
    }

    /// Clear the delete mark set by `mark_delete`.
    pub fn rollback_delete(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let mut tuple_slot = self.checked_slot(page, slot)?;
        if !tuple_slot.deleted {
            return Err(PageError::TupleNotDeleted);
        }
        tuple_slot.deleted = false;
        self.write_slot(page, slot, &tuple_slot);
        Ok(())
    }

    /// Make a delete-marked tuple permanently gone: the slot becomes vacant.
    /// Tuple bytes are reclaimed by compaction, not here.
    pub fn apply_delete(&self, page: &mut Page, slot: u32) -> Result<(), PageError> {
        let tuple_slot = self.checked_slot(page, slot)?;
        let vacated = TupleSlot {
            offset: tuple_slot.offset,
            length: 0,
            deleted: false,
        };
        self.write_slot(page, slot, &vacated);
        Ok(())
    }

    /// Whether the slot currently carries the delete mark.
    pub fn is_delete_marked(&self, page: &Page, slot: u32) -> Result<bool, PageError> {
        Ok(self.checked_slot(page, slot)?.deleted)
    }

    pub fn header(&self, page: &Page) -> PageHeader {
        PageHeader::from_bytes(&page.data[0..HEADER_SIZE])
    }

    pub fn write_header(&self, page: &mut Page, header: &PageHeader) {
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn free_space(&self, page: &Page) -> u32 {
        self.header(page).free_space_size
    }

    pub fn tuple_count(&self, page: &Page) -> u32 {
        self.header(page).tuple_count
    }

    pub fn slot(&self, page: &Page, slot: u32) -> TupleSlot {
        let slot_pos = Self::slot_position(slot);
        TupleSlot::from_bytes(&page.data[slot_pos..slot_pos + SLOT_SIZE])
    }

    fn checked_slot(&self, page: &Page, slot: u32) -> Result<TupleSlot, PageError> {
        if slot >= self.header(page).tuple_count {
            return Err(PageError::InvalidSlot);
        }
        let tuple_slot = self.slot(page, slot);
        if tuple_slot.is_vacant() {
            return Err(PageError::TupleNotFound);
        }
        Ok(tuple_slot)
    }

    fn write_slot(&self, page: &mut Page, slot: u32, tuple_slot: &TupleSlot) {
        let slot_pos = Self::slot_position(slot);
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&tuple_slot.to_bytes());
    }

    fn slot_position(slot: u32) -> usize {
        PAGE_SIZE - SLOT_SIZE * (slot as usize + 1)
    }
}
