use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Page, PageId, INVALID_PAGE_ID, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
}

/// DiskManager is responsible for handling the actual disk I/O operations
pub struct DiskManager {
    db_file: Mutex<File>,
}

impl DiskManager {
    /// Create a new DiskManager with the specified database file
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(db_path)?;

        Ok(Self {
            db_file: Mutex::new(file),
        })
    }

    /// Read a page from disk.
    ///
    /// A page that has never been written reads back as all zeros.
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        if page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }

        let offset = Self::page_offset(page_id);
        let mut buffer = [0u8; PAGE_SIZE];

        {
            let mut file = self.db_file.lock();
            let file_size = file.metadata()?.len();

            // Pages past the end of the file are fresh: hand back a zeroed page
            if offset >= file_size {
                *page = Page::new(page_id);
                return Ok(());
            }

            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buffer)?;
        }

        page.data.copy_from_slice(&buffer);
        page.page_id = page_id;

        Ok(())
    }

    /// Write a page to disk
    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        if page.page_id == INVALID_PAGE_ID {
            return Err(DiskManagerError::InvalidPageId(page.page_id));
        }

        let offset = Self::page_offset(page.page_id);

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&page.data)?;
        file.flush()?;

        Ok(())
    }

    /// Release a page's storage.
    ///
    /// Space is not reclaimed; the slot reads back as zeros until reused.
    pub fn deallocate_page(&self, page_id: PageId) {
        log::debug!("deallocate page {}", page_id);
    }

    /// Calculate the offset of a page in the file
    fn page_offset(page_id: PageId) -> u64 {
        page_id as u64 * PAGE_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_then_read_page() {
        let temp_file = NamedTempFile::new().unwrap();
        let disk_manager = DiskManager::new(temp_file.path()).unwrap();

        let mut page = Page::new(3);
        page.data[0..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        disk_manager.write_page(&page).unwrap();

        let mut read_back = Page::new(0);
        disk_manager.read_page(3, &mut read_back).unwrap();
        assert_eq!(read_back.page_id, 3);
        assert_eq!(&read_back.data[0..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_read_unwritten_page_is_zeroed() {
        let temp_file = NamedTempFile::new().unwrap();
        let disk_manager = DiskManager::new(temp_file.path()).unwrap();

        let mut page = Page::new(0);
        page.data.fill(0xFF);
        disk_manager.read_page(7, &mut page).unwrap();
        assert_eq!(page.page_id, 7);
        assert!(page.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_invalid_page_id_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        let disk_manager = DiskManager::new(temp_file.path()).unwrap();

        let mut page = Page::new(INVALID_PAGE_ID);
        assert!(disk_manager.read_page(INVALID_PAGE_ID, &mut page).is_err());
        assert!(disk_manager.write_page(&page).is_err());
    }
}
