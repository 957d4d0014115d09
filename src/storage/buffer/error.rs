use thiserror::Error;

use crate::common::types::PageId;
use crate::storage::disk::DiskManagerError;

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("Buffer pool exhausted: all frames are pinned")]
    BufferPoolExhausted,

    #[error("Page {0} is not resident")]
    PageNotResident(PageId),

    #[error("Page {0} is not pinned")]
    PageNotPinned(PageId),

    #[error("Page {0} is pinned")]
    PagePinned(PageId),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Disk manager error: {0}")]
    DiskManagerError(#[from] DiskManagerError),
}
