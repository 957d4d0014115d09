use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Not enough space in page")]
    InsufficientSpace,
    #[error("Invalid slot number")]
    InvalidSlot,
    #[error("Tuple not found")]
    TupleNotFound,
    #[error("Tuple is already delete-marked")]
    TupleAlreadyDeleted,
    #[error("Tuple is not delete-marked")]
    TupleNotDeleted,
}
