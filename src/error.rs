use thiserror::Error;

/// Errors that can occur during store operations. Marked as non-exhaustive to allow for future
/// additions without breaking the API. A caller would usually only need to handle `NotFound`
/// (supply a default) and `FlashOpFailed` (re-run `init` before retrying) as the other errors are
/// static configuration mistakes.
#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Page addresses have to be aligned to the flash erase size and lie within the flash
    #[error("invalid page address")]
    InvalidPageAddress,

    /// The page size has to be a multiple of the flash erase size and hold at least one record
    #[error("invalid page size")]
    InvalidPageSize,

    /// Page-0 and Page-1 must not share any erase block
    #[error("pages overlap")]
    PagesOverlap,

    /// `0xFFFF` is the pattern of an erased unit and can't be used as a key
    #[error("reserved key")]
    ReservedKey,

    /// Every key may appear only once in the key table
    #[error("duplicate key")]
    DuplicateKey,

    /// A single page has to be able to hold the latest value of every key
    #[error("key table too large for page")]
    KeyTableTooLarge,

    /// The key is not part of the key table the store was created with
    #[error("unknown key")]
    UnknownKey,

    /// Key not found. No value has been written yet or the store was formatted.
    #[error("key not found")]
    NotFound,

    /// The stored value doesn't fit into the requested type
    #[error("value out of range")]
    ValueOutOfRange,

    /// Neither page is authoritative. Calling `init` formats or repairs the pages.
    #[error("no valid page")]
    NoValidPage,

    /// The internal error value is returned from the provided `NorFlash`
    #[error("flash operation failed")]
    FlashOpFailed,

    /// A unit offset beyond the end of a page was accessed
    #[error("offset out of page bounds")]
    OutOfBounds,

    /// Used internally to indicate that a transfer target ran out of free slots.
    #[error("page full")]
    PageFull,
}
