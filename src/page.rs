//! Flash layout of a page and the bounded accessors every other module goes through.
//!
//! ```text
//! unit:   0        1       2      3       4            2n+1    2n+2
//!       [header][value0][key0][value1][key1] ... [value n][key n]
//! ```

use crate::error::Error;
use crate::platform::{Platform, UNIT_SIZE, UnitOps};
use crate::{KeyTable, Store};
#[cfg(feature = "defmt")]
use defmt::trace;

pub(crate) const HEADER_SIZE: usize = UNIT_SIZE;
pub(crate) const RECORD_SIZE: usize = 2 * UNIT_SIZE;

/// All bits set, default state of a unit after flash erase.
pub(crate) const ERASED_UNIT: u16 = u16::MAX;

/// The erased pattern marks an empty key unit and therefore can't name a real key.
pub const RESERVED_KEY: u16 = ERASED_UNIT;

/// Raw header values. Each transition only clears bits.
#[derive(strum::FromRepr, Debug, PartialEq, Copy, Clone)]
#[repr(u16)]
enum Marker {
    Erased = 0xFFFF,
    Receiving = 0xEEEE,
    Valid = 0x0000,
}

#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PageState {
    /// All bits set, default state after flash erase.
    Erased,

    /// Target of a page transfer that hasn't been finished yet. Not authoritative for reads.
    Receiving,

    /// Authoritative page for reads and writes.
    Valid,

    /// Header holds none of the known markers, e.g. after an interrupted erase.
    Corrupt,
}

impl From<u16> for PageState {
    fn from(raw: u16) -> Self {
        match Marker::from_repr(raw) {
            Some(Marker::Erased) => PageState::Erased,
            Some(Marker::Receiving) => PageState::Receiving,
            Some(Marker::Valid) => PageState::Valid,
            None => PageState::Corrupt,
        }
    }
}

#[derive(strum::Display, Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PageId {
    Page0,
    Page1,
}

impl PageId {
    pub const ALL: [PageId; 2] = [PageId::Page0, PageId::Page1];

    /// The alternate page of the pair.
    pub const fn other(self) -> PageId {
        match self {
            PageId::Page0 => PageId::Page1,
            PageId::Page1 => PageId::Page0,
        }
    }

    pub(crate) const fn index(self) -> usize {
        match self {
            PageId::Page0 => 0,
            PageId::Page1 => 1,
        }
    }
}

/// Index of a record inside a page, starting right after the header.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) struct Slot(pub(crate) usize);

/// Offset in program units from the start of a page. Unit 0 is the header.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) struct UnitOffset(pub(crate) usize);

impl UnitOffset {
    pub(crate) const HEADER: UnitOffset = UnitOffset(0);

    pub(crate) const fn value_of(slot: Slot) -> Self {
        Self(1 + 2 * slot.0)
    }

    pub(crate) const fn key_of(slot: Slot) -> Self {
        Self(2 + 2 * slot.0)
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) struct Record {
    pub(crate) value: u16,
    pub(crate) key: u16,
}

impl Record {
    pub(crate) const fn new(key: u16, value: u16) -> Self {
        Self { value, key }
    }

    /// Both units still erased, the slot can take a record.
    pub(crate) const fn is_free(&self) -> bool {
        self.value == ERASED_UNIT && self.key == ERASED_UNIT
    }

    /// Power was lost between programming the value and the key unit.
    pub(crate) const fn is_half_written(&self) -> bool {
        self.key == ERASED_UNIT && self.value != ERASED_UNIT
    }
}

/// Location and size of the two pages. Both pages have the same size and must start at an erase
/// block boundary.
///
/// Tip: declare the layout as a constant and check it against the key table at compile time:
///   `const _: () = assert!(LAYOUT.fits(&KEYS));`
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Layout {
    pages: [u32; 2],
    page_size: u32,
}

impl Layout {
    pub const fn new(page0_address: u32, page1_address: u32, page_size: u32) -> Self {
        Self {
            pages: [page0_address, page1_address],
            page_size,
        }
    }

    pub const fn page_address(&self, page: PageId) -> u32 {
        self.pages[page.index()]
    }

    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of records a page holds.
    pub const fn records_per_page(&self) -> usize {
        (self.page_size as usize).saturating_sub(HEADER_SIZE) / RECORD_SIZE
    }

    pub(crate) const fn units_per_page(&self) -> usize {
        self.page_size as usize / UNIT_SIZE
    }

    /// A transfer writes the latest value of every key to a fresh page, so the whole table has
    /// to fit into one.
    pub const fn fits(&self, keys: &KeyTable<'_>) -> bool {
        keys.len() <= self.records_per_page()
    }

    pub(crate) fn validate<T: Platform>(&self, capacity: usize) -> Result<(), Error> {
        let page_size = self.page_size as usize;
        if page_size == 0
            || !page_size.is_multiple_of(T::ERASE_SIZE)
            || self.records_per_page() == 0
        {
            return Err(Error::InvalidPageSize);
        }

        for address in self.pages {
            let address = address as usize;
            if !address.is_multiple_of(T::ERASE_SIZE) {
                return Err(Error::InvalidPageAddress);
            }
            match address.checked_add(page_size) {
                Some(end) if end <= capacity && end <= u32::MAX as usize => {}
                _ => return Err(Error::InvalidPageAddress),
            }
        }

        let [page0, page1] = self.pages;
        if page0.abs_diff(page1) < self.page_size {
            return Err(Error::PagesOverlap);
        }

        Ok(())
    }
}

impl<T: Platform> Store<'_, T> {
    fn unit_address(&self, page: PageId, offset: UnitOffset) -> Result<u32, Error> {
        if offset.0 >= self.layout.units_per_page() {
            return Err(Error::OutOfBounds);
        }
        Ok(self.layout.page_address(page) + (offset.0 * UNIT_SIZE) as u32)
    }

    pub(crate) fn read_unit(&mut self, page: PageId, offset: UnitOffset) -> Result<u16, Error> {
        let address = self.unit_address(page, offset)?;
        self.hal
            .read_unit(address)
            .map_err(|_| Error::FlashOpFailed)
    }

    pub(crate) fn write_unit(
        &mut self,
        page: PageId,
        offset: UnitOffset,
        value: u16,
    ) -> Result<(), Error> {
        let address = self.unit_address(page, offset)?;

        #[cfg(feature = "defmt")]
        trace!("write_unit: @{:#x} = {:#x}", address, value);

        #[cfg(feature = "debug-logs")]
        println!("  page: write_unit: 0x{address:0>8x} = 0x{value:0>4x}");

        self.hal
            .program_unit(address, value)
            .map_err(|_| Error::FlashOpFailed)
    }

    pub(crate) fn read_record(&mut self, page: PageId, slot: Slot) -> Result<Record, Error> {
        // the key unit is the last unit of the record, checking it covers both
        self.unit_address(page, UnitOffset::key_of(slot))?;
        let address = self.unit_address(page, UnitOffset::value_of(slot))?;
        let (value, key) = self
            .hal
            .read_unit_pair(address)
            .map_err(|_| Error::FlashOpFailed)?;
        Ok(Record { value, key })
    }

    /// The key unit goes last: an interrupted write leaves a half-written record which never
    /// matches any key.
    pub(crate) fn program_record(
        &mut self,
        page: PageId,
        slot: Slot,
        record: Record,
    ) -> Result<(), Error> {
        self.write_unit(page, UnitOffset::value_of(slot), record.value)?;
        self.write_unit(page, UnitOffset::key_of(slot), record.key)
    }

    pub(crate) fn page_state(&mut self, page: PageId) -> Result<PageState, Error> {
        Ok(PageState::from(self.read_unit(page, UnitOffset::HEADER)?))
    }

    pub(crate) fn mark_as_receiving(&mut self, page: PageId) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("mark_as_receiving: {}", page);

        self.write_unit(page, UnitOffset::HEADER, Marker::Receiving as u16)
    }

    pub(crate) fn mark_as_valid(&mut self, page: PageId) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("mark_as_valid: {}", page);

        self.write_unit(page, UnitOffset::HEADER, Marker::Valid as u16)
    }

    pub(crate) fn erase_page(&mut self, page: PageId) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("erase_page: {}", page);

        #[cfg(feature = "debug-logs")]
        println!("  page: erase_page: {page}");

        let address = self.layout.page_address(page);
        self.hal
            .erase_block(address, self.layout.page_size)
            .map_err(|_| Error::FlashOpFailed)
    }
}
