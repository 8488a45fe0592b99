use crate::Store;
use crate::error::Error;
use crate::page::{ERASED_UNIT, PageId, Slot};
use crate::platform::{Platform, UNIT_SIZE};
#[cfg(feature = "defmt")]
use defmt::trace;
use embedded_storage::nor_flash::ReadNorFlash;

/// Bytes read per flash access while checking whether a page is blank.
const BLANK_CHECK_CHUNK: usize = 32;

/// Counts of the slots of a single page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecordStatistics {
    pub written: u32,
    pub half_written: u32,
    pub free: u32,
}

impl<T: Platform> Store<'_, T> {
    /// Later writes always land at higher slots, so scanning from the end yields the latest value.
    /// Free and half-written slots carry the erased key and never match.
    pub(crate) fn find_latest(&mut self, page: PageId, key: u16) -> Result<Option<u16>, Error> {
        #[cfg(feature = "defmt")]
        trace!("find_latest: {} key {:#x}", page, key);

        debug_assert_ne!(key, ERASED_UNIT);

        for slot in (0..self.layout.records_per_page()).rev() {
            let record = self.read_record(page, Slot(slot))?;
            if record.key == key {
                return Ok(Some(record.value));
            }
        }
        Ok(None)
    }

    /// Returns the first slot whose units were never programmed, `None` if the page is full.
    pub(crate) fn find_free_slot(&mut self, page: PageId) -> Result<Option<Slot>, Error> {
        for slot in 0..self.layout.records_per_page() {
            if self.read_record(page, Slot(slot))?.is_free() {
                return Ok(Some(Slot(slot)));
            }
        }
        Ok(None)
    }

    /// A page whose header reads erased may still hold data if an erase was cut short.
    pub(crate) fn is_blank(&mut self, page: PageId) -> Result<bool, Error> {
        let base = self.layout.page_address(page) as usize;
        let page_size = self.layout.page_size() as usize;

        let mut buf = [0u8; BLANK_CHECK_CHUNK];
        let mut offset = 0;
        while offset < page_size {
            let len = BLANK_CHECK_CHUNK.min(page_size - offset);
            let chunk = &mut buf[..len];
            self.hal
                .read((base + offset) as u32, chunk)
                .map_err(|_| Error::FlashOpFailed)?;
            if chunk.iter().any(|&byte| byte != 0xFF) {
                return Ok(false);
            }
            offset += len;
        }
        Ok(true)
    }

    pub(crate) fn record_statistics(&mut self, page: PageId) -> Result<RecordStatistics, Error> {
        let mut statistics = RecordStatistics::default();
        for slot in 0..self.layout.records_per_page() {
            let record = self.read_record(page, Slot(slot))?;
            if record.is_free() {
                statistics.free += 1;
            } else if record.is_half_written() {
                statistics.half_written += 1;
            } else {
                statistics.written += 1;
            }
        }
        Ok(statistics)
    }
}

// The blank check reads whole chunks, which must stay aligned to the unit size.
const _: () = assert!(BLANK_CHECK_CHUNK % UNIT_SIZE == 0);
