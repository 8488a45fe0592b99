use crate::Store;
use crate::error::Error;
use crate::page::{PageId, PageState, Record};
use crate::platform::Platform;
#[cfg(feature = "defmt")]
use defmt::{trace, warn};

impl<T: Platform> Store<'_, T> {
    /// Moves the latest value of every key from `source` into `target`, then retires `source`.
    ///
    /// Every step is append-only on `target` and the copy order follows the key table, so after a
    /// power loss the whole transfer can simply run again against the same `target`:
    /// 1. mark `target` as receiving, unless it already is
    /// 2. write the pending record, guaranteeing progress for the write which triggered the transfer
    /// 3. copy every other key that `target` doesn't hold yet
    /// 4. erase `source`
    /// 5. mark `target` as valid
    pub(crate) fn transfer(
        &mut self,
        source: PageId,
        target: PageId,
        pending: Option<Record>,
    ) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("transfer: {} -> {}", source, target);

        #[cfg(feature = "debug-logs")]
        println!("transfer: {source} -> {target}: pending {pending:?}");

        match self.page_state(target)? {
            PageState::Receiving => {}
            PageState::Erased if self.is_blank(target)? => self.mark_as_receiving(target)?,
            _ => {
                self.erase_page(target)?;
                self.mark_as_receiving(target)?;
            }
        }

        match self.copy_records(source, target, pending) {
            Err(Error::PageFull) => {
                // Only a target left over from several interrupted attempts can run full. Nothing
                // on it was acknowledged yet, so starting over from `source` loses no data.
                #[cfg(feature = "defmt")]
                warn!("transfer target {} full, restarting", target);

                self.erase_page(target)?;
                self.mark_as_receiving(target)?;
                self.copy_records(source, target, pending)?;
            }
            result => result?,
        }

        self.erase_page(source)?;
        self.mark_as_valid(target)
    }

    fn copy_records(
        &mut self,
        source: PageId,
        target: PageId,
        pending: Option<Record>,
    ) -> Result<(), Error> {
        if let Some(record) = pending {
            self.append_record(target, record)?;
        }

        let keys = self.keys;
        for &key in keys.iter() {
            if pending.is_some_and(|record| record.key == key) {
                continue;
            }

            // already copied by an earlier attempt, or written while the transfer was pending
            if self.find_latest(target, key)?.is_some() {
                continue;
            }

            if let Some(value) = self.find_latest(source, key)? {
                self.append_record(target, Record::new(key, value))?;
            }
        }

        Ok(())
    }

    fn append_record(&mut self, page: PageId, record: Record) -> Result<(), Error> {
        let slot = self.find_free_slot(page)?.ok_or(Error::PageFull)?;
        self.program_record(page, slot, record)
    }
}
