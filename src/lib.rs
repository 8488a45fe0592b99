#![doc = include_str!("../README.md")]
#![cfg_attr(not(target_arch = "x86_64"), no_std)]

pub mod error;
mod get;
mod page;
pub mod platform;
mod resolver;
mod scanner;
mod set;
mod transfer;

pub use get::Get;
pub use page::{Layout, PageId, PageState, RESERVED_KEY};
pub use scanner::RecordStatistics;
pub use set::Set;

use crate::error::Error;
use crate::page::Record;
use crate::platform::{Platform, UnitOps};
use crate::resolver::WriteTarget;
#[cfg(feature = "defmt")]
use defmt::trace;
use embedded_storage::nor_flash::ReadNorFlash;

/// The fixed set of keys a store persists. Owned by the client, never modified by the store.
///
/// Usage: `const KEYS: KeyTable = KeyTable::new(&[0x0001, 0x0002, 0x0003]);`
///
/// Constructing the table in a const context turns a reserved or duplicate key into a compile
/// error.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct KeyTable<'k>(&'k [u16]);

impl<'k> KeyTable<'k> {
    /// Panics if a key equals [`RESERVED_KEY`] or appears more than once.
    pub const fn new(keys: &'k [u16]) -> Self {
        match Self::check(keys) {
            Ok(()) => Self(keys),
            Err(Error::ReservedKey) => panic!("0xFFFF is reserved and can't be used as a key"),
            Err(_) => panic!("duplicate key in key table"),
        }
    }

    /// Non-panicking variant of [`KeyTable::new`].
    pub const fn try_new(keys: &'k [u16]) -> Result<Self, Error> {
        match Self::check(keys) {
            Ok(()) => Ok(Self(keys)),
            Err(e) => Err(e),
        }
    }

    const fn check(keys: &[u16]) -> Result<(), Error> {
        let mut i = 0;
        while i < keys.len() {
            if keys[i] == RESERVED_KEY {
                return Err(Error::ReservedKey);
            }
            let mut j = i + 1;
            while j < keys.len() {
                if keys[i] == keys[j] {
                    return Err(Error::DuplicateKey);
                }
                j += 1;
            }
            i += 1;
        }
        Ok(())
    }

    pub const fn len(&self) -> usize {
        self.0.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: u16) -> bool {
        self.0.contains(&key)
    }

    pub fn iter(&self) -> core::slice::Iter<'k, u16> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PageStatistics {
    pub state: PageState,
    pub records: RecordStatistics,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StoreStatistics {
    /// Indexed by page, Page-0 first.
    pub pages: [PageStatistics; 2],
    /// Keys of the key table with a value on the valid page.
    pub live_keys: u32,
}

/// Emulated EEPROM on top of two flash pages. The struct only holds configuration: everything
/// else, including which page is active, lives in flash and is derived from the page headers on
/// every call.
pub struct Store<'k, T: Platform> {
    pub(crate) hal: T,
    pub(crate) layout: Layout,
    pub(crate) keys: KeyTable<'k>,
}

impl<'k, T: Platform> Store<'k, T> {
    /// Validates the configuration against the flash geometry. The flash isn't touched, call
    /// [`Store::init`] before the first read or write.
    pub fn new(hal: T, layout: Layout, keys: KeyTable<'k>) -> Result<Self, Error> {
        #[allow(clippy::let_unit_value)]
        let () = <T as UnitOps>::SUPPORTED;

        layout.validate::<T>(hal.capacity())?;
        KeyTable::check(keys.0)?;
        if !layout.fits(&keys) {
            return Err(Error::KeyTableTooLarge);
        }

        Ok(Self { hal, layout, keys })
    }

    /// Inspects both page headers and repairs whatever a power loss left behind:
    /// 1. {Valid, Erased}: nothing to do
    /// 2. {Valid, Receiving}: an interrupted transfer is run again and completed
    /// 3. {Valid, Corrupt}: an erase of the other page was cut short and is run again
    /// 4. {Receiving, Erased}: the old page was already being erased, the new one is promoted
    /// 5. any other combination is formatted, all values are lost
    ///
    /// Safe to call any number of times. On a consistent store it only reads the two headers.
    pub fn init(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("init");

        self.recover()
    }

    /// Get the latest value written for `key`.
    ///
    /// `Error::NotFound` is not a failure: keys are only written once they leave their default.
    pub fn read(&mut self, key: u16) -> Result<u16, Error> {
        self.check_key(key)?;

        let page = self.resolve_for_read()?;
        self.find_latest(page, key)?.ok_or(Error::NotFound)
    }

    /// Append a new value for `key`. A full page is compacted into the other one first.
    ///
    /// On `Error::FlashOpFailed` the value may or may not have been persisted. Call `init` before
    /// retrying.
    pub fn write(&mut self, key: u16, value: u16) -> Result<(), Error> {
        self.check_key(key)?;

        #[cfg(feature = "debug-logs")]
        println!("store: write 0x{key:0>4x} = 0x{value:0>4x}");

        let record = Record::new(key, value);
        match self.resolve_for_write()? {
            WriteTarget::Page(page) => match self.find_free_slot(page)? {
                Some(slot) => self.program_record(page, slot, record),
                None => self.transfer(page, page.other(), Some(record)),
            },
            WriteTarget::Transfer { source, target } => {
                self.transfer(source, target, Some(record))
            }
        }
    }

    /// Get a value and convert it to `R`.
    ///
    /// Supported types are bool, u8, i8, u16 and i16.
    pub fn get<R>(&mut self, key: u16) -> Result<R, Error>
    where
        Store<'k, T>: Get<R>,
    {
        Get::get(self, key)
    }

    /// Convert a value to its 16 bit representation and write it.
    pub fn set<R>(&mut self, key: u16, value: R) -> Result<(), Error>
    where
        Store<'k, T>: Set<R>,
    {
        Set::set(self, key, value)
    }

    /// Erase all values. Afterwards every key reads `Error::NotFound`.
    pub fn erase_all(&mut self) -> Result<(), Error> {
        #[cfg(feature = "defmt")]
        trace!("erase_all");

        self.format()
    }

    /// Returns the state of both pages and how many slots are in use
    pub fn statistics(&mut self) -> Result<StoreStatistics, Error> {
        let pages = [
            self.page_statistics(PageId::Page0)?,
            self.page_statistics(PageId::Page1)?,
        ];

        let mut live_keys = 0;
        match self.resolve_for_read() {
            Ok(page) => {
                let keys = self.keys;
                for &key in keys.iter() {
                    if self.find_latest(page, key)?.is_some() {
                        live_keys += 1;
                    }
                }
            }
            Err(Error::NoValidPage) => {}
            Err(e) => return Err(e),
        }

        Ok(StoreStatistics { pages, live_keys })
    }

    fn page_statistics(&mut self, page: PageId) -> Result<PageStatistics, Error> {
        Ok(PageStatistics {
            state: self.page_state(page)?,
            records: self.record_statistics(page)?,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn keys(&self) -> KeyTable<'k> {
        self.keys
    }

    /// Number of records one page holds before it has to be compacted.
    pub fn capacity(&self) -> usize {
        self.layout.records_per_page()
    }

    fn check_key(&self, key: u16) -> Result<(), Error> {
        if self.keys.contains(key) {
            Ok(())
        } else {
            Err(Error::UnknownKey)
        }
    }
}
