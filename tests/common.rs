#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use virtual_eeprom::{KeyTable, Layout, Store};

pub const FLASH_SECTOR_SIZE: usize = 64;
pub const UNIT_SIZE: usize = 2;
pub const HEADER_SIZE: usize = UNIT_SIZE;
pub const RECORD_SIZE: usize = 2 * UNIT_SIZE;
pub const RECORDS_PER_PAGE: usize = (FLASH_SECTOR_SIZE - HEADER_SIZE) / RECORD_SIZE;

pub const ERASED: u16 = 0xFFFF;
pub const RECEIVING: u16 = 0xEEEE;
pub const VALID: u16 = 0x0000;

pub const PAGE0: u32 = 0;
pub const PAGE1: u32 = FLASH_SECTOR_SIZE as u32;
pub const LAYOUT: Layout = Layout::new(PAGE0, PAGE1, FLASH_SECTOR_SIZE as u32);

pub const KEYS: KeyTable = KeyTable::new(&[
    0x5555, 0x6666, 0x7777, 0x0001, 0x0002, 0x0003, 0x0004, 0x0005,
]);

const _: () = assert!(LAYOUT.fits(&KEYS));

#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    /// Counts only writes and erases, reads never fail. Used to cut power at a specific mutation.
    pub fail_after_mutation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl Operation {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Read { .. })
    }
}

impl Flash {
    pub fn new(pages: usize) -> Self {
        Self {
            buf: vec![0xffu8; FLASH_SECTOR_SIZE * pages],
            fail_after_operation: usize::MAX,
            fail_after_mutation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn disable_faults(&mut self) {
        self.fail_after_operation = usize::MAX;
        self.fail_after_mutation = usize::MAX;
    }

    /// Arms a power loss after `count` more writes or erases.
    pub fn cut_power_after(&mut self, count: usize) {
        self.fail_after_mutation = self.mutations() + count;
    }

    pub fn erases(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Erase { .. }))
            .count()
    }

    pub fn mutations(&self) -> usize {
        self.operations.iter().filter(|op| op.is_mutation()).count()
    }

    pub fn unit(&self, address: u32) -> u16 {
        let address = address as usize;
        u16::from_le_bytes([self.buf[address], self.buf[address + 1]])
    }

    /// Programs a unit behind the store's back, with the same 1 -> 0 semantics as `write`.
    pub fn poke(&mut self, address: u32, value: u16) {
        let address = address as usize;
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.buf[address + i] &= byte;
        }
    }

    /// Overwrites a unit regardless of its current content, simulating corrupted cells.
    pub fn corrupt(&mut self, address: u32, value: u16) {
        let address = address as usize;
        self.buf[address..address + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub fn header(&self, page: u32) -> u16 {
        self.unit(page)
    }

    pub fn headers(&self) -> [u16; 2] {
        [self.header(PAGE0), self.header(PAGE1)]
    }

    pub fn record_address(page: u32, slot: usize) -> u32 {
        page + (HEADER_SIZE + slot * RECORD_SIZE) as u32
    }

    /// `(value, key)` as laid out in flash.
    pub fn record(&self, page: u32, slot: usize) -> (u16, u16) {
        let address = Self::record_address(page, slot);
        (self.unit(address), self.unit(address + UNIT_SIZE as u32))
    }

    fn check_fault(&self, mutation: bool) -> Result<(), FlashError> {
        if self.operations.len() >= self.fail_after_operation
            || (mutation && self.mutations() >= self.fail_after_mutation)
        {
            println!("    flash: FAULT");
            return Err(FlashError);
        }
        Ok(())
    }
}

/// Creates a store over the test layout and runs `init`.
pub fn open(flash: &mut Flash) -> Store<'static, &mut Flash> {
    let mut store = Store::new(flash, LAYOUT, KEYS).unwrap();
    store.init().unwrap();
    store
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = UNIT_SIZE;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::READ_SIZE as _));

        println!(
            "    flash: read:  0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );
        self.check_fault(false)?;
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = UNIT_SIZE;

    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(from.is_multiple_of(Self::ERASE_SIZE as _));
        assert!(to.is_multiple_of(Self::ERASE_SIZE as _));

        println!(
            "    flash: erase: {from:04X} - {to:04X} #{:>2}",
            self.operations.len()
        );
        self.check_fault(true)?;

        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        for addr in from..to {
            self.buf[addr as usize] = 0xff;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(offset.is_multiple_of(Self::WRITE_SIZE as _));
        assert!(bytes.len().is_multiple_of(Self::WRITE_SIZE as _));

        println!(
            "    flash: write: 0x{offset:04X}[0x{:04X}] #{:>2}",
            bytes.len(),
            self.operations.len()
        );
        self.check_fault(true)?;
        assert!(bytes.len() > 0);

        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // flash can only flip bits from 1 to 0
            self.buf[offset + i] &= val;
        }
        Ok(())
    }
}
