use embedded_storage::nor_flash::NorFlash;

/// Any NOR flash can back the store as long as it can program half-words. `&mut T` works too,
/// through the blanket implementation of `embedded-storage`.
pub trait Platform: NorFlash {}

impl<T: NorFlash> Platform for T {}

/// Width of the smallest unit the store programs, in bytes.
pub(crate) const UNIT_SIZE: usize = 2;

/// Half-word primitives on top of the byte oriented `NorFlash` interface.
pub(crate) trait UnitOps: Platform {
    /// Rejected at compile time for flashes with a coarser read or write granularity.
    const SUPPORTED: () = assert!(
        UNIT_SIZE % Self::WRITE_SIZE == 0 && UNIT_SIZE % Self::READ_SIZE == 0,
        "flash must be able to read and program single half-words"
    );

    fn read_unit(&mut self, address: u32) -> Result<u16, Self::Error> {
        let mut buf = [0u8; UNIT_SIZE];
        self.read(address, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Reads two consecutive units with a single flash access.
    fn read_unit_pair(&mut self, address: u32) -> Result<(u16, u16), Self::Error> {
        let mut buf = [0u8; 2 * UNIT_SIZE];
        self.read(address, &mut buf)?;
        Ok((
            u16::from_le_bytes([buf[0], buf[1]]),
            u16::from_le_bytes([buf[2], buf[3]]),
        ))
    }

    fn program_unit(&mut self, address: u32, value: u16) -> Result<(), Self::Error> {
        self.write(address, &value.to_le_bytes())
    }

    fn erase_block(&mut self, address: u32, size: u32) -> Result<(), Self::Error> {
        self.erase(address, address + size)
    }
}

impl<T: Platform> UnitOps for T {}
