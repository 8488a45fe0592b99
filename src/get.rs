//! The `Get<T>` trait and its implementation in this module allows providing a single generic,
//! overloaded function `get<T>()` for all types that fit into a 16-bit value.

use crate::Store;
use crate::error::Error;
use crate::platform::Platform;

pub trait Get<T> {
    fn get(&mut self, key: u16) -> Result<T, Error>;
}

impl<T, G: Get<T>> Get<T> for &mut G {
    fn get(&mut self, key: u16) -> Result<T, Error> {
        (*self).get(key)
    }
}

impl<T: Platform> Get<bool> for Store<'_, T> {
    fn get(&mut self, key: u16) -> Result<bool, Error> {
        let value = self.read(key)?;
        Ok(value != 0)
    }
}

impl<T: Platform> Get<u8> for Store<'_, T> {
    fn get(&mut self, key: u16) -> Result<u8, Error> {
        let value = self.read(key)?;
        u8::try_from(value).map_err(|_| Error::ValueOutOfRange)
    }
}

impl<T: Platform> Get<u16> for Store<'_, T> {
    fn get(&mut self, key: u16) -> Result<u16, Error> {
        self.read(key)
    }
}

impl<T: Platform> Get<i8> for Store<'_, T> {
    fn get(&mut self, key: u16) -> Result<i8, Error> {
        let value = self.read(key)?;
        i8::try_from(value.cast_signed()).map_err(|_| Error::ValueOutOfRange)
    }
}

impl<T: Platform> Get<i16> for Store<'_, T> {
    fn get(&mut self, key: u16) -> Result<i16, Error> {
        let value = self.read(key)?;
        Ok(value.cast_signed())
    }
}
