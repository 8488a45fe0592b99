use crate::Store;
use crate::error::Error;
use crate::platform::Platform;

pub trait Set<T> {
    fn set(&mut self, key: u16, value: T) -> Result<(), Error>;
}

impl<T, S: Set<T>> Set<T> for &mut S {
    fn set(&mut self, key: u16, value: T) -> Result<(), Error> {
        (*self).set(key, value)
    }
}

impl<T: Platform> Set<bool> for Store<'_, T> {
    fn set(&mut self, key: u16, value: bool) -> Result<(), Error> {
        self.write(key, value as u16)
    }
}

impl<T: Platform> Set<u8> for Store<'_, T> {
    fn set(&mut self, key: u16, value: u8) -> Result<(), Error> {
        self.write(key, value as u16)
    }
}

impl<T: Platform> Set<u16> for Store<'_, T> {
    fn set(&mut self, key: u16, value: u16) -> Result<(), Error> {
        self.write(key, value)
    }
}

// sign-extended, so the value reads back as i16 as well
impl<T: Platform> Set<i8> for Store<'_, T> {
    fn set(&mut self, key: u16, value: i8) -> Result<(), Error> {
        self.write(key, (value as i16).cast_unsigned())
    }
}

impl<T: Platform> Set<i16> for Store<'_, T> {
    fn set(&mut self, key: u16, value: i16) -> Result<(), Error> {
        self.write(key, value.cast_unsigned())
    }
}
