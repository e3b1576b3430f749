use super::{Error, MAX_WIDTH, Register, low_mask};

/// A contiguous run of bits inside a register, e.g. the low byte.
///
/// The field holds no value of its own; it is applied to a [`Register`] on
/// every access. Whether the field fits the register is checked then, with
/// the same rules as [`Register::read_range`] and [`Register::write_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitField {
    start: u32,
    size: u32,
}

impl BitField {
    pub const fn new(start: u32, size: u32) -> Result<Self, DefinitionError> {
        if size == 0 || start >= MAX_WIDTH || size > MAX_WIDTH - start {
            Err(DefinitionError { start, size })
        } else {
            Ok(Self { start, size })
        }
    }

    pub const fn start(&self) -> u32 {
        self.start
    }

    pub const fn size(&self) -> u32 {
        self.size
    }

    /// One past the highest bit of the field.
    pub const fn end(&self) -> u32 {
        self.start + self.size
    }

    pub const fn mask(&self) -> u64 {
        low_mask(self.size) << self.start
    }

    pub fn get(&self, register: &Register) -> Result<u64, Error> {
        register.read_range(self.start..self.end())
    }

    pub fn set(&self, register: &mut Register, value: u64) -> Result<(), Error> {
        if value > low_mask(self.size) {
            return Err(Error::ValueTooLarge {
                value,
                size: self.size,
            });
        }
        register.write_range(self.start, self.size, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Bit field of {size} bits at bit {start} is not a valid definition")]
pub struct DefinitionError {
    pub start: u32,
    pub size: u32,
}
