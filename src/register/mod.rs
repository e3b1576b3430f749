use std::{
    collections::HashSet,
    fmt::{self, Binary, Display, Formatter, LowerHex, Octal, UpperHex},
    ops::{Bound, RangeBounds},
};

use bon::bon;
use tracing::trace;

mod field;

pub use field::{BitField, DefinitionError};

/// Widest register that fits the `u64` backing store.
pub const MAX_WIDTH: u32 = 64;

/// Name given to registers built without one.
pub const DEFAULT_NAME: &str = "REG";

/// Mask of the lowest `size` bits.
pub(crate) const fn low_mask(size: u32) -> u64 {
    if size == 0 {
        0
    } else {
        u64::MAX >> (MAX_WIDTH - size)
    }
}

/// Fixed-width unsigned value addressable by bit and by bit range.
///
/// The value never has bits set at or above `width`. Every fallible method
/// validates its arguments before touching the value, so a failed call leaves
/// the register as it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    name: String,
    width: u32,
    value: u64,
}

#[bon]
impl Register {
    #[builder]
    pub fn new(
        width: u32,
        #[builder(default)] value: u64,
        #[builder(into, default = DEFAULT_NAME.to_owned())] name: String,
    ) -> Result<Self, Error> {
        if !(1..=MAX_WIDTH).contains(&width) {
            return Err(Error::InvalidWidth { width });
        }

        Ok(Self {
            name,
            width,
            value: value & low_mask(width),
        })
    }

    /// Builds a register whose name must be one of `allowed`.
    pub fn named(
        width: u32,
        value: u64,
        name: impl Into<String>,
        allowed: &NameSet,
    ) -> Result<Self, Error> {
        let name = name.into();
        allowed.check(&name)?;
        Self::builder().width(width).value(value).name(name).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn read(&self) -> u64 {
        self.value
    }

    /// Passes the current value through `f`, e.g. to render it.
    pub fn read_transformed<T>(&self, f: impl FnOnce(u64) -> T) -> T {
        f(self.value)
    }

    pub fn read_bit(&self, bit: u32) -> Result<u8, Error> {
        self.check_bit(bit)?;
        Ok(((self.value >> bit) & 1) as u8)
    }

    pub fn write_bit(&mut self, bit: u32, value: u8) -> Result<(), Error> {
        self.check_bit(bit)?;

        let mask = 1u64 << bit;
        match value {
            0 => self.value &= !mask,
            1 => self.value |= mask,
            _ => return Err(Error::InvalidBitValue { value }),
        }

        trace!(register = %self.name, bit, value, "bit written");
        Ok(())
    }

    /// Reads the bits in `range`, shifted down to bit 0.
    ///
    /// An unbounded start means bit 0 and an unbounded end means the top of
    /// the register, so `read_range(..)` is the same as [`Register::read`].
    pub fn read_range(&self, range: impl RangeBounds<u32>) -> Result<u64, Error> {
        let (start, stop) = self.bounds(&range)?;
        Ok((self.value >> start) & low_mask(stop - start))
    }

    /// Replaces `size` bits starting at `start` with `value`.
    pub fn write_range(&mut self, start: u32, size: u32, value: u64) -> Result<(), Error> {
        let stop = u64::from(start) + u64::from(size);
        if size == 0 || stop > u64::from(self.width) {
            return Err(self.out_of_range(start.into(), stop));
        }
        self.replace(start, size, value)
    }

    /// Replaces the bits in `range` with `value`.
    ///
    /// The size of the write always comes from the range; an unbounded end
    /// extends it to the top of the register.
    pub fn write_slice(&mut self, range: impl RangeBounds<u32>, value: u64) -> Result<(), Error> {
        let (start, stop) = self.bounds(&range)?;
        self.replace(start, stop - start, value)
    }

    pub fn get(&self, field: &BitField) -> Result<u64, Error> {
        field.get(self)
    }

    pub fn set(&mut self, field: &BitField, value: u64) -> Result<(), Error> {
        field.set(self, value)
    }

    fn replace(&mut self, start: u32, size: u32, value: u64) -> Result<(), Error> {
        let max = low_mask(size);
        if value > max {
            return Err(Error::ValueTooLarge { value, size });
        }

        let mask = max << start;
        self.value = (self.value & !mask) | ((value << start) & mask);

        trace!(register = %self.name, start, size, value, "range written");
        Ok(())
    }

    fn check_bit(&self, bit: u32) -> Result<(), Error> {
        if bit < self.width {
            Ok(())
        } else {
            Err(self.out_of_range(bit.into(), u64::from(bit) + 1))
        }
    }

    fn bounds(&self, range: &impl RangeBounds<u32>) -> Result<(u32, u32), Error> {
        let start = match range.start_bound() {
            Bound::Included(&start) => u64::from(start),
            Bound::Excluded(&start) => u64::from(start) + 1,
            Bound::Unbounded => 0,
        };
        let stop = match range.end_bound() {
            Bound::Included(&stop) => u64::from(stop) + 1,
            Bound::Excluded(&stop) => u64::from(stop),
            Bound::Unbounded => u64::from(self.width),
        };

        if start < stop && stop <= u64::from(self.width) {
            Ok((start as u32, stop as u32))
        } else {
            Err(self.out_of_range(start, stop))
        }
    }

    fn out_of_range(&self, start: u64, stop: u64) -> Error {
        Error::OutOfRange {
            start,
            stop,
            width: self.width,
        }
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let digits = self.width.div_ceil(4) as usize;
        write!(
            f,
            "<{}:{}-bit 0x{:0digits$X}>",
            self.name, self.width, self.value
        )
    }
}

impl LowerHex for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        LowerHex::fmt(&self.value, f)
    }
}

impl UpperHex for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        UpperHex::fmt(&self.value, f)
    }
}

impl Octal for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Octal::fmt(&self.value, f)
    }
}

impl Binary for Register {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Binary::fmt(&self.value, f)
    }
}

/// Register names a caller accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameSet(HashSet<String>);

impl NameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.0.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn check(&self, name: &str) -> Result<(), Error> {
        if self.contains(name) {
            Ok(())
        } else {
            Err(Error::UnknownRegisterName {
                name: name.to_owned(),
            })
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for NameSet {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Bits {start}..{stop} are out of range for a {width}-bit register")]
    OutOfRange { start: u64, stop: u64, width: u32 },
    #[error("Bit value must be 0 or 1, got {value}")]
    InvalidBitValue { value: u8 },
    #[error("Value {value:#x} does not fit in {size} bits")]
    ValueTooLarge { value: u64, size: u32 },
    #[error(transparent)]
    InvalidDefinition(#[from] DefinitionError),
    #[error("Register name {name} is not allowed")]
    UnknownRegisterName { name: String },
    #[error("Register width must be within 1..={max}, got {width}", max = MAX_WIDTH)]
    InvalidWidth { width: u32 },
}

#[cfg(test)]
mod tests {
    mod construction {
        use crate::register::{Error, MAX_WIDTH, NameSet, Register};

        #[test]
        fn masks_initial_value_to_width() {
            for width in 1..=MAX_WIDTH {
                let reg = Register::builder()
                    .width(width)
                    .value(u64::MAX)
                    .build()
                    .unwrap();
                assert_eq!(reg.read(), u64::MAX >> (64 - width));
            }

            let reg = Register::builder()
                .width(8)
                .value(0x1234)
                .build()
                .unwrap();
            assert_eq!(reg.read(), 0x34);
        }

        #[test]
        fn defaults() {
            let reg = Register::builder().width(32).build().unwrap();
            assert_eq!(reg.read(), 0);
            assert_eq!(reg.name(), "REG");
            assert_eq!(reg.width(), 32);
        }

        #[test]
        fn rejects_invalid_width() {
            for width in [0, 65, u32::MAX] {
                assert_eq!(
                    Register::builder().width(width).build(),
                    Err(Error::InvalidWidth { width })
                );
            }
        }

        #[test]
        fn named_checks_allowed_set() {
            let names: NameSet = ["EAX", "EBX"].into_iter().collect();

            let reg = Register::named(32, 7, "EAX", &names).unwrap();
            assert_eq!(reg.name(), "EAX");
            assert_eq!(reg.read(), 7);

            assert_eq!(
                Register::named(32, 7, "RAX", &names),
                Err(Error::UnknownRegisterName {
                    name: "RAX".to_owned()
                })
            );
            assert!(Register::named(32, 0, "REG", &NameSet::new()).is_err());
        }
    }

    mod bits {
        use crate::register::{Error, MAX_WIDTH, Register};

        #[test]
        fn set_and_clear_every_bit() {
            for width in 1..=MAX_WIDTH {
                let mut reg = Register::builder()
                    .width(width)
                    .value(0xA5A5_A5A5_A5A5_A5A5)
                    .build()
                    .unwrap();

                for bit in 0..width {
                    let others = reg.read() & !(1u64 << bit);

                    reg.write_bit(bit, 1).unwrap();
                    assert_eq!(reg.read_bit(bit), Ok(1));
                    assert_eq!(reg.read() & !(1u64 << bit), others);

                    reg.write_bit(bit, 0).unwrap();
                    assert_eq!(reg.read_bit(bit), Ok(0));
                    assert_eq!(reg.read() & !(1u64 << bit), others);
                }
            }
        }

        #[test]
        fn idempotent() {
            let mut reg = Register::builder().width(16).build().unwrap();
            reg.write_bit(4, 1).unwrap();
            reg.write_bit(4, 1).unwrap();
            assert_eq!(reg.read(), 0x10);
            reg.write_bit(4, 0).unwrap();
            reg.write_bit(4, 0).unwrap();
            assert_eq!(reg.read(), 0);
        }

        #[test]
        fn out_of_range() {
            let mut reg = Register::builder().width(32).value(0x55).build().unwrap();
            for bit in [32, 33, u32::MAX] {
                assert!(matches!(
                    reg.write_bit(bit, 1),
                    Err(Error::OutOfRange { width: 32, .. })
                ));
                assert!(matches!(reg.read_bit(bit), Err(Error::OutOfRange { .. })));
            }
            assert_eq!(reg.read(), 0x55);
        }

        #[test]
        fn invalid_value() {
            let mut reg = Register::builder().width(32).value(0x55).build().unwrap();
            assert_eq!(
                reg.write_bit(1, 2),
                Err(Error::InvalidBitValue { value: 2 })
            );
            assert_eq!(reg.read(), 0x55);
        }
    }

    mod ranges {
        use crate::register::{Error, MAX_WIDTH, Register};

        #[test]
        fn example_sequence() {
            let mut reg = Register::builder()
                .width(32)
                .name("EAX")
                .build()
                .unwrap();

            reg.write_bit(3, 1).unwrap();
            assert_eq!(reg.read(), 0x8);

            reg.write_range(6, 6, 0b1111).unwrap();
            assert_eq!(reg.read(), 0x3C8);
            assert_eq!(reg.read_range(6..12), Ok(15));
        }

        #[test]
        fn write_then_read_every_range() {
            for width in [1, 7, 8, 31, 32, 63, 64] {
                for start in 0..width {
                    for size in 1..=width - start {
                        let max = u64::MAX >> (64 - size);
                        for value in [0, 1, max / 3, max] {
                            let mut reg = Register::builder()
                                .width(width)
                                .value(0x9669_9669_9669_9669)
                                .build()
                                .unwrap();
                            let mask = max << start;
                            let outside = reg.read() & !mask;

                            reg.write_range(start, size, value).unwrap();
                            assert_eq!(reg.read_range(start..start + size), Ok(value));
                            assert_eq!(reg.read() & !mask, outside);
                        }
                    }
                }
            }
        }

        #[test]
        fn top_bit_range_is_legal() {
            for width in 1..=MAX_WIDTH {
                let mut reg = Register::builder().width(width).build().unwrap();
                reg.write_range(width - 1, 1, 1).unwrap();
                assert_eq!(reg.read(), 1u64 << (width - 1));
                reg.write_range(0, width, 0).unwrap();
                assert_eq!(reg.read(), 0);
            }
        }

        #[test]
        fn start_at_width_fails() {
            for width in 1..=MAX_WIDTH {
                let mut reg = Register::builder().width(width).value(1).build().unwrap();
                assert!(matches!(
                    reg.write_range(width, 1, 0),
                    Err(Error::OutOfRange { .. })
                ));
                assert!(matches!(
                    reg.read_range(width..),
                    Err(Error::OutOfRange { .. })
                ));
                assert!(matches!(
                    reg.read_range(width..width + 1),
                    Err(Error::OutOfRange { .. })
                ));
                assert!(matches!(
                    reg.write_slice(width.., 0),
                    Err(Error::OutOfRange { .. })
                ));
                assert_eq!(reg.read(), 1);
            }
        }

        #[test]
        fn value_too_large_leaves_value() {
            let mut reg = Register::builder().width(32).value(0x1234).build().unwrap();
            assert_eq!(
                reg.write_range(4, 4, 0x10),
                Err(Error::ValueTooLarge {
                    value: 0x10,
                    size: 4
                })
            );
            assert_eq!(reg.read(), 0x1234);
        }

        #[test]
        fn zero_is_sized_by_range() {
            let mut reg = Register::builder()
                .width(32)
                .value(0xFFFF_FFFF)
                .build()
                .unwrap();
            reg.write_range(8, 8, 0).unwrap();
            assert_eq!(reg.read(), 0xFFFF_00FF);
        }

        #[test]
        fn invalid_ranges() {
            let mut reg = Register::builder().width(16).value(0xBEEF).build().unwrap();

            assert!(reg.write_range(0, 0, 0).is_err());
            assert!(reg.write_range(10, 7, 0).is_err());
            assert!(reg.write_range(u32::MAX, 2, 0).is_err());
            assert!(reg.read_range(4..4).is_err());
            #[allow(clippy::reversed_empty_ranges)]
            let reversed = reg.read_range(8..4);
            assert!(reversed.is_err());
            assert!(reg.read_range(0..17).is_err());
            assert!(reg.read_range(0..=u32::MAX).is_err());
            assert_eq!(reg.read(), 0xBEEF);
        }

        #[test]
        fn unbounded_ends() {
            let mut reg = Register::builder().width(16).value(0xBEEF).build().unwrap();
            assert_eq!(reg.read_range(..), Ok(0xBEEF));
            assert_eq!(reg.read_range(8..), Ok(0xBE));
            assert_eq!(reg.read_range(..8), Ok(0xEF));
            assert_eq!(reg.read_range(4..=7), Ok(0xE));

            reg.write_slice(12.., 0x1).unwrap();
            assert_eq!(reg.read(), 0x1EEF);
            reg.write_slice(..4, 0x0).unwrap();
            assert_eq!(reg.read(), 0x1EE0);
            assert!(reg.write_slice(12.., 0x10).is_err());
        }

        #[test]
        fn full_width_64() {
            let mut reg = Register::builder().width(64).build().unwrap();
            reg.write_range(0, 64, u64::MAX).unwrap();
            assert_eq!(reg.read(), u64::MAX);
            assert_eq!(reg.read_range(..), Ok(u64::MAX));
            reg.write_slice(32.., 0).unwrap();
            assert_eq!(reg.read(), 0xFFFF_FFFF);
        }
    }

    mod formatting {
        use crate::register::Register;

        #[test]
        fn display() {
            let reg = Register::builder()
                .width(32)
                .value(0x3C8)
                .name("EAX")
                .build()
                .unwrap();
            assert_eq!(reg.to_string(), "<EAX:32-bit 0x000003C8>");

            let reg = Register::builder().width(10).value(0x3FF).build().unwrap();
            assert_eq!(reg.to_string(), "<REG:10-bit 0x3FF>");
        }

        #[test]
        fn radix_formats() {
            let reg = Register::builder().width(8).value(0xA5).build().unwrap();
            assert_eq!(format!("{reg:x}"), "a5");
            assert_eq!(format!("{reg:#X}"), "0xA5");
            assert_eq!(format!("{reg:o}"), "245");
            assert_eq!(format!("{reg:010b}"), "0010100101");
        }

        #[test]
        fn read_transformed() {
            let reg = Register::builder().width(8).value(5).build().unwrap();
            assert_eq!(reg.read_transformed(|v| format!("{v:b}")), "101");
            assert_eq!(reg.read_transformed(|v| v * 2), 10);
        }
    }
}
