use std::{
    fmt::{self, Display, Formatter},
    ops::Bound,
};

use winnow::{
    Parser,
    error::{ContextError, ParseError},
};

use crate::{
    catalog::{Catalog, Error},
    register::Register,
};

mod parser;

/// A single read or write on a register, as written on the command line.
#[derive(Debug, PartialEq, Clone)]
pub enum Op<'input> {
    /// `bit=N:V`
    WriteBit { bit: u32, value: u8 },
    /// `range=START:SIZE:V`
    WriteRange { start: u32, size: u32, value: u64 },
    /// `slice=START..STOP:V`, either end may be omitted
    WriteSlice(Slice, u64),
    /// `FIELD=V`
    SetField(&'input str, u64),
    /// `?FIELD`
    GetField(&'input str),
    /// `?START..STOP`
    ReadSlice(Slice),
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Slice {
    pub start: Option<u32>,
    pub stop: Option<u32>,
}

impl Slice {
    fn bounds(self) -> (Bound<u32>, Bound<u32>) {
        (
            self.start.map_or(Bound::Unbounded, Bound::Included),
            self.stop.map_or(Bound::Unbounded, Bound::Excluded),
        )
    }
}

impl<'input> Op<'input> {
    pub fn parse(input: &'input str) -> Result<Self, ParseError<&'input str, ContextError>> {
        parser::op.parse(input)
    }

    /// Applies the operation, returning the value read by queries.
    pub fn apply(&self, catalog: &Catalog, register: &mut Register) -> Result<Option<u64>, Error> {
        match *self {
            Op::WriteBit { bit, value } => register.write_bit(bit, value)?,
            Op::WriteRange { start, size, value } => register.write_range(start, size, value)?,
            Op::WriteSlice(slice, value) => register.write_slice(slice.bounds(), value)?,
            Op::SetField(field, value) => catalog.set_field(register, field, value)?,
            Op::GetField(field) => return catalog.get_field(register, field).map(Some),
            Op::ReadSlice(slice) => return Ok(Some(register.read_range(slice.bounds())?)),
        }
        Ok(None)
    }
}

impl Display for Op<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Op::WriteBit { bit, value } => write!(f, "bit={bit}:{value}"),
            Op::WriteRange { start, size, value } => {
                write!(f, "range={start}:{size}:{value:#x}")
            }
            Op::WriteSlice(slice, value) => write!(f, "slice={slice}:{value:#x}"),
            Op::SetField(field, value) => write!(f, "{field}={value:#x}"),
            Op::GetField(field) => write!(f, "?{field}"),
            Op::ReadSlice(slice) => write!(f, "?{slice}"),
        }
    }
}

impl Display for Slice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{start}")?;
        }
        write!(f, "..")?;
        if let Some(stop) = self.stop {
            write!(f, "{stop}")?;
        }
        Ok(())
    }
}

/// Parses an integer literal with an optional `0b`, `0o` or `0x` prefix.
pub fn parse_int(input: &str) -> Result<u64, String> {
    parser::int.parse(input).map_err(|err| err.to_string())
}
