use bytemuck::Contiguous;
use itertools::Itertools;
use tracing::debug;
use unicode_ident::{is_xid_continue, is_xid_start};

use crate::register::{self, BitField, MAX_WIDTH, NameSet, Register};

/// A named bit field of a register variant.
pub type FieldDef = (&'static str, BitField);

/// Shape of a register variant: its name, width and named fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDef {
    pub name: &'static str,
    pub width: u32,
    pub fields: &'static [FieldDef],
}

impl RegisterDef {
    pub fn field(&self, name: &str) -> Option<BitField> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, field)| *field)
    }
}

/// Declares a field in a `const` register definition.
///
/// Panics on an invalid definition, which in a `const` item fails the build.
pub const fn field(name: &'static str, start: u32, size: u32) -> FieldDef {
    match BitField::new(start, size) {
        Ok(field) => (name, field),
        Err(_) => panic!("invalid bit field definition"),
    }
}

pub const EAX: RegisterDef = RegisterDef {
    name: "EAX",
    width: 32,
    fields: &[field("AL", 0, 8), field("AH", 8, 8), field("AX", 0, 16)],
};

pub const ECX: RegisterDef = RegisterDef {
    name: "ECX",
    width: 32,
    fields: &[field("CL", 0, 8), field("CH", 8, 8), field("CX", 0, 16)],
};

pub const EDX: RegisterDef = RegisterDef {
    name: "EDX",
    width: 32,
    fields: &[field("DL", 0, 8), field("DH", 8, 8), field("DX", 0, 16)],
};

pub const EBX: RegisterDef = RegisterDef {
    name: "EBX",
    width: 32,
    fields: &[field("BL", 0, 8), field("BH", 8, 8), field("BX", 0, 16)],
};

pub const ESP: RegisterDef = RegisterDef {
    name: "ESP",
    width: 32,
    fields: &[field("SP", 0, 16)],
};

pub const EBP: RegisterDef = RegisterDef {
    name: "EBP",
    width: 32,
    fields: &[field("BP", 0, 16)],
};

pub const ESI: RegisterDef = RegisterDef {
    name: "ESI",
    width: 32,
    fields: &[field("SI", 0, 16)],
};

pub const EDI: RegisterDef = RegisterDef {
    name: "EDI",
    width: 32,
    fields: &[field("DI", 0, 16)],
};

/// 32-bit general purpose registers, in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Contiguous)]
#[repr(u8)]
pub enum Gpr {
    Eax,
    Ecx,
    Edx,
    Ebx,
    Esp,
    Ebp,
    Esi,
    Edi,
}

impl Gpr {
    pub fn all() -> impl Iterator<Item = Gpr> {
        (Self::MIN_VALUE..=Self::MAX_VALUE).filter_map(Self::from_integer)
    }

    pub fn def(self) -> &'static RegisterDef {
        match self {
            Self::Eax => &EAX,
            Self::Ecx => &ECX,
            Self::Edx => &EDX,
            Self::Ebx => &EBX,
            Self::Esp => &ESP,
            Self::Ebp => &EBP,
            Self::Esi => &ESI,
            Self::Edi => &EDI,
        }
    }

    pub fn name(self) -> &'static str {
        self.def().name
    }
}

impl From<Gpr> for u8 {
    fn from(value: Gpr) -> Self {
        value.into_integer()
    }
}

impl TryFrom<u8> for Gpr {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_integer(value).ok_or(value)
    }
}

/// Register variants a caller can instantiate and address by field name.
#[derive(Debug, Clone)]
pub struct Catalog {
    defs: Vec<RegisterDef>,
    names: NameSet,
}

impl Catalog {
    pub fn new(defs: Vec<RegisterDef>) -> Result<Self, Error> {
        Self::verify(&defs)?;
        Ok(Self::from_defs(defs))
    }

    /// The x86 general purpose registers.
    pub fn x86() -> Self {
        Self::from_defs(Gpr::all().map(|gpr| *gpr.def()).collect())
    }

    fn from_defs(defs: Vec<RegisterDef>) -> Self {
        let names = defs.iter().map(|def| def.name).collect();
        Self { defs, names }
    }

    fn verify(defs: &[RegisterDef]) -> Result<(), Error> {
        if let Some(name) = defs.iter().map(|def| def.name).duplicates().next() {
            return Err(Error::DuplicateRegister {
                name: name.to_owned(),
            });
        }

        for def in defs {
            verify_ident(def.name)?;

            if !(1..=MAX_WIDTH).contains(&def.width) {
                return Err(register::Error::InvalidWidth { width: def.width }.into());
            }

            if let Some(field) = def.fields.iter().map(|(name, _)| *name).duplicates().next() {
                return Err(Error::DuplicateField {
                    register: def.name.to_owned(),
                    field: field.to_owned(),
                });
            }

            for (name, field) in def.fields {
                verify_ident(name)?;
                if field.end() > def.width {
                    return Err(Error::FieldOutOfRange {
                        register: def.name.to_owned(),
                        field: (*name).to_owned(),
                        end: field.end(),
                        width: def.width,
                    });
                }
            }
        }

        Ok(())
    }

    pub fn names(&self) -> &NameSet {
        &self.names
    }

    pub fn defs(&self) -> &[RegisterDef] {
        &self.defs
    }

    pub fn def(&self, name: &str) -> Option<&RegisterDef> {
        self.defs.iter().find(|def| def.name == name)
    }

    pub fn fields(&self, name: &str) -> Result<&'static [FieldDef], Error> {
        self.def(name)
            .map(|def| def.fields)
            .ok_or_else(|| unknown_register(name))
    }

    /// Instantiates the register variant called `name`.
    pub fn register(&self, name: &str, value: u64) -> Result<Register, Error> {
        let def = self.def(name).ok_or_else(|| unknown_register(name))?;
        Ok(Register::named(def.width, value, def.name, &self.names)?)
    }

    pub fn field(&self, register: &str, field: &str) -> Result<BitField, Error> {
        self.def(register)
            .and_then(|def| def.field(field))
            .ok_or_else(|| Error::UnknownField {
                register: register.to_owned(),
                field: field.to_owned(),
            })
    }

    pub fn get_field(&self, register: &Register, field: &str) -> Result<u64, Error> {
        Ok(self.field(register.name(), field)?.get(register)?)
    }

    pub fn set_field(&self, register: &mut Register, field: &str, value: u64) -> Result<(), Error> {
        let bit_field = self.field(register.name(), field)?;
        bit_field.set(register, value).inspect_err(|err| {
            debug!(register = register.name(), field, value, %err, "field write rejected");
        })?;
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::x86()
    }
}

fn unknown_register(name: &str) -> Error {
    register::Error::UnknownRegisterName {
        name: name.to_owned(),
    }
    .into()
}

fn verify_ident(name: &str) -> Result<(), Error> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c == '_' || is_xid_start(c))
        && chars.all(is_xid_continue);

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName {
            name: name.to_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Register(#[from] register::Error),
    #[error("Register {register} has no field named {field}")]
    UnknownField { register: String, field: String },
    #[error("Register {name} is defined more than once")]
    DuplicateRegister { name: String },
    #[error("Field {field} is defined more than once in register {register}")]
    DuplicateField { register: String, field: String },
    #[error("{name:?} is not a valid identifier")]
    InvalidName { name: String },
    #[error("Field {field} ends at bit {end}, past the top of the {width}-bit register {register}")]
    FieldOutOfRange {
        register: String,
        field: String,
        end: u32,
        width: u32,
    },
}
