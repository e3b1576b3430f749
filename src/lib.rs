pub mod catalog;
pub mod cli;
pub mod op;
pub mod register;

pub use catalog::{Catalog, Gpr, RegisterDef};
pub use register::{BitField, NameSet, Register};
