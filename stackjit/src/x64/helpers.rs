//! Runtime helper routines called from compiled code.
//!
//! Compiled functions reach the runtime only through these helpers. The
//! codegen loads each helper's address from a [`HelperTable`] and records
//! the load as a relocation, so code generated against an empty table can
//! be patched by the loader.

use std::collections::HashMap;
use std::fmt;

macro_rules! helpers {
    ($($variant:ident => $name:literal ($($arg:literal),*),)*) => {
        /// A runtime helper and its argument list
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum RuntimeHelper {
            $($variant,)*
        }

        impl RuntimeHelper {
            pub const ALL: &'static [RuntimeHelper] = &[$(RuntimeHelper::$variant,)*];

            /// Symbol name of the helper
            pub fn name(self) -> &'static str {
                match self {
                    $(RuntimeHelper::$variant => $name,)*
                }
            }

            /// Names of the arguments, in register order
            pub fn arguments(self) -> &'static [&'static str] {
                match self {
                    $(RuntimeHelper::$variant => &[$($arg),*],)*
                }
            }
        }
    };
}

helpers! {
    Add => "add"("lhs", "rhs"),
    Equals => "equals"("lhs", "rhs"),
    CallFunction => "call_function"("closure", "argv", "argc"),
    AllocClosure => "alloc_closure"("function", "refv", "refc"),
    ReadGlobal => "read_global"("closure", "name"),
    WriteGlobal => "write_global"("closure", "name", "value"),
    ReadReference => "read_reference"("cell"),
    WriteReference => "write_reference"("cell", "value"),
    ReadFunction => "read_function"("closure", "index"),
    GarbageCollect => "garbage_collect"("frame"),
    AllocRecord => "alloc_record"(),
    FieldLoad => "field_load"("closure", "record", "name"),
    FieldStore => "field_store"("closure", "record", "name", "value"),
    IndexLoad => "index_load"("record", "index"),
    IndexStore => "index_store"("record", "index", "value"),
    AssertInt => "assert_int"("value"),
    AssertNotZero => "assert_not_zero"("value"),
    AssertBool => "assert_bool"("value"),
    ThrowUninitialized => "throw_uninitialized"("closure", "name"),
}

impl fmt::Display for RuntimeHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Addresses of the runtime helpers in the host process
#[derive(Debug, Clone, Default)]
pub struct HelperTable {
    addresses: HashMap<RuntimeHelper, u64>,
}

impl HelperTable {
    /// A table with no addresses; every helper load is left for relocation
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, helper: RuntimeHelper, address: u64) -> Self {
        self.addresses.insert(helper, address);
        self
    }

    pub fn set(&mut self, helper: RuntimeHelper, address: u64) {
        self.addresses.insert(helper, address);
    }

    /// Address of `helper`, zero when unknown
    pub fn address(&self, helper: RuntimeHelper) -> u64 {
        self.addresses.get(&helper).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x64::registers::HELPER_ARG_REGS;

    #[test]
    fn test_every_helper_fits_argument_registers() {
        for &helper in RuntimeHelper::ALL {
            assert!(helper.arguments().len() <= HELPER_ARG_REGS.len(), "{}", helper);
        }
        assert_eq!(RuntimeHelper::ALL.len(), 19);
    }

    #[test]
    fn test_table_defaults_to_zero() {
        let table = HelperTable::new().with(RuntimeHelper::Add, 0x1000);
        assert_eq!(table.address(RuntimeHelper::Add), 0x1000);
        assert_eq!(table.address(RuntimeHelper::Equals), 0);
    }
}
