//! Driver dispatch interface: per-driver entry point tables, the export contract a driver
//! implements, and version negotiation when a table is built.

#![forbid(unsafe_code)]

mod exports;
mod table;

pub use exports::{
    build_ddi_table, DdiError, DdiTableCache, DriverEntryFn, DriverExports, DriverTag,
    LegacyGlobalTable, DRIVER_ENTRY_SYMBOL, HANDLE_PAYLOAD_MASK, HANDLE_TAG_SHIFT,
};
pub use table::{typed_entry, DdiFn, DdiTable, DdiTableBuilder};
