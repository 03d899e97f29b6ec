//! Core data structures shared across the `oolc` compiler.
//!
//! - `interner` — global symbol interning with identity-equality `Symbol` handles.
//! - `symbol_table` — a scoped stack-of-maps used for both environments and codegen frames.

pub mod interner;
pub mod symbol_table;

pub use interner::{Interner, Symbol};
pub use symbol_table::SymbolTable;
