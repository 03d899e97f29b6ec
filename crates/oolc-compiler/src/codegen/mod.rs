//! Code generation: class-tag allocation and object layout, prototype/dispatch/init
//! emission, and the per-expression lowering with its stack-frame discipline.
//!
//! Entered only once the type checker has recorded zero errors — every
//! lookup here (class existence, method signatures) is assumed to succeed.

mod asm;
pub mod emit;
pub mod expr_codegen;
pub mod layout;
