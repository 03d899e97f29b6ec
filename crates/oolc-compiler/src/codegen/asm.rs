//! A minimal textual assembly builder for the 32-bit big-endian RISC target: word size 4, registers
//! `ACC`/`SELF`/`SP`/`FP`/`RA`/`T1`/`T2`, a conventional load/store/branch RISC instruction set.
//! This module only formats lines; it has no opinion on what to emit, which is `emit`'s and
//! `expr_codegen`'s job.

use std::fmt::Write as _;

pub const WORD: i32 = 4;

pub struct Writer {
    out: String,
}

impl Writer {
    pub fn new() -> Self {
        Writer { out: String::new() }
    }

    pub fn finish(self) -> String {
        self.out
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn comment(&mut self, text: &str) {
        let _ = writeln!(self.out, "    # {text}");
    }

    pub fn directive(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
    }

    pub fn label(&mut self, name: &str) {
        let _ = writeln!(self.out, "{name}:");
    }

    pub fn word(&mut self, value: i32) {
        let _ = writeln!(self.out, "    .word {value}");
    }

    pub fn word_label(&mut self, label: &str) {
        let _ = writeln!(self.out, "    .word {label}");
    }

    pub fn ascii(&mut self, bytes: &str) {
        let _ = writeln!(self.out, "    .ascii \"{bytes}\"");
    }

    pub fn byte(&mut self, value: u8) {
        let _ = writeln!(self.out, "    .byte {value}");
    }

    pub fn align(&mut self, n: u32) {
        let _ = writeln!(self.out, "    .align {n}");
    }

    pub fn instr(&mut self, text: &str) {
        let _ = writeln!(self.out, "    {text}");
    }

    pub fn instr1(&mut self, op: &str, a: impl std::fmt::Display) {
        let _ = writeln!(self.out, "    {op} {a}");
    }

    pub fn instr2(&mut self, op: &str, a: impl std::fmt::Display, b: impl std::fmt::Display) {
        let _ = writeln!(self.out, "    {op} {a} {b}");
    }

    pub fn instr3(&mut self, op: &str, a: impl std::fmt::Display, b: impl std::fmt::Display, c: impl std::fmt::Display) {
        let _ = writeln!(self.out, "    {op} {a} {b} {c}");
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// `offset(reg)` addressing syntax, e.g. `-4(FP)`.
pub fn mem(offset: i32, reg: &str) -> String {
    format!("{offset}({reg})")
}
