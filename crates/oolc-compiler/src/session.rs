//! The mutable context threaded through every pipeline stage: the interner, the well-known
//! symbol table, diagnostics, the label counter, the literal pools, and GC configuration.
//! Exactly one [`CompileSession`] exists per compilation: all global interning and
//! shared mutable state lives here, owned by the session rather than a process-wide static.

use crate::ast::NodeIdGen;
use crate::diagnostics::Diagnostics;
use indexmap::IndexMap;
use oolc_core::{Interner, Symbol};

/// Selects which runtime collector labels codegen references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcMode {
    None,
    #[default]
    Generational,
    Scanning,
}

/// Whether the collector-stress constant is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcTestMode {
    #[default]
    Off,
    On,
}

/// Every well-known symbol the compiler needs to compare against by identity, interned once at
/// session startup so every stage shares the same handles.
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    pub object: Symbol,
    pub io: Symbol,
    pub int: Symbol,
    pub bool_: Symbol,
    pub string: Symbol,
    pub main: Symbol,
    pub main_meth: Symbol,
    pub self_: Symbol,
    pub self_type: Symbol,
    pub no_type: Symbol,
    pub no_class: Symbol,
    pub bottom: Symbol,
    pub prim_slot: Symbol,
    pub val: Symbol,
    pub str_field: Symbol,
    pub arg: Symbol,
    pub arg2: Symbol,
    pub length: Symbol,
    pub concat: Symbol,
    pub substr: Symbol,
    pub abort: Symbol,
    pub type_name: Symbol,
    pub copy: Symbol,
    pub out_string: Symbol,
    pub out_int: Symbol,
    pub in_string: Symbol,
    pub in_int: Symbol,
    pub basic_class_filename: Symbol,
    pub empty_string: Symbol,
}

impl WellKnown {
    fn install(interner: &mut Interner) -> Self {
        WellKnown {
            object: interner.intern("Object"),
            io: interner.intern("IO"),
            int: interner.intern("Int"),
            bool_: interner.intern("Bool"),
            string: interner.intern("String"),
            main: interner.intern("Main"),
            main_meth: interner.intern("main"),
            self_: interner.intern("self"),
            self_type: interner.intern("SELF_TYPE"),
            no_type: interner.intern("_no_type"),
            no_class: interner.intern("_no_class"),
            bottom: interner.intern("_bottom_"),
            prim_slot: interner.intern("_prim_slot"),
            val: interner.intern("val"),
            str_field: interner.intern("str_field"),
            arg: interner.intern("arg"),
            arg2: interner.intern("arg2"),
            length: interner.intern("length"),
            concat: interner.intern("concat"),
            substr: interner.intern("substr"),
            abort: interner.intern("abort"),
            type_name: interner.intern("type_name"),
            copy: interner.intern("copy"),
            out_string: interner.intern("out_string"),
            out_int: interner.intern("out_int"),
            in_string: interner.intern("in_string"),
            in_int: interner.intern("in_int"),
            basic_class_filename: interner.intern("<basic class>"),
            empty_string: interner.intern(""),
        }
    }
}

/// Monotonic label-numbering counter for codegen.
#[derive(Debug, Default)]
pub struct LabelGen(u32);

impl LabelGen {
    pub fn next(&mut self) -> u32 {
        let n = self.0;
        self.0 += 1;
        n
    }
}

/// The three global literal pools, deduplicated by value. `IndexMap` keeps emission order equal
/// to first-use order, so two runs on the same input emit byte-identical constant pools.
#[derive(Debug, Default)]
pub struct LiteralPools {
    pub strings: IndexMap<Symbol, ()>,
    pub ints: IndexMap<Symbol, ()>,
    pub bools_used: (bool, bool),
}

impl LiteralPools {
    pub fn record_string(&mut self, s: Symbol) {
        self.strings.insert(s, ());
    }

    pub fn record_int(&mut self, i: Symbol) {
        self.ints.insert(i, ());
    }

    pub fn record_bool(&mut self, b: bool) {
        if b {
            self.bools_used.0 = true;
        } else {
            self.bools_used.1 = true;
        }
    }
}

pub struct CompileSession {
    pub interner: Interner,
    pub well_known: WellKnown,
    pub diagnostics: Diagnostics,
    pub labels: LabelGen,
    pub literals: LiteralPools,
    pub gc_mode: GcMode,
    pub gc_test_mode: GcTestMode,
    /// Shared across every file of a multi-file compile so node ids stay unique session-wide
    /// (a `TypeMap` keyed by per-file-reset ids would silently alias nodes from different files).
    pub node_ids: NodeIdGen,
}

impl CompileSession {
    pub fn new(gc_mode: GcMode, gc_test_mode: GcTestMode) -> Self {
        let mut interner = Interner::new();
        let well_known = WellKnown::install(&mut interner);
        CompileSession {
            interner,
            well_known,
            diagnostics: Diagnostics::new(),
            labels: LabelGen::default(),
            literals: LiteralPools::default(),
            gc_mode,
            gc_test_mode,
            node_ids: NodeIdGen::default(),
        }
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        self.interner.intern(s)
    }

    pub fn resolve(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }
}

impl Default for CompileSession {
    fn default() -> Self {
        Self::new(GcMode::default(), GcTestMode::default())
    }
}
