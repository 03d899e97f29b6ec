//! Prototype, dispatch-table, init-chain, and top-level program assembly: the driver that
//! ties `layout` (offsets) and `expr_codegen` (method bodies) together into one assembly listing.

use crate::ast::{Feature, Program, TypeMap};
use crate::codegen::asm::{mem, Writer};
use crate::codegen::expr_codegen::{self, ExprCtx, VarLoc, ACC, FP, SELF, SP};
use crate::codegen::layout::{Layout, HEADER_WORDS};
use crate::semant::class_table::ClassTable;
use crate::session::{CompileSession, GcMode, GcTestMode};
use oolc_core::{Symbol, SymbolTable};

pub fn emit_program(program: &Program, class_table: &ClassTable, layout: &Layout, types: &TypeMap, session: &mut CompileSession) -> String {
    let mut w = Writer::new();

    emit_gc_config(&mut w, session);
    emit_class_tables(&mut w, layout, session);
    emit_constants(&mut w, layout, session);
    emit_protobjs(&mut w, layout, session);

    w.directive(".text");
    w.directive(".globl Main_init");
    w.directive(".globl Main.main");
    emit_inits(&mut w, class_table, layout, types, session);
    emit_methods(&mut w, program, class_table, layout, types, session);

    w.finish()
}

fn emit_gc_config(w: &mut Writer, session: &CompileSession) {
    w.directive(".data");
    w.label("_MemMgr_INITIALIZER");
    w.word_label(match session.gc_mode {
        GcMode::None => "_NoGC_Init",
        GcMode::Generational => "_GenGC_Init",
        GcMode::Scanning => "_ScnGC_Init",
    });
    w.label("_MemMgr_COLLECTOR");
    w.word_label(match session.gc_mode {
        GcMode::None => "_NoGC_Collect",
        GcMode::Generational => "_GenGC_Collect",
        GcMode::Scanning => "_ScnGC_Collect",
    });
    w.label("_MemMgr_TEST");
    w.word(if session.gc_test_mode == GcTestMode::On { 1 } else { 0 });
    w.blank();
    w.label("heap_start");
    w.word(0);
    w.blank();
}

fn emit_class_tables(w: &mut Writer, layout: &Layout, session: &CompileSession) {
    w.label("class_nameTab");
    for &name in layout.tag_order() {
        w.word_label(&format!("str_const_classname_{}", name.as_u32()));
    }
    w.blank();

    w.label("class_objTab");
    for &name in layout.tag_order() {
        let n = session.resolve(name);
        w.word_label(&format!("{n}_protObj"));
        w.word_label(&format!("{n}_init"));
    }
    w.blank();
}

fn emit_constants(w: &mut Writer, layout: &Layout, session: &CompileSession) {
    for &name in layout.tag_order() {
        let text = session.resolve(name).to_string();
        w.label(&format!("str_const_classname_{}", name.as_u32()));
        w.word(-1);
        emit_string_body(w, &text);
    }

    for sym in session.literals.ints.keys() {
        w.label(&format!("int_const_{}", sym.as_u32()));
        w.word(-1);
        w.word((HEADER_WORDS + 1) as i32);
        w.word_label("Int_dispTab");
        let text = session.resolve(*sym);
        w.word(text.parse().unwrap_or(0));
    }

    for sym in session.literals.strings.keys() {
        w.label(&format!("str_const_{}", sym.as_u32()));
        w.word(-1);
        emit_string_body(w, session.resolve(*sym));
    }

    if session.literals.bools_used.0 {
        emit_bool_const(w, "bool_const1", true);
    }
    if session.literals.bools_used.1 {
        emit_bool_const(w, "bool_const0", false);
    }
}

fn emit_string_body(w: &mut Writer, text: &str) {
    let len_words = 1 + (text.len() / 4) + 1;
    w.word((HEADER_WORDS + len_words as u32) as i32);
    w.word_label("String_dispTab");
    w.word(text.len() as i32);
    if text.is_empty() {
        w.byte(0);
    } else {
        w.ascii(text);
        w.byte(0);
    }
    w.align(2);
}

fn emit_bool_const(w: &mut Writer, label: &str, value: bool) {
    w.label(label);
    w.word(-1);
    w.word(HEADER_WORDS as i32 + 1);
    w.word_label("Bool_dispTab");
    w.word(if value { 1 } else { 0 });
}

fn emit_protobjs(w: &mut Writer, layout: &Layout, session: &CompileSession) {
    for &name in layout.tag_order() {
        let n = session.resolve(name);
        w.word(-1);
        w.label(&format!("{n}_protObj"));
        w.word(layout.tag(name) as i32);
        w.word(layout.object_size(name) as i32);
        w.word_label(&format!("{n}_dispTab"));
        for attr in layout.attrs(name) {
            w.word(default_value_word(attr.declared_type, session));
        }
        w.blank();

        w.label(&format!("{n}_dispTab"));
        for method in layout.methods(name) {
            let defining = session.resolve(method.defining_class);
            let method_name = session.resolve(method.name);
            w.word_label(&format!("{defining}.{method_name}"));
        }
        w.blank();
    }
}

/// Every attribute slot defaults to a null word; `Int`/`Bool`/`String` attributes are
/// initialized to their zero-value constants by the class's `_init`, not by the prototype
/// (the prototype's own word is never special-cased).
fn default_value_word(_declared_type: Symbol, _session: &CompileSession) -> i32 {
    0
}

fn emit_inits(w: &mut Writer, class_table: &ClassTable, layout: &Layout, types: &TypeMap, session: &mut CompileSession) {
    for &name in layout.tag_order() {
        let node = class_table.lookup(name).expect("layout built from this class table");
        let n = session.resolve(name).to_string();
        w.label(&format!("{n}_init"));
        w.instr(&format!("sw {FP} {}", mem(-4, SP)));
        w.instr(&format!("sw {SELF} {}", mem(-8, SP)));
        w.instr("sw $ra -12($sp)");
        w.instr(&format!("addiu {SP} {SP} -12"));
        w.instr(&format!("addiu {FP} {SP} 4"));
        w.instr(&format!("move {SELF} {ACC}"));

        if let Some(parent) = node.parent {
            let parent_name = session.resolve(parent);
            w.instr(&format!("jal {parent_name}_init"));
        }

        for feature in &node.class.features {
            if let Feature::Attr(attr) = feature {
                if !matches!(attr.init.kind, crate::ast::ExprKind::NoExpr) {
                    let slot = layout.attrs(name).iter().find(|a| a.name == attr.name).expect("own attribute is in its own layout");
                    let offset = slot.offset;
                    let mut ctx = ExprCtx {
                        session,
                        class_table,
                        layout,
                        types,
                        current_class: name,
                        locals: SymbolTable::new(),
                        frame_height: 0,
                    };
                    expr_codegen::emit_expr(w, &attr.init, &mut ctx);
                    w.instr(&format!("sw {ACC} {}", mem(4 * offset as i32, SELF)));
                }
            }
        }

        w.instr(&format!("move {ACC} {SELF}"));
        w.instr("lw $ra -12($fp)");
        w.instr(&format!("lw {SELF} {}", mem(-8, FP)));
        w.instr(&format!("lw {FP} {}", mem(-4, FP)));
        w.instr(&format!("addiu {SP} {SP} 12"));
        w.instr("jr $ra");
        w.blank();
    }
}

/// Built-in classes (`Object`, `IO`, `Int`, `Bool`, `String`) carry only `NoExpr` method bodies
/// — their real implementations live in the runtime, so only user classes reach this
/// function (`program.classes` never contains a built-in, by construction of the parser).
fn emit_methods(w: &mut Writer, program: &Program, class_table: &ClassTable, layout: &Layout, types: &TypeMap, session: &mut CompileSession) {
    for class in &program.classes {
        for feature in &class.features {
            let Feature::Method(method) = feature else { continue };
            let class_name = session.resolve(class.name).to_string();
            let method_name = session.resolve(method.name).to_string();
            w.label(&format!("{class_name}.{method_name}"));

            w.instr(&format!("sw {FP} {}", mem(-4, SP)));
            w.instr(&format!("sw {SELF} {}", mem(-8, SP)));
            w.instr("sw $ra -12($sp)");
            w.instr(&format!("addiu {SP} {SP} -12"));
            w.instr(&format!("addiu {FP} {SP} 4"));
            w.instr(&format!("move {SELF} {ACC}"));

            let mut locals = SymbolTable::new();
            for (i, formal) in method.formals.iter().enumerate() {
                // Arguments are pushed left-to-right by the caller and sit just above the
                // saved-register frame, so the rightmost formal is closest to `FP`.
                let offset = 4 * (method.formals.len() - i) as i32;
                locals.add(formal.name, VarLoc { offset, on_self: false });
            }

            let mut ctx = ExprCtx { session, class_table, layout, types, current_class: class.name, locals, frame_height: 0 };
            expr_codegen::emit_expr(w, &method.body, &mut ctx);

            w.instr(&format!("lw $ra {}", mem(-12, FP)));
            w.instr(&format!("lw {SELF} {}", mem(-8, FP)));
            w.instr(&format!("lw {FP} {}", mem(-4, FP)));
            w.instr(&format!("addiu {SP} {SP} {}", 12 + 4 * method.formals.len()));
            w.instr("jr $ra");
            w.blank();
        }
    }
}

#[cfg(test)]
mod emit_tests {
    use super::*;
    use crate::parser::{grammar::parse_classes, lexer::lex};
    use crate::semant::{environment::propagate, type_check::check_program};

    fn compile(src: &str) -> (String, CompileSession) {
        let mut session = CompileSession::default();
        let tokens = lex(src, "a.cl", &mut session);
        let classes = parse_classes(&tokens, "a.cl", &mut session);
        let program = Program { classes };
        let table = ClassTable::build(&program, &mut session).expect("well-formed fixture");
        let envs = propagate(&table, &mut session);
        let mut types = TypeMap::new();
        check_program(&program, &table, &envs, &mut session, &mut types);
        assert!(!session.diagnostics.has_errors());
        let layout = Layout::build(&table, &mut session);
        let asm = emit_program(&program, &table, &layout, &types, &mut session);
        (asm, session)
    }

    #[test]
    fn emits_every_required_top_level_label() {
        let (asm, _session) = compile("class Main { main():Int { 42 }; };");
        for label in [
            "_MemMgr_INITIALIZER",
            "_MemMgr_COLLECTOR",
            "_MemMgr_TEST",
            "heap_start",
            "class_nameTab",
            "class_objTab",
            "Main_init",
            "Int_init",
            "String_init",
            "Bool_init",
            "Main.main",
        ] {
            assert!(asm.contains(label), "missing label {label}");
        }
    }

    #[test]
    fn every_class_gets_a_prototype_and_dispatch_table() {
        let (asm, _session) = compile("class A {}; class Main { main():Object { 0 }; };");
        for label in ["A_protObj", "A_dispTab", "A_init", "Object_protObj", "Object_dispTab"] {
            assert!(asm.contains(label), "missing label {label}");
        }
    }

    #[test]
    fn generational_gc_is_the_default_initializer() {
        let (asm, _session) = compile("class Main { main():Int { 42 }; };");
        assert!(asm.contains("_GenGC_Init"));
    }

    #[test]
    fn dispatch_inside_an_attribute_initializer_resolves_the_receivers_real_type() {
        let (asm, _session) = compile(
            "class Foo { bar():Int { 5 }; }; \
             class Main { f : Foo <- new Foo; x : Int <- f.bar(); main():Object { 0 }; };",
        );
        assert!(asm.contains("Foo.bar"));
    }

    #[test]
    fn integer_constant_pool_is_emitted_in_first_use_order() {
        let (asm, _session) = compile("class Main { main():Int { if true then 111 else 222 fi }; };");
        let pos_111 = asm.find("111").expect("111 literal should appear in the constant pool");
        let pos_222 = asm.find("222").expect("222 literal should appear in the constant pool");
        assert!(pos_111 < pos_222, "constant pool order should follow first-use order, not hash order");
    }
}
