//! Per-expression lowering: every `ExprKind` emits assembly that leaves its result in
//! `ACC` and restores `frame_height` to what it was on entry. Local variables (formals,
//! let-bindings, case-branch identifiers) live at `offset(FP)`; attributes live at
//! `offset(SELF)`. Both share one scoped lookup so `Assign`/`ObjectRef` don't need to know which
//! kind of slot they're touching until the lookup resolves it.

use crate::ast::TypeMap;
use crate::ast::{Case, Expr, ExprKind};
use crate::codegen::asm::{mem, Writer};
use crate::codegen::layout::Layout;
use crate::semant::class_table::ClassTable;
use crate::session::{CompileSession, GcMode};
use oolc_core::{Symbol, SymbolTable};

pub const ACC: &str = "$a0";
pub const SELF: &str = "$s0";
pub const SP: &str = "$sp";
pub const FP: &str = "$fp";
pub const T1: &str = "$t1";
pub const T2: &str = "$t2";
pub const A1: &str = "$a1";

/// Words from the start of an object to its dispatch-table pointer (tag, size, then disp).
pub const DISPTABLE_OFFSET: i32 = 2;
/// Words from the start of an `Int`/`Bool` box to its unboxed value.
pub const VAL_OFFSET: i32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct VarLoc {
    pub offset: i32,
    pub on_self: bool,
}

/// Mutable lowering context for one method body: everything `emit_expr` needs that isn't the
/// expression itself. `locals` is seeded by the caller with formals bound to their incoming
/// stack slots before the first call into `emit_expr`.
pub struct ExprCtx<'a> {
    pub session: &'a mut CompileSession,
    pub class_table: &'a ClassTable,
    pub layout: &'a Layout,
    pub types: &'a TypeMap,
    pub current_class: Symbol,
    pub locals: SymbolTable<Symbol, VarLoc>,
    pub frame_height: i32,
}

impl<'a> ExprCtx<'a> {
    fn resolve(&self, name: Symbol) -> VarLoc {
        if let Some(loc) = self.locals.lookup(&name) {
            return *loc;
        }
        let slot = self
            .layout
            .attrs(self.current_class)
            .iter()
            .find(|a| a.name == name)
            .unwrap_or_else(|| panic!("attribute {} not found on a well-typed program", self.session.resolve(name)));
        VarLoc { offset: slot.offset as i32, on_self: true }
    }

    fn label(&mut self) -> u32 {
        self.session.labels.next()
    }

    fn push(&mut self, w: &mut Writer) {
        w.instr(&format!("sw {ACC} {}", mem(0, SP)));
        w.instr(&format!("addiu {SP} {SP} -4"));
        self.frame_height += 1;
    }

    fn pop(&mut self, w: &mut Writer, n: i32) {
        w.instr(&format!("addiu {SP} {SP} {}", 4 * n));
        self.frame_height -= n;
    }
}

pub fn emit_expr(w: &mut Writer, expr: &Expr, ctx: &mut ExprCtx) {
    match &expr.kind {
        ExprKind::Assign { name, expr: rhs } => {
            emit_expr(w, rhs, ctx);
            let loc = ctx.resolve(*name);
            if loc.on_self {
                w.instr(&format!("sw {ACC} {}", mem(4 * loc.offset, SELF)));
                maybe_gc_barrier(w, ctx, loc.offset);
            } else {
                w.instr(&format!("sw {ACC} {}", mem(loc.offset, FP)));
            }
        }

        ExprKind::ObjectRef(name) => {
            if *name == ctx.session.well_known.self_ {
                w.instr(&format!("move {ACC} {SELF}"));
            } else {
                let loc = ctx.resolve(*name);
                if loc.on_self {
                    w.instr(&format!("lw {ACC} {}", mem(4 * loc.offset, SELF)));
                } else {
                    w.instr(&format!("lw {ACC} {}", mem(loc.offset, FP)));
                }
            }
        }

        ExprKind::IntConst(sym) => load_literal(w, "int_const", *sym),
        ExprKind::StringConst(sym) => load_literal(w, "str_const", *sym),
        ExprKind::BoolConst(b) => {
            w.instr(&format!("la {ACC} {}", if *b { "bool_const1" } else { "bool_const0" }));
        }

        ExprKind::NoExpr => {
            w.instr(&format!("move {ACC} $zero"));
        }

        ExprKind::New(t) => emit_new(w, *t, ctx),

        ExprKind::IsVoid(e) => {
            emit_expr(w, e, ctx);
            let end_label = format!("is_void_end_{}", ctx.label());
            w.instr(&format!("move {T1} {ACC}"));
            w.instr(&format!("la {ACC} bool_const1"));
            w.instr(&format!("beq {T1} $zero {end_label}"));
            w.instr(&format!("la {ACC} bool_const0"));
            w.label(&end_label);
        }

        ExprKind::Neg(e) => {
            emit_expr(w, e, ctx);
            emit_copy(w, ctx);
            w.instr(&format!("lw {T1} {}", mem(4 * VAL_OFFSET, ACC)));
            w.instr(&format!("neg {T1} {T1}"));
            w.instr(&format!("sw {T1} {}", mem(4 * VAL_OFFSET, ACC)));
        }

        ExprKind::Comp(e) => {
            emit_expr(w, e, ctx);
            let true_label = format!("not_true_{}", ctx.label());
            let end_label = format!("not_end_{}", ctx.label());
            w.instr(&format!("lw {T1} {}", mem(4 * VAL_OFFSET, ACC)));
            w.instr(&format!("beq {T1} $zero {true_label}"));
            w.instr(&format!("la {ACC} bool_const0"));
            w.instr(&format!("b {end_label}"));
            w.label(&true_label);
            w.instr(&format!("la {ACC} bool_const1"));
            w.label(&end_label);
        }

        ExprKind::Plus(e1, e2) => emit_arith(w, ctx, e1, e2, "add"),
        ExprKind::Sub(e1, e2) => emit_arith(w, ctx, e1, e2, "sub"),
        ExprKind::Mul(e1, e2) => emit_arith(w, ctx, e1, e2, "mul"),
        ExprKind::Divide(e1, e2) => emit_arith(w, ctx, e1, e2, "div"),

        ExprKind::Lt(e1, e2) => emit_compare(w, ctx, e1, e2, "blt"),
        ExprKind::Leq(e1, e2) => emit_compare(w, ctx, e1, e2, "ble"),

        ExprKind::Eq(e1, e2) => {
            emit_expr(w, e1, ctx);
            ctx.push(w);
            emit_expr(w, e2, ctx);
            w.instr(&format!("lw {T1} {}", mem(4, SP)));
            ctx.pop(w, 1);
            let end_label = format!("eq_end_{}", ctx.label());
            w.instr(&format!("move {T2} {ACC}"));
            w.instr(&format!("la {ACC} bool_const1"));
            w.instr(&format!("beq {T1} {T2} {end_label}"));
            w.instr(&format!("la {A1} bool_const0"));
            w.instr("jal equality_test");
            w.label(&end_label);
        }

        ExprKind::Block { exprs } => {
            for e in exprs {
                emit_expr(w, e, ctx);
            }
        }

        ExprKind::Let { name, init, body, .. } => {
            if matches!(init.kind, ExprKind::NoExpr) {
                w.instr(&format!("move {ACC} $zero"));
            } else {
                emit_expr(w, init, ctx);
            }
            ctx.push(w);
            let offset = -4 * ctx.frame_height;
            ctx.locals.enter_scope();
            ctx.locals.add(*name, VarLoc { offset, on_self: false });
            emit_expr(w, body, ctx);
            ctx.locals.exit_scope();
            ctx.pop(w, 1);
        }

        ExprKind::Cond { predicate, then_branch, else_branch } => {
            emit_expr(w, predicate, ctx);
            let else_label = format!("else_{}", ctx.label());
            let end_label = format!("fi_end_{}", ctx.label());
            w.instr(&format!("lw {T1} {}", mem(4 * VAL_OFFSET, ACC)));
            w.instr(&format!("beq {T1} $zero {else_label}"));
            emit_expr(w, then_branch, ctx);
            w.instr(&format!("b {end_label}"));
            w.label(&else_label);
            emit_expr(w, else_branch, ctx);
            w.label(&end_label);
        }

        ExprKind::Loop { predicate, body } => {
            let top_label = format!("loop_top_{}", ctx.label());
            let end_label = format!("loop_end_{}", ctx.label());
            w.label(&top_label);
            emit_expr(w, predicate, ctx);
            w.instr(&format!("lw {T1} {}", mem(4 * VAL_OFFSET, ACC)));
            w.instr(&format!("beq {T1} $zero {end_label}"));
            emit_expr(w, body, ctx);
            w.instr(&format!("b {top_label}"));
            w.label(&end_label);
            w.instr(&format!("move {ACC} $zero"));
        }

        ExprKind::TypeCase { scrutinee, branches } => emit_typecase(w, ctx, scrutinee, branches),

        ExprKind::Dispatch { receiver, method, args } => {
            emit_args(w, ctx, args);
            emit_expr(w, receiver, ctx);
            let not_void = format!("dispatch_ok_{}", ctx.label());
            w.instr(&format!("bne {ACC} $zero {not_void}"));
            emit_abort_site(w, "_dispatch_abort");
            w.label(&not_void);

            let static_type = ctx.types.get(receiver.id).unwrap_or(ctx.current_class);
            let lookup_class = if static_type == ctx.session.well_known.self_type { ctx.current_class } else { static_type };
            let offset = ctx
                .layout
                .methods(lookup_class)
                .iter()
                .find(|m| m.name == *method)
                .unwrap_or_else(|| panic!("method {} missing on a well-typed program", ctx.session.resolve(*method)))
                .offset;

            w.instr(&format!("lw {T1} {}", mem(4 * DISPTABLE_OFFSET, ACC)));
            w.instr(&format!("lw {T1} {}", mem(4 * offset as i32, T1)));
            w.instr(&format!("jalr {T1}"));
        }

        ExprKind::StaticDispatch { receiver, target_class, method, args } => {
            emit_args(w, ctx, args);
            emit_expr(w, receiver, ctx);
            let not_void = format!("static_dispatch_ok_{}", ctx.label());
            w.instr(&format!("bne {ACC} $zero {not_void}"));
            emit_abort_site(w, "_dispatch_abort");
            w.label(&not_void);

            let offset = ctx
                .layout
                .methods(*target_class)
                .iter()
                .find(|m| m.name == *method)
                .unwrap_or_else(|| panic!("method {} missing on a well-typed program", ctx.session.resolve(*method)))
                .offset;
            let disp_tab = format!("{}_dispTab", ctx.session.resolve(*target_class));
            w.instr(&format!("la {T1} {disp_tab}"));
            w.instr(&format!("lw {T1} {}", mem(4 * offset as i32, T1)));
            w.instr(&format!("jalr {T1}"));
        }
    }
}

fn emit_args(w: &mut Writer, ctx: &mut ExprCtx, args: &[Expr]) {
    for arg in args {
        emit_expr(w, arg, ctx);
        ctx.push(w);
    }
}

/// Loads the enclosing source filename and line, then jumps to a runtime abort entry point that
/// never returns (`_dispatch_abort`, `_case_abort`, `_case_abort2`).
fn emit_abort_site(w: &mut Writer, label: &str) {
    w.instr("la $a0 filename_str");
    w.instr("li $t1 0");
    w.instr(&format!("jal {label}"));
}

fn load_literal(w: &mut Writer, prefix: &str, sym: Symbol) {
    w.instr(&format!("la {ACC} {prefix}_{}", sym.as_u32()));
}

fn emit_copy(w: &mut Writer, ctx: &mut ExprCtx) {
    ctx.push(w);
    w.instr("jal Object.copy");
    ctx.pop(w, 1);
}

fn emit_arith(w: &mut Writer, ctx: &mut ExprCtx, e1: &Expr, e2: &Expr, op: &str) {
    emit_expr(w, e1, ctx);
    ctx.push(w);
    emit_expr(w, e2, ctx);
    w.instr(&format!("move {T2} {ACC}"));
    w.instr(&format!("lw {T1} {}", mem(4, SP)));
    ctx.pop(w, 1);
    w.instr(&format!("move {ACC} {T1}"));
    emit_copy(w, ctx);
    w.instr(&format!("lw {T1} {}", mem(4 * VAL_OFFSET, T1)));
    w.instr(&format!("lw {T2} {}", mem(4 * VAL_OFFSET, T2)));
    w.instr(&format!("{op} {T1} {T1} {T2}"));
    w.instr(&format!("sw {T1} {}", mem(4 * VAL_OFFSET, ACC)));
}

fn emit_compare(w: &mut Writer, ctx: &mut ExprCtx, e1: &Expr, e2: &Expr, branch_op: &str) {
    emit_expr(w, e1, ctx);
    ctx.push(w);
    emit_expr(w, e2, ctx);
    w.instr(&format!("lw {T1} {}", mem(4, SP)));
    ctx.pop(w, 1);
    w.instr(&format!("lw {T1} {}", mem(4 * VAL_OFFSET, T1)));
    w.instr(&format!("lw {T2} {}", mem(4 * VAL_OFFSET, ACC)));
    let true_label = format!("cmp_true_{}", ctx.label());
    let end_label = format!("cmp_end_{}", ctx.label());
    w.instr(&format!("{branch_op} {T1} {T2} {true_label}"));
    w.instr(&format!("la {ACC} bool_const0"));
    w.instr(&format!("b {end_label}"));
    w.label(&true_label);
    w.instr(&format!("la {ACC} bool_const1"));
    w.label(&end_label);
}

fn emit_new(w: &mut Writer, t: Symbol, ctx: &mut ExprCtx) {
    let wk = ctx.session.well_known;
    if t == wk.self_type {
        w.instr(&format!("lw {T1} {}", mem(0, SELF)));
        w.instr(&format!("sll {T1} {T1} 2"));
        w.instr(&format!("la {T2} class_objTab"));
        w.instr(&format!("add {T1} {T1} {T2}"));
        w.instr(&format!("lw {ACC} {}", mem(0, T1)));
        w.instr(&format!("sw {T1} {}", mem(0, SP)));
        w.instr(&format!("addiu {SP} {SP} -4"));
        ctx.frame_height += 1;
        w.instr("jal Object.copy");
        w.instr(&format!("lw {T1} {}", mem(4, SP)));
        w.instr(&format!("addiu {SP} {SP} 4"));
        ctx.frame_height -= 1;
        w.instr(&format!("lw {T1} {}", mem(4, T1)));
        w.instr(&format!("jalr {T1}"));
    } else {
        let name = ctx.session.resolve(t).to_string();
        w.instr(&format!("la {ACC} {name}_protObj"));
        ctx.push(w);
        w.instr("jal Object.copy");
        ctx.pop(w, 1);
        w.instr(&format!("jal {name}_init"));
    }
}

fn maybe_gc_barrier(w: &mut Writer, ctx: &ExprCtx, offset: i32) {
    if ctx.session.gc_mode == GcMode::Generational {
        w.instr(&format!("move {T1} {SELF}"));
        w.instr(&format!("addiu {T1} {T1} {}", 4 * offset));
        w.instr("jal _GenGC_Assign");
    }
}

/// Lowers `case e of n1:T1 => b1; … esac`: branches are tried in descending tag order so
/// the first matching range is also the most specific one, per the contiguous-subtree-tag
/// invariant. A branch whose declared type never resolved in the class table is dropped
/// here rather than in `type_check` — see the Open Question note on `infer_typecase`.
fn emit_typecase(w: &mut Writer, ctx: &mut ExprCtx, scrutinee: &Expr, branches: &[Case]) {
    emit_expr(w, scrutinee, ctx);
    ctx.push(w);

    let not_void = format!("case_ok_{}", ctx.label());
    w.instr(&format!("bne {ACC} $zero {not_void}"));
    emit_abort_site(w, "_case_abort2");
    w.label(&not_void);

    let mut sorted: Vec<&Case> = branches.iter().filter(|c| ctx.class_table.contains(c.declared_type)).collect();
    sorted.sort_by_key(|c| std::cmp::Reverse(ctx.layout.tag(c.declared_type)));

    let end_label = format!("case_end_{}", ctx.label());
    w.instr(&format!("lw {T1} {}", mem(4, SP)));
    w.instr(&format!("lw {T1} {}", mem(0, T1)));

    let mut next_labels = Vec::with_capacity(sorted.len() + 1);
    for _ in &sorted {
        next_labels.push(format!("case_branch_{}", ctx.label()));
    }
    next_labels.push(format!("case_miss_{}", ctx.label()));

    for (i, branch) in sorted.iter().enumerate() {
        let lo = ctx.layout.tag(branch.declared_type);
        let hi = ctx.layout.max_descendant_tag(branch.declared_type);
        let next = &next_labels[i + 1];
        w.instr(&format!("blt {T1} {lo} {next}"));
        w.instr(&format!("bgt {T1} {hi} {next}"));

        ctx.locals.enter_scope();
        let offset = -4 * (ctx.frame_height + 1);
        ctx.locals.add(branch.name, VarLoc { offset, on_self: false });
        w.instr(&format!("lw {ACC} {}", mem(4, SP)));
        emit_expr(w, &branch.body, ctx);
        ctx.locals.exit_scope();
        w.instr(&format!("b {end_label}"));

        w.label(&next_labels[i + 1]);
    }

    emit_abort_site(w, "_case_abort");
    w.label(&end_label);
    ctx.pop(w, 1);
}

#[cfg(test)]
mod expr_codegen_tests {
    use super::*;
    use crate::ast::Program;
    use crate::codegen::layout::Layout;
    use crate::parser::{grammar::parse_classes, lexer::lex};
    use crate::semant::{class_table::ClassTable, environment::propagate, type_check::check_program};

    fn build(src: &str) -> (String, CompileSession) {
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

        let main = session.well_known.main;
        let main_method = program
            .classes
            .iter()
            .find(|c| c.name == main)
            .unwrap()
            .features
            .iter()
            .find_map(|f| match f {
                crate::ast::Feature::Method(m) if m.name == session.well_known.main_meth => Some(m.clone()),
                _ => None,
            })
            .unwrap();

        let mut w = Writer::new();
        let mut ctx = ExprCtx {
            session: &mut session,
            class_table: &table,
            layout: &layout,
            types: &types,
            current_class: main,
            locals: SymbolTable::new(),
            frame_height: 0,
        };
        emit_expr(&mut w, &main_method.body, &mut ctx);
        (w.finish(), session)
    }

    #[test]
    fn integer_literal_loads_a_constant() {
        let (asm, _session) = build("class Main { main():Int { 42 }; };");
        assert!(asm.contains("la") && asm.contains("int_const"));
    }

    #[test]
    fn arithmetic_boxes_a_fresh_integer() {
        let (asm, _session) = build("class Main { main():Int { 1 + 2 }; };");
        assert!(asm.contains("Object.copy"));
    }

    #[test]
    fn dispatch_emits_a_void_check() {
        let (asm, _session) = build("class Main { main():Object { (new IO).out_string(\"hi\") }; };");
        assert!(asm.contains("_dispatch_abort"));
    }

    #[test]
    fn self_type_new_reads_the_class_object_table() {
        let (asm, _session) = build("class Main { main():SELF_TYPE { new SELF_TYPE }; };");
        assert!(asm.contains("class_objTab"));
    }
}
