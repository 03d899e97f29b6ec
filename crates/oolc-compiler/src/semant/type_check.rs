//! Type inference: `leq`/`lub` over the type lattice and the per-expression-kind
//! contracts that populate the out-of-band [`crate::ast::TypeMap`].
//!
//! Errors accumulate; nothing here is fatal. An ill-typed expression is assigned `_bottom_` (or,
//! for narrower cases, `Object`) so enclosing nodes can still be checked without cascading — the
//! process only halts at the fatal barrier the driver applies after this pass finishes.

use crate::ast::{Case, Class, Expr, ExprKind, Feature, Method, Program, TypeMap};
use crate::semant::class_table::ClassTable;
use crate::semant::environment::Environments;
use crate::session::CompileSession;
use oolc_core::{Symbol, SymbolTable};

/// Runs the checker over every user class in `program` (built-in classes have no bodies to
/// check — `program` never contains a built-in in the first place).
pub fn check_program(program: &Program, class_table: &ClassTable, envs: &Environments, session: &mut CompileSession, types: &mut TypeMap) {
    for class in &program.classes {
        let env = envs.get(&class.name).expect("environment propagation covers every class").clone();
        let filename = session.resolve(class.filename).to_string();
        let mut checker = Checker { class_table, envs, session, types, current_class: class.name, filename, locals: env.objects };
        checker.check_class(class);
    }
}

struct Checker<'a> {
    class_table: &'a ClassTable,
    envs: &'a Environments,
    session: &'a mut CompileSession,
    types: &'a mut TypeMap,
    current_class: Symbol,
    filename: String,
    locals: SymbolTable<Symbol, Symbol>,
}

impl<'a> Checker<'a> {
    fn name(&self, s: Symbol) -> String {
        self.session.resolve(s).to_string()
    }

    fn error(&mut self, line: u32, msg: impl Into<String>) {
        let filename = self.filename.clone();
        self.session.diagnostics.error(filename, line, msg);
    }

    fn type_exists(&self, t: Symbol) -> bool {
        self.class_table.contains(t) || t == self.session.well_known.self_type
    }

    /// `leq(ancestor, child, C)`: is `child` a subtype of `ancestor` in the class
    /// enclosing this check? `SELF_TYPE` as `child` is resolved to `C` first; as `ancestor`
    /// it's only `leq` to itself (it can't be named from outside the class declaring it).
    fn leq(&self, ancestor: Symbol, child: Symbol) -> bool {
        let wk = self.session.well_known;
        if child == wk.bottom || child == wk.no_type {
            return true;
        }
        if ancestor == wk.self_type && child == wk.self_type {
            return true;
        }
        if ancestor == wk.self_type {
            return false;
        }
        let child = if child == wk.self_type { self.current_class } else { child };
        if self.class_table.contains(ancestor) && self.class_table.contains(child) {
            self.class_table.is_ancestor(ancestor, child)
        } else {
            true
        }
    }

    /// `lub(t1, t2, C)`: walks both types toward `Object` one generation at a time,
    /// stopping the instant either side is an ancestor of the other. Mirrors the reference
    /// implementation's simultaneous-ascent walk exactly (not a from-scratch LCA).
    fn lub(&self, a: Symbol, b: Symbol) -> Symbol {
        let wk = self.session.well_known;
        if a == wk.no_type || a == wk.bottom {
            return b;
        }
        if b == wk.no_type || b == wk.bottom {
            return a;
        }
        if a == wk.self_type && b == wk.self_type {
            return wk.self_type;
        }
        let mut a = if a == wk.self_type { self.current_class } else { a };
        let mut b = if b == wk.self_type { self.current_class } else { b };

        if self.class_table.contains(a) && self.class_table.contains(b) {
            while a != wk.object && b != wk.object {
                if self.class_table.is_ancestor(a, b) {
                    return a;
                }
                if self.class_table.is_ancestor(b, a) {
                    return b;
                }
                a = self.class_table.lookup(a).and_then(|n| n.parent).unwrap_or(wk.object);
                b = self.class_table.lookup(b).and_then(|n| n.parent).unwrap_or(wk.object);
            }
        }
        wk.object
    }

    fn check_class(&mut self, class: &Class) {
        for feature in &class.features {
            match feature {
                Feature::Attr(attr) => self.check_attr(attr),
                Feature::Method(method) => self.check_method(method),
            }
        }
    }

    fn check_attr(&mut self, attr: &crate::ast::Attr) {
        let type_exists = self.type_exists(attr.declared_type);
        if !type_exists {
            let (t, name) = (self.name(attr.declared_type), self.name(attr.name));
            self.error(attr.line, format!("Class {t} of attribute {name} is undefined."));
        }

        if !matches!(attr.init.kind, ExprKind::NoExpr) {
            let wk = self.session.well_known;
            self.locals.enter_scope();
            self.locals.add(wk.self_, wk.self_type);
            let t1 = self.infer(&attr.init);
            self.locals.exit_scope();

            if type_exists && !self.leq(attr.declared_type, t1) {
                let (t1, declared, name) = (self.name(t1), self.name(attr.declared_type), self.name(attr.name));
                self.error(attr.line, format!("Inferred type {t1} of initialization of attribute {name} does not conform to declared type {declared}."));
            }
        }
    }

    fn check_method(&mut self, method: &Method) {
        let wk = self.session.well_known;
        self.locals.enter_scope();
        for formal in &method.formals {
            if formal.declared_type != wk.self_type && !self.class_table.contains(formal.declared_type) {
                let (t, name) = (self.name(formal.declared_type), self.name(formal.name));
                self.error(method.line, format!("Class {t} of formal parameter {name} is undefined."));
            }
            self.locals.add(formal.name, formal.declared_type);
        }
        self.locals.add(wk.self_, wk.self_type);

        let t0_prime = self.infer(&method.body);
        let t0 = method.return_type;
        if t0 != wk.self_type && !self.class_table.contains(t0) {
            let (t0, name) = (self.name(t0), self.name(method.name));
            self.error(method.line, format!("Undefined return type {t0} in method {name}."));
        } else if !self.leq(t0, t0_prime) {
            let (t0_prime, t0, name) = (self.name(t0_prime), self.name(t0), self.name(method.name));
            self.error(method.line, format!("Inferred return type {t0_prime} of method {name} does not conform to declared return type {t0}."));
        }
        self.locals.exit_scope();
    }

    fn infer(&mut self, expr: &Expr) -> Symbol {
        let ty = self.infer_kind(expr);
        self.types.set(expr.id, ty);
        ty
    }

    fn infer_kind(&mut self, expr: &Expr) -> Symbol {
        let wk = self.session.well_known;
        match &expr.kind {
            ExprKind::Assign { name, expr: rhs } => {
                let t_prime = self.infer(rhs);
                if *name == wk.self_ {
                    self.error(expr.line, "Cannot assign to 'self'.");
                }
                match self.locals.lookup(name).copied() {
                    Some(declared) => {
                        if !self.leq(declared, t_prime) {
                            let (t_prime_s, declared_s, name_s) = (self.name(t_prime), self.name(declared), self.name(*name));
                            self.error(
                                expr.line,
                                format!("Type {t_prime_s} of assigned expression does not conform to declared type {declared_s} of identifier {name_s}."),
                            );
                        }
                    }
                    None => {
                        let name_s = self.name(*name);
                        self.error(expr.line, format!("Assignment to undeclared variable {name_s}."));
                    }
                }
                t_prime
            }

            ExprKind::StaticDispatch { receiver, target_class, method, args } => {
                let t0 = self.infer(receiver);
                let actual_types: Vec<Symbol> = args.iter().map(|a| self.infer(a)).collect();

                if *target_class == wk.self_type {
                    self.error(expr.line, "Static dispatch to SELF_TYPE.");
                    return wk.bottom;
                }
                if !self.class_table.contains(*target_class) {
                    let t = self.name(*target_class);
                    self.error(expr.line, format!("Static dispatch to undefined class {t}."));
                    return wk.bottom;
                }
                if !self.leq(*target_class, t0) {
                    let (t0_s, t_s) = (self.name(t0), self.name(*target_class));
                    self.error(expr.line, format!("Expression type {t0_s} does not conform to declared static dispatch type {t_s}."));
                    return wk.bottom;
                }

                let sig = self.envs.get(target_class).and_then(|e| e.methods.lookup(method).cloned());
                let Some(sig) = sig else {
                    let m = self.name(*method);
                    self.error(expr.line, format!("Static dispatch to undefined method {m}."));
                    return wk.bottom;
                };

                if sig.len() - 1 != actual_types.len() {
                    let m = self.name(*method);
                    self.error(expr.line, format!("Method {m} invoked with wrong number of arguments."));
                } else {
                    for (i, actual) in actual_types.iter().enumerate() {
                        if !self.leq(sig[i], *actual) {
                            let (m, actual_s, formal_s) = (self.name(*method), self.name(*actual), self.name(sig[i]));
                            self.error(expr.line, format!("In call of method {m}, type {actual_s} does not conform to declared type {formal_s}."));
                        }
                    }
                }

                let ret_prime = sig[sig.len() - 1];
                if ret_prime == wk.self_type { t0 } else { ret_prime }
            }

            ExprKind::Dispatch { receiver, method, args } => {
                let t0 = self.infer(receiver);
                let actual_types: Vec<Symbol> = args.iter().map(|a| self.infer(a)).collect();
                let t0_prime = if t0 == wk.self_type { self.current_class } else { t0 };

                if t0_prime == wk.bottom {
                    self.error(expr.line, "Dispatch on type _bottom not allowed.  The type _bottom is the type of throw expressions.");
                    return wk.bottom;
                }
                if !self.class_table.contains(t0_prime) {
                    let t = self.name(t0_prime);
                    self.error(expr.line, format!("Dispatch on undefined class {t}."));
                    return wk.bottom;
                }

                let sig = self.envs.get(&t0_prime).and_then(|e| e.methods.lookup(method).cloned());
                let Some(sig) = sig else {
                    let m = self.name(*method);
                    self.error(expr.line, format!("Dispatch to undefined method {m}."));
                    return wk.bottom;
                };

                if sig.len() - 1 != actual_types.len() {
                    let m = self.name(*method);
                    self.error(expr.line, format!("Method {m} called with wrong number of arguments."));
                } else {
                    for (i, actual) in actual_types.iter().enumerate() {
                        if !self.leq(sig[i], *actual) {
                            let (m, actual_s, formal_s) = (self.name(*method), self.name(*actual), self.name(sig[i]));
                            self.error(expr.line, format!("In call of method {m}, type {actual_s} does not conform to declared type {formal_s}."));
                        }
                    }
                }

                let ret_prime = sig[sig.len() - 1];
                if ret_prime == wk.self_type { t0 } else { ret_prime }
            }

            ExprKind::Cond { predicate, then_branch, else_branch } => {
                let t1 = self.infer(predicate);
                if t1 != wk.bool_ {
                    self.error(expr.line, "Predicate of 'if' does not have type Bool.");
                }
                let t2 = self.infer(then_branch);
                let t3 = self.infer(else_branch);
                self.lub(t2, t3)
            }

            ExprKind::Loop { predicate, body } => {
                let t1 = self.infer(predicate);
                if t1 != wk.bool_ {
                    self.error(expr.line, "Loop condition does not have type Bool.");
                }
                self.infer(body);
                wk.object
            }

            ExprKind::TypeCase { scrutinee, branches } => self.infer_typecase(expr.line, scrutinee, branches),

            ExprKind::Block { exprs } => {
                let mut ty = wk.object;
                for e in exprs {
                    ty = self.infer(e);
                }
                ty
            }

            ExprKind::Let { name, declared_type, init, body } => {
                if *name == wk.self_ {
                    self.error(expr.line, "'self' cannot be bound in a 'let' expression.");
                }
                let type_exists = self.type_exists(*declared_type);
                if !type_exists {
                    let (t, n) = (self.name(*declared_type), self.name(*name));
                    self.error(expr.line, format!("Class {t} of let-bound identifier {n} is undefined."));
                }

                if !matches!(init.kind, ExprKind::NoExpr) {
                    let t1 = self.infer(init);
                    if type_exists && !self.leq(*declared_type, t1) {
                        let (t1_s, n, t0_s) = (self.name(t1), self.name(*name), self.name(*declared_type));
                        self.error(
                            expr.line,
                            format!("Inferred type {t1_s} of initialization of {n} does not conform to identifier's declared type {t0_s}."),
                        );
                    }
                }

                self.locals.enter_scope();
                self.locals.add(*name, *declared_type);
                let t2 = self.infer(body);
                self.locals.exit_scope();
                t2
            }

            ExprKind::Plus(e1, e2) => self.check_arith(e1, e2, "+"),
            ExprKind::Sub(e1, e2) => self.check_arith(e1, e2, "-"),
            ExprKind::Mul(e1, e2) => self.check_arith(e1, e2, "*"),
            ExprKind::Divide(e1, e2) => self.check_arith(e1, e2, "/"),

            ExprKind::Neg(e1) => {
                let t1 = self.infer(e1);
                if t1 != wk.int {
                    let t1_s = self.name(t1);
                    self.error(expr.line, format!("Argument of '~' has type {t1_s} instead of Int."));
                }
                wk.int
            }

            ExprKind::Lt(e1, e2) => {
                let (t1, t2) = (self.infer(e1), self.infer(e2));
                if t1 != wk.int || t2 != wk.int {
                    let (t1_s, t2_s) = (self.name(t1), self.name(t2));
                    self.error(expr.line, format!("non-Int arguments: {t1_s} < {t2_s}"));
                }
                wk.bool_
            }

            ExprKind::Leq(e1, e2) => {
                let (t1, t2) = (self.infer(e1), self.infer(e2));
                if t1 != wk.int || t2 != wk.int {
                    let (t1_s, t2_s) = (self.name(t1), self.name(t2));
                    self.error(expr.line, format!("non-Int arguments: {t1_s} <= {t2_s}"));
                }
                wk.bool_
            }

            ExprKind::Eq(e1, e2) => {
                let (t1, t2) = (self.infer(e1), self.infer(e2));
                let is_basic = |t: Symbol| t == wk.int || t == wk.bool_ || t == wk.string;
                if (is_basic(t1) || is_basic(t2)) && t1 != t2 {
                    self.error(expr.line, "Illegal comparison with a basic type.");
                }
                wk.bool_
            }

            ExprKind::Comp(e1) => {
                let t1 = self.infer(e1);
                if t1 != wk.bool_ {
                    let t1_s = self.name(t1);
                    self.error(expr.line, format!("Argument of 'not' has type {t1_s} instead of Bool."));
                }
                wk.bool_
            }

            ExprKind::IntConst(sym) => {
                self.session.literals.record_int(*sym);
                wk.int
            }
            ExprKind::StringConst(sym) => {
                self.session.literals.record_string(*sym);
                wk.string
            }
            ExprKind::BoolConst(b) => {
                self.session.literals.record_bool(*b);
                wk.bool_
            }

            ExprKind::New(t) => {
                if *t != wk.self_type && !self.class_table.contains(*t) {
                    let t_s = self.name(*t);
                    self.error(expr.line, format!("'new' used with undefined class {t_s}."));
                    wk.bottom
                } else {
                    *t
                }
            }

            ExprKind::IsVoid(e1) => {
                self.infer(e1);
                wk.bool_
            }

            ExprKind::NoExpr => wk.no_type,

            ExprKind::ObjectRef(name) => match self.locals.lookup(name).copied() {
                Some(t) => t,
                None => {
                    let n = self.name(*name);
                    self.error(expr.line, format!("Undeclared identifier {n}."));
                    wk.bottom
                }
            },
        }
    }

    fn check_arith(&mut self, e1: &Expr, e2: &Expr, op: &str) -> Symbol {
        let wk = self.session.well_known;
        let (t1, t2) = (self.infer(e1), self.infer(e2));
        if t1 != wk.int || t2 != wk.int {
            let (t1_s, t2_s) = (self.name(t1), self.name(t2));
            self.error(e1.line, format!("non-Int arguments: {t1_s} {op} {t2_s}"));
        }
        wk.int
    }

    /// A branch whose declared type fails to resolve is still reported here
    /// (matching the reference checker) but is excluded from codegen's tag-range search, since
    /// codegen never runs once this pass has recorded an error. See
    /// `codegen::expr_codegen::lower_typecase`.
    fn infer_typecase(&mut self, line: u32, scrutinee: &Expr, branches: &[Case]) -> Symbol {
        let wk = self.session.well_known;
        self.infer(scrutinee);

        let mut seen = std::collections::HashSet::new();
        let mut branch_types = Vec::with_capacity(branches.len());

        for branch in branches {
            if branch.name == wk.self_ {
                self.error(line, "'self' bound in 'case'.");
            }
            if branch.declared_type == wk.self_type {
                let n = self.name(branch.name);
                self.error(line, format!("Identifier {n} declared with type SELF_TYPE in case branch."));
            }
            if seen.contains(&branch.declared_type) {
                let t = self.name(branch.declared_type);
                self.error(line, format!("Duplicate branch {t} in case statement."));
            }
            if branch.declared_type != wk.self_type && !self.class_table.contains(branch.declared_type) {
                let t = self.name(branch.declared_type);
                self.error(line, format!("Class {t} of case branch is undefined."));
            }
            seen.insert(branch.declared_type);

            self.locals.enter_scope();
            self.locals.add(branch.name, branch.declared_type);
            let t = self.infer(&branch.body);
            self.locals.exit_scope();
            branch_types.push(t);
        }

        branch_types.into_iter().reduce(|a, b| self.lub(a, b)).unwrap_or(wk.object)
    }
}

#[cfg(test)]
mod type_check_tests {
    use super::*;
    use crate::parser::{grammar::parse_classes, lexer::lex};
    use crate::semant::environment::propagate;

    fn check(src: &str) -> CompileSession {
        let mut session = CompileSession::default();
        let tokens = lex(src, "a.cl", &mut session);
        let classes = parse_classes(&tokens, "a.cl", &mut session);
        let program = Program { classes };
        let table = ClassTable::build(&program, &mut session).expect("well-formed fixture");
        let envs = propagate(&table, &mut session);
        let mut types = TypeMap::new();
        check_program(&program, &table, &envs, &mut session, &mut types);
        session
    }

    #[test]
    fn well_typed_program_has_no_errors() {
        let session = check("class Main { main():Int { 42 }; };");
        assert!(!session.diagnostics.has_errors(), "{:?}", session.diagnostics.iter().collect::<Vec<_>>());
    }

    #[test]
    fn attribute_init_type_mismatch_is_reported() {
        let session = check("class Main { x : Int <- \"hi\"; main() : Object { 0 }; };");
        assert!(session
            .diagnostics
            .iter()
            .any(|d| d.message == "Inferred type String of initialization of attribute x does not conform to declared type Int."));
    }

    #[test]
    fn duplicate_case_branch_is_reported() {
        let session = check(
            "class Main { main() : Object { case new Object of a : A => 1; a : A => 2; esac }; }; class A {};",
        );
        assert!(session.diagnostics.iter().any(|d| d.message == "Duplicate branch A in case statement."));
    }

    #[test]
    fn dispatch_arity_mismatch_is_reported() {
        let session = check("class Main { f(x:Int):Int { x }; main():Object { f() }; };");
        assert!(session.diagnostics.iter().any(|d| d.message == "Method f called with wrong number of arguments."));
    }

    #[test]
    fn illegal_basic_type_comparison_is_reported() {
        let session = check("class Main { main():Object { if 1 = true then 1 else 2 fi }; };");
        assert!(session.diagnostics.iter().any(|d| d.message == "Illegal comparison with a basic type."));
    }

    #[test]
    fn undeclared_identifier_is_bottom_and_reported() {
        let session = check("class Main { main():Object { x }; };");
        assert!(session.diagnostics.iter().any(|d| d.message == "Undeclared identifier x."));
    }

    #[test]
    fn self_type_dispatch_return_preserves_self_type_at_call_site() {
        // `copy` returns SELF_TYPE; dispatching on a String receiver should yield String, not
        // SELF_TYPE (verifies t0, not t0', is substituted back in on SELF_TYPE return).
        let session = check("class Main { main():String { \"a\".copy() }; };");
        assert!(!session.diagnostics.has_errors(), "{:?}", session.diagnostics.iter().collect::<Vec<_>>());
    }

    #[test]
    fn new_self_type_is_well_typed() {
        let session = check("class Main { main():SELF_TYPE { new SELF_TYPE }; };");
        assert!(!session.diagnostics.has_errors(), "{:?}", session.diagnostics.iter().collect::<Vec<_>>());
    }
}
