//! Environment propagation: a depth-first walk from `Object` that seeds each class's
//! attribute/method tables as a shallow clone of its parent's top scope, then extends them with
//! the class's own features. Duplicate-feature diagnostics distinguish "already declared by an
//! ancestor" from "already declared earlier in this same class" by comparing against the
//! parent's *already-completed* environment, which the walk never revisits once built.

use crate::ast::{Attr, Method};
use crate::semant::class_table::ClassTable;
use crate::session::CompileSession;
use indexmap::IndexMap;
use oolc_core::{Symbol, SymbolTable};
use std::collections::HashSet;
use std::rc::Rc;

/// A method's stored signature: `[formal₁_type, …, formalₙ_type, return_type]`.
pub type MethodSig = Rc<Vec<Symbol>>;

/// One class's object-identifier table (attributes plus `self`) and method-signature table,
/// both inherited by clone-and-extend from the parent.
#[derive(Debug, Clone)]
pub struct Environment {
    pub objects: SymbolTable<Symbol, Symbol>,
    pub methods: SymbolTable<Symbol, MethodSig>,
}

/// Per-class environments, keyed by class name. Built once by [`propagate`] and read-only
/// thereafter — the type checker clones a class's table to seed its local scoping, but never
/// mutates the table stored here (one owner, many
/// readers).
pub type Environments = IndexMap<Symbol, Environment>;

/// Runs environment propagation over every class in `class_table`, starting at `Object`.
pub fn propagate(class_table: &ClassTable, session: &mut CompileSession) -> Environments {
    let mut envs = Environments::new();
    let root = session.well_known.object;
    walk(root, class_table, &mut envs, session);
    envs
}

fn walk(name: Symbol, class_table: &ClassTable, envs: &mut Environments, session: &mut CompileSession) {
    let node = class_table.lookup(name).expect("class table contains every tree node reachable from Object");
    let class = Rc::clone(&node.class);
    let parent = node.parent;

    let mut env = match parent {
        Some(parent_name) => {
            let parent_env = envs.get(&parent_name).expect("parent is visited before its children (DFS preorder)");
            Environment { objects: parent_env.objects.clone_top_scope(), methods: parent_env.methods.clone_top_scope() }
        }
        None => {
            let mut objects = SymbolTable::new();
            objects.add(session.well_known.self_, session.well_known.self_type);
            Environment { objects, methods: SymbolTable::new() }
        }
    };

    for feature in &class.features {
        match feature {
            crate::ast::Feature::Attr(attr) => process_attr(&class.filename, attr, &mut env, parent, envs, session),
            crate::ast::Feature::Method(method) => process_method(&class.filename, method, &mut env, parent, envs, session),
        }
    }

    envs.insert(name, env);

    let children = node.children.clone();
    for child in children {
        walk(child, class_table, envs, session);
    }
}

fn process_attr(
    filename: &Symbol,
    attr: &Attr,
    env: &mut Environment,
    parent: Option<Symbol>,
    envs: &Environments,
    session: &mut CompileSession,
) {
    let filename_str = session.resolve(*filename).to_string();
    if attr.name == session.well_known.self_ {
        session.diagnostics.error(filename_str, attr.line, "'self' cannot be the name of an attribute.");
        return;
    }

    if env.objects.lookup(&attr.name).is_some() {
        let inherited = parent.and_then(|p| envs.get(&p)).is_some_and(|p| p.objects.lookup(&attr.name).is_some());
        let attr_name = session.resolve(attr.name).to_string();
        if inherited {
            session.diagnostics.error(filename_str, attr.line, format!("Attribute {attr_name} is an attribute of an inherited class."));
        } else {
            session.diagnostics.error(filename_str, attr.line, format!("Attribute {attr_name} is multiply defined in class."));
        }
    }

    env.objects.add(attr.name, attr.declared_type);
}

fn process_method(
    filename: &Symbol,
    method: &Method,
    env: &mut Environment,
    parent: Option<Symbol>,
    envs: &Environments,
    session: &mut CompileSession,
) {
    let filename_str = session.resolve(*filename).to_string();
    let sig = Rc::new(method_signature(filename, method, session));

    if env.methods.lookup(&method.name).is_some() {
        let parent_sig = parent.and_then(|p| envs.get(&p)).and_then(|p| p.methods.lookup(&method.name).cloned());
        match parent_sig {
            None => {
                let method_name = session.resolve(method.name).to_string();
                session.diagnostics.error(filename_str, method.line, format!("Method {method_name} is multiply defined."));
            }
            Some(parent_sig) => check_overridden_method(filename, method, &sig, &parent_sig, session),
        }
    }

    env.methods.add(method.name, sig);
}

/// Builds `[formal types…, return type]`, reporting duplicate/illegal formal names and
/// `SELF_TYPE`-typed formals as it goes.
fn method_signature(filename: &Symbol, method: &Method, session: &mut CompileSession) -> Vec<Symbol> {
    let filename_str = session.resolve(*filename).to_string();
    let wk = session.well_known;
    let mut seen = HashSet::new();
    let mut types = Vec::with_capacity(method.formals.len() + 1);

    for formal in &method.formals {
        if seen.contains(&formal.name) {
            let name = session.resolve(formal.name).to_string();
            session.diagnostics.error(filename_str.clone(), method.line, format!("Formal parameter {name} is multiply defined."));
        }
        if formal.name == wk.self_ {
            session.diagnostics.error(filename_str.clone(), method.line, "'self' cannot be the name of a formal parameter.");
        }
        if formal.declared_type == wk.self_type {
            let name = session.resolve(formal.name).to_string();
            session.diagnostics.error(filename_str.clone(), method.line, format!("Formal parameter {name} cannot have type SELF_TYPE."));
        }
        seen.insert(formal.name);
        types.push(formal.declared_type);
    }

    types.push(method.return_type);
    types
}

fn check_overridden_method(filename: &Symbol, method: &Method, sig: &[Symbol], parent_sig: &[Symbol], session: &mut CompileSession) {
    let filename_str = session.resolve(*filename).to_string();
    let method_name = session.resolve(method.name).to_string();

    let ret = sig[sig.len() - 1];
    let parent_ret = parent_sig[parent_sig.len() - 1];

    if ret != parent_ret {
        let (ret, parent_ret) = (session.resolve(ret).to_string(), session.resolve(parent_ret).to_string());
        session.diagnostics.error(
            filename_str,
            method.line,
            format!("In redefined method {method_name}, return type {ret} is different from original return type {parent_ret}."),
        );
    } else if sig.len() != parent_sig.len() {
        session.diagnostics.error(filename_str, method.line, format!("Incompatible number of formal parameters in redefined method {method_name}."));
    } else {
        for i in 0..sig.len() - 1 {
            if sig[i] != parent_sig[i] {
                let (t_m, t_p) = (session.resolve(sig[i]).to_string(), session.resolve(parent_sig[i]).to_string());
                session.diagnostics.error(
                    filename_str.clone(),
                    method.line,
                    format!("In redefined method {method_name}, parameter type {t_m} is different from original type {t_p}"),
                );
            }
        }
    }
}

#[cfg(test)]
mod environment_tests {
    use super::*;
    use crate::ast::Program;
    use crate::parser::{grammar::parse_classes, lexer::lex};

    fn build(src: &str) -> (Environments, CompileSession) {
        let mut session = CompileSession::default();
        let tokens = lex(src, "a.cl", &mut session);
        let classes = parse_classes(&tokens, "a.cl", &mut session);
        let program = Program { classes };
        let table = ClassTable::build(&program, &mut session).expect("well-formed fixture");
        let envs = propagate(&table, &mut session);
        (envs, session)
    }

    #[test]
    fn child_inherits_parent_attributes() {
        let (envs, mut session) = build("class A { x : Int; }; class Main inherits A { main():Object { 0 }; };");
        let main_sym = session.intern("Main");
        let x_sym = session.intern("x");
        assert!(envs[&main_sym].objects.lookup(&x_sym).is_some());
    }

    #[test]
    fn redeclaring_inherited_attribute_is_an_error() {
        let (_envs, session) = build("class A { x : Int; }; class Main inherits A { x : Int; main():Object { 0 }; };");
        assert!(session.diagnostics.iter().any(|d| d.message == "Attribute x is an attribute of an inherited class."));
    }

    #[test]
    fn duplicate_attribute_in_same_class_is_an_error() {
        let (_envs, session) = build("class Main { x : Int; x : Bool; main():Object { 0 }; };");
        assert!(session.diagnostics.iter().any(|d| d.message == "Attribute x is multiply defined in class."));
    }

    #[test]
    fn self_cannot_be_an_attribute_name() {
        let (_envs, session) = build("class Main { self : Int; main():Object { 0 }; };");
        assert!(session.diagnostics.iter().any(|d| d.message == "'self' cannot be the name of an attribute."));
    }

    #[test]
    fn incompatible_override_reports_parameter_mismatch() {
        let (_envs, session) = build(
            "class A { f(x:Int):Int { x }; }; class B inherits A { f(x:Bool):Int { 0 }; }; class Main { main():Object { 0 }; };",
        );
        assert!(session
            .diagnostics
            .iter()
            .any(|d| d.message == "In redefined method f, parameter type Bool is different from original type Int"));
    }

    #[test]
    fn method_multiply_defined_in_same_class() {
        let (_envs, session) = build("class Main { f():Int { 1 }; f():Int { 2 }; main():Object { 0 }; };");
        assert!(session.diagnostics.iter().any(|d| d.message == "Method f is multiply defined."));
    }

    #[test]
    fn method_signature_is_formals_then_return_type() {
        let (envs, mut session) = build("class Main { f(x:Int, y:Bool):String { \"s\" }; main():Object { 0 }; };");
        let main_sym = session.intern("Main");
        let f_sym = session.intern("f");
        let sig = envs[&main_sym].methods.lookup(&f_sym).unwrap();
        assert_eq!(sig.len(), 3);
        assert_eq!(session.resolve(sig[2]), "String");
    }
}
