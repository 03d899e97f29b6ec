//! Class registry and inheritance graph: built-in class installation, user-class
//! installation, parent resolution, cycle detection, and the `Main.main` well-formedness check.

use crate::ast::{Attr, Class, Expr, ExprKind, Feature, Formal, Method, Program};
use crate::session::CompileSession;
use indexmap::IndexMap;
use oolc_core::Symbol;
use std::rc::Rc;

/// One node of the inheritance tree: the class declaration, its resolved parent (unset until
/// [`ClassTable::build_inheritance`] runs), and its children in the order they were linked.
#[derive(Debug)]
pub struct InheritanceNode {
    pub class: Rc<Class>,
    pub parent: Option<Symbol>,
    pub children: Vec<Symbol>,
}

/// The class registry plus the tree it forms, rooted at `Object`. `SELF_TYPE`, `_no_class`, and
/// `_prim_slot` are never installed here — they are symbols the type system recognizes but that
/// never participate in the inheritance tree.
pub struct ClassTable {
    nodes: IndexMap<Symbol, InheritanceNode>,
}

impl ClassTable {
    pub fn lookup(&self, name: Symbol) -> Option<&InheritanceNode> {
        self.nodes.get(&name)
    }

    pub fn contains(&self, name: Symbol) -> bool {
        self.nodes.contains_key(&name)
    }

    /// Classes in registration order (built-ins first, then user classes in parse order), as
    /// installed — the order later stages traverse when order-dependence matters only for
    /// determinism, not semantics.
    pub fn classes_in_registration_order(&self) -> impl Iterator<Item = (&Symbol, &InheritanceNode)> {
        self.nodes.iter()
    }

    /// True iff `ancestor`'s subtree (including itself) contains `descendant`, walking down from
    /// the candidate ancestor rather than up from the descendant.
    pub fn is_ancestor(&self, ancestor: Symbol, descendant: Symbol) -> bool {
        if ancestor == descendant {
            return true;
        }
        match self.nodes.get(&ancestor) {
            Some(node) => node.children.iter().any(|&child| self.is_ancestor(child, descendant)),
            None => false,
        }
    }

    /// Builds the class table: installs built-ins, installs user classes, resolves parents, and
    /// checks for inheritance cycles, halting at the fatal barriers described below. Returns
    /// `None` if either barrier fires; the caller (see [`crate::compile`]) must not proceed to
    /// environment propagation or type checking in that case.
    pub fn build(program: &Program, session: &mut CompileSession) -> Option<ClassTable> {
        let mut table = ClassTable { nodes: IndexMap::new() };

        table.install_basic_classes(session);
        table.install_classes(&program.classes, session);

        table.build_inheritance(session);
        if session.diagnostics.has_errors() {
            return None;
        }

        table.cycle_check(session);
        if session.diagnostics.has_errors() {
            return None;
        }

        table.main_req_check(session);

        Some(table)
    }

    fn install_basic_classes(&mut self, session: &mut CompileSession) {
        let wk = session.well_known;
        let filename = wk.basic_class_filename;
        let no_expr = |session: &mut CompileSession| Expr::new(session.node_ids.next(), 0, ExprKind::NoExpr);

        let object_class = Class {
            name: wk.object,
            parent: wk.no_class,
            filename,
            line: 0,
            features: vec![
                Feature::Method(Method { name: wk.abort, formals: vec![], return_type: wk.object, body: no_expr(session), line: 0 }),
                Feature::Method(Method { name: wk.type_name, formals: vec![], return_type: wk.string, body: no_expr(session), line: 0 }),
                Feature::Method(Method { name: wk.copy, formals: vec![], return_type: wk.self_type, body: no_expr(session), line: 0 }),
            ],
        };

        let io_class = Class {
            name: wk.io,
            parent: wk.object,
            filename,
            line: 0,
            features: vec![
                Feature::Method(Method {
                    name: wk.out_string,
                    formals: vec![Formal { name: wk.arg, declared_type: wk.string, line: 0 }],
                    return_type: wk.self_type,
                    body: no_expr(session),
                    line: 0,
                }),
                Feature::Method(Method {
                    name: wk.out_int,
                    formals: vec![Formal { name: wk.arg, declared_type: wk.int, line: 0 }],
                    return_type: wk.self_type,
                    body: no_expr(session),
                    line: 0,
                }),
                Feature::Method(Method { name: wk.in_string, formals: vec![], return_type: wk.string, body: no_expr(session), line: 0 }),
                Feature::Method(Method { name: wk.in_int, formals: vec![], return_type: wk.int, body: no_expr(session), line: 0 }),
            ],
        };

        let int_class = Class {
            name: wk.int,
            parent: wk.object,
            filename,
            line: 0,
            features: vec![Feature::Attr(Attr { name: wk.val, declared_type: wk.prim_slot, init: no_expr(session), line: 0 })],
        };

        let bool_class = Class {
            name: wk.bool_,
            parent: wk.object,
            filename,
            line: 0,
            features: vec![Feature::Attr(Attr { name: wk.val, declared_type: wk.prim_slot, init: no_expr(session), line: 0 })],
        };

        let string_class = Class {
            name: wk.string,
            parent: wk.object,
            filename,
            line: 0,
            features: vec![
                Feature::Attr(Attr { name: wk.val, declared_type: wk.int, init: no_expr(session), line: 0 }),
                Feature::Attr(Attr { name: wk.str_field, declared_type: wk.prim_slot, init: no_expr(session), line: 0 }),
                Feature::Method(Method { name: wk.length, formals: vec![], return_type: wk.int, body: no_expr(session), line: 0 }),
                Feature::Method(Method {
                    name: wk.concat,
                    formals: vec![Formal { name: wk.arg, declared_type: wk.string, line: 0 }],
                    return_type: wk.string,
                    body: no_expr(session),
                    line: 0,
                }),
                Feature::Method(Method {
                    name: wk.substr,
                    formals: vec![
                        Formal { name: wk.arg, declared_type: wk.int, line: 0 },
                        Formal { name: wk.arg2, declared_type: wk.int, line: 0 },
                    ],
                    return_type: wk.string,
                    body: no_expr(session),
                    line: 0,
                }),
            ],
        };

        for class in [object_class, io_class, int_class, bool_class, string_class] {
            let name = class.name;
            self.nodes.insert(name, InheritanceNode { class: Rc::new(class), parent: None, children: vec![] });
        }
    }

    fn is_basic(&self, session: &CompileSession, name: Symbol) -> bool {
        let wk = &session.well_known;
        name == wk.object || name == wk.io || name == wk.int || name == wk.bool_ || name == wk.string
    }

    fn install_classes(&mut self, classes: &[Rc<Class>], session: &mut CompileSession) {
        for class in classes {
            let name = class.name;
            let filename_str = session.resolve(class.filename).to_string();

            if self.nodes.contains_key(&name) || name == session.well_known.self_type {
                if self.is_basic(session, name) {
                    session.diagnostics.error(filename_str, class.line, format!("Redefinition of basic class {}.", session.resolve(name)));
                } else {
                    session.diagnostics.error(filename_str, class.line, format!("Class {} was previously defined.", session.resolve(name)));
                }
                continue;
            }

            self.nodes.insert(name, InheritanceNode { class: Rc::clone(class), parent: None, children: vec![] });
        }
    }

    fn build_inheritance(&mut self, session: &mut CompileSession) {
        let wk = session.well_known;
        let uninheritable = [wk.int, wk.bool_, wk.string, wk.self_type];

        let names: Vec<Symbol> = self.nodes.keys().copied().collect();
        for name in names {
            let (parent, filename_str, line) = {
                let node = &self.nodes[&name];
                (node.class.parent, session.resolve(node.class.filename).to_string(), node.class.line)
            };

            if name == wk.object {
                // The root of the tree; its `parent` field is `_no_class` and carries no edge.
                continue;
            }

            if uninheritable.contains(&parent) {
                session.diagnostics.error(
                    filename_str,
                    line,
                    format!("Class {} cannot inherit class {}.", session.resolve(name), session.resolve(parent)),
                );
            } else if self.nodes.contains_key(&parent) {
                self.nodes.get_mut(&name).unwrap().parent = Some(parent);
                self.nodes.get_mut(&parent).unwrap().children.push(name);
            } else {
                session.diagnostics.error(
                    filename_str,
                    line,
                    format!("Class {} inherits from an undefined class {}.", session.resolve(name), session.resolve(parent)),
                );
            }
        }
    }

    fn cycle_check(&self, session: &mut CompileSession) {
        for (name, node) in &self.nodes {
            for &child in &node.children {
                if self.is_ancestor(child, *name) {
                    let filename_str = session.resolve(node.class.filename).to_string();
                    session.diagnostics.error(
                        filename_str,
                        node.class.line,
                        format!("Class {}, or an ancestor of {}, is involved in an inheritance cycle.", session.resolve(*name), session.resolve(*name)),
                    );
                }
            }
        }
    }

    fn main_req_check(&self, session: &mut CompileSession) {
        let wk = session.well_known;
        let Some(main_node) = self.nodes.get(&wk.main) else {
            session.diagnostics.error(session.resolve(wk.basic_class_filename).to_string(), 0, "Class Main is not defined.");
            return;
        };

        let filename_str = session.resolve(main_node.class.filename).to_string();
        for feature in &main_node.class.features {
            if let Feature::Method(m) = feature {
                if m.name == wk.main_meth {
                    if !m.formals.is_empty() {
                        session.diagnostics.error(filename_str, main_node.class.line, "'main' method in class Main should have no arguments.");
                    }
                    return;
                }
            }
        }

        session.diagnostics.error(filename_str, main_node.class.line, "No 'main' method in class Main.");
    }
}

#[cfg(test)]
mod class_table_tests {
    use super::*;
    use crate::parser::{grammar::parse_classes, lexer::lex};

    fn build(src: &str) -> (Option<ClassTable>, CompileSession) {
        let mut session = CompileSession::default();
        let tokens = lex(src, "a.cl", &mut session);
        let classes = parse_classes(&tokens, "a.cl", &mut session);
        let program = Program { classes };
        let table = ClassTable::build(&program, &mut session);
        (table, session)
    }

    #[test]
    fn installs_five_basic_classes() {
        let (table, _session) = build("class Main { main():Object { 0 }; };");
        let table = table.unwrap();
        assert_eq!(table.classes_in_registration_order().count(), 6); // 5 basics + Main
    }

    #[test]
    fn inheriting_int_is_an_error() {
        let (table, session) = build("class A inherits Int {}; class Main { main():Object { 0 }; };");
        assert!(table.is_none());
        assert!(session.diagnostics.iter().any(|d| d.message == "Class A cannot inherit class Int."));
    }

    #[test]
    fn inheriting_from_unknown_class_is_an_error() {
        let (table, session) = build("class A inherits Ghost {}; class Main { main():Object { 0 }; };");
        assert!(table.is_none());
        assert!(session.diagnostics.iter().any(|d| d.message == "Class A inherits from an undefined class Ghost."));
    }

    #[test]
    fn mutual_inheritance_is_a_cycle() {
        let (table, session) = build("class A inherits B {}; class B inherits A {}; class Main { main():Object { 0 }; };");
        assert!(table.is_none());
        assert!(session
            .diagnostics
            .iter()
            .any(|d| d.message.contains("is involved in an inheritance cycle.")));
    }

    #[test]
    fn redefining_a_basic_class_is_an_error() {
        let (table, session) = build("class Int {}; class Main { main():Object { 0 }; };");
        assert!(table.is_none());
        assert!(session.diagnostics.iter().any(|d| d.message == "Redefinition of basic class Int."));
    }

    #[test]
    fn redefining_a_user_class_is_an_error() {
        let (table, session) = build("class A {}; class A {}; class Main { main():Object { 0 }; };");
        assert!(table.is_none());
        assert!(session.diagnostics.iter().any(|d| d.message == "Class A was previously defined."));
    }

    #[test]
    fn missing_main_is_an_error() {
        let (table, session) = build("class A {};");
        assert!(table.is_some());
        assert!(session.diagnostics.iter().any(|d| d.message == "Class Main is not defined."));
    }

    #[test]
    fn main_with_arguments_is_an_error() {
        let (table, session) = build("class Main { main(x:Int):Object { 0 }; };");
        assert!(table.is_some());
        assert!(session
            .diagnostics
            .iter()
            .any(|d| d.message == "'main' method in class Main should have no arguments."));
    }

    #[test]
    fn well_formed_program_has_no_errors() {
        let (table, session) = build("class Main { main():Object { 0 }; };");
        assert!(table.is_some());
        assert!(!session.diagnostics.has_errors());
    }
}
