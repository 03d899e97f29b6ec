//! The typed AST: an immutable tree of program / class / feature / formal / expression / case
//! nodes, plus the out-of-band [`TypeMap`] that the type checker populates instead of mutating
//! the tree in place.

use oolc_core::Symbol;
use serde::Serialize;
use std::rc::Rc;

/// Identifies an `Expr` node for the purposes of the out-of-band type map. Assigned in
/// construction order by the parser; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub classes: Vec<Rc<Class>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Class {
    pub name: Symbol,
    pub parent: Symbol,
    pub features: Vec<Feature>,
    pub filename: Symbol,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub enum Feature {
    Attr(Attr),
    Method(Method),
}

#[derive(Debug, Clone, Serialize)]
pub struct Attr {
    pub name: Symbol,
    pub declared_type: Symbol,
    pub init: Expr,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Method {
    pub name: Symbol,
    pub formals: Vec<Formal>,
    pub return_type: Symbol,
    pub body: Expr,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Formal {
    pub name: Symbol,
    pub declared_type: Symbol,
    pub line: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Case {
    pub name: Symbol,
    pub declared_type: Symbol,
    pub body: Box<Expr>,
    pub line: u32,
}

/// A single expression node. `id` keys the out-of-band type map; `line` is used verbatim in
/// diagnostics (the `<line>` in `"<filename>":<line>: <message>"`).
#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    pub id: NodeId,
    pub line: u32,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, Serialize)]
pub enum ExprKind {
    Assign { name: Symbol, expr: Box<Expr> },
    StaticDispatch { receiver: Box<Expr>, target_class: Symbol, method: Symbol, args: Vec<Expr> },
    Dispatch { receiver: Box<Expr>, method: Symbol, args: Vec<Expr> },
    Cond { predicate: Box<Expr>, then_branch: Box<Expr>, else_branch: Box<Expr> },
    Loop { predicate: Box<Expr>, body: Box<Expr> },
    TypeCase { scrutinee: Box<Expr>, branches: Vec<Case> },
    Block { exprs: Vec<Expr> },
    Let { name: Symbol, declared_type: Symbol, init: Box<Expr>, body: Box<Expr> },
    Plus(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Divide(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Leq(Box<Expr>, Box<Expr>),
    Comp(Box<Expr>),
    IntConst(Symbol),
    StringConst(Symbol),
    BoolConst(bool),
    New(Symbol),
    IsVoid(Box<Expr>),
    NoExpr,
    ObjectRef(Symbol),
}

impl Expr {
    pub fn new(id: NodeId, line: u32, kind: ExprKind) -> Self {
        Expr { id, line, kind }
    }
}

/// Allocates monotonically increasing [`NodeId`]s for the parser.
#[derive(Debug, Default)]
pub struct NodeIdGen(u32);

impl NodeIdGen {
    pub fn next(&mut self) -> NodeId {
        let id = NodeId(self.0);
        self.0 += 1;
        id
    }
}

/// Out-of-band inferred-type slot, keyed by [`NodeId`]. Populated exactly once per node by the
/// type checker; absent for a node the checker never visited.
#[derive(Debug, Default, Clone)]
pub struct TypeMap {
    types: std::collections::HashMap<NodeId, Symbol>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: NodeId, ty: Symbol) {
        self.types.insert(id, ty);
    }

    pub fn get(&self, id: NodeId) -> Option<Symbol> {
        self.types.get(&id).copied()
    }

    /// Entries sorted by node id, for a stable `--emit-types` dump.
    pub fn entries(&self) -> Vec<(NodeId, Symbol)> {
        let mut entries: Vec<_> = self.types.iter().map(|(&id, &ty)| (id, ty)).collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }
}
