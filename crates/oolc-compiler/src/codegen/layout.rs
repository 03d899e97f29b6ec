//! Class-tag allocation and object layout: a preorder walk from `Object` gives every
//! class a tag and its subtree a contiguous `[tag, max_descendant_tag]` range (used for O(1)
//! `case` dispatch), and a second clone-and-extend walk builds each class's attribute and
//! method-offset tables, with overriding methods keeping their ancestor's offset.

use crate::semant::class_table::ClassTable;
use crate::session::CompileSession;
use indexmap::IndexMap;
use oolc_core::Symbol;

/// Header words before the first attribute slot: tag, object size, dispatch-table pointer.
pub const HEADER_WORDS: u32 = 3;

#[derive(Debug, Clone, Copy)]
pub struct AttrSlot {
    pub name: Symbol,
    pub declared_type: Symbol,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct MethodSlot {
    pub name: Symbol,
    pub defining_class: Symbol,
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct ClassLayout {
    pub tag: u32,
    pub max_descendant_tag: u32,
    pub attrs: Vec<AttrSlot>,
    pub methods: Vec<MethodSlot>,
}

impl ClassLayout {
    /// Object size in words, header included.
    pub fn object_size(&self) -> u32 {
        HEADER_WORDS + self.attrs.len() as u32
    }
}

/// Layout for every class in the program, keyed by class name, plus the preorder tag sequence
/// (needed to emit the class-name and class-object tables in tag order).
pub struct Layout {
    classes: IndexMap<Symbol, ClassLayout>,
    tag_order: Vec<Symbol>,
}

impl Layout {
    pub fn build(class_table: &ClassTable, session: &mut CompileSession) -> Layout {
        let root = session.well_known.object;
        let mut tags = IndexMap::new();
        let mut tag_order = Vec::new();
        let mut next_tag = 0u32;
        assign_tags(root, class_table, &mut tags, &mut tag_order, &mut next_tag);

        let mut classes = IndexMap::new();
        for &name in &tag_order {
            let tag = tags[&name];
            let max_descendant_tag = compute_max_descendant(name, class_table, &tags);
            classes.insert(name, ClassLayout { tag, max_descendant_tag, attrs: Vec::new(), methods: Vec::new() });
        }

        compute_tables(root, class_table, &mut classes, None, session);

        Layout { classes, tag_order }
    }

    pub fn get(&self, class: Symbol) -> &ClassLayout {
        self.classes.get(&class).expect("layout built for every class in the class table")
    }

    pub fn tag(&self, class: Symbol) -> u32 {
        self.get(class).tag
    }

    pub fn max_descendant_tag(&self, class: Symbol) -> u32 {
        self.get(class).max_descendant_tag
    }

    pub fn attrs(&self, class: Symbol) -> &[AttrSlot] {
        &self.get(class).attrs
    }

    pub fn methods(&self, class: Symbol) -> &[MethodSlot] {
        &self.get(class).methods
    }

    pub fn object_size(&self, class: Symbol) -> u32 {
        self.get(class).object_size()
    }

    /// Classes in the order their tags were assigned (`Object` first), used for the class-name
    /// and class-object tables emitted in `emit::emit_program`.
    pub fn tag_order(&self) -> &[Symbol] {
        &self.tag_order
    }

    /// Finds the class whose tag range contains `tag`, or `None` if it falls outside every
    /// registered class (should not happen for a well-typed program).
    pub fn class_for_tag(&self, tag: u32) -> Option<Symbol> {
        self.classes.iter().find(|(_, layout)| layout.tag <= tag && tag <= layout.max_descendant_tag).map(|(&name, _)| name)
    }
}

fn assign_tags(
    name: Symbol,
    class_table: &ClassTable,
    tags: &mut IndexMap<Symbol, u32>,
    tag_order: &mut Vec<Symbol>,
    next_tag: &mut u32,
) {
    let node = class_table.lookup(name).expect("class table contains every tree node reachable from Object");
    let tag = *next_tag;
    *next_tag += 1;
    tags.insert(name, tag);
    tag_order.push(name);

    for &child in &node.children {
        assign_tags(child, class_table, tags, tag_order, next_tag);
    }
}

fn compute_max_descendant(name: Symbol, class_table: &ClassTable, tags: &IndexMap<Symbol, u32>) -> u32 {
    let node = class_table.lookup(name).expect("class table contains every tree node reachable from Object");
    node.children
        .iter()
        .map(|&child| compute_max_descendant(child, class_table, tags))
        .max()
        .unwrap_or(tags[&name])
}

fn compute_tables(
    name: Symbol,
    class_table: &ClassTable,
    classes: &mut IndexMap<Symbol, ClassLayout>,
    parent: Option<Symbol>,
    session: &mut CompileSession,
) {
    let node = class_table.lookup(name).expect("class table contains every tree node reachable from Object");
    let class = std::rc::Rc::clone(&node.class);

    let (mut attrs, mut methods) = match parent {
        Some(parent_name) => {
            let parent_layout = &classes[&parent_name];
            (parent_layout.attrs.clone(), parent_layout.methods.clone())
        }
        None => (Vec::new(), Vec::new()),
    };

    for feature in &class.features {
        match feature {
            crate::ast::Feature::Attr(attr) => {
                let offset = HEADER_WORDS + attrs.len() as u32;
                attrs.push(AttrSlot { name: attr.name, declared_type: attr.declared_type, offset });
            }
            crate::ast::Feature::Method(method) => {
                if let Some(existing) = methods.iter_mut().find(|m: &&mut MethodSlot| m.name == method.name) {
                    existing.defining_class = name;
                } else {
                    let offset = methods.len() as u32;
                    methods.push(MethodSlot { name: method.name, defining_class: name, offset });
                }
            }
        }
    }

    let entry = classes.get_mut(&name).expect("tags assigned for every class before table computation");
    entry.attrs = attrs;
    entry.methods = methods;

    let children = node.children.clone();
    for child in children {
        compute_tables(child, class_table, classes, Some(name), session);
    }
    let _ = session;
}

#[cfg(test)]
mod layout_tests {
    use super::*;
    use crate::ast::Program;
    use crate::parser::{grammar::parse_classes, lexer::lex};

    fn build(src: &str) -> (Layout, CompileSession) {
        let mut session = CompileSession::default();
        let tokens = lex(src, "a.cl", &mut session);
        let classes = parse_classes(&tokens, "a.cl", &mut session);
        let program = Program { classes };
        let table = ClassTable::build(&program, &mut session).expect("well-formed fixture");
        let layout = Layout::build(&table, &mut session);
        (layout, session)
    }

    #[test]
    fn object_gets_tag_zero() {
        let (layout, mut session) = build("class Main { main():Object { 0 }; };");
        let object = session.intern("Object");
        assert_eq!(layout.tag(object), 0);
    }

    #[test]
    fn subtree_tag_range_covers_descendants() {
        let (layout, mut session) = build(
            "class A { }; class B inherits A { }; class Main { main():Object { 0 }; };",
        );
        let a = session.intern("A");
        let b = session.intern("B");
        assert!(layout.tag(a) <= layout.tag(b));
        assert!(layout.tag(b) <= layout.max_descendant_tag(a));
    }

    #[test]
    fn attribute_offsets_are_contiguous_and_inherited_first() {
        let (layout, mut session) = build(
            "class A { x : Int; }; class Main inherits A { y : Bool; main():Object { 0 }; };",
        );
        let main = session.intern("Main");
        let attrs = layout.attrs(main);
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs[0].offset, HEADER_WORDS);
        assert_eq!(attrs[1].offset, HEADER_WORDS + 1);
    }

    #[test]
    fn overriding_method_keeps_ancestor_offset() {
        let (layout, mut session) = build(
            "class A { f():Int { 1 }; }; class Main inherits A { f():Int { 2 }; main():Object { 0 }; };",
        );
        let main = session.intern("Main");
        let f = session.intern("f");
        let slot = layout.methods(main).iter().find(|m| m.name == f).unwrap();
        assert_eq!(slot.offset, 0);
        assert_eq!(slot.defining_class, main);
    }

    #[test]
    fn object_size_includes_header() {
        let (layout, mut session) = build("class Main { x : Int; main():Object { 0 }; };");
        let main = session.intern("Main");
        assert_eq!(layout.object_size(main), HEADER_WORDS + 1);
    }
}
