//! Lexically scoped symbol resolution for the compiler.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::builtins::BUILTINS;
use crate::bytecode::value::Value;

/// Where a resolved name lives at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
}

/// A resolved name: its scope plus the slot (or builtin index) it occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: u16,
}

/// A registered struct type: its global slot plus per-attribute defaults in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct StructSymbol {
    pub name: String,
    pub index: u16,
    pub attributes: IndexMap<String, Value>,
}

/// One lexical scope of names. Tables chain outward through `outer`; a
/// table without an outer is the global scope.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Rc<RefCell<SymbolTable>>>,
    store: IndexMap<String, Symbol>,
    structs: IndexMap<String, StructSymbol>,
    num_definitions: u16,
}

impl SymbolTable {
    pub fn new() -> Rc<RefCell<SymbolTable>> {
        Rc::new(RefCell::new(SymbolTable::default()))
    }

    /// A fresh global table with every builtin pre-registered.
    pub fn new_with_builtins() -> Rc<RefCell<SymbolTable>> {
        let table = SymbolTable::new();
        for (index, builtin) in BUILTINS.iter().enumerate() {
            table.borrow_mut().define_builtin(index as u16, builtin.name);
        }
        table
    }

    pub fn new_enclosed(outer: Rc<RefCell<SymbolTable>>) -> Rc<RefCell<SymbolTable>> {
        Rc::new(RefCell::new(SymbolTable {
            outer: Some(outer),
            ..SymbolTable::default()
        }))
    }

    pub fn outer(&self) -> Option<Rc<RefCell<SymbolTable>>> {
        self.outer.clone()
    }

    /// Next slot index this table would hand out; a function's local count.
    pub fn num_definitions(&self) -> u16 {
        self.num_definitions
    }

    /// Define a name in this table. Global tables hand out global slots,
    /// enclosed tables local slots.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    /// Register a builtin under its fixed table index. Does not consume a
    /// slot.
    pub fn define_builtin(&mut self, index: u16, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Register an empty struct type. Struct types occupy a slot in the
    /// definition index space.
    pub fn define_struct(&mut self, name: &str) -> StructSymbol {
        let symbol = StructSymbol {
            name: name.to_string(),
            index: self.num_definitions,
            attributes: IndexMap::new(),
        };
        self.structs.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    /// Record an attribute's default on a struct type, creating the struct
    /// entry lazily.
    pub fn define_attribute(&mut self, struct_name: &str, name: &str, default: Value) -> StructSymbol {
        if !self.structs.contains_key(struct_name) {
            self.define_struct(struct_name);
        }
        let entry = self
            .structs
            .get_mut(struct_name)
            .expect("struct entry just ensured");
        entry.attributes.insert(name.to_string(), default);
        entry.clone()
    }

    /// Whether this table itself defines `name` (no outer lookup).
    pub fn is_defined_locally(&self, name: &str) -> bool {
        self.store.contains_key(name)
    }

    /// Resolve a name, walking outward through enclosing scopes.
    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        self.outer
            .as_ref()
            .and_then(|outer| outer.borrow().resolve(name))
    }

    /// Resolve a struct type in this table only. Struct types are global
    /// declarations; enclosed tables see none.
    pub fn resolve_struct(&self, name: &str) -> Option<StructSymbol> {
        self.structs.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_resolve_globals() {
        let table = SymbolTable::new();
        let a = table.borrow_mut().define("a");
        let b = table.borrow_mut().define("b");

        assert_eq!(a.scope, SymbolScope::Global);
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
        assert_eq!(table.borrow().resolve("a"), Some(a));
        assert_eq!(table.borrow().resolve("b"), Some(b));
        assert_eq!(table.borrow().resolve("c"), None);
    }

    #[test]
    fn test_enclosed_scopes_hand_out_local_slots() {
        let global = SymbolTable::new();
        global.borrow_mut().define("a");

        let local = SymbolTable::new_enclosed(global.clone());
        let c = local.borrow_mut().define("c");
        assert_eq!(c.scope, SymbolScope::Local);
        assert_eq!(c.index, 0);

        // Outer names stay resolvable from the inner scope.
        let a = local.borrow().resolve("a").expect("outer resolution");
        assert_eq!(a.scope, SymbolScope::Global);
    }

    #[test]
    fn test_shadowing_ends_with_the_scope() {
        let global = SymbolTable::new();
        let outer_a = global.borrow_mut().define("a");

        let inner = SymbolTable::new_enclosed(global.clone());
        let inner_a = inner.borrow_mut().define("a");
        assert_eq!(inner.borrow().resolve("a"), Some(inner_a));

        // After leaving the scope, the outer symbol is live again.
        assert_eq!(global.borrow().resolve("a"), Some(outer_a));
    }

    #[test]
    fn test_builtins_resolve_from_any_depth() {
        let global = SymbolTable::new_with_builtins();
        let first = SymbolTable::new_enclosed(global);
        let second = SymbolTable::new_enclosed(first);

        let symbol = second.borrow().resolve("len").expect("builtin resolves");
        assert_eq!(symbol.scope, SymbolScope::Builtin);
        assert_eq!(symbol.index, 0);

        let write = second.borrow().resolve("write").expect("builtin resolves");
        assert_eq!(write.index, 4);
    }

    #[test]
    fn test_builtin_definition_consumes_no_slot() {
        let table = SymbolTable::new_with_builtins();
        assert_eq!(table.borrow().num_definitions(), 0);
    }

    #[test]
    fn test_struct_registry() {
        let table = SymbolTable::new();
        table.borrow_mut().define_struct("circle");
        table
            .borrow_mut()
            .define_attribute("circle", "center", Value::Int(0));
        table
            .borrow_mut()
            .define_attribute("circle", "radius", Value::Int(0));

        let circle = table.borrow().resolve_struct("circle").expect("registered");
        assert_eq!(circle.index, 0);
        assert_eq!(circle.attributes.len(), 2);

        // Struct definitions occupy a slot: the next define lands at 1.
        let c = table.borrow_mut().define("c");
        assert_eq!(c.index, 1);
    }

    #[test]
    fn test_define_attribute_creates_struct_lazily() {
        let table = SymbolTable::new();
        table
            .borrow_mut()
            .define_attribute("point", "x", Value::Float(0.0));
        assert!(table.borrow().resolve_struct("point").is_some());
    }

    #[test]
    fn test_struct_registry_is_not_chained() {
        let global = SymbolTable::new();
        global.borrow_mut().define_struct("circle");

        let inner = SymbolTable::new_enclosed(global);
        assert!(inner.borrow().resolve_struct("circle").is_none());
    }
}
