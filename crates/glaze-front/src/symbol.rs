//! Scoped symbol table with built-in layering and copy-up-on-write.

use std::collections::HashMap;

use glaze_hir::{Arena, ConstArray, Handle, Op, Type};

/// One formal parameter of a function symbol. The parameter's storage
/// qualifier lives on `ty.qualifier.storage`.
#[derive(Clone, Debug)]
pub struct Param {
    pub name: Option<String>,
    pub ty: Type,
}

/// Per-variant payload of a symbol.
#[derive(Clone, Debug)]
pub enum SymbolKind {
    Variable {
        /// Folded value of a `const` variable.
        const_array: Option<ConstArray>,
    },
    Function {
        params: Vec<Param>,
        defined: bool,
        /// Set when a built-in function maps directly to an operation.
        builtin_op: Option<Op>,
    },
    /// A member of an anonymous interface block, reachable by its own
    /// name.
    AnonMember {
        container: Handle<Symbol>,
        member: u32,
    },
    /// A user-defined type name introduced by a struct declaration.
    UserType,
}

/// A named entry in the symbol table. Functions carry their return
/// type in `ty`.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    /// Table key: the mangled name for functions, `name` otherwise.
    pub mangled: String,
    pub ty: Type,
    pub kind: SymbolKind,
    /// Built-in symbols are read-only until copied up.
    pub read_only: bool,
}

impl Symbol {
    pub fn variable(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_owned(),
            mangled: name.to_owned(),
            ty,
            kind: SymbolKind::Variable { const_array: None },
            read_only: false,
        }
    }

    pub fn user_type(name: &str, ty: Type) -> Self {
        Self {
            name: name.to_owned(),
            mangled: name.to_owned(),
            ty,
            kind: SymbolKind::UserType,
            read_only: false,
        }
    }

    pub fn function(name: &str, return_ty: Type, params: Vec<Param>) -> Self {
        let mangled = mangle_name(name, &params);
        Self {
            name: name.to_owned(),
            mangled,
            ty: return_ty,
            kind: SymbolKind::Function {
                params,
                defined: false,
                builtin_op: None,
            },
            read_only: false,
        }
    }

    pub fn as_function(&self) -> Option<(&[Param], bool, Option<Op>)> {
        match &self.kind {
            SymbolKind::Function {
                params,
                defined,
                builtin_op,
            } => Some((params, *defined, *builtin_op)),
            _ => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, SymbolKind::Variable { .. })
    }

    pub fn const_array(&self) -> Option<&ConstArray> {
        match &self.kind {
            SymbolKind::Variable { const_array } => const_array.as_ref(),
            _ => None,
        }
    }

    pub fn set_const_array(&mut self, values: ConstArray) {
        if let SymbolKind::Variable { const_array } = &mut self.kind {
            *const_array = Some(values);
        }
    }
}

/// Result of a symbol-table lookup.
#[derive(Clone, Copy, Debug)]
pub struct FindResult {
    pub handle: Handle<Symbol>,
    /// The hit came from a built-in level.
    pub builtin: bool,
    /// The hit came from the innermost (current) scope.
    pub current_scope: bool,
}

/// Stack of scopes over an arena of symbols. The bottom levels hold
/// the read-only built-ins; the first level above them is the global
/// scope of the compilation unit.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: Arena<Symbol>,
    levels: Vec<HashMap<String, Handle<Symbol>>>,
    builtin_levels: usize,
    sealed: bool,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table with one open built-in level, ready for seeding.
    pub fn new() -> Self {
        Self {
            symbols: Arena::new(),
            levels: vec![HashMap::new()],
            builtin_levels: 0,
            sealed: false,
        }
    }

    /// Finish seeding: the existing levels become read-only built-in
    /// levels and the global scope is opened.
    pub fn seal_builtins(&mut self) {
        self.builtin_levels = self.levels.len();
        self.sealed = true;
        self.levels.push(HashMap::new());
    }

    pub fn at_builtin_level(&self) -> bool {
        !self.sealed
    }

    pub fn at_global_level(&self) -> bool {
        !self.sealed || self.levels.len() == self.builtin_levels + 1
    }

    pub fn push(&mut self) {
        self.levels.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        debug_assert!(self.levels.len() > self.builtin_levels + 1);
        self.levels.pop();
    }

    pub fn get(&self, handle: Handle<Symbol>) -> &Symbol {
        &self.symbols[handle]
    }

    pub fn get_mut(&mut self, handle: Handle<Symbol>) -> &mut Symbol {
        &mut self.symbols[handle]
    }

    /// The stable unique id of a symbol.
    pub fn unique_id(handle: Handle<Symbol>) -> u32 {
        handle.index() as u32
    }

    /// Insert into the current scope; `None` if the key already exists
    /// there.
    pub fn insert(&mut self, mut symbol: Symbol) -> Option<Handle<Symbol>> {
        symbol.read_only = !self.sealed;
        let key = symbol.mangled.clone();
        let level = self.levels.last_mut().expect("symbol table has a level");
        if level.contains_key(&key) {
            return None;
        }
        let handle = self.symbols.append(symbol);
        self.levels
            .last_mut()
            .expect("symbol table has a level")
            .insert(key, handle);
        Some(handle)
    }

    /// Walks the scopes innermost-out.
    pub fn find(&self, name: &str) -> Option<FindResult> {
        let top = self.levels.len() - 1;
        for (depth, level) in self.levels.iter().enumerate().rev() {
            if let Some(&handle) = level.get(name) {
                return Some(FindResult {
                    handle,
                    builtin: self.sealed && depth < self.builtin_levels,
                    current_scope: depth == top,
                });
            }
        }
        None
    }

    /// Promote a built-in symbol into the global scope as a writable
    /// clone. Subsequent lookups hit the clone.
    pub fn copy_up(&mut self, handle: Handle<Symbol>) -> Handle<Symbol> {
        let mut clone = self.symbols[handle].clone();
        clone.read_only = false;
        let key = clone.mangled.clone();
        let new_handle = self.symbols.append(clone);
        self.levels[self.builtin_levels].insert(key, new_handle);
        new_handle
    }

    /// Every function overload with the given base name, innermost
    /// scopes first.
    pub fn functions_named(&self, name: &str) -> Vec<Handle<Symbol>> {
        let mut found = Vec::new();
        for level in self.levels.iter().rev() {
            for &handle in level.values() {
                let symbol = &self.symbols[handle];
                if symbol.name == name && matches!(symbol.kind, SymbolKind::Function { .. }) {
                    found.push(handle);
                }
            }
        }
        found
    }
}

/// Builds the overload-disambiguating name of a function: the base
/// name, an opening paren, and one shape code per parameter. Storage
/// qualifiers are deliberately not encoded; prototypes that differ
/// only in them must collide so the mismatch can be diagnosed.
pub fn mangle_name(name: &str, params: &[Param]) -> String {
    let mut mangled = String::with_capacity(name.len() + 1 + params.len() * 4);
    mangled.push_str(name);
    mangled.push('(');
    for param in params {
        mangle_type(&param.ty, &mut mangled);
        mangled.push(';');
    }
    mangled
}

fn mangle_type(ty: &Type, out: &mut String) {
    use glaze_hir::BasicType;

    if let Some(sampler) = &ty.sampler {
        out.push('s');
        out.push(match sampler.scalar {
            glaze_hir::SamplerScalar::Float => 'f',
            glaze_hir::SamplerScalar::Int => 'i',
            glaze_hir::SamplerScalar::Uint => 'u',
        });
        out.push_str(match sampler.dim {
            glaze_hir::SamplerDim::Dim1D => "1",
            glaze_hir::SamplerDim::Dim2D => "2",
            glaze_hir::SamplerDim::Dim3D => "3",
            glaze_hir::SamplerDim::Cube => "C",
            glaze_hir::SamplerDim::Rect => "R",
            glaze_hir::SamplerDim::Buffer => "B",
            glaze_hir::SamplerDim::Ms2D => "M",
        });
        if sampler.arrayed {
            out.push('A');
        }
        if sampler.shadow {
            out.push('S');
        }
    } else if ty.is_struct() {
        out.push_str("struct-");
        if let Some(name) = &ty.type_name {
            out.push_str(name);
        }
    } else {
        let letter = match ty.basic {
            BasicType::Float => 'f',
            BasicType::Double => 'd',
            BasicType::Int => 'i',
            BasicType::Uint => 'u',
            BasicType::Bool => 'b',
            _ => 'v',
        };
        if ty.is_matrix() {
            out.push('m');
            out.push(letter);
            out.push_str(&ty.matrix_cols.to_string());
            out.push('x');
            out.push_str(&ty.matrix_rows.to_string());
        } else if ty.is_vector() {
            out.push('v');
            out.push(letter);
            out.push_str(&ty.vector_size.to_string());
        } else {
            out.push(letter);
            out.push('1');
        }
    }
    if ty.is_array() {
        out.push('[');
        out.push_str(&ty.array_size().to_string());
        out.push(']');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glaze_hir::{BasicType, Storage};

    fn float_ty() -> Type {
        Type::scalar(BasicType::Float, Storage::In)
    }

    #[test]
    fn mangling_distinguishes_shapes() {
        let f = mangle_name(
            "f",
            &[Param {
                name: None,
                ty: float_ty(),
            }],
        );
        let fv3 = mangle_name(
            "f",
            &[Param {
                name: None,
                ty: Type::vector(BasicType::Float, Storage::In, 3),
            }],
        );
        let fm = mangle_name(
            "f",
            &[Param {
                name: None,
                ty: Type::matrix(BasicType::Float, Storage::In, 4, 4),
            }],
        );
        assert_eq!(f, "f(f1;");
        assert_eq!(fv3, "f(vf3;");
        assert_eq!(fm, "f(mf4x4;");
        assert_ne!(f, fv3);
        assert_ne!(fv3, fm);
    }

    #[test]
    fn mangling_ignores_storage() {
        let out_p = mangle_name(
            "f",
            &[Param {
                name: None,
                ty: Type::scalar(BasicType::Int, Storage::Out),
            }],
        );
        let in_p = mangle_name(
            "f",
            &[Param {
                name: None,
                ty: Type::scalar(BasicType::Int, Storage::In),
            }],
        );
        assert_eq!(out_p, in_p);
    }

    #[test]
    fn scoped_lookup_and_shadowing() {
        let mut table = SymbolTable::new();
        table.seal_builtins();

        let global = table
            .insert(Symbol::variable("x", float_ty()))
            .expect("fresh insert");
        assert!(table.at_global_level());

        table.push();
        let result = table.find("x").unwrap();
        assert_eq!(result.handle, global);
        assert!(!result.current_scope);
        assert!(!result.builtin);

        let inner = table
            .insert(Symbol::variable("x", Type::scalar(BasicType::Int, Storage::Temporary)))
            .expect("shadowing in inner scope");
        let result = table.find("x").unwrap();
        assert_eq!(result.handle, inner);
        assert!(result.current_scope);

        table.pop();
        assert_eq!(table.find("x").unwrap().handle, global);
    }

    #[test]
    fn duplicate_in_same_scope_rejected() {
        let mut table = SymbolTable::new();
        table.seal_builtins();
        assert!(table.insert(Symbol::variable("x", float_ty())).is_some());
        assert!(table.insert(Symbol::variable("x", float_ty())).is_none());
    }

    #[test]
    fn copy_up_makes_writable_clone() {
        let mut table = SymbolTable::new();
        let builtin = table
            .insert(Symbol::variable("gl_FragDepth", float_ty()))
            .unwrap();
        table.seal_builtins();

        let found = table.find("gl_FragDepth").unwrap();
        assert!(found.builtin);
        assert!(table.get(found.handle).read_only);

        let copy = table.copy_up(builtin);
        assert_ne!(copy, builtin);
        assert!(!table.get(copy).read_only);

        let found = table.find("gl_FragDepth").unwrap();
        assert_eq!(found.handle, copy);
        assert!(!found.builtin);
    }

    #[test]
    fn function_overloads_coexist() {
        let mut table = SymbolTable::new();
        table.seal_builtins();
        let ret = Type::scalar(BasicType::Void, Storage::Temporary);
        let p_int = Param {
            name: None,
            ty: Type::scalar(BasicType::Int, Storage::In),
        };
        let p_float = Param {
            name: None,
            ty: Type::scalar(BasicType::Float, Storage::In),
        };
        assert!(table
            .insert(Symbol::function("f", ret.clone(), vec![p_int]))
            .is_some());
        assert!(table
            .insert(Symbol::function("f", ret, vec![p_float]))
            .is_some());
        assert_eq!(table.functions_named("f").len(), 2);
    }
}
