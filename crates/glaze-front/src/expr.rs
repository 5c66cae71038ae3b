//! Expression handlers: identifier references, bracket and dot
//! dereference, swizzle decoding, l-value analysis, and constant
//! projections.

use glaze_hir::{BasicType, ConstArray, Handle, Loc, Node, Op, Storage, Type};

use crate::context::ParseContext;
use crate::options::{ProfileMask, Stage};
use crate::symbol::{Symbol, SymbolKind, SymbolTable};

impl ParseContext {
    /// An identifier used as an expression.
    pub fn handle_variable(&mut self, loc: Loc, name: &str) -> Handle<Node> {
        let Some(found) = self.table.find(name) else {
            self.error(loc, "undeclared identifier", name, "");
            // keep later uses of the same name quiet
            let dummy = Symbol::variable(name, Type::scalar(BasicType::Float, Storage::Temporary));
            let handle = self.table.insert(dummy);
            return match handle {
                Some(handle) => {
                    let ty = self.table.get(handle).ty.clone();
                    self.unit
                        .make_symbol_ref(SymbolTable::unique_id(handle), name, ty, loc)
                }
                None => self.unit.recovery_float_zero(loc),
            };
        };

        let symbol = self.table.get(found.handle);
        match &symbol.kind {
            SymbolKind::AnonMember { container, member } => {
                // synthesize container.member
                let container = *container;
                let member = *member;
                let container_sym = self.table.get(container);
                let container_ty = container_sym.ty.clone();
                let container_name = container_sym.name.clone();
                let member_ty = container_ty
                    .fields
                    .as_ref()
                    .and_then(|fields| fields.get(member as usize))
                    .map(|field| field.ty.clone());
                let Some(member_ty) = member_ty else {
                    self.error(loc, "structure has no fields", "Internal Error", "");
                    return self.unit.recovery_float_zero(loc);
                };
                let container_node = self.unit.make_symbol_ref(
                    SymbolTable::unique_id(container),
                    &container_name,
                    container_ty,
                    loc,
                );
                let index = self.unit.make_uint_const(member, loc);
                self.unit
                    .add_index(Op::IndexDirectStruct, container_node, index, member_ty, loc)
            }
            SymbolKind::Function { .. } | SymbolKind::UserType => {
                self.error(loc, "variable name expected", name, "");
                self.unit.recovery_float_zero(loc)
            }
            SymbolKind::Variable { const_array } => {
                let const_array = const_array.clone();
                let ty = symbol.ty.clone();
                if ty.qualifier.storage == Storage::PointCoord {
                    self.profile_requires(loc, ProfileMask::NONE, 120, None, "gl_PointCoord");
                }
                if ty.qualifier.storage == Storage::Const {
                    if let Some(values) = const_array {
                        return self.unit.make_const(values, ty, loc);
                    }
                }
                self.unit
                    .make_symbol_ref(SymbolTable::unique_id(found.handle), name, ty, loc)
            }
        }
    }

    /// `base[index]`.
    pub fn handle_bracket_dereference(
        &mut self,
        loc: Loc,
        base: Handle<Node>,
        index: Handle<Node>,
    ) -> Handle<Node> {
        let base_ty = self.unit.ty(base).clone();
        let base_const = base_ty.qualifier.storage == Storage::Const;
        let index_const = self.unit.storage(index) == Storage::Const;

        let mut result = None;
        if !base_ty.is_array() && !base_ty.is_matrix() && !base_ty.is_vector() {
            let token = match self.unit.node(base).as_symbol() {
                Some((_, name)) => name.to_owned(),
                None => "expression".to_owned(),
            };
            self.error(
                loc,
                " left of '[' is not of type array, matrix, or vector ",
                &token,
                "",
            );
        } else if base_const && index_const {
            let index_value = self.const_index_value(index);
            if base_ty.is_array() {
                result = self.add_const_array_node(index_value, base, loc);
            } else if base_ty.is_vector() {
                result = self.add_const_vector_node(&[index_value.max(0) as u32], base, loc);
            } else {
                result = self.add_const_matrix_node(index_value, base, loc);
            }
        } else if index_const {
            let index_value = self.const_index_value(index);
            if !base_ty.is_array() {
                let out_of_range = (base_ty.is_vector()
                    && base_ty.vector_size as i32 <= index_value)
                    || (base_ty.is_matrix() && base_ty.matrix_cols as i32 <= index_value);
                if out_of_range || index_value < 0 {
                    let extra = format!("index out of range '{index_value}'");
                    self.error(loc, "", "[", &extra);
                }
            } else if base_ty.array_size() == 0 {
                self.update_max_array_size(loc, base, index_value);
            } else if index_value >= base_ty.array_size() as i32 || index_value < 0 {
                let extra = format!("array index out of range '{index_value}'");
                self.error(loc, "", "[", &extra);
            }
            result = Some(
                self.unit
                    .add_index(Op::IndexDirect, base, index, base_ty.clone(), loc),
            );
        } else {
            if base_ty.is_array() && base_ty.array_size() == 0 {
                self.error(
                    loc,
                    "",
                    "[",
                    "array must be redeclared with a size before being indexed with a variable",
                );
            }
            let base_loc = self.unit.node(base).loc;
            if base_ty.basic == BasicType::Block {
                self.require_profile(base_loc, ProfileMask::DESKTOP, "variable indexing block array");
            }
            if base_ty.basic == BasicType::Sampler && self.version >= 130 {
                let feature = "variable indexing sampler array";
                self.require_profile(base_loc, ProfileMask::CORE_AND_COMPATIBILITY, feature);
                self.profile_requires(
                    base_loc,
                    ProfileMask::CORE_AND_COMPATIBILITY,
                    400,
                    None,
                    feature,
                );
            }
            result = Some(
                self.unit
                    .add_index(Op::IndexIndirect, base, index, base_ty.clone(), loc),
            );
        }

        let Some(result) = result else {
            return self.unit.recovery_float_zero(loc);
        };

        let mut new_ty = base_ty.clone();
        if base_const && index_const {
            new_ty.qualifier.storage = Storage::Const;
        }
        new_ty.dereference();
        self.unit.set_type(result, new_ty);

        if self.any_index_limits {
            self.defer_index_limit_check(base, index, &base_ty);
        }

        result
    }

    /// Version-100 index restrictions cannot be resolved until the
    /// inductive loops are known, so the affected index expressions are
    /// queued for `finalize`.
    fn defer_index_limit_check(&mut self, base: Handle<Node>, index: Handle<Node>, base_ty: &Type) {
        let limits = &self.options.limits;
        let qualifier = &base_ty.qualifier;
        let base_is_const_node = self.unit.node(base).is_const();
        let affected = (!limits.general_sampler_indexing && base_ty.basic == BasicType::Sampler)
            || (!limits.general_uniform_indexing
                && qualifier.storage.is_uniform()
                && self.stage != Stage::Vertex)
            || (!limits.general_attribute_matrix_vector_indexing
                && qualifier.storage.is_pipe_input()
                && self.stage == Stage::Vertex
                && (base_ty.is_matrix() || base_ty.is_vector()))
            || (!limits.general_constant_matrix_vector_indexing && base_is_const_node)
            || (!limits.general_variable_indexing
                && !qualifier.storage.is_uniform()
                && !qualifier.storage.is_pipe_input()
                && !qualifier.storage.is_pipe_output()
                && qualifier.storage != Storage::Const)
            || (!limits.general_varying_indexing
                && (qualifier.storage.is_pipe_input() || qualifier.storage.is_pipe_output()));
        if affected {
            self.needs_index_limitation_checking.push(index);
        }
    }

    fn const_index_value(&self, index: Handle<Node>) -> i32 {
        self.unit
            .node(index)
            .as_const()
            .map_or(0, |values| values.get(0).as_int())
    }

    /// `base.field`.
    pub fn handle_dot_dereference(
        &mut self,
        loc: Loc,
        base: Handle<Node>,
        field: &str,
    ) -> Handle<Node> {
        let base_ty = self.unit.ty(base).clone();

        if base_ty.is_array() {
            if field == "length" {
                self.profile_requires(
                    loc,
                    ProfileMask::NONE,
                    120,
                    Some("GL_3DL_array_objects"),
                    ".length",
                );
                self.profile_requires(loc, ProfileMask::ES, 300, None, ".length");
                let int_ty = Type::scalar(BasicType::Int, Storage::Temporary);
                return self.unit.make_method(base, "length", int_ty, loc);
            }
            self.error(loc, "only the length method is supported for array", field, "");
            return base;
        }

        let swizzlable = base_ty.basic.is_numeric() || base_ty.basic == BasicType::Bool;
        if (base_ty.is_vector() || base_ty.is_scalar()) && swizzlable {
            if base_ty.is_scalar() {
                let feature = "scalar swizzle";
                self.require_profile(loc, ProfileMask::CORE_AND_COMPATIBILITY, feature);
                self.profile_requires(
                    loc,
                    ProfileMask::CORE_AND_COMPATIBILITY,
                    420,
                    Some("GL_ARB_shading_language_420pack"),
                    feature,
                );
            }

            let offsets = self
                .parse_vector_fields(loc, field, base_ty.vector_size)
                .unwrap_or_else(|| vec![0]);

            if base_ty.is_scalar() {
                if offsets.len() == 1 {
                    return base;
                }
                let ty = Type::vector(base_ty.basic, Storage::Temporary, offsets.len() as u32);
                let op = self.map_type_to_constructor_op(&ty);
                return match op.and_then(|op| self.add_constructor(loc, base, &ty, op)) {
                    Some(node) => node,
                    None => {
                        self.error(loc, "cannot construct from a scalar", field, "");
                        self.unit.recovery_float_zero(loc)
                    }
                };
            }

            if base_ty.qualifier.storage == Storage::Const {
                return match self.add_const_vector_node(&offsets, base, loc) {
                    Some(node) => {
                        let mut ty =
                            Type::vector(base_ty.basic, Storage::Const, offsets.len() as u32);
                        ty.qualifier.precision = base_ty.qualifier.precision;
                        self.unit.set_type(node, ty);
                        node
                    }
                    None => base,
                };
            }

            return if offsets.len() == 1 {
                let index = self.unit.make_int_const(offsets[0] as i32, loc);
                let mut ty = Type::scalar(base_ty.basic, Storage::Temporary);
                ty.qualifier.precision = base_ty.qualifier.precision;
                self.unit.add_index(Op::IndexDirect, base, index, ty, loc)
            } else {
                let swizzle = self.unit.make_swizzle(&offsets, loc);
                let mut ty = Type::vector(base_ty.basic, Storage::Temporary, offsets.len() as u32);
                ty.qualifier.precision = base_ty.qualifier.precision;
                self.unit.add_index(Op::VectorSwizzle, base, swizzle, ty, loc)
            };
        }

        if base_ty.is_matrix() {
            self.error(loc, "field selection not allowed on matrix", ".", "");
            return base;
        }

        if matches!(base_ty.basic, BasicType::Struct | BasicType::Block) {
            let Some(fields) = base_ty.fields.clone() else {
                self.error(loc, "structure has no fields", "Internal Error", "");
                return base;
            };
            let found = fields
                .iter()
                .position(|f| f.ty.field_name.as_deref() == Some(field));
            let Some(member) = found else {
                self.error(loc, " no such field in structure", field, "");
                return base;
            };
            let member_ty = fields[member].ty.clone();
            return if base_ty.qualifier.storage == Storage::Const {
                match self.add_const_struct(field, base, loc) {
                    Some(node) => {
                        // qualify the result, not the shared field type
                        let mut ty = member_ty;
                        ty.qualifier.storage = Storage::Const;
                        self.unit.set_type(node, ty);
                        node
                    }
                    None => base,
                }
            } else {
                let index = self.unit.make_int_const(member as i32, loc);
                self.unit
                    .add_index(Op::IndexDirectStruct, base, index, member_ty, loc)
            };
        }

        let extra = base_ty.complete_string();
        self.error(loc, " dot operator does not operate on this type:", field, &extra);
        base
    }

    /// Decodes a swizzle string into component offsets. Each character
    /// must come from exactly one of the sets xyzw, rgba, stpq.
    pub fn parse_vector_fields(
        &mut self,
        loc: Loc,
        field: &str,
        vector_size: u32,
    ) -> Option<Vec<u32>> {
        if field.len() > 4 {
            self.error(loc, "illegal vector field selection", field, "");
            return None;
        }

        #[derive(PartialEq, Clone, Copy)]
        enum Set {
            Xyzw,
            Rgba,
            Stpq,
        }

        let mut offsets = Vec::with_capacity(field.len());
        let mut sets = Vec::with_capacity(field.len());
        for c in field.chars() {
            let (offset, set) = match c {
                'x' => (0, Set::Xyzw),
                'y' => (1, Set::Xyzw),
                'z' => (2, Set::Xyzw),
                'w' => (3, Set::Xyzw),
                'r' => (0, Set::Rgba),
                'g' => (1, Set::Rgba),
                'b' => (2, Set::Rgba),
                'a' => (3, Set::Rgba),
                's' => (0, Set::Stpq),
                't' => (1, Set::Stpq),
                'p' => (2, Set::Stpq),
                'q' => (3, Set::Stpq),
                _ => {
                    self.error(loc, "illegal vector field selection", field, "");
                    return None;
                }
            };
            offsets.push(offset);
            sets.push(set);
        }

        for (i, &offset) in offsets.iter().enumerate() {
            if offset >= vector_size {
                self.error(loc, "vector field selection out of range", field, "");
                return None;
            }
            if i > 0 && sets[i] != sets[i - 1] {
                self.error(
                    loc,
                    "illegal - vector component fields not from the same set",
                    field,
                    "",
                );
                return None;
            }
        }

        Some(offsets)
    }

    // -----------------------------------------------------------------
    // L-values
    // -----------------------------------------------------------------

    /// Diagnoses nodes that cannot be stored through. True on error.
    pub fn l_value_error_check(&mut self, loc: Loc, op: &str, node: Handle<Node>) -> bool {
        if let Some((node_op, left, right)) = self.unit.node(node).as_binary() {
            return match node_op {
                Op::IndexDirect | Op::IndexIndirect | Op::IndexDirectStruct => {
                    self.l_value_error_check(loc, op, left)
                }
                Op::VectorSwizzle => {
                    if self.l_value_error_check(loc, op, left) {
                        return true;
                    }
                    let mut lanes = [0u8; 4];
                    let offsets: Vec<usize> = self
                        .unit
                        .aggregate_sequence(right)
                        .iter()
                        .filter_map(|&child| {
                            self.unit
                                .node(child)
                                .as_const()
                                .map(|v| v.get(0).as_int().max(0) as usize)
                        })
                        .collect();
                    for offset in offsets {
                        if offset < 4 {
                            lanes[offset] += 1;
                            if lanes[offset] > 1 {
                                self.error(
                                    loc,
                                    " l-value of swizzle cannot have duplicate components",
                                    op,
                                    "",
                                );
                                return true;
                            }
                        }
                    }
                    false
                }
                _ => {
                    self.error(loc, " l-value required", op, "");
                    true
                }
            };
        }

        let node_ref = self.unit.node(node);
        let symbol_name = node_ref.as_symbol().map(|(_, name)| name.to_owned());
        let message = match node_ref.ty.qualifier.storage {
            Storage::Const | Storage::ConstReadOnly => Some("can't modify a const"),
            Storage::VaryingIn => Some("can't modify shader input"),
            Storage::Uniform | Storage::Buffer => Some("can't modify a uniform"),
            Storage::InstanceId => Some("can't modify gl_InstanceID"),
            Storage::VertexId => Some("can't modify gl_VertexID"),
            Storage::Face => Some("can't modify gl_FrontFacing"),
            Storage::FragCoord => Some("can't modify gl_FragCoord"),
            Storage::PointCoord => Some("can't modify gl_PointCoord"),
            _ => match node_ref.ty.basic {
                BasicType::Sampler => Some("can't modify a sampler"),
                BasicType::Void => Some("can't modify void"),
                _ => None,
            },
        };

        match (message, symbol_name) {
            (None, Some(_)) => false,
            (None, None) => {
                self.error(loc, " l-value required", op, "");
                true
            }
            (Some(message), Some(name)) => {
                let extra = format!("\"{name}\" ({message})");
                self.error(loc, " l-value required", op, &extra);
                true
            }
            (Some(message), None) => {
                let extra = format!("({message})");
                self.error(loc, " l-value required", op, &extra);
                true
            }
        }
    }

    // -----------------------------------------------------------------
    // Operator wrappers with diagnostics and recovery
    // -----------------------------------------------------------------

    pub fn handle_unary_math(
        &mut self,
        loc: Loc,
        op: Op,
        op_str: &str,
        operand: Handle<Node>,
    ) -> Handle<Node> {
        match self.unit.add_unary_math(op, operand, loc) {
            Some(node) => node,
            None => {
                let operand_str = self.unit.ty(operand).complete_string();
                let extra = format!(
                    "no operation '{op_str}' exists that takes an operand of type {operand_str} (or there is no acceptable conversion)"
                );
                self.error(loc, " wrong operand type", op_str, &extra);
                self.unit.recovery_float_zero(loc)
            }
        }
    }

    pub fn handle_binary_math(
        &mut self,
        loc: Loc,
        op: Op,
        op_str: &str,
        left: Handle<Node>,
        right: Handle<Node>,
    ) -> Handle<Node> {
        // comparing arrays is version-gated
        if matches!(op, Op::Equal | Op::NotEqual) {
            let left_ty = self.unit.ty(left).clone();
            self.array_object_check(loc, &left_ty, op_str);
        }
        match self.unit.add_binary_math(op, left, right, loc) {
            Some(node) => node,
            None => {
                let left_str = self.unit.ty(left).complete_string();
                let right_str = self.unit.ty(right).complete_string();
                let extra = format!(
                    "no operation '{op_str}' exists that takes a left-hand operand of type '{left_str}' and a right operand of type '{right_str}' (or there is no acceptable conversion)"
                );
                self.error(loc, " wrong operand types:", op_str, &extra);
                self.unit.recovery_float_zero(loc)
            }
        }
    }

    pub fn handle_assign(
        &mut self,
        loc: Loc,
        op: Op,
        op_str: &str,
        left: Handle<Node>,
        right: Handle<Node>,
    ) -> Handle<Node> {
        self.l_value_error_check(loc, op_str, left);
        match self.unit.add_assign(op, left, right, loc) {
            Some(node) => node,
            None => {
                let left_str = self.unit.ty(left).complete_string();
                let right_str = self.unit.ty(right).complete_string();
                let extra = format!("cannot convert from '{right_str}' to '{left_str}'");
                self.error(loc, "", op_str, &extra);
                left
            }
        }
    }

    pub fn handle_ternary(
        &mut self,
        loc: Loc,
        condition: Handle<Node>,
        accept: Handle<Node>,
        reject: Handle<Node>,
    ) -> Handle<Node> {
        self.bool_check(loc, condition);
        match self.unit.add_ternary(condition, accept, reject, loc) {
            Some(node) => node,
            None => {
                let left_str = self.unit.ty(accept).complete_string();
                let right_str = self.unit.ty(reject).complete_string();
                let extra = format!(
                    "no operation ':' exists that takes a left-hand operand of type '{left_str}' and a right operand of type '{right_str}' (or there is no acceptable conversion)"
                );
                self.error(loc, " wrong operand types:", ":", &extra);
                reject
            }
        }
    }

    pub fn array_object_check(&mut self, loc: Loc, ty: &Type, op: &str) {
        if ty.contains_array() {
            self.profile_requires(loc, ProfileMask::NONE, 120, Some("GL_3DL_array_objects"), op);
            self.profile_requires(loc, ProfileMask::ES, 300, None, op);
        }
    }

    // -----------------------------------------------------------------
    // Constant projections (windows over folded values)
    // -----------------------------------------------------------------

    /// Project swizzled lanes out of a constant vector.
    pub fn add_const_vector_node(
        &mut self,
        offsets: &[u32],
        node: Handle<Node>,
        loc: Loc,
    ) -> Option<Handle<Node>> {
        let node_ref = self.unit.node(node);
        let Some(values) = node_ref.as_const().cloned() else {
            self.error(loc, "Cannot offset into the vector", "Error", "");
            return None;
        };
        let object_size = node_ref.ty.object_size();
        let ty = node_ref.ty.clone();

        let mut out = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            let offset = if offset >= object_size {
                let extra = format!("vector index out of range '{offset}'");
                self.error(loc, "", "[", &extra);
                0
            } else {
                offset
            };
            out.push(values.get(offset as usize));
        }
        Some(self.unit.make_const(ConstArray::new(out), ty, loc))
    }

    /// Project a column out of a constant matrix.
    pub fn add_const_matrix_node(
        &mut self,
        index: i32,
        node: Handle<Node>,
        loc: Loc,
    ) -> Option<Handle<Node>> {
        let node_ref = self.unit.node(node);
        let ty = node_ref.ty.clone();
        let index = if index < 0 || index >= ty.matrix_cols as i32 {
            let extra = format!("matrix field selection out of range '{index}'");
            self.error(loc, "", "[", &extra);
            0
        } else {
            index
        };
        let Some(values) = self.unit.node(node).as_const().cloned() else {
            self.error(loc, "Cannot offset into the matrix", "Error", "");
            return None;
        };
        let rows = ty.matrix_rows as usize;
        let column = values.window(rows * index as usize, rows);
        // the caller corrects (dereferences) the type
        Some(self.unit.make_const(column, ty, loc))
    }

    /// Project an element out of a constant array.
    pub fn add_const_array_node(
        &mut self,
        index: i32,
        node: Handle<Node>,
        loc: Loc,
    ) -> Option<Handle<Node>> {
        let node_ref = self.unit.node(node);
        let ty = node_ref.ty.clone();
        let index = if index < 0 || index >= ty.array_size() as i32 {
            let extra = format!("array index '{index}' out of range");
            self.error(loc, "", "[", &extra);
            0
        } else {
            index
        };
        let Some(values) = self.unit.node(node).as_const().cloned() else {
            self.error(loc, "Cannot offset into the array", "Error", "");
            return None;
        };
        let element_size = ty.dereferenced().object_size() as usize;
        let element = values.window(element_size * index as usize, element_size);
        Some(self.unit.make_const(element, ty, loc))
    }

    /// Project a field out of a constant structure.
    pub fn add_const_struct(
        &mut self,
        field: &str,
        node: Handle<Node>,
        loc: Loc,
    ) -> Option<Handle<Node>> {
        let node_ref = self.unit.node(node);
        let ty = node_ref.ty.clone();
        let fields = ty.fields.clone()?;

        let mut offset = 0usize;
        let mut size = 0usize;
        for member in fields.iter() {
            size = member.ty.object_size() as usize;
            if member.ty.field_name.as_deref() == Some(field) {
                break;
            }
            offset += size;
        }

        let Some(values) = self.unit.node(node).as_const().cloned() else {
            self.error(loc, "Cannot offset into the structure", "Error", "");
            return None;
        };
        let window = values.window(offset, size);
        Some(self.unit.make_const(window, ty, loc))
    }

    /// Track the largest constant index applied to an unsized array.
    pub fn update_max_array_size(&mut self, loc: Loc, node: Handle<Node>, index: i32) {
        let Some((_, name)) = self.unit.node(node).as_symbol() else {
            // members of blocks are not tracked
            return;
        };
        let name = name.to_owned();
        if self.unit.ty(node).max_array_size() as i32 > index {
            return;
        }

        let Some(found) = self.table.find(&name) else {
            return;
        };
        if self.table.get(found.handle).as_function().is_some() {
            self.error(loc, "array variable name expected", &name, "");
            return;
        }

        let handle = if self.table.get(found.handle).read_only {
            self.table.copy_up(found.handle)
        } else {
            found.handle
        };
        self.table
            .get_mut(handle)
            .ty
            .set_max_array_size((index + 1).max(0) as u32);
        // the node's type shares the dimension cell, so the new max is
        // visible everywhere
        self.unit.ty(node).set_max_array_size((index + 1).max(0) as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Options, Profile, Stage};

    fn ctx() -> ParseContext {
        let mut ctx = ParseContext::new(Options::new(330, Profile::Core, Stage::Vertex));
        ctx.table.seal_builtins();
        ctx
    }

    fn const_vec3(ctx: &mut ParseContext) -> Handle<Node> {
        use glaze_hir::ConstValue;
        let values = ConstArray::new(vec![
            ConstValue::Double(1.0),
            ConstValue::Double(2.0),
            ConstValue::Double(3.0),
        ]);
        let ty = Type::vector(BasicType::Float, Storage::Const, 3);
        ctx.unit.make_const(values, ty, Loc::default())
    }

    #[test]
    fn swizzle_decoding_rules() {
        let mut ctx = ctx();
        let loc = Loc::default();
        assert_eq!(ctx.parse_vector_fields(loc, "zxy", 3), Some(vec![2, 0, 1]));
        assert_eq!(ctx.parse_vector_fields(loc, "rgba", 4), Some(vec![0, 1, 2, 3]));
        assert_eq!(ctx.parse_vector_fields(loc, "st", 2), Some(vec![0, 1]));
        assert_eq!(ctx.error_count(), 0);

        // too long
        assert!(ctx.parse_vector_fields(loc, "xyzwx", 4).is_none());
        assert!(ctx.sink.text().contains("illegal vector field selection"));
        // mixed sets
        assert!(ctx.parse_vector_fields(loc, "xrs", 4).is_none());
        assert!(ctx.sink.text().contains("not from the same set"));
        // out of range
        assert!(ctx.parse_vector_fields(loc, "z", 2).is_none());
        assert!(ctx.sink.text().contains("vector field selection out of range"));
    }

    #[test]
    fn const_swizzle_folds() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let vector = const_vec3(&mut ctx);
        let swizzled = ctx.handle_dot_dereference(loc, vector, "zxy");
        let node = ctx.unit.node(swizzled);
        let values = node.as_const().expect("folded");
        assert_eq!(values.get(0).as_double(), 3.0);
        assert_eq!(values.get(1).as_double(), 1.0);
        assert_eq!(values.get(2).as_double(), 2.0);

        // identity swizzle round-trips the value
        let identity = ctx.handle_dot_dereference(loc, vector, "xyz");
        let values = ctx.unit.node(identity).as_const().unwrap();
        assert_eq!(values.get(0).as_double(), 1.0);
        assert_eq!(values.get(2).as_double(), 3.0);
        assert_eq!(ctx.error_count(), 0);
    }

    #[test]
    fn undeclared_identifier_recovers_typed() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let node = ctx.handle_variable(loc, "nowhere");
        assert_eq!(ctx.error_count(), 1);
        assert!(ctx.sink.text().contains("undeclared identifier"));
        assert_eq!(ctx.unit.ty(node).basic, BasicType::Float);

        // second use stays quiet
        ctx.handle_variable(loc, "nowhere");
        assert_eq!(ctx.error_count(), 1);
    }

    #[test]
    fn const_bracket_folds_and_bounds() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let vector = const_vec3(&mut ctx);
        let index = ctx.unit.make_int_const(1, loc);
        let element = ctx.handle_bracket_dereference(loc, vector, index);
        let node = ctx.unit.node(element);
        assert_eq!(node.as_const().unwrap().get(0).as_double(), 2.0);
        assert!(node.ty.is_scalar());
        assert_eq!(node.ty.qualifier.storage, Storage::Const);
    }

    #[test]
    fn swizzle_lvalue_duplicate_rejected() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let ty = Type::vector(BasicType::Float, Storage::Temporary, 4);
        let base = ctx.unit.make_symbol_ref(7, "v", ty, loc);
        let good = ctx.handle_dot_dereference(loc, base, "xy");
        assert!(!ctx.l_value_error_check(loc, "assign", good));

        let dup = ctx.handle_dot_dereference(loc, base, "xx");
        assert!(ctx.l_value_error_check(loc, "assign", dup));
        assert!(ctx.sink.text().contains("duplicate components"));
    }

    #[test]
    fn uniform_is_not_assignable() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let ty = Type::vector(BasicType::Float, Storage::Uniform, 4);
        let node = ctx.unit.make_symbol_ref(3, "u", ty, loc);
        assert!(ctx.l_value_error_check(loc, "assign", node));
        assert!(ctx.sink.text().contains("can't modify a uniform"));
    }
}
