//! Function declarations, prototypes, calls, and constructors.

use glaze_hir::{
    BasicType, ConstArray, ConstValue, Handle, Loc, Node, NodeKind, Op, Precision, Storage, Type,
};
use log::debug;

use crate::context::{ParseContext, PublicType};
use crate::options::{Profile, ProfileMask};
use crate::symbol::{mangle_name, Param, Symbol, SymbolKind, SymbolTable};

/// A function signature under construction: a declaration, a
/// prototype, or a call site (whose parameter types are the argument
/// types, for overload lookup).
#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub return_ty: Type,
    pub params: Vec<Param>,
    /// Set for constructor "calls".
    pub op: Option<Op>,
}

impl FunctionDecl {
    pub fn new(name: &str, return_ty: Type) -> Self {
        Self {
            name: name.to_owned(),
            return_ty,
            params: Vec::new(),
            op: None,
        }
    }

    pub fn mangled(&self) -> String {
        mangle_name(&self.name, &self.params)
    }
}

impl ParseContext {
    // -----------------------------------------------------------------
    // Declarations, prototypes, definitions
    // -----------------------------------------------------------------

    /// A function declarator: the prefix of both prototypes and
    /// definitions.
    pub fn handle_function_declarator(&mut self, loc: Loc, function: &FunctionDecl) {
        if !self.table.at_global_level() {
            self.require_profile(loc, ProfileMask::DESKTOP, "local function declaration");
        }

        let mangled = function.mangled();
        if let Some(found) = self.table.find(&mangled) {
            let previous = self.table.get(found.handle);
            if found.builtin && previous.as_function().is_some() {
                self.require_not_removed(loc, Profile::Es, 300, "redeclaration of built-in function");
            }
            if let Some((params, _, _)) = self.table.get(found.handle).as_function() {
                let prev_ret = self.table.get(found.handle).ty.clone();
                let prev_storages: Vec<Storage> =
                    params.iter().map(|p| p.ty.qualifier.storage).collect();
                if !prev_ret.same_type(&function.return_ty) {
                    let token = function.return_ty.complete_string();
                    self.error(
                        loc,
                        "overloaded functions must have the same return type",
                        &token,
                        "",
                    );
                }
                for (i, storage) in prev_storages.iter().enumerate() {
                    if let Some(param) = function.params.get(i) {
                        if *storage != param.ty.qualifier.storage {
                            self.error(
                                loc,
                                "overloaded functions must have the same parameter qualifiers",
                                param.ty.qualifier.storage.as_str(),
                                "",
                            );
                        }
                    }
                }
            }
            // an exact redeclaration in the same scope reuses the entry
            if found.current_scope && !found.builtin {
                return;
            }
        }

        let symbol = Symbol::function(
            &function.name,
            function.return_ty.clone(),
            function.params.clone(),
        );
        if self.table.insert(symbol).is_none() {
            self.error(loc, "illegal redeclaration", &function.name, "");
        }
    }

    /// A prototype that may become a definition: records the current
    /// function, validates `main`, opens the body scope, and builds the
    /// `Parameters` aggregate.
    pub fn handle_function_prototype(&mut self, loc: Loc, function: &FunctionDecl) -> Handle<Node> {
        let mangled = function.mangled();
        self.current_caller = mangled.clone();

        let previous = self
            .table
            .find(&mangled)
            .filter(|f| self.table.get(f.handle).as_function().is_some());
        match previous {
            Some(found) => {
                let (_, defined, _) = self.table.get(found.handle).as_function().unwrap();
                if defined {
                    self.error(loc, "function already has a body", &function.name, "");
                }
                if let SymbolKind::Function { defined, .. } =
                    &mut self.table.get_mut(found.handle).kind
                {
                    *defined = true;
                }
                self.current_function_ret = Some(self.table.get(found.handle).ty.clone());
            }
            None => {
                self.error(loc, "can't find function name", &function.name, "");
                self.current_function_ret = Some(Type::new(BasicType::Void));
            }
        }
        self.function_returns_value = false;

        if function.name == "main" {
            if !function.params.is_empty() {
                self.error(loc, "function cannot take any parameter(s)", "main", "");
            }
            if function.return_ty.basic != BasicType::Void {
                let token = function.return_ty.complete_string();
                self.error(loc, "", &token, "main function cannot return a value");
            }
            self.unit.add_main_count();
        }

        // scope for the parameters and the body
        self.table.push();

        let mut parameters = None;
        for param in &function.params {
            let node = match &param.name {
                Some(name) => {
                    let variable = Symbol::variable(name, param.ty.clone());
                    match self.table.insert(variable) {
                        Some(handle) => {
                            let ty = self.table.get(handle).ty.clone();
                            self.unit.make_symbol_ref(
                                SymbolTable::unique_id(handle),
                                name,
                                ty,
                                loc,
                            )
                        }
                        None => {
                            self.error(loc, "redefinition", name, "");
                            self.unit.make_symbol_ref(0, name, param.ty.clone(), loc)
                        }
                    }
                }
                // unnamed parameters still occupy a slot
                None => self.unit.make_symbol_ref(0, "", param.ty.clone(), loc),
            };
            parameters = Some(self.unit.grow_aggregate(parameters, Some(node), loc));
        }
        let parameters = self.unit.set_aggregate_op(
            parameters,
            Op::Parameters,
            Type::new(BasicType::Void),
            loc,
        );
        self.loop_nesting = 0;
        parameters
    }

    /// Ends a function definition: missing-return check, the `Function`
    /// aggregate, and scope pop.
    pub fn handle_function_definition_end(
        &mut self,
        loc: Loc,
        function: &FunctionDecl,
        parameters: Handle<Node>,
        body: Option<Handle<Node>>,
    ) -> Handle<Node> {
        if let Some(ret) = &self.current_function_ret {
            if ret.basic != BasicType::Void && !self.function_returns_value {
                self.error(loc, "function does not return a value", &function.name, "");
            }
        }
        let body = match body {
            Some(body) => body,
            None => {
                self.unit
                    .set_aggregate_op(None, Op::Sequence, Type::new(BasicType::Void), loc)
            }
        };
        let definition = self.unit.add_function_definition(
            &function.mangled(),
            function.return_ty.clone(),
            parameters,
            body,
            loc,
        );
        self.table.pop();
        self.current_function_ret = None;
        definition
    }

    // -----------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------

    /// The `.length()` method on arrays, folded to a constant.
    pub fn handle_length_method(
        &mut self,
        loc: Loc,
        method: Handle<Node>,
        has_arguments: bool,
    ) -> Handle<Node> {
        let NodeKind::Method { base, .. } = &self.unit.node(method).kind else {
            self.error(loc, "expected a method", "Internal Error", "");
            return self.unit.recovery_float_zero(loc);
        };
        let base = *base;
        if has_arguments {
            self.error(loc, "method does not accept any arguments", "length", "");
        }
        let base_ty = self.unit.ty(base);
        let length = if !base_ty.is_array() || base_ty.array_size() == 0 {
            self.error(
                loc,
                "",
                "length",
                "array must be declared with a size before using this method",
            );
            1
        } else {
            base_ty.array_size() as i32
        };
        self.unit.make_int_const(length, loc)
    }

    /// A call site: constructor, built-in operation, or user function.
    /// `arguments` is a raw aggregate for several arguments, the bare
    /// node for one, `None` for zero.
    pub fn handle_function_call(
        &mut self,
        loc: Loc,
        call: &FunctionDecl,
        arguments: Option<Handle<Node>>,
    ) -> Handle<Node> {
        if let Some(op) = call.op {
            // constructor; arguments verified algorithmically
            let mut ty = Type::new(BasicType::Void);
            if !self.constructor_error(loc, call, op, &mut ty) {
                let constructed =
                    arguments.and_then(|node| self.add_constructor(loc, node, &ty, op));
                match constructed {
                    Some(node) => return node,
                    None => {
                        let token = ty.complete_string();
                        self.error(loc, "cannot construct with these arguments", &token, "");
                    }
                }
            }
            return self.unit.recovery_float_zero(loc);
        }

        let Some((candidate, builtin)) = self.find_function(loc, call) else {
            return self.unit.recovery_float_zero(loc);
        };

        let symbol = self.table.get(candidate);
        let return_ty = symbol.ty.clone();
        let mangled = symbol.mangled.clone();
        let (params, _, builtin_op) = symbol.as_function().expect("candidate is a function");
        let param_storages: Vec<Storage> = params.iter().map(|p| p.ty.qualifier.storage).collect();
        let unary = params.len() == 1;

        if builtin {
            if let Some(op) = builtin_op {
                let arguments = match arguments {
                    Some(node) => node,
                    None => self.unit.grow_aggregate(None, None, loc),
                };
                return match self.unit.add_builtin_call(loc, op, unary, arguments, return_ty) {
                    Some(node) => node,
                    None => {
                        let extra = format!(
                            "built in unary operator function.  Type: {}",
                            self.unit.ty(arguments).complete_string()
                        );
                        self.error(loc, " wrong operand type", "Internal Error", &extra);
                        self.unit.recovery_float_zero(loc)
                    }
                };
            }
        }

        debug!("call {} resolves to {}", call.name, mangled);
        let result = self
            .unit
            .set_aggregate_op(arguments, Op::FunctionCall, return_ty, loc);
        if let Some(data) = self.unit.aggregate_mut(result) {
            data.name = Some(mangled.clone());
            data.user_defined = !builtin;
        }
        if !builtin {
            let caller = self.current_caller.clone();
            self.unit.add_to_call_graph(&caller, &mangled);
        }

        let sequence: Vec<Handle<Node>> = self.unit.aggregate_sequence(result).to_vec();
        for (i, storage) in param_storages.iter().enumerate() {
            if matches!(storage, Storage::Out | Storage::InOut) {
                if let Some(&argument) = sequence.get(i) {
                    if self.l_value_error_check(loc, "assign", argument) {
                        self.error(
                            loc,
                            "Constant value cannot be passed for 'out' or 'inout' parameters.",
                            "Error",
                            "",
                        );
                    }
                }
            }
        }
        if let Some(data) = self.unit.aggregate_mut(result) {
            data.qualifiers = param_storages;
        }

        if builtin {
            self.non_op_builtin_check(loc, candidate, result);
        }
        result
    }

    /// Extra checks for built-in functions that stay calls (texturing).
    fn non_op_builtin_check(
        &mut self,
        loc: Loc,
        candidate: Handle<crate::symbol::Symbol>,
        call_node: Handle<Node>,
    ) {
        let symbol = self.table.get(candidate);
        let name = symbol.name.clone();
        let return_precision = symbol.ty.qualifier.precision;
        let (params, _, _) = symbol.as_function().expect("builtin function");
        let first_is_sampler = params
            .first()
            .is_some_and(|p| p.ty.basic == BasicType::Sampler);
        let last_param = params.last().map(|p| p.ty.clone());
        let param_count = params.len();

        // texturing results inherit the sampler argument's precision
        if return_precision == Precision::None && first_is_sampler {
            if let Some(&first) = self.unit.aggregate_sequence(call_node).first() {
                let precision = self.unit.ty(first).qualifier.precision;
                let mut ty = self.unit.ty(call_node).clone();
                ty.qualifier.precision = precision;
                self.unit.set_type(call_node, ty);
            }
        }

        if name.starts_with("textureGather") {
            let feature = "texture gather function";
            self.require_profile(loc, ProfileMask::DESKTOP, feature);
            self.profile_requires(
                loc,
                ProfileMask::DESKTOP,
                400,
                Some("GL_ARB_texture_gather"),
                feature,
            );
            let is_component = last_param
                .as_ref()
                .is_some_and(|ty| ty.basic == BasicType::Int && ty.is_scalar());
            if is_component {
                let last = self
                    .unit
                    .aggregate_sequence(call_node)
                    .get(param_count - 1)
                    .copied();
                match last.and_then(|node| self.unit.node(node).as_const().cloned()) {
                    Some(values) => {
                        let value = values.get(0).as_int();
                        if !(0..=3).contains(&value) {
                            self.error(loc, "must be 0, 1, 2, or 3", "texture gather component", "");
                        }
                    }
                    None => {
                        self.error(loc, "must be a constant", "texture gather component", "");
                    }
                }
            }
        }
    }

    /// Overload lookup: exact mangled match first, then a single
    /// candidate reachable through implicit conversions.
    pub fn find_function(
        &mut self,
        loc: Loc,
        call: &FunctionDecl,
    ) -> Option<(Handle<crate::symbol::Symbol>, bool)> {
        let mangled = call.mangled();
        if let Some(found) = self.table.find(&mangled) {
            if self.table.get(found.handle).as_function().is_some() {
                return Some((found.handle, found.builtin));
            }
            self.error(loc, "function name expected", &call.name, "");
            return None;
        }

        let mut viable = Vec::new();
        for handle in self.table.functions_named(&call.name) {
            let symbol = self.table.get(handle);
            let (params, _, _) = symbol.as_function().unwrap();
            if params.len() != call.params.len() {
                continue;
            }
            let ok = params.iter().zip(call.params.iter()).all(|(formal, actual)| {
                convertible_argument(&actual.ty, &formal.ty)
            });
            if ok {
                viable.push(handle);
            }
        }

        match viable.len() {
            0 => {
                self.error(loc, "no matching overloaded function found", &call.name, "");
                None
            }
            1 => {
                let builtin = self.table.get(viable[0]).read_only;
                Some((viable[0], builtin))
            }
            _ => {
                self.error(
                    loc,
                    "ambiguous best function under implicit type conversion",
                    &call.name,
                    "",
                );
                None
            }
        }
    }

    // -----------------------------------------------------------------
    // Constructors
    // -----------------------------------------------------------------

    /// A type used with call syntax.
    pub fn handle_constructor_call(&mut self, loc: Loc, public_type: &PublicType) -> FunctionDecl {
        let mut public_type = public_type.clone();
        public_type.qualifier.precision = Precision::None;
        let mut ty = public_type.to_type();

        if ty.is_array() {
            self.profile_requires(
                loc,
                ProfileMask::NONE,
                120,
                Some("GL_3DL_array_objects"),
                "arrayed constructor",
            );
            self.profile_requires(loc, ProfileMask::ES, 300, None, "arrayed constructor");
        }

        let op = match self.map_type_to_constructor_op(&ty) {
            Some(op) => op,
            None => {
                self.error(loc, "cannot construct this type", ty.basic.basic_string(), "");
                ty = Type::scalar(BasicType::Float, Storage::Temporary);
                Op::ConstructFloat
            }
        };

        FunctionDecl {
            name: String::new(),
            return_ty: ty,
            params: Vec::new(),
            op: Some(op),
        }
    }

    /// The constructor operation for a type, if one exists.
    pub fn map_type_to_constructor_op(&self, ty: &Type) -> Option<Op> {
        if ty.fields.is_some() {
            return Some(Op::ConstructStruct);
        }
        let op = match ty.basic {
            BasicType::Float => {
                if ty.is_matrix() {
                    match (ty.matrix_cols, ty.matrix_rows) {
                        (2, 2) => Op::ConstructMat2x2,
                        (2, 3) => Op::ConstructMat2x3,
                        (2, 4) => Op::ConstructMat2x4,
                        (3, 2) => Op::ConstructMat3x2,
                        (3, 3) => Op::ConstructMat3x3,
                        (3, 4) => Op::ConstructMat3x4,
                        (4, 2) => Op::ConstructMat4x2,
                        (4, 3) => Op::ConstructMat4x3,
                        (4, 4) => Op::ConstructMat4x4,
                        _ => return None,
                    }
                } else {
                    match ty.vector_size {
                        1 => Op::ConstructFloat,
                        2 => Op::ConstructVec2,
                        3 => Op::ConstructVec3,
                        4 => Op::ConstructVec4,
                        _ => return None,
                    }
                }
            }
            BasicType::Double => {
                if ty.is_matrix() {
                    match (ty.matrix_cols, ty.matrix_rows) {
                        (2, 2) => Op::ConstructDMat2x2,
                        (2, 3) => Op::ConstructDMat2x3,
                        (2, 4) => Op::ConstructDMat2x4,
                        (3, 2) => Op::ConstructDMat3x2,
                        (3, 3) => Op::ConstructDMat3x3,
                        (3, 4) => Op::ConstructDMat3x4,
                        (4, 2) => Op::ConstructDMat4x2,
                        (4, 3) => Op::ConstructDMat4x3,
                        (4, 4) => Op::ConstructDMat4x4,
                        _ => return None,
                    }
                } else {
                    match ty.vector_size {
                        1 => Op::ConstructDouble,
                        2 => Op::ConstructDVec2,
                        3 => Op::ConstructDVec3,
                        4 => Op::ConstructDVec4,
                        _ => return None,
                    }
                }
            }
            BasicType::Int => match ty.vector_size {
                1 => Op::ConstructInt,
                2 => Op::ConstructIVec2,
                3 => Op::ConstructIVec3,
                4 => Op::ConstructIVec4,
                _ => return None,
            },
            BasicType::Uint => match ty.vector_size {
                1 => Op::ConstructUint,
                2 => Op::ConstructUVec2,
                3 => Op::ConstructUVec3,
                4 => Op::ConstructUVec4,
                _ => return None,
            },
            BasicType::Bool => match ty.vector_size {
                1 => Op::ConstructBool,
                2 => Op::ConstructBVec2,
                3 => Op::ConstructBVec3,
                4 => Op::ConstructBVec4,
                _ => return None,
            },
            _ => return None,
        };
        Some(op)
    }

    /// Checks that a constructor call has a legal argument list.
    /// Returns true (diagnosed) on error; `ty` receives the constructed
    /// type, marked `const` when every argument is constant.
    pub fn constructor_error(
        &mut self,
        loc: Loc,
        call: &FunctionDecl,
        op: Op,
        ty: &mut Type,
    ) -> bool {
        *ty = call.return_ty.clone();
        let constructing_matrix = op.is_matrix_constructor();

        let mut size = 0;
        let mut const_type = true;
        let mut full = false;
        let mut over_full = false;
        let mut matrix_in_matrix = false;
        let mut array_arg = false;
        for param in &call.params {
            size += param.ty.object_size();
            if constructing_matrix && param.ty.is_matrix() {
                matrix_in_matrix = true;
            }
            if full {
                over_full = true;
            }
            if op != Op::ConstructStruct && !ty.is_array() && size >= ty.object_size() {
                full = true;
            }
            if param.ty.qualifier.storage != Storage::Const {
                const_type = false;
            }
            if param.ty.is_array() {
                array_arg = true;
            }
        }

        if const_type {
            ty.qualifier.storage = Storage::Const;
        }

        if ty.is_array() {
            if ty.array_size() == 0 {
                // adapt an unsized constructor to its argument count
                ty.change_array_size(call.params.len() as u32);
            } else if ty.array_size() as usize != call.params.len() {
                self.error(
                    loc,
                    "array constructor needs one argument per array element",
                    "constructor",
                    "",
                );
                return true;
            }
        }

        if array_arg && op != Op::ConstructStruct {
            self.error(loc, "constructing from a non-dereferenced array", "constructor", "");
            return true;
        }

        if matrix_in_matrix {
            if ty.is_array() {
                // arrays of matrices cannot be built from matrices
                self.error(loc, "constructing matrix from matrix", "constructor", "");
                return true;
            }
            self.profile_requires(loc, ProfileMask::NONE, 120, None, "constructing matrix from matrix");
            return false;
        }

        if over_full {
            self.error(loc, "too many arguments", "constructor", "");
            return true;
        }

        if op == Op::ConstructStruct && !ty.is_array() {
            let member_count = ty.fields.as_ref().map_or(0, |f| f.len());
            if member_count != call.params.len() {
                self.error(
                    loc,
                    "Number of constructor parameters does not match the number of structure fields",
                    "constructor",
                    "",
                );
                return true;
            }
        }

        if (op != Op::ConstructStruct && size != 1 && size < ty.object_size())
            || (op == Op::ConstructStruct && size < ty.object_size())
        {
            self.error(loc, "not enough data provided for construction", "constructor", "");
            return true;
        }

        for param in &call.params {
            if op != Op::ConstructStruct && param.ty.basic == BasicType::Sampler {
                self.error(loc, "cannot convert a sampler", "constructor", "");
                return true;
            }
            if param.ty.basic == BasicType::Void {
                self.error(loc, "cannot convert a void", "constructor", "");
                return true;
            }
        }

        false
    }

    /// Builds the constructor node, converting each argument to the
    /// element (or member) type and folding fully-constant argument
    /// lists.
    pub fn add_constructor(
        &mut self,
        loc: Loc,
        node: Handle<Node>,
        ty: &Type,
        op: Op,
    ) -> Option<Handle<Node>> {
        let children: Vec<Handle<Node>> = match self.unit.node(node).as_aggregate() {
            Some(data) if data.op.is_none() => data.sequence.clone(),
            _ => vec![node],
        };
        if children.is_empty() {
            return None;
        }

        let element_ty = if ty.is_array() {
            let mut element = ty.dereferenced();
            element.qualifier.storage = Storage::Temporary;
            element
        } else {
            ty.clone()
        };
        let fields = ty.fields.clone();

        let mut converted = Vec::with_capacity(children.len());
        for (i, &child) in children.iter().enumerate() {
            let new_child = if ty.is_array() {
                self.construct_struct(child, &element_ty, i + 1, loc)?
            } else if op == Op::ConstructStruct {
                let field_ty = fields.as_ref()?.get(i)?.ty.clone();
                self.construct_struct(child, &field_ty, i + 1, loc)?
            } else {
                self.construct_builtin(op, child, loc)?
            };
            converted.push(new_child);
        }

        // fold a fully-constant argument list
        let child_is_matrix = converted
            .iter()
            .any(|&c| self.unit.ty(c).is_matrix());
        let foldable = !(constructing_matrix(op) && child_is_matrix)
            && converted.iter().all(|&c| self.unit.node(c).is_const());
        if foldable {
            if let Some(values) = self.fold_constructor(&converted, ty, op) {
                let mut const_ty = ty.clone();
                const_ty.qualifier.storage = Storage::Const;
                return Some(self.unit.make_const(values, const_ty, loc));
            }
        }

        if converted.len() == 1 && !ty.is_array() && op != Op::ConstructStruct {
            let only = converted[0];
            if self.unit.ty(only).same_type(ty) {
                return Some(only);
            }
        }

        let mut list = None;
        for &child in &converted {
            list = Some(self.unit.grow_aggregate(list, Some(child), loc));
        }
        Some(self.unit.set_aggregate_op(list, op, ty.clone(), loc))
    }

    fn fold_constructor(
        &self,
        children: &[Handle<Node>],
        ty: &Type,
        op: Op,
    ) -> Option<ConstArray> {
        let total = ty.object_size() as usize;
        if total == 0 {
            return None;
        }

        // single scalar argument: smear, or the diagonal of a matrix
        if children.len() == 1 && op != Op::ConstructStruct && !ty.is_array() {
            let values = self.unit.node(children[0]).as_const()?;
            if values.len() == 1 {
                let scalar = values.get(0);
                if ty.is_matrix() {
                    let (cols, rows) = (ty.matrix_cols as usize, ty.matrix_rows as usize);
                    let zero = ConstValue::Double(0.0);
                    let mut out = vec![zero; cols * rows];
                    for c in 0..cols.min(rows) {
                        out[c * rows + c] = scalar;
                    }
                    return Some(ConstArray::new(out));
                }
                return Some(ConstArray::new(vec![scalar; total]));
            }
        }

        let mut out = Vec::with_capacity(total);
        for &child in children {
            let values = self.unit.node(child).as_const()?;
            out.extend(values.iter());
        }
        if out.len() < total {
            return None;
        }
        out.truncate(total);
        Some(ConstArray::new(out))
    }

    /// Converts one constructor argument to the constructed element
    /// kind.
    fn construct_builtin(&mut self, op: Op, node: Handle<Node>, loc: Loc) -> Option<Handle<Node>> {
        use Op::*;
        let basic_op = match op {
            ConstructVec2 | ConstructVec3 | ConstructVec4 | ConstructMat2x2 | ConstructMat2x3
            | ConstructMat2x4 | ConstructMat3x2 | ConstructMat3x3 | ConstructMat3x4
            | ConstructMat4x2 | ConstructMat4x3 | ConstructMat4x4 | ConstructFloat => ConstructFloat,
            ConstructDVec2 | ConstructDVec3 | ConstructDVec4 | ConstructDMat2x2
            | ConstructDMat2x3 | ConstructDMat2x4 | ConstructDMat3x2 | ConstructDMat3x3
            | ConstructDMat3x4 | ConstructDMat4x2 | ConstructDMat4x3 | ConstructDMat4x4
            | ConstructDouble => ConstructDouble,
            ConstructIVec2 | ConstructIVec3 | ConstructIVec4 | ConstructInt => ConstructInt,
            ConstructUVec2 | ConstructUVec3 | ConstructUVec4 | ConstructUint => ConstructUint,
            ConstructBVec2 | ConstructBVec3 | ConstructBVec4 | ConstructBool => ConstructBool,
            _ => {
                self.error(loc, "unsupported construction", "", "");
                return None;
            }
        };
        match self.unit.add_unary_math(basic_op, node, loc) {
            Some(converted) => Some(converted),
            None => {
                self.error(loc, "can't convert", "constructor", "");
                None
            }
        }
    }

    /// Converts one argument of a struct or array constructor to the
    /// member type; only implicit conversions apply.
    fn construct_struct(
        &mut self,
        node: Handle<Node>,
        member_ty: &Type,
        param_index: usize,
        loc: Loc,
    ) -> Option<Handle<Node>> {
        let converted = self.unit.add_conversion(Op::ConstructStruct, member_ty, node);
        match converted {
            Some(converted) if self.unit.ty(converted).same_type(member_ty) => Some(converted),
            _ => {
                let from = self.unit.ty(node).complete_string();
                let to = member_ty.complete_string();
                let extra =
                    format!("cannot convert parameter {param_index} from '{from}' to '{to}'");
                self.error(loc, "", "constructor", &extra);
                None
            }
        }
    }
}

fn constructing_matrix(op: Op) -> bool {
    op.is_matrix_constructor()
}

/// An actual argument matches a formal parameter when the shapes agree
/// and the basic type is identical or implicitly widenable.
fn convertible_argument(from: &Type, to: &Type) -> bool {
    if from.same_type(to) {
        return true;
    }
    if from.is_array() || to.is_array() || from.fields.is_some() || to.fields.is_some() {
        return false;
    }
    if from.vector_size != to.vector_size
        || from.matrix_cols != to.matrix_cols
        || from.matrix_rows != to.matrix_rows
        || from.sampler != to.sampler
    {
        return false;
    }
    implicit_promote(from.basic, to.basic)
}

fn implicit_promote(from: BasicType, to: BasicType) -> bool {
    matches!(
        (from, to),
        (BasicType::Int, BasicType::Uint)
            | (BasicType::Int, BasicType::Float)
            | (BasicType::Uint, BasicType::Float)
            | (BasicType::Int, BasicType::Double)
            | (BasicType::Uint, BasicType::Double)
            | (BasicType::Float, BasicType::Double)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{Options, Stage};

    fn ctx() -> ParseContext {
        let mut ctx = ParseContext::new(Options::new(330, Profile::Core, Stage::Vertex));
        ctx.table.seal_builtins();
        ctx
    }

    fn float_const(ctx: &mut ParseContext, v: f64) -> Handle<Node> {
        ctx.unit.make_float_const(v, Loc::default())
    }

    fn call_with_consts(ctx: &mut ParseContext, ty: &Type, values: &[f64]) -> FunctionDecl {
        let mut call = FunctionDecl::new("", ty.clone());
        call.op = ctx.map_type_to_constructor_op(ty);
        for _ in values {
            call.params.push(Param {
                name: None,
                ty: Type::scalar(BasicType::Float, Storage::Const),
            });
        }
        call
    }

    #[test]
    fn vec3_constructor_folds() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let ty = Type::vector(BasicType::Float, Storage::Temporary, 3);
        let call = call_with_consts(&mut ctx, &ty, &[1.0, 2.0, 3.0]);

        let mut out_ty = Type::new(BasicType::Void);
        assert!(!ctx.constructor_error(loc, &call, Op::ConstructVec3, &mut out_ty));
        assert_eq!(out_ty.qualifier.storage, Storage::Const);

        let a = float_const(&mut ctx, 1.0);
        let b = float_const(&mut ctx, 2.0);
        let c = float_const(&mut ctx, 3.0);
        let list = ctx.unit.grow_aggregate(None, Some(a), loc);
        let list = ctx.unit.grow_aggregate(Some(list), Some(b), loc);
        let list = ctx.unit.grow_aggregate(Some(list), Some(c), loc);

        let node = ctx
            .add_constructor(loc, list, &out_ty, Op::ConstructVec3)
            .expect("constructed");
        let values = ctx.unit.node(node).as_const().expect("folded");
        assert_eq!(values.len(), 3);
        assert_eq!(values.get(2).as_double(), 3.0);
        assert_eq!(ctx.error_count(), 0);
    }

    #[test]
    fn scalar_smear_and_matrix_diagonal() {
        let mut ctx = ctx();
        let loc = Loc::default();

        let vec4 = Type::vector(BasicType::Float, Storage::Temporary, 4);
        let zero = float_const(&mut ctx, 0.0);
        let node = ctx
            .add_constructor(loc, zero, &vec4, Op::ConstructVec4)
            .unwrap();
        let values = ctx.unit.node(node).as_const().unwrap();
        assert_eq!(values.len(), 4);
        assert!(values.iter().all(|v| v.as_double() == 0.0));

        let mat2 = Type::matrix(BasicType::Float, Storage::Temporary, 2, 2);
        let one = float_const(&mut ctx, 1.0);
        let node = ctx
            .add_constructor(loc, one, &mat2, Op::ConstructMat2x2)
            .unwrap();
        let values = ctx.unit.node(node).as_const().unwrap();
        assert_eq!(values.to_vec(), vec![
            ConstValue::Double(1.0),
            ConstValue::Double(0.0),
            ConstValue::Double(0.0),
            ConstValue::Double(1.0),
        ]);
    }

    #[test]
    fn too_many_arguments_rejected() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let ty = Type::vector(BasicType::Float, Storage::Temporary, 2);
        let call = call_with_consts(&mut ctx, &ty, &[1.0, 2.0, 3.0]);
        let mut out_ty = Type::new(BasicType::Void);
        assert!(ctx.constructor_error(loc, &call, Op::ConstructVec2, &mut out_ty));
        assert!(ctx.sink.text().contains("too many arguments"));
    }

    #[test]
    fn not_enough_data_rejected() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let ty = Type::vector(BasicType::Float, Storage::Temporary, 3);
        let call = call_with_consts(&mut ctx, &ty, &[1.0, 2.0]);
        let mut out_ty = Type::new(BasicType::Void);
        assert!(ctx.constructor_error(loc, &call, Op::ConstructVec3, &mut out_ty));
        assert!(ctx.sink.text().contains("not enough data provided"));
    }

    #[test]
    fn void_and_sampler_arguments_rejected() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let ty = Type::vector(BasicType::Float, Storage::Temporary, 2);
        let mut call = FunctionDecl::new("", ty);
        call.op = Some(Op::ConstructVec2);
        call.params.push(Param {
            name: None,
            ty: Type::new(BasicType::Void),
        });
        let mut out_ty = Type::new(BasicType::Void);
        assert!(ctx.constructor_error(loc, &call, Op::ConstructVec2, &mut out_ty));
        assert!(ctx.sink.text().contains("cannot convert a void"));
    }

    #[test]
    fn unsized_array_constructor_adapts() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let mut ty = Type::scalar(BasicType::Float, Storage::Temporary);
        ty.set_array_sizes(glaze_hir::ArraySizes::unspecified());
        let call = call_with_consts(&mut ctx, &ty, &[1.0, 2.0, 3.0]);
        let mut out_ty = Type::new(BasicType::Void);
        assert!(!ctx.constructor_error(loc, &call, Op::ConstructStruct, &mut out_ty));
        assert_eq!(out_ty.array_size(), 3);
    }

    #[test]
    fn length_method_folds() {
        let mut ctx = ctx();
        let loc = Loc::default();
        let mut ty = Type::scalar(BasicType::Float, Storage::Temporary);
        ty.set_array_sizes(glaze_hir::ArraySizes::sized(7));
        let base = ctx.unit.make_symbol_ref(1, "a", ty, loc);
        let method = ctx.handle_dot_dereference(loc, base, "length");
        let folded = ctx.handle_length_method(loc, method, false);
        let values = ctx.unit.node(folded).as_const().unwrap();
        assert_eq!(values.get(0).as_int(), 7);
    }
}
