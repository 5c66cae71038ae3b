//! Declarations: qualifier merging, variables and arrays, built-in
//! redeclaration, initializers (including brace lists), interface
//! blocks, qualifier defaults, and layout checking.

use std::rc::Rc;

use glaze_hir::{
    ArraySizes, BasicType, Field, Handle, LayoutMatrix, LayoutPacking, Loc, Node, Op, Precision,
    Qualifier, Storage, Type,
};
use log::debug;

use crate::context::{ParseContext, PublicType};
use crate::options::{Profile, ProfileMask, Stage, StageMask};
use crate::symbol::{Symbol, SymbolKind, SymbolTable};

impl ParseContext {
    // -----------------------------------------------------------------
    // Qualifier merging
    // -----------------------------------------------------------------

    /// Merge `src` into `dst`. With `force` false, `src` is assumed to
    /// follow `dst` in the source, and pre-420 ordering rules apply.
    pub fn merge_qualifiers(
        &mut self,
        loc: Loc,
        dst: &mut Qualifier,
        src: &Qualifier,
        force: bool,
    ) {
        if src.is_auxiliary() && dst.is_auxiliary() {
            self.error(
                loc,
                "can only have one auxiliary qualifier (centroid, patch, and sample)",
                "",
                "",
            );
        }
        if src.is_interpolation() && dst.is_interpolation() {
            self.error(
                loc,
                "can only have one interpolation qualifier (flat, smooth, noperspective)",
                "",
                "",
            );
        }

        if !force && self.version < 420 {
            if src.invariant
                && (dst.is_interpolation()
                    || dst.is_auxiliary()
                    || dst.storage != Storage::Temporary
                    || dst.precision != Precision::None)
            {
                self.error(loc, "invariant qualifier must appear first", "", "");
            } else if src.is_interpolation()
                && (dst.is_auxiliary()
                    || dst.storage != Storage::Temporary
                    || dst.precision != Precision::None)
            {
                self.error(
                    loc,
                    "interpolation qualifiers must appear before storage and precision qualifiers",
                    "",
                    "",
                );
            } else if src.is_auxiliary()
                && (dst.storage != Storage::Temporary || dst.precision != Precision::None)
            {
                self.error(
                    loc,
                    "Auxiliary qualifiers (centroid, patch, and sample) must appear before storage and precision qualifiers",
                    "",
                    "",
                );
            } else if src.storage != Storage::Temporary && dst.precision != Precision::None {
                self.error(loc, "precision qualifier must appear as last qualifier", "", "");
            }

            if src.storage == Storage::Const
                && matches!(dst.storage, Storage::In | Storage::Out)
            {
                self.error(loc, "in/out must appear before const", "", "");
            }
        }

        // storage
        if matches!(dst.storage, Storage::Temporary | Storage::Global) {
            dst.storage = src.storage;
        } else if (dst.storage == Storage::In && src.storage == Storage::Out)
            || (dst.storage == Storage::Out && src.storage == Storage::In)
        {
            dst.storage = Storage::InOut;
        } else if (dst.storage == Storage::In && src.storage == Storage::Const)
            || (dst.storage == Storage::Const && src.storage == Storage::In)
        {
            dst.storage = Storage::ConstReadOnly;
        } else if src.storage != Storage::Temporary {
            self.error(loc, "too many storage qualifiers", src.storage.as_str(), "");
        }

        // precision
        if !force && src.precision != Precision::None && dst.precision != Precision::None {
            self.error(
                loc,
                "only one precision qualifier allowed",
                src.precision.as_str(),
                "",
            );
        }
        if dst.precision == Precision::None || (force && src.precision != Precision::None) {
            dst.precision = src.precision;
        }

        dst.merge_layout(src);

        // individual flags
        let mut repeated = false;
        macro_rules! merge_singleton {
            ($field:ident) => {
                repeated |= dst.$field && src.$field;
                dst.$field |= src.$field;
            };
        }
        merge_singleton!(invariant);
        merge_singleton!(centroid);
        merge_singleton!(smooth);
        merge_singleton!(flat);
        merge_singleton!(nopersp);
        merge_singleton!(patch);
        merge_singleton!(sample);
        merge_singleton!(shared);
        merge_singleton!(coherent);
        merge_singleton!(volatil);
        merge_singleton!(restrict);
        merge_singleton!(readonly);
        merge_singleton!(writeonly);
        if repeated {
            self.error(loc, "replicated qualifiers", "", "");
        }
    }

    /// Rewrites parameter-style in/out into pipeline in/out at global
    /// scope.
    pub fn pipe_in_out_fix(&mut self, loc: Loc, qualifier: &mut Qualifier) {
        match qualifier.storage {
            Storage::In => {
                self.profile_requires(loc, ProfileMask::NONE, 130, None, "in for stage inputs");
                self.profile_requires(loc, ProfileMask::ES, 300, None, "in for stage inputs");
                qualifier.storage = Storage::VaryingIn;
            }
            Storage::Out => {
                self.profile_requires(loc, ProfileMask::NONE, 130, None, "out for stage outputs");
                self.profile_requires(loc, ProfileMask::ES, 300, None, "out for stage outputs");
                qualifier.storage = Storage::VaryingOut;
            }
            Storage::InOut => {
                qualifier.storage = Storage::VaryingIn;
                self.error(loc, "cannot use 'inout' at global scope", "", "");
            }
            _ => {}
        }
    }

    /// Stage-dependent legality of global declarations.
    pub fn global_qualifier_check(
        &mut self,
        loc: Loc,
        qualifier: &Qualifier,
        public_type: &PublicType,
    ) {
        if !self.table.at_global_level() {
            return;
        }

        if qualifier.storage != Storage::Uniform
            && self.sampler_error_check(loc, public_type, "samplers and images must be uniform")
        {
            return;
        }

        if qualifier.storage != Storage::VaryingIn && qualifier.storage != Storage::VaryingOut {
            return;
        }

        if public_type.basic == BasicType::Bool {
            self.error(loc, "cannot be bool", qualifier.storage.as_str(), "");
            return;
        }

        if self.stage == Stage::Vertex && qualifier.storage == Storage::VaryingIn {
            if public_type.basic == BasicType::Struct {
                self.error(loc, "cannot be a structure or array", qualifier.storage.as_str(), "");
                return;
            }
            if public_type.array.is_some() {
                self.require_profile(loc, ProfileMask::DESKTOP, "vertex input arrays");
                self.profile_requires(loc, ProfileMask::NONE, 150, None, "vertex input arrays");
            }
        }

        if self.stage == Stage::Fragment && qualifier.storage == Storage::VaryingOut {
            self.profile_requires(loc, ProfileMask::ES, 300, None, "fragment shader output");
            if public_type.basic == BasicType::Struct {
                self.error(loc, "cannot be a structure", qualifier.storage.as_str(), "");
                return;
            }
        }

        if matches!(
            public_type.basic,
            BasicType::Int | BasicType::Uint | BasicType::Double
        ) {
            self.profile_requires(loc, ProfileMask::ES, 300, None, "shader input/output");
            if !qualifier.flat {
                if qualifier.storage == Storage::VaryingIn && self.stage == Stage::Fragment {
                    self.error(
                        loc,
                        "must be qualified as flat",
                        public_type.basic.basic_string(),
                        qualifier.storage.as_str(),
                    );
                } else if qualifier.storage == Storage::VaryingOut
                    && self.stage == Stage::Vertex
                    && self.version == 300
                {
                    self.error(
                        loc,
                        "must be qualified as flat",
                        public_type.basic.basic_string(),
                        qualifier.storage.as_str(),
                    );
                }
            }
        }

        if self.stage == Stage::Vertex
            && qualifier.storage == Storage::VaryingIn
            && (qualifier.is_auxiliary()
                || qualifier.is_interpolation()
                || qualifier.is_memory()
                || qualifier.invariant)
        {
            self.error(loc, "vertex input cannot be further qualified", "", "");
        }
    }

    /// True (and diagnosed) when the type is or contains a sampler.
    pub fn sampler_error_check(
        &mut self,
        loc: Loc,
        public_type: &PublicType,
        reason: &str,
    ) -> bool {
        if public_type.basic == BasicType::Struct {
            let contains = public_type
                .fields
                .as_ref()
                .is_some_and(|fields| fields.iter().any(|f| f.ty.contains_sampler()));
            if contains {
                self.error(
                    loc,
                    reason,
                    public_type.basic.basic_string(),
                    "(structure cannot contain a sampler or image)",
                );
                return true;
            }
            return false;
        }
        if public_type.basic == BasicType::Sampler {
            self.error(loc, reason, public_type.basic.basic_string(), "");
            return true;
        }
        false
    }

    pub fn void_error_check(&mut self, loc: Loc, identifier: &str, basic: BasicType) -> bool {
        if basic == BasicType::Void {
            self.error(loc, "illegal use of type 'void'", identifier, "");
            return true;
        }
        false
    }

    fn non_init_const_check(&mut self, loc: Loc, identifier: &str, ty: &mut Type) {
        if matches!(
            ty.qualifier.storage,
            Storage::Const | Storage::ConstReadOnly
        ) {
            ty.qualifier.storage = Storage::Temporary;
            self.error(
                loc,
                "variables with qualifier 'const' must be initialized",
                identifier,
                "",
            );
        }
    }

    /// Normalize a parameter's storage qualifier.
    pub fn param_check(&mut self, loc: Loc, storage: Storage, ty: &mut Type) {
        match storage {
            Storage::Const | Storage::ConstReadOnly => {
                ty.qualifier.storage = Storage::ConstReadOnly;
            }
            Storage::In | Storage::Out | Storage::InOut => ty.qualifier.storage = storage,
            Storage::Temporary => ty.qualifier.storage = Storage::In,
            other => {
                ty.qualifier.storage = Storage::In;
                self.error(
                    loc,
                    "qualifier not allowed on function parameter",
                    other.as_str(),
                    "",
                );
            }
        }
    }

    pub fn parameter_sampler_check(&mut self, loc: Loc, storage: Storage, ty: &Type) {
        if matches!(storage, Storage::Out | Storage::InOut) && ty.basic == BasicType::Sampler {
            let token = ty.complete_string();
            self.error(loc, "samplers cannot be output parameters", &token, "");
        }
    }

    // -----------------------------------------------------------------
    // Arrays
    // -----------------------------------------------------------------

    /// Evaluates an array-size expression to a positive constant.
    pub fn array_size_check(&mut self, expr: Handle<Node>) -> u32 {
        let node = self.unit.node(expr);
        let loc = node.loc;
        let value = match node.as_const() {
            Some(values) if matches!(node.ty.basic, BasicType::Int | BasicType::Uint) => {
                values.get(0).as_int()
            }
            _ => {
                self.error(loc, "array size must be a constant integer expression", "", "");
                return 1;
            }
        };
        if value <= 0 {
            self.error(loc, "array size must be a positive integer", "", "");
            return 1;
        }
        value as u32
    }

    pub fn array_qualifier_error(&mut self, loc: Loc, qualifier: &Qualifier) -> bool {
        if qualifier.storage == Storage::Const {
            self.profile_requires(
                loc,
                ProfileMask::NONE,
                120,
                Some("GL_3DL_array_objects"),
                "const array",
            );
            self.profile_requires(loc, ProfileMask::ES, 300, None, "const array");
        }
        if qualifier.storage == Storage::VaryingIn && self.stage == Stage::Vertex {
            self.require_profile(loc, ProfileMask::DESKTOP, "vertex input arrays");
            self.profile_requires(loc, ProfileMask::NONE, 150, None, "vertex input arrays");
        }
        false
    }

    pub fn array_size_required_check(&mut self, loc: Loc, size: u32) {
        if size == 0 {
            self.error(loc, "array size required", "", "");
        }
    }

    /// Arrays of arrays arrived in 430.
    pub fn array_dim_check(&mut self, loc: Loc, already_array: bool) {
        if already_array {
            self.require_profile(loc, ProfileMask::CORE_AND_COMPATIBILITY, "arrays of arrays");
            self.profile_requires(
                loc,
                ProfileMask::CORE_AND_COMPATIBILITY,
                430,
                None,
                "arrays of arrays",
            );
        }
    }

    // -----------------------------------------------------------------
    // Struct and block nesting
    // -----------------------------------------------------------------

    pub fn nested_struct_check(&mut self, loc: Loc) {
        if self.struct_nesting > 0 {
            self.error(
                loc,
                "cannot nest a structure definition inside a structure or block",
                "",
                "",
            );
        }
        self.struct_nesting += 1;
    }

    pub fn nested_block_check(&mut self, loc: Loc) {
        if self.struct_nesting > 0 {
            self.error(
                loc,
                "cannot nest a block definition inside a structure or block",
                "",
                "",
            );
        }
        self.struct_nesting += 1;
    }

    pub fn nesting_done(&mut self) {
        self.struct_nesting = self.struct_nesting.saturating_sub(1);
    }

    // -----------------------------------------------------------------
    // Variable declarations
    // -----------------------------------------------------------------

    /// Everything needed to declare one (non-block) variable. Returns
    /// the initializer subtree when there is code to execute.
    pub fn declare_variable(
        &mut self,
        loc: Loc,
        identifier: &str,
        public_type: &PublicType,
        array_sizes: Option<ArraySizes>,
        initializer: Option<Handle<Node>>,
    ) -> Option<Handle<Node>> {
        let mut ty = public_type.to_type();
        if self.table.at_global_level() && ty.qualifier.storage == Storage::Temporary {
            ty.qualifier.storage = Storage::Global;
        }

        if self.void_error_check(loc, identifier, ty.basic) {
            return None;
        }
        if initializer.is_none() {
            self.non_init_const_check(loc, identifier, &mut ty);
        }

        let mut new_declaration = false;
        let mut symbol = self.redeclare_builtin(loc, identifier, &mut new_declaration);
        if symbol.is_none() {
            self.reserved_error_check(loc, identifier);
        }

        if let Some(sizes) = array_sizes {
            // es needs an explicit size unless an initializer supplies one
            if self.profile == Profile::Es && initializer.is_none() {
                self.array_size_required_check(loc, sizes.size());
            }
            self.array_dim_check(loc, ty.is_array());
            if !self.array_qualifier_error(loc, &ty.qualifier) {
                ty.set_array_sizes(sizes);
                symbol = self.declare_array(loc, identifier, &ty, symbol, &mut new_declaration);
            }
            if initializer.is_some() {
                self.profile_requires(
                    loc,
                    ProfileMask::NONE,
                    120,
                    Some("GL_3DL_array_objects"),
                    "initializer",
                );
                self.profile_requires(loc, ProfileMask::ES, 300, None, "initializer");
            }
        } else if symbol.is_none() {
            symbol = self.declare_non_array(loc, identifier, &ty, &mut new_declaration);
        }

        let mut init_node = None;
        if let (Some(symbol), Some(initializer)) = (symbol, initializer) {
            if !self.table.get(symbol).is_variable() {
                self.error(loc, "initializer requires a variable, not a member", identifier, "");
                return None;
            }
            init_node = self.execute_initializer(loc, identifier, initializer, symbol);
        }

        if let Some(symbol) = symbol {
            self.layout_check(loc, symbol);
            if new_declaration && self.table.at_global_level() {
                let sym = self.table.get(symbol);
                let (name, sym_ty) = (sym.name.clone(), sym.ty.clone());
                self.unit
                    .add_linkage_symbol(SymbolTable::unique_id(symbol), &name, sym_ty, loc);
            }
        }

        init_node
    }

    fn declare_non_array(
        &mut self,
        loc: Loc,
        identifier: &str,
        ty: &Type,
        new_declaration: &mut bool,
    ) -> Option<Handle<crate::symbol::Symbol>> {
        let variable = Symbol::variable(identifier, ty.clone());
        match self.table.insert(variable) {
            Some(handle) => {
                *new_declaration = true;
                Some(handle)
            }
            None => {
                self.error(loc, "redefinition", identifier, "");
                None
            }
        }
    }

    /// Declares an array, or resizes a previous unsized declaration in
    /// the same scope.
    fn declare_array(
        &mut self,
        loc: Loc,
        identifier: &str,
        ty: &Type,
        symbol: Option<Handle<crate::symbol::Symbol>>,
        new_declaration: &mut bool,
    ) -> Option<Handle<crate::symbol::Symbol>> {
        let symbol = match symbol {
            Some(symbol) => symbol,
            None => match self.table.find(identifier) {
                Some(found) if found.current_scope => {
                    if matches!(
                        self.table.get(found.handle).kind,
                        SymbolKind::AnonMember { .. }
                    ) {
                        self.error(loc, "cannot redeclare a user-block member array", identifier, "");
                        return None;
                    }
                    found.handle
                }
                // a new declaration (possibly hiding an outer scope)
                _ => {
                    let variable = Symbol::variable(identifier, ty.clone());
                    return match self.table.insert(variable) {
                        Some(handle) => {
                            *new_declaration = true;
                            Some(handle)
                        }
                        None => {
                            self.error(loc, "redefinition", identifier, "");
                            None
                        }
                    };
                }
            },
        };

        // redeclaration of an existing name in this scope
        let (is_array, declared_size, same_element) = {
            let existing = &self.table.get(symbol).ty;
            (
                existing.is_array(),
                existing.array_size(),
                existing.same_element_type(ty),
            )
        };
        if !is_array {
            self.error(loc, "redeclaring non-array as array", identifier, "");
            return Some(symbol);
        }
        if declared_size > 0 {
            self.error(loc, "redeclaration of array with size", identifier, "");
            return Some(symbol);
        }
        if !same_element {
            self.error(loc, "redeclaration of array with a different type", identifier, "");
            return Some(symbol);
        }
        self.table.get_mut(symbol).ty.share_array_sizes(ty);
        Some(symbol)
    }

    /// On desktop, some `gl_` names may be redeclared to re-qualify
    /// them; the built-in is copied up to a writable global first.
    fn redeclare_builtin(
        &mut self,
        _loc: Loc,
        identifier: &str,
        new_declaration: &mut bool,
    ) -> Option<Handle<crate::symbol::Symbol>> {
        if self.profile == Profile::Es
            || !identifier.starts_with("gl_")
            || self.table.at_builtin_level()
        {
            return None;
        }

        let version = self.version;
        let redeclarable = match identifier {
            "gl_FragDepth" => version >= 420,
            "gl_PerVertex" | "gl_PerFragment" => version >= 410,
            "gl_FragCoord" => version >= 150,
            "gl_ClipDistance" | "gl_FrontColor" | "gl_BackColor" | "gl_FrontSecondaryColor"
            | "gl_BackSecondaryColor" | "gl_SecondaryColor" => version >= 130,
            "gl_Color" => version >= 130 && self.stage == Stage::Fragment,
            "gl_TexCoord" => true,
            _ => false,
        };
        if !redeclarable {
            return None;
        }

        // absent in this version/profile/stage combination
        let found = self.table.find(identifier)?;
        if found.builtin {
            *new_declaration = true;
            Some(self.table.copy_up(found.handle))
        } else {
            // a redeclaration of a redeclaration reuses the first copy
            Some(found.handle)
        }
    }

    // -----------------------------------------------------------------
    // Initializers
    // -----------------------------------------------------------------

    /// Handles all initializer forms. Returns the assignment subtree,
    /// or `None` when nothing executes (constant initializers).
    pub fn execute_initializer(
        &mut self,
        loc: Loc,
        identifier: &str,
        initializer: Handle<Node>,
        variable: Handle<crate::symbol::Symbol>,
    ) -> Option<Handle<Node>> {
        let mut qualifier = self.table.get(variable).ty.qualifier.storage;
        let allowed = matches!(
            qualifier,
            Storage::Temporary | Storage::Global | Storage::Const
        ) || (qualifier == Storage::Uniform
            && self.profile != Profile::Es
            && self.version >= 120);
        if !allowed {
            self.error(
                loc,
                " cannot initialize this type of qualifier ",
                qualifier.as_str(),
                "",
            );
            return None;
        }

        let variable_ty = self.table.get(variable).ty.clone();
        let Some(initializer) = self.convert_initializer_list(loc, &variable_ty, initializer)
        else {
            // don't leave a const without constant values
            if qualifier == Storage::Const {
                self.table.get_mut(variable).ty.qualifier.storage = Storage::Temporary;
            }
            return None;
        };

        // an unsized array takes its size from the initializer
        let init_ty = self.unit.ty(initializer).clone();
        if init_ty.is_array()
            && init_ty.array_size() > 0
            && variable_ty.is_array()
            && variable_ty.array_size() == 0
        {
            self.table
                .get_mut(variable)
                .ty
                .change_array_size(init_ty.array_size());
        }

        let init_storage = self.unit.storage(initializer);
        if qualifier == Storage::Uniform && init_storage != Storage::Const {
            let extra = format!("'{}'", variable_ty.complete_string());
            self.error(loc, "uniform initializers must be constant", "=", &extra);
            self.table.get_mut(variable).ty.qualifier.storage = Storage::Temporary;
            return None;
        }
        if qualifier == Storage::Const
            && self.table.at_global_level()
            && init_storage != Storage::Const
        {
            let extra = format!("'{}'", variable_ty.complete_string());
            self.error(loc, "global const initializers must be constant", "=", &extra);
            self.table.get_mut(variable).ty.qualifier.storage = Storage::Temporary;
            return None;
        }

        if qualifier == Storage::Const && init_storage != Storage::Const {
            let feature = "non-constant initializer";
            self.require_profile(loc, ProfileMask::CORE_AND_COMPATIBILITY, feature);
            self.profile_requires(
                loc,
                ProfileMask::CORE_AND_COMPATIBILITY,
                420,
                Some("GL_ARB_shading_language_420pack"),
                feature,
            );
            self.table.get_mut(variable).ty.qualifier.storage = Storage::ConstReadOnly;
            qualifier = Storage::ConstReadOnly;
        }

        if qualifier == Storage::Const || qualifier == Storage::Uniform {
            // compile-time tagging with the folded value
            let variable_ty = self.table.get(variable).ty.clone();
            let converted = self.unit.add_conversion(Op::Assign, &variable_ty, initializer);
            let values = converted.and_then(|c| {
                let node = self.unit.node(c);
                if node.ty.same_type(&variable_ty) {
                    node.as_const().cloned()
                } else {
                    None
                }
            });
            match values {
                Some(values) => {
                    debug!("const '{identifier}' tagged with {} components", values.len());
                    self.table.get_mut(variable).set_const_array(values);
                }
                None => {
                    self.error(
                        loc,
                        "non-matching or non-convertible constant type for const initializer",
                        qualifier.as_str(),
                        "",
                    );
                    self.table.get_mut(variable).ty.qualifier.storage = Storage::Temporary;
                }
            }
            return None;
        }

        // ordinary runtime initialization
        let variable_ty = self.table.get(variable).ty.clone();
        let symbol_node = self.unit.make_symbol_ref(
            SymbolTable::unique_id(variable),
            identifier,
            variable_ty,
            loc,
        );
        match self.unit.add_assign(Op::Assign, symbol_node, initializer, loc) {
            Some(node) => Some(node),
            None => {
                let left = self.unit.ty(symbol_node).complete_string();
                let right = self.unit.ty(initializer).complete_string();
                let extra = format!("cannot convert from '{right}' to '{left}'");
                self.error(loc, "", "=", &extra);
                None
            }
        }
    }

    /// Rewrites brace-list initializers into constructor calls by
    /// structurally matching the expected type, bottom up.
    pub fn convert_initializer_list(
        &mut self,
        loc: Loc,
        ty: &Type,
        initializer: Handle<Node>,
    ) -> Option<Handle<Node>> {
        // anything that already carries an operator is constructor-style
        let children = match self.unit.node(initializer).as_aggregate() {
            Some(data) if data.op.is_none() => data.sequence.clone(),
            _ => return Some(initializer),
        };

        let mut children = children;
        if ty.is_array() {
            let mut array_ty = ty.clone();
            // size from the list itself; an unsized target adopts it later
            array_ty.set_array_sizes(ArraySizes::sized(children.len() as u32));
            let element_ty = array_ty.dereferenced();
            for child in &mut children {
                *child = self.convert_initializer_list(loc, &element_ty, *child)?;
            }
            let list = self.rebuild_list(&children, loc);
            let op = self
                .map_type_to_constructor_op(&array_ty)
                .unwrap_or(Op::ConstructStruct);
            return self.add_constructor(loc, list, &array_ty, op);
        }

        if let Some(fields) = ty.fields.clone() {
            if fields.len() != children.len() {
                self.error(loc, "wrong number of structure members", "initializer list", "");
                return None;
            }
            for (child, field) in children.iter_mut().zip(fields.iter()) {
                *child = self.convert_initializer_list(loc, &field.ty, *child)?;
            }
        } else if ty.is_matrix() {
            if ty.matrix_cols as usize != children.len() {
                let extra = ty.complete_string();
                self.error(loc, "wrong number of matrix columns:", "initializer list", &extra);
                return None;
            }
            let column_ty = ty.dereferenced();
            for child in &mut children {
                *child = self.convert_initializer_list(loc, &column_ty, *child)?;
            }
        } else if ty.is_vector() {
            if ty.vector_size as usize != children.len() {
                let extra = ty.complete_string();
                self.error(
                    loc,
                    "wrong vector size (or rows in a matrix column):",
                    "initializer list",
                    &extra,
                );
                return None;
            }
        } else {
            let extra = ty.complete_string();
            self.error(loc, "unexpected initializer-list type:", "initializer list", &extra);
            return None;
        }

        let list = self.rebuild_list(&children, loc);
        let op = self.map_type_to_constructor_op(ty)?;
        self.add_constructor(loc, list, ty, op)
    }

    fn rebuild_list(&mut self, children: &[Handle<Node>], loc: Loc) -> Handle<Node> {
        let mut list = None;
        for &child in children {
            list = Some(self.unit.grow_aggregate(list, Some(child), loc));
        }
        list.unwrap_or_else(|| self.unit.grow_aggregate(None, None, loc))
    }

    // -----------------------------------------------------------------
    // Interface blocks
    // -----------------------------------------------------------------

    /// Registers an interface block: the block-name sentinel, the
    /// (possibly anonymous) instance variable, and the linkage entry.
    /// The grammar stores the block name in `self.block_name` before
    /// calling.
    pub fn add_block(
        &mut self,
        loc: Loc,
        members: Vec<Field>,
        instance_name: Option<&str>,
        array_sizes: Option<ArraySizes>,
    ) {
        let Some(block_name) = self.block_name.take() else {
            self.error(loc, "block name not set", "Internal Error", "");
            return;
        };

        if self.reserved_error_check(loc, &block_name) {
            return;
        }
        if let Some(instance) = instance_name {
            if self.reserved_error_check(loc, instance) {
                return;
            }
        }
        if self.profile == Profile::Es {
            if let Some(sizes) = &array_sizes {
                self.array_size_required_check(loc, sizes.size());
            }
        }

        let block_storage = self.current_block_defaults.storage;
        match block_storage {
            Storage::Buffer => {
                self.require_profile(loc, ProfileMask::CORE_AND_COMPATIBILITY, "buffer block");
                self.profile_requires(loc, ProfileMask::CORE_AND_COMPATIBILITY, 430, None, "buffer block");
            }
            Storage::Uniform => {
                self.profile_requires(loc, ProfileMask::ES, 300, None, "uniform block");
                self.profile_requires(loc, ProfileMask::NONE, 140, None, "uniform block");
            }
            Storage::VaryingIn => {
                self.require_profile(loc, ProfileMask::CORE_AND_COMPATIBILITY, "input block");
            }
            Storage::VaryingOut => {
                self.require_profile(loc, ProfileMask::CORE_AND_COMPATIBILITY, "output block");
            }
            _ => {
                self.error(
                    loc,
                    "only uniform, buffer, in, or out blocks are supported",
                    &block_name,
                    "",
                );
                return;
            }
        }

        // member qualifier fixing and checks
        let mut members = members;
        for member in &mut members {
            let member_loc = member.loc;
            let field_name = member
                .ty
                .field_name
                .as_deref()
                .unwrap_or_default()
                .to_owned();
            let mut qualifier = member.ty.qualifier;
            self.pipe_in_out_fix(member_loc, &mut qualifier);
            member.ty.qualifier = qualifier;
            if !matches!(qualifier.storage, Storage::Temporary | Storage::Global)
                && qualifier.storage != block_storage
            {
                self.error(
                    member_loc,
                    "member storage qualifier cannot contradict block storage qualifier",
                    &field_name,
                    "",
                );
            }
            if (block_storage == Storage::Uniform && qualifier.is_interpolation())
                || qualifier.is_auxiliary()
            {
                self.error(
                    member_loc,
                    "member of uniform block cannot have an auxiliary or interpolation qualifier",
                    &field_name,
                    "",
                );
            }
            if member.ty.basic == BasicType::Sampler {
                self.error(
                    member_loc,
                    "member of block cannot be a sampler type",
                    &field_name,
                    "",
                );
            }
        }

        // merge the stage defaults into each member
        let mut default_qualification = match block_storage {
            Storage::Buffer => self.global_buffer_defaults,
            Storage::Uniform => self.global_uniform_defaults,
            Storage::VaryingIn => self.global_input_defaults,
            Storage::VaryingOut => self.global_output_defaults,
            _ => Qualifier::default(),
        };
        default_qualification.merge_layout(&self.current_block_defaults);
        for member in &mut members {
            let mut merged = default_qualification;
            let member_qualifier = member.ty.qualifier;
            self.merge_qualifiers(loc, &mut merged, &member_qualifier, false);
            member.ty.qualifier = merged;
        }

        let mut block_qualifier = self.current_block_defaults;
        block_qualifier.layout_packing = default_qualification.layout_packing;
        let mut block_ty = Type::block(Rc::new(members), &block_name, block_qualifier);
        if let Some(sizes) = array_sizes {
            block_ty.set_array_sizes(sizes);
        }

        // reserve the block name itself; it is not a general type name
        let sentinel = Symbol::variable(&block_name, Type::new(BasicType::Block));
        if self.table.insert(sentinel).is_none() {
            let existing = self.table.find(&block_name);
            let clashes = existing
                .map(|found| self.table.get(found.handle).ty.basic != BasicType::Block)
                .unwrap_or(true);
            if clashes {
                self.error(loc, "block name cannot redefine a non-block name", &block_name, "");
                return;
            }
        }

        let instance = instance_name.unwrap_or("");
        let variable = Symbol::variable(instance, block_ty.clone());
        let Some(var_handle) = self.table.insert(variable) else {
            if instance.is_empty() {
                self.error(
                    loc,
                    "nameless block contains a member that already has a name at global scope",
                    &block_name,
                    "",
                );
            } else {
                self.error(loc, "block instance name redefinition", instance, "");
            }
            return;
        };

        // anonymous members become directly visible
        if instance.is_empty() {
            let fields = block_ty.fields.clone().unwrap_or_default();
            for (member, field) in fields.iter().enumerate() {
                let Some(field_name) = field.ty.field_name.as_deref() else {
                    continue;
                };
                let member_symbol = Symbol {
                    name: field_name.to_owned(),
                    mangled: field_name.to_owned(),
                    ty: field.ty.clone(),
                    kind: SymbolKind::AnonMember {
                        container: var_handle,
                        member: member as u32,
                    },
                    read_only: false,
                };
                if self.table.insert(member_symbol).is_none() {
                    self.error(
                        loc,
                        "nameless block contains a member that already has a name at global scope",
                        field_name,
                        "",
                    );
                }
            }
        }

        self.layout_check(loc, var_handle);
        self.unit.add_linkage_symbol(
            SymbolTable::unique_id(var_handle),
            instance,
            block_ty,
            loc,
        );
    }

    /// `invariant gl_Position;` style requalification of an existing
    /// symbol.
    pub fn add_qualifier_to_existing(&mut self, loc: Loc, qualifier: Qualifier, identifier: &str) {
        let Some(found) = self.table.find(identifier) else {
            self.error(loc, "identifier not previously declared", identifier, "");
            return;
        };
        if self.table.get(found.handle).as_function().is_some() {
            self.error(loc, "cannot re-qualify a function name", identifier, "");
            return;
        }

        if qualifier.is_auxiliary()
            || qualifier.is_memory()
            || qualifier.is_interpolation()
            || qualifier.storage != Storage::Temporary
            || qualifier.precision != Precision::None
        {
            self.error(
                loc,
                "cannot add storage, auxiliary, memory, interpolation, or precision qualifier to an existing variable",
                identifier,
                "",
            );
            return;
        }

        let handle = if self.table.get(found.handle).read_only {
            self.table.copy_up(found.handle)
        } else {
            found.handle
        };
        if qualifier.invariant {
            self.table.get_mut(handle).ty.qualifier.invariant = true;
        }
    }

    // -----------------------------------------------------------------
    // Qualifier defaults
    // -----------------------------------------------------------------

    fn apply_qualifier_defaults(&mut self, qualifier: &Qualifier) {
        match qualifier.storage {
            Storage::Buffer => {
                if qualifier.layout_matrix != LayoutMatrix::None {
                    self.global_buffer_defaults.layout_matrix = qualifier.layout_matrix;
                }
                if qualifier.layout_packing != LayoutPacking::None {
                    self.global_buffer_defaults.layout_packing = qualifier.layout_packing;
                }
            }
            Storage::Uniform => {
                if qualifier.layout_matrix != LayoutMatrix::None {
                    self.global_uniform_defaults.layout_matrix = qualifier.layout_matrix;
                }
                if qualifier.layout_packing != LayoutPacking::None {
                    self.global_uniform_defaults.layout_packing = qualifier.layout_packing;
                }
            }
            Storage::VaryingIn => {
                if qualifier.has_location() {
                    self.global_input_defaults.location = qualifier.location;
                }
            }
            Storage::VaryingOut => {
                if qualifier.has_location() {
                    self.global_output_defaults.location = qualifier.location;
                }
            }
            _ => {}
        }
    }

    /// A declaration that is only a qualifier: `layout(...) uniform;`.
    pub fn update_qualifier_defaults(&mut self, loc: Loc, qualifier: Qualifier) {
        if qualifier.is_auxiliary()
            || qualifier.is_memory()
            || qualifier.is_interpolation()
            || qualifier.precision != Precision::None
        {
            self.error(
                loc,
                "cannot use auxiliary, memory, interpolation, or precision qualifier in a default qualifier declaration (declaration with no type)",
                "",
                "",
            );
        }

        if !matches!(
            qualifier.storage,
            Storage::Uniform | Storage::Buffer | Storage::VaryingIn | Storage::VaryingOut
        ) {
            self.error(
                loc,
                "default qualifier requires 'uniform', 'buffer', 'in', or 'out' storage qualification",
                "",
                "",
            );
            return;
        }

        if qualifier.has_binding() {
            self.error(
                loc,
                "cannot declare a default, include a type or full declaration",
                "binding",
                "",
            );
        }
        if qualifier.has_location() {
            self.error(loc, "cannot declare a default, use a full declaration", "location", "");
        }

        self.apply_qualifier_defaults(&qualifier);
    }

    /// Defaults arriving on a declaration that has a type (and possibly
    /// an identifier).
    pub fn update_typed_defaults(&mut self, loc: Loc, qualifier: Qualifier, id: Option<&str>) {
        let Some(id) = id else {
            if qualifier.has_layout() {
                self.warn(
                    loc,
                    "cannot set qualifier defaults when using a type and no identifier",
                    "",
                    "",
                );
            }
            return;
        };

        match qualifier.storage {
            Storage::Buffer | Storage::Uniform => {
                if qualifier.layout_matrix != LayoutMatrix::None {
                    self.error(loc, "cannot specify matrix layout on a variable declaration", id, "");
                }
                if qualifier.layout_packing != LayoutPacking::None {
                    self.error(loc, "cannot specify packing on a variable declaration", id, "");
                }
            }
            Storage::VaryingIn | Storage::VaryingOut => {}
            _ => {
                if qualifier.layout_matrix != LayoutMatrix::None
                    || qualifier.layout_packing != LayoutPacking::None
                {
                    self.error(
                        loc,
                        "layout qualifiers for matrix layout and packing only apply to uniform or buffer blocks",
                        id,
                        "",
                    );
                } else if qualifier.has_location() {
                    self.error(
                        loc,
                        "location qualifiers only apply to uniform, buffer, in, or out storage qualifiers",
                        id,
                        "",
                    );
                }
            }
        }

        self.apply_qualifier_defaults(&qualifier);
    }

    // -----------------------------------------------------------------
    // Layout qualifiers
    // -----------------------------------------------------------------

    /// A layout identifier without a value.
    pub fn set_layout_qualifier(&mut self, loc: Loc, qualifier: &mut Qualifier, id: &str) {
        let id = id.to_ascii_lowercase();
        match id.as_str() {
            "column_major" => qualifier.layout_matrix = LayoutMatrix::ColumnMajor,
            "row_major" => qualifier.layout_matrix = LayoutMatrix::RowMajor,
            "packed" => qualifier.layout_packing = LayoutPacking::Packed,
            "shared" => qualifier.layout_packing = LayoutPacking::Shared,
            "std140" => qualifier.layout_packing = LayoutPacking::Std140,
            "std430" => {
                self.require_profile(loc, ProfileMask::CORE_AND_COMPATIBILITY, "std430");
                self.profile_requires(loc, ProfileMask::CORE_AND_COMPATIBILITY, 430, None, "std430");
                qualifier.layout_packing = LayoutPacking::Std430;
            }
            "location" => {
                self.error(loc, "requires an integer assignment (e.g., location = 4)", "location", "");
            }
            "binding" => {
                self.error(loc, "requires an integer assignment (e.g., binding = 4)", "binding", "");
            }
            _ => self.error(loc, "unrecognized layout identifier", &id, ""),
        }
    }

    /// A value-bearing layout identifier.
    pub fn set_layout_qualifier_value(
        &mut self,
        loc: Loc,
        qualifier: &mut Qualifier,
        id: &str,
        value: i64,
    ) {
        const LAYOUT_LOCATION_END: i64 = 4096;
        const LAYOUT_BINDING_END: i64 = 4096;

        let id = id.to_ascii_lowercase();
        match id.as_str() {
            "location" => {
                self.require_profile(
                    loc,
                    ProfileMask::ES | ProfileMask::CORE_AND_COMPATIBILITY,
                    "location",
                );
                self.profile_requires(loc, ProfileMask::CORE_AND_COMPATIBILITY, 330, None, "location");
                self.profile_requires(loc, ProfileMask::ES, 300, None, "location");
                if !(0..LAYOUT_LOCATION_END).contains(&value) {
                    self.error(loc, "location is too large", &id, "");
                } else {
                    qualifier.location = Some(value as u32);
                }
            }
            "binding" => {
                self.require_profile(loc, ProfileMask::CORE_AND_COMPATIBILITY, "binding");
                self.profile_requires(
                    loc,
                    ProfileMask::CORE_AND_COMPATIBILITY,
                    420,
                    Some("GL_ARB_shading_language_420pack"),
                    "binding",
                );
                if !(0..LAYOUT_BINDING_END).contains(&value) {
                    self.error(loc, "binding is too large", &id, "");
                } else {
                    qualifier.binding = Some(value as u32);
                }
            }
            _ => {
                self.error(
                    loc,
                    "there is no such layout identifier taking an assigned value",
                    &id,
                    "",
                );
            }
        }
    }

    /// Layout validity for a fully-declared symbol.
    pub fn layout_check(&mut self, loc: Loc, symbol: Handle<crate::symbol::Symbol>) {
        let sym = self.table.get(symbol);
        let ty = sym.ty.clone();
        let is_variable = sym.is_variable();
        let qualifier = ty.qualifier;

        if qualifier.has_location() {
            match qualifier.storage {
                Storage::VaryingIn => {
                    let feature = "location qualifier on input";
                    if self.profile == Profile::Es {
                        self.require_stage(loc, StageMask::VERTEX, feature);
                    }
                    self.require_stage(loc, StageMask::GRAPHICS, feature);
                    if self.stage == Stage::Vertex {
                        self.profile_requires(
                            loc,
                            ProfileMask::CORE_AND_COMPATIBILITY,
                            330,
                            None,
                            feature,
                        );
                    } else {
                        self.profile_requires(
                            loc,
                            ProfileMask::CORE_AND_COMPATIBILITY,
                            410,
                            Some("GL_ARB_separate_shader_objects"),
                            feature,
                        );
                    }
                    if ty.basic == BasicType::Block {
                        self.profile_requires(
                            loc,
                            ProfileMask::CORE_AND_COMPATIBILITY,
                            440,
                            None,
                            "location qualifier on input block",
                        );
                    }
                }
                Storage::VaryingOut => {
                    let feature = "location qualifier on output";
                    if self.profile == Profile::Es {
                        self.require_stage(loc, StageMask::FRAGMENT, feature);
                    }
                    self.require_stage(loc, StageMask::GRAPHICS, feature);
                    if self.stage == Stage::Fragment {
                        self.profile_requires(
                            loc,
                            ProfileMask::CORE_AND_COMPATIBILITY,
                            330,
                            None,
                            feature,
                        );
                    } else {
                        self.profile_requires(
                            loc,
                            ProfileMask::CORE_AND_COMPATIBILITY,
                            410,
                            Some("GL_ARB_separate_shader_objects"),
                            feature,
                        );
                    }
                    if ty.basic == BasicType::Block {
                        self.profile_requires(
                            loc,
                            ProfileMask::CORE_AND_COMPATIBILITY,
                            440,
                            None,
                            "location qualifier on output block",
                        );
                    }
                }
                Storage::Uniform | Storage::Buffer => {
                    let feature = "location qualifier on uniform or buffer";
                    self.require_profile(loc, ProfileMask::CORE_AND_COMPATIBILITY, feature);
                    self.profile_requires(loc, ProfileMask::CORE_AND_COMPATIBILITY, 430, None, feature);
                    if !is_variable {
                        self.error(loc, "can only be used on variable declaration", feature, "");
                    }
                }
                _ => {}
            }
        }

        if qualifier.has_binding() {
            if !matches!(qualifier.storage, Storage::Uniform | Storage::Buffer) {
                self.error(loc, "requires uniform or buffer storage qualifier", "binding", "");
            }
            if ty.basic != BasicType::Sampler && ty.basic != BasicType::Block {
                self.error(
                    loc,
                    "requires block, or sampler/image, or atomic-counter type",
                    "binding",
                    "",
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn ctx(version: u32, profile: Profile, stage: Stage) -> ParseContext {
        let mut ctx = ParseContext::new(Options::new(version, profile, stage));
        ctx.table.seal_builtins();
        ctx
    }

    #[test]
    fn storage_merge_table() {
        let mut ctx = ctx(110, Profile::None, Stage::Vertex);
        let loc = Loc::default();

        // in + out = inout
        let mut dst = Qualifier::new(Storage::In);
        ctx.merge_qualifiers(loc, &mut dst, &Qualifier::new(Storage::Out), false);
        assert_eq!(dst.storage, Storage::InOut);

        // const + in = const-read-only (ordering error also fires pre-420)
        let mut dst = Qualifier::new(Storage::In);
        ctx.merge_qualifiers(loc, &mut dst, &Qualifier::new(Storage::Const), false);
        assert_eq!(dst.storage, Storage::ConstReadOnly);

        // uniform + uniform is too many
        let before = ctx.error_count();
        let mut dst = Qualifier::new(Storage::Uniform);
        ctx.merge_qualifiers(loc, &mut dst, &Qualifier::new(Storage::Buffer), false);
        assert_eq!(ctx.error_count(), before + 1);
        assert!(ctx.sink.text().contains("too many storage qualifiers"));
    }

    #[test]
    fn merge_is_idempotent_under_force() {
        let mut ctx = ctx(450, Profile::Core, Stage::Vertex);
        let loc = Loc::default();
        let mut q = Qualifier::new(Storage::Uniform);
        q.precision = Precision::High;
        q.flat = true;
        q.layout_packing = LayoutPacking::Std140;
        q.location = Some(2);

        let mut merged = q;
        let before = ctx.error_count();
        ctx.merge_qualifiers(loc, &mut merged, &q.clone(), true);
        // repeated singleton flags still trip the replication check
        assert_eq!(ctx.error_count(), before + 1);
        assert_eq!(merged.storage, q.storage);
        assert_eq!(merged.precision, q.precision);
        assert_eq!(merged.layout_packing, q.layout_packing);
        assert_eq!(merged.location, q.location);
    }

    #[test]
    fn replicated_qualifiers_detected() {
        let mut ctx = ctx(110, Profile::None, Stage::Vertex);
        let loc = Loc::default();
        let mut dst = Qualifier::default();
        dst.flat = true;
        let mut src = Qualifier::default();
        src.flat = true;
        ctx.merge_qualifiers(loc, &mut dst, &src, true);
        assert!(ctx.sink.text().contains("replicated qualifiers"));
    }

    #[test]
    fn const_without_initializer_rejected() {
        let mut ctx = ctx(330, Profile::Core, Stage::Vertex);
        let loc = Loc::default();
        let mut public_type = PublicType::new(loc);
        public_type.basic = BasicType::Int;
        public_type.qualifier.storage = Storage::Const;
        ctx.declare_variable(loc, "n", &public_type, None, None);
        assert!(ctx
            .sink
            .text()
            .contains("variables with qualifier 'const' must be initialized"));
    }

    #[test]
    fn void_variable_rejected() {
        let mut ctx = ctx(330, Profile::Core, Stage::Vertex);
        let loc = Loc::default();
        let public_type = PublicType::new(loc);
        ctx.declare_variable(loc, "nothing", &public_type, None, None);
        assert!(ctx.sink.text().contains("illegal use of type 'void'"));
    }

    #[test]
    fn unsized_array_resized_by_redeclaration() {
        let mut ctx = ctx(430, Profile::Core, Stage::Vertex);
        let loc = Loc::default();
        let mut public_type = PublicType::new(loc);
        public_type.basic = BasicType::Float;

        ctx.declare_variable(loc, "a", &public_type, Some(ArraySizes::unspecified()), None);
        assert_eq!(ctx.error_count(), 0);
        let first = ctx.table.find("a").unwrap().handle;
        assert_eq!(ctx.table.get(first).ty.array_size(), 0);

        ctx.declare_variable(loc, "a", &public_type, Some(ArraySizes::sized(8)), None);
        assert_eq!(ctx.error_count(), 0);
        assert_eq!(ctx.table.get(first).ty.array_size(), 8);

        // resizing twice is a redeclaration error
        ctx.declare_variable(loc, "a", &public_type, Some(ArraySizes::sized(9)), None);
        assert!(ctx.sink.text().contains("redeclaration of array with size"));
    }

    #[test]
    fn es_requires_array_size() {
        let mut ctx = ctx(100, Profile::Es, Stage::Vertex);
        let loc = Loc::default();
        let mut public_type = PublicType::new(loc);
        public_type.basic = BasicType::Float;
        public_type.qualifier.precision = Precision::High;
        ctx.declare_variable(loc, "a", &public_type, Some(ArraySizes::unspecified()), None);
        assert!(ctx.sink.text().contains("array size required"));
    }

    #[test]
    fn layout_location_gating() {
        // core 330 vertex input: accepted
        let mut ctx1 = ctx(330, Profile::Core, Stage::Vertex);
        let loc = Loc::default();
        let mut q = Qualifier::default();
        ctx1.set_layout_qualifier_value(loc, &mut q, "location", 1);
        assert_eq!(ctx1.error_count(), 0);
        assert_eq!(q.location, Some(1));

        // es 100: version error
        let mut ctx2 = ctx(100, Profile::Es, Stage::Vertex);
        let mut q = Qualifier::default();
        ctx2.set_layout_qualifier_value(loc, &mut q, "location", 1);
        assert!(ctx2.error_count() > 0);
    }

    #[test]
    fn layout_value_required() {
        let mut ctx = ctx(430, Profile::Core, Stage::Vertex);
        let loc = Loc::default();
        let mut q = Qualifier::default();
        ctx.set_layout_qualifier(loc, &mut q, "location");
        assert!(ctx.sink.text().contains("requires an integer assignment"));

        ctx.set_layout_qualifier(loc, &mut q, "STD140");
        assert_eq!(q.layout_packing, LayoutPacking::Std140);

        ctx.set_layout_qualifier(loc, &mut q, "no_such_thing");
        assert!(ctx.sink.text().contains("unrecognized layout identifier"));
    }

    #[test]
    fn binding_requires_uniform_block_or_sampler() {
        let mut ctx = ctx(430, Profile::Core, Stage::Vertex);
        let loc = Loc::default();
        let mut ty = Type::vector(BasicType::Float, Storage::VaryingIn, 4);
        ty.qualifier.binding = Some(0);
        let handle = ctx.table.insert(Symbol::variable("v", ty)).unwrap();
        ctx.layout_check(loc, handle);
        assert!(ctx
            .sink
            .text()
            .contains("requires uniform or buffer storage qualifier"));
    }
}
