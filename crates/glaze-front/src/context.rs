//! The parse context: all state threaded through the grammar handlers,
//! plus the cross-cutting services (diagnostics, feature gating,
//! default precision, pragmas, finalization).

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glaze_hir::{
    ArraySizes, BasicType, Field, Handle, Loc, Node, Precision, Qualifier, Sampler, Storage, Type,
    Unit, SAMPLER_TYPE_SPACE,
};
use log::debug;

use crate::diag::{InfoSink, Severity};
use crate::options::{Messages, Options, Profile, ProfileMask, Stage, StageMask};
use crate::symbol::{Symbol, SymbolTable};

/// `#pragma` state accumulated during a compile.
#[derive(Clone, Debug)]
pub struct ContextPragma {
    pub optimize: bool,
    pub debug: bool,
    pub table: HashMap<String, String>,
}

impl Default for ContextPragma {
    fn default() -> Self {
        Self {
            optimize: true,
            debug: false,
            table: HashMap::new(),
        }
    }
}

/// A type under construction by the grammar, before it becomes a
/// [`Type`].
#[derive(Clone, Debug)]
pub struct PublicType {
    pub basic: BasicType,
    pub qualifier: Qualifier,
    pub vector_size: u32,
    pub matrix_cols: u32,
    pub matrix_rows: u32,
    pub array: Option<ArraySizes>,
    pub sampler: Option<Sampler>,
    pub fields: Option<Rc<Vec<Field>>>,
    pub type_name: Option<Rc<str>>,
    pub loc: Loc,
}

impl PublicType {
    pub fn new(loc: Loc) -> Self {
        Self {
            basic: BasicType::Void,
            qualifier: Qualifier::default(),
            vector_size: 1,
            matrix_cols: 0,
            matrix_rows: 0,
            array: None,
            sampler: None,
            fields: None,
            type_name: None,
            loc,
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.vector_size == 1 && self.matrix_cols == 0 && self.array.is_none()
            && self.fields.is_none()
    }

    pub fn to_type(&self) -> Type {
        let mut ty = Type::new(self.basic);
        ty.vector_size = self.vector_size;
        ty.matrix_cols = self.matrix_cols;
        ty.matrix_rows = self.matrix_rows;
        ty.qualifier = self.qualifier;
        ty.array = self.array.clone();
        ty.sampler = self.sampler;
        ty.fields = self.fields.clone();
        ty.type_name = self.type_name.clone();
        ty
    }
}

const NUM_BASIC_TYPES: usize = 10;

fn basic_index(basic: BasicType) -> usize {
    match basic {
        BasicType::Void => 0,
        BasicType::Bool => 1,
        BasicType::Int => 2,
        BasicType::Uint => 3,
        BasicType::Float => 4,
        BasicType::Double => 5,
        BasicType::Sampler => 6,
        BasicType::Struct => 7,
        BasicType::Block => 8,
        BasicType::AtomicCounter => 9,
    }
}

/// All semantic-analysis state for one compilation unit.
pub struct ParseContext {
    pub unit: Unit,
    pub table: SymbolTable,
    pub sink: InfoSink,

    pub version: u32,
    pub profile: Profile,
    pub stage: Stage,
    pub forward_compatible: bool,
    pub messages: Messages,
    pub options: Options,
    pub parsing_builtins: bool,

    pub current_loc: Loc,
    pub loop_nesting: u32,
    pub switch_nesting: u32,
    pub struct_nesting: u32,
    pub after_eof: bool,
    pub tokens_before_eof: bool,

    pub current_function_ret: Option<Type>,
    pub current_caller: String,
    pub function_returns_value: bool,

    pub default_precision: [Precision; NUM_BASIC_TYPES],
    pub default_sampler_precision: [Precision; SAMPLER_TYPE_SPACE],

    pub global_uniform_defaults: Qualifier,
    pub global_buffer_defaults: Qualifier,
    pub global_input_defaults: Qualifier,
    pub global_output_defaults: Qualifier,
    pub current_block_defaults: Qualifier,
    /// Interface-block name, set by the grammar just before
    /// `add_block` runs.
    pub block_name: Option<String>,

    pub inductive_loop_ids: HashSet<u32>,
    pub needs_index_limitation_checking: Vec<Handle<Node>>,
    pub switch_sequence_stack: Vec<Vec<Handle<Node>>>,
    pub pragma: ContextPragma,
    pub any_index_limits: bool,
    pub extensions: HashSet<String>,
}

impl ParseContext {
    pub fn new(options: Options) -> Self {
        let mut ctx = Self {
            unit: Unit::new(),
            table: SymbolTable::new(),
            sink: InfoSink::new(options.messages.contains(Messages::SUPPRESS_WARNINGS)),
            version: options.version,
            profile: options.profile,
            stage: options.stage,
            forward_compatible: options.forward_compatible,
            messages: options.messages,
            parsing_builtins: options.parsing_builtins,
            current_loc: Loc::new(0, 1),
            loop_nesting: 0,
            switch_nesting: 0,
            struct_nesting: 0,
            after_eof: false,
            tokens_before_eof: false,
            current_function_ret: None,
            current_caller: String::new(),
            function_returns_value: false,
            default_precision: [Precision::None; NUM_BASIC_TYPES],
            default_sampler_precision: [Precision::None; SAMPLER_TYPE_SPACE],
            global_uniform_defaults: Qualifier::new(Storage::Uniform),
            global_buffer_defaults: Qualifier::new(Storage::Buffer),
            global_input_defaults: Qualifier::new(Storage::VaryingIn),
            global_output_defaults: Qualifier::new(Storage::VaryingOut),
            current_block_defaults: Qualifier::default(),
            block_name: None,
            inductive_loop_ids: HashSet::new(),
            needs_index_limitation_checking: Vec::new(),
            switch_sequence_stack: Vec::new(),
            pragma: ContextPragma::default(),
            any_index_limits: options.limits.any_index_limits(),
            extensions: HashSet::new(),
            options,
        };

        ctx.global_uniform_defaults.layout_matrix = glaze_hir::LayoutMatrix::ColumnMajor;
        ctx.global_uniform_defaults.layout_packing = glaze_hir::LayoutPacking::Shared;
        ctx.global_buffer_defaults.layout_matrix = glaze_hir::LayoutMatrix::ColumnMajor;
        ctx.global_buffer_defaults.layout_packing = glaze_hir::LayoutPacking::Shared;

        if ctx.profile == Profile::Es {
            use glaze_hir::{SamplerDim, SamplerScalar};
            let s2d = Sampler::new(SamplerScalar::Float, SamplerDim::Dim2D);
            ctx.default_sampler_precision[s2d.type_index()] = Precision::Low;
            let cube = Sampler::new(SamplerScalar::Float, SamplerDim::Cube);
            ctx.default_sampler_precision[cube.type_index()] = Precision::Low;

            match ctx.stage {
                Stage::Vertex => {
                    ctx.default_precision[basic_index(BasicType::Int)] = Precision::High;
                    ctx.default_precision[basic_index(BasicType::Uint)] = Precision::High;
                    ctx.default_precision[basic_index(BasicType::Float)] = Precision::High;
                    ctx.default_precision[basic_index(BasicType::Sampler)] = Precision::Low;
                }
                Stage::Fragment => {
                    ctx.default_precision[basic_index(BasicType::Int)] = Precision::Medium;
                    ctx.default_precision[basic_index(BasicType::Uint)] = Precision::Medium;
                    ctx.default_precision[basic_index(BasicType::Sampler)] = Precision::Low;
                    // float deliberately has no default in es fragment
                }
                _ => {}
            }
        }

        ctx
    }

    // -----------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------

    pub fn error(&mut self, loc: Loc, reason: &str, token: &str, extra: &str) {
        self.sink.message(Severity::Error, loc, token, reason, extra);
    }

    pub fn warn(&mut self, loc: Loc, reason: &str, token: &str, extra: &str) {
        self.sink.message(Severity::Warning, loc, token, reason, extra);
    }

    pub fn error_count(&self) -> u32 {
        self.sink.error_count()
    }

    /// Syntax errors reported by the grammar driver.
    pub fn parser_error(&mut self, message: &str) {
        let loc = self.current_loc;
        if self.after_eof {
            if self.tokens_before_eof {
                self.error(loc, "", "pre-mature EOF", message);
            }
        } else {
            self.error(loc, "", "", message);
        }
    }

    // -----------------------------------------------------------------
    // Feature gating
    // -----------------------------------------------------------------

    /// Errors unless the current profile is in the mask.
    pub fn require_profile(&mut self, loc: Loc, profiles: ProfileMask, feature: &str) {
        if !profiles.contains(self.profile) {
            let profile = self.profile.as_str();
            self.error(loc, "not supported with this profile:", feature, profile);
        }
    }

    /// Within the masked profiles, the feature needs at least
    /// `min_version` or the named extension.
    pub fn profile_requires(
        &mut self,
        loc: Loc,
        profiles: ProfileMask,
        min_version: u32,
        extension: Option<&str>,
        feature: &str,
    ) {
        if !profiles.contains(self.profile) {
            return;
        }
        let mut ok = self.version >= min_version;
        if let Some(extension) = extension {
            ok = ok || self.extensions.contains(extension);
        }
        if !ok {
            self.error(
                loc,
                "not supported for this version or the enabled extensions",
                feature,
                "",
            );
        }
    }

    pub fn require_stage(&mut self, loc: Loc, stages: StageMask, feature: &str) {
        if !stages.contains(self.stage) {
            let stage = self.stage.as_str();
            self.error(loc, "not supported in this stage:", feature, stage);
        }
    }

    /// Errors if the feature was removed at or before the current
    /// version of the given profile.
    pub fn require_not_removed(
        &mut self,
        loc: Loc,
        profile: Profile,
        removed_version: u32,
        feature: &str,
    ) {
        if self.profile == profile && self.version >= removed_version {
            let extra = format!(
                "removed in {} version {}",
                profile.as_str(),
                removed_version
            );
            self.error(loc, "no longer supported", feature, &extra);
        }
    }

    // -----------------------------------------------------------------
    // Default precision
    // -----------------------------------------------------------------

    pub fn set_default_precision(
        &mut self,
        loc: Loc,
        public_type: &PublicType,
        precision: Precision,
    ) {
        if public_type.basic == BasicType::Sampler {
            if let Some(sampler) = &public_type.sampler {
                self.default_sampler_precision[sampler.type_index()] = precision;
                return;
            }
        }
        if matches!(public_type.basic, BasicType::Int | BasicType::Float)
            && public_type.is_scalar()
        {
            self.default_precision[basic_index(public_type.basic)] = precision;
            if public_type.basic == BasicType::Int {
                self.default_precision[basic_index(BasicType::Uint)] = precision;
            }
            return;
        }
        self.error(
            loc,
            "cannot apply precision statement to this type; use 'float', 'int' or a sampler type",
            public_type.basic.basic_string(),
            "",
        );
    }

    pub fn get_default_precision(&self, public_type: &PublicType) -> Precision {
        if public_type.basic == BasicType::Sampler {
            match &public_type.sampler {
                Some(sampler) => self.default_sampler_precision[sampler.type_index()],
                None => Precision::None,
            }
        } else {
            self.default_precision[basic_index(public_type.basic)]
        }
    }

    /// On the es profile, fill in the default precision and demand that
    /// one exists for types that require it.
    pub fn precision_qualifier_check(&mut self, loc: Loc, public_type: &mut PublicType) {
        if self.profile != Profile::Es || self.parsing_builtins {
            return;
        }
        if matches!(
            public_type.basic,
            BasicType::Float | BasicType::Int | BasicType::Uint | BasicType::Sampler
        ) {
            if public_type.qualifier.precision == Precision::None {
                public_type.qualifier.precision = self.get_default_precision(public_type);
            }
            if public_type.qualifier.precision == Precision::None {
                if self.messages.contains(Messages::RELAXED_ERRORS) {
                    self.warn(
                        loc,
                        "type requires declaration of default precision qualifier",
                        public_type.basic.basic_string(),
                        "substituting 'mediump'",
                    );
                } else {
                    self.error(
                        loc,
                        "type requires declaration of default precision qualifier",
                        public_type.basic.basic_string(),
                        "",
                    );
                }
                public_type.qualifier.precision = Precision::Medium;
                self.default_precision[basic_index(public_type.basic)] = Precision::Medium;
            }
        } else if public_type.qualifier.precision != Precision::None {
            self.error(
                loc,
                "type cannot have precision qualifier",
                public_type.basic.basic_string(),
                "",
            );
        }
    }

    // -----------------------------------------------------------------
    // Pragmas and extensions
    // -----------------------------------------------------------------

    pub fn handle_pragma(&mut self, loc: Loc, tokens: &[String]) {
        let first = tokens.first().map(String::as_str);
        match first {
            Some(name @ ("optimize" | "debug")) => {
                if tokens.len() != 4 {
                    let reason = format!("{name} pragma syntax is incorrect");
                    self.error(loc, &reason, "#pragma", "");
                    return;
                }
                if tokens[1] != "(" {
                    let reason = format!("\"(\" expected after '{name}' keyword");
                    self.error(loc, &reason, "#pragma", "");
                    return;
                }
                let value = match tokens[2].as_str() {
                    "on" => true,
                    "off" => false,
                    _ => {
                        let reason =
                            format!("\"on\" or \"off\" expected after '(' for '{name}' pragma");
                        self.error(loc, &reason, "#pragma", "");
                        return;
                    }
                };
                if tokens[3] != ")" {
                    let reason = format!("\")\" expected to end '{name}' pragma");
                    self.error(loc, &reason, "#pragma", "");
                    return;
                }
                if name == "optimize" {
                    self.pragma.optimize = value;
                } else {
                    self.pragma.debug = value;
                }
            }
            Some(name) => {
                // implementation-specific pragma: record name(value) or
                // name value shapes, ignore the rest
                if tokens.len() == 4 && tokens[1] == "(" && tokens[3] == ")" {
                    self.pragma.table.insert(name.to_owned(), tokens[2].clone());
                } else if tokens.len() >= 2 {
                    self.pragma.table.insert(name.to_owned(), tokens[1].clone());
                }
            }
            None => {}
        }
    }

    pub fn handle_extension(&mut self, loc: Loc, name: &str, behavior: &str) {
        match behavior {
            "require" | "enable" | "warn" => {
                self.extensions.insert(name.to_owned());
            }
            "disable" => {
                self.extensions.remove(name);
            }
            _ => {
                self.error(loc, "behavior not supported", "#extension", behavior);
            }
        }
    }

    // -----------------------------------------------------------------
    // Finalization
    // -----------------------------------------------------------------

    /// Post-parse obligations: drain the deferred version-100 index
    /// limitation checks in declaration order.
    pub fn finalize(&mut self) {
        debug!(
            "finalize: {} deferred index checks, {} errors so far",
            self.needs_index_limitation_checking.len(),
            self.error_count()
        );
        let deferred = std::mem::take(&mut self.needs_index_limitation_checking);
        for index in deferred {
            self.constant_index_expression_check(index);
        }
    }

    fn constant_index_expression_check(&mut self, index: Handle<Node>) {
        let node = self.unit.node(index);
        if node.is_const() {
            return;
        }
        if let Some((id, _)) = node.as_symbol() {
            if self.inductive_loop_ids.contains(&id) {
                return;
            }
        }
        let loc = node.loc;
        self.error(
            loc,
            "Non-constant-index-expression",
            "limitations",
            "required to be loop index or a constant integral expression",
        );
    }

    // -----------------------------------------------------------------
    // Small shared checks
    // -----------------------------------------------------------------

    /// True (and diagnosed) when the node is not a compile-time
    /// constant.
    pub fn constant_value_check(&mut self, node: Handle<Node>, token: &str) -> bool {
        if self.unit.storage(node) != Storage::Const {
            let loc = self.unit.node(node).loc;
            self.error(loc, "constant expression required", token, "");
            return true;
        }
        false
    }

    pub fn integer_check(&mut self, node: Handle<Node>, token: &str) {
        let ty = self.unit.ty(node);
        if matches!(ty.basic, BasicType::Int | BasicType::Uint) && ty.is_scalar() {
            return;
        }
        let loc = self.unit.node(node).loc;
        self.error(loc, "scalar integer expression required", token, "");
    }

    pub fn bool_check(&mut self, loc: Loc, node: Handle<Node>) {
        let ty = self.unit.ty(node);
        if ty.basic != BasicType::Bool || !ty.is_scalar() {
            self.error(loc, "boolean expression expected", "", "");
        }
    }

    pub fn global_check(&mut self, loc: Loc, token: &str) {
        if !self.table.at_global_level() {
            self.error(loc, "not allowed in nested scope", token, "");
        }
    }

    /// Reserved-name check: `gl_` prefixes and double underscores are
    /// only usable while seeding built-ins. True when reserved.
    pub fn reserved_error_check(&mut self, loc: Loc, identifier: &str) -> bool {
        if self.table.at_builtin_level() {
            return false;
        }
        if identifier.starts_with("gl_") {
            self.error(loc, "reserved built-in name", "gl_", "");
            return true;
        }
        if identifier.contains("__") {
            self.error(
                loc,
                "Two consecutive underscores are reserved for future use.",
                identifier,
                "",
            );
            return true;
        }
        false
    }

    /// Insert a symbol, reporting a redefinition error on collision.
    pub fn insert_or_redefinition_error(
        &mut self,
        loc: Loc,
        symbol: Symbol,
    ) -> Option<Handle<Symbol>> {
        let name = symbol.name.clone();
        match self.table.insert(symbol) {
            Some(handle) => Some(handle),
            None => {
                self.error(loc, "redefinition", &name, "");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn es_fragment() -> ParseContext {
        ParseContext::new(Options::new(100, Profile::Es, Stage::Fragment))
    }

    #[test]
    fn es_defaults_follow_stage() {
        let ctx = ParseContext::new(Options::new(100, Profile::Es, Stage::Vertex));
        assert_eq!(ctx.default_precision[basic_index(BasicType::Float)], Precision::High);
        assert_eq!(ctx.default_precision[basic_index(BasicType::Int)], Precision::High);

        let ctx = es_fragment();
        assert_eq!(ctx.default_precision[basic_index(BasicType::Float)], Precision::None);
        assert_eq!(ctx.default_precision[basic_index(BasicType::Int)], Precision::Medium);
        assert_eq!(ctx.default_precision[basic_index(BasicType::Sampler)], Precision::Low);
    }

    #[test]
    fn es_float_sampler_defaults_low() {
        use glaze_hir::{SamplerDim, SamplerScalar};
        let ctx = es_fragment();
        let s2d = Sampler::new(SamplerScalar::Float, SamplerDim::Dim2D);
        assert_eq!(ctx.default_sampler_precision[s2d.type_index()], Precision::Low);
        let i2d = Sampler::new(SamplerScalar::Int, SamplerDim::Dim2D);
        assert_eq!(ctx.default_sampler_precision[i2d.type_index()], Precision::None);
    }

    #[test]
    fn pragma_optimize_and_table() {
        let mut ctx = es_fragment();
        let loc = Loc::default();
        assert!(ctx.pragma.optimize);
        ctx.handle_pragma(
            loc,
            &["optimize", "(", "off", ")"].map(String::from),
        );
        assert!(!ctx.pragma.optimize);
        assert_eq!(ctx.error_count(), 0);

        ctx.handle_pragma(loc, &["debug", "(", "on", ")"].map(String::from));
        assert!(ctx.pragma.debug);

        ctx.handle_pragma(loc, &["myvendor", "(", "fast", ")"].map(String::from));
        assert_eq!(ctx.pragma.table.get("myvendor").map(String::as_str), Some("fast"));

        ctx.handle_pragma(loc, &["other", "value"].map(String::from));
        assert_eq!(ctx.pragma.table.get("other").map(String::as_str), Some("value"));
    }

    #[test]
    fn malformed_pragma_is_syntax_error() {
        let mut ctx = es_fragment();
        let loc = Loc::default();
        ctx.handle_pragma(loc, &["optimize", "(", "on"].map(String::from));
        assert_eq!(ctx.error_count(), 1);
        assert!(ctx.sink.text().contains("optimize pragma syntax is incorrect"));
    }

    #[test]
    fn profile_gates() {
        let mut ctx = ParseContext::new(Options::new(330, Profile::Core, Stage::Vertex));
        let loc = Loc::default();
        ctx.require_profile(loc, ProfileMask::DESKTOP, "test feature");
        assert_eq!(ctx.error_count(), 0);
        ctx.require_profile(loc, ProfileMask::ES, "es-only feature");
        assert_eq!(ctx.error_count(), 1);

        ctx.profile_requires(loc, ProfileMask::CORE_AND_COMPATIBILITY, 330, None, "f");
        assert_eq!(ctx.error_count(), 1);
        ctx.profile_requires(loc, ProfileMask::CORE_AND_COMPATIBILITY, 400, None, "f");
        assert_eq!(ctx.error_count(), 2);
        // satisfied through an extension
        ctx.extensions.insert("GL_TEST_ext".to_owned());
        ctx.profile_requires(loc, ProfileMask::CORE_AND_COMPATIBILITY, 400, Some("GL_TEST_ext"), "f");
        assert_eq!(ctx.error_count(), 2);
    }

    #[test]
    fn premature_eof_phrasing() {
        let mut ctx = es_fragment();
        ctx.after_eof = true;
        ctx.tokens_before_eof = true;
        ctx.parser_error("syntax error");
        assert!(ctx.sink.text().contains("pre-mature EOF"));
    }

    #[test]
    fn reserved_names() {
        let mut ctx = es_fragment();
        ctx.table.seal_builtins();
        let loc = Loc::default();
        assert!(ctx.reserved_error_check(loc, "gl_Thing"));
        assert!(ctx.reserved_error_check(loc, "a__b"));
        assert!(!ctx.reserved_error_check(loc, "ordinary"));
        assert_eq!(ctx.error_count(), 2);
    }
}
