//! End-to-end tests: whole shaders through the lexer, grammar, and
//! semantic checks.

use glaze_front::{parse_shader_strings, Options, Profile, ResourceLimits, Stage};
use glaze_hir::BasicType;

fn compile(source: &str, options: &Options) -> glaze_front::Compilation {
    parse_shader_strings(&[source], options)
}

fn core330_vertex() -> Options {
    Options::new(330, Profile::Core, Stage::Vertex)
}

fn desktop110_vertex() -> Options {
    Options::new(110, Profile::None, Stage::Vertex)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn swizzle_chain_in_main() {
    let result = compile(
        "void main() { vec3 v = vec3(1.0, 2.0, 3.0); float f = v.zxy.x; }",
        &desktop110_vertex(),
    );
    assert!(result.success, "log: {}", result.log);
    assert_eq!(result.error_count, 0);
    assert_eq!(result.unit.main_count, 1);
}

#[test]
fn const_swizzle_chain_folds_to_value() {
    // f folds to 3.0, so int(f) sizes the array at 3 and index 2 is the
    // last valid one
    let source = "const vec3 v = vec3(1.0, 2.0, 3.0);
const float f = v.zxy.x;
float arr[int(f)];
void main() { arr[2] = 1.0; }";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);

    let f = result.symbols.find("f").expect("f is global");
    let symbol = result.symbols.get(f.handle);
    let values = symbol.const_array().expect("f folded to a constant");
    assert_eq!(values.len(), 1);
    assert_eq!(values.get(0).as_double(), 3.0);

    // and the out-of-range variant is caught
    let bad = source.replace("arr[2]", "arr[3]");
    let result = compile(&bad, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("array index out of range '3'"));
}

#[test]
fn const_sized_array_index_out_of_range() {
    let result = compile(
        "void main() { const int n = 3; int a[n]; a[3] = 0; }",
        &desktop110_vertex(),
    );
    assert!(!result.success);
    assert_eq!(result.error_count, 1, "log: {}", result.log);
    assert!(result.log.contains("array index out of range '3'"));
}

#[test]
fn es100_inductive_loop_accepted() {
    let source = "#version 100
precision mediump float;
void main() { float a[4]; for (int i = 0; i < 4; ++i) a[i] = float(i); }";
    let result = compile(source, &Options::new(100, Profile::Es, Stage::Vertex));
    assert!(result.success, "log: {}", result.log);
    assert_eq!(result.version, 100);
    assert_eq!(result.profile, Profile::Es);
}

#[test]
fn uniform_block_with_named_instance() {
    let result = compile(
        "uniform U { mat4 m; } u; void main() { gl_Position = u.m * vec4(0); }",
        &core330_vertex(),
    );
    assert!(result.success, "log: {}", result.log);
    assert_eq!(result.unit.main_count, 1);

    // the block name is reserved by a sentinel
    let block_name = result.symbols.find("U").expect("block name registered");
    assert_eq!(result.symbols.get(block_name.handle).ty.basic, BasicType::Block);
    // the instance is a real variable of the block type
    let instance = result.symbols.find("u").expect("instance registered");
    let instance = result.symbols.get(instance.handle);
    assert_eq!(instance.ty.basic, BasicType::Block);
    assert_eq!(instance.ty.fields.as_ref().unwrap().len(), 1);
    // and the linker sees it
    assert!(!result.unit.linkage.is_empty());
}

#[test]
fn anonymous_block_members_visible() {
    let result = compile(
        "uniform U { mat4 m; }; void main() { gl_Position = m * vec4(0); }",
        &core330_vertex(),
    );
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn overload_with_different_parameter_qualifiers() {
    let result = compile(
        "void f(out int x); void f(in int x) {} void main() {}",
        &desktop110_vertex(),
    );
    assert!(!result.success);
    assert!(result
        .log
        .contains("overloaded functions must have the same parameter qualifiers"));
}

#[test]
fn location_layout_by_profile() {
    let source = "layout(location = 1) in vec4 pos; void main() {}";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);

    let result = compile(source, &Options::new(100, Profile::Es, Stage::Vertex));
    assert!(!result.success);
    assert!(result.log.contains("not supported"));
}

// ---------------------------------------------------------------------------
// Boundary behaviors
// ---------------------------------------------------------------------------

#[test]
fn swizzle_too_long() {
    let result = compile(
        "void main() { vec4 v = vec4(0.0); float f = v.xyzwx.x; }",
        &desktop110_vertex(),
    );
    assert!(!result.success);
    assert!(result.log.contains("illegal vector field selection"));
}

#[test]
fn swizzle_mixed_sets() {
    let result = compile(
        "void main() { vec4 v = vec4(0.0); vec3 w = v.xrs; }",
        &desktop110_vertex(),
    );
    assert!(!result.success);
    assert!(result.log.contains("not from the same set"));
}

#[test]
fn main_with_parameters() {
    let result = compile("void main(int x) {}", &desktop110_vertex());
    assert!(!result.success);
    assert!(result.log.contains("function cannot take any parameter(s)"));
}

#[test]
fn main_with_non_void_return() {
    let result = compile("int main() { return 1; }", &desktop110_vertex());
    assert!(!result.success);
    assert!(result.log.contains("main function cannot return a value"));
}

#[test]
fn malformed_pragma() {
    let result = compile("#pragma optimize(on\nvoid main() {}", &desktop110_vertex());
    assert!(!result.success);
    assert!(result.log.contains("optimize pragma syntax is incorrect"));
}

#[test]
fn pragma_state_recorded() {
    let result = compile(
        "#pragma optimize(off)\n#pragma debug(on)\n#pragma vendor(fast)\nvoid main() {}",
        &desktop110_vertex(),
    );
    assert!(result.success, "log: {}", result.log);
    assert!(!result.pragma.optimize);
    assert!(result.pragma.debug);
    assert_eq!(result.pragma.table.get("vendor").map(String::as_str), Some("fast"));
}

#[test]
fn premature_eof() {
    let result = compile("void main() {", &desktop110_vertex());
    assert!(!result.success);
    assert!(result.log.contains("pre-mature EOF"), "log: {}", result.log);
}

#[test]
fn undeclared_identifiers_recover() {
    let result = compile(
        "void main() { float a = missing1; float b = missing2; }",
        &desktop110_vertex(),
    );
    assert!(!result.success);
    assert_eq!(result.error_count, 2, "log: {}", result.log);
    assert!(result.log.contains("undeclared identifier"));
}

#[test]
fn redefinition_rejected() {
    let result = compile("void main() { float x; int x; }", &desktop110_vertex());
    assert!(!result.success);
    assert!(result.log.contains("redefinition"));
}

#[test]
fn reserved_identifiers_rejected() {
    let result = compile("float gl_Custom; void main() {}", &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("reserved built-in name"));

    let result = compile("float a__b; void main() {}", &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("reserved for future use"));
}

#[test]
fn uniform_not_assignable() {
    let result = compile(
        "uniform float u; void main() { u = 1.0; }",
        &core330_vertex(),
    );
    assert!(!result.success);
    assert!(result.log.contains("can't modify a uniform"));
}

// ---------------------------------------------------------------------------
// Inductive loops and deferred index limits
// ---------------------------------------------------------------------------

fn es100_fragment_with_limits() -> Options {
    let mut options = Options::new(100, Profile::Es, Stage::Fragment);
    options.limits = ResourceLimits {
        general_uniform_indexing: false,
        ..ResourceLimits::default()
    };
    options
}

#[test]
fn loop_index_may_index_uniforms() {
    let source = "precision mediump float;
uniform float u[4];
void main() { for (int i = 0; i < 4; ++i) { gl_FragColor = vec4(u[i]); } }";
    let result = compile(source, &es100_fragment_with_limits());
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn arbitrary_variable_may_not_index_uniforms() {
    let source = "precision mediump float;
uniform float u[4];
void main() { int j = 0; gl_FragColor = vec4(u[j]); }";
    let result = compile(source, &es100_fragment_with_limits());
    assert!(!result.success);
    assert!(result.log.contains("Non-constant-index-expression"));
}

#[test]
fn constant_index_passes_limits() {
    let source = "precision mediump float;
uniform float u[4];
void main() { gl_FragColor = vec4(u[2]); }";
    let result = compile(source, &es100_fragment_with_limits());
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn es100_float_loop_index_accepted() {
    let source = "precision mediump float;
void main() { float x = 0.0; for (float i = 0.0; i < 4.0; i += 0.5) { x += i; } gl_FragColor = vec4(x); }";
    let result = compile(source, &Options::new(100, Profile::Es, Stage::Fragment));
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn es100_non_constant_bound_rejected() {
    let source = "precision mediump float;
uniform int n;
void main() { for (int i = 0; i < n; ++i) {} }";
    let result = compile(source, &Options::new(100, Profile::Es, Stage::Fragment));
    assert!(!result.success);
    assert!(result.log.contains("inductive-loop condition requires the form"));
}

#[test]
fn es100_loop_index_not_writable_in_body() {
    let source = "precision mediump float;
void main() { for (int i = 0; i < 4; ++i) { i = 0; } }";
    let result = compile(source, &Options::new(100, Profile::Es, Stage::Fragment));
    assert!(!result.success);
    assert!(result.log.contains("Loop index cannot be statically assigned"));
}

// ---------------------------------------------------------------------------
// Switch statements
// ---------------------------------------------------------------------------

#[test]
fn switch_with_cases() {
    let source = "void main() {
    int x = 1;
    int y = 0;
    switch (x) {
        case 1: y = 1; break;
        case 2: y = 2; break;
        default: y = 3;
    }
}";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn switch_duplicate_case() {
    let source = "void main() {
    int x = 1;
    switch (x) { case 1: break; case 1: break; }
}";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("duplicated value"));
}

#[test]
fn switch_statements_before_first_label() {
    let source = "void main() {
    int x = 1;
    switch (x) { x = 2; case 1: break; }
}";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("cannot have statements before first case/default label"));
}

#[test]
fn switch_requires_integer_condition() {
    let source = "void main() { float x = 1.0; switch (x) { case 1: break; } }";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("condition must be a scalar integer expression"));
}

// ---------------------------------------------------------------------------
// Functions and calls
// ---------------------------------------------------------------------------

#[test]
fn user_function_call_graph() {
    let source = "float helper(float x) { return x * 2.0; }
void main() { float y = helper(3.0); }";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);
    assert!(result
        .unit
        .call_graph
        .iter()
        .any(|edge| edge.caller.starts_with("main(") && edge.callee.starts_with("helper(")));
}

#[test]
fn call_with_implicit_promotion() {
    let source = "float helper(float x) { return x; }
void main() { float y = helper(3); }";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn unknown_overload_reported() {
    let source = "float helper(float x) { return x; }
void main() { float y = helper(3.0, 4.0); }";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("no matching overloaded function found"));
}

#[test]
fn constant_passed_as_out_parameter() {
    let source = "void setter(out int x) { x = 1; }
void main() { setter(4); }";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result
        .log
        .contains("Constant value cannot be passed for 'out' or 'inout' parameters."));
}

#[test]
fn function_already_has_body() {
    let source = "void f() {} void f() {} void main() {}";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("function already has a body"));
}

#[test]
fn non_void_function_must_return() {
    let source = "float f() { } void main() {}";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("function does not return a value"));
}

#[test]
fn array_length_method() {
    let source = "float a[7];
void main() { int n = a.length(); float b[a.length()]; b[6] = 1.0; }";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn builtin_math_calls() {
    let source = "void main() {
    vec3 a = normalize(vec3(1.0, 2.0, 2.0));
    float d = dot(a, a);
    float m = max(d, 0.5);
    vec3 c = cross(a, vec3(0.0, 1.0, 0.0));
    gl_Position = vec4(c * m, pow(d, 2.0));
}";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn texture_gather_version_gate() {
    let source = "uniform sampler2D s;
void main() { vec4 c = textureGather(s, vec2(0.5)); }";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("texture gather function"));

    let result = compile(source, &Options::new(400, Profile::Core, Stage::Vertex));
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn texture_gather_component_range() {
    let options = Options::new(400, Profile::Core, Stage::Vertex);
    let source = "uniform sampler2D s;
void main() { vec4 c = textureGather(s, vec2(0.5), 5); }";
    let result = compile(source, &options);
    assert!(!result.success);
    assert!(result.log.contains("must be 0, 1, 2, or 3"));

    let source = "uniform sampler2D s;
uniform int comp;
void main() { vec4 c = textureGather(s, vec2(0.5), comp); }";
    let result = compile(source, &options);
    assert!(!result.success);
    assert!(result.log.contains("must be a constant"));
}

// ---------------------------------------------------------------------------
// Structs, initializer lists, declarations
// ---------------------------------------------------------------------------

#[test]
fn struct_declaration_and_field_access() {
    let source = "struct Light { vec3 position; float intensity; };
void main() {
    Light light = Light(vec3(0.0), 2.0);
    float i = light.intensity;
    gl_Position = vec4(light.position, i);
}";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn struct_constructor_arity_checked() {
    let source = "struct Light { vec3 position; float intensity; };
void main() { Light light = Light(vec3(0.0)); }";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result
        .log
        .contains("Number of constructor parameters does not match"));
}

#[test]
fn no_such_field() {
    let source = "struct S { float a; };
void main() { S s = S(1.0); float x = s.b; }";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("no such field"));
}

#[test]
fn matrix_field_selection_rejected() {
    let source = "void main() { mat4 m = mat4(1.0); float x = m.x; }";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("field selection not allowed on matrix"));
}

#[test]
fn brace_initializer_for_vector_and_array() {
    let options = Options::new(430, Profile::Core, Stage::Vertex);
    let source = "void main() {
    vec3 v = { 1.0, 2.0, 3.0 };
    float a[3] = { 1.0, 2.0, 3.0 };
    float first = a[0] + v.x;
}";
    let result = compile(source, &options);
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn brace_initializer_wrong_arity() {
    let options = Options::new(430, Profile::Core, Stage::Vertex);
    let source = "void main() { vec3 v = { 1.0, 2.0 }; }";
    let result = compile(source, &options);
    assert!(!result.success);
    assert!(result.log.contains("wrong vector size"));
}

#[test]
fn const_requires_constant_initializer_at_global_scope() {
    let source = "uniform float u;
const float c = u;
void main() {}";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("global const initializers must be constant"));
}

#[test]
fn matrix_times_vector_folds() {
    // mat2 diagonal 2.0 times (3, 4) gives (6, 8); index 1 must be 8
    let source = "const vec2 v = mat2(2.0) * vec2(3.0, 4.0);
float arr[int(v.y)];
void main() { arr[7] = 1.0; }";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);

    let v = result.symbols.find("v").unwrap();
    let values = result.symbols.get(v.handle).const_array().unwrap();
    assert_eq!(values.get(0).as_double(), 6.0);
    assert_eq!(values.get(1).as_double(), 8.0);
}

#[test]
fn vector_equality_folds_round_trip() {
    // v.xyzw == v by value, proven through an array size: true -> 1
    let source = "const vec4 v = vec4(1.0, 2.0, 3.0, 4.0);
const vec4 w = v.xyzw;
void main() { }";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);
    let v = result.symbols.find("v").unwrap();
    let w = result.symbols.find("w").unwrap();
    let v_values = result.symbols.get(v.handle).const_array().unwrap();
    let w_values = result.symbols.get(w.handle).const_array().unwrap();
    assert_eq!(v_values, w_values);
}

#[test]
fn qualifier_order_enforced_pre_420() {
    // precision before storage is out of order before 420
    let source = "highp uniform float u; void main() {}";
    let result = compile(source, &Options::new(330, Profile::Core, Stage::Vertex));
    assert!(!result.success);
    assert!(result
        .log
        .contains("precision qualifier must appear as last qualifier"));
}

#[test]
fn invariant_requalification() {
    let source = "invariant gl_Position; void main() { gl_Position = vec4(0.0); }";
    let result = compile(source, &core330_vertex());
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn block_member_sampler_rejected() {
    let source = "uniform U { sampler2D s; } u; void main() {}";
    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("member of block cannot be a sampler type"));
}

#[test]
fn buffer_block_version_gate() {
    let source = "buffer B { float data[]; } b; void main() {}";
    let result = compile(source, &Options::new(430, Profile::Core, Stage::Vertex));
    assert!(result.success, "log: {}", result.log);

    let result = compile(source, &core330_vertex());
    assert!(!result.success);
}

#[test]
fn es_fragment_float_needs_precision() {
    let source = "void main() { float x = 1.0; }";
    let result = compile(source, &Options::new(100, Profile::Es, Stage::Fragment));
    assert!(!result.success);
    assert!(result
        .log
        .contains("type requires declaration of default precision qualifier"));

    let with_precision = "precision highp float; void main() { float x = 1.0; }";
    let result = compile(with_precision, &Options::new(100, Profile::Es, Stage::Fragment));
    assert!(result.success, "log: {}", result.log);
}

#[test]
fn discard_is_fragment_only() {
    let source = "void main() { discard; }";
    let result = compile(source, &Options::new(330, Profile::Core, Stage::Fragment));
    assert!(result.success, "log: {}", result.log);

    let result = compile(source, &core330_vertex());
    assert!(!result.success);
    assert!(result.log.contains("not supported in this stage:"));
}

#[test]
fn multiple_errors_surface_in_one_run() {
    let source = "void main() {
    float a = missing;
    vec4 v = vec4(0.0);
    float f = v.xyzwx.x;
    int b[2];
    b[5] = 1;
}";
    let result = compile(source, &desktop110_vertex());
    assert!(!result.success);
    assert!(result.error_count >= 3, "log: {}", result.log);
    assert!(result.log.contains("undeclared identifier"));
    assert!(result.log.contains("illegal vector field selection"));
    assert!(result.log.contains("array index out of range '5'"));
}
