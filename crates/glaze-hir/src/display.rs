//! Human-readable rendering of a compilation unit's HIR.

use std::fmt::Write;

use crate::arena::Handle;
use crate::build::Unit;
use crate::consts::ConstValue;
use crate::node::{Node, NodeKind, Op};

/// Renders the whole unit: root nodes, linkage objects, and the call
/// graph.
pub fn dump_unit(unit: &Unit) -> String {
    let mut out = String::new();
    out.push_str("Shader HIR:\n");
    for &node in &unit.root {
        dump_node(unit, node, 1, &mut out);
    }
    if !unit.linkage.is_empty() {
        out.push_str("Linker Objects:\n");
        for &node in &unit.linkage {
            dump_node(unit, node, 1, &mut out);
        }
    }
    if !unit.call_graph.is_empty() {
        out.push_str("Call Graph:\n");
        for edge in &unit.call_graph {
            let _ = writeln!(out, "  {} -> {}", edge.caller, edge.callee);
        }
    }
    out
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn dump_node(unit: &Unit, handle: Handle<Node>, depth: usize, out: &mut String) {
    let node = unit.node(handle);
    indent(depth, out);
    match &node.kind {
        NodeKind::Symbol { id, name } => {
            let _ = writeln!(out, "'{}' ({}) [id {}] ({})", name, node.ty.complete_string(), id, node.loc);
        }
        NodeKind::Const(values) => {
            let rendered: Vec<String> = values
                .iter()
                .map(|v| match v {
                    ConstValue::Bool(b) => b.to_string(),
                    ConstValue::Int(i) => i.to_string(),
                    ConstValue::Uint(u) => format!("{u}u"),
                    ConstValue::Double(d) => format!("{d:.6}"),
                })
                .collect();
            let _ = writeln!(
                out,
                "Constant [{}] ({})",
                rendered.join(", "),
                node.ty.complete_string()
            );
        }
        NodeKind::Binary { op, left, right } => {
            let _ = writeln!(out, "{} ({})", op_string(*op), node.ty.complete_string());
            dump_node(unit, *left, depth + 1, out);
            dump_node(unit, *right, depth + 1, out);
        }
        NodeKind::Unary { op, operand } => {
            let _ = writeln!(out, "{} ({})", op_string(*op), node.ty.complete_string());
            dump_node(unit, *operand, depth + 1, out);
        }
        NodeKind::Aggregate(data) => {
            let op = data.op.map_or("list", op_string);
            match &data.name {
                Some(name) => {
                    let _ = writeln!(out, "{} '{}' ({})", op, name, node.ty.complete_string());
                }
                None => {
                    let _ = writeln!(out, "{} ({})", op, node.ty.complete_string());
                }
            }
            for &child in &data.sequence {
                dump_node(unit, child, depth + 1, out);
            }
        }
        NodeKind::Method { base, name } => {
            let _ = writeln!(out, "method '{}' ({})", name, node.ty.complete_string());
            dump_node(unit, *base, depth + 1, out);
        }
        NodeKind::Selection {
            condition,
            accept,
            reject,
        } => {
            let _ = writeln!(out, "selection ({})", node.ty.complete_string());
            dump_node(unit, *condition, depth + 1, out);
            if let Some(accept) = accept {
                indent(depth + 1, out);
                out.push_str("then:\n");
                dump_node(unit, *accept, depth + 2, out);
            }
            if let Some(reject) = reject {
                indent(depth + 1, out);
                out.push_str("else:\n");
                dump_node(unit, *reject, depth + 2, out);
            }
        }
        NodeKind::Switch { expression, body } => {
            out.push_str("switch\n");
            dump_node(unit, *expression, depth + 1, out);
            dump_node(unit, *body, depth + 1, out);
        }
        NodeKind::Loop {
            body,
            test,
            terminal,
            test_first,
        } => {
            let _ = writeln!(out, "loop (test {})", if *test_first { "first" } else { "last" });
            if let Some(test) = test {
                indent(depth + 1, out);
                out.push_str("condition:\n");
                dump_node(unit, *test, depth + 2, out);
            }
            if let Some(terminal) = terminal {
                indent(depth + 1, out);
                out.push_str("terminal:\n");
                dump_node(unit, *terminal, depth + 2, out);
            }
            if let Some(body) = body {
                indent(depth + 1, out);
                out.push_str("body:\n");
                dump_node(unit, *body, depth + 2, out);
            }
        }
        NodeKind::Branch { op, expression } => {
            let _ = writeln!(out, "{}", op_string(*op));
            if let Some(expression) = expression {
                dump_node(unit, *expression, depth + 1, out);
            }
        }
    }
}

fn op_string(op: Op) -> &'static str {
    use Op::*;
    match op {
        Sequence => "sequence",
        Parameters => "parameters",
        Function => "function definition",
        FunctionCall => "function call",
        Comma => "comma",
        IndexDirect => "direct index",
        IndexIndirect => "indirect index",
        IndexDirectStruct => "direct index (structure)",
        VectorSwizzle => "vector swizzle",
        Assign => "move second child to first child",
        AddAssign => "add second child into first child",
        SubAssign => "subtract second child into first child",
        MulAssign => "multiply second child into first child",
        DivAssign => "divide second child into first child",
        ModAssign => "mod second child into first child",
        AndAssign => "and second child into first child",
        OrAssign => "or second child into first child",
        XorAssign => "xor second child into first child",
        ShiftLeftAssign => "shift-left second child into first child",
        ShiftRightAssign => "shift-right second child into first child",
        Add => "add",
        Sub => "subtract",
        Mul => "component-wise multiply",
        Div => "divide",
        Mod => "mod",
        VectorTimesScalar => "vector-scale",
        VectorTimesMatrix => "vector-times-matrix",
        MatrixTimesScalar => "matrix-scale",
        MatrixTimesVector => "matrix-times-vector",
        MatrixTimesMatrix => "matrix-multiply",
        Equal => "compare ==",
        NotEqual => "compare !=",
        Less => "compare <",
        LessEqual => "compare <=",
        Greater => "compare >",
        GreaterEqual => "compare >=",
        LogicalAnd => "logical and",
        LogicalOr => "logical or",
        LogicalXor => "logical xor",
        LogicalNot => "negate conditional",
        BitwiseAnd => "bitwise and",
        BitwiseOr => "bitwise or",
        BitwiseXor => "bitwise xor",
        BitwiseNot => "bitwise not",
        ShiftLeft => "shift left",
        ShiftRight => "shift right",
        Negate => "negate",
        PreIncrement => "pre-increment",
        PreDecrement => "pre-decrement",
        PostIncrement => "post-increment",
        PostDecrement => "post-decrement",
        Convert => "convert",
        Sin => "sin",
        Cos => "cos",
        Sqrt => "sqrt",
        InverseSqrt => "inverse sqrt",
        Abs => "abs",
        Sign => "sign",
        Floor => "floor",
        Fract => "fract",
        Exp => "exp",
        Log => "log",
        Exp2 => "exp2",
        Log2 => "log2",
        Pow => "pow",
        Min => "min",
        Max => "max",
        Clamp => "clamp",
        Mix => "mix",
        Step => "step",
        SmoothStep => "smoothstep",
        Length => "length",
        Distance => "distance",
        Dot => "dot product",
        Cross => "cross product",
        Normalize => "normalize",
        Reflect => "reflect",
        ConstructFloat => "construct float",
        ConstructVec2 => "construct vec2",
        ConstructVec3 => "construct vec3",
        ConstructVec4 => "construct vec4",
        ConstructDouble => "construct double",
        ConstructDVec2 => "construct dvec2",
        ConstructDVec3 => "construct dvec3",
        ConstructDVec4 => "construct dvec4",
        ConstructInt => "construct int",
        ConstructIVec2 => "construct ivec2",
        ConstructIVec3 => "construct ivec3",
        ConstructIVec4 => "construct ivec4",
        ConstructUint => "construct uint",
        ConstructUVec2 => "construct uvec2",
        ConstructUVec3 => "construct uvec3",
        ConstructUVec4 => "construct uvec4",
        ConstructBool => "construct bool",
        ConstructBVec2 => "construct bvec2",
        ConstructBVec3 => "construct bvec3",
        ConstructBVec4 => "construct bvec4",
        ConstructMat2x2 => "construct mat2",
        ConstructMat2x3 => "construct mat2x3",
        ConstructMat2x4 => "construct mat2x4",
        ConstructMat3x2 => "construct mat3x2",
        ConstructMat3x3 => "construct mat3",
        ConstructMat3x4 => "construct mat3x4",
        ConstructMat4x2 => "construct mat4x2",
        ConstructMat4x3 => "construct mat4x3",
        ConstructMat4x4 => "construct mat4",
        ConstructDMat2x2 => "construct dmat2",
        ConstructDMat2x3 => "construct dmat2x3",
        ConstructDMat2x4 => "construct dmat2x4",
        ConstructDMat3x2 => "construct dmat3x2",
        ConstructDMat3x3 => "construct dmat3",
        ConstructDMat3x4 => "construct dmat3x4",
        ConstructDMat4x2 => "construct dmat4x2",
        ConstructDMat4x3 => "construct dmat4x3",
        ConstructDMat4x4 => "construct dmat4",
        ConstructStruct => "construct structure",
        Return => "branch: return",
        Break => "branch: break",
        Continue => "branch: continue",
        Discard => "branch: discard",
        Case => "case",
        Default => "default",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BasicType, Type};
    use crate::Loc;

    #[test]
    fn dump_mentions_symbols_and_constants() {
        let mut unit = Unit::new();
        let loc = Loc { string: 0, line: 3 };
        let sym = unit.make_symbol_ref(
            1,
            "position",
            Type::vector(BasicType::Float, crate::qualifier::Storage::VaryingIn, 4),
            loc,
        );
        let value = unit.make_float_const(1.5, loc);
        let assign = unit.add_assign(Op::Assign, sym, value, loc);
        assert!(assign.is_none()); // vec4 = float has no conversion

        unit.linkage.push(sym);
        unit.root.push(value);
        let dump = dump_unit(&unit);
        assert!(dump.contains("'position'"));
        assert!(dump.contains("Constant [1.500000]"));
        assert!(dump.contains("Linker Objects:"));
    }
}
