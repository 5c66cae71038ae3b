//! The compilation unit and its node-building façade.
//!
//! The parse context drives semantic analysis through this narrow
//! interface; every constructor leaves the produced node fully typed.

use crate::arena::{Arena, Handle};
use crate::consts::{ConstArray, ConstValue};
use crate::fold;
use crate::node::{AggregateData, Node, NodeKind, Op};
use crate::qualifier::{Precision, Storage};
use crate::types::{BasicType, Type};
use crate::Loc;

/// One edge of the caller/callee graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
}

/// The HIR for a single shader compilation unit.
///
/// All nodes live in one arena owned by the unit and are dropped with
/// it; handles never dangle within a unit's lifetime.
#[derive(Clone, Debug, Default)]
pub struct Unit {
    pub nodes: Arena<Node>,
    /// Top-level nodes (function definitions, global initializers) in
    /// declaration order.
    pub root: Vec<Handle<Node>>,
    /// Symbol nodes for linker-visible objects, in declaration order.
    pub linkage: Vec<Handle<Node>>,
    /// Caller/callee edges in insertion order, deduplicated.
    pub call_graph: Vec<CallEdge>,
    /// Number of `main` definitions seen.
    pub main_count: u32,
}

impl Unit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, handle: Handle<Node>) -> &Node {
        &self.nodes[handle]
    }

    pub fn ty(&self, handle: Handle<Node>) -> &Type {
        &self.nodes[handle].ty
    }

    pub fn set_type(&mut self, handle: Handle<Node>, ty: Type) {
        self.nodes[handle].ty = ty;
    }

    pub fn storage(&self, handle: Handle<Node>) -> Storage {
        self.nodes[handle].ty.qualifier.storage
    }

    /// Both the node and its type claim constness.
    pub fn is_const_node(&self, handle: Handle<Node>) -> bool {
        self.nodes[handle].is_const() && self.storage(handle) == Storage::Const
    }

    pub fn aggregate_sequence(&self, handle: Handle<Node>) -> &[Handle<Node>] {
        match &self.nodes[handle].kind {
            NodeKind::Aggregate(data) => &data.sequence,
            _ => &[],
        }
    }

    pub fn aggregate_mut(&mut self, handle: Handle<Node>) -> Option<&mut AggregateData> {
        match &mut self.nodes[handle].kind {
            NodeKind::Aggregate(data) => Some(data),
            _ => None,
        }
    }

    // -----------------------------------------------------------------
    // Leaf builders
    // -----------------------------------------------------------------

    pub fn make_symbol_ref(
        &mut self,
        id: u32,
        name: &str,
        ty: Type,
        loc: Loc,
    ) -> Handle<Node> {
        self.nodes.append(Node {
            kind: NodeKind::Symbol {
                id,
                name: name.to_owned(),
            },
            ty,
            loc,
        })
    }

    pub fn make_const(&mut self, values: ConstArray, mut ty: Type, loc: Loc) -> Handle<Node> {
        ty.qualifier.storage = Storage::Const;
        self.nodes.append(Node {
            kind: NodeKind::Const(values),
            ty,
            loc,
        })
    }

    pub fn make_int_const(&mut self, value: i32, loc: Loc) -> Handle<Node> {
        self.make_const(
            ConstArray::scalar(ConstValue::Int(value)),
            Type::scalar(BasicType::Int, Storage::Const),
            loc,
        )
    }

    pub fn make_uint_const(&mut self, value: u32, loc: Loc) -> Handle<Node> {
        self.make_const(
            ConstArray::scalar(ConstValue::Uint(value)),
            Type::scalar(BasicType::Uint, Storage::Const),
            loc,
        )
    }

    pub fn make_bool_const(&mut self, value: bool, loc: Loc) -> Handle<Node> {
        self.make_const(
            ConstArray::scalar(ConstValue::Bool(value)),
            Type::scalar(BasicType::Bool, Storage::Const),
            loc,
        )
    }

    pub fn make_float_const(&mut self, value: f64, loc: Loc) -> Handle<Node> {
        self.make_const(
            ConstArray::scalar(ConstValue::Double(value)),
            Type::scalar(BasicType::Float, Storage::Const),
            loc,
        )
    }

    /// The typed recovery value every failed expression path yields.
    pub fn recovery_float_zero(&mut self, loc: Loc) -> Handle<Node> {
        self.make_float_const(0.0, loc)
    }

    // -----------------------------------------------------------------
    // Structure builders
    // -----------------------------------------------------------------

    /// Binary index node; the caller supplies the already-dereferenced
    /// result type.
    pub fn add_index(
        &mut self,
        op: Op,
        base: Handle<Node>,
        index: Handle<Node>,
        ty: Type,
        loc: Loc,
    ) -> Handle<Node> {
        self.nodes.append(Node {
            kind: NodeKind::Binary {
                op,
                left: base,
                right: index,
            },
            ty,
            loc,
        })
    }

    /// The constant-offset sequence on the right of a `VectorSwizzle`.
    pub fn make_swizzle(&mut self, offsets: &[u32], loc: Loc) -> Handle<Node> {
        let mut sequence = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            sequence.push(self.make_int_const(offset as i32, loc));
        }
        self.nodes.append(Node {
            kind: NodeKind::Aggregate(AggregateData {
                op: Some(Op::Sequence),
                sequence,
                ..AggregateData::default()
            }),
            ty: Type::scalar(BasicType::Int, Storage::Const),
            loc,
        })
    }

    pub fn make_method(
        &mut self,
        base: Handle<Node>,
        name: &str,
        return_ty: Type,
        loc: Loc,
    ) -> Handle<Node> {
        self.nodes.append(Node {
            kind: NodeKind::Method {
                base,
                name: name.to_owned(),
            },
            ty: return_ty,
            loc,
        })
    }

    /// Appends `right` to `left` if `left` is a raw (op-less)
    /// aggregate, otherwise wraps the operands in a fresh one.
    pub fn grow_aggregate(
        &mut self,
        left: Option<Handle<Node>>,
        right: Option<Handle<Node>>,
        loc: Loc,
    ) -> Handle<Node> {
        let aggregate = match left {
            Some(h) if matches!(&self.nodes[h].kind, NodeKind::Aggregate(data) if data.op.is_none()) => {
                h
            }
            _ => {
                let sequence = left.into_iter().collect();
                self.nodes.append(Node {
                    kind: NodeKind::Aggregate(AggregateData {
                        sequence,
                        ..AggregateData::default()
                    }),
                    ty: Type::new(BasicType::Void),
                    loc,
                })
            }
        };
        if let Some(right) = right {
            if let NodeKind::Aggregate(data) = &mut self.nodes[aggregate].kind {
                data.sequence.push(right);
            }
        }
        self.nodes[aggregate].loc = loc;
        aggregate
    }

    /// Turns `node` into (or wraps it in) an aggregate with the given
    /// operator and result type.
    pub fn set_aggregate_op(
        &mut self,
        node: Option<Handle<Node>>,
        op: Op,
        ty: Type,
        loc: Loc,
    ) -> Handle<Node> {
        let aggregate = match node {
            Some(h) if matches!(self.nodes[h].kind, NodeKind::Aggregate(_)) => h,
            _ => {
                let sequence = node.into_iter().collect();
                self.nodes.append(Node {
                    kind: NodeKind::Aggregate(AggregateData {
                        sequence,
                        ..AggregateData::default()
                    }),
                    ty: Type::new(BasicType::Void),
                    loc,
                })
            }
        };
        if let NodeKind::Aggregate(data) = &mut self.nodes[aggregate].kind {
            data.op = Some(op);
        }
        self.nodes[aggregate].ty = ty;
        self.nodes[aggregate].loc = loc;
        aggregate
    }

    // -----------------------------------------------------------------
    // Typed expression builders
    // -----------------------------------------------------------------

    /// Unary arithmetic with promotion and constant folding. The
    /// `Construct*` scalar ops act as conversions. Returns `None` when
    /// the operator cannot apply to the operand type.
    pub fn add_unary_math(
        &mut self,
        op: Op,
        operand: Handle<Node>,
        loc: Loc,
    ) -> Option<Handle<Node>> {
        let operand_ty = self.ty(operand).clone();

        let target_basic = match op {
            Op::ConstructFloat => Some(BasicType::Float),
            Op::ConstructDouble => Some(BasicType::Double),
            Op::ConstructInt => Some(BasicType::Int),
            Op::ConstructUint => Some(BasicType::Uint),
            Op::ConstructBool => Some(BasicType::Bool),
            _ => None,
        };
        if let Some(basic) = target_basic {
            let mut target = operand_ty.clone();
            target.basic = basic;
            target.qualifier.storage = Storage::Temporary;
            return self.add_conversion(op, &target, operand);
        }

        match op {
            Op::Negate => {
                if !operand_ty.basic.is_numeric() || operand_ty.is_array() {
                    return None;
                }
            }
            Op::LogicalNot => {
                if operand_ty.basic != BasicType::Bool || !operand_ty.is_scalar() {
                    return None;
                }
            }
            Op::BitwiseNot => {
                if !matches!(operand_ty.basic, BasicType::Int | BasicType::Uint)
                    || operand_ty.is_matrix()
                    || operand_ty.is_array()
                {
                    return None;
                }
            }
            Op::PreIncrement | Op::PreDecrement | Op::PostIncrement | Op::PostDecrement => {
                if !operand_ty.basic.is_numeric() || operand_ty.is_array() {
                    return None;
                }
            }
            _ => return None,
        }

        // fold pure unary operators over constant operands
        if !matches!(
            op,
            Op::PreIncrement | Op::PreDecrement | Op::PostIncrement | Op::PostDecrement
        ) {
            if let Some(values) = self.node(operand).as_const() {
                if let Some(folded) = fold::fold_unary(op, values) {
                    let mut ty = operand_ty;
                    ty.qualifier.storage = Storage::Const;
                    return Some(self.make_const(folded, ty, loc));
                }
            }
        }

        let mut ty = operand_ty;
        ty.qualifier.storage = Storage::Temporary;
        Some(self.nodes.append(Node {
            kind: NodeKind::Unary { op, operand },
            ty,
            loc,
        }))
    }

    /// Binary arithmetic: unifies operand basic types, selects the
    /// linear-algebra operator where shapes demand one, folds when both
    /// sides are constant. Returns `None` when no operation exists for
    /// the operand types.
    pub fn add_binary_math(
        &mut self,
        op: Op,
        left: Handle<Node>,
        right: Handle<Node>,
        loc: Loc,
    ) -> Option<Handle<Node>> {
        let left_ty = self.ty(left).clone();
        let right_ty = self.ty(right).clone();

        if left_ty.is_array() || right_ty.is_array() {
            // arrays participate only in (in)equality
            if !matches!(op, Op::Equal | Op::NotEqual) {
                return None;
            }
        }

        let (left, right) = self.unify_operands(op, left, right)?;
        let left_ty = self.ty(left).clone();
        let right_ty = self.ty(right).clone();

        let (result_op, mut result_ty) = promote_binary(op, &left_ty, &right_ty)?;

        let both_const = self.node(left).is_const() && self.node(right).is_const();
        if both_const {
            let lv = self.node(left).as_const().unwrap().clone();
            let rv = self.node(right).as_const().unwrap().clone();
            if let Some(folded) = fold::fold_binary(result_op, &lv, &left_ty, &rv, &right_ty) {
                result_ty.qualifier.storage = Storage::Const;
                return Some(self.make_const(folded, result_ty, loc));
            }
        }

        result_ty.qualifier.storage = Storage::Temporary;
        result_ty.qualifier.precision =
            left_ty.qualifier.precision.max(right_ty.qualifier.precision);
        Some(self.nodes.append(Node {
            kind: NodeKind::Binary {
                op: result_op,
                left,
                right,
            },
            ty: result_ty,
            loc,
        }))
    }

    /// Converts both operands to a common basic type where the operator
    /// requires one.
    fn unify_operands(
        &mut self,
        op: Op,
        left: Handle<Node>,
        right: Handle<Node>,
    ) -> Option<(Handle<Node>, Handle<Node>)> {
        // shifts keep their per-operand types
        if matches!(op, Op::ShiftLeft | Op::ShiftRight) {
            return Some((left, right));
        }
        let lb = self.ty(left).basic;
        let rb = self.ty(right).basic;
        if lb == rb {
            return Some((left, right));
        }
        let common = common_basic(lb, rb)?;
        let new_left = if lb == common {
            left
        } else {
            let mut target = self.ty(left).clone();
            target.basic = common;
            self.add_conversion(op, &target, left)?
        };
        let new_right = if rb == common {
            right
        } else {
            let mut target = self.ty(right).clone();
            target.basic = common;
            self.add_conversion(op, &target, right)?
        };
        Some((new_left, new_right))
    }

    /// Convert `node` to the target's basic type, keeping the node's
    /// shape. Constructor/`Convert` contexts allow any scalar-kind
    /// change; other contexts allow only implicit widening. `None` on
    /// failure.
    pub fn add_conversion(
        &mut self,
        op: Op,
        target: &Type,
        node: Handle<Node>,
    ) -> Option<Handle<Node>> {
        let node_ty = self.ty(node).clone();
        if node_ty.basic == target.basic {
            return Some(node);
        }
        if node_ty.is_array() || target.is_array() {
            return None;
        }
        if !conversion_exists(op, node_ty.basic, target.basic) {
            return None;
        }

        let mut result_ty = node_ty.clone();
        result_ty.basic = target.basic;
        if result_ty.basic == BasicType::Bool {
            result_ty.qualifier.precision = Precision::None;
        }

        if let Some(values) = self.node(node).as_const() {
            let folded = fold::fold_convert(target.basic, values)?;
            result_ty.qualifier.storage = Storage::Const;
            return Some(self.make_const(folded, result_ty, self.node(node).loc));
        }

        result_ty.qualifier.storage = Storage::Temporary;
        let loc = self.node(node).loc;
        Some(self.nodes.append(Node {
            kind: NodeKind::Unary {
                op: Op::Convert,
                operand: node,
            },
            ty: result_ty,
            loc,
        }))
    }

    /// Assignment (plain or compound). The right side is implicitly
    /// converted to the left side's type; `None` when no conversion
    /// exists.
    pub fn add_assign(
        &mut self,
        op: Op,
        left: Handle<Node>,
        right: Handle<Node>,
        loc: Loc,
    ) -> Option<Handle<Node>> {
        let left_ty = self.ty(left).clone();
        let right = self.add_conversion(Op::Assign, &left_ty, right)?;
        let right_ty = self.ty(right).clone();

        let shapes_ok = if op == Op::Assign {
            left_ty.same_type(&right_ty)
        } else {
            // compound assignment admits a scalar right side smeared
            // over a vector or matrix left side
            left_ty.same_type(&right_ty)
                || (right_ty.is_scalar() && !left_ty.is_array() && !left_ty.is_struct())
        };
        if !shapes_ok {
            return None;
        }

        let mut result_ty = left_ty;
        result_ty.qualifier.storage = Storage::Temporary;
        Some(self.nodes.append(Node {
            kind: NodeKind::Binary { op, left, right },
            ty: result_ty,
            loc,
        }))
    }

    /// A call to a built-in function that maps to an operation.
    pub fn add_builtin_call(
        &mut self,
        loc: Loc,
        op: Op,
        unary: bool,
        arguments: Handle<Node>,
        return_ty: Type,
    ) -> Option<Handle<Node>> {
        if unary {
            let operand = match &self.nodes[arguments].kind {
                NodeKind::Aggregate(data) if data.sequence.len() == 1 => data.sequence[0],
                NodeKind::Aggregate(_) => return None,
                _ => arguments,
            };
            Some(self.nodes.append(Node {
                kind: NodeKind::Unary { op, operand },
                ty: return_ty,
                loc,
            }))
        } else {
            Some(self.set_aggregate_op(Some(arguments), op, return_ty, loc))
        }
    }

    /// The `?:` operator. Arms are unified by implicit conversion.
    pub fn add_ternary(
        &mut self,
        condition: Handle<Node>,
        accept: Handle<Node>,
        reject: Handle<Node>,
        loc: Loc,
    ) -> Option<Handle<Node>> {
        let accept_ty = self.ty(accept).clone();
        let reject = self.add_conversion(Op::Assign, &accept_ty, reject)?;
        if !self.ty(reject).same_type(&accept_ty) {
            return None;
        }
        let mut ty = accept_ty;
        ty.qualifier.storage = Storage::Temporary;
        Some(self.nodes.append(Node {
            kind: NodeKind::Selection {
                condition,
                accept: Some(accept),
                reject: Some(reject),
            },
            ty,
            loc,
        }))
    }

    /// An `if` statement (no value).
    pub fn add_if(
        &mut self,
        condition: Handle<Node>,
        accept: Option<Handle<Node>>,
        reject: Option<Handle<Node>>,
        loc: Loc,
    ) -> Handle<Node> {
        self.nodes.append(Node {
            kind: NodeKind::Selection {
                condition,
                accept,
                reject,
            },
            ty: Type::new(BasicType::Void),
            loc,
        })
    }

    pub fn add_branch(
        &mut self,
        op: Op,
        expression: Option<Handle<Node>>,
        loc: Loc,
    ) -> Handle<Node> {
        self.nodes.append(Node {
            kind: NodeKind::Branch { op, expression },
            ty: Type::new(BasicType::Void),
            loc,
        })
    }

    pub fn add_loop(
        &mut self,
        body: Option<Handle<Node>>,
        test: Option<Handle<Node>>,
        terminal: Option<Handle<Node>>,
        test_first: bool,
        loc: Loc,
    ) -> Handle<Node> {
        self.nodes.append(Node {
            kind: NodeKind::Loop {
                body,
                test,
                terminal,
                test_first,
            },
            ty: Type::new(BasicType::Void),
            loc,
        })
    }

    pub fn add_switch_node(
        &mut self,
        expression: Handle<Node>,
        body: Handle<Node>,
        loc: Loc,
    ) -> Handle<Node> {
        self.nodes.append(Node {
            kind: NodeKind::Switch { expression, body },
            ty: Type::new(BasicType::Void),
            loc,
        })
    }

    /// The comma operator: both sides execute, the right side's value
    /// and type flow through.
    pub fn add_comma(
        &mut self,
        left: Handle<Node>,
        right: Handle<Node>,
        loc: Loc,
    ) -> Handle<Node> {
        let mut ty = self.ty(right).clone();
        ty.qualifier.storage = Storage::Temporary;
        let aggregate = self.grow_aggregate(None, Some(left), loc);
        let aggregate = self.grow_aggregate(Some(aggregate), Some(right), loc);
        self.set_aggregate_op(Some(aggregate), Op::Comma, ty, loc)
    }

    /// A function definition: `Function` aggregate over the parameter
    /// list and the body, appended to the unit root.
    pub fn add_function_definition(
        &mut self,
        mangled_name: &str,
        return_ty: Type,
        parameters: Handle<Node>,
        body: Handle<Node>,
        loc: Loc,
    ) -> Handle<Node> {
        let aggregate = self.grow_aggregate(None, Some(parameters), loc);
        let aggregate = self.grow_aggregate(Some(aggregate), Some(body), loc);
        let function = self.set_aggregate_op(Some(aggregate), Op::Function, return_ty, loc);
        if let Some(data) = self.aggregate_mut(function) {
            data.name = Some(mangled_name.to_owned());
        }
        self.root.push(function);
        function
    }

    // -----------------------------------------------------------------
    // Unit-level bookkeeping
    // -----------------------------------------------------------------

    pub fn add_to_call_graph(&mut self, caller: &str, callee: &str) {
        let edge = CallEdge {
            caller: caller.to_owned(),
            callee: callee.to_owned(),
        };
        if !self.call_graph.contains(&edge) {
            self.call_graph.push(edge);
        }
    }

    pub fn add_main_count(&mut self) {
        self.main_count += 1;
    }

    /// Record a linker-visible object.
    pub fn add_linkage_symbol(&mut self, id: u32, name: &str, ty: Type, loc: Loc) {
        let node = self.make_symbol_ref(id, name, ty, loc);
        self.linkage.push(node);
    }
}

/// The common basic type two operands convert to, by rank.
fn common_basic(a: BasicType, b: BasicType) -> Option<BasicType> {
    fn rank(basic: BasicType) -> Option<u32> {
        match basic {
            BasicType::Int => Some(0),
            BasicType::Uint => Some(1),
            BasicType::Float => Some(2),
            BasicType::Double => Some(3),
            _ => None,
        }
    }
    let (ra, rb) = (rank(a)?, rank(b)?);
    Some(if ra >= rb { a } else { b })
}

/// Whether a conversion from `from` to `to` exists in the given
/// operator context.
fn conversion_exists(op: Op, from: BasicType, to: BasicType) -> bool {
    let explicit = matches!(
        op,
        Op::ConstructFloat
            | Op::ConstructDouble
            | Op::ConstructInt
            | Op::ConstructUint
            | Op::ConstructBool
            | Op::Convert
    );
    if explicit {
        let convertible = |b: BasicType| {
            matches!(
                b,
                BasicType::Bool | BasicType::Int | BasicType::Uint | BasicType::Float
                    | BasicType::Double
            )
        };
        return convertible(from) && convertible(to);
    }
    // implicit widening only
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

/// Shape analysis for a binary operator: picks the concrete operator
/// (e.g. `Mul` vs `MatrixTimesVector`) and the result type.
fn promote_binary(op: Op, left: &Type, right: &Type) -> Option<(Op, Type)> {
    let bool_scalar = Type::scalar(BasicType::Bool, Storage::Temporary);
    match op {
        Op::Equal | Op::NotEqual => {
            if left.same_type(right) {
                Some((op, bool_scalar))
            } else {
                None
            }
        }
        Op::Less | Op::LessEqual | Op::Greater | Op::GreaterEqual => {
            if left.is_scalar() && right.is_scalar() && left.basic.is_numeric()
                && right.basic.is_numeric()
            {
                Some((op, bool_scalar))
            } else {
                None
            }
        }
        Op::LogicalAnd | Op::LogicalOr | Op::LogicalXor => {
            if left.basic == BasicType::Bool && right.basic == BasicType::Bool
                && left.is_scalar()
                && right.is_scalar()
            {
                Some((op, bool_scalar))
            } else {
                None
            }
        }
        Op::Mul => promote_multiply(left, right),
        Op::Add | Op::Sub | Op::Div => promote_componentwise(op, left, right, false),
        Op::Mod | Op::BitwiseAnd | Op::BitwiseOr | Op::BitwiseXor => {
            promote_componentwise(op, left, right, true)
        }
        Op::ShiftLeft | Op::ShiftRight => {
            let integer = |t: &Type| matches!(t.basic, BasicType::Int | BasicType::Uint);
            if !integer(left) || !integer(right) || left.is_matrix() || right.is_matrix() {
                return None;
            }
            if left.vector_size == right.vector_size || right.is_scalar() {
                Some((op, Type::vector(left.basic, Storage::Temporary, left.vector_size)))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn promote_multiply(left: &Type, right: &Type) -> Option<(Op, Type)> {
    if !left.basic.is_numeric() || !right.basic.is_numeric() {
        return None;
    }
    let basic = left.basic;
    let temp = Storage::Temporary;
    match (
        left.is_matrix(),
        left.is_vector(),
        right.is_matrix(),
        right.is_vector(),
    ) {
        // scalar * scalar
        (false, false, false, false) => Some((Op::Mul, Type::scalar(basic, temp))),
        // vector * vector
        (false, true, false, true) if left.vector_size == right.vector_size => {
            Some((Op::Mul, Type::vector(basic, temp, left.vector_size)))
        }
        // vector * scalar, scalar * vector
        (false, true, false, false) => Some((
            Op::VectorTimesScalar,
            Type::vector(basic, temp, left.vector_size),
        )),
        (false, false, false, true) => Some((
            Op::VectorTimesScalar,
            Type::vector(basic, temp, right.vector_size),
        )),
        // matrix * scalar, scalar * matrix
        (true, _, false, false) if right.is_scalar() => Some((
            Op::MatrixTimesScalar,
            Type::matrix(basic, temp, left.matrix_cols, left.matrix_rows),
        )),
        (false, false, true, _) => Some((
            Op::MatrixTimesScalar,
            Type::matrix(basic, temp, right.matrix_cols, right.matrix_rows),
        )),
        // matrix * vector
        (true, _, false, true) if left.matrix_cols == right.vector_size => Some((
            Op::MatrixTimesVector,
            Type::vector(basic, temp, left.matrix_rows),
        )),
        // vector * matrix
        (false, true, true, _) if left.vector_size == right.matrix_rows => Some((
            Op::VectorTimesMatrix,
            Type::vector(basic, temp, right.matrix_cols),
        )),
        // matrix * matrix
        (true, _, true, _) if left.matrix_cols == right.matrix_rows => Some((
            Op::MatrixTimesMatrix,
            Type::matrix(basic, temp, right.matrix_cols, left.matrix_rows),
        )),
        _ => None,
    }
}

fn promote_componentwise(
    op: Op,
    left: &Type,
    right: &Type,
    integer_only: bool,
) -> Option<(Op, Type)> {
    if integer_only {
        let integer = |t: &Type| matches!(t.basic, BasicType::Int | BasicType::Uint);
        if !integer(left) || !integer(right) {
            return None;
        }
    } else if !left.basic.is_numeric() || !right.basic.is_numeric() {
        return None;
    }
    if left.is_matrix() != right.is_matrix() && !left.is_scalar() && !right.is_scalar() {
        return None;
    }

    let basic = left.basic;
    let temp = Storage::Temporary;
    if left.is_matrix() || right.is_matrix() {
        let (cols, rows) = if left.is_matrix() {
            (left.matrix_cols, left.matrix_rows)
        } else {
            (right.matrix_cols, right.matrix_rows)
        };
        if left.is_matrix() && right.is_matrix() {
            if left.matrix_cols != right.matrix_cols || left.matrix_rows != right.matrix_rows {
                return None;
            }
        } else if !(left.is_scalar() || right.is_scalar()) {
            return None;
        }
        return Some((op, Type::matrix(basic, temp, cols, rows)));
    }

    let size = if left.vector_size == right.vector_size {
        left.vector_size
    } else if left.is_scalar() {
        right.vector_size
    } else if right.is_scalar() {
        left.vector_size
    } else {
        return None;
    };
    if size == 1 {
        Some((op, Type::scalar(basic, temp)))
    } else {
        Some((op, Type::vector(basic, temp, size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn const_binary_folds() {
        let mut unit = Unit::new();
        let loc = Loc::default();
        let a = unit.make_float_const(2.0, loc);
        let b = unit.make_float_const(3.0, loc);
        let sum = unit.add_binary_math(Op::Add, a, b, loc).unwrap();
        let node = unit.node(sum);
        assert_eq!(node.as_const().unwrap().get(0), ConstValue::Double(5.0));
        assert_eq!(node.ty.qualifier.storage, Storage::Const);
    }

    #[test]
    fn mixed_const_int_float_promotes() {
        let mut unit = Unit::new();
        let loc = Loc::default();
        let a = unit.make_int_const(2, loc);
        let b = unit.make_float_const(0.5, loc);
        let product = unit.add_binary_math(Op::Mul, a, b, loc).unwrap();
        let node = unit.node(product);
        assert_eq!(node.ty.basic, BasicType::Float);
        assert_eq!(node.as_const().unwrap().get(0), ConstValue::Double(1.0));
    }

    #[test]
    fn matrix_vector_shapes() {
        let m = Type::matrix(BasicType::Float, Storage::Temporary, 4, 4);
        let v = Type::vector(BasicType::Float, Storage::Temporary, 4);
        let (op, ty) = promote_binary(Op::Mul, &m, &v).unwrap();
        assert_eq!(op, Op::MatrixTimesVector);
        assert_eq!(ty.vector_size, 4);
        assert!(!ty.is_matrix());

        let (op, ty) = promote_binary(Op::Mul, &v, &m).unwrap();
        assert_eq!(op, Op::VectorTimesMatrix);
        assert_eq!(ty.vector_size, 4);

        let m34 = Type::matrix(BasicType::Float, Storage::Temporary, 3, 4);
        let m23 = Type::matrix(BasicType::Float, Storage::Temporary, 2, 3);
        let (op, ty) = promote_binary(Op::Mul, &m34, &m23).unwrap();
        assert_eq!(op, Op::MatrixTimesMatrix);
        assert_eq!((ty.matrix_cols, ty.matrix_rows), (2, 4));

        // inner dimensions must agree
        assert!(promote_binary(Op::Mul, &m23, &m23).is_none());
    }

    #[test]
    fn relational_requires_scalars() {
        let v = Type::vector(BasicType::Float, Storage::Temporary, 3);
        let s = Type::scalar(BasicType::Float, Storage::Temporary);
        assert!(promote_binary(Op::Less, &v, &s).is_none());
        let (op, ty) = promote_binary(Op::Less, &s, &s).unwrap();
        assert_eq!(op, Op::Less);
        assert_eq!(ty.basic, BasicType::Bool);
    }

    #[test]
    fn implicit_conversion_only_widens() {
        assert!(conversion_exists(Op::Assign, BasicType::Int, BasicType::Float));
        assert!(conversion_exists(Op::Assign, BasicType::Uint, BasicType::Float));
        assert!(!conversion_exists(Op::Assign, BasicType::Float, BasicType::Int));
        assert!(!conversion_exists(Op::Assign, BasicType::Bool, BasicType::Int));
        // constructors convert freely
        assert!(conversion_exists(Op::ConstructInt, BasicType::Float, BasicType::Int));
        assert!(conversion_exists(Op::ConstructBool, BasicType::Float, BasicType::Bool));
    }

    #[test]
    fn conversion_folds_constants() {
        let mut unit = Unit::new();
        let loc = Loc::default();
        let i = unit.make_int_const(3, loc);
        let target = Type::scalar(BasicType::Float, Storage::Temporary);
        let converted = unit.add_conversion(Op::Assign, &target, i).unwrap();
        let node = unit.node(converted);
        assert_eq!(node.ty.basic, BasicType::Float);
        assert_eq!(node.as_const().unwrap().get(0), ConstValue::Double(3.0));
    }

    #[test]
    fn assign_rejects_shape_mismatch() {
        let mut unit = Unit::new();
        let loc = Loc::default();
        let target = unit.make_symbol_ref(
            1,
            "v",
            Type::vector(BasicType::Float, Storage::Temporary, 3),
            loc,
        );
        let scalar = unit.make_float_const(1.0, loc);
        assert!(unit.add_assign(Op::Assign, target, scalar, loc).is_none());
        // compound assignment smears the scalar
        assert!(unit.add_assign(Op::MulAssign, target, scalar, loc).is_some());
    }

    #[test]
    fn call_graph_dedups() {
        let mut unit = Unit::new();
        unit.add_to_call_graph("main(", "f(i1;");
        unit.add_to_call_graph("main(", "f(i1;");
        unit.add_to_call_graph("main(", "g(");
        assert_eq!(unit.call_graph.len(), 2);
    }

    #[test]
    fn grow_and_set_aggregate() {
        let mut unit = Unit::new();
        let loc = Loc::default();
        let a = unit.make_int_const(1, loc);
        let b = unit.make_int_const(2, loc);
        let list = unit.grow_aggregate(Some(a), Some(b), loc);
        assert_eq!(unit.aggregate_sequence(list).len(), 2);

        let seq = unit.set_aggregate_op(
            Some(list),
            Op::Sequence,
            Type::new(BasicType::Void),
            loc,
        );
        assert_eq!(seq, list);
        assert_eq!(unit.node(seq).op(), Some(Op::Sequence));
    }
}
