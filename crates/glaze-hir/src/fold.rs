//! Constant folding over [`ConstArray`] values.
//!
//! Folding is component-wise for the arithmetic, bitwise, and logical
//! operators (with scalar operands smeared across the other side's
//! components) and shape-aware for the linear-algebra operators.

use crate::consts::{ConstArray, ConstValue};
use crate::node::Op;
use crate::types::{BasicType, Type};

/// Convert every component to the target basic type.
pub fn fold_convert(target: BasicType, values: &ConstArray) -> Option<ConstArray> {
    values
        .iter()
        .map(|v| convert_value(target, v))
        .collect::<Option<Vec<_>>>()
        .map(ConstArray::new)
}

fn convert_value(target: BasicType, value: ConstValue) -> Option<ConstValue> {
    Some(match target {
        BasicType::Bool => ConstValue::Bool(value.as_bool()),
        BasicType::Int => ConstValue::Int(value.as_int()),
        BasicType::Uint => ConstValue::Uint(value.as_uint()),
        BasicType::Float | BasicType::Double => ConstValue::Double(value.as_double()),
        _ => return None,
    })
}

/// Fold a unary operator. Returns `None` for operators that cannot be
/// applied to the operand's scalar kind.
pub fn fold_unary(op: Op, operand: &ConstArray) -> Option<ConstArray> {
    operand
        .iter()
        .map(|v| unary_value(op, v))
        .collect::<Option<Vec<_>>>()
        .map(ConstArray::new)
}

fn unary_value(op: Op, value: ConstValue) -> Option<ConstValue> {
    match (op, value) {
        (Op::Negate, ConstValue::Int(i)) => Some(ConstValue::Int(i.wrapping_neg())),
        (Op::Negate, ConstValue::Uint(u)) => Some(ConstValue::Uint(u.wrapping_neg())),
        (Op::Negate, ConstValue::Double(d)) => Some(ConstValue::Double(-d)),
        (Op::LogicalNot, ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
        (Op::BitwiseNot, ConstValue::Int(i)) => Some(ConstValue::Int(!i)),
        (Op::BitwiseNot, ConstValue::Uint(u)) => Some(ConstValue::Uint(!u)),
        _ => None,
    }
}

/// Fold a binary operator over two constant operands whose basic types
/// have already been unified by conversion.
pub fn fold_binary(
    op: Op,
    left: &ConstArray,
    left_ty: &Type,
    right: &ConstArray,
    right_ty: &Type,
) -> Option<ConstArray> {
    match op {
        Op::Add
        | Op::Sub
        | Op::Mul
        | Op::Div
        | Op::Mod
        | Op::BitwiseAnd
        | Op::BitwiseOr
        | Op::BitwiseXor
        | Op::ShiftLeft
        | Op::ShiftRight
        | Op::VectorTimesScalar
        | Op::MatrixTimesScalar => fold_componentwise(op, left, right),

        Op::Less | Op::LessEqual | Op::Greater | Op::GreaterEqual => {
            let ordering = left.get(0).as_double().partial_cmp(&right.get(0).as_double())?;
            let result = match op {
                Op::Less => ordering.is_lt(),
                Op::LessEqual => ordering.is_le(),
                Op::Greater => ordering.is_gt(),
                Op::GreaterEqual => ordering.is_ge(),
                _ => unreachable!(),
            };
            Some(ConstArray::scalar(ConstValue::Bool(result)))
        }

        Op::Equal | Op::NotEqual => {
            if left.len() != right.len() {
                return None;
            }
            let equal = left.iter().zip(right.iter()).all(|(a, b)| a == b);
            Some(ConstArray::scalar(ConstValue::Bool(if op == Op::Equal {
                equal
            } else {
                !equal
            })))
        }

        Op::LogicalAnd => Some(ConstArray::scalar(ConstValue::Bool(
            left.get(0).as_bool() && right.get(0).as_bool(),
        ))),
        Op::LogicalOr => Some(ConstArray::scalar(ConstValue::Bool(
            left.get(0).as_bool() || right.get(0).as_bool(),
        ))),
        Op::LogicalXor => Some(ConstArray::scalar(ConstValue::Bool(
            left.get(0).as_bool() != right.get(0).as_bool(),
        ))),

        Op::MatrixTimesVector => {
            let (cols, rows) = (left_ty.matrix_cols as usize, left_ty.matrix_rows as usize);
            let mut out = Vec::with_capacity(rows);
            for r in 0..rows {
                let mut sum = 0.0;
                for c in 0..cols {
                    sum += left.get(c * rows + r).as_double() * right.get(c).as_double();
                }
                out.push(ConstValue::Double(sum));
            }
            Some(ConstArray::new(out))
        }

        Op::VectorTimesMatrix => {
            let (cols, rows) = (right_ty.matrix_cols as usize, right_ty.matrix_rows as usize);
            let mut out = Vec::with_capacity(cols);
            for c in 0..cols {
                let mut sum = 0.0;
                for r in 0..rows {
                    sum += left.get(r).as_double() * right.get(c * rows + r).as_double();
                }
                out.push(ConstValue::Double(sum));
            }
            Some(ConstArray::new(out))
        }

        Op::MatrixTimesMatrix => {
            let left_rows = left_ty.matrix_rows as usize;
            let inner = left_ty.matrix_cols as usize;
            let right_cols = right_ty.matrix_cols as usize;
            let right_rows = right_ty.matrix_rows as usize;
            if inner != right_rows {
                return None;
            }
            let mut out = Vec::with_capacity(right_cols * left_rows);
            for c in 0..right_cols {
                for r in 0..left_rows {
                    let mut sum = 0.0;
                    for k in 0..inner {
                        sum += left.get(k * left_rows + r).as_double()
                            * right.get(c * right_rows + k).as_double();
                    }
                    out.push(ConstValue::Double(sum));
                }
            }
            Some(ConstArray::new(out))
        }

        _ => None,
    }
}

fn fold_componentwise(op: Op, left: &ConstArray, right: &ConstArray) -> Option<ConstArray> {
    let len = left.len().max(right.len());
    let mut out = Vec::with_capacity(len);
    for i in 0..len {
        // a scalar operand smears across the other side
        let a = left.get(if left.len() == 1 { 0 } else { i });
        let b = right.get(if right.len() == 1 { 0 } else { i });
        out.push(binary_value(op, a, b)?);
    }
    Some(ConstArray::new(out))
}

fn binary_value(op: Op, a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    use ConstValue::{Double, Int, Uint};
    Some(match (op, a, b) {
        (Op::Add, Int(x), Int(y)) => Int(x.wrapping_add(y)),
        (Op::Add, Uint(x), Uint(y)) => Uint(x.wrapping_add(y)),
        (Op::Add, Double(x), Double(y)) => Double(x + y),

        (Op::Sub, Int(x), Int(y)) => Int(x.wrapping_sub(y)),
        (Op::Sub, Uint(x), Uint(y)) => Uint(x.wrapping_sub(y)),
        (Op::Sub, Double(x), Double(y)) => Double(x - y),

        (Op::Mul | Op::VectorTimesScalar | Op::MatrixTimesScalar, Int(x), Int(y)) => {
            Int(x.wrapping_mul(y))
        }
        (Op::Mul | Op::VectorTimesScalar | Op::MatrixTimesScalar, Uint(x), Uint(y)) => {
            Uint(x.wrapping_mul(y))
        }
        (Op::Mul | Op::VectorTimesScalar | Op::MatrixTimesScalar, Double(x), Double(y)) => {
            Double(x * y)
        }

        // folding a division by zero yields zero; the shader is already
        // in error or relying on undefined behavior
        (Op::Div, Int(x), Int(y)) => Int(if y == 0 { 0 } else { x.wrapping_div(y) }),
        (Op::Div, Uint(x), Uint(y)) => Uint(if y == 0 { 0 } else { x / y }),
        (Op::Div, Double(x), Double(y)) => Double(x / y),

        (Op::Mod, Int(x), Int(y)) => Int(if y == 0 { 0 } else { x.wrapping_rem(y) }),
        (Op::Mod, Uint(x), Uint(y)) => Uint(if y == 0 { 0 } else { x % y }),

        (Op::BitwiseAnd, Int(x), Int(y)) => Int(x & y),
        (Op::BitwiseAnd, Uint(x), Uint(y)) => Uint(x & y),
        (Op::BitwiseOr, Int(x), Int(y)) => Int(x | y),
        (Op::BitwiseOr, Uint(x), Uint(y)) => Uint(x | y),
        (Op::BitwiseXor, Int(x), Int(y)) => Int(x ^ y),
        (Op::BitwiseXor, Uint(x), Uint(y)) => Uint(x ^ y),

        (Op::ShiftLeft, Int(x), Int(y)) => Int(x.wrapping_shl(y as u32)),
        (Op::ShiftLeft, Uint(x), Uint(y)) => Uint(x.wrapping_shl(y)),
        (Op::ShiftLeft, Int(x), Uint(y)) => Int(x.wrapping_shl(y)),
        (Op::ShiftLeft, Uint(x), Int(y)) => Uint(x.wrapping_shl(y as u32)),
        (Op::ShiftRight, Int(x), Int(y)) => Int(x.wrapping_shr(y as u32)),
        (Op::ShiftRight, Uint(x), Uint(y)) => Uint(x.wrapping_shr(y)),
        (Op::ShiftRight, Int(x), Uint(y)) => Int(x.wrapping_shr(y)),
        (Op::ShiftRight, Uint(x), Int(y)) => Uint(x.wrapping_shr(y as u32)),

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qualifier::Storage;

    fn doubles(values: &[f64]) -> ConstArray {
        ConstArray::new(values.iter().map(|&v| ConstValue::Double(v)).collect())
    }

    #[test]
    fn componentwise_add_with_smear() {
        let v = doubles(&[1.0, 2.0, 3.0]);
        let s = doubles(&[10.0]);
        let vec_ty = Type::vector(BasicType::Float, Storage::Const, 3);
        let out = fold_binary(Op::Add, &v, &vec_ty, &s, &vec_ty).unwrap();
        assert_eq!(out, doubles(&[11.0, 12.0, 13.0]));
    }

    #[test]
    fn integer_wrapping_and_zero_divide() {
        let a = ConstArray::scalar(ConstValue::Int(7));
        let zero = ConstArray::scalar(ConstValue::Int(0));
        let int_ty = Type::scalar(BasicType::Int, Storage::Const);
        let out = fold_binary(Op::Div, &a, &int_ty, &zero, &int_ty).unwrap();
        assert_eq!(out.get(0), ConstValue::Int(0));
    }

    #[test]
    fn comparison_folds_to_bool() {
        let a = ConstArray::scalar(ConstValue::Int(2));
        let b = ConstArray::scalar(ConstValue::Int(5));
        let int_ty = Type::scalar(BasicType::Int, Storage::Const);
        let out = fold_binary(Op::Less, &a, &int_ty, &b, &int_ty).unwrap();
        assert_eq!(out.get(0), ConstValue::Bool(true));
        let out = fold_binary(Op::GreaterEqual, &a, &int_ty, &b, &int_ty).unwrap();
        assert_eq!(out.get(0), ConstValue::Bool(false));
    }

    #[test]
    fn matrix_times_vector() {
        // column-major 2x2: [[1, 2], [3, 4]] (columns), times (1, 1)
        let m = doubles(&[1.0, 2.0, 3.0, 4.0]);
        let v = doubles(&[1.0, 1.0]);
        let m_ty = Type::matrix(BasicType::Float, Storage::Const, 2, 2);
        let v_ty = Type::vector(BasicType::Float, Storage::Const, 2);
        let out = fold_binary(Op::MatrixTimesVector, &m, &m_ty, &v, &v_ty).unwrap();
        assert_eq!(out, doubles(&[4.0, 6.0]));
    }

    #[test]
    fn identity_matrix_product() {
        let id = doubles(&[1.0, 0.0, 0.0, 1.0]);
        let m = doubles(&[5.0, 6.0, 7.0, 8.0]);
        let m_ty = Type::matrix(BasicType::Float, Storage::Const, 2, 2);
        let out = fold_binary(Op::MatrixTimesMatrix, &id, &m_ty, &m, &m_ty).unwrap();
        assert_eq!(out, m);
    }

    #[test]
    fn conversion_between_kinds() {
        let src = ConstArray::new(vec![ConstValue::Int(3), ConstValue::Int(0)]);
        let out = fold_convert(BasicType::Float, &src).unwrap();
        assert_eq!(out.get(0), ConstValue::Double(3.0));
        let out = fold_convert(BasicType::Bool, &src).unwrap();
        assert_eq!(out.get(0), ConstValue::Bool(true));
        assert_eq!(out.get(1), ConstValue::Bool(false));
    }

    #[test]
    fn unary_negate_and_not() {
        let v = ConstArray::new(vec![ConstValue::Int(4), ConstValue::Int(-4)]);
        let out = fold_unary(Op::Negate, &v).unwrap();
        assert_eq!(out.get(0), ConstValue::Int(-4));
        assert_eq!(out.get(1), ConstValue::Int(4));

        let b = ConstArray::scalar(ConstValue::Bool(false));
        let out = fold_unary(Op::LogicalNot, &b).unwrap();
        assert_eq!(out.get(0), ConstValue::Bool(true));

        assert!(fold_unary(Op::LogicalNot, &v).is_none());
    }
}
