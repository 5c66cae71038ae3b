//! HIR nodes: a typed tree with a tagged-variant payload.

use crate::arena::Handle;
use crate::consts::ConstArray;
use crate::qualifier::Storage;
use crate::types::Type;
use crate::Loc;

/// Operators carried by unary, binary, aggregate, and branch nodes.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Op {
    // Aggregates
    Sequence,
    Parameters,
    Function,
    FunctionCall,
    Comma,

    // Dereference and assignment
    IndexDirect,
    IndexIndirect,
    IndexDirectStruct,
    VectorSwizzle,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShiftLeftAssign,
    ShiftRightAssign,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    VectorTimesScalar,
    VectorTimesMatrix,
    MatrixTimesScalar,
    MatrixTimesVector,
    MatrixTimesMatrix,

    // Comparison
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,

    // Logical
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    LogicalNot,

    // Bitwise
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseNot,
    ShiftLeft,
    ShiftRight,

    // Unary arithmetic
    Negate,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
    /// Scalar-kind conversion; the target is the node's type.
    Convert,

    // Built-in functions mapped to operations
    Sin,
    Cos,
    Sqrt,
    InverseSqrt,
    Abs,
    Sign,
    Floor,
    Fract,
    Exp,
    Log,
    Exp2,
    Log2,
    Pow,
    Min,
    Max,
    Clamp,
    Mix,
    Step,
    SmoothStep,
    Length,
    Distance,
    Dot,
    Cross,
    Normalize,
    Reflect,

    // Constructors
    ConstructFloat,
    ConstructVec2,
    ConstructVec3,
    ConstructVec4,
    ConstructDouble,
    ConstructDVec2,
    ConstructDVec3,
    ConstructDVec4,
    ConstructInt,
    ConstructIVec2,
    ConstructIVec3,
    ConstructIVec4,
    ConstructUint,
    ConstructUVec2,
    ConstructUVec3,
    ConstructUVec4,
    ConstructBool,
    ConstructBVec2,
    ConstructBVec3,
    ConstructBVec4,
    ConstructMat2x2,
    ConstructMat2x3,
    ConstructMat2x4,
    ConstructMat3x2,
    ConstructMat3x3,
    ConstructMat3x4,
    ConstructMat4x2,
    ConstructMat4x3,
    ConstructMat4x4,
    ConstructDMat2x2,
    ConstructDMat2x3,
    ConstructDMat2x4,
    ConstructDMat3x2,
    ConstructDMat3x3,
    ConstructDMat3x4,
    ConstructDMat4x2,
    ConstructDMat4x3,
    ConstructDMat4x4,
    ConstructStruct,

    // Branches
    Return,
    Break,
    Continue,
    Discard,
    Case,
    Default,
}

impl Op {
    pub fn is_constructor(self) -> bool {
        use Op::*;
        matches!(
            self,
            ConstructFloat
                | ConstructVec2
                | ConstructVec3
                | ConstructVec4
                | ConstructDouble
                | ConstructDVec2
                | ConstructDVec3
                | ConstructDVec4
                | ConstructInt
                | ConstructIVec2
                | ConstructIVec3
                | ConstructIVec4
                | ConstructUint
                | ConstructUVec2
                | ConstructUVec3
                | ConstructUVec4
                | ConstructBool
                | ConstructBVec2
                | ConstructBVec3
                | ConstructBVec4
                | ConstructStruct
        ) || self.is_matrix_constructor()
    }

    pub fn is_matrix_constructor(self) -> bool {
        use Op::*;
        matches!(
            self,
            ConstructMat2x2
                | ConstructMat2x3
                | ConstructMat2x4
                | ConstructMat3x2
                | ConstructMat3x3
                | ConstructMat3x4
                | ConstructMat4x2
                | ConstructMat4x3
                | ConstructMat4x4
                | ConstructDMat2x2
                | ConstructDMat2x3
                | ConstructDMat2x4
                | ConstructDMat3x2
                | ConstructDMat3x3
                | ConstructDMat3x4
                | ConstructDMat4x2
                | ConstructDMat4x3
                | ConstructDMat4x4
        )
    }

    /// For an op-assign, the plain arithmetic operator it applies.
    pub fn assign_base(self) -> Option<Op> {
        match self {
            Op::AddAssign => Some(Op::Add),
            Op::SubAssign => Some(Op::Sub),
            Op::MulAssign => Some(Op::Mul),
            Op::DivAssign => Some(Op::Div),
            Op::ModAssign => Some(Op::Mod),
            Op::AndAssign => Some(Op::BitwiseAnd),
            Op::OrAssign => Some(Op::BitwiseOr),
            Op::XorAssign => Some(Op::BitwiseXor),
            Op::ShiftLeftAssign => Some(Op::ShiftLeft),
            Op::ShiftRightAssign => Some(Op::ShiftRight),
            _ => None,
        }
    }

    pub fn is_assignment(self) -> bool {
        self == Op::Assign || self.assign_base().is_some()
    }
}

/// Payload of an aggregate node.
#[derive(Clone, Debug, Default)]
pub struct AggregateData {
    /// `None` while the aggregate is a raw list (e.g. an unprocessed
    /// brace initializer or an argument list under construction).
    pub op: Option<Op>,
    /// Mangled function name for call/definition aggregates.
    pub name: Option<String>,
    pub sequence: Vec<Handle<Node>>,
    /// Per-argument storage qualifiers of the resolved callee.
    pub qualifiers: Vec<Storage>,
    pub user_defined: bool,
}

/// The per-variant payload of a node.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Reference to a symbol-table entry.
    Symbol { id: u32, name: String },
    /// A folded compile-time constant.
    Const(ConstArray),
    Binary {
        op: Op,
        left: Handle<Node>,
        right: Handle<Node>,
    },
    Unary {
        op: Op,
        operand: Handle<Node>,
    },
    Aggregate(AggregateData),
    /// A named method on an object (`a.length`), resolved at call syntax.
    Method {
        base: Handle<Node>,
        name: String,
    },
    Selection {
        condition: Handle<Node>,
        accept: Option<Handle<Node>>,
        reject: Option<Handle<Node>>,
    },
    Switch {
        expression: Handle<Node>,
        body: Handle<Node>,
    },
    Loop {
        body: Option<Handle<Node>>,
        test: Option<Handle<Node>>,
        terminal: Option<Handle<Node>>,
        test_first: bool,
    },
    Branch {
        op: Op,
        expression: Option<Handle<Node>>,
    },
}

/// One HIR node: a tagged payload with a common typed header.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: Type,
    pub loc: Loc,
}

impl Node {
    pub fn as_const(&self) -> Option<&ConstArray> {
        match &self.kind {
            NodeKind::Const(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<(u32, &str)> {
        match &self.kind {
            NodeKind::Symbol { id, name } => Some((*id, name.as_str())),
            _ => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&AggregateData> {
        match &self.kind {
            NodeKind::Aggregate(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<(Op, Handle<Node>, Handle<Node>)> {
        match &self.kind {
            NodeKind::Binary { op, left, right } => Some((*op, *left, *right)),
            _ => None,
        }
    }

    pub fn as_unary(&self) -> Option<(Op, Handle<Node>)> {
        match &self.kind {
            NodeKind::Unary { op, operand } => Some((*op, *operand)),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self.kind, NodeKind::Const(_))
    }

    /// The operator of the node, if its variant carries one.
    pub fn op(&self) -> Option<Op> {
        match &self.kind {
            NodeKind::Binary { op, .. } | NodeKind::Unary { op, .. } | NodeKind::Branch { op, .. } => {
                Some(*op)
            }
            NodeKind::Aggregate(data) => data.op,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_classification() {
        assert!(Op::ConstructVec3.is_constructor());
        assert!(Op::ConstructMat3x3.is_constructor());
        assert!(Op::ConstructMat3x3.is_matrix_constructor());
        assert!(!Op::ConstructVec3.is_matrix_constructor());
        assert!(!Op::Add.is_constructor());
    }

    #[test]
    fn assign_base_mapping() {
        assert_eq!(Op::AddAssign.assign_base(), Some(Op::Add));
        assert_eq!(Op::ShiftLeftAssign.assign_base(), Some(Op::ShiftLeft));
        assert_eq!(Op::Assign.assign_base(), None);
        assert!(Op::Assign.is_assignment());
        assert!(Op::SubAssign.is_assignment());
        assert!(!Op::Sub.is_assignment());
    }
}
