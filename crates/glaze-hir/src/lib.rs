//! Glaze high-level intermediate representation.
//!
//! A typed, qualifier-annotated tree produced by semantic analysis of
//! one GLSL compilation unit. Nodes live in an arena owned by the
//! unit; the parse context builds them through the [`Unit`] façade.

pub mod arena;
mod build;
mod consts;
mod display;
pub mod fold;
mod node;
mod qualifier;
mod types;

use std::fmt;

pub use arena::{Arena, Handle};
pub use build::{CallEdge, Unit};
pub use consts::{ConstArray, ConstValue};
pub use display::dump_unit;
pub use node::{AggregateData, Node, NodeKind, Op};
pub use qualifier::{LayoutMatrix, LayoutPacking, Precision, Qualifier, Storage};
pub use types::{
    ArraySizes, BasicType, Field, Sampler, SamplerDim, SamplerScalar, Type, SAMPLER_TYPE_SPACE,
};

/// A source location: string (source fragment) index and line number.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Loc {
    pub string: usize,
    pub line: u32,
}

impl Loc {
    pub fn new(string: usize, line: u32) -> Self {
        Self { string, line }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.string, self.line)
    }
}
