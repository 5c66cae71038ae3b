//! Type qualifiers: storage class, precision, interpolation, layout.

/// Storage qualification of an object.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Storage {
    /// Function-local scratch value.
    Temporary,
    /// Global without any other qualification.
    Global,
    /// Compile-time constant.
    Const,
    /// Read-only view of a value (e.g. a `const in` parameter).
    ConstReadOnly,
    /// `in` function parameter.
    In,
    /// `out` function parameter.
    Out,
    /// `inout` function parameter.
    InOut,
    /// Stage input.
    VaryingIn,
    /// Stage output.
    VaryingOut,
    Uniform,
    Buffer,
    /// Compute-stage shared memory.
    Shared,
    // Built-in variable storage classes.
    PointCoord,
    VertexId,
    InstanceId,
    FragCoord,
    Face,
    Position,
    PointSize,
    FragColor,
    FragDepth,
}

impl Storage {
    /// The source-level spelling, for diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temporary => "temp",
            Self::Global => "global",
            Self::Const => "const",
            Self::ConstReadOnly => "const (read only)",
            Self::In => "in",
            Self::Out => "out",
            Self::InOut => "inout",
            Self::VaryingIn => "in",
            Self::VaryingOut => "out",
            Self::Uniform => "uniform",
            Self::Buffer => "buffer",
            Self::Shared => "shared",
            Self::PointCoord => "gl_PointCoord",
            Self::VertexId => "gl_VertexID",
            Self::InstanceId => "gl_InstanceID",
            Self::FragCoord => "gl_FragCoord",
            Self::Face => "gl_FrontFacing",
            Self::Position => "gl_Position",
            Self::PointSize => "gl_PointSize",
            Self::FragColor => "gl_FragColor",
            Self::FragDepth => "gl_FragDepth",
        }
    }

    /// Is this a compile-time constant storage class?
    pub fn is_const(self) -> bool {
        self == Self::Const
    }

    pub fn is_uniform(self) -> bool {
        matches!(self, Self::Uniform | Self::Buffer)
    }

    /// Stage inputs, including input built-ins.
    pub fn is_pipe_input(self) -> bool {
        matches!(
            self,
            Self::VaryingIn
                | Self::PointCoord
                | Self::VertexId
                | Self::InstanceId
                | Self::FragCoord
                | Self::Face
        )
    }

    /// Stage outputs, including output built-ins.
    pub fn is_pipe_output(self) -> bool {
        matches!(
            self,
            Self::VaryingOut
                | Self::Position
                | Self::PointSize
                | Self::FragColor
                | Self::FragDepth
        )
    }
}

/// Precision qualification (meaningful on the es profile only).
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Precision {
    None,
    Low,
    Medium,
    High,
}

impl Precision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Low => "lowp",
            Self::Medium => "mediump",
            Self::High => "highp",
        }
    }
}

/// Matrix layout inside a block.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum LayoutMatrix {
    None,
    ColumnMajor,
    RowMajor,
}

impl LayoutMatrix {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ColumnMajor => "column_major",
            Self::RowMajor => "row_major",
        }
    }
}

/// Block member packing rule.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum LayoutPacking {
    None,
    Packed,
    Shared,
    Std140,
    Std430,
}

impl LayoutPacking {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Packed => "packed",
            Self::Shared => "shared",
            Self::Std140 => "std140",
            Self::Std430 => "std430",
        }
    }
}

/// The full qualification of a type: storage, precision, the
/// interpolation/auxiliary/memory flag set, and layout values.
///
/// At most one auxiliary and one interpolation flag may be set on a
/// well-formed qualifier; `merge` in the front-end enforces this.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Qualifier {
    pub storage: Storage,
    pub precision: Precision,

    pub invariant: bool,
    // interpolation
    pub smooth: bool,
    pub flat: bool,
    pub nopersp: bool,
    // auxiliary
    pub centroid: bool,
    pub patch: bool,
    pub sample: bool,
    // memory
    pub shared: bool,
    pub coherent: bool,
    pub volatil: bool,
    pub restrict: bool,
    pub readonly: bool,
    pub writeonly: bool,

    pub layout_matrix: LayoutMatrix,
    pub layout_packing: LayoutPacking,
    pub location: Option<u32>,
    pub binding: Option<u32>,
}

impl Qualifier {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            precision: Precision::None,
            invariant: false,
            smooth: false,
            flat: false,
            nopersp: false,
            centroid: false,
            patch: false,
            sample: false,
            shared: false,
            coherent: false,
            volatil: false,
            restrict: false,
            readonly: false,
            writeonly: false,
            layout_matrix: LayoutMatrix::None,
            layout_packing: LayoutPacking::None,
            location: None,
            binding: None,
        }
    }

    /// Resets everything back to a bare temporary.
    pub fn clear(&mut self) {
        *self = Self::new(Storage::Temporary);
    }

    pub fn is_auxiliary(&self) -> bool {
        self.centroid || self.patch || self.sample
    }

    pub fn is_interpolation(&self) -> bool {
        self.smooth || self.flat || self.nopersp
    }

    pub fn is_memory(&self) -> bool {
        self.shared || self.coherent || self.volatil || self.restrict || self.readonly
            || self.writeonly
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }

    pub fn has_binding(&self) -> bool {
        self.binding.is_some()
    }

    pub fn has_layout(&self) -> bool {
        self.layout_matrix != LayoutMatrix::None
            || self.layout_packing != LayoutPacking::None
            || self.has_location()
            || self.has_binding()
    }

    /// Merge layout fields from `src`; a set field wins over an unset one.
    pub fn merge_layout(&mut self, src: &Qualifier) {
        if src.layout_matrix != LayoutMatrix::None {
            self.layout_matrix = src.layout_matrix;
        }
        if src.layout_packing != LayoutPacking::None {
            self.layout_packing = src.layout_packing;
        }
        if src.has_location() {
            self.location = src.location;
        }
        if src.has_binding() {
            self.binding = src.binding;
        }
    }
}

impl Default for Qualifier {
    fn default() -> Self {
        Self::new(Storage::Temporary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_qualifier_is_bare() {
        let q = Qualifier::default();
        assert_eq!(q.storage, Storage::Temporary);
        assert_eq!(q.precision, Precision::None);
        assert!(!q.is_auxiliary());
        assert!(!q.is_interpolation());
        assert!(!q.is_memory());
        assert!(!q.has_layout());
    }

    #[test]
    fn layout_merge_set_wins() {
        let mut dst = Qualifier::new(Storage::Uniform);
        dst.layout_packing = LayoutPacking::Shared;
        let mut src = Qualifier::default();
        src.layout_packing = LayoutPacking::Std140;
        src.location = Some(3);
        dst.merge_layout(&src);
        assert_eq!(dst.layout_packing, LayoutPacking::Std140);
        assert_eq!(dst.location, Some(3));
        assert_eq!(dst.layout_matrix, LayoutMatrix::None);
    }

    #[test]
    fn pipe_classification() {
        assert!(Storage::FragCoord.is_pipe_input());
        assert!(Storage::Position.is_pipe_output());
        assert!(!Storage::Uniform.is_pipe_input());
        assert!(Storage::Buffer.is_uniform());
    }
}
