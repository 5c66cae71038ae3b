//! The GLSL type algebra: scalars, vectors, matrices, samplers,
//! arrays, structs, and interface blocks.

use std::cell::Cell;
use std::fmt::Write;
use std::rc::Rc;

use crate::qualifier::{Precision, Qualifier, Storage};
use crate::Loc;

/// The basic (element) type of a value.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BasicType {
    Void,
    Bool,
    Int,
    Uint,
    Float,
    Double,
    Sampler,
    Struct,
    Block,
    AtomicCounter,
}

impl BasicType {
    /// The source-level spelling, for diagnostics.
    pub fn basic_string(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::Double => "double",
            Self::Sampler => "sampler",
            Self::Struct => "structure",
            Self::Block => "block",
            Self::AtomicCounter => "atomic_uint",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Uint | Self::Float | Self::Double)
    }
}

/// The scalar kind a sampler returns.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum SamplerScalar {
    Float = 0,
    Int = 1,
    Uint = 2,
}

/// Texture dimensionality.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum SamplerDim {
    Dim1D = 0,
    Dim2D = 1,
    Dim3D = 2,
    Cube = 3,
    Rect = 4,
    Buffer = 5,
    Ms2D = 6,
}

const NUM_SAMPLER_DIMS: usize = 7;
const NUM_SAMPLER_SCALARS: usize = 3;

/// Number of distinct `(dim, scalar, arrayed, shadow)` sampler
/// configurations; the size of the default-precision table.
pub const SAMPLER_TYPE_SPACE: usize = NUM_SAMPLER_DIMS * NUM_SAMPLER_SCALARS * 4;

/// A sampler type. Equality is structural.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Sampler {
    pub scalar: SamplerScalar,
    pub dim: SamplerDim,
    pub arrayed: bool,
    pub shadow: bool,
    pub ms: bool,
    pub image: bool,
}

impl Sampler {
    pub fn new(scalar: SamplerScalar, dim: SamplerDim) -> Self {
        Self {
            scalar,
            dim,
            arrayed: false,
            shadow: false,
            ms: dim == SamplerDim::Ms2D,
            image: false,
        }
    }

    /// Flattens the `(dim, scalar, arrayed, shadow)` space into a
    /// single index into the default-precision table. The mapping is
    /// a bijection on that space.
    pub fn type_index(&self) -> usize {
        let arrayed = self.arrayed as usize;
        let shadow = self.shadow as usize;
        self.dim as usize
            + NUM_SAMPLER_DIMS
                * (self.scalar as usize + NUM_SAMPLER_SCALARS * (2 * arrayed + shadow))
    }

    pub fn type_string(&self) -> String {
        let mut s = String::new();
        match self.scalar {
            SamplerScalar::Float => {}
            SamplerScalar::Int => s.push('i'),
            SamplerScalar::Uint => s.push('u'),
        }
        s.push_str("sampler");
        s.push_str(match self.dim {
            SamplerDim::Dim1D => "1D",
            SamplerDim::Dim2D => "2D",
            SamplerDim::Dim3D => "3D",
            SamplerDim::Cube => "Cube",
            SamplerDim::Rect => "2DRect",
            SamplerDim::Buffer => "Buffer",
            SamplerDim::Ms2D => "2DMS",
        });
        if self.arrayed {
            s.push_str("Array");
        }
        if self.shadow {
            s.push_str("Shadow");
        }
        s
    }
}

#[derive(Clone, Copy)]
struct Dims {
    size: u32,
    max_size: u32,
}

/// The (possibly still unresolved) size of an array dimension.
///
/// The cell is shared: cloning an `ArraySizes` — and therefore cloning
/// a [`Type`] that carries one — yields another reference to the same
/// record, so sizing an array that was first declared unsized
/// propagates to every type that shares the dimension.
#[derive(Clone)]
pub struct ArraySizes {
    inner: Rc<Cell<Dims>>,
}

impl ArraySizes {
    /// An explicitly sized dimension.
    pub fn sized(size: u32) -> Self {
        Self {
            inner: Rc::new(Cell::new(Dims { size, max_size: 0 })),
        }
    }

    /// A dimension whose size is not yet known.
    pub fn unspecified() -> Self {
        Self::sized(0)
    }

    /// The declared size; 0 while unsized.
    pub fn size(&self) -> u32 {
        self.inner.get().size
    }

    pub fn is_sized(&self) -> bool {
        self.size() > 0
    }

    pub fn set_size(&self, size: u32) {
        let mut dims = self.inner.get();
        dims.size = size;
        self.inner.set(dims);
    }

    /// Largest index + 1 observed on an unsized dimension.
    pub fn max_size(&self) -> u32 {
        self.inner.get().max_size
    }

    pub fn set_max_size(&self, max_size: u32) {
        let mut dims = self.inner.get();
        dims.max_size = max_size;
        self.inner.set(dims);
    }
}

impl PartialEq for ArraySizes {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size()
    }
}

impl std::fmt::Debug for ArraySizes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.size())
    }
}

/// A member of a struct or interface block.
#[derive(Clone, Debug)]
pub struct Field {
    pub ty: Type,
    pub loc: Loc,
}

/// A fully-qualified GLSL type.
///
/// Cloning is shallow: struct field lists and array-size cells are
/// shared, scalar fields are copied.
#[derive(Clone, Debug)]
pub struct Type {
    pub basic: BasicType,
    /// 1 for scalars, 2..=4 for vectors.
    pub vector_size: u32,
    /// 0 for non-matrices, otherwise 2..=4.
    pub matrix_cols: u32,
    pub matrix_rows: u32,
    pub qualifier: Qualifier,
    pub array: Option<ArraySizes>,
    pub sampler: Option<Sampler>,
    /// Struct or block member list, shared between all values of the type.
    pub fields: Option<Rc<Vec<Field>>>,
    /// Struct or block name.
    pub type_name: Option<Rc<str>>,
    /// Set when this type instance is a member of a struct or block.
    pub field_name: Option<Rc<str>>,
}

impl Type {
    pub fn new(basic: BasicType) -> Self {
        Self {
            basic,
            vector_size: 1,
            matrix_cols: 0,
            matrix_rows: 0,
            qualifier: Qualifier::default(),
            array: None,
            sampler: None,
            fields: None,
            type_name: None,
            field_name: None,
        }
    }

    pub fn scalar(basic: BasicType, storage: Storage) -> Self {
        let mut ty = Self::new(basic);
        ty.qualifier.storage = storage;
        ty
    }

    pub fn vector(basic: BasicType, storage: Storage, size: u32) -> Self {
        let mut ty = Self::scalar(basic, storage);
        ty.vector_size = size;
        ty
    }

    pub fn matrix(basic: BasicType, storage: Storage, cols: u32, rows: u32) -> Self {
        let mut ty = Self::scalar(basic, storage);
        ty.matrix_cols = cols;
        ty.matrix_rows = rows;
        ty
    }

    pub fn sampler(sampler: Sampler) -> Self {
        let mut ty = Self::scalar(BasicType::Sampler, Storage::Uniform);
        ty.sampler = Some(sampler);
        ty
    }

    pub fn structure(fields: Rc<Vec<Field>>, name: &str) -> Self {
        let mut ty = Self::new(BasicType::Struct);
        ty.fields = Some(fields);
        ty.type_name = Some(name.into());
        ty
    }

    pub fn block(fields: Rc<Vec<Field>>, name: &str, qualifier: Qualifier) -> Self {
        let mut ty = Self::new(BasicType::Block);
        ty.fields = Some(fields);
        ty.type_name = Some(name.into());
        ty.qualifier = qualifier;
        ty
    }

    pub fn is_scalar(&self) -> bool {
        self.vector_size == 1
            && self.matrix_cols == 0
            && !self.is_array()
            && self.fields.is_none()
    }

    pub fn is_vector(&self) -> bool {
        self.vector_size > 1 && self.matrix_cols == 0
    }

    pub fn is_matrix(&self) -> bool {
        self.matrix_cols > 0
    }

    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.basic, BasicType::Struct | BasicType::Block)
    }

    pub fn array_size(&self) -> u32 {
        self.array.as_ref().map_or(0, ArraySizes::size)
    }

    pub fn max_array_size(&self) -> u32 {
        self.array.as_ref().map_or(0, ArraySizes::max_size)
    }

    pub fn set_max_array_size(&self, size: u32) {
        if let Some(array) = &self.array {
            array.set_max_size(size);
        }
    }

    /// True for arrays and for structs containing an array anywhere.
    pub fn contains_array(&self) -> bool {
        if self.is_array() {
            return true;
        }
        match &self.fields {
            Some(fields) => fields.iter().any(|f| f.ty.contains_array()),
            None => false,
        }
    }

    /// True for samplers and for structs containing a sampler anywhere.
    pub fn contains_sampler(&self) -> bool {
        if self.basic == BasicType::Sampler {
            return true;
        }
        match &self.fields {
            Some(fields) => fields.iter().any(|f| f.ty.contains_sampler()),
            None => false,
        }
    }

    /// Number of scalar components after flattening arrays, matrices,
    /// and vectors; structs sum their members.
    pub fn object_size(&self) -> u32 {
        let mut total = if let Some(fields) = &self.fields {
            fields.iter().map(|f| f.ty.object_size()).sum()
        } else if self.is_matrix() {
            self.matrix_cols * self.matrix_rows
        } else {
            self.vector_size
        };
        if let Some(array) = &self.array {
            total *= array.size().max(array.max_size());
        }
        total
    }

    /// Strips the outermost dimension in place: array to element,
    /// matrix to column vector, vector to scalar. Returns `false` if
    /// there is no dimension left to strip.
    pub fn dereference(&mut self) -> bool {
        if self.is_array() {
            self.array = None;
        } else if self.is_matrix() {
            self.vector_size = self.matrix_rows;
            self.matrix_cols = 0;
            self.matrix_rows = 0;
        } else if self.vector_size > 1 {
            self.vector_size = 1;
        } else {
            return false;
        }
        true
    }

    /// A clone with the outer dimension stripped.
    pub fn dereferenced(&self) -> Self {
        let mut ty = self.clone();
        ty.dereference();
        ty
    }

    /// Replace the concrete size of this array, writing through the
    /// shared cell so every sharer of the dimension sees it.
    pub fn change_array_size(&mut self, size: u32) {
        match &self.array {
            Some(array) => array.set_size(size),
            None => self.array = Some(ArraySizes::sized(size)),
        }
    }

    /// Share `other`'s array dimension cell.
    pub fn share_array_sizes(&mut self, other: &Type) {
        self.array = other.array.clone();
    }

    /// Adopt the given dimension cell.
    pub fn set_array_sizes(&mut self, sizes: ArraySizes) {
        self.array = Some(sizes);
    }

    /// Equal after stripping the outer array dimension; qualifiers are
    /// not compared.
    pub fn same_element_type(&self, other: &Type) -> bool {
        self.basic == other.basic
            && self.vector_size == other.vector_size
            && self.matrix_cols == other.matrix_cols
            && self.matrix_rows == other.matrix_rows
            && self.sampler == other.sampler
            && self.same_fields(other)
    }

    /// Structural equality, ignoring qualification.
    pub fn same_type(&self, other: &Type) -> bool {
        self.same_element_type(other) && self.array_size() == other.array_size()
            && self.is_array() == other.is_array()
    }

    fn same_fields(&self, other: &Type) -> bool {
        match (&self.fields, &other.fields) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.iter().zip(b.iter()).all(|(x, y)| {
                            x.ty.field_name == y.ty.field_name && x.ty.same_type(&y.ty)
                        }))
            }
            _ => false,
        }
    }

    /// A readable rendering of the full type, for diagnostics.
    pub fn complete_string(&self) -> String {
        let mut s = String::new();
        if self.qualifier.storage != Storage::Temporary {
            s.push_str(self.qualifier.storage.as_str());
            s.push(' ');
        }
        if self.qualifier.precision != Precision::None {
            s.push_str(self.qualifier.precision.as_str());
            s.push(' ');
        }
        if let Some(array) = &self.array {
            if array.is_sized() {
                let _ = write!(s, "{}-element array of ", array.size());
            } else {
                s.push_str("unsized array of ");
            }
        }
        if self.is_matrix() {
            let _ = write!(
                s,
                "{}x{} matrix of {}",
                self.matrix_cols,
                self.matrix_rows,
                self.basic.basic_string()
            );
        } else if self.vector_size > 1 {
            let _ = write!(
                s,
                "{}-component vector of {}",
                self.vector_size,
                self.basic.basic_string()
            );
        } else if let Some(sampler) = &self.sampler {
            s.push_str(&sampler.type_string());
        } else if let Some(name) = &self.type_name {
            let _ = write!(s, "{} '{}'", self.basic.basic_string(), name);
        } else {
            s.push_str(self.basic.basic_string());
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_vector_matrix_predicates() {
        let f = Type::scalar(BasicType::Float, Storage::Temporary);
        assert!(f.is_scalar());
        assert!(!f.is_vector());

        let v3 = Type::vector(BasicType::Float, Storage::Temporary, 3);
        assert!(v3.is_vector());
        assert!(!v3.is_scalar());
        assert_eq!(v3.object_size(), 3);

        let m = Type::matrix(BasicType::Float, Storage::Temporary, 4, 4);
        assert!(m.is_matrix());
        assert_eq!(m.object_size(), 16);
    }

    #[test]
    fn dereference_order() {
        let mut ty = Type::matrix(BasicType::Float, Storage::Temporary, 3, 4);
        ty.set_array_sizes(ArraySizes::sized(2));
        assert_eq!(ty.object_size(), 24);

        assert!(ty.dereference());
        assert!(!ty.is_array());
        assert!(ty.is_matrix());

        assert!(ty.dereference());
        assert!(ty.is_vector());
        assert_eq!(ty.vector_size, 4);

        assert!(ty.dereference());
        assert!(ty.is_scalar());

        assert!(!ty.dereference());
    }

    #[test]
    fn shared_array_sizes_propagate() {
        let mut decl = Type::scalar(BasicType::Float, Storage::Temporary);
        decl.set_array_sizes(ArraySizes::unspecified());

        let mut use_site = Type::scalar(BasicType::Float, Storage::Temporary);
        use_site.share_array_sizes(&decl);
        assert_eq!(use_site.array_size(), 0);

        decl.change_array_size(7);
        assert_eq!(use_site.array_size(), 7);
        assert_eq!(use_site.object_size(), 7);
    }

    #[test]
    fn unsized_object_size_uses_max_observed() {
        let mut ty = Type::scalar(BasicType::Float, Storage::Temporary);
        ty.set_array_sizes(ArraySizes::unspecified());
        assert_eq!(ty.object_size(), 0);
        ty.set_max_array_size(5);
        assert_eq!(ty.object_size(), 5);
    }

    #[test]
    fn sampler_type_index_is_bijective() {
        use std::collections::HashSet;
        let dims = [
            SamplerDim::Dim1D,
            SamplerDim::Dim2D,
            SamplerDim::Dim3D,
            SamplerDim::Cube,
            SamplerDim::Rect,
            SamplerDim::Buffer,
            SamplerDim::Ms2D,
        ];
        let scalars = [SamplerScalar::Float, SamplerScalar::Int, SamplerScalar::Uint];
        let mut seen = HashSet::new();
        for dim in dims {
            for scalar in scalars {
                for arrayed in [false, true] {
                    for shadow in [false, true] {
                        let mut s = Sampler::new(scalar, dim);
                        s.arrayed = arrayed;
                        s.shadow = shadow;
                        let index = s.type_index();
                        assert!(index < SAMPLER_TYPE_SPACE, "index {index} out of space");
                        assert!(seen.insert(index), "index {index} not unique");
                    }
                }
            }
        }
        assert_eq!(seen.len(), SAMPLER_TYPE_SPACE);
    }

    #[test]
    fn struct_object_size_sums_members() {
        let fields = Rc::new(vec![
            Field {
                ty: {
                    let mut t = Type::matrix(BasicType::Float, Storage::Temporary, 4, 4);
                    t.field_name = Some("m".into());
                    t
                },
                loc: Loc::default(),
            },
            Field {
                ty: {
                    let mut t = Type::vector(BasicType::Float, Storage::Temporary, 3);
                    t.field_name = Some("v".into());
                    t
                },
                loc: Loc::default(),
            },
        ]);
        let s = Type::structure(fields, "S");
        assert_eq!(s.object_size(), 19);
        assert!(!s.contains_sampler());
        assert!(!s.contains_array());
    }

    #[test]
    fn same_element_type_ignores_outer_array() {
        let mut a = Type::vector(BasicType::Float, Storage::Temporary, 2);
        a.set_array_sizes(ArraySizes::sized(4));
        let b = Type::vector(BasicType::Float, Storage::Const, 2);
        assert!(a.same_element_type(&b));
        assert!(!a.same_type(&b));
    }

    #[test]
    fn complete_string_mentions_shape() {
        let mut v = Type::vector(BasicType::Float, Storage::Const, 4);
        v.qualifier.precision = Precision::High;
        let s = v.complete_string();
        assert!(s.contains("const"));
        assert!(s.contains("highp"));
        assert!(s.contains("4-component vector of float"));
    }
}
