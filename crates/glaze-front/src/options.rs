//! Compilation configuration: version, profile, stage, message flags,
//! and the built-in indexing limits.

/// A stage or profile name that could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum FrontError {
    #[error("unknown shader stage '{0}' (expected vertex, fragment, geometry, tesscontrol, tesseval, or compute)")]
    UnknownStage(String),
    #[error("unknown profile '{0}' (expected none, core, compatibility, or es)")]
    UnknownProfile(String),
}

/// The GLSL profile being compiled against.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Profile {
    /// Desktop without a profile statement (pre-150 behavior).
    None,
    Core,
    Compatibility,
    Es,
}

impl Profile {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Core => "core profile",
            Self::Compatibility => "compatibility profile",
            Self::Es => "es profile",
        }
    }

    pub fn mask(self) -> ProfileMask {
        match self {
            Self::None => ProfileMask::NONE,
            Self::Core => ProfileMask::CORE,
            Self::Compatibility => ProfileMask::COMPATIBILITY,
            Self::Es => ProfileMask::ES,
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = FrontError;

    fn from_str(s: &str) -> Result<Self, FrontError> {
        match s {
            "none" => Ok(Self::None),
            "core" => Ok(Self::Core),
            "compatibility" => Ok(Self::Compatibility),
            "es" => Ok(Self::Es),
            other => Err(FrontError::UnknownProfile(other.to_owned())),
        }
    }
}

/// A set of profiles a feature applies to.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct ProfileMask(u32);

impl ProfileMask {
    pub const NONE: Self = Self(1);
    pub const CORE: Self = Self(2);
    pub const COMPATIBILITY: Self = Self(4);
    pub const ES: Self = Self(8);
    /// Every desktop profile (everything but es).
    pub const DESKTOP: Self = Self(1 | 2 | 4);
    pub const ALL: Self = Self(1 | 2 | 4 | 8);
    pub const CORE_AND_COMPATIBILITY: Self = Self(2 | 4);

    pub fn contains(self, profile: Profile) -> bool {
        self.0 & profile.mask().0 != 0
    }
}

impl std::ops::BitOr for ProfileMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The pipeline stage being compiled.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Stage {
    Vertex,
    Fragment,
    Geometry,
    TessControl,
    TessEvaluation,
    Compute,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Geometry => "geometry",
            Self::TessControl => "tessellation control",
            Self::TessEvaluation => "tessellation evaluation",
            Self::Compute => "compute",
        }
    }

    pub fn mask(self) -> StageMask {
        StageMask(1 << self as u32)
    }
}

impl std::str::FromStr for Stage {
    type Err = FrontError;

    fn from_str(s: &str) -> Result<Self, FrontError> {
        match s {
            "vertex" | "vert" => Ok(Self::Vertex),
            "fragment" | "frag" => Ok(Self::Fragment),
            "geometry" | "geom" => Ok(Self::Geometry),
            "tesscontrol" | "tesc" => Ok(Self::TessControl),
            "tesseval" | "tese" => Ok(Self::TessEvaluation),
            "compute" | "comp" => Ok(Self::Compute),
            other => Err(FrontError::UnknownStage(other.to_owned())),
        }
    }
}

/// A set of stages a feature applies to.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct StageMask(u32);

impl StageMask {
    pub const VERTEX: Self = Self(1);
    pub const FRAGMENT: Self = Self(2);
    pub const ALL: Self = Self(0x3f);
    /// Every stage but compute.
    pub const GRAPHICS: Self = Self(0x1f);

    pub fn contains(self, stage: Stage) -> bool {
        self.0 & stage.mask().0 != 0
    }
}

impl std::ops::BitOr for StageMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Message-control flags.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq)]
pub struct Messages(u32);

impl Messages {
    pub const NONE: Self = Self(0);
    pub const SUPPRESS_WARNINGS: Self = Self(1);
    pub const RELAXED_ERRORS: Self = Self(2);
    pub const AST_DEBUG: Self = Self(4);
    pub const SPV_RULES: Self = Self(8);
    pub const VULKAN_RULES: Self = Self(16);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Messages {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Which forms of dynamic indexing the implementation supports
/// natively. A cleared flag makes the front end defer affected index
/// expressions to the post-parse limitation check (version 100 es
/// Appendix A).
#[derive(Clone, Copy, Debug)]
pub struct ResourceLimits {
    pub general_attribute_matrix_vector_indexing: bool,
    pub general_constant_matrix_vector_indexing: bool,
    pub general_sampler_indexing: bool,
    pub general_uniform_indexing: bool,
    pub general_variable_indexing: bool,
    pub general_varying_indexing: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            general_attribute_matrix_vector_indexing: true,
            general_constant_matrix_vector_indexing: true,
            general_sampler_indexing: true,
            general_uniform_indexing: true,
            general_variable_indexing: true,
            general_varying_indexing: true,
        }
    }
}

impl ResourceLimits {
    /// True when any index form needs the deferred limitation check.
    pub fn any_index_limits(&self) -> bool {
        !self.general_attribute_matrix_vector_indexing
            || !self.general_constant_matrix_vector_indexing
            || !self.general_sampler_indexing
            || !self.general_uniform_indexing
            || !self.general_variable_indexing
            || !self.general_varying_indexing
    }
}

/// Full configuration for compiling one shader.
#[derive(Clone, Debug)]
pub struct Options {
    pub version: u32,
    pub profile: Profile,
    pub stage: Stage,
    pub forward_compatible: bool,
    pub messages: Messages,
    pub limits: ResourceLimits,
    /// Set while seeding the built-in symbol-table level.
    pub parsing_builtins: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            version: 110,
            profile: Profile::None,
            stage: Stage::Vertex,
            forward_compatible: false,
            messages: Messages::NONE,
            limits: ResourceLimits::default(),
            parsing_builtins: false,
        }
    }
}

impl Options {
    pub fn new(version: u32, profile: Profile, stage: Stage) -> Self {
        Self {
            version,
            profile,
            stage,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_masks() {
        assert!(ProfileMask::DESKTOP.contains(Profile::Core));
        assert!(ProfileMask::DESKTOP.contains(Profile::None));
        assert!(!ProfileMask::DESKTOP.contains(Profile::Es));
        assert!(ProfileMask::ES.contains(Profile::Es));
        assert!((ProfileMask::ES | ProfileMask::CORE).contains(Profile::Core));
    }

    #[test]
    fn stage_masks() {
        assert!(StageMask::GRAPHICS.contains(Stage::Fragment));
        assert!(!StageMask::GRAPHICS.contains(Stage::Compute));
        assert!(StageMask::ALL.contains(Stage::Compute));
    }

    #[test]
    fn message_flags() {
        let m = Messages::SUPPRESS_WARNINGS | Messages::RELAXED_ERRORS;
        assert!(m.contains(Messages::SUPPRESS_WARNINGS));
        assert!(!m.contains(Messages::VULKAN_RULES));
    }

    #[test]
    fn default_limits_defer_nothing() {
        let limits = ResourceLimits::default();
        assert!(!limits.any_index_limits());
        let limits = ResourceLimits {
            general_variable_indexing: false,
            ..ResourceLimits::default()
        };
        assert!(limits.any_index_limits());
    }
}
