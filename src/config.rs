///! Compiler configuration

use std::path::PathBuf;

/// Default point/plane welding distance
pub const DEFAULT_PLANE_EPSILON: f64 = 1e-4;

/// Welding distance used by the high precision (`-p`) mode
pub const PRECISE_PLANE_EPSILON: f64 = 1e-5;

/// Default count of candidate planes examined by BSP split selection
pub const DEFAULT_MAX_PLANES_CONSIDERED: usize = 32;

/// Candidate plane count used by the final build (`-h`) mode
pub const FINAL_BUILD_MAX_PLANES_CONSIDERED: usize = 1 << 30;

/// Quake `.map` dialect
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QuakeVersion {
    /// `[ux uy uz ud] [vx vy vz vd] rot sx sy` texture layout
    Quake2,

    /// `su sv rot sx sy a b c` texture layout
    Quake3,
}

impl TryFrom<u32> for QuakeVersion {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::Quake2),
            3 => Ok(Self::Quake3),
            other => Err(other),
        }
    }
}

/// Which files of a detail sequence get compiled
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DetailMode {
    /// `base_0.map` .. `base_9.map` are discovered and compiled together
    Sequence,

    /// Only the file named on the command line
    SpecifiedOnly,

    /// Only the named file, built as a low detail shape
    LowDetail,
}

/// Full compiler configuration. Every stage reads it, nothing mutates it.
#[derive(Clone, Debug)]
pub struct CompileConfig {
    /// Point and plane welding tolerance
    pub plane_epsilon: f64,

    /// Weld points within `plane_epsilon`, exact matches only otherwise
    pub hash_points: bool,

    /// Weld planes by angle/distance threshold, exact matches only otherwise
    pub hash_planes: bool,

    /// Minimal normal dot product of planes considered equal
    pub plane_normal_threshold: f64,

    /// Maximal distance difference of planes considered equal
    pub plane_distance_threshold: f64,

    /// Count of candidate planes evaluated per BSP node
    pub max_planes_considered: usize,

    /// Input dialect
    pub quake_version: QuakeVersion,

    /// Directory textures are searched in, map directory if None
    pub texture_dir: Option<PathBuf>,

    /// Directory .dif is written to, map directory if None
    pub output_dir: Option<PathBuf>,

    /// Search textures in the parent directory too
    pub texture_search: bool,

    /// Verbose diagnostics
    pub verbose: bool,

    /// Detail sequence handling
    pub detail_mode: DetailMode,

    /// Texture width/height used for texgen normalisation (bitmaps are not decoded)
    pub default_texture_size: u32,

    /// Seed of BSP candidate plane shuffle
    pub random_seed: u32,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            plane_epsilon: DEFAULT_PLANE_EPSILON,
            hash_points: true,
            hash_planes: true,
            plane_normal_threshold: 0.99,
            plane_distance_threshold: 0.01,
            max_planes_considered: DEFAULT_MAX_PLANES_CONSIDERED,
            quake_version: QuakeVersion::Quake2,
            texture_dir: None,
            output_dir: None,
            texture_search: true,
            verbose: false,
            detail_mode: DetailMode::Sequence,
            default_texture_size: 256,
            random_seed: 1376312589,
        }
    }
}

impl CompileConfig {
    /// Switch to 1e-5 welding tolerance
    pub fn with_precision(mut self) -> Self {
        self.plane_epsilon = PRECISE_PLANE_EPSILON;
        self
    }

    /// Exhaustive split plane search
    pub fn with_final_build(mut self) -> Self {
        self.max_planes_considered = FINAL_BUILD_MAX_PLANES_CONSIDERED;
        self
    }

    /// Check if output should be built as a low detail shape
    pub fn is_low_detail(&self) -> bool {
        self.detail_mode == DetailMode::LowDetail
    }
}

// config.rs
