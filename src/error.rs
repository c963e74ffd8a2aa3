///! Compile-level error type

use thiserror::Error;

/// Error aborting compilation of a single `.map` file
#[derive(Error, Debug)]
pub enum CompileError {
    /// Input/output failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `.map` text could not be parsed
    #[error("map parsing error: {0}")]
    Parse(String),

    /// Map has no `worldspawn` entity
    #[error("map contains no worldspawn entity")]
    NoWorldSpawn,

    /// Surface lightmap exceeds 256x256 lumels
    #[error("light map too large ({width}x{height}), maximum is 256x256")]
    LightmapTooLarge {
        /// Requested lightmap width
        width: u32,

        /// Requested lightmap height
        height: u32,
    },

    /// Internal consistency check failed, the brush set is malformed
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Runtime plane index space (15 bits) exhausted
    #[error("too many planes for runtime format: {0}")]
    TooManyPlanes(usize),

    /// Runtime format limit exceeded
    #[error("format error: {0}")]
    Format(String),

    /// No detail level compiled successfully
    #[error("no detail levels were compiled")]
    NoDetailLevels,
}

impl<'t> From<crate::map::MapParseError<'t>> for CompileError {
    fn from(value: crate::map::MapParseError<'t>) -> Self {
        match value {
            crate::map::MapParseError::MissingWorldSpawn => CompileError::NoWorldSpawn,
            other => CompileError::Parse(other.to_string()),
        }
    }
}

/// Shortcut for fatal internal checks
macro_rules! ensure {
    ($cond: expr, $($arg: tt)+) => {
        if !($cond) {
            return Err($crate::error::CompileError::Invariant(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure;

// error.rs
