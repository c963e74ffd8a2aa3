///! DIF file format description module.
///!
///! Every record is `#[repr(C)]` of 4-byte fields only, so records have no padding and are
///! written as raw little-endian bytes. Arrays are prefixed by their `u32` element count.

use std::io::{Read, Write};
use bytemuck::{AnyBitPattern, NoUninit, Zeroable};
use thiserror::Error;
use crate::{lighting::Bitmap, math::Vec3d};

/// .DIF file magic number
pub const MAGIC: u32 = u32::from_le_bytes(*b"DIF0");

/// Current file version
pub const VERSION: u32 = 1;

/// Empty leaf reference flag of BSP child index
pub const EMPTY_LEAF_FLAG: u32 = 0x8000;

/// Solid leaf reference flags of BSP child index
pub const SOLID_LEAF_FLAG: u32 = 0xC000;

/// Zone index of empty leaf in inactive zone
pub const NO_ZONE: u32 = 0x0FFF;

/// Inverted plane flag of plane index
pub const PLANE_FLIP_FLAG: u32 = 0x8000;

/// Null surface flag of surface index in leaf and hull surface lists
pub const NULL_SURFACE_FLAG: u32 = 0x8000_0000;

/// Vehicle null surface flags of surface index in vehicle hull surface lists
pub const VEHICLE_NULL_SURFACE_FLAG: u32 = 0xC000_0000;

/// Missing index
pub const NONE: u32 = 0xFFFF_FFFF;

/// Missing zone of portal side
pub const NO_PORTAL_ZONE: u32 = 0xFFFF;

/// Maximal count of exported planes
pub const MAX_PLANES: usize = 0x8000;

// Binary format
macro_rules! bin_format {
    ($name: ident) => {
        unsafe impl Zeroable for $name {}
        unsafe impl AnyBitPattern for $name {}
        unsafe impl NoUninit for $name {}
    };

    ($head: ident, $($tail: ident),* $(,)?) => {
        bin_format!($head);

        bin_format!($($tail),*);
    };
}

/// DIF loading error
#[derive(Debug, Error)]
pub enum DifLoadingError {
    /// Input/Output error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error during building string from UTF-8 byte array
    #[error("invalid string: {0}")]
    StringFromUtf8Error(#[from] std::string::FromUtf8Error),

    /// Invalid magic value
    #[error("invalid magic {0:#010X}")]
    InvalidMagic(u32),

    /// File version is not supported
    #[error("unsupported version {0}")]
    UnsupportedVersion(u32),

    /// Index of some record is out of its array
    #[error("{what} index {index} is out of range 0..{count}")]
    InvalidIndex {
        /// Indexed array name
        what: &'static str,

        /// Index
        index: u32,

        /// Array length
        count: u32,
    },
}

/// Stable (e.g. with certain field order) 3-component float vector
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vec3 {
    /// X coordinate
    pub x: f32,

    /// Y coordinate
    pub y: f32,

    /// Z coordinate
    pub z: f32,
}

impl From<Vec3d> for Vec3 {
    fn from(value: Vec3d) -> Self {
        Self { x: value.x as f32, y: value.y as f32, z: value.z as f32 }
    }
}

impl From<Vec3> for Vec3d {
    fn from(value: Vec3) -> Self {
        Vec3d::new(value.x as f64, value.y as f64, value.z as f64)
    }
}

/// Span in any kind of set
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    /// First element
    pub start: u32,

    /// Element count
    pub count: u32,
}

impl Span {
    /// Range
    pub fn range(self) -> std::ops::Range<usize> {
        self.start as usize..self.start as usize + self.count as usize
    }

    /// Span of elements pushed to `len_before..len_after`
    pub fn from_lengths(len_before: usize, len_after: usize) -> Self {
        Self { start: len_before as u32, count: (len_after - len_before) as u32 }
    }
}

/// Plane, points `p` on it satisfy `normal · p + dist = 0`
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Plane {
    /// Plane normal vector
    pub normal: Vec3,

    /// Signed distance
    pub dist: f32,
}

/// Texture coordinate generator, `u = x · (p, 1)`
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TexGen {
    /// U plane
    pub x: [f32; 4],

    /// V plane
    pub y: [f32; 4],
}

/// BSP node. Child index with [`SOLID_LEAF_FLAG`] refers to solid leaf, with
/// [`EMPTY_LEAF_FLAG`] to zone.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BspNode {
    /// Plane index, [`PLANE_FLIP_FLAG`] set if inverted
    pub plane: u32,

    /// Front child
    pub front: u32,

    /// Back child
    pub back: u32,
}

/// Zone
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Zone {
    /// Span in zone portal list
    pub portals: Span,

    /// Span in zone surface list
    pub surfaces: Span,

    /// Editor zone number
    pub zone_id: u32,

    /// Zone flags
    pub flags: u32,
}

/// Zone is not lit by outside ambient light
pub const ZONE_INSIDE: u32 = 1;

/// Zone separator
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Portal {
    /// Plane index
    pub plane: u32,

    /// Span in winding index list
    pub tri_fans: Span,

    /// Zone in front of portal, [`NO_PORTAL_ZONE`] if none
    pub zone_front: u32,

    /// Zone behind portal, [`NO_PORTAL_ZONE`] if none
    pub zone_back: u32,
}

/// Textured surface
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Surface {
    /// Strip in winding index list
    pub winding: Span,

    /// Plane index
    pub plane: u32,

    /// Material index
    pub texture: u32,

    /// Texgen index
    pub texgen: u32,

    /// Surface flags
    pub flags: u32,

    /// Non T-junction point mask
    pub fan_mask: u32,

    /// Count of animated lights
    pub light_count: u32,

    /// First light state table entry
    pub light_state_start: u32,

    /// Lightmap position in sheet
    pub map_offset: [u32; 2],

    /// Lightmap size
    pub map_size: [u32; 2],

    /// Lightmap texgen
    pub lightmap_texgen: TexGen,
}

/// Untextured surface
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NullSurface {
    /// Polygon in winding index list
    pub winding: Span,

    /// Plane index
    pub plane: u32,

    /// Surface flags
    pub flags: u32,
}

/// Animated light
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AnimatedLight {
    /// Index in light name list
    pub name: u32,

    /// Span in light state list
    pub states: Span,

    /// Animation flags
    pub flags: u32,

    /// Total duration, in milliseconds
    pub duration: u32,
}

/// Animated light state
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LightState {
    /// RGB color and a zero byte
    pub color: [u8; 4],

    /// Time state starts at, in milliseconds
    pub active_time: u32,

    /// Span in state data list
    pub data: Span,
}

/// Light state intensity map of one surface
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StateData {
    /// Surface index
    pub surface: u32,

    /// Offset in state data buffer, [`NONE`] if state does not reach surface
    pub map: u32,

    /// Light state table entry of surface
    pub light_state: u32,
}

/// Convex collision hull
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ConvexHull {
    /// Span in hull point index list
    pub points: Span,

    /// Bounding box minimum
    pub min: Vec3,

    /// Bounding box maximum
    pub max: Vec3,

    /// Span in hull surface list
    pub surfaces: Span,

    /// First hull plane index
    pub plane_start: u32,

    /// First poly list plane
    pub poly_list_plane_start: u32,

    /// First poly list point
    pub poly_list_point_start: u32,

    /// First poly list string byte
    pub poly_list_string_start: u32,
}

/// Door path waypoint
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct WayPoint {
    /// Position
    pub position: Vec3,

    /// Time to the next waypoint (in milliseconds)
    pub ms_to_next: u32,

    /// Smoothing type
    pub smoothing: u32,
}

/// Trigger polyhedron edge
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PolyhedronEdge {
    /// Faces sharing the edge
    pub faces: [u32; 2],

    /// Edge points
    pub vertices: [u32; 2],
}

// Binary format
bin_format!(
    Vec3,
    Span,
    Plane,
    TexGen,
    BspNode,
    Zone,
    Portal,
    Surface,
    NullSurface,
    AnimatedLight,
    LightState,
    StateData,
    ConvexHull,
    WayPoint,
    PolyhedronEdge,
);

/// Write `u32` value
pub fn write_u32(dst: &mut dyn Write, value: u32) -> Result<(), std::io::Error> {
    dst.write_all(&value.to_le_bytes())
}

/// Read `u32` value
pub fn read_u32(src: &mut dyn Read) -> Result<u32, std::io::Error> {
    let mut bytes = [0u8; 4];
    src.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Write count-prefixed array
pub fn write_vec<T: NoUninit>(dst: &mut dyn Write, values: &[T]) -> Result<(), std::io::Error> {
    write_u32(dst, values.len() as u32)?;
    dst.write_all(bytemuck::cast_slice(values))
}

/// Read count-prefixed array
pub fn read_vec<T: AnyBitPattern + NoUninit>(src: &mut dyn Read) -> Result<Vec<T>, std::io::Error> {
    let count = read_u32(src)?;
    let mut result = Vec::<T>::new();

    result.resize(count as usize, T::zeroed());
    src.read_exact(bytemuck::cast_slice_mut(result.as_mut_slice()))?;

    Ok(result)
}

/// Write length-prefixed string
pub fn write_string(dst: &mut dyn Write, value: &str) -> Result<(), std::io::Error> {
    write_vec(dst, value.as_bytes())
}

/// Read length-prefixed string
pub fn read_string(src: &mut dyn Read) -> Result<String, DifLoadingError> {
    Ok(String::from_utf8(read_vec::<u8>(src)?)?)
}

/// Write count-prefixed string list
pub fn write_strings(dst: &mut dyn Write, values: &[String]) -> Result<(), std::io::Error> {
    write_u32(dst, values.len() as u32)?;
    values.iter().try_for_each(|value| write_string(dst, value))
}

/// Read count-prefixed string list
pub fn read_strings(src: &mut dyn Read) -> Result<Vec<String>, DifLoadingError> {
    let count = read_u32(src)?;
    (0..count).map(|_| read_string(src)).collect()
}

/// Write key-value list
pub fn write_properties(dst: &mut dyn Write, values: &[(String, String)]) -> Result<(), std::io::Error> {
    write_u32(dst, values.len() as u32)?;
    values.iter().try_for_each(|(key, value)| {
        write_string(dst, key)?;
        write_string(dst, value)
    })
}

/// Read key-value list
pub fn read_properties(src: &mut dyn Read) -> Result<Vec<(String, String)>, DifLoadingError> {
    let count = read_u32(src)?;
    (0..count)
        .map(|_| -> Result<(String, String), DifLoadingError> { Ok((read_string(src)?, read_string(src)?)) })
        .collect()
}

/// Write count-prefixed bitmap list
pub fn write_bitmaps(dst: &mut dyn Write, bitmaps: &[Bitmap]) -> Result<(), std::io::Error> {
    write_u32(dst, bitmaps.len() as u32)?;

    for bitmap in bitmaps {
        write_u32(dst, bitmap.width)?;
        write_u32(dst, bitmap.height)?;
        write_u32(dst, bitmap.channels)?;
        dst.write_all(&bitmap.data)?;
    }

    Ok(())
}

/// Read count-prefixed bitmap list
pub fn read_bitmaps(src: &mut dyn Read) -> Result<Vec<Bitmap>, std::io::Error> {
    let count = read_u32(src)?;

    (0..count)
        .map(|_| -> Result<Bitmap, std::io::Error> {
            let (width, height, channels) = (read_u32(src)?, read_u32(src)?, read_u32(src)?);
            let mut bitmap = Bitmap::new(width, height, channels);
            src.read_exact(&mut bitmap.data)?;
            Ok(bitmap)
        })
        .collect()
}

/// Check every index of `indices` is below `count`
pub fn check_indices(
    what: &'static str,
    indices: impl IntoIterator<Item = u32>,
    count: usize,
) -> Result<(), DifLoadingError> {
    for index in indices {
        if index as usize >= count {
            return Err(DifLoadingError::InvalidIndex { what, index, count: count as u32 });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_have_no_padding() {
        assert_eq!(std::mem::size_of::<Vec3>(), 12);
        assert_eq!(std::mem::size_of::<Surface>(), 4 * 21);
        assert_eq!(std::mem::size_of::<LightState>(), 16);
        assert_eq!(std::mem::size_of::<ConvexHull>(), 4 * 14);
    }

    #[test]
    fn arrays_are_count_prefixed() {
        let mut bytes = Vec::new();
        write_vec(&mut bytes, &[Span { start: 1, count: 2 }, Span { start: 3, count: 4 }]).expect("vector write");
        write_strings(&mut bytes, &["NULL".to_string(), "base/WALL".to_string()]).expect("string write");

        assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
        assert_eq!(bytes.len(), 4 + 16 + 4 + (4 + 4) + (4 + 9));

        let mut src = bytes.as_slice();
        let spans = read_vec::<Span>(&mut src).expect("vector read");
        let strings = read_strings(&mut src).expect("string read");

        assert_eq!(spans[1], Span { start: 3, count: 4 });
        assert_eq!(strings, vec!["NULL".to_string(), "base/WALL".to_string()]);
        assert!(src.is_empty());
    }

    #[test]
    fn truncated_array_fails() {
        let mut bytes = Vec::new();
        write_u32(&mut bytes, 3).expect("count write");
        bytes.extend_from_slice(&[0; 8]);

        assert!(read_vec::<u32>(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn index_check_reports_array() {
        assert!(check_indices("plane", [0, 1, 2], 3).is_ok());
        assert!(matches!(
            check_indices("plane", [0, 5], 3),
            Err(DifLoadingError::InvalidIndex { what: "plane", index: 5, count: 3 })
        ));
    }
}

// interior/dif.rs
