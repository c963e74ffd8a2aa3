///! `.map` to `.dif` interior compiler
///!
///! Brush geometry is welded into a shared point/plane database, partitioned by a BSP,
///! split into zones by portal brushes, covered with lit surfaces and exported as flat
///! runtime arrays together with convex collision hulls.

/// Generic id implementation
macro_rules! impl_id {
    ($name: ident) => {
        /// Unique identifier
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
        pub struct $name(std::num::NonZeroU32);

        impl $name {
            /// Build id from index
            pub fn from_index(index: usize) -> Self {
                $name(std::num::NonZeroU32::MIN.saturating_add(index as u32))
            }

            /// Get index by id
            pub fn into_index(self) -> usize {
                self.0.get() as usize - 1
            }
        }
    };
}

/// Basic math utility
pub mod math;

/// Random number generator
pub mod rand;

/// Basic geometry
pub mod geom;

/// Compiler settings
pub mod config;

/// Compile errors
pub mod error;

/// Point and plane welding store
pub mod database;

/// Convex polygons over database points
pub mod winding;

/// Convex brushes
pub mod brush;

/// `.map` parsing and entities
pub mod map;

/// Editor BSP, zones and portals
pub mod bsp;

/// Visible and null surfaces
pub mod surface;

/// Lightmaps and animated lights
pub mod lighting;

/// Runtime interior format
pub mod interior;

/// `.dif` resource
pub mod resource;

/// Compile driver
pub mod compiler;

// lib.rs
