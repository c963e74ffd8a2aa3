///! Double precision 3D vector used by every geometry stage

use std::ops::{Add, AddAssign, BitXor, Div, DivAssign, Mul, MulAssign, Neg, Rem, Sub, SubAssign};

/// Point or direction in map space
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vec3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3d {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    pub fn length2(&self) -> f64 {
        self.dot(*self)
    }

    pub fn length(&self) -> f64 {
        self.length2().sqrt()
    }

    pub fn normalized(&self) -> Self {
        *self / self.length()
    }

    /// Normalized vector, None for (almost) zero ones
    pub fn checked_normalized(&self) -> Option<Self> {
        let len2 = self.length2();

        if len2 > f64::EPSILON {
            Some(*self / len2.sqrt())
        } else {
            None
        }
    }

    /// Component by axis index (0 - x, 1 - y, 2 - z)
    pub fn axis(&self, index: usize) -> f64 {
        match index {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Per-component minimum
    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    /// Per-component maximum
    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }
}

#[macro_export]
macro_rules! vec3d {
    ($x: expr, $y: expr, $z: expr $(,)?) => {
        $crate::math::Vec3d::new($x, $y, $z)
    };
}

macro_rules! impl_binary_operator {
    ($op_name: ident, $op_fn_name: ident, $assign_name: ident, $assign_fn_name: ident, $op: tt) => {
        impl $op_name for Vec3d {
            type Output = Vec3d;

            fn $op_fn_name(self, rhs: Vec3d) -> Vec3d {
                Vec3d::new(self.x $op rhs.x, self.y $op rhs.y, self.z $op rhs.z)
            }
        }

        impl $op_name<f64> for Vec3d {
            type Output = Vec3d;

            fn $op_fn_name(self, rhs: f64) -> Vec3d {
                Vec3d::new(self.x $op rhs, self.y $op rhs, self.z $op rhs)
            }
        }

        impl $assign_name for Vec3d {
            fn $assign_fn_name(&mut self, rhs: Vec3d) {
                *self = *self $op rhs;
            }
        }

        impl $assign_name<f64> for Vec3d {
            fn $assign_fn_name(&mut self, rhs: f64) {
                *self = *self $op rhs;
            }
        }
    };
}

impl_binary_operator!(Add, add, AddAssign, add_assign, +);
impl_binary_operator!(Sub, sub, SubAssign, sub_assign, -);
impl_binary_operator!(Mul, mul, MulAssign, mul_assign, *);
impl_binary_operator!(Div, div, DivAssign, div_assign, /);

impl Neg for Vec3d {
    type Output = Vec3d;

    fn neg(self) -> Vec3d {
        Vec3d::new(-self.x, -self.y, -self.z)
    }
}

/// Dot product
impl BitXor for Vec3d {
    type Output = f64;

    fn bitxor(self, rhs: Vec3d) -> f64 {
        self.dot(rhs)
    }
}

/// Cross product
impl Rem for Vec3d {
    type Output = Vec3d;

    fn rem(self, rhs: Vec3d) -> Vec3d {
        self.cross(rhs)
    }
}


// math.rs
