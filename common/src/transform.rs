//! Affine 4x4 transforms used for instance placement.
//!
//! [`Transform`] wraps a column-major `cgmath` matrix and adds the queries the
//! scene graph needs: per-axis scale factors, orientation (handedness) and
//! translation splitting. Composition follows the usual `a * b` convention,
//! meaning "apply `b`, then `a`".

use std::ops::Mul;

use cgmath::{EuclideanSpace, InnerSpace, Matrix, Matrix3, Matrix4, Point3, SquareMatrix, Vector3};

use crate::EPSILON;

/// Whether a transform preserves or flips handedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Positive determinant: front faces keep their winding.
    Direct,
    /// Negative determinant: the transform mirrors geometry.
    Indirect,
}

/// An affine transform stored as a 4x4 matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    matrix: Matrix4<f64>,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Matrix4<f64>> for Transform {
    fn from(matrix: Matrix4<f64>) -> Self {
        Self { matrix }
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    pub fn from_matrix(matrix: Matrix4<f64>) -> Self {
        Self { matrix }
    }

    pub fn from_translation(offset: Vector3<f64>) -> Self {
        Self {
            matrix: Matrix4::from_translation(offset),
        }
    }

    /// Non-uniform scale along the X, Y and Z axes.
    pub fn from_scale(x: f64, y: f64, z: f64) -> Self {
        Self {
            matrix: Matrix4::from_nonuniform_scale(x, y, z),
        }
    }

    pub fn from_uniform_scale(factor: f64) -> Self {
        Self {
            matrix: Matrix4::from_scale(factor),
        }
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    /// Upper-left 3x3 block (rotation, scale and shear).
    pub fn linear_block(&self) -> Matrix3<f64> {
        Matrix3::from_cols(
            self.matrix.x.truncate(),
            self.matrix.y.truncate(),
            self.matrix.z.truncate(),
        )
    }

    pub fn scaling_x(&self) -> f64 {
        self.matrix.x.truncate().magnitude()
    }

    pub fn scaling_y(&self) -> f64 {
        self.matrix.y.truncate().magnitude()
    }

    pub fn scaling_z(&self) -> f64 {
        self.matrix.z.truncate().magnitude()
    }

    /// Largest of the three axis scale factors.
    pub fn max_scaling(&self) -> f64 {
        self.scaling_x().max(self.scaling_y()).max(self.scaling_z())
    }

    /// Orientation from the sign of the linear block's determinant.
    pub fn orientation(&self) -> Orientation {
        if self.linear_block().determinant() < 0.0 {
            Orientation::Indirect
        } else {
            Orientation::Direct
        }
    }

    pub fn translation(&self) -> Vector3<f64> {
        self.matrix.w.truncate()
    }

    /// Same linear block, different translation column.
    pub fn with_translation(&self, translation: Vector3<f64>) -> Self {
        let mut matrix = self.matrix;
        matrix.w = translation.extend(1.0);
        Self { matrix }
    }

    pub fn transform_point(&self, point: Point3<f64>) -> Point3<f64> {
        Point3::from_homogeneous(self.matrix * point.to_homogeneous())
    }

    pub fn transform_vector(&self, vector: Vector3<f64>) -> Vector3<f64> {
        (self.matrix * vector.extend(0.0)).truncate()
    }

    /// Transform suitable for normals: inverse transpose of the linear block.
    /// Falls back to the linear block itself when it is singular.
    pub fn normal_matrix(&self) -> Matrix3<f64> {
        let linear = self.linear_block();
        linear
            .invert()
            .map(|inverse| inverse.transpose())
            .unwrap_or(linear)
    }

    pub fn is_identity(&self) -> bool {
        let identity = Matrix4::<f64>::identity();
        let lhs: &[f64; 16] = self.matrix.as_ref();
        let rhs: &[f64; 16] = identity.as_ref();
        lhs.iter().zip(rhs).all(|(a, b)| (a - b).abs() < EPSILON)
    }

    /// Origin of the transformed frame, as a point.
    pub fn origin(&self) -> Point3<f64> {
        Point3::from_vec(self.translation())
    }
}

impl Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        Transform {
            matrix: self.matrix * rhs.matrix,
        }
    }
}

impl Mul<&Transform> for &Transform {
    type Output = Transform;

    fn mul(self, rhs: &Transform) -> Transform {
        Transform {
            matrix: self.matrix * rhs.matrix,
        }
    }
}
