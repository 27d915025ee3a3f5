use cgmath::{Matrix, Matrix3, Matrix4, One, Quaternion, SquareMatrix, Vector3};
use serde::{Deserialize, Serialize};

/// Represents the spatial data of a scene node, relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpatialTransform {
    pub scale: Vector3<f32>,
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
}

impl SpatialTransform {
    /// Get the identity transform (ie doesn't do anything).
    pub fn identity() -> Self {
        Self {
            scale: Vector3::new(1.0, 1.0, 1.0),
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
        }
    }

    /// Create a transform from plain arrays. The rotation is `[x, y, z, w]`.
    pub fn from_arrays(position: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Self {
        Self {
            position: position.into(),
            rotation: Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
            scale: scale.into(),
        }
    }

    /// The rotation as `[x, y, z, w]`.
    pub fn rotation_array(&self) -> [f32; 4] {
        [self.rotation.v.x, self.rotation.v.y, self.rotation.v.z, self.rotation.s]
    }

    /// Get the model matrix (translation * rotation * scale).
    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl Default for SpatialTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// The upper-left 3x3 (linear) part of an affine matrix.
pub fn linear_part(m: &Matrix4<f32>) -> Matrix3<f32> {
    Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate())
}

/// Inverse-transpose of the linear part; maps normals under non-uniform scale.
///
/// Falls back to the identity when the linear part is singular.
pub fn normal_matrix(m: &Matrix4<f32>) -> Matrix3<f32> {
    linear_part(m)
        .invert()
        .unwrap_or(Matrix3::identity())
        .transpose()
}

/// Serialized shape of a `SpatialTransform`, as it appears in scene files.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformDescription {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl Default for TransformDescription {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
        }
    }
}

impl From<TransformDescription> for SpatialTransform {
    fn from(desc: TransformDescription) -> Self {
        SpatialTransform::from_arrays(desc.position, desc.rotation, desc.scale)
    }
}

impl From<SpatialTransform> for TransformDescription {
    fn from(transform: SpatialTransform) -> Self {
        Self {
            position: transform.position.into(),
            rotation: transform.rotation_array(),
            scale: transform.scale.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cgmath::{Deg, Point3, Rotation3, Transform};

    #[test]
    fn identity_matrix_is_identity() {
        assert_eq!(SpatialTransform::identity().to_matrix(), Matrix4::identity());
    }

    #[test]
    fn matrix_applies_scale_then_rotation_then_translation() {
        let transform = SpatialTransform {
            position: Vector3::new(1.0, 2.0, 3.0),
            rotation: Quaternion::from_angle_z(Deg(90.0)),
            scale: Vector3::new(2.0, 1.0, 1.0),
        };
        let p = transform.to_matrix().transform_point(Point3::new(1.0, 0.0, 0.0));
        // (1,0,0) -> scaled (2,0,0) -> rotated (0,2,0) -> translated (1,4,3)
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(p.y, 4.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, 3.0, epsilon = 1e-5);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let transform = SpatialTransform {
            scale: Vector3::new(4.0, 1.0, 1.0),
            ..SpatialTransform::identity()
        };
        let normal = normal_matrix(&transform.to_matrix());
        assert_relative_eq!(normal.x.x, 0.25, epsilon = 1e-6);
        assert_relative_eq!(normal.y.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn description_round_trips_rotation_order() {
        let desc = TransformDescription {
            position: [1.0, 2.0, 3.0],
            rotation: [0.0, 0.7071068, 0.0, 0.7071068],
            scale: [1.0, 2.0, 3.0],
        };
        let transform = SpatialTransform::from(desc);
        assert_relative_eq!(transform.rotation.s, 0.7071068);
        assert_relative_eq!(transform.rotation.v.y, 0.7071068);
        let back = TransformDescription::from(transform);
        assert_eq!(back.rotation, desc.rotation);
    }
}
