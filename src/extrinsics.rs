//! Camera extrinsics for mapping 3D poses into world space.

use std::path::Path;

use anyhow::{bail, Context};
use nalgebra::{Matrix3, Point3, Vector3};
use serde::Deserialize;

// JSON layout: `R` is a row-major 3x3 rotation matrix, `t` a 3x1 column vector.
#[derive(Deserialize)]
struct RawExtrinsics {
    #[serde(rename = "R")]
    r: [[f32; 3]; 3],
    t: [[f32; 1]; 3],
}

/// World-to-camera transform of the capture camera.
#[derive(Debug)]
pub struct Extrinsics {
    r_inv: Matrix3<f32>,
    t: Vector3<f32>,
}

impl Extrinsics {
    /// Loads camera extrinsics from a JSON file holding a rotation matrix `R` and a
    /// translation vector `t`.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read extrinsics from '{}'", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("invalid extrinsics file '{}'", path.display()))
    }

    fn from_json(json: &str) -> anyhow::Result<Self> {
        let raw: RawExtrinsics = serde_json::from_str(json)?;
        let r = Matrix3::from_fn(|i, j| raw.r[i][j]);
        let Some(r_inv) = r.try_inverse() else {
            bail!("rotation matrix is not invertible");
        };
        Ok(Self {
            r_inv,
            t: Vector3::new(raw.t[0][0], raw.t[1][0], raw.t[2][0]),
        })
    }

    /// Transforms a point from camera space into world space.
    pub fn camera_to_world(&self, p: Point3<f32>) -> Point3<f32> {
        self.r_inv * (p - self.t)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn identity_rotation_removes_translation() {
        let ext = Extrinsics::from_json(
            r#"{
                "R": [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
                "t": [[1], [2], [3]]
            }"#,
        )
        .unwrap();
        let p = ext.camera_to_world(Point3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(p, Point3::origin());
    }

    #[test]
    fn rotation_is_inverted() {
        // Rotation by 90 degrees around the z axis.
        let ext = Extrinsics::from_json(
            r#"{
                "R": [[0, -1, 0], [1, 0, 0], [0, 0, 1]],
                "t": [[0], [0], [0]]
            }"#,
        )
        .unwrap();
        let p = ext.camera_to_world(Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, -1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn rejects_singular_rotation() {
        let res = Extrinsics::from_json(
            r#"{
                "R": [[0, 0, 0], [0, 0, 0], [0, 0, 0]],
                "t": [[0], [0], [0]]
            }"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(Extrinsics::from_json(r#"{"R": [[1, 0, 0], [0, 1, 0], [0, 0, 1]]}"#).is_err());
    }
}
