//! Rigid and scale transforms.

use nalgebra::{Point3, Rotation3, Vector3};
use pointcloud::{PointCloud, PointCloudError, PointCloudResult, Transform};

/// Applies `transform` to every point; rotations also rotate normals.
pub(crate) fn apply(cloud: &mut PointCloud, transform: &Transform) -> PointCloudResult<()> {
    match *transform {
        Transform::Translate { offset } => {
            for p in cloud.points_mut() {
                for axis in 0..3 {
                    p[axis] += offset[axis];
                }
            }
        }
        Transform::Rotate { angles, center } => {
            let rotation = Rotation3::from_euler_angles(angles[0], angles[1], angles[2]);
            let pivot = Vector3::from(center.unwrap_or([0.0; 3]));
            for p in cloud.points_mut() {
                let moved = rotation * (Point3::from(*p) - pivot) + pivot;
                *p = [moved.x, moved.y, moved.z];
            }
            if let Some(normals) = cloud.normals_mut() {
                for n in normals {
                    let r = rotation * Vector3::from(*n);
                    *n = [r.x, r.y, r.z];
                }
            }
        }
        Transform::Scale { factor, center } => {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(PointCloudError::validation(format!(
                    "scale factor must be a positive finite number, got {factor}"
                )));
            }
            let pivot = center.unwrap_or([0.0; 3]);
            for p in cloud.points_mut() {
                for axis in 0..3 {
                    p[axis] = pivot[axis] + (p[axis] - pivot[axis]) * factor;
                }
            }
        }
    }
    Ok(())
}
