//! k-nearest-neighbour normal estimation.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use pointcloud::{PointCloud, PointCloudResult};
use rayon::prelude::*;

use crate::spatial::PointIndex;

/// Neighbourhoods smaller than this fall back to +Z.
const MIN_NEIGHBORS: usize = 3;

/// Estimates one normal per point from the covariance of its `k` nearest
/// neighbours (the eigenvector of the smallest eigenvalue).
///
/// Normals are oriented towards +Z so results are deterministic; existing
/// normals are replaced.
pub(crate) fn estimate_normals(cloud: &mut PointCloud, k: usize) -> PointCloudResult<()> {
    if cloud.is_empty() {
        return Ok(());
    }

    let index = PointIndex::build(cloud.points());
    let normals: Vec<[f64; 3]> = cloud
        .points()
        .par_iter()
        .map(|p| {
            let neighbours: Vec<Vector3<f64>> = index
                .nearest(p, k.max(MIN_NEIGHBORS))
                .map(|n| Vector3::from(n.position))
                .collect();
            if neighbours.len() < MIN_NEIGHBORS {
                return [0.0, 0.0, 1.0];
            }
            let normal = plane_normal(&neighbours);
            let oriented = if normal.z < 0.0 { -normal } else { normal };
            [oriented.x, oriented.y, oriented.z]
        })
        .collect();

    cloud.set_normals(normals)
}

fn plane_normal(neighbours: &[Vector3<f64>]) -> Vector3<f64> {
    let n = neighbours.len() as f64;
    let centroid = neighbours.iter().fold(Vector3::zeros(), |acc, v| acc + v) / n;

    let mut covariance = Matrix3::zeros();
    for v in neighbours {
        let d = v - centroid;
        covariance += d * d.transpose();
    }
    covariance /= n;

    let eigen = SymmetricEigen::new(covariance);
    let smallest = eigen.eigenvalues.imin();
    eigen.eigenvectors.column(smallest).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_normals_point_up() {
        let mut points = Vec::new();
        for x in 0..6 {
            for y in 0..6 {
                points.push([x as f64 * 0.1, y as f64 * 0.1, 2.0]);
            }
        }
        let mut cloud = PointCloud::from_points(points);
        estimate_normals(&mut cloud, 8).unwrap();

        let normals = cloud.normals().unwrap();
        assert_eq!(normals.len(), cloud.len());
        for n in normals {
            assert!((n[2] - 1.0).abs() < 1e-6, "normal {n:?} is not +Z");
        }
    }

    #[test]
    fn test_tiny_cloud_gets_default_normals() {
        let mut cloud = PointCloud::from_points(vec![[0.0; 3], [1.0, 0.0, 0.0]]);
        estimate_normals(&mut cloud, 10).unwrap();
        assert_eq!(cloud.normals().unwrap(), &[[0.0, 0.0, 1.0]; 2]);
    }
}
