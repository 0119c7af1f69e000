//! Voxel-grid downsampling and outlier removal.

use pointcloud::{PointCloud, PointCloudResult};
use rayon::prelude::*;

use crate::spatial::PointIndex;

/// Clouds larger than this are sorted in parallel.
const PARALLEL_SORT_THRESHOLD: usize = 10_000;

type VoxelKey = (i64, i64, i64);

fn voxel_key(p: &[f64; 3], voxel_size: f64) -> VoxelKey {
    (
        (p[0] / voxel_size).floor() as i64,
        (p[1] / voxel_size).floor() as i64,
        (p[2] / voxel_size).floor() as i64,
    )
}

/// Replaces the points of each occupied voxel by their centroid.
///
/// Colours are averaged; normals are averaged and re-normalised.
pub(crate) fn voxel_down_sample(cloud: &PointCloud, voxel_size: f64) -> PointCloudResult<PointCloud> {
    if voxel_size <= 0.0 || cloud.is_empty() {
        return Ok(cloud.clone());
    }

    let points = cloud.points();
    let mut keyed: Vec<(VoxelKey, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (voxel_key(p, voxel_size), i))
        .collect();
    if keyed.len() > PARALLEL_SORT_THRESHOLD {
        keyed.par_sort_unstable();
    } else {
        keyed.sort_unstable();
    }

    let mut new_points = Vec::new();
    let mut new_colors = cloud.colors().map(|_| Vec::new());
    let mut new_normals = cloud.normals().map(|_| Vec::new());

    for group in keyed.chunk_by(|a, b| a.0 == b.0) {
        let indices: Vec<usize> = group.iter().map(|&(_, i)| i).collect();
        new_points.push(mean_of(points, &indices));
        if let (Some(out), Some(colors)) = (new_colors.as_mut(), cloud.colors()) {
            out.push(mean_of(colors, &indices));
        }
        if let (Some(out), Some(normals)) = (new_normals.as_mut(), cloud.normals()) {
            out.push(normalized(mean_of(normals, &indices)));
        }
    }

    PointCloud::new(new_points, new_colors, new_normals)
}

fn mean_of(values: &[[f64; 3]], indices: &[usize]) -> [f64; 3] {
    let mut sum = [0.0; 3];
    for &i in indices {
        for axis in 0..3 {
            sum[axis] += values[i][axis];
        }
    }
    let n = indices.len() as f64;
    [sum[0] / n, sum[1] / n, sum[2] / n]
}

fn normalized(v: [f64; 3]) -> [f64; 3] {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm > 1e-12 {
        [v[0] / norm, v[1] / norm, v[2] / norm]
    } else {
        v
    }
}

/// Removes points whose mean distance to their `nb_neighbors` nearest
/// neighbours exceeds the global mean by more than `std_ratio` standard
/// deviations.
pub(crate) fn remove_statistical_outlier(
    cloud: &PointCloud,
    nb_neighbors: usize,
    std_ratio: f64,
) -> (PointCloud, Vec<usize>) {
    if cloud.is_empty() || nb_neighbors == 0 {
        return (cloud.clone(), (0..cloud.len()).collect());
    }

    let index = PointIndex::build(cloud.points());
    let mean_distances: Vec<f64> = cloud
        .points()
        .par_iter()
        .map(|p| {
            // The nearest hit is the point itself.
            let distances: Vec<f64> = index
                .nearest(p, nb_neighbors + 1)
                .skip(1)
                .map(|n| distance(&n.position, p))
                .collect();
            if distances.is_empty() {
                0.0
            } else {
                distances.iter().sum::<f64>() / distances.len() as f64
            }
        })
        .collect();

    let n = mean_distances.len() as f64;
    let mean = mean_distances.iter().sum::<f64>() / n;
    let variance = mean_distances
        .iter()
        .map(|d| (d - mean) * (d - mean))
        .sum::<f64>()
        / n;
    let threshold = mean + std_ratio * variance.sqrt();

    let inliers: Vec<usize> = mean_distances
        .iter()
        .enumerate()
        .filter(|(_, &d)| d <= threshold)
        .map(|(i, _)| i)
        .collect();
    (cloud.select(&inliers), inliers)
}

/// Removes points with fewer than `nb_points` points (itself included)
/// within `radius`.
pub(crate) fn remove_radius_outlier(
    cloud: &PointCloud,
    nb_points: usize,
    radius: f64,
) -> (PointCloud, Vec<usize>) {
    if cloud.is_empty() {
        return (cloud.clone(), Vec::new());
    }

    let index = PointIndex::build(cloud.points());
    let keep: Vec<bool> = cloud
        .points()
        .par_iter()
        .map(|p| index.count_within(p, radius) >= nb_points)
        .collect();

    let inliers: Vec<usize> = keep
        .iter()
        .enumerate()
        .filter(|(_, &k)| k)
        .map(|(i, _)| i)
        .collect();
    (cloud.select(&inliers), inliers)
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize, spacing: f64) -> Vec<[f64; 3]> {
        let mut points = Vec::with_capacity(n * n * n);
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    points.push([x as f64 * spacing, y as f64 * spacing, z as f64 * spacing]);
                }
            }
        }
        points
    }

    #[test]
    fn test_voxel_merges_points_in_same_cell() {
        let cloud = PointCloud::new(
            vec![[0.01, 0.01, 0.01], [0.03, 0.03, 0.03], [1.5, 1.5, 1.5]],
            Some(vec![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]]),
            None,
        )
        .unwrap();
        let down = voxel_down_sample(&cloud, 1.0).unwrap();
        assert_eq!(down.len(), 2);
        assert_eq!(down.points()[0], [0.02, 0.02, 0.02]);
        assert_eq!(down.colors().unwrap()[0], [0.5, 0.0, 0.5]);
    }

    #[test]
    fn test_voxel_reduces_dense_grid() {
        // 10×10×10 points spaced 0.1 apart; 0.5 cells hold 5×5×5 points each.
        let cloud = PointCloud::from_points(grid(10, 0.1));
        let down = voxel_down_sample(&cloud, 0.5).unwrap();
        assert!(down.len() < cloud.len());
        assert!(down.len() >= 8);
    }

    #[test]
    fn test_voxel_non_positive_size_is_identity() {
        let cloud = PointCloud::from_points(grid(3, 1.0));
        assert_eq!(voxel_down_sample(&cloud, 0.0).unwrap(), cloud);
    }

    #[test]
    fn test_statistical_removes_far_point() {
        let mut points = grid(5, 0.1);
        points.push([50.0, 50.0, 50.0]);
        let cloud = PointCloud::from_points(points);
        let (filtered, inliers) = remove_statistical_outlier(&cloud, 8, 1.0);
        assert_eq!(filtered.len(), cloud.len() - 1);
        assert!(!inliers.contains(&(cloud.len() - 1)));
    }

    #[test]
    fn test_radius_removes_isolated_point() {
        let mut points = grid(4, 0.1);
        points.push([9.0, 9.0, 9.0]);
        let cloud = PointCloud::from_points(points);
        let (filtered, inliers) = remove_radius_outlier(&cloud, 3, 0.15);
        assert_eq!(filtered.len(), cloud.len() - 1);
        assert_eq!(inliers.len(), filtered.len());
    }
}
