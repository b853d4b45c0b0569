//! Normalized-Laplacian spectral clustering.
//!
//! 1. Affinity `A[i][j] = max(0, cos(v_i, v_j))`, zero diagonal.
//! 2. `L = I - D^-1/2 A D^-1/2`, with rows of near-zero degree left isolated.
//! 3. Full symmetric eigendecomposition (cyclic Jacobi), ascending.
//! 4. Cluster count from the largest eigengap in `[2, min(max, sqrt n)]`.
//! 5. Rows of the first `k` eigenvectors, L2-normalized, fed to k-means
//!    with farthest-point seeding.
//!
//! The eigendecomposition is cubic in the point count, so larger inputs are
//! partitioned through evenly spaced landmarks (see [`MAX_SPECTRAL_POINTS`]).

use ndarray::Array2;

use crate::embeddings::cosine_similarity;

pub const DEGREE_EPSILON: f64 = 1e-10;
pub const KMEANS_MAX_ITERATIONS: usize = 50;

/// Above this many points only landmarks are decomposed; every other point
/// joins the group of its most similar landmark.
pub const MAX_SPECTRAL_POINTS: usize = 96;

const JACOBI_MAX_SWEEPS: usize = 100;
const JACOBI_TOLERANCE: f64 = 1e-12;

pub fn affinity_matrix(vectors: &[&[f32]]) -> Array2<f64> {
    let n = vectors.len();
    let mut a = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            let sim = (cosine_similarity(vectors[i], vectors[j]) as f64).max(0.0);
            a[[i, j]] = sim;
            a[[j, i]] = sim;
        }
    }
    a
}

pub fn normalized_laplacian(affinity: &Array2<f64>) -> Array2<f64> {
    let n = affinity.nrows();
    let degrees: Vec<f64> = (0..n).map(|i| affinity.row(i).sum()).collect();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        l[[i, i]] = 1.0;
        for j in 0..n {
            if i == j {
                continue;
            }
            if degrees[i] > DEGREE_EPSILON && degrees[j] > DEGREE_EPSILON {
                l[[i, j]] = -affinity[[i, j]] / (degrees[i] * degrees[j]).sqrt();
            }
        }
    }
    l
}

/// Eigenvalues ascending, with eigenvectors as the matching columns.
pub fn symmetric_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);

    let scale: f64 = a.iter().map(|x| x * x).sum::<f64>().max(1.0);
    for sweep in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0f64;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[[p, q]] * a[[p, q]];
            }
        }
        if off <= JACOBI_TOLERANCE * scale {
            tracing::trace!(sweep, "Jacobi converged");
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[[p, q]];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[[k, p]];
                    let akq = a[[k, q]];
                    a[[k, p]] = c * akp - s * akq;
                    a[[k, q]] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[[p, k]];
                    let aqk = a[[q, k]];
                    a[[p, k]] = c * apk - s * aqk;
                    a[[q, k]] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[i, i]].total_cmp(&a[[j, j]]).then(i.cmp(&j)));

    let values = order.iter().map(|&i| a[[i, i]]).collect();
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }
    (values, vectors)
}

/// Cluster count at the largest gap between consecutive eigenvalues.
pub fn eigengap_k(eigenvalues: &[f64], max_clusters: usize) -> usize {
    let n = eigenvalues.len();
    if n < 3 {
        return 2;
    }
    let upper = max_clusters.min((n as f64).sqrt().floor() as usize);
    let mut best_k = 2;
    let mut best_gap = f64::NEG_INFINITY;
    for k in 2..=upper {
        if k >= n {
            break;
        }
        let gap = eigenvalues[k] - eigenvalues[k - 1];
        if gap > best_gap {
            best_gap = gap;
            best_k = k;
        }
    }
    best_k
}

/// Rows of the first `k` eigenvector columns, each L2-normalized.
pub fn spectral_embedding(eigenvectors: &Array2<f64>, k: usize) -> Array2<f64> {
    let n = eigenvectors.nrows();
    let k = k.min(eigenvectors.ncols());
    let mut out = Array2::<f64>::zeros((n, k));
    for i in 0..n {
        let norm = (0..k)
            .map(|j| eigenvectors[[i, j]].powi(2))
            .sum::<f64>()
            .sqrt();
        for j in 0..k {
            out[[i, j]] = if norm > DEGREE_EPSILON {
                eigenvectors[[i, j]] / norm
            } else {
                0.0
            };
        }
    }
    out
}

fn squared_distance(points: &Array2<f64>, i: usize, centroid: &[f64]) -> f64 {
    points
        .row(i)
        .iter()
        .zip(centroid)
        .map(|(a, b)| (a - b).powi(2))
        .sum()
}

/// Farthest-point seeded k-means. Returns a cluster index per row.
pub fn kmeans(points: &Array2<f64>, k: usize, max_iterations: usize) -> Vec<usize> {
    let n = points.nrows();
    if n == 0 {
        return Vec::new();
    }
    let k = k.clamp(1, n);

    let mut seeds = vec![0usize];
    let mut centroids: Vec<Vec<f64>> = vec![points.row(0).to_vec()];
    while centroids.len() < k {
        let mut best: Option<(usize, f64)> = None;
        for i in 0..n {
            if seeds.contains(&i) {
                continue;
            }
            let d = centroids
                .iter()
                .map(|c| squared_distance(points, i, c))
                .fold(f64::INFINITY, f64::min);
            if best.map_or(true, |(_, bd)| d > bd) {
                best = Some((i, d));
            }
        }
        let Some((idx, _)) = best else { break };
        seeds.push(idx);
        centroids.push(points.row(idx).to_vec());
    }

    let dims = points.ncols();
    let mut assignment = vec![usize::MAX; n];
    for iteration in 0..max_iterations {
        let mut changed = false;
        for i in 0..n {
            let mut nearest = 0;
            let mut nearest_d = f64::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let d = squared_distance(points, i, centroid);
                if d < nearest_d {
                    nearest_d = d;
                    nearest = c;
                }
            }
            if assignment[i] != nearest {
                assignment[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            tracing::trace!(iteration, "k-means converged");
            break;
        }
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<usize> = (0..n).filter(|&i| assignment[i] == c).collect();
            if members.is_empty() {
                continue;
            }
            let mut mean = vec![0.0f64; dims];
            for &i in &members {
                for (m, x) in mean.iter_mut().zip(points.row(i).iter()) {
                    *m += x;
                }
            }
            for m in mean.iter_mut() {
                *m /= members.len() as f64;
            }
            *centroid = mean;
        }
    }
    assignment
}

/// Splits `vectors` into groups of indices, ordered by first member.
/// Empty clusters are dropped, so fewer than `k` groups may come back.
pub fn spectral_partition(vectors: &[&[f32]], max_clusters: usize) -> Vec<Vec<usize>> {
    let n = vectors.len();
    if n < 2 {
        return vec![(0..n).collect()];
    }
    if n > MAX_SPECTRAL_POINTS {
        return landmark_partition(vectors, max_clusters);
    }
    let laplacian = normalized_laplacian(&affinity_matrix(vectors));
    let (values, eigenvectors) = symmetric_eigen(&laplacian);
    let k = eigengap_k(&values, max_clusters.max(2)).min(n);
    let embedding = spectral_embedding(&eigenvectors, k);
    let assignment = kmeans(&embedding, k, KMEANS_MAX_ITERATIONS);
    tracing::debug!(points = n, k, "Spectral partition");
    group_by_first_member(&assignment, k)
}

fn landmark_partition(vectors: &[&[f32]], max_clusters: usize) -> Vec<Vec<usize>> {
    let n = vectors.len();
    let landmarks: Vec<&[f32]> = (0..MAX_SPECTRAL_POINTS)
        .map(|i| vectors[i * n / MAX_SPECTRAL_POINTS])
        .collect();
    let landmark_groups = spectral_partition(&landmarks, max_clusters);

    let mut group_of_landmark = vec![0usize; landmarks.len()];
    for (g, members) in landmark_groups.iter().enumerate() {
        for &m in members {
            group_of_landmark[m] = g;
        }
    }
    let assignment: Vec<usize> = vectors
        .iter()
        .map(|v| {
            let mut nearest = 0;
            let mut nearest_sim = f32::NEG_INFINITY;
            for (l, landmark) in landmarks.iter().enumerate() {
                let sim = cosine_similarity(v, landmark);
                if sim > nearest_sim {
                    nearest_sim = sim;
                    nearest = l;
                }
            }
            group_of_landmark[nearest]
        })
        .collect();
    tracing::debug!(
        points = n,
        landmarks = landmarks.len(),
        groups = landmark_groups.len(),
        "Landmark spectral partition"
    );
    group_by_first_member(&assignment, landmark_groups.len())
}

/// Turns per-point cluster ids in `0..k` into index groups, ordered by
/// first member.
fn group_by_first_member(assignment: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut slot_of_cluster: Vec<Option<usize>> = vec![None; k];
    for (i, &cluster) in assignment.iter().enumerate() {
        let slot = match slot_of_cluster[cluster] {
            Some(s) => s,
            None => {
                groups.push(Vec::new());
                slot_of_cluster[cluster] = Some(groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[slot].push(i);
    }
    groups
}
