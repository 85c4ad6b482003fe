//! Unit designs.
//!
//! Stochastic and grid designs are produced directly in `[0, 1]`. The
//! classical screening and response-surface designs are produced in their
//! native coded units (`-1`, `0`, `+1` plus axial points) and mapped by the
//! caller.

use rand::Rng;
use rand::seq::SliceRandom;

use super::DesignMatrix;
use crate::error::SamplingError;

/// Largest parameter count accepted by the central composite design (2^n corner runs)
pub const MAX_CENTRAL_COMPOSITE_PARAMS: usize = 20;

/// Centred Latin hypercube: one point per stratum in every column.
pub fn lhs_centered<R: Rng + ?Sized>(n_params: usize, n_samples: usize, rng: &mut R) -> DesignMatrix {
    let mut design = DesignMatrix::zeros(n_samples, n_params);
    let mut strata: Vec<usize> = (0..n_samples).collect();
    for col in 0..n_params {
        strata.shuffle(rng);
        for (row, &k) in strata.iter().enumerate() {
            design.set(row, col, (k as f64 + 0.5) / n_samples as f64);
        }
    }
    design
}

/// Best of `iterations` centred Latin hypercubes by minimum pairwise distance
pub fn lhs_maximin<R: Rng + ?Sized>(
    n_params: usize,
    n_samples: usize,
    iterations: usize,
    rng: &mut R,
) -> DesignMatrix {
    let mut best = lhs_centered(n_params, n_samples, rng);
    if n_samples < 2 {
        return best;
    }
    let mut best_distance = min_pairwise_distance(&best);

    for _ in 1..iterations {
        let candidate = lhs_centered(n_params, n_samples, rng);
        let distance = min_pairwise_distance(&candidate);
        if distance > best_distance {
            best = candidate;
            best_distance = distance;
        }
    }
    best
}

fn min_pairwise_distance(design: &DesignMatrix) -> f64 {
    let rows: Vec<&[f64]> = design.rows().collect();
    let mut min = f64::INFINITY;
    for (i, a) in rows.iter().enumerate() {
        for b in &rows[i + 1..] {
            let d: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
            min = min.min(d);
        }
    }
    min.sqrt()
}

pub fn uniform_random<R: Rng + ?Sized>(n_params: usize, n_samples: usize, rng: &mut R) -> DesignMatrix {
    let mut design = DesignMatrix::zeros(n_samples, n_params);
    for row in 0..n_samples {
        for col in 0..n_params {
            design.set(row, col, rng.random::<f64>());
        }
    }
    design
}

/// Levels per axis for a full factorial with at least `n_samples` points
pub fn grid_levels(n_params: usize, n_samples: usize) -> usize {
    let exp = u32::try_from(n_params).unwrap_or(u32::MAX);
    let mut levels = 1usize;
    while levels.saturating_pow(exp) < n_samples {
        levels += 1;
    }
    levels
}

/// First `n_samples` points of an evenly spaced full factorial.
///
/// The first column varies fastest. A single level sits at the midpoint.
pub fn full_factorial(n_params: usize, n_samples: usize) -> DesignMatrix {
    let levels = grid_levels(n_params, n_samples);
    let level_value = |k: usize| {
        if levels == 1 {
            0.5
        } else {
            k as f64 / (levels - 1) as f64
        }
    };

    let mut design = DesignMatrix::zeros(n_samples, n_params);
    for row in 0..n_samples {
        let mut rest = row;
        for col in 0..n_params {
            design.set(row, col, level_value(rest % levels));
            rest /= levels;
        }
    }
    design
}

/// Two-level full factorial in coded units, first column fastest
fn two_level_factorial(n_params: usize) -> Vec<Vec<f64>> {
    (0..1usize << n_params)
        .map(|k| {
            (0..n_params)
                .map(|i| if (k >> i) & 1 == 1 { 1.0 } else { -1.0 })
                .collect()
        })
        .collect()
}

fn center_points(n_params: usize, count: usize) -> Vec<Vec<f64>> {
    vec![vec![0.0; n_params]; count]
}

const PB12_COL: [f64; 11] = [-1., -1., 1., -1., -1., -1., 1., 1., 1., -1., 1.];
const PB12_ROW: [f64; 11] = [-1., 1., -1., 1., 1., 1., -1., -1., -1., 1., -1.];
const PB20_COL: [f64; 19] = [
    -1., -1., 1., 1., -1., -1., -1., -1., 1., -1., 1., -1., 1., 1., 1., 1., -1., -1., 1.,
];
const PB20_ROW: [f64; 19] = [
    1., -1., -1., 1., 1., -1., -1., -1., -1., 1., -1., 1., -1., 1., 1., 1., 1., -1., -1.,
];

/// Hadamard seed matrix of order 1, 12 or 20
fn hadamard_seed(order: usize) -> Vec<Vec<f64>> {
    let core = |i: usize, j: usize| -> f64 {
        match order {
            // Toeplitz
            12 if i >= j => PB12_COL[i - j],
            12 => PB12_ROW[j - i],
            // Hankel
            _ if i + j < PB20_COL.len() => PB20_COL[i + j],
            _ => PB20_ROW[i + j + 1 - PB20_COL.len()],
        }
    };

    if order == 1 {
        return vec![vec![1.0]];
    }
    let mut h = vec![vec![1.0; order]];
    for i in 0..order - 1 {
        let mut row = Vec::with_capacity(order);
        row.push(1.0);
        row.extend((0..order - 1).map(|j| core(i, j)));
        h.push(row);
    }
    h
}

/// Plackett–Burman screening design in coded units.
///
/// Uses `4 * (n / 4 + 1)` runs built from a Hadamard matrix of order
/// `{1, 12, 20} * 2^k`.
pub fn plackett_burman(n_params: usize) -> Result<DesignMatrix, SamplingError> {
    let runs = 4 * (n_params / 4 + 1);
    let (seed, doublings) = [1usize, 12, 20]
        .into_iter()
        .find_map(|base| {
            let ratio = runs / base;
            (runs % base == 0 && ratio.is_power_of_two())
                .then(|| (base, ratio.trailing_zeros()))
        })
        .ok_or(SamplingError::UnsupportedDesignSize {
            method: "plackett_burman",
            n_params,
        })?;

    let mut h = hadamard_seed(seed);
    for _ in 0..doublings {
        let mut doubled = Vec::with_capacity(h.len() * 2);
        for row in &h {
            doubled.push(row.iter().chain(row.iter()).copied().collect::<Vec<_>>());
        }
        for row in &h {
            doubled.push(row.iter().copied().chain(row.iter().map(|v| -v)).collect());
        }
        h = doubled;
    }

    let rows: Vec<Vec<f64>> = h
        .into_iter()
        .rev()
        .map(|row| row[1..=n_params].to_vec())
        .collect();
    DesignMatrix::from_rows(rows).ok_or(SamplingError::UnsupportedDesignSize {
        method: "plackett_burman",
        n_params,
    })
}

/// Centre point count per parameter count for Box–Behnken designs
const BOX_BEHNKEN_CENTERS: [usize; 17] = [0, 0, 0, 3, 3, 6, 6, 6, 8, 9, 10, 12, 12, 13, 14, 15, 16];

/// Box–Behnken response-surface design in coded units
pub fn box_behnken(n_params: usize) -> Result<DesignMatrix, SamplingError> {
    if n_params < 3 {
        return Err(SamplingError::InsufficientParameters {
            method: "box_behnken",
            required: 3,
            actual: n_params,
        });
    }

    let pair = two_level_factorial(2);
    let mut rows = Vec::new();
    for i in 0..n_params - 1 {
        for j in i + 1..n_params {
            for levels in &pair {
                let mut row = vec![0.0; n_params];
                row[i] = levels[0];
                row[j] = levels[1];
                rows.push(row);
            }
        }
    }
    let centers = BOX_BEHNKEN_CENTERS
        .get(n_params)
        .copied()
        .unwrap_or(n_params);
    rows.extend(center_points(n_params, centers));

    DesignMatrix::from_rows(rows).ok_or(SamplingError::UnsupportedDesignSize {
        method: "box_behnken",
        n_params,
    })
}

/// Orthogonal, circumscribed central composite design in coded units.
///
/// Factorial block plus 4 centre points, then the axial block plus 4 centre
/// points.
pub fn central_composite(n_params: usize) -> Result<DesignMatrix, SamplingError> {
    if n_params < 2 {
        return Err(SamplingError::InsufficientParameters {
            method: "central_composite",
            required: 2,
            actual: n_params,
        });
    }
    if n_params > MAX_CENTRAL_COMPOSITE_PARAMS {
        return Err(SamplingError::UnsupportedDesignSize {
            method: "central_composite",
            n_params,
        });
    }

    const FACTORIAL_CENTERS: usize = 4;
    const AXIAL_CENTERS: usize = 4;

    let n = n_params as f64;
    let n_factorial = (1usize << n_params) as f64;
    let alpha = (n * (1.0 + AXIAL_CENTERS as f64 / (2.0 * n))
        / (1.0 + FACTORIAL_CENTERS as f64 / n_factorial))
        .sqrt();

    let mut rows = two_level_factorial(n_params);
    rows.extend(center_points(n_params, FACTORIAL_CENTERS));
    for i in 0..n_params {
        for sign in [-1.0, 1.0] {
            let mut row = vec![0.0; n_params];
            row[i] = sign * alpha;
            rows.push(row);
        }
    }
    rows.extend(center_points(n_params, AXIAL_CENTERS));

    DesignMatrix::from_rows(rows).ok_or(SamplingError::UnsupportedDesignSize {
        method: "central_composite",
        n_params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn column_dot(design: &DesignMatrix, a: usize, b: usize) -> f64 {
        design.rows().map(|r| r[a] * r[b]).sum()
    }

    #[test]
    fn test_grid_levels() {
        assert_eq!(grid_levels(2, 9), 3);
        assert_eq!(grid_levels(2, 10), 4);
        assert_eq!(grid_levels(3, 1), 1);
        assert_eq!(grid_levels(1, 7), 7);
        assert_eq!(grid_levels(200, 5), 2);
    }

    #[test]
    fn test_plackett_burman_orthogonal() {
        for n_params in [3, 7, 11, 15, 19] {
            let design = plackett_burman(n_params).unwrap();
            assert_eq!(design.n_rows(), 4 * (n_params / 4 + 1));
            assert_eq!(design.n_params(), n_params);
            for a in 0..n_params {
                // balanced columns
                assert_eq!(design.column(a).iter().sum::<f64>(), 0.0, "n={n_params} col={a}");
                for b in a + 1..n_params {
                    assert_eq!(column_dot(&design, a, b), 0.0, "n={n_params} cols {a},{b}");
                }
            }
        }
    }

    #[test]
    fn test_plackett_burman_unsupported_size() {
        // 4 * (27 / 4 + 1) = 28 runs has no 1/12/20 * 2^k construction
        assert_eq!(
            plackett_burman(27),
            Err(SamplingError::UnsupportedDesignSize {
                method: "plackett_burman",
                n_params: 27
            })
        );
    }

    #[test]
    fn test_box_behnken_layout() {
        let design = box_behnken(3).unwrap();
        assert_eq!(design.n_rows(), 12 + 3);
        for row in design.rows().take(12) {
            assert_eq!(row.iter().filter(|v| **v == 0.0).count(), 1);
        }
        for row in design.rows().skip(12) {
            assert!(row.iter().all(|v| *v == 0.0));
        }
    }

    #[test]
    fn test_central_composite_alpha() {
        let design = central_composite(2).unwrap();
        assert_eq!(design.n_rows(), 4 + 4 + 4 + 4);
        // alpha = sqrt(2 * (1 + 4/4) / (1 + 4/4)) = sqrt(2)
        let axial = design.row(8).unwrap();
        assert!((axial[0] + 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(axial[1], 0.0);
    }

    #[test]
    fn test_maximin_not_worse_than_first_candidate() {
        let mut a = StdRng::seed_from_u64(9);
        let mut b = StdRng::seed_from_u64(9);
        let first = lhs_centered(3, 12, &mut a);
        let best = lhs_maximin(3, 12, 5, &mut b);
        assert!(min_pairwise_distance(&best) >= min_pairwise_distance(&first));
    }
}
