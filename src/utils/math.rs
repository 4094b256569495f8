//! Shared numeric helpers for neighbour ranking.

/// Euclidean distance between two feature vectors of equal length.
/// Missing trailing components are treated as zero.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0.0);
            let y = b.get(i).copied().unwrap_or(0.0);
            (x - y) * (x - y)
        })
        .sum::<f64>()
        .sqrt()
}

/// Map a distance onto (0, 1]: `1 / (1 + distance)`.
pub fn similarity_from_distance(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

/// Greatest common divisor of two non-negative integers.
pub fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
