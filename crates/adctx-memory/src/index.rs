//! Flat exact similarity index over unit-normalized vectors.
//!
//! Vectors are stored contiguously in insertion order. Scores are dot
//! products, equal to cosine similarity because both sides are normalized.
//! Ties are broken by ascending insertion position, so results are fully
//! deterministic.

use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("vector has dimension {actual}, index expects {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("vector is empty")]
    Empty,
}

/// Contiguous row-major vector storage.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dim: Option<usize>,
    data: Vec<f32>,
    len: usize,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dimension fixed by the first push, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check a vector against the established dimension without mutating.
    pub fn check(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.is_empty() {
            return Err(IndexError::Empty);
        }
        match self.dim {
            Some(expected) if expected != vector.len() => Err(IndexError::Dimension {
                expected,
                actual: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Append a vector, returning its position.
    pub fn push(&mut self, vector: &[f32]) -> Result<usize, IndexError> {
        self.check(vector)?;
        self.dim.get_or_insert(vector.len());
        self.data.extend_from_slice(vector);
        self.len += 1;
        Ok(self.len - 1)
    }

    /// Vector stored at `position`.
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let dim = self.dim?;
        if position >= self.len {
            return None;
        }
        Some(&self.data[position * dim..(position + 1) * dim])
    }

    /// Keep only the given positions, in the given order. The dimension is
    /// retained even if nothing survives.
    pub fn retain_positions(&mut self, positions: &[usize]) {
        let Some(dim) = self.dim else {
            return;
        };
        let mut data = Vec::with_capacity(positions.len() * dim);
        for &pos in positions {
            if let Some(row) = self.get(pos) {
                data.extend_from_slice(row);
            }
        }
        self.len = data.len() / dim;
        self.data = data;
    }

    /// Score every stored vector against `query` and return the `min(k, n)`
    /// best as `(position, score)`, highest score first.
    pub fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        let Some(dim) = self.dim else {
            return Ok(Vec::new());
        };
        if query.len() != dim {
            return Err(IndexError::Dimension {
                expected: dim,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(dim)
            .enumerate()
            .map(|(pos, row)| (pos, dot(row, query)))
            .collect();

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank_order);
            scored.truncate(k);
        }
        scored.sort_by(rank_order);
        Ok(scored)
    }
}

/// Descending score, then ascending position.
fn rank_order(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then(a.0.cmp(&b.0))
}

/// Dot product of two equal-length slices.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Scale `v` to unit L2 norm. Returns `false` (leaving `v` untouched) when
/// the norm is zero or not finite.
pub fn normalize(v: &mut [f32]) -> bool {
    let norm = dot(v, v).sqrt();
    if !norm.is_finite() || norm < f32::EPSILON {
        return false;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: &[f32]) -> Vec<f32> {
        let mut v = v.to_vec();
        assert!(normalize(&mut v));
        v
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = VectorIndex::new();
        assert!(index.top_k(&[1.0, 0.0], 4).unwrap().is_empty());
        assert_eq!(index.dimension(), None);
    }

    #[test]
    fn test_dimension_fixed_by_first_push() {
        let mut index = VectorIndex::new();
        assert_eq!(index.push(&unit(&[1.0, 0.0, 0.0])).unwrap(), 0);
        assert_eq!(index.dimension(), Some(3));
        assert_eq!(
            index.push(&[1.0, 0.0]),
            Err(IndexError::Dimension {
                expected: 3,
                actual: 2
            })
        );
        assert_eq!(index.len(), 1);
        assert_eq!(index.push(&[]), Err(IndexError::Empty));
    }

    #[test]
    fn test_top_k_ordering() {
        let mut index = VectorIndex::new();
        index.push(&unit(&[0.0, 0.0, 1.0])).unwrap();
        index.push(&unit(&[1.0, 0.0, 0.0])).unwrap();
        index.push(&unit(&[1.0, 1.0, 0.0])).unwrap();

        let hits = index.top_k(&unit(&[1.0, 0.1, 0.0]), 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(positions, vec![1, 2, 0]);
        assert!(hits.windows(2).all(|w| w[0].1 >= w[1].1));
    }

    #[test]
    fn test_top_k_truncates_to_k() {
        let mut index = VectorIndex::new();
        for i in 0..10 {
            index.push(&unit(&[1.0, i as f32])).unwrap();
        }
        let hits = index.top_k(&unit(&[1.0, 0.0]), 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].0, 0);
        let all = index.top_k(&unit(&[1.0, 0.0]), 50).unwrap();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn test_ties_break_by_insertion_order() {
        let mut index = VectorIndex::new();
        let v = unit(&[0.6, 0.8]);
        for _ in 0..5 {
            index.push(&v).unwrap();
        }
        let hits = index.top_k(&v, 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_self_query_scores_one() {
        let mut index = VectorIndex::new();
        let v = unit(&[0.3, -0.2, 0.9, 0.1]);
        index.push(&unit(&[1.0, 0.0, 0.0, 0.0])).unwrap();
        index.push(&v).unwrap();
        let hits = index.top_k(&v, 1).unwrap();
        assert_eq!(hits[0].0, 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_retain_positions() {
        let mut index = VectorIndex::new();
        for i in 0..4 {
            index.push(&[i as f32 + 1.0, 0.0]).unwrap();
        }
        index.retain_positions(&[0, 2]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(1), Some(&[3.0f32, 0.0][..]));
        assert_eq!(index.get(2), None);
        index.retain_positions(&[]);
        assert!(index.is_empty());
        assert_eq!(index.dimension(), Some(2));
    }

    #[test]
    fn test_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0];
        assert!(!normalize(&mut v));
        let mut w = vec![3.0, 4.0];
        assert!(normalize(&mut w));
        assert!((w[0] - 0.6).abs() < 1e-6);
    }
}
