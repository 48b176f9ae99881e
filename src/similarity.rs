
use crate::error::{Doc2VecError, Result};

use ndarray::prelude::*;

/// A searchable reference table. Callers only see ranked `(id, score)` lists, so an
/// approximate index can replace [`ExactIndex`] without touching them.
pub trait NeighborIndex {

    fn dim(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every reference ordered by descending score, ties by ascending id.
    fn rank(&self, query: ArrayView1<f32>) -> Result<Vec<(usize, f32)>>;

    fn most_similar(&self, query: ArrayView1<f32>, k: usize) -> Result<Vec<(usize, f32)>> {
        let mut ranked = self.rank(query)?;
        ranked.truncate(k);
        Ok(ranked)
    }
}

/// Brute force cosine search over L2-normalised rows, O(R·d) per query.
#[derive(Clone, Debug)]
pub struct ExactIndex {
    w: Array2<f32>,
}

fn norm(v: ArrayView1<f32>) -> f32 {
    v.dot(&v).sqrt()
}

impl ExactIndex {

    pub fn new(references: ArrayView2<f32>) -> ExactIndex {

        // normalize w so each non zero row has l2 norm 1, zero rows stay zero
        let mut w = references.to_owned();
        for mut row in w.axis_iter_mut(Axis(0)) {
            let n = norm(row.view());
            if n > 0.0 {
                row.mapv_inplace(|a| a / n);
            }
        }

        ExactIndex { w }
    }
}

impl NeighborIndex for ExactIndex {

    fn dim(&self) -> usize {
        self.w.ncols()
    }

    fn len(&self) -> usize {
        self.w.nrows()
    }

    fn rank(&self, query: ArrayView1<f32>) -> Result<Vec<(usize, f32)>> {

        if query.len() != self.dim() {
            return Err(Doc2VecError::DimensionMismatch { expected: self.dim(), got: query.len() });
        }

        // a zero query is equally (un)related to everything
        let n = norm(query);
        let scores: Array1<f32> = if n > 0.0 { self.w.dot(&query) / n } else { Array1::zeros(self.len()) };
        let mut indexed_scores: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();

        // sort by most similar in descending order
        indexed_scores.sort_by(|(i, s), (j, t)| t.total_cmp(s).then(i.cmp(j)));
        Ok(indexed_scores)
    }
}

/// Cosine similarity, 0.0 when either vector is zero.
pub fn cosine(a: ArrayView1<f32>, b: ArrayView1<f32>) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Doc2VecError::DimensionMismatch { expected: a.len(), got: b.len() });
    }
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 {
        return Ok(0.0)
    }
    Ok(a.dot(&b) / (na * nb))
}

/// Ranks `query` against every row of `references`.
pub fn rank(query: ArrayView1<f32>, references: ArrayView2<f32>) -> Result<Vec<(usize, f32)>> {
    if query.len() != references.ncols() {
        return Err(Doc2VecError::DimensionMismatch { expected: references.ncols(), got: query.len() });
    }
    ExactIndex::new(references).rank(query)
}


#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::array;

    fn references() -> Array2<f32> {
        array![
            [1.0, 0.0, 0.0],
            [0.0, 2.0, 0.0],
            [3.0, 3.0, 0.0],
            [2.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
        ]
    }

    #[test]
    fn identity_ranks_first() {
        let refs = references();
        let ranked = rank(refs.row(1), refs.view()).unwrap();
        assert_eq!(ranked[0].0, 1);
        assert!((ranked[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(ranked.len(), 5);
    }

    #[test]
    fn ties_break_by_ascending_id() {
        // rows 0 and 3 point the same way
        let refs = references();
        let ranked = rank(array![5.0, 0.0, 0.0].view(), refs.view()).unwrap();
        let ids: Vec<usize> = ranked.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![0, 3, 2, 1, 4]);
        assert!((ranked[2].1 - 0.5f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn scores_are_sorted_descending() {
        let refs = references();
        let ranked = rank(array![0.3, -0.2, 0.9].view(), refs.view()).unwrap();
        for pair in ranked.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn zero_query_keeps_id_order() {
        let refs = references();
        let ranked = rank(Array1::zeros(3).view(), refs.view()).unwrap();
        assert_eq!(ranked, vec![(0, 0.0), (1, 0.0), (2, 0.0), (3, 0.0), (4, 0.0)]);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let query = Array1::<f32>::ones(20);
        let refs = Array2::<f32>::ones((4, 30));
        match rank(query.view(), refs.view()) {
            Err(Doc2VecError::DimensionMismatch { expected, got }) => {
                assert_eq!(expected, 30);
                assert_eq!(got, 20);
            }
            other => panic!("expected DimensionMismatch, got {:?}", other),
        }

        let index = ExactIndex::new(refs.view());
        assert!(matches!(index.rank(query.view()), Err(Doc2VecError::DimensionMismatch { .. })));
        assert!(matches!(cosine(query.view(), refs.row(0)), Err(Doc2VecError::DimensionMismatch { .. })));
    }

    #[test]
    fn most_similar_truncates() {
        let index = ExactIndex::new(references().view());
        let top = index.most_similar(array![1.0, 1.0, 0.0].view(), 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, 2);
        assert!(!index.is_empty());
    }

    #[test]
    fn cosine_values() {
        let a = array![1.0f32, 0.0];
        let b = array![1.0f32, 1.0];
        assert!((cosine(a.view(), b.view()).unwrap() - 0.5f32.sqrt()).abs() < 1e-6);
        assert_eq!(cosine(a.view(), Array1::zeros(2).view()).unwrap(), 0.0);
        assert!((cosine(b.view(), (&b * 3.0).view()).unwrap() - 1.0).abs() < 1e-6);
    }
}
