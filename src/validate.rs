
use crate::config::DEFAULT_THREADS;
use crate::error::{Doc2VecError, Result, Warning};
use crate::infer::InferenceEngine;
use crate::model::Model;
use crate::similarity::{ExactIndex, NeighborIndex};
use crate::tokenizer::Document;

use ndarray::Array1;
use ndarray_stats::{QuantileExt, SummaryStatisticsExt};
use rayon::{prelude::*, ThreadPoolBuilder};
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::info;


/// How many documents found themselves at each rank (0 = most similar).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RankDistribution {
    counts: BTreeMap<usize, usize>,
}

impl RankDistribution {

    pub fn from_ranks(ranks: &[usize]) -> RankDistribution {
        let mut counts = BTreeMap::new();
        for &rank in ranks {
            *counts.entry(rank).or_insert(0) += 1;
        }
        RankDistribution { counts }
    }

    pub fn count_at(&self, rank: usize) -> usize {
        self.counts.get(&rank).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// `(rank, count)` pairs in ascending rank order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.counts.iter().map(|(r, c)| (*r, *c))
    }

    fn columns(&self) -> (Array1<f64>, Array1<f64>) {
        let ranks = self.iter().map(|(rank, _)| rank as f64).collect();
        let counts = self.iter().map(|(_, count)| count as f64).collect();
        (ranks, counts)
    }

    pub fn mean_rank(&self) -> Option<f64> {
        let (ranks, counts) = self.columns();
        ranks.weighted_mean(&counts).ok()
    }

    pub fn worst_rank(&self) -> Option<usize> {
        let (ranks, _) = self.columns();
        ranks.max().ok().map(|r| *r as usize)
    }

    /// Share of documents that ranked themselves first.
    pub fn top_share(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count_at(0) as f64 / total as f64,
        }
    }
}

impl Display for RankDistribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries: Vec<String> = self.iter().map(|(rank, count)| format!("{}: {}", rank, count)).collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DocumentRank {
    pub document: usize,
    pub rank: usize,
    // second entry of the ranked list, (id, score)
    pub runner_up: Option<(usize, f32)>,
}

#[derive(Clone, Debug)]
pub struct ValidationReport {
    pub distribution: RankDistribution,
    pub documents: Vec<DocumentRank>,
    pub warnings: Vec<Warning>,
}

/// Re-infers every training document and records where its own id lands among the
/// trained document vectors.
pub fn validate(model: &Model, documents: &[Document]) -> Result<ValidationReport> {
    let engine = InferenceEngine::new(model);
    let index = ExactIndex::new(model.document_vectors());
    validate_with(&engine, &index, documents, DEFAULT_THREADS)
}

pub fn validate_with<I>(engine: &InferenceEngine, index: &I, documents: &[Document], num_threads: usize) -> Result<ValidationReport>
where I: NeighborIndex + Sync {

    if index.len() != documents.len() {
        return Err(Doc2VecError::InvalidConfig(format!(
            "reference table holds {} vectors for {} documents", index.len(), documents.len()
        )));
    }

    // each inference owns its scratch vector, the model is only read
    let pool = ThreadPoolBuilder::new().num_threads(num_threads).build()?;
    let results: Vec<(DocumentRank, Option<Warning>)> = pool.install(|| {
        documents.par_iter().map(|document| -> Result<(DocumentRank, Option<Warning>)> {
            let inferred = engine.infer_document(document)?;
            let ranked = index.rank(inferred.vector.view())?;
            let rank = ranked.iter().position(|(id, _)| *id == document.id).ok_or_else(|| {
                Doc2VecError::InvalidConfig(format!("document {} is not in the reference table", document.id))
            })?;
            let result = DocumentRank { document: document.id, rank, runner_up: ranked.get(1).copied() };
            Ok((result, inferred.warning))
        }).collect::<Result<Vec<_>>>()
    })?;

    let (ranked_documents, warnings): (Vec<DocumentRank>, Vec<Option<Warning>>) = results.into_iter().unzip();
    let warnings: Vec<Warning> = warnings.into_iter().flatten().collect();
    let ranks: Vec<usize> = ranked_documents.iter().map(|d| d.rank).collect();
    let distribution = RankDistribution::from_ranks(&ranks);

    info!("rank distribution {}, {:.1}% of documents rank themselves first", distribution, 100.0 * distribution.top_share());
    Ok(ValidationReport { distribution, documents: ranked_documents, warnings })
}
