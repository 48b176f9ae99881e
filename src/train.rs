
use crate::config::TrainParams;
use crate::error::{Doc2VecError, Result};
use crate::infer::DocumentFit;
use crate::model::{Model, ModelSnapshot, SNAPSHOT_VERSION};
use crate::tokenizer::Document;
use crate::vocab::Vocabulary;

use ndarray::prelude::*;
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};


/// Draws negative examples from the unigram distribution raised to `power`,
/// through a cumulative table searched by bisection.
#[derive(Clone, Debug)]
pub struct NegativeSampler {
    cum_table: Vec<u64>,
}

impl NegativeSampler {

    const DOMAIN: u64 = (1 << 31) - 1;

    pub fn new(counts: &[usize], power: f64) -> NegativeSampler {
        let train_words_pow: f64 = counts.iter().map(|&c| (c as f64).powf(power)).sum();
        let mut cumulative = 0.0;
        let mut cum_table: Vec<u64> = counts.iter().map(|&c| {
            cumulative += (c as f64).powf(power);
            (cumulative / train_words_pow * NegativeSampler::DOMAIN as f64).round() as u64
        }).collect();
        if let Some(last) = cum_table.last_mut() {
            *last = NegativeSampler::DOMAIN;
        }
        NegativeSampler { cum_table }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        let r = rng.gen_range(0..NegativeSampler::DOMAIN);
        self.cum_table.partition_point(|&c| c <= r)
    }

    // draws equal to the target are dropped, not redrawn
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R, target: usize, k: usize, negatives: &mut Vec<usize>) {
        negatives.clear();
        for _ in 0..k {
            let n = self.sample(rng);
            if n != target {
                negatives.push(n);
            }
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub(crate) fn decayed_alpha(alpha: f32, min_alpha: f32, progress: f32) -> f32 {
    alpha - (alpha - min_alpha) * progress.clamp(0.0, 1.0)
}

/// Fills `context` with the indices around position `t`, clipped at the sequence ends.
pub(crate) fn context_window(sequence: &[usize], t: usize, window: usize, context: &mut Vec<usize>) {
    context.clear();
    let lo = t.saturating_sub(window);
    let hi = usize::min(sequence.len(), t + window + 1);
    context.extend_from_slice(&sequence[lo..t]);
    context.extend_from_slice(&sequence[t + 1..hi]);
}

/// Mean of the document vector and the context word vectors.
pub(crate) fn hidden(doc_vec: ArrayView1<f32>, word_vectors: ArrayView2<f32>, context: &[usize]) -> Array1<f32> {
    let mut h = doc_vec.to_owned();
    for &c in context {
        h += &word_vectors.row(c);
    }
    h / (1 + context.len()) as f32
}

pub(crate) struct Gradient {
    pub hidden_error: Array1<f32>,   // to be added to every input vector
    pub output: Vec<(usize, f32)>,   // (output row, scale of h to add)
    pub loss: f32,
}

/// One negative-sampling step for `target` predicted from `h`. Only computes the update,
/// the caller decides which tables it applies to.
pub(crate) fn negative_sampling(h: &Array1<f32>, target: usize, negatives: &[usize], output_weights: ArrayView2<f32>, alpha: f32) -> Gradient {

    let mut hidden_error = Array1::<f32>::zeros(h.len());
    let mut output = Vec::with_capacity(1 + negatives.len());
    let mut loss = 0.0;

    let labelled = std::iter::once((target, 1.0f32)).chain(negatives.iter().map(|&n| (n, 0.0f32)));
    for (c, label) in labelled {
        let row = output_weights.row(c);
        let f = sigmoid(h.dot(&row));
        let g = (label - f) * alpha;
        hidden_error.scaled_add(g, &row);
        output.push((c, g));

        let p = if label > 0.5 { f } else { 1.0 - f };
        loss -= p.max(f32::MIN_POSITIVE).ln();
    }

    Gradient { hidden_error, output, loss }
}

#[derive(Clone, Debug)]
pub struct EpochStats {
    pub epoch: usize,
    pub loss: f32,  // mean over the steps of the epoch
    pub alpha: f32, // learning rate of the last step
    pub elapsed: Duration,
}

/// A training session. Owns every table it mutates, so sessions never share state.
pub struct Train {
    params: TrainParams,
    vocabulary: Vocabulary,
    sequences: Vec<Vec<usize>>,
    word_vectors: Array2<f32>,
    output_weights: Array2<f32>,
    doc_vectors: Array2<f32>,
    sampler: NegativeSampler,
    epochs_completed: usize,
    steps_per_epoch: usize,
}

impl Train {

    pub fn new(documents: &[Document], vocabulary: Vocabulary, params: &TrainParams) -> Result<Train> {

        params.validate()?;
        if vocabulary.is_empty() {
            return Err(Doc2VecError::EmptyVocabulary { min_count: params.min_count, distinct: 0 });
        }

        let dim = params.vector_size;
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let word_vectors = Array2::<f32>::random_using((vocabulary.len(), dim), Uniform::new(-0.5f32, 0.5), &mut rng) / dim as f32;
        let doc_vectors = Array2::<f32>::random_using((documents.len(), dim), Uniform::new(-0.5f32, 0.5), &mut rng) / dim as f32;
        let output_weights: Array2<f32> = Array2::zeros((vocabulary.len(), dim));

        Train::assemble(documents, vocabulary, params.clone(), word_vectors, output_weights, doc_vectors, 0)
    }

    /// Continues a session from a checkpoint taken with [`Train::checkpoint`] on the same corpus.
    pub fn resume(documents: &[Document], snapshot: ModelSnapshot) -> Result<Train> {

        snapshot.check()?;
        if snapshot.doc_vectors.nrows() != documents.len() {
            return Err(Doc2VecError::InvalidSnapshot(format!(
                "snapshot holds {} document vectors, corpus has {} documents", snapshot.doc_vectors.nrows(), documents.len()
            )));
        }
        info!("resuming training after {} of {} epochs", snapshot.epochs_completed, snapshot.params.epochs);

        Train::assemble(
            documents,
            snapshot.vocabulary,
            snapshot.params,
            snapshot.word_vectors,
            snapshot.output_weights,
            snapshot.doc_vectors,
            snapshot.epochs_completed,
        )
    }

    fn assemble(documents: &[Document],
        vocabulary: Vocabulary,
        params: TrainParams,
        word_vectors: Array2<f32>,
        output_weights: Array2<f32>,
        doc_vectors: Array2<f32>,
        epochs_completed: usize) -> Result<Train> {

        if let Some((position, doc)) = documents.iter().enumerate().find(|(i, d)| d.id != *i) {
            return Err(Doc2VecError::InvalidConfig(format!("document at position {} has id {}", position, doc.id)));
        }

        let sequences: Vec<Vec<usize>> = documents.iter().map(|d| vocabulary.encode(&d.tokens)).collect();
        let steps_per_epoch: usize = sequences.iter().map(Vec::len).sum();
        let sampler = NegativeSampler::new(vocabulary.counts(), 0.75);
        debug!("{} documents, {} training positions per epoch", documents.len(), steps_per_epoch);

        Ok(Train {
            params,
            vocabulary,
            sequences,
            word_vectors,
            output_weights,
            doc_vectors,
            sampler,
            epochs_completed,
            steps_per_epoch,
        })
    }

    pub fn epochs_completed(&self) -> usize {
        self.epochs_completed
    }

    pub fn params(&self) -> &TrainParams {
        &self.params
    }

    pub fn word_vectors(&self) -> ArrayView2<f32> {
        self.word_vectors.view()
    }

    pub fn doc_vectors(&self) -> ArrayView2<f32> {
        self.doc_vectors.view()
    }

    fn rows_finite(table: &Array2<f32>, rows: &[usize]) -> bool {
        rows.iter().all(|&r| table.row(r).iter().all(|x| x.is_finite()))
    }

    fn first_non_finite_row(table: &Array2<f32>) -> Option<usize> {
        table.axis_iter(Axis(0)).position(|row| !row.iter().all(|x| x.is_finite()))
    }

    /// One pass over the corpus. Every in-vocabulary position of every document is one step.
    pub fn run_epoch(&mut self) -> Result<EpochStats> {

        let timer = Instant::now();
        let epoch = self.epochs_completed;
        let window = self.params.window;
        let negative = self.params.negative;

        // each epoch has its own stream so a resumed session replays the same draws
        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        rng.set_stream(1 + epoch as u64);

        let total_steps = (self.params.epochs * self.steps_per_epoch).max(1) as f32;
        let mut step = epoch * self.steps_per_epoch;
        let mut alpha = self.params.alpha;
        let mut epoch_loss = 0.0f64;

        let mut context: Vec<usize> = Vec::with_capacity(2 * window);
        let mut negatives: Vec<usize> = Vec::with_capacity(negative);

        for doc in 0..self.sequences.len() {
            let sequence = &self.sequences[doc];

            for (t, &target) in sequence.iter().enumerate() {

                alpha = decayed_alpha(self.params.alpha, self.params.min_alpha, step as f32 / total_steps);
                context_window(sequence, t, window, &mut context);
                self.sampler.draw(&mut rng, target, negative, &mut negatives);

                let h = hidden(self.doc_vectors.row(doc), self.word_vectors.view(), &context);
                let grad = negative_sampling(&h, target, &negatives, self.output_weights.view(), alpha);

                for &(c, g) in &grad.output {
                    self.output_weights.row_mut(c).scaled_add(g, &h);
                }
                self.doc_vectors.row_mut(doc).scaled_add(1.0, &grad.hidden_error);
                for &c in &context {
                    self.word_vectors.row_mut(c).scaled_add(1.0, &grad.hidden_error);
                }

                epoch_loss += grad.loss as f64;
                step += 1;

                if cfg!(debug_assertions) {
                    let outputs: Vec<usize> = grad.output.iter().map(|(c, _)| *c).collect();
                    if !(Train::rows_finite(&self.doc_vectors, &[doc])
                        && Train::rows_finite(&self.word_vectors, &context)
                        && Train::rows_finite(&self.output_weights, &outputs)) {
                        return Err(Doc2VecError::TrainingDiverged { epoch, document: Some(doc) });
                    }
                }
            }
        }

        if let Some(doc) = Train::first_non_finite_row(&self.doc_vectors) {
            return Err(Doc2VecError::TrainingDiverged { epoch, document: Some(doc) });
        }
        if Train::first_non_finite_row(&self.word_vectors).is_some() || Train::first_non_finite_row(&self.output_weights).is_some() {
            return Err(Doc2VecError::TrainingDiverged { epoch, document: None });
        }

        self.epochs_completed += 1;
        let stats = EpochStats {
            epoch,
            loss: (epoch_loss / self.steps_per_epoch.max(1) as f64) as f32,
            alpha,
            elapsed: timer.elapsed(),
        };
        info!("finished epoch {}, loss is {}, took: {} ms...", stats.epoch, stats.loss, stats.elapsed.as_millis());
        Ok(stats)
    }

    /// Runs the remaining epochs. `stop` is checked between epochs, `on_epoch` is called after each one
    /// (for instance to save a checkpoint). Returns false when stopped before the last epoch.
    pub fn run<F>(&mut self, stop: Option<&AtomicBool>, mut on_epoch: F) -> Result<bool>
    where F: FnMut(&Train, &EpochStats) -> Result<()> {

        while self.epochs_completed < self.params.epochs {
            if stop.map_or(false, |s| s.load(Ordering::Relaxed)) {
                info!("training stopped after {} of {} epochs", self.epochs_completed, self.params.epochs);
                return Ok(false)
            }
            let stats = self.run_epoch()?;
            on_epoch(self, &stats)?;
        }
        Ok(true)
    }

    pub fn checkpoint(&self) -> ModelSnapshot {
        ModelSnapshot {
            version: SNAPSHOT_VERSION,
            params: self.params.clone(),
            epochs_completed: self.epochs_completed,
            vocabulary: self.vocabulary.clone(),
            word_vectors: self.word_vectors.clone(),
            output_weights: self.output_weights.clone(),
            doc_vectors: self.doc_vectors.clone(),
        }
    }

    /// Replaces every document vector with the one inference reaches for that document
    /// against the final word and output tables, under the model's default window, steps and seed.
    fn refit(&mut self) -> Result<()> {

        let timer = Instant::now();
        let fit = DocumentFit {
            params: &self.params,
            word_vectors: self.word_vectors.view(),
            output_weights: self.output_weights.view(),
            sampler: &self.sampler,
            window: self.params.window,
            steps: self.params.infer_steps(),
            seed: self.params.seed,
        };
        let fitted = self.sequences.iter()
            .enumerate()
            .map(|(doc, sequence)| fit.fit(sequence, Some(doc)))
            .collect::<Result<Vec<Array1<f32>>>>()?;

        for (mut row, vector) in self.doc_vectors.axis_iter_mut(Axis(0)).zip(fitted) {
            row.assign(&vector);
        }
        info!("refitted {} document vectors, took {} ms...", self.doc_vectors.nrows(), timer.elapsed().as_millis());
        Ok(())
    }

    /// Refits the document vectors and freezes the session into a [`Model`].
    pub fn finish(mut self) -> Result<Model> {
        self.refit()?;
        Ok(Model::new(
            self.params,
            self.epochs_completed,
            self.vocabulary,
            self.word_vectors,
            self.output_weights,
            self.doc_vectors,
        ))
    }
}

/// Trains word and document vectors jointly for `params.epochs` epochs.
pub fn train(documents: &[Document], vocabulary: Vocabulary, params: &TrainParams) -> Result<Model> {
    let mut trainer = Train::new(documents, vocabulary, params)?;
    trainer.run(None, |_, _| Ok(()))?;
    trainer.finish()
}
