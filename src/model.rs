
use crate::config::TrainParams;
use crate::error::{Doc2VecError, Result};
use crate::vocab::Vocabulary;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Serialize, Deserialize};
use tracing::debug;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to rebuild a model, or a training session, with the exact vector values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub version: u32,
    pub params: TrainParams,
    pub epochs_completed: usize,
    pub vocabulary: Vocabulary,
    pub word_vectors: Array2<f32>,
    pub output_weights: Array2<f32>,
    pub doc_vectors: Array2<f32>,
}

impl ModelSnapshot {

    pub fn check(&self) -> Result<()> {

        if self.version != SNAPSHOT_VERSION {
            return Err(Doc2VecError::InvalidSnapshot(format!("unsupported version {}, expected {}", self.version, SNAPSHOT_VERSION)));
        }
        self.params.validate()?;
        if self.epochs_completed > self.params.epochs {
            return Err(Doc2VecError::InvalidSnapshot(format!("{} epochs completed out of {}", self.epochs_completed, self.params.epochs)));
        }

        let dim = self.params.vector_size;
        for table in [&self.word_vectors, &self.output_weights, &self.doc_vectors] {
            if table.ncols() != dim {
                return Err(Doc2VecError::DimensionMismatch { expected: dim, got: table.ncols() });
            }
        }

        let vocab_size = self.vocabulary.len();
        if vocab_size == 0 {
            return Err(Doc2VecError::InvalidSnapshot("empty vocabulary".to_string()));
        }
        if self.word_vectors.nrows() != vocab_size || self.output_weights.nrows() != vocab_size {
            return Err(Doc2VecError::InvalidSnapshot(format!(
                "vocabulary has {} tokens but word tables have {} and {} rows",
                vocab_size, self.word_vectors.nrows(), self.output_weights.nrows()
            )));
        }
        Ok(())
    }
}

/// A trained model. Read-only once returned by the trainer.
#[derive(Clone, Debug)]
pub struct Model {
    params: TrainParams,
    epochs_completed: usize,
    vocabulary: Vocabulary,
    word_vectors: Array2<f32>,
    output_weights: Array2<f32>,
    doc_vectors: Array2<f32>,
}

impl Model {

    pub(crate) fn new(params: TrainParams, epochs_completed: usize, vocabulary: Vocabulary, word_vectors: Array2<f32>, output_weights: Array2<f32>, doc_vectors: Array2<f32>) -> Model {
        Model { params, epochs_completed, vocabulary, word_vectors, output_weights, doc_vectors }
    }

    pub fn from_snapshot(snapshot: ModelSnapshot) -> Result<Model> {
        snapshot.check()?;
        if snapshot.epochs_completed < snapshot.params.epochs {
            debug!("building a model from a checkpoint after {} of {} epochs", snapshot.epochs_completed, snapshot.params.epochs);
        }
        Ok(Model::new(snapshot.params, snapshot.epochs_completed, snapshot.vocabulary, snapshot.word_vectors, snapshot.output_weights, snapshot.doc_vectors))
    }

    pub fn snapshot(&self) -> ModelSnapshot {
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

    pub fn params(&self) -> &TrainParams {
        &self.params
    }

    pub fn epochs_completed(&self) -> usize {
        self.epochs_completed
    }

    pub fn vector_size(&self) -> usize {
        self.params.vector_size
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn word_vectors(&self) -> ArrayView2<f32> {
        self.word_vectors.view()
    }

    pub fn output_weights(&self) -> ArrayView2<f32> {
        self.output_weights.view()
    }

    /// The trained document table, one row per document id.
    pub fn document_vectors(&self) -> ArrayView2<f32> {
        self.doc_vectors.view()
    }

    pub fn document_vector(&self, id: usize) -> Option<ArrayView1<f32>> {
        (id < self.doc_vectors.nrows()).then(|| self.doc_vectors.row(id))
    }

    pub fn n_documents(&self) -> usize {
        self.doc_vectors.nrows()
    }
}


#[cfg(test)]
mod tests {

    use super::{Model, ModelSnapshot, SNAPSHOT_VERSION};
    use crate::config::{files_handling, TrainParams};
    use crate::error::Doc2VecError;
    use crate::tokenizer::{Document, WordTokenizer};
    use crate::vocab::Vocabulary;
    use flate2::{Compression, write::GzEncoder};
    use ndarray::Array2;
    use serde::Serialize;
    use std::fs::File;

    fn snapshot() -> ModelSnapshot {
        let docs = Document::from_texts(&["red green blue", "green blue"], &WordTokenizer::default());
        let vocabulary = Vocabulary::build(&docs, 1).unwrap();
        let params = TrainParams { vector_size: 4, epochs: 3, ..TrainParams::default() };
        ModelSnapshot {
            version: SNAPSHOT_VERSION,
            params,
            epochs_completed: 3,
            vocabulary,
            word_vectors: Array2::from_shape_fn((3, 4), |(i, j)| (i * 4 + j) as f32 * 0.1),
            output_weights: Array2::from_elem((3, 4), -0.25),
            doc_vectors: Array2::from_shape_fn((2, 4), |(i, j)| 1.0 / (1 + i + j) as f32),
        }
    }

    #[test]
    fn check_rejects_inconsistent_snapshots() {
        assert!(snapshot().check().is_ok());

        let mut bad = snapshot();
        bad.version = 99;
        assert!(matches!(bad.check(), Err(Doc2VecError::InvalidSnapshot(_))));

        let mut bad = snapshot();
        bad.doc_vectors = Array2::zeros((2, 5));
        assert!(matches!(bad.check(), Err(Doc2VecError::DimensionMismatch { expected: 4, got: 5 })));

        let mut bad = snapshot();
        bad.word_vectors = Array2::zeros((2, 4));
        assert!(matches!(bad.check(), Err(Doc2VecError::InvalidSnapshot(_))));
    }

    #[test]
    fn model_exposes_tables_read_only() {
        let model = Model::from_snapshot(snapshot()).unwrap();
        assert_eq!(model.vector_size(), 4);
        assert_eq!(model.n_documents(), 2);
        assert_eq!(model.document_vectors().dim(), (2, 4));
        assert_eq!(model.document_vector(1).unwrap()[0], 0.5);
        assert!(model.document_vector(2).is_none());
        assert_eq!(model.snapshot(), snapshot());
    }

    #[test]
    fn snapshot_survives_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().display().to_string();

        files_handling::save_output::<ModelSnapshot>(&out, "model", snapshot()).unwrap();
        let loaded = files_handling::read_input::<ModelSnapshot>(&format!("{}/model", out)).unwrap();
        assert_eq!(loaded, snapshot());

        // the full file name is accepted as well
        let loaded = files_handling::read_input::<ModelSnapshot>(&format!("{}/model.bin.gz", out)).unwrap();
        assert_eq!(loaded.doc_vectors, snapshot().doc_vectors);
    }

    #[test]
    fn partial_checkpoint_keeps_its_progress() {
        let mut partial = snapshot();
        partial.epochs_completed = 1;

        let model = Model::from_snapshot(partial.clone()).unwrap();
        assert_eq!(model.epochs_completed(), 1);
        assert_eq!(model.snapshot(), partial);
    }

    // same field layout as ModelSnapshot, with a vocabulary free of any invariant
    #[derive(Serialize)]
    struct RawVocabulary {
        tokens: Vec<String>,
        counts: Vec<usize>,
    }

    #[derive(Serialize)]
    struct RawSnapshot {
        version: u32,
        params: TrainParams,
        epochs_completed: usize,
        vocabulary: RawVocabulary,
        word_vectors: Array2<f32>,
        output_weights: Array2<f32>,
        doc_vectors: Array2<f32>,
    }

    #[test]
    fn snapshot_with_inconsistent_vocabulary_is_rejected() {
        let good = snapshot();
        let tokens: Vec<String> = (0..3).map(|i| good.vocabulary.token(i).unwrap().to_string()).collect();

        let broken = [
            RawVocabulary { tokens: tokens.clone(), counts: vec![1, 1, 1, 1_000_000, 1_000_000] },
            RawVocabulary { tokens: tokens.clone(), counts: vec![2, 0, 1] },
            RawVocabulary { tokens: vec![tokens[0].clone(), tokens[1].clone(), tokens[0].clone()], counts: vec![2, 2, 1] },
        ];

        for (i, vocabulary) in broken.into_iter().enumerate() {
            let dir = tempfile::tempdir().unwrap();
            let raw = RawSnapshot {
                version: good.version,
                params: good.params.clone(),
                epochs_completed: good.epochs_completed,
                vocabulary,
                word_vectors: good.word_vectors.clone(),
                output_weights: good.output_weights.clone(),
                doc_vectors: good.doc_vectors.clone(),
            };
            let mut writer = GzEncoder::new(File::create(dir.path().join("model.bin.gz")).unwrap(), Compression::default());
            bincode::serialize_into(&mut writer, &raw).unwrap();
            writer.finish().unwrap();

            let loaded = files_handling::read_input::<ModelSnapshot>(&dir.path().join("model").display().to_string());
            assert!(matches!(loaded, Err(Doc2VecError::Serialization(_))), "case {} accepted", i);
        }
    }
}
