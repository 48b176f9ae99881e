
use crate::config::TrainParams;
use crate::error::{Doc2VecError, Result, Warning};
use crate::model::Model;
use crate::tokenizer::Document;
use crate::train::{context_window, decayed_alpha, hidden, negative_sampling, NegativeSampler};

use ndarray::{Array1, ArrayView2};
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

/// An inferred document vector, with the warning raised while inferring it if any.
#[derive(Clone, Debug)]
pub struct Inferred {
    pub vector: Array1<f32>,
    pub warning: Option<Warning>,
}

/// Infers vectors for new text against a frozen model. Word and output tables are only read,
/// each call optimises its own scratch vector, so one engine can serve many threads.
pub struct InferenceEngine<'m> {
    model: &'m Model,
    sampler: NegativeSampler,
    window: usize,
    steps: usize,
    seed: u64,
}

impl<'m> InferenceEngine<'m> {

    pub fn new(model: &'m Model) -> InferenceEngine<'m> {
        let params = model.params();
        InferenceEngine {
            model,
            sampler: NegativeSampler::new(model.vocabulary().counts(), 0.75),
            window: params.window,
            steps: params.infer_steps(),
            seed: params.seed,
        }
    }

    pub fn window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn infer<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Inferred> {
        let sequence = self.model.vocabulary().encode(tokens);
        self.infer_indexed(&sequence, None, tokens.len())
    }

    pub fn infer_document(&self, document: &Document) -> Result<Inferred> {
        let sequence = self.model.vocabulary().encode(&document.tokens);
        self.infer_indexed(&sequence, Some(document.id), document.tokens.len())
    }

    fn infer_indexed(&self, sequence: &[usize], document: Option<usize>, n_tokens: usize) -> Result<Inferred> {

        if self.window == 0 || self.steps == 0 {
            return Err(Doc2VecError::InvalidConfig(format!("inference needs window and steps of at least 1, got {} and {}", self.window, self.steps)));
        }

        if sequence.is_empty() {
            let warning = Warning::EmptyDocument { document, tokens: n_tokens };
            warn!("{}", warning);
            return Ok(Inferred { vector: Array1::zeros(self.model.vector_size()), warning: Some(warning) })
        }

        let fit = DocumentFit {
            params: self.model.params(),
            word_vectors: self.model.word_vectors(),
            output_weights: self.model.output_weights(),
            sampler: &self.sampler,
            window: self.window,
            steps: self.steps,
            seed: self.seed,
        };
        Ok(Inferred { vector: fit.fit(sequence, document)?, warning: None })
    }
}

/// Optimises a single document vector against frozen word and output tables.
/// Shared by inference and by the last stage of training, so a training document
/// re-inferred with the model defaults lands exactly on its stored vector.
pub(crate) struct DocumentFit<'a> {
    pub(crate) params: &'a TrainParams,
    pub(crate) word_vectors: ArrayView2<'a, f32>,
    pub(crate) output_weights: ArrayView2<'a, f32>,
    pub(crate) sampler: &'a NegativeSampler,
    pub(crate) window: usize,
    pub(crate) steps: usize,
    pub(crate) seed: u64,
}

impl DocumentFit<'_> {

    // an empty sequence gives the zero vector
    pub(crate) fn fit(&self, sequence: &[usize], document: Option<usize>) -> Result<Array1<f32>> {

        let dim = self.word_vectors.ncols();
        if sequence.is_empty() {
            return Ok(Array1::zeros(dim))
        }

        let params = self.params;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut vector = Array1::<f32>::random_using(dim, Uniform::new(-0.5f32, 0.5), &mut rng) / dim as f32;

        let total_steps = (self.steps * sequence.len()) as f32;
        let mut step = 0usize;
        let mut context: Vec<usize> = Vec::with_capacity(2 * self.window);
        let mut negatives: Vec<usize> = Vec::with_capacity(params.negative);

        for pass in 0..self.steps {
            for (t, &target) in sequence.iter().enumerate() {
                let alpha = decayed_alpha(params.alpha, params.min_alpha, step as f32 / total_steps);
                context_window(sequence, t, self.window, &mut context);
                self.sampler.draw(&mut rng, target, params.negative, &mut negatives);

                let h = hidden(vector.view(), self.word_vectors, &context);
                let grad = negative_sampling(&h, target, &negatives, self.output_weights, alpha);

                // with the decay the objective has a single minimum, so longer runs settle on it
                vector *= 1.0 - alpha * params.doc_decay;
                vector += &grad.hidden_error;
                step += 1;
            }

            if !vector.iter().all(|x| x.is_finite()) {
                return Err(Doc2VecError::TrainingDiverged { epoch: pass, document });
            }
        }

        Ok(vector)
    }
}

/// Infers a vector for `tokens` with the model's seed.
pub fn infer<S: AsRef<str>>(model: &Model, tokens: &[S], window: usize, steps: usize) -> Result<Inferred> {
    InferenceEngine::new(model).window(window).steps(steps).infer(tokens)
}


#[cfg(test)]
mod tests {

    use super::*;
    use crate::config::TrainParams;
    use crate::similarity::cosine;
    use crate::tokenizer::{Document, WordTokenizer};
    use crate::train::train;
    use crate::vocab::Vocabulary;

    fn trained() -> (Vec<Document>, Model) {
        let texts = [
            "apple banana cherry apple banana grape cherry apple orchard harvest orchard",
            "banana cherry grape apple grape banana cherry smoothie blender smoothie",
            "engine piston valve engine gear piston valve clutch garage wrench garage",
            "gear clutch valve piston engine clutch gear turbo exhaust turbo",
        ];
        let docs = Document::from_texts(&texts, &WordTokenizer::default());
        let vocab = Vocabulary::build(&docs, 1).unwrap();
        let params = TrainParams { vector_size: 20, window: 2, min_count: 1, epochs: 60, seed: 42, ..TrainParams::default() };
        let model = train(&docs, vocab, &params).unwrap();
        (docs, model)
    }

    #[test]
    fn inference_is_deterministic_for_a_seed() {
        let (docs, model) = trained();
        let engine = InferenceEngine::new(&model).steps(30);
        let a = engine.infer(&docs[0].tokens).unwrap();
        let b = engine.infer(&docs[0].tokens).unwrap();
        assert_eq!(a.vector, b.vector);
        assert!(a.warning.is_none());

        let c = InferenceEngine::new(&model).steps(30).seed(7).infer(&docs[0].tokens).unwrap();
        assert_ne!(a.vector, c.vector);
    }

    #[test]
    fn inference_leaves_the_model_untouched() {
        let (docs, model) = trained();
        let before = model.snapshot();
        let engine = InferenceEngine::new(&model);
        for doc in &docs {
            engine.infer_document(doc).unwrap();
        }
        assert_eq!(model.snapshot(), before);
    }

    #[test]
    fn repeated_inference_converges() {
        let (docs, model) = trained();

        let agreement = |steps: usize| {
            let a = InferenceEngine::new(&model).steps(steps).seed(1).infer(&docs[2].tokens).unwrap();
            let b = InferenceEngine::new(&model).steps(steps).seed(2).infer(&docs[2].tokens).unwrap();
            cosine(a.vector.view(), b.vector.view()).unwrap()
        };
        let short = agreement(30);
        let long = agreement(3000);
        assert!(long > 0.98, "cosine after 3000 steps: {}", long);
        assert!(long >= short - 0.01, "30 steps: {}, 3000 steps: {}", short, long);
    }

    #[test]
    fn default_inference_lands_on_the_stored_vector() {
        let (docs, model) = trained();
        let engine = InferenceEngine::new(&model);

        for doc in &docs {
            let inferred = engine.infer_document(doc).unwrap();
            assert_eq!(inferred.vector.view(), model.document_vector(doc.id).unwrap());
        }
    }

    #[test]
    fn self_similarity_rises_with_steps() {
        let (docs, model) = trained();

        for doc in &docs {
            let own = model.document_vector(doc.id).unwrap();
            let sims: Vec<f32> = [50, 500, 5000].iter()
                .map(|&steps| {
                    let inferred = InferenceEngine::new(&model).steps(steps).seed(7).infer_document(doc).unwrap();
                    cosine(inferred.vector.view(), own).unwrap()
                })
                .collect();

            for pair in sims.windows(2) {
                assert!(pair[1] >= pair[0] - 0.02, "document {}: {:?}", doc.id, sims);
            }
            assert!(sims[2] > 0.95, "document {}: {:?}", doc.id, sims);
        }
    }

    #[test]
    fn inferred_norm_stays_bounded() {
        let (docs, model) = trained();
        let own = model.document_vector(0).unwrap();
        let own_norm = own.dot(&own).sqrt();

        let long = InferenceEngine::new(&model).steps(5000).infer_document(&docs[0]).unwrap();
        let norm = long.vector.dot(&long.vector).sqrt();
        assert!(norm < 1.5 * own_norm, "norm {} against stored {}", norm, own_norm);
    }

    #[test]
    fn out_of_vocabulary_document_gets_a_zero_vector() {
        let (_, model) = trained();
        let inferred = infer(&model, &["quantum", "chromodynamics"], 2, 10).unwrap();
        assert_eq!(inferred.vector.len(), 20);
        assert!(inferred.vector.iter().all(|x| *x == 0.0));
        assert_eq!(inferred.warning, Some(Warning::EmptyDocument { document: None, tokens: 2 }));

        let empty = Document::new(9, vec![]);
        let inferred = InferenceEngine::new(&model).infer_document(&empty).unwrap();
        assert_eq!(inferred.warning, Some(Warning::EmptyDocument { document: Some(9), tokens: 0 }));
    }

    #[test]
    fn zero_steps_or_window_are_rejected() {
        let (docs, model) = trained();
        assert!(matches!(infer(&model, &docs[0].tokens, 0, 10), Err(Doc2VecError::InvalidConfig(_))));
        assert!(matches!(infer(&model, &docs[0].tokens, 2, 0), Err(Doc2VecError::InvalidConfig(_))));
    }
}
