
// imports
use crate::config::{files_handling, Config, Params};
use crate::error::{Doc2VecError, Result};
use crate::infer::InferenceEngine;
use crate::model::{Model, ModelSnapshot};
use crate::similarity::ExactIndex;
use crate::tokenizer::{Document, WordTokenizer};
use crate::train::Train;
use crate::validate::{validate_with, RankDistribution, ValidationReport};
use crate::vocab::Vocabulary;

use ndarray::Array2;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing::info;

pub struct Pipeline {}

impl Pipeline {

    // runs the main procedure of 4 steps -
    // -> configuration of arguments
    // -> tokenizing and vocabulary building
    // -> training (or loading a saved model)
    // -> self retrieval validation
    // when `stop` is raised training halts after the current epoch, a checkpoint is written
    // and None is returned

    pub fn run(args: &[String], stop: Option<&AtomicBool>) -> Result<Option<ValidationReport>> {

        info!("building parameters...");
        let params = Config::new(args)?.get_params();
        info!("{}", params);

        let timer = Instant::now();
        let texts = files_handling::read_input::<Vec<String>>(&params.corpus)?;
        let documents = Document::from_texts(&texts, &WordTokenizer::default());
        info!("loaded and tokenized {} documents, took {} ms...", documents.len(), timer.elapsed().as_millis());

        let model = match params.saved_model {
            Some(true) => {
                let model_path = params.output_dir.to_string() + "/model";
                let snapshot = files_handling::read_input::<ModelSnapshot>(&model_path)?;
                info!("loaded saved model from {}", model_path);
                Model::from_snapshot(snapshot)?
            },
            _ => match Pipeline::train(&params, &documents, stop)? {
                Some(model) => model,
                None => return Ok(None)
            }
        };

        if model.n_documents() != documents.len() {
            return Err(Doc2VecError::InvalidConfig(format!(
                "model holds {} document vectors but the corpus has {} documents", model.n_documents(), documents.len()
            )));
        }

        // validation part
        let timer = Instant::now();
        info!("starting validation...");
        let engine = InferenceEngine::new(&model);
        let index = ExactIndex::new(model.document_vectors());
        let report = validate_with(&engine, &index, &documents, params.num_threads)?;
        files_handling::save_output::<RankDistribution>(&params.output_dir, "ranks", report.distribution.clone())?;

        for warning in &report.warnings {
            info!("{}", warning);
        }
        info!("finished validation, saved ranks. Took {} ms ...", timer.elapsed().as_millis());
        Ok(Some(report))
    }

    fn train(params: &Params, documents: &[Document], stop: Option<&AtomicBool>) -> Result<Option<Model>> {

        let timer = Instant::now();
        let mut trainer = match &params.resume_from {
            Some(path) => {
                let snapshot = files_handling::read_input::<ModelSnapshot>(path)?;
                files_handling::save_output::<Vocabulary>(&params.output_dir, "words", snapshot.vocabulary.clone())?;
                Train::resume(documents, snapshot)?
            },
            None => {
                info!("starting vocab building...");
                let vocabulary = Vocabulary::build(documents, params.train.min_count)?;
                files_handling::save_output::<Vocabulary>(&params.output_dir, "words", vocabulary.clone())?;
                Train::new(documents, vocabulary, &params.train)?
            }
        };

        info!("starting training part...");
        let output_dir = params.output_dir.as_str();
        let completed = trainer.run(stop, |t, stats| {
            match params.checkpoint_every {
                Some(every) if (stats.epoch + 1) % every == 0 => {
                    files_handling::save_output::<ModelSnapshot>(output_dir, "checkpoint", t.checkpoint())?;
                    info!("saved checkpoint after epoch {}", stats.epoch);
                    Ok(())
                },
                _ => Ok(())
            }
        })?;

        if !completed {
            files_handling::save_output::<ModelSnapshot>(output_dir, "checkpoint", trainer.checkpoint())?;
            info!("training interrupted after {} epochs, saved checkpoint", trainer.epochs_completed());
            return Ok(None)
        }

        // save the model and the document table for the projection step
        let model = trainer.finish()?;
        files_handling::save_output::<ModelSnapshot>(output_dir, "model", model.snapshot())?;
        files_handling::save_output::<Array2<f32>>(output_dir, "doc_vecs", model.document_vectors().to_owned())?;

        info!("finished training, saved vecs. Took {} seconds ...", timer.elapsed().as_secs());
        Ok(Some(model))
    }

}
