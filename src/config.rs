
use crate::error::{Doc2VecError, Result};

use serde::{Serialize, Deserialize};
use serde_json::Value;
use std::{fs, fmt::Display};

pub const DEFAULT_THREADS: usize = 4;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainParams {
    pub vector_size: usize,
    pub window: usize,
    pub min_count: usize,
    pub epochs: usize,
    pub infer_steps: Option<usize>,
    pub negative: usize,
    pub alpha: f32,
    pub min_alpha: f32,
    // shrinkage of a document vector towards the origin while it is fitted to frozen tables
    pub doc_decay: f32,
    pub seed: u64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            vector_size: 100,
            window: 5,
            min_count: 2,
            epochs: 20,
            infer_steps: None,
            negative: 5,
            alpha: 0.025,
            min_alpha: 0.0001,
            doc_decay: 0.5,
            seed: 1,
        }
    }
}

impl TrainParams {

    /// Inference passes, the number of training epochs unless set.
    pub fn infer_steps(&self) -> usize {
        self.infer_steps.unwrap_or(self.epochs)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("vector_size", self.vector_size),
            ("window", self.window),
            ("min_count", self.min_count),
            ("epochs", self.epochs),
            ("infer_steps", self.infer_steps()),
            ("negative", self.negative),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(Doc2VecError::InvalidConfig(format!("{} must be at least 1", name)));
            }
        }
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(Doc2VecError::InvalidConfig(format!("alpha must be positive, got {}", self.alpha)));
        }
        if !(self.min_alpha >= 0.0 && self.min_alpha <= self.alpha) {
            return Err(Doc2VecError::InvalidConfig(format!("min_alpha must be within [0, alpha], got {}", self.min_alpha)));
        }
        if !(self.doc_decay >= 0.0 && self.alpha * self.doc_decay < 1.0) {
            return Err(Doc2VecError::InvalidConfig(format!("doc_decay must be non-negative and below 1 / alpha, got {}", self.doc_decay)));
        }
        Ok(())
    }
}

impl Display for TrainParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "training hyper parameters:
        vector_size: {},
        window: {},
        min_count: {},
        epochs: {},
        infer_steps: {},
        negative: {},
        alpha: {},
        min_alpha: {},
        doc_decay: {},
        seed: {}",
        self.vector_size, self.window, self.min_count, self.epochs, self.infer_steps(), self.negative, self.alpha, self.min_alpha, self.doc_decay, self.seed
        )
    }
}

#[derive(Clone, Debug)]
pub struct Params {
    pub corpus: String,
    pub output_dir: String,
    pub num_threads: usize,
    pub checkpoint_every: Option<usize>,
    pub resume_from: Option<String>,
    pub saved_model: Option<bool>,
    pub train: TrainParams
}

impl Display for Params {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "using hyper-params:
        corpus: {}
        output_dir: {}
        num_threads: {}
        checkpoint_every: {:?}
        resume_from: {:?}
        saved_model: {:?},
        Using {}",
        self.corpus, self.output_dir, self.num_threads, self.checkpoint_every, self.resume_from, self.saved_model, self.train)
    }
}

pub struct Config {
    params: Params
}

fn invalid(key: &str, expected: &str) -> Doc2VecError {
    Doc2VecError::InvalidConfig(format!("given {} is not {}", key, expected))
}

fn get_usize(json: &Value, key: &str) -> Result<Option<usize>> {
    match json.get(key) {
        Some(value) => value.as_u64().map(|v| Some(v as usize)).ok_or_else(|| invalid(key, "a non-negative integer")),
        None => Ok(None)
    }
}

fn get_f32(json: &Value, key: &str) -> Result<Option<f32>> {
    match json.get(key) {
        Some(value) => value.as_f64().map(|v| Some(v as f32)).ok_or_else(|| invalid(key, "numeric")),
        None => Ok(None)
    }
}

fn get_str(json: &Value, key: &str) -> Result<Option<String>> {
    match json.get(key) {
        Some(value) => value.as_str().map(|v| Some(v.to_owned())).ok_or_else(|| invalid(key, "a string")),
        None => Ok(None)
    }
}

impl Config {

    pub fn get_params(&self) -> Params {
        self.params.clone()
    }

    pub fn new(args: &[String]) -> Result<Config> {

        if args.len() != 2 {
            return Err(Doc2VecError::InvalidConfig("input should be a path to json file only".to_string()));
        }

        // parse input json
        let f = fs::File::open(&args[1])?;
        let json: Value = serde_json::from_reader(f)?;
        Config::from_json(&json)
    }

    pub fn from_json(json: &Value) -> Result<Config> {

        // validate input and output in json
        let corpus = get_str(json, "corpus")?
            .ok_or_else(|| Doc2VecError::InvalidConfig("corpus was not supplied through json".to_string()))?;
        let output_dir = get_str(json, "output_dir")?
            .ok_or_else(|| Doc2VecError::InvalidConfig("output_dir was not supplied through json".to_string()))?;

        // handle default vs input parameters
        let defaults = TrainParams::default();
        let train = TrainParams {
            vector_size: get_usize(json, "vector_size")?.unwrap_or(defaults.vector_size),
            window: get_usize(json, "window")?.unwrap_or(defaults.window),
            min_count: get_usize(json, "min_count")?.unwrap_or(defaults.min_count),
            epochs: get_usize(json, "epochs")?.unwrap_or(defaults.epochs),
            infer_steps: get_usize(json, "infer_steps")?,
            negative: get_usize(json, "negative")?.unwrap_or(defaults.negative),
            alpha: get_f32(json, "alpha")?.unwrap_or(defaults.alpha),
            min_alpha: get_f32(json, "min_alpha")?.unwrap_or(defaults.min_alpha),
            doc_decay: get_f32(json, "doc_decay")?.unwrap_or(defaults.doc_decay),
            seed: get_usize(json, "seed")?.map(|s| s as u64).unwrap_or(defaults.seed),
        };
        train.validate()?;

        let saved_model = match json.get("saved_model") {
            Some(saved_model) => Some(saved_model.as_bool().ok_or_else(|| invalid("saved_model", "boolean"))?),
            None => None
        };

        let num_threads = get_usize(json, "num_threads")?.unwrap_or(DEFAULT_THREADS);
        if num_threads == 0 {
            return Err(Doc2VecError::InvalidConfig("num_threads must be at least 1".to_string()));
        }
        let checkpoint_every = get_usize(json, "checkpoint_every")?;
        if checkpoint_every == Some(0) {
            return Err(Doc2VecError::InvalidConfig("checkpoint_every must be at least 1".to_string()));
        }

        let params = Params {
            corpus,
            output_dir,
            num_threads,
            checkpoint_every,
            resume_from: get_str(json, "resume_from")?,
            saved_model,
            train
        };

        Ok(Self { params })
    }

}


pub mod files_handling {

    use crate::error::{Doc2VecError, Result};
    use crate::model::ModelSnapshot;
    use crate::validate::RankDistribution;
    use crate::vocab::Vocabulary;

    use ndarray::Array2;
    use ndarray_npy::{read_npy, write_npy};
    use flate2::{Compression, read::GzDecoder, write::GzEncoder};
    use std::fs::{self, File};
    use std::io::{BufRead, BufReader, BufWriter, Write};
    use std::path::Path;
    use tracing::debug;

    pub fn read_input<R: ReadFile>(file_path: &str) -> std::result::Result<<R as ReadFile>::Item, <R as ReadFile>::Error> {
        let input = <R as ReadFile>::read_file(file_path)?;
        Ok(input)
    }

    pub fn save_output<S: SaveFile>(output_dir: &str, file_name: &str, item: S) -> std::result::Result<(), <S as SaveFile>::Error>
    where <S as SaveFile>::Error: From<std::io::Error> {

        // create output folder
        fs::create_dir_all(output_dir)?;

        item.save_file(output_dir, file_name)?;
        Ok(())
    }

    pub trait ReadFile {
        type Error;
        type Item;
        fn read_file(file_path: &str) -> std::result::Result<Self::Item, Self::Error>;
    }

    pub trait SaveFile {
        type Error;
        fn save_file(&self, output_dir: &str, file_name: &str) -> std::result::Result<(), Self::Error>;
    }

    // raw corpus texts: a directory holds one document per `.txt` file, taken in file name order,
    // any other path is a single file holding one document per line
    impl ReadFile for Vec<String> {
        type Error = Doc2VecError;
        type Item = Self;
        fn read_file(file_path: &str) -> Result<Self::Item> {

            let path = Path::new(file_path);
            if path.is_dir() {
                let mut paths = fs::read_dir(path)?
                    .map(|entry| entry.map(|e| e.path()))
                    .collect::<std::io::Result<Vec<_>>>()?;
                paths.retain(|p| p.extension().map_or(false, |ext| ext == "txt"));
                paths.sort();

                let mut texts = Vec::with_capacity(paths.len());
                for p in paths {
                    debug!("reading document {} from {}", texts.len(), p.display());
                    texts.push(fs::read_to_string(p)?);
                }
                return Ok(texts)
            }

            let f = BufReader::new(File::open(path)?);
            let mut texts = Vec::new();
            for line in f.lines() {
                let line = line?;
                if !line.trim().is_empty() {
                    texts.push(line);
                }
            }
            Ok(texts)
        }
    }

    impl ReadFile for Array2<f32> {
        type Error = Doc2VecError;
        type Item = Self;
        fn read_file(file_path: &str) -> Result<Self::Item> {
            let in_file = file_path.to_string() + ".npy";
            let item = read_npy(in_file)?;
            Ok(item)
        }
    }

    impl ReadFile for Vocabulary {
        type Error = Doc2VecError;
        type Item = Self;
        fn read_file(file_path: &str) -> Result<Self::Item> {
            let in_file = file_path.to_string() + ".json";
            let f = BufReader::new(File::open(in_file)?);
            let item = serde_json::from_reader(f)?;
            Ok(item)
        }
    }

    impl ReadFile for ModelSnapshot {
        type Error = Doc2VecError;
        type Item = Self;
        fn read_file(file_path: &str) -> Result<Self::Item> {
            let in_file = if file_path.ends_with(".bin.gz") { file_path.to_string() } else { file_path.to_string() + ".bin.gz" };
            let f = BufReader::new(File::open(in_file)?);
            let reader = GzDecoder::new(f);
            let item: ModelSnapshot = bincode::deserialize_from(reader)?;
            item.check()?;
            Ok(item)
        }
    }

    impl SaveFile for Array2<f32> {
        type Error = Doc2VecError;
        fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
            let out = output_dir.to_string() + "/" + file_name + ".npy";
            write_npy(out, self)?;
            Ok(())
        }
    }

    impl SaveFile for Vocabulary {
        type Error = Doc2VecError;
        fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
            let out = output_dir.to_string() + "/" + file_name + ".json";
            let f = BufWriter::new(File::create(out)?);
            serde_json::to_writer(f, self)?;
            Ok(())
        }
    }

    impl SaveFile for ModelSnapshot {
        type Error = Doc2VecError;
        fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
            let out = output_dir.to_string() + "/" + file_name + ".bin.gz";
            let f = BufWriter::new(File::create(out)?);
            let mut writer = GzEncoder::new(f, Compression::default());
            bincode::serialize_into(&mut writer, self)?;
            writer.finish()?.flush()?;
            Ok(())
        }
    }

    impl SaveFile for RankDistribution {
        type Error = Doc2VecError;
        fn save_file(&self, output_dir: &str, file_name: &str) -> Result<()> {
            let out = output_dir.to_string() + "/" + file_name + ".csv";
            let mut wrt = csv::WriterBuilder::new().from_path(out)?;
            wrt.write_record(["Rank", "Count"])?;
            for (rank, count) in self.iter() {
                wrt.serialize((rank, count))?;
            }
            wrt.flush()?;
            Ok(())
        }
    }
}
