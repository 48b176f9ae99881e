use doc2vec_trainer::{files_handling, InferenceEngine, Model, ModelSnapshot, NeighborIndex, ExactIndex, Tokenizer, WordTokenizer};
use std::{env, fs, process::ExitCode};
use tracing::error;
use tracing_subscriber::EnvFilter;


// finds the k trained documents closest to a new piece of text.
// treated as binary executable so it can be ran independantly from main

fn main() -> ExitCode {

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("doc2vec_trainer=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // arguments to this executable should be:
    // path to a saved model (bin.gz)
    // path to a text file holding the query document
    // optional number of neighbours, 10 by default
    // example: ... Output/model.bin.gz Input/query.txt 5
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 && args.len() != 4 {
        error!("usage: query <model> <text file> [k]");
        return ExitCode::FAILURE
    }

    match run_query(&args[1], &args[2], args.get(3).map(|k| k.as_str())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_query(model_path: &str, text_path: &str, k: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {

    let k = match k {
        Some(k) => k.parse::<usize>()?,
        None => 10
    };

    let snapshot = files_handling::read_input::<ModelSnapshot>(model_path)?;
    let model = Model::from_snapshot(snapshot)?;

    let text = fs::read_to_string(text_path)?;
    let tokens = WordTokenizer::default().tokenize(&text);
    let inferred = InferenceEngine::new(&model).infer(&tokens)?;
    if let Some(warning) = &inferred.warning {
        println!("{}", warning);
    }

    println!("searching {} most similar documents to {}", k, text_path);
    let index = ExactIndex::new(model.document_vectors());
    for (i, (document, score)) in index.most_similar(inferred.vector.view(), k)?.iter().enumerate() {
        println!("{} : document {} = {}", i, document, score);
    }
    Ok(())
}
