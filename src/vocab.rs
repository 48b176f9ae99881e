
use crate::error::{Doc2VecError, Result};
use crate::tokenizer::Document;

use std::collections::HashMap;
use serde::{Serialize, Deserialize};
use tracing::info;


/// Frozen token to index mapping. Index order is descending corpus frequency,
/// ties broken lexicographically, so identical corpora give identical indices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "VocabularyRepr", into = "VocabularyRepr")]
pub struct Vocabulary {
    tokens: Vec<String>,
    counts: Vec<usize>,
    t2i: HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct VocabularyRepr {
    tokens: Vec<String>,
    counts: Vec<usize>,
}

// every token needs exactly one positive count and a unique spelling
impl TryFrom<VocabularyRepr> for Vocabulary {
    type Error = String;

    fn try_from(repr: VocabularyRepr) -> std::result::Result<Self, Self::Error> {
        if repr.tokens.len() != repr.counts.len() {
            return Err(format!("vocabulary has {} tokens but {} counts", repr.tokens.len(), repr.counts.len()));
        }
        if let Some(index) = repr.counts.iter().position(|&c| c == 0) {
            return Err(format!("vocabulary token {} has a zero count", index));
        }
        let vocabulary = Vocabulary::from_sorted(repr.tokens, repr.counts);
        if vocabulary.t2i.len() != vocabulary.tokens.len() {
            return Err(format!("vocabulary has {} tokens but only {} distinct ones", vocabulary.tokens.len(), vocabulary.t2i.len()));
        }
        Ok(vocabulary)
    }
}

impl From<Vocabulary> for VocabularyRepr {
    fn from(vocab: Vocabulary) -> Self {
        VocabularyRepr { tokens: vocab.tokens, counts: vocab.counts }
    }
}

impl Vocabulary {

    fn from_sorted(tokens: Vec<String>, counts: Vec<usize>) -> Vocabulary {
        let t2i = tokens.iter().enumerate().map(|(i, t)| (t.to_owned(), i)).collect();
        Vocabulary { tokens, counts, t2i }
    }

    // accumulate occurrences of words - how many times each token appears in the corpus
    fn accumulate(documents: &[Document]) -> HashMap<String, usize> {
        let mut token2count: HashMap<String, usize> = HashMap::new();
        for document in documents {
            for tok in &document.tokens {
                *token2count.entry(tok.to_owned()).or_insert(0) += 1;
            }
        }
        token2count
    }

    pub fn build(documents: &[Document], min_count: usize) -> Result<Vocabulary> {

        let token2count = Vocabulary::accumulate(documents);
        let distinct = token2count.len();

        let mut tup = token2count
            .into_iter()
            .filter(|(_, v)| *v >= min_count)
            .collect::<Vec<(String, usize)>>();
        tup.sort_by(|(t, c), (s, d)| d.cmp(c).then_with(|| t.cmp(s)));

        if tup.is_empty() {
            return Err(Doc2VecError::EmptyVocabulary { min_count, distinct });
        }

        info!("using {} tokens occurring at least {} times out of {}", tup.len(), min_count, distinct);
        let (tokens, counts) = tup.into_iter().unzip();
        Ok(Vocabulary::from_sorted(tokens, counts))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn index_of(&self, token: &str) -> Option<usize> {
        self.t2i.get(token).copied()
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    pub fn count(&self, index: usize) -> Option<usize> {
        self.counts.get(index).copied()
    }

    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Indexed form of a token sequence, out-of-vocabulary tokens dropped.
    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<usize> {
        tokens.iter().filter_map(|t| self.index_of(t.as_ref())).collect()
    }

    pub fn t2i(&self) -> &HashMap<String, usize> {
        &self.t2i
    }
}


#[cfg(test)]
mod tests {

    use super::Vocabulary;
    use crate::error::Doc2VecError;
    use crate::tokenizer::{Document, WordTokenizer};

    fn corpus() -> Vec<Document> {
        let sentences = [
            "What you say makes a lot of sense to me , you are right",
            "Are you playing basketball just for fun or are you a pro ?"
        ];
        Document::from_texts(&sentences, &WordTokenizer::default())
    }

    #[test]
    fn frequency_order_with_lexicographic_ties() {
        // you: 4, are: 3, a: 2, everything else once
        let vocab = Vocabulary::build(&corpus(), 2).unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.token(0), Some("you"));
        assert_eq!(vocab.token(1), Some("are"));
        assert_eq!(vocab.token(2), Some("a"));
        assert_eq!(vocab.counts(), &[4, 3, 2]);

        let vocab = Vocabulary::build(&corpus(), 1).unwrap();
        // singletons are ordered alphabetically after the frequent tokens
        assert_eq!(vocab.token(3), Some("basketball"));
        assert_eq!(vocab.token(4), Some("for"));
        assert_eq!(vocab.index_of("you"), Some(0));
    }

    #[test]
    fn below_threshold_tokens_are_out_of_vocabulary() {
        let vocab = Vocabulary::build(&corpus(), 2).unwrap();
        assert_eq!(vocab.index_of("basketball"), None);
        assert_eq!(vocab.encode(&["are", "basketball", "you"]), vec![1, 0]);
    }

    #[test]
    fn monotonic_in_min_count() {
        let docs = corpus();
        let sizes: Vec<usize> = (1..=4)
            .map(|m| Vocabulary::build(&docs, m).map(|v| v.len()).unwrap_or(0))
            .collect();
        for pair in sizes.windows(2) {
            assert!(pair[0] >= pair[1], "sizes not monotonic: {:?}", sizes);
        }
    }

    #[test]
    fn empty_vocabulary_is_an_error() {
        match Vocabulary::build(&corpus(), 100) {
            Err(Doc2VecError::EmptyVocabulary { min_count, distinct }) => {
                assert_eq!(min_count, 100);
                assert!(distinct > 0);
            }
            other => panic!("expected EmptyVocabulary, got {:?}", other),
        }
        assert!(matches!(Vocabulary::build(&[], 1), Err(Doc2VecError::EmptyVocabulary { .. })));
    }

    #[test]
    fn build_is_reproducible() {
        let a = Vocabulary::build(&corpus(), 1).unwrap();
        let b = Vocabulary::build(&corpus(), 1).unwrap();
        assert_eq!(a, b);

        let json = serde_json::to_string(&a).unwrap();
        let c: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(a, c);
        assert_eq!(c.index_of("pro"), a.index_of("pro"));
    }

    #[test]
    fn inconsistent_serialized_vocabulary_is_rejected() {
        let extra_counts = r#"{"tokens": ["you", "are"], "counts": [4, 3, 9]}"#;
        let zero_count = r#"{"tokens": ["you", "are"], "counts": [4, 0]}"#;
        let duplicates = r#"{"tokens": ["you", "you"], "counts": [4, 3]}"#;
        for json in [extra_counts, zero_count, duplicates] {
            assert!(serde_json::from_str::<Vocabulary>(json).is_err(), "accepted {}", json);
        }

        let ok: Vocabulary = serde_json::from_str(r#"{"tokens": ["you", "are"], "counts": [4, 3]}"#).unwrap();
        assert_eq!(ok.index_of("are"), Some(1));
    }
}
