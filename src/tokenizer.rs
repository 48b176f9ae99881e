
// defines the behavior needed for tokenizing a corpus
pub trait Tokenizer {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Lower-cases the text and splits it on non alphanumeric characters, so pure punctuation
/// never becomes a token. A hyphen or a dot between two alphanumerics stays inside the token,
/// keeping "state-of-the-art" and "3.14" whole.
#[derive(Clone, Debug)]
pub struct WordTokenizer {
    pub rejoin_hyphenation: bool,
}

impl Default for WordTokenizer {
    fn default() -> Self {
        Self { rejoin_hyphenation: true }
    }
}

impl WordTokenizer {

    // texts come from page by page extraction, where a word broken at a line end
    // shows up as "embed-\nding" (or "embed-\r\nding")
    fn rejoin(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '-' && matches!(chars.peek(), Some('\n') | Some('\r')) {
                chars.next();
                while chars.peek().map_or(false, |n| n.is_whitespace()) {
                    chars.next();
                }
                continue;
            }
            out.push(c);
        }
        out
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let text = if self.rejoin_hyphenation { WordTokenizer::rejoin(text) } else { text.to_owned() };
        let chars: Vec<char> = text.to_lowercase().chars().collect();

        let mut tokens = Vec::new();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            let joins = (c == '-' || c == '.')
                && !current.is_empty()
                && chars.get(i + 1).map_or(false, |n| n.is_alphanumeric());
            if c.is_alphanumeric() || joins {
                current.push(c);
            } else if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }
        tokens
    }
}

/// A tokenized document. The id is its position in the corpus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    pub id: usize,
    pub tokens: Vec<String>,
}

impl Document {

    pub fn new(id: usize, tokens: Vec<String>) -> Self {
        Self { id, tokens }
    }

    pub fn from_texts<T: Tokenizer, S: AsRef<str>>(texts: &[S], tokenizer: &T) -> Vec<Document> {
        texts.iter()
            .enumerate()
            .map(|(id, text)| Document::new(id, tokenizer.tokenize(text.as_ref())))
            .collect()
    }
}
