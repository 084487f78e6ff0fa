// Bag-of-terms pipeline for profile and listing free text.
//
// Two-phase by construction: `TfidfVectorizer` only knows its settings,
// `fit` consumes it and returns a `FittedVectorizer` that owns the
// vocabulary. Transforming with an unfitted vectorizer does not compile.

use ndarray::{Array1, Array2};
use std::collections::{BTreeMap, HashMap, HashSet};

const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "etc",
    "few", "for", "from", "further", "get", "had", "has", "have", "having", "he", "her", "here",
    "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it",
    "its", "itself", "just", "me", "more", "most", "much", "must", "my", "myself", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves",
    "out", "over", "own", "per", "same", "she", "should", "so", "some", "such", "than", "that",
    "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "via", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would",
    "you", "your", "yours", "yourself", "yourselves",
];

/// Lower-case, replace anything outside [a-z0-9] with a space, collapse runs
pub fn clean_text(text: &str) -> String {
    let replaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();

    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Unigrams and bigrams over the stop-word-filtered tokens
fn analyze(text: &str) -> Vec<String> {
    let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let cleaned = clean_text(text);
    let tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| t.len() >= 2 && !stop_words.contains(t))
        .collect();

    let mut terms: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    terms.extend(tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    terms
}

/// Unfitted TF-IDF settings
#[derive(Debug, Clone, Copy)]
pub struct TfidfVectorizer {
    max_features: usize,
}

impl TfidfVectorizer {
    pub fn new(max_features: usize) -> Self {
        Self { max_features }
    }

    /// Learn the vocabulary and idf weights from `documents`
    ///
    /// Terms are ranked by corpus frequency (ties alphabetical) and capped
    /// at `max_features`; columns are then ordered alphabetically.
    pub fn fit<S: AsRef<str>>(self, documents: &[S]) -> FittedVectorizer {
        let analyzed: Vec<Vec<String>> = documents.iter().map(|d| analyze(d.as_ref())).collect();

        let mut corpus_counts: HashMap<&str, usize> = HashMap::new();
        for terms in &analyzed {
            for term in terms {
                *corpus_counts.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(&str, usize)> = corpus_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.truncate(self.max_features);

        let mut terms: Vec<String> = ranked.into_iter().map(|(t, _)| t.to_string()).collect();
        terms.sort();

        let vocabulary: BTreeMap<String, usize> = terms
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();

        let mut document_frequency = vec![0usize; terms.len()];
        for doc_terms in &analyzed {
            let unique: HashSet<&String> = doc_terms.iter().collect();
            for term in unique {
                if let Some(&idx) = vocabulary.get(term) {
                    document_frequency[idx] += 1;
                }
            }
        }

        // Smooth idf: ln((1 + n) / (1 + df)) + 1
        let n = documents.len() as f64;
        let idf = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        FittedVectorizer {
            vocabulary,
            idf,
        }
    }
}

/// Vectorizer with a learned vocabulary
#[derive(Debug, Clone)]
pub struct FittedVectorizer {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl FittedVectorizer {
    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn contains(&self, term: &str) -> bool {
        self.vocabulary.contains_key(term)
    }

    /// L2-normalised TF-IDF vector; terms outside the vocabulary are ignored
    pub fn transform(&self, document: &str) -> Array1<f64> {
        let mut vector: Array1<f64> = Array1::zeros(self.vocabulary.len());
        for term in analyze(document) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                vector[idx] += 1.0;
            }
        }

        for (idx, value) in vector.iter_mut().enumerate() {
            *value *= self.idf[idx];
        }

        let norm = vector.dot(&vector).sqrt();
        if norm > 0.0 {
            vector.mapv_inplace(|v| v / norm);
        }
        vector
    }

    pub fn transform_all<S: AsRef<str>>(&self, documents: &[S]) -> Array2<f64> {
        let mut matrix = Array2::zeros((documents.len(), self.vocabulary.len()));
        for (i, doc) in documents.iter().enumerate() {
            matrix.row_mut(i).assign(&self.transform(doc.as_ref()));
        }
        matrix
    }
}
