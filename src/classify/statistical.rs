//! Local statistical classifier: TF-IDF features + logistic regression.
//!
//! The model is loaded from its persisted artifact on first use, or trained
//! from [`corpus::training_corpus`] and then persisted. Initialization is
//! single-flight: concurrent first callers wait on the same load/train, and
//! its outcome, success or failure, is kept for the life of the instance.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::corpus::{self, LabeledExample};
use super::{Category, ClassificationResult, ClassifierTier};
use crate::error::{ModelError, TierError};

/// Bumped whenever the artifact layout changes.
const ARTIFACT_VERSION: u32 = 1;

const MAX_FEATURES: usize = 1000;
const SPLIT_SEED: u64 = 42;
const TEST_FRACTION: f32 = 0.2;

/// Inverse regularization strength, as in the usual `C` parameter.
const REGULARIZATION_C: f32 = 1.0;
const LEARNING_RATE: f32 = 1.0;
const MAX_ITERATIONS: usize = 2000;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("static token regex"));

// ── Features ────────────────────────────────────────────────────────

/// Sparse feature vector: (feature index, value).
type SparseVector = Vec<(usize, f32)>;

/// Unigram + bigram tokens of lowercased text.
fn ngrams(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = TOKEN.find_iter(&lower).map(|m| m.as_str()).collect();

    let mut grams: Vec<String> = words.iter().map(|w| w.to_string()).collect();
    grams.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    grams
}

/// TF-IDF vectorizer with smoothed IDF and L2 normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfIdfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
}

impl TfIdfVectorizer {
    /// Learn the vocabulary (top `max_features` terms by corpus frequency)
    /// and IDF weights.
    pub fn fit(documents: &[&str], max_features: usize) -> Self {
        let mut term_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut doc_freq: BTreeMap<String, usize> = BTreeMap::new();

        for doc in documents {
            let grams = ngrams(doc);
            let mut seen: Vec<&String> = Vec::new();
            for gram in &grams {
                *term_counts.entry(gram.clone()).or_default() += 1;
                if !seen.contains(&gram) {
                    seen.push(gram);
                    *doc_freq.entry(gram.clone()).or_default() += 1;
                }
            }
        }

        // Highest frequency first; BTreeMap order breaks ties alphabetically.
        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(max_features);

        let n_docs = documents.len() as f32;
        let mut vocabulary = HashMap::with_capacity(ranked.len());
        let mut idf = Vec::with_capacity(ranked.len());
        for (index, (term, _)) in ranked.into_iter().enumerate() {
            let df = doc_freq.get(&term).copied().unwrap_or(0) as f32;
            idf.push(((1.0 + n_docs) / (1.0 + df)).ln() + 1.0);
            vocabulary.insert(term, index);
        }

        Self { vocabulary, idf }
    }

    pub fn len(&self) -> usize {
        self.idf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idf.is_empty()
    }

    /// Vectorize a document. Unknown terms are dropped.
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f32> = BTreeMap::new();
        for gram in ngrams(text) {
            if let Some(&index) = self.vocabulary.get(&gram) {
                *counts.entry(index).or_default() += 1.0;
            }
        }

        let mut vector: SparseVector = counts
            .into_iter()
            .filter_map(|(index, tf)| self.idf.get(index).map(|idf| (index, tf * idf)))
            .collect();

        let norm = vector.iter().map(|(_, v)| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for (_, v) in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

// ── Linear model ────────────────────────────────────────────────────

/// Binary logistic regression. The positive class is `Productive`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    weights: Vec<f32>,
    bias: f32,
}

fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}

impl LogisticRegression {
    /// Fit with full-batch gradient descent and L2 regularization.
    pub fn fit(samples: &[(SparseVector, f32)], n_features: usize) -> Self {
        let n = samples.len().max(1) as f32;
        let lambda = 1.0 / (REGULARIZATION_C * n);
        let mut weights = vec![0.0f32; n_features];
        let mut bias = 0.0f32;
        let mut grad = vec![0.0f32; n_features];

        for _ in 0..MAX_ITERATIONS {
            for (g, w) in grad.iter_mut().zip(&weights) {
                *g = lambda * w;
            }
            let mut grad_bias = 0.0f32;

            for (x, y) in samples {
                let error = sigmoid(dot(&weights, x) + bias) - y;
                for &(index, value) in x {
                    grad[index] += error * value / n;
                }
                grad_bias += error / n;
            }

            for (w, g) in weights.iter_mut().zip(&grad) {
                *w -= LEARNING_RATE * g;
            }
            bias -= LEARNING_RATE * grad_bias;
        }

        Self { weights, bias }
    }

    /// Probability of the positive class.
    pub fn predict_proba(&self, x: &SparseVector) -> f32 {
        sigmoid(dot(&self.weights, x) + self.bias)
    }
}

fn dot(weights: &[f32], x: &SparseVector) -> f32 {
    x.iter()
        .filter_map(|&(index, value)| weights.get(index).map(|w| w * value))
        .sum()
}

// ── Artifact ────────────────────────────────────────────────────────

/// Persisted trained model plus training metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub trained_at: DateTime<Utc>,
    /// Accuracy on the held-out split.
    pub accuracy: f32,
    pub samples: usize,
    vectorizer: TfIdfVectorizer,
    model: LogisticRegression,
}

fn label(category: Category) -> f32 {
    match category {
        Category::Productive => 1.0,
        Category::Unproductive => 0.0,
    }
}

fn fit_pipeline(examples: &[LabeledExample]) -> (TfIdfVectorizer, LogisticRegression) {
    let texts: Vec<&str> = examples.iter().map(|e| e.text).collect();
    let vectorizer = TfIdfVectorizer::fit(&texts, MAX_FEATURES);
    let samples: Vec<(SparseVector, f32)> = examples
        .iter()
        .map(|e| (vectorizer.transform(e.text), label(e.category)))
        .collect();
    let model = LogisticRegression::fit(&samples, vectorizer.len());
    (vectorizer, model)
}

/// Stratified split with a fixed seed: (train, test).
fn stratified_split(examples: &[LabeledExample]) -> (Vec<LabeledExample>, Vec<LabeledExample>) {
    let mut rng = StdRng::seed_from_u64(SPLIT_SEED);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for category in [Category::Productive, Category::Unproductive] {
        let mut class: Vec<LabeledExample> = examples
            .iter()
            .filter(|e| e.category == category)
            .copied()
            .collect();
        class.shuffle(&mut rng);
        let n_test = ((class.len() as f32) * TEST_FRACTION).round() as usize;
        test.extend_from_slice(&class[..n_test]);
        train.extend_from_slice(&class[n_test..]);
    }

    (train, test)
}

impl ModelArtifact {
    /// Train on `examples`. Accuracy is measured on a held-out split; the
    /// returned weights are fitted on the full corpus.
    pub fn train(examples: &[LabeledExample]) -> Result<Self, ModelError> {
        let has_both = [Category::Productive, Category::Unproductive]
            .iter()
            .all(|c| examples.iter().any(|e| e.category == *c));
        if !has_both {
            return Err(ModelError::Training(
                "corpus must contain examples of both categories".into(),
            ));
        }

        let (train, test) = stratified_split(examples);
        let (split_vectorizer, split_model) = fit_pipeline(&train);
        let correct = test
            .iter()
            .filter(|e| {
                let p = split_model.predict_proba(&split_vectorizer.transform(e.text));
                (p >= 0.5) == (e.category == Category::Productive)
            })
            .count();
        let accuracy = if test.is_empty() {
            0.0
        } else {
            correct as f32 / test.len() as f32
        };

        let (vectorizer, model) = fit_pipeline(examples);
        info!(
            accuracy,
            features = vectorizer.len(),
            samples = examples.len(),
            "Statistical classifier trained"
        );

        Ok(Self {
            version: ARTIFACT_VERSION,
            trained_at: Utc::now(),
            accuracy,
            samples: examples.len(),
            vectorizer,
            model,
        })
    }

    /// Predict a category and the winning class probability.
    pub fn predict(&self, text: &str) -> ClassificationResult {
        let p = self.model.predict_proba(&self.vectorizer.transform(text));
        if p >= 0.5 {
            ClassificationResult::new(Category::Productive, Some(p))
        } else {
            ClassificationResult::new(Category::Unproductive, Some(1.0 - p))
        }
    }

    /// Load an artifact. `Ok(None)` if nothing is persisted yet.
    pub fn load(path: &Path) -> Result<Option<Self>, ModelError> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupted = |reason: String| ModelError::Corrupted {
            path: path.display().to_string(),
            reason,
        };

        let artifact: Self = serde_json::from_slice(&raw).map_err(|e| corrupted(e.to_string()))?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(corrupted(format!(
                "unsupported artifact version {}",
                artifact.version
            )));
        }
        if artifact.model.weights.len() != artifact.vectorizer.len()
            || artifact.vectorizer.vocabulary.len() != artifact.vectorizer.len()
        {
            return Err(corrupted("feature dimensions do not match".into()));
        }
        let n_features = artifact.vectorizer.len();
        if let Some((term, index)) = artifact
            .vectorizer
            .vocabulary
            .iter()
            .find(|(_, index)| **index >= n_features)
        {
            return Err(corrupted(format!(
                "term {term:?} maps to feature {index}, only {n_features} features"
            )));
        }
        Ok(Some(artifact))
    }

    /// Persist via write-to-temp + rename.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)?,
            _ => {}
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Load the persisted artifact, or train and persist a new one.
fn load_or_train(path: &Path) -> Result<ModelArtifact, ModelError> {
    if let Some(artifact) = ModelArtifact::load(path)? {
        info!(
            path = %path.display(),
            trained_at = %artifact.trained_at,
            accuracy = artifact.accuracy,
            "Loaded statistical classifier from cache"
        );
        return Ok(artifact);
    }

    let artifact = ModelArtifact::train(&corpus::training_corpus())?;
    if let Err(e) = artifact.save(path) {
        // A model that can't be persisted is still usable for this process.
        warn!(path = %path.display(), error = %e, "Failed to persist statistical classifier");
    } else {
        info!(path = %path.display(), "Statistical classifier saved");
    }
    Ok(artifact)
}

// ── Tier ────────────────────────────────────────────────────────────

/// Classifier tier backed by a lazily loaded [`ModelArtifact`].
pub struct StatisticalClassifier {
    path: PathBuf,
    /// Outcome of the one load-or-train attempt. Failures keep their message.
    model: OnceCell<Result<Arc<ModelArtifact>, String>>,
    #[cfg(test)]
    initializations: AtomicUsize,
}

impl StatisticalClassifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            model: OnceCell::new(),
            #[cfg(test)]
            initializations: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the model, loading or training it on first use.
    ///
    /// Runs at most once per instance. After a failed attempt every call
    /// returns [`ModelError::Unavailable`] without touching the artifact.
    pub async fn model(&self) -> Result<Arc<ModelArtifact>, ModelError> {
        let outcome = self
            .model
            .get_or_init(|| async {
                #[cfg(test)]
                self.initializations.fetch_add(1, Ordering::SeqCst);
                info!(path = %self.path.display(), "Initializing statistical classifier");

                let path = self.path.clone();
                let loaded = match tokio::task::spawn_blocking(move || load_or_train(&path)).await {
                    Ok(loaded) => loaded,
                    Err(e) => Err(ModelError::Training(format!("training task failed: {e}"))),
                };
                loaded.map(Arc::new).map_err(|e| {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Statistical classifier unavailable for this process"
                    );
                    e.to_string()
                })
            })
            .await;
        outcome.clone().map_err(ModelError::Unavailable)
    }
}

#[async_trait]
impl ClassifierTier for StatisticalClassifier {
    fn name(&self) -> &'static str {
        "statistical"
    }

    async fn classify(&self, text: &str) -> Result<ClassificationResult, TierError> {
        let model = self.model().await?;
        Ok(model.predict(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trained() -> ModelArtifact {
        ModelArtifact::train(&corpus::training_corpus()).unwrap()
    }

    #[test]
    fn ngrams_include_bigrams() {
        let grams = ngrams("Erro no Sistema");
        assert!(grams.contains(&"erro".to_string()));
        assert!(grams.contains(&"no sistema".to_string()));
        assert!(grams.contains(&"erro no".to_string()));
    }

    #[test]
    fn ngrams_skip_single_characters() {
        let grams = ngrams("a b cd");
        assert_eq!(grams, vec!["cd".to_string()]);
    }

    #[test]
    fn tfidf_vectors_are_normalized() {
        let vectorizer = TfIdfVectorizer::fit(&["erro no sistema", "feliz natal"], 100);
        let v = vectorizer.transform("erro erro sistema");
        let norm: f32 = v.iter().map(|(_, x)| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn tfidf_unknown_terms_give_empty_vector() {
        let vectorizer = TfIdfVectorizer::fit(&["erro no sistema"], 100);
        assert!(vectorizer.transform("zzz yyy").is_empty());
    }

    #[test]
    fn tfidf_respects_max_features() {
        let vectorizer = TfIdfVectorizer::fit(&["um dois tres quatro cinco"], 3);
        assert_eq!(vectorizer.len(), 3);
    }

    #[test]
    fn train_requires_both_classes() {
        let only_productive: Vec<LabeledExample> = corpus::training_corpus()
            .into_iter()
            .filter(|e| e.category == Category::Productive)
            .collect();
        assert!(matches!(
            ModelArtifact::train(&only_productive),
            Err(ModelError::Training(_))
        ));
    }

    #[test]
    fn split_is_stratified() {
        let (train, test) = stratified_split(&corpus::training_corpus());
        assert_eq!(test.len(), 8);
        assert_eq!(train.len(), 32);
        let test_productive = test
            .iter()
            .filter(|e| e.category == Category::Productive)
            .count();
        assert_eq!(test_productive, 4);
    }

    #[test]
    fn predicts_support_request_as_productive() {
        let result = trained().predict("Preciso de ajuda urgente com erro no sistema de pagamento");
        assert_eq!(result.category, Category::Productive);
        let confidence = result.confidence.unwrap();
        assert!((0.5..=1.0).contains(&confidence));
    }

    #[test]
    fn predicts_greeting_as_unproductive() {
        let result = trained().predict("Desejo um feliz natal e próspero ano novo a toda equipe");
        assert_eq!(result.category, Category::Unproductive);
    }

    #[test]
    fn artifact_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("model.json");
        let artifact = trained();
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap().unwrap();
        assert_eq!(loaded.samples, 40);
        assert_eq!(loaded.version, ARTIFACT_VERSION);
        let text = "Problema de conectividade com servidor";
        assert_eq!(artifact.predict(text), loaded.predict(text));
    }

    #[test]
    fn load_missing_artifact_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModelArtifact::load(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn load_corrupted_artifact_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(
            ModelArtifact::load(&path),
            Err(ModelError::Corrupted { .. })
        ));
    }

    #[tokio::test]
    async fn first_use_trains_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let classifier = StatisticalClassifier::new(&path);

        let result = classifier
            .classify("Solicito suporte técnico para falha no login")
            .await
            .unwrap();
        assert_eq!(result.category, Category::Productive);
        assert!(path.exists());

        // A fresh instance loads the persisted artifact instead of retraining.
        let reloaded = StatisticalClassifier::new(&path);
        let model = reloaded.model().await.unwrap();
        let original = classifier.model().await.unwrap();
        assert_eq!(model.trained_at, original.trained_at);
    }

    #[tokio::test]
    async fn concurrent_first_use_initializes_once() {
        let dir = tempfile::tempdir().unwrap();
        let classifier = Arc::new(StatisticalClassifier::new(dir.path().join("model.json")));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let classifier = Arc::clone(&classifier);
            handles.push(tokio::spawn(async move {
                classifier.classify("Obrigado pelo excelente atendimento").await
            }));
        }
        for handle in handles {
            let result = handle.await.unwrap().unwrap();
            assert_eq!(result.category, Category::Unproductive);
        }
        assert_eq!(classifier.initializations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupted_artifact_is_a_tier_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"garbage").unwrap();

        let classifier = StatisticalClassifier::new(&path);
        match classifier.classify("erro no sistema").await {
            Err(TierError::Model(ModelError::Unavailable(reason))) => {
                assert!(reason.contains("corrupted"), "unexpected reason: {reason}");
            }
            other => panic!("expected an unavailable model, got {other:?}"),
        }
        // The corrupted artifact is left in place for inspection.
        assert_eq!(std::fs::read(&path).unwrap(), b"garbage");
    }

    /// Serialized artifact whose vocabulary points past the IDF table.
    fn out_of_range_artifact() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "version": ARTIFACT_VERSION,
            "trained_at": "2024-01-01T00:00:00Z",
            "accuracy": 1.0,
            "samples": 40,
            "vectorizer": { "vocabulary": { "erro": 7 }, "idf": [1.0] },
            "model": { "weights": [0.5], "bias": 0.0 }
        }))
        .unwrap()
    }

    #[test]
    fn load_rejects_out_of_range_feature_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, out_of_range_artifact()).unwrap();
        assert!(matches!(
            ModelArtifact::load(&path),
            Err(ModelError::Corrupted { .. })
        ));
    }

    #[test]
    fn transform_skips_indices_without_idf() {
        let vectorizer = TfIdfVectorizer {
            vocabulary: HashMap::from([("erro".to_string(), 7), ("sistema".to_string(), 0)]),
            idf: vec![1.0],
        };
        assert_eq!(vectorizer.transform("erro no sistema"), vec![(0, 1.0)]);
    }

    #[tokio::test]
    async fn out_of_range_artifact_is_a_tier_miss() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, out_of_range_artifact()).unwrap();

        let classifier = StatisticalClassifier::new(&path);
        assert!(matches!(
            classifier.classify("erro no sistema").await,
            Err(TierError::Model(ModelError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn failed_initialization_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"garbage").unwrap();

        let classifier = StatisticalClassifier::new(&path);
        for _ in 0..3 {
            assert!(classifier.classify("erro no sistema").await.is_err());
        }
        assert_eq!(classifier.initializations.load(Ordering::SeqCst), 1);

        // Replacing the artifact does not revive this instance.
        trained().save(&path).unwrap();
        assert!(classifier.model().await.is_err());
        assert_eq!(classifier.initializations.load(Ordering::SeqCst), 1);
    }
}
