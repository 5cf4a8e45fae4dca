//! Keyword vocabulary model and the ranker built on it.
//!
//! A free-text query is tokenized, every token is resolved to the best matching keyword of
//! the vocabulary, and the keywords' feature rows are summed into one query vector:
//! `normalize(pca · (normalize(tanh(Σ rows + bias)) - mean))`. The result lives in the
//! secondary space and is scored there like any other embedding.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::Ranker;
use super::embedding::EmbeddingRanker;
use super::projection::Projection;
use crate::constants::KEYWORD_SEPARATORS;
use crate::error::{FrameHunterError, Result};
use crate::filters::CandidateMask;
use crate::simd::normalize_in_place;
use crate::types::{RankerKind, ScoreArray};

/// One vocabulary entry; any synonym resolves to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: u32,
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Autocomplete hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub id: u32,
    /// Synonym that matched the prefix.
    pub word: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct KeywordModel {
    keywords: Vec<Keyword>,
    /// Lowercased synonyms as `(word, keyword index)`, sorted by word.
    index: Vec<(String, usize)>,
    feature_dim: usize,
    features: Vec<f32>,
    bias: Vec<f32>,
    projection: Projection,
}

impl KeywordModel {
    /// `features` holds one row of `feature_dim` values per keyword, in vocabulary order.
    /// `projection` carries the PCA mean and matrix; its bias part must be empty.
    pub fn new(
        keywords: Vec<Keyword>,
        feature_dim: usize,
        features: Vec<f32>,
        bias: Vec<f32>,
        projection: Projection,
    ) -> Result<Self> {
        if keywords.is_empty() {
            return Err(invalid("keyword vocabulary is empty"));
        }
        if feature_dim == 0 || features.len() != keywords.len() * feature_dim {
            return Err(invalid(format!(
                "{} keyword feature values for {} keywords of dimension {feature_dim}",
                features.len(),
                keywords.len()
            )));
        }
        if bias.len() != feature_dim {
            return Err(invalid(format!(
                "keyword bias has {} values, expected {feature_dim}",
                bias.len()
            )));
        }
        if projection.bias.is_some() {
            return Err(invalid("keyword projection must not carry its own bias"));
        }
        projection.validate(feature_dim).map_err(invalid)?;

        let mut index: Vec<(String, usize)> = keywords
            .iter()
            .enumerate()
            .flat_map(|(idx, kw)| kw.synonyms.iter().map(move |s| (s.to_lowercase(), idx)))
            .collect();
        index.sort();
        index.dedup();
        Ok(Self {
            keywords,
            index,
            feature_dim,
            features,
            bias,
            projection,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    #[must_use]
    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    /// Dimensionality of the produced query vectors.
    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.projection.output_dim_for(self.feature_dim)
    }

    /// Keywords matching `query`: synonyms starting with it first (shortest first), then
    /// synonyms containing it. Each keyword appears once.
    #[must_use]
    pub fn find(&self, query: &str, limit: usize) -> Vec<KeywordMatch> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }
        let mut prefix: Vec<&(String, usize)> = Vec::new();
        let mut infix: Vec<&(String, usize)> = Vec::new();
        for entry in &self.index {
            if entry.0.starts_with(&needle) {
                prefix.push(entry);
            } else if entry.0.contains(&needle) {
                infix.push(entry);
            }
        }
        let by_length = |a: &&(String, usize), b: &&(String, usize)| {
            a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0))
        };
        prefix.sort_by(by_length);
        infix.sort_by(by_length);

        let mut seen = vec![false; self.keywords.len()];
        let mut out = Vec::new();
        for (word, idx) in prefix.into_iter().chain(infix) {
            if seen[*idx] {
                continue;
            }
            seen[*idx] = true;
            let kw = &self.keywords[*idx];
            out.push(KeywordMatch {
                id: kw.id,
                word: word.clone(),
                description: kw.description.clone(),
            });
            if out.len() == limit {
                break;
            }
        }
        out
    }

    /// Lowercased tokens with punctuation separators removed.
    #[must_use]
    pub fn tokenize(text: &str) -> Vec<String> {
        text.replace(KEYWORD_SEPARATORS, " ")
            .split_whitespace()
            .map(str::to_lowercase)
            .collect()
    }

    /// Vocabulary indices the tokens resolve to; unknown tokens are dropped.
    fn decode(&self, tokens: &[String]) -> Vec<usize> {
        tokens
            .iter()
            .filter_map(|token| {
                let best = self.find(token, 1).into_iter().next()?;
                self.keywords.iter().position(|kw| kw.id == best.id)
            })
            .collect()
    }

    /// Query vector for free text.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let tokens = Self::tokenize(text);
        if tokens.is_empty() {
            return Err(FrameHunterError::InvalidQuery {
                reason: "keyword query has no tokens".to_string(),
            });
        }
        let decoded = self.decode(&tokens);
        tracing::debug!(
            target = "framehunter::keyword",
            tokens = tokens.len(),
            resolved = decoded.len(),
            "keyword query decoded"
        );
        let mut acc = self.bias.clone();
        for idx in decoded {
            let row = &self.features[idx * self.feature_dim..(idx + 1) * self.feature_dim];
            for (a, r) in acc.iter_mut().zip(row) {
                *a += r;
            }
        }
        for a in &mut acc {
            *a = a.tanh();
        }
        normalize_in_place(&mut acc);
        Ok(self.projection.apply(&acc))
    }
}

fn invalid(reason: impl Into<String>) -> FrameHunterError {
    FrameHunterError::InvalidConfig {
        reason: reason.into(),
    }
}

/// Scores the secondary space with keyword-derived query vectors.
#[derive(Debug, Clone)]
pub struct KeywordRanker {
    inner: EmbeddingRanker,
    model: Arc<KeywordModel>,
}

impl KeywordRanker {
    pub fn new(inner: EmbeddingRanker, model: Arc<KeywordModel>) -> Result<Self> {
        if inner.query_dim() != model.output_dim() {
            return Err(FrameHunterError::DimensionMismatch {
                space: inner.space(),
                expected: inner.query_dim(),
                actual: model.output_dim(),
            });
        }
        Ok(Self {
            inner: inner.with_kind(RankerKind::Keyword),
            model,
        })
    }

    #[must_use]
    pub fn model(&self) -> &Arc<KeywordModel> {
        &self.model
    }

    #[must_use]
    pub fn embedding_ranker(&self) -> &EmbeddingRanker {
        &self.inner
    }
}

impl Ranker for KeywordRanker {
    type Query = str;

    fn kind(&self) -> RankerKind {
        RankerKind::Keyword
    }

    fn rank(&self, text: &str, mask: Option<&CandidateMask>) -> Result<ScoreArray> {
        let query = self.model.embed_text(text)?;
        self.inner.rank(&query, mask)
    }
}
