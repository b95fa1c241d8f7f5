//! Feature pipeline: an ordered list of stages mapping a sentence to one
//! binary feature set per unit.
//!
//! The stage order is fixed (base → surface → affix → lexicon →
//! offset-conjunction → n-gram) because the conjunction stage reads the
//! features earlier stages have already materialized. Per-unit output is a
//! `BTreeSet<String>`, so duplicate emission is idempotent and iteration
//! order is deterministic.

pub mod affix;
pub mod base;
pub mod conjunction;
pub mod lexicon;
pub mod ngram;
pub mod surface;

use std::collections::{BTreeMap, BTreeSet};

use crate::config::{ConfigError, FeatureConfig};
use crate::sentence::Sentence;

pub use lexicon::Lexicon;

/// Feature names active at one position.
pub type FeatSet = BTreeSet<String>;

/// One pipeline stage. `texts` carries the case-normalized, stemmed token
/// forms the base stage works from; `feats` is position-aligned with the
/// sentence.
pub(crate) trait TokenPipe: Send + Sync {
    fn pipe(&self, sentence: &Sentence, texts: &[String], feats: &mut [FeatSet]);
}

/// Deterministically maps `(Sentence, FeatureConfig)` to per-unit feature
/// sets. Building a generator validates the configuration; in particular a
/// lexicon file that cannot be read is a fatal error, never a silently
/// skipped stage.
pub struct FeatureGenerator {
    normalizer: base::Normalizer,
    pipes: Vec<Box<dyn TokenPipe>>,
    lexicons: BTreeMap<String, Lexicon>,
}

impl FeatureGenerator {
    /// Builds the pipeline, reading lexicon files from the paths named in
    /// the configuration. Train-time entry point.
    pub fn new(config: &FeatureConfig) -> Result<Self, ConfigError> {
        let mut lexicons = BTreeMap::new();
        for key in config.lexicon_keys() {
            if let Some(path) = config.get(&key) {
                let lexicon = Lexicon::from_path(&key, path.as_ref())?;
                lexicons.insert(key, lexicon);
            }
        }
        Self::with_lexicons(config, lexicons)
    }

    /// Rebuilds the pipeline from a configuration plus already-loaded
    /// lexicon contents. Model-load entry point: no file access happens
    /// here, so decode never touches the filesystem.
    pub fn with_lexicons(
        config: &FeatureConfig,
        lexicons: BTreeMap<String, Lexicon>,
    ) -> Result<Self, ConfigError> {
        let mut pipes: Vec<Box<dyn TokenPipe>> = Vec::new();

        pipes.push(Box::new(base::BasePipe::new(config)?));
        pipes.push(Box::new(surface::SurfacePipe::new(config)));

        if let Some(sizes) = config.int_array("prefix_sizes")? {
            pipes.push(Box::new(affix::AffixPipe::prefixes(sizes)));
        }
        if let Some(sizes) = config.int_array("suffix_sizes")? {
            pipes.push(Box::new(affix::AffixPipe::suffixes(sizes)));
        }

        for lexicon in lexicons.values() {
            pipes.push(Box::new(lexicon::LexiconPipe::new(lexicon.clone())));
        }

        if let Some(groups) = config.offset_conjunctions()? {
            pipes.push(Box::new(conjunction::ConjunctionPipe::new(groups)));
        }

        if let Some(sizes) = config.int_array("token_ngrams")? {
            pipes.push(Box::new(ngram::TokenNGramPipe::new(sizes)));
        }
        if let Some(sizes) = config.int_array("char_ngrams")? {
            pipes.push(Box::new(ngram::CharNGramPipe::new(sizes)));
        }

        Ok(Self {
            normalizer: base::Normalizer::new(config),
            pipes,
            lexicons,
        })
    }

    /// The lexicon contents the pipeline was built with; embedded in the
    /// stored model so a reload featurizes identically without file access.
    pub fn lexicons(&self) -> &BTreeMap<String, Lexicon> {
        &self.lexicons
    }

    /// Runs all stages over the sentence. Pure: identical input yields
    /// identical feature sets.
    pub fn features(&self, sentence: &Sentence) -> Vec<FeatSet> {
        let texts: Vec<String> = sentence
            .units()
            .iter()
            .map(|u| self.normalizer.normalize(u.text()))
            .collect();
        let mut feats = vec![FeatSet::new(); sentence.len()];
        for pipe in &self.pipes {
            pipe.pipe(sentence, &texts, &mut feats);
        }
        feats
    }
}
