use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::alphabet::Alphabet;
use crate::config::FeatureConfig;
use crate::crf::lbfgs::LbfgsParams;
use crate::crf::maxent::MaxEntModel;
use crate::dataset::{build_dataset, Item};
use crate::features::FeatureGenerator;
use crate::model::{ChainModel, ModelKind, SequenceModel, TrainedModel};
use crate::sentence::Sentence;
use crate::store;
use crate::Error;

/// When to stop parameter estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stopping {
    /// Run until the objective converges (with a safety cap on passes).
    Converge,
    /// Run exactly up to the given number of passes, no convergence test.
    Iterations(usize),
}

/// Training options. The defaults match how the taggers have always been
/// trained: chain model, convergence-based stopping, L2 strength 0.1.
#[derive(Debug, Clone)]
pub struct TrainOpts {
    pub mode: ModelKind,
    pub stopping: Stopping,
    pub c2: f64,
}

impl Default for TrainOpts {
    fn default() -> Self {
        Self {
            mode: ModelKind::Chain,
            stopping: Stopping::Converge,
            c2: 0.1,
        }
    }
}

const CONVERGE_PASS_CAP: usize = 500;

impl Stopping {
    fn params(&self) -> LbfgsParams {
        match *self {
            Stopping::Converge => LbfgsParams {
                max_iterations: CONVERGE_PASS_CAP,
                ..Default::default()
            },
            Stopping::Iterations(n) => LbfgsParams {
                max_iterations: n,
                epsilon: 0.0,
                delta: 0.0,
                past: usize::MAX,
                ..Default::default()
            },
        }
    }
}

/// A trained sequence tagger. Only obtainable from [`Tagger::train`] or
/// [`Tagger::load`], so decoding against an untrained model is not
/// representable. Immutable once built; decode calls on independent
/// sentences may run concurrently.
pub struct Tagger {
    model: TrainedModel,
    generator: FeatureGenerator,
}

impl Tagger {
    /// Trains a model on labeled sentences. `labels` seeds the tag
    /// vocabulary and grows with the labels observed in the data; it is
    /// frozen before optimization begins, together with the feature
    /// vocabulary grown during instance construction.
    pub fn train(
        sentences: &[Sentence],
        labels: Alphabet,
        config: FeatureConfig,
        opts: &TrainOpts,
    ) -> Result<Self, Error> {
        let generator = FeatureGenerator::new(&config)?;
        log::info!("training model on {} sentences", sentences.len());

        let mut featurized = Vec::with_capacity(sentences.len());
        for sentence in sentences {
            if sentence.is_empty() {
                continue;
            }
            let gold: Vec<String> = sentence
                .labels()
                .ok_or(Error::UnlabeledUnit)?
                .into_iter()
                .map(|l| l.to_string())
                .collect();
            featurized.push((generator.features(sentence), gold));
        }

        let mut label_alphabet = labels;
        let mut attr_alphabet = Alphabet::new();
        let ds = build_dataset(&featurized, &mut label_alphabet, &mut attr_alphabet);
        if ds.is_empty() {
            return Err(Error::Inconsistency("empty training set".to_string()));
        }
        // Growth ends here; optimization runs against frozen vocabularies.
        let labels = label_alphabet.freeze();
        let attrs = attr_alphabet.freeze();
        log::info!(
            "number of features for training: {}, labels: {}",
            attrs.len(),
            labels.len()
        );

        let params = opts.stopping.params();
        let (model, converged) = match opts.mode {
            ModelKind::Chain => {
                let (m, c) = ChainModel::train(&ds, &params, opts.c2);
                (SequenceModel::Chain(m), c)
            }
            ModelKind::PerUnit => {
                let (m, c) = MaxEntModel::train(&ds, &params, opts.c2);
                (SequenceModel::PerUnit(m), c)
            }
        };
        if !converged && opts.stopping == Stopping::Converge {
            log::warn!("training stopped before convergence; keeping best parameters so far");
        }

        let model = TrainedModel {
            labels,
            attrs,
            config,
            lexicons: generator.lexicons().clone(),
            model,
        };
        Ok(Self { model, generator })
    }

    /// The feature configuration embedded in the model.
    pub fn config(&self) -> &FeatureConfig {
        &self.model.config
    }

    /// Rejects an externally supplied configuration that disagrees with the
    /// embedded one. Decoding always featurizes with the embedded
    /// configuration; silently mixing two would corrupt feature alignment.
    pub fn ensure_config(&self, config: &FeatureConfig) -> Result<(), Error> {
        if *config != self.model.config {
            return Err(Error::ConfigMismatch);
        }
        Ok(())
    }

    pub fn kind(&self) -> ModelKind {
        self.model.model.kind()
    }

    pub fn labels(&self) -> &crate::alphabet::FrozenAlphabet {
        &self.model.labels
    }

    pub fn num_attrs(&self) -> usize {
        self.model.attrs.len()
    }

    fn items_for(&self, sentence: &Sentence) -> Vec<Item> {
        self.generator
            .features(sentence)
            .iter()
            .map(|fs| {
                fs.iter()
                    .filter_map(|f| self.model.attrs.to_id(f))
                    .map(|id| crate::dataset::Attr::new(id, 1.0))
                    .collect()
            })
            .collect()
    }

    /// Labels the sentence, writing the predicted label (and, on request,
    /// the segment confidence) into each unit. Takes the sentence by value
    /// and hands it back: the written units are the one sanctioned
    /// mutation, and nothing else can observe it half-annotated.
    pub fn predict(&self, mut sentence: Sentence, want_confidence: bool) -> Result<Sentence, Error> {
        if sentence.is_empty() {
            return Ok(sentence);
        }
        let items = self.items_for(&sentence);
        let decoded = self.model.decode(&items, want_confidence);
        if decoded.labels.len() != sentence.len() {
            return Err(Error::LengthMismatch {
                expected: sentence.len(),
                actual: decoded.labels.len(),
            });
        }
        for (i, unit) in sentence.units_mut().iter_mut().enumerate() {
            let id = decoded.labels[i];
            let label = self
                .model
                .labels
                .to_str(id)
                .ok_or_else(|| Error::Inconsistency(format!("decoded unknown label id {id}")))?;
            unit.set_label(label);
            if let Some(conf) = decoded.confidences[i] {
                unit.set_confidence(conf);
            }
        }
        Ok(sentence)
    }

    /// Labels many sentences and renders them in the IOB text format, one
    /// `token<TAB>label[<TAB>confidence]` line per unit and an `O O` line
    /// after each sentence.
    pub fn predict_iob(
        &self,
        sentences: Vec<Sentence>,
        want_confidence: bool,
    ) -> Result<Vec<String>, Error> {
        let mut lines = Vec::new();
        for sentence in sentences {
            let sentence = self.predict(sentence, want_confidence)?;
            for unit in sentence.units() {
                let label = unit.label().unwrap_or(crate::model::OUTSIDE);
                match unit.confidence() {
                    Some(conf) if want_confidence => {
                        lines.push(format!("{}\t{}\t{}", unit.text(), label, conf));
                    }
                    _ => lines.push(format!("{}\t{}", unit.text(), label)),
                }
            }
            lines.push("O\tO".to_string());
        }
        Ok(lines)
    }

    /// Serializes the trained model as one versioned artifact.
    pub fn save<W: Write>(&self, wtr: W) -> Result<(), Error> {
        store::write(&self.model, wtr)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), Error> {
        self.save(File::create(path)?)
    }

    /// Restores a model saved with [`Tagger::save`]. Vocabularies come back
    /// frozen and the feature pipeline is rebuilt from the embedded
    /// configuration and lexicon contents; no lexicon file is re-read.
    pub fn load<R: Read>(rdr: R) -> Result<Self, Error> {
        let model = store::read(rdr)?;
        let generator = FeatureGenerator::with_lexicons(&model.config, model.lexicons.clone())?;
        Ok(Self { model, generator })
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Error> {
        Self::load(File::open(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentence::Unit;

    fn labeled(tokens: &[(&str, &str)]) -> Sentence {
        let mut s = Sentence::default();
        let mut begin = 0;
        for (text, label) in tokens {
            s.push(Unit::with_label(begin, begin + text.len(), text, label));
            begin += text.len() + 1;
        }
        s
    }

    fn train_toy(opts: &TrainOpts) -> Tagger {
        let sentences = vec![
            labeled(&[("IL-2", "GENE"), ("binds", "O"), ("cells", "O")]),
            labeled(&[("the", "O"), ("TNF", "GENE"), ("receptor", "O")]),
        ];
        let mut config = FeatureConfig::new();
        config.set("offset_conjunctions", "(-1) (1)");
        Tagger::train(&sentences, Alphabet::new(), config, opts).unwrap()
    }

    #[test]
    fn train_and_predict_chain() {
        let tagger = train_toy(&TrainOpts::default());
        let out = tagger
            .predict(Sentence::from_tokens(&["IL-2", "binds", "cells"]), false)
            .unwrap();
        let labels: Vec<_> = out.units().iter().map(|u| u.label().unwrap()).collect();
        assert_eq!(labels, vec!["GENE", "O", "O"]);
    }

    #[test]
    fn per_unit_mode_reports_posteriors() {
        let tagger = train_toy(&TrainOpts {
            mode: ModelKind::PerUnit,
            ..Default::default()
        });
        let out = tagger
            .predict(Sentence::from_tokens(&["IL-2", "binds"]), true)
            .unwrap();
        for unit in out.units() {
            let conf = unit.confidence().unwrap();
            assert!(conf > 0.0 && conf <= 1.0);
        }
    }

    #[test]
    fn unlabeled_training_data_is_rejected() {
        let sentences = vec![Sentence::from_tokens(&["no", "labels"])];
        let err = Tagger::train(
            &sentences,
            Alphabet::new(),
            FeatureConfig::new(),
            &TrainOpts::default(),
        )
        .map(|_| ())
        .unwrap_err();
        assert!(matches!(err, Error::UnlabeledUnit));
    }

    #[test]
    fn config_mismatch_is_rejected() {
        let tagger = train_toy(&TrainOpts::default());
        assert!(tagger.ensure_config(tagger.config()).is_ok());
        let mut other = FeatureConfig::new();
        other.set("feat_plural_enabled", "true");
        assert!(matches!(
            tagger.ensure_config(&other),
            Err(Error::ConfigMismatch)
        ));
    }
}
