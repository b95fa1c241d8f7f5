use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::alphabet::FrozenAlphabet;
use crate::config::FeatureConfig;
use crate::crf::context::{CtxOpt, Lattice, ResetOpt};
use crate::crf::encoder::{init_references, CrfEncoder, Feat, FeatType};
use crate::crf::lbfgs::{self, LbfgsParams};
use crate::crf::maxent::MaxEntModel;
use crate::crf::{confidence, lbfgs::l2_penalty};
use crate::dataset::{Dataset, Item};
use crate::evaluation::runs;
use crate::features::Lexicon;

/// Which model variant to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// Linear-chain CRF: scores whole label sequences.
    Chain,
    /// Per-unit maximum-entropy classifier.
    PerUnit,
}

/// The outside label: units carrying it belong to no segment.
pub const OUTSIDE: &str = "O";

/// Chain-structured scorer: the trained feature table and weights plus
/// derived lookup structures rebuilt after training or loading.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChainModel {
    features: Vec<Feat>,
    weights: Vec<f64>,
    n_labels: usize,
    n_attrs: usize,
    /// State features fired by each attribute. Derived.
    #[serde(skip)]
    attr_refs: Vec<Vec<usize>>,
    /// Transition features leaving each label. Derived.
    #[serde(skip)]
    label_refs: Vec<Vec<usize>>,
    /// Labels the training data exhibited; anything else is structurally
    /// unreachable at decode time. Derived.
    #[serde(skip)]
    reachable: Vec<bool>,
}

impl ChainModel {
    /// Trains by maximizing conditional log-likelihood with L2 strength
    /// `c2`. Returns the model and whether the optimizer converged.
    pub fn train(ds: &Dataset, params: &LbfgsParams, c2: f64) -> (Self, bool) {
        let mut enc = CrfEncoder::default();
        enc.set_data(ds);
        let k = enc.num_features();
        assert!(k > 0, "number of features should be positive");

        let sol = lbfgs::minimize(
            |w, g| enc.objective_and_gradients_batch(ds, w, g) + l2_penalty(c2, w, g),
            vec![0.0; k],
            params,
        );
        log::info!(
            "chain training finished: objective {:.6}, {} iterations, converged: {}",
            sol.fx,
            sol.iterations,
            sol.converged
        );

        let mut model = Self {
            features: enc.features,
            weights: sol.x,
            n_labels: ds.num_labels(),
            n_attrs: ds.num_attrs(),
            attr_refs: Vec::new(),
            label_refs: Vec::new(),
            reachable: Vec::new(),
        };
        model.finalize();
        (model, sol.converged)
    }

    /// Rebuilds the derived lookup structures from the feature table. Must
    /// run after training and after deserialization.
    pub fn finalize(&mut self) {
        self.attr_refs = vec![Vec::new(); self.n_attrs];
        self.label_refs = vec![Vec::new(); self.n_labels];
        init_references(&mut self.attr_refs, &mut self.label_refs, &self.features);
        self.reachable = vec![false; self.n_labels];
        for f in &self.features {
            self.reachable[f.dst] = true;
            if f.ftype == FeatType::Trans {
                self.reachable[f.src] = true;
            }
        }
    }

    pub fn num_labels(&self) -> usize {
        self.n_labels
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Builds the lattice for one input: transition scores from the trained
    /// weights, state scores from the attributes present at each position.
    /// A fresh lattice per call keeps concurrent decodes independent.
    pub fn lattice(&self, items: &[Item]) -> Lattice {
        let l = self.n_labels;
        let t_len = items.len();
        let mut ctx = Lattice::new(CtxOpt::VITERBI, l, t_len);
        ctx.resize(t_len);
        ctx.reset(ResetOpt::STATE | ResetOpt::TRANS);

        for i in 0..l {
            for &fid in &self.label_refs[i] {
                let f = &self.features[fid];
                ctx.trans[l * i + f.dst] = self.weights[fid];
            }
        }
        for (t, item) in items.iter().enumerate() {
            for attr in item {
                if attr.id >= self.n_attrs {
                    continue;
                }
                for &fid in &self.attr_refs[attr.id] {
                    let f = &self.features[fid];
                    ctx.state[l * t + f.dst] += self.weights[fid] * attr.value;
                }
            }
            for j in 0..l {
                if !self.reachable[j] {
                    ctx.state[l * t + j] = f64::NEG_INFINITY;
                }
            }
        }
        ctx
    }
}

/// The two model kinds behind one decode contract. Callers never need to
/// know which variant they hold; [`TrainedModel::decode`] is the single
/// dispatch point.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) enum SequenceModel {
    Chain(ChainModel),
    PerUnit(MaxEntModel),
}

impl SequenceModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            Self::Chain(_) => ModelKind::Chain,
            Self::PerUnit(_) => ModelKind::PerUnit,
        }
    }
}

/// Decode output: one label id per input position, plus a per-position
/// confidence where one was computed (chain mode only fills the positions
/// inside predicted segments).
#[derive(Debug)]
pub(crate) struct Decoded {
    pub labels: Vec<usize>,
    pub confidences: Vec<Option<f64>>,
}

/// Everything a trained model carries: frozen vocabularies, the feature
/// configuration and lexicon contents it was trained under, and the
/// weights. Immutable after training or loading; safe to share read-only
/// across any number of decode calls.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct TrainedModel {
    pub labels: FrozenAlphabet,
    pub attrs: FrozenAlphabet,
    pub config: FeatureConfig,
    pub lexicons: BTreeMap<String, Lexicon>,
    pub model: SequenceModel,
}

impl TrainedModel {
    /// Rebuilds derived structures after deserialization.
    pub fn finalize(&mut self) {
        if let SequenceModel::Chain(m) = &mut self.model {
            m.finalize();
        }
    }

    /// Labels the featurized input. The one place that dispatches on the
    /// model kind.
    pub fn decode(&self, items: &[Item], want_confidence: bool) -> Decoded {
        match &self.model {
            SequenceModel::Chain(m) => {
                let mut ctx = m.lattice(items);
                let mut labels = vec![0usize; items.len()];
                ctx.viterbi(&mut labels);

                let mut confidences = vec![None; items.len()];
                if want_confidence {
                    let outside = self.labels.to_id(OUTSIDE);
                    let free = ctx.log_forward_sum(|_, _| true);
                    for (start, stop) in runs(&labels, |l| Some(*l) == outside) {
                        let c = confidence::estimate(&ctx, free, &labels, start, stop);
                        for conf in confidences.iter_mut().take(stop + 1).skip(start) {
                            *conf = Some(c);
                        }
                    }
                }
                Decoded { labels, confidences }
            }
            SequenceModel::PerUnit(m) => {
                let mut labels = Vec::with_capacity(items.len());
                let mut confidences = Vec::with_capacity(items.len());
                for item in items {
                    let (label, posterior) = m.predict(item);
                    labels.push(label);
                    confidences.push(want_confidence.then_some(posterior));
                }
                Decoded { labels, confidences }
            }
        }
    }
}
