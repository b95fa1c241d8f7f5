use std::collections::HashSet;
use std::hash::Hash;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;

use super::context::{CtxOpt, Lattice, ResetOpt};

#[derive(Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Clone, Copy)]
pub(crate) enum FeatType {
    State,
    Trans,
}

/// One model feature: a state feature associates attribute `src` with label
/// `dst`; a transition feature associates label `src` with label `dst`.
/// `freq` carries the observation count from the training data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Feat {
    pub ftype: FeatType,
    pub src: usize,
    pub dst: usize,
    pub freq: f64,
}

impl Hash for Feat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ftype.hash(state);
        self.src.hash(state);
        self.dst.hash(state);
    }
}

impl PartialEq for Feat {
    fn eq(&self, other: &Self) -> bool {
        self.ftype == other.ftype && self.src == other.src && self.dst == other.dst
    }
}

impl Eq for Feat {}

#[derive(Debug, Default)]
struct FeatAccumulator {
    m: HashSet<Feat>,
}

impl FeatAccumulator {
    fn add(&mut self, f: Feat) {
        let mut f = f;
        if let Some(p) = self.m.take(&f) {
            f.freq += p.freq;
        }
        self.m.insert(f);
    }

    /// Deterministic feature order: sorted by (type, src, dst) so two
    /// training runs over the same data index weights identically.
    fn into_vec(self) -> Vec<Feat> {
        let mut v: Vec<Feat> = self.m.into_iter().collect();
        v.sort_by_key(|f| (f.ftype as u8, f.src, f.dst));
        v
    }
}

/// Generates the model features exhibited by the training data. Transition
/// features exist only where the data shows the transition at least once;
/// everything else stays structurally impossible.
pub(crate) fn generate_features(ds: &Dataset) -> Vec<Feat> {
    let l = ds.num_labels();
    let mut acc = FeatAccumulator::default();
    for seq in &ds.instances {
        assert!(seq.len() > 0, "unexpected empty instance");
        let mut prev = l; // sentinel: BOS has no incoming transition
        for t in 0..seq.len() {
            let curr = seq.labels[t];
            if prev != l {
                acc.add(Feat {
                    ftype: FeatType::Trans,
                    src: prev,
                    dst: curr,
                    freq: 1.0,
                });
            }
            for attr in &seq.items[t] {
                acc.add(Feat {
                    ftype: FeatType::State,
                    src: attr.id,
                    dst: curr,
                    freq: attr.value,
                });
            }
            prev = curr;
        }
    }
    acc.into_vec()
}

/// Collects, per attribute and per source label, the indices of the
/// features they fire.
pub(crate) fn init_references(
    attrs: &mut [Vec<usize>],
    forward_trans: &mut [Vec<usize>],
    features: &[Feat],
) {
    features.iter().enumerate().for_each(|(k, f)| match f.ftype {
        FeatType::State => attrs[f.src].push(k),
        FeatType::Trans => forward_trans[f.src].push(k),
    });
}

/// Batch conditional log-likelihood encoder for the chain model: owns the
/// feature table and reference lists and evaluates the objective and its
/// gradient over a whole dataset.
#[derive(Debug, Default)]
pub(crate) struct CrfEncoder {
    pub features: Vec<Feat>,
    pub attrs: Vec<Vec<usize>>,
    pub forward_trans: Vec<Vec<usize>>,
    ctx: Lattice,
}

impl CrfEncoder {
    pub fn num_labels(&self) -> usize {
        self.forward_trans.len()
    }

    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub fn set_data(&mut self, ds: &Dataset) {
        let l = ds.num_labels();
        let a = ds.num_attrs();
        let n = ds.len();
        let t = ds.max_length();
        log::info!("set data (L: {l}, A: {a}, N: {n}, T: {t})");
        self.ctx = Lattice::new(CtxOpt::VITERBI | CtxOpt::MARGINALS, l, t);
        let begin = Instant::now();
        self.features = generate_features(ds);
        log::info!(
            "number of features: {}, time cost: {:?}",
            self.features.len(),
            begin.elapsed()
        );
        self.attrs = vec![Vec::new(); a];
        self.forward_trans = vec![Vec::new(); l];
        init_references(&mut self.attrs, &mut self.forward_trans, &self.features);
    }

    fn state_score(&mut self, seq: &crate::dataset::Instance, w: &[f64]) {
        let l = self.ctx.num_labels;
        for t in 0..seq.len() {
            for attr in &seq.items[t] {
                for &fid in &self.attrs[attr.id] {
                    let f = &self.features[fid];
                    self.ctx.state[l * t + f.dst] += w[fid] * attr.value;
                }
            }
        }
    }

    fn transition_score(&mut self, w: &[f64]) {
        let l = self.ctx.num_labels;
        for i in 0..self.num_labels() {
            for &fid in &self.forward_trans[i] {
                self.ctx.trans[l * i + self.features[fid].dst] = w[fid];
            }
        }
    }

    fn model_expectation(&self, seq: &crate::dataset::Instance, g: &mut [f64]) {
        let l = self.ctx.num_labels;
        for t in 0..seq.len() {
            for attr in &seq.items[t] {
                for &fid in &self.attrs[attr.id] {
                    let f = &self.features[fid];
                    g[fid] += self.ctx.mexp_state[l * t + f.dst] * attr.value;
                }
            }
        }
        for i in 0..self.num_labels() {
            for &fid in &self.forward_trans[i] {
                let f = &self.features[fid];
                g[fid] += self.ctx.mexp_trans[l * i + f.dst];
            }
        }
    }

    /// Negative conditional log-likelihood of the dataset and its gradient.
    pub fn objective_and_gradients_batch(&mut self, ds: &Dataset, w: &[f64], g: &mut [f64]) -> f64 {
        // Gradients start from the (negated) observation expectations.
        for i in 0..self.num_features() {
            g[i] = -self.features[i].freq;
        }

        // Transition scores are independent of the input sequence.
        self.ctx.reset(ResetOpt::TRANS);
        self.transition_score(w);
        self.ctx.exp_transition();

        let mut logl = 0.0;
        for seq in &ds.instances {
            self.ctx.resize(seq.len());
            self.ctx.reset(ResetOpt::STATE);
            self.state_score(seq, w);
            self.ctx.exp_state();

            self.ctx.alpha_score();
            self.ctx.beta_score();
            self.ctx.marginals();

            logl += self.ctx.score(&seq.labels) - self.ctx.lognorm();
            self.model_expectation(seq, g);
        }
        -logl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::dataset::{Dataset, Instance};

    fn toy_dataset() -> Dataset {
        // Two instances over two labels and four attributes.
        let mut labels = Alphabet::new();
        let mut attrs = Alphabet::new();
        let mut ds = Dataset::default();
        for (words, tags) in [
            (vec!["hello", "world"], vec!["P", "P"]),
            (vec!["hi", "there"], vec!["Q", "Q"]),
        ] {
            let mut inst = Instance::default();
            for (w, t) in words.iter().zip(&tags) {
                inst.push(
                    vec![crate::dataset::Attr::new(attrs.find_or_insert(w), 1.0)],
                    labels.find_or_insert(t),
                );
            }
            ds.push(inst);
        }
        ds.set_dims(labels.len(), attrs.len());
        ds
    }

    #[test]
    fn generates_observed_features_only() {
        let ds = toy_dataset();
        let feats = generate_features(&ds);
        // 4 state features + P->P and Q->Q transitions; never P->Q or Q->P.
        assert_eq!(feats.len(), 6);
        let trans: Vec<_> = feats
            .iter()
            .filter(|f| f.ftype == FeatType::Trans)
            .map(|f| (f.src, f.dst))
            .collect();
        assert_eq!(trans, vec![(0, 0), (1, 1)]);
    }

    #[test]
    fn gradient_at_zero_balances_expectations() {
        let ds = toy_dataset();
        let mut enc = CrfEncoder::default();
        enc.set_data(&ds);
        let k = enc.num_features();
        let w = vec![0.0; k];
        let mut g = vec![0.0; k];
        let obj = enc.objective_and_gradients_batch(&ds, &w, &mut g);
        assert!(obj.is_finite());
        assert!(obj > 0.0, "NLL at zero weights must be positive: {obj}");
        for v in &g {
            assert!(v.is_finite());
        }
    }
}
