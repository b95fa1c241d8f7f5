use serde::{Deserialize, Serialize};

use crate::dataset::{Attr, Dataset};

use super::lbfgs::{self, LbfgsParams};

/// Per-unit maximum-entropy classifier over the same attribute alphabet as
/// the chain model. Drops the chain structure: every position is classified
/// independently, which is cheaper to train when the global ordering
/// constraint is not needed.
///
/// Weights are laid out `[A+1][L]` with the bias row at index `A`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MaxEntModel {
    weights: Vec<f64>,
    n_attrs: usize,
    n_labels: usize,
}

impl MaxEntModel {
    pub fn num_labels(&self) -> usize {
        self.n_labels
    }

    pub fn num_weights(&self) -> usize {
        self.weights.len()
    }

    fn scores_into(weights: &[f64], n_labels: usize, n_attrs: usize, item: &[Attr], out: &mut [f64]) {
        for l in 0..n_labels {
            out[l] = weights[n_attrs * n_labels + l]; // bias
        }
        for attr in item {
            if attr.id >= n_attrs {
                continue; // attribute unseen in training
            }
            for l in 0..n_labels {
                out[l] += weights[attr.id * n_labels + l] * attr.value;
            }
        }
    }

    /// Classifies one item: the best label id and its posterior
    /// probability. Ties break toward the lowest label id.
    pub fn predict(&self, item: &[Attr]) -> (usize, f64) {
        let l_len = self.n_labels;
        let mut scores = vec![0.0; l_len];
        Self::scores_into(&self.weights, l_len, self.n_attrs, item, &mut scores);
        let mut best = 0;
        for l in 1..l_len {
            if scores[l] > scores[best] {
                best = l;
            }
        }
        let max = scores[best];
        let z: f64 = scores.iter().map(|s| (s - max).exp()).sum();
        (best, 1.0 / z)
    }

    /// Trains on the dataset flattened to independent positions, minimizing
    /// the softmax negative log-likelihood with L2 strength `c2`. Returns
    /// the model and whether the optimizer converged.
    pub fn train(ds: &Dataset, params: &LbfgsParams, c2: f64) -> (Self, bool) {
        let l_len = ds.num_labels();
        let a_len = ds.num_attrs();
        let k = (a_len + 1) * l_len;
        log::info!(
            "maxent training: {} positions, {} weights",
            ds.total_items(),
            k
        );

        let mut scores = vec![0.0; l_len];
        let sol = lbfgs::minimize(
            |w, g| {
                for v in g.iter_mut() {
                    *v = 0.0;
                }
                let mut nll = 0.0;
                for seq in &ds.instances {
                    for (item, &gold) in seq.items.iter().zip(&seq.labels) {
                        Self::scores_into(w, l_len, a_len, item, &mut scores);
                        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                        let z: f64 = scores.iter().map(|s| (s - max).exp()).sum();
                        let logz = max + z.ln();
                        nll -= scores[gold] - logz;
                        for l in 0..l_len {
                            let p = (scores[l] - logz).exp();
                            let err = p - if l == gold { 1.0 } else { 0.0 };
                            g[a_len * l_len + l] += err;
                            for attr in item {
                                g[attr.id * l_len + l] += err * attr.value;
                            }
                        }
                    }
                }
                nll + lbfgs::l2_penalty(c2, w, g)
            },
            vec![0.0; k],
            params,
        );
        log::info!(
            "maxent training finished: objective {:.6}, {} iterations, converged: {}",
            sol.fx,
            sol.iterations,
            sol.converged
        );
        (
            Self {
                weights: sol.x,
                n_attrs: a_len,
                n_labels: l_len,
            },
            sol.converged,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::dataset::{build_dataset, Dataset};

    fn toy_dataset() -> (Dataset, Alphabet, Alphabet) {
        let mut labels = Alphabet::new();
        let mut attrs = Alphabet::new();
        let featurized = vec![(
            vec![
                ["W=hello"].iter().map(|s| s.to_string()).collect(),
                ["W=world"].iter().map(|s| s.to_string()).collect(),
            ],
            vec!["P".to_string(), "Q".to_string()],
        )];
        let ds = build_dataset(&featurized, &mut labels, &mut attrs);
        (ds, labels, attrs)
    }

    #[test]
    fn fits_separable_data() {
        let (ds, labels, _) = toy_dataset();
        let (model, converged) = MaxEntModel::train(&ds, &LbfgsParams::default(), 0.1);
        assert!(converged);
        let (p, conf_p) = model.predict(&[Attr::new(0, 1.0)]);
        let (q, conf_q) = model.predict(&[Attr::new(1, 1.0)]);
        assert_eq!(labels.to_id("P"), Some(p));
        assert_eq!(labels.to_id("Q"), Some(q));
        assert!(conf_p > 0.5 && conf_p <= 1.0);
        assert!(conf_q > 0.5 && conf_q <= 1.0);
    }

    #[test]
    fn unknown_attributes_are_ignored() {
        let (ds, _, _) = toy_dataset();
        let (model, _) = MaxEntModel::train(&ds, &LbfgsParams::default(), 0.1);
        let (_, conf) = model.predict(&[Attr::new(999, 1.0)]);
        assert!(conf > 0.0 && conf <= 1.0);
    }
}
