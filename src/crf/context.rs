use bitflags::bitflags;

bitflags! {
    /// Capabilities a lattice is prepared for; marginal buffers are only
    /// allocated when training asks for them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct CtxOpt: u8 {
        const VITERBI = 0x01;
        const MARGINALS = 0x02;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct ResetOpt: u8 {
        const STATE = 0x01;
        const TRANS = 0x02;
    }
}

/// The chain lattice for one instance: state and transition scores plus the
/// forward/backward workspace shared by Viterbi decoding, marginal
/// computation and the partition function.
///
/// Scores live in the logarithm domain. A transition the model has no
/// feature for stays at `-inf` and is therefore impossible in every
/// computation that runs over this context.
#[derive(Debug, Default)]
pub(crate) struct Lattice {
    flag: u8,
    /// The total number of distinct labels (L).
    pub num_labels: usize,
    /// The number of items (T) in the current instance.
    num_items: usize,
    /// High-water mark for the per-item buffers.
    cap_items: usize,
    /// Logarithm of the normalization factor, the total score of all paths.
    log_norm: f64,
    /// State scores: a [T][L] matrix, element [t][l] is the total score of
    /// state features associating label l with item t.
    pub state: Vec<f64>,
    /// Transition scores: a [L][L] matrix, element [i][j] is the score of
    /// the transition i -> j.
    pub trans: Vec<f64>,
    /// Forward scores: [t][l] is the total score of paths from BOS to (t, l).
    alpha_score: Vec<f64>,
    /// Backward scores: [t][l] is the total score of paths from (t, l) to EOS.
    beta_score: Vec<f64>,
    /// Per-item scaling coefficients for alpha/beta.
    scale_factor: Vec<f64>,
    /// Work space, one row of L.
    row: Vec<f64>,
    /// Backward edges: [t][j] is the label at t-1 yielding the best path
    /// into (t, j). Viterbi only.
    backward_edge: Vec<i32>,
    /// Exponentiated state scores. Marginals only.
    exp_state: Vec<f64>,
    /// Exponentiated transition scores. Marginals only.
    exp_trans: Vec<f64>,
    /// Model expectations of states: the marginal probability of (t, l).
    pub mexp_state: Vec<f64>,
    /// Model expectations of transitions, summed over positions.
    pub mexp_trans: Vec<f64>,
}

impl Lattice {
    pub fn new(flag: CtxOpt, num_labels: usize, num_items: usize) -> Self {
        let l = num_labels;
        let mut this = Self {
            flag: flag.bits(),
            trans: vec![f64::NEG_INFINITY; l * l],
            num_labels: l,
            ..Default::default()
        };
        if flag.contains(CtxOpt::MARGINALS) {
            this.exp_trans.resize(l * l, 0.0);
            this.mexp_trans.resize(l * l, 0.0);
        }
        this.resize(num_items);
        this
    }

    fn has(&self, opt: CtxOpt) -> bool {
        CtxOpt::from_bits_truncate(self.flag).contains(opt)
    }

    /// Grows the per-item buffers to hold an instance of length `T`.
    pub fn resize(&mut self, num_items: usize) {
        let l = self.num_labels;
        let t = num_items;
        self.num_items = t;
        if self.cap_items < t {
            self.alpha_score.resize(t * l, 0.0);
            self.beta_score.resize(t * l, 0.0);
            self.scale_factor.resize(t, 0.0);
            self.row.resize(l, 0.0);
            if self.has(CtxOpt::VITERBI) {
                self.backward_edge.resize(t * l, 0);
            }
            self.state.resize(t * l, 0.0);
            if self.has(CtxOpt::MARGINALS) {
                self.exp_state.resize(t * l, 0.0);
                self.mexp_state.resize(t * l, 0.0);
            }
            self.cap_items = t;
        }
    }

    pub fn reset(&mut self, opts: ResetOpt) {
        let t = self.num_items;
        let l = self.num_labels;
        if opts.contains(ResetOpt::STATE) {
            for v in self.state.iter_mut() {
                *v = 0.0;
            }
        }
        if opts.contains(ResetOpt::TRANS) {
            // No feature means no edge: impossible, not merely unweighted.
            for v in self.trans.iter_mut() {
                *v = f64::NEG_INFINITY;
            }
        }
        if self.has(CtxOpt::MARGINALS) {
            for i in 0..t * l {
                self.mexp_state[i] = 0.0;
            }
            for i in 0..l * l {
                self.mexp_trans[i] = 0.0;
            }
            self.log_norm = 0.0;
        }
    }

    pub fn exp_transition(&mut self) {
        let l = self.num_labels;
        for i in 0..l * l {
            self.exp_trans[i] = self.trans[i].exp();
        }
    }

    pub fn exp_state(&mut self) {
        let t = self.num_items;
        let l = self.num_labels;
        for i in 0..t * l {
            self.exp_state[i] = self.state[i].exp();
        }
    }

    /// Finds the best label sequence and writes it into `labels`, returning
    /// its (unnormalized) score. Ties break toward the lowest label id.
    pub fn viterbi(&mut self, labels: &mut [usize]) -> f64 {
        let t_len = self.num_items;
        let l = self.num_labels;
        assert_eq!(labels.len(), t_len, "label buffer length mismatch");

        // Scores at (0, *).
        for j in 0..l {
            self.alpha_score[j] = self.state[j];
        }
        // Scores at (t, *).
        for t in 1..t_len {
            for j in 0..l {
                let mut max_score = f64::NEG_INFINITY;
                let mut argmax_score = -1;
                for i in 0..l {
                    // Transit from (t-1, i) to (t, j).
                    let score = self.alpha_score[l * (t - 1) + i] + self.trans[l * i + j];
                    if max_score < score {
                        max_score = score;
                        argmax_score = i as i32;
                    }
                }
                if argmax_score >= 0 {
                    self.backward_edge[l * t + j] = argmax_score;
                    self.alpha_score[l * t + j] = max_score + self.state[l * t + j];
                } else {
                    // No possible way into (t, j).
                    self.backward_edge[l * t + j] = 0;
                    self.alpha_score[l * t + j] = f64::NEG_INFINITY;
                }
            }
        }

        // The node (T-1, i) reaching EOS with the maximum score.
        let mut max_score = f64::NEG_INFINITY;
        labels[t_len - 1] = 0;
        for i in 0..l {
            let prev = self.alpha_score[l * (t_len - 1) + i];
            if max_score < prev {
                max_score = prev;
                labels[t_len - 1] = i;
            }
        }
        // Trace the backward links.
        for t in (0..t_len - 1).rev() {
            let i = labels[t + 1];
            labels[t] = self.backward_edge[l * (t + 1) + i] as usize;
        }
        max_score
    }

    pub fn lognorm(&self) -> f64 {
        self.log_norm
    }

    /// Scaled forward pass; also computes the log partition function.
    pub fn alpha_score(&mut self) {
        let l = self.num_labels;
        let t_len = self.num_items;

        // alpha[0][j] = exp(state[0][j])
        for i in 0..l {
            self.alpha_score[i] = self.exp_state[i];
        }
        let mut sum: f64 = self.alpha_score[..l].iter().sum();
        self.scale_factor[0] = if sum != 0.0 { 1.0 / sum } else { 1.0 };
        for i in 0..l {
            self.alpha_score[i] *= self.scale_factor[0];
        }

        // alpha[t][j] = state[t][j] * sum_i alpha[t-1][i] * trans[i][j]
        for t in 1..t_len {
            for i in 0..l {
                self.alpha_score[l * t + i] = 0.0;
            }
            for i in 0..l {
                for j in 0..l {
                    self.alpha_score[l * t + j] +=
                        self.alpha_score[l * (t - 1) + i] * self.exp_trans[l * i + j];
                }
            }
            for i in 0..l {
                self.alpha_score[l * t + i] *= self.exp_state[l * t + i];
            }
            sum = self.alpha_score[l * t..l * (t + 1)].iter().sum();
            self.scale_factor[t] = if sum != 0.0 { 1.0 / sum } else { 1.0 };
            for i in 0..l {
                self.alpha_score[l * t + i] *= self.scale_factor[t];
            }
        }

        // norm = 1 / (C[0] * ... * C[T-1])
        self.log_norm = -self.scale_factor[..t_len].iter().map(|c| c.ln()).sum::<f64>();
    }

    /// Scaled backward pass; requires a prior [`Lattice::alpha_score`].
    pub fn beta_score(&mut self) {
        let t_len = self.num_items;
        let l = self.num_labels;

        for i in 0..l {
            self.beta_score[l * (t_len - 1) + i] = self.scale_factor[t_len - 1];
        }
        for t in (0..t_len - 1).rev() {
            for i in 0..l {
                self.row[i] =
                    self.beta_score[l * (t + 1) + i] * self.exp_state[l * (t + 1) + i];
            }
            for i in 0..l {
                let mut s = 0.0;
                for j in 0..l {
                    s += self.exp_trans[l * i + j] * self.row[j];
                }
                self.beta_score[l * t + i] = s * self.scale_factor[t];
            }
        }
    }

    /// State and transition expectations from the current alpha/beta.
    pub fn marginals(&mut self) {
        let l = self.num_labels;
        let t_len = self.num_items;

        // p(t,i) = fwd'[t][i] * bwd'[t][i] / C[t]
        for t in 0..t_len {
            for i in 0..l {
                self.mexp_state[l * t + i] = self.alpha_score[l * t + i]
                    * self.beta_score[l * t + i]
                    / self.scale_factor[t];
            }
        }

        // p(t,i,t+1,j) = fwd'[t][i] * edge[i][j] * state[t+1][j] * bwd'[t+1][j],
        // summed over t.
        for t in 0..t_len.saturating_sub(1) {
            for i in 0..l {
                self.row[i] =
                    self.beta_score[l * (t + 1) + i] * self.exp_state[l * (t + 1) + i];
            }
            for i in 0..l {
                for j in 0..l {
                    self.mexp_trans[l * i + j] += self.alpha_score[l * t + i]
                        * self.exp_trans[l * i + j]
                        * self.row[j];
                }
            }
        }
    }

    /// Log-domain score of one specific path.
    pub fn score(&self, labels: &[usize]) -> f64 {
        assert!(!labels.is_empty(), "empty labels");
        let l = self.num_labels;
        let t_len = self.num_items;

        let mut i = labels[0];
        let mut r = self.state[i];
        for t in 1..t_len {
            let j = labels[t];
            r += self.trans[l * i + j] + self.state[l * t + j];
            i = j;
        }
        r
    }

    /// Log-domain forward sum over all label sequences whose choice at each
    /// position satisfies `allowed`. With a constraint that admits every
    /// label everywhere this is the log partition function; restricting a
    /// span to the predicted labels yields the constrained lattice sum the
    /// confidence estimator divides by the free one.
    pub fn log_forward_sum<F: Fn(usize, usize) -> bool>(&self, allowed: F) -> f64 {
        let l = self.num_labels;
        let t_len = self.num_items;

        let mut prev = vec![f64::NEG_INFINITY; l];
        let mut curr = vec![f64::NEG_INFINITY; l];
        for j in 0..l {
            if allowed(0, j) {
                prev[j] = self.state[j];
            }
        }
        for t in 1..t_len {
            for j in 0..l {
                curr[j] = f64::NEG_INFINITY;
                if !allowed(t, j) {
                    continue;
                }
                let mut max = f64::NEG_INFINITY;
                for i in 0..l {
                    max = max.max(prev[i] + self.trans[l * i + j]);
                }
                if max == f64::NEG_INFINITY {
                    continue;
                }
                let mut sum = 0.0;
                for i in 0..l {
                    let v = prev[i] + self.trans[l * i + j];
                    if v != f64::NEG_INFINITY {
                        sum += (v - max).exp();
                    }
                }
                curr[j] = max + sum.ln() + self.state[l * t + j];
            }
            std::mem::swap(&mut prev, &mut curr);
        }

        let max = prev.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max == f64::NEG_INFINITY {
            return f64::NEG_INFINITY;
        }
        let sum: f64 = prev
            .iter()
            .filter(|v| **v != f64::NEG_INFINITY)
            .map(|v| (v - max).exp())
            .sum();
        max + sum.ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_label_lattice() -> Lattice {
        // L = 2, T = 3; all transitions possible with weight 0.
        let mut ctx = Lattice::new(CtxOpt::VITERBI | CtxOpt::MARGINALS, 2, 3);
        ctx.resize(3);
        ctx.reset(ResetOpt::STATE | ResetOpt::TRANS);
        for i in 0..4 {
            ctx.trans[i] = 0.0;
        }
        ctx
    }

    #[test]
    fn viterbi_follows_state_scores() {
        let mut ctx = two_label_lattice();
        // Label 1 preferred at t=0 and t=2, label 0 at t=1.
        ctx.state[0] = 0.0;
        ctx.state[1] = 2.0;
        ctx.state[2] = 1.0;
        ctx.state[3] = 0.0;
        ctx.state[4] = 0.0;
        ctx.state[5] = 3.0;
        let mut labels = vec![0; 3];
        let score = ctx.viterbi(&mut labels);
        assert_eq!(labels, vec![1, 0, 1]);
        assert!((score - 6.0).abs() < 1e-12);
    }

    #[test]
    fn viterbi_ties_break_low() {
        let mut ctx = two_label_lattice();
        let mut labels = vec![9; 3];
        ctx.viterbi(&mut labels);
        assert_eq!(labels, vec![0, 0, 0]);
    }

    #[test]
    fn impossible_transitions_are_never_taken() {
        let mut ctx = two_label_lattice();
        // Forbid 1 -> 1 and make label 1 attractive everywhere.
        ctx.trans[3] = f64::NEG_INFINITY;
        for t in 0..3 {
            ctx.state[2 * t] = 0.0;
            ctx.state[2 * t + 1] = 1.0;
        }
        let mut labels = vec![0; 3];
        ctx.viterbi(&mut labels);
        // The path must alternate away from 1 -> 1.
        for w in labels.windows(2) {
            assert!(!(w[0] == 1 && w[1] == 1), "{labels:?}");
        }
    }

    #[test]
    fn lognorm_matches_log_forward_sum() {
        let mut ctx = two_label_lattice();
        ctx.state[0] = 0.3;
        ctx.state[3] = -0.2;
        ctx.state[5] = 0.7;
        ctx.trans[1] = 0.5;
        ctx.exp_state();
        ctx.exp_transition();
        ctx.alpha_score();
        let free = ctx.log_forward_sum(|_, _| true);
        assert!((ctx.lognorm() - free).abs() < 1e-9, "{} vs {}", ctx.lognorm(), free);
    }

    #[test]
    fn constrained_sum_never_exceeds_free_sum() {
        let mut ctx = two_label_lattice();
        ctx.state[1] = 1.0;
        ctx.state[2] = 0.4;
        let free = ctx.log_forward_sum(|_, _| true);
        let constrained = ctx.log_forward_sum(|t, j| t != 1 || j == 0);
        assert!(constrained <= free + 1e-12);
    }
}
