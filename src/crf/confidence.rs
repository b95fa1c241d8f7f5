//! Constrained forward-backward confidence estimation.
//!
//! For a predicted segment `[start, stop]`, the confidence is the share of
//! the total path mass that agrees with the prediction on the segment:
//! `exp(logZ_constrained - logZ_free)`. The constrained sum runs over all
//! label sequences pinned to the predicted labels inside the segment and
//! unconstrained elsewhere, so it can never exceed the free sum and the
//! result lies in (0, 1], 1 meaning the segment captures effectively all
//! probability mass.

use super::context::Lattice;

/// Log-domain sum over paths agreeing with `predicted` on `[start, stop]`.
pub(crate) fn constrained_log_sum(
    ctx: &Lattice,
    predicted: &[usize],
    start: usize,
    stop: usize,
) -> f64 {
    ctx.log_forward_sum(|t, j| t < start || t > stop || j == predicted[t])
}

/// Confidence for one segment, given the precomputed free log-sum (the
/// caller computes it once per sentence and shares it across segments).
pub(crate) fn estimate(
    ctx: &Lattice,
    free_log_sum: f64,
    predicted: &[usize],
    start: usize,
    stop: usize,
) -> f64 {
    let constrained = constrained_log_sum(ctx, predicted, start, stop);
    // Rounding can push the difference a hair above zero; the value is
    // defined to lie in (0, 1].
    (constrained - free_log_sum).exp().min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crf::context::{CtxOpt, Lattice, ResetOpt};

    fn lattice(l: usize, t: usize) -> Lattice {
        let mut ctx = Lattice::new(CtxOpt::VITERBI, l, t);
        ctx.resize(t);
        ctx.reset(ResetOpt::STATE | ResetOpt::TRANS);
        for i in 0..l * l {
            ctx.trans[i] = 0.0;
        }
        ctx
    }

    #[test]
    fn single_label_vocabulary_gives_certainty() {
        // With one label every path is the predicted path.
        let ctx = lattice(1, 3);
        let predicted = vec![0, 0, 0];
        let free = ctx.log_forward_sum(|_, _| true);
        let c = estimate(&ctx, free, &predicted, 0, 2);
        assert!((c - 1.0).abs() < 1e-12, "{c}");
    }

    #[test]
    fn confidence_is_bounded() {
        let mut ctx = lattice(2, 4);
        ctx.state[1] = 2.0;
        ctx.state[2] = 0.5;
        ctx.state[7] = 1.0;
        let predicted = vec![1, 0, 0, 1];
        let free = ctx.log_forward_sum(|_, _| true);
        for start in 0..4 {
            for stop in start..4 {
                let c = estimate(&ctx, free, &predicted, start, stop);
                assert!(c > 0.0 && c <= 1.0, "segment [{start},{stop}]: {c}");
            }
        }
    }

    #[test]
    fn tighter_constraints_cost_mass() {
        let mut ctx = lattice(2, 3);
        ctx.state[0] = 1.0;
        ctx.state[3] = 0.5;
        let predicted = vec![0, 1, 0];
        let free = ctx.log_forward_sum(|_, _| true);
        let wide = estimate(&ctx, free, &predicted, 1, 1);
        let wider = estimate(&ctx, free, &predicted, 0, 2);
        assert!(wider <= wide + 1e-12, "{wider} vs {wide}");
    }
}
