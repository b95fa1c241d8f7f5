use std::collections::HashMap;
use std::fmt::Display;
use std::iter::zip;

/// Maximal runs of an identical non-outside value: the segments of an IO
/// label sequence. Returns `(start, stop)` pairs, both inclusive. Shared by
/// the confidence estimator (over label ids) and the evaluator (over label
/// strings).
pub(crate) fn runs<T: PartialEq, F: Fn(&T) -> bool>(
    labels: &[T],
    is_outside: F,
) -> Vec<(usize, usize)> {
    let mut segments = Vec::new();
    let mut start: Option<usize> = None;
    for t in 0..labels.len() {
        let boundary = match start {
            Some(s) => is_outside(&labels[t]) || labels[t] != labels[s],
            None => false,
        };
        if boundary {
            segments.push((start.take().unwrap(), t - 1));
        }
        if start.is_none() && !is_outside(&labels[t]) {
            start = Some(t);
        }
    }
    if let Some(s) = start {
        segments.push((s, labels.len() - 1));
    }
    segments
}

/// Label-wise performance values.
#[derive(Debug, Default)]
struct LabelMeasure {
    /// Number of correct predictions.
    num_correct: usize,
    /// Number of occurrences of the label in the gold-standard data.
    num_observation: usize,
    /// Number of predictions.
    num_prediction: usize,
    precision: f64,
    recall: f64,
    fmeasure: f64,
}

/// Accumulating per-label precision/recall/F1 plus item-level and
/// sequence-level accuracy. Feed one sentence at a time with
/// [`Evaluation::accumulate`], then call [`Evaluation::evaluate`].
#[derive(Debug, Default)]
pub struct Evaluation {
    tbl: HashMap<String, LabelMeasure>,

    item_total_correct: usize,
    item_total_num: usize,
    item_accuracy: f64,

    inst_total_correct: usize,
    inst_total_num: usize,
    inst_accuracy: f64,

    macro_precision: f64,
    macro_recall: f64,
    macro_fmeasure: f64,
}

/// The headline numbers [`Evaluation::evaluate`] returns.
#[derive(Debug)]
pub struct Estimation {
    pub precision: f64,
    pub recall: f64,
    pub fmeasure: f64,
}

impl Evaluation {
    pub fn accumulate(&mut self, reference: &[&str], prediction: &[&str]) {
        debug_assert_eq!(reference.len(), prediction.len());
        let mut matched = 0;
        for (r, p) in zip(reference, prediction) {
            self.tbl.entry(r.to_string()).or_default().num_observation += 1;
            self.tbl.entry(p.to_string()).or_default().num_prediction += 1;
            if *r == *p {
                self.tbl.entry(r.to_string()).or_default().num_correct += 1;
                matched += 1;
            }
            self.item_total_num += 1;
        }
        if matched == prediction.len() {
            self.inst_total_correct += 1;
        }
        self.inst_total_num += 1;
    }

    pub fn evaluate(&mut self) -> Estimation {
        let mut num_labels = 0;
        for lev in self.tbl.values_mut() {
            if lev.num_observation == 0 {
                continue;
            }
            num_labels += 1;
            self.item_total_correct += lev.num_correct;

            lev.precision = 0.0;
            lev.recall = 0.0;
            lev.fmeasure = 0.0;
            if lev.num_prediction > 0 {
                lev.precision = lev.num_correct as f64 / lev.num_prediction as f64;
            }
            if lev.num_observation > 0 {
                lev.recall = lev.num_correct as f64 / lev.num_observation as f64;
            }
            if lev.precision + lev.recall > 0.0 {
                lev.fmeasure = lev.precision * lev.recall * 2.0 / (lev.precision + lev.recall);
            }
            self.macro_precision += lev.precision;
            self.macro_recall += lev.recall;
            self.macro_fmeasure += lev.fmeasure;
        }

        if num_labels > 0 {
            self.macro_precision /= num_labels as f64;
            self.macro_recall /= num_labels as f64;
            self.macro_fmeasure /= num_labels as f64;
        }
        if self.item_total_num > 0 {
            self.item_accuracy = self.item_total_correct as f64 / self.item_total_num as f64;
        }
        if self.inst_total_num > 0 {
            self.inst_accuracy = self.inst_total_correct as f64 / self.inst_total_num as f64;
        }
        Estimation {
            precision: self.macro_precision,
            recall: self.macro_recall,
            fmeasure: self.macro_fmeasure,
        }
    }

    pub fn item_accuracy(&self) -> f64 {
        self.item_accuracy
    }

    pub fn sequence_accuracy(&self) -> f64 {
        self.inst_accuracy
    }
}

impl Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Performance by label (#match, #model, #ref) (precision, recall, F1):"
        )?;
        for (label, lev) in &self.tbl {
            if lev.num_observation == 0 {
                writeln!(
                    f,
                    "\t{}: ({}, {}, {}) (******, ******, ******)",
                    label, lev.num_correct, lev.num_prediction, lev.num_observation
                )?;
            } else {
                writeln!(
                    f,
                    "\t{}: ({}, {}, {}) ({:.4}, {:.4}, {:.4})",
                    label,
                    lev.num_correct,
                    lev.num_prediction,
                    lev.num_observation,
                    lev.precision,
                    lev.recall,
                    lev.fmeasure
                )?;
            }
        }
        writeln!(
            f,
            "Macro-average precision, recall, F1: ({}, {}, {})",
            self.macro_precision, self.macro_recall, self.macro_fmeasure
        )?;
        writeln!(
            f,
            "Item accuracy: {}/{} => {}",
            self.item_total_correct, self.item_total_num, self.item_accuracy
        )?;
        writeln!(
            f,
            "Sequence accuracy: {}/{} => {}",
            self.inst_total_correct, self.inst_total_num, self.inst_accuracy
        )
    }
}
