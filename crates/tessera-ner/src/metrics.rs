//! # Evaluation Metrics
//!
//! Accumulators fed one batch of logits and gold labels at a time, and the
//! report each prints at the end of evaluation.

use candle_core::{DType, Result, Tensor};

use crate::config::AssessmentMethod;
use crate::crf::{CrfLayer, argmax_last};

/// Line framing the evaluation report.
pub const REPORT_RULE: &str = "==============================================================";

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

/// Running state of one assessment method.
#[derive(Debug, Clone, PartialEq)]
pub enum Assessment {
    Accuracy {
        correct: usize,
        total: usize,
    },
    F1 {
        use_crf: bool,
        num_labels: usize,
        tp: usize,
        fp: usize,
        fn_: usize,
    },
    Mcc {
        tp: usize,
        tn: usize,
        fp: usize,
        fn_: usize,
    },
    SpearmanCorrelation {
        predictions: Vec<f64>,
        labels: Vec<f64>,
    },
}

impl Assessment {
    /// Accumulator for `method`. The CLUE benchmark writes a submission
    /// file instead of scoring and has none.
    pub fn new(method: AssessmentMethod, use_crf: bool, num_labels: usize) -> Option<Self> {
        match method {
            AssessmentMethod::Accuracy => Some(Self::Accuracy {
                correct: 0,
                total: 0,
            }),
            AssessmentMethod::F1 => Some(Self::F1 {
                use_crf,
                num_labels,
                tp: 0,
                fp: 0,
                fn_: 0,
            }),
            AssessmentMethod::Mcc => Some(Self::Mcc {
                tp: 0,
                tn: 0,
                fp: 0,
                fn_: 0,
            }),
            AssessmentMethod::SpearmanCorrelation => Some(Self::SpearmanCorrelation {
                predictions: Vec::new(),
                labels: Vec::new(),
            }),
            AssessmentMethod::ClueBenchmark => None,
        }
    }

    /// Folds one batch in. `logits` is `[batch, seq, num_labels]` and
    /// `labels` is `[batch, seq]`.
    pub fn update(&mut self, logits: &Tensor, labels: &Tensor, crf: Option<&CrfLayer>) -> Result<()> {
        let gold: Vec<u32> = labels.flatten_all()?.to_dtype(DType::U32)?.to_vec1()?;
        match self {
            Self::Accuracy { correct, total } => {
                let predicted = argmax_last(logits)?;
                *correct += predicted.iter().zip(&gold).filter(|(p, g)| p == g).count();
                *total += gold.len();
            }
            Self::F1 {
                use_crf,
                num_labels,
                tp,
                fp,
                fn_,
            } => {
                let predicted: Vec<u32> = match crf.filter(|_| *use_crf) {
                    Some(crf) => crf
                        .decode(logits)?
                        .into_iter()
                        .flatten()
                        .map(|tag| tag as u32)
                        .collect(),
                    None => argmax_last(logits)?,
                };
                let positive = |label: u32| label >= 1 && (label as usize) < *num_labels;
                for (&p, &g) in predicted.iter().zip(&gold) {
                    match (positive(p), positive(g)) {
                        (true, true) => *tp += 1,
                        (true, false) => *fp += 1,
                        (false, true) => *fn_ += 1,
                        (false, false) => {}
                    }
                }
            }
            Self::Mcc { tp, tn, fp, fn_ } => {
                let predicted = argmax_last(logits)?;
                for (&p, &g) in predicted.iter().zip(&gold) {
                    match (p == 1, g == 1) {
                        (true, true) => *tp += 1,
                        (false, false) => *tn += 1,
                        (true, false) => *fp += 1,
                        (false, true) => *fn_ += 1,
                    }
                }
            }
            Self::SpearmanCorrelation {
                predictions,
                labels: collected,
            } => {
                let width = logits.dims().last().copied().unwrap_or(1);
                if width == 1 {
                    let values: Vec<f32> = logits.flatten_all()?.to_dtype(DType::F32)?.to_vec1()?;
                    predictions.extend(values.into_iter().map(f64::from));
                } else {
                    predictions.extend(argmax_last(logits)?.into_iter().map(f64::from));
                }
                collected.extend(gold.iter().map(|&g| f64::from(g)));
            }
        }
        Ok(())
    }

    /// Matthews correlation coefficient of the binary counts.
    fn mcc(tp: usize, tn: usize, fp: usize, fn_: usize) -> f64 {
        let (tp, tn, fp, fn_) = (tp as f64, tn as f64, fp as f64, fn_ as f64);
        let den = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
        ratio(tp * tn - fp * fn_, den)
    }

    /// The report lines, without the framing rules.
    pub fn report(&self) -> Vec<String> {
        match self {
            Self::Accuracy { correct, total } => vec![format!(
                "acc_num {correct} , total_num {total}, accuracy {:.6}",
                ratio(*correct as f64, *total as f64)
            )],
            Self::F1 { tp, fp, fn_, .. } => {
                let (tp, fp, fn_) = (*tp as f64, *fp as f64, *fn_ as f64);
                vec![
                    format!("Precision {:.6} ", ratio(tp, tp + fp)),
                    format!("Recall {:.6} ", ratio(tp, tp + fn_)),
                    format!("F1 {:.6} ", ratio(2.0 * tp, 2.0 * tp + fp + fn_)),
                ]
            }
            Self::Mcc { tp, tn, fp, fn_ } => {
                vec![format!("MCC {:.6} ", Self::mcc(*tp, *tn, *fp, *fn_))]
            }
            Self::SpearmanCorrelation {
                predictions,
                labels,
            } => vec![format!(
                "Spearman Correlation is {:.6} ",
                spearman(predictions, labels)
            )],
        }
    }
}

/// 1-based ranks, ties sharing their average rank.
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let average = (i + j) as f64 / 2.0 + 1.0;
        for &index in &order[i..=j] {
            ranks[index] = average;
        }
        i = j + 1;
    }
    ranks
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return 0.0;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    ratio(cov, (var_x * var_y).sqrt())
}

/// Spearman rank correlation.
pub fn spearman(xs: &[f64], ys: &[f64]) -> f64 {
    pearson(&ranks(xs), &ranks(ys))
}
