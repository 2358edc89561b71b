//! # Linear-Chain CRF
//!
//! Transition scores with `<START>`/`<STOP>` boundary tags, the forward
//! algorithm for the training loss, and Viterbi decoding for prediction.

use candle_core::{D, DType, Device, Result, Tensor};
use candle_nn::{Init, VarBuilder};

/// Score given to transitions that must never be taken.
const FORBIDDEN: f32 = -10000.0;

/// Viterbi decoder over `[seq_len][num_tags]` emission scores.
#[derive(Debug, Clone)]
pub struct ViterbiDecoder {
    num_tags: usize,
    boundary: Option<(usize, usize)>,
}

impl ViterbiDecoder {
    /// Create a new Viterbi decoder.
    ///
    /// # Arguments
    /// * `num_tags` - Number of tags, boundary tags included
    /// * `boundary` - `(start, stop)` tag ids whose transitions frame every sequence
    pub fn new(num_tags: usize, boundary: Option<(usize, usize)>) -> Self {
        Self { num_tags, boundary }
    }

    /// Decode the optimal tag sequence.
    ///
    /// `transitions[prev][curr]` scores moving from `prev` to `curr`.
    pub fn decode(&self, emissions: &[Vec<f32>], transitions: &[Vec<f32>]) -> Vec<usize> {
        let seq_len = emissions.len();
        if seq_len == 0 || self.num_tags == 0 {
            return Vec::new();
        }

        let mut score: Vec<f32> = (0..self.num_tags)
            .map(|tag| {
                let start = self.boundary.map_or(0.0, |(start, _)| transitions[start][tag]);
                start + emissions[0][tag]
            })
            .collect();
        let mut backptr: Vec<Vec<usize>> = Vec::with_capacity(seq_len.saturating_sub(1));

        for emission in &emissions[1..] {
            let mut next = vec![f32::NEG_INFINITY; self.num_tags];
            let mut from = vec![0usize; self.num_tags];
            for curr in 0..self.num_tags {
                for prev in 0..self.num_tags {
                    let candidate = score[prev] + transitions[prev][curr];
                    if candidate > next[curr] {
                        next[curr] = candidate;
                        from[curr] = prev;
                    }
                }
                next[curr] += emission[curr];
            }
            score = next;
            backptr.push(from);
        }

        if let Some((_, stop)) = self.boundary {
            for (tag, s) in score.iter_mut().enumerate() {
                *s += transitions[tag][stop];
            }
        }

        let mut best = 0;
        for tag in 1..self.num_tags {
            if score[tag] > score[best] {
                best = tag;
            }
        }

        let mut path = Vec::with_capacity(seq_len);
        path.push(best);
        for from in backptr.iter().rev() {
            best = from[best];
            path.push(best);
        }
        path.reverse();
        path
    }
}

/// Learnable transition matrix with boundary tags.
#[derive(Debug, Clone)]
pub struct CrfLayer {
    raw: Tensor,
    keep: Tensor,
    pinned: Tensor,
    num_tags: usize,
    start: usize,
    stop: usize,
}

fn log_sum_exp(xs: &Tensor, dim: usize) -> Result<Tensor> {
    let max = xs.max_keepdim(dim)?;
    let shifted = xs.broadcast_sub(&max)?.exp()?.sum_keepdim(dim)?.log()?;
    shifted.add(&max)?.squeeze(dim)
}

impl CrfLayer {
    /// Creates (or loads) the `transitions` tensor under `vb`.
    ///
    /// Transitions into `<START>` and out of `<STOP>` are pinned to a large
    /// negative score.
    pub fn new(vb: VarBuilder, num_tags: usize, start: usize, stop: usize) -> Result<Self> {
        let raw = vb.get_with_hints(
            (num_tags, num_tags),
            "transitions",
            Init::Randn {
                mean: 0.0,
                stdev: 1.0,
            },
        )?;
        let mut pinned = vec![0f32; num_tags * num_tags];
        let mut keep = vec![1f32; num_tags * num_tags];
        for i in 0..num_tags {
            for (from, to) in [(i, start), (stop, i)] {
                pinned[from * num_tags + to] = FORBIDDEN;
                keep[from * num_tags + to] = 0.0;
            }
        }
        let device = raw.device();
        let pinned = Tensor::from_vec(pinned, (num_tags, num_tags), device)?;
        let keep = Tensor::from_vec(keep, (num_tags, num_tags), device)?;
        Ok(Self {
            raw,
            keep,
            pinned,
            num_tags,
            start,
            stop,
        })
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Current transition scores, `[from, to]`, boundary constraints applied.
    pub fn transitions(&self) -> Result<Tensor> {
        self.raw.mul(&self.keep)?.add(&self.pinned)
    }

    /// Mean negative log-likelihood of `labels` (`[batch, seq]`, u32) under
    /// `emissions` (`[batch, seq, num_tags]`).
    pub fn neg_log_likelihood(&self, emissions: &Tensor, labels: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, num_tags) = emissions.dims3()?;
        if num_tags != self.num_tags {
            candle_core::bail!(
                "emission width {num_tags} does not match the CRF's {} tags",
                self.num_tags
            );
        }
        let transitions = self.transitions()?;
        let log_z = self.log_partition(emissions, &transitions)?;
        let gold = self.path_score(emissions, &transitions, labels, batch, seq_len)?;
        log_z.sub(&gold)?.mean_all()
    }

    fn log_partition(&self, emissions: &Tensor, transitions: &Tensor) -> Result<Tensor> {
        let (_, seq_len, _) = emissions.dims3()?;
        let start_row = transitions.get(self.start)?.unsqueeze(0)?;
        let mut alpha = emissions.narrow(1, 0, 1)?.squeeze(1)?.broadcast_add(&start_row)?;
        let trans = transitions.unsqueeze(0)?;
        for t in 1..seq_len {
            let emit = emissions.narrow(1, t, 1)?.squeeze(1)?;
            let scores = alpha.unsqueeze(2)?.broadcast_add(&trans)?;
            alpha = log_sum_exp(&scores, 1)?.add(&emit)?;
        }
        let stop_col = transitions.narrow(1, self.stop, 1)?.squeeze(1)?.unsqueeze(0)?;
        log_sum_exp(&alpha.broadcast_add(&stop_col)?, 1)
    }

    fn path_score(
        &self,
        emissions: &Tensor,
        transitions: &Tensor,
        labels: &Tensor,
        batch: usize,
        seq_len: usize,
    ) -> Result<Tensor> {
        let labels = labels.to_dtype(DType::U32)?;
        let emitted = emissions
            .gather(&labels.unsqueeze(2)?, 2)?
            .squeeze(2)?
            .sum(1)?;

        let rows = labels.to_vec2::<u32>()?;
        let n = self.num_tags as u32;
        let mut index = Vec::with_capacity(batch * (seq_len + 1));
        for row in &rows {
            let mut prev = self.start as u32;
            for &tag in row {
                index.push(prev * n + tag);
                prev = tag;
            }
            index.push(prev * n + self.stop as u32);
        }
        let index = Tensor::from_vec(index, batch * (seq_len + 1), emissions.device())?;
        let moved = transitions
            .flatten_all()?
            .index_select(&index, 0)?
            .reshape((batch, seq_len + 1))?
            .sum(1)?;
        emitted.add(&moved)
    }

    /// Best tag path for each sequence of the batch.
    pub fn decode(&self, emissions: &Tensor) -> Result<Vec<Vec<usize>>> {
        let emissions = emissions.to_dtype(DType::F32)?.to_vec3::<f32>()?;
        let transitions = self.transitions()?.to_dtype(DType::F32)?.to_vec2::<f32>()?;
        let decoder = ViterbiDecoder::new(self.num_tags, Some((self.start, self.stop)));
        Ok(emissions
            .iter()
            .map(|sequence| decoder.decode(sequence, &transitions))
            .collect())
    }
}

/// Index of the largest value along the last axis, flattened.
pub fn argmax_last(logits: &Tensor) -> Result<Vec<u32>> {
    logits.argmax(D::Minus1)?.flatten_all()?.to_vec1::<u32>()
}

/// Emissions on `device` from nested rows, for tests and single-sample decoding.
pub fn emissions_tensor(rows: &[Vec<Vec<f32>>], device: &Device) -> Result<Tensor> {
    let batch = rows.len();
    let seq_len = rows.first().map_or(0, Vec::len);
    let tags = rows
        .first()
        .and_then(|r| r.first())
        .map_or(0, Vec::len);
    let flat: Vec<f32> = rows.iter().flatten().flatten().copied().collect();
    Tensor::from_vec(flat, (batch, seq_len, tags), device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    fn transitions(num_tags: usize, value: f32) -> Vec<Vec<f32>> {
        vec![vec![value; num_tags]; num_tags]
    }

    #[test]
    fn viterbi_follows_emissions_when_transitions_are_flat() {
        let decoder = ViterbiDecoder::new(3, None);
        let emissions = vec![vec![0.1, 0.8, 0.1], vec![0.7, 0.2, 0.1], vec![0.0, 0.0, 0.9]];
        assert_eq!(decoder.decode(&emissions, &transitions(3, 0.0)), vec![1, 0, 2]);
    }

    #[test]
    fn viterbi_respects_forbidden_transitions() {
        let decoder = ViterbiDecoder::new(2, None);
        let mut trans = transitions(2, 0.0);
        trans[1][0] = -100.0;
        let emissions = vec![vec![0.0, 1.0], vec![1.0, 0.9]];
        assert_eq!(decoder.decode(&emissions, &trans), vec![1, 1]);
    }

    #[test]
    fn viterbi_uses_boundary_transitions() {
        // tags: 0, 1, start = 2, stop = 3
        let decoder = ViterbiDecoder::new(4, Some((2, 3)));
        let mut trans = transitions(4, 0.0);
        trans[2][0] = -50.0;
        let emissions = vec![vec![1.0, 0.5, -1e4, -1e4]];
        assert_eq!(decoder.decode(&emissions, &trans), vec![1]);
    }

    #[test]
    fn viterbi_empty() {
        let decoder = ViterbiDecoder::new(3, None);
        assert!(decoder.decode(&[], &transitions(3, 0.0)).is_empty());
    }

    #[test]
    fn nll_is_positive_and_finite() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let crf = CrfLayer::new(vb.pp("crf"), 4, 2, 3).unwrap();

        let emissions = Tensor::randn(0f32, 1.0, (2, 5, 4), &device).unwrap();
        let labels = Tensor::new(&[[0u32, 1, 1, 0, 0], [1, 1, 0, 0, 1]], &device).unwrap();
        let nll = crf
            .neg_log_likelihood(&emissions, &labels)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!(nll.is_finite());
        assert!(nll > 0.0);
    }

    #[test]
    fn single_step_nll_matches_softmax() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let crf = CrfLayer::new(vb, 4, 2, 3).unwrap();
        let trans = crf.transitions().unwrap().to_vec2::<f32>().unwrap();

        let emissions = emissions_tensor(&[vec![vec![0.3, -0.2, 0.0, 0.0]]], &device).unwrap();
        let labels = Tensor::new(&[[1u32]], &device).unwrap();
        let nll = crf
            .neg_log_likelihood(&emissions, &labels)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();

        let emit = [0.3f32, -0.2, 0.0, 0.0];
        let path = |tag: usize| trans[2][tag] + emit[tag] + trans[tag][3];
        let log_z = (0..4).map(|t| path(t).exp()).sum::<f32>().ln();
        assert!((nll - (log_z - path(1))).abs() < 1e-3);
    }

    #[test]
    fn decode_shapes() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let crf = CrfLayer::new(vb, 5, 3, 4).unwrap();
        let emissions = Tensor::randn(0f32, 1.0, (3, 7, 5), &device).unwrap();
        let paths = crf.decode(&emissions).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.len() == 7));
        assert!(paths.iter().flatten().all(|&tag| tag != 3 && tag != 4));
    }

    #[test]
    fn argmax_flattens() {
        let device = Device::Cpu;
        let logits = emissions_tensor(&[vec![vec![0.1, 0.9], vec![0.8, 0.2]]], &device).unwrap();
        assert_eq!(argmax_last(&logits).unwrap(), vec![1, 0]);
    }
}
