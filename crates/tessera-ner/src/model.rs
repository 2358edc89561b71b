//! # BERT Token Classifier
//!
//! BERT encoder, dropout and a dense projection to per-token label scores,
//! optionally followed by a CRF over the label sequence.

use candle_core::{D, Module, ModuleT, Result, Tensor};
use candle_nn::{Dropout, Linear, VarBuilder};
use candle_transformers::models::bert::BertModel;

use crate::config::NetConfig;
use crate::crf::CrfLayer;

/// Dropout applied to the encoder output during training.
pub const DROPOUT_PROB: f32 = 0.1;

/// Token classifier used for both fine-tuning and evaluation.
pub struct BertNer {
    bert: BertModel,
    dropout: Dropout,
    dense: Linear,
    crf: Option<CrfLayer>,
    num_labels: usize,
}

impl BertNer {
    /// Builds the network under `vb`.
    ///
    /// With `crf_tags = Some((start, stop))` the label count must already
    /// include the two boundary tags.
    pub fn new(
        vb: VarBuilder,
        net: &NetConfig,
        num_labels: usize,
        crf_tags: Option<(usize, usize)>,
    ) -> Result<Self> {
        let bert = BertModel::load(vb.pp("bert"), &net.bert)?;
        let dense = candle_nn::linear(net.hidden_size, num_labels, vb.pp("dense_1"))?;
        let crf = match crf_tags {
            Some((start, stop)) => Some(CrfLayer::new(vb.pp("crf"), num_labels, start, stop)?),
            None => None,
        };
        Ok(Self {
            bert,
            dropout: Dropout::new(DROPOUT_PROB),
            dense,
            crf,
            num_labels,
        })
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn crf(&self) -> Option<&CrfLayer> {
        self.crf.as_ref()
    }

    /// Per-token label scores, `[batch, seq, num_labels]`.
    pub fn logits(
        &self,
        input_ids: &Tensor,
        input_mask: &Tensor,
        segment_ids: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let hidden = self.bert.forward(input_ids, segment_ids, Some(input_mask))?;
        let hidden = self.dropout.forward_t(&hidden, train)?;
        self.dense.forward(&hidden)
    }

    /// Training loss for one batch.
    pub fn loss(
        &self,
        input_ids: &Tensor,
        input_mask: &Tensor,
        segment_ids: &Tensor,
        label_ids: &Tensor,
    ) -> Result<Tensor> {
        let logits = self.logits(input_ids, input_mask, segment_ids, true)?;
        match &self.crf {
            Some(crf) => crf.neg_log_likelihood(&logits, label_ids),
            None => {
                let flat = logits.flatten_to(D::Minus2)?;
                candle_nn::loss::cross_entropy(&flat, &label_ids.flatten_all()?)
            }
        }
    }

    /// Evaluation-mode label scores.
    pub fn predict(
        &self,
        input_ids: &Tensor,
        input_mask: &Tensor,
        segment_ids: &Tensor,
    ) -> Result<Tensor> {
        self.logits(input_ids, input_mask, segment_ids, false)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    pub(crate) const TINY_CONFIG: &str = r#"{
        "vocab_size": 32,
        "hidden_size": 8,
        "num_hidden_layers": 1,
        "num_attention_heads": 2,
        "intermediate_size": 16,
        "hidden_act": "gelu",
        "hidden_dropout_prob": 0.1,
        "max_position_embeddings": 16,
        "type_vocab_size": 2,
        "initializer_range": 0.02,
        "layer_norm_eps": 1e-12,
        "pad_token_id": 0,
        "position_embedding_type": "absolute",
        "use_cache": false,
        "classifier_dropout": null,
        "model_type": "bert",
        "seq_length": 6
    }"#;

    pub(crate) fn tiny_net() -> NetConfig {
        NetConfig::from_json(TINY_CONFIG, "tiny").unwrap()
    }

    fn inputs(device: &Device) -> (Tensor, Tensor, Tensor, Tensor) {
        let ids = Tensor::new(&[[2u32, 5, 7, 9, 3, 0], [2, 4, 3, 0, 0, 0]], device).unwrap();
        let mask = Tensor::new(&[[1u32, 1, 1, 1, 1, 0], [1, 1, 1, 0, 0, 0]], device).unwrap();
        let segments = ids.zeros_like().unwrap();
        let labels = Tensor::new(&[[0u32, 1, 2, 0, 0, 0], [0, 1, 0, 0, 0, 0]], device).unwrap();
        (ids, mask, segments, labels)
    }

    #[test]
    fn logits_shape_and_softmax_loss() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = BertNer::new(vb, &tiny_net(), 3, None).unwrap();
        let (ids, mask, segments, labels) = inputs(&device);

        let logits = model.predict(&ids, &mask, &segments).unwrap();
        assert_eq!(logits.dims(), &[2, 6, 3]);

        let loss = model.loss(&ids, &mask, &segments, &labels).unwrap();
        let value = loss.to_scalar::<f32>().unwrap();
        assert!(value.is_finite() && value > 0.0);
        assert!(model.crf().is_none());
    }

    #[test]
    fn crf_loss_and_parameters() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = BertNer::new(vb, &tiny_net(), 5, Some((3, 4))).unwrap();
        let (ids, mask, segments, labels) = inputs(&device);

        let loss = model.loss(&ids, &mask, &segments, &labels).unwrap();
        assert!(loss.to_scalar::<f32>().unwrap().is_finite());

        let names: Vec<String> = varmap.data().lock().unwrap().keys().cloned().collect();
        assert!(names.iter().any(|n| n == "crf.transitions"));
        assert!(names.iter().any(|n| n == "dense_1.weight"));
        assert!(names.iter().any(|n| n.starts_with("bert.embeddings.")));

        let grads = loss.backward().unwrap();
        let data = varmap.data().lock().unwrap();
        assert!(grads.get(data["dense_1.weight"].as_tensor()).is_some());
        assert!(grads.get(data["crf.transitions"].as_tensor()).is_some());
    }
}
