//! Fixtures shared by the unit tests.

use candle_core::{Device, Tensor};
use candle_nn::VarMap;

use crate::config::{AttentionKind, ModelConfig};
use crate::error::Result;
use crate::model::{build_tagger, Tagger};

/// Vocabulary of 10 words, 12 labels, begin 1, background 4, narrow layers.
pub(crate) fn small_config(attention: Option<AttentionKind>) -> ModelConfig {
    ModelConfig::new()
        .with_vocab(10, 12)
        .with_dims(6, 5, 4)
        .with_reserved_labels(1, 4)
        .with_attention(attention)
}

/// Tagger whose parameters depend only on their names and shapes, so two
/// calls with the same config produce identical models.
pub(crate) fn fixed_tagger(config: &ModelConfig) -> Result<(VarMap, Tagger)> {
    let (varmap, tagger) = build_tagger(config, &Device::Cpu)?;
    {
        let vars = varmap.data().lock().expect("varmap lock");
        for (name, var) in vars.iter() {
            let seed = name.bytes().map(f32::from).sum::<f32>() * 0.013;
            let count = var.elem_count();
            let values: Vec<f32> = (0..count)
                .map(|i| (seed + 0.37 * i as f32).sin() * 0.4)
                .collect();
            var.set(&Tensor::from_vec(values, var.dims(), &Device::Cpu)?)?;
        }
    }
    Ok((varmap, tagger))
}
