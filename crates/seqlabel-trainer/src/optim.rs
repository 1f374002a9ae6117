//! Parameter updates.

use candle_core::Tensor;
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};

/// Backpropagates a scalar loss and applies one update to the parameters the
/// implementor was built over.
pub trait GradientStep {
    fn accumulate_gradient_and_step(&mut self, loss: &Tensor) -> candle_core::Result<()>;
}

impl<O: Optimizer> GradientStep for O {
    fn accumulate_gradient_and_step(&mut self, loss: &Tensor) -> candle_core::Result<()> {
        self.backward_step(loss)
    }
}

/// Adam over every variable in `varmap` (AdamW with no weight decay).
pub fn adam(varmap: &VarMap, learning_rate: f64) -> candle_core::Result<AdamW> {
    AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        },
    )
}
