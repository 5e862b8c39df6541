//! Factorised Gaussian noisy linear layer.
//!
//! See Fortunato et al., "Noisy Networks for Exploration", 2017.
use anyhow::Result;
use candle_core::{DType, Tensor};
use candle_nn::{Init, VarBuilder};

/// Linear layer whose weights are perturbed with learnable factorised Gaussian noise.
///
/// `y = (w_mu + w_sigma * (f(e_out) f(e_in)^T)) x + b_mu + b_sigma * f(e_out)` with
/// `f(x) = sign(x) sqrt(|x|)` and `e_in`, `e_out` standard normal.
///
/// Noise is drawn on every forward call in training mode and dropped in evaluation mode,
/// where the layer reduces to a linear layer with the mean parameters. The noise comes
/// from candle's own generator and does not follow the agent's seed.
pub struct NoisyLinear {
    weight_mu: Tensor,
    weight_sigma: Tensor,
    bias_mu: Tensor,
    bias_sigma: Tensor,
    in_dim: usize,
    out_dim: usize,
}

fn scale_noise(x: Tensor) -> Result<Tensor> {
    let sign = x.ge(0f64)?.to_dtype(DType::F32)?.affine(2.0, -1.0)?;
    Ok((sign * x.abs()?.sqrt()?)?)
}

impl NoisyLinear {
    /// Creates the layer, registering its parameters through `vb`.
    pub fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        let bound = 1.0 / (in_dim as f64).sqrt();
        let mu_init = Init::Uniform {
            lo: -bound,
            up: bound,
        };
        let sigma_init = Init::Const(0.5 * bound);

        Ok(Self {
            weight_mu: vb.get_with_hints((out_dim, in_dim), "weight_mu", mu_init)?,
            weight_sigma: vb.get_with_hints((out_dim, in_dim), "weight_sigma", sigma_init)?,
            bias_mu: vb.get_with_hints(out_dim, "bias_mu", mu_init)?,
            bias_sigma: vb.get_with_hints(out_dim, "bias_sigma", sigma_init)?,
            in_dim,
            out_dim,
        })
    }

    /// Applies the layer to `xs` of shape `(batch_size, in_dim)`.
    pub fn forward(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let (weight, bias) = match train {
            false => (self.weight_mu.clone(), self.bias_mu.clone()),
            true => {
                let device = self.weight_mu.device();
                let eps_in = scale_noise(Tensor::randn(0f32, 1f32, self.in_dim, device)?)?;
                let eps_out = scale_noise(Tensor::randn(0f32, 1f32, self.out_dim, device)?)?;
                let eps_w = eps_out.unsqueeze(1)?.broadcast_mul(&eps_in.unsqueeze(0)?)?;
                let weight = (&self.weight_mu + (&self.weight_sigma * eps_w)?)?;
                let bias = (&self.bias_mu + (&self.bias_sigma * eps_out)?)?;
                (weight, bias)
            }
        };

        Ok(xs.matmul(&weight.t()?)?.broadcast_add(&bias)?)
    }
}
