use super::{MlpConfig, NoisyLinear};
use crate::model::SubModel;
use anyhow::Result;
use candle_core::{Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

enum Layer {
    Linear(Linear),
    Noisy(NoisyLinear),
}

impl Layer {
    fn forward(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            Self::Linear(l) => Ok(l.forward(xs)?),
            Self::Noisy(l) => l.forward(xs, train),
        }
    }
}

/// Returns the layers described by [`MlpConfig`].
fn create_layers(prefix: &str, vb: VarBuilder, config: &MlpConfig) -> Result<Vec<Layer>> {
    let vb = vb.pp(prefix);

    config
        .layer_dims()
        .into_iter()
        .enumerate()
        .map(|(i, (in_dim, out_dim))| {
            let vb = vb.pp(format!("ln{}", i));
            Ok(match config.noisy {
                false => Layer::Linear(linear(in_dim, out_dim, vb)?),
                true => Layer::Noisy(NoisyLinear::new(in_dim, out_dim, vb)?),
            })
        })
        .collect()
}

/// Multilayer perceptron with ReLU activation function.
///
/// The input is a tensor of shape `(batch_size, in_dim)`, the output has shape
/// `(batch_size, out_dim)`.
pub struct Mlp {
    config: MlpConfig,
    device: Device,
    layers: Vec<Layer>,
    train: bool,
}

impl SubModel for Mlp {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        let device = vb.device().clone();
        let layers = create_layers("mlp", vb, &config)?;

        Ok(Self {
            config,
            device,
            layers,
            train: false,
        })
    }

    fn forward(&self, xs: &Self::Input) -> Result<Tensor> {
        let n_layers = self.layers.len();
        let mut xs = xs.to_device(&self.device)?;

        for (i, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs, self.train)?;
            if i + 1 < n_layers || self.config.activation_out {
                xs = xs.relu()?;
            }
        }

        Ok(xs)
    }

    fn set_train(&mut self, train: bool) {
        self.train = train;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn build(config: MlpConfig) -> Result<(VarMap, Mlp)> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let mlp = Mlp::build(vb, config)?;
        Ok((varmap, mlp))
    }

    #[test]
    fn test_output_shape_and_parameters() -> Result<()> {
        let (varmap, mlp) = build(MlpConfig::new(4, vec![8, 8], 2, false))?;
        let xs = Tensor::zeros((5, 4), DType::F32, &Device::Cpu)?;
        assert_eq!(mlp.forward(&xs)?.dims(), &[5, 2]);

        // weight and bias for each of the three layers
        assert_eq!(varmap.all_vars().len(), 6);
        Ok(())
    }

    #[test]
    fn test_no_hidden_layer() -> Result<()> {
        let (_, mlp) = build(MlpConfig::new(3, vec![], 1, false))?;
        let xs = Tensor::ones((2, 3), DType::F32, &Device::Cpu)?;
        assert_eq!(mlp.forward(&xs)?.dims(), &[2, 1]);
        Ok(())
    }

    #[test]
    fn test_activation_out() -> Result<()> {
        let (_, mlp) = build(MlpConfig::new(3, vec![4], 6, true))?;
        let xs = Tensor::randn(0f32, 10f32, (16, 3), &Device::Cpu)?;
        let min = mlp.forward(&xs)?.flatten_all()?.min(0)?;
        assert!(min.to_scalar::<f32>()? >= 0.0);
        Ok(())
    }
}
