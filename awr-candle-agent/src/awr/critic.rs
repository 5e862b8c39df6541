//! State-value function.
use crate::{
    model::SubModel,
    opt::{Optimizer, OptimizerConfig},
    util::{restore_vars, snapshot_vars, OutDim, VarSnapshot},
};
use anyhow::Result;
use awr_core::error::AwrError;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use std::path::{Path, PathBuf};

/// State-value function `V(s)` with its own parameters and optimizer.
pub struct Critic<P>
where
    P: SubModel<Input = Tensor, Output = Tensor>,
    P::Config: OutDim,
{
    varmap: VarMap,
    value: P,
    opt: Optimizer,
}

impl<P> Critic<P>
where
    P: SubModel<Input = Tensor, Output = Tensor>,
    P::Config: OutDim,
{
    /// Constructs [`Critic`]. The value network must have a single output.
    pub fn build(value_config: P::Config, opt_config: &OptimizerConfig, device: &Device) -> Result<Self> {
        if value_config.get_out_dim() != 1 {
            return Err(AwrError::Config(format!(
                "value network must have a single output, got {}",
                value_config.get_out_dim()
            ))
            .into());
        }
        let varmap = VarMap::new();
        let value = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, device).set_prefix("critic");
            P::build(vb, value_config)?
        };
        let opt = opt_config.build(varmap.all_vars())?;

        Ok(Self { varmap, value, opt })
    }

    /// Returns state values of shape `(batch_size,)` for states of shape `(batch_size, dim)`.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        Ok(self.value.forward(x)?.squeeze(D::Minus1)?)
    }

    /// Backward step for all variables in the value network.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Copies the current parameters.
    pub fn snapshot(&self) -> Result<VarSnapshot> {
        snapshot_vars(&self.varmap)
    }

    /// Overwrites the parameters with a snapshot.
    pub fn restore(&self, snapshot: &VarSnapshot) -> Result<()> {
        restore_vars(&self.varmap, snapshot)
    }

    /// Save variables to prefix + ".safetensors".
    pub fn save(&self, prefix: impl AsRef<Path>) -> Result<PathBuf> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("safetensors");
        self.varmap.save(&path)?;
        info!("Save critic parameters to {:?}", path);

        Ok(path)
    }

    /// Load variables from prefix + ".safetensors".
    pub fn load(&mut self, prefix: impl AsRef<Path>) -> Result<()> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("safetensors");
        self.varmap.load(&path)?;
        info!("Load critic parameters from {:?}", path);

        Ok(())
    }
}
