//! Categorical policy.
use crate::{
    model::SubModel,
    opt::{Optimizer, OptimizerConfig},
    util::{restore_vars, snapshot_vars, OutDim, VarSnapshot},
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{
    ops::{log_softmax, softmax},
    VarBuilder, VarMap,
};
use log::info;
use std::path::{Path, PathBuf};

/// Stochastic policy over a discrete action set.
///
/// The policy network outputs unnormalized logits, one per action.
pub struct Actor<P>
where
    P: SubModel<Input = Tensor, Output = Tensor>,
    P::Config: OutDim,
{
    varmap: VarMap,

    // Number of actions
    out_dim: usize,

    policy: P,
    opt: Optimizer,
}

impl<P> Actor<P>
where
    P: SubModel<Input = Tensor, Output = Tensor>,
    P::Config: OutDim,
{
    /// Constructs [`Actor`].
    pub fn build(policy_config: P::Config, opt_config: &OptimizerConfig, device: &Device) -> Result<Self> {
        let out_dim = policy_config.get_out_dim();
        let varmap = VarMap::new();
        let policy = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, device).set_prefix("actor");
            P::build(vb, policy_config)?
        };
        let opt = opt_config.build(varmap.all_vars())?;

        Ok(Self {
            varmap,
            out_dim,
            policy,
            opt,
        })
    }

    /// Returns logits of shape `(batch_size, n_actions)`.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let logits = self.policy.forward(x)?;
        debug_assert_eq!(logits.dims().len(), 2);
        debug_assert_eq!(logits.dims()[1], self.out_dim);
        Ok(logits)
    }

    /// Returns action probabilities of shape `(batch_size, n_actions)`.
    pub fn probs(&self, x: &Tensor) -> Result<Tensor> {
        Ok(softmax(&self.forward(x)?, D::Minus1)?)
    }

    /// Returns the log-probabilities of the given actions, shape `(batch_size,)`.
    ///
    /// `act` is a `u32` tensor of shape `(batch_size,)`.
    pub fn logp(&self, x: &Tensor, act: &Tensor) -> Result<Tensor> {
        let logp = log_softmax(&self.forward(x)?, D::Minus1)?;
        Ok(logp.gather(&act.unsqueeze(1)?, 1)?.squeeze(1)?)
    }

    /// Switches the policy network between training and evaluation mode.
    pub fn set_train(&mut self, train: bool) {
        self.policy.set_train(train);
    }

    /// Backward step for all variables in the policy network.
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
        info!("Save actor parameters to {:?}", path);

        Ok(path)
    }

    /// Load variables from prefix + ".safetensors".
    pub fn load(&mut self, prefix: impl AsRef<Path>) -> Result<()> {
        let mut path = PathBuf::from(prefix.as_ref());
        path.set_extension("safetensors");
        self.varmap.load(&path)?;
        info!("Load actor parameters from {:?}", path);

        Ok(())
    }
}
