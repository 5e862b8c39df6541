//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

/// Critic loss type.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum CriticLoss {
    /// Mean squared error.
    Mse,

    /// Smooth L1 loss.
    SmoothL1,
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> usize;

    /// Sets the  output dimension.
    fn set_out_dim(&mut self, v: usize);
}

/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor, candle_core::Error> {
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?;
    let m2 = m1.affine(-1.0, 1.0)?;
    let quad = ((&m1 * d.sqr()?)? * 0.5)?;
    let lin = (m2 * (&d - 0.5)?)?;
    (quad + lin)?.mean_all()
}

/// Deep copy of the variables in a [`VarMap`], identified by their names.
pub type VarSnapshot = Vec<(String, Tensor)>;

/// Copies the current values of all variables in `varmap`.
pub fn snapshot_vars(varmap: &VarMap) -> Result<VarSnapshot> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("VarMap lock is poisoned"))?;

    data.iter()
        .map(|(k, v)| Ok((k.clone(), v.as_tensor().copy()?)))
        .collect()
}

/// Writes the values in `snapshot` back into the variables of `varmap`.
pub fn restore_vars(varmap: &VarMap, snapshot: &VarSnapshot) -> Result<()> {
    let data = varmap
        .data()
        .lock()
        .map_err(|_| anyhow!("VarMap lock is poisoned"))?;

    for (k, t) in snapshot.iter() {
        let var = data
            .get(k)
            .ok_or_else(|| anyhow!("Variable {} is not in the VarMap", k))?;
        var.set(t)?;
    }

    Ok(())
}

/// Stacks state vectors of length `dim` into a tensor of shape `(states.len(), dim)`.
pub fn states_to_tensor(states: &[Vec<f32>], dim: usize, device: &Device) -> Result<Tensor> {
    let data = states.iter().flatten().copied().collect::<Vec<_>>();
    Ok(Tensor::from_vec(data, (states.len(), dim), device)?)
}

/// Returns `true` if all values are finite.
pub fn all_finite(xs: &[f32]) -> bool {
    xs.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_nn::Init;

    #[test]
    fn test_smooth_l1_loss() -> Result<()> {
        let x = Tensor::new(&[0.0f32, 0.0, 0.0], &Device::Cpu)?;
        let y = Tensor::new(&[0.5f32, -2.0, 3.0], &Device::Cpu)?;

        // (0.125 + 1.5 + 2.5) / 3
        let loss = smooth_l1_loss(&x, &y)?.to_scalar::<f32>()?;
        assert!((loss - 4.125 / 3.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_snapshot_and_restore() -> Result<()> {
        let varmap = VarMap::new();
        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        varmap.get((3,), "var1", init, DType::F32, &Device::Cpu)?;
        let before = varmap.all_vars()[0].as_tensor().to_vec1::<f32>()?;

        let snapshot = snapshot_vars(&varmap)?;
        let t = Tensor::new(&[7f32, 8.0, 9.0], &Device::Cpu)?;
        varmap.all_vars()[0].set(&t)?;
        assert_eq!(snapshot[0].1.to_vec1::<f32>()?, before);

        restore_vars(&varmap, &snapshot)?;
        assert_eq!(varmap.all_vars()[0].as_tensor().to_vec1::<f32>()?, before);
        Ok(())
    }

    #[test]
    fn test_states_to_tensor() -> Result<()> {
        let states = vec![vec![1f32, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]];
        let t = states_to_tensor(&states, 2, &Device::Cpu)?;
        assert_eq!(t.to_vec2::<f32>()?, states);
        assert!(states_to_tensor(&states, 3, &Device::Cpu).is_err());
        Ok(())
    }
}
