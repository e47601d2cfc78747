//! Saving and restoring the parameter map in the safetensors format.
use std::path::Path;

use candle::{Error, Result};
use candle_nn::VarMap;

/// Write every variable of `varmap` to `path`, creating parent directories as needed.
pub fn save<P: AsRef<Path>>(varmap: &VarMap, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    varmap.save(path)?;
    tracing::info!(?path, "saved checkpoint");
    Ok(())
}

/// Overwrite the variables of `varmap` with the values stored in `path`.
///
/// Every variable must be present in the file with a matching shape, no shape checks happen
/// before the values are set.
pub fn restore<P: AsRef<Path>>(varmap: &mut VarMap, path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.is_file() {
        candle::bail!("checkpoint {path:?} does not exist")
    }
    varmap
        .load(path)
        .map_err(|err| Error::Msg(format!("cannot restore checkpoint {path:?}: {err}")))?;
    tracing::info!(?path, "restored checkpoint");
    Ok(())
}

/// The tensor names stored in a checkpoint, sorted.
pub fn tensor_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let buffer = std::fs::read(path)?;
    let tensors = safetensors::SafeTensors::deserialize(&buffer)
        .map_err(|err| Error::Msg(format!("cannot read checkpoint {path:?}: {err}")))?;
    let mut names = tensors.names().into_iter().cloned().collect::<Vec<_>>();
    names.sort();
    Ok(names)
}
