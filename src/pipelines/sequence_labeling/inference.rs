use burn::{config::Config as _, tensor::backend::Backend};

use super::{model, Batcher, Item, Tagger, TaggerConfig};

/// Load a trained tagger and its configuration from an artifact directory.
/// Both the config file and the checkpoint must exist: evaluation never
/// falls back to a randomly initialized model.
pub fn load<B: Backend>(
    device: &B::Device,
    artifact_dir: &str,
) -> anyhow::Result<(Tagger<B>, TaggerConfig)> {
    let model_config = TaggerConfig::load(format!("{artifact_dir}/config.json").as_str())
        .map_err(|e| anyhow!("Unable to load config file: {}", e))?;

    let model = model::load_checkpoint(model_config.init::<B>(device), artifact_dir, device)?;

    Ok((model, model_config))
}

/// Predict tag sequences for a batch of items with a trained model
pub fn infer<B: Backend>(
    device: &B::Device,
    artifact_dir: &str,
    items: &[Item],
) -> anyhow::Result<Vec<Vec<usize>>> {
    let (model, model_config) = load::<B>(device, artifact_dir)?;

    let batcher = Batcher::<B>::new(&model_config, device.clone());
    let batch = batcher.batch(items)?;

    model.predict(&batch)
}
