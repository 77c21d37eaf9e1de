//! Classify Image Tool
//!
//! Runs the model ensemble on a single image file and prints the JSON report.
//!
//! Usage: classify-image <image-path> [models-dir]

use anyhow::{Context, Result};
use skin_lesion_ensemble::{
    config::AppConfig,
    logging,
    models::{loader::ModelLoader, InferenceEngine},
};
use tracing::info;

fn main() -> Result<()> {
    let mut config = AppConfig::load()?;

    let args: Vec<String> = std::env::args().collect();
    let Some(image_path) = args.get(1) else {
        let program = args.first().map(String::as_str).unwrap_or("classify-image");
        anyhow::bail!("usage: {} <image-path> [models-dir]", program);
    };
    if let Some(models_dir) = args.get(2) {
        config.models.models_dir = models_dir.clone();
    }

    logging::init(&config.logging)?;

    let image_bytes = std::fs::read(image_path)
        .with_context(|| format!("Failed to read image {}", image_path))?;

    let registry = ModelLoader::from_config(&config.models).load_all(&config.models.models_dir);
    info!(models = ?registry.model_names(), "Registry ready");

    let result = InferenceEngine::new(&config.models).run_ensemble(&image_bytes, &registry)?;
    let report = result.to_report()?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
