//! Fixtures shared by unit tests across modules.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};

use crate::domain::Domain;
use crate::registry::{
    resolve_relative, MemoryAssetSource, ModelManifest, OutputActivation, PooledDenseModel,
};
use crate::tensor::InputRange;

pub const GENERIC_PATH: &str = "/models/generic/model.json";

/// PNG of a solid color.
pub fn png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb(rgb));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Model whose output ignores the image: zero kernel, `bias` as the output.
pub fn constant_model(bias: Vec<f32>, activation: OutputActivation) -> PooledDenseModel {
    let kernel = vec![0.0; 3 * bias.len()];
    PooledDenseModel::new(kernel, bias, InputRange::Unit, activation).unwrap()
}

/// Add `model` to `source` at `manifest_path`, with its shard alongside.
pub fn with_model(
    source: MemoryAssetSource,
    manifest_path: &str,
    model: &PooledDenseModel,
) -> MemoryAssetSource {
    let (json, shard) = model.to_assets("group1-shard1of1.bin").unwrap();
    let shard_path = resolve_relative(manifest_path, "group1-shard1of1.bin");
    source
        .with_asset(manifest_path, json)
        .with_asset(shard_path, shard)
}

pub fn with_primary(
    source: MemoryAssetSource,
    domain: Domain,
    model: &PooledDenseModel,
) -> MemoryAssetSource {
    with_model(source, &domain.asset_path(), model)
}

/// Primary model whose manifest declares `labels` for its output units.
pub fn with_labeled_primary(
    source: MemoryAssetSource,
    domain: Domain,
    model: &PooledDenseModel,
    labels: &[&str],
) -> MemoryAssetSource {
    let manifest_path = domain.asset_path();
    let (json, shard) = model.to_assets("group1-shard1of1.bin").unwrap();
    let mut manifest = ModelManifest::parse(&json).unwrap();
    manifest.labels = labels.iter().map(|l| l.to_string()).collect();
    let shard_path = resolve_relative(&manifest_path, "group1-shard1of1.bin");
    source
        .with_asset(manifest_path.as_str(), manifest.to_json().unwrap())
        .with_asset(shard_path, shard)
}

/// Generic 10-class classifier with fixed logits.
pub fn generic_model() -> PooledDenseModel {
    constant_model(
        vec![0.1, 2.0, 0.3, 0.2, 0.1, 0.0, 0.4, 0.5, 0.2, 0.1],
        OutputActivation::Logits,
    )
}
