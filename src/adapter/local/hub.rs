//! Hugging Face Hub downloads for the local backends.

use std::collections::BTreeSet;
use std::path::PathBuf;

use hf_hub::api::sync::{ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use tracing::debug;

use crate::error::{ChatError, Result};

/// Open a model repository, authenticated when `token` is set.
pub(crate) fn open_repo(repo_id: &str, revision: Option<&str>, token: Option<&str>) -> Result<ApiRepo> {
    let api = ApiBuilder::new()
        .with_token(token.map(str::to_owned))
        .with_progress(false)
        .build()?;
    let repo = match revision {
        Some(rev) => Repo::with_revision(repo_id.to_string(), RepoType::Model, rev.to_string()),
        None => Repo::model(repo_id.to_string()),
    };
    Ok(api.repo(repo))
}

/// Fetch `filename`, reusing the local cache.
pub(crate) fn fetch(repo: &ApiRepo, filename: &str) -> Result<PathBuf> {
    debug!(filename, "fetching from hub");
    Ok(repo.get(filename)?)
}

/// Fetch every safetensors shard of a model, sharded or not.
pub(crate) fn safetensors_files(repo: &ApiRepo) -> Result<Vec<PathBuf>> {
    let index = match repo.get("model.safetensors.index.json") {
        Ok(index) => index,
        Err(_) => return Ok(vec![fetch(repo, "model.safetensors")?]),
    };

    let index: serde_json::Value = serde_json::from_slice(&std::fs::read(index)?)?;
    let weight_map = index
        .get("weight_map")
        .and_then(|m| m.as_object())
        .ok_or_else(|| ChatError::Hub("safetensors index has no weight_map".into()))?;
    let shards: BTreeSet<&str> = weight_map.values().filter_map(|v| v.as_str()).collect();
    shards.into_iter().map(|shard| fetch(repo, shard)).collect()
}
