//! Fan-in coordination over shared storage.
//!
//! Completion is recomputed from the storage listing on every check, never
//! tracked in a counter: each worker writes only its own uniquely-named
//! partial file, so retried or duplicated workers simply overwrite their
//! own output and re-run the same convergent check. The finalise marker
//! write is idempotent.

use std::collections::BTreeMap;

use tracing::{debug, info};

use advariant_models::naming;
use advariant_storage::StorageClient;

use crate::error::WorkerResult;

/// Check whether every expected partial exists, and if so write the
/// finalise trigger marker.
///
/// Returns whether the marker was written this call.
pub async fn check_finalise(
    storage: &StorageClient,
    folder: &str,
    total: u32,
) -> WorkerResult<bool> {
    let rendered = storage
        .list(&format!("{folder}/"), Some(naming::COMBINATIONS_FILE))
        .await?;

    debug!(
        folder,
        rendered = rendered.len(),
        expected = total,
        "Fan-in completion check"
    );

    if rendered.len() as u32 != total {
        return Ok(false);
    }

    let marker = naming::finalise_trigger_file(total);
    storage
        .upload_bytes(Vec::new(), &format!("{folder}/{marker}"), "application/json")
        .await?;

    info!(folder, "All variants rendered; finalise marker written");
    Ok(true)
}

/// Merge partial result files into the combined document.
///
/// Each partial is a map from combo key to rendered combo; the union keeps
/// the last write for a key. Keys are expected disjoint in normal
/// operation. Output formatting is stable so repeated merges over the same
/// storage state are byte-identical.
pub fn merge_partials(partials: &[Vec<u8>]) -> WorkerResult<String> {
    let mut merged: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    for partial in partials {
        let map: BTreeMap<String, serde_json::Value> = serde_json::from_slice(partial)?;
        merged.extend(map);
    }
    Ok(serde_json::to_string_pretty(&merged)?)
}

/// Merge every partial under the batch folder and upload the combined
/// result file.
pub async fn finalise_render(storage: &StorageClient, folder: &str) -> WorkerResult<()> {
    info!(folder, "Finalising render");

    let objects = storage
        .list(&format!("{folder}/"), Some(naming::COMBINATIONS_FILE))
        .await?;

    let mut partials = Vec::with_capacity(objects.len());
    for object in &objects {
        if let Some(bytes) = storage.download_bytes(&object.key).await? {
            partials.push(bytes);
        }
    }

    let combined = merge_partials(&partials)?;
    storage
        .upload_bytes(
            combined.into_bytes(),
            &format!("{folder}/{}", naming::COMBINATIONS_FILE),
            "application/json",
        )
        .await?;

    info!(folder, "Rendering completed successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(key: &str, title: &str) -> Vec<u8> {
        format!(r#"{{"{key}": {{"title": "{title}", "score": 1.0}}}}"#).into_bytes()
    }

    #[test]
    fn test_merge_unions_disjoint_keys() {
        let merged = merge_partials(&[partial("_1", "A"), partial("_2", "B")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(value["_1"]["title"], "A");
        assert_eq!(value["_2"]["title"], "B");
    }

    #[test]
    fn test_merge_last_write_wins() {
        let merged = merge_partials(&[partial("_1", "old"), partial("_1", "new")]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&merged).unwrap();
        assert_eq!(value["_1"]["title"], "new");
    }

    #[test]
    fn test_merge_is_deterministic() {
        let inputs = vec![partial("_2", "B"), partial("_1", "A"), partial("_3", "C")];
        let first = merge_partials(&inputs).unwrap();
        let second = merge_partials(&inputs).unwrap();
        assert_eq!(first, second);

        // Merging the previous combined output back in changes nothing.
        let with_combined = {
            let mut inputs = inputs.clone();
            inputs.push(first.clone().into_bytes());
            merge_partials(&inputs).unwrap()
        };
        assert_eq!(first, with_combined);
    }

    #[test]
    fn test_merge_rejects_malformed_partial() {
        assert!(merge_partials(&[b"not json".to_vec()]).is_err());
    }
}
