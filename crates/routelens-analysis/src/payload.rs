use chrono::{SecondsFormat, Utc};
use routelens_core::{
    payload_file_name, AnalysisPayload, Endpoint, FunctionReport, RefinedLogic, Result,
    RouteLensError, SanitizedCode,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Pure assembly of the persisted analysis request. No I/O.
pub fn build_payload(
    endpoint: &Endpoint,
    function_name: &str,
    is_async: bool,
    lines: u32,
    refined: &RefinedLogic,
    sanitized: &SanitizedCode,
    metadata: HashMap<String, serde_json::Value>,
) -> AnalysisPayload {
    AnalysisPayload {
        endpoint: endpoint.clone(),
        function: FunctionReport {
            name: function_name.to_string(),
            cleaned_code: refined.cleaned_code.clone(),
            sanitized_code: sanitized.safe_code.clone(),
            is_async,
            lines,
        },
        metadata,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Persist one payload under `dir`, creating the directory if absent.
/// The document is written to a `.tmp` sibling and renamed into place, so a
/// concurrent reader of the directory never observes a partial artifact.
/// Persistence failures are fatal to the run.
pub async fn save_payload(payload: &AnalysisPayload, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| RouteLensError::Persistence(format!("creating {}: {}", dir.display(), e)))?;

    let final_path = dir.join(payload_file_name(&payload.endpoint.handler_name));
    let document = serde_json::to_vec_pretty(payload)?;
    atomic_publish(&final_path, &document).await?;
    Ok(final_path)
}

/// Write-to-temp-then-rename publish shared by every artifact store.
pub async fn atomic_publish(final_path: &Path, document: &[u8]) -> Result<()> {
    let mut tmp_path = final_path.to_path_buf();
    tmp_path.set_extension("json.tmp");

    fs::write(&tmp_path, document).await.map_err(|e| {
        RouteLensError::Persistence(format!("writing {}: {}", tmp_path.display(), e))
    })?;
    fs::rename(&tmp_path, final_path).await.map_err(|e| {
        RouteLensError::Persistence(format!("publishing {}: {}", final_path.display(), e))
    })?;
    Ok(())
}

/// Read every payload artifact in `dir` for the review sweep. Entries that
/// cannot be read or decoded are skipped with a warning so one damaged file
/// cannot block the rest of the batch.
pub async fn load_payloads(dir: &Path) -> Result<Vec<(PathBuf, AnalysisPayload)>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("payload directory {} not readable: {}", dir.display(), e);
            return Ok(Vec::new());
        }
    };

    let mut payloads = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("skipping unreadable payload {}: {}", path.display(), e);
                continue;
            }
        };
        match serde_json::from_slice::<AnalysisPayload>(&bytes) {
            Ok(payload) => payloads.push((path, payload)),
            Err(e) => warn!("skipping undecodable payload {}: {}", path.display(), e),
        }
    }
    payloads.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(payloads)
}

/// Remove every artifact in the request directory so a new run only sweeps
/// its own payloads. Missing directory is fine.
pub async fn clear_payload_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(RouteLensError::Persistence(format!(
                "clearing {}: {}",
                dir.display(),
                e
            )))
        }
    }
    fs::create_dir_all(dir)
        .await
        .map_err(|e| RouteLensError::Persistence(format!("creating {}: {}", dir.display(), e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use routelens_core::HttpMethod;
    use tempfile::TempDir;

    fn sample_payload() -> AnalysisPayload {
        let endpoint = Endpoint {
            method: HttpMethod::Get,
            path: "/users/:id".into(),
            handler_name: "getUser".into(),
            source_file_ref: "user.routes.js".into(),
        };
        let refined = RefinedLogic {
            cleaned_code: "function getUser(req, res) { res.json({}); }".into(),
            summary: "Handler getUser(req, res).".into(),
        };
        let sanitized = SanitizedCode {
            safe_code: refined.cleaned_code.clone(),
            note: "No sensitive literals detected.".into(),
        };
        build_payload(
            &endpoint,
            "getUser",
            false,
            1,
            &refined,
            &sanitized,
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let payload = sample_payload();
        let path = save_payload(&payload, dir.path()).await.unwrap();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("getUser_"));

        let loaded = load_payloads(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].1.endpoint.handler_name, "getUser");
    }

    #[tokio::test]
    async fn no_tmp_artifacts_remain_after_save() {
        let dir = TempDir::new().unwrap();
        save_payload(&sample_payload(), dir.path()).await.unwrap();
        let leftover: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftover.is_empty());
    }

    #[tokio::test]
    async fn loader_skips_damaged_files() {
        let dir = TempDir::new().unwrap();
        save_payload(&sample_payload(), dir.path()).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();

        let loaded = load_payloads(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[tokio::test]
    async fn clearing_recreates_an_empty_directory() {
        let dir = TempDir::new().unwrap();
        let payloads = dir.path().join("payloads");
        save_payload(&sample_payload(), &payloads).await.unwrap();
        clear_payload_dir(&payloads).await.unwrap();
        assert!(payloads.exists());
        assert_eq!(std::fs::read_dir(&payloads).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_payload_dir_is_empty_not_error() {
        let loaded = load_payloads(Path::new("/no/such/payload/dir"))
            .await
            .unwrap();
        assert!(loaded.is_empty());
    }
}
