use super::{json_pretty, EXIT_SUCCESS};
use envpack_schema::{EnvironmentManifest, MarkerStatus};
use std::io::Read;
use std::path::Path;

pub fn run(manifest: Option<&Path>, json: bool) -> Result<u8, String> {
    let text = read_manifest(manifest)?;
    let normalized = EnvironmentManifest::new(text).normalize();

    if normalized.markers != MarkerStatus::Complete {
        tracing::warn!("export is malformed: {}", normalized.markers);
    }

    if json {
        let dependencies: Vec<&str> = normalized.canonical.lines().collect();
        let payload = serde_json::json!({
            "fingerprint": normalized.fingerprint,
            "markers": normalized.markers,
            "dependency_count": normalized.dependency_count(),
            "dependencies": dependencies,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("fingerprint:  {}", normalized.fingerprint);
        println!("markers:      {}", normalized.markers);
        println!("dependencies: {}", normalized.dependency_count());
        for line in normalized.canonical.lines() {
            println!("  {line}");
        }
    }
    Ok(EXIT_SUCCESS)
}

fn read_manifest(path: Option<&Path>) -> Result<String, String> {
    match path {
        Some(p) if p != Path::new("-") => std::fs::read_to_string(p)
            .map_err(|e| format!("failed to read manifest {}: {e}", p.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| format!("failed to read manifest from stdin: {e}"))?;
            Ok(text)
        }
    }
}
