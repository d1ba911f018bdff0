use crate::manifest::{EnvironmentManifest, MarkerStatus};
use crate::types::Fingerprint;
use serde::Serialize;

/// Canonical, order-independent form of a manifest's dependency list and its
/// content hash.
///
/// This is the input to reuse lookups: two exports with the same dependency
/// set produce the same fingerprint regardless of line order, indentation,
/// blank lines, channels, environment name, or install prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedFingerprint {
    /// Sorted dependency lines joined by `\n`.
    pub canonical: String,
    pub fingerprint: Fingerprint,
    pub markers: MarkerStatus,
}

impl NormalizedFingerprint {
    pub fn dependency_count(&self) -> usize {
        if self.canonical.is_empty() {
            0
        } else {
            self.canonical.lines().count()
        }
    }
}

impl EnvironmentManifest {
    /// Normalize the dependency region and fingerprint it.
    pub fn normalize(&self) -> NormalizedFingerprint {
        let region = self.dependency_region();
        let mut lines = region.lines;
        lines.sort();
        let canonical = lines.join("\n");
        let fingerprint = fingerprint_bytes(canonical.as_bytes());
        NormalizedFingerprint {
            canonical,
            fingerprint,
            markers: region.markers,
        }
    }
}

/// Normalize raw manifest text. Never fails; see [`MarkerStatus`] for how
/// malformed exports are reported.
pub fn normalize(manifest: &str) -> NormalizedFingerprint {
    EnvironmentManifest::new(manifest).normalize()
}

fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    Fingerprint::new(blake3::hash(data).to_hex().to_string())
}
