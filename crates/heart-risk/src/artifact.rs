//! Versioned artifact files
//!
//! Transform and classifier artifacts are JSON documents exported by the
//! training notebook. Each load records a SHA-256 fingerprint of the raw
//! bytes so operators can tell which artifact version is live.

use crate::RiskError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Identity of a loaded artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    /// Artifact kind, e.g. "transform"
    pub artifact: String,
    /// Source path, or "<memory>" for in-memory artifacts
    pub source: String,
    /// Hex-encoded SHA-256 of the artifact bytes
    pub sha256: String,
}

impl Fingerprint {
    /// Fingerprint raw artifact bytes
    pub fn of_bytes(artifact: &str, source: &str, bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Fingerprint {
            artifact: artifact.to_string(),
            source: source.to_string(),
            sha256: hex::encode(hasher.finalize()),
        }
    }

    /// First 12 hex characters, for log lines
    pub fn short(&self) -> &str {
        &self.sha256[..12.min(self.sha256.len())]
    }
}

/// Parse an artifact from JSON bytes
pub fn parse_json<T: DeserializeOwned>(
    artifact: &str,
    source: &str,
    bytes: &[u8],
) -> Result<(T, Fingerprint), RiskError> {
    let value = serde_json::from_slice(bytes).map_err(|e| RiskError::ArtifactLoad {
        artifact: artifact.to_string(),
        message: format!("Failed to parse {} JSON: {}", source, e),
    })?;
    Ok((value, Fingerprint::of_bytes(artifact, source, bytes)))
}

/// Read and parse a JSON artifact file
pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(
    artifact: &str,
    path: P,
) -> Result<(T, Fingerprint), RiskError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| RiskError::ArtifactLoad {
        artifact: artifact.to_string(),
        message: format!("Failed to open {}: {}", path.display(), e),
    })?;

    let (value, fingerprint) = parse_json(artifact, &path.display().to_string(), &bytes)?;
    log::info!(
        "Loaded {} artifact {} (sha256 {})",
        artifact,
        path.display(),
        fingerprint.short()
    );
    Ok((value, fingerprint))
}
