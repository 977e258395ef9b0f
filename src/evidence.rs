// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 Vigil Project

//! Evidence construction helpers.
//!
//! Checks attach structured context through [`EvidenceBuilder`] so the
//! well-formedness rules live in one place: at least one populated field or
//! no evidence at all, and file hashes as streaming SHA-256 capped at 50 MiB.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::AuditError;
use crate::report::{Evidence, RiskLevel};

/// Files larger than this are not hashed.
pub const MAX_HASH_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Builds an [`Evidence`] value, dropping it entirely when nothing was
/// attached.
pub struct EvidenceBuilder {
    evidence: Evidence,
}

impl EvidenceBuilder {
    pub fn new(risk_level: RiskLevel) -> Self {
        Self {
            evidence: Evidence {
                file_path: None,
                file_hash: None,
                timestamp: None,
                network_conn: None,
                process_tree: None,
                risk_level,
            },
        }
    }

    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.evidence.file_path = Some(path.into());
        self
    }

    /// Record the path and its SHA-256. On read error or oversize the
    /// evidence keeps the path but omits the hash.
    pub fn hashed_file(mut self, path: &Path) -> Self {
        self.evidence.file_path = Some(path.display().to_string());
        match sha256_file(path) {
            Ok(hash) => self.evidence.file_hash = Some(hash),
            Err(e) => debug!(path = %path.display(), error = %e, "skipping file hash"),
        }
        self
    }

    pub fn timestamp(mut self, unix_ms: i64) -> Self {
        self.evidence.timestamp = Some(unix_ms);
        self
    }

    pub fn network_conn(mut self, conn: impl Into<String>) -> Self {
        self.evidence.network_conn = Some(conn.into());
        self
    }

    pub fn process_tree(mut self, lines: Vec<String>) -> Self {
        self.evidence.process_tree = Some(lines);
        self
    }

    /// Finish building; `None` when no contextual field was populated.
    pub fn build(self) -> Option<Evidence> {
        if self.evidence.is_empty() {
            None
        } else {
            Some(self.evidence)
        }
    }
}

/// Evidence consisting of just a file path.
pub fn file_evidence(path: impl Into<String>, risk_level: RiskLevel) -> Evidence {
    Evidence {
        file_path: Some(path.into()),
        file_hash: None,
        timestamp: None,
        network_conn: None,
        process_tree: None,
        risk_level,
    }
}

/// Streaming SHA-256 of a file, as 64 lowercase hex characters.
///
/// Refuses files above [`MAX_HASH_FILE_SIZE`].
pub fn sha256_file(path: &Path) -> Result<String, AuditError> {
    let metadata = std::fs::metadata(path)?;
    if metadata.len() > MAX_HASH_FILE_SIZE {
        return Err(AuditError::Internal(format!(
            "{}: {} bytes exceeds hash cap",
            path.display(),
            metadata.len()
        )));
    }

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hello world").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha256_is_lowercase_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, [0u8, 1, 2, 255]).unwrap();
        let hash = sha256_file(&path).unwrap();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_sha256_missing_file() {
        assert!(sha256_file(Path::new("/nonexistent/file")).is_err());
    }

    #[test]
    fn test_builder_empty_is_none() {
        assert!(EvidenceBuilder::new(RiskLevel::Low).build().is_none());
    }

    #[test]
    fn test_builder_single_field() {
        let evidence = EvidenceBuilder::new(RiskLevel::Medium)
            .network_conn("198.51.100.7:55012")
            .build()
            .unwrap();
        assert_eq!(evidence.network_conn.as_deref(), Some("198.51.100.7:55012"));
        assert_eq!(evidence.risk_level, RiskLevel::Medium);
        assert!(!evidence.is_empty());
    }

    #[test]
    fn test_builder_hashed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.sh");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        let evidence = EvidenceBuilder::new(RiskLevel::High)
            .hashed_file(&path)
            .build()
            .unwrap();
        assert!(evidence.file_path.is_some());
        assert_eq!(evidence.file_hash.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn test_builder_hash_error_keeps_path() {
        let evidence = EvidenceBuilder::new(RiskLevel::High)
            .hashed_file(Path::new("/nonexistent/payload.sh"))
            .build()
            .unwrap();
        assert_eq!(evidence.file_path.as_deref(), Some("/nonexistent/payload.sh"));
        assert!(evidence.file_hash.is_none());
    }
}
