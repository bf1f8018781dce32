//! Application manifests and their approval
//!
//! A manifest lists the capabilities an application asks for. The core never
//! interprets it; it only identifies it by digest and asks an approver.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tracing::warn;

use crate::types::ApplicationInfo;

/// Opaque capability declaration of an application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    bytes: Vec<u8>,
}

impl Manifest {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex-encoded SHA-256 of the manifest bytes.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}

/// Decides whether the manifest an application presents during claim is
/// acceptable.
pub trait ManifestApprover: Send + Sync {
    fn approve_manifest(&self, app: &ApplicationInfo, manifest: &Manifest) -> bool;
}

impl<F> ManifestApprover for F
where
    F: Fn(&ApplicationInfo, &Manifest) -> bool + Send + Sync,
{
    fn approve_manifest(&self, app: &ApplicationInfo, manifest: &Manifest) -> bool {
        self(app, manifest)
    }
}

/// Approves manifests by digest allow-list, or everything when `auto_approve`
/// is set.
#[derive(Debug, Clone, Default)]
pub struct DigestApprover {
    auto_approve: bool,
    trusted: HashSet<String>,
}

impl DigestApprover {
    pub fn new(auto_approve: bool, trusted_digests: impl IntoIterator<Item = String>) -> Self {
        Self {
            auto_approve,
            trusted: trusted_digests
                .into_iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn approve_all() -> Self {
        Self::new(true, Vec::new())
    }
}

impl ManifestApprover for DigestApprover {
    fn approve_manifest(&self, app: &ApplicationInfo, manifest: &Manifest) -> bool {
        if self.auto_approve {
            return true;
        }
        let digest = manifest.digest();
        let approved = self.trusted.contains(&digest);
        if !approved {
            warn!(app_id = %app.id, %digest, "Manifest digest not in trusted list");
        }
        approved
    }
}
