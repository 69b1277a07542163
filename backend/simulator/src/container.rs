//! Digest-only signature container written as JSON.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use verilink_core::{
    CertificatePayload, ContainerError, ContainerService, PreparedSignature, SignaturePayload,
    SignedContainer, UploadedDocument,
};

const DIGEST_ALGORITHM: &str = "SHA-256";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainerRecord<'a> {
    file_name: &'a str,
    content_type: &'a str,
    document: String,
    digest: &'a str,
    digest_algorithm: &'a str,
    signature: &'a SignaturePayload,
    signer: &'a str,
    signed_at: DateTime<Utc>,
}

/// Signs `SHA-256(document || certificate)` and stores the result next to
/// the document as a JSON container.
#[derive(Debug, Clone)]
pub struct DigestContainerService {
    output_dir: PathBuf,
}

impl DigestContainerService {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl ContainerService for DigestContainerService {
    fn prepare(
        &self,
        document: &UploadedDocument,
        certificate: &CertificatePayload,
    ) -> Result<PreparedSignature, ContainerError> {
        if document.content.is_empty() {
            return Err(ContainerError::Unsupported(format!(
                "'{}' is empty",
                document.file_name
            )));
        }
        let mut hasher = Sha256::new();
        hasher.update(&document.content);
        hasher.update(certificate.value.as_bytes());

        Ok(PreparedSignature {
            digest: STANDARD.encode(hasher.finalize()),
            digest_algorithm: DIGEST_ALGORITHM.to_string(),
            document: document.clone(),
            certificate: certificate.clone(),
        })
    }

    async fn finalize(
        &self,
        prepared: &PreparedSignature,
        signature: &SignaturePayload,
    ) -> Result<SignedContainer, ContainerError> {
        if signature.value.is_empty() {
            return Err(ContainerError::InvalidSignature("empty signature value".into()));
        }

        let signed_at = Utc::now();
        let record = ContainerRecord {
            file_name: &prepared.document.file_name,
            content_type: &prepared.document.content_type,
            document: STANDARD.encode(&prepared.document.content),
            digest: &prepared.digest,
            digest_algorithm: &prepared.digest_algorithm,
            signature,
            signer: &prepared.certificate.subject,
            signed_at,
        };
        let body = serde_json::to_vec_pretty(&record).map_err(|e| ContainerError::Io(e.to_string()))?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| ContainerError::Io(e.to_string()))?;
        let path = self.output_dir.join(format!(
            "{}-{}.signed.json",
            sanitize(&prepared.document.file_name),
            Uuid::new_v4().simple()
        ));
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| ContainerError::Io(e.to_string()))?;

        info!(path = %path.display(), "Signed container written");
        Ok(SignedContainer {
            location: path.display().to_string(),
            signed_at,
        })
    }
}

/// Strip directories and anything that is not a plain file-name character.
fn sanitize(file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "document".into()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verilink_core::CertificateLevel;

    fn document(content: &[u8]) -> UploadedDocument {
        UploadedDocument {
            file_name: "contract.pdf".into(),
            content_type: "application/pdf".into(),
            content: content.to_vec(),
        }
    }

    fn certificate() -> CertificatePayload {
        CertificatePayload {
            value: "Y2VydA==".into(),
            certificate_level: CertificateLevel::Qualified,
            subject: "C=EE, SERIALNUMBER=PNOEE-30303039914".into(),
        }
    }

    #[test]
    fn prepare_rejects_empty_documents() {
        let service = DigestContainerService::new("unused");
        assert!(matches!(
            service.prepare(&document(b""), &certificate()),
            Err(ContainerError::Unsupported(_))
        ));
    }

    #[test]
    fn digest_binds_document_and_certificate() {
        let service = DigestContainerService::new("unused");
        let a = service.prepare(&document(b"one"), &certificate()).unwrap();
        let b = service.prepare(&document(b"two"), &certificate()).unwrap();
        assert_ne!(a.digest, b.digest);
        assert_eq!(a.digest_algorithm, "SHA-256");
    }

    #[tokio::test]
    async fn finalize_writes_container() {
        let dir = tempfile::tempdir().unwrap();
        let service = DigestContainerService::new(dir.path().join("signed"));
        let prepared = service.prepare(&document(b"%PDF-1.7"), &certificate()).unwrap();
        let signature = SignaturePayload {
            value: "c2ln".into(),
            algorithm: "sha256WithProof".into(),
        };

        let container = service.finalize(&prepared, &signature).await.unwrap();
        let raw = tokio::fs::read_to_string(&container.location).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["fileName"], "contract.pdf");
        assert_eq!(json["signature"]["value"], "c2ln");
        assert!(container.location.ends_with(".signed.json"));
    }

    #[test]
    fn sanitize_strips_paths() {
        assert_eq!(sanitize("../../etc/passwd"), "passwd");
        assert_eq!(sanitize("my file.pdf"), "my_file.pdf");
        assert_eq!(sanitize(".."), "document");
    }
}
