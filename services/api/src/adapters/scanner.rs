//! services/api/src/adapters/scanner.rs
//!
//! Antivirus adapters implementing the `DocumentScanner` port.

use async_trait::async_trait;
use tracing::warn;
use tuteskillz_core::ports::{DocumentScanner, PortResult, ScanVerdict};

/// Accepts every document. Used when no scanning service is deployed.
#[derive(Clone, Default)]
pub struct PassthroughScanner;

#[async_trait]
impl DocumentScanner for PassthroughScanner {
    async fn scan(&self, _file_name: &str, _contents: &[u8]) -> PortResult<ScanVerdict> {
        Ok(ScanVerdict::Clean)
    }
}

/// The standard antivirus test string.
const EICAR_SIGNATURE: &[u8] = b"EICAR-STANDARD-ANTIVIRUS-TEST-FILE";

/// Flags documents containing the EICAR test signature. Lets the rejection path be
/// exercised without a real antivirus engine.
#[derive(Clone, Default)]
pub struct EicarScanner;

#[async_trait]
impl DocumentScanner for EicarScanner {
    async fn scan(&self, file_name: &str, contents: &[u8]) -> PortResult<ScanVerdict> {
        let infected = contents
            .windows(EICAR_SIGNATURE.len())
            .any(|window| window == EICAR_SIGNATURE);
        if infected {
            warn!(file_name, "Upload matched the EICAR signature");
            return Ok(ScanVerdict::Infected("Eicar-Test-Signature".to_string()));
        }
        Ok(ScanVerdict::Clean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn eicar_payload_is_infected() {
        let payload = b"%PDF-1.4 X5O!P%@AP[4\\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";
        assert_eq!(
            EicarScanner.scan("notes.pdf", payload).await.unwrap(),
            ScanVerdict::Infected("Eicar-Test-Signature".to_string())
        );
        assert_eq!(
            EicarScanner.scan("notes.pdf", b"%PDF-1.4 clean").await.unwrap(),
            ScanVerdict::Clean
        );
    }

    #[tokio::test]
    async fn passthrough_accepts_anything() {
        assert_eq!(
            PassthroughScanner.scan("x.pdf", b"").await.unwrap(),
            ScanVerdict::Clean
        );
    }
}
