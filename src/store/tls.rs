//! TLS material loading for the store connection.

use std::fs;
use std::path::Path;

use reqwest::{Certificate, Identity};

use crate::config::TlsFiles;
use crate::store::{StoreError, StoreResult};

/// CA root and client identity for a TLS store connection.
pub struct TlsMaterial {
    pub ca_cert: Certificate,
    pub identity: Identity,
}

/// Load the CA certificate, private key and certificate chain.
pub fn load_tls_material(files: &TlsFiles) -> StoreResult<TlsMaterial> {
    let ca_pem = read_pem(&files.ca_cert)?;
    ensure_certificates(&files.ca_cert, &ca_pem)?;

    let chain_pem = read_pem(&files.cert_chain)?;
    ensure_certificates(&files.cert_chain, &chain_pem)?;

    let key_pem = read_pem(&files.priv_key)?;
    match rustls_pemfile::private_key(&mut key_pem.as_slice()) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Err(StoreError::Tls(format!(
                "no private key found in '{}'",
                files.priv_key.display()
            )))
        }
        Err(e) => {
            return Err(StoreError::Tls(format!(
                "cannot parse '{}': {}",
                files.priv_key.display(),
                e
            )))
        }
    }

    let ca_cert = Certificate::from_pem(&ca_pem).map_err(|e| StoreError::Tls(e.to_string()))?;

    // rustls wants the key and the chain in one PEM buffer.
    let mut identity_pem = chain_pem;
    identity_pem.push(b'\n');
    identity_pem.extend_from_slice(&key_pem);
    let identity = Identity::from_pem(&identity_pem).map_err(|e| StoreError::Tls(e.to_string()))?;

    Ok(TlsMaterial { ca_cert, identity })
}

fn read_pem(path: &Path) -> StoreResult<Vec<u8>> {
    fs::read(path)
        .map_err(|e| StoreError::Tls(format!("cannot read '{}': {}", path.display(), e)))
}

fn ensure_certificates(path: &Path, pem: &[u8]) -> StoreResult<()> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Tls(format!("cannot parse '{}': {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(StoreError::Tls(format!(
            "no certificates found in '{}'",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(dir: &Path) -> TlsFiles {
        TlsFiles {
            ca_cert: dir.join("ca.pem"),
            priv_key: dir.join("key.pem"),
            cert_chain: dir.join("chain.pem"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_tls_material(&files(dir.path())).err().unwrap();
        assert!(err.to_string().contains("cannot read"));
        assert!(err.to_string().contains("ca.pem"));
    }

    #[test]
    fn test_file_without_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let files = files(dir.path());
        fs::write(&files.ca_cert, "this is not PEM\n").unwrap();

        let err = load_tls_material(&files).err().unwrap();
        assert_eq!(
            err.to_string(),
            format!("TLS error: no certificates found in '{}'", files.ca_cert.display())
        );
    }
}
