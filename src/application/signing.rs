//! Content URL signing.
//!
//! A single long-lived symmetric key authorizes content URLs: the renderer
//! attaches a short HMAC digest to every reference it embeds, and the
//! content route refuses to serve when the digest does not verify. The key
//! is generated lazily, persisted next to the cache, and held in memory for
//! the process lifetime. There is no rotation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tokio::fs;
use uuid::Uuid;

type HmacSha1 = Hmac<Sha1>;

/// Hex characters kept from the full HMAC output.
pub const DIGEST_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("signing key file is malformed")]
    Malformed,
}

pub struct SigningService {
    key_file: PathBuf,
    enforce: bool,
    key: OnceCell<Vec<u8>>,
}

impl SigningService {
    pub fn new(key_file: PathBuf, enforce: bool) -> Self {
        Self {
            key_file,
            enforce,
            key: OnceCell::new(),
        }
    }

    /// Whether content routes must demand a valid digest.
    pub fn enforced(&self) -> bool {
        self.enforce
    }

    /// Short digest authorizing `reference_path`.
    pub async fn sign(&self, reference_path: &str) -> Result<String, SigningError> {
        let key = self.key().await?;
        let mut mac = HmacSha1::new_from_slice(key).map_err(|_| SigningError::Malformed)?;
        mac.update(reference_path.as_bytes());
        let full = hex::encode(mac.finalize().into_bytes());
        Ok(full[..DIGEST_LEN].to_string())
    }

    /// Recompute and compare in constant time. With enforcement disabled,
    /// any digest (including a missing one) is acceptable.
    pub async fn verify(
        &self,
        reference_path: &str,
        digest: Option<&str>,
    ) -> Result<bool, SigningError> {
        if !self.enforce {
            return Ok(true);
        }
        let Some(digest) = digest else {
            return Ok(false);
        };
        let expected = self.sign(reference_path).await?;
        Ok(expected.as_bytes().ct_eq(digest.as_bytes()).unwrap_u8() == 1)
    }

    async fn key(&self) -> Result<&[u8], SigningError> {
        self.key
            .get_or_try_init(|| load_or_generate(&self.key_file))
            .await
            .map(Vec::as_slice)
    }
}

/// Load the persisted key, generating it on first use.
///
/// First write wins: losing a creation race falls back to re-reading the
/// value the winner persisted, so concurrent processes converge on one key.
async fn load_or_generate(path: &Path) -> Result<Vec<u8>, SigningError> {
    match fs::read_to_string(path).await {
        Ok(text) => decode_key(&text),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let secret = generate_secret();
            let encoded = BASE64.encode(&secret);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(encoded.as_bytes()).await?;
                    file.flush().await?;
                    Ok(secret)
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    decode_key(&fs::read_to_string(path).await?)
                }
                Err(err) => Err(err.into()),
            }
        }
        Err(err) => Err(err.into()),
    }
}

fn decode_key(text: &str) -> Result<Vec<u8>, SigningError> {
    let decoded = BASE64
        .decode(text.trim())
        .map_err(|_| SigningError::Malformed)?;
    if decoded.is_empty() {
        return Err(SigningError::Malformed);
    }
    Ok(decoded)
}

fn generate_secret() -> Vec<u8> {
    let mut secret = Vec::with_capacity(32);
    secret.extend_from_slice(Uuid::new_v4().as_bytes());
    secret.extend_from_slice(Uuid::new_v4().as_bytes());
    secret
}
