use crate::error::{SshCoreError, SshResult};
use russh::keys;
use std::path::Path;

/// Load a private key from string data.
///
/// Accepts OpenSSH and PKCS#8 encodings. Encrypted keys need `passphrase`;
/// an encrypted key without one is reported rather than prompted for.
pub fn load_private_key_from_str(data: &str, passphrase: Option<&str>) -> SshResult<keys::PrivateKey> {
    if passphrase.is_none()
        && let Ok(key) = keys::PrivateKey::from_openssh(data)
        && !key.is_encrypted()
    {
        return Ok(key);
    }

    match keys::decode_secret_key(data, passphrase) {
        Ok(key) => Ok(key),
        Err(keys::Error::KeyIsEncrypted) => Err(SshCoreError::Key("encrypted private key requires a passphrase".into())),
        Err(err) => Err(SshCoreError::Key(err.to_string())),
    }
}

/// Read and decode the identity file at `path`.
pub async fn load_identity(path: &Path, passphrase: Option<&str>) -> SshResult<keys::PrivateKey> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| SshCoreError::Key(format!("{}: {err}", path.display())))?;
    load_private_key_from_str(&data, passphrase).map_err(|err| match err {
        SshCoreError::Key(message) => SshCoreError::Key(format!("{}: {message}", path.display())),
        other => other,
    })
}
