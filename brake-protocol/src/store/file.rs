use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::{fs, io::ErrorKind};

use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use super::ProfileStore;
use crate::{Profile, ProtocolError};

const SERVER_PRIVATE_KEY_FILE: &str = "server_private_key.pem";
const SERVER_PUBLIC_KEY_FILE: &str = "server_public_key.pem";
const SERVER_RSA_BITS: usize = 2048;

/// A directory-backed [`ProfileStore`]: one `<id>.json` file per client,
/// plus the server's own long-term RSA keypair generated on first use.
///
/// Profile writes are atomic (write to a sibling temp file, then rename)
/// so a crash mid-write never leaves a torn profile behind.
pub struct FileProfileStore {
    db_path: PathBuf,
}

impl FileProfileStore {
    /// Opens (creating if necessary) a profile store rooted at `db_path`,
    /// generating the server's RSA keypair on first use.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let db_path = db_path.as_ref().to_path_buf();
        fs::create_dir_all(&db_path)?;
        let store = Self { db_path };
        store.ensure_server_keypair()?;
        Ok(store)
    }

    /// Path to the server's long-term public key PEM.
    pub fn server_public_key_path(&self) -> PathBuf {
        self.db_path.join(SERVER_PUBLIC_KEY_FILE)
    }

    /// Path to the server's long-term private key PEM.
    pub fn server_private_key_path(&self) -> PathBuf {
        self.db_path.join(SERVER_PRIVATE_KEY_FILE)
    }

    /// The server's long-term public key, PEM-encoded.
    pub fn server_public_key_pem(&self) -> Result<String, ProtocolError> {
        Ok(fs::read_to_string(self.server_public_key_path())?)
    }

    /// The server's long-term private key, PEM-encoded.
    pub fn server_private_key_pem(&self) -> Result<String, ProtocolError> {
        Ok(fs::read_to_string(self.server_private_key_path())?)
    }

    fn ensure_server_keypair(&self) -> Result<(), ProtocolError> {
        let private_path = self.server_private_key_path();
        let public_path = self.server_public_key_path();
        if private_path.exists() && public_path.exists() {
            return Ok(());
        }

        tracing::info!(db = %self.db_path.display(), "generating server RSA keypair");
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, SERVER_RSA_BITS)
            .map_err(|e| ProtocolError::Crypto(e.to_string()))?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| ProtocolError::Crypto(e.to_string()))?;
        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| ProtocolError::Crypto(e.to_string()))?;

        atomic_write(&private_path, private_pem.as_bytes())?;
        atomic_write(&public_path, public_pem.as_bytes())?;
        Ok(())
    }

    fn profile_path(&self, client_id: u64) -> PathBuf {
        self.db_path.join(format!("{client_id}.json"))
    }
}

impl ProfileStore for FileProfileStore {
    fn create(&self, profile: Profile) -> Result<(), ProtocolError> {
        let path = self.profile_path(profile.client_id);
        if path.exists() {
            return Err(ProtocolError::ClientExists(profile.client_id));
        }
        let json = serde_json::to_string_pretty(&profile)?;
        atomic_write(&path, json.as_bytes())?;
        tracing::debug!(client_id = profile.client_id, "profile created");
        Ok(())
    }

    fn get(&self, client_id: u64) -> Result<Profile, ProtocolError> {
        let path = self.profile_path(client_id);
        let json = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ProtocolError::ClientMissing(client_id),
            _ => ProtocolError::Io(e),
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn delete(&self, client_id: u64) -> Result<(), ProtocolError> {
        match fs::remove_file(self.profile_path(client_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProtocolError::Io(e)),
        }
    }
}

fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
