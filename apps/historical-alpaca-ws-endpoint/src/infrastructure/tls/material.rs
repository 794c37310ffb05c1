//! Process-scoped certificate files.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Default private key file name.
pub const KEY_FILE_NAME: &str = "server.key";

/// Default certificate file name.
pub const CERT_FILE_NAME: &str = "server.crt";

/// Key and certificate paths whose files live exactly as long as the
/// process.
///
/// Dropping the value removes both files, so holding it in `main` covers
/// normal return, early `?` exits, and panics. [`Self::teardown`] can also
/// be called explicitly before `std::process::exit`; only the first call
/// touches the file system.
#[derive(Debug)]
pub struct CertificateMaterial {
    key_path: PathBuf,
    cert_path: PathBuf,
    torn_down: AtomicBool,
}

impl CertificateMaterial {
    /// Material at explicit paths.
    #[must_use]
    pub const fn new(key_path: PathBuf, cert_path: PathBuf) -> Self {
        Self {
            key_path,
            cert_path,
            torn_down: AtomicBool::new(false),
        }
    }

    /// Material using the default file names inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(KEY_FILE_NAME), dir.join(CERT_FILE_NAME))
    }

    /// Private key path.
    #[must_use]
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Certificate path.
    #[must_use]
    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }

    /// Whether both files are present.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.key_path.exists() && self.cert_path.exists()
    }

    /// Remove both files if present.
    ///
    /// Returns `true` if this call performed the teardown, `false` if an
    /// earlier call already did.
    pub fn teardown(&self) -> bool {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }

        remove_if_present(&self.cert_path, "certificate");
        remove_if_present(&self.key_path, "key");
        true
    }
}

impl Drop for CertificateMaterial {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn remove_if_present(path: &Path, kind: &'static str) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(kind, path = %path.display(), "Cleaned up TLS file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(kind, path = %path.display(), error = %e, "Failed to remove TLS file"),
    }
}
