//! Deduplicated artifact downloads.
//!
//! Concurrent requests for the same `(run_id, artifact)` share one
//! transfer. The transfer runs in its own task, so it completes even if
//! every requester is dropped, and it removes its map entry when it settles.

use std::io::{Cursor, Read};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use super::client::RemoteCiClient;
use super::error::RemoteError;

type TransferKey = (u64, String);
type TransferResult = Result<Arc<Vec<u8>>, Arc<RemoteError>>;
type Transfer = Shared<BoxFuture<'static, TransferResult>>;

#[derive(Clone, Default)]
pub struct ArtifactDownloader {
    in_flight: Arc<DashMap<TransferKey, Transfer>>,
}

impl ArtifactDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// The instance shared by every build in the process.
    pub fn shared() -> Self {
        static SHARED: OnceLock<ArtifactDownloader> = OnceLock::new();
        SHARED.get_or_init(ArtifactDownloader::new).clone()
    }

    /// Transfers currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub async fn download(
        &self,
        client: &RemoteCiClient,
        run_id: u64,
        name: &str,
    ) -> Result<Arc<Vec<u8>>, RemoteError> {
        let key = (run_id, name.to_string());
        let transfer = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::debug!(run_id, artifact = name, "joining in-flight download");
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let client = client.clone();
                let in_flight = Arc::clone(&self.in_flight);
                let task = tokio::spawn(async move {
                    let result = client
                        .download_artifact(key.0, &key.1)
                        .await
                        .map(Arc::new)
                        .map_err(Arc::new);
                    in_flight.remove(&key);
                    result
                });
                let transfer = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(Arc::new(RemoteError::Parse(format!(
                            "download task failed: {e}"
                        ))))
                    })
                }
                .boxed()
                .shared();
                entry.insert(transfer.clone());
                transfer
            }
        };
        transfer.await.map_err(RemoteError::Shared)
    }
}

/// A downloaded artifact ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// GitHub always zips artifacts. A zip holding exactly one file is
/// unwrapped to that file; anything else is kept as `{name}.zip`.
pub fn unpack_artifact(name: &str, zip_bytes: &[u8]) -> Result<UnpackedArtifact, RemoteError> {
    let as_is = || UnpackedArtifact {
        file_name: format!("{name}.zip"),
        bytes: zip_bytes.to_vec(),
    };
    let mut archive = zip::ZipArchive::new(Cursor::new(zip_bytes))
        .map_err(|e| RemoteError::Parse(format!("artifact is not a zip archive: {e}")))?;

    let files: Vec<usize> = (0..archive.len())
        .filter(|&i| archive.by_index(i).is_ok_and(|f| f.is_file()))
        .collect();
    let [only] = files[..] else {
        return Ok(as_is());
    };

    let mut file = archive
        .by_index(only)
        .map_err(|e| RemoteError::Parse(e.to_string()))?;
    let file_name = file
        .enclosed_name()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .ok_or_else(|| RemoteError::Parse(format!("unsafe entry name {:?}", file.name())))?;
    let mut bytes = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut bytes)
        .map_err(|e| RemoteError::Parse(e.to_string()))?;
    Ok(UnpackedArtifact { file_name, bytes })
}
