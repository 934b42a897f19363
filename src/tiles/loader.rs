use crate::core::geom::TileCoord;
use crate::ViewerError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use fxhash::FxHashSet;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileLoaderConfig {
    /// Upper bound on in-flight tile fetches
    pub max_concurrent: usize,
}

impl Default for TileLoaderConfig {
    fn default() -> Self {
        Self { max_concurrent: 16 }
    }
}

/// One tile fetch, stamped with the level-swap generation it belongs to
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub coord: TileCoord,
    pub url: String,
    pub generation: u64,
}

/// Fetch outcome, delivered back on the polling side
#[derive(Debug)]
pub struct TileResponse {
    pub coord: TileCoord,
    pub generation: u64,
    pub data: crate::Result<Vec<u8>>,
}

/// Asynchronous tile delivery.
///
/// `queue` hands off work without blocking; completed fetches (in any order)
/// come back from `poll`. Implementations must deliver exactly one response
/// per queued request.
pub trait TileFetcher {
    fn queue(&self, requests: Vec<TileRequest>);
    fn poll(&self) -> Vec<TileResponse>;
}

/// HTTP tile fetcher backed by a tokio worker.
///
/// Must be constructed inside a tokio runtime. Requests are deduplicated per
/// (coordinate, generation) while in flight, and concurrency is bounded by
/// [`TileLoaderConfig::max_concurrent`].
pub struct HttpTileLoader {
    task_tx: Sender<TileRequest>,
    result_rx: Receiver<TileResponse>,
    pending: Arc<Mutex<FxHashSet<(TileCoord, u64)>>>,
}

impl HttpTileLoader {
    pub fn new(config: TileLoaderConfig) -> Self {
        let (task_tx, task_rx) = unbounded::<TileRequest>();
        let (result_tx, result_rx) = unbounded::<TileResponse>();
        let pending: Arc<Mutex<FxHashSet<(TileCoord, u64)>>> =
            Arc::new(Mutex::new(FxHashSet::default()));

        let semaphore = Arc::new(tokio::sync::Semaphore::new(config.max_concurrent.max(1)));
        let worker_pending = Arc::clone(&pending);

        tokio::spawn(async move {
            loop {
                match task_rx.try_recv() {
                    Ok(request) => {
                        let permit = match Arc::clone(&semaphore).acquire_owned().await {
                            Ok(permit) => permit,
                            Err(_) => break,
                        };
                        let result_tx = result_tx.clone();
                        let pending = Arc::clone(&worker_pending);

                        tokio::spawn(async move {
                            let data = fetch_tile(&request.url).await;
                            if let Ok(mut set) = pending.lock() {
                                set.remove(&(request.coord, request.generation));
                            }
                            let _ = result_tx.send(TileResponse {
                                coord: request.coord,
                                generation: request.generation,
                                data,
                            });
                            drop(permit);
                        });
                    }
                    Err(crossbeam_channel::TryRecvError::Empty) => {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                    Err(crossbeam_channel::TryRecvError::Disconnected) => break,
                }
            }
        });

        Self {
            task_tx,
            result_rx,
            pending,
        }
    }
}

impl TileFetcher for HttpTileLoader {
    fn queue(&self, requests: Vec<TileRequest>) {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        for request in requests {
            if pending.insert((request.coord, request.generation)) {
                let _ = self.task_tx.send(request);
            }
        }
    }

    fn poll(&self) -> Vec<TileResponse> {
        let mut responses = Vec::new();
        while let Ok(response) = self.result_rx.try_recv() {
            responses.push(response);
        }
        responses
    }
}

async fn fetch_tile(url: &str) -> crate::Result<Vec<u8>> {
    let response = HTTP_CLIENT.get(url).send().await.map_err(ViewerError::Network)?;
    if !response.status().is_success() {
        return Err(ViewerError::TileLoad(format!(
            "HTTP {} fetching {}",
            response.status(),
            url
        ))
        .into());
    }
    let bytes = response.bytes().await.map_err(ViewerError::Network)?;
    Ok(bytes.to_vec())
}
