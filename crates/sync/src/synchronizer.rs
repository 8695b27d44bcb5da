//! The block synchronizer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};
use valence_core::metrics::{
    METRIC_IS_SYNCING, METRIC_NONCE, METRIC_PROBABLE_HIGHEST_NONCE, METRIC_SYNCHRONIZED_ROUND,
};
use valence_core::{
    BlockProcessor, ChainHandler, ForkDetector, ForkInfo, Marshalizer, NetworkConnectionWatcher,
    RequestHandler, StatusHandler, Storer,
};
use valence_types::{Body, BootstrapData, ForkSnapshot, Header, ShardId};

use crate::pools::{HeadersPool, MiniBlocksPool};
use crate::store::{BootstrapStorer, HeaderStore};
use crate::{Result, SyncError};

/// Synchronizer tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum wait on any one arrival signal.
    pub wait_time: Duration,
    /// Pause between sync iterations.
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            wait_time: Duration::from_secs(1),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Pulls headers and bodies for the next expected nonce and drives them
/// through the external block processor.
pub struct BlockSynchronizer<S, M> {
    chain: Arc<dyn ChainHandler>,
    headers: Arc<HeadersPool>,
    mini_blocks: Arc<MiniBlocksPool>,
    processor: Arc<dyn BlockProcessor>,
    fork_detector: Arc<dyn ForkDetector>,
    request_handler: Arc<dyn RequestHandler>,
    watcher: Arc<dyn NetworkConnectionWatcher>,
    status: Arc<dyn StatusHandler>,
    header_store: Arc<HeaderStore<S, M>>,
    boot_storer: Arc<BootstrapStorer<S, M>>,
    config: SyncConfig,
    shard_id: ShardId,

    notify_hdr_nonce: Arc<Notify>,
    notify_mini_blocks: Arc<Notify>,
    requested_nonce: Arc<RwLock<Option<u64>>>,
    requested_mb_hashes: Arc<RwLock<Vec<Vec<u8>>>>,

    stop_flag: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S, M> BlockSynchronizer<S, M>
where
    S: Storer + 'static,
    M: Marshalizer,
{
    /// Wire a synchronizer to its pools and collaborators. The pool
    /// arrival handlers are registered here.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn ChainHandler>,
        headers: Arc<HeadersPool>,
        mini_blocks: Arc<MiniBlocksPool>,
        processor: Arc<dyn BlockProcessor>,
        fork_detector: Arc<dyn ForkDetector>,
        request_handler: Arc<dyn RequestHandler>,
        watcher: Arc<dyn NetworkConnectionWatcher>,
        status: Arc<dyn StatusHandler>,
        header_store: Arc<HeaderStore<S, M>>,
        boot_storer: Arc<BootstrapStorer<S, M>>,
        config: SyncConfig,
        shard_id: ShardId,
    ) -> Self {
        let notify_hdr_nonce = Arc::new(Notify::new());
        let notify_mini_blocks = Arc::new(Notify::new());
        let requested_nonce = Arc::new(RwLock::new(None::<u64>));
        let requested_mb_hashes = Arc::new(RwLock::new(Vec::<Vec<u8>>::new()));

        {
            let pool = Arc::clone(&headers);
            let requested = Arc::clone(&requested_nonce);
            let notify = Arc::clone(&notify_hdr_nonce);
            headers.register_handler(Box::new(move |hash| {
                if let Some(header) = pool.get(hash) {
                    if *requested.read() == Some(header.nonce) {
                        notify.notify_one();
                    }
                }
            }));
        }
        {
            let requested = Arc::clone(&requested_mb_hashes);
            let notify = Arc::clone(&notify_mini_blocks);
            mini_blocks.register_handler(Box::new(move |hash| {
                let mut pending = requested.write();
                if let Some(pos) = pending.iter().position(|h| h == hash) {
                    pending.remove(pos);
                    if pending.is_empty() {
                        notify.notify_one();
                    }
                }
            }));
        }

        Self {
            chain,
            headers,
            mini_blocks,
            processor,
            fork_detector,
            request_handler,
            watcher,
            status,
            header_store,
            boot_storer,
            config,
            shard_id,
            notify_hdr_nonce,
            notify_mini_blocks,
            requested_nonce,
            requested_mb_hashes,
            stop_flag: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// Nonce the chain expects next.
    fn next_nonce(&self) -> u64 {
        self.chain
            .current_header()
            .map(|header| header.nonce + 1)
            .unwrap_or(1)
    }

    /// Replay the newest bootstrap checkpoint into the chain and the fork
    /// detector. Called once before live sync; failures are non-fatal.
    pub fn load_from_storage(&self) -> Result<()> {
        let data = self.boot_storer.get_latest()?;
        let (header, hash) = self.header_store.get_by_nonce(data.highest_nonce)?;

        self.chain.set_current_header(header.clone(), hash.clone());
        self.fork_detector.add_header(&header, &hash);
        self.fork_detector.restore_to(data.highest_nonce);
        self.status.set_uint64_value(METRIC_NONCE, header.nonce);

        info!(
            nonce = data.highest_nonce,
            round = data.last_round,
            "chain restored from bootstrap storage"
        );
        Ok(())
    }

    /// Launch the background sync loop.
    pub fn start_sync(self: &Arc<Self>) {
        if let Err(e) = self.load_from_storage() {
            debug!(error = %e, "bootstrap from storage skipped");
        }

        let me = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                if me.stop_flag.load(Ordering::Acquire) {
                    break;
                }
                tokio::time::sleep(me.config.poll_interval).await;

                match me.sync_block().await {
                    Ok(()) => {}
                    Err(SyncError::NotConnected) => {
                        trace!("sync iteration skipped: no network connection");
                    }
                    Err(e) => {
                        debug!(error = %e, "sync iteration failed");
                    }
                }
            }
        });
        *self.task.lock() = Some(handle);
    }

    /// Signal the sync loop to terminate at the next safe point.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }

    /// One sync attempt: fetch, process and commit the next block.
    pub async fn sync_block(&self) -> Result<()> {
        if !self.watcher.is_connected_to_the_network() {
            return Err(SyncError::NotConnected);
        }

        let fork = self.fork_detector.check_fork();
        let probable = self.fork_detector.probable_highest_nonce();
        let current_nonce = self.next_nonce().saturating_sub(1);
        self.status
            .set_uint64_value(METRIC_PROBABLE_HIGHEST_NONCE, probable);
        self.status
            .set_uint64_value(METRIC_IS_SYNCING, u64::from(probable > current_nonce));

        if self.should_roll_back(&fork, current_nonce) {
            self.roll_back()?;
        }

        let nonce = self.next_nonce();
        let (header, header_hash) = self.get_header_requesting_if_missing(nonce).await?;
        let body = self.get_body_requesting_if_missing(&header).await?;

        if let Err(e) = self
            .processor
            .process_block(self.chain.as_ref(), &header, &body)
            .await
        {
            self.processor.revert_account_state();
            return Err(e.into());
        }
        if let Err(e) = self
            .processor
            .commit_block(self.chain.as_ref(), &header, &body)
            .await
        {
            self.processor.revert_account_state();
            return Err(e.into());
        }

        self.chain
            .set_current_header(header.clone(), header_hash.clone());
        self.fork_detector.add_header(&header, &header_hash);
        if let Err(e) = self.header_store.put(&header, &header_hash) {
            warn!(error = %e, "persisting committed header");
        }

        let checkpoint = BootstrapData {
            last_round: header.round,
            highest_nonce: header.nonce,
            fork: ForkSnapshot {
                is_detected: fork.is_detected,
                nonce: fork.nonce,
                round: fork.round,
                hash: fork.hash.clone(),
            },
        };
        if let Err(e) = self.boot_storer.put(header.round, &checkpoint) {
            debug!(error = %e, "persisting bootstrap checkpoint");
        }

        self.status.set_uint64_value(METRIC_NONCE, header.nonce);
        self.status
            .set_uint64_value(METRIC_SYNCHRONIZED_ROUND, header.round);
        info!(
            nonce = header.nonce,
            round = header.round,
            hash = hex::encode(&header_hash[..header_hash.len().min(8)]),
            "block synchronized"
        );
        Ok(())
    }

    /// A fork verdict with concrete nonce, round and hash comes from
    /// notarized meta-chain data and always wins; a bare detection only
    /// triggers a rollback when the local branch already reached the
    /// divergent nonce.
    fn should_roll_back(&self, fork: &ForkInfo, current_nonce: u64) -> bool {
        if !fork.is_detected {
            return false;
        }
        let by_meta =
            fork.nonce != u64::MAX && fork.round != u64::MAX && fork.hash.is_some();
        by_meta || current_nonce >= fork.nonce
    }

    /// Roll the chain back one block: revert account state to the previous
    /// header, return the dropped block to the pools and forget it in the
    /// fork detector. Repeated iterations walk back to the fork ancestor.
    fn roll_back(&self) -> Result<()> {
        let current = self.chain.current_header().ok_or(SyncError::NilHeader)?;
        let current_hash = self.chain.current_header_hash();

        info!(
            nonce = current.nonce,
            hash = hex::encode(&current_hash[..current_hash.len().min(8)]),
            "fork detected, rolling back block"
        );

        let (prev_header, prev_hash) = if current.nonce <= 1 {
            let genesis = self
                .chain
                .genesis_header()
                .ok_or_else(|| SyncError::RollbackFailed("no genesis header".into()))?;
            (genesis, self.chain.genesis_header_hash())
        } else {
            let prev = self
                .header_store
                .get(&current.prev_hash)
                .map_err(|e| SyncError::RollbackFailed(e.to_string()))?;
            (prev, current.prev_hash.clone())
        };

        self.processor.revert_state_to_block(&prev_header)?;
        if let Err(e) = self
            .processor
            .restore_block_into_pools(&current, &Body::default())
        {
            debug!(error = %e, "restoring rolled-back block into pools");
        }

        self.fork_detector.remove_header(current.nonce, &current_hash);
        self.headers.remove(&current_hash);
        self.chain.set_current_header(prev_header, prev_hash);
        Ok(())
    }

    async fn get_header_requesting_if_missing(&self, nonce: u64) -> Result<(Header, Vec<u8>)> {
        if let Some(found) = self.headers.get_by_nonce(nonce) {
            return Ok(found);
        }

        Self::drain(&self.notify_hdr_nonce).await;
        *self.requested_nonce.write() = Some(nonce);
        self.request_handler
            .request_header_by_nonce(self.shard_id, nonce);
        trace!(nonce = nonce, "requested header from network");

        let waited = timeout(self.config.wait_time, self.notify_hdr_nonce.notified()).await;
        *self.requested_nonce.write() = None;
        if waited.is_err() {
            return Err(SyncError::TimeIsOut);
        }

        self.headers
            .get_by_nonce(nonce)
            .ok_or(SyncError::MissingHeader(nonce))
    }

    async fn get_body_requesting_if_missing(&self, header: &Header) -> Result<Body> {
        let hashes = header.mini_block_hashes();
        if hashes.is_empty() {
            return Ok(Body::default());
        }

        let missing: Vec<Vec<u8>> = hashes
            .iter()
            .filter(|hash| !self.mini_blocks.has(hash))
            .cloned()
            .collect();

        if !missing.is_empty() {
            Self::drain(&self.notify_mini_blocks).await;
            *self.requested_mb_hashes.write() = missing.clone();
            for hash in &missing {
                self.request_handler.request_mini_block(self.shard_id, hash);
            }
            trace!(num = missing.len(), "requested miniblocks from network");

            let waited =
                timeout(self.config.wait_time, self.notify_mini_blocks.notified()).await;
            self.requested_mb_hashes.write().clear();
            if waited.is_err() {
                return Err(SyncError::TimeIsOut);
            }
        }

        let mut mini_blocks = Vec::with_capacity(hashes.len());
        for hash in &hashes {
            mini_blocks.push(self.mini_blocks.get(hash).ok_or(SyncError::MissingBody)?);
        }
        Ok(Body::new(mini_blocks))
    }

    /// Discard a stale stored permit so an old arrival cannot satisfy a
    /// new wait.
    async fn drain(notify: &Notify) {
        let _ = timeout(Duration::ZERO, notify.notified()).await;
    }
}
