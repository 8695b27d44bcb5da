//! Integration tests for the block synchronizer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use valence_core::{
    BincodeMarshalizer, BlockProcessor, ChainHandler, ForkDetector, ForkInfo, MemStorer,
    NetworkConnectionWatcher, ProcessError, RequestHandler, StatusHandler,
};
use valence_sync::{
    BlockSynchronizer, BootstrapStorer, HeaderStore, HeadersPool, MiniBlocksPool, SyncConfig,
    SyncError,
};
use valence_types::{
    BlockChain, Body, BootstrapData, ForkSnapshot, Header, MiniBlock, MiniBlockHeader, ShardId,
};

#[derive(Default)]
struct StubProcessor {
    processed: AtomicUsize,
    committed: AtomicUsize,
    reverted: AtomicUsize,
    state_reverts: Mutex<Vec<u64>>,
    restored: Mutex<Vec<u64>>,
    fail_process: AtomicBool,
    fail_commit: AtomicBool,
}

#[async_trait]
impl BlockProcessor for StubProcessor {
    async fn process_block(
        &self,
        _chain: &dyn ChainHandler,
        _header: &Header,
        _body: &Body,
    ) -> Result<(), ProcessError> {
        if self.fail_process.load(Ordering::SeqCst) {
            return Err(ProcessError::InvalidBlock("stub".into()));
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit_block(
        &self,
        _chain: &dyn ChainHandler,
        _header: &Header,
        _body: &Body,
    ) -> Result<(), ProcessError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(ProcessError::CommitFailed("stub".into()));
        }
        self.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn revert_account_state(&self) {
        self.reverted.fetch_add(1, Ordering::SeqCst);
    }

    fn revert_state_to_block(&self, header: &Header) -> Result<(), ProcessError> {
        self.state_reverts.lock().push(header.nonce);
        Ok(())
    }

    async fn create_block_body(&self, _header: &Header) -> Result<Body, ProcessError> {
        Ok(Body::default())
    }

    fn apply_body_to_header(&self, _header: &mut Header, _body: &Body) -> Result<(), ProcessError> {
        Ok(())
    }

    fn marshalized_data_to_broadcast(
        &self,
        _header: &Header,
        _body: &Body,
    ) -> Result<(HashMap<u32, Vec<u8>>, HashMap<String, Vec<Vec<u8>>>), ProcessError> {
        Ok((HashMap::new(), HashMap::new()))
    }

    fn restore_block_into_pools(&self, header: &Header, _body: &Body) -> Result<(), ProcessError> {
        self.restored.lock().push(header.nonce);
        Ok(())
    }
}

#[derive(Default)]
struct StubForkDetector {
    info: Mutex<ForkInfo>,
    probable: AtomicU64,
    removed: Mutex<Vec<u64>>,
    restored_to: Mutex<Vec<u64>>,
    added: Mutex<Vec<u64>>,
}

impl ForkDetector for StubForkDetector {
    fn add_header(&self, header: &Header, _hash: &[u8]) {
        self.added.lock().push(header.nonce);
    }

    fn remove_header(&self, nonce: u64, _hash: &[u8]) {
        self.removed.lock().push(nonce);
    }

    fn probable_highest_nonce(&self) -> u64 {
        self.probable.load(Ordering::SeqCst)
    }

    fn check_fork(&self) -> ForkInfo {
        self.info.lock().clone()
    }

    fn restore_to(&self, nonce: u64) {
        self.restored_to.lock().push(nonce);
    }
}

#[derive(Default)]
struct StubRequestHandler {
    nonce_requests: Mutex<Vec<u64>>,
    mb_requests: Mutex<Vec<Vec<u8>>>,
}

impl RequestHandler for StubRequestHandler {
    fn request_transaction(&self, _shard: ShardId, _hashes: &[Vec<u8>]) {}
    fn request_unsigned_transactions(&self, _shard: ShardId, _hashes: &[Vec<u8>]) {}
    fn request_reward_transactions(&self, _shard: ShardId, _hashes: &[Vec<u8>]) {}

    fn request_mini_block(&self, _shard: ShardId, hash: &[u8]) {
        self.mb_requests.lock().push(hash.to_vec());
    }

    fn request_header(&self, _shard: ShardId, _hash: &[u8]) {}

    fn request_header_by_nonce(&self, _shard: ShardId, nonce: u64) {
        self.nonce_requests.lock().push(nonce);
    }
}

struct StubWatcher {
    connected: AtomicBool,
}

impl NetworkConnectionWatcher for StubWatcher {
    fn is_connected_to_the_network(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RecordingStatus {
    uints: Mutex<HashMap<String, u64>>,
}

impl StatusHandler for RecordingStatus {
    fn set_int64_value(&self, _key: &str, _value: i64) {}
    fn set_uint64_value(&self, key: &str, value: u64) {
        self.uints.lock().insert(key.to_string(), value);
    }
    fn set_string_value(&self, _key: &str, _value: &str) {}
    fn increment(&self, _key: &str) {}
    fn decrement(&self, _key: &str) {}
    fn add_uint64(&self, _key: &str, _value: u64) {}
}

struct Fixture {
    chain: Arc<BlockChain>,
    headers: Arc<HeadersPool>,
    mini_blocks: Arc<MiniBlocksPool>,
    processor: Arc<StubProcessor>,
    fork_detector: Arc<StubForkDetector>,
    requests: Arc<StubRequestHandler>,
    watcher: Arc<StubWatcher>,
    status: Arc<RecordingStatus>,
    header_store: Arc<HeaderStore<Arc<MemStorer>, BincodeMarshalizer>>,
    boot_storer: Arc<BootstrapStorer<Arc<MemStorer>, BincodeMarshalizer>>,
    synchronizer: Arc<BlockSynchronizer<Arc<MemStorer>, BincodeMarshalizer>>,
}

fn fixture(wait_time: Duration) -> Fixture {
    let genesis = Header::default();
    let chain = Arc::new(BlockChain::with_genesis(genesis, vec![0xee; 4]));
    let headers = Arc::new(HeadersPool::new());
    let mini_blocks = Arc::new(MiniBlocksPool::new());
    let processor = Arc::new(StubProcessor::default());
    let fork_detector = Arc::new(StubForkDetector::default());
    let requests = Arc::new(StubRequestHandler::default());
    let watcher = Arc::new(StubWatcher {
        connected: AtomicBool::new(true),
    });
    let status = Arc::new(RecordingStatus::default());
    let store = Arc::new(MemStorer::new());
    let header_store = Arc::new(HeaderStore::new(Arc::clone(&store), BincodeMarshalizer));
    let boot_store = Arc::new(MemStorer::new());
    let boot_storer = Arc::new(BootstrapStorer::new(Arc::clone(&boot_store), BincodeMarshalizer));

    let synchronizer = Arc::new(BlockSynchronizer::new(
        chain.clone() as Arc<dyn ChainHandler>,
        Arc::clone(&headers),
        Arc::clone(&mini_blocks),
        processor.clone() as Arc<dyn BlockProcessor>,
        fork_detector.clone() as Arc<dyn ForkDetector>,
        requests.clone() as Arc<dyn RequestHandler>,
        watcher.clone() as Arc<dyn NetworkConnectionWatcher>,
        status.clone() as Arc<dyn StatusHandler>,
        Arc::clone(&header_store),
        Arc::clone(&boot_storer),
        SyncConfig {
            wait_time,
            poll_interval: Duration::from_millis(5),
        },
        0,
    ));

    Fixture {
        chain,
        headers,
        mini_blocks,
        processor,
        fork_detector,
        requests,
        watcher,
        status,
        header_store,
        boot_storer,
        synchronizer,
    }
}

fn header_with(nonce: u64, round: u64) -> (Header, Vec<u8>) {
    let header = Header {
        nonce,
        round,
        prev_hash: vec![nonce as u8 - 1; 4],
        ..Default::default()
    };
    (header, vec![nonce as u8; 4])
}

#[tokio::test]
async fn sync_commits_a_block_already_in_the_pools() {
    let f = fixture(Duration::from_millis(100));
    let (header, hash) = header_with(1, 3);
    f.headers.add(header.clone(), hash.clone());

    f.synchronizer.sync_block().await.unwrap();

    assert_eq!(f.processor.processed.load(Ordering::SeqCst), 1);
    assert_eq!(f.processor.committed.load(Ordering::SeqCst), 1);
    assert_eq!(f.chain.current_header(), Some(header.clone()));
    assert_eq!(f.chain.current_header_hash(), hash.clone());

    // the committed header is persisted and checkpointed
    assert_eq!(f.header_store.get(&hash).unwrap(), header);
    assert_eq!(f.boot_storer.get(3).unwrap().highest_nonce, 1);
    assert_eq!(*f.fork_detector.added.lock(), vec![1]);
    assert_eq!(f.status.uints.lock()["valence_nonce"], 1);
}

#[tokio::test]
async fn sync_requests_a_missing_header_and_waits_for_arrival() {
    let f = fixture(Duration::from_millis(500));
    let headers = Arc::clone(&f.headers);

    let feeder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (header, hash) = header_with(1, 1);
        headers.add(header, hash);
    });

    f.synchronizer.sync_block().await.unwrap();
    feeder.await.unwrap();

    assert_eq!(*f.requests.nonce_requests.lock(), vec![1]);
    assert_eq!(f.processor.committed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sync_times_out_when_nothing_arrives() {
    let f = fixture(Duration::from_millis(30));

    let result = f.synchronizer.sync_block().await;
    assert!(matches!(result, Err(SyncError::TimeIsOut)));
    assert_eq!(*f.requests.nonce_requests.lock(), vec![1]);
    assert_eq!(f.processor.processed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sync_fetches_missing_miniblocks_in_header_order() {
    let f = fixture(Duration::from_millis(500));

    let mb1 = MiniBlock {
        tx_hashes: vec![vec![1]],
        ..Default::default()
    };
    let mb2 = MiniBlock {
        tx_hashes: vec![vec![2]],
        ..Default::default()
    };
    let (mut header, hash) = header_with(1, 1);
    header.mini_block_headers = vec![
        MiniBlockHeader {
            hash: vec![0xb1],
            ..Default::default()
        },
        MiniBlockHeader {
            hash: vec![0xb2],
            ..Default::default()
        },
    ];
    f.headers.add(header, hash);
    f.mini_blocks.add(vec![0xb1], mb1.clone());

    let pool = Arc::clone(&f.mini_blocks);
    let mb2_feed = mb2.clone();
    let feeder = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.add(vec![0xb2], mb2_feed);
    });

    f.synchronizer.sync_block().await.unwrap();
    feeder.await.unwrap();

    // only the absent miniblock was requested
    assert_eq!(*f.requests.mb_requests.lock(), vec![vec![0xb2]]);
    assert_eq!(f.processor.committed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn process_failure_reverts_account_state_and_keeps_the_tip() {
    let f = fixture(Duration::from_millis(100));
    let (header, hash) = header_with(1, 1);
    f.headers.add(header, hash);
    f.processor.fail_process.store(true, Ordering::SeqCst);

    let result = f.synchronizer.sync_block().await;

    assert!(matches!(result, Err(SyncError::Process(_))));
    assert_eq!(f.processor.reverted.load(Ordering::SeqCst), 1);
    assert!(f.chain.current_header().is_none());
}

#[tokio::test]
async fn commit_failure_also_reverts() {
    let f = fixture(Duration::from_millis(100));
    let (header, hash) = header_with(1, 1);
    f.headers.add(header, hash);
    f.processor.fail_commit.store(true, Ordering::SeqCst);

    let result = f.synchronizer.sync_block().await;

    assert!(matches!(result, Err(SyncError::Process(_))));
    assert_eq!(f.processor.reverted.load(Ordering::SeqCst), 1);
    assert!(f.chain.current_header().is_none());
}

#[tokio::test]
async fn meta_signaled_fork_rolls_back_to_the_previous_header() {
    let f = fixture(Duration::from_millis(30));

    // commit blocks 1 and 2
    let (header1, hash1) = header_with(1, 1);
    let (header2, hash2) = header_with(2, 2);
    f.headers.add(header1.clone(), hash1.clone());
    f.synchronizer.sync_block().await.unwrap();
    f.headers.add(header2.clone(), hash2.clone());
    f.synchronizer.sync_block().await.unwrap();
    assert_eq!(f.chain.current_header().unwrap().nonce, 2);

    // the meta chain notarized a different block 2
    *f.fork_detector.info.lock() = ForkInfo {
        is_detected: true,
        nonce: 2,
        round: 2,
        hash: Some(vec![0xff; 4]),
    };

    // next iteration rolls back one block before resyncing; the refetch
    // itself times out because nothing else is pooled
    let result = f.synchronizer.sync_block().await;
    assert!(matches!(result, Err(SyncError::TimeIsOut)));

    assert_eq!(f.chain.current_header().unwrap().nonce, 1);
    assert_eq!(*f.processor.state_reverts.lock(), vec![1]);
    assert_eq!(*f.processor.restored.lock(), vec![2]);
    assert_eq!(*f.fork_detector.removed.lock(), vec![2]);
}

#[tokio::test]
async fn bare_fork_detection_below_the_tip_does_not_roll_back() {
    let f = fixture(Duration::from_millis(30));
    let (header1, hash1) = header_with(1, 1);
    f.headers.add(header1, hash1);
    f.synchronizer.sync_block().await.unwrap();

    *f.fork_detector.info.lock() = ForkInfo {
        is_detected: true,
        nonce: 5,
        round: u64::MAX,
        hash: None,
    };

    let _ = f.synchronizer.sync_block().await;
    assert_eq!(f.chain.current_header().unwrap().nonce, 1);
    assert!(f.processor.state_reverts.lock().is_empty());
}

#[tokio::test]
async fn load_from_storage_replays_the_newest_checkpoint() {
    let f = fixture(Duration::from_millis(30));

    let (header, hash) = header_with(4, 7);
    f.header_store.put(&header, &hash).unwrap();
    f.boot_storer
        .put(
            7,
            &BootstrapData {
                last_round: 7,
                highest_nonce: 4,
                fork: ForkSnapshot::empty(),
            },
        )
        .unwrap();

    f.synchronizer.load_from_storage().unwrap();

    assert_eq!(f.chain.current_header(), Some(header));
    assert_eq!(f.chain.current_header_hash(), hash);
    assert_eq!(*f.fork_detector.restored_to.lock(), vec![4]);
    assert_eq!(*f.fork_detector.added.lock(), vec![4]);
}

#[tokio::test]
async fn load_from_storage_fails_without_a_checkpoint() {
    let f = fixture(Duration::from_millis(30));
    assert!(matches!(
        f.synchronizer.load_from_storage(),
        Err(SyncError::NoBootstrapData)
    ));
}

#[tokio::test]
async fn disconnected_node_skips_the_iteration() {
    let f = fixture(Duration::from_millis(30));
    f.watcher.connected.store(false, Ordering::SeqCst);

    let result = f.synchronizer.sync_block().await;
    assert!(matches!(result, Err(SyncError::NotConnected)));
    assert!(f.requests.nonce_requests.lock().is_empty());
}

#[tokio::test]
async fn start_and_stop_run_the_loop_in_the_background() {
    let f = fixture(Duration::from_millis(20));
    let (header, hash) = header_with(1, 1);
    f.headers.add(header, hash);

    f.synchronizer.start_sync();
    tokio::time::sleep(Duration::from_millis(100)).await;
    f.synchronizer.stop();

    assert!(f.processor.committed.load(Ordering::SeqCst) >= 1);
}
