//! Multi-threaded proof-of-work worker pool for the name-registration chain.
//!
//! A fixed pool of OS threads searches the header nonce space for a hash
//! that clears the current block target. Workers never share a locked
//! "current block": each sweep clones an `Arc<NameBlock>` snapshot and the
//! `version` stamp it was issued under, and re-checks that stamp against the
//! live version on every nonce and at the top of every sweep. Any mutation
//! — a new header, a newly bundled claim, a raised target, or `stop` — bumps
//! `version`, so every worker still iterating the stale generation notices
//! within at most one nonce step and exits without reporting anything.
//!
//! The winning worker does not call the delegate directly: it hands the
//! found block to a single dedicated callback thread over a channel, so the
//! delegate only ever runs on one thread and mining threads never block on
//! delegate work. The channel's sender lives on [`NameMiner`] itself, not
//! inside the state workers share, so dropping the miner can close the
//! channel and let the callback thread exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::NameBlock;

/// Upper bound on the nonce sweep a worker performs per pass before
/// re-checking its version stamp; keeps cancellation latency bounded
/// regardless of thread count.
const NONCE_SPACE: u32 = 1 << 16;

/// Receives the block a worker found. Invoked only from the miner's
/// dedicated callback thread, never from a mining thread.
pub trait NameMinerDelegate: Send + Sync {
    fn found_name_block(&self, block: NameBlock);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    Starting,
    Mining,
    Stopping,
}

struct Shared {
    block: Mutex<Arc<NameBlock>>,
    target: AtomicU64,
    version: AtomicU64,
    effort_bits: AtomicU64,
    state: Mutex<MinerState>,
    delegate: Mutex<Option<Arc<dyn NameMinerDelegate>>>,
}

/// A pool of `threads` fixed OS threads searching for name-chain proof of
/// work, with cooperative cancellation and an effort knob that trades CPU
/// for responsiveness.
pub struct NameMiner {
    shared: Arc<Shared>,
    found_tx: Option<SyncSender<NameBlock>>,
    threads: u32,
    workers: Mutex<Vec<JoinHandle<()>>>,
    callback_thread: Option<JoinHandle<()>>,
}

impl NameMiner {
    /// Builds a miner with a pool of `threads` worker threads (at least 1),
    /// starting from the chain's genesis block and a target of 1 (always
    /// satisfied, so the first `start` can find a block immediately).
    #[must_use]
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1) as u32;
        let (found_tx, found_rx): (SyncSender<NameBlock>, Receiver<NameBlock>) = sync_channel(1);
        let shared = Arc::new(Shared {
            block: Mutex::new(Arc::new(super::genesis_name_block())),
            target: AtomicU64::new(1),
            version: AtomicU64::new(0),
            effort_bits: AtomicU64::new(1.0f64.to_bits()),
            state: Mutex::new(MinerState::Idle),
            delegate: Mutex::new(None),
        });

        let callback_shared = Arc::clone(&shared);
        let callback_thread = thread::spawn(move || {
            while let Ok(block) = found_rx.recv() {
                let delegate = callback_shared.delegate.lock().unwrap().clone();
                if let Some(delegate) = delegate {
                    info!(block_num = block.header.block_num, "name block found");
                    delegate.found_name_block(block);
                }
            }
        });

        Self {
            shared,
            found_tx: Some(found_tx),
            threads,
            workers: Mutex::new(Vec::new()),
            callback_thread: Some(callback_thread),
        }
    }

    #[must_use]
    pub fn state(&self) -> MinerState {
        *self.shared.state.lock().unwrap()
    }

    pub fn set_delegate(&self, delegate: Arc<dyn NameMinerDelegate>) {
        *self.shared.delegate.lock().unwrap() = Some(delegate);
    }

    /// Sets the minimum difficulty a found block must clear. Cancels any
    /// in-flight generation; workers pick up the new target on their next
    /// sweep if still mining.
    pub fn set_block_target(&self, target: u64) {
        self.shared.target.store(target.max(1), Ordering::SeqCst);
        self.restart_generation();
    }

    /// Replaces the block under construction's header, keeping its bundled
    /// claims. Cancels any in-flight generation.
    pub fn set_name_header(&self, header: super::NameHeader) {
        {
            let mut block = self.shared.block.lock().unwrap();
            let mut next = (**block).clone();
            next.header = header;
            *block = Arc::new(next);
        }
        self.restart_generation();
    }

    /// Bundles another claim into the block under construction and
    /// recomputes its Merkle root. Cancels any in-flight generation.
    pub fn add_name_trx(&self, trx: super::NameTrx) {
        {
            let mut block = self.shared.block.lock().unwrap();
            let mut next = (**block).clone();
            next.trxs.push(trx);
            next.header.trx_merkle_root = super::name_merkle_root(&next.trxs);
            *block = Arc::new(next);
        }
        self.restart_generation();
    }

    /// Starts (or restarts) the worker pool mining the current block at the
    /// given effort, in `[0.0, 1.0]`. Lower effort sleeps longer between
    /// sweeps that find nothing, trading hash rate for CPU headroom.
    pub fn start(&self, effort: f64) {
        let Some(found_tx) = self.found_tx.clone() else {
            return;
        };
        *self.shared.state.lock().unwrap() = MinerState::Starting;
        let effort = effort.clamp(0.0, 1.0);
        self.shared
            .effort_bits
            .store(effort.to_bits(), Ordering::SeqCst);
        let version = self.shared.version.fetch_add(1, Ordering::SeqCst) + 1;
        self.join_workers();

        let mut workers = self.workers.lock().unwrap();
        for thread_id in 0..self.threads {
            let shared = Arc::clone(&self.shared);
            let threads = self.threads;
            let found_tx = found_tx.clone();
            workers.push(thread::spawn(move || {
                worker_loop(thread_id, threads, shared, found_tx, version, effort);
            }));
        }
        *self.shared.state.lock().unwrap() = MinerState::Mining;
        debug!(threads = self.threads, effort, "name miner started");
    }

    /// Stops mining and waits for every worker thread to exit.
    pub fn stop(&self) {
        *self.shared.state.lock().unwrap() = MinerState::Stopping;
        self.shared.version.fetch_add(1, Ordering::SeqCst);
        self.join_workers();
        *self.shared.state.lock().unwrap() = MinerState::Idle;
    }

    /// Cancels the current generation (if any) without changing the mining
    /// state; used by the setters so a header/target/claim change takes
    /// effect immediately if currently mining.
    fn restart_generation(&self) {
        let was_mining = matches!(self.state(), MinerState::Mining | MinerState::Starting);
        if was_mining {
            let effort = f64::from_bits(self.shared.effort_bits.load(Ordering::SeqCst));
            self.start(effort);
        } else {
            self.shared.version.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn join_workers(&self) {
        let handles: Vec<JoinHandle<()>> = self.workers.lock().unwrap().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("name miner worker thread panicked");
            }
        }
    }
}

impl Drop for NameMiner {
    fn drop(&mut self) {
        self.stop();
        // Drop our sender before joining so the callback thread's `recv`
        // sees the channel close and exits instead of blocking forever.
        self.found_tx.take();
        if let Some(handle) = self.callback_thread.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    thread_id: u32,
    threads: u32,
    shared: Arc<Shared>,
    found_tx: SyncSender<NameBlock>,
    version: u64,
    effort: f64,
) {
    let sleep_for = Duration::from_millis(5) + Duration::from_secs_f64(1.0 - effort);
    loop {
        if shared.version.load(Ordering::SeqCst) != version {
            return;
        }
        let block = Arc::clone(&shared.block.lock().unwrap());
        let target = shared.target.load(Ordering::SeqCst);
        let mut header = block.header;

        let mut nonce = thread_id;
        while nonce < NONCE_SPACE {
            if shared.version.load(Ordering::SeqCst) != version {
                return;
            }
            header.noncea = nonce;
            let difficulty = chain_primitives::difficulty224(header.pow_hash().as_bytes());
            if difficulty >= target {
                if shared
                    .version
                    .compare_exchange(version, version + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    let mut found = (*block).clone();
                    found.header.noncea = nonce;
                    let _ = found_tx.try_send(found);
                }
                return;
            }
            nonce += threads;
        }

        thread::sleep(sleep_for);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    struct ChannelDelegate(mpsc::Sender<NameBlock>);
    impl NameMinerDelegate for ChannelDelegate {
        fn found_name_block(&self, block: NameBlock) {
            let _ = self.0.send(block);
        }
    }

    #[test]
    fn miner_finds_a_block_at_trivial_target() {
        let miner = NameMiner::new(2);
        let (tx, rx) = mpsc::channel();
        miner.set_delegate(Arc::new(ChannelDelegate(tx)));
        miner.set_block_target(1);
        miner.start(1.0);

        let found = rx.recv_timeout(Duration::from_secs(5));
        miner.stop();
        assert!(found.is_ok());
    }

    #[test]
    fn stop_transitions_to_idle() {
        let miner = NameMiner::new(1);
        miner.start(1.0);
        miner.stop();
        assert_eq!(miner.state(), MinerState::Idle);
    }

    #[test]
    fn replacing_header_cancels_the_stale_generation() {
        let miner = NameMiner::new(1);
        let (tx, rx) = mpsc::channel();
        miner.set_delegate(Arc::new(ChannelDelegate(tx)));
        // An unreachable target keeps the first generation from ever finding
        // a block on its own, so only a version bump can end it.
        miner.set_block_target(u64::MAX);
        miner.start(1.0);
        thread::sleep(Duration::from_millis(20));

        let mut replacement = super::super::genesis_name_block();
        replacement.header.timestamp = 1;
        miner.set_name_header(replacement.header);
        miner.set_block_target(1);

        let found = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(found.header.timestamp, 1);
        miner.stop();
    }
}
