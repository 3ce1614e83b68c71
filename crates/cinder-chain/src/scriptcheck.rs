//! Parallel script verification.
//!
//! The controller pushes [`ScriptCheck`] jobs while holding the chain lock,
//! then blocks until the batch drains. Each job is pure over immutable
//! snapshots of the two transactions, so workers hold no chain locks and
//! results are deterministic regardless of scheduling. One failing job
//! fails the batch and raises a shared abort flag that workers consult
//! before executing further jobs. A pool of zero threads runs every check
//! inline on the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use cinder_core::constants::MAX_SCRIPTCHECK_THREADS;
use cinder_core::script;
use cinder_core::types::{Block, Transaction};

pub const SCRIPT_VERIFY_NONE: u32 = 0;
pub const SCRIPT_VERIFY_P2SH: u32 = 1 << 0;
pub const SCRIPT_VERIFY_STRICTENC: u32 = 1 << 1;

/// Flags applied to transactions entering the mempool.
pub const STANDARD_SCRIPT_VERIFY_FLAGS: u32 = SCRIPT_VERIFY_P2SH | SCRIPT_VERIFY_STRICTENC;

/// Flags applied during block connect.
pub const STRICT_FLAGS: u32 = SCRIPT_VERIFY_P2SH;

/// The external script evaluator seam.
///
/// Stack evaluation and ECDSA live outside the consensus core; the
/// validator only requires this interface.
pub trait ScriptEngine: Send + Sync {
    /// Verify input `n_in` of `tx_to` against the output of `tx_from` it
    /// spends.
    fn verify_input(
        &self,
        tx_from: &Transaction,
        tx_to: &Transaction,
        n_in: usize,
        flags: u32,
    ) -> bool;

    /// Verify the header signature of a proof-of-stake block against the
    /// coin-stake output owner.
    fn verify_block_signature(&self, block: &Block) -> bool;
}

/// Structural stand-in for the full interpreter: checks the shape of the
/// spend without evaluating signatures. Deployments plug a real evaluator
/// in through [`ScriptEngine`].
pub struct StructuralScriptEngine;

impl ScriptEngine for StructuralScriptEngine {
    fn verify_input(
        &self,
        tx_from: &Transaction,
        tx_to: &Transaction,
        n_in: usize,
        flags: u32,
    ) -> bool {
        let Some(input) = tx_to.vin.get(n_in) else {
            return false;
        };
        let Some(prev_out) = tx_from.vout.get(input.prevout.n as usize) else {
            return false;
        };
        if input.sig_script.is_empty() || !script::is_push_only(&input.sig_script) {
            return false;
        }
        if flags & SCRIPT_VERIFY_STRICTENC != 0 && script::solve(&prev_out.pub_key_script).is_none()
        {
            return false;
        }
        true
    }

    fn verify_block_signature(&self, block: &Block) -> bool {
        if block.is_proof_of_work() {
            return block.signature.is_empty();
        }
        // The coin-stake reward output must be a recognizable key script
        // and the signature must be present for its owner to have signed.
        let stake = &block.vtx[1];
        match stake.vout.get(1) {
            Some(out) => !block.signature.is_empty() && script::solve(&out.pub_key_script).is_some(),
            None => false,
        }
    }
}

/// One queued verification job.
#[derive(Clone)]
pub struct ScriptCheck {
    pub tx_from: Arc<Transaction>,
    pub tx_to: Arc<Transaction>,
    pub n_in: usize,
    pub flags: u32,
}

impl ScriptCheck {
    fn run(&self, engine: &dyn ScriptEngine) -> bool {
        engine.verify_input(&self.tx_from, &self.tx_to, self.n_in, self.flags)
    }
}

struct BatchState {
    remaining: Mutex<usize>,
    drained: Condvar,
    failed: AtomicBool,
    abort: AtomicBool,
}

/// Bounded worker pool consuming a FIFO of script checks.
pub struct ScriptCheckPool {
    engine: Arc<dyn ScriptEngine>,
    sender: Option<Sender<ScriptCheck>>,
    workers: Vec<JoinHandle<()>>,
    state: Arc<BatchState>,
    /// One batch in flight at a time; the dispatcher owns the barrier.
    batch_gate: Mutex<()>,
}

impl ScriptCheckPool {
    /// Spawn `threads` workers (clamped to [`MAX_SCRIPTCHECK_THREADS`]).
    /// Zero threads means inline checking.
    pub fn new(threads: usize, engine: Arc<dyn ScriptEngine>) -> Self {
        let threads = threads.min(MAX_SCRIPTCHECK_THREADS);
        let state = Arc::new(BatchState {
            remaining: Mutex::new(0),
            drained: Condvar::new(),
            failed: AtomicBool::new(false),
            abort: AtomicBool::new(false),
        });

        if threads == 0 {
            return Self { engine, sender: None, workers: Vec::new(), state, batch_gate: Mutex::new(()) };
        }

        let (sender, receiver) = std::sync::mpsc::channel::<ScriptCheck>();
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = Vec::with_capacity(threads);
        for _ in 0..threads {
            let receiver = Arc::clone(&receiver);
            let engine = Arc::clone(&engine);
            let state = Arc::clone(&state);
            workers.push(std::thread::spawn(move || {
                worker_loop(&receiver, &*engine, &state);
            }));
        }

        Self { engine, sender: Some(sender), workers, state, batch_gate: Mutex::new(()) }
    }

    /// Run a batch to completion. Returns `false` if any check failed;
    /// remaining queued work is skipped once a failure is seen.
    pub fn dispatch(&self, checks: Vec<ScriptCheck>) -> bool {
        if checks.is_empty() {
            return true;
        }

        let Some(sender) = &self.sender else {
            return checks.iter().all(|check| check.run(&*self.engine));
        };

        let _batch = self.batch_gate.lock();
        self.state.failed.store(false, Ordering::SeqCst);
        self.state.abort.store(false, Ordering::SeqCst);
        *self.state.remaining.lock() = checks.len();

        for check in checks {
            if sender.send(check).is_err() {
                // Workers are gone; fall back to a failed batch.
                return false;
            }
        }

        let mut remaining = self.state.remaining.lock();
        while *remaining > 0 {
            self.state.drained.wait(&mut remaining);
        }
        !self.state.failed.load(Ordering::SeqCst)
    }
}

impl Drop for ScriptCheckPool {
    fn drop(&mut self) {
        self.state.abort.store(true, Ordering::SeqCst);
        self.sender = None;
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    receiver: &Mutex<Receiver<ScriptCheck>>,
    engine: &dyn ScriptEngine,
    state: &BatchState,
) {
    loop {
        let job = {
            let guard = receiver.lock();
            guard.recv()
        };
        let Ok(check) = job else {
            // Channel closed: pool shut down.
            return;
        };

        // Cooperative cancellation: skip execution once the batch failed.
        if !state.abort.load(Ordering::SeqCst) && !check.run(engine) {
            state.failed.store(true, Ordering::SeqCst);
            state.abort.store(true, Ordering::SeqCst);
        }

        let mut remaining = state.remaining.lock();
        *remaining -= 1;
        if *remaining == 0 {
            state.drained.notify_all();
        }
    }
}
