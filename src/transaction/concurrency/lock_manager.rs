use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::common::types::{Rid, TxnId};
use crate::transaction::concurrency::transaction::{
    IsolationLevel, Transaction, TransactionState,
};
use crate::transaction::concurrency::transaction_manager::TransactionRegistry;

/// How often the background detector scans for cycles.
pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    #[error("Transaction {0} is aborted")]
    TransactionAborted(TxnId),

    #[error("Transaction {0} tried to acquire a lock while shrinking")]
    LockOnShrinking(TxnId),

    #[error("Transaction {0} requested a shared lock under READ UNCOMMITTED")]
    SharedLockOnReadUncommitted(TxnId),

    #[error("Transaction {0} lost an upgrade race")]
    UpgradeConflict(TxnId),

    #[error("Transaction {0} does not hold a lock on the record")]
    LockNotHeld(TxnId),
}

#[derive(Debug, Clone, Copy)]
struct LockRequest {
    txn_id: TxnId,
    mode: LockMode,
    granted: bool,
}

#[derive(Default)]
struct QueueState {
    requests: VecDeque<LockRequest>,
    /// At most one transaction may be upgrading on a queue at a time.
    upgrading: Option<TxnId>,
}

/// Per-record FIFO request queue. Waiters sleep on `cv` and re-check
/// compatibility whenever the queue changes.
#[derive(Default)]
struct LockRequestQueue {
    state: Mutex<QueueState>,
    cv: Condvar,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InStack,
    Visited,
}

#[derive(Default)]
struct Shutdown {
    stop: Mutex<bool>,
    cv: Condvar,
}

/// Strict two-phase-locking coordinator over record ids.
///
/// Latch order: `lock_table` latch before any queue latch, never the
/// reverse. Blocking happens only on queue condvars, with the table
/// latch released.
pub struct LockManager {
    lock_table: Mutex<HashMap<Rid, Arc<LockRequestQueue>>>,
    waits_for: Mutex<HashMap<TxnId, Vec<TxnId>>>,
    registry: Arc<TransactionRegistry>,
    shutdown: Arc<Shutdown>,
    detector: Mutex<Option<JoinHandle<()>>>,
}

impl LockManager {
    /// Create a lock manager with background cycle detection.
    pub fn new(registry: Arc<TransactionRegistry>) -> Arc<Self> {
        Self::with_detection(registry, Some(DEFAULT_DETECTION_INTERVAL))
    }

    /// Create a lock manager; `interval = None` disables the detector so
    /// tests can drive `detect_deadlocks` by hand.
    pub fn with_detection(
        registry: Arc<TransactionRegistry>,
        interval: Option<Duration>,
    ) -> Arc<Self> {
        let lock_manager = Arc::new(Self {
            lock_table: Mutex::new(HashMap::new()),
            waits_for: Mutex::new(HashMap::new()),
            registry,
            shutdown: Arc::new(Shutdown::default()),
            detector: Mutex::new(None),
        });

        if let Some(interval) = interval {
            let weak = Arc::downgrade(&lock_manager);
            let shutdown = lock_manager.shutdown.clone();
            let handle = thread::spawn(move || Self::run_cycle_detection(weak, shutdown, interval));
            *lock_manager.detector.lock() = Some(handle);
            log::debug!("cycle detection thread launched");
        }

        lock_manager
    }

    /// Acquire a shared lock on `rid`, blocking until granted or the
    /// transaction is aborted.
    pub fn lock_shared(&self, txn: &Transaction, rid: Rid) -> Result<(), LockError> {
        match txn.state() {
            TransactionState::Aborted => return Err(LockError::TransactionAborted(txn.id())),
            TransactionState::Shrinking => {
                return Err(self.abort_implicitly(txn, LockError::LockOnShrinking(txn.id())))
            }
            _ => {}
        }
        if txn.isolation_level() == IsolationLevel::ReadUncommitted {
            return Err(
                self.abort_implicitly(txn, LockError::SharedLockOnReadUncommitted(txn.id()))
            );
        }

        self.acquire(txn, rid, LockMode::Shared)
    }

    /// Acquire an exclusive lock on `rid`, blocking until granted or the
    /// transaction is aborted.
    pub fn lock_exclusive(&self, txn: &Transaction, rid: Rid) -> Result<(), LockError> {
        match txn.state() {
            TransactionState::Aborted => return Err(LockError::TransactionAborted(txn.id())),
            TransactionState::Shrinking => {
                return Err(self.abort_implicitly(txn, LockError::LockOnShrinking(txn.id())))
            }
            _ => {}
        }

        self.acquire(txn, rid, LockMode::Exclusive)
    }

    /// Upgrade a held shared lock to exclusive. Fails if another
    /// transaction is already upgrading on this queue.
    pub fn lock_upgrade(&self, txn: &Transaction, rid: Rid) -> Result<(), LockError> {
        match txn.state() {
            TransactionState::Aborted => return Err(LockError::TransactionAborted(txn.id())),
            TransactionState::Shrinking => {
                return Err(self.abort_implicitly(txn, LockError::LockOnShrinking(txn.id())))
            }
            _ => {}
        }

        let queue = self.queue_for(rid);
        let mut state = queue.state.lock();

        if state.upgrading.is_some() {
            return Err(self.abort_implicitly(txn, LockError::UpgradeConflict(txn.id())));
        }

        {
            let request = state
                .requests
                .iter_mut()
                .find(|r| r.txn_id == txn.id())
                .ok_or(LockError::LockNotHeld(txn.id()))?;
            request.granted = false;
            request.mode = LockMode::Exclusive;
        }
        state.upgrading = Some(txn.id());

        loop {
            if txn.state() == TransactionState::Aborted {
                state.upgrading = None;
                Self::remove_request(&mut state, txn.id());
                queue.cv.notify_all();
                return Err(LockError::TransactionAborted(txn.id()));
            }
            if Self::is_upgrade_compatible(&state, txn.id()) {
                break;
            }
            queue.cv.wait(&mut state);
        }

        if let Some(request) = state.requests.iter_mut().find(|r| r.txn_id == txn.id()) {
            request.granted = true;
        }
        state.upgrading = None;
        queue.cv.notify_all();
        drop(state);

        txn.remove_shared_lock(rid);
        txn.add_exclusive_lock(rid);
        Ok(())
    }

    /// Release the transaction's lock on `rid` and wake the queue.
    ///
    /// Under repeatable read or stricter, the first unlock of a growing
    /// transaction moves it to the shrinking phase.
    pub fn unlock(&self, txn: &Transaction, rid: Rid) -> Result<(), LockError> {
        let queue = self
            .get_queue(rid)
            .ok_or(LockError::LockNotHeld(txn.id()))?;

        {
            let mut state = queue.state.lock();
            if !Self::remove_request(&mut state, txn.id()) {
                return Err(LockError::LockNotHeld(txn.id()));
            }
            if state.upgrading == Some(txn.id()) {
                state.upgrading = None;
            }
            queue.cv.notify_all();
        }

        if txn.state() == TransactionState::Growing
            && matches!(
                txn.isolation_level(),
                IsolationLevel::RepeatableRead | IsolationLevel::Serializable
            )
        {
            txn.set_state(TransactionState::Shrinking);
        }

        txn.remove_shared_lock(rid);
        txn.remove_exclusive_lock(rid);
        Ok(())
    }

    /// Drop every request the transaction has in any queue, without phase
    /// transitions. Commit/abort path.
    pub fn release_all(&self, txn: &Transaction) {
        for rid in txn.locked_rids() {
            if let Some(queue) = self.get_queue(rid) {
                let mut state = queue.state.lock();
                if state.upgrading == Some(txn.id()) {
                    state.upgrading = None;
                }
                Self::remove_request(&mut state, txn.id());
                queue.cv.notify_all();
            }
        }
        txn.clear_lock_sets();
    }

    /// One full detection pass: rebuild the waits-for graph and abort
    /// youngest-victim cycles until none remain.
    pub fn detect_deadlocks(&self) {
        let lock_table = self.lock_table.lock();

        loop {
            self.build_waits_for_graph(&lock_table);
            let victim = {
                let graph = self.waits_for.lock();
                Self::find_cycle(&graph)
            };
            let Some(victim) = victim else { break };

            log::debug!("deadlock detected, aborting youngest transaction {victim}");
            if let Some(txn) = self.registry.get(victim) {
                txn.set_state(TransactionState::Aborted);
            }
            for queue in lock_table.values() {
                let mut state = queue.state.lock();
                if state.upgrading == Some(victim) {
                    state.upgrading = None;
                }
                let had_request = state.requests.iter().any(|r| r.txn_id == victim);
                state.requests.retain(|r| r.txn_id != victim);
                if had_request {
                    queue.cv.notify_all();
                }
            }
        }
    }

    /// Add edge `t1 → t2`, keeping adjacency sorted by ascending txn id.
    pub fn add_edge(&self, t1: TxnId, t2: TxnId) {
        let mut graph = self.waits_for.lock();
        Self::insert_edge(&mut graph, t1, t2);
    }

    pub fn remove_edge(&self, t1: TxnId, t2: TxnId) {
        let mut graph = self.waits_for.lock();
        if let Some(edges) = graph.get_mut(&t1) {
            if let Ok(pos) = edges.binary_search(&t2) {
                edges.remove(pos);
            }
        }
    }

    /// Every edge in the waits-for graph, sorted. Testing hook.
    pub fn edge_list(&self) -> Vec<(TxnId, TxnId)> {
        let graph = self.waits_for.lock();
        let mut edges: Vec<(TxnId, TxnId)> = graph
            .iter()
            .flat_map(|(&t1, targets)| targets.iter().map(move |&t2| (t1, t2)))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Search the current graph for a cycle; returns the youngest
    /// transaction on the first cycle found.
    pub fn has_cycle(&self) -> Option<TxnId> {
        let graph = self.waits_for.lock();
        Self::find_cycle(&graph)
    }

    fn acquire(&self, txn: &Transaction, rid: Rid, mode: LockMode) -> Result<(), LockError> {
        let queue = self.queue_for(rid);
        let mut state = queue.state.lock();

        state.requests.push_back(LockRequest {
            txn_id: txn.id(),
            mode,
            granted: false,
        });

        loop {
            if txn.state() == TransactionState::Aborted {
                Self::remove_request(&mut state, txn.id());
                queue.cv.notify_all();
                return Err(LockError::TransactionAborted(txn.id()));
            }
            if Self::is_lock_compatible(&state, txn.id()) {
                break;
            }
            queue.cv.wait(&mut state);
        }

        if let Some(request) = state.requests.iter_mut().find(|r| r.txn_id == txn.id()) {
            request.granted = true;
        }
        // A fresh grant can make the next waiter compatible too.
        queue.cv.notify_all();
        drop(state);

        match mode {
            LockMode::Shared => txn.add_shared_lock(rid),
            LockMode::Exclusive => txn.add_exclusive_lock(rid),
        }
        Ok(())
    }

    /// An upgrade waits until its own request is the only granted one
    /// left; queue position does not matter for the upgrader.
    fn is_upgrade_compatible(state: &QueueState, txn_id: TxnId) -> bool {
        state
            .requests
            .iter()
            .all(|r| r.txn_id == txn_id || !r.granted)
    }

    /// FIFO compatibility: scanning from the head, every request ahead of
    /// ours must already be granted and compatible with our mode; the scan
    /// stops at our own request.
    fn is_lock_compatible(state: &QueueState, txn_id: TxnId) -> bool {
        let Some(to_check) = state.requests.iter().find(|r| r.txn_id == txn_id) else {
            return false;
        };

        for earlier in &state.requests {
            if earlier.txn_id == txn_id {
                return true;
            }
            let compatible = earlier.granted
                && earlier.mode != LockMode::Exclusive
                && to_check.mode != LockMode::Exclusive;
            if !compatible {
                return false;
            }
        }
        true
    }

    fn abort_implicitly(&self, txn: &Transaction, error: LockError) -> LockError {
        txn.set_state(TransactionState::Aborted);
        error
    }

    fn queue_for(&self, rid: Rid) -> Arc<LockRequestQueue> {
        self.lock_table.lock().entry(rid).or_default().clone()
    }

    fn get_queue(&self, rid: Rid) -> Option<Arc<LockRequestQueue>> {
        self.lock_table.lock().get(&rid).cloned()
    }

    fn remove_request(state: &mut QueueState, txn_id: TxnId) -> bool {
        let before = state.requests.len();
        state.requests.retain(|r| r.txn_id != txn_id);
        state.requests.len() != before
    }

    /// Rebuild the graph from scratch: one edge per (ungranted, granted)
    /// pair sharing a queue.
    fn build_waits_for_graph(&self, lock_table: &HashMap<Rid, Arc<LockRequestQueue>>) {
        let mut graph = self.waits_for.lock();
        graph.clear();

        for queue in lock_table.values() {
            let state = queue.state.lock();
            for waiter in state.requests.iter().filter(|r| !r.granted) {
                for holder in state.requests.iter().filter(|r| r.granted) {
                    if holder.txn_id != waiter.txn_id {
                        Self::insert_edge(&mut graph, waiter.txn_id, holder.txn_id);
                    }
                }
            }
        }
    }

    fn insert_edge(graph: &mut HashMap<TxnId, Vec<TxnId>>, t1: TxnId, t2: TxnId) {
        let edges = graph.entry(t1).or_default();
        if let Err(pos) = edges.binary_search(&t2) {
            edges.insert(pos, t2);
        }
    }

    /// Repeated DFS from the smallest unvisited vertex. Deterministic:
    /// vertices and adjacency are both examined in ascending id order.
    fn find_cycle(graph: &HashMap<TxnId, Vec<TxnId>>) -> Option<TxnId> {
        let mut vertices: Vec<TxnId> = graph.keys().copied().collect();
        vertices.sort_unstable();

        let mut visited: HashMap<TxnId, Visit> = HashMap::new();
        let mut stack: Vec<TxnId> = Vec::new();

        for vertex in vertices {
            if visited.contains_key(&vertex) {
                continue;
            }
            if let Some(victim) = Self::dfs(vertex, graph, &mut visited, &mut stack) {
                return Some(victim);
            }
        }
        None
    }

    fn dfs(
        vertex: TxnId,
        graph: &HashMap<TxnId, Vec<TxnId>>,
        visited: &mut HashMap<TxnId, Visit>,
        stack: &mut Vec<TxnId>,
    ) -> Option<TxnId> {
        visited.insert(vertex, Visit::InStack);
        stack.push(vertex);

        if let Some(edges) = graph.get(&vertex) {
            for &next in edges {
                match visited.get(&next) {
                    None => {
                        if let Some(victim) = Self::dfs(next, graph, visited, stack) {
                            return Some(victim);
                        }
                    }
                    Some(Visit::InStack) => {
                        return Some(Self::youngest_in_cycle(stack, next));
                    }
                    Some(Visit::Visited) => {}
                }
            }
        }

        stack.pop();
        visited.insert(vertex, Visit::Visited);
        None
    }

    /// The victim is the largest txn id on the cycle closed by an edge
    /// back to `entry`: walk the DFS stack from the top down to `entry`.
    fn youngest_in_cycle(stack: &[TxnId], entry: TxnId) -> TxnId {
        let mut youngest = entry;
        for &vertex in stack.iter().rev() {
            youngest = youngest.max(vertex);
            if vertex == entry {
                break;
            }
        }
        youngest
    }

    fn run_cycle_detection(
        lock_manager: Weak<LockManager>,
        shutdown: Arc<Shutdown>,
        interval: Duration,
    ) {
        loop {
            {
                let mut stop = shutdown.stop.lock();
                if !*stop {
                    shutdown.cv.wait_for(&mut stop, interval);
                }
                if *stop {
                    break;
                }
            }
            match lock_manager.upgrade() {
                Some(lock_manager) => lock_manager.detect_deadlocks(),
                None => break,
            }
        }
        log::debug!("cycle detection thread stopped");
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        {
            let mut stop = self.shutdown.stop.lock();
            *stop = true;
            self.shutdown.cv.notify_all();
        }
        if let Some(handle) = self.detector.lock().take() {
            // The final Arc can be dropped by the detector itself; a
            // thread must not join its own handle.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_lock_manager() -> Arc<LockManager> {
        LockManager::with_detection(Arc::new(TransactionRegistry::new()), None)
    }

    #[test]
    fn test_edge_api_keeps_adjacency_sorted() {
        let lock_manager = detached_lock_manager();
        lock_manager.add_edge(0, 2);
        lock_manager.add_edge(0, 1);
        lock_manager.add_edge(0, 1); // duplicate ignored
        lock_manager.add_edge(1, 0);

        assert_eq!(lock_manager.edge_list(), vec![(0, 1), (0, 2), (1, 0)]);

        lock_manager.remove_edge(0, 2);
        assert_eq!(lock_manager.edge_list(), vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_two_cycle_picks_youngest() {
        let lock_manager = detached_lock_manager();
        lock_manager.add_edge(0, 1);
        lock_manager.add_edge(1, 0);

        assert_eq!(lock_manager.has_cycle(), Some(1));
    }

    #[test]
    fn test_three_cycle_picks_youngest() {
        let lock_manager = detached_lock_manager();
        lock_manager.add_edge(0, 1);
        lock_manager.add_edge(1, 2);
        lock_manager.add_edge(2, 0);

        assert_eq!(lock_manager.has_cycle(), Some(2));
    }

    #[test]
    fn test_acyclic_graph_has_no_cycle() {
        let lock_manager = detached_lock_manager();
        lock_manager.add_edge(0, 1);
        lock_manager.add_edge(1, 2);
        lock_manager.add_edge(0, 2);

        assert_eq!(lock_manager.has_cycle(), None);
    }

    #[test]
    fn test_disjoint_component_cycle_found() {
        let lock_manager = detached_lock_manager();
        lock_manager.add_edge(0, 1);
        lock_manager.add_edge(5, 6);
        lock_manager.add_edge(6, 5);

        assert_eq!(lock_manager.has_cycle(), Some(6));
    }

    #[test]
    fn test_removing_edge_breaks_cycle() {
        let lock_manager = detached_lock_manager();
        lock_manager.add_edge(3, 4);
        lock_manager.add_edge(4, 3);
        assert_eq!(lock_manager.has_cycle(), Some(4));

        lock_manager.remove_edge(4, 3);
        assert_eq!(lock_manager.has_cycle(), None);
    }
}
