//! Scripted transfer tool with an optional gate holding transfers in flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sluice_fsops::{TransferOutcome, TransferRequest, TransferTool};
use tokio::sync::Semaphore;

/// [`TransferTool`] returning queued outcomes, then a default one.
#[derive(Debug)]
pub struct ScriptedTransfer {
    outcomes: Mutex<VecDeque<TransferOutcome>>,
    fallback: TransferOutcome,
    requests: Mutex<Vec<TransferRequest>>,
    gate: Option<Semaphore>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransfer {
    fn with_fallback(fallback: TransferOutcome, gated: bool) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            fallback,
            requests: Mutex::new(Vec::new()),
            gate: gated.then(|| Semaphore::new(0)),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Every transfer succeeds immediately.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::with_fallback(TransferOutcome::Succeeded, false)
    }

    /// Every transfer fails immediately with `reason`.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self::with_fallback(
            TransferOutcome::Failed {
                reason: reason.to_string(),
            },
            false,
        )
    }

    /// Transfers succeed, but only once [`release`](Self::release) lets them finish.
    #[must_use]
    pub fn gated() -> Self {
        Self::with_fallback(TransferOutcome::Succeeded, true)
    }

    /// Queue outcomes consumed in order before the fallback applies.
    #[must_use]
    pub fn then(self, outcome: TransferOutcome) -> Self {
        lock(&self.outcomes).push_back(outcome);
        self
    }

    /// Let `count` held transfers finish.
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Requests received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<TransferRequest> {
        lock(&self.requests).clone()
    }

    /// Transfers currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous transfers observed.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl TransferTool for ScriptedTransfer {
    async fn transfer(&self, request: &TransferRequest) -> TransferOutcome {
        lock(&self.requests).push(request.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let outcome = lock(&self.outcomes)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn request(name: &str) -> TransferRequest {
        TransferRequest {
            local_path: PathBuf::from(format!("/d/{name}")),
            rel_path: name.to_string(),
        }
    }

    #[tokio::test]
    async fn queued_outcomes_precede_fallback() {
        let tool = ScriptedTransfer::succeeding().then(TransferOutcome::Failed {
            reason: "quota".into(),
        });
        assert!(!tool.transfer(&request("a")).await.is_success());
        assert!(tool.transfer(&request("b")).await.is_success());
        assert_eq!(tool.requests().len(), 2);
    }

    #[tokio::test]
    async fn gate_holds_transfers_until_released() {
        let tool = Arc::new(ScriptedTransfer::gated());
        let worker = {
            let tool = Arc::clone(&tool);
            tokio::spawn(async move { tool.transfer(&request("a")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(tool.in_flight(), 1);

        tool.release(1);
        let outcome = worker.await.expect("join");
        assert!(outcome.is_success());
        assert_eq!(tool.in_flight(), 0);
        assert_eq!(tool.peak_in_flight(), 1);
    }
}
