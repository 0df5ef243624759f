// ===============================
// src/confirm.rs (confirmation waiter)
// ===============================
//
// Poll-with-budget over ledger rounds:
// - confirmed-round > 0        -> Confirmed (checked first)
// - non-empty pool-error       -> Rejected, immediately
// - query error / nothing yet  -> transient, retried, still costs one round
// - budget exhausted           -> TimedOut
// - cancel flag raised         -> Cancelled (never reported as a timeout)
// - round wait failing MAX_ROUND_WAIT_FAILURES times in a row -> Submission error
// Pacing is always "wait for the next round", never a fixed sleep.
//
use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::domain::{ConfirmedTx, TxId};
use crate::error::{Result, SeedError};
use crate::ledger::{PendingStatus, StatusSource};
use crate::metrics::{CONFIRMATIONS, CONFIRM_ROUNDS, TRANSIENT_QUERY_ERRORS};

const MAX_ROUND_WAIT_FAILURES: u32 = 3;
const ROUND_WAIT_BACKOFF: Duration = Duration::from_millis(50);

/// Raised (set to `true`) to abort the run; observed between stages and mid-wait.
pub type CancelFlag = watch::Receiver<bool>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Confirmed(ConfirmedTx),
    Rejected { reason: String },
    TimedOut { rounds: u64 },
    Cancelled,
}

impl WaitOutcome {
    fn label(&self) -> &'static str {
        match self {
            WaitOutcome::Confirmed(_) => "confirmed",
            WaitOutcome::Rejected { .. } => "rejected",
            WaitOutcome::TimedOut { .. } => "timeout",
            WaitOutcome::Cancelled => "cancelled",
        }
    }
}

/// Book-keeping for one transaction between submission and a terminal outcome.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub txid: TxId,
    pub submitted_round: u64,
    pub polls: u64,
}

pub fn is_cancelled(cancel: &CancelFlag) -> bool {
    *cancel.borrow()
}

async fn cancelled(rx: &mut CancelFlag) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // sender gone: nobody can cancel any more
            std::future::pending::<()>().await;
        }
    }
}

fn into_confirmed(txid: &TxId, st: PendingStatus) -> ConfirmedTx {
    ConfirmedTx {
        txid: txid.clone(),
        confirmed_round: st.confirmed_round.unwrap_or(0),
        application_index: st.application_index,
        asset_index: st.asset_index,
        inner_transfers: st.inner_transfers,
        logs: st.logs,
    }
}

async fn poll_until_terminal<S: StatusSource>(
    source: &S,
    pending: &mut PendingOperation,
    last_round: &mut u64,
    max_rounds: u64,
    cancel: &mut CancelFlag,
) -> Result<WaitOutcome> {
    let txid = pending.txid.clone();
    let mut wait_failures: u32 = 0;
    for _ in 0..max_rounds {
        if is_cancelled(cancel) {
            return Ok(WaitOutcome::Cancelled);
        }

        pending.polls += 1;
        match source.query_status(&txid).await {
            Ok(st) if st.is_confirmed() => return Ok(WaitOutcome::Confirmed(into_confirmed(&txid, st))),
            Ok(st) => {
                if let Some(reason) = st.rejection() {
                    return Ok(WaitOutcome::Rejected { reason: reason.to_string() });
                }
            }
            Err(e) => {
                TRANSIENT_QUERY_ERRORS.inc();
                debug!(%txid, polls = pending.polls, %e, "not visible yet");
            }
        }

        let next = tokio::select! {
            biased;
            _ = cancelled(cancel) => return Ok(WaitOutcome::Cancelled),
            next = source.wait_for_round_after(*last_round) => next,
        };
        match next {
            Ok(r) => {
                wait_failures = 0;
                *last_round = r.max(*last_round + 1);
            }
            Err(e) => {
                wait_failures += 1;
                if wait_failures >= MAX_ROUND_WAIT_FAILURES {
                    return Err(SeedError::Submission(format!(
                        "round wait for {txid} failed {wait_failures} times: {e}"
                    )));
                }
                warn!(%txid, %e, failures = wait_failures, "round wait failed, backing off");
                tokio::select! {
                    biased;
                    _ = cancelled(cancel) => return Ok(WaitOutcome::Cancelled),
                    _ = sleep(ROUND_WAIT_BACKOFF * wait_failures) => {}
                }
                *last_round += 1;
            }
        }
    }
    Ok(WaitOutcome::TimedOut { rounds: max_rounds })
}

pub async fn wait_for_confirmation<S: StatusSource>(
    source: &S,
    txid: &TxId,
    max_rounds: u64,
    cancel: &CancelFlag,
) -> Result<WaitOutcome> {
    let mut cancel = cancel.clone();
    let start = source
        .last_round()
        .await
        .map_err(|e| SeedError::Submission(format!("status query for {txid} failed: {e}")))?;

    let mut pending = PendingOperation { txid: txid.clone(), submitted_round: start, polls: 0 };
    let mut last_round = start;
    let outcome = poll_until_terminal(source, &mut pending, &mut last_round, max_rounds, &mut cancel).await?;

    CONFIRMATIONS.with_label_values(&[outcome.label()]).inc();
    CONFIRM_ROUNDS.observe(last_round.saturating_sub(pending.submitted_round) as f64);
    match &outcome {
        WaitOutcome::Confirmed(tx) => {
            debug!(%txid, round = tx.confirmed_round, polls = pending.polls, "confirmed")
        }
        WaitOutcome::Rejected { reason } => warn!(%txid, %reason, "rejected by ledger"),
        WaitOutcome::TimedOut { rounds } => warn!(%txid, rounds, "confirmation timed out"),
        WaitOutcome::Cancelled => info!(%txid, polls = pending.polls, "wait cancelled"),
    }
    Ok(outcome)
}

/// [`wait_for_confirmation`] folded into the error taxonomy.
pub async fn confirm<S: StatusSource>(
    source: &S,
    txid: &TxId,
    max_rounds: u64,
    cancel: &CancelFlag,
) -> Result<ConfirmedTx> {
    match wait_for_confirmation(source, txid, max_rounds, cancel).await? {
        WaitOutcome::Confirmed(tx) => Ok(tx),
        WaitOutcome::Rejected { reason } => Err(SeedError::Rejected { txid: txid.clone(), reason }),
        WaitOutcome::TimedOut { rounds } => {
            Err(SeedError::ConfirmationTimeout { txid: txid.clone(), rounds })
        }
        WaitOutcome::Cancelled => Err(SeedError::Cancelled {
            context: format!("waiting for {txid}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a fixed list of status answers; afterwards reports "pending".
    struct Scripted {
        script: Mutex<VecDeque<Result<PendingStatus>>>,
        round: AtomicU64,
        queries: AtomicU64,
        advances: AtomicU64,
        failing_waits: AtomicU64,
        stall: bool,
    }

    impl Scripted {
        fn new(script: Vec<Result<PendingStatus>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                round: AtomicU64::new(100),
                queries: AtomicU64::new(0),
                advances: AtomicU64::new(0),
                failing_waits: AtomicU64::new(0),
                stall: false,
            }
        }
    }

    impl StatusSource for Scripted {
        async fn last_round(&self) -> Result<u64> {
            Ok(self.round.load(Ordering::SeqCst))
        }

        async fn query_status(&self, _txid: &TxId) -> Result<PendingStatus> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PendingStatus::default()))
        }

        async fn wait_for_round_after(&self, round: u64) -> Result<u64> {
            if self.stall {
                std::future::pending::<()>().await;
            }
            if self.failing_waits.load(Ordering::SeqCst) > 0 {
                self.failing_waits.fetch_sub(1, Ordering::SeqCst);
                return Err(SeedError::Submission("connection refused".into()));
            }
            self.advances.fetch_add(1, Ordering::SeqCst);
            self.round.store(round + 1, Ordering::SeqCst);
            Ok(round + 1)
        }
    }

    fn not_found() -> Result<PendingStatus> {
        Err(SeedError::Submission("404 transaction not found".into()))
    }

    fn confirmed_at(round: u64) -> Result<PendingStatus> {
        Ok(PendingStatus { confirmed_round: Some(round), application_index: Some(77), ..Default::default() })
    }

    fn never_cancelled() -> CancelFlag {
        let (tx, rx) = watch::channel(false);
        // keep the sender alive for the test's duration
        std::mem::forget(tx);
        rx
    }

    fn tx() -> TxId {
        TxId("ABC".into())
    }

    #[tokio::test]
    async fn retries_not_found_then_confirms() {
        let src = Scripted::new(vec![not_found(), not_found(), not_found(), confirmed_at(104)]);
        let out = wait_for_confirmation(&src, &tx(), 10, &never_cancelled()).await.unwrap();
        match out {
            WaitOutcome::Confirmed(c) => {
                assert_eq!(c.confirmed_round, 104);
                assert_eq!(c.application_index, Some(77));
                assert_eq!(c.txid, tx());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(src.advances.load(Ordering::SeqCst), 3);
        assert_eq!(src.queries.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn rejection_fails_fast() {
        let rejected = Ok(PendingStatus { pool_error: Some("overspend".into()), ..Default::default() });
        let src = Scripted::new(vec![rejected]);
        let out = wait_for_confirmation(&src, &tx(), 60, &never_cancelled()).await.unwrap();
        assert_eq!(out, WaitOutcome::Rejected { reason: "overspend".into() });
        assert_eq!(src.queries.load(Ordering::SeqCst), 1);
        assert_eq!(src.advances.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_pool_error_is_still_pending() {
        let empty = Ok(PendingStatus { pool_error: Some(String::new()), ..Default::default() });
        let src = Scripted::new(vec![empty, confirmed_at(101)]);
        let out = wait_for_confirmation(&src, &tx(), 5, &never_cancelled()).await.unwrap();
        assert!(matches!(out, WaitOutcome::Confirmed(_)));
        assert_eq!(src.advances.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn times_out_after_exact_budget() {
        let src = Scripted::new(vec![not_found(), not_found()]);
        let out = wait_for_confirmation(&src, &tx(), 5, &never_cancelled()).await.unwrap();
        assert_eq!(out, WaitOutcome::TimedOut { rounds: 5 });
        assert_eq!(src.queries.load(Ordering::SeqCst), 5);
        assert_eq!(src.advances.load(Ordering::SeqCst), 5);

        let err = confirm(&src, &tx(), 3, &never_cancelled()).await.unwrap_err();
        match err {
            SeedError::ConfirmationTimeout { txid, rounds } => {
                assert_eq!(txid, tx());
                assert_eq!(rounds, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn confirm_maps_rejection_with_txid() {
        let rejected = Ok(PendingStatus { pool_error: Some("logic eval error".into()), ..Default::default() });
        let src = Scripted::new(vec![not_found(), rejected]);
        let err = confirm(&src, &tx(), 10, &never_cancelled()).await.unwrap_err();
        assert!(matches!(err, SeedError::Rejected { ref txid, ref reason } if *txid == tx() && reason == "logic eval error"));
    }

    #[tokio::test]
    async fn cancelled_before_first_poll() {
        let (tx_cancel, rx) = watch::channel(false);
        tx_cancel.send(true).unwrap();
        let src = Scripted::new(vec![]);
        let out = wait_for_confirmation(&src, &tx(), 10, &rx).await.unwrap();
        assert_eq!(out, WaitOutcome::Cancelled);
        assert_eq!(src.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancelled_mid_wait_is_not_a_timeout() {
        let (tx_cancel, rx) = watch::channel(false);
        let mut src = Scripted::new(vec![not_found()]);
        src.stall = true;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = tx_cancel.send(true);
        });
        let err = confirm(&src, &tx(), 10, &rx).await.unwrap_err();
        assert!(matches!(err, SeedError::Cancelled { .. }), "{err:?}");
        assert_eq!(src.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn node_outage_is_a_submission_error_not_a_timeout() {
        let src = Scripted::new(vec![]);
        src.failing_waits.store(1_000, Ordering::SeqCst);
        let err = confirm(&src, &tx(), 60, &never_cancelled()).await.unwrap_err();
        assert!(matches!(err, SeedError::Submission(ref m) if m.contains("connection refused")), "{err:?}");
        assert_eq!(src.queries.load(Ordering::SeqCst), MAX_ROUND_WAIT_FAILURES as u64);
    }

    #[tokio::test]
    async fn single_round_wait_failure_is_retried() {
        let src = Scripted::new(vec![not_found(), not_found(), confirmed_at(103)]);
        src.failing_waits.store(1, Ordering::SeqCst);
        let out = wait_for_confirmation(&src, &tx(), 10, &never_cancelled()).await.unwrap();
        assert!(matches!(out, WaitOutcome::Confirmed(ref c) if c.confirmed_round == 103), "{out:?}");
        assert_eq!(src.advances.load(Ordering::SeqCst), 1);
    }
}
