use std::io::Write;

use alloy_chains::NamedChain;

use crate::{
    classify::{classify, truncate, Failure, DIAGNOSTIC_LIMIT},
    relayer::{Relayer, RelayerError},
    report::Reporter,
    transaction::RedeemTransaction,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub total: usize,
    pub rate_limited: bool,
}

impl Tally {
    pub fn new(succeeded: usize, total: usize) -> Self {
        Self {
            succeeded,
            total,
            rate_limited: false,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        !self.rate_limited && self.succeeded == self.total
    }
}

pub fn explorer_tx_url(chain: NamedChain, tx_hash: &str) -> Option<String> {
    chain
        .etherscan_urls()
        .map(|(_, explorer)| format!("{}/tx/{tx_hash}", explorer.trim_end_matches('/')))
}

fn log_confirmed(chain: NamedChain, tx_hash: &str) {
    match explorer_tx_url(chain, tx_hash) {
        Some(url) => tracing::info!("Transaction confirmed: {url}"),
        None => tracing::info!("Transaction confirmed: {tx_hash}"),
    }
}

/// How a relayed submission ended once the relayer stopped reporting progress.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Settlement {
    Confirmed { tx_hash: String },
    Failed { reason: String },
}

async fn submit<R: Relayer>(
    relayer: &R,
    transactions: &[RedeemTransaction],
    metadata: &str,
) -> Result<Settlement, RelayerError> {
    let pending = relayer.execute(transactions, metadata).await?;

    let settlement = match relayer.wait(&pending).await? {
        Some(txn) if txn.state.is_failed() => Settlement::Failed {
            reason: match txn.transaction_hash {
                Some(hash) => format!("relayer reported {} (tx: {hash})", txn.state.as_str()),
                None => format!("relayer reported {}", txn.state.as_str()),
            },
        },
        Some(txn) => match txn.transaction_hash.or(pending.transaction_hash) {
            Some(tx_hash) => Settlement::Confirmed { tx_hash },
            None => Settlement::Failed {
                reason: "no transactionHash".to_string(),
            },
        },
        None => Settlement::Failed {
            reason: format!("relayer transaction {} did not settle", pending.transaction_id),
        },
    };

    Ok(settlement)
}

/// All claims in a single relayed transaction. Any failure fails the whole batch.
pub async fn claim_batch<R, W>(
    relayer: &R,
    chain: NamedChain,
    transactions: &[RedeemTransaction],
    report: &mut Reporter<W>,
) -> eyre::Result<Tally>
where
    R: Relayer,
    W: Write,
{
    let total = transactions.len();
    if total == 0 {
        report.tally(0, 0)?;
        return Ok(Tally::new(0, 0));
    }

    tracing::info!("Batch: {total} claim(s) in one relayer transaction");

    let metadata = format!("Redeem {total} positions");
    let succeeded = match submit(relayer, transactions, &metadata).await {
        Ok(Settlement::Confirmed { tx_hash }) => {
            log_confirmed(chain, &tx_hash);
            report.batch_ok(total, &tx_hash)?;
            total
        }
        Ok(Settlement::Failed { reason }) => {
            tracing::error!("Batch claim failed: {reason}");
            report.batch_error(&reason)?;
            0
        }
        Err(e) => match classify(&e) {
            Failure::RateLimited { reset_seconds } => {
                tracing::warn!("Relayer rate limit hit (reset in {reset_seconds}s): {e}");
                report.rate_limited(reset_seconds)?;
                return Ok(Tally {
                    succeeded: 0,
                    total,
                    rate_limited: true,
                });
            }
            Failure::Other { diagnostic } => {
                let diagnostic = truncate(&diagnostic, DIAGNOSTIC_LIMIT);
                tracing::error!("Batch claim error: {diagnostic}");
                report.batch_error(diagnostic)?;
                0
            }
        },
    };

    report.tally(succeeded, total)?;
    Ok(Tally::new(succeeded, total))
}

/// One relayed transaction per claim. Stops at the first rate limit, skips past other errors.
pub async fn claim_sequential<R, W>(
    relayer: &R,
    chain: NamedChain,
    transactions: &[RedeemTransaction],
    report: &mut Reporter<W>,
) -> eyre::Result<Tally>
where
    R: Relayer,
    W: Write,
{
    let total = transactions.len();
    let mut succeeded = 0;

    for (i, tx) in transactions.iter().enumerate() {
        tracing::info!("Claim {}/{total}: {}", i + 1, tx.condition_id);

        match submit(relayer, std::slice::from_ref(tx), "Redeem position").await {
            Ok(Settlement::Confirmed { tx_hash }) => {
                succeeded += 1;
                log_confirmed(chain, &tx_hash);
                report.claim_ok(&tx.condition_id, &tx_hash)?;
            }
            Ok(Settlement::Failed { reason }) => {
                tracing::error!("Claim {} failed: {reason}", tx.condition_id);
                report.claim_error(&tx.condition_id, &reason)?;
            }
            Err(e) => match classify(&e) {
                Failure::RateLimited { reset_seconds } => {
                    tracing::warn!(
                        "Relayer rate limit hit after {succeeded}/{total} claims (reset in {reset_seconds}s)"
                    );
                    report.rate_limited(reset_seconds)?;
                    return Ok(Tally {
                        succeeded,
                        total,
                        rate_limited: true,
                    });
                }
                Failure::Other { diagnostic } => {
                    let diagnostic = truncate(&diagnostic, DIAGNOSTIC_LIMIT);
                    tracing::error!("Claim {} error: {diagnostic}", tx.condition_id);
                    report.claim_error(&tx.condition_id, diagnostic)?;
                }
            },
        }
    }

    report.tally(succeeded, total)?;
    Ok(Tally::new(succeeded, total))
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::*;
    use crate::{
        relayer::{PendingTransaction, RelayerTransaction, TransactionState},
        transaction::build_redeem_tx,
    };

    enum Scripted {
        Confirmed(&'static str),
        NoHash,
        Ended(TransactionState, Option<&'static str>),
        Fail(RelayerError),
    }

    /// Replays scripted outcomes, one per `execute` call.
    #[derive(Default)]
    struct ScriptedRelayer {
        outcomes: Mutex<VecDeque<Scripted>>,
        settled: Mutex<VecDeque<RelayerTransaction>>,
        submitted: Mutex<Vec<(usize, String)>>,
    }

    impl ScriptedRelayer {
        fn new(outcomes: impl IntoIterator<Item = Scripted>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                ..Self::default()
            }
        }

        fn submissions(&self) -> Vec<(usize, String)> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Relayer for ScriptedRelayer {
        async fn execute(
            &self,
            transactions: &[RedeemTransaction],
            metadata: &str,
        ) -> Result<PendingTransaction, RelayerError> {
            self.submitted
                .lock()
                .unwrap()
                .push((transactions.len(), metadata.to_string()));

            let (state, hash) = match self.outcomes.lock().unwrap().pop_front() {
                Some(Scripted::Fail(e)) => return Err(e),
                Some(Scripted::Confirmed(hash)) => (TransactionState::Confirmed, Some(hash)),
                Some(Scripted::Ended(state, hash)) => (state, hash),
                Some(Scripted::NoHash) | None => (TransactionState::Confirmed, None),
            };

            let transaction_hash = hash.map(str::to_string);
            self.settled.lock().unwrap().push_back(RelayerTransaction {
                transaction_id: "id".to_string(),
                transaction_hash: transaction_hash.clone(),
                state,
            });

            Ok(PendingTransaction {
                transaction_id: "id".to_string(),
                transaction_hash,
            })
        }

        async fn wait(
            &self,
            _pending: &PendingTransaction,
        ) -> Result<Option<RelayerTransaction>, RelayerError> {
            Ok(self.settled.lock().unwrap().pop_front())
        }
    }

    fn transactions(n: u8) -> Vec<RedeemTransaction> {
        (1..=n)
            .map(|i| build_redeem_tx(&format!("{i:02x}").repeat(32)).unwrap())
            .collect()
    }

    fn rate_limit(body: &str) -> RelayerError {
        RelayerError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: body.to_string(),
        }
    }

    fn generic(body: &str) -> RelayerError {
        RelayerError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: body.to_string(),
        }
    }

    fn output(report: Reporter<Vec<u8>>) -> String {
        String::from_utf8(report.into_inner()).unwrap()
    }

    #[tokio::test]
    async fn batch_success_claims_everything_in_one_call() {
        let relayer = ScriptedRelayer::new([Scripted::Confirmed("0xabc")]);
        let mut report = Reporter::new(Vec::new());

        let tally = claim_batch(&relayer, NamedChain::Polygon, &transactions(3), &mut report)
            .await
            .unwrap();

        assert_eq!(tally, Tally::new(3, 3));
        assert!(tally.all_succeeded());
        assert_eq!(relayer.submissions(), vec![(3, "Redeem 3 positions".to_string())]);

        let out = output(report);
        assert!(out.contains("Batch claim OK: 3 markets, tx: 0xabc"));
        assert!(out.ends_with("Fatto: 3/3\n"));
    }

    #[tokio::test]
    async fn batch_rate_limit_prints_markers_and_fails() {
        let relayer = ScriptedRelayer::new([Scripted::Fail(rate_limit(
            "{\"error\":\"quota exceeded, resets in 42 seconds\"}",
        ))]);
        let mut report = Reporter::new(Vec::new());

        let tally = claim_batch(&relayer, NamedChain::Polygon, &transactions(2), &mut report)
            .await
            .unwrap();

        assert!(tally.rate_limited);
        assert!(!tally.all_succeeded());
        assert_eq!(
            output(report),
            "RATE_LIMIT_429: 42\nRATE_LIMIT_RESET_SECONDS: 42\n"
        );
    }

    #[tokio::test]
    async fn batch_generic_error_fails_every_claim() {
        let relayer = ScriptedRelayer::new([Scripted::Fail(generic("boom"))]);
        let mut report = Reporter::new(Vec::new());

        let tally = claim_batch(&relayer, NamedChain::Polygon, &transactions(2), &mut report)
            .await
            .unwrap();

        assert_eq!(tally, Tally::new(0, 2));
        let out = output(report);
        assert!(out.starts_with("Batch claim error: relayer responded with 500"));
        assert!(out.ends_with("Fatto: 0/2\n"));
    }

    #[tokio::test]
    async fn batch_without_hash_is_a_failure() {
        let relayer = ScriptedRelayer::new([Scripted::NoHash]);
        let mut report = Reporter::new(Vec::new());

        let tally = claim_batch(&relayer, NamedChain::Polygon, &transactions(1), &mut report)
            .await
            .unwrap();

        assert!(!tally.all_succeeded());
        assert_eq!(
            output(report),
            "Batch claim error: no transactionHash\nFatto: 0/1\n"
        );
    }

    #[tokio::test]
    async fn empty_batch_does_not_touch_the_relayer() {
        let relayer = ScriptedRelayer::default();
        let mut report = Reporter::new(Vec::new());

        let tally = claim_batch(&relayer, NamedChain::Polygon, &[], &mut report)
            .await
            .unwrap();

        assert!(tally.all_succeeded());
        assert!(relayer.submissions().is_empty());
        assert_eq!(output(report), "Fatto: 0/0\n");
    }

    #[tokio::test]
    async fn sequential_continues_past_generic_errors() {
        let relayer = ScriptedRelayer::new([
            Scripted::Confirmed("0x01"),
            Scripted::Fail(generic("execution reverted")),
            Scripted::Confirmed("0x03"),
        ]);
        let mut report = Reporter::new(Vec::new());

        let tally = claim_sequential(&relayer, NamedChain::Polygon, &transactions(3), &mut report)
            .await
            .unwrap();

        assert_eq!(tally, Tally::new(2, 3));
        assert!(!tally.all_succeeded());
        assert_eq!(relayer.submissions().len(), 3);
        assert!(relayer
            .submissions()
            .iter()
            .all(|(n, metadata)| *n == 1 && metadata == "Redeem position"));
        assert!(output(report).ends_with("Fatto: 2/3\n"));
    }

    #[tokio::test]
    async fn sequential_stops_at_rate_limit() {
        let relayer = ScriptedRelayer::new([
            Scripted::Confirmed("0x01"),
            Scripted::Fail(rate_limit("Too Many Requests")),
            Scripted::Confirmed("0x03"),
        ]);
        let mut report = Reporter::new(Vec::new());

        let tally = claim_sequential(&relayer, NamedChain::Polygon, &transactions(3), &mut report)
            .await
            .unwrap();

        assert_eq!(
            tally,
            Tally {
                succeeded: 1,
                total: 3,
                rate_limited: true
            }
        );
        assert_eq!(relayer.submissions().len(), 2);

        let out = output(report);
        assert!(out.ends_with("RATE_LIMIT_429: unknown\nRATE_LIMIT_RESET_SECONDS: 0\n"));
        assert!(!out.contains("Fatto:"));
    }

    #[tokio::test]
    async fn sequential_names_the_failed_relayer_state() {
        let relayer = ScriptedRelayer::new([
            Scripted::Ended(TransactionState::Failed, Some("0xdead")),
            Scripted::Ended(TransactionState::Invalid, None),
        ]);
        let txs = transactions(2);
        let mut report = Reporter::new(Vec::new());

        let tally = claim_sequential(&relayer, NamedChain::Polygon, &txs, &mut report)
            .await
            .unwrap();

        assert_eq!(tally, Tally::new(0, 2));
        let out = output(report);
        assert!(out.contains(&format!(
            "Claim error {}: relayer reported STATE_FAILED (tx: 0xdead)",
            txs[0].condition_id
        )));
        assert!(out.contains(&format!(
            "Claim error {}: relayer reported STATE_INVALID\n",
            txs[1].condition_id
        )));
        assert!(!out.contains("no transactionHash"));
        assert!(out.ends_with("Fatto: 0/2\n"));
    }

    #[tokio::test]
    async fn batch_failed_state_is_reported() {
        let relayer = ScriptedRelayer::new([Scripted::Ended(TransactionState::Failed, Some("0xdead"))]);
        let mut report = Reporter::new(Vec::new());

        let tally = claim_batch(&relayer, NamedChain::Polygon, &transactions(2), &mut report)
            .await
            .unwrap();

        assert_eq!(tally, Tally::new(0, 2));
        assert_eq!(
            output(report),
            "Batch claim error: relayer reported STATE_FAILED (tx: 0xdead)\nFatto: 0/2\n"
        );
    }

    #[tokio::test]
    async fn sequential_all_success_exits_clean() {
        let relayer = ScriptedRelayer::new([Scripted::Confirmed("0x01"), Scripted::Confirmed("0x02")]);
        let mut report = Reporter::new(Vec::new());

        let tally = claim_sequential(&relayer, NamedChain::Polygon, &transactions(2), &mut report)
            .await
            .unwrap();

        assert!(tally.all_succeeded());
        assert_eq!(tally.succeeded, tally.total);
    }

    #[test]
    fn explorer_url_for_polygon() {
        assert_eq!(
            explorer_tx_url(NamedChain::Polygon, "0xabc").as_deref(),
            Some("https://polygonscan.com/tx/0xabc")
        );
    }
}
