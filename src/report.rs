//! Stdout lines scraped by the supervising process.

use std::io::{self, Write};

use alloy::{hex, primitives::B256};

use crate::transaction::RedeemTransaction;

pub const RATE_LIMIT_MARKER: &str = "RATE_LIMIT_429:";
pub const RATE_LIMIT_RESET_MARKER: &str = "RATE_LIMIT_RESET_SECONDS:";
pub const TALLY_MARKER: &str = "Fatto:";

pub struct Reporter<W: Write> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn rate_limited(&mut self, reset_seconds: u64) -> io::Result<()> {
        match reset_seconds {
            0 => writeln!(self.out, "{RATE_LIMIT_MARKER} unknown")?,
            secs => writeln!(self.out, "{RATE_LIMIT_MARKER} {secs}")?,
        }
        writeln!(self.out, "{RATE_LIMIT_RESET_MARKER} {reset_seconds}")?;
        self.out.flush()
    }

    pub fn tally(&mut self, succeeded: usize, total: usize) -> io::Result<()> {
        writeln!(self.out, "{TALLY_MARKER} {succeeded}/{total}")?;
        self.out.flush()
    }

    pub fn batch_ok(&mut self, claims: usize, tx_hash: &str) -> io::Result<()> {
        writeln!(self.out, "Batch claim OK: {claims} markets, tx: {tx_hash}")
    }

    pub fn batch_error(&mut self, diagnostic: &str) -> io::Result<()> {
        writeln!(self.out, "Batch claim error: {diagnostic}")
    }

    pub fn claim_ok(&mut self, condition_id: &B256, tx_hash: &str) -> io::Result<()> {
        writeln!(self.out, "Claim OK: {condition_id} tx: {tx_hash}")
    }

    pub fn claim_error(&mut self, condition_id: &B256, diagnostic: &str) -> io::Result<()> {
        writeln!(self.out, "Claim error {condition_id}: {diagnostic}")
    }

    pub fn dry_run(&mut self, tx: &RedeemTransaction) -> io::Result<()> {
        writeln!(
            self.out,
            "{} {} {}",
            tx.condition_id,
            tx.to,
            hex::encode_prefixed(&tx.data)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(f: impl FnOnce(&mut Reporter<Vec<u8>>) -> io::Result<()>) -> String {
        let mut reporter = Reporter::new(Vec::new());
        f(&mut reporter).unwrap();
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn known_reset_is_printed_twice() {
        assert_eq!(
            rendered(|r| r.rate_limited(42)),
            "RATE_LIMIT_429: 42\nRATE_LIMIT_RESET_SECONDS: 42\n"
        );
    }

    #[test]
    fn unknown_reset_prints_unknown_and_zero() {
        assert_eq!(
            rendered(|r| r.rate_limited(0)),
            "RATE_LIMIT_429: unknown\nRATE_LIMIT_RESET_SECONDS: 0\n"
        );
    }

    #[test]
    fn tally_line() {
        assert_eq!(rendered(|r| r.tally(2, 3)), "Fatto: 2/3\n");
    }
}
