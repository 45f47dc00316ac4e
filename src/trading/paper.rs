// src/trading/paper.rs
//! Simulated stake submission with a virtual stake ledger.

use super::{tao_to_rao, StakeAction, StakeReceipt, StakeSubmitter, RAO_PER_TAO};
use crate::error::{DividendError, Result};
use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct StakeLedger {
    /// (netuid, hotkey) -> staked rao
    positions: HashMap<(u16, String), u64>,
    history: Vec<StakeReceipt>,
}

/// Records stake deltas against virtual positions. Unstaking never goes below zero.
#[derive(Debug, Default)]
pub struct PaperStakeSubmitter {
    ledger: RwLock<StakeLedger>,
    next_tx: AtomicU64,
}

impl PaperStakeSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position_tao(&self, netuid: u16, hotkey: &str) -> f64 {
        self.ledger
            .read()
            .map(|l| l.positions.get(&(netuid, hotkey.to_string())).copied().unwrap_or(0))
            .unwrap_or(0) as f64
            / RAO_PER_TAO as f64
    }

    pub fn history(&self) -> Vec<StakeReceipt> {
        self.ledger.read().map(|l| l.history.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StakeSubmitter for PaperStakeSubmitter {
    async fn submit_stake_delta(&self, hotkey: &str, netuid: u16, signed_amount: f64) -> Result<StakeReceipt> {
        if !signed_amount.is_finite() {
            return Err(DividendError::TradeError(format!("invalid stake amount {}", signed_amount)));
        }
        let action = StakeAction::for_delta(signed_amount);
        let requested = tao_to_rao(signed_amount);

        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| DividendError::TradeError("paper stake ledger poisoned".to_string()))?;
        let position = ledger.positions.entry((netuid, hotkey.to_string())).or_insert(0);
        let moved = match action {
            StakeAction::AddStake => {
                *position = position.saturating_add(requested);
                requested
            }
            StakeAction::Unstake => {
                let moved = requested.min(*position);
                if moved < requested {
                    warn!(
                        "Paper unstake of {} rao on {}/{} capped at position {}",
                        requested, netuid, hotkey, *position
                    );
                }
                *position -= moved;
                moved
            }
            StakeAction::NoAction => 0,
        };

        let receipt = StakeReceipt {
            tx_id: format!("paper-{}", self.next_tx.fetch_add(1, Ordering::Relaxed) + 1),
            action,
            netuid,
            hotkey: hotkey.to_string(),
            amount_tao: moved as f64 / RAO_PER_TAO as f64,
            simulated: true,
        };
        info!(
            "[PAPER] {:?} {:.4} TAO on {}/{} -> position {:.4} TAO",
            action,
            receipt.amount_tao,
            netuid,
            hotkey,
            *position as f64 / RAO_PER_TAO as f64
        );
        ledger.history.push(receipt.clone());
        Ok(receipt)
    }
}
