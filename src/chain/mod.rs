// src/chain/mod.rs
//! Chain access used by the refresh coordinator and the read path.

pub mod storage;
pub mod substrate;

pub use substrate::SubstrateRpcClient;

use crate::error::Result;
use crate::types::ChainReference;
use async_trait::async_trait;
use std::sync::Arc;

/// Opens sessions against a chain endpoint.
#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn ChainSession>>;

    /// Rejects account ids this chain could never hold, before any connection is made.
    fn validate_account(&self, _hotkey: &str) -> Result<()> {
        Ok(())
    }
}

/// An open connection. Callers must `close` it on every exit path.
#[async_trait]
pub trait ChainSession: Send + Sync {
    /// The current head, used to pin every read of one cycle.
    async fn current_reference(&self) -> Result<ChainReference>;

    /// All `(hotkey, dividend)` pairs of one subnet at `reference`.
    async fn range_query(&self, netuid: u16, reference: &ChainReference)
        -> Result<Vec<(String, u64)>>;

    /// A single entry; `None` when the chain holds no value.
    async fn point_query(
        &self,
        netuid: u16,
        hotkey: &str,
        reference: &ChainReference,
    ) -> Result<Option<u64>>;

    async fn close(&self) {}
}
