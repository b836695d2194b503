pub mod htlc;

use anyhow::Result;
use async_trait::async_trait;
use bitcoin::{Network, Transaction, Txid};

/// Interface to the backing chain/wallet service. Swap drivers use it for
/// chain queries and transaction publication; the kernel itself only reads
/// the chain parameters at construction.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain parameters for address derivation. Synchronous: kit
    /// construction must not perform I/O.
    fn network(&self) -> Network;

    async fn tip_height(&self) -> Result<u32>;

    async fn broadcast_transaction(&self, tx: &Transaction) -> Result<Txid>;

    async fn get_transaction(&self, txid: &Txid) -> Result<Option<Transaction>>;
}
