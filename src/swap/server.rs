use anyhow::Result;
use async_trait::async_trait;

use super::SwapType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapTerms {
    pub min_swap_amount_sats: u64,
    pub max_swap_amount_sats: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapQuote {
    pub swap_fee_sats: u64,
    pub prepay_amount_sats: u64,
    pub cltv_delta: u32,
}

/// Client for the swap counterparty. Drivers negotiate and settle swaps
/// through it; the kernel only carries the handle. The wire protocol behind
/// it is not this crate's concern.
#[async_trait]
pub trait SwapServerClient: Send + Sync {
    async fn terms(&self, swap_type: SwapType) -> Result<SwapTerms>;

    async fn quote(&self, swap_type: SwapType, amount_sats: u64) -> Result<SwapQuote>;

    /// Reveal a settled payment's preimage so the counterparty can sweep
    /// without waiting for the on-chain spend.
    async fn push_preimage(&self, preimage: [u8; 32]) -> Result<()>;
}
