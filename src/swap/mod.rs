pub mod kit;
pub mod server;
pub mod store;

use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

use anyhow::Result;
use bitcoin::Address;
use bitcoin::hashes::{Hash as _, sha256};
use serde::{Deserialize, Serialize};

/// Direction of the value exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapType {
    /// Off-chain funds in, on-chain funds out.
    LoopOut,
    /// On-chain funds in, off-chain funds out.
    LoopIn,
}

impl SwapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapType::LoopOut => "loop_out",
            SwapType::LoopIn => "loop_in",
        }
    }
}

impl fmt::Display for SwapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a swap. Every swap starts `Initiated`; drivers own
/// the intermediate transitions. Once a terminal state is reached the swap
/// must not be mutated further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapState {
    Initiated,
    HtlcPublished,
    PreimageRevealed,
    InvoiceSettled,
    Success,
    FailOffchainPayments,
    FailTimeout,
    FailInsufficientValue,
}

impl SwapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapState::Initiated => "initiated",
            SwapState::HtlcPublished => "htlc_published",
            SwapState::PreimageRevealed => "preimage_revealed",
            SwapState::InvoiceSettled => "invoice_settled",
            SwapState::Success => "success",
            SwapState::FailOffchainPayments => "fail_offchain_payments",
            SwapState::FailTimeout => "fail_timeout",
            SwapState::FailInsufficientValue => "fail_insufficient_value",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            SwapState::Initiated
            | SwapState::HtlcPublished
            | SwapState::PreimageRevealed
            | SwapState::InvoiceSettled => false,
            SwapState::Success
            | SwapState::FailOffchainPayments
            | SwapState::FailTimeout
            | SwapState::FailInsufficientValue => true,
        }
    }
}

impl fmt::Display for SwapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "initiated" => Ok(SwapState::Initiated),
            "htlc_published" => Ok(SwapState::HtlcPublished),
            "preimage_revealed" => Ok(SwapState::PreimageRevealed),
            "invoice_settled" => Ok(SwapState::InvoiceSettled),
            "success" => Ok(SwapState::Success),
            "fail_offchain_payments" => Ok(SwapState::FailOffchainPayments),
            "fail_timeout" => Ok(SwapState::FailTimeout),
            "fail_insufficient_value" => Ok(SwapState::FailInsufficientValue),
            other => anyhow::bail!("unknown swap state: {other}"),
        }
    }
}

/// Sats moved and spent so far, accumulated by the owning driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapCost {
    /// Paid to the swap counterparty.
    pub server_sats: u64,
    pub onchain_sats: u64,
    pub offchain_sats: u64,
}

impl SwapCost {
    pub fn total_sats(&self) -> u64 {
        self.server_sats
            .saturating_add(self.onchain_sats)
            .saturating_add(self.offchain_sats)
    }
}

/// The persistable portion of a swap's mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapStateData {
    pub state: SwapState,
    pub cost: SwapCost,
}

/// 32-byte payment hash; the swap's identity and primary key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapHash([u8; 32]);

impl SwapHash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_preimage(preimage: &[u8; 32]) -> Self {
        Self(sha256::Hash::hash(preimage).to_byte_array())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for SwapHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for SwapHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SwapHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapHash({})", hex::encode(self.0))
    }
}

impl FromStr for SwapHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| anyhow::anyhow!("decode swap hash: {e}"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("swap hash must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

/// Terms both parties agreed to. Owned by the caller, shared into the kit,
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapContract {
    /// Absolute block height after which the sender may reclaim funds.
    pub cltv_expiry: u32,
    pub amount_sats: u64,
    /// Compressed secp256k1 keys as supplied by wire or storage.
    pub sender_key: [u8; 33],
    pub receiver_key: [u8; 33],
    pub initiation_height: u32,
    pub initiation_time: SystemTime,
}

/// Point-in-time snapshot of a swap, published on every status update.
#[derive(Debug, Clone)]
pub struct SwapInfo {
    pub contract: SwapContract,
    pub hash: SwapHash,
    pub swap_type: SwapType,
    pub state: SwapState,
    pub cost: SwapCost,
    pub last_update: SystemTime,
    pub htlc_address: Address,
}

impl SwapInfo {
    pub fn state_data(&self) -> SwapStateData {
        SwapStateData {
            state: self.state,
            cost: self.cost,
        }
    }
}
