use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::chain::ChainClient;
use crate::chain::htlc::{Htlc, HtlcError, HtlcOutputType};
use crate::swap::server::SwapServerClient;
use crate::swap::store::SwapStore;
use crate::swap::{SwapContract, SwapCost, SwapHash, SwapInfo, SwapState, SwapStateData, SwapType};

/// Service handles injected into every swap. Built once at process start;
/// cloning clones the `Arc`s. An unusable handle surfaces on first use by a
/// driver, not here.
#[derive(Clone)]
pub struct SwapConfig {
    pub chain: Arc<dyn ChainClient>,
    pub store: Arc<dyn SwapStore>,
    pub server: Arc<dyn SwapServerClient>,
}

/// Runtime execution environment handed to drivers, as opposed to the
/// static [`SwapConfig`] dependencies.
#[derive(Clone)]
pub struct ExecuteConfig {
    /// Single-slot hand-off to the status subscriber. Capacity one: a send
    /// suspends until the previous snapshot has been drained.
    pub status_tx: mpsc::Sender<SwapInfo>,
}

impl ExecuteConfig {
    /// Build an execute config together with the subscriber end of its
    /// status channel.
    pub fn channel() -> (Self, mpsc::Receiver<SwapInfo>) {
        let (status_tx, status_rx) = mpsc::channel(1);
        (Self { status_tx }, status_rx)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UpdateError {
    /// The caller's token fired before the subscriber took the snapshot.
    /// Fatal only to this one broadcast; the swap itself may continue.
    #[error("status update cancelled")]
    Cancelled,
    #[error("status subscriber is gone")]
    SubscriberGone,
}

/// Per-swap execution context shared by all swap variants.
///
/// A kit is owned by exactly one driver task for the lifetime of the swap;
/// that driver mutates `state`, `cost` and `height` directly and calls
/// [`SwapKit::send_update`] after every transition it wants externally
/// visible. The kit provides no locking of its own.
pub struct SwapKit {
    pub hash: SwapHash,
    pub swap_type: SwapType,
    pub htlc: Htlc,

    /// Most recently observed chain height relevant to this swap; updated
    /// by the owning driver.
    pub height: u32,

    pub state: SwapState,
    pub cost: SwapCost,
    /// Unset until the first status broadcast.
    pub last_update: Option<SystemTime>,

    pub contract: Arc<SwapContract>,
    pub config: SwapConfig,

    span: tracing::Span,
}

impl std::fmt::Debug for SwapKit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapKit")
            .field("hash", &self.hash)
            .field("swap_type", &self.swap_type)
            .field("htlc", &self.htlc)
            .field("height", &self.height)
            .field("state", &self.state)
            .field("cost", &self.cost)
            .field("last_update", &self.last_update)
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

impl SwapKit {
    /// Build the execution context for a new swap.
    ///
    /// Derives the expected on-chain swap script and address from the
    /// contract terms; a malformed contract aborts construction. Performs
    /// no I/O: persisting the initial record is the caller's job.
    pub fn new(
        hash: SwapHash,
        swap_type: SwapType,
        config: SwapConfig,
        contract: Arc<SwapContract>,
        output_type: HtlcOutputType,
    ) -> Result<Self, HtlcError> {
        let htlc = Htlc::new(
            contract.cltv_expiry,
            &contract.sender_key,
            &contract.receiver_key,
            hash.as_bytes(),
            output_type,
            config.chain.network(),
        )?;

        // All lines for this swap carry its hash.
        let span = tracing::info_span!("swap", hash = %hash);
        span.in_scope(|| tracing::info!(htlc_address = %htlc.address, "htlc address"));

        Ok(Self {
            hash,
            swap_type,
            htlc,
            height: 0,
            state: SwapState::Initiated,
            cost: SwapCost::default(),
            last_update: None,
            contract,
            config,
            span,
        })
    }

    /// The shape handed to the store when persisting this swap's progress.
    pub fn state_data(&self) -> SwapStateData {
        SwapStateData {
            state: self.state,
            cost: self.cost,
        }
    }

    /// Report the current state to the status subscriber.
    ///
    /// The snapshot is assembled before the suspending send, so
    /// cancellation never leaves the kit half-updated; it only means this
    /// snapshot was not delivered. No retry happens here: the driver
    /// decides whether a missed notification is fatal.
    pub async fn send_update(
        &mut self,
        cancel: &CancelToken,
        exec: &ExecuteConfig,
    ) -> Result<(), UpdateError> {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let now = SystemTime::now();
        self.last_update = Some(now);

        let info = SwapInfo {
            contract: (*self.contract).clone(),
            hash: self.hash,
            swap_type: self.swap_type,
            state: self.state,
            cost: self.cost,
            last_update: now,
            htlc_address: self.htlc.address.clone(),
        };

        self.span
            .in_scope(|| tracing::info!(state = %info.state, "state update"));

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UpdateError::Cancelled),
            res = exec.status_tx.send(info) => res.map_err(|_| UpdateError::SubscriberGone),
        }
    }
}

/// The uniform execution contract every swap variant implements, letting a
/// scheduler drive a mixed set of swaps without knowing concrete types.
/// Errors are opaque to the kernel; propagation policy belongs to the
/// scheduler.
#[async_trait]
pub trait GenericSwap: Send {
    async fn execute(
        &mut self,
        cancel: CancelToken,
        exec: &ExecuteConfig,
        height: u32,
    ) -> Result<()>;
}
