use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use async_trait::async_trait;
use bitcoin::{Network, Transaction, Txid};
use ln_btc_swap::chain::ChainClient;
use ln_btc_swap::chain::htlc::HtlcOutputType;
use ln_btc_swap::swap::kit::{SwapConfig, SwapKit};
use ln_btc_swap::swap::server::{SwapQuote, SwapServerClient, SwapTerms};
use ln_btc_swap::swap::store::{StoredSwap, SwapStore, SwapUpdate};
use ln_btc_swap::swap::{SwapContract, SwapHash, SwapType};

pub struct MockChain {
    pub network: Network,
}

#[async_trait]
impl ChainClient for MockChain {
    fn network(&self) -> Network {
        self.network
    }

    async fn tip_height(&self) -> Result<u32> {
        Ok(0)
    }

    async fn broadcast_transaction(&self, _tx: &Transaction) -> Result<Txid> {
        anyhow::bail!("broadcast is not supported by the mock chain")
    }

    async fn get_transaction(&self, _txid: &Txid) -> Result<Option<Transaction>> {
        Ok(None)
    }
}

pub struct NullStore;

#[async_trait]
impl SwapStore for NullStore {
    async fn create_swap(
        &self,
        _hash: SwapHash,
        _swap_type: SwapType,
        _contract: &SwapContract,
        _htlc_address: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn update_swap(&self, _hash: SwapHash, _update: SwapUpdate) -> Result<()> {
        Ok(())
    }

    async fn fetch_swap(&self, _hash: SwapHash) -> Result<Option<StoredSwap>> {
        Ok(None)
    }

    async fn fetch_swaps(&self) -> Result<Vec<StoredSwap>> {
        Ok(Vec::new())
    }
}

pub struct NullServer;

#[async_trait]
impl SwapServerClient for NullServer {
    async fn terms(&self, _swap_type: SwapType) -> Result<SwapTerms> {
        Ok(SwapTerms {
            min_swap_amount_sats: 0,
            max_swap_amount_sats: u64::MAX,
        })
    }

    async fn quote(&self, _swap_type: SwapType, _amount_sats: u64) -> Result<SwapQuote> {
        Ok(SwapQuote {
            swap_fee_sats: 0,
            prepay_amount_sats: 0,
            cltv_delta: 0,
        })
    }

    async fn push_preimage(&self, _preimage: [u8; 32]) -> Result<()> {
        Ok(())
    }
}

pub fn test_config(network: Network) -> SwapConfig {
    SwapConfig {
        chain: Arc::new(MockChain { network }),
        store: Arc::new(NullStore),
        server: Arc::new(NullServer),
    }
}

pub fn test_key(seed: u8) -> [u8; 33] {
    let secp = bitcoin::secp256k1::Secp256k1::new();
    let secret = bitcoin::secp256k1::SecretKey::from_slice(&[seed; 32]).expect("secret key");
    secret.public_key(&secp).serialize()
}

pub fn test_contract() -> SwapContract {
    SwapContract {
        cltv_expiry: 800_000,
        amount_sats: 250_000,
        sender_key: test_key(0x11),
        receiver_key: test_key(0x22),
        initiation_height: 799_000,
        initiation_time: SystemTime::now(),
    }
}

pub fn test_kit(hash: SwapHash, swap_type: SwapType, network: Network) -> Result<SwapKit> {
    let kit = SwapKit::new(
        hash,
        swap_type,
        test_config(network),
        Arc::new(test_contract()),
        HtlcOutputType::P2wsh,
    )?;
    Ok(kit)
}
