use std::path::PathBuf;
use std::str::FromStr as _;

use anyhow::{Context as _, Result};
use bitcoin::{Address, Network, ScriptBuf};
use clap::{Parser as _, Subcommand};
use ln_btc_swap::chain::htlc::{Htlc, HtlcOutputType};
use ln_btc_swap::lightning::invoice::payment_hash_from_bolt11;
use ln_btc_swap::swap::SwapHash;
use ln_btc_swap::swap::store::{SqliteSwapStore, StoredSwap};
use serde_json::json;

#[derive(Debug, clap::Parser)]
struct Args {
    /// Chain network: bitcoin, testnet, signet or regtest.
    #[arg(long, default_value = "regtest")]
    network: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Derive the swap script and address for a set of contract terms.
    HtlcAddress {
        #[arg(long)]
        cltv_expiry: u32,

        /// Hex compressed sender public key.
        #[arg(long)]
        sender_key: String,

        /// Hex compressed receiver public key.
        #[arg(long)]
        receiver_key: String,

        /// Hex payment hash; alternatively extracted from --invoice.
        #[arg(long)]
        payment_hash: Option<String>,

        #[arg(long)]
        invoice: Option<String>,

        /// p2wsh or np2wsh.
        #[arg(long, default_value = "p2wsh")]
        output_type: String,
    },
    /// Decode a swap witness script and print the terms it commits to.
    VerifyScript {
        #[arg(long)]
        witness_script: String,
    },
    ListSwaps {
        #[arg(long)]
        store_path: PathBuf,
    },
    GetSwap {
        #[arg(long)]
        store_path: PathBuf,

        #[arg(long)]
        hash: String,
    },
}

fn main() -> Result<()> {
    ln_btc_swap::logging::init().ok();
    let args = Args::parse();

    let network = Network::from_str(&args.network)
        .map_err(|_| anyhow::anyhow!("unknown network: {}", args.network))?;

    let out = match args.command {
        Command::HtlcAddress {
            cltv_expiry,
            sender_key,
            receiver_key,
            payment_hash,
            invoice,
            output_type,
        } => {
            let sender_key = parse_key(&sender_key).context("parse sender_key")?;
            let receiver_key = parse_key(&receiver_key).context("parse receiver_key")?;

            let payment_hash = match (payment_hash, invoice) {
                (Some(hash), None) => *SwapHash::from_str(&hash)
                    .context("parse payment_hash")?
                    .as_bytes(),
                (None, Some(invoice)) => {
                    payment_hash_from_bolt11(&invoice).context("parse invoice")?
                }
                _ => anyhow::bail!("exactly one of --payment-hash and --invoice is required"),
            };

            let output_type = parse_output_type(&output_type)?;
            let htlc = Htlc::new(
                cltv_expiry,
                &sender_key,
                &receiver_key,
                &payment_hash,
                output_type,
                network,
            )
            .context("derive htlc")?;

            json!({
              "payment_hash": hex::encode(payment_hash),
              "address": htlc.address.to_string(),
              "witness_script": hex::encode(htlc.script.as_bytes()),
              "script_pubkey": hex::encode(htlc.script_pubkey().as_bytes()),
            })
        }
        Command::VerifyScript { witness_script } => {
            let bytes = hex::decode(&witness_script).context("decode witness_script hex")?;
            let script = ScriptBuf::from(bytes);
            let terms = Htlc::parse_witness_script(&script).context("parse witness script")?;

            json!({
              "cltv_expiry": terms.cltv_expiry,
              "sender_key": hex::encode(terms.sender_key),
              "receiver_key": hex::encode(terms.receiver_key),
              "payment_hash_ripemd160": hex::encode(terms.payment_hash_ripemd160),
              "p2wsh_address": Address::p2wsh(&script, network).to_string(),
              "np2wsh_address": Address::p2shwsh(&script, network).to_string(),
            })
        }
        Command::ListSwaps { store_path } => {
            let store = SqliteSwapStore::open(store_path).context("open swap store")?;
            let swaps = store.list_swaps().context("list swaps")?;
            json!(swaps.iter().map(swap_json).collect::<Vec<_>>())
        }
        Command::GetSwap { store_path, hash } => {
            let store = SqliteSwapStore::open(store_path).context("open swap store")?;
            let hash = SwapHash::from_str(&hash).context("parse hash")?;
            let swap = store
                .get_swap(hash)
                .context("get swap")?
                .context("swap not found")?;

            swap_json(&swap)
        }
    };

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn parse_key(hex_key: &str) -> Result<[u8; 33]> {
    let bytes = hex::decode(hex_key).context("decode key hex")?;
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("key must be 33 bytes"))
}

fn parse_output_type(s: &str) -> Result<HtlcOutputType> {
    match s {
        "p2wsh" => Ok(HtlcOutputType::P2wsh),
        "np2wsh" => Ok(HtlcOutputType::NestedP2wsh),
        other => anyhow::bail!("unknown output type: {other}"),
    }
}

fn swap_json(swap: &StoredSwap) -> serde_json::Value {
    let cost = swap.cost();

    json!({
      "hash": swap.hash.to_string(),
      "swap_type": swap.swap_type.as_str(),
      "state": swap.state().as_str(),
      "cost": {
        "server_sats": cost.server_sats,
        "onchain_sats": cost.onchain_sats,
        "offchain_sats": cost.offchain_sats,
      },
      "htlc_address": swap.htlc_address,
      "contract": {
        "cltv_expiry": swap.contract.cltv_expiry,
        "amount_sats": swap.contract.amount_sats,
        "sender_key": hex::encode(swap.contract.sender_key),
        "receiver_key": hex::encode(swap.contract.receiver_key),
        "initiation_height": swap.contract.initiation_height,
      },
      "updates": swap.updates.len(),
    })
}
