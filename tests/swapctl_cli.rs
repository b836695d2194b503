use anyhow::{Context as _, Result};
use assert_cmd::Command;
use bitcoin::Network;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use ln_btc_swap::chain::htlc::{Htlc, HtlcOutputType};
use predicates::prelude::*;

fn test_key(seed: u8) -> [u8; 33] {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[seed; 32]).expect("secret key");
    secret.public_key(&secp).serialize()
}

#[test]
fn htlc_address_command_matches_library_derivation() -> Result<()> {
    let sender = test_key(0x11);
    let receiver = test_key(0x22);
    let payment_hash = [9u8; 32];

    let htlc = Htlc::new(
        800_000,
        &sender,
        &receiver,
        &payment_hash,
        HtlcOutputType::P2wsh,
        Network::Bitcoin,
    )
    .context("derive htlc")?;

    let sender_hex = hex::encode(sender);
    let receiver_hex = hex::encode(receiver);
    let payment_hash_hex = hex::encode(payment_hash);

    let mut cmd = Command::cargo_bin("swapctl").context("find swapctl binary")?;
    cmd.args([
        "--network",
        "bitcoin",
        "htlc-address",
        "--cltv-expiry",
        "800000",
        "--sender-key",
        sender_hex.as_str(),
        "--receiver-key",
        receiver_hex.as_str(),
        "--payment-hash",
        payment_hash_hex.as_str(),
    ]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(htlc.address.to_string()));
    Ok(())
}

#[test]
fn verify_script_command_recovers_terms() -> Result<()> {
    let sender = test_key(0x11);
    let receiver = test_key(0x22);
    let payment_hash = [9u8; 32];

    let htlc = Htlc::new(
        800_000,
        &sender,
        &receiver,
        &payment_hash,
        HtlcOutputType::P2wsh,
        Network::Bitcoin,
    )
    .context("derive htlc")?;

    let script_hex = hex::encode(htlc.script.as_bytes());

    let mut cmd = Command::cargo_bin("swapctl").context("find swapctl binary")?;
    cmd.args([
        "--network",
        "bitcoin",
        "verify-script",
        "--witness-script",
        script_hex.as_str(),
    ]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("800000"))
        .stdout(predicate::str::contains(hex::encode(sender)))
        .stdout(predicate::str::contains(htlc.address.to_string()));
    Ok(())
}

#[test]
fn htlc_address_rejects_short_key() -> Result<()> {
    let short_key_hex = hex::encode([0x11u8; 32]);
    let receiver_hex = hex::encode(test_key(0x22));
    let payment_hash_hex = hex::encode([9u8; 32]);

    let mut cmd = Command::cargo_bin("swapctl").context("find swapctl binary")?;
    cmd.args([
        "htlc-address",
        "--cltv-expiry",
        "800000",
        "--sender-key",
        short_key_hex.as_str(),
        "--receiver-key",
        receiver_hex.as_str(),
        "--payment-hash",
        payment_hash_hex.as_str(),
    ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("sender_key"));
    Ok(())
}
