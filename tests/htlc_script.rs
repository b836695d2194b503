use anyhow::{Context as _, Result};
use bitcoin::hashes::{Hash as _, ripemd160};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Address, Network, Script};
use ln_btc_swap::chain::htlc::{Htlc, HtlcError, HtlcOutputType};

fn test_key(seed: u8) -> [u8; 33] {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[seed; 32]).expect("secret key");
    secret.public_key(&secp).serialize()
}

/// Hand-assembled script template, independent of the builder:
/// OP_SIZE <32> OP_EQUAL OP_IF OP_HASH160 <ripemd160(hash)> OP_EQUALVERIFY
/// <receiver> OP_ELSE OP_DROP <cltv> OP_CLTV OP_DROP <sender> OP_ENDIF
/// OP_CHECKSIG
fn expected_witness_script(
    cltv_push: &[u8],
    sender: &[u8; 33],
    receiver: &[u8; 33],
    payment_hash: &[u8; 32],
) -> Vec<u8> {
    let hash_ripemd160 = ripemd160::Hash::hash(payment_hash).to_byte_array();

    let mut script = vec![0x82, 0x01, 0x20, 0x87, 0x63, 0xa9, 0x14];
    script.extend_from_slice(&hash_ripemd160);
    script.push(0x88);
    script.push(0x21);
    script.extend_from_slice(receiver);
    script.push(0x67);
    script.push(0x75);
    script.extend_from_slice(cltv_push);
    script.push(0xb1);
    script.push(0x75);
    script.push(0x21);
    script.extend_from_slice(sender);
    script.push(0x68);
    script.push(0xac);
    script
}

#[test]
fn witness_script_matches_hand_assembled_bytes() -> Result<()> {
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

    // 800_000 = 0x0c3500, minimally encoded little-endian.
    let expected = expected_witness_script(
        &[0x03, 0x00, 0x35, 0x0c],
        &sender,
        &receiver,
        &payment_hash,
    );
    assert_eq!(htlc.script.as_bytes(), expected.as_slice());

    assert_eq!(
        htlc.address,
        Address::p2wsh(Script::from_bytes(&expected), Network::Bitcoin)
    );
    assert_eq!(htlc.script_pubkey(), htlc.address.script_pubkey());
    Ok(())
}

#[test]
fn nested_output_wraps_the_same_script() -> Result<()> {
    let sender = test_key(0x11);
    let receiver = test_key(0x22);
    let payment_hash = [9u8; 32];

    let native = Htlc::new(
        800_000,
        &sender,
        &receiver,
        &payment_hash,
        HtlcOutputType::P2wsh,
        Network::Bitcoin,
    )
    .context("derive native htlc")?;
    let nested = Htlc::new(
        800_000,
        &sender,
        &receiver,
        &payment_hash,
        HtlcOutputType::NestedP2wsh,
        Network::Bitcoin,
    )
    .context("derive nested htlc")?;

    assert_eq!(native.script, nested.script);
    assert_ne!(native.address, nested.address);
    assert_eq!(
        nested.address,
        Address::p2shwsh(&native.script, Network::Bitcoin)
    );
    Ok(())
}

#[test]
fn derivation_is_deterministic() -> Result<()> {
    let sender = test_key(0x11);
    let receiver = test_key(0x22);
    let payment_hash = [9u8; 32];

    let a = Htlc::new(
        800_000,
        &sender,
        &receiver,
        &payment_hash,
        HtlcOutputType::P2wsh,
        Network::Bitcoin,
    )
    .context("first derivation")?;
    let b = Htlc::new(
        800_000,
        &sender,
        &receiver,
        &payment_hash,
        HtlcOutputType::P2wsh,
        Network::Bitcoin,
    )
    .context("second derivation")?;

    assert_eq!(a.script, b.script);
    assert_eq!(a.address, b.address);
    Ok(())
}

#[test]
fn malformed_keys_are_rejected() {
    let valid = test_key(0x11);
    let invalid = [0u8; 33];
    let payment_hash = [9u8; 32];

    let err = Htlc::new(
        800_000,
        &invalid,
        &valid,
        &payment_hash,
        HtlcOutputType::P2wsh,
        Network::Bitcoin,
    )
    .unwrap_err();
    assert!(matches!(err, HtlcError::InvalidSenderKey(_)));

    let err = Htlc::new(
        800_000,
        &valid,
        &invalid,
        &payment_hash,
        HtlcOutputType::P2wsh,
        Network::Bitcoin,
    )
    .unwrap_err();
    assert!(matches!(err, HtlcError::InvalidReceiverKey(_)));
}

#[test]
fn parse_witness_script_round_trips() -> Result<()> {
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

    let terms = Htlc::parse_witness_script(&htlc.script).context("parse witness script")?;
    assert_eq!(terms.cltv_expiry, 800_000);
    assert_eq!(terms.sender_key, sender);
    assert_eq!(terms.receiver_key, receiver);
    assert!(terms.matches_payment_hash(&payment_hash));
    assert!(!terms.matches_payment_hash(&[0u8; 32]));
    Ok(())
}

#[test]
fn parse_handles_small_number_cltv_encoding() -> Result<()> {
    let sender = test_key(0x11);
    let receiver = test_key(0x22);
    let payment_hash = [9u8; 32];

    // Expiries up to 16 use the OP_PUSHNUM encoding.
    let htlc = Htlc::new(
        5,
        &sender,
        &receiver,
        &payment_hash,
        HtlcOutputType::P2wsh,
        Network::Regtest,
    )
    .context("derive htlc")?;

    let terms = Htlc::parse_witness_script(&htlc.script).context("parse witness script")?;
    assert_eq!(terms.cltv_expiry, 5);
    Ok(())
}

#[test]
fn parse_rejects_tampered_scripts() -> Result<()> {
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

    // Final OP_CHECKSIG swapped for OP_CHECKSIGVERIFY.
    let mut tampered = htlc.script.to_bytes();
    let last = tampered.last_mut().context("non-empty script")?;
    *last = 0xad;
    let err = Htlc::parse_witness_script(Script::from_bytes(&tampered)).unwrap_err();
    assert!(format!("{err}").contains("unexpected instruction"));

    // Trailing instruction after the template.
    let mut extended = htlc.script.to_bytes();
    extended.push(0x75);
    let err = Htlc::parse_witness_script(Script::from_bytes(&extended)).unwrap_err();
    assert!(format!("{err}").contains("trailing"));

    // Truncated script.
    let truncated = &htlc.script.as_bytes()[..htlc.script.len() - 2];
    let err = Htlc::parse_witness_script(Script::from_bytes(truncated)).unwrap_err();
    assert!(format!("{err}").contains("unexpected end"));
    Ok(())
}
