use anyhow::{Context as _, Result};
use bitcoin::hashes::{Hash as _, ripemd160};
use bitcoin::opcodes;
use bitcoin::script::{Builder, Instruction, Script, ScriptBuf};
use bitcoin::secp256k1::{self, PublicKey};
use bitcoin::{Address, Network};
use thiserror::Error;

/// On-chain output encoding of the swap script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtlcOutputType {
    P2wsh,
    NestedP2wsh,
}

#[derive(Debug, Error)]
pub enum HtlcError {
    #[error("invalid sender public key: {0}")]
    InvalidSenderKey(secp256k1::Error),
    #[error("invalid receiver public key: {0}")]
    InvalidReceiverKey(secp256k1::Error),
}

/// The swap script and the address funds are locked to.
///
/// The success path pays the receiver against the payment preimage; after
/// `cltv_expiry` the timeout path refunds the sender.
#[derive(Debug, Clone)]
pub struct Htlc {
    pub output_type: HtlcOutputType,
    pub script: ScriptBuf,
    pub address: Address,
}

/// Contract terms recovered from a witness script by
/// [`Htlc::parse_witness_script`]. The script commits to
/// `ripemd160(payment_hash)`, not the hash itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtlcTerms {
    pub cltv_expiry: u32,
    pub sender_key: [u8; 33],
    pub receiver_key: [u8; 33],
    pub payment_hash_ripemd160: [u8; 20],
}

impl HtlcTerms {
    pub fn matches_payment_hash(&self, payment_hash: &[u8; 32]) -> bool {
        ripemd160::Hash::hash(payment_hash).to_byte_array() == self.payment_hash_ripemd160
    }
}

impl Htlc {
    /// Derive the swap script and address for the given contract terms.
    /// Deterministic; fails only on malformed key material.
    pub fn new(
        cltv_expiry: u32,
        sender_key: &[u8; 33],
        receiver_key: &[u8; 33],
        payment_hash: &[u8; 32],
        output_type: HtlcOutputType,
        network: Network,
    ) -> Result<Self, HtlcError> {
        PublicKey::from_slice(sender_key).map_err(HtlcError::InvalidSenderKey)?;
        PublicKey::from_slice(receiver_key).map_err(HtlcError::InvalidReceiverKey)?;

        let script = witness_script(cltv_expiry, sender_key, receiver_key, payment_hash);

        let address = match output_type {
            HtlcOutputType::P2wsh => Address::p2wsh(&script, network),
            HtlcOutputType::NestedP2wsh => Address::p2shwsh(&script, network),
        };

        Ok(Self {
            output_type,
            script,
            address,
        })
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        self.address.script_pubkey()
    }

    /// Decode a counterparty-provided witness script back into its terms,
    /// rejecting anything that deviates from the expected template.
    pub fn parse_witness_script(witness_script: &Script) -> Result<HtlcTerms> {
        fn next_instruction<'a>(
            iter: &mut impl Iterator<
                Item = std::result::Result<Instruction<'a>, bitcoin::script::Error>,
            >,
        ) -> Result<Instruction<'a>> {
            iter.next()
                .transpose()
                .map_err(|e| anyhow::anyhow!("decode witness script instruction: {e:?}"))?
                .context("unexpected end of witness script")
        }

        fn expect_op(actual: Instruction<'_>, expected: opcodes::Opcode) -> Result<()> {
            match actual {
                Instruction::Op(op) if op == expected => Ok(()),
                other => {
                    anyhow::bail!("unexpected instruction: expected {expected:?}, got {other:?}")
                }
            }
        }

        fn parse_script_num(actual: Instruction<'_>) -> Result<i64> {
            match actual {
                Instruction::PushBytes(bytes) => decode_script_num(bytes.as_bytes()),
                Instruction::Op(op) => {
                    let code = op.to_u8();
                    if code == opcodes::all::OP_PUSHNUM_NEG1.to_u8() {
                        return Ok(-1);
                    }

                    let one = opcodes::all::OP_PUSHNUM_1.to_u8();
                    let sixteen = opcodes::all::OP_PUSHNUM_16.to_u8();
                    if (one..=sixteen).contains(&code) {
                        return Ok(i64::from(code - one + 1));
                    }

                    anyhow::bail!("unexpected opcode where script number expected: {op:?}");
                }
            }
        }

        fn decode_script_num(bytes: &[u8]) -> Result<i64> {
            if bytes.is_empty() {
                return Ok(0);
            }
            if bytes.len() > 8 {
                anyhow::bail!("script number too large: {} bytes", bytes.len());
            }

            let mut magnitude = bytes.to_vec();
            let negative = magnitude.last().is_some_and(|b| (b & 0x80) != 0);
            if let Some(last) = magnitude.last_mut() {
                *last &= 0x7f;
            }

            let mut value: i64 = 0;
            for (i, b) in magnitude.iter().enumerate() {
                value |= (*b as i64) << (8 * i);
            }

            Ok(if negative { -value } else { value })
        }

        fn expect_push<const N: usize>(actual: Instruction<'_>) -> Result<[u8; N]> {
            match actual {
                Instruction::PushBytes(bytes) if bytes.len() == N => {
                    let mut out = [0u8; N];
                    out.copy_from_slice(bytes.as_bytes());
                    Ok(out)
                }
                other => {
                    anyhow::bail!("unexpected instruction: expected push {N} bytes, got {other:?}")
                }
            }
        }

        let mut iter = witness_script.instructions_minimal();

        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_SIZE)?;
        let size = parse_script_num(next_instruction(&mut iter)?)?;
        anyhow::ensure!(size == 32, "unexpected preimage size check: {size}");
        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_EQUAL)?;

        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_IF)?;
        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_HASH160)?;
        let payment_hash_ripemd160 = expect_push::<20>(next_instruction(&mut iter)?)?;
        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_EQUALVERIFY)?;
        let receiver_key = expect_push::<33>(next_instruction(&mut iter)?)?;

        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_ELSE)?;
        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_DROP)?;
        let cltv_expiry = parse_script_num(next_instruction(&mut iter)?)?;
        anyhow::ensure!(
            cltv_expiry >= 0 && cltv_expiry <= i64::from(u32::MAX),
            "cltv_expiry out of range: {cltv_expiry}"
        );
        let cltv_expiry = cltv_expiry as u32;
        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_CLTV)?;
        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_DROP)?;
        let sender_key = expect_push::<33>(next_instruction(&mut iter)?)?;

        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_ENDIF)?;
        expect_op(next_instruction(&mut iter)?, opcodes::all::OP_CHECKSIG)?;

        anyhow::ensure!(
            iter.next().is_none(),
            "unexpected trailing instructions in witness script"
        );

        Ok(HtlcTerms {
            cltv_expiry,
            sender_key,
            receiver_key,
            payment_hash_ripemd160,
        })
    }
}

fn witness_script(
    cltv_expiry: u32,
    sender_key: &[u8; 33],
    receiver_key: &[u8; 33],
    payment_hash: &[u8; 32],
) -> ScriptBuf {
    let payment_hash_ripemd160 = ripemd160::Hash::hash(payment_hash).to_byte_array();

    Builder::new()
        .push_opcode(opcodes::all::OP_SIZE)
        .push_int(32)
        .push_opcode(opcodes::all::OP_EQUAL)
        .push_opcode(opcodes::all::OP_IF)
        .push_opcode(opcodes::all::OP_HASH160)
        .push_slice(payment_hash_ripemd160)
        .push_opcode(opcodes::all::OP_EQUALVERIFY)
        .push_slice(receiver_key)
        .push_opcode(opcodes::all::OP_ELSE)
        .push_opcode(opcodes::all::OP_DROP)
        .push_int(i64::from(cltv_expiry))
        .push_opcode(opcodes::all::OP_CLTV)
        .push_opcode(opcodes::all::OP_DROP)
        .push_slice(sender_key)
        .push_opcode(opcodes::all::OP_ENDIF)
        .push_opcode(opcodes::all::OP_CHECKSIG)
        .into_script()
}
