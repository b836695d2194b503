//! Shared execution kernel for Lightning/Bitcoin submarine swaps.
//!
//! A swap exchanges an off-chain payment for on-chain funds (loop-out) or
//! the reverse (loop-in) through an HTLC. Variant-specific drivers own the
//! protocol steps; this crate provides the per-swap execution context
//! ([`swap::kit::SwapKit`]), the HTLC script/address derivation
//! ([`chain::htlc`]), the status broadcast seam and the service interfaces
//! every driver runs against.

pub mod cancel;
pub mod chain;
pub mod lightning;
pub mod logging;
pub mod swap;
