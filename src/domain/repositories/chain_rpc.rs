//! Chain RPC Trait
//!
//! The monitoring loop's only view of the chain: an address resolves to raw
//! account bytes, or nothing, or an error. Decoding those bytes is entirely
//! the decoders' concern, so the RPC layer needs no protocol knowledge and
//! tests can swap in canned buffers.

use crate::domain::errors::RpcError;
use async_trait::async_trait;

/// A `memcmp` filter for program-account queries: match `bytes` (base58)
/// starting at `offset` within the account data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountFilter {
    pub offset: usize,
    pub bytes_base58: String,
}

/// Raw account as fetched from the chain, data already base64-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAccount {
    pub pubkey: String,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Fetch all accounts of `program_id` matching every filter.
    async fn program_accounts(
        &self,
        program_id: &str,
        filters: &[AccountFilter],
    ) -> Result<Vec<RawAccount>, RpcError>;

    /// Fetch a single account; `Ok(None)` when the account does not exist.
    async fn account_info(&self, pubkey: &str) -> Result<Option<RawAccount>, RpcError>;
}
