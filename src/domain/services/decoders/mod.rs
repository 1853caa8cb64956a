//! Per-protocol account decoders.
//!
//! Each lending protocol stores its obligation/margin accounts in its own
//! binary layout. A decoder is an independent capability per protocol,
//! `bytes -> Option<CanonicalPosition>`, backed by a protocol-specific
//! constants table (offsets, widths, scaling). There is no shared mutable
//! state between decoders; they differ only in their constants and all feed
//! the same canonical health-factor formula, so risk classification behaves
//! identically regardless of origin.
//!
//! Scaling is never inferred from the data: every multi-byte integer is an
//! explicit fixed-width little-endian field with a documented scaling
//! constant (WAD = 1e18, micro-USD = 1e6, basis points = 1e4).

pub mod kamino;
pub mod marginfi;
pub mod solend;

use crate::domain::entities::position::{CanonicalPosition, CollateralLeg};
use crate::domain::entities::protocol::Protocol;
use crate::domain::errors::DecodeError;
use crate::domain::repositories::chain_rpc::AccountFilter;

/// WAD fixed-point scale: stored integer = value × 10^18.
pub const WAD: f64 = 1e18;

/// Micro-USD scale: stored integer = dollars × 10^6.
pub const MICRO_USD: f64 = 1e6;

/// Basis-point scale: stored integer = fraction × 10^4.
pub const BPS: f64 = 1e4;

/// One protocol's decoding capability: pure, side-effect free.
pub trait AccountDecoder: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// On-chain program owning this protocol's position accounts.
    fn program_id(&self) -> &'static str;

    /// `getProgramAccounts` filters selecting `owner`'s positions.
    fn owner_filters(&self, owner: &str) -> Vec<AccountFilter>;

    /// Decode a raw account buffer into the canonical model.
    ///
    /// `Ok(None)` means the account is recognizably not an open position
    /// (zeroed buffer). `Truncated` rejects buffers below the protocol's
    /// minimum record size; any read past the declared length after that
    /// is `Malformed`.
    fn decode(
        &self,
        data: &[u8],
        owner: &str,
        pubkey: &str,
    ) -> Result<Option<CanonicalPosition>, DecodeError>;
}

/// Value-weighted liquidation threshold across collateral legs.
pub(crate) fn weighted_liquidation_threshold(legs: &[CollateralLeg]) -> f64 {
    let total: f64 = legs.iter().map(|l| l.usd_value).sum();
    if total <= 0.0 {
        return 0.0;
    }
    legs.iter()
        .map(|l| l.usd_value * l.liquidation_threshold)
        .sum::<f64>()
        / total
}

/// Bounds-checked little-endian cursor over an account buffer.
///
/// Every read past the end of the buffer is a `Malformed` error, never a
/// panic or silent wrap.
pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| DecodeError::Malformed("offset overflow".to_string()))?;
        if end > self.data.len() {
            return Err(DecodeError::Malformed(format!(
                "read of {} bytes at offset {} exceeds buffer of {} bytes",
                len,
                self.pos,
                self.data.len()
            )));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_u128_le(&mut self) -> Result<u128, DecodeError> {
        let bytes = self.take(16)?;
        let mut buf = [0u8; 16];
        buf.copy_from_slice(bytes);
        Ok(u128::from_le_bytes(buf))
    }

    /// 32-byte public key, rendered as hex for the canonical model.
    pub fn read_pubkey(&mut self) -> Result<String, DecodeError> {
        Ok(hex::encode(self.take(32)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::position::CollateralLeg;

    #[test]
    fn test_byte_reader_rejects_overrun() {
        let data = [1u8, 2, 3];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert!(matches!(
            reader.read_u64_le(),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_byte_reader_little_endian() {
        let mut data = vec![0x39, 0x30]; // 12345 LE
        data.extend_from_slice(&98765u64.to_le_bytes());
        data.extend_from_slice(&(5_000u128 * 10u128.pow(18)).to_le_bytes());
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u16_le().unwrap(), 12345);
        assert_eq!(reader.read_u64_le().unwrap(), 98765);
        assert_eq!(reader.read_u128_le().unwrap(), 5_000u128 * 10u128.pow(18));
    }

    #[test]
    fn test_weighted_threshold() {
        let legs = vec![
            CollateralLeg {
                asset: "a".into(),
                amount: 1.0,
                usd_value: 3000.0,
                ltv: 0.75,
                liquidation_threshold: 0.85,
            },
            CollateralLeg {
                asset: "b".into(),
                amount: 1.0,
                usd_value: 1000.0,
                ltv: 0.65,
                liquidation_threshold: 0.65,
            },
        ];
        // (3000*0.85 + 1000*0.65) / 4000 = 0.80
        assert!((weighted_liquidation_threshold(&legs) - 0.80).abs() < 1e-12);
        assert_eq!(weighted_liquidation_threshold(&[]), 0.0);
    }
}
