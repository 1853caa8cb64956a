//! Kamino obligation decoder.
//!
//! Obligation layout (all integers little-endian):
//!
//! | offset | size | field                  | scaling  |
//! |--------|------|------------------------|----------|
//! | 0      | 8    | discriminator          | —        |
//! | 8      | 8    | tag (u64)              | —        |
//! | 16     | 8    | last_update_slot (u64) | —        |
//! | 24     | 32   | lending_market         | —        |
//! | 56     | 32   | owner                  | —        |
//! | 88     | 16   | deposited_value (u128) | WAD 1e18 |
//! | 104    | 16   | borrowed_value (u128)  | WAD 1e18 |
//! | 120    | 16   | allowed_borrow (u128)  | WAD 1e18 |
//! | 136    | 16   | unhealthy_borrow (u128)| WAD 1e18 |
//! | 152    | 1    | deposits_len           | —        |
//! | 153    | 1    | borrows_len            | —        |
//! | 154    | 56×n | deposit entries        |          |
//! |        | 56×m | borrow entries         |          |
//!
//! Both entry kinds share one shape: mint [32], amount u64 (native units),
//! market_value u128 WAD.

use crate::domain::entities::position::{CanonicalPosition, CollateralLeg, DebtLeg};
use crate::domain::entities::protocol::Protocol;
use crate::domain::errors::DecodeError;
use crate::domain::repositories::chain_rpc::AccountFilter;
use crate::domain::services::decoders::{AccountDecoder, ByteReader, WAD};

pub const KAMINO_PROGRAM_ID: &str = "KLend2g3cP87ber8e3v7Fne5vhfce2Ck9MtCAEXJmob";

/// Anchor-style account discriminator for an obligation.
const OBLIGATION_DISCRIMINATOR: [u8; 8] = [0x9b, 0x12, 0xc5, 0x5e, 0x60, 0x7f, 0x18, 0x2a];
const MIN_OBLIGATION_SIZE: usize = 154;
const ENTRY_SIZE: usize = 56;
const MAX_DEPOSITS: usize = 8;
const MAX_BORROWS: usize = 8;
/// Owner pubkey position: discriminator(8) + tag(8) + slot(8) + market(32).
const OWNER_FILTER_OFFSET: usize = 56;

#[derive(Debug, Default)]
pub struct KaminoDecoder;

impl KaminoDecoder {
    pub fn new() -> Self {
        KaminoDecoder
    }
}

impl AccountDecoder for KaminoDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::Kamino
    }

    fn program_id(&self) -> &'static str {
        KAMINO_PROGRAM_ID
    }

    fn owner_filters(&self, owner: &str) -> Vec<AccountFilter> {
        vec![AccountFilter {
            offset: OWNER_FILTER_OFFSET,
            bytes_base58: owner.to_string(),
        }]
    }

    fn decode(
        &self,
        data: &[u8],
        owner: &str,
        pubkey: &str,
    ) -> Result<Option<CanonicalPosition>, DecodeError> {
        if data.len() < MIN_OBLIGATION_SIZE {
            return Err(DecodeError::Truncated {
                required: MIN_OBLIGATION_SIZE,
                actual: data.len(),
            });
        }

        let mut reader = ByteReader::new(data);
        let mut discriminator = [0u8; 8];
        for byte in discriminator.iter_mut() {
            *byte = reader.read_u8()?;
        }
        if discriminator == [0u8; 8] {
            return Ok(None);
        }
        if discriminator != OBLIGATION_DISCRIMINATOR {
            return Err(DecodeError::UnsupportedVersion(format!(
                "kamino discriminator {}",
                hex::encode(discriminator)
            )));
        }

        reader.skip(8)?; // tag
        reader.skip(8)?; // last_update_slot
        reader.skip(32)?; // lending_market
        reader.skip(32)?; // owner, caller-supplied

        let deposited_value = reader.read_u128_le()? as f64 / WAD;
        let borrowed_value = reader.read_u128_le()? as f64 / WAD;
        let allowed_borrow_value = reader.read_u128_le()? as f64 / WAD;
        let unhealthy_borrow_value = reader.read_u128_le()? as f64 / WAD;

        let deposits_len = reader.read_u8()? as usize;
        let borrows_len = reader.read_u8()? as usize;
        if deposits_len > MAX_DEPOSITS {
            return Err(DecodeError::Malformed(format!(
                "deposits_len {} exceeds maximum {}",
                deposits_len, MAX_DEPOSITS
            )));
        }
        if borrows_len > MAX_BORROWS {
            return Err(DecodeError::Malformed(format!(
                "borrows_len {} exceeds maximum {}",
                borrows_len, MAX_BORROWS
            )));
        }
        let required = MIN_OBLIGATION_SIZE + (deposits_len + borrows_len) * ENTRY_SIZE;
        if data.len() < required {
            return Err(DecodeError::Malformed(format!(
                "{} deposits and {} borrows declared but buffer holds {} of {} bytes",
                deposits_len,
                borrows_len,
                data.len(),
                required
            )));
        }

        let ltv = if deposited_value > 0.0 {
            allowed_borrow_value / deposited_value
        } else {
            0.0
        };
        let liquidation_threshold = if deposited_value > 0.0 {
            unhealthy_borrow_value / deposited_value
        } else {
            0.0
        };

        let mut collateral = Vec::with_capacity(deposits_len);
        for _ in 0..deposits_len {
            let mint = reader.read_pubkey()?;
            let amount = reader.read_u64_le()? as f64;
            let usd_value = reader.read_u128_le()? as f64 / WAD;
            collateral.push(CollateralLeg {
                asset: mint,
                amount,
                usd_value,
                ltv,
                liquidation_threshold,
            });
        }

        let mut debt = Vec::with_capacity(borrows_len);
        for _ in 0..borrows_len {
            let mint = reader.read_pubkey()?;
            let amount = reader.read_u64_le()? as f64;
            let usd_value = reader.read_u128_le()? as f64 / WAD;
            debt.push(DebtLeg {
                asset: mint,
                amount,
                usd_value,
                borrow_rate: 0.0,
            });
        }

        Ok(Some(CanonicalPosition::assemble(
            Protocol::Kamino,
            owner.to_string(),
            pubkey.to_string(),
            collateral,
            debt,
            deposited_value,
            borrowed_value,
            liquidation_threshold,
        )))
    }
}
