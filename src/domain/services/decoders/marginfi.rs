//! MarginFi margin-account decoder.
//!
//! Account layout (all integers little-endian):
//!
//! | offset | size | field              | scaling        |
//! |--------|------|--------------------|----------------|
//! | 0      | 8    | discriminator      | —              |
//! | 8      | 32   | group              | —              |
//! | 40     | 32   | authority (owner)  | —              |
//! | 72     | 8    | flags (u64)        | —              |
//! | 80     | 1    | balances_len       | —              |
//! | 81     | 56×n | balance entries    | see below      |
//!
//! Balance entry: active u8, bank [32], side u8 (0 = asset, 1 =
//! liability), amount u64 (native units), value u64 (micro-USD 1e6),
//! ltv u16 (bps 1e4), liquidation_threshold u16 (bps), borrow_rate u16
//! (bps). Inactive entries occupy their slot but contribute nothing.

use crate::domain::entities::position::{CanonicalPosition, CollateralLeg, DebtLeg};
use crate::domain::entities::protocol::Protocol;
use crate::domain::errors::DecodeError;
use crate::domain::repositories::chain_rpc::AccountFilter;
use crate::domain::services::decoders::{
    weighted_liquidation_threshold, AccountDecoder, ByteReader, BPS, MICRO_USD,
};

pub const MARGINFI_PROGRAM_ID: &str = "MFv2hWf31Z9kbCa1snEPYctwafyhdvnV7FZnsebVacA";

/// Anchor-style account discriminator for a margin account.
const ACCOUNT_DISCRIMINATOR: [u8; 8] = [0x43, 0xa1, 0x6e, 0x02, 0x9c, 0x5d, 0x31, 0xb8];
const MIN_ACCOUNT_SIZE: usize = 81;
const BALANCE_ENTRY_SIZE: usize = 56;
const MAX_BALANCES: usize = 16;
/// Authority pubkey position: discriminator(8) + group(32).
const AUTHORITY_FILTER_OFFSET: usize = 40;

const SIDE_ASSET: u8 = 0;
const SIDE_LIABILITY: u8 = 1;

#[derive(Debug, Default)]
pub struct MarginFiDecoder;

impl MarginFiDecoder {
    pub fn new() -> Self {
        MarginFiDecoder
    }
}

impl AccountDecoder for MarginFiDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::MarginFi
    }

    fn program_id(&self) -> &'static str {
        MARGINFI_PROGRAM_ID
    }

    fn owner_filters(&self, owner: &str) -> Vec<AccountFilter> {
        vec![AccountFilter {
            offset: AUTHORITY_FILTER_OFFSET,
            bytes_base58: owner.to_string(),
        }]
    }

    fn decode(
        &self,
        data: &[u8],
        owner: &str,
        pubkey: &str,
    ) -> Result<Option<CanonicalPosition>, DecodeError> {
        if data.len() < MIN_ACCOUNT_SIZE {
            return Err(DecodeError::Truncated {
                required: MIN_ACCOUNT_SIZE,
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
        if discriminator != ACCOUNT_DISCRIMINATOR {
            return Err(DecodeError::UnsupportedVersion(format!(
                "marginfi discriminator {}",
                hex::encode(discriminator)
            )));
        }

        reader.skip(32)?; // group
        reader.skip(32)?; // authority, caller-supplied
        reader.skip(8)?; // flags

        let balances_len = reader.read_u8()? as usize;
        if balances_len > MAX_BALANCES {
            return Err(DecodeError::Malformed(format!(
                "balances_len {} exceeds maximum {}",
                balances_len, MAX_BALANCES
            )));
        }
        let required = MIN_ACCOUNT_SIZE + balances_len * BALANCE_ENTRY_SIZE;
        if data.len() < required {
            return Err(DecodeError::Malformed(format!(
                "{} balances declared but buffer holds {} of {} bytes",
                balances_len,
                data.len(),
                required
            )));
        }

        let mut collateral = Vec::new();
        let mut debt = Vec::new();
        for _ in 0..balances_len {
            let active = reader.read_u8()?;
            let bank = reader.read_pubkey()?;
            let side = reader.read_u8()?;
            let amount = reader.read_u64_le()? as f64;
            let usd_value = reader.read_u64_le()? as f64 / MICRO_USD;
            let ltv = reader.read_u16_le()? as f64 / BPS;
            let liquidation_threshold = reader.read_u16_le()? as f64 / BPS;
            let borrow_rate = reader.read_u16_le()? as f64 / BPS;

            if active > 1 {
                return Err(DecodeError::Malformed(format!(
                    "balance active flag {}",
                    active
                )));
            }
            if active == 0 {
                continue;
            }
            match side {
                SIDE_ASSET => collateral.push(CollateralLeg {
                    asset: bank,
                    amount,
                    usd_value,
                    ltv,
                    liquidation_threshold,
                }),
                SIDE_LIABILITY => debt.push(DebtLeg {
                    asset: bank,
                    amount,
                    usd_value,
                    borrow_rate,
                }),
                other => {
                    return Err(DecodeError::Malformed(format!(
                        "balance side {}",
                        other
                    )))
                }
            }
        }

        let total_collateral: f64 = collateral.iter().map(|l| l.usd_value).sum();
        let total_debt: f64 = debt.iter().map(|l| l.usd_value).sum();
        let liquidation_threshold = weighted_liquidation_threshold(&collateral);

        Ok(Some(CanonicalPosition::assemble(
            Protocol::MarginFi,
            owner.to_string(),
            pubkey.to_string(),
            collateral,
            debt,
            total_collateral,
            total_debt,
            liquidation_threshold,
        )))
    }
}
