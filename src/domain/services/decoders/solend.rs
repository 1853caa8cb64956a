//! Solend obligation decoder.
//!
//! Obligation layout (all integers little-endian):
//!
//! | offset | size | field                  | scaling   |
//! |--------|------|------------------------|-----------|
//! | 0      | 1    | version                | —         |
//! | 1      | 8    | last_update_slot (u64) | —         |
//! | 9      | 1    | last_update_stale      | —         |
//! | 10     | 32   | lending_market         | —         |
//! | 42     | 32   | owner                  | —         |
//! | 74     | 16   | deposited_value (u128) | WAD 1e18  |
//! | 90     | 16   | borrowed_value (u128)  | WAD 1e18  |
//! | 106    | 16   | allowed_borrow (u128)  | WAD 1e18  |
//! | 122    | 16   | unhealthy_borrow (u128)| WAD 1e18  |
//! | 138    | 1    | deposits_len           | —         |
//! | 139    | 1    | borrows_len            | —         |
//! | 140    | 56×n | deposit entries        | see below |
//! |        | 80×m | borrow entries         | see below |
//!
//! Deposit entry: reserve [32], deposited_amount u64 (native units),
//! market_value u128 WAD. Borrow entry: reserve [32],
//! cumulative_borrow_rate u128 WAD, borrowed_amount u128 WAD, market_value
//! u128 WAD.

use crate::domain::entities::position::{CanonicalPosition, CollateralLeg, DebtLeg};
use crate::domain::entities::protocol::Protocol;
use crate::domain::errors::DecodeError;
use crate::domain::repositories::chain_rpc::AccountFilter;
use crate::domain::services::decoders::{AccountDecoder, ByteReader, WAD};

pub const SOLEND_PROGRAM_ID: &str = "SLendK7ySfcEzyaFqy93gDnSwDmkTRClu6nBVSO4oqd";

const SUPPORTED_VERSION: u8 = 1;
const MIN_OBLIGATION_SIZE: usize = 140;
const DEPOSIT_ENTRY_SIZE: usize = 56;
const BORROW_ENTRY_SIZE: usize = 80;
const MAX_DEPOSITS: usize = 8;
const MAX_BORROWS: usize = 8;
/// Owner pubkey position: version(1) + slot(8) + stale(1) + market(32).
const OWNER_FILTER_OFFSET: usize = 42;

#[derive(Debug, Default)]
pub struct SolendDecoder;

impl SolendDecoder {
    pub fn new() -> Self {
        SolendDecoder
    }
}

impl AccountDecoder for SolendDecoder {
    fn protocol(&self) -> Protocol {
        Protocol::Solend
    }

    fn program_id(&self) -> &'static str {
        SOLEND_PROGRAM_ID
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
        let version = reader.read_u8()?;
        if version == 0 {
            // Uninitialized or closed account slot.
            return Ok(None);
        }
        if version != SUPPORTED_VERSION {
            return Err(DecodeError::UnsupportedVersion(format!(
                "solend obligation version {}",
                version
            )));
        }

        reader.skip(8)?; // last_update_slot
        reader.skip(1)?; // last_update_stale
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
        let required =
            MIN_OBLIGATION_SIZE + deposits_len * DEPOSIT_ENTRY_SIZE + borrows_len * BORROW_ENTRY_SIZE;
        if data.len() < required {
            return Err(DecodeError::Malformed(format!(
                "{} deposits and {} borrows declared but buffer holds {} of {} bytes",
                deposits_len,
                borrows_len,
                data.len(),
                required
            )));
        }

        // Aggregate ratios stand in for per-reserve parameters, which the
        // obligation itself does not carry.
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
            let reserve = reader.read_pubkey()?;
            let amount = reader.read_u64_le()? as f64;
            let usd_value = reader.read_u128_le()? as f64 / WAD;
            collateral.push(CollateralLeg {
                asset: reserve,
                amount,
                usd_value,
                ltv,
                liquidation_threshold,
            });
        }

        let mut debt = Vec::with_capacity(borrows_len);
        for _ in 0..borrows_len {
            let reserve = reader.read_pubkey()?;
            reader.skip(16)?; // cumulative_borrow_rate, not an APY
            let amount = reader.read_u128_le()? as f64 / WAD;
            let usd_value = reader.read_u128_le()? as f64 / WAD;
            debt.push(DebtLeg {
                asset: reserve,
                amount,
                usd_value,
                borrow_rate: 0.0,
            });
        }

        Ok(Some(CanonicalPosition::assemble(
            Protocol::Solend,
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
