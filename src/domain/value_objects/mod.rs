pub mod usd_amount;
