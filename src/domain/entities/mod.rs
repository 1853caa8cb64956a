pub mod decision;
pub mod ledger;
pub mod position;
pub mod protocol;
pub mod risk;
