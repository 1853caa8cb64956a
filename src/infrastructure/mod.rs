pub mod advisory_client;
pub mod execution_clients;
pub mod solana_rpc;
