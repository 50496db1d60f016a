pub mod handle_claim;
pub mod handle_telemetry;
pub mod mqtt;
