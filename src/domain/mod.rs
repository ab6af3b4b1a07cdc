// Domain layer - Dashboard state and rules, free of I/O
pub mod channel;
pub mod connection;
pub mod dashboard;
pub mod latest_value;
pub mod message_log;
pub mod telemetry;
pub mod timeseries;
