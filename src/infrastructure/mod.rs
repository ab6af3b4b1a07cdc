// Infrastructure layer - External dependencies and adapters
pub mod broadcast_sink;
pub mod config;
pub mod http_response;
pub mod logging;
pub mod mqtt_transport;
pub mod settings_store;
pub mod update_stream;
