// Application layer - Use cases driving the dashboard session
pub mod controller;
pub mod dashboard_service;
pub mod endpoint;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod synthetic;
pub mod transport;
