pub mod aggregate;
pub mod config;
pub mod data;
pub mod error;
pub mod render;
pub mod scale;
pub mod server;
pub mod spatial;
pub mod state;
pub mod tooltip;
pub mod types;
pub mod widget;
