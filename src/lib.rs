pub mod app;
pub mod cli;
pub mod collector;
pub mod config;
pub mod domain;
pub mod fanout;
pub mod http;
pub mod live;
pub mod metrics;
pub mod mqtt;
pub mod persistence;
pub mod readiness;
pub mod relay;
pub mod sink;
pub mod telemetry;
