pub mod app;

pub mod clock;

pub mod config;

pub mod engine;

pub mod mirror;

pub mod model;

pub mod payment;

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
