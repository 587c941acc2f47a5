pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod controller;
pub mod domain;
pub mod ml;
pub mod predictor;
pub mod repo;
pub mod sources;
pub mod telemetry;
