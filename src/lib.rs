//! Distributed network diagnostics: run ping, TCP, UDP, DNS and HTTP probes
//! from a set of vantage points, normalize what they saw, and keep the
//! results around for a day.

pub mod agent;
pub mod api;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod probe;
pub mod registry;
pub mod service;
pub mod store;
pub mod utils;
