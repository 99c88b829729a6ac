//! Stochastic simulation of a virus population inside an untreated host or a
//! host receiving a drug partway through the simulation.

pub mod analysis;
pub mod config;
pub mod engine;
pub mod manager;
pub mod model;
pub mod patient;
pub mod stats;
