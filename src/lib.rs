// src/lib.rs — Library root for the layout copilot

pub mod api;
pub mod cli;
pub mod core;
pub mod generator;
pub mod infra;
pub mod market;
pub mod provider;
pub mod render;
pub mod retrieval;
pub mod util;
