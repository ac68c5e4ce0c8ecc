// src/core/mod.rs — Layout planning engine

pub mod pipeline;
pub mod prompts;
pub mod query;
pub mod strategist;
pub mod types;
