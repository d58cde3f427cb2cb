// REST seed source and simulation command client

mod client;

pub use client::{ApiConfig, SeedSource, SimulationApi};
