// Library exports for testing and modular access

pub mod assets;
pub mod config;
pub mod db;
pub mod error;
pub mod holders;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;

#[cfg(test)]
mod testing;
