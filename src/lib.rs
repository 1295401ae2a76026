pub mod api;
pub mod auth;
pub mod config;
pub mod deployer;
pub mod error;
pub mod git;
pub mod pipeline;
pub mod state;
pub mod validation;
