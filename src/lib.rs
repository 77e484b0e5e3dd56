pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod movies;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
