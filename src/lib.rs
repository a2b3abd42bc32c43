//! tiasset - client for the TI media-asset service

pub mod asset;
pub mod config;
pub mod error;
pub mod model;
pub mod retry;
pub mod sign;
pub mod transport;
pub mod upload;

pub use asset::MediaAssets;
pub use config::{Config, Profile};
pub use error::{Error, Result};
