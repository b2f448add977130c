//! BIG-IP iControl REST client
//!
//! Client for the subset of the F5 BIG-IP iControl REST API the route-lb
//! controller drives: LTM pools, pool members, HTTP(S) monitors, device
//! failover state and config-sync.

pub mod client;
pub mod error;
pub mod models;

pub use client::*;
pub use error::*;
pub use models::*;
