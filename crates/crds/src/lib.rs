//! route-lb resource definitions
//!
//! The Route resource consumed by the route-lb controller, plus the
//! annotation contract that decides how a route is exposed on the external
//! load balancer.

pub mod route;

pub use route::*;
