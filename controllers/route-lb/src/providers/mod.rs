//! Load balancer backends
//!
//! Each backend exposes a `register` function; the composition root in
//! `main` calls them explicitly before the configured provider is looked up.

pub mod f5;
