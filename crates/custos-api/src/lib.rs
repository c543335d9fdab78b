//! HTTP surface of the Custos audit pipeline.

pub mod server;
