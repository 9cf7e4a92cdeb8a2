//! Route configuration.

pub mod ws;
