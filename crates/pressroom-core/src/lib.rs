//! Core pressroom library (markup compositor, editorial workflow, digest engine).

pub mod config;
pub mod digest;
pub mod fingerprint;
pub mod markup;
pub mod model;
pub mod rewrite;
pub mod sink;
pub mod store;
pub mod viewstate;
pub mod workflow;
