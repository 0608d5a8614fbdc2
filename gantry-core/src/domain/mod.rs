//! Core domain types
//!
//! This module contains the domain structures shared across Gantry crates.
//! Every stage of a pipeline run consumes and produces these types; the
//! cloud clients translate them to and from the wire formats of the
//! external control-plane APIs.

pub mod context;
pub mod credential;
pub mod deploy;
pub mod health;
pub mod image;
pub mod run;
