//! Gantry Core
//!
//! Core types for the Gantry continuous-deployment pipeline.
//!
//! This crate contains:
//! - Domain types: Run context, image references, credentials, deployment
//!   results, health verdicts
//! - The pipeline state machine vocabulary (stages, outcomes, run reports)

pub mod domain;
