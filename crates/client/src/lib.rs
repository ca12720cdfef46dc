//! Client code for waystation.
//!
//! This crate provides the origin fetch client and the edge worker that sits
//! between pages and the origin: lifecycle management of the versioned
//! fallback cache, per-request interception, and maintenance responses.

pub mod fetch;
pub mod worker;

pub use fetch::{FetchClient, FetchConfig, FetchError, Origin};
pub use worker::{
    ActivateReport, EdgeWorker, InstallOutcome, Interception, MessageEffect, Source, WorkerConfig, WorkerMessage, WorkerState,
};
