//! Library crate for mirror-probe: reachability checks for file-mirror endpoints.
pub mod batch;
pub mod catalog;
pub mod classify;
pub mod prober;
pub mod server;
pub mod socket;
pub mod types;
pub mod web;
