//! # flycam-sender — Capture and Push Service
//!
//! Reads frames from a capture source, reduces them to the configured
//! per-channel bit depth, frames them with the current camera metadata,
//! and pushes each packet over UDP to a single receiver. Stale packets
//! are replaced rather than queued.
//!
//! ## Sources
//!
//! - **synthetic**: moving test pattern with plausible camera metadata.
//! - **file**: raw `width*height*channels` frames read back to back and
//!   looped.

pub mod config;
pub mod service;
