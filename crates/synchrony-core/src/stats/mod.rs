//! Decode diagnostics
//!
//! This module contains diagnostic counters and loss history:
//! - Per-stream and global counters plus loss events ([`store`])

pub mod store;
