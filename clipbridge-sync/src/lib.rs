//! clipbridge-sync - cross-device synchronization over the bridge
//!
//! Pushes locally captured access codes to the remote bridge and pulls
//! items captured on other devices, merging both sets through the local
//! store's hash-keyed dedup.
//!
//! # Architecture
//! - `bridge`: wire types, transport trait, HTTP implementation
//! - `client`: push/pull/merge logic, watermark handling, sync loop

pub mod bridge;
pub mod client;

pub use bridge::{BridgeError, BridgeItem, BridgeTransport, HttpBridge, PushReceipt};
pub use client::{SyncClient, SyncCycle, SyncError};
