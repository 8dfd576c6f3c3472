//! Deckhand Core - Core types for application resource reconciliation
//!
//! This crate provides the cluster-free building blocks used by Deckhand:
//! - `ApplicationDescriptor`: The caller's description of one application
//! - `LabelManager`: Deterministic, always-valid label sets
//! - `Document`: Resource documents with index-aligned deep merge
//! - `secrets`: Secret encoding and per-value encryption

pub mod descriptor;
pub mod document;
pub mod error;
pub mod labels;
pub mod secrets;

pub use descriptor::{ApplicationDescriptor, Overrides, RoleKind, RoleSpec, secret_name};
pub use document::{Document, deep_merge, merged};
pub use error::{CoreError, Result};
pub use labels::{LabelConfig, LabelManager, LabelSet, sanitize_label_value, selector};
pub use secrets::SecretEnvelope;
