//! Typed access to the remote CRM.
//!
//! The actual HTTP/JSON plumbing is an external collaborator hidden behind
//! the [`CrmTransport`] trait; this module owns the method names, payload
//! shapes, and typed results the engine calls, and nothing else about the
//! wire protocol.

pub mod client;
pub mod types;

pub use client::{CrmClient, CrmTransport};
