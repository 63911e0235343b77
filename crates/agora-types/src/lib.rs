//! Core types for the agora multi-agent orchestration runtime.
//!
//! This crate defines the domain vocabulary shared by every other agora
//! crate: message envelopes and payloads, task briefs, role and agent
//! records, LLM service descriptors, runtime configuration, and the
//! top-level error type. It has no async or I/O dependencies so that
//! higher layers can depend on it from any context.

pub mod brief;
pub mod config;
pub mod error;
pub mod message;
pub mod org;
pub mod service;

pub use brief::TaskBrief;
pub use config::RuntimeConfig;
pub use error::AgoraError;
pub use message::{Attachment, Envelope, MessageType, Payload, PayloadError};
pub use org::{
    AgentRecord, AgentStatus, ComputeStatus, OrgTreeNode, RoleRecord, TerminationRecord,
    ROOT_AGENT_ID, USER_AGENT_ID,
};
pub use service::{Capability, ServiceConfig};

/// Convenience result type used across the agora crates.
pub type Result<T> = std::result::Result<T, AgoraError>;
