//! agora: a multi-agent orchestration runtime.
//!
//! LLM-backed agents are spawned dynamically, exchange typed messages
//! on a per-recipient FIFO bus, execute tools (including spawning
//! further agents), and manage per-task workspaces and
//! content-addressed artifacts - completing a user's high-level
//! requirement through self-organized collaboration.
//!
//! [`Society`] is the composition root: it wires the stores, the bus,
//! the LLM client, the tool catalogue, and the scheduler, and exposes
//! the small surface an embedding application needs (send a user
//! message, drain replies, subscribe to events, shut down).
//!
//! ```rust,no_run
//! use agora::{Society, SocietyOptions};
//! use agora_types::RuntimeConfig;
//!
//! # async fn run() -> agora_types::Result<()> {
//! let society = Society::with_options(RuntimeConfig::from_env(), SocietyOptions::default())?;
//! society.start();
//! society.send_user_message("Plan the product launch.")?;
//! # Ok(())
//! # }
//! ```

pub mod runtime;

pub use runtime::{Society, SocietyOptions};

pub use agora_core as core;
pub use agora_llm as llm;
pub use agora_tools as tools;
pub use agora_types as types;
