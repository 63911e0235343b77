//! Core engine for the agora multi-agent orchestration runtime.
//!
//! The crate is organised around the four subsystems of the runtime:
//!
//! * **Message bus & scheduler** -- [`bus`] (per-recipient FIFO queues
//!   with delayed delivery) and [`scheduler`] (single-in-flight dispatch
//!   under a global concurrency cap).
//! * **Agent lifecycle** -- [`agents`] (spawn, cascade termination, the
//!   compute-status machine) backed by the persistent [`org`] store.
//! * **LLM interaction loop** -- [`handler`] (the per-message
//!   conversation loop), [`conversation`] (history, token accounting,
//!   compression), [`context`] (system prompt assembly), and [`router`]
//!   (capability-aware content routing).
//! * **Tool execution & artifacts** -- [`tools`] (the `Tool` trait,
//!   registry, and structured error codes), [`artifact`]
//!   (content-addressed store), [`workspace`] (per-task file sandbox),
//!   and [`module`] (the extension interface for pluggable modules).
//!
//! Every component receives its collaborators through its constructor;
//! there is no ambient global state.

pub mod agents;
pub mod artifact;
pub mod bus;
pub mod context;
pub mod conversation;
pub mod events;
pub mod handler;
pub mod module;
pub mod org;
pub mod router;
pub mod scheduler;
pub mod tools;
pub mod workspace;

pub use agents::AgentManager;
pub use artifact::ArtifactStore;
pub use bus::MessageBus;
pub use context::ContextBuilder;
pub use conversation::ConversationManager;
pub use events::{EventBus, RuntimeEvent};
pub use handler::LlmHandler;
pub use org::OrgStore;
pub use router::ContentRouter;
pub use scheduler::MessageProcessor;
pub use tools::registry::{Tool, ToolContext, ToolError, ToolRegistry};
pub use workspace::WorkspaceManager;
