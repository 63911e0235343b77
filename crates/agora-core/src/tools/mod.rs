//! Tool infrastructure: the [`Tool`](registry::Tool) trait, the
//! [`ToolRegistry`](registry::ToolRegistry), and structured tool errors.

pub mod registry;
