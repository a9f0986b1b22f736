//! These models represent the objects passed around by the agent
//!
//! There are a few related formats we need to interact with:
//! - openai compatible messages/tools, sent from the agent to the LLM
//! - tool calls, sent from the agent to the registry providing capabilities
//! - checkpoints, written to disk so a thread can be resumed
//!
//! We always immediately convert the wire formats into these internal structs, which are
//! also the exact shape persisted by the checkpoint store.
pub mod message;
pub mod role;
pub mod tool;
