//! Tool-augmented conversation loop.
//!
//! A [`conversation::Conversation`] owns a growing transcript of role-tagged
//! messages and alternates between two collaborators until the model produces
//! a final answer:
//! - a [`providers::base::ModelClient`], which turns the transcript plus the
//!   current tool catalog into either assistant text or tool calls, and
//! - a [`peer::ToolPeer`], the external process (or in-process stand-in) that
//!   advertises and executes named, schema-typed tools.
//!
//! Tool failures are data the model gets to see and react to; model and
//! catalog failures abort the turn and leave the transcript retryable.

pub mod conversation;
pub mod errors;
pub mod executor;
pub mod models;
pub mod peer;
pub mod providers;
