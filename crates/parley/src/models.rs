//! The objects passed around by the conversation loop.
//!
//! There are two wire formats at the edges: the OpenAI-style chat completion
//! schema on the model side and the peer's JSON-RPC tool schema on the other.
//! Both are converted into these internal structs immediately at the boundary,
//! so the loop itself only ever deals with one shape.

pub mod message;
pub mod tool;
