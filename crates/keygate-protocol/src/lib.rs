//! Wire types for the OpenAI-compatible surface keygate exposes, plus
//! SSE framing helpers shared by the inbound and upstream sides.

pub mod chat;
pub mod sse;
