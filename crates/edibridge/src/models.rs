//! These models represent the objects passed around by the assistant
//!
//! Conversations are kept in the shape the chat-completion API expects: role tagged
//! messages where assistant messages may carry tool calls and tool messages carry the
//! result of exactly one call. We convert to the provider's wire format in
//! `providers::utils` and never store wire json directly.
pub mod message;
pub mod role;
pub mod tool;
