//! mail-summary-mcp-rs: cached, on-demand AI summaries of email messages
//!
//! The server side exposes three MCP tools (cached lookup, generation, cache
//! invalidation) backed by a per-account summary cache and a summarization
//! webhook. The client side is a panel state machine that drives those
//! operations for the message currently on screen.
//!
//! # Architecture
//!
//! - [`config`]: Environment-driven configuration for accounts, webhook, and flags
//! - [`errors`]: Error taxonomy with MCP error mapping
//! - [`cache_key`]: Opaque per-(account, message) cache keys
//! - [`store`]: Namespaced key-value backends and the summary cache
//! - [`normalize`]: Summary extraction from heterogeneous webhook responses
//! - [`requester`]: Timeout-bounded webhook client
//! - [`service`]: Caching policy and request orchestration
//! - [`mime`]: Message text assembly from fields or RFC822 source
//! - [`models`]: Input/output DTOs and schema-bearing types
//! - [`server`]: MCP tool handlers with validation
//! - [`panel`]: Client panel state machine and its runtime

pub mod cache_key;
pub mod config;
pub mod errors;
pub mod mime;
pub mod models;
pub mod normalize;
pub mod panel;
pub mod requester;
pub mod server;
pub mod service;
pub mod store;
