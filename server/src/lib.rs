//! EventPlat Server - Real-time event notification gateway.
//!
//! This crate provides the real-time layer of the EventPlat platform:
//! - Authenticating WebSocket connections with the platform's session tokens
//! - Relaying chat-style `message` broadcasts between connected clients
//! - Fanning out `eventCreated` notifications pushed by the CRUD layer
//!
//! # Architecture
//!
//! The server acts as a hub between the CRUD layer (notification producer)
//! and browser clients (WebSocket consumers). Envelopes are relayed in
//! real-time without persistent storage; a client that is not connected
//! when a notification goes out simply misses it.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod notifier;
pub mod rate_limit;
pub mod registry;
pub mod routes;
pub mod types;
