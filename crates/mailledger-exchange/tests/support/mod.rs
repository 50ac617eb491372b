//! Shared helpers for exchange integration tests.

pub mod scripted_server;
