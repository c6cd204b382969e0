//! repo-relay - REST middleware for git repositories and an AI coding assistant
//!
//! Clones and manipulates repositories under a single root directory and
//! forwards prompts to an external conversation engine, tracking multi-turn
//! sessions bound to a repository's working directory.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod git;
pub mod repo;
pub mod server;
pub mod session;
