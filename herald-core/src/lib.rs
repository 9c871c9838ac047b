//! Herald Core
//!
//! Core types and pure logic for the Herald pipeline event relay.
//!
//! This crate contains:
//! - Domain types: pipelines, logs, projects and derived stage state
//! - Stage templates: versioned alias tables used to resolve runner job names
//! - Canonical events and the normalizer that produces them from raw bus messages
//! - The observer view and the rules that keep bootstrap and live updates convergent
//! - DTOs: wire shapes shared by the server, the client and the CLI

pub mod domain;
pub mod dto;
pub mod event;
pub mod normalize;
pub mod template;
pub mod view;
