//! # Pordisto (self-contained authorization server)
//!
//! `pordisto` issues, rotates, and validates opaque bearer credentials,
//! manages user accounts with an email-style verification workflow, and
//! gates a hierarchical namespace of private documents through file-based
//! access rules.
//!
//! ## Storage Model
//!
//! Everything lives under one data directory: sharded per-user records
//! (`users/al/ic/alice/`), per-user token mirrors, the refresh-token
//! rotation registry, textual access-rule files, and the `/private/*`
//! document tree. Saves are atomic and in-memory indices are rehydrated by
//! walking the tree at startup.
//!
//! ## Credentials
//!
//! Tokens are opaque random strings, never signed or self-describing.
//! Each refresh token records the token it replaced; invalidating one
//! cascades through its predecessors so replayed ancestors are already
//! revoked. Access tokens live one hour, refresh tokens thirty days.
//!
//! ## Authorization
//!
//! Private documents are gated by layered textual rules (per-user, group,
//! global) with prefix-path matching, re-read on every evaluation.

pub mod access;
pub mod api;
pub mod cli;
pub mod hash;
pub mod ports;
pub mod rate_limit;
pub mod store;
pub mod tokens;
pub mod users;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
