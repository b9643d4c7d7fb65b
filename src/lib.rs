//! rivista renders posts from a remote messaging platform as HTML, JSON and
//! RSS documents and serves their attached media through a local,
//! self-evicting content cache.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
