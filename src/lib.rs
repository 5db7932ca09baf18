//! Core library for exploring the object graph of a statistical-modeling
//! engine workspace.
//!
//! The engine is driven through a line-oriented interactive session
//! (see [`session`]); its free-text diagnostic output is parsed into typed
//! members ([`dump`], [`member`]), resolved into a client/server dependency
//! graph ([`workspace`]), and queried/rendered from there ([`graph`],
//! [`report`], [`render`]).

pub mod dispatch;
pub mod dump;
pub mod formula;
pub mod graph;
pub mod member;
pub mod render;
pub mod report;
pub mod scan;
pub mod session;
pub mod snapshot;
pub mod workspace;

pub type Result<T> = anyhow::Result<T>;
