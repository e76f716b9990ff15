//! Render Graph Core
//!
//! The backend-independent engine: data model, per-frame builder and the
//! compilation pipeline.
//!
//! - [`access`]: access-flag algebra and shader stage masks
//! - [`format`]: the trimmed format enumeration the compiler computes with
//! - [`resource`]: descriptors, subresource ranges, cached instances
//! - [`view`]: image / buffer view payloads
//! - [`signature`]: node parameter schemas and render-pass metadata
//! - [`node`]: per-frame commands and compiled access records
//! - [`dag`]: the dependency graph and subgraph constraints
//! - [`builder`]: the per-frame declaration interface
//! - [`compile`]: the phase pipeline (pre-process, schedule, lifetime,
//!   aliasing)
//! - [`graph`]: the [`RenderGraph`] façade

pub mod access;
pub mod builder;
pub mod compile;
pub mod dag;
pub mod format;
pub mod graph;
pub mod node;
pub mod resource;
pub mod signature;
pub mod view;

pub use builder::GraphBuilder;
pub use compile::{
    CMD_ID_POSTAMBLE, CMD_ID_PREAMBLE, CommandBatch, INVALID_TRANSITION, ResourceAliasingInfo,
    RuntimeCmdInfo, TransitionInfo,
};
pub use graph::{
    BatchLayout, RenderGraph, RenderGraphCreateInfo, RenderGraphDiagnosticInfo, RenderGraphFlags,
    ScheduleInfo, UpdateInfo,
};
