//! Gantry Git - repository inspection for release publishing
//!
//! This crate opens the project's git repository and works out which hosting
//! repository (owner and project) artifacts should be published to.

mod remote;
mod repository;
mod resolver;
pub mod slug;

pub use repository::{GitRepo, Result};
pub use resolver::GitInfoResolver;
pub use slug::parse_slug;
