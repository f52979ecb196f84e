//! BRScript host registry.
//!
//! The reflective view of the host system consumed by the pipeline:
//!
//! - [`ClassGraph`]: native class hierarchy stored in a `petgraph` graph
//! - [`ClassDb`]: native classes, builtin-type methods, utilities, global
//!   constants, singletons and global script classes
//! - [`ClassRegistry`]: the query trait the analyzer, compiler and runtime
//!   depend on
//! - [`NativeObject`]: a reflective host object backed by the database

mod class_db;
mod class_graph;
mod error;
mod native_object;

pub use class_db::{ClassBuilder, ClassDb, ClassRegistry, GlobalClass, NativeMethodFn, SharedClassDb};
pub use class_graph::{ClassEdge, ClassGraph, NativeClass, NativeMethod};
pub use error::RegistrationError;
pub use native_object::NativeObject;
