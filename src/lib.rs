//! Book catalog service.
//!
//! The `books` module holds the resource model and its HTTP handlers;
//! [`bootstrap`] wires it to the store, the migration runner and the server.

pub mod bootstrap;
pub mod modules;

pub use modules::*;
