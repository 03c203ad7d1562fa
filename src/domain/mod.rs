//! Domain Layer
//!
//! Entities, value objects, errors, ports and pure services of the
//! replication dispatch engine. Nothing here performs I/O.

pub mod entities;
pub mod errors;
pub mod ports;
pub mod queue;
pub mod services;
pub mod value_objects;
