//! Domain layer containing business entities and collaborator contracts.
//!
//! # Architecture
//!
//! - [`entities`] - Core data structures
//! - [`repositories`] - System-of-record and analytics trait definitions
//! - [`side_effects`] - Bounded fire-and-forget work queue and its worker
//!
//! # Design Principles
//!
//! - Entities and traits have no dependencies on infrastructure or application layers
//! - Traits define contracts implemented by the infrastructure layer
//! - Orchestration lives in services (see [`crate::application::services`])

pub mod entities;
pub mod repositories;
pub mod side_effects;
