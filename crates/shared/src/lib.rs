//! Shared types and database helpers for Praxis
//!
//! This crate has no web dependencies. Everything here is used by at least
//! two of the other workspace crates.

pub mod db;
pub mod types;

pub use db::{create_migration_pool, create_pool, run_migrations};
pub use types::{
    AiFeature, NoteType, PaymentMethod, PaymentStatus, SubscriptionStatus, SubscriptionTier,
    TherapySessionStatus, UserRole,
};
