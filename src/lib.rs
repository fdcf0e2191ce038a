//! ragboard - Chat over project-board data via guarded text-to-SQL
//!
//! This is the convenience wrapper crate that re-exports the ragboard
//! components.
//!
//! # Quick Start
//!
//! ```toml
//! [dependencies]
//! ragboard = "0.1"
//! ```

// Re-export core
pub use ragboard_core::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use async_trait::async_trait;
    pub use ragboard_core::*;
}
