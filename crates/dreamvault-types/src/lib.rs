//! Shared types for the DreamVault services.
//!
//! Everything here is plain data plus the two pieces of pure domain logic
//! that both the database layer and the HTTP layer need: quota window
//! arithmetic and zodiac derivation.

pub mod api;
pub mod models;
pub mod quota;
pub mod zodiac;
