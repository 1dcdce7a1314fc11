//! Discord interaction handlers
//!
//! This module routes non-command traffic into the core: button presses and uploaded photos.

/// Maps button actions onto core operations
pub mod actions;
/// Gateway events - component interactions and photo messages
pub mod events;
