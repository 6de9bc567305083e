//! Destructive bulk operations: validation first, then best-effort moves.
//!
//! Files are never hard-deleted; they are moved to a configured trash
//! directory or to the system trash. The guard computes and validates the
//! complete victim set before the first move is attempted.

mod guard;
mod mover;

pub use guard::{keep_primary_victims, TrashValidationError};
pub use mover::{move_to_trash, MoveOutcome, MoveResult, TrashOptions};
