//! Service modules
//!
//! The engine's behavior lives here: the orchestrating reminder store,
//! the notification scheduler, the remote sync layer, and the delete/undo
//! manager. Services are cheap-to-clone handles over shared inner state.

pub mod scheduler;
pub mod store;
pub mod sync;
pub mod undo;

pub use scheduler::{NotificationScheduler, ScheduleState};
pub use store::{ReminderStore, StoreOptions};
pub use sync::RemoteSync;
pub use undo::{UndoManager, UndoToken};
