
pub mod message_composer;
pub mod name_index_reconciler;
pub mod rename_coordinator;

pub use message_composer::{MessageComposer, SubmitOutcome};
pub use name_index_reconciler::{NameIndexReconciler, ReconcileReport};
pub use rename_coordinator::{
    IdentityChangeCoordinator, IndexRepair, RenameError, RenameResult, RenameStep, Renamed,
};
