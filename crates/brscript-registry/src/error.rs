//! Registration errors.

use thiserror::Error;

/// Errors raised while populating a [`ClassDb`](crate::ClassDb).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// A class with this name is already registered.
    #[error("class already registered: {0}")]
    DuplicateClass(String),

    /// The parent class is not registered yet.
    #[error("cannot register {class}: parent class {parent} is unknown")]
    UnknownParent { class: String, parent: String },
}
