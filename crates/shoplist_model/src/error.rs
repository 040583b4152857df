//! Error types for the domain model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Local precondition failures on a shopping list.
///
/// These guard single-replica call sites only. A concurrent add or remove
/// from another replica can still surface after a merge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// An item with the same uid is already present.
    #[error("item {item} already exists in list {list}")]
    DuplicateItem {
        /// List the add was attempted on.
        list: String,
        /// Uid of the conflicting item.
        item: String,
    },

    /// No item with this uid is present.
    #[error("item {item} not found in list {list}")]
    ItemNotFound {
        /// List that was searched.
        list: String,
        /// Uid that was not found.
        item: String,
    },
}

impl ModelError {
    /// Returns true for [`ModelError::ItemNotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ItemNotFound { .. })
    }
}
