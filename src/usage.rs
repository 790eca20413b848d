use crate::{index::DependencyIndex, ResourceRef, Result};

/// Decides whether object is referenced by anything alive, and so may exist
/// in the physical cluster
pub trait UsagePredicate: Send + Sync {
	fn is_used(&self, key: &ResourceRef) -> Result<bool>;
}

/// Used if referenced by at least one registered kind.
///
/// Always queries the live index, results must not be cached between
/// reconciliations.
impl UsagePredicate for DependencyIndex {
	fn is_used(&self, key: &ResourceRef) -> Result<bool> {
		Ok(self.indexes().any(|index| index.is_referenced(key)))
	}
}
