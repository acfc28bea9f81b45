/// Why a [`Computed`](crate::Computed) could not produce a value.
///
/// In both cases the cell stays stale and keeps its previous value, so the
/// next read tries again from scratch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputeError<E> {
	/// The computation returned an error.
	#[error("computation failed: {0}")]
	Failed(E),

	/// The computed was read while it was being evaluated.
	#[error("cycle detected: computed read itself during evaluation")]
	Cycle,
}

impl<E> ComputeError<E> {
	pub fn failed(&self) -> Option<&E> {
		match self {
			ComputeError::Failed(err) => Some(err),
			ComputeError::Cycle => None,
		}
	}
}
