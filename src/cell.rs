use std::fmt::Debug;
use std::rc::Rc;

use crate::addr::RcAddr;
use crate::Source;

/// Type-erased handle to a [`State`](crate::State) or a
/// [`Computed`](crate::Computed).
///
/// Two handles are equal when they point at the same cell. Use
/// `TryFrom` to get the typed handle back.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AnyCell {
	source: RcAddr<dyn Source>,
}

impl AnyCell {
	pub(crate) fn new(source: Rc<dyn Source>) -> Self {
		AnyCell {
			source: RcAddr::new(source),
		}
	}

	pub(crate) fn source(&self) -> &Rc<dyn Source> {
		&self.source
	}

	pub fn name(&self) -> &'static str {
		self.source.name()
	}

	/// Always `false` for a state.
	pub fn is_stale(&self) -> bool {
		self.source.is_stale()
	}

	/// Recomputes the cell if it is stale, without registering a dependency.
	///
	/// A failed recomputation is logged and reported as `false`; the cell
	/// stays stale.
	pub fn refresh(&self) -> bool {
		self.source.refresh()
	}

	/// Number of computeds currently depending on the cell.
	pub fn dependent_count(&self) -> usize {
		self.source.dependent_count()
	}

	/// `true` if `other` is a handle to the same cell.
	pub fn is(&self, other: impl Into<AnyCell>) -> bool {
		*self == other.into()
	}
}

impl Debug for AnyCell {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AnyCell")
			.field("name", &self.name())
			.field("stale", &self.is_stale())
			.finish()
	}
}
