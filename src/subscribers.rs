use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Weak;

use smallvec::SmallVec;

use crate::addr::WeakAddr;
use crate::watcher::WatcherBody;
use crate::{AnyCell, Derived};

/// Reverse edges of a cell: the computations that read it and the
/// watchers observing it. Both are held weakly.
#[derive(Default)]
pub(crate) struct Subscribers {
	used_by: BTreeSet<WeakAddr<dyn Derived>>,
	watched_by: BTreeSet<WeakAddr<WatcherBody>>,
}

impl Subscribers {
	pub fn used_by(&mut self, derived: Weak<dyn Derived>) {
		self.used_by.insert(WeakAddr::new(derived));
	}

	pub fn not_used_by(&mut self, derived: &Weak<dyn Derived>) {
		self.used_by.remove(&WeakAddr::new(derived.clone()));
	}

	pub fn watched_by(&mut self, watcher: Weak<WatcherBody>) {
		self.watched_by.insert(WeakAddr::new(watcher));
	}

	pub fn not_watched_by(&mut self, watcher: &Weak<WatcherBody>) {
		self.watched_by.remove(&WeakAddr::new(watcher.clone()));
	}

	pub fn dependent_count(&self) -> usize {
		self.used_by.iter().filter(|d| d.strong_count() > 0).count()
	}

	fn dependents(&self) -> SmallVec<[Weak<dyn Derived>; 4]> {
		self.used_by.iter().map(|d| Weak::clone(d)).collect()
	}

	fn watchers(&self) -> SmallVec<[Weak<WatcherBody>; 2]> {
		self.watched_by.iter().map(|w| Weak::clone(w)).collect()
	}
}

/// Marks every dependent stale, then notifies every watcher that `cell`
/// changed.
///
/// Both lists are snapshotted first: callbacks are free to read, write,
/// watch and unwatch while the walk is in progress.
pub(crate) fn propagate(subscribers: &RefCell<Subscribers>, cell: AnyCell) {
	let dependents = subscribers.borrow().dependents();
	for derived in dependents {
		if let Some(derived) = derived.upgrade() {
			derived.mark_stale();
		}
	}

	let watchers = subscribers.borrow().watchers();
	for watcher in watchers {
		if let Some(watcher) = watcher.upgrade() {
			watcher.notify(cell.clone());
		}
	}
}
