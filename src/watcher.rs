use std::cell::RefCell;
use std::rc::{Rc, Weak};

use fxhash::FxBuildHasher;
use indexmap::IndexSet;

use crate::{AnyCell, Source};

type CellSet = IndexSet<AnyCell, FxBuildHasher>;

/// Observes cells and is told, synchronously, each time one of them
/// changes or goes stale.
///
/// The callback runs on the stack of the `set` that caused it and should
/// only schedule work. The cells themselves are collected and handed out
/// by [`Watcher::get_pending`].
#[derive(Clone)]
pub struct Watcher {
	body: Rc<WatcherBody>,
}

pub(crate) struct WatcherBody {
	callback: Box<dyn Fn()>,
	watched: RefCell<CellSet>,
	pending: RefCell<CellSet>,
	this: Weak<WatcherBody>,
}

impl Drop for WatcherBody {
	fn drop(&mut self) {
		for cell in self.watched.get_mut().drain(..) {
			cell.source().detach_watcher(&self.this);
		}
	}
}

impl Watcher {
	pub fn new(callback: impl Fn() + 'static) -> Self {
		Watcher {
			body: Rc::new_cyclic(|this| WatcherBody {
				callback: Box::new(callback),
				watched: RefCell::new(CellSet::default()),
				pending: RefCell::new(CellSet::default()),
				this: this.clone(),
			}),
		}
	}

	/// Starts watching `cell`. Watching the same cell twice is a no-op.
	pub fn watch(&self, cell: impl Into<AnyCell>) {
		let cell = cell.into();
		let inserted = self.body.watched.borrow_mut().insert(cell.clone());
		if inserted {
			cell.source().attach_watcher(self.body.this.clone());
		}
	}

	/// Stops watching `cell`. Unknown cells are ignored.
	///
	/// Notifications already collected for the cell stay pending.
	pub fn unwatch(&self, cell: impl Into<AnyCell>) {
		let cell = cell.into();
		let removed = self.body.watched.borrow_mut().shift_remove(&cell);
		if removed {
			cell.source().detach_watcher(&self.body.this);
		}
	}

	/// Returns the cells that notified since the last call, in the order
	/// they first did, and forgets them.
	pub fn get_pending(&self) -> Vec<AnyCell> {
		let pending = std::mem::take(&mut *self.body.pending.borrow_mut());
		pending.into_iter().collect()
	}

	pub fn is_watching(&self, cell: impl Into<AnyCell>) -> bool {
		let cell: AnyCell = cell.into();
		self.body.watched.borrow().contains(&cell)
	}

	pub fn watched(&self) -> Vec<AnyCell> {
		self.body.watched.borrow().iter().cloned().collect()
	}
}

impl WatcherBody {
	pub(crate) fn notify(&self, cell: AnyCell) {
		self.pending.borrow_mut().insert(cell);
		(self.callback)();
	}
}

impl std::fmt::Debug for Watcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Watcher")
			.field("watched", &self.body.watched.borrow().len())
			.field("pending", &self.body.pending.borrow().len())
			.finish()
	}
}
