//! Lazy, glitch-free reactive cells.
//!
//! A [`State`] holds a mutable value. A [`Computed`] derives a cached value
//! from other cells and discovers what it reads while it runs. Writing a
//! state marks every computed reachable from it as stale, but nothing is
//! recomputed until somebody reads it again, so a reader never sees a mix of
//! old and new inputs.
//!
//! A [`Watcher`] is told synchronously whenever one of the cells it watches
//! changes or goes stale. [`effect`] builds on a thread-wide watcher and the
//! host's microtask queue to re-run side effects at most once per turn.
//!
//! ```
//! use signal_graph::{Computed, State};
//!
//! let a = State::new(1);
//! let double = Computed::new({
//! 	let a = a.clone();
//! 	move || a.get() * 2
//! });
//!
//! assert_eq!(double.get(), 2);
//! a.set(5);
//! assert!(double.is_stale());
//! assert_eq!(double.get(), 10);
//! ```

pub mod macros;
pub mod microtask;

mod addr;
mod cell;
mod computed;
mod context;
mod effect;
mod error;
mod state;
mod subscribers;
mod watcher;

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

pub use cell::AnyCell;
pub use computed::Computed;
pub use context::{current_computed, untrack};
pub use effect::{effect, Cleanup, Disposer};
pub use error::ComputeError;
#[cfg(not(target_arch = "wasm32"))]
pub use microtask::run_microtasks;
pub use state::State;
pub use watcher::Watcher;

use subscribers::Subscribers;
use watcher::WatcherBody;

/// A cell other computations can depend on and watchers can observe.
///
/// Both cell kinds implement it, so graph maintenance never needs to know
/// which kind of cell sits on the other end of an edge.
pub(crate) trait Source: 'static {
	fn name(&self) -> &'static str;

	fn is_stale(&self) -> bool;

	/// Bring the cell up to date without registering a dependency.
	/// Returns `false` when a recomputation failed.
	fn refresh(&self) -> bool;

	fn subscribers(&self) -> &RefCell<Subscribers>;

	fn into_any(self: Rc<Self>) -> Rc<dyn Any>;

	/// Notify this cell that `derived` read it.
	fn attach_dependent(&self, derived: Weak<dyn Derived>) {
		self.subscribers().borrow_mut().used_by(derived);
	}

	/// Notify this cell that `derived` stopped reading it.
	fn detach_dependent(&self, derived: &Weak<dyn Derived>) {
		self.subscribers().borrow_mut().not_used_by(derived);
	}

	fn attach_watcher(&self, watcher: Weak<WatcherBody>) {
		self.subscribers().borrow_mut().watched_by(watcher);
	}

	fn detach_watcher(&self, watcher: &Weak<WatcherBody>) {
		self.subscribers().borrow_mut().not_watched_by(watcher);
	}

	fn dependent_count(&self) -> usize {
		self.subscribers().borrow().dependent_count()
	}
}

/// A computation that reads other cells.
pub(crate) trait Derived: 'static {
	/// Called when one of the sources changed or went stale.
	fn mark_stale(self: Rc<Self>);

	/// Record that the running evaluation read `source`.
	fn add_source(&self, source: Rc<dyn Source>);

	fn as_cell(self: Rc<Self>) -> AnyCell;
}
