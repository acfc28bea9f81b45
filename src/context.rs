use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::{AnyCell, Derived, Source};

thread_local! {
	static CURRENT: RefCell<Option<Rc<dyn Derived>>> = const { RefCell::new(None) };
}

/// Installs a computation (or nothing) as the tracking context for as long
/// as it lives, restoring the previous one on drop, unwinding included.
#[must_use]
pub(crate) struct Evaluation {
	prev: Option<Rc<dyn Derived>>,
}

impl Evaluation {
	pub(crate) fn enter(derived: Option<Rc<dyn Derived>>) -> Self {
		let prev = CURRENT.with(|current| current.replace(derived));
		Evaluation { prev }
	}
}

impl Drop for Evaluation {
	fn drop(&mut self) {
		let prev = self.prev.take();
		let _ = CURRENT.try_with(|current| current.replace(prev));
	}
}

fn current() -> Option<Rc<dyn Derived>> {
	CURRENT.with(|current| current.borrow().clone())
}

/// Registers `source` as a dependency of the running computation, if any.
pub(crate) fn track<S: Source>(source: &Weak<S>) {
	let Some(derived) = current() else {
		return;
	};

	if let Some(source) = source.upgrade() {
		let source = source as Rc<dyn Source>;
		derived.add_source(source.clone());
		source.attach_dependent(Rc::downgrade(&derived));
	}
}

/// The computed currently being evaluated on this thread, if any.
pub fn current_computed() -> Option<AnyCell> {
	current().map(Derived::as_cell)
}

/// Runs `func` with dependency tracking suspended.
///
/// Reads inside `func` register no edges, even when called from within a
/// computed's evaluation.
pub fn untrack<R>(func: impl FnOnce() -> R) -> R {
	let _scope = Evaluation::enter(None);
	func()
}
