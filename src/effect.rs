use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::{microtask, untrack, Computed, Watcher};

thread_local! {
	static SCHEDULER: Scheduler = Scheduler::new();
}

/// Re-runs stale effects once per turn.
///
/// Notifications only raise the `scheduled` flag and queue a single drain;
/// the drain pulls every pending effect back up to date. Effects stay
/// watched between runs, so each recomputation re-arms the watcher.
struct Scheduler {
	watcher: Watcher,
	scheduled: Cell<bool>,
}

impl Scheduler {
	fn new() -> Self {
		Scheduler {
			watcher: Watcher::new(|| {
				let _ = SCHEDULER.try_with(Scheduler::schedule);
			}),
			scheduled: Cell::new(false),
		}
	}

	fn schedule(&self) {
		if self.scheduled.replace(true) {
			return;
		}

		microtask::queue(|| SCHEDULER.with(Scheduler::drain));
	}

	fn drain(&self) {
		self.scheduled.set(false);

		let pending = self.watcher.get_pending();
		tracing::debug!(pending = pending.len(), "running effects");

		// Disposed effects may still be listed here; their bodies are no-ops.
		for cell in pending {
			cell.refresh();
		}
	}
}

/// What an effect leaves behind to undo before its next run.
///
/// Effects that need no cleanup return `()`.
#[derive(Default)]
pub struct Cleanup {
	func: Option<Box<dyn FnOnce()>>,
}

impl Cleanup {
	pub fn new(func: impl FnOnce() + 'static) -> Self {
		Cleanup {
			func: Some(Box::new(func)),
		}
	}

	pub fn none() -> Self {
		Cleanup::default()
	}

	fn run(self) {
		if let Some(func) = self.func {
			func();
		}
	}
}

impl From<()> for Cleanup {
	fn from(_: ()) -> Self {
		Cleanup::none()
	}
}

impl From<Option<Cleanup>> for Cleanup {
	fn from(cleanup: Option<Cleanup>) -> Self {
		cleanup.unwrap_or_default()
	}
}

struct EffectState {
	func: RefCell<Box<dyn FnMut() -> Cleanup>>,
	cleanup: Cell<Cleanup>,
	disposed: Cell<bool>,
}

impl EffectState {
	fn run(&self) {
		if self.disposed.get() {
			return;
		}

		untrack(|| self.cleanup.take().run());

		let cleanup = {
			let mut func = self.func.borrow_mut();
			(*func)()
		};

		// The body may have disposed its own effect.
		if self.disposed.get() {
			untrack(|| cleanup.run());
		} else {
			self.cleanup.set(cleanup);
		}
	}

	fn dispose(&self) {
		if self.disposed.replace(true) {
			return;
		}

		self.cleanup.take().run();
	}
}

/// Runs `func` now, and again after any turn in which something it read
/// changed, however many times it changed.
///
/// `func` returns either `()` or a [`Cleanup`], which runs before the next
/// run or when the effect is disposed.
///
/// Re-runs happen in a microtask; on native targets the host drives them
/// with [`run_microtasks`](crate::run_microtasks).
pub fn effect<F, C>(mut func: F) -> Disposer
where
	F: FnMut() -> C + 'static,
	C: Into<Cleanup>,
{
	let state = Rc::new(EffectState {
		func: RefCell::new(Box::new(move || -> Cleanup { func().into() })),
		cleanup: Cell::new(Cleanup::none()),
		disposed: Cell::new(false),
	});

	let computed = Computed::new_with_name("effect", {
		let state = state.clone();
		move || state.run()
	});

	SCHEDULER.with(|scheduler| scheduler.watcher.watch(&computed));
	let mut first_run = FirstRun {
		computed: &computed,
		done: false,
	};
	untrack(|| computed.get());
	first_run.done = true;
	drop(first_run);

	Disposer { computed, state }
}

/// Unwatches an effect whose first run unwound.
struct FirstRun<'a> {
	computed: &'a Computed<()>,
	done: bool,
}

impl Drop for FirstRun<'_> {
	fn drop(&mut self) {
		if !self.done {
			let _ = SCHEDULER.try_with(|scheduler| scheduler.watcher.unwatch(self.computed));
		}
	}
}

/// Stops an effect created by [`effect`].
#[must_use = "dropping a disposer keeps the effect alive; call `dispose` to stop it"]
pub struct Disposer {
	computed: Computed<()>,
	state: Rc<EffectState>,
}

impl Disposer {
	/// Runs the last cleanup and stops reacting to changes.
	pub fn dispose(self) {
		self.state.dispose();
		let _ = SCHEDULER.try_with(|scheduler| scheduler.watcher.unwatch(&self.computed));
	}
}

impl std::fmt::Debug for Disposer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Disposer")
			.field("disposed", &self.state.disposed.get())
			.finish()
	}
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
	use std::panic::AssertUnwindSafe;

	use super::SCHEDULER;
	use crate::{effect, run_microtasks, State};

	#[test]
	fn one_drain_per_turn() {
		let a = State::new(0);
		let disposer = effect({
			let a = a.clone();
			move || {
				a.get();
			}
		});

		a.set(1);
		a.set(2);
		SCHEDULER.with(|scheduler| assert!(scheduler.scheduled.get()));
		assert_eq!(crate::microtask::pending_microtasks(), 1);

		assert_eq!(run_microtasks(), 1);
		SCHEDULER.with(|scheduler| assert!(!scheduler.scheduled.get()));

		disposer.dispose();
	}

	#[test]
	fn disposed_effect_leaves_the_watcher() {
		let a = State::new(0);
		let disposer = effect({
			let a = a.clone();
			move || {
				a.get();
			}
		});

		SCHEDULER.with(|scheduler| assert_eq!(scheduler.watcher.watched().len(), 1));
		disposer.dispose();
		SCHEDULER.with(|scheduler| assert!(scheduler.watcher.watched().is_empty()));
	}

	#[test]
	fn panicking_first_run_leaves_the_watcher() {
		let a = State::new(0);
		let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
			effect({
				let a = a.clone();
				move || {
					if a.get() == 0 {
						panic!("first run failed");
					}
				}
			})
		}));
		assert!(result.is_err());

		SCHEDULER.with(|scheduler| assert!(scheduler.watcher.watched().is_empty()));
		assert_eq!(a.dependent_count(), 0);

		a.set(1);
		assert_eq!(crate::microtask::pending_microtasks(), 0);
	}
}
