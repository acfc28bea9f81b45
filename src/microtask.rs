//! The host's deferred-task primitive.
//!
//! A task queued here runs after the current synchronous turn completes.
//! In the browser that is the JS microtask queue. Elsewhere the host owns
//! the turn boundary and calls [`run_microtasks`] when it reaches it.

#[cfg(target_arch = "wasm32")]
mod host {
	use wasm_bindgen::prelude::*;

	#[wasm_bindgen]
	extern "C" {
		#[wasm_bindgen(js_name = queueMicrotask)]
		fn queue_microtask(closure: &JsValue);
	}

	pub fn queue<F: FnOnce() + 'static>(func: F) {
		queue_microtask(&Closure::once_into_js(func));
	}
}

#[cfg(not(target_arch = "wasm32"))]
mod host {
	use std::cell::RefCell;
	use std::collections::VecDeque;

	type Task = Box<dyn FnOnce()>;

	thread_local! {
		static QUEUE: RefCell<VecDeque<Task>> = RefCell::new(VecDeque::new());
	}

	pub fn queue<F: FnOnce() + 'static>(func: F) {
		QUEUE.with(|queue| queue.borrow_mut().push_back(Box::new(func)));
	}

	/// Runs queued tasks until the queue is empty, tasks queued by running
	/// tasks included. Returns how many ran.
	///
	/// A panicking task propagates; the tasks behind it stay queued.
	pub fn run_microtasks() -> usize {
		let mut ran = 0;
		while let Some(task) = QUEUE.with(|queue| queue.borrow_mut().pop_front()) {
			task();
			ran += 1;
		}

		if ran > 0 {
			tracing::trace!(ran, "microtasks drained");
		}
		ran
	}

	pub fn pending_microtasks() -> usize {
		QUEUE.with(|queue| queue.borrow().len())
	}
}

pub use host::*;
