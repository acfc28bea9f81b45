use std::any::Any;
use std::cell::{Cell, RefCell};
use std::convert::Infallible;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::addr::RcAddr;
use crate::context::{self, Evaluation};
use crate::subscribers::{self, Subscribers};
use crate::{AnyCell, ComputeError, Derived, Source};

/// A derived value, recomputed lazily when one of the cells it read
/// during its last evaluation changes.
///
/// `E` is the error type of a fallible computation, see
/// [`Computed::try_new`].
pub struct Computed<T, E = Infallible>
where
	T: 'static,
	E: Debug + 'static,
{
	body: Rc<ComputedBody<T, E>>,
}

impl<T, E> Clone for Computed<T, E>
where
	T: 'static,
	E: Debug + 'static,
{
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

pub(crate) struct ComputedBody<T, E>
where
	T: 'static,
	E: Debug + 'static,
{
	name: &'static str,
	func: Box<dyn Fn() -> Result<T, E>>,
	value: RefCell<Option<T>>,
	stale: Cell<bool>,
	computing: Cell<bool>,
	sources: RefCell<SmallVec<[RcAddr<dyn Source>; 4]>>,
	subscribers: RefCell<Subscribers>,
	this: Weak<ComputedBody<T, E>>,
}

// Abandoned computeds stop being reachable from their sources.
impl<T, E> Drop for ComputedBody<T, E>
where
	T: 'static,
	E: Debug + 'static,
{
	fn drop(&mut self) {
		let this = self.this.clone() as Weak<dyn Derived>;
		for source in self.sources.get_mut().drain(..) {
			source.detach_dependent(&this);
		}
	}
}

/// Raises the in-flight flag for the lifetime of the guard.
struct Computing<'a>(&'a Cell<bool>);

impl<'a> Computing<'a> {
	fn enter(flag: &'a Cell<bool>) -> Self {
		flag.set(true);
		Computing(flag)
	}
}

impl Drop for Computing<'_> {
	fn drop(&mut self) {
		self.0.set(false);
	}
}

impl<T> Computed<T>
where
	T: 'static,
{
	pub fn new(func: impl Fn() -> T + 'static) -> Self {
		Self::new_with_name("<unnamed>", func)
	}

	pub fn new_with_name(name: &'static str, func: impl Fn() -> T + 'static) -> Self {
		Self::build(name, Box::new(move || Ok::<T, Infallible>(func())))
	}

	/// Returns the up-to-date value.
	///
	/// # Panics
	///
	/// If the computed is read from inside its own evaluation.
	#[inline]
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.with(T::clone)
	}

	pub fn with<R>(&self, func: impl FnOnce(&T) -> R) -> R {
		match self.try_with(func) {
			Ok(result) => result,
			Err(err) => panic!("{} ({})", err, self.body.name),
		}
	}
}

impl<T, E> Computed<T, E>
where
	T: 'static,
	E: Debug + 'static,
{
	/// Creates a computed whose evaluation can fail.
	///
	/// A failure is handed to the reader and leaves the cell stale with its
	/// previous value.
	pub fn try_new(func: impl Fn() -> Result<T, E> + 'static) -> Self {
		Self::try_new_with_name("<unnamed>", func)
	}

	pub fn try_new_with_name(
		name: &'static str,
		func: impl Fn() -> Result<T, E> + 'static,
	) -> Self {
		Self::build(name, Box::new(func))
	}

	fn build(name: &'static str, func: Box<dyn Fn() -> Result<T, E>>) -> Self {
		Computed {
			body: Rc::new_cyclic(|this| ComputedBody {
				name,
				func,
				value: RefCell::new(None),
				stale: Cell::new(true),
				computing: Cell::new(false),
				sources: RefCell::new(SmallVec::new()),
				subscribers: RefCell::new(Subscribers::default()),
				this: this.clone(),
			}),
		}
	}

	#[inline]
	pub fn try_get(&self) -> Result<T, ComputeError<E>>
	where
		T: Clone,
	{
		self.try_with(T::clone)
	}

	pub fn try_with<R>(&self, func: impl FnOnce(&T) -> R) -> Result<R, ComputeError<E>> {
		ComputedBody::update(&self.body)?;
		context::track(&self.body.this);

		let value = self.body.value.borrow();
		let value = value.as_ref().expect("a fresh computed holds a value");
		Ok(func(value))
	}

	pub fn is_stale(&self) -> bool {
		self.body.stale.get()
	}

	pub fn name(&self) -> &'static str {
		self.body.name
	}

	/// The cells read during the last evaluation.
	pub fn sources(&self) -> Vec<AnyCell> {
		self.body
			.sources
			.borrow()
			.iter()
			.map(|source| AnyCell::new(Rc::clone(source)))
			.collect()
	}

	pub fn dependent_count(&self) -> usize {
		self.body.dependent_count()
	}
}

impl<T, E> ComputedBody<T, E>
where
	T: 'static,
	E: Debug + 'static,
{
	fn update(this: &Rc<Self>) -> Result<(), ComputeError<E>> {
		if this.computing.get() {
			return Err(ComputeError::Cycle);
		}

		if this.stale.get() {
			Self::recompute(this)?;
		}

		Ok(())
	}

	fn recompute(this: &Rc<Self>) -> Result<(), ComputeError<E>> {
		let _span = tracing::trace_span!("recompute", name = this.name).entered();

		// The new evaluation may read a different set of cells.
		let parent = this.this.clone() as Weak<dyn Derived>;
		let previous = std::mem::take(&mut *this.sources.borrow_mut());
		for source in &previous {
			source.detach_dependent(&parent);
		}
		drop(previous);

		let result = {
			let _computing = Computing::enter(&this.computing);
			let _evaluation = Evaluation::enter(Some(this.clone() as Rc<dyn Derived>));
			(this.func)()
		};

		match result {
			Ok(value) => {
				*this.value.borrow_mut() = Some(value);
				this.stale.set(false);
				Ok(())
			}
			Err(err) => {
				tracing::trace!(name = this.name, error = ?err, "computation failed");
				Err(ComputeError::Failed(err))
			}
		}
	}
}

impl<T, E> Derived for ComputedBody<T, E>
where
	T: 'static,
	E: Debug + 'static,
{
	fn mark_stale(self: Rc<Self>) {
		if self.stale.replace(true) {
			return;
		}

		tracing::trace!(name = self.name, "computed marked stale");
		subscribers::propagate(&self.subscribers, AnyCell::new(self.clone()));
	}

	fn add_source(&self, source: Rc<dyn Source>) {
		let source = RcAddr::new(source);
		let mut sources = self.sources.borrow_mut();
		if !sources.contains(&source) {
			sources.push(source);
		}
	}

	fn as_cell(self: Rc<Self>) -> AnyCell {
		AnyCell::new(self)
	}
}

impl<T, E> Source for ComputedBody<T, E>
where
	T: 'static,
	E: Debug + 'static,
{
	fn name(&self) -> &'static str {
		self.name
	}

	fn is_stale(&self) -> bool {
		self.stale.get()
	}

	fn refresh(&self) -> bool {
		let Some(this) = self.this.upgrade() else {
			return false;
		};

		match Self::update(&this) {
			Ok(()) => true,
			Err(err) => {
				tracing::warn!(name = self.name, error = ?err, "refresh failed");
				false
			}
		}
	}

	fn subscribers(&self) -> &RefCell<Subscribers> {
		&self.subscribers
	}

	fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
		self
	}
}

impl<T, E> From<&Computed<T, E>> for AnyCell
where
	T: 'static,
	E: Debug + 'static,
{
	fn from(computed: &Computed<T, E>) -> Self {
		AnyCell::new(computed.body.clone())
	}
}

impl<T, E> From<Computed<T, E>> for AnyCell
where
	T: 'static,
	E: Debug + 'static,
{
	fn from(computed: Computed<T, E>) -> Self {
		AnyCell::new(computed.body)
	}
}

impl<T, E> TryFrom<AnyCell> for Computed<T, E>
where
	T: 'static,
	E: Debug + 'static,
{
	type Error = AnyCell;
	fn try_from(cell: AnyCell) -> Result<Self, Self::Error> {
		match cell.source().clone().into_any().downcast::<ComputedBody<T, E>>() {
			Ok(body) => Ok(Computed { body }),
			Err(_) => Err(cell),
		}
	}
}

impl<T, E> Debug for Computed<T, E>
where
	T: Debug + 'static,
	E: Debug + 'static,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Computed")
			.field("name", &self.body.name)
			.field("stale", &self.body.stale.get())
			.field("value", &*self.body.value.borrow())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::cell::Cell;
	use std::rc::Rc;

	use super::Computed;
	use crate::{AnyCell, ComputeError, State};

	#[test]
	fn starts_stale_and_evaluates_lazily() {
		let runs = Rc::new(Cell::new(0));
		let c = Computed::new({
			let runs = runs.clone();
			move || {
				runs.set(runs.get() + 1);
				42
			}
		});

		assert!(c.is_stale());
		assert_eq!(runs.get(), 0);
		assert_eq!(c.get(), 42);
		assert_eq!(c.get(), 42);
		assert_eq!(runs.get(), 1);
	}

	#[test]
	fn sources_follow_the_last_evaluation() {
		let flag = State::new_with_name("flag", true);
		let a = State::new_with_name("a", 1);
		let b = State::new_with_name("b", 2);

		let c = Computed::new({
			let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
			move || if flag.get() { a.get() } else { b.get() }
		});

		c.get();
		let names: Vec<_> = c.sources().iter().map(AnyCell::name).collect();
		assert_eq!(names, vec!["flag", "a"]);
		assert_eq!(a.dependent_count(), 1);
		assert_eq!(b.dependent_count(), 0);

		flag.set(false);
		c.get();
		let names: Vec<_> = c.sources().iter().map(AnyCell::name).collect();
		assert_eq!(names, vec!["flag", "b"]);
		assert_eq!(a.dependent_count(), 0);
		assert_eq!(b.dependent_count(), 1);
	}

	#[test]
	fn repeated_reads_register_once() {
		let a = State::new(1);
		let c = Computed::new({
			let a = a.clone();
			move || a.get() + a.get() + a.get()
		});

		assert_eq!(c.get(), 3);
		assert_eq!(c.sources().len(), 1);
	}

	#[test]
	fn self_read_is_a_cycle() {
		let slot: Rc<Cell<Option<Computed<i32, String>>>> = Rc::new(Cell::new(None));
		let c = Computed::try_new({
			let slot = slot.clone();
			move || {
				let me = slot.take().ok_or_else(|| "unset".to_string())?;
				let result = me.try_get();
				slot.set(Some(me));
				match result {
					Err(ComputeError::Cycle) => Err("cycle".to_string()),
					_ => Ok(0),
				}
			}
		});
		slot.set(Some(c.clone()));

		assert_eq!(c.try_get(), Err(ComputeError::Failed("cycle".to_string())));
		assert!(c.is_stale());
	}

	#[test]
	fn dropping_unlinks_from_sources() {
		let a = State::new(1);
		let c = Computed::new({
			let a = a.clone();
			move || a.get()
		});

		c.get();
		assert_eq!(a.dependent_count(), 1);
		drop(c);
		assert_eq!(a.dependent_count(), 0);
	}
}
