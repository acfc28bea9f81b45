use std::any::Any;
use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use crate::subscribers::{self, Subscribers};
use crate::{context, AnyCell, Source};

/// A mutable reactive value.
///
/// Cloning the handle shares the cell. Reading it with [`State::get`] from
/// inside a [`Computed`](crate::Computed) makes that computed depend on it.
pub struct State<T> {
	body: Rc<StateBody<T>>,
}

pub(crate) struct StateBody<T> {
	name: &'static str,
	value: RefCell<T>,
	equals: fn(&T, &T) -> bool,
	subscribers: RefCell<Subscribers>,
	this: Weak<StateBody<T>>,
}

impl<T> Clone for State<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl<T> Default for State<T>
where
	T: Default + PartialEq + 'static,
{
	fn default() -> Self {
		State::new(Default::default())
	}
}

impl<T> State<T>
where
	T: 'static,
{
	/// Creates a state that treats a `set` of a `PartialEq`-equal value as
	/// no change.
	///
	/// Equality is structural, not identity. For identity semantics (two
	/// equal but distinct `Rc`s count as a change) use
	/// [`State::new_with_equals`] with `Rc::ptr_eq`.
	pub fn new(value: T) -> Self
	where
		T: PartialEq,
	{
		Self::new_with_name("<unnamed>", value)
	}

	pub fn new_with_name(name: &'static str, value: T) -> Self
	where
		T: PartialEq,
	{
		Self::build(name, value, T::eq)
	}

	/// Creates a state that uses `equals` to decide whether a `set` changes
	/// anything. Pass `|_, _| false` to propagate every write.
	pub fn new_with_equals(value: T, equals: fn(&T, &T) -> bool) -> Self {
		Self::build("<unnamed>", value, equals)
	}

	fn build(name: &'static str, value: T, equals: fn(&T, &T) -> bool) -> Self {
		State {
			body: Rc::new_cyclic(|this| StateBody {
				name,
				value: RefCell::new(value),
				equals,
				subscribers: RefCell::new(Subscribers::default()),
				this: this.clone(),
			}),
		}
	}

	#[inline]
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.body.with(T::clone)
	}

	/// Tracked read through a borrow.
	#[inline]
	pub fn with<R>(&self, func: impl FnOnce(&T) -> R) -> R {
		self.body.with(func)
	}

	/// Reads the value without registering a dependency.
	#[inline]
	pub fn peek(&self) -> T
	where
		T: Clone,
	{
		self.body.value.borrow().clone()
	}

	#[inline]
	pub fn set(&self, value: T) {
		self.body.set(value)
	}

	pub fn update(&self, func: impl FnOnce(&T) -> T) {
		let next = func(&*self.body.value.borrow());
		self.body.set(next)
	}

	pub fn name(&self) -> &'static str {
		self.body.name
	}

	pub fn dependent_count(&self) -> usize {
		self.body.dependent_count()
	}
}

impl<T: 'static> StateBody<T> {
	fn with<R>(&self, func: impl FnOnce(&T) -> R) -> R {
		context::track(&self.this);
		func(&*self.value.borrow())
	}

	fn set(&self, value: T) {
		{
			let mut current = self.value.borrow_mut();
			if (self.equals)(&*current, &value) {
				return;
			}
			*current = value;
		}

		tracing::trace!(name = self.name, "state changed");

		if let Some(this) = self.this.upgrade() {
			subscribers::propagate(&self.subscribers, AnyCell::new(this));
		}
	}
}

impl<T: 'static> Source for StateBody<T> {
	fn name(&self) -> &'static str {
		self.name
	}

	fn is_stale(&self) -> bool {
		false
	}

	fn refresh(&self) -> bool {
		true
	}

	fn subscribers(&self) -> &RefCell<Subscribers> {
		&self.subscribers
	}

	fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
		self
	}
}

impl<T: 'static> From<&State<T>> for AnyCell {
	fn from(state: &State<T>) -> Self {
		AnyCell::new(state.body.clone())
	}
}

impl<T: 'static> From<State<T>> for AnyCell {
	fn from(state: State<T>) -> Self {
		AnyCell::new(state.body)
	}
}

impl<T: 'static> TryFrom<AnyCell> for State<T> {
	type Error = AnyCell;
	fn try_from(cell: AnyCell) -> Result<Self, Self::Error> {
		match cell.source().clone().into_any().downcast::<StateBody<T>>() {
			Ok(body) => Ok(State { body }),
			Err(_) => Err(cell),
		}
	}
}

impl<T> Debug for State<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.body.value.borrow().fmt(f)
	}
}
