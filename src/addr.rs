use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::{Rc, Weak};

/// Strong pointer compared by the address of its allocation.
///
/// Trait objects are compared by their data pointer only, so two
/// handles of the same cell are equal whatever vtable they carry.
pub struct RcAddr<T: ?Sized> {
	ptr: Rc<T>,
}

impl<T: ?Sized> RcAddr<T> {
	pub fn new(ptr: Rc<T>) -> Self {
		RcAddr { ptr }
	}

	pub fn addr(&self) -> *const () {
		Rc::as_ptr(&self.ptr).cast::<()>()
	}
}

impl<T: ?Sized> Clone for RcAddr<T> {
	fn clone(&self) -> Self {
		RcAddr {
			ptr: self.ptr.clone(),
		}
	}
}

impl<T: ?Sized> Deref for RcAddr<T> {
	type Target = Rc<T>;
	fn deref(&self) -> &Self::Target {
		&self.ptr
	}
}

impl<T: ?Sized> PartialEq for RcAddr<T> {
	fn eq(&self, other: &Self) -> bool {
		self.addr() == other.addr()
	}
}

impl<T: ?Sized> Eq for RcAddr<T> {}

impl<T: ?Sized> Hash for RcAddr<T> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.addr().hash(state)
	}
}

pub struct WeakAddr<T: ?Sized> {
	ptr: Weak<T>,
}

impl<T: ?Sized> WeakAddr<T> {
	pub fn new(ptr: Weak<T>) -> Self {
		WeakAddr { ptr }
	}

	pub fn addr(&self) -> *const () {
		Weak::as_ptr(&self.ptr).cast::<()>()
	}
}

impl<T: ?Sized> Clone for WeakAddr<T> {
	fn clone(&self) -> Self {
		WeakAddr {
			ptr: self.ptr.clone(),
		}
	}
}

impl<T: ?Sized> Deref for WeakAddr<T> {
	type Target = Weak<T>;
	fn deref(&self) -> &Self::Target {
		&self.ptr
	}
}

impl<T: ?Sized> PartialEq for WeakAddr<T> {
	fn eq(&self, other: &Self) -> bool {
		self.addr() == other.addr()
	}
}

impl<T: ?Sized> Eq for WeakAddr<T> {}

impl<T: ?Sized> Ord for WeakAddr<T> {
	fn cmp(&self, other: &Self) -> Ordering {
		self.addr().cmp(&other.addr())
	}
}

impl<T: ?Sized> PartialOrd for WeakAddr<T> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}
