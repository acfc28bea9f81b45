pub use enclose::*;

/// Builds a [`Computed`](crate::Computed) from an expression, cloning the
/// listed handles into the closure first.
///
/// ```
/// use signal_graph::{computed, State};
///
/// let a = State::new(2);
/// let b = State::new(3);
/// let sum = computed!((a, b) => a.get() + b.get());
///
/// assert_eq!(sum.get(), 5);
/// ```
#[macro_export]
macro_rules! computed {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::Computed::new($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    ($($b:tt)*) => {
        $crate::Computed::new(move || { $($b)* })
    };
}

/// Starts an [`effect`](crate::effect()), cloning the listed handles into
/// the closure first.
#[macro_export]
macro_rules! effect {
    (( $($d_tt:tt)* ) => $($b:tt)*) => {
        $crate::effect($crate::macros::enclose!(($( $d_tt )*) move || { $($b)* }))
    };
    ($($b:tt)*) => {
        $crate::effect(move || { $($b)* })
    };
}
