//! Internal implementation details.

pub(crate) mod creation;
pub(crate) mod destruction;

pub(crate) use creation::CreationGuard;
pub(crate) use destruction::DisposableRegistry;
