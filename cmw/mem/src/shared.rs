//! Critical-section guarded access to a container

use core::cell::RefCell;

use critical_section::Mutex;

/// Container shared between execution contexts.
///
/// Every access runs inside a critical section, which provides the external
/// mutual exclusion the containers themselves do not.
pub struct Shared<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Runs `f` with exclusive access to the container.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        critical_section::with(|cs| f(&mut self.inner.borrow(cs).borrow_mut()))
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().into_inner()
    }
}
