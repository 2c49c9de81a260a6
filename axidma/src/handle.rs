//! Owning and non-owning handles to an attached device.
//!
//! - [Handle<T>] is the strong reference held by whoever owns the device's lifetime (the
//!   [crate::device::DeviceSlot]). There should be only one long-lived [Handle<T>]; others fetched
//!   through [HandleRef::get_handle] are temporary and should be dropped at the end of the call
//!   that needed them.
//! - [HandleRef<T>] is what the access layer keeps between calls. It does not keep the device
//!   alive, so after detach [HandleRef::get_handle] returns [None].
use alloc::sync::{Arc, Weak};
use core::ops::Deref;

#[derive(Debug)]
pub struct Handle<T> {
    inner: Arc<T>,
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> From<T> for Handle<T> {
    fn from(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Handle<T> {
    /// Create a [HandleRef<T>] to the same device without extending its lifetime.
    pub fn create_ref(&self) -> HandleRef<T> {
        HandleRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles point at the same device.
    pub fn ptr_eq(&self, other: &Handle<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[derive(Debug)]
pub struct HandleRef<T> {
    inner: Weak<T>,
}

impl<T> Clone for HandleRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> HandleRef<T> {
    /// Upgrade to a temporary [Handle<T>], or [None] once the owner dropped the device.
    pub fn get_handle(&self) -> Option<Handle<T>> {
        self.inner.upgrade().map(|inner| Handle { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refs_do_not_extend_lifetime() {
        let handle = Handle::from(7u32);
        let weak = handle.create_ref();
        let temp = weak.get_handle().unwrap();
        assert!(temp.ptr_eq(&handle));
        assert_eq!(*temp, 7);
        drop(temp);
        drop(handle);
        assert!(!weak.is_alive());
        assert!(weak.get_handle().is_none());
    }
}
