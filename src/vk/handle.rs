// Handle - owning slot for one raw Vulkan handle
//
// Wrappers store a Handle and destroy whatever take() returns in their Drop.
// A null slot is never destroyed, and take() yields the value only once.

use ash::vk;
use std::fmt;

pub struct Handle<H: vk::Handle + Copy> {
    raw: H,
}

impl<H: vk::Handle + Copy> Handle<H> {
    pub fn new(raw: H) -> Self {
        Self { raw }
    }

    pub fn null() -> Self {
        Self { raw: H::from_raw(0) }
    }

    /// Raw handle, possibly null
    pub fn raw(&self) -> H {
        self.raw
    }

    pub fn is_valid(&self) -> bool {
        self.raw.as_raw() != 0
    }

    /// Release ownership of the raw handle, leaving the slot null
    pub fn take(&mut self) -> Option<H> {
        if !self.is_valid() {
            return None;
        }
        Some(std::mem::replace(&mut self.raw, H::from_raw(0)))
    }
}

impl<H: vk::Handle + Copy> Default for Handle<H> {
    fn default() -> Self {
        Self::null()
    }
}

impl<H: vk::Handle + Copy> fmt::Debug for Handle<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{:?}>({:#x})", H::TYPE, self.raw.as_raw())
    }
}

/// Anything that wraps a raw Vulkan handle
pub trait AsRaw<H> {
    fn as_raw(&self) -> H;
}

impl<H: vk::Handle + Copy> AsRaw<H> for Handle<H> {
    fn as_raw(&self) -> H {
        self.raw
    }
}

/// Implement AsRaw for a wrapper with a `handle: Handle<H>` field
macro_rules! impl_as_raw {
    ($ty:ty, $raw:ty) => {
        impl $crate::vk::handle::AsRaw<$raw> for $ty {
            fn as_raw(&self) -> $raw {
                self.handle.raw()
            }
        }
    };
}
pub(crate) use impl_as_raw;

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle as _;

    #[test]
    fn null_handle_is_invalid() {
        let handle: Handle<vk::Buffer> = Handle::null();
        assert!(!handle.is_valid());
        assert_eq!(handle.raw(), vk::Buffer::null());
    }

    #[test]
    fn take_yields_once() {
        let mut handle = Handle::new(vk::Fence::from_raw(42));
        assert!(handle.is_valid());
        assert_eq!(handle.take(), Some(vk::Fence::from_raw(42)));
        assert!(!handle.is_valid());
        assert_eq!(handle.take(), None);
    }

    #[test]
    fn take_on_null_is_none() {
        let mut handle: Handle<vk::Image> = Handle::default();
        assert_eq!(handle.take(), None);
    }

    #[test]
    fn as_raw_matches_raw() {
        let handle = Handle::new(vk::Semaphore::from_raw(7));
        assert_eq!(AsRaw::as_raw(&handle), handle.raw());
    }
}
