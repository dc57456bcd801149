// Size and offset arithmetic for buffer and memory placement

use ash::vk;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

pub const WHOLE_SIZE: u64 = vk::WHOLE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Size(pub u64);

impl Size {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u32> for Size {
    fn from(value: u32) -> Self {
        Self(value as u64)
    }
}

impl From<u64> for Size {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<usize> for Size {
    fn from(value: usize) -> Self {
        Self(value as u64)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Size({})", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Offset(pub u64);

impl Offset {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// `offset` rounded up to the next multiple of `alignment`
    pub fn aligned(offset: u64, alignment: u64) -> Self {
        Self(align_up(offset, alignment))
    }

    /// Round up in place. Alignment 0 leaves the offset untouched.
    pub fn align_to(&mut self, alignment: u64) -> Self {
        self.0 = align_up(self.0, alignment);
        *self
    }

    pub fn is_aligned(self, alignment: u64) -> bool {
        alignment == 0 || self.0 % alignment == 0
    }
}

pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

pub fn align_down(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return value;
    }
    value - value % alignment
}

impl Add for Offset {
    type Output = Offset;
    fn add(self, rhs: Offset) -> Offset {
        Offset(self.0 + rhs.0)
    }
}

impl Add<Size> for Offset {
    type Output = Offset;
    fn add(self, rhs: Size) -> Offset {
        Offset(self.0 + rhs.0)
    }
}

impl AddAssign<Size> for Offset {
    fn add_assign(&mut self, rhs: Size) {
        self.0 += rhs.0;
    }
}

impl Sub for Offset {
    type Output = Offset;
    fn sub(self, rhs: Offset) -> Offset {
        Offset(self.0 - rhs.0)
    }
}

impl Sub<Size> for Offset {
    type Output = Offset;
    fn sub(self, rhs: Size) -> Offset {
        Offset(self.0 - rhs.0)
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Offset({})", self.0)
    }
}

pub fn offset_2d(x: i32, y: i32) -> vk::Offset2D {
    vk::Offset2D { x, y }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_offset_is_unchanged() {
        assert_eq!(Offset::aligned(256, 64), Offset(256));
        let mut offset = Offset(128);
        offset.align_to(128);
        assert_eq!(offset, Offset(128));
    }

    #[test]
    fn misaligned_offset_rounds_up() {
        assert_eq!(Offset::aligned(1, 256), Offset(256));
        assert_eq!(Offset::aligned(257, 256), Offset(512));
    }

    #[test]
    fn zero_alignment_is_noop() {
        let mut offset = Offset(13);
        assert_eq!(offset.align_to(0), Offset(13));
        assert!(offset.is_aligned(0));
    }

    #[test]
    fn align_down_truncates() {
        assert_eq!(align_down(100, 64), 64);
        assert_eq!(align_down(64, 64), 64);
        assert_eq!(align_down(5, 0), 5);
    }

    #[test]
    fn arithmetic_with_sizes() {
        let mut offset = Offset(16) + Size(16);
        assert_eq!(offset, Offset(32));
        offset += Size::from(8u32);
        assert_eq!(offset - Offset(8), Offset(32));
        assert_eq!(offset - Size(40), Offset(0));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Offset(4).to_string(), "Offset(4)");
        assert_eq!(Size::from(3usize).to_string(), "Size(3)");
    }
}
