//! Drawable surface size.

use std::fmt;

/// Width and height of a drawable surface, in physical pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero, e.g. a minimized window.
    /// Nothing can be presented to a zero-sized surface.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height. Returns 1.0 for a zero height.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<(u32, u32)> for Extent {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_zero() {
        assert!(Extent::new(0, 0).is_zero());
        assert!(Extent::new(800, 0).is_zero());
        assert!(Extent::new(0, 600).is_zero());
        assert!(!Extent::new(800, 600).is_zero());
    }

    #[test]
    fn test_aspect_ratio() {
        assert_eq!(Extent::new(800, 400).aspect_ratio(), 2.0);
        assert_eq!(Extent::new(800, 0).aspect_ratio(), 1.0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Extent::from((1280, 720)).to_string(), "1280x720");
    }
}
