use crate::util::{FiniteF32, FiniteF32Error};

/// A premultiplied, linear color.
/// All transparent values (alpha == 0) are normalized to transparent black.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, bytemuck::Zeroable, Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct Color([FiniteF32; 4]);
impl Color {
    pub const TRANSPARENT: Self = Self([FiniteF32::ZERO; 4]);
    pub const WHITE: Self = Self([FiniteF32::ONE; 4]);
    pub const BLACK: Self = Self([
        FiniteF32::ZERO,
        FiniteF32::ZERO,
        FiniteF32::ZERO,
        FiniteF32::ONE,
    ]);
    /// Create a new color from premul linear channels. Normalizes all fully transparent colors to 0.0.
    pub fn new_lossy(r: f32, g: f32, b: f32, a: f32) -> Result<Self, FiniteF32Error> {
        let raw = Self([
            FiniteF32::new(r)?,
            FiniteF32::new(g)?,
            FiniteF32::new(b)?,
            FiniteF32::new(a)?,
        ]);
        if raw.0[3].get() == 0.0 {
            Ok(Self::TRANSPARENT)
        } else {
            Ok(raw)
        }
    }
    /// Create a new color from premul linear channels. Normalizes all fully transparent colors to 0.0.
    pub fn from_array_lossy([r, g, b, a]: [f32; 4]) -> Result<Self, FiniteF32Error> {
        Self::new_lossy(r, g, b, a)
    }
    /// Premultiply a straight-alpha color.
    pub fn from_straight(r: f32, g: f32, b: f32, a: f32) -> Result<Self, FiniteF32Error> {
        Self::new_lossy(r * a, g * a, b * a, a)
    }
    #[must_use]
    pub fn as_array(&self) -> [f32; 4] {
        [
            self.0[0].get(),
            self.0[1].get(),
            self.0[2].get(),
            self.0[3].get(),
        ]
    }
    #[must_use]
    pub const fn as_finite_array(&self) -> [FiniteF32; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.0[3].get()
    }
    /// The same color with alpha forced to one, for layers without an alpha channel.
    #[must_use]
    pub fn opaque(self) -> Self {
        let [r, g, b, a] = self.as_array();
        if a <= 0.0 {
            return Self::BLACK;
        }
        // Un-premultiply, then treat as fully opaque.
        Self::new_lossy(r / a, g / a, b / a, 1.0).unwrap_or(Self::BLACK)
    }
}
// Safety: FiniteF32 is NoUninit, arrays have no uninit bytes of their own.
unsafe impl bytemuck::NoUninit for Color {}

#[cfg(test)]
mod test {
    use super::Color;
    #[test]
    fn transparent_normalizes() {
        assert_eq!(
            Color::new_lossy(0.5, 0.2, 0.1, 0.0).unwrap(),
            Color::TRANSPARENT
        );
        assert!(Color::new_lossy(f32::NAN, 0.0, 0.0, 1.0).is_err());
    }
    #[test]
    fn opaque_unpremultiplies() {
        let half_red = Color::from_straight(1.0, 0.0, 0.0, 0.5).unwrap();
        assert_eq!(half_red.as_array(), [0.5, 0.0, 0.0, 0.5]);
        assert_eq!(half_red.opaque().as_array(), [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(Color::TRANSPARENT.opaque(), Color::BLACK);
    }
}
