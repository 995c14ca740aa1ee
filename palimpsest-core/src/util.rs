//! Utility types, used throughout the crate.

/// A float which is finite (non-NaN, non-infinite).
///
/// Event payloads are built from these so events can be compared and hashed exactly,
/// which the serialization round-trip relies on.
// Because of the preconditions invalidating many bitpatterns, this is not Pod.
#[derive(Copy, Clone, PartialEq, PartialOrd, bytemuck::NoUninit, bytemuck::Zeroable, Debug)]
#[repr(transparent)]
pub struct FiniteF32(f32);
impl FiniteF32 {
    pub const ZERO: Self = Self(0.0);
    pub const ONE: Self = Self(1.0);
    pub fn new(val: f32) -> Result<Self, FiniteF32Error> {
        if val.is_finite() {
            Ok(Self(val))
        } else {
            Err(FiniteF32Error::NotFinite)
        }
    }
    /// Clamp into `[0, 1]`, mapping NaN to zero. Used for opacities coming from the outside world.
    #[must_use]
    pub fn unit_lossy(val: f32) -> Self {
        if val.is_nan() {
            Self::ZERO
        } else {
            Self(val.clamp(0.0, 1.0))
        }
    }
    #[must_use]
    pub fn get(self) -> f32 {
        self.0
    }
}

impl Default for FiniteF32 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl TryFrom<f32> for FiniteF32 {
    type Error = FiniteF32Error;
    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
impl From<FiniteF32> for f32 {
    fn from(value: FiniteF32) -> Self {
        value.get()
    }
}
impl std::fmt::Display for FiniteF32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Shortest repr that parses back to the same bits.
        std::fmt::Display::fmt(&self.0, f)
    }
}
impl std::str::FromStr for FiniteF32 {
    type Err = FiniteF32Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let val: f32 = s.parse().map_err(|_| FiniteF32Error::Unparsable)?;
        Self::new(val)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiniteF32Error {
    #[error("not finite")]
    NotFinite,
    #[error("not a number")]
    Unparsable,
}

// This is safe - even though f32 is !Eq, we guarantee that no component is ever NaN
// So PartialEq can act like Eq
impl Eq for FiniteF32 {}
// Doing this on purpose! taking partial ord logic to impl Ord because of struct invariants.
#[allow(clippy::derive_ord_xor_partial_ord)]
impl Ord for FiniteF32 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Never None - the wrapped f32's are non-NaN.
        self.partial_cmp(other).unwrap_or(std::cmp::Ordering::Equal)
    }
}
impl std::hash::Hash for FiniteF32 {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Since we now impl *Eq, we can now impl Hash too!
        // (As x == y is required to imply Hash(x) == Hash(y) which isn't possible with NaN)
        // -0.0 == 0.0, so normalize the sign of zero first.
        let val = if self.0 == 0.0 { 0.0f32 } else { self.0 };
        state.write_u32(val.to_bits());
    }
}

/// An integer pixel rectangle, `[x, x + width) × [y, y + height)`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
impl Rect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
    /// A rect covering the whole of a `width × height` canvas.
    #[must_use]
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }
    /// A single-pixel rect.
    #[must_use]
    pub const fn pixel(x: u32, y: u32) -> Self {
        Self::new(x, y, 1, 1)
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
    #[must_use]
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }
    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }
    /// Overlapping region, or an empty rect if disjoint.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= x || bottom <= y {
            Self::default()
        } else {
            Self::new(x, y, right - x, bottom - y)
        }
    }
    /// Smallest rect containing the float bounds `[min, max]`, clamped to non-negative coordinates.
    #[must_use]
    pub fn from_float_bounds(min: [f32; 2], max: [f32; 2]) -> Self {
        use az::SaturatingAs;
        let x0: u32 = min[0].floor().saturating_as();
        let y0: u32 = min[1].floor().saturating_as();
        let x1: u32 = max[0].ceil().saturating_as();
        let y1: u32 = max[1].ceil().saturating_as();
        Self::new(
            x0,
            y0,
            x1.saturating_sub(x0).saturating_add(1),
            y1.saturating_sub(y0).saturating_add(1),
        )
    }
}
