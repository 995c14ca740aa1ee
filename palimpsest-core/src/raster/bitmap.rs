use crate::{color::Color, util::Rect};

/// A CPU-side premultiplied linear RGBA image, one `[f32; 4]` per pixel in row-major order.
///
/// Pixels are addressed in canvas coordinates. Most bitmaps start at the canvas origin, a [`Bitmap::window`]
/// covers only a part of it.
#[derive(Clone, PartialEq)]
pub struct Bitmap {
    origin: [u32; 2],
    width: u32,
    height: u32,
    /// Initial contents, also what erasing reveals on layers without alpha.
    clear: [f32; 4],
    has_alpha: bool,
    pixels: Vec<[f32; 4]>,
}
impl Bitmap {
    /// Create a bitmap filled with `clear`. Without alpha, the clear color is made opaque.
    #[must_use]
    pub fn new(width: u32, height: u32, clear: Color, has_alpha: bool) -> Self {
        let clear = if has_alpha { clear } else { clear.opaque() }.as_array();
        let pixel_count = (width as usize) * (height as usize);
        Self {
            origin: [0, 0],
            width,
            height,
            clear,
            has_alpha,
            pixels: vec![clear; pixel_count],
        }
    }
    /// A bitmap holding only the pixels of `rect`, addressed by their canvas coordinates.
    #[must_use]
    pub fn window(rect: Rect, clear: Color, has_alpha: bool) -> Self {
        Self {
            origin: [rect.x, rect.y],
            ..Self::new(rect.width, rect.height, clear, has_alpha)
        }
    }
    /// Bytes occupied by the pixels of a bitmap of this size.
    #[must_use]
    pub const fn byte_size(width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * std::mem::size_of::<[f32; 4]>()
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::new(self.origin[0], self.origin[1], self.width, self.height)
    }
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }
    #[must_use]
    pub fn clear_color(&self) -> [f32; 4] {
        self.clear
    }
    /// Reset every pixel to the clear color.
    pub fn reset(&mut self) {
        let clear = self.clear;
        self.pixels.fill(clear);
    }
    fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        let x = x.checked_sub(self.origin[0]).filter(|&x| x < self.width)?;
        let y = y.checked_sub(self.origin[1]).filter(|&y| y < self.height)?;
        Some((y as usize) * (self.width as usize) + (x as usize))
    }
    /// Returns None if coordinates are out of bounds
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        self.pixels.get(self.index_of(x, y)?).copied()
    }
    /// Mutable access to one pixel. Returns None if coordinates are out of bounds
    pub fn get_mut(&mut self, x: u32, y: u32) -> Option<&mut [f32; 4]> {
        let index = self.index_of(x, y)?;
        self.pixels.get_mut(index)
    }
    #[must_use]
    pub fn pixels(&self) -> &[[f32; 4]] {
        &self.pixels
    }
    /// Raw pixel bytes, native endian.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }
    /// Hash of dimensions and pixel contents. Equal digests mean equal images, for all practical purposes.
    #[must_use]
    pub fn digest(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.width.to_le_bytes());
        hasher.update(&self.height.to_le_bytes());
        hasher.update(self.as_bytes());
        hasher.finalize()
    }
    /// Convert to straight-alpha 8 bit RGBA, for export.
    #[must_use]
    pub fn to_rgba8(&self) -> Vec<u8> {
        use az::SaturatingAs;
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for &[r, g, b, a] in &self.pixels {
            let unpremul = |c: f32| if a > 0.0 { c / a } else { 0.0 };
            for channel in [unpremul(r), unpremul(g), unpremul(b), a] {
                out.push((channel.clamp(0.0, 1.0) * 255.0).round().saturating_as::<u8>());
            }
        }
        out
    }
}
impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("has_alpha", &self.has_alpha)
            .field("digest", &self.digest().to_hex())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::Bitmap;
    use crate::{color::Color, util::Rect};
    #[test]
    fn opaque_clear() {
        let clear = Color::from_straight(0.0, 1.0, 0.0, 0.25).unwrap();
        let bitmap = Bitmap::new(2, 2, clear, false);
        assert_eq!(bitmap.get(1, 1), Some([0.0, 1.0, 0.0, 1.0]));
        assert_eq!(bitmap.get(2, 0), None);
    }
    #[test]
    fn digest_tracks_content() {
        let mut a = Bitmap::new(4, 4, Color::TRANSPARENT, true);
        let b = a.clone();
        assert_eq!(a.digest(), b.digest());
        *a.get_mut(3, 3).unwrap() = [1.0; 4];
        assert_ne!(a.digest(), b.digest());
        a.reset();
        assert_eq!(a, b);
    }
    #[test]
    fn window_uses_canvas_coordinates() {
        let mut window = Bitmap::window(Rect::new(30_000, 7, 2, 1), Color::TRANSPARENT, true);
        assert_eq!(window.pixels().len(), 2);
        assert_eq!(window.bounds(), Rect::new(30_000, 7, 2, 1));
        *window.get_mut(30_001, 7).unwrap() = [1.0; 4];
        assert_eq!(window.pixels()[1], [1.0; 4]);
        assert_eq!(window.get(0, 0), None);
        assert_eq!(window.get(30_002, 7), None);
        assert_eq!(window.get(30_000, 8), None);
    }
    #[test]
    fn export_unpremultiplies() {
        let bitmap = Bitmap::new(1, 1, Color::from_straight(1.0, 0.0, 0.0, 0.5).unwrap(), true);
        assert_eq!(bitmap.to_rgba8(), vec![255, 0, 0, 128]);
    }
}
