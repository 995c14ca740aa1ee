/// How a stroke or gradient combines with the pixels beneath it.
#[derive(
    strum::AsRefStr,
    strum::EnumString,
    strum::EnumIter,
    PartialEq,
    Eq,
    Copy,
    Clone,
    Hash,
    Debug,
    Default,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum BlendMode {
    /// Source-over.
    #[default]
    Normal,
    /// Destination-out. Removes coverage instead of adding color.
    Erase,
    Multiply,
    Add,
}
impl BlendMode {
    /// Blend a premultiplied source, already scaled by coverage, over a premultiplied destination.
    #[must_use]
    pub fn apply(self, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
        let inv = 1.0 - src[3];
        match self {
            Self::Normal => [
                src[0] + dst[0] * inv,
                src[1] + dst[1] * inv,
                src[2] + dst[2] * inv,
                src[3] + dst[3] * inv,
            ],
            Self::Erase => dst.map(|channel| channel * inv),
            Self::Multiply => {
                // Porter-Duff multiply: Sc*Dc + Sc*(1-Da) + Dc*(1-Sa)
                let dst_inv = 1.0 - dst[3];
                let mut out = [0.0; 4];
                for c in 0..3 {
                    out[c] = src[c] * dst[c] + src[c] * dst_inv + dst[c] * inv;
                }
                out[3] = src[3] + dst[3] * inv;
                out
            }
            Self::Add => [
                (src[0] + dst[0]).min(1.0),
                (src[1] + dst[1]).min(1.0),
                (src[2] + dst[2]).min(1.0),
                (src[3] + dst[3]).min(1.0),
            ],
        }
    }
}
