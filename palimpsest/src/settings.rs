use palimpsest_core::{config::DocumentConfig, raster::Backend};

const DOCUMENTATION: &str = r#"# Palimpsest settings. You may edit this file, but be aware that formatting and comments will not
# be preserved. Missing keys take their default values.

# backend = "smooth" | "aliased"
# [document] tunes memory use only, never the pixels produced. `memory_budget` is in bytes.
# [playback] paces `palimpsest play`.

"#;

#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Playback {
    /// Frame interval.
    pub frame_millis: u64,
    pub events_per_frame: usize,
}
impl Default for Playback {
    fn default() -> Self {
        Self {
            frame_millis: 33,
            events_per_frame: 4,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub backend: Backend,
    pub document: DocumentConfig,
    pub playback: Playback,
}
impl Settings {
    const FILENAME: &'static str = "settings.toml";
    /// Load the user's settings, or defaults if unavailable for some reason. Defaults are written back
    /// so there's a file to edit next time.
    #[must_use]
    pub fn load() -> Self {
        let Some(mut path) = preferences_dir() else {
            log::warn!("No preferences dir found, using default settings.");
            return Self::default();
        };
        path.push(Self::FILENAME);
        let settings: anyhow::Result<Self> = try_block::try_block! {
            let string = std::fs::read_to_string(&path)?;
            Ok(toml::from_str(&string)?)
        };
        match settings {
            Ok(settings) => settings,
            Err(e) => {
                log::info!("Settings at {path:?} unavailable ({e}), defaulting.");
                let default = Self::default();
                if let Err(e) = default.save() {
                    log::warn!("Failed to save settings:\n{e:?}");
                }
                default
            }
        }
    }
    pub fn save(&self) -> anyhow::Result<()> {
        let mut preferences =
            preferences_dir().ok_or_else(|| anyhow::anyhow!("No preferences dir found"))?;
        // Explicity do *not* create recursively. If not found, the user probably has a good reason.
        // Ignore errors (could already exist). Any real errors will be emitted by file access below.
        let _ = std::fs::DirBuilder::new().create(&preferences);

        preferences.push(Self::FILENAME);
        let mut string = toml::ser::to_string_pretty(self)?;
        string = DOCUMENTATION.to_owned() + &string;
        std::fs::write(preferences, string)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::Settings;
    #[test]
    fn toml_roundtrip() {
        let settings = Settings::default();
        let string = toml::ser::to_string_pretty(&settings).unwrap();
        assert_eq!(toml::from_str::<Settings>(&string).unwrap(), settings);
    }
    #[test]
    fn partial_file() {
        let settings: Settings = toml::from_str("backend = \"aliased\"\n[playback]\nframe_millis = 10").unwrap();
        assert_eq!(settings.backend, palimpsest_core::raster::Backend::Aliased);
        assert_eq!(settings.playback.frame_millis, 10);
        assert_eq!(settings.playback.events_per_frame, 4);
        assert_eq!(settings.document, Default::default());
    }
}
