use std::path::PathBuf;

use anyhow::{Context, Result};
use toml::Table;

use super::embedded::{embedded_preset, embedded_presets};

pub struct PresetInfo {
    pub name: String,
    pub description: String,
    /// Read from the user preset directory rather than built in
    pub user: bool,
}

/// User presets live next to the user config: `<config dir>/eegmidi/presets`.
pub fn find_presets_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("eegmidi").join("presets"))
}

fn user_preset_path(name: &str) -> Option<PathBuf> {
    find_presets_dir()
        .map(|d| d.join(format!("{}.toml", name)))
        .filter(|p| p.exists())
}

fn description(table: &Table) -> String {
    table
        .get("preset")
        .and_then(|p| p.get("description"))
        .and_then(|d| d.as_str())
        .unwrap_or_default()
        .to_string()
}

pub fn list_presets() -> Result<Vec<PresetInfo>> {
    let mut presets = Vec::new();
    for (name, text) in embedded_presets() {
        let table: Table = text
            .parse()
            .with_context(|| format!("Built-in preset '{}' is malformed", name))?;
        presets.push(PresetInfo {
            name: name.to_string(),
            description: description(&table),
            user: false,
        });
    }

    if let Some(dir) = find_presets_dir().filter(|d| d.is_dir()) {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let table = match std::fs::read_to_string(&path).map(|s| s.parse::<Table>()) {
                Ok(Ok(t)) => t,
                _ => {
                    log::warn!("Skipping unreadable preset: {}", path.display());
                    continue;
                }
            };
            // a user file shadows the built-in of the same name
            presets.retain(|p| p.name != name);
            presets.push(PresetInfo {
                name: name.to_string(),
                description: description(&table),
                user: true,
            });
        }
    }

    presets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(presets)
}

/// Preset `name` as a raw table, user directory first.
pub fn load_preset(name: &str) -> Result<Table> {
    if let Some(path) = user_preset_path(name) {
        log::info!("Using preset '{}' from {}", name, path.display());
        return crate::config::load_table(&path);
    }

    let Some(text) = embedded_preset(name) else {
        anyhow::bail!(
            "Preset '{}' not found. Available presets: {:?}",
            name,
            list_presets()
                .map(|p| p.into_iter().map(|p| p.name).collect::<Vec<_>>())
                .unwrap_or_default()
        );
    };
    text.parse::<Table>()
        .with_context(|| format!("Built-in preset '{}' is malformed", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{from_table, Mode};
    use crate::eeg::analysis::Measure;
    use crate::shaping::normalize::Normalization;

    fn builtin(name: &str) -> crate::config::Config {
        let text = embedded_preset(name).unwrap();
        from_table(text.parse().unwrap()).unwrap()
    }

    #[test]
    fn every_builtin_preset_is_valid() {
        for (name, text) in embedded_presets() {
            let table: Table = text.parse().unwrap();
            assert!(!description(&table).is_empty(), "{name} lacks a description");
            let cfg = from_table(table).unwrap();
            cfg.validate().unwrap_or_else(|e| panic!("{name}: {e}"));
        }
    }

    #[test]
    fn presets_carry_their_modes() {
        assert_eq!(builtin("cc").mode, Mode::Control);
        assert_eq!(builtin("gate").mode, Mode::Gate);
        assert_eq!(builtin("notes").mode, Mode::Melody);
    }

    #[test]
    fn multiband_uses_wide_beta() {
        let cfg = builtin("multiband");
        let bands = cfg.bands();
        assert_eq!(bands.len(), 5);
        assert_eq!(bands[3].name, "beta");
        assert_eq!((bands[3].low, bands[3].high), (12.0, 30.0));
        assert_eq!(cfg.window_samples(256.0), 64);
    }

    #[test]
    fn intensity_is_zscored_mean_square() {
        let cfg = builtin("intensity");
        assert_eq!(cfg.analysis.measure, Measure::MeanSquare);
        assert!(matches!(cfg.shaping.normalization, Normalization::Zscore { .. }));
        assert_eq!(cfg.pacing.tempo_scale, 0.6);
    }

    #[test]
    fn recorded_presets_use_the_second_port() {
        for name in ["notes", "multiband", "intensity"] {
            assert_eq!(builtin(name).midi.port, "EEG_MIDI 2", "{name}");
        }
        assert_eq!(builtin("cc").midi.port, "EEG_MIDI 1");
    }

    #[test]
    fn unknown_preset_is_an_error() {
        assert!(load_preset("no-such-preset").is_err());
    }
}
