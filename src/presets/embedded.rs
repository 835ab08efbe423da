pub fn embedded_presets() -> &'static [(&'static str, &'static str)] {
    &[
        ("cc", include_str!("../../presets/cc.toml")),
        ("gate", include_str!("../../presets/gate.toml")),
        ("intensity", include_str!("../../presets/intensity.toml")),
        ("modulation", include_str!("../../presets/modulation.toml")),
        ("multiband", include_str!("../../presets/multiband.toml")),
        ("notes", include_str!("../../presets/notes.toml")),
    ]
}

pub fn embedded_preset(name: &str) -> Option<&'static str> {
    embedded_presets()
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, text)| *text)
}
