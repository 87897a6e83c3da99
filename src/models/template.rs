use serde::Serialize;

/// A named foreground/background preset offered by the editor.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub foreground_color: &'static str,
    pub background_color: &'static str,
}

const fn preset(
    id: &'static str,
    name: &'static str,
    foreground_color: &'static str,
    background_color: &'static str,
) -> StyleTemplate {
    StyleTemplate {
        id,
        name,
        foreground_color,
        background_color,
    }
}

pub const STYLE_TEMPLATES: [StyleTemplate; 8] = [
    preset("classic", "Classic", "#000000", "#ffffff"),
    preset("ocean", "Ocean", "#1e3a5f", "#e0f0ff"),
    preset("forest", "Forest", "#1b4332", "#d8f3dc"),
    preset("sunset", "Sunset", "#7c2d12", "#fff7ed"),
    preset("berry", "Berry", "#701a75", "#fdf4ff"),
    preset("midnight", "Midnight", "#e2e8f0", "#1e293b"),
    preset("ruby", "Ruby", "#9f1239", "#fff1f2"),
    preset("gold", "Gold", "#78350f", "#fefce8"),
];
