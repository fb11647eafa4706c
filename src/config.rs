use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use directories::BaseDirs;
use serde::de::Deserializer;
use serde::Deserialize;

use crate::remote::portal::PortalAuth;
use crate::search::SearchField;

const CONFIG_FILE_NAME: &str = "config.toml";
const APP_NAME: &str = "rostr";

/// Accent color of the original deployment; decorative only.
const DEFAULT_ACCENT: RgbColor = RgbColor::new(0x11, 0x44, 0x61);
const DEFAULT_MAX_ITEMS: usize = 36;
const DEFAULT_PAGE_TITLE: &str = "Team Member Profiles";
const DEFAULT_PAGE_SUBTITLE: &str = "Get to know more about our team!";

#[derive(Debug, Clone)]
pub struct Config {
    pub config_path: PathBuf,
    pub portal: PortalConfig,
    pub roster: RosterConfig,
    pub search: SearchConfig,
    pub ui: UiConfig,
    pub keys: Keys,
}

// =============================================================================
// Portal Configuration
// =============================================================================

/// Connection to the host portal. The host normally supplies an
/// already-authenticated channel; in CLI form that is a pass-through
/// `Authorization` header or basic credentials.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Site URL: tenant origin plus site path.
    pub base_url: String,
    pub auth_header: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl PortalConfig {
    pub fn auth(&self) -> PortalAuth {
        if let Some(header) = self
            .auth_header
            .as_ref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
        {
            return PortalAuth::Header(header.to_string());
        }
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() => PortalAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => PortalAuth::None,
        }
    }
}

// =============================================================================
// Roster Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct RosterConfig {
    /// Primary source list identifier.
    pub list: String,
    /// Optional image library identifier for photo backfill.
    pub image_library: Option<String>,
    /// Display cap; 0 shows everything.
    pub max_items: usize,
    pub page_title: String,
    pub page_subtitle: String,
}

// =============================================================================
// Search Configuration
// =============================================================================

/// Field sets for the two query slots.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub primary_fields: Vec<SearchField>,
    pub secondary_fields: Vec<SearchField>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            primary_fields: vec![SearchField::Name],
            secondary_fields: vec![SearchField::Role],
        }
    }
}

fn parse_fields(names: &[String], slot: &str, fallback: Vec<SearchField>) -> Vec<SearchField> {
    let mut fields = Vec::new();
    for name in names {
        match SearchField::from_str(name) {
            Some(field) => {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
            None => eprintln!("warning: unknown search field `{name}` in search.{slot}"),
        }
    }
    if fields.is_empty() {
        fallback
    } else {
        fields
    }
}

// =============================================================================
// UI Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct UiConfig {
    /// Decorative accent, passed through to styling.
    pub accent: RgbColor,
    pub colors: UiColors,
    pub pane: UiPane,
    /// Reported display density; the photo cascade clamps it per profile.
    pub device_pixel_ratio: f32,
}

#[derive(Debug, Clone)]
pub struct UiColors {
    pub border: RgbColor,
    pub selection_bg: RgbColor,
    pub selection_fg: RgbColor,
    pub status_fg: RgbColor,
    pub status_bg: RgbColor,
}

#[derive(Debug, Clone)]
pub struct UiPane {
    pub image: UiPaneImage,
}

#[derive(Debug, Clone)]
pub struct UiPaneImage {
    pub width: u16,
    pub height: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

fn parse_hex_color(s: &str) -> Option<RgbColor> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(RgbColor { r, g, b })
}

impl<'de> serde::Deserialize<'de> for RgbColor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Hex(String),
            Array([u8; 3]),
            Map { r: u8, g: u8, b: u8 },
        }

        match Helper::deserialize(deserializer)? {
            Helper::Hex(s) => parse_hex_color(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid hex color `{s}`"))),
            Helper::Array(values) => Ok(RgbColor::new(values[0], values[1], values[2])),
            Helper::Map { r, g, b } => Ok(RgbColor { r, g, b }),
        }
    }
}

// =============================================================================
// Key Bindings - Context-aware with multiple bindings per action
// =============================================================================

/// All key bindings organized by context
#[derive(Debug, Clone)]
pub struct Keys {
    pub global: GlobalKeys,
    /// Keys while a search box has focus
    pub search_input: SearchInputKeys,
    /// Keys for card-list navigation
    pub list: ListKeys,
    /// Keys while the detail overlay is open
    pub overlay: OverlayKeys,
}

#[derive(Debug, Clone)]
pub struct GlobalKeys {
    pub quit: Vec<String>,
    pub search: Vec<String>,
    pub refresh: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SearchInputKeys {
    pub cancel: Vec<String>,
    pub confirm: Vec<String>,
    pub next: Vec<String>,
    pub prev: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ListKeys {
    pub next: Vec<String>,
    pub prev: Vec<String>,
    pub page_down: Vec<String>,
    pub page_up: Vec<String>,
    pub open: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OverlayKeys {
    pub close: Vec<String>,
    pub scroll_down: Vec<String>,
    pub scroll_up: Vec<String>,
}

impl Default for Keys {
    fn default() -> Self {
        Self {
            global: GlobalKeys::default(),
            search_input: SearchInputKeys::default(),
            list: ListKeys::default(),
            overlay: OverlayKeys::default(),
        }
    }
}

impl Default for GlobalKeys {
    fn default() -> Self {
        Self {
            quit: vec!["q".into()],
            search: vec!["/".into()],
            refresh: vec!["F5".into(), "r".into()],
        }
    }
}

impl Default for SearchInputKeys {
    fn default() -> Self {
        Self {
            cancel: vec!["Escape".into()],
            confirm: vec!["Enter".into()],
            next: vec!["Tab".into()],
            prev: vec!["Backtab".into()],
        }
    }
}

impl Default for ListKeys {
    fn default() -> Self {
        Self {
            next: vec!["j".into(), "Down".into()],
            prev: vec!["k".into(), "Up".into()],
            page_down: vec!["PageDown".into()],
            page_up: vec!["PageUp".into()],
            open: vec!["Enter".into()],
        }
    }
}

impl Default for OverlayKeys {
    fn default() -> Self {
        Self {
            close: vec!["Escape".into(), "q".into()],
            scroll_down: vec!["j".into(), "Down".into()],
            scroll_up: vec!["k".into(), "Up".into()],
        }
    }
}

// =============================================================================
// Loading
// =============================================================================

fn config_root() -> Result<PathBuf> {
    let base = BaseDirs::new().context("unable to determine config directory")?;
    Ok(base.config_dir().join(APP_NAME))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

pub fn load(path_override: Option<&Path>) -> Result<Config> {
    let path = match path_override {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    if !path.exists() {
        bail!(
            "configuration file not found at {}. Run `rostr init` to create one.",
            path.display()
        );
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file at {}", path.display()))?;

    from_toml_str(&raw, path)
}

fn from_toml_str(raw: &str, path: PathBuf) -> Result<Config> {
    let value: toml::Value = toml::from_str(raw)
        .with_context(|| format!("failed to parse {} as TOML", path.display()))?;

    warn_unknown_keys(&value);

    let cfg_file: ConfigFile = value
        .try_into()
        .with_context(|| format!("failed to deserialize config from {}", path.display()))?;

    let portal_file = cfg_file.portal.unwrap_or_default();
    let base_url = portal_file
        .base_url
        .as_deref()
        .map(|s| s.trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty());
    let Some(base_url) = base_url else {
        bail!("`portal.base_url` must be specified in configuration");
    };

    let roster_file = cfg_file.roster.unwrap_or_default();
    let search_file = cfg_file.search.unwrap_or_default();
    let ui_file = cfg_file.ui.unwrap_or_default();
    let keys_file = cfg_file.keys.unwrap_or_default();

    let defaults = SearchConfig::default();
    let search = SearchConfig {
        primary_fields: parse_fields(
            &search_file.primary_fields,
            "primary_fields",
            defaults.primary_fields,
        ),
        secondary_fields: parse_fields(
            &search_file.secondary_fields,
            "secondary_fields",
            defaults.secondary_fields,
        ),
    };

    let device_pixel_ratio = ui_file.device_pixel_ratio.unwrap_or(1.0);
    if !(0.5..=4.0).contains(&device_pixel_ratio) {
        bail!("ui.device_pixel_ratio must be between 0.5 and 4.0");
    }

    Ok(Config {
        config_path: path,
        portal: PortalConfig {
            base_url,
            auth_header: portal_file.auth_header,
            username: portal_file.username,
            password: portal_file.password,
        },
        roster: RosterConfig {
            list: roster_file.list.unwrap_or_default(),
            image_library: roster_file.image_library.filter(|s| !s.trim().is_empty()),
            max_items: roster_file.max_items.unwrap_or(DEFAULT_MAX_ITEMS),
            page_title: roster_file
                .page_title
                .unwrap_or_else(|| DEFAULT_PAGE_TITLE.to_string()),
            page_subtitle: roster_file
                .page_subtitle
                .unwrap_or_else(|| DEFAULT_PAGE_SUBTITLE.to_string()),
        },
        search,
        ui: UiConfig {
            accent: ui_file.accent.unwrap_or(DEFAULT_ACCENT),
            colors: ui_file.colors.into(),
            pane: ui_file.pane.into(),
            device_pixel_ratio,
        },
        keys: keys_file.into(),
    })
}

// =============================================================================
// Unknown key warnings
// =============================================================================

fn warn_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    let known = HashSet::from(["portal", "roster", "search", "ui", "keys"]);
    for key in table.keys() {
        if !known.contains(key.as_str()) {
            eprintln!("warning: unknown configuration key `{key}`");
        }
    }

    if let Some(portal) = table.get("portal") {
        warn_unknown_in_section(
            portal,
            "portal",
            &["base_url", "auth_header", "username", "password"],
        );
    }
    if let Some(roster) = table.get("roster") {
        warn_unknown_in_section(
            roster,
            "roster",
            &["list", "image_library", "max_items", "page_title", "page_subtitle"],
        );
    }
    if let Some(search) = table.get("search") {
        warn_unknown_in_section(search, "search", &["primary_fields", "secondary_fields"]);
    }
    if let Some(keys) = table.get("keys") {
        warn_unknown_in_section(keys, "keys", &["global", "search_input", "list", "overlay"]);
    }
}

fn warn_unknown_in_section(value: &toml::Value, section: &str, known: &[&str]) {
    let Some(table) = value.as_table() else {
        return;
    };
    for key in table.keys() {
        if !known.contains(&key.as_str()) {
            eprintln!("warning: unknown configuration key `{section}.{key}`");
        }
    }
}

// =============================================================================
// Raw file structures
// =============================================================================

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    portal: Option<PortalFile>,
    roster: Option<RosterFile>,
    search: Option<SearchFile>,
    ui: Option<UiFile>,
    keys: Option<KeysFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PortalFile {
    base_url: Option<String>,
    auth_header: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RosterFile {
    list: Option<String>,
    image_library: Option<String>,
    max_items: Option<usize>,
    page_title: Option<String>,
    page_subtitle: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchFile {
    #[serde(default)]
    primary_fields: Vec<String>,
    #[serde(default)]
    secondary_fields: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct UiFile {
    accent: Option<RgbColor>,
    #[serde(default)]
    colors: UiColorsFile,
    #[serde(default)]
    pane: UiPaneFile,
    device_pixel_ratio: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct UiColorsFile {
    border: RgbColor,
    selection_bg: RgbColor,
    selection_fg: RgbColor,
    status_fg: RgbColor,
    status_bg: RgbColor,
}

impl Default for UiColorsFile {
    fn default() -> Self {
        Self {
            border: DEFAULT_ACCENT,
            selection_bg: DEFAULT_ACCENT,
            selection_fg: RgbColor::new(255, 255, 255),
            status_fg: DEFAULT_ACCENT,
            status_bg: RgbColor::new(0, 0, 0),
        }
    }
}

impl From<UiColorsFile> for UiColors {
    fn from(file: UiColorsFile) -> Self {
        Self {
            border: file.border,
            selection_bg: file.selection_bg,
            selection_fg: file.selection_fg,
            status_fg: file.status_fg,
            status_bg: file.status_bg,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct UiPaneFile {
    image_width: u16,
    image_height: u16,
}

impl Default for UiPaneFile {
    fn default() -> Self {
        Self {
            image_width: 42,
            image_height: 18,
        }
    }
}

impl From<UiPaneFile> for UiPane {
    fn from(file: UiPaneFile) -> Self {
        Self {
            image: UiPaneImage {
                width: file.image_width,
                height: file.image_height,
            },
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct KeysFile {
    global: Option<GlobalKeysFile>,
    search_input: Option<SearchInputKeysFile>,
    list: Option<ListKeysFile>,
    overlay: Option<OverlayKeysFile>,
}

#[derive(Debug, Deserialize, Default)]
struct GlobalKeysFile {
    quit: Option<Vec<String>>,
    search: Option<Vec<String>>,
    refresh: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchInputKeysFile {
    cancel: Option<Vec<String>>,
    confirm: Option<Vec<String>>,
    next: Option<Vec<String>>,
    prev: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ListKeysFile {
    next: Option<Vec<String>>,
    prev: Option<Vec<String>>,
    page_down: Option<Vec<String>>,
    page_up: Option<Vec<String>>,
    open: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayKeysFile {
    close: Option<Vec<String>>,
    scroll_down: Option<Vec<String>>,
    scroll_up: Option<Vec<String>>,
}

impl From<KeysFile> for Keys {
    fn from(file: KeysFile) -> Self {
        let defaults = Keys::default();
        let global = file.global.unwrap_or_default();
        let search_input = file.search_input.unwrap_or_default();
        let list = file.list.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();

        Self {
            global: GlobalKeys {
                quit: global.quit.unwrap_or(defaults.global.quit),
                search: global.search.unwrap_or(defaults.global.search),
                refresh: global.refresh.unwrap_or(defaults.global.refresh),
            },
            search_input: SearchInputKeys {
                cancel: search_input.cancel.unwrap_or(defaults.search_input.cancel),
                confirm: search_input
                    .confirm
                    .unwrap_or(defaults.search_input.confirm),
                next: search_input.next.unwrap_or(defaults.search_input.next),
                prev: search_input.prev.unwrap_or(defaults.search_input.prev),
            },
            list: ListKeys {
                next: list.next.unwrap_or(defaults.list.next),
                prev: list.prev.unwrap_or(defaults.list.prev),
                page_down: list.page_down.unwrap_or(defaults.list.page_down),
                page_up: list.page_up.unwrap_or(defaults.list.page_up),
                open: list.open.unwrap_or(defaults.list.open),
            },
            overlay: OverlayKeys {
                close: overlay.close.unwrap_or(defaults.overlay.close),
                scroll_down: overlay.scroll_down.unwrap_or(defaults.overlay.scroll_down),
                scroll_up: overlay.scroll_up.unwrap_or(defaults.overlay.scroll_up),
            },
        }
    }
}

// =============================================================================
// Initialization
// =============================================================================

const CONFIG_TEMPLATE: &str = r##"# rostr configuration

[portal]
# Site URL: tenant origin plus site path.
base_url = "https://contoso.example.com/sites/team"
# Either a pass-through Authorization header value...
# auth_header = "Bearer ..."
# ...or basic credentials.
# username = "svc-account"
# password = "secret"

[roster]
# Primary source list identifier (see `rostr sources`).
list = ""
# Optional image library identifier for photo backfill.
# image_library = ""
# Display cap; 0 shows everything.
max_items = 36
page_title = "Team Member Profiles"
page_subtitle = "Get to know more about our team!"

[search]
# Fields matched by the two search boxes: name, role, body, links.
primary_fields = ["name"]
secondary_fields = ["role"]

[ui]
accent = "#114461"
device_pixel_ratio = 1.0
"##;

/// Write the default configuration. Refuses to overwrite unless forced.
pub fn write_default(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "Configuration already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir: {}", parent.display()))?;
        }
    }
    fs::write(path, CONFIG_TEMPLATE)
        .with_context(|| format!("failed to write configuration to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Build a `Config` from raw TOML for state-machine tests elsewhere in
    /// the crate.
    pub(crate) fn parse_for_tests(raw: &str, path: PathBuf) -> Config {
        from_toml_str(raw, path).expect("test config must parse")
    }
}
