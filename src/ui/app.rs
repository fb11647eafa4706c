use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use ratatui_image::{picker::Picker, protocol::StatefulProtocol};
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use crate::config::Config;
use crate::loader::{FetchEvent, Fetcher, PhotoSlotId};
use crate::photo::{self, CascadeContext, PhotoCascade, RenditionProfile};
use crate::record::ProfileRecord;
use crate::remote::Directory;
use crate::sanitize;
use crate::search::{self, QuerySlot};

use super::draw;

const DEFAULT_FONT_SIZE: (u16, u16) = (8, 16);

fn create_image_picker() -> Picker {
    let mut picker = base_picker();
    picker.guess_protocol();
    picker
}

#[cfg(unix)]
fn base_picker() -> Picker {
    Picker::from_termios().unwrap_or_else(|_| Picker::new(DEFAULT_FONT_SIZE))
}

#[cfg(not(unix))]
fn base_picker() -> Picker {
    Picker::new(DEFAULT_FONT_SIZE)
}

/// Which element receives typed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    NameInput,
    RoleInput,
    List,
}

/// Detail overlay state for one selected record.
#[derive(Debug, Clone)]
pub struct DetailOverlay {
    pub record_id: i64,
    /// Sanitized, flattened body lines; never raw markup.
    pub body_lines: Vec<String>,
    pub scroll: usize,
}

/// One rendered image slot: the cascade state plus the decoded image.
/// Exactly one request is in flight at a time; its URL is remembered so a
/// stale response (record changed mid-fetch) is discarded on arrival.
pub struct PhotoSlot {
    profile: RenditionProfile,
    pub cascade: Option<PhotoCascade>,
    pub in_flight: Option<String>,
    pub image: Option<Box<dyn StatefulProtocol>>,
    /// Initials glyph once every strategy is exhausted (or no record).
    pub placeholder: Option<String>,
}

impl PhotoSlot {
    fn new(profile: RenditionProfile) -> Self {
        Self {
            profile,
            cascade: None,
            in_flight: None,
            image: None,
            placeholder: None,
        }
    }

    fn clear(&mut self) {
        self.cascade = None;
        self.in_flight = None;
        self.image = None;
        self.placeholder = None;
    }
}

/// Pick the candidate variant matching the configured display density.
fn pick_candidate_url(candidate: &photo::Candidate, dpr: f32) -> String {
    if dpr >= 1.5 {
        if let Some(url_2x) = &candidate.url_2x {
            return url_2x.clone();
        }
    }
    candidate.url.clone()
}

pub struct App<'a> {
    config: &'a Config,
    fetcher: Fetcher,
    origin: String,
    site_url: String,
    pub profiles: Vec<ProfileRecord>,
    /// Filter+cap result: indices into `profiles`, original order.
    pub visible: Vec<usize>,
    /// Position within `visible`.
    pub selected: usize,
    pub name_input: Input,
    pub role_input: Input,
    pub focus: Focus,
    pub loading: bool,
    load_generation: u64,
    pub load_error: Option<String>,
    pub status: Option<String>,
    pub overlay: Option<DetailOverlay>,
    /// Card-list scrolling is suppressed while the overlay is open;
    /// released exactly once on close.
    scroll_locked: bool,
    pub avatar: PhotoSlot,
    pub portrait: PhotoSlot,
    image_picker: Picker,
}

impl<'a> App<'a> {
    pub fn new(config: &'a Config, directory: Arc<dyn Directory>, origin: String, site_url: String) -> Self {
        let mut app = Self {
            config,
            fetcher: Fetcher::new(directory),
            origin,
            site_url,
            profiles: Vec::new(),
            visible: Vec::new(),
            selected: 0,
            name_input: Input::default(),
            role_input: Input::default(),
            focus: Focus::List,
            loading: false,
            load_generation: 0,
            load_error: None,
            status: None,
            overlay: None,
            scroll_locked: false,
            avatar: PhotoSlot::new(photo::AVATAR),
            portrait: PhotoSlot::new(photo::PORTRAIT),
            image_picker: create_image_picker(),
        };
        app.start_load();
        app
    }

    pub fn run(&mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut stdout = stdout();
        stdout.execute(EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop<B>(&mut self, terminal: &mut Terminal<B>) -> Result<()>
    where
        B: ratatui::backend::Backend,
    {
        loop {
            self.pump_fetch_events();
            draw::render(terminal, self)?;

            if event::poll(Duration::from_millis(250))? {
                match event::read()? {
                    Event::Key(key) => {
                        if self.handle_key(key)? {
                            break;
                        }
                    }
                    Event::Resize(_, _) => {}
                    _ => {}
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Data loading
    // =========================================================================

    pub fn start_load(&mut self) {
        self.loading = true;
        self.load_error = None;
        self.load_generation = self.fetcher.request_roster(
            self.config.roster.list.clone(),
            self.config.roster.image_library.clone(),
            self.origin.clone(),
        );
    }

    /// Drain completed background work. Roster results from a superseded
    /// load are discarded here.
    pub fn pump_fetch_events(&mut self) {
        while let Some(event) = self.fetcher.try_recv() {
            match event {
                FetchEvent::Roster {
                    generation,
                    result,
                    warning,
                } => {
                    if generation != self.load_generation || !self.fetcher.is_current(generation) {
                        continue;
                    }
                    self.apply_roster(result, warning);
                }
                FetchEvent::Photo {
                    slot,
                    record_id,
                    url,
                    result,
                } => {
                    self.on_photo_event(slot, record_id, &url, result);
                }
            }
        }
    }

    pub fn apply_roster(&mut self, result: Result<Vec<ProfileRecord>, String>, warning: Option<String>) {
        self.loading = false;
        match result {
            Ok(profiles) => {
                self.profiles = profiles;
                self.load_error = None;
                if let Some(warning) = warning {
                    self.set_status(warning);
                }
                // Drop an overlay whose record vanished from the new data.
                let overlay_gone = self
                    .overlay
                    .as_ref()
                    .map(|overlay| !self.profiles.iter().any(|p| p.id == overlay.record_id))
                    .unwrap_or(false);
                if overlay_gone {
                    self.close_overlay();
                }
                self.recompute_visible();
                self.sync_portrait_slot();
            }
            Err(message) => {
                // Whole-view failure: no partial rendering.
                self.profiles.clear();
                self.visible.clear();
                self.close_overlay();
                self.avatar.clear();
                self.portrait.clear();
                self.load_error = Some(message);
            }
        }
    }

    // =========================================================================
    // Search/filter/page
    // =========================================================================

    /// Recompute the visible card set. Pure recomputation on every
    /// keystroke and data change; nothing is memoized across inputs.
    pub fn recompute_visible(&mut self) {
        let slots = [
            QuerySlot {
                text: self.name_input.value(),
                fields: &self.config.search.primary_fields,
            },
            QuerySlot {
                text: self.role_input.value(),
                fields: &self.config.search.secondary_fields,
            },
        ];
        let filtered = search::filter_indices(&self.profiles, &slots);
        self.visible = search::cap(filtered, self.config.roster.max_items);

        if self.visible.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.visible.len() {
            self.selected = self.visible.len() - 1;
        }
        self.sync_avatar_slot();
    }

    pub fn current_record(&self) -> Option<&ProfileRecord> {
        self.visible
            .get(self.selected)
            .and_then(|&idx| self.profiles.get(idx))
    }

    pub fn overlay_record(&self) -> Option<&ProfileRecord> {
        let overlay = self.overlay.as_ref()?;
        self.profiles.iter().find(|p| p.id == overlay.record_id)
    }

    // =========================================================================
    // Photo slots
    // =========================================================================

    fn cascade_context(&self, profile: RenditionProfile) -> CascadeContext {
        CascadeContext {
            origin: self.origin.clone(),
            site_url: self.site_url.clone(),
            profile,
            dpr: self.config.ui.device_pixel_ratio,
        }
    }

    /// Keep the avatar slot owned by the highlighted record, rebuilding the
    /// cascade whenever the record identity or asset reference changes.
    pub fn sync_avatar_slot(&mut self) {
        let Some(record) = self.current_record().cloned() else {
            self.avatar.clear();
            return;
        };
        let owned = self
            .avatar
            .cascade
            .as_ref()
            .map(|cascade| cascade.owns(&record))
            .unwrap_or(false);
        if !owned {
            let ctx = self.cascade_context(self.avatar.profile);
            self.avatar.cascade = Some(PhotoCascade::new(&record, &ctx));
            self.avatar.in_flight = None;
            self.avatar.image = None;
            self.avatar.placeholder = None;
        }
        self.ensure_slot_fetch(PhotoSlotId::Avatar);
    }

    /// Same, for the overlay's portrait slot (higher-resolution cascade).
    pub fn sync_portrait_slot(&mut self) {
        let Some(record) = self.overlay_record().cloned() else {
            self.portrait.clear();
            return;
        };
        let owned = self
            .portrait
            .cascade
            .as_ref()
            .map(|cascade| cascade.owns(&record))
            .unwrap_or(false);
        if !owned {
            let ctx = self.cascade_context(self.portrait.profile);
            self.portrait.cascade = Some(PhotoCascade::new(&record, &ctx));
            self.portrait.in_flight = None;
            self.portrait.image = None;
            self.portrait.placeholder = None;
        }
        self.ensure_slot_fetch(PhotoSlotId::Portrait);
    }

    fn slot_mut(&mut self, id: PhotoSlotId) -> &mut PhotoSlot {
        match id {
            PhotoSlotId::Avatar => &mut self.avatar,
            PhotoSlotId::Portrait => &mut self.portrait,
        }
    }

    fn slot_owner(&self, id: PhotoSlotId) -> Option<ProfileRecord> {
        match id {
            PhotoSlotId::Avatar => self.current_record().cloned(),
            PhotoSlotId::Portrait => self.overlay_record().cloned(),
        }
    }

    /// Issue the next fetch for a slot, or settle on the placeholder once
    /// the cascade is exhausted. At most one request per slot in flight.
    fn ensure_slot_fetch(&mut self, id: PhotoSlotId) {
        let owner = self.slot_owner(id);
        let dpr = self.config.ui.device_pixel_ratio;
        let slot = self.slot_mut(id);

        if slot.image.is_some() || slot.in_flight.is_some() {
            return;
        }
        let Some(cascade) = &slot.cascade else {
            return;
        };
        match cascade.candidate() {
            Some(candidate) => {
                let url = pick_candidate_url(candidate, dpr);
                let record_id = cascade.record_id();
                slot.in_flight = Some(url.clone());
                self.fetcher.request_photo(id, record_id, url);
            }
            None => {
                slot.placeholder = Some(
                    owner
                        .map(|record| photo::initials(&record.name))
                        .unwrap_or_default(),
                );
            }
        }
    }

    /// Apply one image-fetch completion. Responses for a URL we are no
    /// longer waiting on (the record changed mid-flight) are discarded.
    pub fn on_photo_event(
        &mut self,
        id: PhotoSlotId,
        record_id: i64,
        url: &str,
        result: Result<Vec<u8>, String>,
    ) {
        {
            let slot = self.slot_mut(id);
            let Some(cascade) = &slot.cascade else {
                return;
            };
            if cascade.record_id() != record_id || slot.in_flight.as_deref() != Some(url) {
                return;
            }
            slot.in_flight = None;
        }

        let decoded = result
            .ok()
            .and_then(|bytes| image::load_from_memory(&bytes).ok());
        match decoded {
            Some(img) => {
                let protocol = self.image_picker.new_resize_protocol(img);
                self.slot_mut(id).image = Some(protocol);
            }
            None => {
                // Failure drives the cascade forward exactly one strategy.
                if let Some(cascade) = self.slot_mut(id).cascade.as_mut() {
                    cascade.advance();
                }
                self.ensure_slot_fetch(id);
            }
        }
    }

    // =========================================================================
    // Overlay
    // =========================================================================

    pub fn open_overlay(&mut self) {
        let Some(record) = self.current_record() else {
            return;
        };
        let body_lines = record
            .details_html
            .as_deref()
            .map(sanitize::plain_text)
            .map(|text| text.lines().map(str::to_string).collect())
            .unwrap_or_default();
        self.overlay = Some(DetailOverlay {
            record_id: record.id,
            body_lines,
            scroll: 0,
        });
        if !self.scroll_locked {
            self.scroll_locked = true;
        }
        self.sync_portrait_slot();
    }

    /// Close the overlay and release the scroll lock. Idempotent: a second
    /// close (double Escape, close-then-outside-click) must not release
    /// anything twice.
    pub fn close_overlay(&mut self) {
        self.overlay = None;
        self.portrait.clear();
        if self.scroll_locked {
            self.scroll_locked = false;
        }
    }

    // =========================================================================
    // Selection
    // =========================================================================

    pub fn move_selection(&mut self, delta: i64) {
        if self.scroll_locked || self.visible.is_empty() {
            return;
        }
        let len = self.visible.len() as i64;
        let mut index = self.selected as i64 + delta;
        if index < 0 {
            index = 0;
        }
        if index >= len {
            index = len - 1;
        }
        self.selected = index as usize;
        self.sync_avatar_slot();
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    // =========================================================================
    // Key handling
    // =========================================================================

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Ctrl+C always quits (hardcoded for safety)
        if key.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C'))
        {
            return Ok(true);
        }

        if self.overlay.is_some() {
            self.handle_overlay_key(key);
            return Ok(false);
        }

        match self.focus {
            Focus::NameInput | Focus::RoleInput => {
                self.handle_search_key(key);
                Ok(false)
            }
            Focus::List => self.handle_list_key(key),
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) {
        let overlay_keys = &self.config.keys.overlay;
        if self.key_matches_any(&key, &overlay_keys.close) {
            self.close_overlay();
            return;
        }
        if self.key_matches_any(&key, &overlay_keys.scroll_down) {
            if let Some(overlay) = self.overlay.as_mut() {
                if overlay.scroll + 1 < overlay.body_lines.len().max(1) {
                    overlay.scroll += 1;
                }
            }
            return;
        }
        if self.key_matches_any(&key, &overlay_keys.scroll_up) {
            if let Some(overlay) = self.overlay.as_mut() {
                overlay.scroll = overlay.scroll.saturating_sub(1);
            }
        }
    }

    fn handle_search_key(&mut self, key: KeyEvent) {
        let search_keys = &self.config.keys.search_input;
        if self.key_matches_any(&key, &search_keys.cancel)
            || self.key_matches_any(&key, &search_keys.confirm)
        {
            self.focus = Focus::List;
            return;
        }
        if self.key_matches_any(&key, &search_keys.next)
            || self.key_matches_any(&key, &search_keys.prev)
        {
            self.focus = match self.focus {
                Focus::NameInput => Focus::RoleInput,
                _ => Focus::NameInput,
            };
            return;
        }

        let input = match self.focus {
            Focus::NameInput => &mut self.name_input,
            _ => &mut self.role_input,
        };
        input.handle_event(&Event::Key(key));
        // Every keystroke recomputes the pipeline; stale results are never
        // shown after a query change.
        self.recompute_visible();
    }

    fn handle_list_key(&mut self, key: KeyEvent) -> Result<bool> {
        let global = &self.config.keys.global;
        if self.key_matches_any(&key, &global.quit) {
            return Ok(true);
        }
        if self.key_matches_any(&key, &global.search) {
            self.focus = Focus::NameInput;
            return Ok(false);
        }
        if self.key_matches_any(&key, &global.refresh) {
            self.set_status("Refreshing...");
            self.start_load();
            return Ok(false);
        }

        let list = &self.config.keys.list;
        if self.key_matches_any(&key, &list.next) {
            self.move_selection(1);
        } else if self.key_matches_any(&key, &list.prev) {
            self.move_selection(-1);
        } else if self.key_matches_any(&key, &list.page_down) {
            self.move_selection(10);
        } else if self.key_matches_any(&key, &list.page_up) {
            self.move_selection(-10);
        } else if self.key_matches_any(&key, &list.open) {
            self.open_overlay();
        }
        Ok(false)
    }

    fn key_matches_any(&self, event: &KeyEvent, bindings: &[String]) -> bool {
        bindings.iter().any(|b| key_matches_single(event, b))
    }

    // =========================================================================
    // Accessors for draw
    // =========================================================================

    pub fn config(&self) -> &Config {
        self.config
    }

    pub fn avatar_image_state(&mut self) -> Option<&mut Box<dyn StatefulProtocol>> {
        self.avatar.image.as_mut()
    }

    pub fn portrait_image_state(&mut self) -> Option<&mut Box<dyn StatefulProtocol>> {
        self.portrait.image.as_mut()
    }
}

/// Check if the key event matches a single binding string
fn key_matches_single(event: &KeyEvent, binding: &str) -> bool {
    let trimmed = binding.trim();
    if trimmed.is_empty() {
        return false;
    }

    // Disallow Ctrl/Alt/Super modifiers (we don't support them)
    let disallowed = KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER;
    if event.modifiers.intersects(disallowed) {
        return false;
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "enter" => matches!(event.code, KeyCode::Enter),
        "tab" => matches!(event.code, KeyCode::Tab),
        "backtab" | "shift+tab" => matches!(event.code, KeyCode::BackTab),
        "backspace" => matches!(event.code, KeyCode::Backspace),
        "esc" | "escape" => matches!(event.code, KeyCode::Esc),
        "space" => matches!(event.code, KeyCode::Char(' ')),
        "up" => matches!(event.code, KeyCode::Up),
        "down" => matches!(event.code, KeyCode::Down),
        "left" => matches!(event.code, KeyCode::Left),
        "right" => matches!(event.code, KeyCode::Right),
        "pageup" | "page_up" => matches!(event.code, KeyCode::PageUp),
        "pagedown" | "page_down" => matches!(event.code, KeyCode::PageDown),
        "home" => matches!(event.code, KeyCode::Home),
        "end" => matches!(event.code, KeyCode::End),
        "f1" => matches!(event.code, KeyCode::F(1)),
        "f2" => matches!(event.code, KeyCode::F(2)),
        "f3" => matches!(event.code, KeyCode::F(3)),
        "f4" => matches!(event.code, KeyCode::F(4)),
        "f5" => matches!(event.code, KeyCode::F(5)),
        "f6" => matches!(event.code, KeyCode::F(6)),
        "f7" => matches!(event.code, KeyCode::F(7)),
        "f8" => matches!(event.code, KeyCode::F(8)),
        "f9" => matches!(event.code, KeyCode::F(9)),
        "f10" => matches!(event.code, KeyCode::F(10)),
        "f11" => matches!(event.code, KeyCode::F(11)),
        "f12" => matches!(event.code, KeyCode::F(12)),
        // Single character - case-sensitive (m != M, since M requires Shift)
        _ => {
            let mut chars = trimmed.chars();
            if let (Some(first), None) = (chars.next(), chars.next()) {
                matches!(event.code, KeyCode::Char(c) if c == first)
            } else {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, Config};
    use crate::loader::tests::FakeDirectory;
    use std::path::PathBuf;

    fn test_config() -> Config {
        let raw = r#"
            [portal]
            base_url = "https://contoso.example.com/sites/team"
            [roster]
            list = "primary-list"
            image_library = "image-library"
            max_items = 0
        "#;
        config::test_support::parse_for_tests(raw, PathBuf::from("test.toml"))
    }

    fn record(id: i64, name: &str, role: &str, photo: Option<&str>) -> ProfileRecord {
        ProfileRecord {
            id,
            name: name.to_string(),
            role: role.to_string(),
            hire_date: None,
            birthday: None,
            company_url: None,
            linked_in_url: None,
            photo_url: photo.map(str::to_string),
            identity_key: None,
            details_html: None,
        }
    }

    fn app_with_roster<'a>(config: &'a Config, profiles: Vec<ProfileRecord>) -> App<'a> {
        let mut app = App::new(
            config,
            Arc::new(FakeDirectory::default()),
            "https://contoso.example.com".to_string(),
            "https://contoso.example.com/sites/team".to_string(),
        );
        app.apply_roster(Ok(profiles), None);
        app
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn typing_recomputes_the_visible_set() {
        let config = test_config();
        let mut app = app_with_roster(
            &config,
            vec![
                record(1, "Ann Lee", "Engineer", None),
                record(2, "Bo Kim", "Designer", None),
            ],
        );
        assert_eq!(app.visible, vec![0, 1]);

        app.focus = Focus::RoleInput;
        for c in "eng".chars() {
            app.handle_search_key(key(KeyCode::Char(c)));
        }
        assert_eq!(app.visible, vec![0]);
        assert_eq!(app.current_record().unwrap().name, "Ann Lee");

        // Clearing the query restores the full set in original order.
        for _ in 0..3 {
            app.handle_search_key(key(KeyCode::Backspace));
        }
        assert_eq!(app.visible, vec![0, 1]);
    }

    #[test]
    fn overlay_open_and_close_manage_selection_and_lock() {
        let config = test_config();
        let mut app = app_with_roster(
            &config,
            vec![
                record(1, "Ann Lee", "Engineer", None),
                record(2, "Bo Kim", "Designer", None),
            ],
        );

        app.move_selection(1);
        app.open_overlay();
        let overlay = app.overlay.as_ref().unwrap();
        assert_eq!(overlay.record_id, 2);
        assert!(app.scroll_locked);

        // Background scroll is suppressed while the overlay is open.
        app.move_selection(-1);
        assert_eq!(app.selected, 1);

        app.close_overlay();
        assert!(app.overlay.is_none());
        assert!(!app.scroll_locked);

        // A second dismissal is a no-op, not a second release.
        app.close_overlay();
        assert!(!app.scroll_locked);
        app.move_selection(-1);
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn overlay_body_is_sanitized_plain_text() {
        let config = test_config();
        let mut bio = record(1, "Ann Lee", "Engineer", None);
        bio.details_html =
            Some("<p>Builds things</p><script>alert('x')</script><p>Loves tea</p>".to_string());
        let mut app = app_with_roster(&config, vec![bio]);

        app.open_overlay();
        let overlay = app.overlay.as_ref().unwrap();
        assert_eq!(overlay.body_lines, vec!["Builds things", "Loves tea"]);
    }

    #[test]
    fn avatar_cascade_resets_when_selection_changes_even_with_same_url() {
        let config = test_config();
        let shared = Some("https://contoso.example.com/lib/shared.jpg");
        let mut app = app_with_roster(
            &config,
            vec![
                record(1, "Ann Lee", "Engineer", shared),
                record(2, "Bo Kim", "Designer", shared),
            ],
        );

        let first = app.avatar.cascade.as_ref().unwrap().record_id();
        assert_eq!(first, 1);

        app.move_selection(1);
        let second = app.avatar.cascade.as_ref().unwrap().record_id();
        assert_eq!(second, 2, "same asset URL, different record: fresh cascade");
    }

    #[test]
    fn photo_failure_advances_and_exhaustion_renders_initials() {
        let config = test_config();
        let mut app = app_with_roster(
            &config,
            vec![record(1, "Ann Lee", "Engineer", Some("https://x.example.com/a.jpg"))],
        );

        // Candidate 1: rendition (no identity key on the record).
        let url1 = app.avatar.in_flight.clone().unwrap();
        assert!(url1.contains("mode=crop"));
        app.on_photo_event(PhotoSlotId::Avatar, 1, &url1, Err("404".to_string()));

        // Candidate 2: raw asset.
        let url2 = app.avatar.in_flight.clone().unwrap();
        assert_eq!(url2, "https://x.example.com/a.jpg");
        app.on_photo_event(PhotoSlotId::Avatar, 1, &url2, Err("404".to_string()));

        // Candidate 3: preview handler.
        let url3 = app.avatar.in_flight.clone().unwrap();
        assert!(url3.contains("getpreview.ashx"));
        app.on_photo_event(PhotoSlotId::Avatar, 1, &url3, Err("404".to_string()));

        // Exhausted: deterministic placeholder, no further requests.
        assert!(app.avatar.in_flight.is_none());
        assert_eq!(app.avatar.placeholder.as_deref(), Some("AL"));
    }

    #[test]
    fn stale_photo_responses_are_discarded() {
        let config = test_config();
        let mut app = app_with_roster(
            &config,
            vec![
                record(1, "Ann Lee", "Engineer", Some("https://x.example.com/a.jpg")),
                record(2, "Bo Kim", "Designer", Some("https://x.example.com/b.jpg")),
            ],
        );

        let old_url = app.avatar.in_flight.clone().unwrap();
        app.move_selection(1); // selection changed while the fetch was in flight
        let new_url = app.avatar.in_flight.clone().unwrap();
        assert_ne!(old_url, new_url);

        app.on_photo_event(PhotoSlotId::Avatar, 1, &old_url, Err("404".to_string()));
        assert_eq!(
            app.avatar.in_flight.as_deref(),
            Some(new_url.as_str()),
            "stale response must not advance the new record's cascade"
        );
        assert_eq!(app.avatar.cascade.as_ref().unwrap().strategy_index(), 0);
    }

    #[test]
    fn undecodable_bytes_count_as_a_load_failure() {
        let config = test_config();
        let mut app = app_with_roster(
            &config,
            vec![record(1, "Ann Lee", "Engineer", Some("https://x.example.com/a.jpg"))],
        );
        let url = app.avatar.in_flight.clone().unwrap();
        app.on_photo_event(PhotoSlotId::Avatar, 1, &url, Ok(b"not an image".to_vec()));
        assert_eq!(app.avatar.cascade.as_ref().unwrap().strategy_index(), 1);
        assert!(app.avatar.in_flight.is_some(), "next strategy fetch issued");
    }

    #[test]
    fn primary_failure_clears_the_view() {
        let config = test_config();
        let mut app = app_with_roster(&config, vec![record(1, "Ann Lee", "Engineer", None)]);
        app.apply_roster(Err("list unreachable".to_string()), None);
        assert!(app.profiles.is_empty());
        assert!(app.visible.is_empty());
        assert_eq!(app.load_error.as_deref(), Some("list unreachable"));
    }

    #[test]
    fn secondary_warning_surfaces_in_the_status_line() {
        let config = test_config();
        let mut app = app_with_roster(&config, vec![]);
        app.apply_roster(
            Ok(vec![record(1, "Ann Lee", "Engineer", None)]),
            Some("image library unavailable: offline".to_string()),
        );
        assert_eq!(app.profiles.len(), 1, "primary data still renders");
        assert!(app.status.as_deref().unwrap().contains("image library"));
    }

    #[test]
    fn overlay_closes_when_its_record_disappears_on_refresh() {
        let config = test_config();
        let mut app = app_with_roster(
            &config,
            vec![
                record(1, "Ann Lee", "Engineer", None),
                record(2, "Bo Kim", "Designer", None),
            ],
        );
        app.move_selection(1);
        app.open_overlay();
        assert!(app.overlay.is_some());

        app.apply_roster(Ok(vec![record(1, "Ann Lee", "Engineer", None)]), None);
        assert!(app.overlay.is_none());
        assert!(!app.scroll_locked);
    }

    #[test]
    fn max_items_caps_the_visible_prefix() {
        let raw = r#"
            [portal]
            base_url = "https://contoso.example.com/sites/team"
            [roster]
            list = "primary-list"
            max_items = 2
        "#;
        let config = config::test_support::parse_for_tests(raw, PathBuf::from("test.toml"));
        let app = app_with_roster(
            &config,
            vec![
                record(1, "Ann Lee", "Engineer", None),
                record(2, "Bo Kim", "Designer", None),
                record(3, "Cy Ngo", "Manager", None),
            ],
        );
        assert_eq!(app.visible, vec![0, 1]);
    }
}
