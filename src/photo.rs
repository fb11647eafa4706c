//! Photo resolution: URL builders and the per-slot fallback state machine.
//!
//! Each displayed image slot owns one `PhotoCascade`. The strategy order is
//! fixed: identity-photo service, dynamic rendition, raw asset, legacy
//! preview handler, then the initials placeholder. A load failure advances
//! exactly one strategy; exhaustion is terminal.

use url::Url;

use crate::record::ProfileRecord;

/// Target display geometry for requested renditions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenditionProfile {
    pub css_px: u32,
    pub dpr_cap: f32,
}

/// Grid avatar slot.
pub const AVATAR: RenditionProfile = RenditionProfile {
    css_px: 96,
    dpr_cap: 2.0,
};

/// Detail-overlay portrait slot. Substantially larger than the avatar so it
/// stays sharp when enlarged.
pub const PORTRAIT: RenditionProfile = RenditionProfile {
    css_px: 600,
    dpr_cap: 2.0,
};

impl RenditionProfile {
    /// 1x and density-scaled pixel sizes. The reported device pixel ratio
    /// is clamped to [1, dpr_cap] so high-density surfaces get a larger
    /// rendition without inflating low-density payloads.
    pub fn pixel_sizes(&self, dpr: f32) -> (u32, u32) {
        let dpr = dpr.clamp(1.0, self.dpr_cap);
        let scaled = (self.css_px as f32 * dpr).ceil() as u32;
        (self.css_px, scaled.max(self.css_px))
    }

    fn identity_size(&self) -> PhotoSize {
        if self.css_px <= 128 {
            PhotoSize::Medium
        } else {
            PhotoSize::Large
        }
    }
}

/// Size tier understood by the identity-photo endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhotoSize {
    Small,
    Medium,
    Large,
}

impl PhotoSize {
    pub fn tier(self) -> &'static str {
        match self {
            PhotoSize::Small => "S",
            PhotoSize::Medium => "M",
            PhotoSize::Large => "L",
        }
    }
}

/// Identity-photo endpoint URL. The endpoint degrades to a generic
/// silhouette server-side rather than erroring, so it is tried first.
pub fn identity_photo_url(site_url: &str, account: &str, size: PhotoSize) -> String {
    let handler = format!(
        "{}/_layouts/15/userphoto.aspx",
        site_url.trim_end_matches('/')
    );
    match Url::parse(&handler) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("size", size.tier())
                .append_pair("accountname", account);
            url.to_string()
        }
        Err(_) => format!("{handler}?size={}&accountname={account}", size.tier()),
    }
}

/// Whether an asset URL accepts resize query parameters. Identity-photo
/// payload endpoints ignore them.
pub fn supports_rendition(raw_url: &str) -> bool {
    !raw_url.to_ascii_lowercase().contains("/photo/$value")
}

/// On-the-fly rendition of a raw asset at the given pixel size.
pub fn rendition_url(raw_url: &str, width: u32, height: u32) -> Option<String> {
    if !supports_rendition(raw_url) {
        return None;
    }
    match Url::parse(raw_url) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("width", &width.to_string())
                .append_pair("height", &height.to_string())
                .append_pair("mode", "crop");
            Some(url.to_string())
        }
        Err(_) => {
            let sep = if raw_url.contains('?') { '&' } else { '?' };
            Some(format!(
                "{raw_url}{sep}width={width}&height={height}&mode=crop"
            ))
        }
    }
}

/// Legacy preview-generation endpoint, the last network-based attempt.
pub fn preview_url(origin: &str, raw_url: &str, width: u32, height: u32) -> String {
    let handler = format!(
        "{}/_layouts/15/getpreview.ashx",
        origin.trim_end_matches('/')
    );
    match Url::parse(&handler) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("path", raw_url)
                .append_pair("width", &width.to_string())
                .append_pair("height", &height.to_string())
                .append_pair("mode", "crop");
            url.to_string()
        }
        Err(_) => format!("{handler}?width={width}&height={height}&mode=crop"),
    }
}

/// Deterministic placeholder glyph: first letters of up to two name parts.
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .take(2)
        .filter_map(|part| part.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

/// One attempt in the cascade. `url_2x` is the higher-density variant for
/// surfaces whose layer runs above 1x.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub url_2x: Option<String>,
}

/// Everything the cascade needs to build its candidate list.
#[derive(Debug, Clone)]
pub struct CascadeContext {
    pub origin: String,
    pub site_url: String,
    pub profile: RenditionProfile,
    pub dpr: f32,
}

/// Per-slot resolution state machine.
#[derive(Debug, Clone)]
pub struct PhotoCascade {
    record_id: i64,
    asset_url: Option<String>,
    candidates: Vec<Candidate>,
    strategy_index: usize,
}

impl PhotoCascade {
    pub fn new(record: &ProfileRecord, ctx: &CascadeContext) -> Self {
        let (px1, px2) = ctx.profile.pixel_sizes(ctx.dpr);
        let mut candidates = Vec::new();

        if let Some(account) = record.identity_key.as_deref() {
            candidates.push(Candidate {
                url: identity_photo_url(&ctx.site_url, account, ctx.profile.identity_size()),
                url_2x: None,
            });
        }

        if let Some(raw) = record.photo_url.as_deref() {
            if let Some(url) = rendition_url(raw, px1, px1) {
                let url_2x = if px2 > px1 {
                    rendition_url(raw, px2, px2)
                } else {
                    None
                };
                candidates.push(Candidate { url, url_2x });
            }
            candidates.push(Candidate {
                url: raw.to_string(),
                url_2x: None,
            });
            candidates.push(Candidate {
                url: preview_url(&ctx.origin, raw, px2, px2),
                url_2x: None,
            });
        }

        Self {
            record_id: record.id,
            asset_url: record.photo_url.clone(),
            candidates,
            strategy_index: 0,
        }
    }

    /// Current candidate, or `None` once every strategy is exhausted.
    pub fn candidate(&self) -> Option<&Candidate> {
        self.candidates.get(self.strategy_index)
    }

    /// Advance exactly one strategy after a load failure. No-op once
    /// exhausted.
    pub fn advance(&mut self) {
        if self.strategy_index < self.candidates.len() {
            self.strategy_index += 1;
        }
    }

    pub fn exhausted(&self) -> bool {
        self.strategy_index >= self.candidates.len()
    }

    pub fn strategy_index(&self) -> usize {
        self.strategy_index
    }

    pub fn record_id(&self) -> i64 {
        self.record_id
    }

    /// True while this state still belongs to the given record. A change in
    /// record identity or asset reference means the owner must build a
    /// fresh cascade; matching on the URL alone would let state bleed
    /// between different people sharing one image.
    pub fn owns(&self, record: &ProfileRecord) -> bool {
        self.record_id == record.id && self.asset_url.as_deref() == record.photo_url.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, identity: Option<&str>, photo: Option<&str>) -> ProfileRecord {
        ProfileRecord {
            id,
            name: "Ann Lee".to_string(),
            role: String::new(),
            hire_date: None,
            birthday: None,
            company_url: None,
            linked_in_url: None,
            photo_url: photo.map(str::to_string),
            identity_key: identity.map(str::to_string),
            details_html: None,
        }
    }

    fn ctx(profile: RenditionProfile, dpr: f32) -> CascadeContext {
        CascadeContext {
            origin: "https://contoso.example.com".to_string(),
            site_url: "https://contoso.example.com/sites/team".to_string(),
            profile,
            dpr,
        }
    }

    #[test]
    fn pixel_sizes_scale_with_capped_dpr() {
        assert_eq!(AVATAR.pixel_sizes(1.0), (96, 96));
        assert_eq!(AVATAR.pixel_sizes(1.5), (96, 144));
        assert_eq!(AVATAR.pixel_sizes(3.0), (96, 192), "cap at 2x");
        assert_eq!(AVATAR.pixel_sizes(0.5), (96, 96), "sub-1 treated as 1");
    }

    #[test]
    fn size_tiers_map_to_endpoint_letters() {
        assert_eq!(PhotoSize::Small.tier(), "S");
        assert_eq!(PhotoSize::Medium.tier(), "M");
        assert_eq!(PhotoSize::Large.tier(), "L");
    }

    #[test]
    fn identity_url_encodes_account() {
        let url = identity_photo_url(
            "https://contoso.example.com/sites/team/",
            "ann@example.com",
            PhotoSize::Large,
        );
        assert!(url.starts_with("https://contoso.example.com/sites/team/_layouts/15/userphoto.aspx?"));
        assert!(url.contains("size=L"));
        assert!(url.contains("accountname=ann%40example.com"));
    }

    #[test]
    fn rendition_appends_resize_parameters() {
        let url = rendition_url("https://x.example.com/a.jpg", 96, 96).unwrap();
        assert!(url.contains("width=96") && url.contains("height=96") && url.contains("mode=crop"));

        // Existing query strings are extended, not clobbered.
        let url = rendition_url("https://x.example.com/a.jpg?v=2", 96, 96).unwrap();
        assert!(url.contains("v=2") && url.contains("width=96"));
    }

    #[test]
    fn resize_hostile_endpoints_get_no_rendition() {
        assert_eq!(rendition_url("https://g.example.com/users/x/photo/$value", 96, 96), None);
    }

    #[test]
    fn preview_percent_encodes_the_path() {
        let url = preview_url(
            "https://contoso.example.com",
            "https://contoso.example.com/lib/a b.jpg",
            192,
            192,
        );
        assert!(url.starts_with("https://contoso.example.com/_layouts/15/getpreview.ashx?"));
        assert!(url.contains("path=https%3A%2F%2Fcontoso.example.com%2Flib%2Fa+b.jpg")
            || url.contains("path=https%3A%2F%2Fcontoso.example.com%2Flib%2Fa%20b.jpg"));
    }

    #[test]
    fn initials_take_two_parts() {
        assert_eq!(initials("Ann Lee"), "AL");
        assert_eq!(initials("ann lee smith"), "AL");
        assert_eq!(initials("Plato"), "P");
        assert_eq!(initials("  "), "");
    }

    #[test]
    fn cascade_order_is_identity_rendition_raw_preview() {
        let record = record(1, Some("ann@example.com"), Some("https://x.example.com/a.jpg"));
        let cascade = PhotoCascade::new(&record, &ctx(AVATAR, 1.0));

        let first = cascade.candidate().unwrap();
        assert!(first.url.contains("userphoto.aspx"));

        let mut cascade = cascade;
        cascade.advance();
        assert!(cascade.candidate().unwrap().url.contains("mode=crop"));
        cascade.advance();
        assert_eq!(cascade.candidate().unwrap().url, "https://x.example.com/a.jpg");
        cascade.advance();
        assert!(cascade.candidate().unwrap().url.contains("getpreview.ashx"));
        cascade.advance();
        assert!(cascade.exhausted());
        assert!(cascade.candidate().is_none());
    }

    #[test]
    fn one_failure_advances_one_strategy() {
        let record = record(1, Some("ann@example.com"), Some("https://x.example.com/a.jpg"));
        let mut cascade = PhotoCascade::new(&record, &ctx(AVATAR, 1.0));
        assert_eq!(cascade.strategy_index(), 0);
        cascade.advance();
        assert_eq!(cascade.strategy_index(), 1);
        assert!(
            cascade.candidate().unwrap().url.contains("width=96"),
            "identity failure falls to the dynamic rendition, not the placeholder"
        );
    }

    #[test]
    fn exhausted_cascade_ignores_further_failures() {
        let record = record(1, None, None);
        let mut cascade = PhotoCascade::new(&record, &ctx(AVATAR, 1.0));
        assert!(cascade.candidate().is_none());
        cascade.advance();
        cascade.advance();
        assert!(cascade.candidate().is_none());
        assert!(cascade.exhausted());
    }

    #[test]
    fn inapplicable_strategies_are_skipped() {
        // No identity key: the first candidate is already the rendition.
        let rec = record(1, None, Some("https://x.example.com/a.jpg"));
        let cascade = PhotoCascade::new(&rec, &ctx(AVATAR, 1.0));
        assert!(cascade.candidate().unwrap().url.contains("mode=crop"));

        // Resize-hostile asset: rendition drops out, raw asset is next after identity.
        let rec = record(1, Some("ann@example.com"), Some("https://g.example.com/photo/$value"));
        let mut cascade = PhotoCascade::new(&rec, &ctx(AVATAR, 1.0));
        cascade.advance();
        assert_eq!(cascade.candidate().unwrap().url, "https://g.example.com/photo/$value");
    }

    #[test]
    fn rendition_candidate_carries_a_2x_variant() {
        let record = record(1, None, Some("https://x.example.com/a.jpg"));
        let cascade = PhotoCascade::new(&record, &ctx(AVATAR, 2.0));
        let candidate = cascade.candidate().unwrap();
        assert!(candidate.url.contains("width=96"));
        assert!(candidate.url_2x.as_deref().unwrap().contains("width=192"));

        // At 1x density there is nothing extra to offer.
        let cascade = PhotoCascade::new(&record, &ctx(AVATAR, 1.0));
        assert_eq!(cascade.candidate().unwrap().url_2x, None);
    }

    #[test]
    fn portrait_requests_a_much_larger_rendition() {
        let record = record(1, None, Some("https://x.example.com/a.jpg"));
        let cascade = PhotoCascade::new(&record, &ctx(PORTRAIT, 1.0));
        assert!(cascade.candidate().unwrap().url.contains("width=600"));
    }

    #[test]
    fn ownership_tracks_record_identity_not_just_url() {
        let ann = record(1, None, Some("https://x.example.com/shared.jpg"));
        let bo = record(2, None, Some("https://x.example.com/shared.jpg"));
        let cascade = PhotoCascade::new(&ann, &ctx(AVATAR, 1.0));
        assert!(cascade.owns(&ann));
        assert!(!cascade.owns(&bo), "same URL, different person: state must reset");

        let mut ann_new_photo = ann.clone();
        ann_new_photo.photo_url = Some("https://x.example.com/new.jpg".to_string());
        assert!(!cascade.owns(&ann_new_photo));
    }
}
