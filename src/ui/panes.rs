/// Panel identifiers for the roster layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Panel {
    /// Panel 1: search boxes (name, role)
    Search,
    /// Panel 2: card list
    Cards,
    /// Panel 3: photo of the highlighted card
    Image,
}

impl Panel {
    pub fn title(self) -> &'static str {
        match self {
            Panel::Search => "SEARCH",
            Panel::Cards => "CARDS",
            Panel::Image => "PHOTO",
        }
    }
}
