pub const SUCCESS_BANNER_MS: u32 = 2_000;
pub const ERROR_BANNER_MS: u32 = 3_000;
pub const HIGHLIGHT_MS: u32 = 1_000;

pub const DEFAULT_INSTRUCTION: &str =
    "Click \"Add Ornament\" and select an image file to add to the community tree";
pub const COMPRESSING_INSTRUCTION: &str = "Compressing image...";
pub const PLACEMENT_INSTRUCTION: &str =
    "Click anywhere on the community tree to place your ornament";
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load ornaments from server";
pub const SAVE_FAILED_MESSAGE: &str = "Failed to save ornament";
pub const DELETE_FAILED_MESSAGE: &str = "Failed to delete ornament";
pub const DELETED_MESSAGE: &str = "Ornament deleted";
pub const REFRESHED_MESSAGE: &str = "✓ Ornaments updated";
pub const NOT_AN_IMAGE_MESSAGE: &str = "Please select an image file";
pub const PROCESS_FAILED_MESSAGE: &str = "Failed to process image. Please try another image.";
pub const CONFIRM_DELETE_MESSAGE: &str = "Delete this ornament?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Success,
    Error,
}

impl BannerKind {
    /// How long the banner stays before the instruction line comes back.
    pub fn duration_ms(self) -> u32 {
        match self {
            BannerKind::Success => SUCCESS_BANNER_MS,
            BannerKind::Error => ERROR_BANNER_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub id: u64,
    pub kind: BannerKind,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PanelState {
    pub open: bool,
    pub compressing: bool,
    pub banner: Option<Banner>,
    pub error: Option<String>,
    next_banner_id: u64,
}

impl PanelState {
    pub fn show_banner(&mut self, kind: BannerKind, text: impl Into<String>) -> Banner {
        self.next_banner_id = self.next_banner_id.wrapping_add(1);
        let banner = Banner {
            id: self.next_banner_id,
            kind,
            text: text.into(),
        };
        self.banner = Some(banner.clone());
        banner
    }

    /// Clears the banner only if it is still the one identified by `id`.
    pub fn clear_banner(&mut self, id: u64) -> bool {
        if self.banner.as_ref().map(|banner| banner.id) == Some(id) {
            self.banner = None;
            return true;
        }
        false
    }
}

pub fn saved_message(count: usize, max: usize) -> String {
    format!("✓ Ornament saved! You have {count}/{max} ornaments")
}

pub fn limit_label(count: usize, max: usize) -> String {
    if count >= max {
        format!("Limit Reached ({max}/{max})")
    } else {
        "Add Ornament".to_string()
    }
}
