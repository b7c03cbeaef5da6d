use crate::ornament::{
    format_px, Fingerprint, Ornament, SaveAction, SaveOrnamentRequest, StorageType,
    DEFAULT_ORNAMENT_SIZE_PX, MAX_ORNAMENTS_PER_USER, ORNAMENT_HALF_EXTENT_PX,
};

pub const MIN_ORNAMENT_SIZE_PX: f64 = 24.0;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlacementError {
    #[error("You already have {max} ornaments. Remove some before adding new ones.")]
    LimitReached { max: usize },
    #[error("no ornament is waiting to be placed")]
    NotPlacing,
    #[error("no ornament is being edited")]
    NotEditing,
    #[error("this ornament is already on the tree")]
    AlreadySaved,
    #[error("only your own ornaments can be edited")]
    NotOwner,
    #[error("another ornament is still being edited")]
    Busy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
    pub width: f64,
    pub height: f64,
}

impl SurfaceSize {
    pub fn contains(&self, point: SurfacePoint) -> bool {
        point.x >= 0.0 && point.x <= self.width && point.y >= 0.0 && point.y <= self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub translate_x: f64,
    pub translate_y: f64,
    pub rotate_deg: f64,
}

impl Transform {
    pub fn is_identity(&self) -> bool {
        self.translate_x == 0.0 && self.translate_y == 0.0 && self.rotate_deg == 0.0
    }

    pub fn to_css(&self) -> String {
        if self.is_identity() {
            return String::new();
        }
        format!(
            "translate({}px, {}px) rotate({}deg)",
            self.translate_x, self.translate_y, self.rotate_deg
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditingOrigin {
    /// Placed in this session and never saved.
    Local,
    /// A fixed ornament picked up by its owner.
    Remote(Fingerprint),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditingOrnament {
    pub src: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub transform: Transform,
    /// Transform text inherited from a persisted ornament.
    pub base_transform: String,
    pub controls_attached: bool,
    pub fixed: bool,
    pub origin: EditingOrigin,
}

impl EditingOrnament {
    fn centered_at(src: String, point: SurfacePoint) -> Self {
        Self {
            src,
            left: point.x - ORNAMENT_HALF_EXTENT_PX,
            top: point.y - ORNAMENT_HALF_EXTENT_PX,
            width: DEFAULT_ORNAMENT_SIZE_PX,
            height: DEFAULT_ORNAMENT_SIZE_PX,
            transform: Transform::default(),
            base_transform: String::new(),
            controls_attached: true,
            fixed: false,
            origin: EditingOrigin::Local,
        }
    }

    fn from_fixed(ornament: &Ornament) -> Self {
        Self {
            src: ornament.src.clone(),
            left: parse_px(&ornament.x).unwrap_or(0.0),
            top: parse_px(&ornament.y).unwrap_or(0.0),
            width: parse_px(&ornament.width).unwrap_or(DEFAULT_ORNAMENT_SIZE_PX),
            height: parse_px(&ornament.height).unwrap_or(DEFAULT_ORNAMENT_SIZE_PX),
            transform: Transform::default(),
            base_transform: ornament.transform.clone(),
            controls_attached: true,
            fixed: false,
            origin: EditingOrigin::Remote(ornament.fingerprint()),
        }
    }

    pub fn remote_fingerprint(&self) -> Option<&Fingerprint> {
        match &self.origin {
            EditingOrigin::Remote(fingerprint) => Some(fingerprint),
            EditingOrigin::Local => None,
        }
    }

    pub fn can_save(&self) -> bool {
        matches!(self.origin, EditingOrigin::Local)
    }

    /// Transform applied to both the node and its controls overlay.
    pub fn css_transform(&self) -> String {
        let local = self.transform.to_css();
        match (self.base_transform.trim().is_empty(), local.is_empty()) {
            (true, _) => local,
            (false, true) => self.base_transform.clone(),
            (false, false) => format!("{} {}", self.base_transform.trim(), local),
        }
    }

    fn apply(&mut self, manipulation: Manipulation) {
        match manipulation {
            Manipulation::Drag { dx, dy } => {
                self.transform.translate_x += dx;
                self.transform.translate_y += dy;
            }
            Manipulation::Resize { width, height } => {
                let (next_width, next_height) =
                    keep_ratio(self.width, self.height, width, height);
                self.width = next_width;
                self.height = next_height;
            }
            Manipulation::Rotate { delta_deg } => {
                self.transform.rotate_deg = normalize_deg(self.transform.rotate_deg + delta_deg);
            }
        }
    }

    fn detach_for_save(&mut self) {
        self.controls_attached = false;
        self.fixed = true;
    }

    fn restore_editing(&mut self) {
        self.controls_attached = true;
        self.fixed = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Manipulation {
    Drag { dx: f64, dy: f64 },
    Resize { width: f64, height: f64 },
    Rotate { delta_deg: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    Remote(Fingerprint),
    LocalOnly,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlacementPhase {
    #[default]
    Idle,
    Placing {
        src: String,
    },
    Editing(EditingOrnament),
    Saving(EditingOrnament),
    Deleting(EditingOrnament),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Idle,
    Placing,
    Editing,
    Saving,
    Deleting,
}

/// Lifecycle of the single editing ornament.
#[derive(Debug, Clone, Default)]
pub struct PlacementController {
    phase: PlacementPhase,
}

impl PlacementController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> &PlacementPhase {
        &self.phase
    }

    pub fn kind(&self) -> PhaseKind {
        match self.phase {
            PlacementPhase::Idle => PhaseKind::Idle,
            PlacementPhase::Placing { .. } => PhaseKind::Placing,
            PlacementPhase::Editing(_) => PhaseKind::Editing,
            PlacementPhase::Saving(_) => PhaseKind::Saving,
            PlacementPhase::Deleting(_) => PhaseKind::Deleting,
        }
    }

    /// The node currently on the surface, whatever its stage.
    pub fn node(&self) -> Option<&EditingOrnament> {
        match &self.phase {
            PlacementPhase::Editing(node)
            | PlacementPhase::Saving(node)
            | PlacementPhase::Deleting(node) => Some(node),
            PlacementPhase::Idle | PlacementPhase::Placing { .. } => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(
            self.phase,
            PlacementPhase::Saving(_) | PlacementPhase::Deleting(_)
        )
    }

    pub fn begin_placing(&mut self, src: String, live_count: usize) -> Result<(), PlacementError> {
        if live_count >= MAX_ORNAMENTS_PER_USER {
            return Err(PlacementError::LimitReached {
                max: MAX_ORNAMENTS_PER_USER,
            });
        }
        if self.is_in_flight() {
            return Err(PlacementError::Busy);
        }
        self.phase = PlacementPhase::Placing { src };
        Ok(())
    }

    /// Returns `Ok(false)` when the click landed outside the surface.
    pub fn place_at(
        &mut self,
        point: SurfacePoint,
        surface: SurfaceSize,
    ) -> Result<bool, PlacementError> {
        let PlacementPhase::Placing { src } = &self.phase else {
            return Err(PlacementError::NotPlacing);
        };
        if !surface.contains(point) {
            return Ok(false);
        }
        let node = EditingOrnament::centered_at(src.clone(), point);
        self.phase = PlacementPhase::Editing(node);
        Ok(true)
    }

    pub fn edit_existing(&mut self, ornament: &Ornament, user_id: &str) -> Result<(), PlacementError> {
        if !ornament.belongs_to(user_id) {
            return Err(PlacementError::NotOwner);
        }
        if self.is_in_flight() {
            return Err(PlacementError::Busy);
        }
        self.phase = PlacementPhase::Editing(EditingOrnament::from_fixed(ornament));
        Ok(())
    }

    pub fn manipulate(&mut self, manipulation: Manipulation) -> Result<(), PlacementError> {
        let PlacementPhase::Editing(node) = &mut self.phase else {
            return Err(PlacementError::NotEditing);
        };
        if !node.can_save() {
            return Err(PlacementError::AlreadySaved);
        }
        node.apply(manipulation);
        Ok(())
    }

    pub fn begin_save(&mut self, user_id: &str, now_ms: i64) -> Result<SaveOrnamentRequest, PlacementError> {
        let phase = std::mem::take(&mut self.phase);
        let PlacementPhase::Editing(mut node) = phase else {
            self.phase = phase;
            return Err(PlacementError::NotEditing);
        };
        if !node.can_save() {
            self.phase = PlacementPhase::Editing(node);
            return Err(PlacementError::AlreadySaved);
        }
        node.detach_for_save();
        let request = SaveOrnamentRequest {
            action: SaveAction::SaveOrnament,
            user_id: user_id.to_string(),
            src: node.src.clone(),
            x: format_px(node.left),
            y: format_px(node.top),
            width: format_px(node.width),
            height: format_px(node.height),
            transform: node.css_transform(),
            timestamp: now_ms,
            storage_type: StorageType::Base64,
        };
        self.phase = PlacementPhase::Saving(node);
        Ok(request)
    }

    pub fn save_succeeded(&mut self) {
        if matches!(self.phase, PlacementPhase::Saving(_)) {
            self.phase = PlacementPhase::Idle;
        }
    }

    pub fn save_failed(&mut self) {
        let phase = std::mem::take(&mut self.phase);
        self.phase = match phase {
            PlacementPhase::Saving(mut node) => {
                node.restore_editing();
                PlacementPhase::Editing(node)
            }
            other => other,
        };
    }

    pub fn begin_delete(&mut self) -> Result<DeleteTarget, PlacementError> {
        let phase = std::mem::take(&mut self.phase);
        let PlacementPhase::Editing(node) = phase else {
            self.phase = phase;
            return Err(PlacementError::NotEditing);
        };
        let target = match node.remote_fingerprint() {
            Some(fingerprint) => DeleteTarget::Remote(fingerprint.clone()),
            None => DeleteTarget::LocalOnly,
        };
        self.phase = PlacementPhase::Deleting(node);
        Ok(target)
    }

    pub fn delete_finished(&mut self) {
        if matches!(self.phase, PlacementPhase::Deleting(_)) {
            self.phase = PlacementPhase::Idle;
        }
    }

    /// Drops a pending placement or editing node. Requests already in flight
    /// resolve on their own.
    pub fn cancel(&mut self) {
        if !self.is_in_flight() {
            self.phase = PlacementPhase::Idle;
        }
    }
}

pub fn parse_px(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
    number.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn keep_ratio(width: f64, height: f64, next_width: f64, next_height: f64) -> (f64, f64) {
    if width <= 0.0 || height <= 0.0 {
        return (
            next_width.max(MIN_ORNAMENT_SIZE_PX),
            next_height.max(MIN_ORNAMENT_SIZE_PX),
        );
    }
    let ratio = height / width;
    let width_change = (next_width / width - 1.0).abs();
    let height_change = (next_height / height - 1.0).abs();
    let mut out_width = if height_change > width_change {
        next_height / ratio
    } else {
        next_width
    };
    let min_width = if ratio >= 1.0 {
        MIN_ORNAMENT_SIZE_PX
    } else {
        MIN_ORNAMENT_SIZE_PX / ratio
    };
    out_width = out_width.max(min_width);
    (out_width, out_width * ratio)
}

fn normalize_deg(deg: f64) -> f64 {
    let mut value = deg % 360.0;
    if value < 0.0 {
        value += 360.0;
    }
    value
}
