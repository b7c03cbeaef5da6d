use communitree_core::placement::EditingOrnament;
use communitree_core::Manipulation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub(crate) const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    /// Which way the box grows when the pointer moves right/down.
    fn growth(self) -> (f64, f64) {
        match self {
            Corner::TopLeft => (-1.0, -1.0),
            Corner::TopRight => (1.0, -1.0),
            Corner::BottomLeft => (-1.0, 1.0),
            Corner::BottomRight => (1.0, 1.0),
        }
    }

    pub(crate) fn class(self) -> &'static str {
        match self {
            Corner::TopLeft => "handle handle-nw",
            Corner::TopRight => "handle handle-ne",
            Corner::BottomLeft => "handle handle-sw",
            Corner::BottomRight => "handle handle-se",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Handle {
    Body,
    Resize(Corner),
    Rotate,
}

/// One pointer gesture on the editing node, from pointerdown to pointerup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Gesture {
    handle: Handle,
    origin: (f64, f64),
    last: (f64, f64),
    start_size: (f64, f64),
    center: (f64, f64),
}

impl Gesture {
    /// `center` is the node's on-screen center, used as the rotation pivot.
    pub(crate) fn begin(
        handle: Handle,
        pointer: (f64, f64),
        node: &EditingOrnament,
        center: (f64, f64),
    ) -> Self {
        Self {
            handle,
            origin: pointer,
            last: pointer,
            start_size: (node.width, node.height),
            center,
        }
    }

    pub(crate) fn update(&mut self, pointer: (f64, f64)) -> Option<Manipulation> {
        let manipulation = match self.handle {
            Handle::Body => {
                let dx = pointer.0 - self.last.0;
                let dy = pointer.1 - self.last.1;
                (dx != 0.0 || dy != 0.0).then_some(Manipulation::Drag { dx, dy })
            }
            Handle::Resize(corner) => {
                let (grow_x, grow_y) = corner.growth();
                Some(Manipulation::Resize {
                    width: self.start_size.0 + grow_x * (pointer.0 - self.origin.0),
                    height: self.start_size.1 + grow_y * (pointer.1 - self.origin.1),
                })
            }
            Handle::Rotate => {
                let delta_deg =
                    wrap_deg(angle_deg(self.center, pointer) - angle_deg(self.center, self.last));
                (delta_deg != 0.0).then_some(Manipulation::Rotate { delta_deg })
            }
        };
        self.last = pointer;
        manipulation
    }
}

fn angle_deg(center: (f64, f64), point: (f64, f64)) -> f64 {
    (point.1 - center.1).atan2(point.0 - center.0).to_degrees()
}

/// Into `(-180, 180]` so crossing the atan2 seam is a small step.
fn wrap_deg(deg: f64) -> f64 {
    let mut value = deg % 360.0;
    if value > 180.0 {
        value -= 360.0;
    } else if value <= -180.0 {
        value += 360.0;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use communitree_core::placement::{EditingOrigin, Transform};

    fn node() -> EditingOrnament {
        EditingOrnament {
            src: "data:image/png;base64,AA".into(),
            left: 0.0,
            top: 0.0,
            width: 120.0,
            height: 120.0,
            transform: Transform::default(),
            base_transform: String::new(),
            controls_attached: true,
            fixed: false,
            origin: EditingOrigin::Local,
        }
    }

    #[test]
    fn body_drag_reports_incremental_steps() {
        let mut gesture = Gesture::begin(Handle::Body, (10.0, 10.0), &node(), (0.0, 0.0));
        assert_eq!(
            gesture.update((15.0, 8.0)),
            Some(Manipulation::Drag { dx: 5.0, dy: -2.0 })
        );
        assert_eq!(
            gesture.update((16.0, 8.0)),
            Some(Manipulation::Drag { dx: 1.0, dy: 0.0 })
        );
        assert_eq!(gesture.update((16.0, 8.0)), None);
    }

    #[test]
    fn resize_grows_away_from_the_dragged_corner() {
        let mut se = Gesture::begin(
            Handle::Resize(Corner::BottomRight),
            (120.0, 120.0),
            &node(),
            (60.0, 60.0),
        );
        assert_eq!(
            se.update((150.0, 130.0)),
            Some(Manipulation::Resize {
                width: 150.0,
                height: 130.0
            })
        );
        let mut nw = Gesture::begin(
            Handle::Resize(Corner::TopLeft),
            (0.0, 0.0),
            &node(),
            (60.0, 60.0),
        );
        assert_eq!(
            nw.update((-30.0, -10.0)),
            Some(Manipulation::Resize {
                width: 150.0,
                height: 130.0
            })
        );
    }

    #[test]
    fn rotate_follows_pointer_around_center() {
        let mut gesture = Gesture::begin(Handle::Rotate, (10.0, 0.0), &node(), (0.0, 0.0));
        let Some(Manipulation::Rotate { delta_deg }) = gesture.update((0.0, 10.0)) else {
            panic!("expected rotation");
        };
        assert!((delta_deg - 90.0).abs() < 1e-9);
    }

    #[test]
    fn rotation_across_seam_is_short() {
        assert!((wrap_deg(-340.0) - 20.0).abs() < 1e-9);
        assert!((wrap_deg(350.0) + 10.0).abs() < 1e-9);
        assert_eq!(wrap_deg(180.0), 180.0);
    }
}
