//! Add-to-cart flight path.
//!
//! After a successful add, a dot flies from the button to the cart icon along
//! a quadratic Bezier arc with cubic ease-in-out timing. The browser reports
//! the two bounding boxes with the add request; the path is planned here and
//! shipped back in the `cart:added` event as sampled frames.

use serde::{Deserialize, Serialize};

/// Diameter of the flying dot, px.
pub const DOT_SIZE: f64 = 20.0;
/// Total flight time, ms.
pub const FLY_DURATION_MS: u32 = 700;
/// Gap between the button's top edge and the dot's start position, px.
pub const START_OFFSET: f64 = 6.0;
/// Arc height bounds, px.
pub const MIN_ARC_HEIGHT: f64 = 60.0;
pub const MAX_ARC_HEIGHT: f64 = 120.0;
/// Frames sampled along the path, including both ends.
pub const FRAME_COUNT: usize = 30;

/// A viewport-relative bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Assemble a rect from optional form fields; `None` if any is missing
    /// or not finite.
    #[must_use]
    pub fn from_parts(
        left: Option<f64>,
        top: Option<f64>,
        width: Option<f64>,
        height: Option<f64>,
    ) -> Option<Self> {
        let rect = Self {
            left: left?,
            top: top?,
            width: width?,
            height: height?,
        };
        [rect.left, rect.top, rect.width, rect.height]
            .iter()
            .all(|v| v.is_finite())
            .then_some(rect)
    }

    #[must_use]
    pub fn is_zero_size(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point {
            x: self.left + self.width / 2.0,
            y: self.top + self.height / 2.0,
        }
    }
}

/// A point in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Top-left corners of the dot along a planned arc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightArc {
    pub start: Point,
    pub control: Point,
    pub end: Point,
    pub duration_ms: u32,
    pub dot_size: f64,
    /// Evenly spaced in time, eased in space.
    pub frames: Vec<Point>,
}

impl FlightArc {
    /// Dot position `elapsed_ms` into the flight, and whether it has landed.
    #[must_use]
    pub fn position_at(&self, elapsed_ms: f64) -> (Point, bool) {
        let t = (elapsed_ms / f64::from(self.duration_ms)).clamp(0.0, 1.0);
        (self.point_at(ease_in_out(t)), t >= 1.0)
    }

    fn point_at(&self, eased: f64) -> Point {
        let inv = 1.0 - eased;
        Point {
            x: inv * inv * self.start.x
                + 2.0 * inv * eased * self.control.x
                + eased * eased * self.end.x,
            y: inv * inv * self.start.y
                + 2.0 * inv * eased * self.control.y
                + eased * eased * self.end.y,
        }
    }
}

/// What the browser should play after an add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FlightPlan {
    /// Animate along the arc, then announce arrival.
    Arc(FlightArc),
    /// Skip the animation and announce arrival straight away.
    Immediate,
}

/// Cubic ease-in-out on `t` in `[0, 1]`.
#[must_use]
pub fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Plan the flight from the add button (`start`) to the cart icon (`anchor`).
///
/// A missing or zero-size box is logged and yields [`FlightPlan::Immediate`].
#[must_use]
pub fn plan_flight(start: Option<Rect>, anchor: Option<Rect>) -> FlightPlan {
    let Some(start) = start else {
        tracing::error!("Flight start element missing; is the add button measured?");
        return FlightPlan::Immediate;
    };
    if start.is_zero_size() {
        tracing::error!(?start, "Flight start element has zero size; the add button may be hidden");
        return FlightPlan::Immediate;
    }
    let Some(anchor) = anchor else {
        tracing::error!("Cart anchor missing; is the cart icon registered?");
        return FlightPlan::Immediate;
    };
    if anchor.is_zero_size() {
        tracing::error!(?anchor, "Cart anchor has zero size; the cart icon may be hidden");
        return FlightPlan::Immediate;
    }

    let half = DOT_SIZE / 2.0;
    let launch = Point {
        x: start.left + start.width / 2.0,
        y: start.top - half - START_OFFSET,
    };
    let target = anchor.center();

    let from = Point {
        x: launch.x - half,
        y: launch.y - half,
    };
    let to = Point {
        x: target.x - half,
        y: target.y - half,
    };
    let arc_height = ((to.x - from.x).abs() * 0.25).clamp(MIN_ARC_HEIGHT, MAX_ARC_HEIGHT);
    let control = Point {
        x: (from.x + to.x) / 2.0,
        y: from.y.min(to.y) - arc_height,
    };

    let mut arc = FlightArc {
        start: from,
        control,
        end: to,
        duration_ms: FLY_DURATION_MS,
        dot_size: DOT_SIZE,
        frames: Vec::with_capacity(FRAME_COUNT),
    };

    #[allow(clippy::cast_precision_loss)] // FRAME_COUNT is tiny
    let last = (FRAME_COUNT - 1) as f64;
    arc.frames = (0..FRAME_COUNT)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64 / last;
            arc.point_at(ease_in_out(t))
        })
        .collect();

    FlightPlan::Arc(arc)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn button() -> Rect {
        Rect {
            left: 100.0,
            top: 500.0,
            width: 200.0,
            height: 40.0,
        }
    }

    fn cart_icon() -> Rect {
        Rect {
            left: 900.0,
            top: 20.0,
            width: 24.0,
            height: 24.0,
        }
    }

    fn arc() -> FlightArc {
        match plan_flight(Some(button()), Some(cart_icon())) {
            FlightPlan::Arc(arc) => arc,
            FlightPlan::Immediate => panic!("expected an arc"),
        }
    }

    #[test]
    fn test_easing_endpoints_and_midpoint() {
        assert!(ease_in_out(0.0).abs() < EPS);
        assert!((ease_in_out(0.5) - 0.5).abs() < EPS);
        assert!((ease_in_out(1.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn test_arc_starts_above_button_and_ends_on_icon() {
        let arc = arc();
        // Centre of the button, dot raised above its top edge.
        assert!((arc.start.x - 190.0).abs() < EPS);
        assert!((arc.start.y - (500.0 - 10.0 - 6.0 - 10.0)).abs() < EPS);
        // Centre of the icon, shifted to the dot's corner.
        assert!((arc.end.x - 902.0).abs() < EPS);
        assert!((arc.end.y - 22.0).abs() < EPS);
    }

    #[test]
    fn test_arc_height_is_clamped() {
        let arc = arc();
        // |dx| * 0.25 = 178, clamped to 120 above the higher endpoint.
        assert!((arc.control.y - (arc.end.y - MAX_ARC_HEIGHT)).abs() < EPS);

        let near = Rect {
            left: 120.0,
            ..button()
        };
        let FlightPlan::Arc(short) = plan_flight(Some(button()), Some(near)) else {
            panic!("expected an arc");
        };
        assert!((short.control.y - (short.start.y.min(short.end.y) - MIN_ARC_HEIGHT)).abs() < EPS);
    }

    #[test]
    fn test_position_lands_at_end() {
        let arc = arc();
        let (start, done) = arc.position_at(0.0);
        assert_eq!(start, arc.start);
        assert!(!done);

        let (end, done) = arc.position_at(f64::from(FLY_DURATION_MS) + 50.0);
        assert!((end.x - arc.end.x).abs() < EPS);
        assert!((end.y - arc.end.y).abs() < EPS);
        assert!(done);
    }

    #[test]
    fn test_frames_cover_whole_path() {
        let arc = arc();
        assert_eq!(arc.frames.len(), FRAME_COUNT);
        assert_eq!(arc.frames.first(), Some(&arc.start));
        let last = arc.frames.last().copied().unwrap_or(arc.start);
        assert!((last.x - arc.end.x).abs() < EPS);
    }

    #[test]
    fn test_missing_or_zero_size_boxes_arrive_immediately() {
        assert_eq!(plan_flight(None, Some(cart_icon())), FlightPlan::Immediate);
        assert_eq!(plan_flight(Some(button()), None), FlightPlan::Immediate);

        let hidden = Rect {
            width: 0.0,
            ..cart_icon()
        };
        assert_eq!(plan_flight(Some(button()), Some(hidden)), FlightPlan::Immediate);
        assert_eq!(plan_flight(Some(hidden), Some(cart_icon())), FlightPlan::Immediate);
    }

    #[test]
    fn test_rect_from_parts_requires_all_finite() {
        assert!(Rect::from_parts(Some(1.0), Some(2.0), Some(3.0), None).is_none());
        assert!(Rect::from_parts(Some(f64::NAN), Some(2.0), Some(3.0), Some(4.0)).is_none());
        assert!(Rect::from_parts(Some(1.0), Some(2.0), Some(3.0), Some(4.0)).is_some());
    }

    #[test]
    fn test_plan_serializes_with_kind_tag() {
        let json = serde_json::to_value(plan_flight(None, None)).unwrap_or_default();
        assert_eq!(json["kind"], "immediate");
    }
}
