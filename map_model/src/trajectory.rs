use geom::{Angle, Distance, Pt2D};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two lane headings that can't be joined by a curve, because they point
/// along the same line. Only possible at construction time.
#[derive(Debug)]
pub struct DegenerateConnector {
    pub start: Pt2D,
    pub end: Pt2D,
}

impl fmt::Display for DegenerateConnector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "can't connect {} to {}: headings are parallel",
            self.start, self.end
        )
    }
}

impl std::error::Error for DegenerateConnector {}

/// A quadratic Bézier curve parametrized by proportional progress in [0, 1].
/// Lanes delegate all of their geometry here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    start: Pt2D,
    control: Pt2D,
    end: Pt2D,
    length: Distance,
}

impl Trajectory {
    pub fn new(start: Pt2D, control: Pt2D, end: Pt2D) -> Trajectory {
        let mut t = Trajectory {
            start,
            control,
            end,
            length: Distance::ZERO,
        };
        t.length = t.find_length();
        t
    }

    /// Builds the curve joining an incoming road lane to an outgoing one,
    /// with the control point at the intersection of the two boundary
    /// headings.
    pub fn connector(
        start: Pt2D,
        start_heading: Angle,
        end: Pt2D,
        end_heading: Angle,
    ) -> Result<Trajectory, DegenerateConnector> {
        if start_heading.parallel_to(end_heading) {
            let diff = (start_heading.normalized_radians() - end_heading.normalized_radians())
                .rem_euclid(2.0 * std::f64::consts::PI);
            if (diff - std::f64::consts::PI).abs() < 1e-6 {
                // Head-on: no curve joins these.
                return Err(DegenerateConnector { start, end });
            }
            // Straight through: the control point degenerates to the
            // midpoint.
            let control = Pt2D::new((start.x() + end.x()) / 2.0, (start.y() + end.y()) / 2.0);
            return Ok(Trajectory::new(start, control, end));
        }

        let half_pi = std::f64::consts::FRAC_PI_2;
        let start_vert =
            (start_heading.normalized_radians() % std::f64::consts::PI - half_pi).abs() < 1e-9;
        let end_vert =
            (end_heading.normalized_radians() % std::f64::consts::PI - half_pi).abs() < 1e-9;

        // Find where the two heading lines cross. Vertical headings have no
        // slope, so they pin x directly.
        let control = if start_vert {
            Pt2D::new(
                start.x(),
                end_heading.tan() * (start.x() - end.x()) + end.y(),
            )
        } else if end_vert {
            Pt2D::new(
                end.x(),
                start_heading.tan() * (end.x() - start.x()) + start.y(),
            )
        } else {
            let m0 = start_heading.tan();
            let m1 = end_heading.tan();
            let x = ((m0 * start.x() - m1 * end.x()) - (start.y() - end.y())) / (m0 - m1);
            let y = m0 * (x - start.x()) + start.y();
            Pt2D::new(x, y)
        };

        Ok(Trajectory::new(start, control, end))
    }

    pub fn start(&self) -> Pt2D {
        self.start
    }

    pub fn end(&self) -> Pt2D {
        self.end
    }

    pub fn length(&self) -> Distance {
        self.length
    }

    /// The world position at proportional progress `p`.
    pub fn position(&self, p: f64) -> Pt2D {
        Pt2D::new(
            quadratic_bezier(p, self.start.x(), self.control.x(), self.end.x()),
            quadratic_bezier(p, self.start.y(), self.control.y(), self.end.y()),
        )
    }

    /// The heading at proportional progress `p`, from the curve's derivative.
    pub fn heading(&self, p: f64) -> Angle {
        let dx = 2.0 * (1.0 - p) * (self.control.x() - self.start.x())
            + 2.0 * p * (self.end.x() - self.control.x());
        let dy = 2.0 * (1.0 - p) * (self.control.y() - self.start.y())
            + 2.0 * p * (self.end.y() - self.control.y());
        Angle::new_rads(dy.atan2(dx))
    }

    fn find_length(&self) -> Distance {
        // Numeric arc length. The curve is short and this only runs at
        // construction.
        let delta = 0.001;
        let steps = (1.0 / delta) as usize;
        let mut total = Distance::ZERO;
        let mut last = self.position(0.0);
        for i in 1..=steps {
            let next = self.position((i as f64 * delta).min(1.0));
            total += last.dist_to(next);
            last = next;
        }
        total
    }
}

fn quadratic_bezier(p: f64, start: f64, control: f64, end: f64) -> f64 {
    (1.0 - p) * ((1.0 - p) * start + p * control) + p * ((1.0 - p) * control + p * end)
}
