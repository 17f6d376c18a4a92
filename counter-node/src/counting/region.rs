use serde::Serialize;
use trafficount_common::{Point, Region};

/// Result of testing one centroid step against the counting line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Crossing {
    None,
    In,
    Out,
}

/// Classifies the step `previous -> current` against `region`.
///
/// Stateless: the caller decides whether the track may still be counted.
/// A vertical line counts rightward moves as IN, a horizontal line counts
/// downward moves as IN.
pub fn classify(region: &Region, previous: Point, current: Point) -> Crossing {
    if !segments_intersect(region.p1, region.p2, previous, current) {
        return Crossing::None;
    }

    let entering = if region.is_vertical() {
        current.x > previous.x
    } else {
        current.y > previous.y
    };

    if entering {
        Crossing::In
    } else {
        Crossing::Out
    }
}

fn cross(o: Point, a: Point, b: Point) -> i64 {
    let (ox, oy) = (o.x as i64, o.y as i64);
    (a.x as i64 - ox) * (b.y as i64 - oy) - (a.y as i64 - oy) * (b.x as i64 - ox)
}

fn on_segment(p: Point, q: Point, r: Point) -> bool {
    // q is collinear with p-r; check it lies within the bounding box
    q.x >= p.x.min(r.x) && q.x <= p.x.max(r.x) && q.y >= p.y.min(r.y) && q.y <= p.y.max(r.y)
}

/// Closed segment intersection: touching endpoints and collinear overlap count.
pub fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = cross(q1, q2, p1).signum();
    let d2 = cross(q1, q2, p2).signum();
    let d3 = cross(p1, p2, q1).signum();
    let d4 = cross(p1, p2, q2).signum();

    if d1 * d2 < 0 && d3 * d4 < 0 {
        return true;
    }

    (d1 == 0 && on_segment(q1, p1, q2))
        || (d2 == 0 && on_segment(q1, p2, q2))
        || (d3 == 0 && on_segment(p1, q1, p2))
        || (d4 == 0 && on_segment(p1, q2, p2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical() -> Region {
        Region::new(Point::new(320, 0), Point::new(320, 480))
    }

    fn horizontal() -> Region {
        Region::new(Point::new(0, 240), Point::new(640, 240))
    }

    #[test]
    fn rightward_across_vertical_line_is_in() {
        let crossing = classify(&vertical(), Point::new(300, 100), Point::new(340, 100));
        assert_eq!(crossing, Crossing::In);
    }

    #[test]
    fn leftward_across_vertical_line_is_out() {
        let crossing = classify(&vertical(), Point::new(340, 100), Point::new(300, 100));
        assert_eq!(crossing, Crossing::Out);
    }

    #[test]
    fn step_left_of_the_line_does_not_cross() {
        let crossing = classify(&vertical(), Point::new(100, 0), Point::new(200, 0));
        assert_eq!(crossing, Crossing::None);
    }

    #[test]
    fn horizontal_line_uses_vertical_motion() {
        assert_eq!(
            classify(&horizontal(), Point::new(50, 200), Point::new(60, 260)),
            Crossing::In
        );
        assert_eq!(
            classify(&horizontal(), Point::new(50, 260), Point::new(40, 200)),
            Crossing::Out
        );
    }

    #[test]
    fn step_beyond_the_segment_end_does_not_cross() {
        // Crosses x=320 but below the end of the line
        let crossing = classify(&vertical(), Point::new(300, 500), Point::new(340, 500));
        assert_eq!(crossing, Crossing::None);
    }

    #[test]
    fn touching_the_line_counts() {
        let crossing = classify(&vertical(), Point::new(300, 100), Point::new(320, 100));
        assert_eq!(crossing, Crossing::In);
    }

    #[test]
    fn collinear_overlap_intersects() {
        assert!(segments_intersect(
            Point::new(320, 0),
            Point::new(320, 480),
            Point::new(320, 100),
            Point::new(320, 120),
        ));
        assert!(!segments_intersect(
            Point::new(320, 0),
            Point::new(320, 480),
            Point::new(320, 500),
            Point::new(320, 520),
        ));
    }
}
