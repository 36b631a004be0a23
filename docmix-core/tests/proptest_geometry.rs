//! Property-based tests for field rectangles

use docmix::{Point, Rectangle};
use proptest::prelude::*;

fn coordinate() -> impl Strategy<Value = f64> {
    prop_oneof![-1e6..1e6f64, Just(0.0), Just(612.0), Just(792.0)]
}

proptest! {
    #[test]
    fn from_corners_is_order_independent(
        x1 in coordinate(),
        y1 in coordinate(),
        x2 in coordinate(),
        y2 in coordinate(),
    ) {
        let a = Rectangle::from_corners(x1, y1, x2, y2);
        let b = Rectangle::from_corners(x2, y2, x1, y1);
        let c = Rectangle::from_corners(x1, y2, x2, y1);
        prop_assert_eq!(a, b);
        prop_assert_eq!(a, c);
    }

    #[test]
    fn normalized_size_is_never_negative(
        x1 in coordinate(),
        y1 in coordinate(),
        x2 in coordinate(),
        y2 in coordinate(),
    ) {
        let rect = Rectangle::from_corners(x1, y1, x2, y2);
        prop_assert!(rect.width() >= 0.0);
        prop_assert!(rect.height() >= 0.0);
        prop_assert_eq!(rect.is_empty(), x1 == x2 || y1 == y2);
    }

    #[test]
    fn ordered_corners_are_kept(
        x in coordinate(),
        y in coordinate(),
        w in 0.1..1e4f64,
        h in 0.1..1e4f64,
    ) {
        let rect = Rectangle::from_corners(x, y, x + w, y + h);
        prop_assert_eq!(rect, Rectangle::new(Point::new(x, y), Point::new(x + w, y + h)));
    }
}
