use serde_json::json;
use takeoff_core::geometry::Point2;
use takeoff_core::takeoff::ItemGeometry;
use takeoff_io::parse_item_geometry;

fn marker(x: f64, y: f64) -> Option<ItemGeometry> {
    Some(ItemGeometry::PointMarker {
        position: Point2::new(x, y),
    })
}

#[test]
fn point_lists_become_polylines() {
    let expected = Some(ItemGeometry::Polyline {
        points: vec![Point2::new(0.0, 0.0), Point2::new(10.0, 5.0)],
    });
    assert_eq!(parse_item_geometry(&json!([[0, 0], [10, 5]])), expected);
    assert_eq!(
        parse_item_geometry(&json!({ "points": [{ "x": 0, "y": 0 }, { "x": "10", "y": 5 }] })),
        expected
    );
    assert_eq!(
        parse_item_geometry(&json!({ "start": { "x": 0, "y": 0 }, "end": [10, 5] })),
        expected
    );
}

#[test]
fn polyline_needs_two_valid_points() {
    assert_eq!(parse_item_geometry(&json!({ "points": [[1, 1]] })), None);
    assert_eq!(parse_item_geometry(&json!({ "points": [[1, 1], ["a", 2]] })), None);
}

#[test]
fn boxes_flat_or_nested() {
    let expected = Some(ItemGeometry::BoundingBox {
        x: 10.0,
        y: 20.0,
        width: 30.0,
        height: 40.0,
    });
    assert_eq!(
        parse_item_geometry(&json!({ "x": 10, "y": 20, "width": 30, "height": 40 })),
        expected
    );
    assert_eq!(
        parse_item_geometry(&json!({ "bounding_box": { "x": 10, "y": 20, "w": 30, "h": 40 } })),
        expected
    );
    assert_eq!(
        parse_item_geometry(&json!({ "x": 10, "y": 20, "width": 0, "height": 40 })),
        None
    );
}

#[test]
fn single_points_flat_nested_or_encoded() {
    assert_eq!(parse_item_geometry(&json!({ "x": 1, "y": 2 })), marker(1.0, 2.0));
    assert_eq!(parse_item_geometry(&json!({ "center": [3, 4] })), marker(3.0, 4.0));
    assert_eq!(
        parse_item_geometry(&json!("{\"point\": {\"x\": 5, \"y\": 6}}")),
        marker(5.0, 6.0)
    );
}

#[test]
fn unrecognised_payloads_are_dropped() {
    assert_eq!(parse_item_geometry(&json!(null)), None);
    assert_eq!(parse_item_geometry(&json!(42)), None);
    assert_eq!(parse_item_geometry(&json!("not json")), None);
    assert_eq!(parse_item_geometry(&json!({ "radius": 5 })), None);
    // 字符串只展开一层
    assert_eq!(parse_item_geometry(&json!("\"{\\\"x\\\": 1, \\\"y\\\": 2}\"")), None);
}
