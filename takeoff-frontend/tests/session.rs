use std::path::PathBuf;

use takeoff_core::coords::RenderSize;
use takeoff_core::geometry::Point2;
use takeoff_core::takeoff::{ItemGeometry, TakeoffItem};
use takeoff_engine::tools::{NullHost, PointerEvent};
use takeoff_engine::viewer::ViewerOptions;
use takeoff_frontend::errors::RenderError;
use takeoff_frontend::loader::demo_items;
use takeoff_frontend::overlay_raster::rasterize_overlay;
use takeoff_frontend::session::ViewerSession;
use takeoff_io::{ImagePageSource, JsonMarkupFile, MarkupLoader, SyntheticSheetSource};

fn sheet_session() -> ViewerSession {
    let source = SyntheticSheetSource::with_size("plan-a", 3, 1000, 800);
    let mut session =
        ViewerSession::new(Box::new(source), ViewerOptions::default()).without_labels();
    session.set_takeoff_items(demo_items());
    session
}

fn alpha_at(session: &ViewerSession, x: u32, y: u32) -> u8 {
    let overlay = session.overlay().expect("overlay");
    overlay.pixel(x, y).expect("pixel in range").alpha()
}

#[test]
fn marker_is_painted_at_its_render_space_position() {
    let mut session = sheet_session();
    assert!(session.run_command("goto_page 2").success);
    assert!(session.pump().unwrap());

    let surface = session.surface().expect("surface");
    assert_eq!(surface.page_number, 2);
    assert_eq!(surface.size(), RenderSize::new(1000.0, 800.0));
    assert!(alpha_at(&session, 500, 400) > 0);
    assert_eq!(alpha_at(&session, 300, 600), 0);

    let flattened = session.composite().unwrap();
    let pixel = flattened.get_pixel(500, 400).0;
    assert!(pixel[1] > pixel[0] && pixel[1] > pixel[2], "door marker should be green: {pixel:?}");
}

#[test]
fn redrawing_the_same_state_is_pixel_identical() {
    let mut session = sheet_session();
    session.run_command("goto_page 2");
    session.pump().unwrap();
    let first = session.overlay().expect("overlay").data().to_vec();
    let first_flat = session.composite().unwrap();

    // 两次切换后状态不变，但覆盖层被标记为需要重建
    session.run_command("toggle_markups");
    session.run_command("toggle_markups");
    assert!(session.viewer().is_overlay_dirty());
    assert!(session.pump().unwrap());
    assert_eq!(session.overlay().expect("overlay").data(), first.as_slice());
    assert_eq!(session.composite().unwrap(), first_flat);

    let frame = session.viewer().overlay_frame().expect("frame");
    let again = rasterize_overlay(&frame, None).unwrap();
    let once_more = rasterize_overlay(&frame, None).unwrap();
    assert_eq!(again.data(), once_more.data());
    assert_eq!(again.data(), first.as_slice());
}

#[test]
fn rotation_swaps_surface_axes_and_moves_overlay() {
    let mut session = sheet_session();
    session.run_command("goto_page 2");
    session.run_command("rotate_cw");
    session.pump().unwrap();

    let surface = session.surface().expect("surface");
    assert_eq!((surface.width(), surface.height()), (800, 1000));
    let overlay = session.overlay().expect("overlay");
    assert_eq!((overlay.width(), overlay.height()), (800, 1000));
    assert!(alpha_at(&session, 400, 500) > 0);
}

#[test]
fn hidden_group_disappears_from_overlay() {
    let mut session = sheet_session();
    session.run_command("goto_page 2");
    session.pump().unwrap();
    assert!(alpha_at(&session, 500, 400) > 0);

    assert!(session.run_command("toggle_group door").success);
    assert!(session.pump().unwrap());
    assert_eq!(alpha_at(&session, 500, 400), 0);
}

#[test]
fn item_without_geometry_is_not_drawn() {
    let source = SyntheticSheetSource::with_size("plan-a", 1, 400, 400);
    let mut session =
        ViewerSession::new(Box::new(source), ViewerOptions::default()).without_labels();
    session.set_takeoff_items(vec![
        TakeoffItem::new("c-1", "ceiling", None, 80.0, "SF", 1).with_geometry(None),
    ]);
    session.pump().unwrap();

    let overlay = session.overlay().expect("overlay");
    assert!(overlay.pixels().iter().all(|pixel| pixel.alpha() == 0));
    assert_eq!(session.viewer().page_summary().undrawable_count, 1);
}

#[test]
fn decode_failure_leaves_page_without_overlay() {
    let missing = PathBuf::from("/nonexistent/takeoff/page-1.png");
    let source = ImagePageSource::new("broken", vec![missing]);
    let mut session =
        ViewerSession::new(Box::new(source), ViewerOptions::default()).without_labels();
    session.set_takeoff_items(vec![
        TakeoffItem::new("d-1", "door", None, 1.0, "EA", 1).with_geometry(Some(
            ItemGeometry::PointMarker {
                position: Point2::new(500.0, 500.0),
            },
        )),
    ]);

    let err = session.pump().unwrap_err();
    assert!(matches!(err, RenderError::Decode(_)));
    assert!(session.surface().is_none());
    assert!(session.overlay().is_none());
    assert!(session.composite().is_err());
}

#[test]
fn drawn_rectangle_survives_save_and_reload() {
    let mut session = sheet_session();
    session.pump().unwrap();
    session.run_command("select_tool rectangle");
    let mut host = NullHost;
    session.pointer(PointerEvent::Down(Point2::new(100.0, 100.0)), &mut host);
    session.pointer(PointerEvent::Move(Point2::new(300.0, 200.0)), &mut host);
    session.pointer(PointerEvent::Up(Point2::new(300.0, 200.0)), &mut host);
    session.pump().unwrap();
    assert_eq!(session.viewer().markups().len(), 1);
    assert!(alpha_at(&session, 200, 100) > 0);

    let dir = tempfile::tempdir().unwrap();
    let file = JsonMarkupFile::new(dir.path().join("markups.json"));
    assert_eq!(session.save_markups(&file).unwrap(), 1);

    let mut restored = sheet_session();
    let count = restored.import_markups(file.load("plan-a").unwrap());
    assert_eq!(count, 1);
    restored.pump().unwrap();
    assert_eq!(restored.viewer().markups(), session.viewer().markups());
    assert!(alpha_at(&restored, 200, 100) > 0);
}

#[test]
fn hidden_markups_are_not_painted() {
    let mut session = sheet_session();
    session.run_command("goto_page 3");
    session.pump().unwrap();
    session.run_command("select_tool line");
    let mut host = NullHost;
    session.pointer(PointerEvent::Down(Point2::new(100.0, 300.0)), &mut host);
    session.pointer(PointerEvent::Move(Point2::new(400.0, 300.0)), &mut host);
    session.pointer(PointerEvent::Up(Point2::new(400.0, 300.0)), &mut host);
    session.pump().unwrap();
    assert!(alpha_at(&session, 250, 300) > 0);

    session.run_command("toggle_markups");
    session.pump().unwrap();
    assert_eq!(alpha_at(&session, 250, 300), 0);
}
