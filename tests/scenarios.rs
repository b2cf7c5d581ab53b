mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeBackend, rect_block, region, solid};
use overlay_translator_rust::editor::{EditorEffect, EditorMode, PointerEvent, PointerKind};
use overlay_translator_rust::geometry::distribute_translated_text;
use overlay_translator_rust::{
    FontBook, Orchestrator, PipelineError, ProcessingState, Services, Settings, SettingsHub,
    TargetId, begin_edit_session, run_automatic_pipeline,
};

fn dark(pixel: Option<tiny_skia::PremultipliedColorU8>) -> bool {
    pixel.is_some_and(|p| p.red() < 128 && p.alpha() > 0)
}

#[tokio::test]
async fn single_region_is_translated_and_drawn_inside_its_box() {
    let backend = Arc::new(FakeBackend {
        blocks: vec![rect_block("Hello", 10.0, 10.0, 60.0, 30.0)],
        translation: Some("Xin chào".to_string()),
        ..FakeBackend::default()
    });
    let image = solid(100, 50, [255, 255, 255, 255]);
    let services = Services::shared(backend.clone());
    let output = run_automatic_pipeline(
        &image,
        "vi",
        &services,
        &Settings::default(),
        &FontBook::empty(),
    )
    .await
    .expect("pipeline");

    assert_eq!(output.regions.len(), 1);
    let region = &output.regions[0];
    assert!(!region.text.is_empty());
    assert_eq!(
        (
            region.bounding_box.x0,
            region.bounding_box.y0,
            region.bounding_box.x1,
            region.bounding_box.y1
        ),
        (10.0, 10.0, 60.0, 30.0)
    );
    assert_eq!(
        distribute_translated_text(&region.text, &[5]),
        vec![region.text.clone()]
    );
    let request = &backend.requests.lock().expect("lock")[0];
    assert_eq!(request.target_language, "vi");
    assert_eq!(request.text, "Hello");

    let composite = &output.composited;
    let inside = (10..60).any(|x| (10..30).any(|y| dark(composite.pixel(x, y))));
    assert!(inside, "no text pixels inside the detected box");
    assert_eq!(composite.pixel(95, 45), image.pixel(95, 45));
}

#[tokio::test]
async fn no_detections_leaves_the_image_untouched() {
    let backend = Arc::new(FakeBackend::default());
    let image = solid(64, 48, [12, 34, 56, 255]);
    let output = run_automatic_pipeline(
        &image,
        "vi",
        &Services::shared(backend.clone()),
        &Settings::default(),
        &FontBook::empty(),
    )
    .await
    .expect("pipeline");
    assert!(output.regions.is_empty());
    assert_eq!(output.composited.data(), image.data());
    assert_eq!(backend.translate_calls(), 0);
    assert_eq!(backend.inpaint_calls(), 0);
}

#[tokio::test]
async fn translation_failure_aborts_the_run() {
    let backend = Arc::new(FakeBackend {
        blocks: vec![rect_block("Hello", 10.0, 10.0, 60.0, 30.0)],
        fail_translate: true,
        ..FakeBackend::default()
    });
    let image = solid(100, 50, [255, 255, 255, 255]);
    let err = run_automatic_pipeline(
        &image,
        "vi",
        &Services::shared(backend.clone()),
        &Settings::default(),
        &FontBook::empty(),
    )
    .await
    .expect_err("translation failure");
    assert!(err.is_service_failure());
    assert_eq!(backend.inpaint_calls(), 0);
}

#[tokio::test]
async fn retranslating_under_an_open_editor_keeps_it_exclusive() {
    let backend = Arc::new(FakeBackend {
        blocks: vec![rect_block("Hello", 10.0, 10.0, 60.0, 30.0)],
        ..FakeBackend::default()
    });
    let orchestrator = Orchestrator::new(
        Services::shared(backend.clone()),
        SettingsHub::default(),
        Arc::new(FontBook::empty()),
    );
    let id = TargetId::new("banner");
    let image = solid(100, 50, [255, 255, 255, 255]);

    let mut editor = orchestrator
        .open_editor(&id, image.clone(), None)
        .expect("editor");
    let output = orchestrator
        .translate_target(&id, image.clone())
        .await
        .expect("translate");
    assert_eq!(output.regions.len(), 1);
    assert_eq!(orchestrator.registry().state(&id), Some(ProcessingState::Editing));

    let err = orchestrator
        .open_editor(&id, image.clone(), Some((output.inpainted, output.regions)))
        .expect_err("second editor");
    assert!(matches!(err, PipelineError::ConcurrencyGuardRejected(_)));

    orchestrator.close_editor(&id, &mut editor);
    assert_eq!(
        orchestrator.registry().state(&id),
        Some(ProcessingState::Translated)
    );
    assert!(orchestrator.open_editor(&id, image, None).is_ok());
}

#[tokio::test]
async fn empty_mask_never_reaches_the_inpainter() {
    let backend = Arc::new(FakeBackend::default());
    let image = solid(80, 60, [90, 90, 90, 255]);
    let mut session = begin_edit_session(
        image,
        None,
        &Settings::default(),
        Arc::new(FontBook::empty()),
    )
    .expect("session");
    session.set_mode(EditorMode::InpaintMask);
    let before = session.working_layer().clone();

    let effect = session.request_inpaint();
    assert!(matches!(effect, EditorEffect::None));
    let effect = session.apply_pointer_event(PointerEvent::mouse(PointerKind::Up, 10.0, 10.0));
    assert!(matches!(effect, EditorEffect::None));

    assert_eq!(session.working_layer().data(), before.data());
    assert!(!session.inpaint_in_flight());
    assert_eq!(backend.inpaint_calls(), 0);
}

#[tokio::test]
async fn inpaint_stroke_round_trips_through_the_service() {
    let backend = Arc::new(FakeBackend::default());
    let image = solid(120, 80, [200, 10, 10, 255]);
    let mut session = begin_edit_session(
        image,
        None,
        &Settings::default(),
        Arc::new(FontBook::empty()),
    )
    .expect("session");
    session.set_mode(EditorMode::InpaintMask);
    session.set_brush_size(EditorMode::InpaintMask, 10.0);
    session.apply_pointer_event(PointerEvent::mouse(PointerKind::Down, 60.0, 40.0));
    let effect = session.apply_pointer_event(PointerEvent::mouse(PointerKind::Up, 60.0, 40.0));
    let EditorEffect::InpaintRequested(job) = effect else {
        panic!("expected an inpaint job, got {effect:?}");
    };
    assert!(session.inpaint_in_flight());

    let result = job
        .submit(backend.as_ref(), Duration::from_secs(60))
        .await;
    let effect = session.complete_inpaint(job.ticket, result);
    assert!(matches!(effect, EditorEffect::Redraw));
    assert!(!session.inpaint_in_flight());
    assert_eq!(backend.inpaint_calls(), 1);
    let patched = session
        .working_layer()
        .pixel(60, 40)
        .expect("pixel");
    assert_eq!((patched.red(), patched.alpha()), (200, 255));
}

#[tokio::test]
async fn result_for_a_closed_editor_is_discarded() {
    let backend = Arc::new(FakeBackend::default());
    let mut session = begin_edit_session(
        solid(50, 50, [0, 0, 0, 255]),
        None,
        &Settings::default(),
        Arc::new(FontBook::empty()),
    )
    .expect("session");
    session.set_mode(EditorMode::InpaintMask);
    session.apply_pointer_event(PointerEvent::mouse(PointerKind::Down, 25.0, 25.0));
    let EditorEffect::InpaintRequested(job) =
        session.apply_pointer_event(PointerEvent::mouse(PointerKind::Up, 25.0, 25.0))
    else {
        panic!("expected an inpaint job");
    };
    session.close();
    let before = session.working_layer().clone();
    let result = job.submit(backend.as_ref(), Duration::from_secs(60)).await;
    assert!(matches!(
        session.complete_inpaint(job.ticket, result),
        EditorEffect::None
    ));
    assert_eq!(session.working_layer().data(), before.data());
}

#[test]
fn erase_stroke_removes_regions_under_its_path() {
    let regions = vec![
        region(1, 40.0, 40.0, 80.0, 60.0, "hit"),
        region(2, 40.0, 110.0, 80.0, 130.0, "near miss"),
        region(3, 200.0, 150.0, 260.0, 170.0, "far"),
    ];
    let mut session = begin_edit_session(
        solid(300, 200, [255, 255, 255, 255]),
        Some(regions),
        &Settings::default(),
        Arc::new(FontBook::empty()),
    )
    .expect("session");
    session.set_mode(EditorMode::Erase);
    session.set_brush_size(EditorMode::Erase, 20.0);

    session.apply_pointer_event(PointerEvent::mouse(PointerKind::Down, 10.0, 50.0));
    session.apply_pointer_event(PointerEvent::mouse(PointerKind::Move, 55.0, 50.0));
    session.apply_pointer_event(PointerEvent::mouse(PointerKind::Move, 110.0, 50.0));
    session.apply_pointer_event(PointerEvent::mouse(PointerKind::Up, 110.0, 50.0));

    let remaining: Vec<u64> = session.regions().iter().map(|region| region.id).collect();
    assert_eq!(remaining, vec![2, 3]);
}

#[test]
fn detected_errors_are_typed() {
    let err = PipelineError::timeout("translate", Duration::from_secs(100));
    assert!(err.is_service_failure());
    assert!(!PipelineError::InvalidInput("tiny mask".to_string()).is_service_failure());
}
