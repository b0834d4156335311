mod support;

use bevy::math::{Mat4, Vec3};

use support::*;
use water_view::backend::{ClearValues, DepthFunc, RenderTarget, Sampler, ShaderProgram, Uniform, UniformValue};
use water_view::camera::{CameraMode, CameraView};
use water_view::math::ClipPlane;
use water_view::scene::SceneHooks;
use water_view::simulation::WaterTechnique;

fn render(
    backend: &mut RecordingBackend,
    technique: WaterTechnique,
    mode: CameraMode,
) -> water_view::RenderResult<bool> {
    let mut view = test_view(backend);
    view.render_frame(backend, &frame(technique, mode), &mut SceneHooks::default())
}

#[test]
fn offscreen_targets_are_written_before_the_screen() {
    let mut backend = RecordingBackend::new();
    assert!(render(&mut backend, WaterTechnique::Procedural, CameraMode::World).unwrap());

    assert_eq!(
        backend.passes(),
        vec![RenderTarget::Reflection, RenderTarget::Refraction, RenderTarget::Screen]
    );
    assert_eq!(backend.events.first(), Some(&Event::BeginFrame));
    assert_eq!(backend.events.last(), Some(&Event::EndFrame));

    // Every pass is closed before the next one opens, and clears first.
    for (i, event) in backend.events.iter().enumerate() {
        if let Event::BeginPass(_) = event {
            assert_eq!(backend.events[i + 1], Event::Clear(ClearValues::scene()));
            let earlier_begins = backend.events[..i].iter().filter(|e| matches!(e, Event::BeginPass(_))).count();
            let earlier_ends = backend.events[..i].iter().filter(|e| matches!(e, Event::EndPass)).count();
            assert_eq!(earlier_begins, earlier_ends);
        }
    }
}

#[test]
fn only_the_final_pass_is_unclipped() {
    let mut backend = RecordingBackend::new();
    render(&mut backend, WaterTechnique::HeightMap, CameraMode::World).unwrap();
    assert_eq!(
        backend.clip_at_pass_start(),
        vec![
            (RenderTarget::Reflection, true),
            (RenderTarget::Refraction, true),
            (RenderTarget::Screen, false),
        ]
    );
}

#[test]
fn scene_draws_tiles_then_water_then_skybox() {
    let mut backend = RecordingBackend::new();
    render(&mut backend, WaterTechnique::HeightMap, CameraMode::World).unwrap();
    for target in [RenderTarget::Reflection, RenderTarget::Refraction, RenderTarget::Screen] {
        assert_eq!(
            backend.programs_in(target),
            vec![ShaderProgram::Tiles, ShaderProgram::HeightMapWave, ShaderProgram::Skybox],
            "{target:?}"
        );
    }
}

#[test]
fn procedural_water_samples_both_targets_in_the_final_pass_only() {
    let mut backend = RecordingBackend::new();
    render(&mut backend, WaterTechnique::Procedural, CameraMode::World).unwrap();

    assert_eq!(
        backend.programs_in(RenderTarget::Reflection),
        vec![ShaderProgram::Tiles, ShaderProgram::Skybox]
    );
    assert_eq!(
        backend.programs_in(RenderTarget::Refraction),
        vec![ShaderProgram::Tiles, ShaderProgram::Skybox]
    );

    let screen = backend.draws_in(RenderTarget::Screen);
    let water: Vec<_> = screen.iter().filter(|c| c.program == ShaderProgram::ProceduralWave).collect();
    assert_eq!(water.len(), 1);
    let water = water[0];
    assert!(water.blend);
    assert_eq!(water.sampler_texture(Sampler::ReflectionTexture), Some(REFLECTION_TEXTURE));
    assert_eq!(water.sampler_texture(Sampler::RefractionTexture), Some(REFRACTION_TEXTURE));
    assert!(water.sampler_texture(Sampler::Skybox).is_some());
    assert!(water.sampler_texture(Sampler::Tiles).is_some());
    assert_eq!(water.uniform_value(Uniform::Plane), None);
    assert_eq!(water.uniform_value(Uniform::Amplitude), Some(UniformValue::Float(1.0)));
    assert_eq!(water.uniform_value(Uniform::Wavelength), Some(UniformValue::Float(5.0)));
    assert!(water.uniform_value(Uniform::CameraPos).is_some());
}

#[test]
fn no_water_technique_draws_no_water() {
    let mut backend = RecordingBackend::new();
    render(&mut backend, WaterTechnique::None, CameraMode::World).unwrap();
    for target in [RenderTarget::Reflection, RenderTarget::Refraction, RenderTarget::Screen] {
        assert_eq!(
            backend.programs_in(target),
            vec![ShaderProgram::Tiles, ShaderProgram::Skybox]
        );
    }
}

#[test]
fn clipped_surfaces_receive_the_pass_plane() {
    let mut backend = RecordingBackend::new();
    let mut view = test_view(&mut backend);
    let h = view.config().water_height();
    view.render_frame(
        &mut backend,
        &frame(WaterTechnique::HeightMap, CameraMode::World),
        &mut SceneHooks::default(),
    )
    .unwrap();

    let plane_of = |target, program| {
        backend
            .draws_in(target)
            .iter()
            .find(|c| c.program == program)
            .and_then(|c| c.uniform_value(Uniform::Plane))
    };

    let above = Some(UniformValue::Vec4(ClipPlane::above(h).0));
    let below = Some(UniformValue::Vec4(ClipPlane::below(h).0));
    assert_eq!(plane_of(RenderTarget::Reflection, ShaderProgram::Tiles), above);
    assert_eq!(plane_of(RenderTarget::Reflection, ShaderProgram::HeightMapWave), above);
    assert_eq!(plane_of(RenderTarget::Refraction, ShaderProgram::Tiles), below);
    assert_eq!(plane_of(RenderTarget::Refraction, ShaderProgram::HeightMapWave), below);
}

#[test]
fn reflection_pass_sees_the_mirrored_camera() {
    let mut backend = RecordingBackend::new();
    let mut view = test_view(&mut backend);
    let context = frame(WaterTechnique::Procedural, CameraMode::World);
    view.render_frame(&mut backend, &context, &mut SceneHooks::default()).unwrap();

    let screen = context.screen_camera();
    let mirrored = screen.mirrored(view.config().water_height());
    assert_eq!(backend.shared_view_in(RenderTarget::Reflection), Some(mirrored.view));
    assert_eq!(backend.shared_view_in(RenderTarget::Refraction), Some(screen.view));
    assert_eq!(backend.shared_view_in(RenderTarget::Screen), Some(screen.view));
}

#[test]
fn top_mode_renders_with_the_orthographic_camera() {
    let mut backend = RecordingBackend::new();
    let mut view = test_view(&mut backend);
    let context = frame(WaterTechnique::Procedural, CameraMode::Top);
    view.render_frame(&mut backend, &context, &mut SceneHooks::default()).unwrap();

    let top = CameraView::top_down(context.aspect);
    assert_eq!(backend.shared_projection_in(RenderTarget::Screen), Some(top.projection));
    assert_eq!(backend.shared_view_in(RenderTarget::Screen), Some(top.view));
}

#[test]
fn skybox_ignores_camera_translation() {
    let mut backend = RecordingBackend::new();
    render(&mut backend, WaterTechnique::Procedural, CameraMode::World).unwrap();

    let skybox = backend
        .draws_in(RenderTarget::Screen)
        .into_iter()
        .find(|c| c.program == ShaderProgram::Skybox)
        .unwrap();
    assert_eq!(skybox.depth, DepthFunc::LessOrEqual);
    match skybox.uniform_value(Uniform::View) {
        Some(UniformValue::Mat4(m)) => assert_eq!(m.w_axis.truncate(), Vec3::ZERO),
        other => panic!("unexpected view uniform {other:?}"),
    }
}

#[test]
fn objects_and_shadows_follow_camera_mode() {
    let expectations = [
        (CameraMode::World, vec![false, true]),
        (CameraMode::Top, vec![false]),
        (CameraMode::Train, vec![]),
    ];

    for (mode, shadows_per_pass) in expectations {
        let mut backend = RecordingBackend::new();
        let mut view = test_view(&mut backend);
        let mut objects = RecordingObjects::default();
        let mut hooks = SceneHooks {
            objects: Some(&mut objects),
            listener: None,
        };
        view.render_frame(&mut backend, &frame(WaterTechnique::Procedural, mode), &mut hooks)
            .unwrap();

        let expected: Vec<bool> = (0..3).flat_map(|_| shadows_per_pass.clone()).collect();
        let actual: Vec<bool> = objects.calls.iter().map(|p| p.shadows).collect();
        assert_eq!(actual, expected, "{mode:?}");

        let reflection_flags: Vec<bool> = objects.calls.iter().map(|p| p.reflection).collect();
        let per_pass = shadows_per_pass.len();
        assert!(reflection_flags[..per_pass].iter().all(|r| *r));
        assert!(reflection_flags[per_pass..].iter().all(|r| !*r));

        if mode == CameraMode::World {
            // Objects go in before the room.
            assert_eq!(
                &backend.programs_in(RenderTarget::Screen)[..3],
                &[ShaderProgram::Objects, ShaderProgram::Objects, ShaderProgram::Tiles]
            );
            assert_eq!(objects.calls[0].lights.enabled_count(), 3);
        }
        if mode == CameraMode::Top {
            assert_eq!(objects.calls[0].lights.enabled_count(), 1);
        }
    }
}

#[test]
fn listener_follows_the_selection() {
    let mut backend = RecordingBackend::new();
    let mut view = test_view(&mut backend);
    let mut listener = RecordingListener::default();

    let mut context = frame(WaterTechnique::None, CameraMode::World);
    {
        let mut hooks = SceneHooks {
            objects: None,
            listener: Some(&mut listener),
        };
        view.render_frame(&mut backend, &context, &mut hooks).unwrap();
    }
    assert_eq!(listener.positions, vec![view.config().source_pos; 3]);

    context.selected_point = Some(Vec3::new(50.0, 5.0, 0.0));
    listener.positions.clear();
    let mut hooks = SceneHooks {
        objects: None,
        listener: Some(&mut listener),
    };
    view.render_frame(&mut backend, &context, &mut hooks).unwrap();
    assert_eq!(listener.positions, vec![Vec3::new(50.0, 5.0, 0.0); 3]);
}

#[test]
fn skipped_frame_records_nothing() {
    let mut backend = RecordingBackend::new();
    let mut view = test_view(&mut backend);
    backend.skip_frames = true;
    let drawn = view
        .render_frame(
            &mut backend,
            &frame(WaterTechnique::HeightMap, CameraMode::World),
            &mut SceneHooks::default(),
        )
        .unwrap();
    assert!(!drawn);
    assert!(backend.events.is_empty());
}

#[test]
fn failed_draw_still_closes_the_pass_and_frame() {
    let mut backend = RecordingBackend::new();
    let mut view = test_view(&mut backend);
    backend.fail_draws_of = Some(ShaderProgram::Tiles);

    let result = view.render_frame(
        &mut backend,
        &frame(WaterTechnique::Procedural, CameraMode::World),
        &mut SceneHooks::default(),
    );
    assert!(result.is_err());
    assert_eq!(backend.passes(), vec![RenderTarget::Reflection]);
    assert_eq!(
        &backend.events[backend.events.len() - 2..],
        &[Event::EndPass, Event::EndFrame]
    );

    // The next frame starts cleanly.
    backend.fail_draws_of = None;
    backend.clear_events();
    assert!(view
        .render_frame(
            &mut backend,
            &frame(WaterTechnique::Procedural, CameraMode::World),
            &mut SceneHooks::default(),
        )
        .unwrap());
}

#[test]
fn singular_camera_skips_position_uniforms() {
    let mut backend = RecordingBackend::new();
    let mut view = test_view(&mut backend);
    let mut context = frame(WaterTechnique::Procedural, CameraMode::World);
    context.camera = CameraView::new(Mat4::ZERO, context.camera.projection);

    view.render_frame(&mut backend, &context, &mut SceneHooks::default()).unwrap();
    let water = backend
        .draws_in(RenderTarget::Screen)
        .into_iter()
        .find(|c| c.program == ShaderProgram::ProceduralWave)
        .unwrap();
    assert_eq!(water.uniform_value(Uniform::CameraPos), None);
    assert!(water.uniform_value(Uniform::MoveFactor).is_some());

    backend.clear_events();
    context.technique = WaterTechnique::HeightMap;
    view.render_frame(&mut backend, &context, &mut SceneHooks::default()).unwrap();
    let water = backend
        .draws_in(RenderTarget::Screen)
        .into_iter()
        .find(|c| c.program == ShaderProgram::HeightMapWave)
        .unwrap();
    assert_eq!(water.uniform_value(Uniform::Camera), None);
}

#[test]
fn height_map_frame_binds_when_loaded() {
    let mut backend = RecordingBackend::new();
    let mut view = test_view(&mut backend);

    let frame_texture = |backend: &RecordingBackend| {
        backend
            .draws_in(RenderTarget::Screen)
            .into_iter()
            .find(|c| c.program == ShaderProgram::HeightMapWave)
            .and_then(|c| c.sampler_texture(Sampler::Texture))
    };

    let mut context = frame(WaterTechnique::HeightMap, CameraMode::World);
    for (index, loaded) in [(0, true), (2, false), (5, true), (6, false)] {
        backend.clear_events();
        context.params.height_map_frame = index;
        view.render_frame(&mut backend, &context, &mut SceneHooks::default()).unwrap();
        assert_eq!(frame_texture(&backend).is_some(), loaded, "frame {index}");
    }
}
