use super::*;

#[test]
fn test_maps_reused_across_frames() {
    let (backend, technique) = engine(ShadowSettings::default());
    let mut host = ScriptedHost::new(1);
    host.frame(&technique);
    let first = host.receiver_state.clone().unwrap();
    let texture = first.texture_on(1);

    host.frame(&technique);
    let second = host.receiver_state.clone().unwrap();
    assert_eq!(second.texture_on(1), texture);
    assert_eq!(backend.live_textures(), 3);
    // Odd and even frames publish different state blocks
    assert!(!Arc::ptr_eq(&first, &second));

    host.frame(&technique);
    let third = host.receiver_state.clone().unwrap();
    assert!(!Arc::ptr_eq(&second, &third));
}

#[test]
fn test_unused_maps_released() {
    let (backend, technique) = engine(ShadowSettings::default());
    let mut host = ScriptedHost::new(1);
    host.lights.push(PositionedLight::directional(1, Vec3::new(-0.5, -1.0, 0.3)));
    host.frame(&technique);
    assert_eq!(backend.live_textures(), 4);

    host.lights.truncate(1);
    host.frame(&technique);
    assert_eq!(backend.live_textures(), 3);
    assert_eq!(backend.live_render_targets(), 1);
    assert_eq!(backend.stale_releases(), 0);
}

#[test]
fn test_release_is_idempotent() {
    let (backend, technique) = engine(ShadowSettings::default());
    let mut host = ScriptedHost::new(1);
    host.frame(&technique);

    technique.release_gl_objects();
    technique.release_gl_objects();
    assert_eq!(backend.live_textures(), 2);
    assert_eq!(backend.live_render_targets(), 0);
    assert_eq!(backend.stale_releases(), 0);

    let view = technique.view_data(ViewHandle(1)).unwrap();
    assert!(view.lock().unwrap().shadows.is_empty());

    // The view allocates again on its next frame
    host.frame(&technique);
    assert_eq!(backend.live_textures(), 3);
}

#[test]
fn test_clean_scene_graph_forgets_views() {
    let (backend, technique) = engine(ShadowSettings::default());
    let mut host = ScriptedHost::new(1);
    host.frame(&technique);
    technique.clean_scene_graph();
    assert_eq!(technique.view_count(), 0);
    assert_eq!(backend.live_textures(), 0);
    assert_eq!(backend.live_programs(), 0);
    assert_eq!(backend.stale_releases(), 0);
}

#[test]
fn test_views_are_independent() {
    let (backend, technique) = engine(ShadowSettings::default());
    let mut main = ScriptedHost::new(1);
    let mut mirror = ScriptedHost::new(2);
    mirror.view = Mat4::look_at(&Vec3::new(10.0, 5.0, 10.0), &Vec3::zeros(), &Vec3::y());
    main.frame(&technique);
    mirror.frame(&technique);

    assert_eq!(technique.view_count(), 2);
    let a = main.receiver_state.clone().unwrap();
    let b = mirror.receiver_state.clone().unwrap();
    assert_ne!(a.texture_on(1), b.texture_on(1));
    assert_ne!(a.texgens[0].world_to_texture, b.texgens[0].world_to_texture);
    assert_eq!(backend.live_textures(), 4);
}

#[test]
fn test_views_cull_concurrently() {
    let (backend, technique) = engine(ShadowSettings::default());
    std::thread::scope(|scope| {
        for handle in 0..4 {
            let technique = &technique;
            scope.spawn(move || {
                let mut host = ScriptedHost::new(handle);
                for _ in 0..3 {
                    host.frame(technique);
                }
                assert!(host.receiver_state.is_some());
            });
        }
    });
    assert_eq!(technique.view_count(), 4);
    assert_eq!(backend.live_textures(), 2 + 4);
}

#[test]
fn test_disabled_binds_dummy_state() {
    let (_backend, technique) = engine(ShadowSettings::default());
    let mut host = ScriptedHost::new(1);

    technique.disable_shadows(true);
    host.frame(&technique);
    assert!(host.passes.is_empty());
    assert!(host.receiver_state.is_none());
    assert_eq!(host.receiver_culls.len(), 1);
    let dummy = host.receiver_culls[0].1.clone().unwrap();
    assert!(dummy.texture_on(1).is_some());
    assert!(dummy.texgens.is_empty());
    assert_eq!(technique.view_count(), 0);

    technique.disable_shadows(false);
    host.frame(&technique);
    assert!(host.receiver_culls[0].1.is_none());

    technique.enable_shadows();
    host.frame(&technique);
    assert_eq!(host.passes.len(), 1);
}

#[test]
fn test_cull_before_init_renders_unshadowed() {
    let backend = Arc::new(HeadlessBackend::new());
    let technique = ShadowTechnique::new(ShadowSettings::default(), backend.clone(), Arc::new(StateCache::new())).unwrap();
    let mut host = ScriptedHost::new(1);
    host.frame(&technique);
    assert_eq!(host.receiver_culls.len(), 1);
    assert!(host.passes.is_empty());
    assert!(host.receiver_state.is_none());
    assert_eq!(backend.live_textures(), 0);
}

#[test]
fn test_allocation_failure_skips_map() {
    let (backend, technique) = engine(ShadowSettings::default());
    backend.set_fail_allocations(true);
    let mut host = ScriptedHost::new(1);
    host.frame(&technique);
    assert!(host.passes.is_empty());
    assert!(host.receiver_state.is_none());
    assert_eq!(backend.live_textures(), 2);

    backend.set_fail_allocations(false);
    host.frame(&technique);
    assert_eq!(host.passes.len(), 1);
    assert!(host.receiver_state.is_some());
}

#[test]
fn test_nothing_visible_publishes_nothing() {
    let (_backend, technique) = engine(ShadowSettings::default());
    let mut host = ScriptedHost::new(1);
    host.calculated = (f64::MAX, -f64::MAX);
    host.frame(&technique);
    assert!(host.passes.is_empty());
    assert!(host.receiver_state.is_none());
}
