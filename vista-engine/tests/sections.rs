use std::fs;

use vista_core::geometry::{Bounds3D, Point3, Vector3};
use vista_core::kind::{SectionKind, ViewKind};
use vista_core::model::{SectionDocument, SectionSegment};
use vista_engine::host::{SceneHost, ViewpointFlags};
use vista_engine::registry::ViewParams;
use vista_engine::sections::{SOURCE_METADATA, SegmentParams};
use vista_engine::{
    EngineError, EngineSettings, MemoryHost, SectionGroupManager, SessionContext,
    ViewConfigRegistry,
};
use vista_io::JsonStore;

fn session(dir: &std::path::Path) -> SessionContext {
    SessionContext::new(JsonStore::new(dir, dir), EngineSettings::default())
}

fn demo_host() -> MemoryHost {
    let mut host = MemoryHost::new();
    host.populate_demo();
    host
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn standard_sections_are_symmetric_around_the_model() {
    let dir = tempfile::tempdir().unwrap();
    let sections = SectionGroupManager::new(&session(dir.path()));
    let mut host = demo_host();

    let views = sections.create_standard_sections(&mut host).unwrap();
    let names: Vec<_> = views.iter().map(|view| view.record.name.as_str()).collect();
    assert_eq!(names, ["a", "b", "c", "d"]);

    let expected = [
        ("a", Point3::new(0.0, -6.0, 0.0), Vector3::Y),
        ("b", Point3::new(-6.0, 0.0, 0.0), Vector3::X),
        ("c", Point3::new(0.0, 6.0, 0.0), Vector3::NEG_Y),
        ("d", Point3::new(6.0, 0.0, 0.0), Vector3::NEG_X),
    ];
    for (name, position, normal) in expected {
        let plane = host.plane_by_name(name).unwrap();
        assert!(plane.position.distance(position) < 1e-9, "{name}");
        assert_eq!(plane.normal, normal);
        assert_eq!(plane.tag.as_deref(), Some("SECTIONS"));

        let camera = host.viewpoint_by_name(name).unwrap().camera.unwrap();
        let direction = camera.direction().unwrap();
        assert!(close(direction.dot(normal), 1.0));
        assert!(!camera.perspective);
    }

    sections.create_standard_sections(&mut host).unwrap();
    assert_eq!(host.viewpoint_ids().len(), 4);
    assert_eq!(host.state().planes.len(), 4);
}

#[test]
fn standard_sections_need_a_model() {
    let dir = tempfile::tempdir().unwrap();
    let sections = SectionGroupManager::new(&session(dir.path()));
    let mut host = MemoryHost::new();
    assert!(matches!(
        sections.create_standard_sections(&mut host),
        Err(EngineError::HostState(_))
    ));
}

#[test]
fn auto_views_follow_the_selection() {
    let dir = tempfile::tempdir().unwrap();
    let sections = SectionGroupManager::new(&session(dir.path()));
    let mut host = demo_host();

    assert!(matches!(
        sections.create_auto_views(&mut host, "Kitchen"),
        Err(EngineError::HostState(_))
    ));

    host.set_selection_bounds(Some(Bounds3D::from_center(
        Point3::new(2.0, 2.0, 1.0),
        Vector3::new(2.0, 2.0, 2.0),
    )));
    let views = sections.create_auto_views(&mut host, "Kitchen").unwrap();
    let names: Vec<_> = views.iter().map(|view| view.record.name.as_str()).collect();
    assert_eq!(names, ["Kitchen_a", "Kitchen_b", "Kitchen_c", "Kitchen_d"]);
    assert!(host.list_tags().contains(&"KITCHEN".to_string()));
    let plane = host.plane_by_name("Kitchen_a").unwrap();
    assert!(close(plane.position.y(), 0.0));
    assert!(close(plane.position.x(), 2.0));
}

#[test]
fn individual_section_resolves_keywords() {
    let dir = tempfile::tempdir().unwrap();
    let sections = SectionGroupManager::new(&session(dir.path()));
    let mut host = demo_host();

    let view = sections
        .create_individual_section(&mut host, "Lateral Direita", "Corte D")
        .unwrap();
    assert_eq!(view.record.name, "Corte D");
    let plane = host.plane_by_name("Corte D").unwrap();
    assert_eq!(plane.normal, Vector3::NEG_X);
    assert!(close(plane.position.x(), 6.0));

    let before = host.state().clone();
    assert!(matches!(
        sections.create_individual_section(&mut host, "sideways", "X"),
        Err(EngineError::Validation(_))
    ));
    assert_eq!(host.state(), &before);
}

#[test]
fn duplicate_with_segment_leaves_source_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let styles = dir.path().join(SectionKind.domain()).join("styles");
    fs::create_dir_all(&styles).unwrap();
    fs::write(styles.join("S.style"), b"style").unwrap();
    let ctx = session(dir.path());
    let sections = SectionGroupManager::new(&ctx);
    let plans = ViewConfigRegistry::new(SectionKind, &ctx);

    let mut host = demo_host();
    host.add_tag("L1", true);
    let base = plans
        .add(
            &mut host,
            ViewParams {
                name: "Base".into(),
                style: Some("Default".into()),
                active_layers: Some(vec!["walls".into()]),
                ..ViewParams::default()
            },
        )
        .unwrap();
    let flags = ViewpointFlags {
        use_camera: false,
        use_shadow_info: false,
        ..ViewpointFlags::default()
    };
    host.set_viewpoint_flags(base.id, flags).unwrap();
    let source = host.viewpoint(base.id).unwrap();

    let segment = SectionSegment {
        code: "v2".into(),
        style: "S".into(),
        active_layers: vec!["L1".into()],
        ..SectionSegment::default()
    };
    let copies = sections
        .duplicate_scenes_with_segment(&mut host, &["Base".to_string()], &segment)
        .unwrap();

    assert_eq!(copies.len(), 1);
    let copy = host.viewpoint_by_name("Base_v2").unwrap();
    assert_eq!(copy.style.as_deref(), Some("S"));
    assert_eq!(copy.visible_tags, vec!["L1"]);
    assert_eq!(copy.flags, flags);
    assert_eq!(
        copy.metadata.get(SOURCE_METADATA).map(String::as_str),
        Some("Base")
    );
    assert_eq!(host.viewpoint(base.id).unwrap(), source);

    // 再次复制替换旧副本
    sections
        .duplicate_scenes_with_segment(&mut host, &["Base".to_string()], &segment)
        .unwrap();
    assert_eq!(host.viewpoint_ids().len(), 2);
}

#[test]
fn duplicate_validates_before_mutating() {
    let dir = tempfile::tempdir().unwrap();
    let sections = SectionGroupManager::new(&session(dir.path()));
    let mut host = demo_host();
    host.create_viewpoint("Base").unwrap();
    let before = host.state().clone();

    let segment = SectionSegment {
        code: "v2".into(),
        ..SectionSegment::default()
    };
    assert!(matches!(
        sections.duplicate_scenes_with_segment(
            &mut host,
            &["Base".to_string(), "Missing".to_string()],
            &segment
        ),
        Err(EngineError::NotFound { .. })
    ));
    let bad = SectionSegment {
        code: "v 2".into(),
        ..SectionSegment::default()
    };
    assert!(matches!(
        sections.duplicate_scenes_with_segment(&mut host, &["Base".to_string()], &bad),
        Err(EngineError::Validation(_))
    ));
    assert!(matches!(
        sections.duplicate_scenes_with_segment(&mut host, &[], &segment),
        Err(EngineError::Validation(_))
    ));
    assert_eq!(host.state(), &before);
}

#[test]
fn duplicate_batch_may_include_an_earlier_copy() {
    let dir = tempfile::tempdir().unwrap();
    let sections = SectionGroupManager::new(&session(dir.path()));
    let mut host = demo_host();
    host.create_viewpoint("Base").unwrap();
    host.create_viewpoint("Base_v2").unwrap();

    let segment = SectionSegment {
        code: "v2".into(),
        ..SectionSegment::default()
    };
    let copies = sections
        .duplicate_scenes_with_segment(
            &mut host,
            &["Base".to_string(), "Base_v2".to_string()],
            &segment,
        )
        .unwrap();

    let names: Vec<&str> = copies.iter().map(|copy| copy.record.name.as_str()).collect();
    assert_eq!(names, vec!["Base_v2", "Base_v2_v2"]);
    let replaced = host.viewpoint_by_name("Base_v2").unwrap();
    assert_eq!(
        replaced.metadata.get(SOURCE_METADATA).map(String::as_str),
        Some("Base")
    );
    let nested = host.viewpoint_by_name("Base_v2_v2").unwrap();
    assert_eq!(
        nested.metadata.get(SOURCE_METADATA).map(String::as_str),
        Some("Base_v2")
    );
    assert_eq!(host.viewpoint_ids().len(), 3);
}

#[test]
fn group_and_segment_crud_persists_to_user_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = session(dir.path());
    let sections = SectionGroupManager::new(&ctx);

    let group = sections.add_group(&mut ctx, "Cortes").unwrap();
    assert_eq!(group.id.len(), 36);
    assert!(matches!(
        sections.add_group(&mut ctx, "cortes"),
        Err(EngineError::Duplicate { .. })
    ));

    let segment = sections
        .add_segment(
            &mut ctx,
            &group.id,
            SegmentParams {
                name: Some("Layout B".into()),
                code: Some("lb".into()),
                style: Some("S".into()),
                active_layers: Some(vec!["furniture".into()]),
            },
        )
        .unwrap();
    let clash = sections.add_segment(
        &mut ctx,
        &group.id,
        SegmentParams {
            name: Some("Other".into()),
            code: Some("LB".into()),
            ..SegmentParams::default()
        },
    );
    assert!(matches!(clash, Err(EngineError::Duplicate { .. })));

    let updated = sections
        .update_segment(
            &mut ctx,
            &group.id,
            &segment.id,
            SegmentParams {
                code: Some("lb2".into()),
                ..SegmentParams::default()
            },
        )
        .unwrap();
    assert_eq!(updated.code, "lb2");
    assert_eq!(updated.name, "Layout B");

    let renamed = sections.update_group(&mut ctx, &group.id, "Sections").unwrap();
    assert_eq!(renamed.name, "Sections");

    let user_file = ctx.store().user_path(&SectionKind);
    let raw = fs::read_to_string(&user_file).unwrap();
    assert!(raw.contains("\"lb2\""));

    sections.delete_segment(&mut ctx, &group.id, &segment.id).unwrap();
    assert!(sections.group(&mut ctx, &group.id).unwrap().segments.is_empty());
    sections.delete_group(&mut ctx, &group.id).unwrap();
    assert!(sections.groups(&mut ctx).0.is_empty());
    assert!(matches!(
        sections.delete_group(&mut ctx, &group.id),
        Err(EngineError::NotFound { .. })
    ));
}

#[test]
fn duplicate_by_segment_id_reads_the_group_document() {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = session(dir.path());
    let sections = SectionGroupManager::new(&ctx);
    let mut host = demo_host();
    host.create_viewpoint("Corte A").unwrap();

    let group = sections.add_group(&mut ctx, "Cortes").unwrap();
    let segment = sections
        .add_segment(
            &mut ctx,
            &group.id,
            SegmentParams {
                name: Some("Sem mobiliario".into()),
                code: Some("sm".into()),
                active_layers: Some(vec!["walls".into()]),
                ..SegmentParams::default()
            },
        )
        .unwrap();

    let copies = sections
        .duplicate_with_segment_id(
            &mut host,
            &mut ctx,
            &["Corte A".to_string()],
            &group.id,
            &segment.id,
        )
        .unwrap();
    assert_eq!(copies[0].record.name, "Corte A_sm");
    assert_eq!(host.viewpoint_by_name("Corte A_sm").unwrap().visible_tags, vec!["walls"]);
    assert!(matches!(
        sections.duplicate_with_segment_id(&mut host, &mut ctx, &[], &group.id, "missing"),
        Err(EngineError::NotFound { .. })
    ));
}

#[test]
fn undecodable_user_groups_keep_the_default_groups() {
    let plugin = tempfile::tempdir().unwrap();
    let user = tempfile::tempdir().unwrap();
    let mut ctx = SessionContext::new(
        JsonStore::new(plugin.path(), user.path()),
        EngineSettings::default(),
    );
    let sections = SectionGroupManager::new(&ctx);

    let default_file = ctx.store().default_path(&SectionKind);
    fs::create_dir_all(default_file.parent().unwrap()).unwrap();
    fs::write(
        &default_file,
        r#"{ "groups": [ { "id": "g1", "name": "Default", "segments": [] } ] }"#,
    )
    .unwrap();
    // 合法 JSON，但分组缺少 id
    let user_file = ctx.store().user_path(&SectionKind);
    fs::create_dir_all(user_file.parent().unwrap()).unwrap();
    fs::write(&user_file, r#"{ "groups": [ { "name": "Broken" } ] }"#).unwrap();

    let (groups, report) = sections.groups(&mut ctx);
    assert!(report.success);
    assert_eq!(groups[0].id, "g1");

    sections.add_group(&mut ctx, "Cortes").unwrap();
    let saved: SectionDocument =
        serde_json::from_str(&fs::read_to_string(&user_file).unwrap()).unwrap();
    let names: Vec<&str> = saved.groups.iter().map(|group| group.name.as_str()).collect();
    assert_eq!(names, vec!["Default", "Cortes"]);
}
