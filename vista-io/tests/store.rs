use std::fs;
use std::path::Path;

use serde_json::json;
use vista_core::kind::{PlanKind, SceneKind, SectionKind, ViewKind};
use vista_io::{DocumentLoader, DocumentSaver, IoError, JsonStore, SourceTier, load_external_file};

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn user_file_takes_precedence_over_default() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::new(dir.path(), dir.path());

    write(
        &store.default_path(&SectionKind),
        r#"{ "groups": [ { "id": "g1", "name": "Default", "segments": [] } ] }"#,
    );
    write(
        &store.user_path(&SectionKind),
        r#"{ "groups": [ { "id": "g2", "name": "User", "segments": [] } ] }"#,
    );

    let outcome = store.load(&SectionKind);
    assert!(outcome.success);
    assert!(outcome.is_user());
    assert_eq!(outcome.data["groups"][0]["name"], "User");

    assert!(store.reset_user_file(&SectionKind).unwrap());
    let outcome = store.load(&SectionKind);
    assert!(outcome.is_default());
    assert_eq!(outcome.data["groups"][0]["name"], "Default");
    assert!(!store.reset_user_file(&SectionKind).unwrap());
}

#[test]
fn save_then_load_round_trips_and_never_touches_default() {
    let dir = tempfile::tempdir().unwrap();
    let plugin = dir.path().join("plugin");
    let user = dir.path().join("user");
    let store = JsonStore::new(&plugin, &user);

    let default_text = r#"{ "plans": [ { "id": "Base", "name": "Base" } ] }"#;
    write(&store.default_path(&PlanKind), default_text);

    let data = json!({
        "plans": [
            { "id": "Base", "name": "Base", "style": "Planta", "cameraType": "top_ortho", "activeLayers": ["walls"] },
            { "id": "Layout", "name": "Layout", "style": "", "activeLayers": [] }
        ]
    });
    let written = store.save(&PlanKind, &data).unwrap();
    assert_eq!(written, user.join("plans/json_data/user_plans_data.json"));

    let outcome = store.load(&PlanKind);
    assert_eq!(outcome.tier, SourceTier::User(written));
    assert_eq!(outcome.data, data);
    assert_eq!(
        fs::read_to_string(store.default_path(&PlanKind)).unwrap(),
        default_text
    );
}

#[test]
fn corrupt_user_file_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::new(dir.path(), dir.path());
    write(&store.default_path(&SceneKind), r#"{ "scenes": [ { "name": "Iso" } ] }"#);
    write(&store.user_path(&SceneKind), "{ not json");

    let outcome = store.load(&SceneKind);
    assert!(outcome.success);
    assert!(outcome.is_default());
    assert_eq!(outcome.data["scenes"][0]["name"], "Iso");
}

#[test]
fn empty_user_file_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::new(dir.path(), dir.path());
    write(&store.default_path(&SceneKind), r#"{ "scenes": [ { "name": "Iso" } ] }"#);
    write(&store.user_path(&SceneKind), "  \n");
    assert!(store.load(&SceneKind).is_default());

    write(&store.user_path(&SceneKind), "{}");
    assert!(store.load(&SceneKind).is_default());
}

#[test]
fn bom_prefixed_files_parse() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::new(dir.path(), dir.path());
    write(
        &store.default_path(&PlanKind),
        "\u{feff}{ \"plans\": [ { \"name\": \"Base\" } ] }",
    );
    let outcome = store.load(&PlanKind);
    assert!(outcome.success);
    assert_eq!(outcome.data["plans"][0]["name"], "Base");
}

#[test]
fn corrupt_default_yields_skeleton_with_message() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::new(dir.path(), dir.path());
    write(&store.default_path(&SectionKind), "[[[");

    let outcome = store.load(&SectionKind);
    assert!(!outcome.success);
    assert_eq!(outcome.tier, SourceTier::Skeleton);
    assert_eq!(outcome.data, json!({ "groups": [] }));
    assert!(outcome.message.is_some());
}

#[test]
fn missing_files_yield_skeleton() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::new(dir.path(), dir.path());
    let outcome = store.load(&PlanKind);
    assert!(!outcome.success);
    assert_eq!(outcome.data, json!({ "plans": [] }));
    assert!(outcome.message.unwrap().contains("plans"));
}

#[test]
fn save_rejects_malformed_documents() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::new(dir.path(), dir.path());
    let err = store.save(&SectionKind, &json!({ "plans": [] })).unwrap_err();
    assert!(matches!(err, IoError::InvalidDocument(_)));
    assert!(!store.user_path(&SectionKind).exists());
}

#[test]
fn save_reports_write_failures() {
    let dir = tempfile::tempdir().unwrap();
    // 用户根目录被同名文件占据，无法创建子目录
    let blocker = dir.path().join("user");
    fs::write(&blocker, b"file").unwrap();
    let store = JsonStore::new(dir.path(), &blocker);
    let err = store.save(&PlanKind, &json!({ "plans": [] })).unwrap_err();
    assert!(matches!(err, IoError::WriteError { .. }));
}

#[test]
fn external_file_requires_root_key() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.json");
    let bad = dir.path().join("bad.json");
    let broken = dir.path().join("broken.json");
    fs::write(&good, r#"{ "groups": [ { "id": "g", "name": "G", "segments": [] } ] }"#).unwrap();
    fs::write(&bad, r#"{ "plans": [] }"#).unwrap();
    fs::write(&broken, "{").unwrap();

    let value = load_external_file(&good, &SectionKind).unwrap();
    assert_eq!(value["groups"][0]["id"], "g");
    assert!(matches!(
        load_external_file(&bad, &SectionKind),
        Err(IoError::InvalidDocument(_))
    ));
    assert!(matches!(
        load_external_file(&broken, &SectionKind),
        Err(IoError::ParseError { .. })
    ));
    assert!(matches!(
        load_external_file(&dir.path().join("absent.json"), &SectionKind),
        Err(IoError::ReadError { .. })
    ));
    assert_eq!(SectionKind.root_key(), "groups");
}

/// 解码器拒绝的用户文件与解析失败同样回退到默认文件。
fn group_ids(value: &serde_json::Value) -> Result<Vec<String>, String> {
    value["groups"]
        .as_array()
        .ok_or_else(|| "groups is not an array".to_string())?
        .iter()
        .map(|group| {
            group["id"]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| "group without id".to_string())
        })
        .collect()
}

#[test]
fn undecodable_user_file_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::new(dir.path(), dir.path());
    write(
        &store.default_path(&SectionKind),
        r#"{ "groups": [ { "id": "g1", "name": "Default" } ] }"#,
    );
    write(
        &store.user_path(&SectionKind),
        r#"{ "groups": [ { "name": "User" } ] }"#,
    );

    let (ids, outcome) = store.load_decoded(&SectionKind, group_ids);
    assert_eq!(ids, vec!["g1".to_string()]);
    assert!(outcome.success);
    assert!(outcome.is_default());

    // 两层都无法解码时返回骨架与诊断信息
    write(
        &store.default_path(&SectionKind),
        r#"{ "groups": [ { "name": "Default" } ] }"#,
    );
    let (ids, outcome) = store.load_decoded(&SectionKind, group_ids);
    assert!(ids.is_empty());
    assert!(!outcome.success);
    assert_eq!(outcome.tier, SourceTier::Skeleton);
    assert!(outcome.message.unwrap().contains("group without id"));
}
