use pretty_assertions::assert_eq;
use sprig::{
    boot::active_profiles,
    errors::{Error, PropertyErrorKind},
    properties::{LayerKind, PropertyReader as _},
    sources::EnvSource,
    Bean, BootConfig, Container, Dynamic,
};
use std::{convert::Infallible, fs, path::Path};
use tempfile::TempDir;
use tracing_test::traced_test;

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn config_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "application.properties",
        "# defaults\nserver.host=localhost\nserver.port=8080\napp.name=demo\n",
    );
    write(
        dir.path(),
        "application.yaml",
        "db:\n  url: postgres://localhost/demo\n  pool:\n    size: 4\nfeatures:\n  - search\n  - export\n",
    );
    write(dir.path(), "application.toml", "[cache]\nttl = \"5m\"\nenabled = true\n");
    write(dir.path(), "application-dev.yaml", "db:\n  url: postgres://dev/demo\nserver:\n  port: 9000\n");
    dir
}

#[test]
#[traced_test]
fn test_default_files() {
    let dir = config_dir();
    let layers = BootConfig::new()
        .config_dirs([dir.path()])
        .without_env()
        .assemble()
        .unwrap();

    assert_eq!(layers.get("server.host"), Some("localhost"));
    assert_eq!(layers.get("server.port"), Some("8080"));
    assert_eq!(layers.get("db.url"), Some("postgres://localhost/demo"));
    assert_eq!(layers.get("db.pool.size"), Some("4"));
    assert_eq!(layers.get("features"), Some("search,export"));
    assert_eq!(layers.get("cache.ttl"), Some("5m"));
    assert_eq!(layers.get("cache.enabled"), Some("true"));
    assert!(active_profiles(&layers).is_empty());
    assert!(layers.layers().all(|layer| layer.kind != LayerKind::ProfileFile));
}

#[test]
#[traced_test]
fn test_profile_env_and_args() {
    let dir = config_dir();
    let layers = BootConfig::new()
        .config_dirs([dir.path()])
        .env(
            EnvSource::new("^SPRIG_(SERVER|SPRING)_")
                .unwrap()
                .with_vars([
                    ("SPRIG_SPRING_PROFILES_ACTIVE", "dev"),
                    ("SPRIG_SERVER_HOST", "0.0.0.0"),
                    ("SPRIG_DB_URL", "filtered out"),
                    ("PATH", "/usr/bin"),
                ]),
        )
        .args(["-server.host", "127.0.0.1", "--verbose"])
        .builtin("server.timeout", "30s")
        .unwrap()
        .assemble()
        .unwrap();

    assert_eq!(active_profiles(&layers), ["dev"]);
    // Profile files win over default files
    assert_eq!(layers.get("db.url"), Some("postgres://dev/demo"));
    assert_eq!(layers.get("server.port"), Some("9000"));
    // Command-line flags win over the environment
    assert_eq!(layers.get("server.host"), Some("127.0.0.1"));
    assert_eq!(layers.get("verbose"), Some(""));
    assert_eq!(layers.get("server.timeout"), Some("30s"));
    assert!(!layers.has("path"));
    assert!(!layers.has("PATH"));
}

#[test]
#[traced_test]
fn test_extra_files() {
    let dir = config_dir();
    write(dir.path(), "extra.properties", "server.port=7000\n");
    write(
        dir.path(),
        "configmap.yaml",
        "apiVersion: v1\nkind: ConfigMap\ndata:\n  application.properties: |\n    app.name=from-configmap\n  b.yaml: |\n    queue:\n      name: jobs\n",
    );

    let layers = BootConfig::new()
        .config_dirs([dir.path()])
        .without_env()
        .file(dir.path().join("extra.properties"))
        .configmap(dir.path().join("configmap.yaml"))
        .assemble()
        .unwrap();

    assert_eq!(layers.get("server.port"), Some("7000"));
    assert_eq!(layers.get("app.name"), Some("from-configmap"));
    assert_eq!(layers.get("queue.name"), Some("jobs"));

    let missing = BootConfig::new()
        .config_dirs([dir.path()])
        .without_env()
        .file(dir.path().join("missing.properties"))
        .assemble();
    assert!(matches!(missing, Err(PropertyErrorKind::Io { .. })));

    write(dir.path(), "broken.yaml", "db: [unclosed\n");
    let broken = BootConfig::new()
        .config_dirs([dir.path()])
        .without_env()
        .file(dir.path().join("broken.yaml"))
        .assemble();
    assert!(matches!(broken, Err(PropertyErrorKind::FileFormat { .. })));
}

#[test]
#[traced_test]
fn test_reload_after_file_change() {
    struct Pool {
        size: Dynamic<u32>,
    }

    let dir = config_dir();
    let container = Container::new();
    container
        .load(BootConfig::new().config_dirs([dir.path()]).without_env())
        .unwrap();
    container
        .register(Bean::provide(|size: Dynamic<u32>| Ok::<_, Infallible>(Pool { size })).args(["${db.pool.size}"]))
        .unwrap();
    container.refresh().unwrap();

    let pool = container.get::<Pool>().unwrap();
    assert_eq!(*pool.size.get(), 4);

    write(
        dir.path(),
        "application.yaml",
        "db:\n  url: postgres://localhost/demo\n  pool:\n    size: 16\n",
    );
    let report = container.reload().unwrap();
    assert!(report.is_ok());
    assert_eq!(report.refreshed, ["db.pool.size"]);
    assert!(report.changed.contains("features"));
    assert_eq!(*pool.size.get(), 16);
    assert_eq!(container.properties().get("db.pool.size").as_deref(), Some("16"));

    // A value that no longer binds keeps its previous state
    write(dir.path(), "application.yaml", "db:\n  pool:\n    size: many\n");
    let report = container.reload().unwrap();
    assert!(!report.is_ok());
    assert_eq!(*pool.size.get(), 16);

    write(dir.path(), "application.yaml", "db: [unclosed\n");
    assert!(matches!(container.reload(), Err(Error::Property(PropertyErrorKind::FileFormat { .. }))));
    assert_eq!(container.properties().get("db.pool.size").as_deref(), Some("many"));
}
