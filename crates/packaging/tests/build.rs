use polio_models::PolioError;
use polio_packaging::{
    BuildContext, BuildOptions, ContainerDescriptor, IgnoreRules, ImageBuilder, BUILDER_IMAGE, CONTEXT_LABEL,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn python_context(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }
    dir
}

fn valid_python_context() -> TempDir {
    python_context(&[
        ("requirements.txt", "flask\nrequests\npandas\n"),
        ("app.py", "print('hello')\n"),
    ])
}

#[test]
fn valid_context_passes() {
    let dir = valid_python_context();
    let context = BuildContext::scan(dir.path()).unwrap();
    assert_eq!(context.files(), ["app.py", "requirements.txt"]);

    let report = ContainerDescriptor::python_app().validate_context(&context).unwrap();
    assert_eq!(report.files, 2);
    assert_eq!(report.missing_entrypoint, None);
    assert_eq!(report.fingerprint.len(), 64);
}

#[test]
fn missing_requirements_is_fatal() {
    let dir = python_context(&[("app.py", "print('hello')\n")]);
    let context = BuildContext::scan(dir.path()).unwrap();

    let err = ContainerDescriptor::python_app().validate_context(&context).unwrap_err();
    assert!(matches!(err, PolioError::MissingContextFile { ref path } if path == "requirements.txt"));
}

#[test]
fn missing_entrypoint_is_reported_not_fatal() {
    let dir = python_context(&[("requirements.txt", "flask\n")]);
    let context = BuildContext::scan(dir.path()).unwrap();

    let report = ContainerDescriptor::python_app().validate_context(&context).unwrap();
    assert_eq!(report.missing_entrypoint.as_deref(), Some("app.py"));
}

#[test]
fn fingerprint_tracks_content() {
    let dir = valid_python_context();
    let first = BuildContext::scan(dir.path()).unwrap();
    let again = BuildContext::scan(dir.path()).unwrap();
    assert_eq!(first.fingerprint(), again.fingerprint());

    fs::write(dir.path().join("app.py"), "print('changed')\n").unwrap();
    let changed = BuildContext::scan(dir.path()).unwrap();
    assert_ne!(first.fingerprint(), changed.fingerprint());
}

#[test]
fn fingerprint_ignores_dockerignored_files() {
    let dir = python_context(&[
        ("requirements.txt", "flask\n"),
        ("app.py", "print('hello')\n"),
        (".dockerignore", "*.pyc\n**/__pycache__\n.env\n"),
    ]);
    let before = BuildContext::scan(dir.path()).unwrap();

    fs::write(dir.path().join("app.pyc"), [0u8, 1, 2]).unwrap();
    fs::create_dir_all(dir.path().join("pkg/__pycache__")).unwrap();
    fs::write(dir.path().join("pkg/__pycache__/mod.pyc"), [3u8]).unwrap();
    fs::write(dir.path().join(".env"), "SECRET=1\n").unwrap();
    let after = BuildContext::scan(dir.path()).unwrap();

    assert_eq!(before.fingerprint(), after.fingerprint());
    assert!(!after.contains("app.pyc"));
    assert!(after.contains(".dockerignore"));
}

#[test]
fn nested_files_use_forward_slashes() {
    let dir = python_context(&[("requirements.txt", ""), ("static/js/map.js", "")]);
    let context = BuildContext::scan(dir.path()).unwrap();
    assert!(context.contains("static/js/map.js"));
}

#[test]
fn scan_rejects_non_directory() {
    let dir = valid_python_context();
    let err = BuildContext::scan(dir.path().join("app.py")).unwrap_err();
    assert!(matches!(err, PolioError::InvalidContext { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn build_aborts_before_docker_on_missing_requirements() {
    let dir = python_context(&[("app.py", "")]);
    let context = BuildContext::scan(dir.path()).unwrap();

    // `true` would report success, so the error has to come from validation
    let builder = ImageBuilder::new("true");
    let err = builder
        .build_image(&ContainerDescriptor::python_app(), &context, "polio:test", &BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PolioError::MissingContextFile { .. }));
}

#[cfg(unix)]
#[tokio::test]
async fn build_returns_fingerprint_and_warning() {
    let dir = python_context(&[("requirements.txt", "flask\n")]);
    let context = BuildContext::scan(dir.path()).unwrap();

    let built = ImageBuilder::new("true")
        .build_image(&ContainerDescriptor::python_app(), &context, "polio:test", &BuildOptions { no_cache: true })
        .await
        .unwrap();
    assert_eq!(built.tag, "polio:test");
    assert_eq!(built.context_fingerprint, context.fingerprint());
    assert_eq!(built.missing_entrypoint.as_deref(), Some("app.py"));
    assert_eq!(CONTEXT_LABEL, "polio.context-sha256");
}

#[cfg(unix)]
#[tokio::test]
async fn failed_docker_build_is_an_error() {
    let dir = valid_python_context();
    let context = BuildContext::scan(dir.path()).unwrap();

    let err = ImageBuilder::new("false")
        .build_image(&ContainerDescriptor::python_app(), &context, "polio:test", &BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PolioError::DockerError { .. }));
}

#[tokio::test]
async fn missing_docker_binary_is_an_error() {
    let dir = valid_python_context();
    let context = BuildContext::scan(dir.path()).unwrap();

    let err = ImageBuilder::new("polio-no-such-docker-binary")
        .build_image(&ContainerDescriptor::python_app(), &context, "polio:test", &BuildOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PolioError::DockerError { .. }));
}

#[test]
fn repository_dockerfile_is_the_rendered_descriptor() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let dockerfile = fs::read_to_string(repo_root.join("Dockerfile")).unwrap();
    assert_eq!(dockerfile, ContainerDescriptor::polio_api().render());

    for required in &ContainerDescriptor::polio_api().required_files {
        assert!(repo_root.join(required).is_file(), "{required} missing from repository");
    }
}

fn minor_version(version: &str) -> (u32, u32) {
    let mut parts = version.split('.').map(|p| p.parse::<u32>().unwrap());
    (parts.next().unwrap(), parts.next().unwrap())
}

#[test]
fn builder_toolchain_meets_workspace_rust_version() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let manifest = fs::read_to_string(repo_root.join("Cargo.toml")).unwrap();
    let required = manifest
        .lines()
        .find_map(|line| line.trim().strip_prefix("rust-version = \""))
        .and_then(|rest| rest.strip_suffix('"'))
        .expect("workspace rust-version");

    let toolchain = BUILDER_IMAGE
        .strip_prefix("rust:")
        .and_then(|tag| tag.split('-').next())
        .unwrap();
    assert!(minor_version(toolchain) >= minor_version(required), "{BUILDER_IMAGE} is older than {required}");
    assert!(ContainerDescriptor::polio_api().render().starts_with(&format!("FROM {BUILDER_IMAGE} AS builder\n")));
}

#[test]
fn repository_context_ships_the_lockfile() {
    let repo_root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let rules = IgnoreRules::parse(&fs::read_to_string(repo_root.join(".dockerignore")).unwrap());
    assert!(!rules.is_ignored("Cargo.lock"));
    assert!(!rules.is_ignored("Cargo.toml"));
    assert!(rules.is_ignored("target/release/polio-api-server"));
}
