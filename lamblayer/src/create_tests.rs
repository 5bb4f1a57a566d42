//! Tests for the create workflow.

use super::*;
use crate::fetch::{ArtefactStatus, MockBuildService, StorageLocation};
use crate::poll::{PollPolicy, Sleeper};
use crate::publish::MockLayerPublisher;
use rstest::{fixture, rstest};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const PRESIGNED: &str =
    "https://layer-bucket.s3.amazonaws.com/x86_64/python3.12/numpy.zip?X-Amz-Signature=abc";

struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _: Duration) {}
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    fn scratch(&self) -> PathBuf {
        let path = self.path("scratch");
        fs::create_dir_all(&path).expect("create scratch");
        path
    }
}

#[fixture]
fn workspace() -> Workspace {
    let workspace = Workspace {
        dir: TempDir::new().expect("temp dir"),
    };
    workspace.write(
        "layer.json",
        r#"{"LayerName": "my-layer", "CompatibleRuntimes": ["python3.12"]}"#,
    );
    workspace
}

fn base_url() -> Url {
    Url::parse("https://builder.test").expect("valid url")
}

fn published() -> PublishedLayer {
    PublishedLayer {
        layer_version_arn: "arn:aws:lambda:us-east-1:123456789012:layer:my-layer:3".to_owned(),
        version: 3,
    }
}

fn run(
    workspace: &Workspace,
    service: &MockBuildService,
    publisher: &MockLayerPublisher,
    source: ContentSource,
) -> Result<PublishedLayer> {
    let archiver = Archiver::new(workspace.scratch());
    let fetcher = PackageFetcher::new(service, &NoSleep, base_url(), PollPolicy::default());
    let creator = LayerCreator::new(&archiver, &fetcher, publisher);
    creator.create(&CreateRequest {
        layer_config: workspace.path("layer.json"),
        source,
    })
}

fn packages_source(path: &Path) -> ContentSource {
    ContentSource::Packages {
        spec_path: path.to_path_buf(),
    }
}

#[rstest]
#[case::both(Some("packages.json"), Some("src"))]
#[case::neither(None, None)]
fn from_options_requires_exactly_one_source(
    #[case] packages: Option<&str>,
    #[case] src: Option<&str>,
) {
    let result = ContentSource::from_options(
        packages.map(PathBuf::from),
        src.map(PathBuf::from),
        WrapDirs::default(),
    );
    assert!(
        matches!(result, Err(LamblayerError::InvalidOption { .. })),
        "expected InvalidOption, got {result:?}"
    );
}

#[test]
fn from_options_messages_name_both_flags() {
    let both = ContentSource::from_options(
        Some(PathBuf::from("p")),
        Some(PathBuf::from("s")),
        WrapDirs::default(),
    )
    .expect_err("both set");
    assert_eq!(
        both.to_string(),
        "`--packages` and `--src` cannot be specified at the same time."
    );
    let neither =
        ContentSource::from_options(None, None, WrapDirs::default()).expect_err("neither set");
    assert_eq!(
        neither.to_string(),
        "either `--packages` or `--src` must be specified."
    );
}

#[rstest]
fn directory_source_publishes_inline_zip(workspace: Workspace) {
    let src = workspace.write("deps/handler.py", "print('hi')\n");
    let mut service = MockBuildService::new();
    service.expect_request_build().never();
    service.expect_probe().never();
    let mut publisher = MockLayerPublisher::new();
    publisher
        .expect_publish()
        .withf(|request| {
            request.layer.name == "my-layer"
                && matches!(&request.content, LayerContent::Inline(bytes) if !bytes.is_empty())
        })
        .times(1)
        .returning(|_| Ok(published()));

    let source = ContentSource::Directory {
        path: src.parent().expect("deps dir").to_path_buf(),
        wraps: WrapDirs::new(Some("python"), None),
    };
    let result = run(&workspace, &service, &publisher, source).expect("layer created");

    assert_eq!(result, published());
    let leftovers = fs::read_dir(workspace.path("scratch"))
        .expect("read scratch")
        .count();
    assert_eq!(leftovers, 0);
}

#[rstest]
fn package_source_publishes_stored_bundle(workspace: Workspace) {
    let spec = workspace.write(
        "packages.json",
        r#"{"Arch": "x86_64", "Runtime": "python3.12", "Packages": ["numpy"]}"#,
    );
    let mut service = MockBuildService::new();
    service
        .expect_request_build()
        .withf(|url| url.as_str() == "https://builder.test/x86_64/python3.12/numpy?no-deps=0")
        .times(1)
        .returning(|_| Ok(PRESIGNED.to_owned()));
    service.expect_probe().times(1).returning(|_| {
        Ok(ArtefactStatus::Ready {
            content_length: Some(300),
        })
    });
    let mut publisher = MockLayerPublisher::new();
    publisher
        .expect_publish()
        .withf(|request| {
            request.content
                == LayerContent::Stored(StorageLocation {
                    bucket: "layer-bucket".to_owned(),
                    key: "x86_64/python3.12/numpy.zip".to_owned(),
                })
        })
        .times(1)
        .returning(|_| Ok(published()));

    let result = run(&workspace, &service, &publisher, packages_source(&spec));
    assert_eq!(result.expect("layer created"), published());
}

#[rstest]
fn small_bundle_is_not_published(workspace: Workspace) {
    let spec = workspace.write(
        "packages.json",
        r#"{"Arch": "x86_64", "Runtime": "python3.12", "Packages": "nosuchpkg"}"#,
    );
    let mut service = MockBuildService::new();
    service
        .expect_request_build()
        .returning(|_| Ok(PRESIGNED.to_owned()));
    service.expect_probe().returning(|_| {
        Ok(ArtefactStatus::Ready {
            content_length: Some(150),
        })
    });
    let mut publisher = MockLayerPublisher::new();
    publisher.expect_publish().never();

    let result = run(&workspace, &service, &publisher, packages_source(&spec));
    let err = result.expect_err("bundle too small");
    assert!(matches!(err, LamblayerError::CreateLayer { .. }));
    assert!(err.to_string().contains("package name and version"));
}

#[rstest]
fn rejected_build_is_not_published(workspace: Workspace) {
    let spec = workspace.write(
        "packages.json",
        r#"{"Arch": "x86_64", "Runtime": "python3.12", "Packages": ["numpy"]}"#,
    );
    let mut service = MockBuildService::new();
    service.expect_request_build().returning(|url| {
        Err(crate::fetch::FetchError::BuildRejected {
            url: url.to_string(),
            status: 404,
        })
    });
    service.expect_probe().never();
    let mut publisher = MockLayerPublisher::new();
    publisher.expect_publish().never();

    let result = run(&workspace, &service, &publisher, packages_source(&spec));
    assert!(matches!(result, Err(LamblayerError::CreateLayer { .. })));
}

#[rstest]
fn missing_arch_stops_before_any_request(workspace: Workspace) {
    let spec = workspace.write(
        "packages.json",
        r#"{"Runtime": "python3.12", "Packages": ["numpy"]}"#,
    );
    let mut service = MockBuildService::new();
    service.expect_request_build().never();
    let mut publisher = MockLayerPublisher::new();
    publisher.expect_publish().never();

    let result = run(&workspace, &service, &publisher, packages_source(&spec));
    match result {
        Err(LamblayerError::ParamValidation { param, .. }) => assert_eq!(param, "Arch"),
        other => panic!("expected ParamValidation, got {other:?}"),
    }
}

#[rstest]
fn publish_failure_is_propagated(workspace: Workspace) {
    let src = workspace.write("deps/handler.py", "print('hi')\n");
    let service = MockBuildService::new();
    let mut publisher = MockLayerPublisher::new();
    publisher.expect_publish().returning(|_| {
        Err(LamblayerError::Publish {
            reason: "AccessDeniedException".to_owned(),
        })
    });

    let source = ContentSource::Directory {
        path: src.parent().expect("deps dir").to_path_buf(),
        wraps: WrapDirs::default(),
    };
    let result = run(&workspace, &service, &publisher, source);
    assert!(matches!(result, Err(LamblayerError::Publish { .. })));
}

#[rstest]
fn missing_layer_config_fails_first() {
    let dir = TempDir::new().expect("temp dir");
    let service = MockBuildService::new();
    let publisher = MockLayerPublisher::new();
    let archiver = Archiver::new(dir.path());
    let fetcher = PackageFetcher::new(&service, &NoSleep, base_url(), PollPolicy::default());
    let creator = LayerCreator::new(&archiver, &fetcher, &publisher);

    let result = creator.create(&CreateRequest {
        layer_config: dir.path().join("layer.json"),
        source: ContentSource::Directory {
            path: dir.path().to_path_buf(),
            wraps: WrapDirs::default(),
        },
    });
    assert!(matches!(result, Err(LamblayerError::ConfigRead { .. })));
}

#[rstest]
fn plan_resolves_build_url(workspace: Workspace) {
    let spec = workspace.write(
        "packages.json",
        r#"{"Arch": "arm64", "Runtime": "python3.11", "Packages": ["a", "b"], "No_deps": 1}"#,
    );
    let plan = plan(
        &CreateRequest {
            layer_config: workspace.path("layer.json"),
            source: packages_source(&spec),
        },
        &base_url(),
    )
    .expect("plan");

    assert_eq!(plan.layer.name, "my-layer");
    match plan.content {
        ContentPlan::RemoteBuild { request_url, spec } => {
            assert_eq!(
                request_url.as_str(),
                "https://builder.test/arm64/python3.11/a&b?no-deps=1"
            );
            assert!(spec.skip_dependencies);
        }
        ContentPlan::Directory { .. } => panic!("expected a remote build plan"),
    }
}

#[rstest]
fn plan_reports_directory_prefix(workspace: Workspace) {
    let plan = plan(
        &CreateRequest {
            layer_config: workspace.path("layer.json"),
            source: ContentSource::Directory {
                path: PathBuf::from("deps"),
                wraps: WrapDirs::new(Some("python"), Some("lib")),
            },
        },
        &base_url(),
    )
    .expect("plan");

    assert_eq!(
        plan.content,
        ContentPlan::Directory {
            path: PathBuf::from("deps"),
            entry_prefix: "python/lib/".to_owned(),
        }
    );
}

#[rstest]
#[case::parent(Some(".."), None)]
#[case::nested(Some("python"), Some("a/b"))]
#[case::absolute(Some("/opt"), None)]
fn plan_rejects_unsafe_wrap_dirs(
    workspace: Workspace,
    #[case] first: Option<&str>,
    #[case] second: Option<&str>,
) {
    let result = plan(
        &CreateRequest {
            layer_config: workspace.path("layer.json"),
            source: ContentSource::Directory {
                path: PathBuf::from("deps"),
                wraps: WrapDirs::new(first, second),
            },
        },
        &base_url(),
    );

    assert!(matches!(
        result,
        Err(LamblayerError::Archive(
            crate::archive::ArchiveError::InvalidWrapDir { .. }
        ))
    ));
}
