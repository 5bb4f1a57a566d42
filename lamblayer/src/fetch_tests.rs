//! Unit tests for remote package builds.

use super::*;
use mockall::Sequence;
use rstest::rstest;
use std::cell::RefCell;

const PRESIGNED: &str =
    "https://layer-bucket.s3.amazonaws.com/x86_64/python3.12/numpy.zip?X-Amz-Signature=abc";

#[derive(Default)]
struct RecordingSleeper {
    slept: RefCell<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept.borrow_mut().push(duration);
    }
}

fn spec() -> PackageSpec {
    PackageSpec {
        arch: "x86_64".to_owned(),
        runtime: "python3.12".to_owned(),
        packages: "numpy==1.26.4".to_owned(),
        skip_dependencies: false,
    }
}

fn base_url() -> Url {
    Url::parse("https://builds.example.com").expect("valid URL")
}

fn fetch_with(
    service: &MockBuildService,
    sleeper: &RecordingSleeper,
    policy: PollPolicy,
) -> Result<StorageLocation, FetchError> {
    PackageFetcher::new(service, sleeper, base_url(), policy).fetch(&spec())
}

fn ready(content_length: Option<u64>) -> ArtefactStatus {
    ArtefactStatus::Ready { content_length }
}

#[test]
fn request_url_joins_packages_and_flag() {
    let spec = PackageSpec {
        packages: "a&b&c".to_owned(),
        skip_dependencies: true,
        ..spec()
    };
    let url = build_request_url(&base_url(), &spec).expect("request URL");
    assert_eq!(url.path(), "/x86_64/python3.12/a&b&c");
    assert_eq!(url.query(), Some("no-deps=1"));
}

#[test]
fn request_url_keeps_base_path_prefix() {
    let base = Url::parse("https://builds.example.com/api/").expect("valid URL");
    let url = build_request_url(&base, &spec()).expect("request URL");
    assert_eq!(url.path(), "/api/x86_64/python3.12/numpy==1.26.4");
}

#[test]
fn request_url_rejects_cannot_be_base() {
    let base = Url::parse("mailto:builds@example.com").expect("valid URL");
    let result = build_request_url(&base, &spec());
    assert!(matches!(result, Err(FetchError::InvalidServiceUrl { .. })));
}

#[test]
fn ready_on_first_probe_returns_location_without_sleeping() {
    let mut service = MockBuildService::new();
    service
        .expect_request_build()
        .withf(|url| url.path() == "/x86_64/python3.12/numpy==1.26.4")
        .times(1)
        .returning(|_| Ok(format!("{PRESIGNED}\n")));
    service
        .expect_probe()
        .withf(|url| url.host_str() == Some("layer-bucket.s3.amazonaws.com"))
        .times(1)
        .returning(|_| Ok(ready(Some(300))));
    let sleeper = RecordingSleeper::default();

    let location = fetch_with(&service, &sleeper, PollPolicy::default()).expect("location");
    assert_eq!(
        location,
        StorageLocation {
            bucket: "layer-bucket".to_owned(),
            key: "x86_64/python3.12/numpy.zip".to_owned(),
        }
    );
    assert!(sleeper.slept.borrow().is_empty());
}

#[test]
fn pending_probes_back_off_until_ready() {
    let mut service = MockBuildService::new();
    let mut seq = Sequence::new();
    service
        .expect_request_build()
        .returning(|_| Ok(PRESIGNED.to_owned()));
    service
        .expect_probe()
        .times(3)
        .in_sequence(&mut seq)
        .returning(|_| Ok(ArtefactStatus::Pending { status: 403 }));
    service
        .expect_probe()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(ready(Some(4096))));
    let sleeper = RecordingSleeper::default();

    fetch_with(&service, &sleeper, PollPolicy::default()).expect("location");
    assert_eq!(
        *sleeper.slept.borrow(),
        vec![
            Duration::from_secs(5),
            Duration::from_secs(10),
            Duration::from_secs(20),
        ]
    );
}

#[test]
fn never_ready_times_out_after_budget() {
    let mut service = MockBuildService::new();
    service
        .expect_request_build()
        .returning(|_| Ok(PRESIGNED.to_owned()));
    service
        .expect_probe()
        .returning(|_| Ok(ArtefactStatus::Pending { status: 404 }));
    let sleeper = RecordingSleeper::default();
    let policy = PollPolicy::with_timeout(Duration::from_secs(30));

    let result = fetch_with(&service, &sleeper, policy);
    match result {
        Err(FetchError::TimedOut { elapsed }) => assert_eq!(elapsed, Duration::from_secs(30)),
        other => panic!("expected TimedOut, got {other:?}"),
    }
    let total: Duration = sleeper.slept.borrow().iter().sum();
    assert_eq!(total, Duration::from_secs(30));
}

#[test]
fn rejected_build_request_stops_before_polling() {
    let mut service = MockBuildService::new();
    service.expect_request_build().returning(|url| {
        Err(FetchError::BuildRejected {
            url: url.to_string(),
            status: 404,
        })
    });
    service.expect_probe().never();
    let sleeper = RecordingSleeper::default();

    let result = fetch_with(&service, &sleeper, PollPolicy::default());
    assert!(matches!(
        result,
        Err(FetchError::BuildRejected { status: 404, .. })
    ));
}

#[rstest]
#[case::tiny(Some(150))]
#[case::just_under(Some(199))]
#[case::missing(None)]
fn small_artefacts_are_rejected(#[case] content_length: Option<u64>) {
    let mut service = MockBuildService::new();
    service
        .expect_request_build()
        .returning(|_| Ok(PRESIGNED.to_owned()));
    service
        .expect_probe()
        .returning(move |_| Ok(ready(content_length)));
    let sleeper = RecordingSleeper::default();

    let result = fetch_with(&service, &sleeper, PollPolicy::default());
    match result {
        Err(err @ FetchError::ArtefactTooSmall { .. }) => {
            assert!(err.to_string().contains("package name and version"));
        }
        other => panic!("expected ArtefactTooSmall, got {other:?}"),
    }
}

#[rstest]
#[case::at_threshold(200)]
#[case::comfortably_large(300)]
fn plausible_artefacts_are_accepted(#[case] content_length: u64) {
    let mut service = MockBuildService::new();
    service
        .expect_request_build()
        .returning(|_| Ok(PRESIGNED.to_owned()));
    service
        .expect_probe()
        .returning(move |_| Ok(ready(Some(content_length))));
    let sleeper = RecordingSleeper::default();

    assert!(fetch_with(&service, &sleeper, PollPolicy::default()).is_ok());
}

#[test]
fn garbage_presigned_url_is_reported() {
    let mut service = MockBuildService::new();
    service
        .expect_request_build()
        .returning(|_| Ok("<html>oops</html>".to_owned()));
    service.expect_probe().never();
    let sleeper = RecordingSleeper::default();

    let result = fetch_with(&service, &sleeper, PollPolicy::default());
    assert!(matches!(result, Err(FetchError::InvalidPresignedUrl { .. })));
}

#[rstest]
#[case::no_key("https://layer-bucket.s3.amazonaws.com/")]
#[case::no_host("file:///tmp/key.zip")]
fn unusable_presigned_urls_are_rejected(#[case] raw: &str) {
    let url = Url::parse(raw).expect("parseable URL");
    let result = StorageLocation::from_presigned_url(&url);
    assert!(matches!(result, Err(FetchError::InvalidPresignedUrl { .. })));
}

#[test]
fn invalid_presigned_url_error_hides_signature() {
    let url = Url::parse("https://layer-bucket.s3.amazonaws.com/?X-Amz-Signature=secret")
        .expect("parseable URL");
    let err = StorageLocation::from_presigned_url(&url).expect_err("empty key");
    assert!(!err.to_string().contains("secret"));
}

#[test]
fn bucket_is_first_host_label_for_regional_endpoints() {
    let url = Url::parse("https://my-layers.s3.ap-northeast-1.amazonaws.com/python/pkg.zip")
        .expect("parseable URL");
    let location = StorageLocation::from_presigned_url(&url).expect("location");
    assert_eq!(location.bucket, "my-layers");
    assert_eq!(location.key, "python/pkg.zip");
}

#[test]
fn object_key_is_percent_decoded() {
    let url = Url::parse(
        "https://layer-bucket.s3.amazonaws.com/x86_64/python3.12/numpy%3D%3D1.26.4%26pandas.zip?X-Amz-Signature=abc",
    )
    .expect("parseable URL");
    let location = StorageLocation::from_presigned_url(&url).expect("location");
    assert_eq!(location.key, "x86_64/python3.12/numpy==1.26.4&pandas.zip");
}

#[test]
fn object_key_that_is_not_utf8_is_rejected() {
    let url = Url::parse("https://layer-bucket.s3.amazonaws.com/x86_64/%FF.zip")
        .expect("parseable URL");
    let result = StorageLocation::from_presigned_url(&url);
    assert!(matches!(result, Err(FetchError::InvalidPresignedUrl { .. })));
}

#[rstest]
#[case::ok(200)]
#[case::no_content(204)]
fn successful_build_statuses_are_accepted(#[case] status: u16) {
    assert!(check_build_status(&base_url(), status).is_ok());
}

#[rstest]
#[case::not_found(404)]
#[case::redirect(302)]
#[case::server_error(500)]
fn failed_build_statuses_are_rejected(#[case] status: u16) {
    let result = check_build_status(&base_url(), status);
    assert!(matches!(
        result,
        Err(FetchError::BuildRejected { status: got, .. }) if got == status
    ));
}

#[rstest]
#[case::forbidden(403, Some("300"), ArtefactStatus::Pending { status: 403 })]
#[case::no_content(204, Some("300"), ArtefactStatus::Pending { status: 204 })]
#[case::ready(200, Some("300"), ArtefactStatus::Ready { content_length: Some(300) })]
#[case::padded_length(200, Some(" 300 "), ArtefactStatus::Ready { content_length: Some(300) })]
#[case::missing_length(200, None, ArtefactStatus::Ready { content_length: None })]
#[case::garbled_length(200, Some("abc"), ArtefactStatus::Ready { content_length: None })]
fn artefact_status_follows_response(
    #[case] status: u16,
    #[case] content_length: Option<&str>,
    #[case] expected: ArtefactStatus,
) {
    assert_eq!(artefact_status(status, content_length), expected);
}
