//! Remote dependency bundle builds.
//!
//! For `--packages` layers the zip is not built locally. The package spec is
//! sent to a remote build service, which answers with a pre-signed storage
//! URL where the bundle will appear once the build has finished. The fetcher
//! polls that URL until it answers `200`, checks the bundle is plausibly
//! sized, and turns the URL into a bucket/key pair that the publish call can
//! reference directly. No archive bytes are downloaded.
//!
//! HTTP access sits behind the [`BuildService`] trait so tests can script
//! service responses without network access.

use crate::config::PackageSpec;
use crate::poll::{PollPolicy, Sleeper};
use log::{debug, info};
use percent_encoding::percent_decode_str;
use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

/// Default base URL of the remote build service.
pub const DEFAULT_BUILD_SERVICE_URL: &str = "https://layerzip.higuchi.work";

/// Bundles smaller than this are treated as failed builds.
pub const MIN_ARTEFACT_BYTES: u64 = 200;

/// Network timeout for a single build service request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// State of the artefact behind a pre-signed URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtefactStatus {
    /// The URL answered `200`; the bundle exists.
    Ready {
        /// Value of the `Content-Length` header, when present and numeric.
        content_length: Option<u64>,
    },
    /// Any other status; the build is still running.
    Pending {
        /// HTTP status returned by the probe.
        status: u16,
    },
}

/// Storage location of a remotely built bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLocation {
    /// Bucket holding the bundle.
    pub bucket: String,
    /// Object key of the bundle within the bucket.
    pub key: String,
}

impl StorageLocation {
    /// Recover the bucket and key from a virtual-hosted-style pre-signed URL.
    ///
    /// The bucket is the first label of the host and the key is the
    /// percent-decoded URL path without its leading `/`, so a key such as
    /// `numpy==1.26.4&pandas.zip` comes back as the service wrote it. The
    /// query string carrying the signature is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidPresignedUrl`] when the URL has no host,
    /// an empty path, or a path that does not decode to UTF-8.
    ///
    /// # Examples
    ///
    /// ```
    /// use url::Url;
    /// use lamblayer::fetch::StorageLocation;
    ///
    /// let url = Url::parse(
    ///     "https://layer-bucket.s3.amazonaws.com/x86_64/python3.12/numpy.zip?X-Amz-Signature=abc",
    /// )
    /// .expect("valid URL");
    /// let location = StorageLocation::from_presigned_url(&url).expect("bucket and key");
    /// assert_eq!(location.bucket, "layer-bucket");
    /// assert_eq!(location.key, "x86_64/python3.12/numpy.zip");
    /// ```
    pub fn from_presigned_url(url: &Url) -> Result<Self, FetchError> {
        let invalid = |reason: &str| FetchError::InvalidPresignedUrl {
            url: redact_query(url),
            reason: reason.to_owned(),
        };
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let bucket = host
            .split('.')
            .next()
            .filter(|label| !label.is_empty())
            .ok_or_else(|| invalid("host has no bucket label"))?;
        let segments = url
            .path_segments()
            .ok_or_else(|| invalid("missing object key"))?;
        let key = segments
            .map(|segment| percent_decode_str(segment).decode_utf8().map(Cow::into_owned))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid("object key is not valid UTF-8"))?
            .join("/");
        if key.is_empty() {
            return Err(invalid("missing object key"));
        }
        Ok(Self {
            bucket: bucket.to_owned(),
            key,
        })
    }
}

/// Errors arising from remote package builds.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The HTTP request could not be completed.
    #[error("request to {url} failed: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The build service rejected the build request.
    #[error("build service returned HTTP {status} for {url}")]
    BuildRejected {
        /// The request URL.
        url: String,
        /// The non-2xx status code.
        status: u16,
    },

    /// A request URL could not be assembled from the package spec.
    #[error("invalid build service URL {base}: {reason}")]
    InvalidServiceUrl {
        /// The configured base URL.
        base: String,
        /// Description of the problem.
        reason: String,
    },

    /// The pre-signed URL returned by the service is unusable.
    #[error("invalid pre-signed URL {url}: {reason}")]
    InvalidPresignedUrl {
        /// The URL with its query string removed.
        url: String,
        /// Description of the problem.
        reason: String,
    },

    /// The finished bundle is too small to be a real build.
    #[error(
        "built package is implausibly small ({}); please check the package name and version again",
        describe_length(.content_length)
    )]
    ArtefactTooSmall {
        /// The reported `Content-Length`, if any.
        content_length: Option<u64>,
    },

    /// The build did not finish within the poll policy's timeout.
    #[error("gave up waiting for the package build after {}s", .elapsed.as_secs())]
    TimedOut {
        /// Time spent waiting.
        elapsed: Duration,
    },
}

fn describe_length(content_length: &Option<u64>) -> String {
    content_length.map_or_else(
        || "no Content-Length".to_owned(),
        |length| format!("{length} bytes"),
    )
}

/// Transport to the remote build service and the storage it writes to.
#[cfg_attr(test, mockall::automock)]
pub trait BuildService {
    /// Request a build and return the pre-signed URL from the response body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::BuildRejected`] for a non-2xx response and
    /// [`FetchError::Http`] when the request cannot be completed.
    fn request_build(&self, url: &Url) -> Result<String, FetchError>;

    /// Probe the pre-signed URL for the finished bundle.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] when the request cannot be completed.
    fn probe(&self, url: &Url) -> Result<ArtefactStatus, FetchError>;
}

/// [`BuildService`] backed by a shared `ureq` agent.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpBuildService;

impl BuildService for HttpBuildService {
    fn request_build(&self, url: &Url) -> Result<String, FetchError> {
        let mut response = http_agent()
            .get(url.as_str())
            .call()
            .map_err(|e| http_error(url, &e))?;
        check_build_status(url, response.status().as_u16())?;
        response
            .body_mut()
            .read_to_string()
            .map_err(|e| http_error(url, &e))
    }

    fn probe(&self, url: &Url) -> Result<ArtefactStatus, FetchError> {
        let response = http_agent()
            .get(url.as_str())
            .call()
            .map_err(|e| http_error(url, &e))?;
        let content_length = response
            .headers()
            .get(ureq::http::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok());
        Ok(artefact_status(response.status().as_u16(), content_length))
    }
}

/// Any non-2xx answer to a build request is a rejection.
fn check_build_status(url: &Url, status: u16) -> Result<(), FetchError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    Err(FetchError::BuildRejected {
        url: url.to_string(),
        status,
    })
}

/// Only a `200` means the bundle exists; every other status keeps polling.
///
/// An absent or unparseable `Content-Length` yields `Ready` with no length.
fn artefact_status(status: u16, content_length: Option<&str>) -> ArtefactStatus {
    if status != 200 {
        return ArtefactStatus::Pending { status };
    }
    ArtefactStatus::Ready {
        content_length: content_length.and_then(|value| value.trim().parse().ok()),
    }
}

/// Shared `ureq` agent that reports HTTP statuses instead of failing on them.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build();
        ureq::Agent::new_with_config(config)
    })
}

fn http_error(url: &Url, err: &ureq::Error) -> FetchError {
    FetchError::Http {
        url: redact_query(url),
        reason: err.to_string(),
    }
}

/// Render a URL without its query string so signatures stay out of logs.
fn redact_query(url: &Url) -> String {
    let mut redacted = url.clone();
    redacted.set_query(None);
    redacted.to_string()
}

/// Assemble `<base>/<arch>/<runtime>/<packages>?no-deps=<0|1>`.
///
/// # Errors
///
/// Returns [`FetchError::InvalidServiceUrl`] when `base` cannot carry path
/// segments (for example a `data:` URL).
///
/// # Examples
///
/// ```
/// use url::Url;
/// use lamblayer::config::PackageSpec;
/// use lamblayer::fetch::build_request_url;
///
/// let spec = PackageSpec {
///     arch: "x86_64".to_owned(),
///     runtime: "python3.12".to_owned(),
///     packages: "a&b&c".to_owned(),
///     skip_dependencies: false,
/// };
/// let base = Url::parse("https://builds.example.com").expect("valid URL");
/// let url = build_request_url(&base, &spec).expect("request URL");
/// assert_eq!(url.as_str(), "https://builds.example.com/x86_64/python3.12/a&b&c?no-deps=0");
/// ```
pub fn build_request_url(base: &Url, spec: &PackageSpec) -> Result<Url, FetchError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| FetchError::InvalidServiceUrl {
            base: base.to_string(),
            reason: "URL cannot be a base".to_owned(),
        })?
        .pop_if_empty()
        .extend([spec.arch.as_str(), spec.runtime.as_str(), spec.packages.as_str()]);
    url.query_pairs_mut()
        .clear()
        .append_pair("no-deps", spec.no_deps_param());
    Ok(url)
}

/// Requests remote builds and waits for them to finish.
pub struct PackageFetcher<'a> {
    service: &'a dyn BuildService,
    sleeper: &'a dyn Sleeper,
    base_url: Url,
    policy: PollPolicy,
}

impl<'a> PackageFetcher<'a> {
    /// Create a fetcher against the build service at `base_url`.
    #[must_use]
    pub const fn new(
        service: &'a dyn BuildService,
        sleeper: &'a dyn Sleeper,
        base_url: Url,
        policy: PollPolicy,
    ) -> Self {
        Self {
            service,
            sleeper,
            base_url,
            policy,
        }
    }

    /// The build request URL this fetcher would use for `spec`.
    ///
    /// # Errors
    ///
    /// See [`build_request_url`].
    pub fn request_url(&self, spec: &PackageSpec) -> Result<Url, FetchError> {
        build_request_url(&self.base_url, spec)
    }

    /// Build the bundle for `spec` and return where it was stored.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::BuildRejected`] or [`FetchError::Http`] when the
    /// build request fails, [`FetchError::InvalidPresignedUrl`] when the
    /// service answers with an unusable URL, [`FetchError::TimedOut`] when
    /// the poll budget is exhausted, and [`FetchError::ArtefactTooSmall`]
    /// when the finished bundle is under [`MIN_ARTEFACT_BYTES`].
    pub fn fetch(&self, spec: &PackageSpec) -> Result<StorageLocation, FetchError> {
        let request_url = self.request_url(spec)?;
        debug!("build request: {request_url}");

        let body = self.service.request_build(&request_url)?;
        let presigned = parse_presigned_url(&body)?;
        debug!("pre-signed URL: {}", presigned.as_str());

        let content_length = self.wait_until_ready(&presigned)?;
        if content_length.is_none_or(|length| length < MIN_ARTEFACT_BYTES) {
            return Err(FetchError::ArtefactTooSmall { content_length });
        }

        StorageLocation::from_presigned_url(&presigned)
    }

    fn wait_until_ready(&self, presigned: &Url) -> Result<Option<u64>, FetchError> {
        let mut backoff = self.policy.schedule();
        loop {
            match self.service.probe(presigned)? {
                ArtefactStatus::Ready { content_length } => return Ok(content_length),
                ArtefactStatus::Pending { status } => {
                    debug!("package build pending (HTTP {status})");
                }
            }
            let Some(delay) = backoff.next_delay() else {
                return Err(FetchError::TimedOut {
                    elapsed: backoff.elapsed(),
                });
            };
            self.sleeper.sleep(delay);
            info!(
                "still downloading packages... {}s elapsed",
                backoff.elapsed().as_secs()
            );
        }
    }
}

fn parse_presigned_url(body: &str) -> Result<Url, FetchError> {
    let trimmed = body.trim();
    Url::parse(trimmed).map_err(|e| FetchError::InvalidPresignedUrl {
        url: trimmed.split('?').next().unwrap_or_default().to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;
