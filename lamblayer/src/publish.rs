//! Layer version publishing.
//!
//! [`LayerPublisher`] is the seam between the workflow and the cloud
//! provider. The production implementation, [`LambdaPublisher`], calls
//! `PublishLayerVersion` with either the zip bytes inline or a reference to
//! a bundle already sitting in object storage.

use crate::config::LayerConfig;
use crate::error::{LamblayerError, Result};
use crate::fetch::StorageLocation;
use crate::session::CloudSession;
use aws_sdk_lambda::error::DisplayErrorContext;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{LayerVersionContentInput, Runtime};

/// Where the layer's zip comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum LayerContent {
    /// Zip bytes uploaded with the publish call.
    Inline(Vec<u8>),
    /// Zip already stored in a bucket.
    Stored(StorageLocation),
}

impl std::fmt::Debug for LayerContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
            Self::Stored(location) => f.debug_tuple("Stored").field(location).finish(),
        }
    }
}

/// Everything the publish call needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    /// Layer metadata.
    pub layer: LayerConfig,
    /// Layer contents.
    pub content: LayerContent,
}

/// The layer version created by a publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedLayer {
    /// ARN of the new layer version.
    pub layer_version_arn: String,
    /// Version number assigned by the provider.
    pub version: i64,
}

/// Publishes layer versions.
#[cfg_attr(test, mockall::automock)]
pub trait LayerPublisher {
    /// Create a new layer version.
    ///
    /// # Errors
    ///
    /// Returns [`LamblayerError::Publish`] when the provider rejects the call.
    fn publish(&self, request: PublishRequest) -> Result<PublishedLayer>;
}

/// [`LayerPublisher`] backed by the AWS Lambda API.
#[derive(Debug)]
pub struct LambdaPublisher<'a> {
    session: &'a CloudSession,
    client: aws_sdk_lambda::Client,
}

impl<'a> LambdaPublisher<'a> {
    /// Create a publisher using the session's configuration.
    #[must_use]
    pub fn new(session: &'a CloudSession) -> Self {
        Self {
            session,
            client: aws_sdk_lambda::Client::new(session.sdk_config()),
        }
    }
}

impl LayerPublisher for LambdaPublisher<'_> {
    fn publish(&self, request: PublishRequest) -> Result<PublishedLayer> {
        let PublishRequest { layer, content } = request;
        let runtimes: Vec<Runtime> = layer
            .compatible_runtimes
            .iter()
            .map(|runtime| Runtime::from(runtime.as_str()))
            .collect();

        let call = self
            .client
            .publish_layer_version()
            .layer_name(layer.name)
            .set_description(layer.description)
            .set_compatible_runtimes(Some(runtimes))
            .set_license_info(layer.license_info)
            .content(content_input(content));

        let output = self
            .session
            .block_on(call.send())
            .map_err(|e| LamblayerError::Publish {
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        let layer_version_arn = output
            .layer_version_arn()
            .ok_or_else(|| LamblayerError::Publish {
                reason: "response did not include a layer version ARN".to_owned(),
            })?
            .to_owned();
        Ok(PublishedLayer {
            layer_version_arn,
            version: output.version(),
        })
    }
}

fn content_input(content: LayerContent) -> LayerVersionContentInput {
    match content {
        LayerContent::Inline(bytes) => LayerVersionContentInput::builder()
            .zip_file(Blob::new(bytes))
            .build(),
        LayerContent::Stored(StorageLocation { bucket, key }) => {
            LayerVersionContentInput::builder()
                .s3_bucket(bucket)
                .s3_key(key)
                .build()
        }
    }
}
