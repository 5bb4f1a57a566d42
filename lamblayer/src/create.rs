//! The "create layer" workflow.
//!
//! Reads the layer config, produces the layer contents from either a local
//! directory or a remote package build, and publishes a new layer version:
//!
//! ```text
//! layer config ─┬─ --src ──────► Archiver ──────► inline zip ──┬─► LayerPublisher
//!               └─ --packages ─► PackageFetcher ─► bucket/key ─┘
//! ```
//!
//! Nothing is rolled back on failure. If publishing fails after an archive
//! was built, the archive bytes are dropped.

use crate::archive::{Archiver, WrapDirs};
use crate::config::{LayerConfig, PackageSpec};
use crate::error::{LamblayerError, Result};
use crate::fetch::{PackageFetcher, build_request_url};
use crate::publish::{LayerContent, LayerPublisher, PublishRequest, PublishedLayer};
use log::{debug, info};
use std::path::PathBuf;
use url::Url;

/// Where the layer contents come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Zip a local directory.
    Directory {
        /// Directory whose contents become the layer.
        path: PathBuf,
        /// Directories wrapped around the contents inside the archive.
        wraps: WrapDirs,
    },
    /// Build a dependency bundle remotely from a package spec file.
    Packages {
        /// Path to the package spec file.
        spec_path: PathBuf,
    },
}

impl ContentSource {
    /// Choose the source from the `--packages` and `--src` options.
    ///
    /// Exactly one of the two must be given. Wrap directories only apply to
    /// directory sources and are ignored otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`LamblayerError::InvalidOption`] when both or neither are set.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use lamblayer::archive::WrapDirs;
    /// use lamblayer::create::ContentSource;
    ///
    /// let both = ContentSource::from_options(
    ///     Some(PathBuf::from("packages.json")),
    ///     Some(PathBuf::from("src")),
    ///     WrapDirs::default(),
    /// );
    /// assert!(both.is_err());
    /// ```
    pub fn from_options(
        packages: Option<PathBuf>,
        src: Option<PathBuf>,
        wraps: WrapDirs,
    ) -> Result<Self> {
        match (packages, src) {
            (Some(_), Some(_)) => Err(LamblayerError::invalid_option(
                "`--packages` and `--src` cannot be specified at the same time.",
            )),
            (None, None) => Err(LamblayerError::invalid_option(
                "either `--packages` or `--src` must be specified.",
            )),
            (Some(spec_path), None) => Ok(Self::Packages { spec_path }),
            (None, Some(path)) => Ok(Self::Directory { path, wraps }),
        }
    }
}

/// A validated create invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// Path to the layer config file.
    pub layer_config: PathBuf,
    /// Where the contents come from.
    pub source: ContentSource,
}

/// What a create invocation would do, computed without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePlan {
    /// Parsed layer metadata.
    pub layer: LayerConfig,
    /// Resolved content plan.
    pub content: ContentPlan,
}

/// Content half of a [`CreatePlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPlan {
    /// A local directory will be zipped with this entry prefix.
    Directory {
        /// Source directory.
        path: PathBuf,
        /// Prefix of every archive entry.
        entry_prefix: String,
    },
    /// A remote build will be requested at this URL.
    RemoteBuild {
        /// Parsed package spec.
        spec: PackageSpec,
        /// Build request URL.
        request_url: Url,
    },
}

/// Runs the create workflow against injected collaborators.
pub struct LayerCreator<'a> {
    archiver: &'a Archiver,
    fetcher: &'a PackageFetcher<'a>,
    publisher: &'a dyn LayerPublisher,
}

impl<'a> LayerCreator<'a> {
    /// Assemble a creator from its collaborators.
    #[must_use]
    pub const fn new(
        archiver: &'a Archiver,
        fetcher: &'a PackageFetcher<'a>,
        publisher: &'a dyn LayerPublisher,
    ) -> Self {
        Self {
            archiver,
            fetcher,
            publisher,
        }
    }

    /// Build the layer contents and publish a new version.
    ///
    /// # Errors
    ///
    /// Propagates config, archive, remote build and publish errors. Nothing
    /// is published if any earlier step fails.
    pub fn create(&self, request: &CreateRequest) -> Result<PublishedLayer> {
        let layer = load_layer_config(request)?;
        info!("starting create layer {}", layer.name);

        let content = match &request.source {
            ContentSource::Directory { path, wraps } => {
                info!("creating zip archive from {}", path.display());
                LayerContent::Inline(self.archiver.create_zip(path, wraps)?)
            }
            ContentSource::Packages { spec_path } => {
                info!("creating zip archive");
                let spec = load_package_spec(spec_path)?;
                LayerContent::Stored(self.fetcher.fetch(&spec)?)
            }
        };

        info!("creating layer");
        let published = self.publisher.publish(PublishRequest { layer, content })?;
        info!("created {}", published.layer_version_arn);
        Ok(published)
    }
}

/// Parse configs and resolve what `create` would do, without building or
/// publishing anything.
///
/// # Errors
///
/// Propagates config errors, invalid wrap directory names and request URL
/// construction errors.
pub fn plan(request: &CreateRequest, build_service_url: &Url) -> Result<CreatePlan> {
    let layer = load_layer_config(request)?;
    let content = match &request.source {
        ContentSource::Directory { path, wraps } => {
            wraps.validate()?;
            ContentPlan::Directory {
                path: path.clone(),
                entry_prefix: wraps.entry_prefix(),
            }
        }
        ContentSource::Packages { spec_path } => {
            let spec = load_package_spec(spec_path)?;
            let request_url = build_request_url(build_service_url, &spec)?;
            ContentPlan::RemoteBuild { spec, request_url }
        }
    };
    Ok(CreatePlan { layer, content })
}

fn load_layer_config(request: &CreateRequest) -> Result<LayerConfig> {
    debug!("layer: {}", request.layer_config.display());
    let layer = LayerConfig::load(&request.layer_config)?;
    debug!("layer_name: {}", layer.name);
    debug!("description: {:?}", layer.description);
    debug!("compatible_runtimes: {:?}", layer.compatible_runtimes);
    debug!("license_info: {:?}", layer.license_info);
    Ok(layer)
}

fn load_package_spec(spec_path: &std::path::Path) -> Result<PackageSpec> {
    debug!("packages: {}", spec_path.display());
    let spec = PackageSpec::load(spec_path)?;
    debug!("arch: {}", spec.arch);
    debug!("runtime: {}", spec.runtime);
    debug!("packages: {}", spec.packages);
    debug!("no_deps: {}", spec.no_deps_param());
    Ok(spec)
}

#[cfg(test)]
#[path = "create_tests.rs"]
mod tests;
