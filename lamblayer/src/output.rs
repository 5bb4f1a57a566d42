//! Output formatting for the CLI.
//!
//! Covers the dry-run plan shown by `create --dry-run` and the summary line
//! printed after a layer version is published.

use crate::create::{ContentPlan, CreatePlan};
use crate::publish::PublishedLayer;
use std::path::Path;

/// Dry-run information for a create invocation.
///
/// # Example
///
/// ```
/// use std::path::{Path, PathBuf};
/// use lamblayer::config::LayerConfig;
/// use lamblayer::create::{ContentPlan, CreatePlan};
/// use lamblayer::output::DryRunInfo;
///
/// let plan = CreatePlan {
///     layer: LayerConfig {
///         name: "my-layer".to_owned(),
///         description: None,
///         compatible_runtimes: vec!["python3.12".to_owned()],
///         license_info: None,
///     },
///     content: ContentPlan::Directory {
///         path: PathBuf::from("deps"),
///         entry_prefix: "python/".to_owned(),
///     },
/// };
///
/// let info = DryRunInfo {
///     layer_config: Path::new("layer.json"),
///     region: Some("us-east-1"),
///     plan: &plan,
/// };
/// let output = info.display_text();
/// assert!(output.contains("Dry run"));
/// assert!(output.contains("my-layer"));
/// ```
#[derive(Debug)]
pub struct DryRunInfo<'a> {
    /// Path to the layer config file.
    pub layer_config: &'a Path,
    /// Region the layer would be published to, when known without a session.
    pub region: Option<&'a str>,
    /// Resolved plan.
    pub plan: &'a CreatePlan,
}

impl DryRunInfo<'_> {
    /// Format the dry-run information for display.
    #[must_use]
    pub fn display_text(&self) -> String {
        let layer = &self.plan.layer;
        let mut lines = vec![
            "Dry run - no layer will be published".to_owned(),
            String::new(),
            format!("Layer config: {}", self.layer_config.display()),
            format!("Layer name: {}", layer.name),
            format!("Region: {}", self.region.unwrap_or("(from environment)")),
        ];

        if let Some(description) = &layer.description {
            lines.push(format!("Description: {description}"));
        }
        lines.push(format!(
            "Compatible runtimes: {}",
            list_or_none(&layer.compatible_runtimes)
        ));
        if let Some(license) = &layer.license_info {
            lines.push(format!("License: {license}"));
        }

        lines.push(String::new());
        match &self.plan.content {
            ContentPlan::Directory { path, entry_prefix } => {
                lines.push(format!("Source directory: {}", path.display()));
                let prefix = if entry_prefix.is_empty() {
                    "(archive root)"
                } else {
                    entry_prefix.as_str()
                };
                lines.push(format!("Archive prefix: {prefix}"));
            }
            ContentPlan::RemoteBuild { spec, request_url } => {
                lines.push(format!("Architecture: {}", spec.arch));
                lines.push(format!("Runtime: {}", spec.runtime));
                lines.push(format!("Packages: {}", spec.packages));
                lines.push(format!("Skip dependencies: {}", spec.skip_dependencies));
                lines.push(format!("Build request: {request_url}"));
            }
        }

        lines.join("\n")
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_owned()
    } else {
        items.join(", ")
    }
}

/// Format the message logged after a successful publish.
#[must_use]
pub fn success_message(layer: &PublishedLayer) -> String {
    format!(
        "published layer version {} ({})",
        layer.version, layer.layer_version_arn
    )
}
