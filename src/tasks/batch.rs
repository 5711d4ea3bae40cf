use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use crate::buffer::PixelBuffer;
use crate::config::ProcessingOptions;
use crate::error::Error;
use crate::pipeline::ImageProcessor;
use crate::surface::{PixelSurface, Source};

/// Process `sources` one after another with a single request in flight.
///
/// A failing item records its error and the batch moves on.
#[instrument(skip_all, fields(count = sources.len()))]
pub async fn run<S: PixelSurface>(
    processor: &mut ImageProcessor<S>,
    sources: &[Source],
    options: &ProcessingOptions,
) -> Vec<Result<PixelBuffer, Error>> {
    let mut results = Vec::with_capacity(sources.len());
    for (index, source) in sources.iter().enumerate() {
        let result = processor.process(source, options).await;
        match &result {
            Ok(buffer) => info!(
                index,
                width = buffer.width(),
                height = buffer.height(),
                "batch item processed"
            ),
            Err(err) => warn!(index, error = %err, "batch item failed"),
        }
        results.push(result);
    }
    results
}

/// Recursively collect image files under `root`, sorted for a stable order.
pub fn collect_images(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|p| is_image(p))
        .collect();
    found.sort();
    found
}

/// Map each input under `root` to a PNG under `out`, mirroring subdirectories.
///
/// An input whose target was already claimed by an earlier one (for example
/// `a.jpg` next to `a.png`) gets [`Error::OutputCollision`] instead of
/// silently overwriting it.
pub fn output_targets(
    root: &Path,
    inputs: &[PathBuf],
    out: &Path,
) -> Vec<Result<PathBuf, Error>> {
    let mut claimed = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let relative = match input.strip_prefix(root) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel,
                _ => Path::new(input.file_name().unwrap_or_default()),
            };
            let target = out.join(relative).with_extension("png");
            if claimed.insert(target.clone()) {
                Ok(target)
            } else {
                Err(Error::OutputCollision(target))
            }
        })
        .collect()
}

fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if ["jpg", "jpeg", "png", "webp", "gif"].contains(&e.as_str())
    )
}
