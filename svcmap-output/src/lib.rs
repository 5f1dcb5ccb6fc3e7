mod csv;
mod json;
mod required;
mod text;
mod traits;

use std::path::{Path, PathBuf};

use svcmap_types::OutputFormat;
use tracing::warn;

pub use csv::CsvFormatter;
pub use json::render_json;
pub use required::RequiredFormatter;
pub use text::TextFormatter;
pub use traits::{OutputError, ReportFormatter};

/// Build the formatter for a streaming-capable format. JSON is not
/// streamable (a JSON array has no append form) and is rendered whole
/// via [`render_json`].
pub fn formatter_for(format: OutputFormat, only_success: bool) -> Option<Box<dyn ReportFormatter>> {
    match format {
        OutputFormat::Text | OutputFormat::Report => {
            Some(Box::new(TextFormatter::new(only_success)))
        }
        OutputFormat::Csv => Some(Box::new(CsvFormatter::new(only_success))),
        OutputFormat::Required => Some(Box::new(RequiredFormatter::new(only_success))),
        OutputFormat::Json => None,
    }
}

/// `<dir>/scan_results.<ext>` for each selected format, dropping
/// later formats that would collide on the same path.
pub fn output_paths(directory: &Path, formats: &[OutputFormat]) -> Vec<(OutputFormat, PathBuf)> {
    let mut paths: Vec<(OutputFormat, PathBuf)> = Vec::new();
    for &format in formats {
        let path = directory.join(format!("scan_results.{}", format.extension()));
        if paths.iter().any(|(_, existing)| *existing == path) {
            warn!(?format, path = %path.display(), "output path already taken, skipping format");
            continue;
        }
        paths.push((format, path));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colliding_txt_formats_keep_first() {
        let paths = output_paths(
            Path::new("/tmp/out"),
            &[OutputFormat::Text, OutputFormat::Required, OutputFormat::Json],
        );
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].0, OutputFormat::Text);
        assert_eq!(paths[1].0, OutputFormat::Json);
    }
}
