use crate::download::DownloadOutcome;
use crate::Result;
use std::fs::File;
use std::path::Path;

/// Optional per-run CSV record of every candidate outcome. Callers that
/// pass no path get a no-op writer so the pipeline code stays branch-free.
pub struct RunManifest {
    writer: Option<csv::Writer<File>>,
}

impl RunManifest {
    pub fn create(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self { writer: None });
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["image_url", "status", "detail"])?;
        Ok(Self {
            writer: Some(writer),
        })
    }

    pub fn record(&mut self, image_url: &str, outcome: &DownloadOutcome) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            let detail = outcome.detail();
            writer.write_record([image_url, outcome.status_label(), detail.as_str()])?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{FailReason, SkipReason};
    use std::path::PathBuf;

    #[test]
    fn records_one_row_per_outcome_plus_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run.csv");

        let mut manifest = RunManifest::create(Some(&path)).expect("create");
        manifest
            .record(
                "https://cdn.example.com/a.jpg",
                &DownloadOutcome::Stored(PathBuf::from("img/cats/a.webp")),
            )
            .expect("record");
        manifest
            .record(
                "https://cdn.example.com/b.jpg",
                &DownloadOutcome::Skipped(SkipReason::Duplicate),
            )
            .expect("record");
        manifest
            .record(
                "https://cdn.example.com/c.jpg",
                &DownloadOutcome::Failed(FailReason::Status(404)),
            )
            .expect("record");
        manifest.finish().expect("finish");

        let contents = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "image_url,status,detail");
        assert!(lines[1].contains("stored"));
        assert!(lines[2].contains("skipped_duplicate"));
        assert!(lines[3].contains("failed_status"));
        assert!(lines[3].contains("404"));
    }

    #[test]
    fn without_a_path_nothing_is_written() {
        let mut manifest = RunManifest::create(None).expect("create");
        manifest
            .record(
                "https://cdn.example.com/a.jpg",
                &DownloadOutcome::Skipped(SkipReason::Canceled),
            )
            .expect("record");
        manifest.finish().expect("finish");
    }
}
