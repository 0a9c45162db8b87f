use crate::error::IngestError;
use crate::models::PipelineConfig;
use crate::orchestrator::{IngestionPipeline, IngestionSummary};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Supported manuals under `folder`, recursively, in path order.
pub fn discover_documents(folder: &Path, config: &PipelineConfig) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| config.is_allowed_file(name));

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

pub struct FolderReport {
    pub summaries: Vec<IngestionSummary>,
    pub skipped: Vec<SkippedDocument>,
}

/// Ingests every supported manual under `folder`, one job per file. A
/// failing file is recorded and the rest still run.
pub async fn ingest_folder(
    pipeline: &IngestionPipeline,
    folder: &Path,
    config: &PipelineConfig,
) -> Result<FolderReport, IngestError> {
    let files = discover_documents(folder, config);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no supported manuals found in {}",
            folder.display()
        )));
    }

    let mut summaries = Vec::new();
    let mut skipped = Vec::new();
    for path in files {
        match pipeline.ingest_file(&path).await {
            Ok(summary) => summaries.push(summary),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "skipped manual");
                skipped.push(SkippedDocument {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(FolderReport { summaries, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::extractor::FileExtractor;
    use crate::jobs::InMemoryJobStore;
    use crate::store::ContentStore;
    use crate::stores::{InMemoryRecordStore, InMemoryVectorStore};
    use std::fs::{self, File};
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn discover_documents_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.TXT")).and_then(|mut file| file.write_all(b"text"))?;
        File::create(nested.join("c.docx")).and_then(|mut file| file.write_all(b"skip"))?;

        let files = discover_documents(base, &PipelineConfig::default());
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|path| !path.ends_with("c.docx")));
        Ok(())
    }

    fn pipeline(upload_directory: PathBuf) -> Result<IngestionPipeline, IngestError> {
        let config = PipelineConfig {
            upload_directory,
            ..PipelineConfig::default()
        };
        let content = ContentStore::new(
            Arc::new(InMemoryRecordStore::new()),
            Arc::new(InMemoryVectorStore::new()),
            Arc::new(CharacterNgramEmbedder::default()),
            config,
        )?;
        IngestionPipeline::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(FileExtractor::new(50)),
            Arc::new(content),
        )
    }

    #[tokio::test]
    async fn folder_ingest_fails_without_manuals() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let pipeline = pipeline(dir.path().join("uploads"))?;
        let result = ingest_folder(&pipeline, dir.path(), &PipelineConfig::default()).await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn folder_ingest_skips_unreadable_and_keeps_sources() -> Result<(), Box<dyn std::error::Error>> {
        let source = tempdir()?;
        let uploads = tempdir()?;
        let good = source.path().join("bosch-dishwasher.txt");
        fs::write(
            &good,
            "Maintenance\n\nClean the filter at the bottom of the dishwasher once a month. \
Twist it out, rinse it under running water and lock it back in place.",
        )?;
        fs::write(source.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;

        let pipeline = pipeline(uploads.path().to_path_buf())?;
        let report = ingest_folder(&pipeline, source.path(), &PipelineConfig::default()).await?;

        assert_eq!(report.summaries.len(), 1);
        assert_eq!(report.summaries[0].stored, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            report.skipped[0].path.file_name().and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        assert!(good.exists());
        Ok(())
    }
}
