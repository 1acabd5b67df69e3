//! File-level smart merge

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use log::info;

use crate::error::{Error, Result};
use super::dedup::{DedupStats, PageRange};
use super::loader::load_file;
use super::session::MergeSession;

/// One input document and the pages to take from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInput {
    pub path: PathBuf,
    /// Inclusive 1-based page range; the whole document when `None`
    pub range: Option<PageRange>,
}

impl MergeInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MergeInput { path: path.into(), range: None }
    }

    pub fn with_range(mut self, range: PageRange) -> Self {
        self.range = Some(range);
        self
    }
}

/// Parses `PATH`, `PATH:N` or `PATH:FIRST-LAST`.
impl FromStr for MergeInput {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some((path, range)) = s.rsplit_once(':') {
            let looks_like_range = !range.is_empty()
                && range.chars().all(|c| c.is_ascii_digit() || c == '-');
            if !path.is_empty() && looks_like_range {
                return Ok(MergeInput::new(path).with_range(range.parse()?));
            }
        }
        Ok(MergeInput::new(s))
    }
}

/// Options for merging PDFs
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Input documents in the order they should be merged
    pub inputs: Vec<MergeInput>,
    /// Output PDF file path
    pub output_path: PathBuf,
}

/// Size and page contribution of one merged input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSummary {
    pub path: PathBuf,
    pub size: u64,
    pub pages: usize,
}

/// What a merge produced
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub inputs: Vec<InputSummary>,
    pub output_path: Option<PathBuf>,
    pub output_size: u64,
    pub page_count: usize,
    pub stats: DedupStats,
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.inputs.len();
        let same_file = self.inputs.windows(2).all(|pair| pair[0].path == pair[1].path);
        match self.inputs.first() {
            Some(first) if same_file => writeln!(
                f,
                "Merged {} {} of file {} of size {} bytes.",
                count,
                if count > 1 { "copies" } else { "copy" },
                first.path.display(),
                first.size
            )?,
            _ => {
                writeln!(f, "Merged {} files:", count)?;
                for input in &self.inputs {
                    writeln!(
                        f,
                        "  {} ({} pages, {} bytes)",
                        input.path.display(),
                        input.pages,
                        input.size
                    )?;
                }
            }
        }

        let output = self
            .output_path
            .as_ref()
            .map_or_else(|| "<stream>".to_string(), |path| path.display().to_string());
        writeln!(
            f,
            "Resulting file {} is of size {} bytes ({} pages).",
            output, self.output_size, self.page_count
        )?;
        write!(
            f,
            "{} objects copied, {} shared resources reused.",
            self.stats.copied, self.stats.reused
        )
    }
}

/// Merge the inputs into a PDF written to `target`.
///
/// Each input is loaded, merged and dropped before the next one is read.
/// Nothing is written unless every input merged successfully.
pub fn merge_to_writer<W: Write>(inputs: &[MergeInput], target: &mut W) -> Result<MergeReport> {
    let (bytes, mut report) = merge_in_memory(inputs)?;
    target.write_all(&bytes)?;
    report.output_size = bytes.len() as u64;
    Ok(report)
}

/// Merge multiple PDF files into a single PDF, sharing identical resources
///
/// The output is first written to a temporary file next to `output_path` and
/// renamed into place, so a failed merge never leaves a partial file.
///
/// # Example
///
/// ```no_run
/// use pdf_smart_merge::pdf::{MergeInput, MergeOptions, merge_pdfs};
/// use std::path::PathBuf;
///
/// let options = MergeOptions {
///     inputs: vec![
///         MergeInput::new("1. first.pdf"),
///         "2. second.pdf:2-3".parse().unwrap(),
///     ],
///     output_path: PathBuf::from("merged.pdf"),
/// };
///
/// let report = merge_pdfs(&options).expect("Failed to merge");
/// println!("{}", report);
/// ```
pub fn merge_pdfs(options: &MergeOptions) -> Result<MergeReport> {
    let (bytes, mut report) = merge_in_memory(&options.inputs)?;
    write_atomically(&options.output_path, &bytes)?;
    report.output_path = Some(options.output_path.clone());
    report.output_size = bytes.len() as u64;
    info!("Wrote {} ({} bytes)", options.output_path.display(), bytes.len());
    Ok(report)
}

fn merge_in_memory(inputs: &[MergeInput]) -> Result<(Vec<u8>, MergeReport)> {
    if inputs.is_empty() {
        return Err(Error::NoDocuments);
    }

    // Validate all input files exist
    for input in inputs {
        if !input.path.exists() {
            return Err(Error::FileNotFound(input.path.clone()));
        }
    }

    let mut session = MergeSession::new();
    let mut summaries = Vec::with_capacity(inputs.len());
    for input in inputs {
        let size = std::fs::metadata(&input.path)?.len();
        let graph = load_file(&input.path)?;
        let pages = session.merge(&graph, input.range)?;
        summaries.push(InputSummary { path: input.path.clone(), size, pages });
    }

    let bytes = session.finalize()?;
    let report = MergeReport {
        inputs: summaries,
        output_path: None,
        output_size: bytes.len() as u64,
        page_count: session.page_count(),
        stats: session.stats(),
    };
    session.close();
    Ok((bytes, report))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_input_parsing() {
        assert_eq!("a.pdf".parse::<MergeInput>(), Ok(MergeInput::new("a.pdf")));
        assert_eq!(
            "a.pdf:2-3".parse::<MergeInput>(),
            Ok(MergeInput::new("a.pdf").with_range(PageRange::new(2, 3)))
        );
        assert_eq!(
            "dir/b.pdf:4".parse::<MergeInput>(),
            Ok(MergeInput::new("dir/b.pdf").with_range(PageRange::new(4, 4)))
        );
        assert_eq!("C:\\docs\\c.pdf".parse::<MergeInput>(), Ok(MergeInput::new("C:\\docs\\c.pdf")));
        assert!("a.pdf:3-x".parse::<MergeInput>().is_ok_and(|input| input.range.is_none()));
    }

    #[test]
    fn test_merge_empty_input_list() {
        let options = MergeOptions {
            inputs: vec![],
            output_path: PathBuf::from("merged.pdf"),
        };
        assert!(matches!(merge_pdfs(&options), Err(Error::NoDocuments)));
    }

    #[test]
    fn test_merge_nonexistent_file() {
        let result = merge_to_writer(&[MergeInput::new("nonexistent.pdf")], &mut Vec::new());
        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    #[test]
    fn test_report_for_copies() {
        let input = InputSummary { path: PathBuf::from("in.pdf"), size: 1000, pages: 10 };
        let report = MergeReport {
            inputs: vec![input.clone(), input.clone(), input],
            output_path: Some(PathBuf::from("Merged-3.pdf")),
            output_size: 1500,
            page_count: 30,
            stats: DedupStats { documents: 3, copied: 40, reused: 20 },
        };
        let text = report.to_string();
        assert!(text.starts_with("Merged 3 copies of file in.pdf of size 1000 bytes."));
        assert!(text.contains("Resulting file Merged-3.pdf is of size 1500 bytes (30 pages)."));
    }
}
