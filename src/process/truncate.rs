// src/process/truncate.rs

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
};
use tracing::{debug, info, instrument};

use crate::error::PipelineError;
use crate::process::utils::contains_bytes;

/// What a truncation pass kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TruncateSummary {
    /// Lines copied to the output.
    pub lines_kept: usize,
    /// 1-based line number of the first line containing the sentinel.
    pub sentinel_line: Option<usize>,
}

/// Copy lines from `reader` to `writer` until the first line containing
/// `sentinel`. That line and everything after it are discarded.
///
/// Lines are copied byte-for-byte, terminators included, so the output is
/// always a prefix of the input.
pub fn truncate_at_sentinel<R: BufRead, W: Write>(
    reader: R,
    writer: W,
    sentinel: &str,
) -> io::Result<TruncateSummary> {
    copy_lines(reader, writer, Some(sentinel.as_bytes()))
}

fn copy_lines<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    sentinel: Option<&[u8]>,
) -> io::Result<TruncateSummary> {
    let mut summary = TruncateSummary::default();
    let mut line = Vec::with_capacity(256);

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if let Some(needle) = sentinel {
            if contains_bytes(&line, needle) {
                summary.sentinel_line = Some(summary.lines_kept + 1);
                break;
            }
        }
        writer.write_all(&line)?;
        summary.lines_kept += 1;
    }

    writer.flush()?;
    Ok(summary)
}

/// File wrapper around [`truncate_at_sentinel`]. Writes `destination` via a
/// temporary sibling and renames it into place; `source` is never modified.
/// A `None` sentinel copies the whole file.
#[instrument(level = "info", skip_all, fields(source = %source.display()))]
pub fn truncate_file(
    source: &Path,
    destination: &Path,
    sentinel: Option<&str>,
) -> Result<TruncateSummary, PipelineError> {
    let input = File::open(source).map_err(|e| PipelineError::io(source, e))?;

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let tmp_path = destination.with_extension("tmp");
    let output = File::create(&tmp_path).map_err(|e| PipelineError::io(&tmp_path, e))?;

    let summary = match copy_lines(
        BufReader::new(input),
        BufWriter::new(output),
        sentinel.map(str::as_bytes),
    ) {
        Ok(summary) => summary,
        Err(e) => {
            let _ = fs::remove_file(&tmp_path);
            return Err(PipelineError::io(source, e));
        }
    };

    fs::rename(&tmp_path, destination).map_err(|e| PipelineError::io(destination, e))?;

    match summary.sentinel_line {
        Some(line) => info!(
            kept = summary.lines_kept,
            sentinel_line = line,
            "truncated trailing report section"
        ),
        None => debug!(kept = summary.lines_kept, "no sentinel found, copied whole file"),
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn run(input: &str, sentinel: &str) -> Result<(String, TruncateSummary)> {
        let mut out = Vec::new();
        let summary = truncate_at_sentinel(Cursor::new(input.as_bytes()), &mut out, sentinel)?;
        Ok((String::from_utf8(out)?, summary))
    }

    #[test]
    fn stops_before_first_sentinel_line() -> Result<()> {
        let (out, summary) = run("A,B\n1,2\nDOM,x,y\n3,4\n", "DOM")?;
        assert_eq!(out, "A,B\n1,2\n");
        assert_eq!(summary.lines_kept, 2);
        assert_eq!(summary.sentinel_line, Some(3));
        Ok(())
    }

    #[test]
    fn copies_everything_without_sentinel() -> Result<()> {
        let input = "A,B\r\n1,2\r\n3,4";
        let (out, summary) = run(input, "Delivery")?;
        assert_eq!(out, input);
        assert_eq!(summary.lines_kept, 3);
        assert_eq!(summary.sentinel_line, None);
        Ok(())
    }

    #[test]
    fn sentinel_inside_data_row_also_truncates() -> Result<()> {
        let (out, _) = run("Well,Note\nW1,Delivery late\nW2,ok\n", "Delivery")?;
        assert_eq!(out, "Well,Note\n");
        Ok(())
    }

    #[test]
    fn output_is_prefix_of_input() -> Result<()> {
        let inputs = [
            "h\nDelivery\n",
            "h\na\nb\n",
            "Delivery first\nh\n",
            "",
            "h\na\nDeliveryDelivery\nDelivery\n",
        ];
        for input in inputs {
            let (out, summary) = run(input, "Delivery")?;
            assert!(input.starts_with(&out), "{out:?} not a prefix of {input:?}");
            assert!(!out.contains("Delivery"));
            assert_eq!(out.lines().count(), summary.lines_kept);
        }
        Ok(())
    }

    #[test]
    fn truncate_file_writes_new_artifact() -> Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("Well Water Depth.csv");
        let dest = dir.path().join("staging").join("cleaned.csv");
        fs::write(&source, "A,B\n1,2\nDelivery Date:,x\n")?;

        let summary = truncate_file(&source, &dest, Some("Delivery"))?;

        assert_eq!(summary.lines_kept, 2);
        assert_eq!(fs::read_to_string(&dest)?, "A,B\n1,2\n");
        assert_eq!(fs::read_to_string(&source)?, "A,B\n1,2\nDelivery Date:,x\n");
        Ok(())
    }

    #[test]
    fn truncate_file_without_sentinel_copies() -> Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("meter.csv");
        let dest = dir.path().join("meter_clean.csv");
        fs::write(&source, "A\n1\n")?;

        let summary = truncate_file(&source, &dest, None)?;
        assert_eq!(summary.lines_kept, 2);
        assert_eq!(fs::read_to_string(&dest)?, "A\n1\n");
        Ok(())
    }

    #[test]
    fn missing_source_is_io_error() {
        let dir = tempdir().expect("tempdir");
        let err = truncate_file(
            &dir.path().join("absent.csv"),
            &dir.path().join("out.csv"),
            Some("Delivery"),
        )
        .unwrap_err();
        assert_eq!(err.code(), "IOError");
    }

    #[cfg(unix)]
    #[test]
    fn failed_copy_leaves_no_temp_file() -> Result<()> {
        let dir = tempdir()?;
        // opening a directory succeeds, reading it does not
        let unreadable = dir.path().join("raw");
        fs::create_dir(&unreadable)?;
        let out = dir.path().join("out.csv");

        let err = truncate_file(&unreadable, &out, Some("Delivery")).unwrap_err();
        assert_eq!(err.code(), "IOError");
        assert!(!out.with_extension("tmp").exists());
        assert!(!out.exists());
        Ok(())
    }
}
