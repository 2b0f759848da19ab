use std::io::Write;
use std::path::Path;

use entropypool_core::read_header;

use super::{CommandResult, load_report};

pub fn run(path: &Path, json: bool, header_only: bool, out: &mut dyn Write) -> CommandResult {
    if header_only {
        let header = read_header(path)?;
        if json {
            writeln!(out, "{}", serde_json::to_string_pretty(&header)?)?;
        } else {
            writeln!(
                out,
                "{} {} ({} layout)",
                header.title, header.version, header.layout
            )?;
        }
        return Ok(());
    }

    // Read-only: the access counted by this load is not written back.
    let report = load_report(path)?;
    let summary = report.pool.summary();
    let warnings: Vec<String> = report.warnings.iter().map(ToString::to_string).collect();

    if json {
        let value = serde_json::json!({
            "path": path.display().to_string(),
            "header": report.header,
            "comment": report.comment,
            "pool": summary,
            "warnings": warnings,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        return Ok(());
    }

    let header = &report.header;
    writeln!(out, "{}", path.display())?;
    writeln!(
        out,
        "  format:     {} {} ({} layout)",
        header.title, header.version, header.layout
    )?;
    if let Some(comment) = &report.comment {
        writeln!(out, "  comment:    {comment}")?;
    }
    writeln!(out, "  size:       {} bytes", summary.size)?;
    writeln!(
        out,
        "  entropy:    {}/{} bits available ({} injected, {} extracted)",
        summary.available_bits, summary.capacity_bits, summary.injected_bits, summary.extracted_bits
    )?;
    writeln!(out, "  mixed:      {} times", summary.mix_count)?;
    writeln!(out, "  accessed:   {} times", summary.access_count)?;
    writeln!(out, "  random:     {}", summary.secure_random)?;
    writeln!(out, "  digest:     {}", summary.digest)?;
    writeln!(out, "  cipher:     {}", summary.cipher)?;
    writeln!(out, "  created:    {} ms since epoch", summary.created_at)?;
    for warning in &warnings {
        writeln!(out, "  warning:    {warning}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandError, create};
    use entropypool_core::Layout;

    fn created(dir: &Path, layout: Layout, comment: Option<&str>) -> std::path::PathBuf {
        let path = dir.join("pool.bin");
        let mut args = create::CreateArgs::small(layout);
        args.comment = comment.map(str::to_string);
        create::run(&path, &args, &mut Vec::new()).unwrap();
        path
    }

    #[test]
    fn test_text_report() {
        let tmp = tempfile::tempdir().unwrap();
        let path = created(tmp.path(), Layout::Tagged, Some("bench pool"));
        let mut out = Vec::new();
        run(&path, false, false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("EntropyPool 2.0 Alpha (r1) (tagged layout)"));
        assert!(text.contains("comment:    bench pool"));
        assert!(text.contains("size:       512 bytes"));
        assert!(text.contains("0/4096 bits available"));
        assert!(text.contains("digest:     SHA-256"));
        assert!(!text.contains("warning"));
    }

    #[test]
    fn test_json_report() {
        let tmp = tempfile::tempdir().unwrap();
        let path = created(tmp.path(), Layout::Fixed, None);
        let mut out = Vec::new();
        run(&path, true, false, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["header"]["layout"], "fixed");
        assert_eq!(value["pool"]["size"], 512);
        assert_eq!(value["pool"]["cipher"], "AES");
        assert!(value["comment"].is_null());
        assert_eq!(value["warnings"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_header_only() {
        let tmp = tempfile::tempdir().unwrap();
        let path = created(tmp.path(), Layout::Fixed, None);
        let mut out = Vec::new();
        run(&path, false, true, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "EntropyPool 2.0 Alpha (r1) (fixed layout)\n"
        );
    }

    #[test]
    fn test_info_does_not_count_an_access() {
        let tmp = tempfile::tempdir().unwrap();
        let path = created(tmp.path(), Layout::Tagged, None);
        let before = std::fs::read(&path).unwrap();
        run(&path, false, false, &mut Vec::new()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_missing_pool() {
        let tmp = tempfile::tempdir().unwrap();
        let err = run(&tmp.path().join("none.bin"), false, false, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, CommandError::NoPool(_)));
    }
}
