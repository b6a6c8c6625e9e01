use std::io::{self, Write};

use serde::Serialize;

use crate::app::RunSummary;
use crate::domain::RunMode;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(stdout, "{}", render_summary(summary))
    }
}

pub fn render_summary(summary: &RunSummary) -> String {
    match summary.mode {
        RunMode::Sync => {
            let mut text = format!(
                "{}: {} observations listed, {} archived, {} already present, {} failed; {} images written, {} skipped ({})",
                summary.user,
                summary.listed,
                summary.archived.len(),
                summary.already_present,
                summary.failed.len(),
                summary.images_written,
                summary.images_skipped,
                summary.archive,
            );
            if !summary.failed.is_empty() {
                let failed = summary
                    .failed
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                text.push_str(&format!("\nfailed: {failed}"));
            }
            if summary.interrupted {
                text.push_str("\ninterrupted; run again to archive the rest");
            }
            text
        }
        RunMode::Snapshot if summary.interrupted => format!(
            "{}: interrupted after listing {} observations; no snapshot written ({})",
            summary.user, summary.listed, summary.archive,
        ),
        RunMode::Snapshot => format!(
            "{}: {} of {} observations written to {} ({})",
            summary.user,
            summary.snapshot_records.unwrap_or(0),
            summary.listed,
            summary.snapshot_entry.as_deref().unwrap_or("-"),
            summary.archive,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObservationId;

    fn summary(mode: RunMode) -> RunSummary {
        RunSummary {
            mode,
            user: "dwilderness".to_string(),
            archive: "dwilderness-mo-bkp.zip".to_string(),
            started_at: String::new(),
            finished_at: String::new(),
            listed: 3,
            archived: vec![ObservationId::new(1)],
            already_present: 1,
            failed: vec![ObservationId::new(9)],
            images_written: 4,
            images_skipped: 1,
            snapshot_entry: None,
            snapshot_records: None,
            interrupted: false,
        }
    }

    #[test]
    fn sync_summary_lists_failures() {
        let text = render_summary(&summary(RunMode::Sync));
        assert!(text.contains("3 observations listed, 1 archived, 1 already present, 1 failed"));
        assert!(text.ends_with("failed: 9"));
    }

    #[test]
    fn interrupted_runs_say_so() {
        let mut sync = summary(RunMode::Sync);
        sync.interrupted = true;
        assert!(render_summary(&sync).ends_with("interrupted; run again to archive the rest"));

        let mut snapshot = summary(RunMode::Snapshot);
        snapshot.interrupted = true;
        assert!(render_summary(&snapshot).contains("no snapshot written"));
    }

    #[test]
    fn snapshot_summary_names_entry() {
        let mut snapshot = summary(RunMode::Snapshot);
        snapshot.snapshot_entry = Some("dwilderness.json".to_string());
        snapshot.snapshot_records = Some(3);
        let text = render_summary(&snapshot);
        assert_eq!(
            text,
            "dwilderness: 3 of 3 observations written to dwilderness.json (dwilderness-mo-bkp.zip)"
        );
    }
}
