//! Livecopy command implementation.

use super::{connect, render, CommandResult, Options, Outcome};
use imagesync_client::ImageStore;
use imagesync_engine::{ChangeKind, ChangeReport};
use std::fmt::Write;

/// Runs the livecopy command from `from` to `to`.
pub fn execute(from: &str, to: &str, options: &Options) -> CommandResult<Outcome> {
    let source = connect(from, &options.source_token)?;
    let destination = connect(to, &options.destination_token)?;
    run(&source, &destination, options)
}

/// Copies `source` onto `destination`.
pub fn run<S, D>(source: &S, destination: &D, options: &Options) -> CommandResult<Outcome>
where
    S: ImageStore,
    D: ImageStore,
{
    let report = imagesync_engine::live_copy(source, destination, &options.replication_config())?;
    Ok(Outcome {
        output: render(&report, options.format, text)?,
        failed: report.failed.len(),
    })
}

/// One line per written, skipped or failed image, then a summary.
pub(crate) fn text(report: &ChangeReport) -> String {
    let mut out = String::new();
    for (id, change) in &report.changed {
        let verb = match change.kind {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
        };
        let _ = writeln!(out, "{verb} {id}");
    }
    for skipped in &report.skipped {
        let _ = writeln!(out, "skipped {} ({})", skipped.id, skipped.reason.as_str());
    }
    for failure in &report.failed {
        let _ = writeln!(out, "failed {}: {}", failure.id, failure.error);
    }
    out.push_str(&report.to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{test_options, OutputFormat};
    use imagesync_testkit::prelude::*;

    #[test]
    fn text_lists_changes() {
        let outcome = run(&live_master_store(), &fake_store(), &test_options()).unwrap();
        assert_eq!(outcome.failed, 0);
        assert!(outcome.output.contains(&format!("updated {IMAGE_C}")));
        assert!(outcome.output.contains(&format!("created {IMAGE_D}")));
        assert!(outcome.output.ends_with("1 created, 1 updated, 0 skipped, 0 failed, 100 bytes transferred"));
    }

    #[test]
    fn json_keys_changes_by_id() {
        let mut options = test_options();
        options.format = OutputFormat::Json;
        let outcome = run(&live_master_store(), &fake_store(), &options).unwrap();
        let value: serde_json::Value = serde_json::from_str(&outcome.output).unwrap();
        assert_eq!(value["changed"][IMAGE_D]["kind"], "created");
        assert_eq!(value["changed"][IMAGE_C]["kind"], "updated");
    }
}
