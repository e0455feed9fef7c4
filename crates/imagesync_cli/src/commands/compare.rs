//! Compare command implementation.

use super::{connect, render, CommandResult, Options, Outcome};
use imagesync_client::ImageStore;
use imagesync_engine::DifferenceReport;
use std::fmt::Write;

/// Runs the compare command between `from` and `to`.
pub fn execute(from: &str, to: &str, options: &Options) -> CommandResult<Outcome> {
    let source = connect(from, &options.source_token)?;
    let destination = connect(to, &options.destination_token)?;
    run(&source, &destination, options)
}

/// Compares `destination` against `source`. Neither store is modified.
pub fn run<S, D>(source: &S, destination: &D, options: &Options) -> CommandResult<Outcome>
where
    S: ImageStore,
    D: ImageStore,
{
    let report = imagesync_engine::compare(source, destination, &options.replication_config())?;
    Ok(Outcome {
        output: render(&report, options.format, text)?,
        failed: report.failed.len(),
    })
}

fn text(report: &DifferenceReport) -> String {
    let mut out = String::new();
    for (id, difference) in &report.differences {
        let _ = writeln!(out, "{id}: {difference}");
        for field in report.fields.get(id).into_iter().flatten() {
            let _ = writeln!(
                out,
                "  {}: {} -> {}",
                field.field,
                field.source,
                field.destination.as_deref().unwrap_or("<absent>")
            );
        }
    }
    for failure in &report.failed {
        let _ = writeln!(out, "failed {}: {}", failure.id, failure.error);
    }
    out.push_str(&report.to_string());
    out
}
