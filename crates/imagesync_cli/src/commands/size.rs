//! Size command implementation.

use super::{connect, render, CommandResult, Options, Outcome};
use imagesync_client::ImageStore;

/// Runs the size command against `server`.
pub fn execute(server: &str, options: &Options) -> CommandResult<Outcome> {
    let store = connect(server, &options.source_token)?;
    run(&store, options)
}

/// Surveys `store`.
pub fn run<S: ImageStore>(store: &S, options: &Options) -> CommandResult<Outcome> {
    let report = imagesync_engine::size(store, &options.replication_config())?;
    Ok(Outcome {
        output: render(&report, options.format, |r| r.to_string())?,
        failed: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{test_options, OutputFormat};
    use imagesync_testkit::fake_store;

    #[test]
    fn text_output() {
        let outcome = run(&fake_store(), &test_options()).unwrap();
        assert_eq!(outcome.output, "Total size is 400 bytes across 2 images");
    }

    #[test]
    fn json_output() {
        let mut options = test_options();
        options.format = OutputFormat::Json;
        let outcome = run(&fake_store(), &options).unwrap();
        let value: serde_json::Value = serde_json::from_str(&outcome.output).unwrap();
        assert_eq!(value["total_bytes"], 400);
        assert_eq!(value["image_count"], 2);
    }
}
