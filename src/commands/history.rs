// ABOUTME: History command implementation.
// ABOUTME: Prints deployment records from a JSON-lines record file.

use std::path::Path;
use verdigris::error::Result;
use verdigris::output::Output;
use verdigris::store::JsonLinesStore;

pub fn history(record_file: &Path, output: &Output) -> Result<()> {
    let records = JsonLinesStore::new(record_file).read_all()?;
    if records.is_empty() {
        output.progress("No deployments recorded");
        return Ok(());
    }
    for record in &records {
        output.deployment(record);
    }
    Ok(())
}
