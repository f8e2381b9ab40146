use std::path::Path;

use anyhow::Result;

/// Execute the `check` command: validate every definition in the file.
pub fn execute(definitions: &Path) -> Result<()> {
    let bundle = super::load_bundle(definitions)?;

    let mut failures = 0usize;

    for job in &bundle.jobs {
        failures += report(&format!("job '{}'", job.id), &job.validation_errors());
    }
    for source in &bundle.sources {
        failures += report(&format!("source '{}'", source.name), &source.validation_errors());
    }
    for api in &bundle.apis {
        failures += report(&format!("api '{}'", api.name), &api.validation_errors());
    }

    let schedules = bundle
        .jobs
        .iter()
        .filter(|job| job.enabled && job.schedule.as_ref().is_some_and(|s| s.is_runnable()))
        .count();
    println!(
        "\n{} job(s), {} source(s), {} api(s); {} runnable schedule(s)",
        bundle.jobs.len(),
        bundle.sources.len(),
        bundle.apis.len(),
        schedules,
    );

    if failures == 0 {
        println!("All checks passed.");
        Ok(())
    } else {
        anyhow::bail!("{failures} definition(s) failed validation")
    }
}

fn report(label: &str, errors: &[String]) -> usize {
    if errors.is_empty() {
        println!("{:24} OK", format!("{label}:"));
        0
    } else {
        println!("{:24} FAILED", format!("{label}:"));
        for error in errors {
            println!("  {error}");
        }
        1
    }
}
