use crate::project::Project;
use crate::session::{CliResult, Session};

/// Resolves every pending proxy whose target has been synced.
pub async fn run(project: Project) -> CliResult<()> {
    let report = tokio::task::spawn_blocking(move || -> CliResult<_> {
        let mut session = Session::open(project)?;
        let report = session.engine.resolve_proxies_report()?;
        session.save()?;
        Ok(report)
    })
    .await??;

    println!(
        "{} references resolved, {} proxy sets pending",
        report.resolved, report.remaining
    );
    Ok(())
}
