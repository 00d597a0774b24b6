use crate::project::Project;
use crate::session::{describe, CliResult, Session};
use tracing::info;

pub async fn run(project: Project) -> CliResult<()> {
    info!("Syncing {} as `{}`...", project.root.display(), project.repository);

    let summary = tokio::task::spawn_blocking(move || -> CliResult<_> {
        let mut session = Session::open(project)?;
        let summary = session.sync_all()?;
        session.save()?;
        Ok(summary)
    })
    .await??;

    for log in &summary.synced {
        println!("{}", describe(log));
    }
    println!(
        "{} synced, {} unchanged, {} removed, {} failed, {} proxy sets pending",
        summary.synced.len(),
        summary.unchanged,
        summary.removed,
        summary.failed.len(),
        summary.pending_proxies
    );
    if !summary.failed.is_empty() {
        return Err(format!("{} files failed to sync", summary.failed.len()).into());
    }
    Ok(())
}
