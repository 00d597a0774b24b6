use crate::project::Project;
use crate::session::{store_path, CliResult, Session};

pub async fn run(project: Project) -> CliResult<()> {
    let path = store_path(&project.root);
    let stats = tokio::task::spawn_blocking(move || -> CliResult<_> {
        Ok(Session::open(project)?.engine.stats())
    })
    .await??;

    println!("Store: {}", path.display());
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
