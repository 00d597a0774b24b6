use crate::project::Project;
use crate::session::{CliResult, Session};
use modelsync_api::DerivedDeclaration;
use modelsync_core::DerivationReport;
use std::path::{Path, PathBuf};
use tracing::info;

fn load_declarations(path: &Path) -> CliResult<Vec<DerivedDeclaration>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e).into())
}

/// Registers the declarations in `declare` (a JSON array), then recomputes
/// every dirty derived attribute of `language`.
pub async fn run(project: Project, language: String, declare: Option<PathBuf>) -> CliResult<()> {
    let declarations = match &declare {
        Some(path) => load_declarations(path)?,
        None => Vec::new(),
    };

    let report = tokio::task::spawn_blocking(move || -> CliResult<DerivationReport> {
        let mut session = Session::open(project)?;
        for declaration in &declarations {
            let registered = session.engine.register_derived_attribute(declaration)?;
            info!(
                "{}#{}.{}: {} computed, {} remaining",
                declaration.metamodel,
                declaration.type_name,
                declaration.attribute,
                registered.computed,
                registered.remaining
            );
        }
        let report = session.engine.recompute_derived_report(&language)?;
        session.save()?;
        Ok(report)
    })
    .await??;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
