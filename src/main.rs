use anyhow::Context;
use gitgraph_rs::git::{FixedDecision, GitRepository};
use gitgraph_rs::graph::{GraphController, GraphEvent};
use gitgraph_rs::state::GraphConfig;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let config = GraphConfig::load();
        let repo = GitRepository::discover(&path)
            .with_context(|| format!("no git repository at {}", path.display()))?;
        info!("Laying out {}", repo.path().display());

        // Non-interactive: never force anything
        let (controller, mut events) =
            GraphController::new(Rc::new(repo), Rc::new(FixedDecision(false)), &config);
        controller.load_nodes_from_api().await?;

        while let Ok(event) = events.try_recv() {
            if let GraphEvent::Diagnostics(diagnostics) = event {
                for diagnostic in diagnostics {
                    warn!("{:?}", diagnostic);
                }
            }
        }

        let frame = controller.render_frame(Duration::ZERO, |_| false);
        println!("{}", serde_json::to_string_pretty(&frame)?);
        Ok(())
    })
}
