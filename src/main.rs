use anyhow::Result;

use artifact_generator_controller::runtime::initialization::initialize;
use artifact_generator_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the controller runtime
    let init_result = initialize().await?;

    // Run the watch loop
    run_watch_loop(init_result.generators, init_result.reconciler).await?;

    Ok(())
}
