#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = vm_fleet_accounting::cli::run().await {
        tracing::error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}
