#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agent_registry::run().await
}
