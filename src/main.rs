#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dictation_core::app::run().await
}
