use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    govsync_cli::main_entry().await
}
