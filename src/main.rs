#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stickerbook::cli::run().await
}
