#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    streamshop::server::run().await
}
