#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = examon_rust::run().await {
        eprintln!("examon-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
