//! `parley reindex`: recompute knowledge embeddings.

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (_, services) = super::services().await?;

    if !services.retriever.has_embedder() {
        return Err("No embedding model configured: set [embedding] model in config.toml".into());
    }

    println!("Rebuilding knowledge embeddings...");
    let count = services.retriever.rebuild_embeddings().await?;
    println!("   {count} entries embedded");
    Ok(())
}
