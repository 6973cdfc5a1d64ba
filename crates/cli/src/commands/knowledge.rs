//! `parley knowledge`: add and inspect knowledge entries.

use clap::Subcommand;
use parley_core::NewKnowledgeEntry;

#[derive(Subcommand)]
pub enum KnowledgeAction {
    /// List entries
    List {
        /// Include inactive entries
        #[arg(long)]
        all: bool,
    },
    /// Add an entry (embedded immediately when an embedding model is set)
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// Comma-separated keywords for lexical matching
        #[arg(long, default_value = "")]
        keywords: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Run a retrieval query and print the passages
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

pub async fn run(action: KnowledgeAction) -> Result<(), Box<dyn std::error::Error>> {
    let (config, services) = super::services().await?;

    match action {
        KnowledgeAction::List { all } => {
            let entries = services.store.load_knowledge_entries(!all).await?;
            for e in entries {
                println!(
                    "{:>5}  {}  [{}]{}{}",
                    e.id,
                    e.title,
                    e.keywords,
                    if e.embedding.is_some() { " (embedded)" } else { "" },
                    if e.active { "" } else { " (inactive)" }
                );
            }
        }
        KnowledgeAction::Add {
            title,
            content,
            keywords,
            category,
        } => {
            let entry = services
                .retriever
                .add_entry(NewKnowledgeEntry {
                    title,
                    content,
                    keywords,
                    category,
                })
                .await?;
            println!("Added entry {}", entry.id);
        }
        KnowledgeAction::Search { query, limit } => {
            let passages = services
                .retriever
                .search(
                    &query,
                    limit.unwrap_or(config.retrieval.limit),
                    config.retrieval.max_passage_length,
                )
                .await;
            if passages.is_empty() {
                println!("(no matches)");
            }
            for p in passages {
                println!("[{}] {} (score {:.3})", p.id, p.title, p.score);
                println!("{}\n", p.body);
            }
        }
    }

    Ok(())
}
