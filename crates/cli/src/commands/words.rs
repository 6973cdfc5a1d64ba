//! `parley words`: manage the sensitive-word lexicon.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum WordsAction {
    /// List active words
    List,
    /// Add a word
    Add {
        word: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Remove a word by id
    Remove { id: i64 },
    /// Check a message against the filter without sending it anywhere
    Check { text: String },
}

pub async fn run(action: WordsAction) -> Result<(), Box<dyn std::error::Error>> {
    let (_, services) = super::services().await?;
    let filter = &services.filter;

    match action {
        WordsAction::List => {
            let words = filter.list_words().await?;
            if words.is_empty() {
                println!("(no sensitive words)");
            }
            for w in words {
                match w.category {
                    Some(category) => println!("{:>5}  {}  [{category}]", w.id, w.word),
                    None => println!("{:>5}  {}", w.id, w.word),
                }
            }
        }
        WordsAction::Add { word, category } => {
            if filter.add_word(&word, category.as_deref()).await? {
                println!("Added \"{word}\"");
            } else {
                println!("\"{word}\" is already listed");
            }
        }
        WordsAction::Remove { id } => {
            if filter.remove_word(id).await? {
                println!("Removed word {id}");
            } else {
                return Err(format!("No word with id {id}").into());
            }
        }
        WordsAction::Check { text } => match filter.check(&text).await.reason() {
            Some(reason) => println!("Rejected: {reason}"),
            None => println!("Allowed"),
        },
    }

    Ok(())
}
