//! Document retrieval by document number.

use anyhow::Result;

use crate::config::StoreBackend;
use crate::models::{Document, DATE_FORMAT};
use crate::store::{DocumentStore, SqlStore};

/// Look up one document. `Ok(None)` when it is not in the store.
pub async fn get_document(
    store: &dyn DocumentStore,
    document_number: &str,
) -> Result<Option<Document>> {
    let mut session = store.open().await?;
    let doc = session.get_document(document_number.trim()).await?;
    session.close().await?;
    Ok(doc)
}

/// CLI entry point: print one stored document.
pub async fn run_get(document_number: &str) -> Result<()> {
    let store = SqlStore::new(StoreBackend::from_env()?);
    let doc = match get_document(&store, document_number).await? {
        Some(d) => d,
        None => anyhow::bail!("document not found: {}", document_number),
    };

    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };

    println!("--- Document ---");
    println!("document_number:  {}", doc.document_number);
    println!("title:            {}", or_dash(&doc.title));
    println!("agency:           {}", or_dash(&doc.agency));
    println!(
        "publication_date: {}",
        doc.publication_date
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("url:              {}", or_dash(&doc.document_url));
    println!();

    println!("--- Content ---");
    println!("{}", doc.content.as_deref().unwrap_or("(no abstract)"));

    Ok(())
}
