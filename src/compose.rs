//! Context compositor for embedding-ready chunk text.
//!
//! Search recall improves measurably when every embedded chunk carries the
//! article's title, author, and summary — but the stored chunk text must
//! stay exactly what a reader would see. So each raw chunk gets a context
//! header prepended before the embedding call, and the raw text is what
//! gets persisted.

/// Article-level metadata injected into every chunk before embedding.
#[derive(Debug, Clone)]
pub struct ArticleContext {
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
}

impl ArticleContext {
    /// Render the context header: a title line, optional author and summary
    /// lines, and a trailing blank line separating header from chunk text.
    fn header(&self) -> String {
        let mut lines = vec![format!("Article: {}", self.title)];
        if let Some(author) = &self.author {
            lines.push(format!("By {}", author));
        }
        if let Some(description) = &self.description {
            lines.push(format!("Summary: {}", description));
        }
        lines.join("\n")
    }
}

/// Produce the embedding-ready variant of each raw chunk.
///
/// The output is parallel to the input: `result[i]` is the context header,
/// a blank line, then `chunks[i]` verbatim. Only these composed strings are
/// ever sent to the embedding provider; the raw chunks are what the store
/// persists.
pub fn compose_for_embedding(ctx: &ArticleContext, chunks: &[String]) -> Vec<String> {
    let header = ctx.header();
    chunks
        .iter()
        .map(|chunk| format!("{}\n\n{}", header, chunk))
        .collect()
}
