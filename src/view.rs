//! The view-rendering collaborator.
//!
//! Templates are not trailhead's business. Anything that can turn a view
//! name plus JSON locals into HTML plugs in here: a template engine, a
//! static page table, or the plain renderer the tour app ships for tests.

use crate::failure::Failure;

pub trait ViewRenderer: Send + Sync + 'static {
    /// Render `view` with `locals`. Errors surface as faults.
    fn render(&self, view: &str, locals: &serde_json::Value) -> Result<String, Failure>;
}
