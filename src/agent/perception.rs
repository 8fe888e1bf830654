use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::browser::BrowserPage;
use crate::dom::{
    CAPTURE_SCRIPT, CapturedDocument, DomSnapshot, InteractiveElement, SnapshotOptions,
    build_snapshot, overlay_script, project,
};
use crate::error::AgentError;

/// What the agent observes at the start of a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub elements: Vec<InteractiveElement>,
    /// Whitespace-collapsed page text, cut to the configured excerpt length.
    pub visible_text: String,
}

/// Captures the page and turns it into snapshots and projections.
pub struct Perceiver<'a, P: ?Sized> {
    page: &'a P,
    options: SnapshotOptions,
    visible_text_chars: usize,
}

impl<'a, P: BrowserPage + ?Sized> Perceiver<'a, P> {
    pub fn new(page: &'a P, options: SnapshotOptions, visible_text_chars: usize) -> Self {
        Self {
            page,
            options,
            visible_text_chars,
        }
    }

    /// Runs the capture script in the page.
    pub async fn capture(&self) -> Result<CapturedDocument, AgentError> {
        let value = self.page.evaluate(CAPTURE_SCRIPT).await?;
        let document: CapturedDocument = match value {
            Value::String(raw) => serde_json::from_str(&raw),
            other => serde_json::from_value(other),
        }
        .map_err(|e| AgentError::browser(format!("malformed document capture: {e}")))?;
        document.validate()?;
        Ok(document)
    }

    /// Builds a fresh snapshot, redrawing overlays when highlighting is on.
    pub async fn snapshot(&self) -> Result<DomSnapshot, AgentError> {
        let document = self.capture().await?;
        let build = build_snapshot(&document, None, &self.options);
        debug!(
            nodes = build.snapshot.len(),
            overlays = build.overlays.len(),
            "snapshot built"
        );
        if self.options.highlight {
            if let Err(e) = self.page.evaluate(&overlay_script(&build.overlays)).await {
                warn!(error = %e, "failed to draw highlight overlays");
            }
        }
        Ok(build.snapshot)
    }

    /// Projection of a snapshot taken right now.
    pub async fn elements(&self) -> Result<Vec<InteractiveElement>, AgentError> {
        Ok(project(&self.snapshot().await?))
    }

    pub async fn perceive(&self) -> Result<PageState, AgentError> {
        let elements = self.elements().await?;
        let url = self.page.url().await?;
        let title = self.page.title().await?;
        let text = self.page.page_text().await?;
        Ok(PageState {
            url,
            title,
            elements,
            visible_text: excerpt(&text, self.visible_text_chars),
        })
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}
