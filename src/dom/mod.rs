//! Page perception: capture a document, build an indexed snapshot of it and
//! project the elements an action can target.

pub mod builder;
pub mod capture;
pub mod document;
pub mod highlight;
pub mod predicates;
pub mod projection;
pub mod snapshot;

pub use builder::{SnapshotBuild, build_snapshot};
pub use capture::{CAPTURE_SCRIPT, CapturedDocument, HIGHLIGHT_CONTAINER_ID};
pub use document::{DocumentView, NodeHandle, Rect, Viewport};
pub use highlight::{HighlightOverlay, overlay_script};
pub use projection::{InteractiveElement, project, resolve};
pub use snapshot::{DomNode, DomNodeKind, DomSnapshot, SnapshotOptions, ViewportExpansion};
