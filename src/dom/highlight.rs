//! Labeled overlays drawn over highlighted elements.
//!
//! Overlays are visual aids for whoever watches the browser. Nothing reads
//! them back; the builder even skips their container on the next capture.

use serde::{Deserialize, Serialize};

use super::capture::HIGHLIGHT_CONTAINER_ID;

const PALETTE: [&str; 12] = [
    "#FF0000", "#00FF00", "#0000FF", "#FFA500", "#800080", "#008080", "#FF69B4", "#4B0082",
    "#FF4500", "#2E8B57", "#DC143C", "#4682B4",
];

/// Palette color for a highlight index, cycling every twelve elements.
pub fn palette_color(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

/// One overlay box in page coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightOverlay {
    pub index: usize,
    pub color: String,
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// Script replacing any previous overlay container with boxes for `overlays`.
/// An empty slice just clears the page.
pub fn overlay_script(overlays: &[HighlightOverlay]) -> String {
    // Serializing a Vec of plain structs cannot fail.
    let data = serde_json::to_string(overlays).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
  const ID = "{HIGHLIGHT_CONTAINER_ID}";
  const previous = document.getElementById(ID);
  if (previous) previous.remove();
  const overlays = {data};
  if (overlays.length === 0) return 0;
  const container = document.createElement("div");
  container.id = ID;
  Object.assign(container.style, {{
    position: "absolute", pointerEvents: "none", top: "0", left: "0",
    width: "100%", height: "100%", zIndex: "2147483647",
  }});
  for (const o of overlays) {{
    const box = document.createElement("div");
    Object.assign(box.style, {{
      position: "absolute", border: "2px solid " + o.color, backgroundColor: o.color + "1A",
      pointerEvents: "none", boxSizing: "border-box",
      top: o.top + "px", left: o.left + "px", width: o.width + "px", height: o.height + "px",
    }});
    const label = document.createElement("div");
    label.textContent = String(o.index);
    Object.assign(label.style, {{
      position: "absolute", background: o.color, color: "white", padding: "1px 4px",
      borderRadius: "4px", fontSize: Math.min(12, Math.max(8, o.height / 2)) + "px",
    }});
    const labelWidth = 20, labelHeight = 16;
    let labelTop = o.top + 2;
    let labelLeft = o.left + o.width - labelWidth - 2;
    if (o.width < labelWidth + 4 || o.height < labelHeight + 4) {{
      labelTop = o.top - labelHeight - 2;
      labelLeft = o.left + o.width - labelWidth;
    }}
    label.style.top = labelTop + "px";
    label.style.left = labelLeft + "px";
    container.appendChild(box);
    container.appendChild(label);
  }}
  document.body.appendChild(container);
  return overlays.length;
}})()"#
    )
}
