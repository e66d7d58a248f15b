//! Screenshot annotation ("Set-of-Marks", spec.md §4.10): numbered badges
//! and bounding boxes rendered onto a screenshot for up to `maxLabels`
//! observed elements.
//!
//! Grounded on the teacher's `tools/screenshot.rs` for the base64-PNG
//! response shape; the overlay itself is an in-page canvas evaluator script
//! per the spec's "treat in-page evaluators as opaque" design note.

use crate::observe::ElementObservation;
use base64::Engine;
use serde::Serialize;

pub const DEFAULT_MAX_LABELS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelFormat {
    Number,
    Ref,
    Both,
}

impl Default for LabelFormat {
    fn default() -> Self {
        LabelFormat::Number
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationStyle {
    pub badge_color: String,
    pub text_color: String,
    pub badge_size: u32,
    pub font: String,
    pub box_color: String,
    pub box_width: u32,
    pub dashed: bool,
    pub opacity: f64,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self {
            badge_color: "#ff5722".to_string(),
            text_color: "#ffffff".to_string(),
            badge_size: 16,
            font: "12px sans-serif".to_string(),
            box_color: "#ff5722".to_string(),
            box_width: 2,
            dashed: false,
            opacity: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationMapEntry {
    pub label: String,
    pub ref_id: String,
    pub position: (f64, f64),
}

/// Build the canvas-overlay script for a page-side evaluator to run. The
/// script draws directly onto an offscreen canvas seeded from the already
/// captured screenshot bytes and returns a base64 PNG — kept as a single
/// opaque string per the spec's evaluator-script design note.
pub fn build_annotation_script(
    screenshot_base64: &str,
    labeled: &[(ElementObservation, String)],
    style: &AnnotationStyle,
    format: LabelFormat,
) -> String {
    let marks: Vec<serde_json::Value> = labeled
        .iter()
        .filter_map(|(el, label)| {
            el.bounds.map(|(x, y, w, h)| {
                serde_json::json!({ "x": x, "y": y, "w": w, "h": h, "label": label })
            })
        })
        .collect();

    let label_mode = match format {
        LabelFormat::Number => "number",
        LabelFormat::Ref => "ref",
        LabelFormat::Both => "both",
    };

    format!(
        r#"(() => {{
  const img = new Image();
  const src = "data:image/png;base64,{screenshot_base64}";
  const marks = {marks};
  const style = {style};
  const labelMode = "{label_mode}";
  return new Promise((resolve) => {{
    img.onload = () => {{
      const canvas = document.createElement('canvas');
      canvas.width = img.width; canvas.height = img.height;
      const ctx = canvas.getContext('2d');
      ctx.drawImage(img, 0, 0);
      ctx.globalAlpha = style.opacity;
      for (const m of marks) {{
        ctx.strokeStyle = style.box_color;
        ctx.lineWidth = style.box_width;
        if (style.dashed) ctx.setLineDash([6, 4]); else ctx.setLineDash([]);
        ctx.strokeRect(m.x, m.y, m.w, m.h);
        ctx.fillStyle = style.badge_color;
        ctx.fillRect(m.x, m.y - style.badge_size, style.badge_size * 2, style.badge_size);
        ctx.fillStyle = style.text_color;
        ctx.font = style.font;
        ctx.fillText(m.label, m.x + 2, m.y - 4);
      }}
      resolve(canvas.toDataURL('image/png').split(',')[1]);
    }};
    img.src = src;
  }});
}})()"#,
        screenshot_base64 = screenshot_base64,
        marks = serde_json::to_string(&marks).unwrap_or_else(|_| "[]".to_string()),
        style = serde_json::json!({
            "badge_color": style.badge_color,
            "text_color": style.text_color,
            "badge_size": style.badge_size,
            "box_color": style.box_color,
            "box_width": style.box_width,
            "dashed": style.dashed,
            "opacity": style.opacity,
        }),
        label_mode = label_mode,
    )
}

/// Select up to `max_labels` observations with known bounds and assign each
/// a label string per `format`.
pub fn assign_labels(
    elements: &[ElementObservation],
    max_labels: usize,
    format: LabelFormat,
) -> Vec<(ElementObservation, String)> {
    elements
        .iter()
        .filter(|e| e.bounds.is_some())
        .take(max_labels)
        .enumerate()
        .map(|(i, e)| {
            let label = match format {
                LabelFormat::Number => (i + 1).to_string(),
                LabelFormat::Ref => e.ref_id.clone(),
                LabelFormat::Both => format!("{} {}", i + 1, e.ref_id),
            };
            (e.clone(), label)
        })
        .collect()
}

pub fn annotation_map(labeled: &[(ElementObservation, String)]) -> Vec<AnnotationMapEntry> {
    labeled
        .iter()
        .filter_map(|(el, label)| {
            el.bounds.map(|(x, y, _, _)| AnnotationMapEntry {
                label: label.clone(),
                ref_id: el.ref_id.clone(),
                position: (x, y),
            })
        })
        .collect()
}

pub fn decode_screenshot_base64(raw: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RefStability;

    fn element(ref_id: &str, bounds: Option<(f64, f64, f64, f64)>) -> ElementObservation {
        ElementObservation {
            ref_id: ref_id.to_string(),
            stability: RefStability::New,
            previous_ref: None,
            role: "button".into(),
            accessible_name: None,
            value: None,
            tag_name: "button".into(),
            focused: false,
            disabled: false,
            clickable: true,
            editable: false,
            selectable: false,
            checkable: false,
            selector: "css:#x".into(),
            bounds,
        }
    }

    #[test]
    fn assign_labels_skips_elements_without_bounds() {
        let elements = vec![element("@a", Some((0.0, 0.0, 10.0, 10.0))), element("@b", None)];
        let labeled = assign_labels(&elements, 50, LabelFormat::Number);
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].1, "1");
    }

    #[test]
    fn label_format_ref_uses_element_ref() {
        let elements = vec![element("@submit", Some((1.0, 2.0, 3.0, 4.0)))];
        let labeled = assign_labels(&elements, 50, LabelFormat::Ref);
        assert_eq!(labeled[0].1, "@submit");
    }

    #[test]
    fn annotation_map_reports_top_left_position() {
        let elements = vec![element("@a", Some((5.0, 6.0, 10.0, 10.0)))];
        let labeled = assign_labels(&elements, 50, LabelFormat::Number);
        let map = annotation_map(&labeled);
        assert_eq!(map[0].position, (5.0, 6.0));
    }
}
