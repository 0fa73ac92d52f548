use crate::ooxml::text;
use crate::ooxml::{NodeId, Relationships, XmlDocument};
use crate::style::{OverflowTemplate, StyleSnapshot, apply_paragraph_style, apply_run_style};

/// All-empty input collapses to one single-space line.
pub fn split_lines(translated: &str) -> Vec<String> {
    let lines: Vec<String> = translated
        .split('\n')
        .map(|line| line.trim_end_matches('\r').to_string())
        .collect();
    if lines.iter().all(|line| line.is_empty()) {
        return vec![" ".to_string()];
    }
    lines
}

pub fn rebuild_text_body(
    doc: &mut XmlDocument,
    rels: &mut Relationships,
    body: NodeId,
    snapshot: &StyleSnapshot,
    translated: &str,
    policy: OverflowTemplate,
) -> usize {
    let saved_autosize = text::suspend_autosize(doc, body);
    text::clear_paragraphs(doc, body);

    let mut failures = 0;
    for (idx, line) in split_lines(translated).iter().enumerate() {
        let paragraph = text::add_paragraph(doc, body);
        let template = snapshot.template_for(idx, policy);
        if let Some(template) = template {
            failures += apply_paragraph_style(doc, rels, paragraph, &template.paragraph);
        }
        let content = if line.trim().is_empty() { " " } else { line.as_str() };
        let run = text::add_run(doc, paragraph, content);
        if let Some(style) = template.map(|t| t.run_style()).filter(|s| !s.is_empty()) {
            let props = text::ensure_run_properties(doc, run);
            failures += apply_run_style(doc, rels, props, style);
        }
    }

    text::restore_autosize(doc, body, saved_autosize);
    failures
}
