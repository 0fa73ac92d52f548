use super::xml::{NodeId, XmlDocument};

pub const DRAWINGML_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
pub const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub const BODY_ORDER: &[&str] = &["bodyPr", "lstStyle", "p", "extLst"];
pub const BODY_PR_ORDER: &[&str] = &[
    "prstTxWarp",
    "noAutofit",
    "normAutofit",
    "spAutoFit",
    "scene3d",
    "sp3d",
    "flatTx",
    "extLst",
];
pub const PARAGRAPH_ORDER: &[&str] = &["pPr", "r", "br", "fld", "endParaRPr"];
pub const RUN_ORDER: &[&str] = &["rPr", "t"];
pub const PPR_ORDER: &[&str] = &[
    "lnSpc", "spcBef", "spcAft", "buClrTx", "buClr", "buSzTx", "buSzPct", "buSzPts", "buFontTx",
    "buFont", "buNone", "buAutoNum", "buChar", "buBlip", "tabLst", "defRPr", "extLst",
];
pub const RPR_ORDER: &[&str] = &[
    "ln",
    "noFill",
    "solidFill",
    "gradFill",
    "blipFill",
    "pattFill",
    "grpFill",
    "effectLst",
    "effectDag",
    "highlight",
    "uLnTx",
    "uLn",
    "uFillTx",
    "uFill",
    "latin",
    "ea",
    "cs",
    "sym",
    "hlinkClick",
    "hlinkMouseOver",
    "rtl",
    "extLst",
];

const AUTOFIT_NAMES: &[&str] = &["noAutofit", "normAutofit", "spAutoFit"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoSize {
    Unset,
    None,
    TextToFitShape,
    ShapeToFitText,
}

pub fn paragraphs(doc: &XmlDocument, body: NodeId) -> Vec<NodeId> {
    doc.children_named(body, "p")
}

pub fn runs(doc: &XmlDocument, paragraph: NodeId) -> Vec<NodeId> {
    doc.children_named(paragraph, "r")
}

/// Paragraph text with runs, fields and `a:br` (as `\n`) in document order.
pub fn paragraph_text(doc: &XmlDocument, paragraph: NodeId) -> String {
    let mut out = String::new();
    for child in doc.child_elements(paragraph) {
        match doc.local_name(child) {
            "r" | "fld" => {
                if let Some(t) = doc.first_child_named(child, "t") {
                    out.push_str(&doc.text_content(t));
                }
            }
            "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

pub fn frame_text(doc: &XmlDocument, body: NodeId) -> String {
    paragraphs(doc, body)
        .into_iter()
        .map(|p| paragraph_text(doc, p))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn body_properties(doc: &XmlDocument, body: NodeId) -> Option<NodeId> {
    doc.first_child_named(body, "bodyPr")
}

pub fn autosize(doc: &XmlDocument, body: NodeId) -> AutoSize {
    let Some(props) = body_properties(doc, body) else {
        return AutoSize::Unset;
    };
    for child in doc.child_elements(props) {
        match doc.local_name(child) {
            "noAutofit" => return AutoSize::None,
            "normAutofit" => return AutoSize::TextToFitShape,
            "spAutoFit" => return AutoSize::ShapeToFitText,
            _ => {}
        }
    }
    AutoSize::Unset
}

pub fn suspend_autosize(doc: &mut XmlDocument, body: NodeId) -> Option<NodeId> {
    let props = body_properties(doc, body)?;
    let current = doc
        .child_elements(props)
        .find(|child| AUTOFIT_NAMES.contains(&doc.local_name(*child)))?;
    doc.detach(current);
    Some(current)
}

pub fn restore_autosize(doc: &mut XmlDocument, body: NodeId, saved: Option<NodeId>) {
    let (Some(saved), Some(props)) = (saved, body_properties(doc, body)) else {
        return;
    };
    doc.remove_children_named(props, AUTOFIT_NAMES);
    doc.insert_ordered(props, saved, BODY_PR_ORDER);
}

pub fn clear_paragraphs(doc: &mut XmlDocument, body: NodeId) {
    doc.remove_children_named(body, &["p"]);
}

pub fn add_paragraph(doc: &mut XmlDocument, body: NodeId) -> NodeId {
    let name = doc.qualify(DRAWINGML_NS, "a", "p");
    let paragraph = doc.create_element(&name);
    doc.insert_ordered(body, paragraph, BODY_ORDER);
    paragraph
}

pub fn add_run(doc: &mut XmlDocument, paragraph: NodeId, text: &str) -> NodeId {
    let run_name = doc.qualify(DRAWINGML_NS, "a", "r");
    let text_name = doc.qualify(DRAWINGML_NS, "a", "t");
    let run = doc.create_element(&run_name);
    let t = doc.create_element(&text_name);
    doc.set_text(t, text);
    doc.append_child(run, t);
    doc.insert_ordered(paragraph, run, PARAGRAPH_ORDER);
    run
}

pub fn run_properties(doc: &XmlDocument, run: NodeId) -> Option<NodeId> {
    doc.first_child_named(run, "rPr")
}

pub fn ensure_run_properties(doc: &mut XmlDocument, run: NodeId) -> NodeId {
    let name = doc.qualify(DRAWINGML_NS, "a", "rPr");
    doc.ensure_child(run, &name, RUN_ORDER)
}

pub fn paragraph_properties(doc: &XmlDocument, paragraph: NodeId) -> Option<NodeId> {
    doc.first_child_named(paragraph, "pPr")
}

pub fn ensure_paragraph_properties(doc: &mut XmlDocument, paragraph: NodeId) -> NodeId {
    let name = doc.qualify(DRAWINGML_NS, "a", "pPr");
    doc.ensure_child(paragraph, &name, PARAGRAPH_ORDER)
}

pub fn default_run_properties(doc: &XmlDocument, paragraph: NodeId) -> Option<NodeId> {
    paragraph_properties(doc, paragraph)
        .and_then(|ppr| doc.first_child_named(ppr, "defRPr"))
        .or_else(|| doc.first_child_named(paragraph, "endParaRPr"))
}

pub fn ensure_default_run_properties(doc: &mut XmlDocument, paragraph: NodeId) -> NodeId {
    let ppr = ensure_paragraph_properties(doc, paragraph);
    let name = doc.qualify(DRAWINGML_NS, "a", "defRPr");
    doc.ensure_child(ppr, &name, PPR_ORDER)
}

pub fn rel_attr(doc: &XmlDocument, local: &str) -> String {
    let prefix = doc.prefix_for_namespace(REL_NS).unwrap_or("r");
    format!("{}:{}", prefix, local)
}
