use tracing::debug;

use crate::ooxml::{NodeId, Presentation, ShapeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Text,
    TableCell,
    Picture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    pub index: usize,
    pub slide: usize,
    pub kind: UnitKind,
    pub shape: NodeId,
    pub body: Option<NodeId>,
    pub label: String,
}

pub fn enumerate_units(presentation: &Presentation, with_pictures: bool) -> Vec<TranslationUnit> {
    let mut units = Vec::new();
    for slide in presentation.slides() {
        for shape in presentation.shapes(slide.index) {
            match shape.kind {
                ShapeKind::Text => {
                    let body = slide.xml.first_child_named(shape.node, "txBody");
                    push(&mut units, slide.index, UnitKind::Text, shape.node, body, shape.name);
                }
                ShapeKind::Table => {
                    for cell in presentation.table_cells(slide.index, shape.node) {
                        let label = format!("{} [{},{}]", shape.name, cell.row, cell.col);
                        push(
                            &mut units,
                            slide.index,
                            UnitKind::TableCell,
                            cell.cell,
                            Some(cell.body),
                            label,
                        );
                    }
                }
                ShapeKind::Picture if with_pictures => {
                    push(&mut units, slide.index, UnitKind::Picture, shape.node, None, shape.name);
                }
                ShapeKind::Picture => {
                    debug!(
                        "slide {}: picture '{}' skipped, no OCR engine",
                        slide.index + 1,
                        shape.name
                    );
                }
            }
        }
    }
    units
}

fn push(
    units: &mut Vec<TranslationUnit>,
    slide: usize,
    kind: UnitKind,
    shape: NodeId,
    body: Option<NodeId>,
    label: String,
) {
    units.push(TranslationUnit {
        index: units.len(),
        slide,
        kind,
        shape,
        body,
        label,
    });
}
