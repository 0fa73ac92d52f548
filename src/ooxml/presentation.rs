use anyhow::{Context, Result, anyhow};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use super::package::{
    Package, REL_TYPE_IMAGE, Relationships, rels_path_for, relative_target, resolve_target,
    source_part_for_rels,
};
use super::xml::{NodeId, XmlDocument};

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const SLIDE_REL_SUFFIX: &str = "/relationships/slide";

#[derive(Debug, Clone)]
pub struct Slide {
    pub index: usize,
    pub part_name: String,
    pub xml: XmlDocument,
    pub rels: Relationships,
    dirty: bool,
}

impl Slide {
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn rel_target_part(&self, rel_id: &str) -> Option<String> {
        let rel = self.rels.get(rel_id)?;
        if rel.external {
            return None;
        }
        Some(resolve_target(&self.part_name, &rel.target))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Text,
    Table,
    Picture,
}

#[derive(Debug, Clone)]
pub struct ShapeRef {
    pub slide: usize,
    pub node: NodeId,
    pub kind: ShapeKind,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCell {
    pub row: usize,
    pub col: usize,
    pub cell: NodeId,
    pub body: NodeId,
}

#[derive(Debug, Clone)]
pub struct Presentation {
    package: Package,
    slides: Vec<Slide>,
}

impl Presentation {
    pub fn open(path: &Path) -> Result<Self> {
        let package = Package::read(path)?;
        Self::from_package(package)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_package(Package::from_bytes(bytes)?)
    }

    fn from_package(package: Package) -> Result<Self> {
        let order = slide_order(&package)?;
        let mut slides = Vec::with_capacity(order.len());
        for (index, part_name) in order.into_iter().enumerate() {
            let data = package
                .part(&part_name)
                .ok_or_else(|| anyhow!("slide part missing: {}", part_name))?;
            let xml = XmlDocument::parse(data)
                .with_context(|| format!("failed to parse slide: {}", part_name))?;
            let rels = match package.part(&rels_path_for(&part_name)) {
                Some(bytes) => Relationships::parse(bytes)?,
                None => Relationships::default(),
            };
            slides.push(Slide {
                index,
                part_name,
                xml,
                rels,
                dirty: false,
            });
        }
        debug!("presentation: {} slides", slides.len());
        Ok(Self { package, slides })
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn slide(&self, index: usize) -> Option<&Slide> {
        self.slides.get(index)
    }

    pub fn slide_mut(&mut self, index: usize) -> Option<&mut Slide> {
        self.slides.get_mut(index)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.package.part(name)
    }

    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        for slide in &mut self.slides {
            if !slide.dirty {
                continue;
            }
            let xml = slide.xml.to_bytes()?;
            self.package.set_part(&slide.part_name, xml);
            let rels = slide.rels.to_bytes()?;
            self.package.set_part(&rels_path_for(&slide.part_name), rels);
            slide.dirty = false;
        }
        self.package.to_bytes()
    }

    pub fn save(&mut self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)
            .with_context(|| format!("failed to write presentation: {}", path.display()))
    }

    pub fn shapes(&self, slide_index: usize) -> Vec<ShapeRef> {
        let Some(slide) = self.slides.get(slide_index) else {
            return Vec::new();
        };
        let doc = &slide.xml;
        let Some(tree) = doc.find_path(doc.root(), &["cSld", "spTree"]) else {
            return Vec::new();
        };
        let mut shapes = Vec::new();
        collect_shapes(doc, tree, slide_index, &mut shapes);
        shapes
    }

    pub fn table_cells(&self, slide_index: usize, frame: NodeId) -> Vec<TableCell> {
        let Some(slide) = self.slides.get(slide_index) else {
            return Vec::new();
        };
        let doc = &slide.xml;
        let Some(table) = table_node(doc, frame) else {
            return Vec::new();
        };
        let mut cells = Vec::new();
        for (row, tr) in doc.children_named(table, "tr").into_iter().enumerate() {
            for (col, tc) in doc.children_named(tr, "tc").into_iter().enumerate() {
                if let Some(body) = doc.first_child_named(tc, "txBody") {
                    cells.push(TableCell {
                        row,
                        col,
                        cell: tc,
                        body,
                    });
                }
            }
        }
        cells
    }

    pub fn picture_part(&self, slide_index: usize, picture: NodeId) -> Option<String> {
        let slide = self.slides.get(slide_index)?;
        let rel_id = blip_rel_id(&slide.xml, picture)?;
        slide.rel_target_part(&rel_id)
    }

    /// The copy keeps the original's geometry and position in the shape tree.
    pub fn replace_picture(
        &mut self,
        slide_index: usize,
        picture: NodeId,
        bytes: Vec<u8>,
        ext: &str,
        content_type: &str,
    ) -> Result<NodeId> {
        let media_part = self.package.unique_part_name("ppt/media", "image_translated", ext);
        self.package.set_part(&media_part, bytes);
        self.package.ensure_default_content_type(ext, content_type)?;

        let slide = self
            .slides
            .get_mut(slide_index)
            .ok_or_else(|| anyhow!("slide {} out of range", slide_index))?;
        let doc = &mut slide.xml;
        let parent = doc
            .parent(picture)
            .ok_or_else(|| anyhow!("picture is not attached to a shape tree"))?;
        let position = doc
            .index_in_parent(picture)
            .ok_or_else(|| anyhow!("picture position not found"))?;
        let old_rel = blip_rel_id(doc, picture);

        let replacement = doc.deep_clone(picture);
        let blip = doc
            .find_path(replacement, &["blipFill", "blip"])
            .ok_or_else(|| anyhow!("picture has no blip"))?;
        let target = relative_target(&slide.part_name, &media_part);
        let rel_id = slide.rels.add(REL_TYPE_IMAGE, &target, false);
        let embed_key = embed_attr_key(doc, blip);
        doc.set_attr(blip, &embed_key, rel_id);

        doc.detach(picture);
        doc.insert_child(parent, position, replacement);

        let mut orphan = None;
        if let Some(old_rel) = old_rel {
            let still_used = doc
                .descendants_named(doc.root(), "blip")
                .into_iter()
                .any(|node| doc.attr_local(node, "embed") == Some(old_rel.as_str()));
            if !still_used {
                orphan = slide.rel_target_part(&old_rel);
                slide.rels.remove(&old_rel);
            }
        }
        slide.dirty = true;

        if let Some(part) = orphan
            && !self.is_part_referenced(&part)
            && self.package.remove_part(&part)?
        {
            debug!("picture: dropped unreferenced media {}", part);
        }
        Ok(replacement)
    }

    fn is_part_referenced(&self, part: &str) -> bool {
        if self
            .slides
            .iter()
            .any(|slide| slide.rels.references_to(&slide.part_name, part) > 0)
        {
            return true;
        }
        let slide_rels: HashSet<String> = self
            .slides
            .iter()
            .map(|slide| rels_path_for(&slide.part_name))
            .collect();
        self.package
            .part_names()
            .filter(|name| name.ends_with(".rels") && !slide_rels.contains(*name))
            .any(|name| {
                let Some(source) = source_part_for_rels(name) else {
                    return false;
                };
                match self.package.part(name).map(Relationships::parse) {
                    Some(Ok(rels)) => rels.references_to(&source, part) > 0,
                    // Unreadable relationships might still point at it.
                    _ => true,
                }
            })
    }
}

pub fn table_node(doc: &XmlDocument, frame: NodeId) -> Option<NodeId> {
    doc.find_path(frame, &["graphic", "graphicData", "tbl"])
}

fn blip_rel_id(doc: &XmlDocument, picture: NodeId) -> Option<String> {
    let blip = doc.find_path(picture, &["blipFill", "blip"])?;
    doc.attr_local(blip, "embed").map(|value| value.to_string())
}

fn embed_attr_key(doc: &XmlDocument, blip: NodeId) -> String {
    for prefix in ["r", "rel"] {
        let key = format!("{}:embed", prefix);
        if doc.attr(blip, &key).is_some() {
            return key;
        }
    }
    "r:embed".to_string()
}

fn shape_name(doc: &XmlDocument, node: NodeId) -> String {
    doc.child_elements(node)
        .find(|child| doc.local_name(*child).starts_with("nv"))
        .and_then(|nv| doc.first_child_named(nv, "cNvPr"))
        .and_then(|props| doc.attr(props, "name"))
        .unwrap_or_default()
        .to_string()
}

fn collect_shapes(doc: &XmlDocument, tree: NodeId, slide: usize, out: &mut Vec<ShapeRef>) {
    for node in doc.child_elements(tree) {
        let kind = match doc.local_name(node) {
            "sp" if doc.first_child_named(node, "txBody").is_some() => Some(ShapeKind::Text),
            "pic" => Some(ShapeKind::Picture),
            "graphicFrame" if table_node(doc, node).is_some() => Some(ShapeKind::Table),
            "grpSp" => {
                collect_shapes(doc, node, slide, out);
                None
            }
            _ => None,
        };
        if let Some(kind) = kind {
            out.push(ShapeRef {
                slide,
                node,
                kind,
                name: shape_name(doc, node),
            });
        }
    }
}

fn slide_order(package: &Package) -> Result<Vec<String>> {
    if let (Some(pres), Some(rels)) = (
        package.part(PRESENTATION_PART),
        package.part(&rels_path_for(PRESENTATION_PART)),
    ) {
        let doc = XmlDocument::parse(pres).with_context(|| "failed to parse presentation.xml")?;
        let rels = Relationships::parse(rels)?;
        let mut order = Vec::new();
        if let Some(list) = doc.first_child_named(doc.root(), "sldIdLst") {
            for entry in doc.children_named(list, "sldId") {
                // sldId carries both a numeric `id` and the prefixed relationship id.
                let Some(rel_id) = doc.attr(entry, "r:id") else {
                    continue;
                };
                match rels.get(rel_id) {
                    Some(rel) if rel.rel_type.ends_with(SLIDE_REL_SUFFIX) => {
                        order.push(resolve_target(PRESENTATION_PART, &rel.target));
                    }
                    _ => warn!("presentation: slide relationship {} not found", rel_id),
                }
            }
        }
        if !order.is_empty() {
            return Ok(order);
        }
    }

    let mut fallback: Vec<(usize, String)> = package
        .part_names()
        .filter(|name| name.starts_with("ppt/slides/slide") && name.ends_with(".xml"))
        .filter_map(|name| {
            let number = name
                .trim_start_matches("ppt/slides/slide")
                .trim_end_matches(".xml")
                .parse::<usize>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    fallback.sort();
    Ok(fallback.into_iter().map(|(_, name)| name).collect())
}
