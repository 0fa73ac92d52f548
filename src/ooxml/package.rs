use anyhow::{Context, Result, anyhow};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::xml::{XML_DECLARATION, XmlDocument};

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const RELS_NAMESPACE: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
pub const REL_TYPE_IMAGE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const REL_TYPE_HYPERLINK: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

#[derive(Debug, Clone)]
struct Part {
    name: String,
    data: Vec<u8>,
    compression: CompressionMethod,
    is_dir: bool,
}

#[derive(Debug, Clone)]
pub struct Package {
    parts: Vec<Part>,
    index: HashMap<String, usize>,
}

impl Package {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read presentation: {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).with_context(|| "failed to read zip archive")?;
        let mut parts = Vec::with_capacity(archive.len());
        let mut index = HashMap::new();
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .with_context(|| "failed to read zip entry")?;
            let name = file.name().to_string();
            let compression = file.compression();
            let is_dir = file.is_dir();
            let mut data = Vec::new();
            if !is_dir {
                file.read_to_end(&mut data)
                    .with_context(|| format!("failed to read zip entry content: {}", name))?;
            }
            index.insert(name.clone(), parts.len());
            parts.push(Part {
                name,
                data,
                compression,
                is_dir,
            });
        }
        Ok(Self { parts, index })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for part in &self.parts {
            let options = FileOptions::default().compression_method(part.compression);
            if part.is_dir {
                writer
                    .add_directory(part.name.as_str(), options)
                    .with_context(|| "failed to write zip directory")?;
                continue;
            }
            writer
                .start_file(part.name.as_str(), options)
                .with_context(|| "failed to write zip entry")?;
            writer
                .write_all(&part.data)
                .with_context(|| "failed to write zip content")?;
        }
        let bytes = writer
            .finish()
            .with_context(|| "failed to finalize zip output")?
            .into_inner();
        Ok(bytes)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.index
            .get(name)
            .map(|idx| self.parts[*idx].data.as_slice())
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts
            .iter()
            .filter(|part| !part.is_dir)
            .map(|part| part.name.as_str())
    }

    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        if let Some(idx) = self.index.get(name) {
            self.parts[*idx].data = data;
            return;
        }
        self.index.insert(name.to_string(), self.parts.len());
        self.parts.push(Part {
            name: name.to_string(),
            data,
            compression: CompressionMethod::Deflated,
            is_dir: false,
        });
    }

    pub fn remove_part(&mut self, name: &str) -> Result<bool> {
        let Some(idx) = self.index.remove(name) else {
            return Ok(false);
        };
        self.parts.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        if let Some(data) = self.part(CONTENT_TYPES_PART) {
            let mut doc = XmlDocument::parse(data)?;
            let root = doc.root();
            let part_name = format!("/{}", name);
            let overrides: Vec<_> = doc
                .children_named(root, "Override")
                .into_iter()
                .filter(|node| doc.attr(*node, "PartName") == Some(part_name.as_str()))
                .collect();
            if !overrides.is_empty() {
                for node in overrides {
                    doc.detach(node);
                }
                let bytes = doc.to_bytes()?;
                self.set_part(CONTENT_TYPES_PART, bytes);
            }
        }
        Ok(true)
    }

    pub fn unique_part_name(&self, dir: &str, stem: &str, ext: &str) -> String {
        let mut n = 1usize;
        loop {
            let candidate = format!("{}/{}{}.{}", dir, stem, n, ext);
            if !self.has_part(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn ensure_default_content_type(&mut self, ext: &str, content_type: &str) -> Result<()> {
        let data = self
            .part(CONTENT_TYPES_PART)
            .ok_or_else(|| anyhow!("package has no {}", CONTENT_TYPES_PART))?;
        let mut doc = XmlDocument::parse(data)?;
        let root = doc.root();
        let exists = doc.children_named(root, "Default").into_iter().any(|node| {
            doc.attr(node, "Extension")
                .map(|value| value.eq_ignore_ascii_case(ext))
                .unwrap_or(false)
        });
        if exists {
            return Ok(());
        }
        let prefix = doc.prefix(root).map(|p| format!("{}:", p)).unwrap_or_default();
        let node = doc.create_element(&format!("{}Default", prefix));
        doc.set_attr(node, "Extension", ext);
        doc.set_attr(node, "ContentType", content_type);
        doc.insert_child(root, 0, node);
        let bytes = doc.to_bytes()?;
        self.set_part(CONTENT_TYPES_PART, bytes);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Relationships {
    items: Vec<Relationship>,
}

impl Relationships {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let doc = XmlDocument::parse(bytes).with_context(|| "failed to parse relationships")?;
        let root = doc.root();
        let mut items = Vec::new();
        for node in doc.children_named(root, "Relationship") {
            let (Some(id), Some(target)) = (doc.attr(node, "Id"), doc.attr(node, "Target")) else {
                continue;
            };
            items.push(Relationship {
                id: id.to_string(),
                rel_type: doc.attr(node, "Type").unwrap_or_default().to_string(),
                target: target.to_string(),
                external: doc
                    .attr(node, "TargetMode")
                    .map(|mode| mode.eq_ignore_ascii_case("External"))
                    .unwrap_or(false),
            });
        }
        Ok(Self { items })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.write_all(XML_DECLARATION.as_bytes())?;
        let mut writer = Writer::new(out);
        let mut root = BytesStart::new("Relationships");
        root.push_attribute(("xmlns", RELS_NAMESPACE));
        writer.write_event(Event::Start(root))?;
        for rel in &self.items {
            let mut node = BytesStart::new("Relationship");
            node.push_attribute(("Id", rel.id.as_str()));
            node.push_attribute(("Type", rel.rel_type.as_str()));
            node.push_attribute(("Target", rel.target.as_str()));
            if rel.external {
                node.push_attribute(("TargetMode", "External"));
            }
            writer.write_event(Event::Empty(node))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Relationships")))?;
        Ok(writer.into_inner())
    }

    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.items.iter().find(|rel| rel.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.items.iter()
    }

    pub fn add(&mut self, rel_type: &str, target: &str, external: bool) -> String {
        let mut n = self.items.len() + 1;
        let id = loop {
            let candidate = format!("rId{}", n);
            if self.get(&candidate).is_none() {
                break candidate;
            }
            n += 1;
        };
        self.items.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            external,
        });
        id
    }

    pub fn find_external(&self, rel_type: &str, target: &str) -> Option<&Relationship> {
        self.items
            .iter()
            .find(|rel| rel.external && rel.rel_type == rel_type && rel.target == target)
    }

    pub fn remove(&mut self, id: &str) {
        self.items.retain(|rel| rel.id != id);
    }

    pub fn references_to(&self, base: &str, part: &str) -> usize {
        self.items
            .iter()
            .filter(|rel| !rel.external && resolve_target(base, &rel.target) == part)
            .count()
    }
}

/// `ppt/slides/slide1.xml` -> `ppt/slides/_rels/slide1.xml.rels`
pub fn rels_path_for(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part_name),
    }
}

pub fn source_part_for_rels(rels_path: &str) -> Option<String> {
    let (dir, file) = rels_path.rsplit_once('/')?;
    let file = file.strip_suffix(".rels")?;
    let dir = dir.strip_suffix("_rels")?.trim_end_matches('/');
    if dir.is_empty() {
        Some(file.to_string())
    } else {
        Some(format!("{}/{}", dir, file))
    }
}

pub fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match base_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').filter(|s| !s.is_empty()).collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

pub fn relative_target(from_part: &str, to_part: &str) -> String {
    let from_dir: Vec<&str> = match from_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let to: Vec<&str> = to_part.split('/').collect();
    let common = from_dir
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut parts: Vec<&str> = Vec::new();
    for _ in common..from_dir.len() {
        parts.push("..");
    }
    parts.extend(&to[common..]);
    parts.join("/")
}
