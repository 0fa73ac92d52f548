use anyhow::{Result, anyhow};
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Write;

pub const XML_DECLARATION: &str =
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n";

/// Arena slots are never reused, so a handle survives structural edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    CData(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<Node>,
    root: NodeId,
}

impl XmlDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(bytes);
        reader.trim_text(false);
        let mut buf = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root = None;

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|err| anyhow!("failed to parse xml: {}", err))?;
            match event {
                Event::Start(e) => {
                    let id = push_node(&mut nodes, element_from(&e)?, stack.last().copied());
                    if stack.is_empty() && root.is_none() {
                        root = Some(id);
                    }
                    stack.push(id);
                }
                Event::Empty(e) => {
                    let id = push_node(&mut nodes, element_from(&e)?, stack.last().copied());
                    if stack.is_empty() && root.is_none() {
                        root = Some(id);
                    }
                }
                Event::End(_) => {
                    stack.pop();
                }
                Event::Text(e) => {
                    if let Some(parent) = stack.last().copied() {
                        let text = e
                            .unescape()
                            .map_err(|err| anyhow!("failed to unescape xml text: {}", err))?
                            .into_owned();
                        push_node(&mut nodes, NodeKind::Text(text), Some(parent));
                    }
                }
                Event::CData(e) => {
                    if let Some(parent) = stack.last().copied() {
                        let text = String::from_utf8_lossy(e.into_inner().as_ref()).into_owned();
                        push_node(&mut nodes, NodeKind::CData(text), Some(parent));
                    }
                }
                Event::Comment(e) => {
                    if let Some(parent) = stack.last().copied() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        push_node(&mut nodes, NodeKind::Comment(text), Some(parent));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        let root = root.ok_or_else(|| anyhow!("xml document has no root element"))?;
        Ok(Self { nodes, root })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.write_all(XML_DECLARATION.as_bytes())?;
        let mut writer = Writer::new(out);
        self.write_node(&mut writer, self.root)?;
        Ok(writer.into_inner())
    }

    fn write_node(&self, writer: &mut Writer<Vec<u8>>, id: NodeId) -> Result<()> {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Element { name, attrs } => {
                let mut start = BytesStart::new(name.as_str());
                for (key, value) in attrs {
                    start.push_attribute((key.as_str(), value.as_str()));
                }
                if node.children.is_empty() {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    for child in &node.children {
                        self.write_node(writer, *child)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
            }
            NodeKind::Text(text) => {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            NodeKind::CData(text) => {
                writer.write_event(Event::CData(BytesCData::new(text.as_str())))?;
            }
            NodeKind::Comment(text) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(text.as_str())))?;
            }
        }
        Ok(())
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    pub fn name(&self, id: NodeId) -> &str {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => name,
            _ => "",
        }
    }

    pub fn local_name(&self, id: NodeId) -> &str {
        local_part(self.name(id))
    }

    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        self.name(id).split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    pub fn attr_local(&self, id: NodeId, local: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(name, _)| local_part(name) == local && !name.starts_with("xmlns"))
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            if let Some(slot) = attrs.iter_mut().find(|(name, _)| name == key) {
                slot.1 = value;
            } else {
                attrs.push((key.to_string(), value));
            }
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, key: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            attrs.retain(|(name, _)| name != key);
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |child| self.is_element(*child))
    }

    pub fn first_child_named(&self, id: NodeId, local: &str) -> Option<NodeId> {
        self.child_elements(id)
            .find(|child| self.local_name(*child) == local)
    }

    pub fn children_named(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        self.child_elements(id)
            .filter(|child| self.local_name(*child) == local)
            .collect()
    }

    pub fn find_path(&self, id: NodeId, path: &[&str]) -> Option<NodeId> {
        let mut current = id;
        for local in path {
            current = self.first_child_named(current, local)?;
        }
        Some(current)
    }

    pub fn descendants_named(&self, id: NodeId, local: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if !self.is_element(current) {
                continue;
            }
            if self.local_name(current) == local {
                found.push(current);
            }
            stack.extend(self.children(current).iter().rev().copied());
        }
        found
    }

    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) | NodeKind::CData(text) => out.push_str(text),
            NodeKind::Element { .. } => {
                for child in &self.nodes[id.0].children {
                    self.collect_text(*child, out);
                }
            }
            NodeKind::Comment(_) => {}
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        self.clear_children(id);
        if !text.is_empty() {
            let node = push_node(&mut self.nodes, NodeKind::Text(text.to_string()), None);
            self.append_child(id, node);
        }
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        push_node(
            &mut self.nodes,
            NodeKind::Element {
                name: name.to_string(),
                attrs: Vec::new(),
            },
            None,
        )
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }

    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.nodes[id.0].parent?;
        self.nodes[parent.0]
            .children
            .iter()
            .position(|child| *child == id)
    }

    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id.0].kind.clone();
        let copy = push_node(&mut self.nodes, kind, None);
        let children = self.nodes[id.0].children.clone();
        for child in children {
            let child_copy = self.deep_clone(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    pub fn namespace_of(&self, id: NodeId) -> Option<&str> {
        let key = match self.prefix(id) {
            Some(prefix) => format!("xmlns:{}", prefix),
            None => "xmlns".to_string(),
        };
        let mut current = Some(id);
        while let Some(node) = current {
            if let Some(uri) = self.attr(node, &key) {
                return Some(uri);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn prefix_for_namespace(&self, uri: &str) -> Option<&str> {
        match &self.nodes[self.root.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, value)| key.starts_with("xmlns:") && value == uri)
                .map(|(key, _)| &key["xmlns:".len()..]),
            _ => None,
        }
    }

    pub fn qualify(&self, uri: &str, fallback_prefix: &str, local: &str) -> String {
        let prefix = self.prefix_for_namespace(uri).unwrap_or(fallback_prefix);
        if prefix.is_empty() {
            local.to_string()
        } else {
            format!("{}:{}", prefix, local)
        }
    }

    /// Names missing from `order` sort last.
    pub fn insert_ordered(&mut self, parent: NodeId, child: NodeId, order: &[&str]) {
        let rank = |name: &str| order.iter().position(|item| *item == name).unwrap_or(order.len());
        let child_rank = rank(self.local_name(child));
        let siblings: Vec<NodeId> = self.children(parent).to_vec();
        let mut index = siblings.len();
        for (pos, sibling) in siblings.iter().enumerate() {
            if self.is_element(*sibling) && rank(self.local_name(*sibling)) > child_rank {
                index = pos;
                break;
            }
        }
        self.insert_child(parent, index, child);
    }

    pub fn ensure_child(&mut self, parent: NodeId, qname: &str, order: &[&str]) -> NodeId {
        if let Some(existing) = self.first_child_named(parent, local_part(qname)) {
            return existing;
        }
        let child = self.create_element(qname);
        self.insert_ordered(parent, child, order);
        child
    }

    pub fn remove_children_named(&mut self, parent: NodeId, locals: &[&str]) {
        for child in self.children(parent).to_vec() {
            if self.is_element(child) && locals.contains(&self.local_name(child)) {
                self.detach(child);
            }
        }
    }
}

pub fn local_part(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

fn push_node(nodes: &mut Vec<Node>, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
    let id = NodeId(nodes.len());
    nodes.push(Node {
        kind,
        parent,
        children: Vec::new(),
    });
    if let Some(parent) = parent {
        nodes[parent.0].children.push(id);
    }
    id
}

fn element_from(e: &BytesStart<'_>) -> Result<NodeKind> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| anyhow!("invalid xml attribute: {}", err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| anyhow!("invalid xml attribute value: {}", err))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(NodeKind::Element { name, attrs })
}
