//! Arena-based document tree.
//!
//! All nodes live in a contiguous vector addressed by [`NodeId`], with
//! parent/child/sibling links as indices. Both the source document and the
//! detached capture clone use this arena; the clone simply leaves the
//! document-level state (stylesheets, fonts, viewport) at its defaults.

use std::collections::HashMap;

use html5ever::{LocalName, Namespace, QualName, ns};

use crate::dom::node::{
    Attribute, DocumentStylesheet, ElementData, RuntimeFontFace, UserAgentProfile,
};

/// Unique identifier for a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value for no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check if this is a valid node ID.
    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    /// Check if this is the sentinel value.
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

/// Node type in the arena.
#[derive(Debug, Clone)]
pub enum NodeData {
    /// Document root.
    Document,
    /// Detached container for cloned slot content.
    Fragment,
    /// Shadow tree container. Hangs off its host element, never off the
    /// regular child list.
    ShadowRoot,
    /// Element with its payload.
    Element(Box<ElementData>),
    /// Text content.
    Text(String),
    /// Comment (parsed but stripped at serialization).
    Comment(String),
    /// Document type declaration.
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
}

/// A node in the arena.
#[derive(Debug)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Arena-backed document.
///
/// Mutations bump `epoch`, the invalidation signal the style cache keys its
/// snapshots on (the analogue of observing tree and font mutations).
#[derive(Debug)]
pub struct Document {
    nodes: Vec<Node>,
    document: NodeId,
    /// Map from id attribute to node ID for fast lookup.
    id_map: HashMap<String, NodeId>,
    /// Stylesheets in document order.
    pub stylesheets: Vec<DocumentStylesheet>,
    /// Registered font faces (the `document.fonts` analogue).
    pub font_set: Vec<RuntimeFontFace>,
    /// Base URL used to resolve relative resource references.
    pub base_url: Option<String>,
    /// Viewport size in CSS pixels.
    pub viewport: (f64, f64),
    pub ua_profile: UserAgentProfile,
    epoch: u64,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            document: NodeId::NONE,
            id_map: HashMap::new(),
            stylesheets: Vec::new(),
            font_set: Vec::new(),
            base_url: None,
            viewport: (1024.0, 768.0),
            ua_profile: UserAgentProfile::default(),
            epoch: 0,
        };
        doc.document = doc.alloc(Node::new(NodeData::Document));
        doc
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Current mutation epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Record a mutation. Also called for stylesheet and font-set changes.
    pub fn bump_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Get the document root ID.
    pub fn document(&self) -> NodeId {
        self.document
    }

    /// First element child of the document root.
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.document).find(|&id| self.is_element(id))
    }

    /// Get a node by ID.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    /// Get a mutable node by ID.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.epoch += 1;
        self.nodes.get_mut(id.0 as usize)
    }

    /// Element payload accessor.
    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element(el) => Some(el.as_ref()),
            _ => None,
        })
    }

    /// Mutable element payload accessor.
    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        self.get_mut(id).and_then(|n| match &mut n.data {
            NodeData::Element(el) => Some(el.as_mut()),
            _ => None,
        })
    }

    /// Create a new element node.
    pub fn create_element(&mut self, name: QualName, attrs: Vec<Attribute>) -> NodeId {
        let data = ElementData::new(name, attrs);
        let id_attr = data.id.clone();

        let node_id = self.alloc(Node::new(NodeData::Element(Box::new(data))));

        // Register in id map
        if let Some(id_str) = id_attr {
            self.id_map.insert(id_str, node_id);
        }

        self.epoch += 1;
        node_id
    }

    /// Create an element by tag name with no attributes.
    pub fn create_el(&mut self, tag: &str) -> NodeId {
        self.create_element(qual_name(tag), Vec::new())
    }

    /// Create an element node from prebuilt data. The cloner uses this to
    /// carry a source element's full payload into a detached arena.
    pub fn import_element(&mut self, data: ElementData) -> NodeId {
        let id_attr = data.id.clone();
        let node_id = self.alloc(Node::new(NodeData::Element(Box::new(data))));
        if let Some(id_str) = id_attr {
            self.id_map.insert(id_str, node_id);
        }
        self.epoch += 1;
        node_id
    }

    /// Create a new text node.
    pub fn create_text(&mut self, text: String) -> NodeId {
        self.epoch += 1;
        self.alloc(Node::new(NodeData::Text(text)))
    }

    /// Create a new comment node.
    pub fn create_comment(&mut self, text: String) -> NodeId {
        self.epoch += 1;
        self.alloc(Node::new(NodeData::Comment(text)))
    }

    /// Create a detached fragment container.
    pub fn create_fragment(&mut self) -> NodeId {
        self.epoch += 1;
        self.alloc(Node::new(NodeData::Fragment))
    }

    /// Create a shadow tree container and attach it to a host element. The
    /// container's parent link points at the host for upward traversal, but
    /// it never appears in the host's child list.
    pub fn attach_shadow(&mut self, host: NodeId) -> NodeId {
        let mut node = Node::new(NodeData::ShadowRoot);
        node.parent = host;
        let root = self.alloc(node);
        if let Some(el) = self.element_mut(host) {
            el.shadow_root = Some(root);
        }
        self.epoch += 1;
        root
    }

    /// Create a doctype node.
    pub fn create_doctype(&mut self, name: String, public_id: String, system_id: String) -> NodeId {
        self.epoch += 1;
        self.alloc(Node::new(NodeData::Doctype {
            name,
            public_id,
            system_id,
        }))
    }

    /// Append a child to a parent node. Fragments are spliced: their
    /// children move to the parent and the fragment itself is dropped.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        if matches!(self.get(child).map(|n| &n.data), Some(NodeData::Fragment)) {
            let children: Vec<_> = self.children(child).collect();
            for c in children {
                self.detach(c);
                self.append(parent, c);
            }
            return;
        }

        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = parent;
            child_node.prev_sibling = last_child;
            child_node.next_sibling = NodeId::NONE;
        }

        if last_child.is_some()
            && let Some(last_node) = self.get_mut(last_child)
        {
            last_node.next_sibling = child;
        }

        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    /// Insert a node before a sibling.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        let parent = self.get(sibling).map(|n| n.parent).unwrap_or(NodeId::NONE);
        let prev = self
            .get(sibling)
            .map(|n| n.prev_sibling)
            .unwrap_or(NodeId::NONE);

        if let Some(new) = self.get_mut(new_node) {
            new.parent = parent;
            new.prev_sibling = prev;
            new.next_sibling = sibling;
        }

        if let Some(sib) = self.get_mut(sibling) {
            sib.prev_sibling = new_node;
        }

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = new_node;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = new_node;
        }
    }

    /// Insert a node as the first child of a parent.
    pub fn insert_first(&mut self, parent: NodeId, new_node: NodeId) {
        let first = self
            .get(parent)
            .map(|n| n.first_child)
            .unwrap_or(NodeId::NONE);
        if first.is_some() {
            self.insert_before(first, new_node);
        } else {
            self.append(parent, new_node);
        }
    }

    /// Unlink a node from its parent and siblings. The node stays allocated
    /// and can be re-appended elsewhere.
    pub fn detach(&mut self, id: NodeId) {
        let (parent, prev, next) = match self.get(id) {
            Some(n) => (n.parent, n.prev_sibling, n.next_sibling),
            None => return,
        };

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = next;
            }
        } else if parent.is_some()
            && let Some(par) = self.get_mut(parent)
        {
            par.first_child = next;
        }

        if next.is_some() {
            if let Some(n) = self.get_mut(next) {
                n.prev_sibling = prev;
            }
        } else if parent.is_some()
            && let Some(par) = self.get_mut(parent)
        {
            par.last_child = prev;
        }

        if let Some(node) = self.get_mut(id) {
            node.parent = NodeId::NONE;
            node.prev_sibling = NodeId::NONE;
            node.next_sibling = NodeId::NONE;
        }
    }

    /// Append text to an existing text node, or create new if last child isn't text.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        let last_child = self.get(parent).map(|n| n.last_child).unwrap_or(NodeId::NONE);

        if let Some(last) = self.get_mut(last_child)
            && let NodeData::Text(ref mut existing) = last.data
        {
            existing.push_str(text);
            return;
        }

        let text_node = self.create_text(text.to_string());
        self.append(parent, text_node);
    }

    /// Set (or replace) an attribute, keeping the id/class caches current.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        let qname = attr_name(name);
        let mut new_id = None;
        if let Some(el) = self.element_mut(id) {
            match el.attrs.iter_mut().find(|a| a.name.local.as_ref() == name) {
                Some(attr) => attr.value = value.to_string(),
                None => el.attrs.push(Attribute {
                    name: qname,
                    value: value.to_string(),
                }),
            }
            if name == "id" {
                el.id = Some(value.to_string());
                new_id = el.id.clone();
            } else if name == "class" {
                el.classes = value.split_whitespace().map(|s| s.to_string()).collect();
            }
        }
        if let Some(id_str) = new_id {
            self.id_map.insert(id_str, id);
        }
    }

    /// Remove an attribute if present.
    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(el) = self.element_mut(id) {
            el.attrs.retain(|a| a.name.local.as_ref() != name);
            if name == "id" {
                el.id = None;
            } else if name == "class" {
                el.classes.clear();
            }
        }
    }

    /// Get node by id attribute.
    pub fn get_by_id(&self, id: &str) -> Option<NodeId> {
        self.id_map.get(id).copied()
    }

    /// Get the number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the document is empty (only has the document root).
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Iterate over children of a node.
    pub fn children(&self, parent: NodeId) -> ChildrenIter<'_> {
        let first = self
            .get(parent)
            .map(|n| n.first_child)
            .unwrap_or(NodeId::NONE);
        ChildrenIter {
            doc: self,
            current: first,
        }
    }

    /// Iterate over a subtree in document order, including `root`.
    /// Shadow roots and iframe documents are not traversed.
    pub fn descendants(&self, root: NodeId) -> DescendantsIter<'_> {
        DescendantsIter {
            doc: self,
            stack: vec![root],
        }
    }

    /// Find the first node matching a predicate (DFS from the document root).
    pub fn find<F>(&self, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        let mut stack = vec![self.document];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.get(id) {
                if predicate(node) {
                    return Some(id);
                }
                // Push children in reverse order for left-to-right traversal
                let mut children: Vec<_> = self.children(id).collect();
                children.reverse();
                stack.extend(children);
            }
        }
        None
    }

    /// Find element by tag name (first match).
    pub fn find_by_tag(&self, tag: &str) -> Option<NodeId> {
        self.find(|node| {
            if let NodeData::Element(el) = &node.data {
                el.tag() == tag
            } else {
                false
            }
        })
    }

    /// Concatenated text of a subtree, shadow trees included, in document
    /// order. Feeds the used-codepoint set for font subsetting.
    pub fn collect_text(&self, root: NodeId, out: &mut String) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            match self.get(id).map(|n| &n.data) {
                Some(NodeData::Text(s)) => out.push_str(s),
                Some(NodeData::Element(el)) => {
                    if let Some(shadow) = el.shadow_root {
                        stack.push(shadow);
                    }
                }
                _ => {}
            }
            let mut children: Vec<_> = self.children(id).collect();
            children.reverse();
            stack.extend(children);
        }
    }

    /// Register a stylesheet and invalidate cached snapshots.
    pub fn add_stylesheet(&mut self, sheet: DocumentStylesheet) {
        self.stylesheets.push(sheet);
        self.epoch += 1;
    }

    /// Register a font face and invalidate cached snapshots.
    pub fn add_font_face(&mut self, face: RuntimeFontFace) {
        self.font_set.push(face);
        self.epoch += 1;
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over children of a node.
pub struct ChildrenIter<'a> {
    doc: &'a Document,
    current: NodeId,
}

impl<'a> Iterator for ChildrenIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self
            .doc
            .get(id)
            .map(|n| n.next_sibling)
            .unwrap_or(NodeId::NONE);
        Some(id)
    }
}

/// Depth-first subtree iterator.
pub struct DescendantsIter<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for DescendantsIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let mut children: Vec<_> = self.doc.children(id).collect();
        children.reverse();
        self.stack.extend(children);
        Some(id)
    }
}

/// Convenience methods for element nodes.
impl Document {
    /// Get element's local name (tag).
    pub fn element_name(&self, id: NodeId) -> Option<&LocalName> {
        self.element(id).map(|el| &el.name.local)
    }

    /// Get element's namespace.
    pub fn element_namespace(&self, id: NodeId) -> Option<&Namespace> {
        self.element(id).map(|el| &el.name.ns)
    }

    /// Get an attribute value.
    pub fn get_attr(&self, id: NodeId, attr_name: &str) -> Option<&str> {
        self.element(id).and_then(|el| el.attr(attr_name))
    }

    /// Get element's id attribute.
    pub fn element_id(&self, id: NodeId) -> Option<&str> {
        self.element(id).and_then(|el| el.id.as_deref())
    }

    /// Get element's classes.
    pub fn element_classes(&self, id: NodeId) -> &[String] {
        static EMPTY: &[String] = &[];
        self.element(id)
            .map(|el| el.classes.as_slice())
            .unwrap_or(EMPTY)
    }

    /// Check if node is an element.
    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, NodeData::Element(_)))
    }

    /// Check if node is a text node.
    pub fn is_text(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, NodeData::Text(_)))
    }

    /// Get text content of a text node.
    pub fn text_content(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Text(s) => Some(s.as_str()),
            _ => None,
        })
    }
}

/// Qualified name in the HTML namespace.
pub fn qual_name(local: &str) -> QualName {
    QualName::new(None, ns!(html), LocalName::from(local))
}

/// Qualified name for an attribute (no namespace).
pub fn attr_name(local: &str) -> QualName {
    QualName::new(None, ns!(), LocalName::from(local))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_elements() {
        let mut doc = Document::new();

        let div = doc.create_element(
            qual_name("div"),
            vec![Attribute {
                name: attr_name("id"),
                value: "main".to_string(),
            }],
        );

        doc.append(doc.document(), div);

        assert_eq!(doc.element_name(div).unwrap().as_ref(), "div");
        assert_eq!(doc.element_id(div), Some("main"));
        assert_eq!(doc.get_by_id("main"), Some(div));
    }

    #[test]
    fn test_append_children() {
        let mut doc = Document::new();

        let parent = doc.create_el("div");
        let child1 = doc.create_el("p");
        let child2 = doc.create_el("p");

        doc.append(doc.document(), parent);
        doc.append(parent, child1);
        doc.append(parent, child2);

        let children: Vec<_> = doc.children(parent).collect();
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], child1);
        assert_eq!(children[1], child2);
    }

    #[test]
    fn test_text_merging() {
        let mut doc = Document::new();

        let p = doc.create_el("p");
        doc.append(doc.document(), p);

        doc.append_text(p, "Hello, ");
        doc.append_text(p, "World!");

        let children: Vec<_> = doc.children(p).collect();
        assert_eq!(children.len(), 1);
        assert_eq!(doc.text_content(children[0]), Some("Hello, World!"));
    }

    #[test]
    fn test_detach_and_reappend() {
        let mut doc = Document::new();

        let parent = doc.create_el("div");
        let a = doc.create_el("span");
        let b = doc.create_el("span");
        let c = doc.create_el("span");
        doc.append(doc.document(), parent);
        doc.append(parent, a);
        doc.append(parent, b);
        doc.append(parent, c);

        doc.detach(b);
        let children: Vec<_> = doc.children(parent).collect();
        assert_eq!(children, vec![a, c]);

        let wrapper = doc.create_el("div");
        doc.append(wrapper, b);
        assert_eq!(doc.children(wrapper).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn test_fragment_splice() {
        let mut doc = Document::new();

        let parent = doc.create_el("div");
        doc.append(doc.document(), parent);

        let frag = doc.create_fragment();
        let x = doc.create_el("em");
        let y = doc.create_el("strong");
        doc.append(frag, x);
        doc.append(frag, y);

        doc.append(parent, frag);
        let children: Vec<_> = doc.children(parent).collect();
        assert_eq!(children, vec![x, y]);
        assert!(doc.children(frag).next().is_none());
    }

    #[test]
    fn test_mutation_bumps_epoch() {
        let mut doc = Document::new();
        let before = doc.epoch();
        let div = doc.create_el("div");
        doc.append(doc.document(), div);
        assert!(doc.epoch() > before);

        let before = doc.epoch();
        doc.set_attr(div, "class", "a b");
        assert!(doc.epoch() > before);
        assert_eq!(doc.element_classes(div), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_shadow_root_not_in_child_list() {
        let mut doc = Document::new();
        let host = doc.create_el("div");
        doc.append(doc.document(), host);
        let shadow = doc.attach_shadow(host);
        let inner = doc.create_el("span");
        doc.append(shadow, inner);

        assert!(doc.children(host).next().is_none());
        assert_eq!(doc.element(host).unwrap().shadow_root, Some(shadow));
        assert_eq!(doc.children(shadow).collect::<Vec<_>>(), vec![inner]);
    }

    #[test]
    fn test_collect_text_includes_shadow() {
        let mut doc = Document::new();
        let host = doc.create_el("div");
        doc.append(doc.document(), host);
        doc.append_text(host, "light");
        let shadow = doc.attach_shadow(host);
        doc.append_text(shadow, "dark");

        let mut text = String::new();
        doc.collect_text(host, &mut text);
        assert!(text.contains("light"));
        assert!(text.contains("dark"));
    }
}
