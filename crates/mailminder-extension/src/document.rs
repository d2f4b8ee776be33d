use std::collections::BTreeMap;
use std::sync::Mutex;

/// Handle to one element of a [`PageDocument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The DOM operations the page injector needs from the host page.
///
/// Selectors are compound simple selectors: an optional tag name followed by
/// any number of `#id`, `.class` and `[attribute]` parts.
pub trait PageDocument: Send + Sync {
    fn body(&self) -> NodeId;

    fn query(&self, selector: &str) -> Option<NodeId>;

    fn query_within(&self, scope: NodeId, selector: &str) -> Option<NodeId>;

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.query(&format!("#{id}"))
    }

    fn create_element(&self, tag: &str) -> NodeId;

    fn append_child(&self, parent: NodeId, child: NodeId);

    fn insert_before(&self, parent: NodeId, child: NodeId, reference: NodeId);

    /// Detaches `node` from its parent. Detached nodes never match queries.
    fn remove(&self, node: NodeId);

    fn is_attached(&self, node: NodeId) -> bool;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn add_class(&self, node: NodeId, class: &str);

    fn remove_class(&self, node: NodeId, class: &str);

    fn has_class(&self, node: NodeId, class: &str) -> bool;

    fn set_text(&self, node: NodeId, text: &str);

    fn click(&self, node: NodeId);
}

#[derive(Debug, Default)]
struct Node {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    text: String,
    parent: Option<usize>,
    children: Vec<usize>,
    clicks: usize,
}

#[derive(Debug)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    const ROOT: usize = 0;

    fn attached(&self, mut index: usize) -> bool {
        loop {
            if index == Self::ROOT {
                return true;
            }
            match self.nodes[index].parent {
                Some(parent) => index = parent,
                None => return false,
            }
        }
    }

    fn detach(&mut self, index: usize) {
        if let Some(parent) = self.nodes[index].parent.take() {
            self.nodes[parent].children.retain(|child| *child != index);
        }
    }

    /// Depth-first, document-order search below `scope`.
    fn find(&self, scope: usize, selector: &Selector) -> Option<usize> {
        let mut stack = self.nodes[scope].children.iter().rev().copied().collect::<Vec<_>>();
        while let Some(index) = stack.pop() {
            if selector.matches(&self.nodes[index]) {
                return Some(index);
            }
            stack.extend(self.nodes[index].children.iter().rev().copied());
        }
        None
    }

    fn count(&self, scope: usize, selector: &Selector) -> usize {
        let mut stack = self.nodes[scope].children.clone();
        let mut count = 0;
        while let Some(index) = stack.pop() {
            if selector.matches(&self.nodes[index]) {
                count += 1;
            }
            stack.extend(self.nodes[index].children.iter().copied());
        }
        count
    }
}

#[derive(Debug, Default, PartialEq)]
struct Selector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Selector {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() || input.contains(char::is_whitespace) {
            return None;
        }

        let mut selector = Selector::default();
        let mut rest = input;
        let tag_len = rest
            .find(|c: char| matches!(c, '#' | '.' | '['))
            .unwrap_or(rest.len());
        if tag_len > 0 {
            selector.tag = Some(rest[..tag_len].to_ascii_lowercase());
            rest = &rest[tag_len..];
        }

        while let Some(marker) = rest.chars().next() {
            rest = &rest[marker.len_utf8()..];
            match marker {
                '#' | '.' => {
                    let end = rest
                        .find(|c: char| matches!(c, '#' | '.' | '['))
                        .unwrap_or(rest.len());
                    let name = &rest[..end];
                    if name.is_empty() {
                        return None;
                    }
                    if marker == '#' {
                        selector.id = Some(name.to_string());
                    } else {
                        selector.classes.push(name.to_string());
                    }
                    rest = &rest[end..];
                }
                '[' => {
                    let end = rest.find(']')?;
                    let body = &rest[..end];
                    let attribute = match body.split_once('=') {
                        Some((name, value)) => (
                            name.to_string(),
                            Some(value.trim_matches(|c| c == '"' || c == '\'').to_string()),
                        ),
                        None => (body.to_string(), None),
                    };
                    if attribute.0.is_empty() {
                        return None;
                    }
                    selector.attributes.push(attribute);
                    rest = &rest[end + 1..];
                }
                _ => return None,
            }
        }
        Some(selector)
    }

    fn matches(&self, node: &Node) -> bool {
        if self.tag.as_deref().is_some_and(|tag| tag != node.tag) {
            return false;
        }
        if let Some(id) = &self.id {
            if node.attributes.get("id") != Some(id) {
                return false;
            }
        }
        if !self.classes.iter().all(|class| node.classes.contains(class)) {
            return false;
        }
        self.attributes.iter().all(|(name, value)| match (node.attributes.get(name), value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }
}

/// In-memory [`PageDocument`] for headless runs and tests.
#[derive(Debug)]
pub struct MemoryDocument {
    tree: Mutex<Tree>,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self {
            tree: Mutex::new(Tree {
                nodes: vec![Node {
                    tag: "body".to_string(),
                    ..Node::default()
                }],
            }),
        }
    }

    /// Appends a new `tag` element with the given id and classes under `parent`.
    pub fn add_element(
        &self,
        parent: NodeId,
        tag: &str,
        id: Option<&str>,
        classes: &[&str],
    ) -> NodeId {
        let node = self.create_element(tag);
        if let Some(id) = id {
            self.set_attribute(node, "id", id);
        }
        for class in classes {
            self.add_class(node, class);
        }
        self.append_child(parent, node);
        node
    }

    pub fn text(&self, node: NodeId) -> String {
        self.lock().nodes[node.0].text.clone()
    }

    pub fn clicks(&self, node: NodeId) -> usize {
        self.lock().nodes[node.0].clicks
    }

    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        self.lock().nodes[parent.0]
            .children
            .iter()
            .map(|index| NodeId(*index))
            .collect()
    }

    /// Number of attached elements matching `selector`.
    pub fn count(&self, selector: &str) -> usize {
        match Selector::parse(selector) {
            Some(selector) => self.lock().count(Tree::ROOT, &selector),
            None => 0,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn find(&self, scope: usize, selector: &str) -> Option<NodeId> {
        let Some(parsed) = Selector::parse(selector) else {
            tracing::warn!(selector, "unsupported selector");
            return None;
        };
        let tree = self.lock();
        if !tree.attached(scope) {
            return None;
        }
        tree.find(scope, &parsed).map(NodeId)
    }
}

impl PageDocument for MemoryDocument {
    fn body(&self) -> NodeId {
        NodeId(Tree::ROOT)
    }

    fn query(&self, selector: &str) -> Option<NodeId> {
        self.find(Tree::ROOT, selector)
    }

    fn query_within(&self, scope: NodeId, selector: &str) -> Option<NodeId> {
        self.find(scope.0, selector)
    }

    fn create_element(&self, tag: &str) -> NodeId {
        let mut tree = self.lock();
        tree.nodes.push(Node {
            tag: tag.to_ascii_lowercase(),
            ..Node::default()
        });
        NodeId(tree.nodes.len() - 1)
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut tree = self.lock();
        tree.detach(child.0);
        tree.nodes[child.0].parent = Some(parent.0);
        tree.nodes[parent.0].children.push(child.0);
    }

    fn insert_before(&self, parent: NodeId, child: NodeId, reference: NodeId) {
        let mut tree = self.lock();
        tree.detach(child.0);
        let position = tree.nodes[parent.0]
            .children
            .iter()
            .position(|index| *index == reference.0)
            .unwrap_or(tree.nodes[parent.0].children.len());
        tree.nodes[child.0].parent = Some(parent.0);
        tree.nodes[parent.0].children.insert(position, child.0);
    }

    fn remove(&self, node: NodeId) {
        if node.0 != Tree::ROOT {
            self.lock().detach(node.0);
        }
    }

    fn is_attached(&self, node: NodeId) -> bool {
        self.lock().attached(node.0)
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut tree = self.lock();
        if name == "class" {
            tree.nodes[node.0].classes = value.split_whitespace().map(str::to_string).collect();
        } else {
            tree.nodes[node.0]
                .attributes
                .insert(name.to_string(), value.to_string());
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let tree = self.lock();
        if name == "class" {
            return Some(tree.nodes[node.0].classes.join(" "));
        }
        tree.nodes[node.0].attributes.get(name).cloned()
    }

    fn add_class(&self, node: NodeId, class: &str) {
        let mut tree = self.lock();
        let classes = &mut tree.nodes[node.0].classes;
        if !classes.iter().any(|existing| existing == class) {
            classes.push(class.to_string());
        }
    }

    fn remove_class(&self, node: NodeId, class: &str) {
        self.lock().nodes[node.0]
            .classes
            .retain(|existing| existing != class);
    }

    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.lock().nodes[node.0]
            .classes
            .iter()
            .any(|existing| existing == class)
    }

    fn set_text(&self, node: NodeId, text: &str) {
        self.lock().nodes[node.0].text = text.to_string();
    }

    fn click(&self, node: NodeId) {
        self.lock().nodes[node.0].clicks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_class_and_attribute_selectors() {
        let doc = MemoryDocument::new();
        let body = doc.body();
        let toolbar = doc.add_element(body, "div", None, &["J-J5-Ji", "btA"]);
        let span = doc.add_element(toolbar, "span", None, &[]);
        let message = doc.add_element(body, "div", None, &["adn"]);
        doc.set_attribute(message, "data-legacy-message-id", "18f2");

        assert_eq!(doc.query(".J-J5-Ji.btA"), Some(toolbar));
        assert_eq!(doc.query(".btA.J-J5-Ji"), Some(toolbar));
        assert_eq!(doc.query_within(toolbar, "span"), Some(span));
        assert_eq!(doc.query("[data-legacy-message-id]"), Some(message));
        assert_eq!(doc.query("[data-legacy-message-id=\"18f2\"]"), Some(message));
        assert_eq!(doc.query(".J-J5-Ji.missing"), None);
        assert_eq!(doc.query("div span"), None);
    }

    #[test]
    fn non_ascii_selector_text_is_a_miss() {
        let doc = MemoryDocument::new();
        let node = doc.add_element(doc.body(), "div", Some("café"), &["ünï"]);
        doc.set_attribute(node, "data-x", "1");

        assert_eq!(doc.query("[data-x]é"), None);
        assert_eq!(doc.query("é[data-x]"), None);
        assert_eq!(doc.count("#café"), 1);
        assert_eq!(doc.query(".ünï[data-x]"), Some(node));
    }

    #[test]
    fn removed_nodes_stop_matching() {
        let doc = MemoryDocument::new();
        let frame = doc.add_element(doc.body(), "iframe", Some("overlay"), &["custom-iframe"]);
        assert_eq!(doc.element_by_id("overlay"), Some(frame));

        doc.remove(frame);
        assert!(!doc.is_attached(frame));
        assert_eq!(doc.element_by_id("overlay"), None);
        assert_eq!(doc.count(".custom-iframe"), 0);
    }

    #[test]
    fn insert_before_keeps_document_order() {
        let doc = MemoryDocument::new();
        let toolbar = doc.add_element(doc.body(), "div", None, &["amn"]);
        let first = doc.add_element(toolbar, "span", None, &[]);
        let button = doc.create_element("button");
        doc.insert_before(toolbar, button, first);
        assert_eq!(doc.children(toolbar), vec![button, first]);
    }
}
