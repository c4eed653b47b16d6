//! HTML parser – converts a page fragment into a simple, mutable DOM tree.
//!
//! Only the controlled subset emitted by [`crate::templates`] is supported:
//! - Structural: div, section, p, h1-h4, ul, li, img
//! - Inline: span
//! - Styling via `class` and `style` attributes

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of a supported element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    Section,
    P,
    H1,
    H2,
    H3,
    H4,
    Ul,
    Li,
    Span,
    Img,
    Body,
    Html,
    Head,
    /// Unknown tags are kept in the tree but never displayed.
    Unknown(String),
}

impl Tag {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "div" => Tag::Div,
            "section" => Tag::Section,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "ul" => Tag::Ul,
            "li" => Tag::Li,
            "span" => Tag::Span,
            "img" => Tag::Img,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            _ => Tag::Unknown(s.to_string()),
        }
    }

    /// Elements whose inline content is flowed as one wrapped paragraph.
    pub fn is_text_block(&self) -> bool {
        matches!(self, Tag::P | Tag::H1 | Tag::H2 | Tag::H3 | Tag::H4)
    }

    fn is_void(&self) -> bool {
        matches!(self, Tag::Img)
    }
}

/// A node in our DOM tree.
#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attributes.get("style").map(|s| s.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attributes.get("src").map(|s| s.as_str())
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id").map(|s| s.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        self.attributes.insert(key.to_string(), value.into());
    }
}

// ---------------------------------------------------------------------------
// Tree queries
// ---------------------------------------------------------------------------

/// Find the first element with the given `id`, depth first.
pub fn find_by_id<'a>(nodes: &'a [DomNode], id: &str) -> Option<&'a ElementNode> {
    nodes.iter().find_map(|node| match node {
        DomNode::Element(e) if e.id() == Some(id) => Some(e),
        DomNode::Element(e) => find_by_id(&e.children, id),
        DomNode::Text(_) => None,
    })
}

/// Call `f` on every `<img>` element, depth first, in document order.
pub fn for_each_image_mut(nodes: &mut [DomNode], f: &mut dyn FnMut(&mut ElementNode)) {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Img {
                f(e);
            }
            for_each_image_mut(&mut e.children, f);
        }
    }
}

/// Collect the `src` of every `<img>`, in document order.
pub fn image_sources(nodes: &[DomNode]) -> Vec<String> {
    let mut out = Vec::new();
    fn walk(nodes: &[DomNode], out: &mut Vec<String>) {
        for node in nodes {
            if let DomNode::Element(e) = node {
                if e.tag == Tag::Img {
                    out.push(e.src().unwrap_or_default().to_string());
                }
                walk(&e.children, out);
            }
        }
    }
    walk(nodes, &mut out);
    out
}

// ---------------------------------------------------------------------------
// Parser – simple recursive descent over HTML
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of DOM nodes.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut parser = Parser::new(html);
    parser.parse_nodes()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_nodes(&mut self) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        loop {
            self.skip_inter_element_whitespace();
            if self.eof() || self.starts_with("</") {
                break;
            }
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_past("-->");
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            self.skip_past(">");
            return None;
        }
        if self.starts_with("<") {
            Some(self.parse_element())
        } else {
            Some(self.parse_text())
        }
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        let end = self.input[start..]
            .find('<')
            .map_or(self.input.len(), |i| start + i);
        self.pos = end;
        DomNode::Text(decode_entities(&self.input[start..end]))
    }

    fn parse_element(&mut self) -> DomNode {
        self.pos += 1; // '<'
        let tag = Tag::parse(&self.parse_name());
        let mut elem = ElementNode::new(tag);

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let before = self.pos;
            let (key, value) = self.parse_attribute();
            if self.pos == before {
                // Stray character inside the tag; step over it.
                self.advance_char();
                continue;
            }
            elem.attributes.insert(key, value);
        }

        if self.starts_with("/>") {
            self.pos += 2;
            return DomNode::Element(elem);
        }
        if self.starts_with(">") {
            self.pos += 1;
        }
        if elem.tag.is_void() {
            return DomNode::Element(elem);
        }

        elem.children = self.parse_nodes();

        if self.starts_with("</") {
            self.pos += 2;
            self.parse_name();
            self.skip_past(">");
        }

        DomNode::Element(elem)
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        let len = self.input[start..]
            .find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
            .unwrap_or(self.input.len() - start);
        self.pos += len;
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.pos += 1;
        self.skip_whitespace();
        let value = self.parse_attr_value();
        (key, value)
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ["\"", "'"] {
            if self.starts_with(quote) {
                self.pos += 1;
                let start = self.pos;
                let end = self.input[start..]
                    .find(quote)
                    .map_or(self.input.len(), |i| start + i);
                self.pos = (end + 1).min(self.input.len());
                return decode_entities(&self.input[start..end]);
            }
        }
        let start = self.pos;
        let len = self.input[start..]
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(self.input.len() - start);
        self.pos += len;
        self.input[start..self.pos].to_string()
    }

    fn skip_whitespace(&mut self) {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Skip whitespace between tags, but keep it when it leads into text.
    fn skip_inter_element_whitespace(&mut self) {
        let saved = self.pos;
        self.skip_whitespace();
        if !self.eof() && !self.starts_with("<") {
            self.pos = saved;
        }
    }

    fn skip_past(&mut self, marker: &str) {
        self.pos = self.input[self.pos..]
            .find(marker)
            .map_or(self.input.len(), |i| self.pos + i + marker.len());
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.input[self.pos..].chars().next() {
            self.pos += c.len_utf8();
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{00A0}")
        .replace("&copy;", "\u{00A9}")
        .replace("&amp;", "&")
}

/// Escape text for interpolation into a template.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_div() {
        let html = r#"<div class="flex p-4"><p>Hello</p></div>"#;
        let nodes = parse_html(html);
        assert_eq!(nodes.len(), 1);
        if let DomNode::Element(e) = &nodes[0] {
            assert_eq!(e.tag, Tag::Div);
            assert_eq!(e.classes(), vec!["flex", "p-4"]);
            assert_eq!(e.children.len(), 1);
        } else {
            panic!("Expected element");
        }
    }

    #[test]
    fn parse_void_img_without_slash() {
        let html = r#"<div><img src="hero.jpg" class="w-full"><p>after</p></div>"#;
        let nodes = parse_html(html);
        let DomNode::Element(div) = &nodes[0] else {
            panic!("Expected div");
        };
        assert_eq!(div.children.len(), 2);
        assert_eq!(image_sources(&nodes), vec!["hero.jpg"]);
    }

    #[test]
    fn parse_nested_spans() {
        let html = r#"<p>Hello <span class="font-bold">world</span>!</p>"#;
        let nodes = parse_html(html);
        if let DomNode::Element(e) = &nodes[0] {
            assert_eq!(e.tag, Tag::P);
            assert_eq!(e.children.len(), 3); // "Hello ", <span>, "!"
        } else {
            panic!("Expected p element");
        }
    }

    #[test]
    fn entities_round_trip_through_escape() {
        let title = r#"Fish & Chips <"Tour"> it's"#;
        let html = format!("<p>{}</p>", escape_html(title));
        let nodes = parse_html(&html);
        let DomNode::Element(p) = &nodes[0] else {
            panic!("Expected p");
        };
        match &p.children[0] {
            DomNode::Text(t) => assert_eq!(t, title),
            other => panic!("Expected text, got {other:?}"),
        }
    }

    #[test]
    fn find_and_rewrite_images() {
        let mut nodes = parse_html(
            r#"<div id="page-root"><img src="a.png"/><section><img src="b.png"/></section></div>"#,
        );
        assert!(find_by_id(&nodes, "page-root").is_some());
        assert!(find_by_id(&nodes, "missing").is_none());
        for_each_image_mut(&mut nodes, &mut |img| {
            let src = format!("proxied/{}", img.src().unwrap_or_default());
            img.set_attr("src", src);
        });
        assert_eq!(image_sources(&nodes), vec!["proxied/a.png", "proxied/b.png"]);
    }

    #[test]
    fn unterminated_input_does_not_panic() {
        let nodes = parse_html(r#"<div class="x"><p>open <span"#);
        assert_eq!(nodes.len(), 1);
    }
}
