//! Protocol elements: the normalized message tree handed to engines as the
//! element builder and rendered into logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

const TEXT_TAG: &str = "text";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Element>,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn text(content: &str) -> Self {
        Self::new(TEXT_TAG).attr("content", Value::String(content.to_string()))
    }

    pub fn attr(mut self, key: &str, value: Value) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }

    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn get_attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }
}

fn escape(raw: &str, quote: bool) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if quote => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag == TEXT_TAG {
            let content = self
                .attrs
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return write!(f, "{}", escape(content, false));
        }

        write!(f, "<{}", self.tag)?;
        for (key, value) in &self.attrs {
            match value {
                Value::Bool(true) => write!(f, " {}", key)?,
                Value::Bool(false) | Value::Null => {}
                Value::String(s) => write!(f, " {}=\"{}\"", key, escape(s, true))?,
                other => write!(f, " {}=\"{}\"", key, escape(&other.to_string(), true))?,
            }
        }
        if self.children.is_empty() {
            return write!(f, "/>");
        }
        write!(f, ">")?;
        for child in &self.children {
            write!(f, "{}", child)?;
        }
        write!(f, "</{}>", self.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_nested() {
        let el = Element::new("message")
            .attr("id", json!("42"))
            .child(Element::new("author").attr("name", json!("bot")))
            .child(Element::text("a < b"));
        assert_eq!(
            el.to_string(),
            r#"<message id="42"><author name="bot"/>a &lt; b</message>"#
        );
    }

    #[test]
    fn test_bool_attrs() {
        let el = Element::new("at").attr("all", json!(true)).attr("quiet", json!(false));
        assert_eq!(el.to_string(), "<at all/>");
    }

    #[test]
    fn test_attr_quotes_escaped() {
        let el = Element::new("img").attr("alt", json!("say \"hi\""));
        assert_eq!(el.to_string(), r#"<img alt="say &quot;hi&quot;"/>"#);
    }
}
