//! PC-007: Runtime values with string content, named attributes and provenance spans.

use indexmap::IndexMap;
use std::rc::Rc;

/// An attribute pair. Keys are values too so they keep their provenance.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub key: Rc<Value>,
    pub value: Rc<Value>,
}

/// Range `start..start+len` of the parent's content that `value` produced.
#[derive(Debug, Clone)]
pub struct Span {
    pub start: usize,
    pub len: usize,
    pub value: Rc<Value>,
}

/// The single runtime shape of every evaluated node.
#[derive(Debug, Clone, Default)]
pub struct Value {
    pub content: String,
    pub attributes: IndexMap<String, Attribute>,
    pub spans: Vec<Span>,
    /// Name of the node kind that produced this value.
    pub origin: &'static str,
}

impl Value {
    pub fn text(origin: &'static str, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin,
            ..Self::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Truthiness for flags such as `always`: any non-empty content.
    pub fn is_truthy(&self) -> bool {
        !self.content.is_empty()
    }

    /// The innermost recorded value producing the byte at `offset`.
    pub fn value_at(self: &Rc<Self>, offset: usize) -> Rc<Value> {
        self.spans
            .iter()
            .find(|s| offset >= s.start && offset < s.start + s.len)
            .map(|s| s.value.value_at(offset - s.start))
            .unwrap_or_else(|| Rc::clone(self))
    }

    /// Quote-aware whitespace split. Each word comes with the innermost value
    /// whose span covers it, or `self` when no span does.
    pub fn words(self: &Rc<Self>) -> Vec<(String, Rc<Value>)> {
        let content = &self.content;
        let bytes = content.as_bytes();
        let mut out = Vec::new();
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i].is_ascii_whitespace() {
                i += 1;
                continue;
            }
            let start = i;
            let mut word = String::new();
            let mut quoted = false;
            while i < bytes.len() && (quoted || !bytes[i].is_ascii_whitespace()) {
                if bytes[i] == b'"' {
                    if quoted && bytes.get(i + 1) == Some(&b'"') {
                        word.push('"');
                        i += 2;
                        continue;
                    }
                    quoted = !quoted;
                    i += 1;
                    continue;
                }
                let ch_len = content[i..].chars().next().map_or(1, char::len_utf8);
                word.push_str(&content[i..i + ch_len]);
                i += ch_len;
            }
            out.push((word, self.covering(start, i)));
        }
        out
    }

    fn covering(self: &Rc<Self>, start: usize, end: usize) -> Rc<Value> {
        match self
            .spans
            .iter()
            .find(|s| s.start <= start && s.start + s.len >= end)
        {
            Some(s) => s.value.covering(start - s.start, end - s.start),
            None => Rc::clone(self),
        }
    }

    /// Every span, flattened to absolute offsets: `(start, end, origin)`.
    pub fn flat_sources(&self) -> Vec<(usize, usize, &'static str)> {
        let mut out = vec![(0, self.content.len(), self.origin)];
        for span in &self.spans {
            for (s, e, origin) in span.value.flat_sources() {
                out.push((span.start + s, span.start + e.min(span.len), origin));
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        if self.attributes.is_empty() {
            return serde_json::Value::String(self.content.clone());
        }
        let attributes: serde_json::Map<String, serde_json::Value> = self
            .attributes
            .iter()
            .map(|(k, a)| (k.clone(), a.value.to_json()))
            .collect();
        serde_json::json!({
            "content": self.content,
            "attributes": attributes,
        })
    }
}

/// Quote `content` when it would not survive a whitespace split intact.
pub fn quote(content: &str) -> String {
    let needs = content.is_empty()
        || content.contains('"')
        || content.chars().any(|c| c.is_ascii_whitespace());
    if needs {
        format!("\"{}\"", content.replace('"', "\"\""))
    } else {
        content.to_string()
    }
}

/// Accumulates content and records a span for every value written.
#[derive(Debug, Default)]
pub struct ValueBuilder {
    content: String,
    spans: Vec<Span>,
}

impl ValueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_str(&mut self, s: &str) {
        self.content.push_str(s);
    }

    pub fn write_value(&mut self, value: Rc<Value>, quoted: bool) {
        let text = if quoted {
            quote(&value.content)
        } else {
            value.content.clone()
        };
        self.spans.push(Span {
            start: self.content.len(),
            len: text.len(),
            value,
        });
        self.content.push_str(&text);
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn finish(self, origin: &'static str) -> Value {
        Value {
            content: self.content,
            attributes: IndexMap::new(),
            spans: self.spans,
            origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Rc<Value> {
        Rc::new(Value::text("literal", s))
    }

    #[test]
    fn test_pc007_quote() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("two words"), "\"two words\"");
        assert_eq!(quote("say \"hi\" now"), "\"say \"\"hi\"\" now\"");
        assert_eq!(quote(""), "\"\"");
    }

    #[test]
    fn test_pc007_builder_spans() {
        let mut b = ValueBuilder::new();
        b.write_str("hello ");
        b.write_value(text("world"), false);
        let v = b.finish("string");
        assert_eq!(v.content, "hello world");
        assert_eq!(v.spans.len(), 1);
        assert_eq!((v.spans[0].start, v.spans[0].len), (6, 5));
    }

    #[test]
    fn test_pc007_words_quote_aware() {
        let mut b = ValueBuilder::new();
        b.write_value(text("/a"), true);
        b.write_str(" ");
        b.write_value(text("b c"), true);
        b.write_str(" ");
        b.write_value(text(""), true);
        let v = Rc::new(b.finish("list"));
        assert_eq!(v.content, "/a \"b c\" \"\"");
        let words = v.words();
        let texts: Vec<_> = words.iter().map(|(w, _)| w.as_str()).collect();
        assert_eq!(texts, vec!["/a", "b c", ""]);
        assert_eq!(words[1].1.content, "b c");
    }

    #[test]
    fn test_pc007_words_escaped_quote() {
        let v = Rc::new(Value::text("literal", "\"a \"\"q\"\"\" x"));
        let texts: Vec<_> = v.words().into_iter().map(|(w, _)| w).collect();
        assert_eq!(texts, vec!["a \"q\"", "x"]);
    }

    #[test]
    fn test_pc007_words_whole_content_is_self() {
        let v = Rc::new(Value::text("output", "/cache/abc"));
        let words = v.words();
        assert_eq!(words.len(), 1);
        assert!(Rc::ptr_eq(&words[0].1, &v));
    }

    #[test]
    fn test_pc007_words_without_span() {
        let v = Rc::new(Value::text("literal", "a b"));
        let words = v.words();
        assert_eq!(words.len(), 2);
        assert!(words.iter().all(|(_, src)| Rc::ptr_eq(src, &v)));
    }

    #[test]
    fn test_pc007_words_descend_to_innermost() {
        let dep = text("/cache/0123");
        let mut s = ValueBuilder::new();
        s.write_value(Rc::clone(&dep), false);
        let s = Rc::new(s.finish("string"));
        let mut list = ValueBuilder::new();
        list.write_value(s, true);
        list.write_str(" ");
        list.write_value(text("other"), true);
        let list = Rc::new(list.finish("list"));
        let words = list.words();
        assert!(Rc::ptr_eq(&words[0].1, &dep));
        assert_eq!(words[1].1.content, "other");
    }

    #[test]
    fn test_pc007_value_at_nested() {
        let mut inner = ValueBuilder::new();
        inner.write_str("x");
        inner.write_value(text("yz"), false);
        let inner = Rc::new(inner.finish("string"));
        let mut outer = ValueBuilder::new();
        outer.write_str(">");
        outer.write_value(Rc::clone(&inner), false);
        let outer = Rc::new(outer.finish("string"));
        assert_eq!(outer.value_at(0).origin, "string");
        assert_eq!(outer.value_at(2).content, "yz");
        assert_eq!(outer.value_at(1).content, "xyz");
    }

    #[test]
    fn test_pc007_flat_sources() {
        let mut b = ValueBuilder::new();
        b.write_str("a ");
        b.write_value(text("bc"), false);
        let v = b.finish("string");
        assert_eq!(
            v.flat_sources(),
            vec![(0, 4, "string"), (2, 4, "literal")]
        );
    }

    #[test]
    fn test_pc007_to_json() {
        assert_eq!(text("x").to_json(), serde_json::json!("x"));
        let mut v = Value::text("dict", "");
        v.attributes.insert(
            "a".into(),
            Attribute {
                key: text("a"),
                value: text("1"),
            },
        );
        assert_eq!(
            v.to_json(),
            serde_json::json!({"content": "", "attributes": {"a": "1"}})
        );
    }

    #[test]
    fn test_pc007_truthiness() {
        assert!(!Value::text("literal", "").is_truthy());
        assert!(Value::text("literal", "1").is_truthy());
    }
}
