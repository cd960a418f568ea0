use quick_xml::events::BytesStart;

use crate::error::ReportError;

/// An owned XML element with its attributes and child elements.
///
/// Only the subtree of the `<host>` currently being read is ever materialised;
/// it is dropped as soon as the host record has been built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn from_start(start: &BytesStart<'_>) -> Result<Self, ReportError> {
        let mut element = Self::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn required_attr(&self, key: &'static str) -> Result<&str, ReportError> {
        self.attr(key).ok_or_else(|| ReportError::MissingAttribute {
            attribute: key,
            element: self.name.clone(),
        })
    }

    /// First direct child with the given name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Like [`Element::find`], but a missing child is a structural error.
    pub fn required(&self, name: &'static str) -> Result<&Element, ReportError> {
        self.find(name).ok_or_else(|| ReportError::MissingElement {
            element: name,
            parent: self.name.clone(),
        })
    }

    /// All elements named `name` in this subtree, `self` included, in document order.
    pub fn descendants<'a>(&'a self, name: &'a str) -> Descendants<'a> {
        Descendants {
            stack: vec![self],
            name,
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
    name: &'a str,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(element) = self.stack.pop() {
            self.stack.extend(element.children.iter().rev());
            if element.name == self.name {
                return Some(element);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Element {
        Element::new("port")
            .with_attr("portid", "22")
            .with_child(Element::new("state").with_attr("state", "open"))
            .with_child(Element::new("script").with_attr("id", "a"))
            .with_child(
                Element::new("extra").with_child(Element::new("script").with_attr("id", "b")),
            )
            .with_child(Element::new("script").with_attr("id", "c"))
    }

    #[test]
    fn test_find_and_attributes() {
        let port = sample();
        assert_eq!(port.attr("portid"), Some("22"));
        assert_eq!(port.attr("protocol"), None);
        assert_eq!(port.find("state").and_then(|s| s.attr("state")), Some("open"));
        assert!(port.find("service").is_none());
    }

    #[test]
    fn test_required_reports_missing_names() {
        let port = sample();
        let err = port.required("service").unwrap_err();
        assert!(matches!(err, ReportError::MissingElement { element: "service", .. }));

        let err = port.required_attr("protocol").unwrap_err();
        assert_eq!(err.to_string(), "attribute 'protocol' not found on <port>");
    }

    #[test]
    fn test_descendants_in_document_order() {
        let port = sample();
        let ids: Vec<_> = port
            .descendants("script")
            .filter_map(|s| s.attr("id"))
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_descendants_includes_self() {
        let port = sample();
        assert_eq!(port.descendants("port").count(), 1);
    }
}
