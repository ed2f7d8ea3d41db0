/// A generic element of a force-field document.
///
/// Handlers are read from and written to this tree; the XML layer only maps
/// it to and from text. Attribute order is preserved so that documents
/// round-trip without reshuffling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Section {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Section>,
}

impl Section {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an attribute, replacing an existing value in place.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl ToString) {
        let name = name.into();
        let value = value.to_string();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn push_child(&mut self, child: Section) {
        self.children.push(child);
    }

    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Section> + 'a {
        self.children.iter().filter(move |child| child.tag == tag)
    }
}
