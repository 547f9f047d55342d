//! In-memory document.
//!
//! [`MemoryPage`] holds a flat list of [`MemoryElement`]s in document order
//! and an optional location. It implements [`PageContext`] and is what the
//! tests and the command-line front end run the engine against.
//!
//! # Example
//!
//! ```rust
//! use marku::page::memory::{MemoryElement, MemoryPage};
//! use marku::page::{find_read_targets, READ_MARKER};
//!
//! let page = MemoryPage::with_location("https://blog.example/post?id=7").unwrap();
//! let views = page.append(MemoryElement::new().with_attr(READ_MARKER, "views"));
//!
//! assert_eq!(find_read_targets(&page).len(), 1);
//! assert_eq!(views.text(), "");
//! ```

use crate::page::{Element, ElementRef, PageContext};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

#[derive(Debug, Default)]
struct ElementData {
    attributes: Vec<(String, String)>,
    classes: Vec<String>,
    text: String,
}

/// An element with attributes, classes and text.
#[derive(Debug, Default)]
pub struct MemoryElement {
    data: RwLock<ElementData>,
}

impl MemoryElement {
    /// Creates an element with no attributes, classes or text.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute, returning `self` for method chaining.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let data = self
            .data
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set_attr(&mut data.attributes, name.into(), value.into());
        self
    }

    /// Sets the initial text, returning `self` for method chaining.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.data
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .text = text.into();
        self
    }

    /// Sets or replaces an attribute on a live element.
    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        set_attr(&mut self.write().attributes, name.into(), value.into());
    }

    /// Removes an attribute.
    pub fn remove_attribute(&self, name: &str) {
        self.write().attributes.retain(|(n, _)| n != name);
    }

    /// Returns the text content.
    pub fn text(&self) -> String {
        self.read().text.clone()
    }

    /// Returns the classes in the order they were added.
    pub fn classes(&self) -> Vec<String> {
        self.read().classes.clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, ElementData> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ElementData> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn set_attr(attributes: &mut Vec<(String, String)>, name: String, value: String) {
    if let Some(pos) = attributes.iter().position(|(n, _)| *n == name) {
        attributes[pos].1 = value;
    } else {
        attributes.push((name, value));
    }
}

impl Element for MemoryElement {
    fn attribute(&self, name: &str) -> Option<String> {
        self.read()
            .attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn set_text(&self, text: &str) {
        let mut data = self.write();
        data.text.clear();
        data.text.push_str(text);
    }

    fn has_class(&self, class: &str) -> bool {
        self.read().classes.iter().any(|c| c == class)
    }

    fn add_class(&self, class: &str) {
        let mut data = self.write();
        if !data.classes.iter().any(|c| c == class) {
            data.classes.push(class.to_string());
        }
    }

    fn remove_class(&self, class: &str) {
        self.write().classes.retain(|c| c != class);
    }
}

/// A document made of [`MemoryElement`]s.
#[derive(Debug, Default)]
pub struct MemoryPage {
    elements: RwLock<Vec<Arc<MemoryElement>>>,
    location: Option<Url>,
}

impl MemoryPage {
    /// Creates an empty page without a location.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty page located at `location`.
    pub fn with_location(location: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            elements: RwLock::default(),
            location: Some(Url::parse(location)?),
        })
    }

    /// Appends an element and returns a handle to it.
    pub fn append(&self, element: MemoryElement) -> Arc<MemoryElement> {
        let element = Arc::new(element);
        self.elements
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Arc::clone(&element));
        element
    }

    /// Removes an element from the page. In-flight batches holding the
    /// handle still update it.
    pub fn remove(&self, element: &Arc<MemoryElement>) {
        self.elements
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|e| !Arc::ptr_eq(e, element));
    }

    /// Returns the number of elements on the page.
    pub fn len(&self) -> usize {
        self.elements
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Returns `true` if the page has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageContext for MemoryPage {
    fn query_marked(&self, marker: &str) -> Vec<ElementRef> {
        self.elements
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|e| e.attribute(marker).is_some())
            .map(|e| Arc::clone(e) as ElementRef)
            .collect()
    }

    fn current_path(&self, include_query: bool) -> Option<String> {
        let location = self.location.as_ref()?;
        let mut path = location.path().to_string();
        if include_query {
            if let Some(query) = location.query() {
                path.push('?');
                path.push_str(query);
            }
        }
        Some(path)
    }
}
