//! Page access: marked elements, their attributes and their lifecycle classes.
//!
//! The engine never talks to a concrete document. It goes through two small
//! traits:
//!
//! - [`PageContext`] finds elements carrying a marker attribute and reports
//!   the current page path.
//! - [`Element`] exposes the attribute, text and class operations the
//!   batchers need.
//!
//! [`NoDocument`] is the context used when no document exists: every query
//! returns nothing. [`memory::MemoryPage`] is an in-memory document for tests
//! and headless hosts.
//!
//! # Directives
//!
//! | Attribute | Meaning |
//! |-----------|---------|
//! | [`READ_MARKER`] (`marku-get-count`) | display the count of the given key |
//! | [`WRITE_MARKER`] (`marku-set-count`) | increment the given key once |
//! | [`INCREMENT_ATTR`] (`marku-inc`) | increment magnitude, default 1 |
//!
//! # Lifecycle classes
//!
//! ```text
//!   read:   (none) ──► marku-loading ──► marku-loaded | marku-error
//!   write:  (none) ──► marku-processing ──► marku-submitted | marku-submit-error
//! ```

pub mod memory;

use std::fmt::Debug;
use std::sync::Arc;

/// Attribute marking an element whose text shows a counter value.
pub const READ_MARKER: &str = "marku-get-count";

/// Attribute marking an element that increments a counter.
pub const WRITE_MARKER: &str = "marku-set-count";

/// Attribute carrying the increment magnitude of a write element.
pub const INCREMENT_ATTR: &str = "marku-inc";

/// A live element of the page.
///
/// All methods take `&self`: implementations use interior mutability so that
/// elements can be shared between the scanner, the batchers and the host.
pub trait Element: Debug + Send + Sync {
    /// Returns the value of an attribute, or `None` if it is absent.
    fn attribute(&self, name: &str) -> Option<String>;

    /// Replaces the text content of the element.
    fn set_text(&self, text: &str);

    /// Returns `true` if the element carries the class.
    fn has_class(&self, class: &str) -> bool;

    /// Adds a class. Adding a class twice keeps a single copy.
    fn add_class(&self, class: &str);

    /// Removes a class if present.
    fn remove_class(&self, class: &str);
}

/// Shared handle to an element.
pub type ElementRef = Arc<dyn Element>;

/// The document the engine scans.
pub trait PageContext: Send + Sync {
    /// Returns every element carrying the attribute `marker`, in document
    /// order.
    fn query_marked(&self, marker: &str) -> Vec<ElementRef>;

    /// Returns the path of the current page, with its query string when
    /// `include_query` is set. `None` when the page has no location.
    fn current_path(&self, include_query: bool) -> Option<String>;
}

/// Context without a document. Queries find nothing and there is no path.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDocument;

impl PageContext for NoDocument {
    fn query_marked(&self, _marker: &str) -> Vec<ElementRef> {
        Vec::new()
    }

    fn current_path(&self, _include_query: bool) -> Option<String> {
        None
    }
}

/// Returns the elements marked for count display.
pub fn find_read_targets(page: &dyn PageContext) -> Vec<ElementRef> {
    page.query_marked(READ_MARKER)
}

/// Returns the elements marked for increment submission.
pub fn find_write_targets(page: &dyn PageContext) -> Vec<ElementRef> {
    page.query_marked(WRITE_MARKER)
}

/// State of a read element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadState {
    /// A batch read is in flight.
    Loading,
    /// The count is displayed.
    Loaded,
    /// The count could not be retrieved.
    Error,
}

impl ReadState {
    const ALL: [ReadState; 3] = [ReadState::Loading, ReadState::Loaded, ReadState::Error];

    /// Class applied to the element in this state.
    pub const fn class(self) -> &'static str {
        match self {
            ReadState::Loading => "marku-loading",
            ReadState::Loaded => "marku-loaded",
            ReadState::Error => "marku-error",
        }
    }

    /// Reads the state of an element from its classes.
    pub fn of(element: &dyn Element) -> Option<Self> {
        Self::ALL.into_iter().find(|s| element.has_class(s.class()))
    }

    /// Moves the element into this state, dropping any other read class.
    pub fn apply(self, element: &dyn Element) {
        for other in Self::ALL {
            if other != self {
                element.remove_class(other.class());
            }
        }
        element.add_class(self.class());
    }
}

/// State of a write element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteState {
    /// A batch write is in flight.
    Processing,
    /// The increment was accepted. Sticky for the page lifetime.
    Submitted,
    /// The increment was not accepted; retried on the next invocation.
    SubmitError,
}

impl WriteState {
    const ALL: [WriteState; 3] = [
        WriteState::Processing,
        WriteState::Submitted,
        WriteState::SubmitError,
    ];

    /// Class applied to the element in this state.
    pub const fn class(self) -> &'static str {
        match self {
            WriteState::Processing => "marku-processing",
            WriteState::Submitted => "marku-submitted",
            WriteState::SubmitError => "marku-submit-error",
        }
    }

    /// Reads the state of an element from its classes.
    pub fn of(element: &dyn Element) -> Option<Self> {
        Self::ALL.into_iter().find(|s| element.has_class(s.class()))
    }

    /// Moves the element into this state, dropping any other write class.
    pub fn apply(self, element: &dyn Element) {
        for other in Self::ALL {
            if other != self {
                element.remove_class(other.class());
            }
        }
        element.add_class(self.class());
    }

    /// Elements in this state must not join a new write batch.
    pub fn excludes_from_batch(element: &dyn Element) -> bool {
        element.has_class(WriteState::Processing.class())
            || element.has_class(WriteState::Submitted.class())
    }
}

/// Returns the non-empty value of `attr`, or `None` when it is missing or
/// empty.
pub(crate) fn counter_key(element: &dyn Element, attr: &str) -> Option<String> {
    element.attribute(attr).filter(|key| !key.is_empty())
}
