//! Host-facing types — the narrow surface the editor sees.
//!
//! - [`QueryRequest`] — what the host passes to a completion query.
//! - [`CompletionList`] — the placeholder handed back to the host immediately
//!   and filled in exactly once when the query settles.
//! - [`CompletionItem`] / [`CompletionFlags`] — the final contents of a
//!   placeholder.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Identifies one editor view (buffer pane) owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewId(pub u64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Arguments of a host completion query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// View the query was issued in.
    pub view: ViewId,
    /// Text typed before the cursor that the completions should extend.
    pub prefix: String,
    /// Cursor offsets, one per selection.
    pub locations: Vec<usize>,
}

impl QueryRequest {
    pub fn new(view: ViewId, prefix: impl Into<String>, locations: Vec<usize>) -> Self {
        Self {
            view,
            prefix: prefix.into(),
            locations,
        }
    }
}

/// A single completion entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionItem {
    /// Text shown in the completion popup.
    pub label: String,
    /// Optional annotation shown next to the label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CompletionItem {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<&str> for CompletionItem {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

impl From<String> for CompletionItem {
    fn from(label: String) -> Self {
        Self::new(label)
    }
}

/// How the host should treat its own word-based completions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionFlags {
    /// Merge with and filter alongside the host's defaults.
    #[default]
    None,
    /// Show only these items; skip the host's default filtering.
    SuppressDefaultFiltering,
}

/// Final contents of a [`CompletionList`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub items: Vec<CompletionItem>,
    pub flags: CompletionFlags,
}

/// Placeholder returned to the host from a completion query.
///
/// Starts unresolved and is resolved exactly once; later resolve attempts are
/// ignored. Clones share the same underlying slot, so the bridge keeps one
/// clone to write into while the host holds another to read from.
///
/// # Examples
///
/// ```
/// use plugbridge::host::{CompletionFlags, CompletionList};
///
/// let list = CompletionList::new();
/// assert!(!list.is_resolved());
///
/// assert!(list.resolve(vec!["foo".into()], CompletionFlags::SuppressDefaultFiltering));
/// assert!(!list.resolve(Vec::new(), CompletionFlags::None));
///
/// let labels: Vec<_> = list.items().unwrap().into_iter().map(|i| i.label).collect();
/// assert_eq!(labels, ["foo"]);
/// ```
#[derive(Clone)]
pub struct CompletionList {
    slot: Arc<watch::Sender<Option<Resolution>>>,
}

impl Default for CompletionList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompletionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionList")
            .field("resolution", &*self.slot.borrow())
            .finish()
    }
}

impl CompletionList {
    /// Creates an unresolved placeholder.
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Writes the final contents. Returns `false` if the list was already resolved.
    pub fn resolve(&self, items: Vec<CompletionItem>, flags: CompletionFlags) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(Resolution { items, flags });
            true
        })
    }

    /// Resolves to an empty list with no flags.
    pub fn resolve_empty(&self) -> bool {
        self.resolve(Vec::new(), CompletionFlags::None)
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// A copy of the final contents, if resolved.
    pub fn snapshot(&self) -> Option<Resolution> {
        self.slot.borrow().clone()
    }

    /// The resolved items, if resolved.
    pub fn items(&self) -> Option<Vec<CompletionItem>> {
        self.slot.borrow().as_ref().map(|r| r.items.clone())
    }

    /// The resolved flags, if resolved.
    pub fn flags(&self) -> Option<CompletionFlags> {
        self.slot.borrow().as_ref().map(|r| r.flags)
    }

    /// Waits until the list is resolved and returns its contents.
    pub async fn resolved(&self) -> Resolution {
        let mut rx = self.slot.subscribe();
        // Cannot fail: `self` keeps the sender alive.
        let _ = rx.wait_for(Option::is_some).await;
        let resolution = rx.borrow().clone().unwrap_or_default();
        resolution
    }
}
