//! Navigation tree nodes built by the content pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One node of the site navigation tree.
///
/// Only `title`, `url`, `order` and `children` describe the structure of the
/// tree. Everything else a pipeline attaches (descriptions, icons, ...) lands
/// in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavNode {
    /// Display title.
    pub title: String,
    /// Target URL; section headings may have none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Explicit sort order, if the page declared one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    /// Child nodes in display order.
    #[serde(default)]
    pub children: Vec<NavNode>,
    /// Any further metadata carried along for rendering.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NavNode {
    /// Creates a leaf node pointing at `url`.
    pub fn leaf(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Appends a child, returning `self` for chaining.
    pub fn with_child(mut self, child: NavNode) -> Self {
        self.children.push(child);
        self
    }

    /// Sets the sort order.
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}
