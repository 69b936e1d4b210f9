//! Label model representing a Gmail label/folder

use serde::{Deserialize, Serialize};

/// Unique identifier for a label (Gmail label ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelId(pub String);

impl LabelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Well-known Gmail system labels
    pub const INBOX: &'static str = "INBOX";
    pub const SENT: &'static str = "SENT";
    pub const DRAFTS: &'static str = "DRAFT";
    pub const TRASH: &'static str = "TRASH";
    pub const SPAM: &'static str = "SPAM";
    pub const STARRED: &'static str = "STARRED";
    pub const UNREAD: &'static str = "UNREAD";
}

impl From<String> for LabelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for LabelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Whether a label is owned by the user or the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelType {
    User,
    System,
}

impl LabelType {
    /// Parse the provider's `type` field; anything but "system" is a user label
    pub fn from_provider(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("system") => Self::System,
            _ => Self::User,
        }
    }
}

/// Background/text color pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelColor {
    pub background: String,
    pub text: String,
}

/// A mail label (folder)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    /// Label ID (e.g., "INBOX", "Label_123")
    pub id: LabelId,
    /// Display name
    pub name: String,
    /// User or system label
    pub label_type: LabelType,
    /// Optional color pair
    pub color: Option<LabelColor>,
}

impl Label {
    /// Create a user label
    pub fn new(id: impl Into<LabelId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            label_type: LabelType::User,
            color: None,
        }
    }

    /// Create a system label
    pub fn system(id: impl Into<LabelId>, name: impl Into<String>) -> Self {
        Self {
            label_type: LabelType::System,
            ..Self::new(id, name)
        }
    }

    pub fn with_color(mut self, color: LabelColor) -> Self {
        self.color = Some(color);
        self
    }
}

/// Fields for creating or updating a label
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelRequest {
    pub name: String,
    pub color: Option<LabelColor>,
}

/// Labels to add and remove in one mutation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelChanges {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl LabelChanges {
    pub fn add(labels: &[&str]) -> Self {
        Self {
            add: labels.iter().map(|l| l.to_string()).collect(),
            remove: Vec::new(),
        }
    }

    pub fn remove(labels: &[&str]) -> Self {
        Self {
            add: Vec::new(),
            remove: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_type_from_provider() {
        assert_eq!(LabelType::from_provider(Some("system")), LabelType::System);
        assert_eq!(LabelType::from_provider(Some("user")), LabelType::User);
        assert_eq!(LabelType::from_provider(None), LabelType::User);
    }
}
