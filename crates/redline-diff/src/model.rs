use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffTag {
    Equal,
    Delete,
    Insert,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOp {
    pub tag: DiffTag,
    pub text: String,
}

impl DiffOp {
    pub fn new(tag: DiffTag, text: impl Into<String>) -> Self {
        Self {
            tag,
            text: text.into(),
        }
    }

    pub fn equal(text: impl Into<String>) -> Self {
        Self::new(DiffTag::Equal, text)
    }

    pub fn delete(text: impl Into<String>) -> Self {
        Self::new(DiffTag::Delete, text)
    }

    pub fn insert(text: impl Into<String>) -> Self {
        Self::new(DiffTag::Insert, text)
    }
}

/// Token size the diff runs on. Both variants keep extended grapheme
/// clusters intact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Grapheme,
    Word,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffAlgorithm {
    #[default]
    Myers,
    Patience,
    Lcs,
}

impl From<DiffAlgorithm> for similar::Algorithm {
    fn from(value: DiffAlgorithm) -> Self {
        match value {
            DiffAlgorithm::Myers => similar::Algorithm::Myers,
            DiffAlgorithm::Patience => similar::Algorithm::Patience,
            DiffAlgorithm::Lcs => similar::Algorithm::Lcs,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffOptions {
    pub granularity: Granularity,
    pub algorithm: DiffAlgorithm,
    pub semantic_cleanup: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            granularity: Granularity::Grapheme,
            algorithm: DiffAlgorithm::Myers,
            semantic_cleanup: true,
        }
    }
}

/// Concatenates the `equal` and `delete` texts, which is the old side.
pub fn old_text(ops: &[DiffOp]) -> String {
    ops.iter()
        .filter(|op| op.tag != DiffTag::Insert)
        .map(|op| op.text.as_str())
        .collect()
}

/// Concatenates the `equal` and `insert` texts, which is the new side.
pub fn new_text(ops: &[DiffOp]) -> String {
    ops.iter()
        .filter(|op| op.tag != DiffTag::Delete)
        .map(|op| op.text.as_str())
        .collect()
}
