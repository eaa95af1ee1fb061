use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LibraryType {
    Movie,
    Show,
    Other(String),
}

impl From<String> for LibraryType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "movie" => LibraryType::Movie,
            "show" => LibraryType::Show,
            _ => LibraryType::Other(value),
        }
    }
}

impl From<LibraryType> for String {
    fn from(value: LibraryType) -> Self {
        match value {
            LibraryType::Movie => "movie".to_string(),
            LibraryType::Show => "show".to_string(),
            LibraryType::Other(other) => other,
        }
    }
}

/// A library section (`MediaContainer.Directory[]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: LibraryType,
    #[serde(default)]
    pub title: String,
}

const LIBRARY_SCAN_ACTIVITY: &str = "library.update.section";

/// One entry of the server's in-flight activity list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Activity {
    pub kind: String,
    pub title: String,
    pub progress: Option<f64>,
    pub library_section_id: Option<String>,
}

impl Activity {
    /// A library rescan or metadata refresh in progress.
    pub fn is_library_scan(&self) -> bool {
        self.kind == LIBRARY_SCAN_ACTIVITY
    }
}
