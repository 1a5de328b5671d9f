use serde::{Deserialize, Serialize};

/// One row of the species catalog. Read-only from the application's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimalRecord {
    pub id: i64,
    pub species: String,
    pub card_url: String,
    pub fun_fact: String,
}

/// A footprint image to be linked to a species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFootprint {
    pub animal_id: i64,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintRecord {
    pub id: i64,
    pub animal_id: i64,
    pub image_url: String,
}

/// What the classifier hands back for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub animal: String,
    /// In `[0.70, 1.00)`.
    pub confidence: f64,
    pub card_url: String,
    pub fun_fact: String,
}

/// A classification together with where the scanned image ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub image_url: String,
    #[serde(flatten)]
    pub classification: ClassificationResult,
}

/// JSON body returned by the upload endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Accepted { success: bool, redirect: String },
    Rejected { success: bool, error: String },
}

impl UploadResponse {
    pub fn accepted(redirect: impl Into<String>) -> Self {
        UploadResponse::Accepted {
            success: true,
            redirect: redirect.into(),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "unknown error".to_string();
        }
        UploadResponse::Rejected {
            success: false,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadResponse::Accepted { .. })
    }
}

/// Dataset partition an image is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Validation, Split::Test];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}
