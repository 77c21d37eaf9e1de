//! Diagnostic classes and their clinical metadata

use crate::error::EnsembleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of diagnostic classes every model must output.
pub const CLASS_COUNT: usize = 7;

/// Diagnostic category predicted by the classifiers.
///
/// Discriminants match the output ordering shared by all models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClassLabel {
    /// Actinic keratoses and intraepithelial carcinoma
    Akiec = 0,
    /// Basal cell carcinoma
    Bcc = 1,
    /// Benign keratosis-like lesions
    Bkl = 2,
    /// Dermatofibroma
    Df = 3,
    /// Melanoma
    Mel = 4,
    /// Melanocytic nevi
    Nv = 5,
    /// Vascular lesions
    Vasc = 6,
}

impl ClassLabel {
    /// All classes in increasing id order.
    pub const ALL: [ClassLabel; CLASS_COUNT] = [
        ClassLabel::Akiec,
        ClassLabel::Bcc,
        ClassLabel::Bkl,
        ClassLabel::Df,
        ClassLabel::Mel,
        ClassLabel::Nv,
        ClassLabel::Vasc,
    ];

    /// Stable integer identifier (0-6).
    pub fn id(self) -> usize {
        self as usize
    }

    /// Short class code, e.g. `mel`.
    pub fn code(self) -> &'static str {
        match self {
            ClassLabel::Akiec => "akiec",
            ClassLabel::Bcc => "bcc",
            ClassLabel::Bkl => "bkl",
            ClassLabel::Df => "df",
            ClassLabel::Mel => "mel",
            ClassLabel::Nv => "nv",
            ClassLabel::Vasc => "vasc",
        }
    }

    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Static clinical metadata for this class.
    pub fn metadata(self) -> &'static ClassMetadata {
        match self {
            ClassLabel::Akiec => &AKIEC,
            ClassLabel::Bcc => &BCC,
            ClassLabel::Bkl => &BKL,
            ClassLabel::Df => &DF,
            ClassLabel::Mel => &MEL,
            ClassLabel::Nv => &NV,
            ClassLabel::Vasc => &VASC,
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ClassLabel {
    type Err = EnsembleError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|label| label.code() == code)
            .ok_or_else(|| EnsembleError::UnknownClass(code.to_string()))
    }
}

impl Serialize for ClassLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for ClassLabel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        code.parse().map_err(serde::de::Error::custom)
    }
}

/// Clinical risk tier, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

/// Read-only display record attached to a resolved class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassMetadata {
    pub display_name: &'static str,
    pub risk: RiskTier,
    pub description: &'static str,
    pub recommendation: &'static str,
}

static AKIEC: ClassMetadata = ClassMetadata {
    display_name: "Actinic Keratosis / Intraepithelial Carcinoma",
    risk: RiskTier::High,
    description: "A pre-cancerous growth or early form of skin cancer.",
    recommendation: "Consult a dermatologist promptly for evaluation.",
};

static BCC: ClassMetadata = ClassMetadata {
    display_name: "Basal Cell Carcinoma",
    risk: RiskTier::High,
    description: "The most common type of skin cancer, usually slow-growing.",
    recommendation: "Consult a dermatologist for proper treatment options.",
};

static BKL: ClassMetadata = ClassMetadata {
    display_name: "Benign Keratosis",
    risk: RiskTier::Low,
    description: "A non-cancerous skin growth that appears as a waxy, scaly patch.",
    recommendation: "Generally no treatment needed, but monitor for changes.",
};

static DF: ClassMetadata = ClassMetadata {
    display_name: "Dermatofibroma",
    risk: RiskTier::Low,
    description: "A common benign skin growth or nodule that is usually harmless.",
    recommendation: "No treatment needed unless causing discomfort.",
};

static MEL: ClassMetadata = ClassMetadata {
    display_name: "Melanoma",
    risk: RiskTier::VeryHigh,
    description: "A serious form of skin cancer that can spread if not treated early.",
    recommendation: "Seek immediate medical attention.",
};

static NV: ClassMetadata = ClassMetadata {
    display_name: "Melanocytic Nevus (Mole)",
    risk: RiskTier::Low,
    description: "A benign growth of melanocytes, usually harmless but should be monitored.",
    recommendation: "Monitor for changes in size, shape, or color.",
};

static VASC: ClassMetadata = ClassMetadata {
    display_name: "Vascular Lesion",
    risk: RiskTier::Low,
    description: "Abnormalities of blood vessels that appear on the skin surface.",
    recommendation: "Typically harmless but consult a doctor if concerned.",
};

/// Clinical annotator: resolve a class code to its metadata.
///
/// Only fails for codes outside the fixed set, which the pipeline never
/// produces.
pub fn annotate(code: &str) -> Result<&'static ClassMetadata, EnsembleError> {
    let label: ClassLabel = code.parse()?;
    Ok(label.metadata())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_and_codes_are_stable() {
        let codes: Vec<&str> = ClassLabel::ALL.iter().map(|c| c.code()).collect();
        assert_eq!(codes, ["akiec", "bcc", "bkl", "df", "mel", "nv", "vasc"]);

        for (i, label) in ClassLabel::ALL.iter().enumerate() {
            assert_eq!(label.id(), i);
            assert_eq!(ClassLabel::from_id(i), Some(*label));
        }
        assert_eq!(ClassLabel::from_id(CLASS_COUNT), None);
    }

    #[test]
    fn test_risk_tier_ordering() {
        assert!(RiskTier::Low < RiskTier::High);
        assert!(RiskTier::High < RiskTier::VeryHigh);
        assert_eq!(
            serde_json::to_string(&RiskTier::VeryHigh).unwrap(),
            "\"Very High\""
        );
    }

    #[test]
    fn test_annotate_known_codes() {
        let mel = annotate("mel").unwrap();
        assert_eq!(mel.display_name, "Melanoma");
        assert_eq!(mel.risk, RiskTier::VeryHigh);

        let nv = annotate("nv").unwrap();
        assert_eq!(nv.risk, RiskTier::Low);
        assert_eq!(nv.recommendation, "Monitor for changes in size, shape, or color.");

        assert_eq!(annotate("bcc").unwrap().risk, RiskTier::High);
    }

    #[test]
    fn test_annotate_unknown_code() {
        let err = annotate("melanoma").unwrap_err();
        assert!(matches!(err, EnsembleError::UnknownClass(code) if code == "melanoma"));
    }

    #[test]
    fn test_every_class_has_metadata() {
        for label in ClassLabel::ALL {
            let meta = label.metadata();
            assert!(!meta.display_name.is_empty());
            assert!(!meta.description.is_empty());
            assert!(!meta.recommendation.is_empty());
        }
    }

    #[test]
    fn test_label_serializes_as_code() {
        let json = serde_json::to_string(&ClassLabel::Vasc).unwrap();
        assert_eq!(json, "\"vasc\"");
        let back: ClassLabel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ClassLabel::Vasc);
    }
}
