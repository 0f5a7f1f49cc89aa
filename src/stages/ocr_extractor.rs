use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::error::AppError;
use crate::stages::image::Image;

/// Closed set for `document_type` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Passport,
    DriversLicense,
    NationalId,
    IdCard,
    PanCard,
    Other,
}

/// The fixed nine-key fields contract every OCR backend must fill in,
/// leaving a field `null` when it could not be read (§4.4, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFields {
    pub full_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub document_number: Option<String>,
    pub nationality: Option<String>,
    pub issue_date: Option<String>,
    pub expiry_date: Option<String>,
    pub place_of_birth: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    pub document_type: DocumentType,
    pub extracted_text: String,
    pub confidence: f32,
    pub fields: DocumentFields,
}

/// Best-effort line-heuristic extractor. The text-to-fields algorithm
/// itself is a collaborator (§1, §9 open question); this backend satisfies
/// the fixed nine-key contract by pattern-matching labeled lines rather
/// than running real character recognition, so callers always get a
/// well-formed `DocumentFields` even when nothing could be read.
pub struct OcrExtractorStage;

impl OcrExtractorStage {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self)
    }

    /// `lines` stands in for whatever text a real OCR backend would
    /// recognize from `image`; production deployments replace this with an
    /// actual text-recognition pass feeding the same heuristic mapper.
    pub fn extract(&self, image: &Image, lines: &[String]) -> Result<OcrResult, AppError> {
        let _ = image;
        let mut fields = DocumentFields::default();
        let mut matched = 0usize;
        let label_map: HashMap<&str, Field> = [
            ("name", Field::FullName),
            ("full name", Field::FullName),
            ("surname", Field::FullName),
            ("date of birth", Field::DateOfBirth),
            ("dob", Field::DateOfBirth),
            ("passport no", Field::DocumentNumber),
            ("document no", Field::DocumentNumber),
            ("license no", Field::DocumentNumber),
            ("id no", Field::DocumentNumber),
            ("nationality", Field::Nationality),
            ("date of issue", Field::IssueDate),
            ("issue date", Field::IssueDate),
            ("date of expiry", Field::ExpiryDate),
            ("expiry date", Field::ExpiryDate),
            ("expiry", Field::ExpiryDate),
            ("place of birth", Field::PlaceOfBirth),
            ("address", Field::Address),
            ("sex", Field::Gender),
            ("gender", Field::Gender),
        ]
        .into_iter()
        .collect();

        for line in lines {
            if let Some((label, value)) = line.split_once(':') {
                let label = label.trim().to_ascii_lowercase();
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                if let Some(field) = label_map.get(label.as_str()) {
                    if field.assign(&mut fields, normalize_gender(field, value)) {
                        matched += 1;
                    }
                }
            }
        }

        let confidence = if lines.is_empty() {
            0.0
        } else {
            (matched as f32 / 9.0).min(1.0)
        };

        Ok(OcrResult {
            document_type: classify(lines),
            extracted_text: lines.join("\n"),
            confidence,
            fields,
        })
    }
}

fn normalize_gender(field: &Field, value: &str) -> String {
    if matches!(field, Field::Gender) {
        match value.trim().to_ascii_uppercase().chars().next() {
            Some('M') => "M".to_string(),
            Some('F') => "F".to_string(),
            _ => value.to_string(),
        }
    } else {
        value.to_string()
    }
}

enum Field {
    FullName,
    DateOfBirth,
    DocumentNumber,
    Nationality,
    IssueDate,
    ExpiryDate,
    PlaceOfBirth,
    Address,
    Gender,
}

impl Field {
    /// Returns `true` if the field was previously empty and is now set.
    fn assign(&self, fields: &mut DocumentFields, value: String) -> bool {
        let slot = match self {
            Field::FullName => &mut fields.full_name,
            Field::DateOfBirth => &mut fields.date_of_birth,
            Field::DocumentNumber => &mut fields.document_number,
            Field::Nationality => &mut fields.nationality,
            Field::IssueDate => &mut fields.issue_date,
            Field::ExpiryDate => &mut fields.expiry_date,
            Field::PlaceOfBirth => &mut fields.place_of_birth,
            Field::Address => &mut fields.address,
            Field::Gender => &mut fields.gender,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        true
    }
}

fn classify(lines: &[String]) -> DocumentType {
    let joined = lines.join(" ").to_ascii_lowercase();
    if joined.contains("passport") {
        DocumentType::Passport
    } else if joined.contains("driver") || joined.contains("licence") || joined.contains("license") {
        DocumentType::DriversLicense
    } else if joined.contains("pan card") || joined.contains("permanent account number") {
        DocumentType::PanCard
    } else if joined.contains("national id") {
        DocumentType::NationalId
    } else if joined.contains("identity card") || joined.contains("id card") {
        DocumentType::IdCard
    } else {
        DocumentType::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_image() -> Image {
        Image {
            raster: image::DynamicImage::new_rgb8(1, 1),
            bytes: vec![],
            content_type: crate::stages::image::ImageContentType::Png,
        }
    }

    #[test]
    fn extracts_labeled_fields() {
        let stage = OcrExtractorStage::new().unwrap();
        let lines = vec![
            "PASSPORT".to_string(),
            "Passport No: X1234567".to_string(),
            "Name: JANE DOE".to_string(),
            "Date of Birth: 1990-01-01".to_string(),
        ];
        let result = stage.extract(&blank_image(), &lines).unwrap();
        assert_eq!(result.document_type, DocumentType::Passport);
        assert_eq!(result.fields.document_number.as_deref(), Some("X1234567"));
        assert_eq!(result.fields.full_name.as_deref(), Some("JANE DOE"));
        assert!(result.confidence > 0.0);
    }

    #[test]
    fn empty_lines_yield_other_type_and_zero_confidence() {
        let stage = OcrExtractorStage::new().unwrap();
        let result = stage.extract(&blank_image(), &[]).unwrap();
        assert_eq!(result.document_type, DocumentType::Other);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn fields_object_always_has_nine_keys() {
        let stage = OcrExtractorStage::new().unwrap();
        let result = stage.extract(&blank_image(), &["Name: A".to_string()]).unwrap();
        let value = serde_json::to_value(&result.fields).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 9);
    }
}
