//! Certificate data, template selection and the form update reducer.

use crate::error::{CertError, Result};
use base64::Engine;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Field values shown on the certificate.
///
/// Mutated only through [`DocumentModel::apply`]; renderers and the viewport
/// read snapshots and never write back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentModel {
    pub student_name: String,
    pub start_year: String,
    pub start_month: String,
    pub course_name: String,
    pub coach_name: String,
    /// `YYYY-MM-DD` as produced by a date picker; not validated.
    pub issue_date: String,
    /// URI of an image drawn full-bleed under the template (`data:`, file path or URL).
    #[serde(default, rename = "customBgImage", skip_serializing_if = "Option::is_none")]
    pub custom_background_image: Option<String>,
}

impl Default for DocumentModel {
    fn default() -> Self {
        Self {
            student_name: "张三".to_string(),
            start_year: "2025".to_string(),
            start_month: "9".to_string(),
            course_name: "少林长拳基础".to_string(),
            coach_name: "李四".to_string(),
            issue_date: "2025-12-23".to_string(),
            custom_background_image: None,
        }
    }
}

impl DocumentModel {
    /// Applies one edit and returns the next snapshot.
    pub fn apply(&self, edit: FieldEdit) -> DocumentModel {
        let mut next = self.clone();
        match edit {
            FieldEdit::StudentName(v) => next.student_name = v,
            FieldEdit::StartYear(v) => next.start_year = v,
            FieldEdit::StartMonth(v) => next.start_month = v,
            FieldEdit::CourseName(v) => next.course_name = v,
            FieldEdit::CoachName(v) => next.coach_name = v,
            FieldEdit::IssueDate(v) => next.issue_date = v,
            FieldEdit::CustomBackground(uri) => {
                next.custom_background_image = Some(uri).filter(|u| !u.trim().is_empty());
            }
            FieldEdit::CustomBackgroundBytes(bytes) => {
                next.custom_background_image = image_bytes_to_data_uri(&bytes);
            }
            FieldEdit::ClearCustomBackground => next.custom_background_image = None,
        }
        next
    }

    pub fn has_custom_background(&self) -> bool {
        self.custom_background_image
            .as_deref()
            .is_some_and(|uri| !uri.trim().is_empty())
    }

    pub fn issue_date_parts(&self) -> DateParts {
        DateParts::parse(&self.issue_date)
    }
}

/// A single form edit: which field changed and its new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    StudentName(String),
    StartYear(String),
    StartMonth(String),
    CourseName(String),
    CoachName(String),
    IssueDate(String),
    CustomBackground(String),
    CustomBackgroundBytes(Vec<u8>),
    ClearCustomBackground,
}

impl FieldEdit {
    /// Maps a form field name (as bound in the input form) to an edit.
    pub fn from_form(name: &str, value: impl Into<String>) -> Result<FieldEdit> {
        let value = value.into();
        let edit = match name {
            "studentName" => FieldEdit::StudentName(value),
            "startYear" => FieldEdit::StartYear(value),
            "startMonth" => FieldEdit::StartMonth(value),
            "courseName" => FieldEdit::CourseName(value),
            "coachName" => FieldEdit::CoachName(value),
            "issueDate" => FieldEdit::IssueDate(value),
            "customBgImage" if value.trim().is_empty() => FieldEdit::ClearCustomBackground,
            "customBgImage" => FieldEdit::CustomBackground(value),
            other => return Err(CertError::UnknownField(other.to_string())),
        };
        Ok(edit)
    }
}

fn image_bytes_to_data_uri(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    let mime = match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::WebP) => "image/webp",
        _ => "application/octet-stream",
    };
    let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
    Some(format!("data:{mime};base64,{payload}"))
}

/// Visual layout used to interpret a [`DocumentModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateVariant {
    #[default]
    Classic,
    Traditional,
    Modern,
}

impl TemplateVariant {
    pub const ALL: [TemplateVariant; 3] = [
        TemplateVariant::Classic,
        TemplateVariant::Traditional,
        TemplateVariant::Modern,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            TemplateVariant::Classic => "classic",
            TemplateVariant::Traditional => "traditional",
            TemplateVariant::Modern => "modern",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TemplateVariant::Classic => "经典棕黄",
            TemplateVariant::Traditional => "传统正红",
            TemplateVariant::Modern => "现代简约",
        }
    }

    pub fn from_id(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "classic" => Some(TemplateVariant::Classic),
            "traditional" => Some(TemplateVariant::Traditional),
            "modern" => Some(TemplateVariant::Modern),
            _ => None,
        }
    }
}

/// Issue date split into display components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParts {
    pub year: String,
    pub month: String,
    pub day: String,
    /// False when the input did not parse and every slot carries the raw text.
    pub parsed: bool,
}

impl DateParts {
    pub fn parse(raw: &str) -> DateParts {
        let trimmed = raw.trim();
        match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            Ok(date) => DateParts {
                year: date.year().to_string(),
                month: date.month().to_string(),
                day: date.day().to_string(),
                parsed: true,
            },
            Err(_) => {
                log::debug!("issue date {trimmed:?} did not parse; showing raw text");
                DateParts {
                    year: trimmed.to_string(),
                    month: trimmed.to_string(),
                    day: trimmed.to_string(),
                    parsed: false,
                }
            }
        }
    }
}

/// Holds the current model snapshot and its version.
///
/// Each applied edit produces a whole new snapshot, so a reader never sees a
/// half-applied change.
#[derive(Debug, Clone)]
pub struct ModelStore {
    snapshot: Arc<DocumentModel>,
    version: u64,
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new(DocumentModel::default())
    }
}

impl ModelStore {
    pub fn new(model: DocumentModel) -> Self {
        Self {
            snapshot: Arc::new(model),
            version: 0,
        }
    }

    pub fn dispatch(&mut self, edit: FieldEdit) -> u64 {
        let next = self.snapshot.apply(edit);
        if next != *self.snapshot {
            self.snapshot = Arc::new(next);
            self.version = self.version.saturating_add(1);
        }
        self.version
    }

    pub fn snapshot(&self) -> Arc<DocumentModel> {
        Arc::clone(&self.snapshot)
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_parts_drop_leading_zeros() {
        let parts = DateParts::parse("2025-03-05");
        assert_eq!(parts.year, "2025");
        assert_eq!(parts.month, "3");
        assert_eq!(parts.day, "5");
        assert!(parts.parsed);
    }

    #[test]
    fn unparsable_date_falls_back_to_raw_text() {
        let parts = DateParts::parse(" 明年春天 ");
        assert!(!parts.parsed);
        assert_eq!(parts.year, "明年春天");
        assert_eq!(parts.month, "明年春天");
        assert_eq!(parts.day, "明年春天");

        let parts = DateParts::parse("2025-02-30");
        assert!(!parts.parsed);
        assert_eq!(parts.day, "2025-02-30");
    }

    #[test]
    fn from_form_maps_field_names() {
        let edit = FieldEdit::from_form("studentName", "王五").unwrap();
        assert_eq!(edit, FieldEdit::StudentName("王五".to_string()));
        let edit = FieldEdit::from_form("customBgImage", "  ").unwrap();
        assert_eq!(edit, FieldEdit::ClearCustomBackground);
        let err = FieldEdit::from_form("nickname", "x").unwrap_err();
        assert!(matches!(err, CertError::UnknownField(name) if name == "nickname"));
    }

    #[test]
    fn apply_does_not_touch_other_fields() {
        let model = DocumentModel::default();
        let next = model.apply(FieldEdit::CourseName("武当太极剑".to_string()));
        assert_eq!(next.course_name, "武当太极剑");
        assert_eq!(next.student_name, model.student_name);
        assert_eq!(model.course_name, "少林长拳基础");
    }

    #[test]
    fn background_bytes_become_data_uri() {
        let mut bytes = Vec::new();
        image::RgbaImage::new(1, 1)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let model = DocumentModel::default().apply(FieldEdit::CustomBackgroundBytes(bytes));
        let uri = model.custom_background_image.clone().unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        assert!(model.has_custom_background());
        let cleared = model.apply(FieldEdit::ClearCustomBackground);
        assert!(!cleared.has_custom_background());
    }

    #[test]
    fn store_versions_only_real_changes() {
        let mut store = ModelStore::default();
        let before = store.snapshot();
        assert_eq!(store.dispatch(FieldEdit::StudentName("张三".to_string())), 0);
        assert_eq!(store.dispatch(FieldEdit::StudentName("赵六".to_string())), 1);
        assert_eq!(before.student_name, "张三");
        assert_eq!(store.snapshot().student_name, "赵六");
    }

    #[test]
    fn variant_ids_round_trip_and_serde_uses_form_names() {
        for variant in TemplateVariant::ALL {
            assert_eq!(TemplateVariant::from_id(variant.id()), Some(variant));
        }
        assert_eq!(TemplateVariant::from_id("gothic"), None);

        let json = serde_json::to_value(DocumentModel::default()).unwrap();
        assert_eq!(json["studentName"], "张三");
        assert!(json.get("customBgImage").is_none());
        let parsed: DocumentModel = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, DocumentModel::default());
    }
}
