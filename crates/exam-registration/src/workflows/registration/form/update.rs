use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::path::{FieldPath, PathSegment};
use super::FormData;
use crate::workflows::registration::domain::Section;
use crate::workflows::registration::steps::{DocumentKind, DISTRICT_PREFERENCE_SLOTS};

/// Fields of the personal information section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PersonalField {
    FirstName,
    MiddleName,
    LastName,
    FatherName,
    MotherName,
    DateOfBirth,
    Gender,
    MaritalStatus,
    SpouseName,
    Mobile,
    Email,
    AadharNumber,
    IdentificationMark1,
    IdentificationMark2,
    PermanentAddress,
    PermanentState,
    PermanentDistrict,
    PermanentPin,
    CorrespondenceAddress,
    CorrespondenceState,
    CorrespondenceDistrict,
    CorrespondencePin,
    SameAsPermanent,
}

impl PersonalField {
    pub const fn key(self) -> &'static str {
        match self {
            PersonalField::FirstName => "firstName",
            PersonalField::MiddleName => "middleName",
            PersonalField::LastName => "lastName",
            PersonalField::FatherName => "fatherName",
            PersonalField::MotherName => "motherName",
            PersonalField::DateOfBirth => "dateOfBirth",
            PersonalField::Gender => "gender",
            PersonalField::MaritalStatus => "maritalStatus",
            PersonalField::SpouseName => "spouseName",
            PersonalField::Mobile => "mobile",
            PersonalField::Email => "email",
            PersonalField::AadharNumber => "aadharNumber",
            PersonalField::IdentificationMark1 => "identificationMark1",
            PersonalField::IdentificationMark2 => "identificationMark2",
            PersonalField::PermanentAddress => "permanentAddress",
            PersonalField::PermanentState => "permanentState",
            PersonalField::PermanentDistrict => "permanentDistrict",
            PersonalField::PermanentPin => "permanentPin",
            PersonalField::CorrespondenceAddress => "correspondenceAddress",
            PersonalField::CorrespondenceState => "correspondenceState",
            PersonalField::CorrespondenceDistrict => "correspondenceDistrict",
            PersonalField::CorrespondencePin => "correspondencePin",
            PersonalField::SameAsPermanent => "sameAsPermanent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EducationField {
    School,
    Board,
    Year,
    TotalMarks,
    ObtainedMarks,
    Percentage,
    Subject,
}

impl EducationField {
    pub const fn key(self) -> &'static str {
        match self {
            EducationField::School => "school",
            EducationField::Board => "board",
            EducationField::Year => "year",
            EducationField::TotalMarks => "totalMarks",
            EducationField::ObtainedMarks => "obtainedMarks",
            EducationField::Percentage => "percentage",
            EducationField::Subject => "subject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExperienceField {
    Designation,
    Organization,
    CertificateNo,
    From,
    To,
    Total,
}

impl ExperienceField {
    pub const fn key(self) -> &'static str {
        match self {
            ExperienceField::Designation => "designation",
            ExperienceField::Organization => "organization",
            ExperienceField::CertificateNo => "certificateNo",
            ExperienceField::From => "from",
            ExperienceField::To => "to",
            ExperienceField::Total => "total",
        }
    }
}

/// Typed edit to one section of the wizard form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldUpdate {
    Personal {
        field: PersonalField,
        value: Value,
    },
    Other {
        field: String,
        value: Value,
    },
    Education {
        index: usize,
        field: EducationField,
        value: Value,
    },
    RemoveEducation {
        index: usize,
    },
    DistrictPreference {
        slot: usize,
        district: String,
    },
    Experience {
        index: usize,
        field: ExperienceField,
        value: Value,
    },
    RemoveExperience {
        index: usize,
    },
    Document {
        document_type: DocumentKind,
        file_name: String,
        file_path: String,
    },
    Declaration {
        accepted: bool,
    },
    Path {
        path: FieldPath,
        value: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldUpdateError {
    #[error("district preference slot {slot} is outside the {slots} available slots")]
    SlotOutOfRange { slot: usize, slots: usize },
    #[error("unknown form section '{0}'")]
    UnknownSection(String),
    #[error("section '{0}' cannot be edited directly")]
    ReadOnlySection(&'static str),
    #[error("field name must not be empty")]
    EmptyField,
    #[error("row {index} is past the end of a list with {len} rows")]
    IndexOutOfRange { index: usize, len: usize },
}

impl FieldUpdate {
    pub(super) fn apply_to(self, form: &FormData) -> Result<FormData, FieldUpdateError> {
        match self {
            FieldUpdate::Personal { field, value } => Ok(form.set(
                &section_path(Section::PersonalInfo, &[field.key()]),
                value,
            )),
            FieldUpdate::Other { field, value } => {
                let field = field.trim();
                if field.is_empty() {
                    return Err(FieldUpdateError::EmptyField);
                }
                Ok(form.set(&section_path(Section::OtherDetails, &[field]), value))
            }
            FieldUpdate::Education {
                index,
                field,
                value,
            } => {
                let path = indexed_path(Section::Education, index, field.key());
                check_indices(form, &path)?;
                Ok(form.set(&path, value))
            }
            FieldUpdate::RemoveEducation { index } => Ok(remove_row(form, Section::Education, index)),
            FieldUpdate::DistrictPreference { slot, district } => {
                if slot >= DISTRICT_PREFERENCE_SLOTS {
                    return Err(FieldUpdateError::SlotOutOfRange {
                        slot,
                        slots: DISTRICT_PREFERENCE_SLOTS,
                    });
                }
                let path = FieldPath::new(vec![
                    PathSegment::Key(Section::DistrictPreferences.key().to_string()),
                    PathSegment::Index(slot),
                ]);
                Ok(form.set(&path, Value::String(district)))
            }
            FieldUpdate::Experience {
                index,
                field,
                value,
            } => {
                let path = indexed_path(Section::ExperienceRows, index, field.key());
                check_indices(form, &path)?;
                Ok(form.set(&path, value))
            }
            FieldUpdate::RemoveExperience { index } => {
                Ok(remove_row(form, Section::ExperienceRows, index))
            }
            FieldUpdate::Document {
                document_type,
                file_name,
                file_path,
            } => Ok(upsert_document(form, document_type, file_name, file_path)),
            FieldUpdate::Declaration { accepted } => Ok(form.set(
                &section_path(Section::Review, &["declarationAccepted"]),
                Value::Bool(accepted),
            )),
            FieldUpdate::Path { path, value } => {
                let root = path
                    .root()
                    .ok_or_else(|| FieldUpdateError::UnknownSection(path.to_string()))?;
                let section = Section::from_key(root)
                    .ok_or_else(|| FieldUpdateError::UnknownSection(root.to_string()))?;
                if section == Section::Payment {
                    return Err(FieldUpdateError::ReadOnlySection(section.key()));
                }
                if section == Section::DistrictPreferences {
                    if let Some(PathSegment::Index(slot)) = path.segments().get(1) {
                        if *slot >= DISTRICT_PREFERENCE_SLOTS {
                            return Err(FieldUpdateError::SlotOutOfRange {
                                slot: *slot,
                                slots: DISTRICT_PREFERENCE_SLOTS,
                            });
                        }
                    }
                }
                check_indices(form, &path)?;
                Ok(form.set(&path, value))
            }
        }
    }
}

fn section_path(section: Section, keys: &[&str]) -> FieldPath {
    let mut segments = vec![PathSegment::Key(section.key().to_string())];
    segments.extend(keys.iter().map(|key| PathSegment::Key((*key).to_string())));
    FieldPath::new(segments)
}

fn indexed_path(section: Section, index: usize, key: &str) -> FieldPath {
    FieldPath::new(vec![
        PathSegment::Key(section.key().to_string()),
        PathSegment::Index(index),
        PathSegment::Key(key.to_string()),
    ])
}

/// A list write may edit an existing row or append exactly one.
fn check_indices(form: &FormData, path: &FieldPath) -> Result<(), FieldUpdateError> {
    let mut node = Some(form.as_value());
    for segment in path.segments() {
        node = match segment {
            PathSegment::Key(key) => node.and_then(|value| value.get(key.as_str())),
            PathSegment::Index(index) => {
                let len = node.and_then(Value::as_array).map_or(0, Vec::len);
                if *index > len {
                    return Err(FieldUpdateError::IndexOutOfRange { index: *index, len });
                }
                node.and_then(|value| value.get(*index))
            }
        };
    }
    Ok(())
}

fn remove_row(form: &FormData, section: Section, index: usize) -> FormData {
    let mut rows = form.section(section).as_array().cloned().unwrap_or_default();
    if index < rows.len() {
        rows.remove(index);
    }
    form.with_section(section, Value::Array(rows))
}

fn upsert_document(
    form: &FormData,
    kind: DocumentKind,
    file_name: String,
    file_path: String,
) -> FormData {
    let entry = json!({
        "documentType": kind.label(),
        "fileName": file_name,
        "filePath": file_path,
    });
    let mut documents = form
        .section(Section::Documents)
        .as_array()
        .cloned()
        .unwrap_or_default();
    match documents
        .iter_mut()
        .find(|existing| existing.get("documentType") == Some(&Value::from(kind.label())))
    {
        Some(existing) => *existing = entry,
        None => documents.push(entry),
    }
    form.with_section(Section::Documents, Value::Array(documents))
}
