//! Immutable snapshots of candidate-entered wizard data.
//!
//! [`FormData`] wraps a JSON tree with one entry per [`Section`]. Reads never fail on missing
//! nodes and writes return a fresh snapshot, auto-vivifying intermediate objects and arrays.

mod draft;
mod path;
mod update;

pub use draft::{DraftError, DraftKey, DraftStore, FileDraftStore, MemoryDraftStore};
pub use path::{FieldPath, FieldPathError, PathSegment};
pub use update::{
    EducationField, ExperienceField, FieldUpdate, FieldUpdateError, PersonalField,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::domain::Section;
use super::steps::DISTRICT_PREFERENCE_SLOTS;

/// Permanent-address fields and the correspondence fields mirroring them.
pub(crate) const ADDRESS_PAIRS: [(&str, &str); 4] = [
    ("permanentAddress", "correspondenceAddress"),
    ("permanentState", "correspondenceState"),
    ("permanentDistrict", "correspondenceDistrict"),
    ("permanentPin", "correspondencePin"),
];

const SAME_AS_PERMANENT: &str = "sameAsPermanent";

static MISSING: Value = Value::Null;

#[derive(Debug, Clone, PartialEq)]
pub struct FormData {
    tree: Value,
}

impl Default for FormData {
    fn default() -> Self {
        let mut tree = Map::new();
        for section in Section::ALL {
            tree.insert(section.key().to_string(), default_section(section));
        }
        Self {
            tree: Value::Object(tree),
        }
    }
}

fn default_section(section: Section) -> Value {
    match section {
        Section::DistrictPreferences => Value::Array(vec![
            Value::String(String::new());
            DISTRICT_PREFERENCE_SLOTS
        ]),
        section if section.is_list() => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    }
}

impl FormData {
    /// Builds a snapshot from a loaded tree, filling in any missing section.
    pub fn from_value(value: Value) -> Self {
        let mut form = Self::default();
        if let (Value::Object(tree), Value::Object(loaded)) = (&mut form.tree, value) {
            for (key, section) in loaded {
                let keep_default = Section::from_key(&key)
                    .map(|known| known.is_list() != section.is_array())
                    .unwrap_or(false);
                if !keep_default {
                    tree.insert(key, section);
                }
            }
        }
        form
    }

    pub fn as_value(&self) -> &Value {
        &self.tree
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        path.segments()
            .iter()
            .try_fold(&self.tree, |node, segment| match segment {
                PathSegment::Key(key) => node.get(key.as_str()),
                PathSegment::Index(index) => node.get(*index),
            })
    }

    /// Reads a path and reports whether it holds a non-empty value.
    pub fn is_filled(&self, path: &FieldPath) -> bool {
        self.get(path).map(is_filled).unwrap_or(false)
    }

    pub fn section(&self, section: Section) -> &Value {
        // Sections are always present; `from_value` and `with_section` keep them typed.
        self.tree.get(section.key()).unwrap_or(&MISSING)
    }

    pub fn with_section(&self, section: Section, value: Value) -> Self {
        let value = if section.is_list() == value.is_array() {
            value
        } else {
            default_section(section)
        };
        let mut next = self.clone();
        if let Value::Object(tree) = &mut next.tree {
            tree.insert(section.key().to_string(), value);
        }
        next
    }

    /// Copy-on-write update honouring the same-as-permanent address rule.
    pub fn set(&self, path: &FieldPath, value: Value) -> Self {
        let mut next = self.clone();
        if path.segments().is_empty() {
            return next;
        }
        assign(&mut next.tree, path.segments(), value);
        next.sync_correspondence(path);
        next
    }

    pub fn apply(&self, update: FieldUpdate) -> Result<Self, FieldUpdateError> {
        update.apply_to(self)
    }

    fn sync_correspondence(&mut self, changed: &FieldPath) {
        let [PathSegment::Key(section), PathSegment::Key(field)] = changed.segments() else {
            return;
        };
        if section != Section::PersonalInfo.key() {
            return;
        }
        let Some(Value::Object(personal)) = self.tree.get_mut(Section::PersonalInfo.key()) else {
            return;
        };
        let mirrored = personal.get(SAME_AS_PERMANENT) == Some(&Value::Bool(true));
        if !mirrored {
            return;
        }

        let copy_all = field == SAME_AS_PERMANENT;
        for (permanent, correspondence) in ADDRESS_PAIRS {
            if copy_all || field == permanent {
                let value = personal
                    .get(permanent)
                    .cloned()
                    .filter(|value| !value.is_null())
                    .unwrap_or_else(|| Value::String(String::new()));
                personal.insert(correspondence.to_string(), value);
            }
        }
    }
}

impl Serialize for FormData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.tree.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FormData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// Whether a value counts as entered by the candidate.
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(_) => true,
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn assign(node: &mut Value, segments: &[PathSegment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    let child = match head {
        PathSegment::Key(key) => object_mut(node)
            .entry(key.clone())
            .or_insert(Value::Null),
        PathSegment::Index(index) => {
            let items = array_mut(node);
            if items.len() <= *index {
                items.resize(*index + 1, Value::Null);
            }
            &mut items[*index]
        }
    };

    assign(child, rest, value);
}

fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}

fn array_mut(node: &mut Value) -> &mut Vec<Value> {
    if !node.is_array() {
        *node = Value::Array(Vec::new());
    }
    match node {
        Value::Array(items) => items,
        _ => unreachable!("node was just replaced with an array"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).expect("valid path")
    }

    #[test]
    fn defaults_every_section() {
        let form = FormData::default();
        assert_eq!(form.section(Section::Education), &json!([]));
        assert_eq!(form.section(Section::PersonalInfo), &json!({}));
        assert_eq!(
            form.section(Section::DistrictPreferences)
                .as_array()
                .map(Vec::len),
            Some(DISTRICT_PREFERENCE_SLOTS)
        );
    }

    #[test]
    fn get_tolerates_missing_nodes() {
        let form = FormData::default();
        assert_eq!(form.get(&path("education.3.school")), None);
        assert_eq!(form.get(&path("personalInfo.firstName.inner")), None);
        assert_eq!(form.get(&path("nowhere.0")), None);
    }

    #[test]
    fn set_auto_vivifies_arrays_and_objects() {
        let form = FormData::default().set(&path("education.2.school"), json!("GHS Ranchi"));
        assert_eq!(
            form.section(Section::Education),
            &json!([null, null, { "school": "GHS Ranchi" }])
        );

        let nested = FormData::default().set(&path("extras.items.1"), json!("x"));
        assert_eq!(nested.get(&path("extras.items")), Some(&json!([null, "x"])));
    }

    #[test]
    fn set_leaves_original_snapshot_untouched() {
        let before = FormData::default();
        let after = before.set(&path("personalInfo.firstName"), json!("Asha"));
        assert_eq!(before.get(&path("personalInfo.firstName")), None);
        assert_eq!(after.get(&path("personalInfo.firstName")), Some(&json!("Asha")));
    }

    #[test]
    fn from_value_restores_missing_and_mistyped_sections() {
        let form = FormData::from_value(json!({
            "personalInfo": { "firstName": "Asha" },
            "education": { "school": "not a list" },
        }));
        assert_eq!(form.get(&path("personalInfo.firstName")), Some(&json!("Asha")));
        assert_eq!(form.section(Section::Education), &json!([]));
        assert_eq!(form.section(Section::Payment), &json!({}));
    }

    #[test]
    fn blank_and_false_values_are_not_filled() {
        assert!(!is_filled(&json!("   ")));
        assert!(!is_filled(&json!(false)));
        assert!(!is_filled(&json!(null)));
        assert!(is_filled(&json!(0)));
        assert!(is_filled(&json!(true)));
        assert!(is_filled(&json!("2019")));
    }

    #[test]
    fn same_as_permanent_copies_and_then_mirrors() {
        let form = FormData::default()
            .set(&path("personalInfo.permanentAddress"), json!("12 Main Road"))
            .set(&path("personalInfo.permanentPin"), json!("834001"))
            .set(&path("personalInfo.sameAsPermanent"), json!(true));

        assert_eq!(
            form.get(&path("personalInfo.correspondenceAddress")),
            Some(&json!("12 Main Road"))
        );
        assert_eq!(
            form.get(&path("personalInfo.correspondenceState")),
            Some(&json!(""))
        );

        let edited = form.set(&path("personalInfo.permanentAddress"), json!("7 Lake View"));
        assert_eq!(
            edited.get(&path("personalInfo.correspondenceAddress")),
            Some(&json!("7 Lake View"))
        );
    }

    #[test]
    fn clearing_same_as_permanent_stops_mirroring_but_keeps_copies() {
        let form = FormData::default()
            .set(&path("personalInfo.permanentAddress"), json!("12 Main Road"))
            .set(&path("personalInfo.sameAsPermanent"), json!(true))
            .set(&path("personalInfo.sameAsPermanent"), json!(false));
        assert_eq!(
            form.get(&path("personalInfo.correspondenceAddress")),
            Some(&json!("12 Main Road"))
        );

        let edited = form.set(&path("personalInfo.permanentAddress"), json!("7 Lake View"));
        assert_eq!(
            edited.get(&path("personalInfo.correspondenceAddress")),
            Some(&json!("12 Main Road"))
        );
    }

    #[test]
    fn mirroring_overwrites_manually_diverged_correspondence() {
        let form = FormData::default()
            .set(&path("personalInfo.permanentDistrict"), json!("Ranchi"))
            .set(&path("personalInfo.sameAsPermanent"), json!(true))
            .set(&path("personalInfo.correspondenceDistrict"), json!("Dumka"))
            .set(&path("personalInfo.permanentDistrict"), json!("Bokaro"));
        assert_eq!(
            form.get(&path("personalInfo.correspondenceDistrict")),
            Some(&json!("Bokaro"))
        );
    }
}
