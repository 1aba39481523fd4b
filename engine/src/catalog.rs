//! Entity catalog: which resources are cached, and how.
//!
//! Every entity type declares a [`Shape`] that selects its reconciliation
//! strategy, the field holding its identity, a table of typed fields that the
//! lenient parser normalizes before records are compared, and for derived
//! composites the relations that must be wired after commit.

use crate::{error::Result, lenient, EntityType, Error, Record, RecordKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Record shape of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// List of records with a stable, unique identity field.
    KeyedCollection,
    /// Exactly one logical record, replaced in place.
    Singleton,
    /// List without stable identity, replaced wholesale.
    UnkeyedArray,
    /// Server-computed aggregate keyed by its own identity and wired to
    /// records of other keyed collections after commit.
    DerivedComposite,
}

impl Shape {
    /// Whether records of this shape carry an identity.
    pub fn is_keyed(self) -> bool {
        matches!(self, Shape::KeyedCollection | Shape::DerivedComposite)
    }
}

/// Field types understood by the lenient parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Double,
    Bool,
    /// Arbitrary nested JSON, passed through untouched
    Json,
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::String => write!(f, "String"),
            FieldType::Int => write!(f, "Int"),
            FieldType::Double => write!(f, "Double"),
            FieldType::Bool => write!(f, "Bool"),
            FieldType::Json => write!(f, "Json"),
        }
    }
}

/// Definition of a typed field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Whether this field is required
    pub required: bool,
}

impl FieldDef {
    /// Create a new required field definition.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
        }
    }

    /// Create a new optional field definition.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
        }
    }

    /// Coerce a raw field value to its canonical form.
    ///
    /// Absent optional fields normalize to `null`, so a missing key, an
    /// explicit `null` and an empty string all compare equal afterwards.
    pub fn normalize(&self, value: Option<&serde_json::Value>) -> Result<serde_json::Value> {
        match lenient::normalize(&self.name, self.field_type, value)? {
            Some(v) => Ok(v),
            None if self.required => Err(Error::MissingField(self.name.clone())),
            None => Ok(serde_json::Value::Null),
        }
    }
}

/// Type of an identity value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Int,
    Str,
}

impl KeyKind {
    /// Parse an identity leniently. Absent values yield `Ok(None)`.
    pub fn parse(
        self,
        field: &str,
        value: Option<&serde_json::Value>,
    ) -> Result<Option<RecordKey>> {
        Ok(match self {
            KeyKind::Int => lenient::parse_opt_int(field, value)?.map(RecordKey::Int),
            KeyKind::Str => lenient::parse_opt_string(field, value)?
                .filter(|s| !s.is_empty())
                .map(RecordKey::Str),
        })
    }
}

/// Where a keyed entity keeps its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySpec {
    pub field: String,
    pub kind: KeyKind,
}

/// A by-identity reference from a derived composite to a keyed collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Payload field holding the foreign identity
    pub field: String,
    /// Keyed collection the identity refers to
    pub target: EntityType,
    /// Identity type of the target
    pub kind: KeyKind,
}

/// Everything the engine needs to know about one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescriptor {
    pub entity: EntityType,
    pub shape: Shape,
    pub key: Option<KeySpec>,
    pub fields: Vec<FieldDef>,
    pub relations: Vec<Relation>,
}

impl EntityDescriptor {
    fn new(entity: impl Into<EntityType>, shape: Shape, key: Option<KeySpec>) -> Self {
        Self {
            entity: entity.into(),
            shape,
            key,
            fields: Vec::new(),
            relations: Vec::new(),
        }
    }

    /// A keyed collection identified by `key_field`.
    pub fn keyed(
        entity: impl Into<EntityType>,
        key_field: impl Into<String>,
        kind: KeyKind,
    ) -> Self {
        let key = KeySpec {
            field: key_field.into(),
            kind,
        };
        Self::new(entity, Shape::KeyedCollection, Some(key))
    }

    /// A derived composite identified by `key_field`.
    pub fn derived(
        entity: impl Into<EntityType>,
        key_field: impl Into<String>,
        kind: KeyKind,
    ) -> Self {
        let key = KeySpec {
            field: key_field.into(),
            kind,
        };
        Self::new(entity, Shape::DerivedComposite, Some(key))
    }

    /// A singleton object.
    pub fn singleton(entity: impl Into<EntityType>) -> Self {
        Self::new(entity, Shape::Singleton, None)
    }

    /// An array without stable identity.
    pub fn unkeyed(entity: impl Into<EntityType>) -> Self {
        Self::new(entity, Shape::UnkeyedArray, None)
    }

    /// Builder-style method to add a typed field.
    pub fn with_field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Builder-style method to add several typed fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Builder-style method to add a relation to a keyed collection.
    pub fn with_relation(
        mut self,
        field: impl Into<String>,
        target: impl Into<EntityType>,
        kind: KeyKind,
    ) -> Self {
        self.relations.push(Relation {
            field: field.into(),
            target: target.into(),
            kind,
        });
        self
    }

    /// Normalize one raw payload into a record.
    pub fn normalize(&self, raw: serde_json::Value) -> Result<Record> {
        let mut object = match raw {
            serde_json::Value::Object(map) => map,
            other => {
                return Err(Error::InvalidPayload(format!(
                    "{} record must be an object, got {}",
                    self.entity,
                    lenient::json_type_name(&other)
                )))
            }
        };

        for field in &self.fields {
            let value = field.normalize(object.get(&field.name))?;
            object.insert(field.name.clone(), value);
        }

        let key = match &self.key {
            Some(spec) => {
                let key = spec
                    .kind
                    .parse(&spec.field, object.get(&spec.field))?
                    .ok_or_else(|| Error::MissingKey {
                        entity: self.entity.clone(),
                        field: spec.field.clone(),
                    })?;
                let canonical = match &key {
                    RecordKey::Int(id) => serde_json::Value::from(*id),
                    RecordKey::Str(id) => serde_json::Value::from(id.as_str()),
                };
                object.insert(spec.field.clone(), canonical);
                Some(key)
            }
            None => None,
        };

        Ok(Record {
            entity: self.entity.clone(),
            key,
            payload: serde_json::Value::Object(object),
        })
    }

    /// Normalize a whole snapshot, failing on the first bad record.
    pub fn normalize_all(&self, raw: Vec<serde_json::Value>) -> Result<Vec<Record>> {
        raw.into_iter().map(|value| self.normalize(value)).collect()
    }
}

/// The set of cached entity types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    descriptors: BTreeMap<EntityType, EntityDescriptor>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type, replacing any previous descriptor.
    pub fn add(&mut self, descriptor: EntityDescriptor) -> &mut Self {
        self.descriptors
            .insert(descriptor.entity.clone(), descriptor);
        self
    }

    /// Builder-style method to register an entity type.
    pub fn with(mut self, descriptor: EntityDescriptor) -> Self {
        self.add(descriptor);
        self
    }

    /// Look up a descriptor.
    pub fn get(&self, entity: &EntityType) -> Option<&EntityDescriptor> {
        self.descriptors.get(entity)
    }

    /// Look up a descriptor, failing for unregistered types.
    pub fn require(&self, entity: &EntityType) -> Result<&EntityDescriptor> {
        self.get(entity)
            .ok_or_else(|| Error::UnknownEntity(entity.clone()))
    }

    /// All registered entity types in sorted order.
    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.descriptors.keys()
    }

    /// Registered entity types of the given shapes.
    pub fn entities_with_shape(&self, shapes: &[Shape]) -> Vec<EntityType> {
        self.descriptors
            .values()
            .filter(|d| shapes.contains(&d.shape))
            .map(|d| d.entity.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Check that keyed shapes have identities and relations point at
    /// registered keyed collections.
    pub fn validate(&self) -> Result<()> {
        for descriptor in self.descriptors.values() {
            if descriptor.shape.is_keyed() != descriptor.key.is_some() {
                return Err(Error::InvalidCatalog(format!(
                    "{} is {:?} but {} an identity field",
                    descriptor.entity,
                    descriptor.shape,
                    if descriptor.key.is_some() { "declares" } else { "lacks" }
                )));
            }

            if !descriptor.relations.is_empty() && descriptor.shape != Shape::DerivedComposite {
                return Err(Error::InvalidCatalog(format!(
                    "{} declares relations but is not a derived composite",
                    descriptor.entity
                )));
            }

            for relation in &descriptor.relations {
                let target = self.get(&relation.target).ok_or_else(|| {
                    Error::InvalidCatalog(format!(
                        "{}.{} refers to unregistered {}",
                        descriptor.entity, relation.field, relation.target
                    ))
                })?;
                if target.shape != Shape::KeyedCollection {
                    return Err(Error::InvalidCatalog(format!(
                        "{}.{} refers to {}, which is not a keyed collection",
                        descriptor.entity, relation.field, relation.target
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn products() -> EntityDescriptor {
        EntityDescriptor::keyed("products", "id", KeyKind::Int).with_fields([
            FieldDef::required("name", FieldType::String),
            FieldDef::optional("location_id", FieldType::Int),
            FieldDef::optional("min_stock_amount", FieldType::Double),
            FieldDef::optional("active", FieldType::Bool),
        ])
    }

    #[test]
    fn normalize_coerces_declared_fields() {
        let record = products()
            .normalize(json!({
                "id": "3",
                "name": "Flour",
                "location_id": "2",
                "min_stock_amount": "1",
                "active": "1",
                "description": "passed through",
            }))
            .unwrap();

        assert_eq!(record.key, Some(RecordKey::Int(3)));
        assert_eq!(
            record.payload,
            json!({
                "id": 3,
                "name": "Flour",
                "location_id": 2,
                "min_stock_amount": 1.0,
                "active": true,
                "description": "passed through",
            })
        );
    }

    #[test]
    fn normalize_makes_wire_variants_equal() {
        let descriptor = products();
        let a = descriptor
            .normalize(json!({"id": 1, "name": "Flour", "location_id": null, "active": 1}))
            .unwrap();
        let b = descriptor
            .normalize(json!({"id": "1", "name": "Flour", "location_id": "", "active": true}))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_rejects_bad_records() {
        let descriptor = products();

        let err = descriptor.normalize(json!([1, 2])).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload(_)));

        let err = descriptor.normalize(json!({"id": 1})).unwrap_err();
        assert_eq!(err, Error::MissingField("name".into()));

        let err = descriptor
            .normalize(json!({"name": "Flour"}))
            .unwrap_err();
        assert!(matches!(err, Error::MissingKey { field, .. } if field == "id"));

        let err = descriptor
            .normalize(json!({"id": "abc", "name": "Flour"}))
            .unwrap_err();
        assert!(matches!(&err, Error::TypeMismatch { field, .. } if field == "id"));
        assert!(err.is_decode());
    }

    #[test]
    fn string_keys() {
        let descriptor = EntityDescriptor::keyed("userfields", "name", KeyKind::Str);
        let record = descriptor.normalize(json!({"name": 17})).unwrap();
        assert_eq!(record.key, Some(RecordKey::from("17")));
        assert_eq!(record.payload, json!({"name": "17"}));

        assert!(descriptor.normalize(json!({"name": ""})).is_err());
    }

    #[test]
    fn unkeyed_and_singleton_records_have_no_identity() {
        let stock = EntityDescriptor::unkeyed("stock")
            .with_field(FieldDef::required("amount", FieldType::Double));
        let record = stock.normalize(json!({"amount": "2"})).unwrap();
        assert_eq!(record.key, None);
        assert_eq!(record.payload, json!({"amount": 2.0}));

        let settings = EntityDescriptor::singleton("user_settings");
        let record = settings.normalize(json!({"locale": "de"})).unwrap();
        assert_eq!(record.key, None);
    }

    #[test]
    fn catalog_validation() {
        let catalog = Catalog::new()
            .with(products())
            .with(
                EntityDescriptor::derived("volatile_stock", "product_id", KeyKind::Int)
                    .with_relation("product_id", "products", KeyKind::Int),
            );
        assert!(catalog.validate().is_ok());
        assert_eq!(catalog.len(), 2);

        let dangling = catalog.clone().with(
            EntityDescriptor::derived("due_chores", "chore_id", KeyKind::Int)
                .with_relation("chore_id", "chores", KeyKind::Int),
        );
        assert!(matches!(dangling.validate(), Err(Error::InvalidCatalog(_))));

        let mut unkeyed_target = catalog.clone();
        unkeyed_target.add(EntityDescriptor::unkeyed("products"));
        assert!(unkeyed_target.validate().is_err());

        let relation_on_keyed = Catalog::new().with(products()).with(
            EntityDescriptor::keyed("stock_entries", "id", KeyKind::Int)
                .with_relation("product_id", "products", KeyKind::Int),
        );
        assert!(relation_on_keyed.validate().is_err());
    }

    #[test]
    fn catalog_lookup() {
        let catalog = Catalog::new()
            .with(products())
            .with(EntityDescriptor::singleton("user_settings"));

        assert!(catalog.require(&"products".into()).is_ok());
        assert_eq!(
            catalog.require(&"recipes".into()).unwrap_err(),
            Error::UnknownEntity("recipes".into())
        );
        assert_eq!(
            catalog.entities_with_shape(&[Shape::Singleton]),
            vec![EntityType::from("user_settings")]
        );
    }

    #[test]
    fn catalog_serialization() {
        let catalog = Catalog::new().with(products());
        let json = serde_json::to_string(&catalog).unwrap();
        let parsed: Catalog = serde_json::from_str(&json).unwrap();
        assert_eq!(catalog, parsed);
    }
}
