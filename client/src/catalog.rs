//! The inventory server's cached resources.

use stockpile_engine::{
    Catalog, EntityDescriptor, EntityType, FieldDef, FieldType, KeyKind, Shape,
};

fn keyed(entity: &str) -> EntityDescriptor {
    EntityDescriptor::keyed(entity, "id", KeyKind::Int)
}

fn named(entity: &str) -> EntityDescriptor {
    keyed(entity).with_fields([
        FieldDef::required("name", FieldType::String),
        FieldDef::optional("description", FieldType::String),
        FieldDef::optional("active", FieldType::Bool),
        FieldDef::optional("row_created_timestamp", FieldType::String),
    ])
}

/// The default catalog of the inventory client.
pub fn inventory_catalog() -> Catalog {
    Catalog::new()
        .with(named("products").with_fields([
            FieldDef::optional("location_id", FieldType::Int),
            FieldDef::optional("product_group_id", FieldType::Int),
            FieldDef::optional("qu_id_purchase", FieldType::Int),
            FieldDef::optional("qu_id_stock", FieldType::Int),
            FieldDef::optional("min_stock_amount", FieldType::Double),
            FieldDef::optional("default_best_before_days", FieldType::Int),
            FieldDef::optional("parent_product_id", FieldType::Int),
            FieldDef::optional("enable_tare_weight_handling", FieldType::Bool),
            FieldDef::optional("tare_weight", FieldType::Double),
            FieldDef::optional("userfields", FieldType::Json),
        ]))
        .with(named("locations").with_field(FieldDef::optional("is_freezer", FieldType::Bool)))
        .with(
            named("quantity_units")
                .with_field(FieldDef::optional("name_plural", FieldType::String)),
        )
        .with(named("product_groups"))
        .with(named("shopping_lists"))
        .with(keyed("shopping_list").with_fields([
            FieldDef::optional("product_id", FieldType::Int),
            FieldDef::optional("note", FieldType::String),
            FieldDef::required("amount", FieldType::Double),
            FieldDef::optional("shopping_list_id", FieldType::Int),
            FieldDef::optional("done", FieldType::Bool),
            FieldDef::optional("qu_id", FieldType::Int),
        ]))
        .with(named("chores").with_fields([
            FieldDef::optional("period_type", FieldType::String),
            FieldDef::optional("period_days", FieldType::Int),
            FieldDef::optional("track_date_only", FieldType::Bool),
            FieldDef::optional("rollover", FieldType::Bool),
            FieldDef::optional("assignment_type", FieldType::String),
            FieldDef::optional("next_execution_assigned_to_user_id", FieldType::Int),
        ]))
        .with(named("recipes").with_fields([
            FieldDef::optional("base_servings", FieldType::Double),
            FieldDef::optional("desired_servings", FieldType::Double),
            FieldDef::optional("not_check_shoppinglist", FieldType::Bool),
            FieldDef::optional("type", FieldType::String),
        ]))
        .with(named("tasks").with_fields([
            FieldDef::optional("due_date", FieldType::String),
            FieldDef::optional("done", FieldType::Bool),
            FieldDef::optional("category_id", FieldType::Int),
            FieldDef::optional("assigned_to_user_id", FieldType::Int),
        ]))
        .with(keyed("stock_entries").with_fields([
            FieldDef::required("product_id", FieldType::Int),
            FieldDef::required("amount", FieldType::Double),
            FieldDef::optional("best_before_date", FieldType::String),
            FieldDef::optional("purchased_date", FieldType::String),
            FieldDef::optional("stock_id", FieldType::String),
            FieldDef::optional("price", FieldType::Double),
            FieldDef::optional("open", FieldType::Bool),
            FieldDef::optional("location_id", FieldType::Int),
        ]))
        .with(EntityDescriptor::unkeyed("stock").with_fields([
            FieldDef::required("product_id", FieldType::Int),
            FieldDef::required("amount", FieldType::Double),
            FieldDef::optional("amount_aggregated", FieldType::Double),
            FieldDef::optional("amount_opened", FieldType::Double),
            FieldDef::optional("best_before_date", FieldType::String),
            FieldDef::optional("is_aggregated_amount", FieldType::Bool),
            FieldDef::optional("product", FieldType::Json),
        ]))
        .with(EntityDescriptor::unkeyed("stock_journal").with_fields([
            FieldDef::optional("product_id", FieldType::Int),
            FieldDef::optional("amount", FieldType::Double),
            FieldDef::optional("transaction_type", FieldType::String),
            FieldDef::optional("undone", FieldType::Bool),
            FieldDef::optional("row_created_timestamp", FieldType::String),
        ]))
        .with(EntityDescriptor::singleton("user_settings"))
        .with(EntityDescriptor::singleton("system_config"))
        .with(
            EntityDescriptor::derived("volatile_stock", "product_id", KeyKind::Int)
                .with_fields([
                    FieldDef::optional("location_id", FieldType::Int),
                    FieldDef::optional("amount", FieldType::Double),
                    FieldDef::optional("best_before_date", FieldType::String),
                    FieldDef::optional("status", FieldType::String),
                ])
                .with_relation("product_id", "products", KeyKind::Int)
                .with_relation("location_id", "locations", KeyKind::Int),
        )
}

/// Core types of `catalog`: everything that is not derived.
pub fn core_types(catalog: &Catalog) -> Vec<EntityType> {
    catalog.entities_with_shape(&[
        Shape::KeyedCollection,
        Shape::Singleton,
        Shape::UnkeyedArray,
    ])
}

/// Derived types of `catalog`.
pub fn derived_types(catalog: &Catalog) -> Vec<EntityType> {
    catalog.entities_with_shape(&[Shape::DerivedComposite])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inventory_catalog_is_valid() {
        let catalog = inventory_catalog();
        catalog.validate().unwrap();
        assert_eq!(catalog.len(), 15);
        assert_eq!(derived_types(&catalog), vec![EntityType::from("volatile_stock")]);
        assert_eq!(core_types(&catalog).len(), 14);
    }

    #[test]
    fn products_normalize_loose_wire_values() {
        let catalog = inventory_catalog();
        let products = catalog.require(&"products".into()).unwrap();

        let a = products
            .normalize(json!({
                "id": "12",
                "name": "Flour",
                "location_id": "3",
                "min_stock_amount": "0",
                "active": "1",
                "enable_tare_weight_handling": 0,
            }))
            .unwrap();
        let b = products
            .normalize(json!({
                "id": 12,
                "name": "Flour",
                "location_id": 3,
                "min_stock_amount": 0.0,
                "active": true,
                "enable_tare_weight_handling": false,
                "description": null,
            }))
            .unwrap();
        assert_eq!(a, b);
    }
}
