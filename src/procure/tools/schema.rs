//! Field layout of the procurement record the model is asked to produce.

use serde_json::{Map, Value};

/// A single output column and the value the template pre-fills it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub default: &'static str,
}

const fn field(name: &'static str, default: &'static str) -> FieldSpec {
    FieldSpec { name, default }
}

const BASE_FIELDS: &[FieldSpec] = &[
    field("Document Type", "ZNID"),
    field("PO Number", ""),
    field("Line Item Number", "10"),
    field("Vendor", ""),
    field("Document Date", ""),
    field("Payment Terms", "P000"),
    field("Purchasing Organisation", "1001"),
    field("Purchase Group", "S05"),
    field("Company Code", "1001"),
    field("Validity Start Date", "19.07.2025"),
    field("Validity End Date", "19.07.2026"),
    field("Short Text", "Housekeeping Service"),
    field("Plant", "DS01"),
    field("Service Number", "21000020"),
    field("Service Quantity", "1"),
    field("Gross Price", ""),
    field("Cost Center", "DSG0010001"),
    field("WBS", ""),
    field("Tax Code", ""),
    field("Material Group", "MG021"),
    field("Requestor", ""),
    field("Control Code", "999433"),
    field("GL Account", ""),
    field("UOM", "AU"),
];

const EXTENDED_FIELDS: &[FieldSpec] = &[
    field("Document Type", "ZNID"),
    field("PO Number", ""),
    field("Line Item Number", "10"),
    field("Vendor", ""),
    field("Document Date", ""),
    field("Payment Terms", "P000"),
    field("Purchasing Organisation", "1001"),
    field("Purchase Group", "S05"),
    field("Invoice", ""),
    field("SAP Database", ""),
    field("Jira", ""),
    field("Agreement", ""),
    field("Company Code", "1001"),
    field("Validity Start Date", ""),
    field("Validity End Date", ""),
    field("WO Header Text", ""),
    field("Account Assignment", ""),
    field("Item Category", ""),
    field("Short Text", ""),
    field("Delivery Date", ""),
    field("Plant", "DS01"),
    field("Requisitioner", ""),
    field("Service Number", ""),
    field("Service Quantity", ""),
    field("Gross Price", ""),
    field("Cost Center", ""),
    field("WBS", ""),
    field("Tax Code", ""),
    field("Material Group", ""),
    field("no of days", ""),
    field("Requestor", ""),
    field("Control Code", ""),
    field("GL Account", ""),
    field("UOM", ""),
    field("Order Number", ""),
    field("Text 1", ""),
];

/// Date format requested for every date field.
pub const DATE_FORMAT_HINT: &str = "DD.MM.YYYY";

/// The two record layouts in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaVariant {
    #[default]
    Base,
    Extended,
}

impl SchemaVariant {
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            SchemaVariant::Base => BASE_FIELDS,
            SchemaVariant::Extended => EXTENDED_FIELDS,
        }
    }

    /// JSON template embedded in the instructions, in column order.
    pub fn template(self) -> Map<String, Value> {
        self.fields()
            .iter()
            .map(|field| (field.name.to_string(), Value::String(field.default.to_string())))
            .collect()
    }
}

/// Lists the fields of `variant` absent from `record`.
pub fn missing_fields(record: &Map<String, Value>, variant: SchemaVariant) -> Vec<&'static str> {
    variant
        .fields()
        .iter()
        .filter(|field| !record.contains_key(field.name))
        .map(|field| field.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_is_a_superset_of_base() {
        let extended: Vec<&str> = SchemaVariant::Extended
            .fields()
            .iter()
            .map(|field| field.name)
            .collect();
        assert_eq!(SchemaVariant::Base.fields().len(), 24);
        assert_eq!(extended.len(), 36);
        for field in SchemaVariant::Base.fields() {
            assert!(extended.contains(&field.name), "{} missing", field.name);
        }
    }

    #[test]
    fn template_keeps_column_order() {
        let template = SchemaVariant::Base.template();
        let keys: Vec<&String> = template.keys().take(3).collect();
        assert_eq!(keys, ["Document Type", "PO Number", "Line Item Number"]);
        assert_eq!(template["Plant"], "DS01");
    }

    #[test]
    fn base_template_carries_the_housekeeping_defaults() {
        let template = SchemaVariant::Base.template();
        assert_eq!(template["Validity Start Date"], "19.07.2025");
        assert_eq!(template["Validity End Date"], "19.07.2026");
        assert_eq!(template["Short Text"], "Housekeeping Service");
        assert_eq!(template["Service Number"], "21000020");
        assert_eq!(template["Cost Center"], "DSG0010001");
        assert_eq!(template["Material Group"], "MG021");
        assert_eq!(template["Control Code"], "999433");

        let extended = SchemaVariant::Extended.template();
        assert_eq!(extended["Short Text"], "");
    }

    #[test]
    fn missing_fields_are_listed_in_schema_order() {
        let mut record = SchemaVariant::Base.template();
        record.remove("Vendor");
        record.remove("UOM");
        assert_eq!(
            missing_fields(&record, SchemaVariant::Base),
            vec!["Vendor", "UOM"]
        );
    }
}
