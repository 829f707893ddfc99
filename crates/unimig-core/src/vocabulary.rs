//! Versioned vocabularies for column classification and entity mapping.
//!
//! A [`Vocabulary`] is immutable configuration handed to the analyzer and
//! mapper at construction time. Industry presets extend or replace the
//! standard one (for example by loading JSON) without touching process-wide
//! state, so analyses with different vocabularies can run side by side.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity type used when no vocabulary entry carries enough signal.
pub const FALLBACK_ENTITY: &str = "generic";

/// Fallback for tables whose only signal is a reference to a master entity.
pub const FALLBACK_TRANSACTION: &str = "transaction";

/// Entity type for junction tables.
pub const ASSOCIATION_ENTITY: &str = "association";

/// Coarse role of a universal entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// Core business records (customers, products).
    Master,
    /// Lookup data (categories, currencies, locations).
    Reference,
    /// Documents and detail lines (orders, invoices).
    Transactional,
    /// Link records between entities.
    Relationship,
}

impl EntityCategory {
    /// Master and reference data load before everything else.
    pub fn is_master_data(&self) -> bool {
        matches!(self, EntityCategory::Master | EntityCategory::Reference)
    }
}

impl fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityCategory::Master => write!(f, "master"),
            EntityCategory::Reference => write!(f, "reference"),
            EntityCategory::Transactional => write!(f, "transactional"),
            EntityCategory::Relationship => write!(f, "relationship"),
        }
    }
}

/// Recognition rules for one universal entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPattern {
    pub entity_type: String,
    pub category: EntityCategory,
    /// `None` for the generic vocabulary.
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub description: String,
    pub table_patterns: Vec<String>,
    #[serde(default)]
    pub expected_columns: Vec<String>,
    /// Entity types this one typically references.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl EntityPattern {
    /// Whether the pattern belongs to an industry vocabulary.
    pub fn is_industry_specific(&self) -> bool {
        self.industry.is_some()
    }
}

/// Name tokens that drive column classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnVocabulary {
    pub identifier: Vec<String>,
    pub name: Vec<String>,
    pub description: Vec<String>,
    pub amount: Vec<String>,
    pub date: Vec<String>,
    pub flag_prefixes: Vec<String>,
    pub flag_suffixes: Vec<String>,
    pub reference: Vec<String>,
}

/// Complete vocabulary configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub version: String,
    pub entities: Vec<EntityPattern>,
    pub columns: ColumnVocabulary,
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::standard()
    }
}

impl Vocabulary {
    /// Parse a vocabulary from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Return a copy with an additional entity pattern.
    pub fn with_pattern(mut self, pattern: EntityPattern) -> Self {
        self.entities.push(pattern);
        self
    }

    /// Return a copy with a different version tag.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Patterns considered for a run. Industry presets are always scored;
    /// a matching industry context only raises their confidence.
    pub fn candidates(&self) -> impl Iterator<Item = &EntityPattern> + '_ {
        self.entities.iter()
    }

    /// Distinct industries covered.
    pub fn industries(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .entities
            .iter()
            .filter_map(|p| p.industry.as_deref())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Category of an entity type, including the built-in fallbacks.
    pub fn category_of(&self, entity_type: &str) -> EntityCategory {
        match entity_type {
            FALLBACK_ENTITY => EntityCategory::Reference,
            FALLBACK_TRANSACTION => EntityCategory::Transactional,
            ASSOCIATION_ENTITY => EntityCategory::Relationship,
            other => self
                .entities
                .iter()
                .find(|p| p.entity_type == other)
                .map(|p| p.category)
                .unwrap_or(EntityCategory::Reference),
        }
    }

    /// The built-in vocabulary: generic entities plus SAP Business One and
    /// restaurant presets.
    pub fn standard() -> Self {
        use EntityCategory::*;

        let entities = vec![
            // Generic
            pattern("customer", Master, None, "Customers and clients",
                &["customer", "customers", "cust", "client", "clients", "account_holder"],
                &["customer_id", "customer_code", "customer_no", "customer_name", "cust_id",
                  "client_id", "client_name", "credit_limit", "billing_address", "email", "phone"],
                &[]),
            pattern("supplier", Master, None, "Suppliers and vendors",
                &["supplier", "suppliers", "vendor", "vendors", "creditor"],
                &["supplier_id", "supplier_code", "supplier_name", "vendor_id", "vendor_name",
                  "payment_terms", "tax_id"],
                &[]),
            pattern("product", Master, None, "Products, items and SKUs",
                &["product", "products", "item", "items", "article", "sku", "material"],
                &["product_id", "product_code", "product_name", "item_id", "item_code", "sku",
                  "unit_price", "list_price", "barcode", "unit_of_measure"],
                &["category", "supplier"]),
            pattern("employee", Master, None, "Employees and staff",
                &["employee", "employees", "staff", "personnel", "worker"],
                &["employee_id", "employee_no", "first_name", "last_name", "hire_date", "salary",
                  "department_id", "job_title"],
                &["location"]),
            pattern("account", Master, None, "General ledger accounts",
                &["account", "accounts", "gl_account", "chart_of_accounts", "ledger"],
                &["account_id", "account_code", "account_name", "account_type", "balance",
                  "parent_account"],
                &[]),
            pattern("location", Reference, None, "Sites, stores, warehouses and addresses",
                &["location", "locations", "warehouse", "warehouses", "store", "stores", "site",
                  "address", "addresses", "branch"],
                &["location_id", "warehouse_id", "store_id", "address", "city", "country",
                  "postal_code", "region"],
                &[]),
            pattern("category", Reference, None, "Classification and grouping codes",
                &["category", "categories", "product_group", "item_group", "classification",
                  "type_code"],
                &["category_id", "category_code", "category_name", "parent_category"],
                &[]),
            pattern("currency", Reference, None, "Currencies and exchange rates",
                &["currency", "currencies", "exchange_rate", "fx_rate"],
                &["currency_code", "currency_name", "symbol", "exchange_rate"],
                &[]),
            pattern("sales_order", Transactional, None, "Sales orders",
                &["order", "orders", "sales_order", "sales_orders", "so_header", "order_header"],
                &["order_id", "order_no", "order_number", "order_date", "customer_id",
                  "total_amount", "order_total", "order_status", "ship_date"],
                &["customer"]),
            pattern("order_line", Transactional, None, "Order detail lines",
                &["order_line", "order_lines", "order_item", "order_items", "order_detail",
                  "order_details", "line_item", "line_items"],
                &["order_id", "line_no", "line_number", "product_id", "item_id", "quantity",
                  "unit_price", "line_total", "discount"],
                &["sales_order", "product"]),
            pattern("purchase_order", Transactional, None, "Purchase orders",
                &["purchase_order", "purchase_orders", "po_header", "procurement"],
                &["po_id", "po_number", "supplier_id", "vendor_id", "order_date",
                  "expected_date", "total_amount"],
                &["supplier"]),
            pattern("invoice", Transactional, None, "Invoices and bills",
                &["invoice", "invoices", "bill", "bills", "billing"],
                &["invoice_id", "invoice_no", "invoice_number", "invoice_date", "due_date",
                  "customer_id", "amount_due", "tax_amount", "total_amount"],
                &["customer", "sales_order"]),
            pattern("payment", Transactional, None, "Payments and receipts",
                &["payment", "payments", "receipt", "receipts", "transaction_payment"],
                &["payment_id", "payment_date", "payment_method", "amount", "invoice_id",
                  "customer_id", "reference_no"],
                &["invoice", "customer"]),
            pattern("inventory_movement", Transactional, None, "Stock movements",
                &["inventory", "stock_movement", "stock_movements", "inventory_transaction",
                  "stock"],
                &["movement_id", "product_id", "item_id", "warehouse_id", "quantity",
                  "movement_date", "movement_type"],
                &["product", "location"]),
            // SAP Business One
            pattern("customer", Master, Some("sap"), "SAP business partners (OCRD)",
                &["ocrd"],
                &["cardcode", "cardname", "cardtype", "groupcode", "creditline", "balance",
                  "lictradnum", "cntctprsn"],
                &[]),
            pattern("product", Master, Some("sap"), "SAP item master data (OITM)",
                &["oitm"],
                &["itemcode", "itemname", "itmsgrpcod", "onhand", "invntryuom", "avgprice"],
                &["category"]),
            pattern("category", Reference, Some("sap"), "SAP item groups (OITB)",
                &["oitb"],
                &["itmsgrpcod", "itmsgrpnam"],
                &[]),
            pattern("account", Master, Some("sap"), "SAP chart of accounts (OACT)",
                &["oact"],
                &["acctcode", "acctname", "currtotal", "fathernum", "levels"],
                &[]),
            pattern("employee", Master, Some("sap"), "SAP employees (OHEM)",
                &["ohem"],
                &["empid", "firstname", "lastname", "startdate", "dept"],
                &[]),
            pattern("sales_order", Transactional, Some("sap"), "SAP sales order headers (ORDR)",
                &["ordr"],
                &["docentry", "docnum", "cardcode", "docdate", "docduedate", "doctotal",
                  "docstatus"],
                &["customer"]),
            pattern("order_line", Transactional, Some("sap"), "SAP sales order lines (RDR1)",
                &["rdr1"],
                &["docentry", "linenum", "itemcode", "quantity", "price", "linetotal",
                  "whscode"],
                &["sales_order", "product"]),
            pattern("invoice", Transactional, Some("sap"), "SAP A/R invoices (OINV)",
                &["oinv"],
                &["docentry", "docnum", "cardcode", "docdate", "doctotal", "vatsum",
                  "paidtodate"],
                &["customer"]),
            // Restaurant
            pattern("menu_item", Master, Some("restaurant"), "Menu items and dishes",
                &["menu", "menu_item", "menu_items", "dish", "dishes", "recipe"],
                &["menu_item_id", "dish_name", "item_name", "price", "calories", "allergens",
                  "course", "is_vegetarian"],
                &["category"]),
            pattern("dining_table", Reference, Some("restaurant"), "Tables and seating",
                &["dining_table", "dining_tables", "seating", "floor_table", "tables"],
                &["table_id", "table_number", "seats", "capacity", "section"],
                &["location"]),
            pattern("reservation", Transactional, Some("restaurant"), "Reservations and bookings",
                &["reservation", "reservations", "booking", "bookings"],
                &["reservation_id", "party_size", "reservation_time", "guest_name", "table_id",
                  "customer_id"],
                &["customer", "dining_table"]),
            pattern("sales_order", Transactional, Some("restaurant"), "Guest checks and tickets",
                &["ticket", "tickets", "check", "checks", "guest_check", "orders"],
                &["ticket_id", "check_id", "table_id", "server_id", "covers", "tip",
                  "total_amount"],
                &["dining_table", "employee"]),
        ];

        let columns = ColumnVocabulary {
            identifier: tokens(&["id", "code", "key", "no", "num", "number", "uuid", "guid",
                "entry", "sku", "cd"]),
            name: tokens(&["name", "title", "label", "nm", "nam", "firstname", "lastname"]),
            description: tokens(&["description", "desc", "descr", "dscription", "notes", "note",
                "comment", "comments", "remarks", "memo", "text", "details"]),
            amount: tokens(&["amount", "amt", "price", "total", "cost", "balance", "qty",
                "quantity", "rate", "sum", "tax", "discount", "limit", "creditline", "fee", "salary",
                "value", "onhand"]),
            date: tokens(&["date", "dt", "time", "timestamp", "at", "on", "created", "updated",
                "modified", "birthday", "dob"]),
            flag_prefixes: tokens(&["is", "has", "can", "allow", "allows", "enable"]),
            flag_suffixes: tokens(&["flag", "active", "enabled", "deleted", "valid", "yn",
                "frozen", "locked", "blocked"]),
            reference: tokens(&["ref", "parent", "fk", "owner"]),
        };

        Self {
            version: "standard-1".to_string(),
            entities,
            columns,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn pattern(
    entity_type: &str,
    category: EntityCategory,
    industry: Option<&str>,
    description: &str,
    tables: &[&str],
    columns: &[&str],
    parents: &[&str],
) -> EntityPattern {
    EntityPattern {
        entity_type: entity_type.to_string(),
        category,
        industry: industry.map(str::to_string),
        description: description.to_string(),
        table_patterns: tokens(tables),
        expected_columns: tokens(columns),
        parents: tokens(parents),
    }
}

fn tokens(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Lowercase and drop everything that is not alphanumeric.
pub fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Split an identifier into lowercase words (snake_case, camelCase, digits).
pub fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = name.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        let boundary = i > 0 && {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).map(|n| n.is_ascii_lowercase()).unwrap_or(false);
            (c.is_ascii_uppercase() && prev.is_ascii_lowercase())
                || (c.is_ascii_uppercase() && prev.is_ascii_uppercase() && next_lower)
                || (c.is_ascii_digit() != prev.is_ascii_digit() && prev.is_ascii_alphanumeric())
        };
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// snake_case rendering of an identifier.
pub fn snake_case(name: &str) -> String {
    split_words(name).join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("CardCode"), vec!["card", "code"]);
        assert_eq!(split_words("customer_id"), vec!["customer", "id"]);
        assert_eq!(split_words("HTTPStatus"), vec!["http", "status"]);
        assert_eq!(split_words("RDR1"), vec!["rdr", "1"]);
        assert_eq!(split_words("is_active"), vec!["is", "active"]);
    }

    #[test]
    fn test_snake_and_normalize() {
        assert_eq!(snake_case("CardName"), "card_name");
        assert_eq!(normalize("Card_Name"), "cardname");
    }

    #[test]
    fn test_candidates_include_industry_presets() {
        let vocab = Vocabulary::standard();
        assert_eq!(vocab.candidates().count(), vocab.entities.len());
        assert!(vocab.candidates().any(|p| p.table_patterns.iter().any(|t| t == "ocrd")));
        let sap = vocab
            .candidates()
            .filter(|p| p.industry.as_deref() == Some("sap"))
            .count();
        assert_eq!(sap, 8);
        assert_eq!(vocab.industries(), vec!["restaurant", "sap"]);
    }

    #[test]
    fn test_category_of() {
        let vocab = Vocabulary::standard();
        assert_eq!(vocab.category_of("customer"), EntityCategory::Master);
        assert_eq!(vocab.category_of("sales_order"), EntityCategory::Transactional);
        assert_eq!(vocab.category_of(FALLBACK_TRANSACTION), EntityCategory::Transactional);
        assert_eq!(vocab.category_of(ASSOCIATION_ENTITY), EntityCategory::Relationship);
    }

    #[test]
    fn test_json_round_trip_preserves_presets() {
        let vocab = Vocabulary::standard().with_version("custom-2");
        let json = serde_json::to_string(&vocab).unwrap();
        let back = Vocabulary::from_json(&json).unwrap();
        assert_eq!(back.version, "custom-2");
        assert_eq!(back.entities.len(), vocab.entities.len());
    }
}
