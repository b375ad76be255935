// Schema DSL describing the integration tables.
//
// Adapters read the schema for field types and, critically, for the unique
// and unique-together constraints they must enforce natively. The identity
// link table is unique in BOTH directions per app.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Field types supported by the schema system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Json,
}

/// A single field definition within a table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaField {
    pub field_type: FieldType,
    /// Whether the field is required (non-nullable).
    #[serde(default)]
    pub required: bool,
    /// Whether the field must be unique across records.
    #[serde(default)]
    pub unique: bool,
    /// Referenced table, if this field is a foreign key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<FieldReference>,
}

impl SchemaField {
    pub fn required_string() -> Self {
        Self {
            field_type: FieldType::String,
            required: true,
            unique: false,
            references: None,
        }
    }

    pub fn optional_string() -> Self {
        Self {
            required: false,
            ..Self::required_string()
        }
    }

    pub fn boolean() -> Self {
        Self {
            field_type: FieldType::Boolean,
            ..Self::required_string()
        }
    }

    pub fn number() -> Self {
        Self {
            field_type: FieldType::Number,
            ..Self::required_string()
        }
    }

    pub fn date() -> Self {
        Self {
            field_type: FieldType::Date,
            ..Self::required_string()
        }
    }

    pub fn optional_date() -> Self {
        Self {
            field_type: FieldType::Date,
            required: false,
            ..Self::required_string()
        }
    }

    pub fn json() -> Self {
        Self {
            field_type: FieldType::Json,
            ..Self::required_string()
        }
    }

    pub fn with_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_reference(mut self, table: &str, field: &str) -> Self {
        self.references = Some(FieldReference {
            table: table.to_string(),
            field: field.to_string(),
        });
        self
    }
}

/// Foreign key reference configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldReference {
    pub table: String,
    pub field: String,
}

/// A complete table definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectTable {
    pub name: String,
    /// Map of field name → field definition.
    pub fields: HashMap<String, SchemaField>,
    /// Composite uniqueness constraints: each entry is a set of field names
    /// whose combined value must be unique across records.
    #[serde(default)]
    pub unique_together: Vec<Vec<String>>,
}

impl ConnectTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: HashMap::new(),
            unique_together: Vec::new(),
        }
    }

    pub fn field(mut self, name: &str, schema_field: SchemaField) -> Self {
        self.fields.insert(name.to_string(), schema_field);
        self
    }

    pub fn unique_together(mut self, fields: &[&str]) -> Self {
        self.unique_together
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }
}

/// The complete integration schema — a collection of tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectSchema {
    pub tables: HashMap<String, ConnectTable>,
}

impl ConnectSchema {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    pub fn table(mut self, table: ConnectTable) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ConnectTable> {
        self.tables.get(name)
    }
}

// Table name constants used across the workspace.
pub const APP_TABLE: &str = "integrationApp";
pub const API_KEY_TABLE: &str = "integrationApiKey";
pub const IDENTITY_LINK_TABLE: &str = "integrationIdentityLink";
pub const ACCESS_CODE_TABLE: &str = "integrationAccessCode";
pub const USAGE_SESSION_TABLE: &str = "integrationUsageSession";
pub const WEBHOOK_DELIVERY_TABLE: &str = "integrationWebhookDelivery";
pub const USER_TABLE: &str = "firstuserUser";

/// Build the full integration schema.
pub fn integration_schema() -> ConnectSchema {
    let app = ConnectTable::new(APP_TABLE)
        .field("id", SchemaField::required_string().with_unique())
        .field("spaceId", SchemaField::required_string())
        .field("publicAppId", SchemaField::required_string().with_unique())
        .field("name", SchemaField::required_string())
        .field("redirectEnabled", SchemaField::boolean())
        .field("embeddedEnabled", SchemaField::boolean())
        .field("allowedOrigins", SchemaField::json())
        .field("webhookUrl", SchemaField::optional_string())
        .field("signingSecret", SchemaField::required_string())
        .field("createdAt", SchemaField::date())
        .field("updatedAt", SchemaField::date());

    let api_key = ConnectTable::new(API_KEY_TABLE)
        .field("id", SchemaField::required_string().with_unique())
        .field(
            "integrationAppId",
            SchemaField::required_string().with_reference(APP_TABLE, "id"),
        )
        .field("keyId", SchemaField::required_string().with_unique())
        .field("secretHash", SchemaField::required_string())
        .field("lastFour", SchemaField::required_string())
        .field("revokedAt", SchemaField::optional_date())
        .field("createdAt", SchemaField::date());

    // Unique in both directions: one platform user per external id, one
    // external id per platform user, scoped per app.
    let identity_link = ConnectTable::new(IDENTITY_LINK_TABLE)
        .field("id", SchemaField::required_string().with_unique())
        .field(
            "integrationAppId",
            SchemaField::required_string().with_reference(APP_TABLE, "id"),
        )
        .field("externalUserId", SchemaField::required_string())
        .field(
            "firstuserUserId",
            SchemaField::required_string().with_reference(USER_TABLE, "id"),
        )
        .field("currentPlanTier", SchemaField::required_string())
        .field("createdAt", SchemaField::date())
        .field("updatedAt", SchemaField::date())
        .unique_together(&["integrationAppId", "externalUserId"])
        .unique_together(&["integrationAppId", "firstuserUserId"]);

    let access_code = ConnectTable::new(ACCESS_CODE_TABLE)
        .field("id", SchemaField::required_string().with_unique())
        .field(
            "integrationAppId",
            SchemaField::required_string().with_reference(APP_TABLE, "id"),
        )
        .field(
            "firstuserUserId",
            SchemaField::required_string().with_reference(USER_TABLE, "id"),
        )
        .field("spaceId", SchemaField::required_string())
        .field("codeHash", SchemaField::required_string().with_unique())
        .field("status", SchemaField::required_string())
        .field("expiresAt", SchemaField::date())
        .field("redeemedAt", SchemaField::optional_date())
        .field("createdAt", SchemaField::date());

    let usage_session = ConnectTable::new(USAGE_SESSION_TABLE)
        .field("id", SchemaField::required_string().with_unique())
        .field(
            "integrationAppId",
            SchemaField::required_string().with_reference(APP_TABLE, "id"),
        )
        .field("externalUserId", SchemaField::required_string())
        .field(
            "firstuserUserId",
            SchemaField::required_string().with_reference(USER_TABLE, "id"),
        )
        .field("membershipStatus", SchemaField::required_string())
        .field("clientPlatform", SchemaField::optional_string())
        .field("startedAt", SchemaField::date())
        .field("lastSeenAt", SchemaField::date())
        .field("endedAt", SchemaField::optional_date())
        .field("durationSeconds", SchemaField::number());

    let webhook_delivery = ConnectTable::new(WEBHOOK_DELIVERY_TABLE)
        .field("id", SchemaField::required_string().with_unique())
        .field(
            "integrationAppId",
            SchemaField::required_string().with_reference(APP_TABLE, "id"),
        )
        .field("eventType", SchemaField::required_string())
        .field("payload", SchemaField::required_string())
        .field("signature", SchemaField::required_string())
        .field("attempt", SchemaField::number())
        .field("status", SchemaField::required_string())
        .field("nextRetryAt", SchemaField::optional_date())
        .field("createdAt", SchemaField::date())
        .field("updatedAt", SchemaField::date());

    let user = ConnectTable::new(USER_TABLE)
        .field("id", SchemaField::required_string().with_unique())
        .field("email", SchemaField::optional_string())
        .field("displayName", SchemaField::optional_string())
        .field("membershipStatus", SchemaField::required_string())
        .field("badgeTier", SchemaField::optional_string())
        .field("createdAt", SchemaField::date())
        .field("updatedAt", SchemaField::date());

    ConnectSchema::new()
        .table(app)
        .table(api_key)
        .table(identity_link)
        .table(access_code)
        .table(usage_session)
        .table(webhook_delivery)
        .table(user)
}
