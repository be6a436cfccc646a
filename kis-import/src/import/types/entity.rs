//! Entity catalogue: every imported entity type, its table layout, natural
//! key, tracked columns and by-name references

use serde::{Deserialize, Serialize};

/// Entity types imported from KIS2, declared in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Country,
    Manufacturer,
    City,
    Currency,
    EquipmentType,
    CounterpartyForm,
    Counterparty,
    Person,
    Work,
    OrderStatus,
    Order,
    BoxAccounting,
    OrderComment,
}

impl EntityKind {
    /// All entity types in the fixed import order (dependencies first)
    pub const ALL: [EntityKind; 13] = [
        EntityKind::Country,
        EntityKind::Manufacturer,
        EntityKind::City,
        EntityKind::Currency,
        EntityKind::EquipmentType,
        EntityKind::CounterpartyForm,
        EntityKind::Counterparty,
        EntityKind::Person,
        EntityKind::Work,
        EntityKind::OrderStatus,
        EntityKind::Order,
        EntityKind::BoxAccounting,
        EntityKind::OrderComment,
    ];

    /// Stable identifier used on the command line, in config and in reports
    pub fn slug(&self) -> &'static str {
        match self {
            EntityKind::Country => "country",
            EntityKind::Manufacturer => "manufacturer",
            EntityKind::City => "city",
            EntityKind::Currency => "currency",
            EntityKind::EquipmentType => "equipment-type",
            EntityKind::CounterpartyForm => "counterparty-form",
            EntityKind::Counterparty => "counterparty",
            EntityKind::Person => "person",
            EntityKind::Work => "work",
            EntityKind::OrderStatus => "order-status",
            EntityKind::Order => "order",
            EntityKind::BoxAccounting => "box-accounting",
            EntityKind::OrderComment => "order-comment",
        }
    }

    /// Default KIS2 REST endpoint path
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            EntityKind::Country => "/api/Countries/",
            EntityKind::Manufacturer => "/api/Manufacturers/",
            EntityKind::City => "/api/Cities/",
            EntityKind::Currency => "/api/Currencies/",
            EntityKind::EquipmentType => "/api/EquipmentTypes/",
            EntityKind::CounterpartyForm => "/api/CompanyForms/",
            EntityKind::Counterparty => "/api/Companies/",
            EntityKind::Person => "/api/Persons/",
            EntityKind::Work => "/api/Works/",
            EntityKind::OrderStatus => "/api/OrderStatuses/",
            EntityKind::Order => "/api/Orders/",
            EntityKind::BoxAccounting => "/api/BoxAccounting/",
            EntityKind::OrderComment => "/api/OrderComments/",
        }
    }

    /// Entity types this one references by name
    pub fn dependencies(&self) -> Vec<EntityKind> {
        let mut deps: Vec<EntityKind> = self
            .descriptor()
            .references
            .iter()
            .map(|r| r.target)
            .collect();
        deps.sort();
        deps.dedup();
        deps
    }

    /// How natural keys of this entity type are normalized before matching
    pub fn key_rule(&self) -> KeyRule {
        match self {
            EntityKind::Currency => KeyRule::TrimUppercase,
            _ => KeyRule::Exact,
        }
    }

    /// Static table layout for this entity type
    pub fn descriptor(&self) -> &'static EntityDescriptor {
        match self {
            EntityKind::Country => &COUNTRY,
            EntityKind::Manufacturer => &MANUFACTURER,
            EntityKind::City => &CITY,
            EntityKind::Currency => &CURRENCY,
            EntityKind::EquipmentType => &EQUIPMENT_TYPE,
            EntityKind::CounterpartyForm => &COUNTERPARTY_FORM,
            EntityKind::Counterparty => &COUNTERPARTY,
            EntityKind::Person => &PERSON,
            EntityKind::Work => &WORK,
            EntityKind::OrderStatus => &ORDER_STATUS,
            EntityKind::Order => &ORDER,
            EntityKind::BoxAccounting => &BOX_ACCOUNTING,
            EntityKind::OrderComment => &ORDER_COMMENT,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        EntityKind::ALL
            .iter()
            .copied()
            .find(|k| k.slug() == wanted || k.descriptor().table == s.trim())
            .ok_or_else(|| {
                let known: Vec<_> = EntityKind::ALL.iter().map(|k| k.slug()).collect();
                format!("unknown entity type '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Natural-key normalization rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRule {
    /// Components match byte for byte (case and whitespace significant)
    Exact,
    /// Components are trimmed and upper-cased before matching
    TrimUppercase,
}

impl KeyRule {
    /// Apply the rule to one key component
    pub fn apply(&self, component: &str) -> String {
        match self {
            KeyRule::Exact => component.to_string(),
            KeyRule::TrimUppercase => component.trim().to_uppercase(),
        }
    }
}

/// Storage type of a destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Bool,
    Date,
    DateTime,
}

/// A destination column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

/// What to do when a referenced natural key has no destination row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingReference {
    /// Skip the record and report it
    Skip,
    /// Write NULL into the reference column
    Null,
    /// Insert a minimal stub row into the referenced table
    CreateStub,
}

/// A foreign reference carried by name in the source record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    /// Destination foreign-key column
    pub column: &'static str,
    /// Referenced entity type
    pub target: EntityKind,
    /// A record without a value for this reference is skipped
    pub required: bool,
    /// Policy for values that do not resolve
    pub on_missing: MissingReference,
}

const fn reference(
    column: &'static str,
    target: EntityKind,
    required: bool,
    on_missing: MissingReference,
) -> Reference {
    Reference { column, target, required, on_missing }
}

/// Table layout of one entity type
#[derive(Debug)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    /// Destination table
    pub table: &'static str,
    /// Destination identity column (surrogate id or natural serial)
    pub id: Column,
    /// True when the database assigns the identity on insert
    pub id_generated: bool,
    /// Natural-key columns, in key component order
    pub key: &'static [Column],
    /// Columns compared for change detection (reference columns included)
    pub tracked: &'static [Column],
    /// References resolved by name before writing
    pub references: &'static [Reference],
}

impl EntityDescriptor {
    /// Columns written on insert: key columns followed by tracked columns
    pub fn insert_columns(&self) -> Vec<Column> {
        let mut columns: Vec<Column> = self.key.to_vec();
        for column in self.tracked {
            if !columns.iter().any(|c| c.name == column.name) {
                columns.push(*column);
            }
        }
        columns
    }

    /// Find the reference writing to `column`
    pub fn reference(&self, column: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.column == column)
    }
}

use ColumnType::{Bool, Date, DateTime, Integer, Text};
use MissingReference::{CreateStub, Null, Skip};

const ID: Column = col("id", Integer);
const NAME: Column = col("name", Text);
const DESCRIPTION: Column = col("description", Text);

static COUNTRY: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Country,
    table: "countries",
    id: ID,
    id_generated: true,
    key: &[NAME],
    tracked: &[],
    references: &[],
};

static MANUFACTURER: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Manufacturer,
    table: "manufacturers",
    id: ID,
    id_generated: true,
    key: &[NAME],
    tracked: &[col("country_id", Integer)],
    references: &[reference("country_id", EntityKind::Country, true, CreateStub)],
};

static CITY: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::City,
    table: "cities",
    id: ID,
    id_generated: true,
    key: &[NAME],
    tracked: &[col("country_id", Integer)],
    references: &[reference("country_id", EntityKind::Country, true, CreateStub)],
};

static CURRENCY: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Currency,
    table: "currencies",
    id: ID,
    id_generated: true,
    key: &[NAME],
    tracked: &[],
    references: &[],
};

static EQUIPMENT_TYPE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::EquipmentType,
    table: "equipment_types",
    id: ID,
    id_generated: true,
    key: &[NAME],
    tracked: &[DESCRIPTION],
    references: &[],
};

static COUNTERPARTY_FORM: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::CounterpartyForm,
    table: "counterparty_form",
    id: ID,
    id_generated: true,
    key: &[NAME],
    tracked: &[],
    references: &[],
};

static COUNTERPARTY: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Counterparty,
    table: "counterparty",
    id: ID,
    id_generated: true,
    key: &[NAME],
    tracked: &[col("note", Text), col("city_id", Integer), col("form_id", Integer)],
    references: &[
        reference("city_id", EntityKind::City, false, CreateStub),
        reference("form_id", EntityKind::CounterpartyForm, true, Skip),
    ],
};

static PERSON: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Person,
    table: "people",
    id: ID,
    id_generated: true,
    key: &[col("surname", Text), NAME, col("patronymic", Text)],
    tracked: &[
        col("phone", Text),
        col("email", Text),
        col("counterparty_id", Integer),
        col("birth_date", Date),
        col("active", Bool),
        col("note", Text),
    ],
    references: &[reference("counterparty_id", EntityKind::Counterparty, false, Null)],
};

static WORK: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Work,
    table: "works",
    id: ID,
    id_generated: true,
    key: &[NAME],
    tracked: &[DESCRIPTION, col("active", Bool)],
    references: &[],
};

static ORDER_STATUS: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::OrderStatus,
    table: "order_statuses",
    id: ID,
    id_generated: true,
    key: &[NAME],
    tracked: &[DESCRIPTION],
    references: &[],
};

static ORDER: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Order,
    table: "orders",
    id: col("serial", Text),
    id_generated: false,
    key: &[col("serial", Text)],
    tracked: &[
        NAME,
        col("customer_id", Integer),
        col("priority", Integer),
        col("status_id", Integer),
        col("start_moment", DateTime),
        col("deadline_moment", DateTime),
        col("end_moment", DateTime),
        col("materials_cost", Integer),
        col("materials_paid", Bool),
        col("products_cost", Integer),
        col("products_paid", Bool),
        col("work_cost", Integer),
        col("work_paid", Bool),
        col("debt", Integer),
        col("debt_paid", Bool),
    ],
    references: &[
        reference("customer_id", EntityKind::Counterparty, true, Skip),
        reference("status_id", EntityKind::OrderStatus, true, Skip),
    ],
};

static BOX_ACCOUNTING: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::BoxAccounting,
    table: "box_accounting",
    id: col("serial_num", Integer),
    id_generated: false,
    key: &[col("serial_num", Integer)],
    tracked: &[
        NAME,
        col("order_id", Text),
        col("scheme_developer_id", Integer),
        col("assembler_id", Integer),
        col("programmer_id", Integer),
        col("tester_id", Integer),
    ],
    references: &[
        reference("order_id", EntityKind::Order, true, Skip),
        reference("scheme_developer_id", EntityKind::Person, true, Skip),
        reference("assembler_id", EntityKind::Person, true, Skip),
        reference("programmer_id", EntityKind::Person, false, Null),
        reference("tester_id", EntityKind::Person, true, Skip),
    ],
};

static ORDER_COMMENT: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::OrderComment,
    table: "comments_on_orders",
    id: ID,
    id_generated: true,
    key: &[col("order_id", Text), col("moment_of_creation", DateTime)],
    tracked: &[col("text", Text), col("person_id", Integer)],
    references: &[
        reference("order_id", EntityKind::Order, true, Skip),
        reference("person_id", EntityKind::Person, true, Skip),
    ],
};
