//! Typed KIS2 source records
//!
//! Each entity type has a concrete record struct. A record is decoded from the
//! flat JSON object the extractor returns, validated, and turned into a
//! [`SourceRow`] carrying its natural key, plain values and by-name references.
//! Decoding happens per record so one malformed object never sinks the batch.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::types::{EntityKind, KeyError, NaturalKey, SkippedRecord, SourceRow, Value, parse_moment};

/// Order serials look like `NNN-MM-YYYY`
static ORDER_SERIAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{3})-(\d{2})-(\d{4})$").expect("static regex"));

/// Longest order/box name the destination accepts
const MAX_NAME_LEN: usize = 64;

/// Settings that shape how records become rows
#[derive(Debug, Clone)]
pub struct RowContext {
    /// Country assigned to cities that carry no country of their own
    pub default_country: String,
}

impl Default for RowContext {
    fn default() -> Self {
        RowContext {
            default_country: "Россия".to_string(),
        }
    }
}

/// Why a record could not become a row
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("malformed record: {0}")]
    Decode(String),
    #[error("invalid natural key: {0}")]
    Key(#[from] KeyError),
    #[error("{field}: {message}")]
    Invalid { field: &'static str, message: String },
}

impl RecordError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        RecordError::Invalid { field, message: message.into() }
    }
}

/// A typed source record for one entity type
pub trait SourceRecord: DeserializeOwned {
    const KIND: EntityKind;

    /// Validate the record and turn it into a source row
    fn into_row(self, ctx: &RowContext) -> Result<SourceRow, RecordError>;
}

/// Rows decoded from one fetched batch
#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub rows: Vec<SourceRow>,
    /// Records rejected by decoding or validation
    pub invalid: Vec<SkippedRecord>,
}

/// Decode a raw batch for `kind`
pub fn decode_batch(kind: EntityKind, raw: Vec<serde_json::Value>, ctx: &RowContext) -> DecodedBatch {
    match kind {
        EntityKind::Country => decode::<CountryRecord>(raw, ctx),
        EntityKind::Manufacturer => decode::<ManufacturerRecord>(raw, ctx),
        EntityKind::City => decode::<CityRecord>(raw, ctx),
        EntityKind::Currency => decode::<CurrencyRecord>(raw, ctx),
        EntityKind::EquipmentType => decode::<EquipmentTypeRecord>(raw, ctx),
        EntityKind::CounterpartyForm => decode::<CounterpartyFormRecord>(raw, ctx),
        EntityKind::Counterparty => decode::<CounterpartyRecord>(raw, ctx),
        EntityKind::Person => decode::<PersonRecord>(raw, ctx),
        EntityKind::Work => decode::<WorkRecord>(raw, ctx),
        EntityKind::OrderStatus => decode::<OrderStatusRecord>(raw, ctx),
        EntityKind::Order => decode::<OrderRecord>(raw, ctx),
        EntityKind::BoxAccounting => decode::<BoxAccountingRecord>(raw, ctx),
        EntityKind::OrderComment => decode::<OrderCommentRecord>(raw, ctx),
    }
}

fn decode<R: SourceRecord>(raw: Vec<serde_json::Value>, ctx: &RowContext) -> DecodedBatch {
    let mut batch = DecodedBatch::default();

    for (index, item) in raw.into_iter().enumerate() {
        let label = record_label(&item, index);
        let result = serde_json::from_value::<R>(item)
            .map_err(|e| RecordError::Decode(e.to_string()))
            .and_then(|record| record.into_row(ctx));

        match result {
            Ok(row) => batch.rows.push(row),
            Err(err) => {
                log::warn!("{}: rejecting record {}: {}", R::KIND, label, err);
                batch.invalid.push(SkippedRecord {
                    record: label,
                    reason: err.to_string(),
                });
            }
        }
    }

    batch
}

/// Best-effort human label for a raw record
fn record_label(item: &serde_json::Value, index: usize) -> String {
    ["serial", "serial_num", "name"]
        .iter()
        .find_map(|field| match item.get(*field) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| format!("#{}", index))
}

/// Optional by-name reference; empty names count as absent
fn optional_ref(target: EntityKind, name: Option<&str>) -> Result<Option<NaturalKey>, RecordError> {
    match name.map(|n| NaturalKey::single(target, n)) {
        None | Some(Err(KeyError::Empty)) => Ok(None),
        Some(Ok(key)) => Ok(Some(key)),
        Some(Err(err)) => Err(err.into()),
    }
}

/// Row keyed by a single `name` column; the stored name is the normalized key
fn named_row(kind: EntityKind, name: &str) -> Result<SourceRow, RecordError> {
    let key = NaturalKey::single(kind, name)?;
    let stored = key.components().concat();
    Ok(SourceRow::new(kind, key).with_value("name", Value::text(stored)))
}

fn moment(field: &'static str, raw: Option<String>) -> Result<Value, RecordError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(Value::Null),
        Some(text) => parse_moment(text)
            .map(Value::datetime)
            .ok_or_else(|| RecordError::invalid(field, format!("unparseable timestamp '{}'", text))),
    }
}

fn bounded_name(field: &'static str, name: &str) -> Result<(), RecordError> {
    if name.trim().is_empty() {
        return Err(RecordError::invalid(field, "must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(RecordError::invalid(field, format!("longer than {} characters", MAX_NAME_LEN)));
    }
    Ok(())
}

/// Check an order serial of the form `NNN-MM-YYYY`
pub fn validate_order_serial(serial: &str) -> Result<(), RecordError> {
    let caps = ORDER_SERIAL
        .captures(serial)
        .ok_or_else(|| RecordError::invalid("serial", format!("'{}' is not NNN-MM-YYYY", serial)))?;
    let month: u32 = caps[2].parse().unwrap_or(0);
    if !(1..=12).contains(&month) {
        return Err(RecordError::invalid("serial", format!("'{}' has month {:02}", serial, month)));
    }
    Ok(())
}

/// Lenient scalar deserializers for fields the legacy API sends inconsistently
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Integer given as a number, a numeric string or null
    pub fn opt_int<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("{} is not an integer", n))),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("'{}' is not an integer", s))),
            other => Err(serde::de::Error::custom(format!("unexpected value {}", other))),
        }
    }

    /// Required integer, same accepted forms as [`opt_int`]
    pub fn int<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        opt_int(d)?.ok_or_else(|| serde::de::Error::custom("missing integer"))
    }

    /// Boolean given as a bool, 0/1 or a string; null reads as false
    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match Value::deserialize(d)? {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(b),
            Value::Number(n) => Ok(n.as_i64().unwrap_or(0) != 0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" | "" => Ok(false),
                _ => Err(serde::de::Error::custom(format!("'{}' is not a boolean", s))),
            },
            other => Err(serde::de::Error::custom(format!("unexpected value {}", other))),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Reference to a person: an object with name parts, or "Surname Name Patronymic"
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PersonRef {
    Parts {
        surname: String,
        name: String,
        #[serde(default)]
        patronymic: Option<String>,
    },
    FullName(String),
}

impl PersonRef {
    /// Natural key of the referenced person
    pub fn key(&self) -> Result<NaturalKey, RecordError> {
        match self {
            PersonRef::Parts { surname, name, patronymic } => {
                if surname.trim().is_empty() || name.trim().is_empty() {
                    return Err(RecordError::invalid("person", "surname and name are required"));
                }
                Ok(NaturalKey::new(
                    EntityKind::Person,
                    &[Some(surname.as_str()), Some(name.as_str()), patronymic.as_deref()],
                )?)
            }
            PersonRef::FullName(full) => {
                let parts: Vec<&str> = full.split_whitespace().collect();
                if parts.len() < 2 {
                    return Err(RecordError::invalid(
                        "person",
                        format!("'{}' is not 'Surname Name [Patronymic]'", full),
                    ));
                }
                let patronymic = (parts.len() > 2).then(|| parts[2..].join(" "));
                Ok(NaturalKey::new(
                    EntityKind::Person,
                    &[Some(parts[0]), Some(parts[1]), patronymic.as_deref()],
                )?)
            }
        }
    }
}

fn person_ref(field: &'static str, person: Option<PersonRef>) -> Result<Option<NaturalKey>, RecordError> {
    person
        .map(|p| {
            p.key().map_err(|err| match err {
                RecordError::Invalid { message, .. } => RecordError::Invalid { field, message },
                other => other,
            })
        })
        .transpose()
}

#[derive(Debug, Deserialize)]
pub struct CountryRecord {
    pub name: String,
}

impl SourceRecord for CountryRecord {
    const KIND: EntityKind = EntityKind::Country;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        named_row(Self::KIND, &self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct ManufacturerRecord {
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
}

impl SourceRecord for ManufacturerRecord {
    const KIND: EntityKind = EntityKind::Manufacturer;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        let country = optional_ref(EntityKind::Country, self.country.as_deref())?;
        Ok(named_row(Self::KIND, &self.name)?.with_reference("country_id", country))
    }
}

#[derive(Debug, Deserialize)]
pub struct CityRecord {
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
}

impl SourceRecord for CityRecord {
    const KIND: EntityKind = EntityKind::City;

    fn into_row(self, ctx: &RowContext) -> Result<SourceRow, RecordError> {
        let country_name = self
            .country
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| ctx.default_country.clone());
        let country = optional_ref(EntityKind::Country, Some(&country_name))?;
        Ok(named_row(Self::KIND, &self.name)?.with_reference("country_id", country))
    }
}

#[derive(Debug, Deserialize)]
pub struct CurrencyRecord {
    pub name: String,
}

impl SourceRecord for CurrencyRecord {
    const KIND: EntityKind = EntityKind::Currency;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        let row = named_row(Self::KIND, &self.name)?;
        if row.key.components().concat().chars().count() > 3 {
            return Err(RecordError::invalid("name", format!("'{}' is not a 3-letter code", self.name)));
        }
        Ok(row)
    }
}

#[derive(Debug, Deserialize)]
pub struct EquipmentTypeRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl SourceRecord for EquipmentTypeRecord {
    const KIND: EntityKind = EntityKind::EquipmentType;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        Ok(named_row(Self::KIND, &self.name)?
            .with_value("description", Value::opt_text(self.description)))
    }
}

#[derive(Debug, Deserialize)]
pub struct CounterpartyFormRecord {
    pub name: String,
}

impl SourceRecord for CounterpartyFormRecord {
    const KIND: EntityKind = EntityKind::CounterpartyForm;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        named_row(Self::KIND, &self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct CounterpartyRecord {
    pub name: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
}

impl SourceRecord for CounterpartyRecord {
    const KIND: EntityKind = EntityKind::Counterparty;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        let city = optional_ref(EntityKind::City, self.city.as_deref())?;
        let form = optional_ref(EntityKind::CounterpartyForm, self.form.as_deref())?;
        Ok(named_row(Self::KIND, &self.name)?
            .with_value("note", Value::opt_text(self.note))
            .with_reference("city_id", city)
            .with_reference("form_id", form))
    }
}

#[derive(Debug, Deserialize)]
pub struct PersonRecord {
    pub surname: String,
    pub name: String,
    #[serde(default)]
    pub patronymic: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub active: bool,
    #[serde(default)]
    pub note: Option<String>,
}

impl SourceRecord for PersonRecord {
    const KIND: EntityKind = EntityKind::Person;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        if self.surname.trim().is_empty() || self.name.trim().is_empty() {
            return Err(RecordError::invalid("name", "surname and name are required"));
        }
        let key = NaturalKey::new(
            Self::KIND,
            &[Some(self.surname.as_str()), Some(self.name.as_str()), self.patronymic.as_deref()],
        )?;
        let company = optional_ref(EntityKind::Counterparty, self.company.as_deref())?;

        Ok(SourceRow::new(Self::KIND, key)
            .with_value("surname", Value::text(self.surname))
            .with_value("name", Value::text(self.name))
            .with_value("patronymic", Value::opt_text(self.patronymic))
            .with_value("phone", Value::opt_text(self.phone))
            .with_value("email", Value::opt_text(self.email))
            .with_value("birth_date", Value::opt_date(self.birth_date))
            .with_value("active", Value::Bool(self.active))
            .with_value("note", Value::opt_text(self.note))
            .with_reference("counterparty_id", company))
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub active: bool,
}

impl SourceRecord for WorkRecord {
    const KIND: EntityKind = EntityKind::Work;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        Ok(named_row(Self::KIND, &self.name)?
            .with_value("description", Value::opt_text(self.description))
            .with_value("active", Value::Bool(self.active)))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, serde::Serialize)]
pub struct OrderStatusRecord {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl SourceRecord for OrderStatusRecord {
    const KIND: EntityKind = EntityKind::OrderStatus;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        Ok(named_row(Self::KIND, &self.name)?
            .with_value("description", Value::opt_text(self.description)))
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderRecord {
    pub serial: String,
    pub name: String,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub priority: Option<i64>,
    #[serde(default)]
    pub start_moment: Option<String>,
    #[serde(default)]
    pub deadline_moment: Option<String>,
    #[serde(default)]
    pub end_moment: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub materials_cost: Option<i64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub materials_paid: bool,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub products_cost: Option<i64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub products_paid: bool,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub work_cost: Option<i64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub work_paid: bool,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub debt: Option<i64>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub debt_paid: bool,
}

impl SourceRecord for OrderRecord {
    const KIND: EntityKind = EntityKind::Order;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        let serial = self.serial.trim().to_string();
        validate_order_serial(&serial)?;
        bounded_name("name", &self.name)?;
        if let Some(priority) = self.priority {
            if !(1..=10).contains(&priority) {
                return Err(RecordError::invalid("priority", format!("{} is outside 1..=10", priority)));
            }
        }

        let customer = optional_ref(EntityKind::Counterparty, self.customer.as_deref())?;
        let status = optional_ref(EntityKind::OrderStatus, self.status.as_deref())?;

        Ok(SourceRow::new(Self::KIND, NaturalKey::single(Self::KIND, &serial)?)
            .with_value("serial", Value::text(serial))
            .with_value("name", Value::text(self.name))
            .with_value("priority", Value::opt_int(self.priority))
            .with_value("start_moment", moment("start_moment", self.start_moment)?)
            .with_value("deadline_moment", moment("deadline_moment", self.deadline_moment)?)
            .with_value("end_moment", moment("end_moment", self.end_moment)?)
            .with_value("materials_cost", Value::opt_int(self.materials_cost))
            .with_value("materials_paid", Value::Bool(self.materials_paid))
            .with_value("products_cost", Value::opt_int(self.products_cost))
            .with_value("products_paid", Value::Bool(self.products_paid))
            .with_value("work_cost", Value::opt_int(self.work_cost))
            .with_value("work_paid", Value::Bool(self.work_paid))
            .with_value("debt", Value::opt_int(self.debt))
            .with_value("debt_paid", Value::Bool(self.debt_paid))
            .with_reference("customer_id", customer)
            .with_reference("status_id", status))
    }
}

#[derive(Debug, Deserialize)]
pub struct BoxAccountingRecord {
    #[serde(deserialize_with = "lenient::int")]
    pub serial_num: i64,
    pub name: String,
    #[serde(default, alias = "order")]
    pub order_id: Option<String>,
    #[serde(default)]
    pub scheme_developer: Option<PersonRef>,
    #[serde(default)]
    pub assembler: Option<PersonRef>,
    #[serde(default)]
    pub programmer: Option<PersonRef>,
    #[serde(default)]
    pub tester: Option<PersonRef>,
}

impl SourceRecord for BoxAccountingRecord {
    const KIND: EntityKind = EntityKind::BoxAccounting;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        bounded_name("name", &self.name)?;
        let key = NaturalKey::single(Self::KIND, self.serial_num.to_string())?;
        let order = optional_ref(EntityKind::Order, self.order_id.as_deref().map(str::trim))?;

        Ok(SourceRow::new(Self::KIND, key)
            .with_value("serial_num", Value::Int(self.serial_num))
            .with_value("name", Value::text(self.name))
            .with_reference("order_id", order)
            .with_reference("scheme_developer_id", person_ref("scheme_developer", self.scheme_developer)?)
            .with_reference("assembler_id", person_ref("assembler", self.assembler)?)
            .with_reference("programmer_id", person_ref("programmer", self.programmer)?)
            .with_reference("tester_id", person_ref("tester", self.tester)?))
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderCommentRecord {
    #[serde(alias = "order")]
    pub order_id: String,
    #[serde(default)]
    pub moment_of_creation: Option<String>,
    pub text: String,
    #[serde(default)]
    pub person: Option<PersonRef>,
}

impl SourceRecord for OrderCommentRecord {
    const KIND: EntityKind = EntityKind::OrderComment;

    fn into_row(self, _ctx: &RowContext) -> Result<SourceRow, RecordError> {
        if self.text.trim().is_empty() {
            return Err(RecordError::invalid("text", "must not be empty"));
        }
        let serial = self.order_id.trim().to_string();
        let created = moment("moment_of_creation", self.moment_of_creation)?;
        let key = NaturalKey::new(
            Self::KIND,
            &[Some(serial.clone()), Some(created.key_component())],
        )?;
        let order = optional_ref(EntityKind::Order, Some(&serial))?;

        Ok(SourceRow::new(Self::KIND, key)
            .with_value("moment_of_creation", created)
            .with_value("text", Value::text(self.text))
            .with_reference("order_id", order)
            .with_reference("person_id", person_ref("person", self.person)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RowContext {
        RowContext::default()
    }

    #[test]
    fn test_decode_country_batch() {
        let batch = decode_batch(
            EntityKind::Country,
            vec![json!({"id": 1, "name": "Germany"}), json!({"id": 2, "name": "Russia"})],
            &ctx(),
        );
        assert_eq!(batch.rows.len(), 2);
        assert!(batch.invalid.is_empty());
        assert_eq!(batch.rows[0].values["name"], Value::Text("Germany".into()));
    }

    #[test]
    fn test_malformed_record_is_isolated() {
        let batch = decode_batch(
            EntityKind::Country,
            vec![json!({"name": "Germany"}), json!({"title": "Nowhere"}), json!({"name": ""})],
            &ctx(),
        );
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.invalid.len(), 2);
        assert_eq!(batch.invalid[0].record, "#1");
    }

    #[test]
    fn test_city_gets_default_country() {
        let batch = decode_batch(EntityKind::City, vec![json!({"name": "Томск"})], &ctx());
        let row = &batch.rows[0];
        assert_eq!(
            row.references["country_id"],
            Some(NaturalKey::single(EntityKind::Country, "Россия").unwrap())
        );
    }

    #[test]
    fn test_currency_is_normalized() {
        let batch = decode_batch(
            EntityKind::Currency,
            vec![json!({"name": " usd "}), json!({"name": "DOLLAR"})],
            &ctx(),
        );
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].values["name"], Value::Text("USD".into()));
        assert_eq!(batch.invalid.len(), 1);
    }

    #[test]
    fn test_person_optional_company() {
        let batch = decode_batch(
            EntityKind::Person,
            vec![json!({
                "surname": "Иванов",
                "name": "Иван",
                "patronymic": null,
                "phone": "",
                "company": "СИБПЛК",
                "active": 1
            })],
            &ctx(),
        );
        let row = &batch.rows[0];
        assert_eq!(row.values["patronymic"], Value::Null);
        assert_eq!(row.values["phone"], Value::Null);
        assert_eq!(row.values["active"], Value::Bool(true));
        assert_eq!(
            row.references["counterparty_id"],
            Some(NaturalKey::single(EntityKind::Counterparty, "СИБПЛК").unwrap())
        );
    }

    #[test]
    fn test_order_validation() {
        assert!(validate_order_serial("001-03-2024").is_ok());
        assert!(validate_order_serial("1-03-2024").is_err());
        assert!(validate_order_serial("001-13-2024").is_err());
        assert!(validate_order_serial("001-00-2024").is_err());

        let batch = decode_batch(
            EntityKind::Order,
            vec![
                json!({"serial": "001-03-2024", "name": "Шкаф", "customer": "Барион", "status": "В работе", "priority": "3"}),
                json!({"serial": "002-03-2024", "name": "Шкаф", "customer": "Барион", "status": "В работе", "priority": 11}),
                json!({"serial": "003-03-2024", "name": "Шкаф", "start_moment": "not a date"}),
            ],
            &ctx(),
        );
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].values["priority"], Value::Int(3));
        assert_eq!(batch.invalid.len(), 2);
        assert_eq!(batch.invalid[0].record, "002-03-2024");
    }

    #[test]
    fn test_person_ref_forms() {
        let parts = PersonRef::Parts {
            surname: "Петров".into(),
            name: "Пётр".into(),
            patronymic: Some("Петрович".into()),
        };
        let full = PersonRef::FullName("Петров  Пётр Петрович".into());
        assert_eq!(parts.key().unwrap(), full.key().unwrap());

        assert!(PersonRef::FullName("Петров".into()).key().is_err());
        let short = PersonRef::FullName("Петров Пётр".into()).key().unwrap();
        assert_eq!(short.components(), vec!["Петров", "Пётр", ""]);
    }

    #[test]
    fn test_box_accounting_references() {
        let batch = decode_batch(
            EntityKind::BoxAccounting,
            vec![json!({
                "serial_num": "1024",
                "name": "ШУ-1",
                "order": "001-03-2024",
                "scheme_developer": {"surname": "Петров", "name": "Пётр"},
                "assembler": "Сидоров Сидор",
                "tester": "Сидоров Сидор"
            })],
            &ctx(),
        );
        let row = &batch.rows[0];
        assert_eq!(row.values["serial_num"], Value::Int(1024));
        assert_eq!(row.references["programmer_id"], None);
        assert!(row.references["tester_id"].is_some());
        assert_eq!(
            row.references["order_id"],
            Some(NaturalKey::single(EntityKind::Order, "001-03-2024").unwrap())
        );
    }

    #[test]
    fn test_order_comment_key_uses_second_precision() {
        let batch = decode_batch(
            EntityKind::OrderComment,
            vec![
                json!({"order_id": "001-03-2024", "moment_of_creation": "2024-03-05T10:00:00.250", "text": "a", "person": "Петров Пётр"}),
                json!({"order_id": "001-03-2024", "moment_of_creation": "2024-03-05 10:00:00", "text": "b", "person": "Петров Пётр"}),
            ],
            &ctx(),
        );
        assert_eq!(batch.rows.len(), 2);
        assert_eq!(batch.rows[0].key, batch.rows[1].key);
    }
}
