//! Waste log transformer: monthly waste rows into typed waste log entries.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value as JsonValue};

use crate::error::FieldViolation;
use crate::models::destination::{LINE_ITEMS, row_text};
use crate::models::{
    DestinationRecord, DestinationTable, FieldBag, HazardClass, TrackingSeed, WasteLogRecord,
};

use super::fields;
use super::validation::{FieldRule, Violations, parse_date, parse_decimal};
use super::{RecordTransformer, TransformContext};

/// Day used when only month and year are known.
pub const DEFAULT_DAY: u32 = 15;

/// Ordered keyword rule: the first rule with a matching keyword decides.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardRule {
    pub class: HazardClass,
    /// Lowercase words matched against whole tokens of the description.
    /// A trailing `*` marks a stem that matches any token it begins.
    pub keywords: Vec<String>,
}

impl HazardRule {
    pub fn new(class: HazardClass, keywords: &[&str]) -> Self {
        Self {
            class,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(&self, tokens: &[&str]) -> bool {
        self.keywords
            .iter()
            .any(|k| tokens.iter().any(|token| keyword_matches(k, token)))
    }
}

fn keyword_matches(keyword: &str, token: &str) -> bool {
    match keyword.strip_suffix('*') {
        Some(stem) => token.starts_with(stem),
        None => token == keyword,
    }
}

/// Dangerous keywords come before recyclable ones.
pub fn default_hazard_rules() -> Vec<HazardRule> {
    vec![
        HazardRule::new(
            HazardClass::ClassI,
            &[
                "óleo*", "oleo*", "oil", "oils", "solvente*", "solvent*", "tinta*", "paint*",
                "contaminad*", "contaminated", "hospitalar*", "infectante*", "medical",
                "químic*", "quimic*", "chemical*", "bateria*", "battery", "batteries", "pilha*",
                "lâmpada*", "lampada*", "fluorescent*", "amianto", "asbestos", "agrotóxico*",
                "agrotoxico*", "pesticide*", "borra", "borras",
            ],
        ),
        HazardRule::new(
            HazardClass::ClassIIB,
            &[
                "metal*", "metálic*", "metalic*", "sucata*", "scrap", "vidro*", "glass",
                "entulho*", "rubble", "plástico*", "plastico*", "plastic*", "papel", "papéis",
                "papeis", "paper*", "papelão", "papelao", "cardboard", "reciclá*", "recicla*",
                "recyclable*",
            ],
        ),
    ]
}

/// Hazard class of a waste description; `II A` when no rule matches.
pub fn classify_hazard(description: &str, rules: &[HazardRule]) -> HazardClass {
    let text = description.to_lowercase();
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    rules
        .iter()
        .find(|rule| rule.matches(&tokens))
        .map(|rule| rule.class)
        .unwrap_or(HazardClass::ClassIIA)
}

/// Parse an explicit class label such as `I`, `II-A` or `Classe II B`.
pub fn parse_hazard_class(raw: &str) -> Option<HazardClass> {
    let compact: String = raw
        .to_uppercase()
        .replace("CLASSE", "")
        .replace("CLASS", "")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    match compact.as_str() {
        "I" | "1" => Some(HazardClass::ClassI),
        "IIA" | "2A" => Some(HazardClass::ClassIIA),
        "IIB" | "2B" => Some(HazardClass::ClassIIB),
        _ => None,
    }
}

const MONTH_NAMES: [&[&str]; 12] = [
    &["janeiro", "jan", "january"],
    &["fevereiro", "fev", "february", "feb"],
    &["março", "marco", "mar", "march"],
    &["abril", "abr", "april", "apr"],
    &["maio", "mai", "may"],
    &["junho", "jun", "june"],
    &["julho", "jul", "july"],
    &["agosto", "ago", "august", "aug"],
    &["setembro", "set", "september", "sep", "sept"],
    &["outubro", "out", "october", "oct"],
    &["novembro", "nov", "november"],
    &["dezembro", "dez", "december", "dec"],
];

fn month_from_name(token: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|names| names.contains(&token))
        .map(|i| i as u32 + 1)
}

/// Parse a month reference: `3`, `03/2024`, `2024-03`, `março`, `March 2024`.
///
/// Returns the month and the year when one is embedded.
pub fn parse_month(raw: &str) -> Option<(u32, Option<i32>)> {
    let lower = raw.trim().to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    let is_digits = |t: &str| t.chars().all(|c| c.is_ascii_digit());

    let year = tokens
        .iter()
        .find(|t| t.len() == 4 && is_digits(t))
        .and_then(|t| t.parse::<i32>().ok());

    let month = tokens.iter().find_map(|t| {
        if is_digits(t) && t.len() <= 2 {
            t.parse::<u32>().ok().filter(|m| (1..=12).contains(m))
        } else {
            month_from_name(t)
        }
    })?;

    Some((month, year))
}

/// Convert a quantity to kilograms.
///
/// The unit comes from `unit`, else from a suffix on the value (`1,5 t`),
/// else defaults to kg.
pub fn quantity_in_kg(raw: &str, unit: Option<&str>) -> Result<f64, String> {
    let raw = raw.trim();
    let split = raw.find(|c: char| c.is_alphabetic()).unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(split);

    let unit = unit
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .or_else(|| Some(suffix.trim()).filter(|s| !s.is_empty()))
        .unwrap_or("kg")
        .to_lowercase();

    let factor = match unit.trim_end_matches('.') {
        "g" | "gr" | "grama" | "gramas" | "gram" | "grams" => 0.001,
        "kg" | "kgs" | "quilo" | "quilos" | "quilograma" | "quilogramas" | "kilogram"
        | "kilograms" => 1.0,
        "t" | "ton" | "tons" | "tonne" | "tonnes" | "tonelada" | "toneladas" => 1000.0,
        other => return Err(format!("unknown unit '{}'", other)),
    };

    match parse_decimal(number) {
        Some(n) if n > 0.0 => Ok(n * factor),
        Some(_) => Err(format!("must be a positive number, got '{}'", number.trim())),
        None => Err(format!("'{}' is not a number", raw)),
    }
}

fn resolve_date(
    value: &dyn Fn(&[&str]) -> Option<String>,
    default_year: i32,
) -> Result<NaiveDate, (&'static str, String)> {
    if let Some(date) = value(fields::DATE) {
        return parse_date(&date).ok_or(("date", format!("'{}' is not a valid date", date)));
    }

    let month = value(fields::MONTH).ok_or(("month", "is required".to_string()))?;
    let (month_number, embedded_year) =
        parse_month(&month).ok_or(("month", format!("'{}' is not a month", month)))?;
    let year = embedded_year
        .or_else(|| value(fields::YEAR).and_then(|y| y.trim().parse().ok()))
        .unwrap_or(default_year);

    NaiveDate::from_ymd_opt(year, month_number, DEFAULT_DAY)
        .ok_or(("month", format!("invalid month {}/{}", month_number, year)))
}

pub struct WasteLogTransformer;

impl RecordTransformer for WasteLogTransformer {
    fn destination(&self) -> DestinationTable {
        DestinationTable::WasteLog
    }

    fn transform(
        &self,
        bag: &FieldBag,
        ctx: &TransformContext<'_>,
    ) -> Result<Vec<DestinationRecord>, Vec<FieldViolation>> {
        // A document without line items is a single entry described by scalars
        let rows: Vec<Map<String, JsonValue>> = if bag.rows(LINE_ITEMS).is_empty() {
            vec![Map::new()]
        } else {
            bag.rows(LINE_ITEMS).to_vec()
        };
        let single = rows.len() == 1;

        let default_year = bag
            .first_scalar(fields::REFERENCE_YEAR)
            .or_else(|| bag.first_scalar(fields::YEAR))
            .and_then(|y| y.parse::<i32>().ok())
            .unwrap_or_else(|| ctx.today.year());

        let mut violations = Violations::new();
        let mut records = Vec::with_capacity(rows.len());
        let mut seen: HashSet<String> = HashSet::new();

        for (i, row) in rows.iter().enumerate() {
            let value = |names: &[&str]| {
                row_text(row, names).or_else(|| bag.first_scalar(names).map(str::to_string))
            };

            let waste_type = value(fields::WASTE_TYPE);
            violations.check(
                i,
                "waste_type",
                waste_type.as_deref(),
                &[FieldRule::Required, FieldRule::NonEmpty],
            );

            let quantity_kg = match value(fields::QUANTITY) {
                Some(quantity) => match quantity_in_kg(&quantity, value(fields::UNIT).as_deref()) {
                    Ok(kg) => Some(kg),
                    Err(message) => {
                        violations.push(i, "quantity", message);
                        None
                    }
                },
                None => {
                    violations.push(i, "quantity", "is required");
                    None
                }
            };

            let generated_on = match resolve_date(&value, default_year) {
                Ok(date) => Some(date),
                Err((field, message)) => {
                    violations.push(i, field, message);
                    None
                }
            };

            let (Some(waste_type), Some(quantity_kg), Some(generated_on)) =
                (waste_type, quantity_kg, generated_on)
            else {
                continue;
            };

            let hazard_class = value(fields::HAZARD_CLASS)
                .and_then(|c| parse_hazard_class(&c))
                .unwrap_or_else(|| classify_hazard(&waste_type, ctx.hazard_rules));

            let manifest = row_text(row, fields::MANIFEST).or_else(|| {
                single
                    .then(|| bag.first_scalar(fields::MANIFEST).map(str::to_string))
                    .flatten()
            });
            let (tracking_number, tracking_seed) = match manifest {
                Some(number) => (number, None),
                None => {
                    let mut seed = TrackingSeed::new(ctx.preview_id, i);
                    while seen.contains(&seed.number(generated_on)) {
                        seed.salt += 1;
                    }
                    (seed.number(generated_on), Some(seed))
                }
            };
            seen.insert(tracking_number.clone());

            records.push(DestinationRecord::WasteLog(WasteLogRecord {
                tracking_number,
                waste_type,
                hazard_class,
                quantity_kg,
                generated_on,
                disposal_method: value(fields::DISPOSAL),
                carrier: value(fields::CARRIER),
                tracking_seed,
            }));
        }

        violations.into_result(records)
    }
}
