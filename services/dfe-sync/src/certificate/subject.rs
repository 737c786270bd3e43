//! Best-effort helpers over certificate distinguished names.
//!
//! ICP-Brasil e-CNPJ certificates carry the company tax ID in the common
//! name (`<legal name>:<14 digits>`) and the state in `ST`. Neither is
//! guaranteed, so every helper here returns an optional value or a default.

use once_cell::sync::Lazy;
use regex::Regex;

static TAX_ID_IN_CN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r":\s*(\d{14})\s*$").ok());
static STATE_FIELD: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(?:^|[,/+]\s*)ST\s*=\s*([^,/+]+)").ok());

/// IBGE codes by state: (abbreviation, code, upper-case name without accents).
const STATES: &[(&str, &str, &str)] = &[
    ("RO", "11", "RONDONIA"),
    ("AC", "12", "ACRE"),
    ("AM", "13", "AMAZONAS"),
    ("RR", "14", "RORAIMA"),
    ("PA", "15", "PARA"),
    ("AP", "16", "AMAPA"),
    ("TO", "17", "TOCANTINS"),
    ("MA", "21", "MARANHAO"),
    ("PI", "22", "PIAUI"),
    ("CE", "23", "CEARA"),
    ("RN", "24", "RIO GRANDE DO NORTE"),
    ("PB", "25", "PARAIBA"),
    ("PE", "26", "PERNAMBUCO"),
    ("AL", "27", "ALAGOAS"),
    ("SE", "28", "SERGIPE"),
    ("BA", "29", "BAHIA"),
    ("MG", "31", "MINAS GERAIS"),
    ("ES", "32", "ESPIRITO SANTO"),
    ("RJ", "33", "RIO DE JANEIRO"),
    ("SP", "35", "SAO PAULO"),
    ("PR", "41", "PARANA"),
    ("SC", "42", "SANTA CATARINA"),
    ("RS", "43", "RIO GRANDE DO SUL"),
    ("MS", "50", "MATO GROSSO DO SUL"),
    ("MT", "51", "MATO GROSSO"),
    ("GO", "52", "GOIAS"),
    ("DF", "53", "DISTRITO FEDERAL"),
];

/// Recover the 14-digit tax ID from a `"<legal name>:<tax id>"` common name.
#[must_use]
pub fn tax_id_from_common_name(common_name: &str) -> Option<String> {
    TAX_ID_IN_CN
        .as_ref()?
        .captures(common_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Two-digit IBGE code of the state named in `subject`, or `default`.
///
/// `subject` is a flattened distinguished name such as
/// `C=BR, ST=SP, L=SAO PAULO, CN=ACME LTDA:11222333000181`. The state may be
/// given as an abbreviation, a full name, or already as a code.
#[must_use]
pub fn jurisdiction_code(subject: &str, default: &str) -> String {
    state_field(subject)
        .and_then(|state| code_for_state(&state))
        .unwrap_or(default)
        .to_string()
}

fn state_field(subject: &str) -> Option<String> {
    STATE_FIELD
        .as_ref()?
        .captures(subject)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Look up the IBGE code for a state abbreviation, name or code.
#[must_use]
pub fn code_for_state(state: &str) -> Option<&'static str> {
    let normalized = strip_accents(state.trim()).to_uppercase();
    STATES
        .iter()
        .find(|(abbr, code, name)| {
            normalized == *abbr || normalized == *code || normalized == *name
        })
        .map(|(_, code, _)| *code)
}

fn strip_accents(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'Á' | 'À' | 'Â' | 'Ã' => 'A',
            'é' | 'ê' | 'É' | 'Ê' => 'E',
            'í' | 'Í' => 'I',
            'ó' | 'ô' | 'õ' | 'Ó' | 'Ô' | 'Õ' => 'O',
            'ú' | 'Ú' => 'U',
            'ç' | 'Ç' => 'C',
            other => other,
        })
        .collect()
}
