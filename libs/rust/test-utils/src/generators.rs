//! Shared proptest generators for fiscal domain values.

use crate::fixtures::access_key_check_digit;
use proptest::prelude::*;

/// NSU values inside the 15-digit range SEFAZ allows.
pub fn nsu_strategy() -> impl Strategy<Value = u64> {
    0u64..=999_999_999_999_999
}

/// 14-digit CNPJ strings (digits only; check digits are not validated downstream).
pub fn cnpj_strategy() -> impl Strategy<Value = String> {
    "[0-9]{14}"
}

/// Valid 44-digit access keys with model 55, 65 or 57.
pub fn access_key_strategy() -> impl Strategy<Value = String> {
    (
        "[1-5][0-9]",
        "[0-9]{4}",
        cnpj_strategy(),
        prop_oneof![Just("55"), Just("65"), Just("57")],
        "[0-9]{3}",
        "[0-9]{9}",
        "[1-9]",
        "[0-9]{8}",
    )
        .prop_map(|(uf, aamm, cnpj, model, serie, number, tp_emis, code)| {
            let body = format!("{uf}{aamm}{cnpj}{model}{serie}{number}{tp_emis}{code}");
            let dv = access_key_check_digit(&body);
            format!("{body}{dv}")
        })
}

/// Text that may contain XML-significant characters.
pub fn xml_text_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 &<>\"'ÇÃÉ.,-]{0,40}"
}

/// SEFAZ status codes other than success (138), empty (137) and rate limit (656).
pub fn protocol_error_status_strategy() -> impl Strategy<Value = u16> {
    (100u16..1000).prop_filter("reserved status", |c| ![137, 138, 656].contains(c))
}

/// Plaintext secrets to encrypt, including empty and non-ASCII values.
pub fn secret_strategy() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "\\PC{1,64}"]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::test_runner::TestRunner;

    #[test]
    fn test_access_keys_are_44_digits() {
        let mut runner = TestRunner::default();
        runner
            .run(&access_key_strategy(), |key| {
                prop_assert_eq!(key.len(), 44);
                prop_assert!(key.chars().all(|c| c.is_ascii_digit()));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_protocol_status_avoids_reserved_codes() {
        let mut runner = TestRunner::default();
        runner
            .run(&protocol_error_status_strategy(), |code| {
                prop_assert!(code != 137 && code != 138 && code != 656);
                Ok(())
            })
            .unwrap();
    }
}
